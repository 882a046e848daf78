//! Zip export and import of notes, one pretty-printed JSON entry per note.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, Write};
use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::store::{fresh_id, Note, Store, UNTITLED_NOTE};

static UNSAFE_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1f]"#).expect("static regex compiles"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Ids assigned to the imported notes, in archive order.
    pub imported: Vec<String>,
    pub skipped: Vec<SkippedEntry>,
}

/// Writes every note into a zip archive and returns the number of entries.
pub fn export_notes<W: Write + Seek>(notes: &[Note], writer: W, extension: &str) -> Result<usize> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut used = HashSet::new();
    for note in notes {
        let name = entry_name(&note.title, extension, &mut used);
        let body = serde_json::to_string_pretty(note)
            .with_context(|| format!("serialising note {}", note.id))?;
        zip.start_file(name.as_str(), options)
            .with_context(|| format!("starting archive entry {name}"))?;
        zip.write_all(body.as_bytes())
            .with_context(|| format!("writing archive entry {name}"))?;
    }
    zip.finish().context("finalising archive")?;
    Ok(notes.len())
}

pub fn export_to_path(notes: &[Note], path: &Path, extension: &str) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating export directory {}", parent.display()))?;
    }
    let file =
        File::create(path).with_context(|| format!("creating archive {}", path.display()))?;
    let count = export_notes(notes, file, extension)?;
    tracing::info!(count, path = %path.display(), "exported notes");
    Ok(count)
}

/// Parses every `*.{extension}` entry. Entries that are not valid notes are
/// returned as skipped instead of failing the whole read.
pub fn read_archive<R: Read + Seek>(
    reader: R,
    extension: &str,
) -> Result<(Vec<(String, Note)>, Vec<SkippedEntry>)> {
    let mut archive = ZipArchive::new(reader).context("opening zip archive")?;
    let suffix = format!(".{extension}");
    let mut notes = Vec::new();
    let mut skipped = Vec::new();
    for index in 0..archive.len() {
        let name = match archive.name_for_index(index) {
            Some(name) => name.to_string(),
            None => format!("#{index}"),
        };
        if name.ends_with('/') || !name.ends_with(&suffix) {
            continue;
        }
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(?err, entry = %name, "skipping archive entry that cannot be opened");
                skipped.push(SkippedEntry {
                    name,
                    reason: err.to_string(),
                });
                continue;
            }
        };
        let mut raw = String::new();
        if let Err(err) = entry.read_to_string(&mut raw) {
            tracing::warn!(?err, entry = %name, "skipping unreadable archive entry");
            skipped.push(SkippedEntry {
                name,
                reason: err.to_string(),
            });
            continue;
        }
        match serde_json::from_str::<Note>(&raw) {
            Ok(note) => notes.push((name, note)),
            Err(err) => {
                tracing::warn!(?err, entry = %name, "skipping malformed note entry");
                skipped.push(SkippedEntry {
                    name,
                    reason: err.to_string(),
                });
            }
        }
    }
    Ok((notes, skipped))
}

/// Adds every valid note from the archive to `store` under a fresh id.
/// The caller decides when to commit.
pub fn import_into<R: Read + Seek>(
    store: &mut Store,
    reader: R,
    extension: &str,
) -> Result<ImportReport> {
    let (notes, skipped) = read_archive(reader, extension)?;
    let mut report = ImportReport {
        imported: Vec::with_capacity(notes.len()),
        skipped,
    };
    for (name, mut note) in notes {
        note.id = fresh_id();
        let id = note.id.clone();
        match store.add_note(note) {
            Ok(()) => report.imported.push(id),
            Err(err) => report.skipped.push(SkippedEntry {
                name,
                reason: err.to_string(),
            }),
        }
    }
    tracing::info!(
        imported = report.imported.len(),
        skipped = report.skipped.len(),
        "imported notes"
    );
    Ok(report)
}

pub fn import_from_path(store: &mut Store, path: &Path, extension: &str) -> Result<ImportReport> {
    let file = File::open(path).with_context(|| format!("opening archive {}", path.display()))?;
    import_into(store, BufReader::new(file), extension)
        .with_context(|| format!("importing notes from {}", path.display()))
}

/// `{title}.{extension}` with path-hostile characters replaced and a
/// ` (n)` suffix when the name is already taken.
fn entry_name(title: &str, extension: &str, used: &mut HashSet<String>) -> String {
    let cleaned = UNSAFE_NAME_CHARS.replace_all(title.trim(), "_");
    let stem = if cleaned.trim().is_empty() {
        UNTITLED_NOTE.to_string()
    } else {
        cleaned.trim().to_string()
    };
    let mut name = format!("{stem}.{extension}");
    let mut counter = 2;
    while !used.insert(name.clone()) {
        name = format!("{stem} ({counter}).{extension}");
        counter += 1;
    }
    name
}
