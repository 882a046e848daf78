use std::fmt::Write as _;
use std::io::{self, Read, Write as _};
use std::path::PathBuf;
use std::thread;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use once_cell::sync::Lazy;
use regex::Regex;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::app::App;
use crate::config::themes::ThemeRegistry;
use crate::config::{ConfigPaths, ThemeName};
use crate::pomodoro::{Pomodoro, TimerEvent, TimerMode};
use crate::store::{Note, NotePatch, SettingsPatch, Store, Todo};

const SHORT_ID_LEN: usize = 8;
const TITLE_COLUMN_WIDTH: usize = 28;
const PREVIEW_GRAPHEMES: usize = 48;

static MARKUP_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]*>").expect("static regex compiles"));

#[derive(Subcommand, Debug, Clone)]
pub enum NoteCommand {
    /// Create a note
    New(NewNoteArgs),
    /// List notes in display order
    List,
    /// Print a single note
    Show(NoteIdArgs),
    /// Change fields of a note; unspecified fields are left alone
    Edit(EditNoteArgs),
    /// Delete a note
    Delete(NoteIdArgs),
    /// Export every note into a zip archive
    Export(ExportArgs),
    /// Import notes from a zip archive produced by `note export`
    Import(ImportArgs),
}

#[derive(Args, Debug, Clone)]
pub struct NewNoteArgs {
    /// Title for the note ("Untitled Note" if omitted)
    #[arg()]
    pub title: Option<String>,
    /// Provide the note content inline. If omitted, reads from stdin when piped.
    #[arg(long)]
    pub content: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct NoteIdArgs {
    /// Note id, or a unique prefix of it
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct EditNoteArgs {
    /// Note id, or a unique prefix of it
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub content: Option<String>,
    #[arg(long)]
    pub font_family: Option<String>,
    #[arg(long)]
    pub font_size: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Destination archive (defaults to the export directory)
    pub path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    pub path: PathBuf,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TodoCommand {
    /// Add a todo
    Add(AddTodoArgs),
    /// List todos in display order
    List,
    /// Mark a todo as completed
    Done(TodoIdArgs),
    /// Mark a todo as not completed
    Undo(TodoIdArgs),
    /// Delete a todo
    Delete(TodoIdArgs),
    /// List incomplete todos that are past their due date
    Due,
}

#[derive(Args, Debug, Clone)]
pub struct AddTodoArgs {
    /// Todo title
    #[arg(required = true)]
    pub title: Vec<String>,
    /// Due date, RFC 3339 or `YYYY-MM-DDTHH:MM` (UTC)
    #[arg(long)]
    pub due: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct TodoIdArgs {
    /// Todo id, or a unique prefix of it
    pub id: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SettingsCommand {
    /// Print the current settings
    Show,
    /// Change settings; unspecified fields are left alone
    Set(SetSettingsArgs),
    /// Print the CSS variable bindings of a theme (current theme by default)
    ThemeVars(ThemeVarsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SetSettingsArgs {
    #[arg(long)]
    pub theme: Option<ThemeName>,
    #[arg(long)]
    pub font_family: Option<String>,
    #[arg(long)]
    pub font_size: Option<String>,
    #[arg(long, action = clap::ArgAction::Set)]
    pub notifications: Option<bool>,
}

#[derive(Args, Debug, Clone)]
pub struct ThemeVarsArgs {
    pub theme: Option<ThemeName>,
}

#[derive(Args, Debug, Clone)]
pub struct TimerArgs {
    /// Mode to start in
    #[arg(long, default_value_t = TimerMode::Work)]
    pub mode: TimerMode,
    /// Work session length in minutes for this run
    #[arg(long)]
    pub work: Option<String>,
    /// Short break length in minutes for this run
    #[arg(long)]
    pub short: Option<String>,
    /// Long break length in minutes for this run
    #[arg(long)]
    pub long: Option<String>,
    /// Number of completed sessions before exiting
    #[arg(long, default_value_t = 1)]
    pub sessions: u32,
}

pub fn status(app: &App) -> Result<String> {
    let store = app.store();
    let open = store.todos().iter().filter(|todo| !todo.completed).count();
    let mut out = String::new();
    let _ = writeln!(&mut out, "notes      {}", store.notes().len());
    let _ = writeln!(
        &mut out,
        "todos      {} ({} open)",
        store.todos().len(),
        open
    );
    let _ = writeln!(&mut out, "theme      {}", store.settings().theme);
    let _ = writeln!(&mut out, "save       {}", store.save_status());
    let due = app.reminders(OffsetDateTime::now_utc());
    if !due.is_empty() {
        out.push('\n');
        for todo in &due {
            let _ = writeln!(&mut out, "Reminder: is \"{}\" completed?", todo.title);
        }
    }
    Ok(out)
}

pub fn handle_note_command(
    app: &mut App,
    paths: &ConfigPaths,
    command: NoteCommand,
) -> Result<String> {
    match command {
        NoteCommand::New(args) => {
            let content = match args.content {
                Some(content) => content,
                None => read_stdin()?.unwrap_or_default(),
            };
            new_note(app, args.title.as_deref(), &content)
        }
        NoteCommand::List => Ok(format_note_list(app.store().notes())),
        NoteCommand::Show(args) => {
            let id = resolve_note_id(app.store(), &args.id)?;
            let note = app
                .store()
                .note(&id)
                .with_context(|| format!("note {id} disappeared"))?;
            Ok(format_note(note))
        }
        NoteCommand::Edit(args) => edit_note(app, args),
        NoteCommand::Delete(args) => {
            let id = resolve_note_id(app.store(), &args.id)?;
            app.delete_note(&id)?;
            Ok(format!("Deleted note {}\n", short_id(&id)))
        }
        NoteCommand::Export(args) => {
            let path = args
                .path
                .unwrap_or_else(|| paths.export_dir.join(&app.config.export.archive_name));
            let count = app.export_notes(&path)?;
            Ok(format!(
                "Exported {count} note{} to {}\n",
                plural(count),
                path.display()
            ))
        }
        NoteCommand::Import(args) => {
            let report = app.import_notes(&args.path)?;
            let mut out = format!(
                "Imported {} note{}",
                report.imported.len(),
                plural(report.imported.len())
            );
            if !report.skipped.is_empty() {
                let _ = write!(&mut out, ", skipped {}", report.skipped.len());
            }
            out.push('\n');
            for skipped in &report.skipped {
                let _ = writeln!(&mut out, "  skipped {}: {}", skipped.name, skipped.reason);
            }
            Ok(out)
        }
    }
}

fn new_note(app: &mut App, title: Option<&str>, content: &str) -> Result<String> {
    let id = app.create_note(title.unwrap_or_default(), content)?;
    let note = app
        .store()
        .note(&id)
        .with_context(|| format!("note {id} missing after create"))?;
    Ok(format!("Created note {}  {}\n", short_id(&id), note.title))
}

fn edit_note(app: &mut App, args: EditNoteArgs) -> Result<String> {
    let patch = NotePatch {
        title: args.title,
        content: args.content,
        font_family: args.font_family,
        font_size: args.font_size,
        updated_at: None,
    };
    if patch.is_empty() {
        bail!("nothing to change: pass --title, --content, --font-family or --font-size");
    }
    let id = resolve_note_id(app.store(), &args.id)?;
    if !app.update_note(&id, patch)? {
        bail!("note {id} not found");
    }
    Ok(format!("Updated note {}\n", short_id(&id)))
}

pub fn handle_todo_command(app: &mut App, command: TodoCommand) -> Result<String> {
    match command {
        TodoCommand::Add(args) => {
            let title = args.title.join(" ");
            let due = args.due.as_deref().map(parse_due_date).transpose()?;
            let id = app.add_todo(&title, due)?;
            Ok(format!("Added todo {}  {}\n", short_id(&id), title.trim()))
        }
        TodoCommand::List => Ok(format_todo_list(app.store().todos())),
        TodoCommand::Done(args) => set_completed(app, &args.id, true),
        TodoCommand::Undo(args) => set_completed(app, &args.id, false),
        TodoCommand::Delete(args) => {
            let id = resolve_todo_id(app.store(), &args.id)?;
            app.delete_todo(&id)?;
            Ok(format!("Deleted todo {}\n", short_id(&id)))
        }
        TodoCommand::Due => {
            let due: Vec<Todo> = app
                .store()
                .due_todos(OffsetDateTime::now_utc())
                .into_iter()
                .cloned()
                .collect();
            if due.is_empty() {
                return Ok("Nothing overdue.\n".to_string());
            }
            Ok(format_todo_list(&due))
        }
    }
}

fn set_completed(app: &mut App, raw_id: &str, completed: bool) -> Result<String> {
    let id = resolve_todo_id(app.store(), raw_id)?;
    app.set_todo_completed(&id, completed)?;
    let verb = if completed { "Completed" } else { "Reopened" };
    Ok(format!("{verb} todo {}\n", short_id(&id)))
}

pub fn handle_settings_command(app: &mut App, command: SettingsCommand) -> Result<String> {
    match command {
        SettingsCommand::Show => {
            let settings = app.store().settings();
            let mut out = String::new();
            let _ = writeln!(&mut out, "theme          {}", settings.theme);
            let _ = writeln!(&mut out, "font family    {}", settings.default_font_family);
            let _ = writeln!(&mut out, "font size      {}", settings.default_font_size);
            let _ = writeln!(
                &mut out,
                "notifications  {}",
                if settings.notifications { "on" } else { "off" }
            );
            Ok(out)
        }
        SettingsCommand::Set(args) => {
            let patch = SettingsPatch {
                theme: args.theme,
                default_font_family: args.font_family,
                default_font_size: args.font_size,
                notifications: args.notifications,
            };
            if patch.is_empty() {
                bail!("nothing to change: pass --theme, --font-family, --font-size or --notifications");
            }
            app.update_settings(patch)?;
            Ok("Settings updated\n".to_string())
        }
        SettingsCommand::ThemeVars(args) => {
            let theme = args.theme.unwrap_or(app.store().settings().theme);
            let registry = ThemeRegistry::default();
            let palette = registry
                .palette(theme)
                .with_context(|| format!("no palette registered for theme {theme}"))?;
            Ok(palette.to_css(theme))
        }
    }
}

pub fn run_timer(app: &mut App, args: TimerArgs) -> Result<()> {
    let mut timer = app.pomodoro();
    for (mode, input) in [
        (TimerMode::Work, &args.work),
        (TimerMode::Short, &args.short),
        (TimerMode::Long, &args.long),
    ] {
        if let Some(input) = input {
            if let Err(err) = timer.set_duration_input(mode, input) {
                tracing::warn!(%err, "keeping configured duration");
                eprintln!("{err}; keeping {} minutes", timer.durations().minutes(mode));
            }
        }
    }
    timer.switch_mode(args.mode);
    timer.toggle();

    let tick = app.config.pomodoro.tick_interval();
    let mut stdout = io::stdout();
    let mut completed = 0;
    while completed < args.sessions.max(1) {
        write!(stdout, "\r{}", format_timer_line(&timer)).context("writing timer line")?;
        stdout.flush().context("flushing timer line")?;
        thread::sleep(tick);
        app.poll();
        for event in timer.poll() {
            completed += 1;
            writeln!(stdout).context("writing timer line")?;
            if app.notifications_enabled() {
                write!(stdout, "\x07").context("ringing terminal bell")?;
            }
            writeln!(stdout, "{}", completion_message(&event)).context("writing timer line")?;
            if completed < args.sessions {
                timer.toggle();
            }
        }
    }
    Ok(())
}

pub fn format_timer_line(timer: &Pomodoro) -> String {
    let state = if timer.is_running() { "running" } else { "paused" };
    format!("{:<12} {}  [{state}]", timer.mode().label(), timer.display())
}

pub fn completion_message(event: &TimerEvent) -> String {
    match event {
        TimerEvent::Completed { finished, next } => format!(
            "{} session is complete! Up next: {}",
            capitalize(&finished.to_string()),
            next.label()
        ),
    }
}

fn format_note_list(notes: &[Note]) -> String {
    if notes.is_empty() {
        return "No notes yet. Create one with `notey note new`.\n".to_string();
    }
    let mut out = String::new();
    for note in notes {
        let title = if note.title.trim().is_empty() {
            crate::store::UNTITLED_NOTE
        } else {
            note.title.as_str()
        };
        let _ = writeln!(
            &mut out,
            "{}  {}  {}  {}",
            short_id(&note.id),
            pad_to_width(title, TITLE_COLUMN_WIDTH),
            format_date(note.updated_at),
            preview(&note.content, PREVIEW_GRAPHEMES)
        );
    }
    out
}

fn format_note(note: &Note) -> String {
    let mut out = String::new();
    let _ = writeln!(&mut out, "#{}  {}", note.id, note.title);
    let _ = writeln!(&mut out, "    created {}", format_timestamp(note.created_at));
    let _ = writeln!(&mut out, "    updated {}", format_timestamp(note.updated_at));
    let _ = writeln!(&mut out, "    font    {} {}", note.font_family, note.font_size);
    out.push('\n');
    out.push_str(&note.content);
    if !note.content.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn format_todo_list(todos: &[Todo]) -> String {
    if todos.is_empty() {
        return "No todos yet.\n".to_string();
    }
    let mut out = String::new();
    for todo in todos {
        let mark = if todo.completed { "x" } else { " " };
        let _ = write!(&mut out, "{}  [{mark}] {}", short_id(&todo.id), todo.title);
        if let Some(due) = todo.due_date {
            let _ = write!(&mut out, "  (due {})", format_timestamp(due));
        }
        out.push('\n');
    }
    out
}

fn resolve_note_id(store: &Store, raw: &str) -> Result<String> {
    resolve_id(store.notes().iter().map(|note| note.id.as_str()), raw, "note")
}

fn resolve_todo_id(store: &Store, raw: &str) -> Result<String> {
    resolve_id(store.todos().iter().map(|todo| todo.id.as_str()), raw, "todo")
}

/// Exact id, or the single id starting with `raw`.
fn resolve_id<'a>(ids: impl Iterator<Item = &'a str>, raw: &str, kind: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("{kind} id cannot be empty");
    }
    let matches: Vec<&str> = ids.filter(|id| id.starts_with(raw)).collect();
    if let Some(exact) = matches.iter().find(|id| **id == raw) {
        return Ok(exact.to_string());
    }
    match matches.as_slice() {
        [] => bail!("{kind} {raw} not found"),
        [single] => Ok(single.to_string()),
        _ => bail!("{kind} id prefix {raw} is ambiguous ({} matches)", matches.len()),
    }
}

fn parse_due_date(raw: &str) -> Result<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(parsed);
    }
    let local = format_description!("[year]-[month]-[day]T[hour]:[minute]");
    let spaced = format_description!("[year]-[month]-[day] [hour]:[minute]");
    PrimitiveDateTime::parse(raw, &local)
        .or_else(|_| PrimitiveDateTime::parse(raw, &spaced))
        .map(PrimitiveDateTime::assume_utc)
        .with_context(|| format!("invalid due date {raw:?}; use RFC 3339 or YYYY-MM-DDTHH:MM"))
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("reading note content from stdin")?;
    Ok(Some(buf))
}

fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

fn pad_to_width(text: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for grapheme in text.graphemes(true) {
        let glyph_width = UnicodeWidthStr::width(grapheme);
        if used + glyph_width > width {
            break;
        }
        out.push_str(grapheme);
        used += glyph_width;
    }
    out.push_str(&" ".repeat(width - used));
    out
}

/// Plain-text preview of rich-text content.
fn preview(content: &str, max_graphemes: usize) -> String {
    let stripped = MARKUP_TAG.replace_all(content, " ");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return "No content".to_string();
    }
    let mut graphemes = collapsed.graphemes(true);
    let head: String = graphemes.by_ref().take(max_graphemes).collect();
    if graphemes.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

fn format_date(value: OffsetDateTime) -> String {
    let format = format_description!("[month repr:short] [day padding:none], [year]");
    value
        .format(&format)
        .unwrap_or_else(|_| value.unix_timestamp().to_string())
}

fn format_timestamp(value: OffsetDateTime) -> String {
    value
        .format(&Rfc3339)
        .unwrap_or_else(|_| value.unix_timestamp().to_string())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
