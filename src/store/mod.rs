//! The application state container.
//!
//! [`Store`] owns the canonical notes, todos and settings. Mutators apply to
//! memory immediately, mark the store dirty and notify subscribers; durable
//! writes happen on [`Store::commit`], which always serialises the whole
//! snapshot.

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use thiserror::Error;
use time::OffsetDateTime;

use crate::storage::SnapshotBackend;

pub mod model;

pub use model::{
    fresh_id, Note, NotePatch, SaveStatus, Settings, SettingsPatch, Snapshot, Todo, TodoPatch,
    UNTITLED_NOTE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Note,
    Todo,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Note => f.write_str("note"),
            EntityKind::Todo => f.write_str("todo"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("a {kind} with id {id} already exists")]
    DuplicateId { kind: EntityKind, id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    NoteAdded { id: String },
    NoteUpdated { id: String },
    NoteDeleted { id: String },
    TodoAdded { id: String },
    TodoUpdated { id: String },
    TodoDeleted { id: String },
    SettingsUpdated,
    SaveStatusChanged(SaveStatus),
}

pub struct Store {
    state: Snapshot,
    save_status: SaveStatus,
    dirty: bool,
    backend: Box<dyn SnapshotBackend>,
    subscribers: Vec<Sender<StoreEvent>>,
}

impl Store {
    /// Loads the durable snapshot, or starts from defaults when none exists.
    pub fn open(backend: Box<dyn SnapshotBackend>) -> Result<Self> {
        let state = backend
            .load()
            .with_context(|| format!("loading state from {}", backend.describe()))?;
        let state = match state {
            Some(state) => {
                tracing::info!(
                    notes = state.notes.len(),
                    todos = state.todos.len(),
                    source = %backend.describe(),
                    "loaded stored state"
                );
                state
            }
            None => {
                tracing::info!(source = %backend.describe(), "no stored state, starting fresh");
                Snapshot::default()
            }
        };
        Ok(Self {
            state,
            save_status: SaveStatus::Saved,
            dirty: false,
            backend,
            subscribers: Vec::new(),
        })
    }

    pub fn notes(&self) -> &[Note] {
        &self.state.notes
    }

    pub fn todos(&self) -> &[Todo] {
        &self.state.todos
    }

    pub fn settings(&self) -> &Settings {
        &self.state.settings
    }

    pub fn save_status(&self) -> SaveStatus {
        self.save_status
    }

    pub fn note(&self, id: &str) -> Option<&Note> {
        self.state.notes.iter().find(|note| note.id == id)
    }

    pub fn todo(&self, id: &str) -> Option<&Todo> {
        self.state.todos.iter().find(|todo| todo.id == id)
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.state
    }

    /// True when memory holds changes the backend has not seen yet.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Incomplete todos whose due date is at or before `now`.
    pub fn due_todos(&self, now: OffsetDateTime) -> Vec<&Todo> {
        self.state
            .todos
            .iter()
            .filter(|todo| todo.is_overdue(now))
            .collect()
    }

    pub fn subscribe(&mut self) -> Receiver<StoreEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn add_note(&mut self, note: Note) -> Result<(), StoreError> {
        if self.note(&note.id).is_some() {
            tracing::warn!(id = %note.id, "refusing to add note with duplicate id");
            return Err(StoreError::DuplicateId {
                kind: EntityKind::Note,
                id: note.id,
            });
        }
        let id = note.id.clone();
        self.state.notes.push(note);
        self.changed(StoreEvent::NoteAdded { id });
        Ok(())
    }

    /// Returns false (and changes nothing) when no note has this id.
    pub fn update_note(&mut self, id: &str, patch: NotePatch) -> bool {
        let Some(note) = self.state.notes.iter_mut().find(|note| note.id == id) else {
            tracing::debug!(id, "update for unknown note ignored");
            return false;
        };
        patch.apply(note, OffsetDateTime::now_utc());
        self.changed(StoreEvent::NoteUpdated { id: id.to_string() });
        true
    }

    pub fn delete_note(&mut self, id: &str) -> bool {
        let Some(index) = self.state.notes.iter().position(|note| note.id == id) else {
            return false;
        };
        self.state.notes.remove(index);
        self.changed(StoreEvent::NoteDeleted { id: id.to_string() });
        true
    }

    pub fn add_todo(&mut self, todo: Todo) -> Result<(), StoreError> {
        if self.todo(&todo.id).is_some() {
            tracing::warn!(id = %todo.id, "refusing to add todo with duplicate id");
            return Err(StoreError::DuplicateId {
                kind: EntityKind::Todo,
                id: todo.id,
            });
        }
        let id = todo.id.clone();
        self.state.todos.push(todo);
        self.changed(StoreEvent::TodoAdded { id });
        Ok(())
    }

    pub fn update_todo(&mut self, id: &str, patch: TodoPatch) -> bool {
        let Some(todo) = self.state.todos.iter_mut().find(|todo| todo.id == id) else {
            tracing::debug!(id, "update for unknown todo ignored");
            return false;
        };
        patch.apply(todo);
        self.changed(StoreEvent::TodoUpdated { id: id.to_string() });
        true
    }

    pub fn delete_todo(&mut self, id: &str) -> bool {
        let Some(index) = self.state.todos.iter().position(|todo| todo.id == id) else {
            return false;
        };
        self.state.todos.remove(index);
        self.changed(StoreEvent::TodoDeleted { id: id.to_string() });
        true
    }

    pub fn update_settings(&mut self, patch: SettingsPatch) {
        patch.apply(&mut self.state.settings);
        self.changed(StoreEvent::SettingsUpdated);
    }

    /// Unconditional overwrite; any status may follow any other.
    pub fn set_save_status(&mut self, status: SaveStatus) {
        self.save_status = status;
        self.emit(StoreEvent::SaveStatusChanged(status));
    }

    /// Writes the whole snapshot if anything changed since the last write.
    ///
    /// A failed write leaves the store dirty and the status at `error`.
    pub fn commit(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        match self.backend.save(&self.state) {
            Ok(()) => {
                self.dirty = false;
                tracing::debug!(
                    notes = self.state.notes.len(),
                    todos = self.state.todos.len(),
                    "state snapshot written"
                );
                Ok(())
            }
            Err(err) => {
                tracing::error!(?err, backend = %self.backend.describe(), "state write failed");
                self.set_save_status(SaveStatus::Error);
                Err(err).with_context(|| format!("writing state to {}", self.backend.describe()))
            }
        }
    }

    fn changed(&mut self, event: StoreEvent) {
        self.dirty = true;
        self.emit(event);
    }

    fn emit(&mut self, event: StoreEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThemeName;
    use crate::storage::MemoryStorage;
    use assert_matches::assert_matches;

    fn open_store() -> anyhow::Result<(MemoryStorage, Store)> {
        let storage = MemoryStorage::new();
        let store = Store::open(Box::new(storage.clone()))?;
        Ok((storage, store))
    }

    fn note(title: &str) -> Note {
        Note::draft(title, "", &Settings::default())
    }

    #[test]
    fn empty_backend_starts_from_defaults() -> anyhow::Result<()> {
        let (_storage, store) = open_store()?;
        assert!(store.notes().is_empty());
        assert!(store.todos().is_empty());
        assert_eq!(store.settings(), &Settings::default());
        assert_eq!(store.save_status(), SaveStatus::Saved);
        assert!(!store.is_dirty());
        Ok(())
    }

    #[test]
    fn delete_keeps_remaining_notes_in_order() -> anyhow::Result<()> {
        let (_storage, mut store) = open_store()?;
        let notes: Vec<Note> = (0..5).map(|i| note(&format!("note {i}"))).collect();
        for note in &notes {
            store.add_note(note.clone())?;
        }

        assert!(store.delete_note(&notes[2].id));
        let titles: Vec<&str> = store.notes().iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["note 0", "note 1", "note 3", "note 4"]);

        assert!(!store.delete_note(&notes[2].id));
        assert_eq!(store.notes().len(), 4);
        Ok(())
    }

    #[test]
    fn update_of_unknown_note_changes_nothing() -> anyhow::Result<()> {
        let (_storage, mut store) = open_store()?;
        store.add_note(note("kept"))?;
        store.commit()?;
        let before = store.notes().to_vec();

        assert!(!store.update_note("missing", NotePatch::title("ghost")));
        assert_eq!(store.notes(), before.as_slice());
        assert!(!store.is_dirty());
        Ok(())
    }

    #[test]
    fn update_merges_only_supplied_fields() -> anyhow::Result<()> {
        let (_storage, mut store) = open_store()?;
        let mut original = note("draft");
        original.content = "<p>body</p>".into();
        original.font_family = "serif".into();
        let id = original.id.clone();
        store.add_note(original.clone())?;

        assert!(store.update_note(&id, NotePatch::title("final")));
        let updated = store.note(&id).expect("note present");
        assert_eq!(updated.title, "final");
        assert_eq!(updated.content, original.content);
        assert_eq!(updated.font_family, original.font_family);
        assert_eq!(updated.font_size, original.font_size);
        assert_eq!(updated.created_at, original.created_at);
        assert!(updated.updated_at >= original.updated_at);
        Ok(())
    }

    #[test]
    fn duplicate_ids_are_rejected() -> anyhow::Result<()> {
        let (_storage, mut store) = open_store()?;
        let first = note("one");
        let mut clash = note("two");
        clash.id = first.id.clone();
        store.add_note(first)?;

        assert_matches!(
            store.add_note(clash),
            Err(StoreError::DuplicateId { kind: EntityKind::Note, .. })
        );
        assert_eq!(store.notes().len(), 1);
        assert_eq!(store.notes()[0].title, "one");

        let todo = Todo::new("walk", None);
        store.add_todo(todo.clone())?;
        assert_matches!(
            store.add_todo(todo),
            Err(StoreError::DuplicateId { kind: EntityKind::Todo, .. })
        );
        Ok(())
    }

    #[test]
    fn todo_mutators_merge_and_delete() -> anyhow::Result<()> {
        let (_storage, mut store) = open_store()?;
        let todo = Todo::new("buy milk", None);
        let id = todo.id.clone();
        store.add_todo(todo)?;

        assert!(store.update_todo(&id, TodoPatch::completed(true)));
        let stored = store.todo(&id).expect("todo present");
        assert!(stored.completed);
        assert_eq!(stored.title, "buy milk");

        assert!(!store.update_todo("nope", TodoPatch::completed(false)));
        assert!(store.delete_todo(&id));
        assert!(store.todos().is_empty());
        Ok(())
    }

    #[test]
    fn settings_patch_is_shallow() -> anyhow::Result<()> {
        let (_storage, mut store) = open_store()?;
        store.update_settings(SettingsPatch {
            theme: Some(ThemeName::Dracula),
            ..SettingsPatch::default()
        });
        let settings = store.settings();
        assert_eq!(settings.theme, ThemeName::Dracula);
        assert_eq!(settings.default_font_family, "sans-serif");
        assert!(settings.notifications);
        Ok(())
    }

    #[test]
    fn commit_round_trips_state_and_skips_clean_writes() -> anyhow::Result<()> {
        let (storage, mut store) = open_store()?;
        store.add_note(note("alpha"))?;
        store.add_note(note("beta"))?;
        store.add_todo(Todo::new("gamma", None))?;
        store.set_save_status(SaveStatus::Saving);
        store.commit()?;
        store.commit()?;
        assert_eq!(storage.writes(), 1);

        let reopened = Store::open(Box::new(storage.clone()))?;
        assert_eq!(reopened.snapshot(), store.snapshot());
        assert_eq!(reopened.save_status(), SaveStatus::Saved);
        Ok(())
    }

    #[test]
    fn failed_commit_marks_error_and_stays_dirty() -> anyhow::Result<()> {
        let (storage, mut store) = open_store()?;
        store.add_note(note("unsaved"))?;
        storage.fail_writes(true);

        assert!(store.commit().is_err());
        assert_eq!(store.save_status(), SaveStatus::Error);
        assert!(store.is_dirty());

        storage.fail_writes(false);
        store.commit()?;
        assert!(!store.is_dirty());
        assert_eq!(storage.writes(), 1);
        Ok(())
    }

    #[test]
    fn subscribers_see_events_in_dispatch_order() -> anyhow::Result<()> {
        let (_storage, mut store) = open_store()?;
        let events = store.subscribe();
        let dropped = store.subscribe();
        drop(dropped);

        let first = note("first");
        let id = first.id.clone();
        store.add_note(first)?;
        store.update_note(&id, NotePatch::content("x"));
        store.set_save_status(SaveStatus::Saving);
        store.delete_note(&id);

        let received: Vec<StoreEvent> = events.try_iter().collect();
        assert_eq!(
            received,
            vec![
                StoreEvent::NoteAdded { id: id.clone() },
                StoreEvent::NoteUpdated { id: id.clone() },
                StoreEvent::SaveStatusChanged(SaveStatus::Saving),
                StoreEvent::NoteDeleted { id },
            ]
        );
        assert_eq!(store.subscribers.len(), 1);
        Ok(())
    }
}
