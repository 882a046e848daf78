use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use time::OffsetDateTime;

use crate::archive::{self, ImportReport};
use crate::config::AppConfig;
use crate::journaling::{flush_or_fail, AutoSave, AutoSaveEvent};
use crate::pomodoro::Pomodoro;
use crate::storage::SnapshotBackend;
use crate::store::{Note, NotePatch, SaveStatus, SettingsPatch, Store, Todo, TodoPatch};

/// One session over the store: user intents come in here, get applied to the
/// store, and are written through (or debounced, for editor keystrokes).
pub struct App {
    pub config: Arc<AppConfig>,
    store: Store,
    auto_save: AutoSave,
}

impl App {
    pub fn new(config: Arc<AppConfig>, backend: Box<dyn SnapshotBackend>) -> Result<Self> {
        let store = Store::open(backend).context("opening state store")?;
        let auto_save = AutoSave::new(&config.autosave);
        Ok(Self {
            config,
            store,
            auto_save,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn save_status(&self) -> SaveStatus {
        self.store.save_status()
    }

    pub fn create_note(&mut self, title: &str, content: &str) -> Result<String> {
        let note = Note::draft(title, content, self.store.settings());
        let id = note.id.clone();
        self.store.add_note(note)?;
        self.write_through()?;
        tracing::info!(%id, "note created");
        Ok(id)
    }

    /// Immediate, written-through update. Returns false for unknown ids.
    pub fn update_note(&mut self, id: &str, patch: NotePatch) -> Result<bool> {
        if !self.store.update_note(id, patch) {
            return Ok(false);
        }
        self.write_through()?;
        Ok(true)
    }

    pub fn edit_note(&mut self, id: &str, patch: NotePatch) -> bool {
        self.edit_note_at(id, patch, Instant::now())
    }

    /// Editor keystroke: memory is updated now, the write is debounced.
    pub fn edit_note_at(&mut self, id: &str, patch: NotePatch, now: Instant) -> bool {
        if !self.store.update_note(id, patch) {
            return false;
        }
        self.auto_save.record_edit_at(&mut self.store, now);
        true
    }

    pub fn delete_note(&mut self, id: &str) -> Result<bool> {
        if !self.store.delete_note(id) {
            return Ok(false);
        }
        self.write_through()?;
        tracing::info!(id, "note deleted");
        Ok(true)
    }

    pub fn add_todo(&mut self, title: &str, due_date: Option<OffsetDateTime>) -> Result<String> {
        if title.trim().is_empty() {
            bail!("todo title cannot be empty");
        }
        let todo = Todo::new(title, due_date);
        let id = todo.id.clone();
        self.store.add_todo(todo)?;
        self.write_through()?;
        Ok(id)
    }

    pub fn set_todo_completed(&mut self, id: &str, completed: bool) -> Result<bool> {
        if !self.store.update_todo(id, TodoPatch::completed(completed)) {
            return Ok(false);
        }
        self.write_through()?;
        Ok(true)
    }

    /// Flips completion and returns the new flag, or `None` for unknown ids.
    pub fn toggle_todo(&mut self, id: &str) -> Result<Option<bool>> {
        let Some(completed) = self.store.todo(id).map(|todo| !todo.completed) else {
            return Ok(None);
        };
        self.set_todo_completed(id, completed)?;
        Ok(Some(completed))
    }

    pub fn delete_todo(&mut self, id: &str) -> Result<bool> {
        if !self.store.delete_todo(id) {
            return Ok(false);
        }
        self.write_through()?;
        Ok(true)
    }

    pub fn update_settings(&mut self, patch: SettingsPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        self.store.update_settings(patch);
        self.write_through()
    }

    pub fn export_notes(&self, path: &Path) -> Result<usize> {
        archive::export_to_path(self.store.notes(), path, &self.config.export.extension)
    }

    pub fn import_notes(&mut self, path: &Path) -> Result<ImportReport> {
        let report = archive::import_from_path(&mut self.store, path, &self.config.export.extension)?;
        self.write_through()?;
        Ok(report)
    }

    /// Incomplete, overdue todos, or nothing when notifications are off.
    pub fn reminders(&self, now: OffsetDateTime) -> Vec<Todo> {
        if !self.store.settings().notifications {
            return Vec::new();
        }
        self.store.due_todos(now).into_iter().cloned().collect()
    }

    pub fn notifications_enabled(&self) -> bool {
        self.store.settings().notifications
    }

    /// A fresh countdown using the configured durations.
    pub fn pomodoro(&self) -> Pomodoro {
        Pomodoro::new(self.config.pomodoro.durations())
    }

    pub fn poll(&mut self) -> Option<AutoSaveEvent> {
        self.poll_at(Instant::now())
    }

    pub fn poll_at(&mut self, now: Instant) -> Option<AutoSaveEvent> {
        let event = self.auto_save.poll_at(&mut self.store, now);
        if let Some(AutoSaveEvent::Error { message, .. }) = &event {
            tracing::error!(%message, "autosave tick errored");
        }
        event
    }

    /// Flushes pending edits and tears down the debounce timer.
    pub fn close(mut self) -> Result<()> {
        let result = flush_or_fail(&mut self.auto_save, &mut self.store);
        self.auto_save.cancel();
        result
    }

    /// Commits now. A debounced edit still waiting keeps the status at
    /// `saving`; otherwise the store is `saved`, clearing any earlier error.
    fn write_through(&mut self) -> Result<()> {
        self.store.commit()?;
        let settled = if self.auto_save.is_pending() {
            SaveStatus::Saving
        } else {
            SaveStatus::Saved
        };
        if self.store.save_status() != settled {
            self.store.set_save_status(settled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThemeName;
    use crate::storage::{MemoryStorage, SnapshotBackend};
    use assert_matches::assert_matches;
    use std::time::Duration;
    use time::macros::datetime;

    fn app() -> anyhow::Result<(MemoryStorage, App)> {
        let storage = MemoryStorage::new();
        let app = App::new(Arc::new(AppConfig::default()), Box::new(storage.clone()))?;
        Ok((storage, app))
    }

    #[test]
    fn structural_changes_write_through_immediately() -> anyhow::Result<()> {
        let (storage, mut app) = app()?;
        let note_id = app.create_note("Plan", "")?;
        assert_eq!(storage.writes(), 1);
        let todo_id = app.add_todo("ship it", None)?;
        assert_eq!(storage.writes(), 2);
        assert_eq!(app.toggle_todo(&todo_id)?, Some(true));
        assert!(app.delete_note(&note_id)?);
        app.update_settings(SettingsPatch {
            theme: Some(ThemeName::Nord),
            ..SettingsPatch::default()
        })?;
        assert_eq!(storage.writes(), 5);

        let persisted = storage.load()?.expect("record present");
        assert!(persisted.notes.is_empty());
        assert!(persisted.todos[0].completed);
        assert_eq!(persisted.settings.theme, ThemeName::Nord);
        Ok(())
    }

    #[test]
    fn unknown_ids_do_not_write() -> anyhow::Result<()> {
        let (storage, mut app) = app()?;
        assert!(!app.update_note("nope", NotePatch::title("x"))?);
        assert!(!app.delete_note("nope")?);
        assert!(!app.delete_todo("nope")?);
        assert_eq!(app.toggle_todo("nope")?, None);
        assert!(!app.edit_note("nope", NotePatch::content("x")));
        assert_eq!(storage.writes(), 0);
        assert_eq!(app.save_status(), SaveStatus::Saved);
        Ok(())
    }

    #[test]
    fn editor_edits_are_debounced_and_flushed_on_close() -> anyhow::Result<()> {
        let (storage, mut app) = app()?;
        let id = app.create_note("Draft", "")?;
        let t0 = Instant::now();

        assert!(app.edit_note_at(&id, NotePatch::content("h"), t0));
        assert!(app.edit_note_at(&id, NotePatch::content("hi"), t0 + Duration::from_millis(300)));
        assert_eq!(app.save_status(), SaveStatus::Saving);
        assert!(app.poll_at(t0 + Duration::from_millis(1000)).is_none());
        assert_eq!(storage.writes(), 1);

        assert!(app.edit_note_at(&id, NotePatch::content("hi!"), t0 + Duration::from_millis(1100)));
        app.close()?;
        assert_eq!(storage.writes(), 2);
        let persisted = storage.load()?.expect("record present");
        assert_eq!(persisted.notes[0].content, "hi!");
        Ok(())
    }

    #[test]
    fn failed_write_through_keeps_changes_for_close() -> anyhow::Result<()> {
        let (storage, mut app) = app()?;
        storage.fail_writes(true);
        assert!(app.create_note("Unsaved", "body").is_err());
        assert_eq!(app.save_status(), SaveStatus::Error);
        assert!(app.store().is_dirty());
        assert_eq!(app.store().notes().len(), 1);
        assert_eq!(storage.writes(), 0);

        storage.fail_writes(false);
        app.close()?;
        assert_eq!(storage.writes(), 1);
        let persisted = storage.load()?.expect("record present");
        assert_eq!(persisted.notes[0].title, "Unsaved");
        Ok(())
    }

    #[test]
    fn successful_write_through_clears_an_autosave_error() -> anyhow::Result<()> {
        let (storage, mut app) = app()?;
        let id = app.create_note("Draft", "")?;
        let t0 = Instant::now();
        assert!(app.edit_note_at(&id, NotePatch::content("typed"), t0));

        storage.fail_writes(true);
        let failed = app.poll_at(t0 + Duration::from_millis(1000));
        assert_matches!(failed, Some(AutoSaveEvent::Error { .. }));
        assert_eq!(app.save_status(), SaveStatus::Error);

        storage.fail_writes(false);
        app.add_todo("retry", None)?;
        assert_eq!(storage.writes(), 2);
        assert_eq!(app.save_status(), SaveStatus::Saving);
        let persisted = storage.load()?.expect("record present");
        assert_eq!(persisted.notes[0].content, "typed");

        let retried = app.poll_at(t0 + Duration::from_millis(2000));
        assert_matches!(retried, Some(AutoSaveEvent::Saved { .. }));
        assert_eq!(app.save_status(), SaveStatus::Saved);
        assert_eq!(storage.writes(), 2);
        app.close()
    }

    #[test]
    fn new_notes_use_settings_font_defaults() -> anyhow::Result<()> {
        let (_storage, mut app) = app()?;
        app.update_settings(SettingsPatch {
            default_font_family: Some("monospace".into()),
            default_font_size: Some("20px".into()),
            ..SettingsPatch::default()
        })?;
        let id = app.create_note("", "")?;
        let note = app.store().note(&id).expect("note present");
        assert_eq!(note.title, "Untitled Note");
        assert_eq!(note.font_family, "monospace");
        assert_eq!(note.font_size, "20px");
        Ok(())
    }

    #[test]
    fn blank_todo_titles_are_refused() -> anyhow::Result<()> {
        let (storage, mut app) = app()?;
        assert!(app.add_todo("   ", None).is_err());
        assert!(app.store().todos().is_empty());
        assert_eq!(storage.writes(), 0);
        Ok(())
    }

    #[test]
    fn reminders_follow_the_notifications_setting() -> anyhow::Result<()> {
        let (_storage, mut app) = app()?;
        app.add_todo("overdue", Some(datetime!(2024-01-01 09:00 UTC)))?;
        app.add_todo("later", Some(datetime!(2030-01-01 09:00 UTC)))?;
        let now = datetime!(2024-06-01 00:00 UTC);

        let due = app.reminders(now);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].title, "overdue");

        app.update_settings(SettingsPatch {
            notifications: Some(false),
            ..SettingsPatch::default()
        })?;
        assert!(app.reminders(now).is_empty());
        Ok(())
    }

    #[test]
    fn pomodoro_uses_configured_durations() -> anyhow::Result<()> {
        let storage = MemoryStorage::new();
        let mut config = AppConfig::default();
        config.pomodoro.work_minutes = 45;
        let app = App::new(Arc::new(config), Box::new(storage))?;
        assert_eq!(app.pomodoro().remaining(), 45 * 60);
        Ok(())
    }
}
