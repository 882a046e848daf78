use serde::{Deserialize, Serialize};
use strum::Display;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::ThemeName;

pub const UNTITLED_NOTE: &str = "Untitled Note";

pub fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    /// Rich text, stored as markup.
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub font_family: String,
    pub font_size: String,
}

impl Note {
    /// A new note with a fresh id, using the font defaults from `settings`.
    pub fn draft(title: &str, content: &str, settings: &Settings) -> Self {
        let now = OffsetDateTime::now_utc();
        let title = title.trim();
        Self {
            id: fresh_id(),
            title: if title.is_empty() {
                UNTITLED_NOTE.to_string()
            } else {
                title.to_string()
            },
            content: content.to_string(),
            created_at: now,
            updated_at: now,
            font_family: settings.default_font_family.clone(),
            font_size: settings.default_font_size.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: String,
    pub title: String,
    pub completed: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Todo {
    pub fn new(title: &str, due_date: Option<OffsetDateTime>) -> Self {
        Self {
            id: fresh_id(),
            title: title.to_string(),
            completed: false,
            due_date,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn is_overdue(&self, now: OffsetDateTime) -> bool {
        !self.completed && self.due_date.map(|due| due <= now).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub theme: ThemeName,
    pub default_font_family: String,
    pub default_font_size: String,
    pub notifications: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: ThemeName::Light,
            default_font_family: "sans-serif".to_string(),
            default_font_size: "16px".to_string(),
            notifications: true,
        }
    }
}

/// Durability state of the most recent edit. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SaveStatus {
    #[default]
    Saved,
    Saving,
    Error,
}

/// Everything that goes into the durable record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub notes: Vec<Note>,
    pub todos: Vec<Todo>,
    pub settings: Settings,
}

impl Snapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub font_family: Option<String>,
    pub font_size: Option<String>,
    /// Explicit modification time; "now" when absent.
    pub updated_at: Option<OffsetDateTime>,
}

impl NotePatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.font_family.is_none()
            && self.font_size.is_none()
            && self.updated_at.is_none()
    }

    /// Shallow merge into `note`. `updated_at` never moves backwards and
    /// never precedes `created_at`.
    pub fn apply(self, note: &mut Note, now: OffsetDateTime) {
        if let Some(title) = self.title {
            note.title = title;
        }
        if let Some(content) = self.content {
            note.content = content;
        }
        if let Some(font_family) = self.font_family {
            note.font_family = font_family;
        }
        if let Some(font_size) = self.font_size {
            note.font_size = font_size;
        }
        let touched = self.updated_at.unwrap_or(now);
        note.updated_at = touched.max(note.updated_at).max(note.created_at);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoPatch {
    pub title: Option<String>,
    pub completed: Option<bool>,
    /// `Some(None)` clears the due date.
    pub due_date: Option<Option<OffsetDateTime>>,
}

impl TodoPatch {
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }

    pub fn apply(self, todo: &mut Todo) {
        if let Some(title) = self.title {
            todo.title = title;
        }
        if let Some(completed) = self.completed {
            todo.completed = completed;
        }
        if let Some(due_date) = self.due_date {
            todo.due_date = due_date;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub theme: Option<ThemeName>,
    pub default_font_family: Option<String>,
    pub default_font_size: Option<String>,
    pub notifications: Option<bool>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.theme.is_none()
            && self.default_font_family.is_none()
            && self.default_font_size.is_none()
            && self.notifications.is_none()
    }

    pub fn apply(self, settings: &mut Settings) {
        if let Some(theme) = self.theme {
            settings.theme = theme;
        }
        if let Some(family) = self.default_font_family {
            settings.default_font_family = family;
        }
        if let Some(size) = self.default_font_size {
            settings.default_font_size = size;
        }
        if let Some(notifications) = self.notifications {
            settings.notifications = notifications;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn note_json_uses_camel_case_keys() -> anyhow::Result<()> {
        let note = Note {
            id: "n1".into(),
            title: "Groceries".into(),
            content: "<p>milk</p>".into(),
            created_at: datetime!(2024-03-01 09:00 UTC),
            updated_at: datetime!(2024-03-01 09:30 UTC),
            font_family: "serif".into(),
            font_size: "18px".into(),
        };
        let json = serde_json::to_value(&note)?;
        assert_eq!(json["createdAt"], "2024-03-01T09:00:00Z");
        assert_eq!(json["fontFamily"], "serif");
        assert_eq!(json["fontSize"], "18px");
        Ok(())
    }

    #[test]
    fn todo_accepts_null_or_missing_due_date() -> anyhow::Result<()> {
        let with_null: Todo = serde_json::from_str(
            r#"{"id":"t1","title":"a","completed":false,"dueDate":null,"createdAt":"2024-01-01T00:00:00.000Z"}"#,
        )?;
        assert_eq!(with_null.due_date, None);
        let missing: Todo = serde_json::from_str(
            r#"{"id":"t2","title":"b","completed":true,"createdAt":"2024-01-01T00:00:00Z"}"#,
        )?;
        assert_eq!(missing.due_date, None);
        assert!(missing.completed);
        Ok(())
    }

    #[test]
    fn note_patch_never_moves_updated_at_backwards() {
        let mut note = Note::draft("t", "", &Settings::default());
        let before = note.updated_at;
        NotePatch {
            updated_at: Some(datetime!(2000-01-01 00:00 UTC)),
            ..NotePatch::content("new")
        }
        .apply(&mut note, OffsetDateTime::now_utc());
        assert_eq!(note.content, "new");
        assert!(note.updated_at >= before);
    }

    #[test]
    fn draft_falls_back_to_untitled_and_settings_fonts() {
        let settings = Settings {
            default_font_family: "monospace".into(),
            default_font_size: "14px".into(),
            ..Settings::default()
        };
        let note = Note::draft("   ", "", &settings);
        assert_eq!(note.title, UNTITLED_NOTE);
        assert_eq!(note.font_family, "monospace");
        assert_eq!(note.font_size, "14px");
        assert_eq!(note.created_at, note.updated_at);
    }

    #[test]
    fn overdue_ignores_completed_and_undated_todos() {
        let now = datetime!(2024-05-01 12:00 UTC);
        let mut todo = Todo::new("pay rent", Some(datetime!(2024-05-01 08:00 UTC)));
        assert!(todo.is_overdue(now));
        todo.completed = true;
        assert!(!todo.is_overdue(now));
        assert!(!Todo::new("someday", None).is_overdue(now));
    }

    #[test]
    fn todo_titles_are_stored_as_typed() {
        let todo = Todo::new("  water plants ", None);
        assert_eq!(todo.title, "  water plants ");
        assert!(!todo.completed);
        assert!(todo.due_date.is_none());
    }
}
