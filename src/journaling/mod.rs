pub mod autosave;

pub use autosave::{flush_or_fail, AutoSave, AutoSaveEvent, PendingWrite};
