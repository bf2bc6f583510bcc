//! Services module
//!
//! Business logic services that coordinate between commands, the local
//! cache and the remote store.

pub mod credentials;
pub mod navigation;
pub mod notes;
pub mod reminders;
pub mod settings;
pub mod sync;

pub use credentials::{Credentials, KeyringCredentials, StaticCredentials};
pub use navigation::{visible_entities, Navigator, SortOrder};
pub use notes::{EngineOptions, NotesService};
pub use reminders::{LogNotifier, Notifier, ReminderTask, RemindersService};
pub use settings::{AppSettings, ReminderSettings, ServerSettings, SettingsService};
pub use sync::SyncReport;
