pub mod events;

pub use events::{NotificationEvent, NotificationKind, RecipientKind};
