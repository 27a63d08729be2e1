//! # potluck-core
//!
//! Cross-user social state on top of a [`DocumentStore`](potluck_store::DocumentStore):
//!
//! - [`FriendGraph`]: friend requests and symmetric friend lists.
//! - [`SharingExchange`]: recipe shares mirrored into the sender's and the recipient's subtrees.
//! - [`NotificationCoordinator`]: new-share detection on the recipient's live feed.
//! - [`UserDirectory`]: the user lookups the above depend on.
//!
//! Only friend acceptance and unfriending are atomic; everything else that spans two users is
//! eventually consistent and documented where it happens.

mod error;
pub mod friends;
pub mod notifications;
mod paths;
pub mod sharing;
pub mod users;

pub use error::{Error, Result};
pub use friends::FriendGraph;
pub use notifications::{LocalNotification, NotificationCoordinator, Notifier, Phase};
pub use sharing::SharingExchange;
pub use users::UserDirectory;
