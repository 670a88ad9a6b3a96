//! Presenter boundary
//!
//! The sync core pushes ordered view updates through this trait and never
//! touches a rendering surface itself. Implementations live outside the
//! core (the CLI ships a terminal presenter).

use crate::models::{Message, User};

/// Consumer of ordered users and messages
///
/// Calls arrive on the sync core's task, in view-insertion order. A
/// message whose author is not in the local user set should be rendered
/// with a placeholder; the core does not wait for author resolution.
pub trait Presenter: Send + 'static {
    /// A user entered the local view
    fn on_user_added(&mut self, user: &User);

    /// A message entered the local view
    fn on_message_added(&mut self, message: &Message);

    /// The session ended; discard all rendered state
    fn on_session_cleared(&mut self);

    /// The session failed with a human-readable reason
    fn on_session_error(&mut self, reason: &str);
}
