//! Terminal presenter
//!
//! Renders chat activity as plain lines on stdout. This is the only place
//! rendering happens; the sync core just pushes ordered adds through the
//! `Presenter` trait.

use chrono::Local;

use palaver_core::{Message, Presenter, User};

/// Line-oriented presenter for the interactive chat
#[derive(Default)]
pub struct TerminalPresenter;

impl TerminalPresenter {
    pub fn new() -> Self {
        Self
    }
}

impl Presenter for TerminalPresenter {
    fn on_user_added(&mut self, user: &User) {
        println!("* {} is here", user.email);
    }

    fn on_message_added(&mut self, message: &Message) {
        // Author placeholder when the user record isn't known locally
        let sender = message.author_email().unwrap_or("anonymous");
        let sent = message.created_at.with_timezone(&Local);
        println!("[{}] {}: {}", sent.format("%b %e, %H:%M:%S"), sender, message.text);
    }

    fn on_session_cleared(&mut self) {
        println!("* signed out");
    }

    fn on_session_error(&mut self, reason: &str) {
        eprintln!("* session error: {}", reason);
    }
}
