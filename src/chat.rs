use std::time::{SystemTime, UNIX_EPOCH};

use log::{info, warn};
use thiserror::Error;

use crate::connection::{ConnectionError, ConnectionManager};
use crate::models::messages::ClientEvent;
use crate::models::session::ChatMessage;

/// Longest message the channel will accept.
pub const MAX_MESSAGE_LEN: usize = 500;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no active session")]
    NoActiveSession,
    #[error("message is empty")]
    EmptyMessage,
    #[error("message exceeds {MAX_MESSAGE_LEN} characters")]
    TooLong,
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Append-only chat log scoped to the active session. Opening a new scope
/// drops the previous session's log; closing keeps the log readable until
/// the next session starts.
pub struct ChatChannel {
    scope: Option<String>,
    log: Vec<ChatMessage>,
}

impl Default for ChatChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatChannel {
    pub fn new() -> Self {
        ChatChannel {
            scope: None,
            log: Vec::new(),
        }
    }

    pub fn open(&mut self, session_id: &str) {
        self.scope = Some(session_id.to_string());
        self.log.clear();
    }

    pub fn close(&mut self) {
        self.scope = None;
    }

    pub fn log(&self) -> &[ChatMessage] {
        &self.log
    }

    /// Send one message into the active session. Rejected locally when no
    /// session is active.
    pub fn send(&mut self, conn: &mut ConnectionManager, text: &str) -> Result<(), ChatError> {
        let session_id = self.scope.as_ref().ok_or(ChatError::NoActiveSession)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if text.chars().count() > MAX_MESSAGE_LEN {
            return Err(ChatError::TooLong);
        }
        conn.send_event(&ClientEvent::SendChat {
            session_id: session_id.clone(),
            text: text.to_string(),
        })?;
        Ok(())
    }

    /// A message arrived. Dropped when no session is active: the channel is
    /// confined to a live session.
    pub fn on_received(&mut self, sender: &str, text: &str) {
        if self.scope.is_none() {
            warn!("dropping chat from {} with no active session", sender);
            return;
        }
        info!("chat from {}: {}", sender, text);
        self.log.push(ChatMessage {
            sender: sender.to_string(),
            text: text.to_string(),
            timestamp_ms: unix_millis(),
        });
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::connected_manager;

    #[test]
    fn send_requires_an_active_session() {
        let (mut conn, handle) = connected_manager();
        let mut chat = ChatChannel::new();
        let err = chat.send(&mut conn, "hello").unwrap_err();
        assert!(matches!(err, ChatError::NoActiveSession));
        assert!(handle.sent().is_empty());
    }

    #[test]
    fn send_carries_the_session_scope() {
        let (mut conn, handle) = connected_manager();
        let mut chat = ChatChannel::new();
        chat.open("s1");
        chat.send(&mut conn, "good luck").unwrap();
        let sent = handle.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("send-chat"));
        assert!(sent[0].contains("\"sessionId\":\"s1\""));
    }

    #[test]
    fn blank_and_oversized_messages_are_rejected() {
        let (mut conn, handle) = connected_manager();
        let mut chat = ChatChannel::new();
        chat.open("s1");
        assert!(matches!(
            chat.send(&mut conn, "   ").unwrap_err(),
            ChatError::EmptyMessage
        ));
        let oversized = "x".repeat(MAX_MESSAGE_LEN + 1);
        assert!(matches!(
            chat.send(&mut conn, &oversized).unwrap_err(),
            ChatError::TooLong
        ));
        assert!(handle.sent().is_empty());
    }

    #[test]
    fn received_messages_append_in_order() {
        let mut chat = ChatChannel::new();
        chat.open("s1");
        chat.on_received("bob", "hi");
        chat.on_received("alice", "hi back");
        assert_eq!(chat.log().len(), 2);
        assert_eq!(chat.log()[0].sender, "bob");
        assert_eq!(chat.log()[1].text, "hi back");
    }

    #[test]
    fn messages_outside_a_session_are_dropped() {
        let mut chat = ChatChannel::new();
        chat.on_received("bob", "anyone there?");
        assert!(chat.log().is_empty());

        chat.open("s1");
        chat.on_received("bob", "hi");
        chat.close();
        chat.on_received("bob", "late");
        assert_eq!(chat.log().len(), 1);
    }

    #[test]
    fn opening_a_new_scope_clears_the_old_log() {
        let mut chat = ChatChannel::new();
        chat.open("s1");
        chat.on_received("bob", "hi");
        chat.open("s2");
        assert!(chat.log().is_empty());
    }
}
