use std::time::{Duration, Instant};

use log::{info, warn};

use crate::chat::{ChatChannel, ChatError};
use crate::connection::{
    ConnectionError, ConnectionManager, ConnectionNotice, ConnectionStatus, Transport,
};
use crate::game::rules::{self, Position};
use crate::game::session::{GameSession, MoveError, SessionState};
use crate::matchmaking::{MatchmakingController, MatchmakingError, MatchmakingState, PlayerProfile};
use crate::models::messages::ServerEvent;
use crate::models::session::{ChatMessage, MoveRecord, PromotionPiece, SessionResult};

/// How long a transient notice stays visible.
pub const NOTICE_TTL: Duration = Duration::from_secs(5);

/// A transient user-visible notice ("move rejected: ...").
#[derive(Debug, Clone)]
pub struct Notice {
    text: String,
    raised_at: Instant,
}

impl Notice {
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Holds notices until they expire. Expiry is by sweep so the UI decides
/// when to refresh.
#[derive(Debug, Default)]
pub struct NoticeBoard {
    entries: Vec<Notice>,
}

impl NoticeBoard {
    fn raise(&mut self, text: impl Into<String>) {
        self.entries.push(Notice {
            text: text.into(),
            raised_at: Instant::now(),
        });
    }

    fn sweep_at(&mut self, now: Instant) {
        self.entries
            .retain(|n| now.duration_since(n.raised_at) < NOTICE_TTL);
    }

    pub fn sweep(&mut self) {
        self.sweep_at(Instant::now());
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|n| n.text.as_str())
    }
}

/// The client-side session subsystem behind one façade: the connection
/// manager, matchmaking controller, game session state machine, and chat
/// channel, plus the notice board the UI renders from.
///
/// Each server event belongs to exactly one component; `handle_incoming`
/// routes it there, in arrival order.
pub struct ChessClient {
    connection: ConnectionManager,
    matchmaking: MatchmakingController,
    session: GameSession,
    chat: ChatChannel,
    notices: NoticeBoard,
    profile: PlayerProfile,
}

impl ChessClient {
    pub fn new(transport: Box<dyn Transport>, profile: PlayerProfile) -> Self {
        ChessClient {
            connection: ConnectionManager::new(transport),
            matchmaking: MatchmakingController::new(),
            session: GameSession::new(),
            chat: ChatChannel::new(),
            notices: NoticeBoard::default(),
            profile,
        }
    }

    // --- connection lifecycle -------------------------------------------

    pub fn connect(&mut self) -> Result<(), ConnectionError> {
        self.connection.connect()?;
        self.pump_connection_notices();
        Ok(())
    }

    pub fn on_transport_lost(&mut self) {
        self.connection.on_transport_lost();
        self.pump_connection_notices();
    }

    pub fn next_retry_delay(&mut self) -> Option<Duration> {
        self.connection.next_retry_delay()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Connection notices are consumed before any event payloads, so a
    /// `Reconnected` is always observed ahead of the replayed session events
    /// that follow it.
    fn pump_connection_notices(&mut self) {
        while let Some(notice) = self.connection.pop_notice() {
            match notice {
                ConnectionNotice::StatusChanged(status) => {
                    info!("connection status: {:?}", status);
                    if status == ConnectionStatus::Disconnected {
                        self.notices.raise("connection lost, reconnecting");
                    }
                }
                ConnectionNotice::Reconnected => {
                    self.session.on_reconnected();
                    self.notices.raise("reconnected, resynchronizing");
                }
            }
        }
    }

    // --- inbound events -------------------------------------------------

    /// Handle one raw frame from the transport. Malformed payloads are
    /// logged and dropped; they are never fatal.
    pub fn handle_incoming(&mut self, raw: &str) {
        self.pump_connection_notices();
        match serde_json::from_str::<ServerEvent>(raw) {
            Ok(event) => self.handle_event(event),
            Err(e) => warn!("ignoring unparseable event: {}", e),
        }
    }

    pub fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::WaitingForOpponent {} => {
                self.matchmaking.on_waiting();
            }
            ServerEvent::MatchFound(data) => {
                if let Some(session) = self.matchmaking.on_match_found(data) {
                    self.chat.open(&session.id);
                    self.session.begin(session);
                }
            }
            ServerEvent::SessionResumed(data) => {
                self.matchmaking.on_session_resumed();
                let session_id = data.session_id.clone();
                self.session.resume(data);
                if matches!(self.session.state(), SessionState::Active(_)) {
                    self.chat.open(&session_id);
                } else {
                    self.notices.raise("session could not be resumed");
                }
            }
            ServerEvent::MoveConfirmed(data) => {
                self.session.on_move_confirmed(data);
            }
            ServerEvent::MoveRejected { reason } => {
                self.session.on_move_rejected(&reason);
                self.notices.raise(format!("move rejected: {}", reason));
            }
            ServerEvent::SessionEnded(data) => {
                self.session.on_session_ended(data);
                self.chat.close();
                if let Some(result) = self.session.result() {
                    self.notices.raise(format!("game over: {}", result.summary()));
                }
            }
            ServerEvent::OpponentDisconnected { disconnected_player } => {
                self.notices.raise(format!(
                    "{} disconnected, waiting for them to return",
                    disconnected_player.display_name
                ));
                self.session.on_opponent_disconnected(&disconnected_player);
            }
            ServerEvent::ChatReceived { sender, text } => {
                self.chat.on_received(&sender, &text);
            }
        }
    }

    // --- user actions ---------------------------------------------------

    pub fn find_opponent(&mut self) -> Result<(), MatchmakingError> {
        self.matchmaking.search(&mut self.connection, &self.profile)?;
        self.session.on_search_started();
        Ok(())
    }

    pub fn cancel_search(&mut self) -> Result<(), MatchmakingError> {
        self.matchmaking.cancel(&mut self.connection)?;
        self.session.on_search_cancelled();
        Ok(())
    }

    pub fn submit_move(
        &mut self,
        from: &str,
        to: &str,
        promotion: Option<PromotionPiece>,
    ) -> Result<(), MoveError> {
        self.session
            .submit_move(&mut self.connection, from, to, promotion)
    }

    /// Legal destinations for the piece on `from`, computed against the
    /// displayed position.
    pub fn move_hints(&self, from: &str) -> Result<Vec<String>, MoveError> {
        let position = self
            .session
            .displayed_position()
            .ok_or(MoveError::NoActiveSession)?;
        Ok(rules::moves_from(position, from)?)
    }

    /// Ask the server to end the game in the opponent's favor. The session
    /// stays active until the authoritative session-ended arrives.
    pub fn resign(&mut self) -> Result<(), MoveError> {
        let session = match self.session.state() {
            SessionState::Active(active) => &active.session,
            _ => return Err(MoveError::NoActiveSession),
        };
        let event = crate::models::messages::ClientEvent::Resign {
            session_id: session.id.clone(),
        };
        self.connection.send_event(&event)?;
        info!("resignation sent for session {}", session.id);
        Ok(())
    }

    pub fn send_chat(&mut self, text: &str) -> Result<(), ChatError> {
        self.chat.send(&mut self.connection, text)
    }

    /// Leave a terminated session and return to the idle screen. Returns
    /// false while a game is still running.
    pub fn start_new_session(&mut self) -> bool {
        if !self.session.reset() {
            return false;
        }
        self.matchmaking.reset();
        self.chat.close();
        true
    }

    // --- read accessors -------------------------------------------------

    pub fn matchmaking_state(&self) -> MatchmakingState {
        self.matchmaking.state()
    }

    pub fn session_state(&self) -> &SessionState {
        self.session.state()
    }

    pub fn displayed_position(&self) -> Option<&Position> {
        self.session.displayed_position()
    }

    pub fn move_history(&self) -> &[MoveRecord] {
        self.session.move_history()
    }

    pub fn result(&self) -> Option<&SessionResult> {
        self.session.result()
    }

    pub fn chat_log(&self) -> &[ChatMessage] {
        self.chat.log()
    }

    pub fn notice_board(&mut self) -> &mut NoticeBoard {
        &mut self.notices
    }
}
