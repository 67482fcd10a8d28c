use log::{info, warn};
use thiserror::Error;
use uuid::Uuid;

use crate::connection::{ConnectionError, ConnectionManager};
use crate::models::messages::{ClientEvent, MatchFoundData};
use crate::models::session::{PlayerKind, Session};

/// Identity sent with a find-opponent request.
#[derive(Debug, Clone)]
pub struct PlayerProfile {
    pub kind: PlayerKind,
    pub display_name: String,
    pub player_id: Option<Uuid>,
}

impl PlayerProfile {
    pub fn guest(display_name: impl Into<String>) -> Self {
        PlayerProfile {
            kind: PlayerKind::Guest,
            display_name: display_name.into(),
            player_id: None,
        }
    }

    pub fn registered(display_name: impl Into<String>, player_id: Uuid) -> Self {
        PlayerProfile {
            kind: PlayerKind::Registered,
            display_name: display_name.into(),
            player_id: Some(player_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchmakingState {
    Idle,
    Searching,
    Matched,
}

#[derive(Debug, Error)]
pub enum MatchmakingError {
    #[error("a search is already in progress")]
    AlreadySearching,
    #[error("already matched into a session")]
    AlreadyMatched,
    #[error("no search in progress")]
    NotSearching,
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Drives the Idle -> Searching -> Matched transition. Once matched,
/// ownership passes to the game session state machine; `reset` brings the
/// controller back for the next game.
pub struct MatchmakingController {
    state: MatchmakingState,
}

impl Default for MatchmakingController {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchmakingController {
    pub fn new() -> Self {
        MatchmakingController {
            state: MatchmakingState::Idle,
        }
    }

    pub fn state(&self) -> MatchmakingState {
        self.state
    }

    /// Request an opponent. Valid only from Idle; the state only advances
    /// once the request is actually on the wire.
    pub fn search(
        &mut self,
        conn: &mut ConnectionManager,
        profile: &PlayerProfile,
    ) -> Result<(), MatchmakingError> {
        match self.state {
            MatchmakingState::Idle => {}
            MatchmakingState::Searching => return Err(MatchmakingError::AlreadySearching),
            MatchmakingState::Matched => return Err(MatchmakingError::AlreadyMatched),
        }
        conn.send_event(&ClientEvent::FindOpponent {
            player_kind: profile.kind,
            display_name: profile.display_name.clone(),
            player_id: profile.player_id,
        })?;
        info!("searching for an opponent as {}", profile.display_name);
        self.state = MatchmakingState::Searching;
        Ok(())
    }

    /// Cancel a pending search. A benign error from any other state.
    pub fn cancel(&mut self, conn: &mut ConnectionManager) -> Result<(), MatchmakingError> {
        if self.state != MatchmakingState::Searching {
            return Err(MatchmakingError::NotSearching);
        }
        conn.send_event(&ClientEvent::CancelSearch {})?;
        info!("search cancelled");
        self.state = MatchmakingState::Idle;
        Ok(())
    }

    /// Server acknowledged the search. Returns false when no search is
    /// pending (e.g. it was cancelled in the meantime).
    pub fn on_waiting(&mut self) -> bool {
        match self.state {
            MatchmakingState::Searching => {
                info!("queued, waiting for an opponent");
                true
            }
            _ => {
                info!("ignoring waiting-for-opponent while {:?}", self.state);
                false
            }
        }
    }

    /// A match arrived. Yields the assigned session, or `None` when the
    /// search was already cancelled: a late match notification tied to a
    /// cancelled search is suppressed, not surfaced.
    pub fn on_match_found(&mut self, data: MatchFoundData) -> Option<Session> {
        match self.state {
            MatchmakingState::Searching => {
                info!(
                    "matched into session {} as {}",
                    data.session_id, data.my_color
                );
                self.state = MatchmakingState::Matched;
                Some(Session::new(
                    data.session_id,
                    data.white_player,
                    data.black_player,
                    data.my_color,
                ))
            }
            _ => {
                warn!(
                    "suppressing match notification for session {} while {:?}",
                    data.session_id, self.state
                );
                None
            }
        }
    }

    /// A resume bypasses Searching entirely.
    pub fn on_session_resumed(&mut self) {
        self.state = MatchmakingState::Matched;
    }

    pub fn reset(&mut self) {
        self.state = MatchmakingState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::{Player, PlayerColor};
    use crate::test_util::connected_manager;

    fn match_data() -> MatchFoundData {
        MatchFoundData {
            session_id: "s1".to_string(),
            my_color: PlayerColor::White,
            white_player: Player {
                id: "p1".to_string(),
                display_name: "alice".to_string(),
                kind: PlayerKind::Guest,
            },
            black_player: Player {
                id: "p2".to_string(),
                display_name: "bob".to_string(),
                kind: PlayerKind::Registered,
            },
        }
    }

    #[test]
    fn search_sends_and_enters_searching() {
        let (mut conn, handle) = connected_manager();
        let mut controller = MatchmakingController::new();
        controller
            .search(&mut conn, &PlayerProfile::guest("alice"))
            .unwrap();
        assert_eq!(controller.state(), MatchmakingState::Searching);
        let sent = handle.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("find-opponent"));
        assert!(sent[0].contains("alice"));
    }

    #[test]
    fn duplicate_search_is_rejected_without_sending() {
        let (mut conn, handle) = connected_manager();
        let mut controller = MatchmakingController::new();
        controller
            .search(&mut conn, &PlayerProfile::guest("alice"))
            .unwrap();
        let err = controller
            .search(&mut conn, &PlayerProfile::guest("alice"))
            .unwrap_err();
        assert!(matches!(err, MatchmakingError::AlreadySearching));
        assert_eq!(handle.sent().len(), 1);
    }

    #[test]
    fn search_while_disconnected_stays_idle() {
        let (mut conn, handle) = connected_manager();
        conn.on_transport_lost();
        let mut controller = MatchmakingController::new();
        let err = controller
            .search(&mut conn, &PlayerProfile::guest("alice"))
            .unwrap_err();
        assert!(matches!(
            err,
            MatchmakingError::Connection(ConnectionError::NotConnected)
        ));
        assert_eq!(controller.state(), MatchmakingState::Idle);
        assert!(handle.sent().is_empty());
    }

    #[test]
    fn cancel_from_idle_is_a_benign_error() {
        let (mut conn, handle) = connected_manager();
        let mut controller = MatchmakingController::new();
        let err = controller.cancel(&mut conn).unwrap_err();
        assert!(matches!(err, MatchmakingError::NotSearching));
        assert!(handle.sent().is_empty());
    }

    #[test]
    fn cancel_returns_to_idle_and_sends() {
        let (mut conn, handle) = connected_manager();
        let mut controller = MatchmakingController::new();
        controller
            .search(&mut conn, &PlayerProfile::guest("alice"))
            .unwrap();
        controller.cancel(&mut conn).unwrap();
        assert_eq!(controller.state(), MatchmakingState::Idle);
        assert!(handle.sent()[1].contains("cancel-search"));
    }

    #[test]
    fn match_after_cancel_is_suppressed() {
        let (mut conn, _handle) = connected_manager();
        let mut controller = MatchmakingController::new();
        controller
            .search(&mut conn, &PlayerProfile::guest("alice"))
            .unwrap();
        controller.cancel(&mut conn).unwrap();
        assert!(controller.on_match_found(match_data()).is_none());
        assert_eq!(controller.state(), MatchmakingState::Idle);
    }

    #[test]
    fn match_while_searching_yields_the_session() {
        let (mut conn, _handle) = connected_manager();
        let mut controller = MatchmakingController::new();
        controller
            .search(&mut conn, &PlayerProfile::guest("alice"))
            .unwrap();
        let session = controller.on_match_found(match_data()).unwrap();
        assert_eq!(controller.state(), MatchmakingState::Matched);
        assert_eq!(session.id, "s1");
        assert_eq!(session.my_color, PlayerColor::White);
        assert_eq!(session.opponent().display_name, "bob");
    }
}
