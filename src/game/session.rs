use log::{info, warn};
use thiserror::Error;

use crate::connection::{ConnectionError, ConnectionManager};
use crate::game::rules::{self, Position, RuleViolation};
use crate::models::messages::{ClientEvent, MoveConfirmedData, SessionEndedData, SessionResumedData};
use crate::models::session::{
    MoveRecord, Player, PromotionPiece, ResultKind, Session, SessionResult,
};

/// A move the local player attempted that the server has not ruled on yet.
/// At most one exists at any instant.
#[derive(Debug, Clone)]
pub struct CandidateMove {
    pub from: String,
    pub to: String,
    pub promotion: Option<PromotionPiece>,
    preview: Position,
}

/// A running session: the last authoritative snapshot, the confirmed move
/// history, and the at-most-one optimistic overlay.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub session: Session,
    position: Position,
    history: Vec<MoveRecord>,
    candidate: Option<CandidateMove>,
    opponent_present: bool,
}

impl ActiveSession {
    /// What the board widget should show: the authoritative snapshot, or the
    /// candidate's preview while one is pending.
    pub fn displayed_position(&self) -> &Position {
        match &self.candidate {
            Some(candidate) => &candidate.preview,
            None => &self.position,
        }
    }

    pub fn authoritative_position(&self) -> &Position {
        &self.position
    }

    pub fn is_my_turn(&self) -> bool {
        self.position.side_to_move() == self.session.my_color
    }

    pub fn opponent_present(&self) -> bool {
        self.opponent_present
    }
}

/// A session that reached a terminal result. The position is `None` when the
/// session ended because its snapshot could not be restored.
#[derive(Debug, Clone)]
pub struct FinishedSession {
    pub session: Session,
    pub position: Option<Position>,
    pub history: Vec<MoveRecord>,
    pub result: SessionResult,
}

/// The whole session lifecycle as one tagged state, so that impossible
/// combinations (searching while a game is active, a result without a
/// session) cannot be represented.
#[derive(Debug, Clone, Default)]
pub enum SessionState {
    #[default]
    NoSession,
    WaitingForOpponent,
    Active(ActiveSession),
    Terminated(FinishedSession),
}

#[derive(Debug, Error)]
pub enum MoveError {
    #[error("no active session")]
    NoActiveSession,
    #[error("not your turn")]
    NotYourTurn,
    #[error("a move is already awaiting confirmation")]
    MovePending,
    #[error(transparent)]
    Illegal(#[from] RuleViolation),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// The game session state machine and move reconciler.
///
/// The server's snapshot is the single source of truth: every state-bearing
/// event replaces the position wholesale, and turn ownership is recomputed
/// from the snapshot rather than toggled, so the client converges no matter
/// how many events it missed.
pub struct GameSession {
    state: SessionState,
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new()
    }
}

impl GameSession {
    pub fn new() -> Self {
        GameSession {
            state: SessionState::NoSession,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            SessionState::Active(active) => Some(&active.session),
            SessionState::Terminated(finished) => Some(&finished.session),
            _ => None,
        }
    }

    pub fn displayed_position(&self) -> Option<&Position> {
        match &self.state {
            SessionState::Active(active) => Some(active.displayed_position()),
            SessionState::Terminated(finished) => finished.position.as_ref(),
            _ => None,
        }
    }

    pub fn move_history(&self) -> &[MoveRecord] {
        match &self.state {
            SessionState::Active(active) => &active.history,
            SessionState::Terminated(finished) => &finished.history,
            _ => &[],
        }
    }

    pub fn result(&self) -> Option<&SessionResult> {
        match &self.state {
            SessionState::Terminated(finished) => Some(&finished.result),
            _ => None,
        }
    }

    /// A find-opponent request went out.
    pub fn on_search_started(&mut self) {
        match self.state {
            SessionState::NoSession => self.state = SessionState::WaitingForOpponent,
            _ => warn!("search started outside NoSession"),
        }
    }

    /// The pending search was cancelled.
    pub fn on_search_cancelled(&mut self) {
        match self.state {
            SessionState::WaitingForOpponent => self.state = SessionState::NoSession,
            _ => warn!("search cancelled outside WaitingForOpponent"),
        }
    }

    /// A fresh match: start from the standard position with empty history.
    pub fn begin(&mut self, session: Session) {
        match self.state {
            SessionState::NoSession | SessionState::WaitingForOpponent => {
                info!(
                    "session {} started, playing {} against {}",
                    session.id,
                    session.my_color,
                    session.opponent().display_name
                );
                self.state = SessionState::Active(ActiveSession {
                    session,
                    position: Position::starting(),
                    history: Vec::new(),
                    candidate: None,
                    opponent_present: true,
                });
            }
            _ => warn!("ignoring match for session {} while in a session", session.id),
        }
    }

    /// Reconnect into an already-running session, rebuilding all state from
    /// the carried snapshot. A snapshot that cannot be restored ends the
    /// session rather than leaving the client on unknown state.
    pub fn resume(&mut self, data: SessionResumedData) {
        let session = Session::new(
            data.session_id,
            data.white_player,
            data.black_player,
            data.my_color,
        );
        match Position::from_token(&data.position) {
            Ok(position) => {
                info!(
                    "resumed session {} with {} moves played",
                    session.id,
                    data.move_history.len()
                );
                self.state = SessionState::Active(ActiveSession {
                    session,
                    position,
                    history: data.move_history,
                    candidate: None,
                    opponent_present: true,
                });
            }
            Err(e) => {
                warn!("resync failed for session {}: {}", session.id, e);
                self.state = SessionState::Terminated(FinishedSession {
                    session,
                    position: None,
                    history: data.move_history,
                    result: SessionResult {
                        kind: ResultKind::Disconnect,
                        reason: Some("resync failed".to_string()),
                        winner: None,
                        resigned: None,
                    },
                });
            }
        }
    }

    /// Attempt a local move. All four gates (active session, own turn, no
    /// pending candidate, structural legality) are checked locally; a
    /// rejected attempt never reaches the transport. An accepted attempt is
    /// rendered optimistically and sent fire-and-forget.
    pub fn submit_move(
        &mut self,
        conn: &mut ConnectionManager,
        from: &str,
        to: &str,
        promotion: Option<PromotionPiece>,
    ) -> Result<(), MoveError> {
        let active = match &mut self.state {
            SessionState::Active(active) => active,
            _ => return Err(MoveError::NoActiveSession),
        };
        if !active.is_my_turn() {
            return Err(MoveError::NotYourTurn);
        }
        if active.candidate.is_some() {
            return Err(MoveError::MovePending);
        }
        let preview = rules::apply_move(active.displayed_position(), from, to, promotion)?;
        conn.send_event(&ClientEvent::SubmitMove {
            session_id: active.session.id.clone(),
            from: from.to_lowercase(),
            to: to.to_lowercase(),
            promotion,
        })?;
        info!("move {}{} submitted, awaiting confirmation", from, to);
        active.candidate = Some(CandidateMove {
            from: from.to_lowercase(),
            to: to.to_lowercase(),
            promotion,
            preview,
        });
        Ok(())
    }

    /// The server confirmed a move (ours or the opponent's). The candidate is
    /// discarded whether or not it matches: the snapshot wins over the
    /// optimistic guess.
    pub fn on_move_confirmed(&mut self, data: MoveConfirmedData) {
        let active = match &mut self.state {
            SessionState::Active(active) => active,
            _ => {
                warn!("move-confirmed outside an active session");
                return;
            }
        };
        active.candidate = None;
        match Position::from_token(&data.position) {
            Ok(position) => {
                active.position = position;
                active.history = data.move_history;
                let derived = active.is_my_turn();
                if derived != data.is_local_turn {
                    warn!(
                        "server turn flag ({}) disagrees with the snapshot ({}); trusting the snapshot",
                        data.is_local_turn, derived
                    );
                }
                info!(
                    "position confirmed, {} moves played, {} to move",
                    active.history.len(),
                    active.position.side_to_move()
                );
            }
            Err(e) => {
                warn!("unusable snapshot in move-confirmed: {}", e);
                self.resync_failure();
            }
        }
    }

    /// The server refused our candidate. The rendering reverts to the last
    /// authoritative snapshot; nothing else changes.
    pub fn on_move_rejected(&mut self, reason: &str) {
        match &mut self.state {
            SessionState::Active(active) => {
                if active.candidate.take().is_some() {
                    info!("move rejected by the server: {}", reason);
                } else {
                    warn!("move-rejected with no pending candidate: {}", reason);
                }
            }
            _ => warn!("move-rejected outside an active session: {}", reason),
        }
    }

    /// The transport came back. A pending candidate's fate during the outage
    /// is unknown, so it is discarded rather than guessed at; the next
    /// state-bearing event rebuilds the position wholesale.
    pub fn on_reconnected(&mut self) {
        if let SessionState::Active(active) = &mut self.state {
            if active.candidate.take().is_some() {
                info!("discarded pending move after reconnect");
            }
        }
    }

    /// Authoritative end of the session.
    pub fn on_session_ended(&mut self, data: SessionEndedData) {
        match std::mem::take(&mut self.state) {
            SessionState::Active(active) => {
                let result = SessionResult {
                    kind: data.kind,
                    reason: data.reason,
                    winner: data.winner,
                    resigned: data.resigned,
                };
                info!("session {} ended: {}", active.session.id, result.summary());
                self.state = SessionState::Terminated(FinishedSession {
                    session: active.session,
                    position: Some(active.position),
                    history: active.history,
                    result,
                });
            }
            other => {
                warn!("session-ended outside an active session");
                self.state = other;
            }
        }
    }

    /// The opponent dropped. The session pauses; it is not a forfeit until
    /// the server says so.
    pub fn on_opponent_disconnected(&mut self, player: &Player) {
        match &mut self.state {
            SessionState::Active(active) => {
                info!("{} disconnected, session paused", player.display_name);
                active.opponent_present = false;
            }
            _ => warn!("opponent-disconnected outside an active session"),
        }
    }

    /// Leave a terminated session behind. Only an explicit user action gets
    /// here; an active game must end first.
    pub fn reset(&mut self) -> bool {
        match self.state {
            SessionState::Terminated(_) | SessionState::NoSession => {
                self.state = SessionState::NoSession;
                true
            }
            _ => {
                warn!("refusing to reset a running session");
                false
            }
        }
    }

    /// A state-bearing event carried a snapshot we cannot use. Ends the
    /// session from the client's perspective instead of operating on unknown
    /// state; the last good snapshot is kept for display.
    fn resync_failure(&mut self) {
        if let SessionState::Active(active) = std::mem::take(&mut self.state) {
            self.state = SessionState::Terminated(FinishedSession {
                session: active.session,
                position: Some(active.position),
                history: active.history,
                result: SessionResult {
                    kind: ResultKind::Disconnect,
                    reason: Some("resync failed".to_string()),
                    winner: None,
                    resigned: None,
                },
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::{PlayerColor, PlayerKind};
    use crate::test_util::{connected_manager, sent_events};

    fn player(name: &str) -> Player {
        Player {
            id: format!("{}-id", name),
            display_name: name.to_string(),
            kind: PlayerKind::Guest,
        }
    }

    fn session_as(my_color: PlayerColor) -> Session {
        Session::new("s1".to_string(), player("alice"), player("bob"), my_color)
    }

    fn active_game(my_color: PlayerColor) -> GameSession {
        let mut game = GameSession::new();
        game.begin(session_as(my_color));
        game
    }

    fn record(from: &str, to: &str, by: PlayerColor) -> MoveRecord {
        MoveRecord {
            from: from.to_string(),
            to: to.to_string(),
            promotion: None,
            notation: format!("{}{}", from, to),
            source_player: by,
        }
    }

    fn confirmation_after(moves: &[(&str, &str)]) -> MoveConfirmedData {
        let mut position = Position::starting();
        let mut history = Vec::new();
        for (from, to) in moves {
            let mover = position.side_to_move();
            position = rules::apply_move(&position, from, to, None).unwrap();
            history.push(record(from, to, mover));
        }
        let is_local_turn = position.side_to_move() == PlayerColor::White;
        MoveConfirmedData {
            position: position.token().to_string(),
            move_history: history,
            is_local_turn,
        }
    }

    #[test]
    fn optimistic_move_is_rendered_but_not_confirmed() {
        let (mut conn, handle) = connected_manager();
        let mut game = active_game(PlayerColor::White);
        let authoritative = game.displayed_position().unwrap().token().to_string();

        game.submit_move(&mut conn, "e2", "e4", None).unwrap();

        // Rendered position reflects the pawn on e4, history does not.
        let displayed = game.displayed_position().unwrap();
        assert_ne!(displayed.token(), authoritative);
        assert_eq!(game.move_history().len(), 0);
        assert_eq!(handle.sent().len(), 1);
        assert!(handle.sent()[0].contains("submit-move"));
    }

    #[test]
    fn confirmation_replaces_the_position_and_appends_history() {
        let (mut conn, _handle) = connected_manager();
        let mut game = active_game(PlayerColor::White);
        game.submit_move(&mut conn, "e2", "e4", None).unwrap();

        let data = confirmation_after(&[("e2", "e4")]);
        let snapshot = data.position.clone();
        game.on_move_confirmed(data);

        let active = match game.state() {
            SessionState::Active(active) => active,
            other => panic!("unexpected state: {:?}", other),
        };
        assert_eq!(active.displayed_position().token(), snapshot);
        assert_eq!(game.move_history().len(), 1);
        assert_eq!(active.displayed_position().side_to_move(), PlayerColor::Black);
        assert!(!active.is_my_turn());
    }

    #[test]
    fn out_of_turn_move_never_reaches_the_transport() {
        let (mut conn, handle) = connected_manager();
        let mut game = active_game(PlayerColor::Black);
        let err = game.submit_move(&mut conn, "e2", "e4", None).unwrap_err();
        assert!(matches!(err, MoveError::NotYourTurn));
        assert!(handle.sent().is_empty());
    }

    #[test]
    fn illegal_move_never_reaches_the_transport() {
        let (mut conn, handle) = connected_manager();
        let mut game = active_game(PlayerColor::White);
        let err = game.submit_move(&mut conn, "e2", "e5", None).unwrap_err();
        assert!(matches!(err, MoveError::Illegal(_)));
        assert!(handle.sent().is_empty());
        if let SessionState::Active(active) = game.state() {
            assert!(active.candidate.is_none());
        }
    }

    #[test]
    fn second_candidate_is_rejected_locally() {
        let (mut conn, handle) = connected_manager();
        let mut game = active_game(PlayerColor::White);
        game.submit_move(&mut conn, "e2", "e4", None).unwrap();
        let err = game.submit_move(&mut conn, "d2", "d4", None).unwrap_err();
        assert!(matches!(err, MoveError::MovePending));
        assert_eq!(handle.sent().len(), 1);
    }

    #[test]
    fn rejection_reverts_to_the_authoritative_snapshot() {
        let (mut conn, _handle) = connected_manager();
        let mut game = active_game(PlayerColor::White);
        let authoritative = game.displayed_position().unwrap().token().to_string();
        game.submit_move(&mut conn, "e2", "e4", None).unwrap();

        game.on_move_rejected("not your turn");

        assert_eq!(game.displayed_position().unwrap().token(), authoritative);
        assert_eq!(game.move_history().len(), 0);
        // The session survives a rejection.
        assert!(matches!(game.state(), SessionState::Active(_)));
    }

    #[test]
    fn resync_after_reconnect_wins_over_optimistic_state() {
        let (mut conn, _handle) = connected_manager();
        let mut game = active_game(PlayerColor::White);
        game.submit_move(&mut conn, "e2", "e4", None).unwrap();

        game.on_reconnected();
        // The candidate is gone even before the resync arrives.
        assert_eq!(
            game.displayed_position().unwrap().token(),
            Position::starting().token()
        );

        let data = confirmation_after(&[("d2", "d4")]);
        let snapshot = data.position.clone();
        game.on_move_confirmed(data);
        assert_eq!(game.displayed_position().unwrap().token(), snapshot);
    }

    #[test]
    fn turn_alternates_across_confirmed_moves() {
        let mut game = active_game(PlayerColor::White);
        let sequence = [("e2", "e4"), ("e7", "e5"), ("g1", "f3")];
        for upto in 1..=sequence.len() {
            let data = confirmation_after(&sequence[..upto]);
            game.on_move_confirmed(data);
            let expected = if upto % 2 == 0 {
                PlayerColor::White
            } else {
                PlayerColor::Black
            };
            assert_eq!(
                game.displayed_position().unwrap().side_to_move(),
                expected
            );
            assert_eq!(game.move_history().len(), upto);
        }
    }

    #[test]
    fn session_end_blocks_further_moves() {
        let (mut conn, handle) = connected_manager();
        let mut game = active_game(PlayerColor::White);
        game.on_session_ended(SessionEndedData {
            kind: ResultKind::Checkmate,
            reason: None,
            winner: Some(player("bob")),
            resigned: None,
        });

        assert!(matches!(game.state(), SessionState::Terminated(_)));
        assert_eq!(game.result().unwrap().kind, ResultKind::Checkmate);

        let err = game.submit_move(&mut conn, "e2", "e4", None).unwrap_err();
        assert!(matches!(err, MoveError::NoActiveSession));
        assert!(handle.sent().is_empty());
    }

    #[test]
    fn resume_restores_position_history_and_turn() {
        let mut game = GameSession::new();
        let after_e4 = rules::apply_move(&Position::starting(), "e2", "e4", None).unwrap();
        game.resume(SessionResumedData {
            session_id: "s9".to_string(),
            my_color: PlayerColor::Black,
            position: after_e4.token().to_string(),
            move_history: vec![record("e2", "e4", PlayerColor::White)],
            white_player: player("alice"),
            black_player: player("bob"),
        });

        let active = match game.state() {
            SessionState::Active(active) => active,
            other => panic!("unexpected state: {:?}", other),
        };
        assert_eq!(active.session.id, "s9");
        assert_eq!(game.move_history().len(), 1);
        assert!(active.is_my_turn());
    }

    #[test]
    fn malformed_resume_snapshot_ends_the_session() {
        let mut game = GameSession::new();
        game.resume(SessionResumedData {
            session_id: "s9".to_string(),
            my_color: PlayerColor::Black,
            position: "garbage".to_string(),
            move_history: Vec::new(),
            white_player: player("alice"),
            black_player: player("bob"),
        });

        let finished = match game.state() {
            SessionState::Terminated(finished) => finished,
            other => panic!("unexpected state: {:?}", other),
        };
        assert_eq!(finished.result.kind, ResultKind::Disconnect);
        assert_eq!(finished.result.reason.as_deref(), Some("resync failed"));
        assert!(finished.position.is_none());
    }

    #[test]
    fn opponent_disconnect_pauses_without_ending() {
        let mut game = active_game(PlayerColor::White);
        game.on_opponent_disconnected(&player("bob"));
        let active = match game.state() {
            SessionState::Active(active) => active,
            other => panic!("unexpected state: {:?}", other),
        };
        assert!(!active.opponent_present());
        assert!(game.result().is_none());
    }

    #[test]
    fn reset_leaves_only_terminated_sessions() {
        let mut game = active_game(PlayerColor::White);
        assert!(!game.reset());

        game.on_session_ended(SessionEndedData {
            kind: ResultKind::Draw,
            reason: Some("agreement".to_string()),
            winner: None,
            resigned: None,
        });
        assert!(game.reset());
        assert!(matches!(game.state(), SessionState::NoSession));
    }

    #[test]
    fn submitted_moves_carry_the_session_id() {
        let (mut conn, handle) = connected_manager();
        let mut game = active_game(PlayerColor::White);
        game.submit_move(&mut conn, "E2", "E4", None).unwrap();
        let events = sent_events(&handle);
        match &events[0] {
            ClientEvent::SubmitMove {
                session_id,
                from,
                to,
                promotion,
            } => {
                assert_eq!(session_id, "s1");
                assert_eq!(from, "e2");
                assert_eq!(to, "e4");
                assert!(promotion.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
