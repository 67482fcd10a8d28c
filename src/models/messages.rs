use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::session::{MoveRecord, Player, PlayerColor, PlayerKind, PromotionPiece, ResultKind};

/// Event sent from client to server. Serialized as
/// `{"event": "<kebab-case name>", "data": {...}}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    FindOpponent {
        player_kind: PlayerKind,
        display_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<Uuid>,
    },
    CancelSearch {},
    #[serde(rename_all = "camelCase")]
    SubmitMove {
        session_id: String,
        from: String,
        to: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        promotion: Option<PromotionPiece>,
    },
    #[serde(rename_all = "camelCase")]
    Resign { session_id: String },
    #[serde(rename_all = "camelCase")]
    SendChat { session_id: String, text: String },
}

/// Event sent from server to client.
///
/// State-bearing events (`match-found`, `session-resumed`, `move-confirmed`)
/// always carry a full position snapshot, never a diff; the client replaces
/// its state wholesale when handling them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    WaitingForOpponent {},
    MatchFound(MatchFoundData),
    SessionResumed(SessionResumedData),
    MoveConfirmed(MoveConfirmedData),
    MoveRejected { reason: String },
    SessionEnded(SessionEndedData),
    #[serde(rename_all = "camelCase")]
    OpponentDisconnected { disconnected_player: Player },
    ChatReceived { sender: String, text: String },
}

/// Payload of `match-found`: a fresh pairing. The position is implied to be
/// the starting one, so no snapshot travels with it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchFoundData {
    pub session_id: String,
    pub my_color: PlayerColor,
    pub white_player: Player,
    pub black_player: Player,
}

/// Payload of `session-resumed`: a reconnect into a running session, carrying
/// everything needed to rebuild the client state from scratch.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionResumedData {
    pub session_id: String,
    pub my_color: PlayerColor,
    pub position: String,
    pub move_history: Vec<MoveRecord>,
    pub white_player: Player,
    pub black_player: Player,
}

/// Payload of `move-confirmed`. `is_local_turn` is advisory; the client
/// derives turn ownership from the snapshot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoveConfirmedData {
    pub position: String,
    pub move_history: Vec<MoveRecord>,
    pub is_local_turn: bool,
}

/// Payload of `session-ended`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionEndedData {
    pub kind: ResultKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Player>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resigned: Option<Player>,
}
