use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The color a player is assigned for one session.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlayerColor {
    White,
    Black,
}

impl PlayerColor {
    pub fn opponent(self) -> PlayerColor {
        match self {
            PlayerColor::White => PlayerColor::Black,
            PlayerColor::Black => PlayerColor::White,
        }
    }
}

impl fmt::Display for PlayerColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerColor::White => write!(f, "white"),
            PlayerColor::Black => write!(f, "black"),
        }
    }
}

/// Whether a player is a one-off guest or a registered account.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlayerKind {
    Guest,
    Registered,
}

/// One of the two parties in a session. Immutable once the session starts.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub display_name: String,
    pub kind: PlayerKind,
}

/// A live or finished game session as assigned by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub white: Player,
    pub black: Player,
    pub my_color: PlayerColor,
}

impl Session {
    pub fn new(id: String, white: Player, black: Player, my_color: PlayerColor) -> Self {
        Session {
            id,
            white,
            black,
            my_color,
        }
    }

    pub fn player_of(&self, color: PlayerColor) -> &Player {
        match color {
            PlayerColor::White => &self.white,
            PlayerColor::Black => &self.black,
        }
    }

    pub fn me(&self) -> &Player {
        self.player_of(self.my_color)
    }

    pub fn opponent(&self) -> &Player {
        self.player_of(self.my_color.opponent())
    }
}

/// Piece a pawn promotes to, in the single-letter wire vocabulary.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionPiece {
    #[serde(rename = "q")]
    Queen,
    #[serde(rename = "r")]
    Rook,
    #[serde(rename = "b")]
    Bishop,
    #[serde(rename = "n")]
    Knight,
}

impl PromotionPiece {
    pub fn letter(self) -> char {
        match self {
            PromotionPiece::Queen => 'q',
            PromotionPiece::Rook => 'r',
            PromotionPiece::Bishop => 'b',
            PromotionPiece::Knight => 'n',
        }
    }
}

impl FromStr for PromotionPiece {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "q" | "Q" => Ok(PromotionPiece::Queen),
            "r" | "R" => Ok(PromotionPiece::Rook),
            "b" | "B" => Ok(PromotionPiece::Bishop),
            "n" | "N" => Ok(PromotionPiece::Knight),
            _ => Err(()),
        }
    }
}

/// One confirmed move as recorded in the authoritative history.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<PromotionPiece>,
    pub notation: String,
    pub source_player: PlayerColor,
}

/// How a session reached its terminal state.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Checkmate,
    Draw,
    Resignation,
    Disconnect,
}

/// Sub-reason attached to a drawn game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawReason {
    Stalemate,
    Repetition,
    InsufficientMaterial,
    Agreement,
}

impl DrawReason {
    pub fn parse(reason: &str) -> Option<DrawReason> {
        match reason.trim().to_lowercase().as_str() {
            "stalemate" => Some(DrawReason::Stalemate),
            "repetition" => Some(DrawReason::Repetition),
            "insufficient material" | "insufficient-material" => {
                Some(DrawReason::InsufficientMaterial)
            }
            "agreement" => Some(DrawReason::Agreement),
            _ => None,
        }
    }
}

/// Terminal outcome of a session. Created once, never revised. All terminal
/// determinations originate from the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionResult {
    pub kind: ResultKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Player>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resigned: Option<Player>,
}

impl SessionResult {
    pub fn draw_reason(&self) -> Option<DrawReason> {
        self.reason.as_deref().and_then(DrawReason::parse)
    }

    /// One-line description for notices and the history pane.
    pub fn summary(&self) -> String {
        match self.kind {
            ResultKind::Checkmate => match &self.winner {
                Some(winner) => format!("checkmate, {} wins", winner.display_name),
                None => "checkmate".to_string(),
            },
            ResultKind::Draw => match self.reason.as_deref() {
                Some(reason) => format!("draw ({})", reason),
                None => "draw".to_string(),
            },
            ResultKind::Resignation => match &self.resigned {
                Some(resigned) => format!("{} resigned", resigned.display_name),
                None => "resignation".to_string(),
            },
            ResultKind::Disconnect => match self.reason.as_deref() {
                Some(reason) => format!("disconnect ({})", reason),
                None => "opponent disconnected".to_string(),
            },
        }
    }
}

/// One chat line, scoped to a single session. The timestamp is the local
/// receive time in Unix milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub sender: String,
    pub text: String,
    pub timestamp_ms: u64,
}
