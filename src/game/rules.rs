use std::str::FromStr;

use chess::{Board, BoardStatus, ChessMove, Color, MoveGen, Piece, Square};
use thiserror::Error;

use crate::models::session::{PlayerColor, PromotionPiece};

/// An authoritative position token could not be understood.
#[derive(Debug, Error)]
pub enum PositionError {
    #[error("invalid position token {0:?}")]
    BadToken(String),
}

/// Why a candidate move was rejected locally, before any network traffic.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleViolation {
    #[error("invalid square {0:?}")]
    BadSquare(String),
    #[error("illegal move {from}{to}")]
    IllegalMove { from: String, to: String },
}

/// An immutable board state: the opaque token the server sent (FEN) plus the
/// parsed board derived from it. Whose turn it is is always derived, never
/// stored, so it cannot drift from the token.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    token: String,
    board: Board,
}

impl Position {
    /// The standard starting position.
    pub fn starting() -> Position {
        let board = Board::default();
        Position {
            token: board.to_string(),
            board,
        }
    }

    /// Parse a server-supplied token. The token is kept verbatim so the
    /// displayed state is exactly what the server sent.
    pub fn from_token(token: &str) -> Result<Position, PositionError> {
        let board =
            Board::from_str(token).map_err(|_| PositionError::BadToken(token.to_string()))?;
        Ok(Position {
            token: token.to_string(),
            board,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn side_to_move(&self) -> PlayerColor {
        color_from_engine(self.board.side_to_move())
    }
}

/// Advisory view of a position, for display only. Terminal outcomes are
/// always confirmed by the server before the session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvisoryStatus {
    InProgress,
    Check,
    Checkmate,
    Stalemate,
}

pub fn advisory_status(position: &Position) -> AdvisoryStatus {
    match position.board.status() {
        BoardStatus::Checkmate => AdvisoryStatus::Checkmate,
        BoardStatus::Stalemate => AdvisoryStatus::Stalemate,
        BoardStatus::Ongoing => {
            if position.board.checkers().0 > 0 {
                AdvisoryStatus::Check
            } else {
                AdvisoryStatus::InProgress
            }
        }
    }
}

/// Apply a candidate move to a position, returning the resulting position.
///
/// Pure: the input position is never mutated. A pawn reaching the last rank
/// with no promotion choice promotes to a queen.
pub fn apply_move(
    position: &Position,
    from: &str,
    to: &str,
    promotion: Option<PromotionPiece>,
) -> Result<Position, RuleViolation> {
    let from_square = parse_square(from)?;
    let to_square = parse_square(to)?;

    let mut candidate = ChessMove::new(from_square, to_square, promotion.map(engine_piece));
    if !is_legal(&position.board, candidate) {
        // Queen promotion is the default when the caller did not pick a piece.
        let queened = ChessMove::new(from_square, to_square, Some(Piece::Queen));
        if promotion.is_none() && is_legal(&position.board, queened) {
            candidate = queened;
        } else {
            return Err(RuleViolation::IllegalMove {
                from: from.to_lowercase(),
                to: to.to_lowercase(),
            });
        }
    }

    let board = position.board.make_move_new(candidate);
    Ok(Position {
        token: board.to_string(),
        board,
    })
}

/// Legal destination squares for the piece on `from`, for move hints.
pub fn moves_from(position: &Position, from: &str) -> Result<Vec<String>, RuleViolation> {
    let from_square = parse_square(from)?;
    let destinations = MoveGen::new_legal(&position.board)
        .filter(|m| m.get_source() == from_square)
        .map(|m| m.get_dest().to_string())
        .collect();
    Ok(destinations)
}

fn is_legal(board: &Board, candidate: ChessMove) -> bool {
    MoveGen::new_legal(board).any(|m| m == candidate)
}

fn parse_square(name: &str) -> Result<Square, RuleViolation> {
    Square::from_str(&name.to_lowercase()).map_err(|_| RuleViolation::BadSquare(name.to_string()))
}

fn color_from_engine(color: Color) -> PlayerColor {
    match color {
        Color::White => PlayerColor::White,
        Color::Black => PlayerColor::Black,
    }
}

fn engine_piece(piece: PromotionPiece) -> Piece {
    match piece {
        PromotionPiece::Queen => Piece::Queen,
        PromotionPiece::Rook => Piece::Rook,
        PromotionPiece::Bishop => Piece::Bishop,
        PromotionPiece::Knight => Piece::Knight,
    }
}
