use crate::game::rules::{self, AdvisoryStatus, Position, RuleViolation};
use crate::models::session::{MoveRecord, PromotionPiece};

/// A hot-seat board: both colors played locally against the rules engine,
/// with no server involved. Unlike the online session, moves here can be
/// taken back.
#[derive(Debug, Clone)]
pub struct LocalBoard {
    position: Position,
    history: Vec<MoveRecord>,
    undo_stack: Vec<Position>,
}

impl Default for LocalBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBoard {
    pub fn new() -> Self {
        LocalBoard {
            position: Position::starting(),
            history: Vec::new(),
            undo_stack: Vec::new(),
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn history(&self) -> &[MoveRecord] {
        &self.history
    }

    pub fn status(&self) -> AdvisoryStatus {
        rules::advisory_status(&self.position)
    }

    pub fn play(
        &mut self,
        from: &str,
        to: &str,
        promotion: Option<PromotionPiece>,
    ) -> Result<(), RuleViolation> {
        let mover = self.position.side_to_move();
        let next = rules::apply_move(&self.position, from, to, promotion)?;
        let from = from.to_lowercase();
        let to = to.to_lowercase();
        let notation = match promotion {
            Some(piece) => format!("{}{}{}", from, to, piece.letter()),
            None => format!("{}{}", from, to),
        };
        self.undo_stack.push(self.position.clone());
        self.position = next;
        self.history.push(MoveRecord {
            from,
            to,
            promotion,
            notation,
            source_player: mover,
        });
        Ok(())
    }

    /// Take back the last move. Returns false on an empty board.
    pub fn undo(&mut self) -> bool {
        match self.undo_stack.pop() {
            Some(previous) => {
                self.position = previous;
                self.history.pop();
                true
            }
            None => false,
        }
    }

    pub fn reset(&mut self) {
        *self = LocalBoard::new();
    }
}
