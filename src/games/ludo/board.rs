use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, Result};
use serde::Serialize;
use thiserror::Error;

use super::{side_tokens, Token, MAX_TOKENS_PER_SIDE};
use crate::games::{GameState, Validate};

const EMPTY_CELL: &str = "□";

// Structural problems a board refuses to represent. Reaching any of these from
// the rules engine is an engine defect, not an agent mistake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("token {0} is not on this board")]
    UnknownToken(Token),
    #[error("position {position} for token {token} is beyond the track of length {track_length}")]
    OutOfBounds { token: Token, position: usize, track_length: usize },
    #[error("tokens {0} and {1} of the same side would share field {2}")]
    SharedField(Token, Token, usize),
    #[error("move for side {side} does not assign exactly that side's tokens")]
    ForeignMove { side: usize },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Board {
    pub track_length: usize,
    sides: Vec<Vec<Token>>,
    positions: BTreeMap<Token, usize>,
    // Distinct tokens per side that have ever been placed on the track
    #[serde(skip)]
    entered: Vec<BTreeSet<Token>>,
}

impl Board {
    // Fresh board, every token off the track
    pub fn new(track_length: usize, side_count: usize, tokens_per_side: usize) -> Self {
        let sides: Vec<Vec<Token>> = (0..side_count)
            .map(|side| side_tokens(side, tokens_per_side))
            .collect();
        let positions = sides.iter().flatten().map(|&t| (t, 0)).collect();

        Board {
            track_length,
            entered: vec![BTreeSet::new(); sides.len()],
            sides,
            positions,
        }
    }

    // Board with explicit positions. Tokens already on the track (or home) count
    // as entered.
    pub fn with_positions(
        track_length: usize,
        side_count: usize,
        tokens_per_side: usize,
        placed: &[(Token, usize)],
    ) -> Result<Self, InvariantViolation> {
        let mut board = Board::new(track_length, side_count, tokens_per_side);
        for &(token, position) in placed {
            board = board.apply(token, position)?;
        }
        Ok(board)
    }

    pub fn side_count(&self) -> usize {
        self.sides.len()
    }

    pub fn tokens(&self, side: usize) -> &[Token] {
        &self.sides[side]
    }

    pub fn side_of(&self, token: Token) -> Option<usize> {
        self.sides.iter().position(|tokens| tokens.contains(&token))
    }

    pub fn position(&self, token: Token) -> Option<usize> {
        self.positions.get(&token).copied()
    }

    pub fn entered_count(&self, side: usize) -> usize {
        self.entered[side].len()
    }

    // Own token (other than `except`) sitting on a non-terminal field
    pub fn own_token_at(&self, side: usize, position: usize, except: Token) -> Option<Token> {
        if position == 0 || position == self.track_length {
            return None;
        }

        self.sides[side]
            .iter()
            .copied()
            .find(|&t| t != except && self.positions[&t] == position)
    }

    pub fn side_finished(&self, side: usize) -> bool {
        self.sides[side]
            .iter()
            .all(|t| self.positions[t] == self.track_length)
    }

    // Place a token on a new field, returning the resulting board. Captures
    // opponents on the target when more than one side plays. No legality checks
    // are made here.
    pub fn apply(&self, token: Token, position: usize) -> Result<Board, InvariantViolation> {
        let side = self.side_of(token).ok_or(InvariantViolation::UnknownToken(token))?;

        if position > self.track_length {
            return Err(InvariantViolation::OutOfBounds {
                token,
                position,
                track_length: self.track_length,
            });
        }

        if let Some(other) = self.own_token_at(side, position, token) {
            return Err(InvariantViolation::SharedField(token, other, position));
        }

        let mut next = self.clone();
        if position > 0 {
            next.entered[side].insert(token);
        }
        next.positions.insert(token, position);

        if self.side_count() > 1 && position > 0 && position < self.track_length {
            for (other_side, tokens) in self.sides.iter().enumerate() {
                if other_side == side {
                    continue;
                }
                for &opponent in tokens {
                    if next.positions[&opponent] == position {
                        log::debug!("{} captures {} on field {}", token, opponent, position);
                        next.positions.insert(opponent, 0);
                    }
                }
            }
        }

        Ok(next)
    }

    // Space delimited cells, one per field of the track. Off-board tokens are
    // implied by their absence. When several tokens are home the last one listed
    // owns the final cell.
    pub fn render_track(&self) -> String {
        let mut cells = vec![EMPTY_CELL.to_string(); self.track_length];
        for token in self.sides.iter().flatten() {
            let position = self.positions[token];
            if position > 0 {
                cells[position - 1] = token.to_string();
            }
        }

        cells.join(" ")
    }

    // Explicit token to position record, all sides in order
    pub fn render_positions(&self) -> String {
        let fields: Vec<String> = self
            .sides
            .iter()
            .flatten()
            .map(|t| format!("{}: {}", t, self.positions[t]))
            .collect();

        format!("{{{}}}", fields.join(", "))
    }

    pub fn render(&self) -> String {
        if self.side_count() > 1 {
            self.render_positions()
        } else {
            self.render_track()
        }
    }
}

impl GameState for Board {
    fn winner(&self) -> Option<usize> {
        (0..self.side_count()).find(|&side| self.side_finished(side))
    }
}

impl Validate for Board {
    fn validate(&self) -> Result<()> {
        if self.sides.is_empty() || self.sides.len() > 2 {
            return Err(anyhow!("Number of sides ({}) outside the bound [1, 2]", self.sides.len()));
        }

        for (side, tokens) in self.sides.iter().enumerate() {
            if tokens.is_empty() || tokens.len() > MAX_TOKENS_PER_SIDE {
                return Err(anyhow!("Side {} has {} tokens, expected 1 to {}", side, tokens.len(), MAX_TOKENS_PER_SIDE));
            }

            for &token in tokens {
                let position = self.positions[&token];
                if position > self.track_length {
                    return Err(anyhow!("Token {} at {} is beyond the track", token, position));
                }
                if let Some(other) = self.own_token_at(side, position, token) {
                    return Err(anyhow!("Tokens {} and {} share field {}", token, other, position));
                }
            }
        }

        for field in 1..self.track_length {
            let owners: BTreeSet<usize> = self
                .positions
                .iter()
                .filter(|&(_, &p)| p == field)
                .filter_map(|(&t, _)| self.side_of(t))
                .collect();
            if owners.len() > 1 {
                return Err(anyhow!("Field {} is held by more than one side", field));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(c: char) -> Token {
        Token(c)
    }

    #[test]
    fn test_new_board_is_empty() {
        let board = Board::new(23, 2, 2);
        assert_eq!(board.tokens(0), &[t('X'), t('Y')]);
        assert_eq!(board.tokens(1), &[t('A'), t('B')]);
        assert!(board.tokens(0).iter().chain(board.tokens(1)).all(|&tok| board.position(tok) == Some(0)));
        assert_eq!(board.entered_count(0), 0);
        assert!(board.validate().is_ok());
    }

    #[test]
    fn test_apply_returns_new_board() {
        let board = Board::new(23, 1, 2);
        let next = board.apply(t('X'), 1).unwrap();
        assert_eq!(board.position(t('X')), Some(0));
        assert_eq!(next.position(t('X')), Some(1));
        assert_eq!(next.entered_count(0), 1);
    }

    #[test]
    fn test_apply_captures_opponent() {
        let board = Board::with_positions(23, 2, 2, &[(t('X'), 21), (t('A'), 22)]).unwrap();
        let next = board.apply(t('X'), 22).unwrap();
        assert_eq!(next.position(t('X')), Some(22));
        assert_eq!(next.position(t('A')), Some(0));
    }

    #[test]
    fn test_no_capture_on_home_field() {
        let board = Board::with_positions(23, 2, 2, &[(t('X'), 20), (t('A'), 23)]).unwrap();
        let next = board.apply(t('X'), 23).unwrap();
        assert_eq!(next.position(t('A')), Some(23));
        assert_eq!(next.position(t('X')), Some(23));
    }

    #[test]
    fn test_no_capture_single_side() {
        let board = Board::with_positions(23, 1, 2, &[(t('X'), 4)]).unwrap();
        assert_eq!(
            board.apply(t('Y'), 4),
            Err(InvariantViolation::SharedField(t('Y'), t('X'), 4))
        );
    }

    #[test]
    fn test_same_side_may_share_home() {
        let board = Board::with_positions(23, 1, 2, &[(t('X'), 23)]).unwrap();
        let next = board.apply(t('Y'), 23).unwrap();
        assert!(next.side_finished(0));
        assert_eq!(next.winner(), Some(0));
        assert!(next.is_game_over());
    }

    #[test]
    fn test_apply_rejects_out_of_bounds_and_unknown() {
        let board = Board::new(23, 1, 2);
        assert!(matches!(board.apply(t('X'), 24), Err(InvariantViolation::OutOfBounds { .. })));
        assert_eq!(board.apply(t('A'), 1), Err(InvariantViolation::UnknownToken(t('A'))));
    }

    #[test]
    fn test_entered_survives_capture() {
        let board = Board::with_positions(23, 2, 2, &[(t('A'), 7)]).unwrap();
        let next = board.apply(t('X'), 7).unwrap();
        assert_eq!(next.position(t('A')), Some(0));
        assert_eq!(next.entered_count(1), 1);
    }

    #[test]
    fn test_render_track() {
        let board = Board::with_positions(5, 1, 2, &[(t('X'), 1), (t('Y'), 4)]).unwrap();
        assert_eq!(board.render_track(), "X □ □ Y □");
        assert_eq!(board.render(), "X □ □ Y □");
    }

    #[test]
    fn test_render_positions() {
        let board = Board::with_positions(23, 2, 2, &[(t('X'), 21), (t('A'), 22)]).unwrap();
        assert_eq!(board.render(), "{X: 21, Y: 0, A: 22, B: 0}");
    }
}
