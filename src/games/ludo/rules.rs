use serde::Serialize;
use thiserror::Error;

use super::board::{Board, InvariantViolation};
use super::config::LudoConfig;
use super::parser::Move;
use super::Token;

const ENTRY_ROLL: u8 = 6;
const ENTRY_FIELD: usize = 1;
// Distinct tokens a single player must have brought out before any may finish
const FINISH_QUORUM: usize = 2;

// Why a well-formed move was refused. Only used for diagnostics and reprompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Violation {
    #[error("a token can only be played to the board on a roll of 6")]
    NoSixForEntry,
    #[error("a token played to the board has to be placed on field 1")]
    EntryTargetNotOne,
    #[error("field 1 is already occupied by one of your tokens")]
    EntryBlocked,
    #[error("the move would go past the last field")]
    ExceedsTrack,
    #[error("the token has to move exactly the number rolled")]
    WrongDistance,
    #[error("a token on the last field cannot move again")]
    TokenFinished,
    #[error("the target field is already occupied by one of your tokens")]
    TargetOccupiedSameSide,
    #[error("at least two tokens have to be played to the board before one can finish")]
    FinishRequiresTwoTokens,
    #[error("more than one token was moved")]
    MultipleTokensMoved,
    #[error("no token was moved although a move is possible")]
    MoveAvailable,
    #[error("that token cannot move with this roll but another one can")]
    WrongTokenChosenWhenForced,
}

impl Violation {
    pub fn code(self) -> &'static str {
        match self {
            Violation::NoSixForEntry => "NO_SIX_FOR_ENTRY",
            Violation::EntryTargetNotOne => "ENTRY_TARGET_NOT_ONE",
            Violation::EntryBlocked => "ENTRY_BLOCKED",
            Violation::ExceedsTrack => "EXCEEDS_TRACK",
            Violation::WrongDistance => "WRONG_DISTANCE",
            Violation::TokenFinished => "TOKEN_FINISHED",
            Violation::TargetOccupiedSameSide => "TARGET_OCCUPIED_SAME_SIDE",
            Violation::FinishRequiresTwoTokens => "FINISH_REQUIRES_TWO_TOKENS",
            Violation::MultipleTokensMoved => "MULTIPLE_TOKENS_MOVED",
            Violation::MoveAvailable => "MOVE_AVAILABLE",
            Violation::WrongTokenChosenWhenForced => "WRONG_TOKEN_CHOSEN_WHEN_FORCED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Legality {
    Legal(Board),
    // The answer left the board untouched and indeed nothing can move
    NoMovePossible,
    Illegal(Violation),
}

// One rule set for both variants. Capture is derived from the number of sides on
// the board, the finishing quorum only applies to a single side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RulesEngine {
    pub track_length: usize,
    pub side_count: usize,
    pub tokens_per_side: usize,
}

impl RulesEngine {
    pub fn new(config: &LudoConfig) -> Self {
        RulesEngine {
            track_length: config.track_length,
            side_count: config.side_count,
            tokens_per_side: config.tokens_per_side,
        }
    }

    pub fn new_board(&self) -> Board {
        Board::new(self.track_length, self.side_count, self.tokens_per_side)
    }

    pub fn capture_enabled(&self) -> bool {
        self.side_count > 1
    }

    fn finish_quorum(&self) -> usize {
        if self.side_count > 1 {
            0
        } else {
            FINISH_QUORUM.min(self.tokens_per_side)
        }
    }

    // The single field the token may reach with this roll, if any
    pub fn destination(&self, board: &Board, roll: u8, side: usize, token: Token) -> Option<usize> {
        let position = board.position(token)?;

        if position == 0 {
            if roll != ENTRY_ROLL || board.own_token_at(side, ENTRY_FIELD, token).is_some() {
                return None;
            }
            return Some(ENTRY_FIELD);
        }

        if position >= self.track_length {
            return None;
        }

        let target = position + roll as usize;
        if target > self.track_length || board.own_token_at(side, target, token).is_some() {
            return None;
        }

        if target == self.track_length && board.entered_count(side) < self.finish_quorum() {
            return None;
        }

        Some(target)
    }

    // Every (token, field) pair the side may play with this roll, in token order
    pub fn legal_moves(&self, board: &Board, roll: u8, side: usize) -> Vec<(Token, usize)> {
        board
            .tokens(side)
            .iter()
            .filter_map(|&t| self.destination(board, roll, side, t).map(|p| (t, p)))
            .collect()
    }

    // Judge a proposed move against everything the side could have done. The
    // board is only touched when the move is legal.
    pub fn validate(&self, board: &Board, roll: u8, proposed: &Move, side: usize) -> Result<Legality, InvariantViolation> {
        let tokens = board.tokens(side);
        if proposed.targets.len() != tokens.len() || tokens.iter().any(|t| proposed.target(*t).is_none()) {
            return Err(InvariantViolation::ForeignMove { side });
        }

        let changed: Vec<(Token, usize)> = tokens
            .iter()
            .filter_map(|&t| {
                let target = proposed.target(t)?;
                (board.position(t) != Some(target)).then_some((t, target))
            })
            .collect();
        let legal = self.legal_moves(board, roll, side);

        let (token, target) = match changed.as_slice() {
            [] if legal.is_empty() => return Ok(Legality::NoMovePossible),
            [] => return Ok(Legality::Illegal(Violation::MoveAvailable)),
            [single] => *single,
            _ => return Ok(Legality::Illegal(Violation::MultipleTokensMoved)),
        };

        if legal.contains(&(token, target)) {
            return Ok(Legality::Legal(board.apply(token, target)?));
        }

        Ok(Legality::Illegal(self.diagnose(board, roll, side, token, target, &legal)))
    }

    fn diagnose(&self, board: &Board, roll: u8, side: usize, token: Token, target: usize, legal: &[(Token, usize)]) -> Violation {
        let position = board.position(token).unwrap_or_default();

        if !legal.is_empty() && legal.iter().all(|&(t, _)| t != token) {
            return Violation::WrongTokenChosenWhenForced;
        }

        if position == 0 {
            return if roll != ENTRY_ROLL {
                Violation::NoSixForEntry
            } else if target != ENTRY_FIELD {
                Violation::EntryTargetNotOne
            } else {
                Violation::EntryBlocked
            };
        }

        if position >= self.track_length {
            return Violation::TokenFinished;
        }

        let reach = position + roll as usize;
        if reach > self.track_length {
            Violation::ExceedsTrack
        } else if target != reach {
            Violation::WrongDistance
        } else if board.own_token_at(side, target, token).is_some() {
            Violation::TargetOccupiedSameSide
        } else {
            Violation::FinishRequiresTwoTokens
        }
    }
}
