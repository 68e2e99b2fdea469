// Linear Ludo played against a language agent. One track of fixed length, up to
// two sides, tokens enter on a six and capture by landing on an opponent.

pub mod board;
pub mod config;
pub mod controller;
pub mod dice;
pub mod parser;
pub mod players;
pub mod prompt;
pub mod record;
pub mod rules;
pub mod solver;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use board::{Board, InvariantViolation};
pub use config::{DiceConfig, Instance, LudoConfig};
pub use controller::{EngineError, Episode, Phase};
pub use dice::Dice;
pub use parser::{parse_move, Move, ParseFailure};
pub use players::{Responder, ResponseError, TurnRequest};
pub use record::{EpisodeState, EpisodeSummary, Outcome, Recorder, Rejection, TurnRecord};
pub use rules::{Legality, RulesEngine, Violation};

pub const DEFAULT_TRACK_LENGTH: usize = 23;
pub const MAX_TOKENS_PER_SIDE: usize = 4;

// Literal that has to precede the token assignments in an answer
pub const MOVE_MARKER: &str = "MY MOVE:";
pub const PAIR_DELIMITER: char = ';';

const SIDE_SYMBOLS: [[char; MAX_TOKENS_PER_SIDE]; 2] = [
    ['X', 'Y', 'Z', 'W'],
    ['A', 'B', 'C', 'D'],
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Token(pub char);

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Tokens owned by the given side, in their canonical order. Side 0 is always
// the agent under evaluation.
pub fn side_tokens(side: usize, count: usize) -> Vec<Token> {
    SIDE_SYMBOLS[side]
        .iter()
        .take(count)
        .map(|&c| Token(c))
        .collect()
}
