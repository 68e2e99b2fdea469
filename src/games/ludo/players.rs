use std::collections::VecDeque;
use std::io;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

use super::board::Board;
use super::parser::{format_move, Move};
use super::prompt::Conversation;
use super::record::Rejection;
use super::rules::RulesEngine;

// Everything an answering party gets to see for one attempt
pub struct TurnRequest<'a> {
    pub turn: usize,
    pub side: usize,
    pub roll: u8,
    pub attempt: usize,
    pub board: &'a Board,
    pub conversation: &'a Conversation,
    pub rejection: Option<&'a Rejection>,
}

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("responder unavailable: {0}")]
    Unavailable(String),
    #[error("responder has no answers left")]
    Exhausted,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("interrupted by the user")]
    Interrupted,
}

// The agent under evaluation, or whatever stands in for it. Returns raw text
// which is parsed and judged by the caller.
pub trait Responder {
    fn name(&self) -> &str;
    fn respond(&mut self, request: &TurnRequest) -> Result<String, ResponseError>;
}

impl<R: Responder + ?Sized> Responder for &mut R {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn respond(&mut self, request: &TurnRequest) -> Result<String, ResponseError> {
        (**self).respond(request)
    }
}

impl<R: Responder + ?Sized> Responder for Box<R> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn respond(&mut self, request: &TurnRequest) -> Result<String, ResponseError> {
        (**self).respond(request)
    }
}

// Restate every token of the side, moving at most one
fn answer(board: &Board, side: usize, moved: Option<(super::Token, usize)>) -> String {
    let tokens = board.tokens(side);
    let targets = Move::new(tokens.iter().map(|&t| match moved {
        Some((token, target)) if token == t => (t, target),
        _ => (t, board.position(t).unwrap_or_default()),
    }));
    format_move(tokens, &targets)
}

// Always plays the first legal move in token order
pub struct ProgrammaticPlayer {
    rules: RulesEngine,
}

impl ProgrammaticPlayer {
    pub fn new(rules: RulesEngine) -> Self {
        ProgrammaticPlayer { rules }
    }

    pub fn choose(&self, board: &Board, roll: u8, side: usize) -> String {
        let first = self.rules.legal_moves(board, roll, side).into_iter().next();
        answer(board, side, first)
    }
}

impl Responder for ProgrammaticPlayer {
    fn name(&self) -> &str {
        "programmatic"
    }

    fn respond(&mut self, request: &TurnRequest) -> Result<String, ResponseError> {
        Ok(self.choose(request.board, request.roll, request.side))
    }
}

// Uniformly random legal move
pub struct RandomPlayer {
    rules: RulesEngine,
    rng: ChaCha8Rng,
}

impl RandomPlayer {
    pub fn new(rules: RulesEngine, seed: u64) -> Self {
        RandomPlayer { rules, rng: ChaCha8Rng::seed_from_u64(seed) }
    }
}

impl Responder for RandomPlayer {
    fn name(&self) -> &str {
        "random"
    }

    fn respond(&mut self, request: &TurnRequest) -> Result<String, ResponseError> {
        let legal = self.rules.legal_moves(request.board, request.roll, request.side);
        let moved = if legal.is_empty() {
            None
        } else {
            Some(legal[self.rng.random_range(0..legal.len())])
        };
        Ok(answer(request.board, request.side, moved))
    }
}

// Plays legal moves but makes the mistakes a language agent makes, at the
// given rate per attempt
pub struct NoisyPlayer {
    inner: RandomPlayer,
    error_rate: f64,
}

impl NoisyPlayer {
    pub fn new(rules: RulesEngine, seed: u64, error_rate: f64) -> Self {
        NoisyPlayer { inner: RandomPlayer::new(rules, seed), error_rate: error_rate.clamp(0.0, 1.0) }
    }

    // Single-token moves the rules reject. Near misses of the rolled distance
    // come first, any other illegal field otherwise.
    fn wrong_moves(&self, request: &TurnRequest) -> Vec<(super::Token, usize)> {
        let board = request.board;
        let legal = self.inner.rules.legal_moves(board, request.roll, request.side);
        let roll = request.roll as usize;

        let mut near = Vec::new();
        let mut far = Vec::new();
        for &token in board.tokens(request.side) {
            let from = board.position(token).unwrap_or_default();
            for target in 0..=board.track_length {
                if target == from || legal.contains(&(token, target)) {
                    continue;
                }
                if target + 1 == from + roll || target == from + roll || target == from + roll + 1 {
                    near.push((token, target));
                } else {
                    far.push((token, target));
                }
            }
        }

        if near.is_empty() {
            far
        } else {
            near
        }
    }

    fn mistake(&mut self, request: &TurnRequest) -> String {
        let board = request.board;
        let tokens = board.tokens(request.side);
        let unreadable = format!("I would like to roll again, the {} is not good for me.", request.roll);

        match self.inner.rng.random_range(0..3) {
            0 => unreadable,
            1 if tokens.len() > 1 => {
                let first = Move::new([(tokens[0], board.position(tokens[0]).unwrap_or_default())]);
                format_move(&tokens[..1], &first)
            }
            _ => {
                let wrong = self.wrong_moves(request);
                if wrong.is_empty() {
                    return unreadable;
                }
                let moved = wrong[self.inner.rng.random_range(0..wrong.len())];
                answer(board, request.side, Some(moved))
            }
        }
    }
}

impl Responder for NoisyPlayer {
    fn name(&self) -> &str {
        "noisy"
    }

    fn respond(&mut self, request: &TurnRequest) -> Result<String, ResponseError> {
        if self.inner.rng.random_bool(self.error_rate) {
            return Ok(self.mistake(request));
        }
        self.inner.respond(request)
    }
}

// Replays recorded answers in order. A missing answer stands for a request
// that never got one.
pub struct ScriptedPlayer {
    responses: VecDeque<Result<String, ResponseError>>,
}

impl ScriptedPlayer {
    pub fn new<S: Into<String>>(responses: impl IntoIterator<Item = Option<S>>) -> Self {
        let responses: VecDeque<Result<String, ResponseError>> = responses
            .into_iter()
            .map(|r| r.map(Into::into).ok_or_else(|| ResponseError::Unavailable("no answer recorded".to_string())))
            .collect();
        ScriptedPlayer { responses }
    }
}

impl Responder for ScriptedPlayer {
    fn name(&self) -> &str {
        "scripted"
    }

    fn respond(&mut self, _request: &TurnRequest) -> Result<String, ResponseError> {
        self.responses.pop_front().unwrap_or(Err(ResponseError::Exhausted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::ludo::{parse_move, side_tokens, Legality, LudoConfig, Token};

    fn request<'a>(board: &'a Board, conversation: &'a Conversation, roll: u8) -> TurnRequest<'a> {
        TurnRequest { turn: 0, side: 0, roll, attempt: 0, board, conversation, rejection: None }
    }

    #[test]
    fn test_programmatic_plays_first_legal() {
        let rules = RulesEngine::new(&LudoConfig::default());
        let board = Board::with_positions(23, 1, 2, &[(Token('X'), 4)]).unwrap();
        let conversation = Conversation::default();
        let mut player = ProgrammaticPlayer::new(rules);

        assert_eq!(player.respond(&request(&board, &conversation, 6)).unwrap(), "MY MOVE: X -> 10 ; Y -> 0");
        assert_eq!(player.respond(&request(&board, &conversation, 2)).unwrap(), "MY MOVE: X -> 6 ; Y -> 0");
    }

    #[test]
    fn test_programmatic_restates_when_stuck() {
        let rules = RulesEngine::new(&LudoConfig::default());
        let board = rules.new_board();
        let conversation = Conversation::default();
        let mut player = ProgrammaticPlayer::new(rules);
        assert_eq!(player.respond(&request(&board, &conversation, 3)).unwrap(), "MY MOVE: X -> 0 ; Y -> 0");
    }

    #[test]
    fn test_random_player_only_plays_legal_moves() {
        let rules = RulesEngine::new(&LudoConfig::default());
        let board = Board::with_positions(23, 1, 2, &[(Token('X'), 4), (Token('Y'), 9)]).unwrap();
        let conversation = Conversation::default();
        let mut player = RandomPlayer::new(rules, 3);
        for roll in 1..=6 {
            let text = player.respond(&request(&board, &conversation, roll)).unwrap();
            let mv = parse_move(&text, &side_tokens(0, 2), 23).unwrap();
            assert!(matches!(rules.validate(&board, roll, &mv, 0).unwrap(), Legality::Legal(_)));
        }
    }

    fn assert_noisy_always_wrong(config: &LudoConfig, board: &Board, roll: u8) {
        let rules = RulesEngine::new(config);
        let tokens = side_tokens(0, config.tokens_per_side);
        let conversation = Conversation::default();
        let mut player = NoisyPlayer::new(rules, 11, 1.0);
        for _ in 0..200 {
            let text = player.respond(&request(board, &conversation, roll)).unwrap();
            if let Ok(mv) = parse_move(&text, &tokens, board.track_length) {
                let verdict = rules.validate(board, roll, &mv, 0).unwrap();
                assert!(matches!(verdict, Legality::Illegal(_)), "noisy answer accepted: {}", text);
            }
        }
    }

    #[test]
    fn test_noisy_player_always_wrong_at_full_rate() {
        let config = LudoConfig::default();
        let board = Board::with_positions(23, 1, 2, &[(Token('X'), 4)]).unwrap();
        assert_noisy_always_wrong(&config, &board, 2);

        // One field short of home, where overshooting used to clamp onto the legal target
        let board = Board::with_positions(23, 1, 2, &[(Token('X'), 22), (Token('Y'), 5)]).unwrap();
        assert_noisy_always_wrong(&config, &board, 1);

        let board = Board::with_positions(23, 1, 2, &[(Token('X'), 23), (Token('Y'), 5)]).unwrap();
        assert_noisy_always_wrong(&config, &board, 1);
        assert_noisy_always_wrong(&config, &board, 3);
    }

    #[test]
    fn test_noisy_player_single_token_side() {
        let config = LudoConfig { tokens_per_side: 1, ..Default::default() };
        let board = Board::with_positions(23, 1, 1, &[(Token('X'), 4)]).unwrap();
        assert_noisy_always_wrong(&config, &board, 2);

        let board = Board::new(23, 1, 1);
        assert_noisy_always_wrong(&config, &board, 6);
        assert_noisy_always_wrong(&config, &board, 4);
    }

    #[test]
    fn test_scripted_player_runs_out() {
        let board = Board::new(23, 1, 2);
        let conversation = Conversation::default();
        let mut player = ScriptedPlayer::new([Some("MY MOVE: X -> 0 ; Y -> 0"), None]);

        assert!(player.respond(&request(&board, &conversation, 1)).is_ok());
        assert!(matches!(
            player.respond(&request(&board, &conversation, 1)),
            Err(ResponseError::Unavailable(_))
        ));
        assert!(matches!(player.respond(&request(&board, &conversation, 1)), Err(ResponseError::Exhausted)));
    }
}
