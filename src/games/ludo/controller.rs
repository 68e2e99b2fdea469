use anyhow::{bail, Result};
use log::{debug, info};
use thiserror::Error;

use super::board::{Board, InvariantViolation};
use super::config::LudoConfig;
use super::dice::Dice;
use super::parser::{parse_move, Move};
use super::players::{Responder, TurnRequest};
use super::prompt::{reprompt, turn_prompt, Conversation, Role};
use super::record::{EpisodeState, EpisodeSummary, Outcome, RecordError, Recorder, Rejection, TurnRecord};
use super::rules::{Legality, RulesEngine};
use super::side_tokens;
use crate::games::{GameState, Validate};

// Failures of the engine itself. An aborted episode is not one of these.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine invariant broken: {0}")]
    Invariant(#[from] InvariantViolation),
    #[error(transparent)]
    Record(#[from] RecordError),
}

// Where one side's turn currently stands. Every phase carries what the next
// step needs, so a turn is a plain loop over `Episode::step`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    AwaitingRoll,
    AwaitingResponse {
        roll: u8,
        attempt: usize,
        rejection: Option<Rejection>,
    },
    Parsing {
        roll: u8,
        attempt: usize,
        response: String,
    },
    Validating {
        roll: u8,
        attempt: usize,
        response: String,
        proposed: Move,
    },
    Applied {
        roll: u8,
        attempt: usize,
        response: String,
        proposed: Move,
        next: Board,
    },
    Reprompt {
        roll: u8,
        attempt: usize,
        response: Option<String>,
        proposed: Option<Move>,
        rejection: Rejection,
    },
    Abort {
        roll: u8,
        attempt: usize,
        response: Option<String>,
        proposed: Option<Move>,
        rejection: Rejection,
    },
    Skipped {
        roll: u8,
        attempt: usize,
        response: String,
        proposed: Move,
    },
    Done,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::AwaitingRoll => "AWAITING_ROLL",
            Phase::AwaitingResponse { .. } => "AWAITING_RESPONSE",
            Phase::Parsing { .. } => "PARSING",
            Phase::Validating { .. } => "VALIDATING",
            Phase::Applied { .. } => "APPLIED",
            Phase::Reprompt { .. } => "REPROMPT",
            Phase::Abort { .. } => "ABORT",
            Phase::Skipped { .. } => "SKIPPED",
            Phase::Done => "DONE",
        }
    }
}

// One game between the configured sides. Owns the board, the dice and the
// responders; every answer ends up as a record both here and in the recorder.
pub struct Episode<'a> {
    config: LudoConfig,
    rules: RulesEngine,
    board: Board,
    dice: Vec<Dice>,
    players: Vec<Box<dyn Responder + 'a>>,
    conversations: Vec<Conversation>,
    turns: Vec<TurnRecord>,
    turn: usize,
    state: EpisodeState,
    winner: Option<usize>,
    dice_exhausted: bool,
}

impl<'a> Episode<'a> {
    pub fn new(config: LudoConfig, players: Vec<Box<dyn Responder + 'a>>) -> Result<Self> {
        config.validate()?;
        if players.len() != config.side_count {
            bail!("{} players given for {} sides", players.len(), config.side_count);
        }

        let rules = RulesEngine::new(&config);
        let conversations = (0..config.side_count)
            .map(|side| Conversation::new(&config, &side_tokens(side, config.tokens_per_side)))
            .collect();

        Ok(Episode {
            board: rules.new_board(),
            dice: Dice::for_sides(&config.dice, config.side_count),
            rules,
            players,
            conversations,
            turns: Vec::new(),
            turn: 0,
            state: EpisodeState::InProgress,
            winner: None,
            dice_exhausted: false,
            config,
        })
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn state(&self) -> EpisodeState {
        self.state
    }

    pub fn winner(&self) -> Option<usize> {
        self.winner
    }

    pub fn turn(&self) -> usize {
        self.turn
    }

    pub fn turns(&self) -> &[TurnRecord] {
        &self.turns
    }

    pub fn conversation(&self, side: usize) -> &Conversation {
        &self.conversations[side]
    }

    pub fn player_name(&self, side: usize) -> &str {
        self.players[side].name()
    }

    pub fn summary(&self) -> EpisodeSummary {
        EpisodeSummary::from_records(&self.turns)
    }

    fn is_running(&self) -> bool {
        self.state == EpisodeState::InProgress && !self.dice_exhausted
    }

    // Play turns until the episode ends or the turn cap is reached
    pub fn play(&mut self, recorder: &mut dyn Recorder) -> Result<EpisodeState, EngineError> {
        while self.turn < self.config.max_turns && self.play_turn(recorder)? {}
        Ok(self.state)
    }

    // One full turn: every side acts once, in side order. Returns whether the
    // episode can go on.
    pub fn play_turn(&mut self, recorder: &mut dyn Recorder) -> Result<bool, EngineError> {
        if !self.is_running() {
            return Ok(false);
        }

        for side in 0..self.rules.side_count {
            let mut phase = Phase::AwaitingRoll;
            while phase != Phase::Done {
                let next = self.step(side, phase, recorder)?;
                debug!("Turn {} side {}: {}", self.turn, side, next.name());
                phase = next;
            }

            if !self.is_running() {
                break;
            }
        }

        self.turn += 1;
        Ok(self.is_running())
    }

    fn reject(&self, roll: u8, attempt: usize, response: Option<String>, proposed: Option<Move>, rejection: Rejection) -> Phase {
        info!(
            "Turn {} attempt {} rejected: {} ({})",
            self.turn,
            attempt,
            rejection.code(),
            rejection
        );

        if attempt < self.config.max_reprompts_per_turn {
            Phase::Reprompt { roll, attempt, response, proposed, rejection }
        } else {
            Phase::Abort { roll, attempt, response, proposed, rejection }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &mut self,
        recorder: &mut dyn Recorder,
        side: usize,
        roll: u8,
        attempt: usize,
        response: Option<String>,
        proposed: Option<Move>,
        outcome: Outcome,
        rejection: Option<&Rejection>,
    ) -> Result<(), EngineError> {
        let record = TurnRecord {
            turn: self.turn,
            side,
            attempt,
            roll,
            raw_response: response,
            parsed_move: proposed,
            outcome,
            reason_code: rejection.map(Rejection::code),
            detail: rejection.map(ToString::to_string),
            resulting_state: self.board.clone(),
        };
        debug!("{}", record);
        recorder.record(&record)?;
        self.turns.push(record);
        Ok(())
    }

    fn step(&mut self, side: usize, phase: Phase, recorder: &mut dyn Recorder) -> Result<Phase, EngineError> {
        let next = match phase {
            Phase::AwaitingRoll => match self.dice[side].roll() {
                Some(roll) => {
                    let prompt = turn_prompt(&self.config, &self.board, self.turn + 1, roll);
                    self.conversations[side].push(Role::User, &prompt);
                    Phase::AwaitingResponse { roll, attempt: 0, rejection: None }
                }
                None => {
                    info!("Dice of side {} ran out at turn {}", side, self.turn);
                    self.dice_exhausted = true;
                    Phase::Done
                }
            },

            Phase::AwaitingResponse { roll, attempt, rejection } => {
                let request = TurnRequest {
                    turn: self.turn,
                    side,
                    roll,
                    attempt,
                    board: &self.board,
                    conversation: &self.conversations[side],
                    rejection: rejection.as_ref(),
                };

                match self.players[side].respond(&request) {
                    Ok(response) => {
                        self.conversations[side].push(Role::Assistant, &response);
                        Phase::Parsing { roll, attempt, response }
                    }
                    Err(err) => self.reject(roll, attempt, None, None, Rejection::from(&err)),
                }
            }

            Phase::Parsing { roll, attempt, response } => {
                let tokens = self.board.tokens(side);
                match parse_move(&response, tokens, self.rules.track_length) {
                    Ok(proposed) => Phase::Validating { roll, attempt, response, proposed },
                    Err(failure) => self.reject(roll, attempt, Some(response), None, failure.into()),
                }
            }

            Phase::Validating { roll, attempt, response, proposed } => {
                match self.rules.validate(&self.board, roll, &proposed, side)? {
                    Legality::Legal(next) => Phase::Applied { roll, attempt, response, proposed, next },
                    Legality::NoMovePossible => Phase::Skipped { roll, attempt, response, proposed },
                    Legality::Illegal(violation) => {
                        self.reject(roll, attempt, Some(response), Some(proposed), violation.into())
                    }
                }
            }

            Phase::Applied { roll, attempt, response, proposed, next } => {
                self.board = next;
                if let Some(winner) = self.board.winner() {
                    info!("Side {} finished at turn {}", winner, self.turn);
                    self.state = EpisodeState::Completed;
                    self.winner = Some(winner);
                }
                self.emit(recorder, side, roll, attempt, Some(response), Some(proposed), Outcome::Accepted, None)?;
                Phase::Done
            }

            Phase::Skipped { roll, attempt, response, proposed } => {
                self.emit(recorder, side, roll, attempt, Some(response), Some(proposed), Outcome::SkipForced, None)?;
                Phase::Done
            }

            Phase::Reprompt { roll, attempt, response, proposed, rejection } => {
                let message = reprompt(&self.config, &self.board, side, roll, &rejection, proposed.as_ref());
                self.emit(recorder, side, roll, attempt, response, proposed, Outcome::InvalidReprompted, Some(&rejection))?;
                self.conversations[side].push(Role::User, &message);
                Phase::AwaitingResponse { roll, attempt: attempt + 1, rejection: Some(rejection) }
            }

            Phase::Abort { roll, attempt, response, proposed, rejection } => {
                info!("Episode aborted at turn {} after {} invalid answers", self.turn, attempt + 1);
                self.emit(recorder, side, roll, attempt, response, proposed, Outcome::InvalidAborted, Some(&rejection))?;
                self.state = EpisodeState::Aborted;
                Phase::Done
            }

            Phase::Done => Phase::Done,
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::ludo::players::{ProgrammaticPlayer, ScriptedPlayer};
    use crate::games::ludo::{DiceConfig, Token};

    fn config(rolls: Vec<Vec<u8>>) -> LudoConfig {
        LudoConfig { side_count: rolls.len(), dice: DiceConfig::Scripted(rolls), ..Default::default() }
    }

    fn scripted(responses: &[&str]) -> Box<dyn Responder> {
        Box::new(ScriptedPlayer::new(responses.iter().map(|&r| Some(r))))
    }

    #[test]
    fn test_parse_failure_reprompts_with_board_unchanged() {
        let mut episode = Episode::new(
            config(vec![vec![6]]),
            vec![scripted(&["I move X to 1", "MY MOVE: X -> 1 ; Y -> 0"])],
        )
        .unwrap();
        let mut records: Vec<TurnRecord> = Vec::new();
        episode.play_turn(&mut records).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].outcome, Outcome::InvalidReprompted);
        assert_eq!(records[0].reason_code, Some("PARSE_FAILURE"));
        assert_eq!(records[0].resulting_state.position(Token('X')), Some(0));
        assert_eq!(records[1].outcome, Outcome::Accepted);
        assert_eq!(records[1].attempt, 1);
        assert_eq!(records[1].roll, 6);
        assert_eq!(episode.board().position(Token('X')), Some(1));
        assert_eq!(episode.turns().len(), 2);

        let reprompted = episode
            .conversation(0)
            .messages()
            .iter()
            .any(|m| m.role == Role::User && m.content.contains("INVALID MOVE"));
        assert!(reprompted);
    }

    #[test]
    fn test_budget_allows_max_plus_one_invalid_answers() {
        let mut episode = Episode::new(config(vec![vec![6, 6]]), vec![scripted(&["no", "still no", "never", "MY MOVE: X -> 1 ; Y -> 0"])])
            .unwrap();
        let mut records: Vec<TurnRecord> = Vec::new();

        assert!(!episode.play_turn(&mut records).unwrap());
        let outcomes: Vec<Outcome> = records.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![Outcome::InvalidReprompted, Outcome::InvalidReprompted, Outcome::InvalidAborted]
        );
        assert_eq!(episode.state(), EpisodeState::Aborted);
        assert!(!episode.play_turn(&mut records).unwrap());
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_no_reprompts_aborts_on_first_error() {
        let mut settings = config(vec![vec![6]]);
        settings.max_reprompts_per_turn = 0;
        let mut episode = Episode::new(settings, vec![scripted(&["MY MOVE: X -> 6 ; Y -> 0"])]).unwrap();
        let mut records: Vec<TurnRecord> = Vec::new();
        episode.play_turn(&mut records).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, Outcome::InvalidAborted);
        assert_eq!(records[0].reason_code, Some("ENTRY_TARGET_NOT_ONE"));
        assert_eq!(episode.state(), EpisodeState::Aborted);
    }

    #[test]
    fn test_forced_skip_uses_no_budget() {
        let mut episode = Episode::new(
            config(vec![vec![3, 6]]),
            vec![scripted(&["MY MOVE: X -> 0 ; Y -> 0", "MY MOVE: X -> 0 ; Y -> 0", "MY MOVE: X -> 1 ; Y -> 0"])],
        )
        .unwrap();
        let mut records: Vec<TurnRecord> = Vec::new();
        episode.play_turn(&mut records).unwrap();
        episode.play_turn(&mut records).unwrap();

        assert_eq!(records[0].outcome, Outcome::SkipForced);
        assert_eq!(records[0].reason_code, None);
        assert_eq!(records[1].outcome, Outcome::InvalidReprompted);
        assert_eq!(records[1].reason_code, Some("MOVE_AVAILABLE"));
        assert_eq!(records[2].outcome, Outcome::Accepted);
        assert_eq!(episode.summary().skipped_turns, 1);
        assert_eq!(episode.summary().reprompts, 1);
    }

    #[test]
    fn test_external_failure_is_recorded() {
        let player = ScriptedPlayer::new([None, Some("MY MOVE: X -> 1 ; Y -> 0")]);
        let players: Vec<Box<dyn Responder>> = vec![Box::new(player)];
        let mut episode = Episode::new(config(vec![vec![6]]), players).unwrap();
        let mut records: Vec<TurnRecord> = Vec::new();
        episode.play_turn(&mut records).unwrap();

        assert_eq!(records[0].raw_response, None);
        assert_eq!(records[0].reason_code, Some("EXTERNAL_RESPONSE_FAILURE"));
        assert_eq!(records[0].outcome, Outcome::InvalidReprompted);
        assert_eq!(records[1].outcome, Outcome::Accepted);
        assert_eq!(episode.summary().external_errors, 1);
    }

    #[test]
    fn test_completes_when_side_finishes() {
        let settings = LudoConfig {
            track_length: 2,
            tokens_per_side: 1,
            dice: DiceConfig::Scripted(vec![vec![6, 1, 1]]),
            ..Default::default()
        };
        let rules = RulesEngine::new(&settings);
        let players: Vec<Box<dyn Responder>> = vec![Box::new(ProgrammaticPlayer::new(rules))];
        let mut episode = Episode::new(settings, players).unwrap();
        let mut records: Vec<TurnRecord> = Vec::new();

        assert_eq!(episode.play(&mut records).unwrap(), EpisodeState::Completed);
        assert_eq!(episode.winner(), Some(0));
        assert_eq!(episode.turn(), 2);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(TurnRecord::is_valid));
    }

    #[test]
    fn test_exhausted_dice_leave_episode_in_progress() {
        let rules = RulesEngine::new(&LudoConfig::default());
        let players: Vec<Box<dyn Responder>> = vec![Box::new(ProgrammaticPlayer::new(rules))];
        let mut episode = Episode::new(config(vec![vec![6, 2]]), players).unwrap();
        let mut records: Vec<TurnRecord> = Vec::new();

        assert_eq!(episode.play(&mut records).unwrap(), EpisodeState::InProgress);
        assert_eq!(records.len(), 2);
        assert_eq!(episode.board().position(Token('X')), Some(3));
    }

    #[test]
    fn test_two_sides_take_turns_and_capture() {
        let settings = LudoConfig {
            side_count: 2,
            tokens_per_side: 1,
            dice: DiceConfig::Scripted(vec![vec![6, 2], vec![6, 3]]),
            ..Default::default()
        };
        let rules = RulesEngine::new(&settings);
        let players: Vec<Box<dyn Responder>> =
            vec![Box::new(ProgrammaticPlayer::new(rules)), Box::new(ProgrammaticPlayer::new(rules))];
        let mut episode = Episode::new(settings, players).unwrap();
        let mut records: Vec<TurnRecord> = Vec::new();

        episode.play_turn(&mut records).unwrap();
        assert_eq!(episode.board().position(Token('X')), Some(0));
        assert_eq!(episode.board().position(Token('A')), Some(1));
        assert_eq!(records[0].side, 0);
        assert_eq!(records[1].side, 1);

        episode.play_turn(&mut records).unwrap();
        assert_eq!(records[2].outcome, Outcome::SkipForced);
        assert_eq!(episode.board().position(Token('A')), Some(4));
        assert_eq!(episode.state(), EpisodeState::InProgress);
    }

    #[test]
    fn test_player_count_must_match_sides() {
        let settings = LudoConfig { side_count: 2, ..Default::default() };
        assert!(Episode::new(settings, vec![scripted(&[])]).is_err());
    }
}
