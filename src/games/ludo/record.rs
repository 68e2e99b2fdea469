use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;

use super::board::Board;
use super::parser::{Move, ParseFailure};
use super::players::ResponseError;
use super::rules::Violation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Accepted,
    InvalidReprompted,
    InvalidAborted,
    SkipForced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EpisodeState {
    InProgress,
    Completed,
    Aborted,
}

// Everything that makes an answer unusable. All of these are recoverable by a
// reprompt while the turn still has budget.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("{}: {0}", .0.code())]
    Parse(#[from] ParseFailure),
    #[error("{0}")]
    Illegal(#[from] Violation),
    #[error("no answer: {0}")]
    External(String),
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::Parse(_) => "PARSE_FAILURE",
            Rejection::Illegal(violation) => violation.code(),
            Rejection::External(_) => "EXTERNAL_RESPONSE_FAILURE",
        }
    }
}

impl From<&ResponseError> for Rejection {
    fn from(err: &ResponseError) -> Self {
        Rejection::External(err.to_string())
    }
}

// One answer to one turn, as seen by whoever scores the episode. Never changed
// once emitted.
#[derive(Debug, Clone, Serialize)]
pub struct TurnRecord {
    pub turn: usize,
    pub side: usize,
    pub attempt: usize,
    pub roll: u8,
    pub raw_response: Option<String>,
    pub parsed_move: Option<Move>,
    pub outcome: Outcome,
    pub reason_code: Option<&'static str>,
    pub detail: Option<String>,
    pub resulting_state: Board,
}

impl TurnRecord {
    pub fn is_valid(&self) -> bool {
        matches!(self.outcome, Outcome::Accepted | Outcome::SkipForced)
    }
}

impl fmt::Display for TurnRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "turn {} side {} attempt {} roll {}: {:?}", self.turn, self.side, self.attempt, self.roll, self.outcome)?;
        if let Some(proposed) = &self.parsed_move {
            write!(f, " [{}]", proposed)?;
        }
        if let Some(code) = self.reason_code {
            write!(f, " ({})", code)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to write turn record: {0}")]
    Write(#[from] jsonl::WriteError),
    #[error("failed to flush turn record: {0}")]
    Flush(#[from] io::Error),
    #[error("play log lock poisoned")]
    Poisoned,
}

// Outward boundary for turn events. The controller emits every record here as
// soon as it is created.
pub trait Recorder {
    fn record(&mut self, record: &TurnRecord) -> Result<(), RecordError>;
}

impl Recorder for Vec<TurnRecord> {
    fn record(&mut self, record: &TurnRecord) -> Result<(), RecordError> {
        self.push(record.clone());
        Ok(())
    }
}

// Discards everything, for callers that only look at the episode afterwards
pub struct NullRecorder;

impl Recorder for NullRecorder {
    fn record(&mut self, _record: &TurnRecord) -> Result<(), RecordError> {
        Ok(())
    }
}

// One line of the JSONL play log
#[derive(Debug, Clone, Serialize)]
pub struct PlayLogLine {
    pub game_id: String,
    #[serde(flatten)]
    pub record: TurnRecord,
}

pub type PlayLog = Vec<PlayLogLine>;

// Shared log for episodes running in parallel
pub struct SharedLog {
    pub game_id: String,
    pub log: Arc<Mutex<PlayLog>>,
}

impl Recorder for SharedLog {
    fn record(&mut self, record: &TurnRecord) -> Result<(), RecordError> {
        self.log
            .lock()
            .map_err(|_| RecordError::Poisoned)?
            .push(PlayLogLine { game_id: self.game_id.clone(), record: record.clone() });
        Ok(())
    }
}

pub struct JsonlRecorder<W: Write> {
    pub game_id: String,
    writer: W,
}

impl<W: Write> JsonlRecorder<W> {
    pub fn new(game_id: impl Into<String>, writer: W) -> Self {
        JsonlRecorder { game_id: game_id.into(), writer }
    }
}

impl<W: Write> Recorder for JsonlRecorder<W> {
    fn record(&mut self, record: &TurnRecord) -> Result<(), RecordError> {
        let line = PlayLogLine { game_id: self.game_id.clone(), record: record.clone() };
        jsonl::write(&mut self.writer, &line)?;
        // Lines have to reach the file even when the episode is cut short
        self.writer.flush()?;
        Ok(())
    }
}

// Per-episode counts derived from the records alone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EpisodeSummary {
    pub turns_played: usize,
    pub accepted_moves: usize,
    pub skipped_turns: usize,
    pub reprompts: usize,
    pub parse_errors: usize,
    pub rule_errors: usize,
    pub external_errors: usize,
}

impl EpisodeSummary {
    pub fn from_records(records: &[TurnRecord]) -> Self {
        let mut summary = EpisodeSummary {
            turns_played: records.iter().map(|r| r.turn + 1).max().unwrap_or(0),
            ..Default::default()
        };

        for record in records {
            match record.outcome {
                Outcome::Accepted => summary.accepted_moves += 1,
                Outcome::SkipForced => summary.skipped_turns += 1,
                Outcome::InvalidReprompted => summary.reprompts += 1,
                Outcome::InvalidAborted => {}
            }

            match record.reason_code {
                Some("PARSE_FAILURE") => summary.parse_errors += 1,
                Some("EXTERNAL_RESPONSE_FAILURE") => summary.external_errors += 1,
                Some(_) => summary.rule_errors += 1,
                None => {}
            }
        }

        summary
    }

    pub fn errors(&self) -> usize {
        self.parse_errors + self.rule_errors + self.external_errors
    }
}
