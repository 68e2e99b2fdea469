use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use super::{Token, MOVE_MARKER, PAIR_DELIMITER};

// One `<token> -> <integer>` assignment at the start of the remaining text
static PAIR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Za-z])\s*->\s*(\d+)").expect("Move pair pattern must compile"));

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ParseFailure {
    #[error("the answer does not contain '{}'", MOVE_MARKER)]
    MissingMarker,
    #[error("assignment {index} after the marker is not of the form '<token> -> <field>'")]
    MalformedPair { index: usize },
    #[error("expected '{}' between assignments", PAIR_DELIMITER)]
    MissingDelimiter { index: usize },
    #[error("token {0} does not belong to you")]
    UnknownToken(char),
    #[error("token {0} is assigned more than once")]
    DuplicateToken(char),
    #[error("field {position} for token {token} is not a number between 0 and {track_length}")]
    OutOfRange { token: char, position: String, track_length: usize },
}

impl ParseFailure {
    pub fn code(&self) -> &'static str {
        match self {
            ParseFailure::MissingMarker => "MISSING_MARKER",
            ParseFailure::MalformedPair { .. } => "MALFORMED_PAIR",
            ParseFailure::MissingDelimiter { .. } => "MISSING_DELIMITER",
            ParseFailure::UnknownToken(_) => "UNKNOWN_TOKEN",
            ParseFailure::DuplicateToken(_) => "DUPLICATE_TOKEN",
            ParseFailure::OutOfRange { .. } => "OUT_OF_RANGE",
        }
    }
}

// Requested field for every token of the acting side. Tokens that should stay
// put are restated at their current field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Move {
    pub targets: BTreeMap<Token, usize>,
}

impl Move {
    pub fn new(targets: impl IntoIterator<Item = (Token, usize)>) -> Self {
        Move { targets: targets.into_iter().collect() }
    }

    pub fn target(&self, token: Token) -> Option<usize> {
        self.targets.get(&token).copied()
    }
}

// Canonical answer form, tokens in the order they are given
pub fn format_move(tokens: &[Token], targets: &Move) -> String {
    let pairs: Vec<String> = tokens
        .iter()
        .filter_map(|&t| targets.target(t).map(|p| format!("{} -> {}", t, p)))
        .collect();

    format!("{} {}", MOVE_MARKER, pairs.join(&format!(" {} ", PAIR_DELIMITER)))
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tokens: Vec<Token> = self.targets.keys().copied().collect();
        write!(f, "{}", format_move(&tokens, self))
    }
}

// Extract the move from a free-form answer. Anything before a marker is
// reasoning and ignored, as is anything after the final expected assignment.
// The first marker followed by a complete assignment wins; when none is, the
// failure reported is the one of the last marker.
// Every owned token has to be assigned exactly once.
pub fn parse_move(text: &str, tokens: &[Token], track_length: usize) -> Result<Move, ParseFailure> {
    let mut failure = ParseFailure::MissingMarker;

    for (start, _) in text.match_indices(MOVE_MARKER) {
        match parse_pairs(&text[start + MOVE_MARKER.len()..], tokens, track_length) {
            Ok(mv) => return Ok(mv),
            Err(e) => failure = e,
        }
    }

    Err(failure)
}

fn parse_pairs(mut rest: &str, tokens: &[Token], track_length: usize) -> Result<Move, ParseFailure> {
    let mut targets: BTreeMap<Token, usize> = BTreeMap::new();

    for index in 0..tokens.len() {
        if index > 0 {
            rest = rest
                .trim_start()
                .strip_prefix(PAIR_DELIMITER)
                .ok_or(ParseFailure::MissingDelimiter { index })?;
        }

        let caps = PAIR_REGEX
            .captures(rest)
            .ok_or(ParseFailure::MalformedPair { index })?;
        let symbol = caps[1].chars().next().ok_or(ParseFailure::MalformedPair { index })?;
        let token = Token(symbol);

        if !tokens.contains(&token) {
            return Err(ParseFailure::UnknownToken(symbol));
        }

        let position = caps[2]
            .parse::<usize>()
            .ok()
            .filter(|&p| p <= track_length)
            .ok_or_else(|| ParseFailure::OutOfRange {
                token: symbol,
                position: caps[2].to_string(),
                track_length,
            })?;

        if targets.insert(token, position).is_some() {
            return Err(ParseFailure::DuplicateToken(symbol));
        }

        rest = &rest[caps.get(0).map_or(0, |m| m.end())..];
    }

    Ok(Move { targets })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xy() -> Vec<Token> {
        vec![Token('X'), Token('Y')]
    }

    #[test]
    fn test_parse_canonical() {
        let mv = parse_move("MY MOVE: X -> 1 ; Y -> 0", &xy(), 23).unwrap();
        assert_eq!(mv.target(Token('X')), Some(1));
        assert_eq!(mv.target(Token('Y')), Some(0));
    }

    #[test]
    fn test_parse_ignores_reasoning_and_trailing_text() {
        let text = "I rolled a six so I should bring a token out.\nMY MOVE: X -> 1 ; Y -> 0\nX -> 5 would be wrong.";
        let mv = parse_move(text, &xy(), 23).unwrap();
        assert_eq!(mv, Move::new([(Token('X'), 1), (Token('Y'), 0)]));
    }

    #[test]
    fn test_parse_skips_quoted_template() {
        let text = "Format is MY MOVE: X -> a ; Y -> b, so\nMY MOVE: X -> 7 ; Y -> 3";
        let mv = parse_move(text, &xy(), 23).unwrap();
        assert_eq!(mv.target(Token('X')), Some(7));
    }

    #[test]
    fn test_parse_first_complete_answer_wins() {
        let text = "MY MOVE: X -> 1 ; Y -> 0\nIf I had rolled differently: MY MOVE: X -> 0 ; Y -> 1";
        let mv = parse_move(text, &xy(), 23).unwrap();
        assert_eq!(mv, Move::new([(Token('X'), 1), (Token('Y'), 0)]));
    }

    #[test]
    fn test_parse_reports_last_marker_failure() {
        let text = "MY MOVE: X -> a ; Y -> b\nMY MOVE: X -> 1";
        assert_eq!(parse_move(text, &xy(), 23), Err(ParseFailure::MissingDelimiter { index: 1 }));
    }

    #[test]
    fn test_parse_any_order_and_spacing() {
        let mv = parse_move("MY MOVE:Y->4;X->  9", &xy(), 23).unwrap();
        assert_eq!(mv, Move::new([(Token('X'), 9), (Token('Y'), 4)]));
    }

    #[test]
    fn test_parse_missing_marker() {
        assert_eq!(parse_move("X -> 1 ; Y -> 0", &xy(), 23), Err(ParseFailure::MissingMarker));
    }

    #[test]
    fn test_parse_omitted_token() {
        assert_eq!(
            parse_move("MY MOVE: X -> 1", &xy(), 23),
            Err(ParseFailure::MissingDelimiter { index: 1 })
        );
        assert_eq!(
            parse_move("MY MOVE: X -> 1 ;", &xy(), 23),
            Err(ParseFailure::MalformedPair { index: 1 })
        );
    }

    #[test]
    fn test_parse_duplicate_and_unknown() {
        assert_eq!(
            parse_move("MY MOVE: X -> 1 ; X -> 0", &xy(), 23),
            Err(ParseFailure::DuplicateToken('X'))
        );
        assert_eq!(
            parse_move("MY MOVE: X -> 1 ; A -> 0", &xy(), 23),
            Err(ParseFailure::UnknownToken('A'))
        );
    }

    #[test]
    fn test_parse_out_of_range() {
        assert!(matches!(
            parse_move("MY MOVE: X -> 24 ; Y -> 0", &xy(), 23),
            Err(ParseFailure::OutOfRange { token: 'X', .. })
        ));
        assert!(matches!(
            parse_move("MY MOVE: X -> 99999999999999999999999 ; Y -> 0", &xy(), 23),
            Err(ParseFailure::OutOfRange { .. })
        ));
        assert_eq!(
            parse_move("MY MOVE: X -> -1 ; Y -> 0", &xy(), 23),
            Err(ParseFailure::MalformedPair { index: 0 })
        );
    }

    #[test]
    fn test_format_move_parses_back() {
        let mv = Move::new([(Token('X'), 12), (Token('Y'), 0)]);
        let text = format_move(&xy(), &mv);
        assert_eq!(text, "MY MOVE: X -> 12 ; Y -> 0");
        assert_eq!(parse_move(&text, &xy(), 23), Ok(mv));
    }
}
