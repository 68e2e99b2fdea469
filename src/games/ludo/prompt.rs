use serde::Serialize;

use super::board::Board;
use super::config::LudoConfig;
use super::parser::{format_move, Move, ParseFailure};
use super::record::Rejection;
use super::rules::{RulesEngine, Violation};
use super::{Token, MOVE_MARKER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

// Chat context for one side. Consecutive messages of the same role are folded
// into one so the history always alternates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(config: &LudoConfig, tokens: &[Token]) -> Self {
        let mut conversation = Conversation::default();
        conversation.push(Role::System, "You are playing a board game of Ludo. Answer with your move in the exact format you are given.");
        conversation.push(Role::User, &describe_game(config, tokens));
        conversation
    }

    pub fn push(&mut self, role: Role, content: &str) {
        match self.messages.last_mut() {
            Some(last) if last.role == role => {
                last.content.push('\n');
                last.content.push_str(content);
            }
            _ => self.messages.push(Message { role, content: content.to_string() }),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }
}

fn token_list(tokens: &[Token]) -> String {
    let names: Vec<String> = tokens.iter().map(Token::to_string).collect();
    names.join(", ")
}

fn describe_game(config: &LudoConfig, tokens: &[Token]) -> String {
    let example = Move::new(tokens.iter().enumerate().map(|(i, &t)| (t, if i == 0 { 1 } else { 0 })));
    let mut text = format!(
        "The board is a single track of {} fields. Your tokens are {}. All of them start off the board on field 0. \
         A token can only be played to field 1 on a roll of 6. Every other move takes exactly one token forward by the \
         number rolled, and no move may go past field {}. Two of your tokens may not share a field, except the last one. \
         If no token can move, restate all tokens where they are.",
        config.track_length,
        token_list(tokens),
        config.track_length,
    );

    if RulesEngine::new(config).capture_enabled() {
        text.push_str(" You play against an opponent. Landing on a field held by an opponent token sends it back to field 0.");
    } else if tokens.len() > 1 {
        text.push_str(" At least two of your tokens have to be played to the board before one can reach the last field.");
    }

    text.push_str(&format!(
        " The game ends when all your tokens are on field {}. Give the field of every token after your move, for example: {}",
        config.track_length,
        format_move(tokens, &example),
    ));

    if config.cot_enabled {
        text.push_str(" Think step by step first, then finish your answer with the line starting with ");
        text.push_str(MOVE_MARKER);
    }

    text
}

fn state_line(config: &LudoConfig, board: &Board) -> String {
    if config.board_representation_enabled {
        format!("Current state: {}\n", board.render())
    } else {
        String::new()
    }
}

pub fn turn_prompt(config: &LudoConfig, board: &Board, turn: usize, roll: u8) -> String {
    format!(
        "{}Turn number: {}, Roll: {}. Where will you move your token?",
        state_line(config, board),
        turn,
        roll
    )
}

// Name the mistake as specifically as the rejection allows
fn describe_rejection(config: &LudoConfig, board: &Board, side: usize, roll: u8, rejection: &Rejection, proposed: Option<&Move>) -> String {
    let moved: Option<Token> = proposed.and_then(|mv| {
        board
            .tokens(side)
            .iter()
            .copied()
            .find(|&t| mv.target(t).is_some_and(|p| board.position(t) != Some(p)))
    });

    match (rejection, moved) {
        (Rejection::Illegal(Violation::MultipleTokensMoved), _) if board.tokens(side).len() > 2 => {
            "More than one token was moved simultaneously.".to_string()
        }
        (Rejection::Illegal(Violation::MultipleTokensMoved), _) => {
            "Both of your in-play tokens were moved simultaneously.".to_string()
        }
        (Rejection::Illegal(Violation::MoveAvailable), _) => {
            match RulesEngine::new(config).legal_moves(board, roll, side).first() {
                Some(&(token, _)) if board.position(token) == Some(0) => {
                    format!("Token {} can be played to the board but wasn't.", token)
                }
                Some(&(token, _)) => format!("Token {} can be moved but wasn't.", token),
                None => format!("{}.", Violation::MoveAvailable),
            }
        }
        (Rejection::Illegal(violation), Some(token)) => format!("Token {} was moved incorrectly: {}.", token, violation),
        (Rejection::Illegal(violation), None) => format!("{}.", violation),
        (Rejection::Parse(ParseFailure::MissingMarker), _) => {
            format!("Your answer has to contain '{}' followed by the field of every token.", MOVE_MARKER)
        }
        (Rejection::Parse(failure), _) => format!("Your answer could not be read: {}.", failure),
        (Rejection::External(_), _) => "No answer was received.".to_string(),
    }
}

pub fn reprompt(config: &LudoConfig, board: &Board, side: usize, roll: u8, rejection: &Rejection, proposed: Option<&Move>) -> String {
    format!(
        "INVALID MOVE: {} Please try again.\n{}Roll: {}.",
        describe_rejection(config, board, side, roll, rejection, proposed),
        state_line(config, board),
        roll
    )
}
