use std::mem;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{self, Modifier, Style};
use ratatui::text::Span;
use ratatui::widgets::Wrap;
use ratatui::DefaultTerminal;

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Stylize,
    symbols::border,
    text::{Line, Text},
    widgets::{Block, Paragraph, Widget},
};

use crate::games::ludo::players::ProgrammaticPlayer;
use crate::games::ludo::prompt::{Message, Role};
use crate::games::ludo::{Board, EpisodeState, EpisodeSummary, Responder, ResponseError, RulesEngine, TurnRequest};

// How the episode ended, for the last screen
#[derive(Clone)]
pub struct Ending {
    pub state: EpisodeState,
    pub winner: Option<usize>,
    pub summary: EpisodeSummary,
}

#[derive(Clone)]
pub struct InteractiveApp {
    pub board: Board,
    pub turn: usize,
    pub side: usize,
    pub roll: Option<u8>,
    pub attempt: usize,
    pub transcript: Vec<Message>,
    pub input: String,
    pub rejection: Option<String>,
    pub ending: Option<Ending>,
}

fn role_span(role: Role) -> Span<'static> {
    match role {
        Role::System => Span::styled(" system ", Style::default().fg(style::Color::Gray)),
        Role::User => Span::styled(" game   ", Style::default().fg(style::Color::Blue)).bold(),
        Role::Assistant => Span::styled(" you    ", Style::default().fg(style::Color::Green)).bold(),
    }
}

// Token symbols on their fields, agent side first
fn positions_line(board: &Board) -> Line<'static> {
    let mut spans = vec![" ".into()];
    for side in 0..board.side_count() {
        let color = if side == 0 { style::Color::Green } else { style::Color::Red };
        for &token in board.tokens(side) {
            let position = board.position(token).unwrap_or_default();
            spans.push(Span::styled(format!("{}", token), Style::default().fg(color)).bold());
            spans.push(format!(": {}  ", position).into());
        }
    }
    Line::from(spans)
}

impl Widget for InteractiveApp {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(5),
                Constraint::Min(6),
                Constraint::Length(4),
            ])
            .split(area);

        let status = match &self.ending {
            Some(ending) if ending.state == EpisodeState::Completed => {
                Span::styled(" GAME OVER ", Style::default().fg(style::Color::Red)).bold().add_modifier(Modifier::SLOW_BLINK | Modifier::REVERSED)
            }
            Some(_) => Span::styled(" STOPPED ", Style::default().fg(style::Color::Red)).bold().add_modifier(Modifier::REVERSED),
            None => Span::styled(" GAME RUNNING ", Style::default().fg(style::Color::Blue)).bold().add_modifier(Modifier::REVERSED),
        };

        let mut header = vec![
            " ".into(),
            status,
            format!(" Turn: {}, ", self.turn + 1).into(),
            format!("Side: {}, ", self.side).into(),
        ];
        if let Some(roll) = self.roll {
            header.push("Roll: ".into());
            header.push(Span::styled(format!("{}", roll), Style::default().fg(style::Color::Yellow)).bold());
            header.push(format!(", Attempt: {}", self.attempt + 1).into());
        }

        Paragraph::new(Text::from(vec![Line::from(header)]))
            .block(Block::bordered().border_set(border::THICK))
            .render(layout[0], buf);

        let board_lines = vec![
            Line::from(format!(" {}", self.board.render_track())),
            Line::from(""),
            positions_line(&self.board),
        ];
        Paragraph::new(board_lines)
            .block(Block::bordered().title(Line::from(format!(" Track ({} fields) ", self.board.track_length).bold())))
            .render(layout[1], buf);

        let mut lines: Vec<Line> = Vec::new();
        for message in &self.transcript {
            for (i, text) in message.content.lines().enumerate() {
                let lead = if i == 0 { role_span(message.role) } else { Span::raw("        ") };
                lines.push(Line::from(vec![lead, text.to_string().into()]));
            }
        }

        // Keep the latest messages in view
        let height = layout[2].height.saturating_sub(2) as usize;
        let scroll = lines.len().saturating_sub(height) as u16;
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .scroll((scroll, 0))
            .block(Block::bordered().title(Line::from(" Conversation ".bold())))
            .render(layout[2], buf);

        let mut input_lines = vec![Line::from(vec![" > ".blue().bold(), self.input.clone().into()])];
        if let Some(rejection) = &self.rejection {
            input_lines.push(Line::from(format!("   {}", rejection).italic().red()));
        }
        if let Some(ending) = &self.ending {
            let winner = match ending.winner {
                Some(side) => format!("Side {} won.", side),
                None => "No winner.".to_string(),
            };
            input_lines = vec![Line::from(format!(
                "   {} Accepted moves: {}, reprompts: {}, errors: {}",
                winner,
                ending.summary.accepted_moves,
                ending.summary.reprompts,
                ending.summary.errors()
            ))];
        }

        let hints = if self.ending.is_some() {
            Line::from(vec![" Quit ".into(), "<q> ".blue().bold()])
        } else {
            Line::from(vec![
                " Hint ".into(),
                "<TAB> ".blue().bold(),
                " Submit ".into(),
                "<RET> ".blue().bold(),
                " Quit ".into(),
                "<ESC> ".blue().bold(),
            ])
        };

        Paragraph::new(input_lines)
            .block(Block::bordered().title(Line::from(" Your Move ".bold()).centered()).title_bottom(hints.right_aligned()))
            .render(layout[3], buf);
    }
}

// A person at the terminal answering for one side, in the same text format the
// agent has to use
pub struct TerminalPlayer {
    terminal: DefaultTerminal,
    hint: ProgrammaticPlayer,
    app: InteractiveApp,
    quit: bool,
}

impl TerminalPlayer {
    pub fn new(terminal: DefaultTerminal, rules: RulesEngine) -> Self {
        TerminalPlayer {
            terminal,
            hint: ProgrammaticPlayer::new(rules),
            app: InteractiveApp {
                board: rules.new_board(),
                turn: 0,
                side: 0,
                roll: None,
                attempt: 0,
                transcript: Vec::new(),
                input: String::new(),
                rejection: None,
                ending: None,
            },
            quit: false,
        }
    }

    pub fn has_quit(&self) -> bool {
        self.quit
    }

    fn draw(&mut self) -> Result<(), ResponseError> {
        let app = self.app.clone();
        self.terminal.draw(|frame| {
            frame.render_widget(app, frame.area());
        })?;
        Ok(())
    }

    // Last screen, stays up until 'q'
    pub fn show_ending(&mut self, board: Board, ending: Ending) -> Result<(), ResponseError> {
        self.app.board = board;
        self.app.roll = None;
        self.app.rejection = None;
        self.app.ending = Some(ending);

        loop {
            self.draw()?;
            if let Event::Key(key_event) = event::read()? {
                if key_event.kind == KeyEventKind::Press && key_event.code == KeyCode::Char('q') {
                    return Ok(());
                }
            }
        }
    }
}

impl Responder for TerminalPlayer {
    fn name(&self) -> &str {
        "terminal"
    }

    fn respond(&mut self, request: &TurnRequest) -> Result<String, ResponseError> {
        if self.quit {
            return Err(ResponseError::Interrupted);
        }

        self.app.board = request.board.clone();
        self.app.turn = request.turn;
        self.app.side = request.side;
        self.app.roll = Some(request.roll);
        self.app.attempt = request.attempt;
        self.app.transcript = request.conversation.messages().to_vec();
        self.app.rejection = request.rejection.map(|r| format!("{}: {}", r.code(), r));
        self.app.input.clear();

        loop {
            self.draw()?;

            let key_event = match event::read()? {
                Event::Key(key_event) if key_event.kind == KeyEventKind::Press => key_event,
                _ => continue,
            };

            match key_event.code {
                KeyCode::Char(c) => self.app.input.push(c),
                KeyCode::Backspace => {
                    self.app.input.pop();
                }
                KeyCode::Tab => {
                    self.app.input = self.hint.choose(request.board, request.roll, request.side);
                }
                KeyCode::Enter => {
                    if !self.app.input.trim().is_empty() {
                        return Ok(mem::take(&mut self.app.input));
                    }
                }
                KeyCode::Esc => {
                    self.quit = true;
                    return Err(ResponseError::Interrupted);
                }
                _ => {}
            }
        }
    }
}
