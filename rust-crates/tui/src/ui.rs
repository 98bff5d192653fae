use crate::client::{
    AppSnapshot,
    TOY_CATALOG,
};
use alloy::primitives::U256;
use color_eyre::eyre::Result;
use crossterm::{
    event::{
        Event,
        KeyCode,
        KeyEvent,
        KeyEventKind,
        KeyModifiers,
    },
    execute,
    terminal::{
        EnterAlternateScreen,
        LeaveAlternateScreen,
        disable_raw_mode,
        enable_raw_mode,
    },
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use stardrop::{
    amount::{
        NATIVE_TICKER,
        format_native,
        format_native_fixed,
        parse_native,
    },
    board::{
        BoardPhase,
        PEG_ROWS,
        SLOT_COUNT,
        slot_label,
    },
    session::{
        Approval,
        Credential,
        SessionState,
        WalletKind,
    },
};
use std::io::{
    Stdout,
    stdout,
};

const BALANCE_DECIMALS: usize = 4;
const SLOT_WIDTH: usize = 6;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserEvent {
    Quit,
    Connect { kind: WalletKind, approval: Approval },
    Disconnect,
    Drop,
    WagerUp,
    WagerDown,
    SetWager(U256),
    ToggleMute,
    Settle(u64),
    Mint(usize),
    Refresh,
    Redraw,
}

#[derive(Debug, Default)]
pub struct UiState {
    mode: Mode,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Normal,
    Password(PasswordState),
    Wager(TextInput),
    Settle(TextInput),
    Mint { idx: usize },
    QuitModal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct PasswordState {
    kind: WalletKind,
    input: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct TextInput {
    text: String,
    invalid: bool,
}

impl TextInput {
    fn edit(&mut self, code: KeyCode, accept: impl Fn(char) -> bool) -> bool {
        match code {
            KeyCode::Char(c) if accept(c) => {
                self.text.push(c);
                self.invalid = false;
                true
            }
            KeyCode::Backspace => {
                self.text.pop();
                self.invalid = false;
                true
            }
            _ => false,
        }
    }
}

/// Raw mode plus alternate screen for as long as the value lives.
pub struct TerminalSession {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalSession {
    pub fn enter() -> Result<Self> {
        enable_raw_mode()?;
        execute!(stdout(), EnterAlternateScreen)?;
        let terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
        Ok(Self { terminal })
    }

    pub fn draw(&mut self, state: &UiState, snap: &AppSnapshot) -> Result<()> {
        self.terminal.draw(|f| ui(f, state, snap))?;
        Ok(())
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(stdout(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// `can_connect` is false while a wallet is connected or connecting; the
/// sign-in keys are then ignored until the user disconnects.
pub fn interpret_event(
    state: &mut UiState,
    event: Event,
    can_connect: bool,
) -> Option<UserEvent> {
    let Event::Key(key) = event else {
        return matches!(event, Event::Resize(..)).then_some(UserEvent::Redraw);
    };
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if is_ctrl_c(&key) {
        return Some(UserEvent::Quit);
    }

    match &mut state.mode {
        Mode::Password(ps) => match key.code {
            KeyCode::Esc => {
                let kind = ps.kind;
                state.mode = Mode::Normal;
                Some(UserEvent::Connect {
                    kind,
                    approval: Approval::Declined,
                })
            }
            KeyCode::Enter => {
                let kind = ps.kind;
                let password = std::mem::take(&mut ps.input);
                state.mode = Mode::Normal;
                Some(UserEvent::Connect {
                    kind,
                    approval: Approval::Granted { password },
                })
            }
            KeyCode::Backspace => {
                ps.input.pop();
                Some(UserEvent::Redraw)
            }
            KeyCode::Char(c) => {
                ps.input.push(c);
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::Wager(input) => match key.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter => match parse_native(&input.text) {
                Ok(wager) => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::SetWager(wager))
                }
                Err(_) => {
                    input.invalid = true;
                    Some(UserEvent::Redraw)
                }
            },
            code => input
                .edit(code, |c| c.is_ascii_digit() || c == '.')
                .then_some(UserEvent::Redraw),
        },
        Mode::Settle(input) => match key.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter => match input.text.parse::<u64>() {
                Ok(amount) if amount > 0 => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Settle(amount))
                }
                _ => {
                    input.invalid = true;
                    Some(UserEvent::Redraw)
                }
            },
            code => input
                .edit(code, |c| c.is_ascii_digit())
                .then_some(UserEvent::Redraw),
        },
        Mode::Mint { idx } => match key.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter => {
                let chosen = *idx;
                state.mode = Mode::Normal;
                Some(UserEvent::Mint(chosen))
            }
            KeyCode::Up | KeyCode::Char('k') => {
                *idx = idx.saturating_sub(1);
                Some(UserEvent::Redraw)
            }
            KeyCode::Down | KeyCode::Char('j') => {
                *idx = (*idx + 1).min(TOY_CATALOG.len() - 1);
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::QuitModal => match key.code {
            KeyCode::Char('y') | KeyCode::Enter => Some(UserEvent::Quit),
            KeyCode::Char('n') | KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::Normal => {
            let (mode, event) = match key.code {
                KeyCode::Char('s' | 'c') if !can_connect => return None,
                KeyCode::Char('s') => (
                    Some(Mode::Password(PasswordState {
                        kind: WalletKind::SessionDelegated,
                        input: String::new(),
                    })),
                    UserEvent::Redraw,
                ),
                KeyCode::Char('c') => (
                    Some(Mode::Password(PasswordState {
                        kind: WalletKind::DirectSigner,
                        input: String::new(),
                    })),
                    UserEvent::Redraw,
                ),
                KeyCode::Char('w') => (Some(Mode::Wager(TextInput::default())), UserEvent::Redraw),
                KeyCode::Char('t') => {
                    (Some(Mode::Settle(TextInput::default())), UserEvent::Redraw)
                }
                KeyCode::Char('n') => (Some(Mode::Mint { idx: 0 }), UserEvent::Redraw),
                KeyCode::Char('q') | KeyCode::Esc => (Some(Mode::QuitModal), UserEvent::Redraw),
                KeyCode::Char(' ') | KeyCode::Char('d') | KeyCode::Enter => (None, UserEvent::Drop),
                KeyCode::Up | KeyCode::Char('+') | KeyCode::Char('k') => {
                    (None, UserEvent::WagerUp)
                }
                KeyCode::Down | KeyCode::Char('-') | KeyCode::Char('j') => {
                    (None, UserEvent::WagerDown)
                }
                KeyCode::Char('m') => (None, UserEvent::ToggleMute),
                KeyCode::Char('r') => (None, UserEvent::Refresh),
                KeyCode::Char('x') => (None, UserEvent::Disconnect),
                _ => return None,
            };
            if let Some(mode) = mode {
                state.mode = mode;
            }
            Some(event)
        }
    }
}

fn is_ctrl_c(key: &KeyEvent) -> bool {
    key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL)
}

fn ui(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(16),
            Constraint::Length(8),
            Constraint::Length(3),
        ])
        .split(f.area());

    draw_title(f, chunks[0], snap);
    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(38), Constraint::Percentage(62)])
        .split(chunks[1]);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(10), Constraint::Length(7)])
        .split(middle[0]);
    draw_wallet_panel(f, left[0], snap);
    draw_result_panel(f, left[1], snap);
    draw_board(f, middle[1], snap);
    draw_status(f, chunks[2], snap);
    draw_help(f, chunks[3], snap);
    draw_modals(f, state, snap);
}

fn draw_title(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let text = format!(
        "StarDrop | {} | contract {}",
        snap.network, snap.contract
    );
    let widget = Paragraph::new(text)
        .style(Style::default().fg(Color::Cyan))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(widget, area);
}

fn draw_wallet_panel(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let state = match snap.state {
        SessionState::Disconnected => "Disconnected",
        SessionState::Connecting => "Connecting...",
        SessionState::Connected => "Connected",
        SessionState::DropInFlight => "Drop in flight",
    };
    let mut lines = vec![
        Line::from(format!("State:   {state}")),
        Line::from(format!("Keystore: {}", snap.wallet_name)),
    ];
    match &snap.account {
        Some(account) => {
            lines.push(Line::from(format!("Address: {}", account.address)));
            match &account.credential {
                Credential::Delegated(session) => {
                    lines.push(Line::from(format!(
                        "Kind:    session ({})",
                        session.session_id
                    )));
                    lines.push(Line::from(format!(
                        "Expires: {}",
                        session.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
                    )));
                }
                Credential::Direct { .. } => {
                    lines.push(Line::from("Kind:    direct signer"));
                }
            }
            lines.push(Line::from(format!(
                "Balance: {} {NATIVE_TICKER}",
                format_native_fixed(account.balance, BALANCE_DECIMALS)
            )));
            lines.push(Line::from(format!("Tickets: {}", account.tickets)));
        }
        None => {
            lines.push(Line::from("Press s (session) or c (direct) to connect"));
        }
    }
    lines.push(Line::from(format!(
        "Wager:   {} {NATIVE_TICKER}",
        format_native(snap.wager)
    )));
    lines.push(Line::from(format!(
        "Sound:   {}",
        if snap.muted { "muted" } else { "on" }
    )));
    let widget = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Wallet"));
    f.render_widget(widget, area);
}

fn draw_result_panel(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let lines = match &snap.last_result {
        Some(result) => vec![
            Line::from(format!("Multiplier: {}x", result.multiplier)),
            Line::from(format!(
                "Payout:     {} {NATIVE_TICKER}",
                format_native(result.payout)
            )),
            Line::from(format!("Tickets:    +{}", result.tickets_awarded)),
            Line::from(format!("Tx:         {}", result.tx_hash)),
        ],
        None => vec![Line::from("No drops yet")],
    };
    let widget = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Last Drop"));
    f.render_widget(widget, area);
}

fn draw_board(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let ball = snap.board.ball_position();
    let mut lines = Vec::with_capacity(PEG_ROWS + 3);

    let top = match snap.board.phase() {
        BoardPhase::Waiting { frame, .. } => {
            let spinner = ['|', '/', '-', '\\'][frame % 4];
            format!("{}● {spinner}", " ".repeat(PEG_ROWS * SLOT_WIDTH / 2))
        }
        _ => String::new(),
    };
    lines.push(Line::from(top).style(Style::default().fg(Color::Yellow)));

    for row in 0..PEG_ROWS {
        let indent = " ".repeat((PEG_ROWS - 1 - row) * SLOT_WIDTH / 2);
        let mut spans = vec![Span::raw(indent)];
        for column in 0..row + 2 {
            if ball == Some((row, column)) {
                spans.push(Span::styled(
                    format!("{:^SLOT_WIDTH$}", "●"),
                    Style::default().fg(Color::Yellow).bold(),
                ));
            } else {
                spans.push(Span::styled(
                    format!("{:^SLOT_WIDTH$}", "·"),
                    Style::default().fg(Color::DarkGray),
                ));
            }
        }
        lines.push(Line::from(spans));
    }

    let highlighted = snap.board.highlighted_slot();
    let slots: Vec<Span> = (0..SLOT_COUNT)
        .map(|slot| {
            let label = format!("{:^SLOT_WIDTH$}", slot_label(slot));
            if highlighted == Some(slot) {
                Span::styled(label, Style::default().fg(Color::Black).bg(Color::Green))
            } else {
                Span::styled(label, Style::default().fg(Color::Magenta))
            }
        })
        .collect();
    lines.push(Line::from(slots));

    let title = if snap.can_drop {
        "Board"
    } else {
        "Board (drop unavailable)"
    };
    let widget =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(widget, area);
}

fn draw_status(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let status_widget = if snap.errors.is_empty() {
        let text = if snap.status.trim().is_empty() {
            "Ready".to_string()
        } else {
            snap.status.clone()
        };
        Paragraph::new(text)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .style(Style::default().fg(Color::Green))
    } else {
        let mut lines = vec![Line::from(snap.status.clone())];
        let visible = area.height.saturating_sub(3) as usize;
        let skip = snap.errors.len().saturating_sub(visible);
        lines.extend(snap.errors.iter().skip(skip).map(|e| Line::from(e.clone())));
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Status / Errors"))
            .style(Style::default().fg(Color::Red))
    };
    f.render_widget(status_widget, area);
}

fn draw_help(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let text = if snap.account.is_some() {
        "space drop | ↑/↓ wager | w set wager | t settle | n mint | r refresh | m mute | x disconnect | q quit"
    } else {
        "s session sign-in | c direct connect | ↑/↓ wager | m mute | q quit"
    };
    let help = Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_modals(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    let (title, body, size) = match &state.mode {
        Mode::Normal => return,
        Mode::Password(ps) => {
            let title = match ps.kind {
                WalletKind::SessionDelegated => "Session Sign-in",
                WalletKind::DirectSigner => "Direct Connect",
            };
            let body = format!(
                "Password for keystore '{}':\n{}\n\nEnter=connect Esc=reject",
                snap.wallet_name,
                "*".repeat(ps.input.chars().count())
            );
            (title, body, (50, 30))
        }
        Mode::Wager(input) => (
            "Set Wager",
            format!(
                "Wager ({NATIVE_TICKER}): {}{}\nMinimum 0.001, clamped to balance\nEnter=confirm Esc=cancel",
                input.text,
                if input.invalid { "  (invalid)" } else { "" }
            ),
            (40, 25),
        ),
        Mode::Settle(input) => (
            "Settle Tickets",
            format!(
                "Tickets: {}{}\nHave: {}\nEnter=confirm Esc=cancel",
                input.text,
                if input.invalid { "  (enter a positive number)" } else { "" },
                snap.account.as_ref().map_or(0, |a| a.tickets)
            ),
            (40, 25),
        ),
        Mode::Mint { idx } => {
            let have = snap.account.as_ref().map_or(0, |a| a.tickets);
            let mut body = format!("Tickets: {have}\n\n");
            for (i, toy) in TOY_CATALOG.iter().enumerate() {
                let cursor = if i == *idx { ">" } else { " " };
                let affordable = if toy.ticket_cost <= have { "" } else { " (not enough)" };
                body.push_str(&format!(
                    "{cursor} {} - {} tickets{affordable}\n",
                    toy.name, toy.ticket_cost
                ));
            }
            body.push_str("\n↑/↓ select Enter=mint Esc=cancel");
            ("Mint Toy", body, (50, 40))
        }
        Mode::QuitModal => ("Quit", "Quit StarDrop? (y/n)".to_string(), (30, 20)),
    };
    let area = centered_rect(size.0, size.1, f.area());
    let block = Block::default().borders(Borders::ALL).title(title);
    f.render_widget(Clear, area);
    f.render_widget(block.clone(), area);
    f.render_widget(Paragraph::new(body), block.inner(area));
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1])[1]
}
