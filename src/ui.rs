use crate::{
    entry::Entry,
    state::PortalState,
};
use chrono::Local;
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        self,
        Event,
        KeyCode,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;
use tokio::sync::mpsc;
use unicode_width::UnicodeWidthStr;

const BIO: &str = "Send a high five to the WavePortal contract and it stays on the \
                   ledger for good. Feeling lucky? Every wave has a chance to win a \
                   prize in Sepolia Ether!";
const PAGE: usize = 10;

#[derive(Clone, PartialEq, Eq)]
pub enum UserEvent {
    Quit,
    Connect,
    Refresh,
    Input(char),
    Backspace,
    Submit,
    DismissPrize,
    PasswordEntered(String),
    PasswordCancelled,
    Redraw,
}

impl std::fmt::Debug for UserEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserEvent::PasswordEntered(_) => write!(f, "PasswordEntered(..)"),
            UserEvent::Quit => write!(f, "Quit"),
            UserEvent::Connect => write!(f, "Connect"),
            UserEvent::Refresh => write!(f, "Refresh"),
            UserEvent::Input(c) => write!(f, "Input({c:?})"),
            UserEvent::Backspace => write!(f, "Backspace"),
            UserEvent::Submit => write!(f, "Submit"),
            UserEvent::DismissPrize => write!(f, "DismissPrize"),
            UserEvent::PasswordCancelled => write!(f, "PasswordCancelled"),
            UserEvent::Redraw => write!(f, "Redraw"),
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Normal,
    PasswordModal(String),
    QuitModal,
}

pub struct UiState {
    mode: Mode,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
    scroll: usize,
    wallet_label: Option<String>,
    network_label: String,
}

impl Default for UiState {
    fn default() -> Self {
        UiState::new(None, "")
    }
}

impl UiState {
    pub fn new(wallet_label: Option<String>, network_label: impl Into<String>) -> Self {
        UiState {
            mode: Mode::Normal,
            terminal: None,
            scroll: 0,
            wallet_label,
            network_label: network_label.into(),
        }
    }

    pub fn scroll(&self) -> usize {
        self.scroll
    }

    pub fn password_prompt_open(&self) -> bool {
        matches!(self.mode, Mode::PasswordModal(_))
    }
}

pub type InputEventReceiver = mpsc::UnboundedReceiver<std::io::Result<Event>>;

/// Reads terminal events on a dedicated thread so the application loop can
/// `select!` over them.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            let event = event::read();
            let failed = event.is_err();
            if tx.send(event).is_err() || failed {
                break;
            }
        }
    });
    rx
}

pub async fn next_raw_event(events: &mut InputEventReceiver) -> Result<Event> {
    let event = events
        .recv()
        .await
        .ok_or_else(|| eyre!("terminal input closed"))??;
    Ok(event)
}

pub fn open_password_prompt(state: &mut UiState) {
    state.mode = Mode::PasswordModal(String::new());
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn draw(state: &mut UiState, portal: &PortalState) -> Result<()> {
    state.scroll = state.scroll.min(portal.entries().len().saturating_sub(1));
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, portal))?;
        state.terminal = Some(term);
    }
    Ok(())
}

/// Turns a raw terminal event into a [`UserEvent`]. Modal keys are consumed
/// here; nothing in `portal` is changed.
pub fn interpret_event(
    state: &mut UiState,
    portal: &PortalState,
    event: Event,
) -> Option<UserEvent> {
    let key = match event {
        Event::Key(key) => key,
        Event::Resize(..) => return Some(UserEvent::Redraw),
        _ => return None,
    };
    if key.kind != KeyEventKind::Press {
        return None;
    }
    // raw mode swallows SIGINT
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(UserEvent::Quit);
    }

    match &mut state.mode {
        Mode::PasswordModal(buffer) => {
            return match key.code {
                KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::PasswordCancelled)
                }
                KeyCode::Enter => {
                    let password = std::mem::take(buffer);
                    state.mode = Mode::Normal;
                    Some(UserEvent::PasswordEntered(password))
                }
                KeyCode::Backspace => {
                    buffer.pop();
                    Some(UserEvent::Redraw)
                }
                KeyCode::Char(c) => {
                    buffer.push(c);
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::QuitModal => {
            return match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Quit),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::Normal => {}
    }

    if portal.prize().visible {
        return match key.code {
            KeyCode::Enter | KeyCode::Esc => Some(UserEvent::DismissPrize),
            _ => None,
        };
    }

    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('w') => Some(UserEvent::Connect),
            KeyCode::Char('r') => Some(UserEvent::Refresh),
            _ => None,
        };
    }

    let last = portal.entries().len().saturating_sub(1);
    match key.code {
        KeyCode::Esc => {
            state.mode = Mode::QuitModal;
            Some(UserEvent::Redraw)
        }
        KeyCode::Enter => Some(UserEvent::Submit),
        KeyCode::Backspace => Some(UserEvent::Backspace),
        KeyCode::Up => {
            state.scroll = state.scroll.saturating_sub(1);
            Some(UserEvent::Redraw)
        }
        KeyCode::Down => {
            state.scroll = (state.scroll + 1).min(last);
            Some(UserEvent::Redraw)
        }
        KeyCode::PageUp => {
            state.scroll = state.scroll.saturating_sub(PAGE);
            Some(UserEvent::Redraw)
        }
        KeyCode::PageDown => {
            state.scroll = (state.scroll + PAGE).min(last);
            Some(UserEvent::Redraw)
        }
        KeyCode::Home => {
            state.scroll = 0;
            Some(UserEvent::Redraw)
        }
        KeyCode::End => {
            state.scroll = last;
            Some(UserEvent::Redraw)
        }
        KeyCode::Char(c) => Some(UserEvent::Input(c)),
        _ => None,
    }
}

fn ui(f: &mut Frame, state: &UiState, portal: &PortalState) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // header
            Constraint::Length(4), // bio
            Constraint::Length(3), // wallet
            Constraint::Length(3), // message input
            Constraint::Length(1), // pending transaction
            Constraint::Min(6),    // entries
            Constraint::Length(4), // status / alerts
            Constraint::Length(3), // help
        ])
        .split(f.area());

    draw_header(f, chunks[0], portal);
    draw_bio(f, chunks[1]);
    draw_wallet_panel(f, chunks[2], state, portal);
    draw_input(f, chunks[3], state, portal);
    draw_pending(f, chunks[4], portal);
    draw_entries(f, chunks[5], state, portal);
    draw_status(f, chunks[6], portal);
    draw_help(f, chunks[7], portal);
    draw_modals(f, state, portal);
}

fn draw_header(f: &mut Frame, area: Rect, portal: &PortalState) {
    let hand = if portal.pending().in_flight {
        "👋"
    } else {
        "🖐️"
    };
    let header = Paragraph::new(format!("{hand} What's up!?"))
        .style(Style::default().add_modifier(Modifier::BOLD))
        .alignment(Alignment::Center);
    f.render_widget(header, area);
}

fn draw_bio(f: &mut Frame, area: Rect) {
    let bio = Paragraph::new(BIO)
        .wrap(Wrap { trim: true })
        .style(Style::default().fg(Color::Gray))
        .block(Block::default().borders(Borders::NONE));
    f.render_widget(bio, area);
}

fn draw_wallet_panel(f: &mut Frame, area: Rect, state: &UiState, portal: &PortalState) {
    let source = state.wallet_label.as_deref().unwrap_or("no wallet provider");
    let text = match portal.identity() {
        Some(identity) => {
            let total = portal
                .total_waves()
                .map_or_else(|| String::from("?"), |t| t.to_string());
            format!(
                "Connected: {identity} | High fives: {total} | Shown: {}",
                portal.entries().len()
            )
        }
        None => format!("Not connected ({source}) | Ctrl+W to connect wallet"),
    };
    let title = if state.network_label.is_empty() {
        String::from("Wallet")
    } else {
        format!("Wallet @ {}", state.network_label)
    };
    let widget =
        Paragraph::new(text).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(widget, area);
}

fn draw_input(f: &mut Frame, area: Rect, state: &UiState, portal: &PortalState) {
    let send_style = if portal.can_submit() {
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let hand = if portal.pending().in_flight {
        "👋"
    } else {
        "🖐️"
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Message")
        .title(
            Line::styled(format!(" Enter: send a highfive {hand} "), send_style)
                .right_aligned(),
        );
    let body = match input_placeholder(portal) {
        Some(hint) => Paragraph::new(hint).style(Style::default().fg(Color::DarkGray)),
        None => Paragraph::new(portal.input()),
    };
    f.render_widget(body.block(block), area);

    if state.mode == Mode::Normal && portal.input_editable() && !portal.prize().visible {
        f.set_cursor_position((cursor_x(area, portal.input()), area.y + 1));
    }
}

fn input_placeholder(portal: &PortalState) -> Option<&'static str> {
    if portal.identity().is_none() {
        Some("Connect a wallet to write a message")
    } else if portal.input().is_empty() {
        Some("Write a message to send a High Five!")
    } else {
        None
    }
}

/// Column right after the typed text, kept inside the block's borders.
fn cursor_x(area: Rect, input: &str) -> u16 {
    let width = u16::try_from(input.width()).unwrap_or(u16::MAX);
    area.x
        .saturating_add(1)
        .saturating_add(width)
        .min(area.right().saturating_sub(2))
}

fn draw_pending(f: &mut Frame, area: Rect, portal: &PortalState) {
    let pending = portal.pending();
    if let (true, Some(tx)) = (pending.in_flight, pending.transaction_id.as_deref()) {
        let label = Paragraph::new(format!("Transaction Hash: {tx}"))
            .style(Style::default().fg(Color::Yellow));
        f.render_widget(label, area);
    }
}

fn entry_item(entry: &Entry) -> ListItem<'static> {
    let when = entry.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S");
    ListItem::new(vec![
        Line::from(vec![
            Span::styled("Address: ", Style::default().fg(Color::Cyan)),
            Span::raw(entry.address.clone()),
        ]),
        Line::from(vec![
            Span::styled("Time:    ", Style::default().fg(Color::Cyan)),
            Span::raw(when.to_string()),
        ]),
        Line::from(vec![
            Span::styled("Message: ", Style::default().fg(Color::Cyan)),
            Span::raw(entry.message.clone()),
        ]),
        Line::from(""),
    ])
}

fn draw_entries(f: &mut Frame, area: Rect, state: &UiState, portal: &PortalState) {
    let items: Vec<ListItem> = portal.entries().iter().map(entry_item).collect();
    let title = format!("High fives ({})", portal.entries().len());
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));
    let mut list_state = ListState::default().with_offset(state.scroll);
    f.render_stateful_widget(list, area, &mut list_state);
}

fn draw_status(f: &mut Frame, area: Rect, portal: &PortalState) {
    let widget = if portal.alerts().is_empty() {
        Paragraph::new(portal.status().to_owned())
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .style(Style::default().fg(Color::Green))
    } else {
        let lines: Vec<Line> = portal
            .alerts()
            .iter()
            .map(|alert| Line::from(alert.clone()))
            .collect();
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Alerts"))
            .style(Style::default().fg(Color::Red))
    };
    f.render_widget(widget, area);
}

fn draw_help(f: &mut Frame, area: Rect, portal: &PortalState) {
    let text = if portal.identity().is_some() {
        "type a message | Enter send | ↑/↓ PgUp/PgDn scroll | Ctrl+R reload | Esc quit"
    } else {
        "Ctrl+W connect wallet | ↑/↓ PgUp/PgDn scroll | Ctrl+R reload | Esc quit"
    };
    let help = Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_modals(f: &mut Frame, state: &UiState, portal: &PortalState) {
    match &state.mode {
        Mode::PasswordModal(buffer) => {
            let area = centered_rect(50, 20, f.area());
            let label = state.wallet_label.as_deref().unwrap_or("wallet");
            let block = Block::default()
                .borders(Borders::ALL)
                .title(format!("Unlock {label}"));
            let masked = "*".repeat(buffer.chars().count());
            let p = Paragraph::new(format!(
                "Password: {masked}\nEnter=unlock Esc=cancel"
            ));
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::QuitModal => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
            let p = Paragraph::new("Leave the WavePortal? (Y/N)");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::Normal => {
            if portal.prize().visible {
                let area = centered_rect(50, 25, f.area());
                let block = Block::default()
                    .borders(Borders::ALL)
                    .title("Congratulations! 🌟")
                    .style(Style::default().fg(Color::Yellow));
                let p = Paragraph::new(format!(
                    "You are Lucky!! You just won a prize of {} ETH!\n\nEnter/Esc=close",
                    portal.prize().amount
                ))
                .wrap(Wrap { trim: true });
                f.render_widget(Clear, area);
                f.render_widget(block.clone(), area);
                f.render_widget(p, block.inner(area));
            }
        }
    }
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

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1]);

    horizontal[1]
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::state::DedupPolicy;
    use alloy::primitives::U256;
    use crossterm::event::KeyEvent;

    fn press(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn ctrl(c: char) -> Event {
        Event::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL))
    }

    #[test]
    fn cursor_x__follows_the_typed_text() {
        // given
        let area = Rect::new(4, 0, 40, 3);

        // when
        let x = cursor_x(area, "héllo");

        // then
        assert_eq!(x, 10);
    }

    #[test]
    fn cursor_x__oversized_input_stays_inside_the_border() {
        // given
        let area = Rect::new(u16::MAX - 20, 0, 20, 3);
        let input = "x".repeat(100_000);

        // when
        let x = cursor_x(area, &input);

        // then
        assert_eq!(x, area.right() - 2);
    }

    #[test]
    fn input_placeholder__asks_to_connect_before_typing() {
        // given
        let mut portal = PortalState::new(DedupPolicy::default());
        let disconnected = input_placeholder(&portal);

        // when
        portal.connect("0xAA");

        // then
        assert_eq!(disconnected, Some("Connect a wallet to write a message"));
        assert_eq!(
            input_placeholder(&portal),
            Some("Write a message to send a High Five!")
        );
        portal.push_input('h');
        assert_eq!(input_placeholder(&portal), None);
    }

    #[test]
    fn interpret_event__printable_keys_become_input() {
        // given
        let mut ui_state = UiState::default();
        let portal = PortalState::new(DedupPolicy::default());

        // when
        let event = interpret_event(&mut ui_state, &portal, press(KeyCode::Char('q')));

        // then
        assert_eq!(event, Some(UserEvent::Input('q')));
    }

    #[test]
    fn interpret_event__control_keys_connect_and_quit() {
        let mut ui_state = UiState::default();
        let portal = PortalState::new(DedupPolicy::default());

        assert_eq!(
            interpret_event(&mut ui_state, &portal, ctrl('w')),
            Some(UserEvent::Connect)
        );
        assert_eq!(
            interpret_event(&mut ui_state, &portal, ctrl('r')),
            Some(UserEvent::Refresh)
        );
        assert_eq!(
            interpret_event(&mut ui_state, &portal, ctrl('c')),
            Some(UserEvent::Quit)
        );
    }

    #[test]
    fn interpret_event__password_prompt_collects_and_submits() {
        // given
        let mut ui_state = UiState::default();
        let portal = PortalState::new(DedupPolicy::default());
        open_password_prompt(&mut ui_state);

        // when
        for c in "hunter2".chars() {
            interpret_event(&mut ui_state, &portal, press(KeyCode::Char(c)));
        }
        interpret_event(&mut ui_state, &portal, press(KeyCode::Backspace));
        let event = interpret_event(&mut ui_state, &portal, press(KeyCode::Enter));

        // then
        assert_eq!(event, Some(UserEvent::PasswordEntered(String::from("hunter"))));
        assert!(!ui_state.password_prompt_open());
    }

    #[test]
    fn interpret_event__escape_cancels_password_prompt() {
        // given
        let mut ui_state = UiState::default();
        let portal = PortalState::new(DedupPolicy::default());
        open_password_prompt(&mut ui_state);

        // when
        let event = interpret_event(&mut ui_state, &portal, press(KeyCode::Esc));

        // then
        assert_eq!(event, Some(UserEvent::PasswordCancelled));
        assert!(!ui_state.password_prompt_open());
    }

    #[test]
    fn interpret_event__prize_dialog_captures_enter() {
        // given
        let mut ui_state = UiState::default();
        let mut portal = PortalState::new(DedupPolicy::default());
        portal.connect("0xAA");
        portal.apply_award("0xaa", String::from("0.0001"));

        // when
        let typed = interpret_event(&mut ui_state, &portal, press(KeyCode::Char('x')));
        let enter = interpret_event(&mut ui_state, &portal, press(KeyCode::Enter));

        // then
        assert_eq!(typed, None);
        assert_eq!(enter, Some(UserEvent::DismissPrize));
    }

    #[test]
    fn interpret_event__quit_needs_confirmation() {
        // given
        let mut ui_state = UiState::default();
        let portal = PortalState::new(DedupPolicy::default());

        // when
        let first = interpret_event(&mut ui_state, &portal, press(KeyCode::Esc));
        let declined = interpret_event(&mut ui_state, &portal, press(KeyCode::Char('n')));
        interpret_event(&mut ui_state, &portal, press(KeyCode::Esc));
        let confirmed = interpret_event(&mut ui_state, &portal, press(KeyCode::Char('y')));

        // then
        assert_eq!(first, Some(UserEvent::Redraw));
        assert_eq!(declined, Some(UserEvent::Redraw));
        assert_eq!(confirmed, Some(UserEvent::Quit));
    }

    #[test]
    fn interpret_event__scroll_is_clamped_to_entries() {
        // given
        let mut ui_state = UiState::default();
        let mut portal = PortalState::new(DedupPolicy::default());
        portal.replace_entries(vec![
            Entry::new("0xAA", U256::from(1u64), "a"),
            Entry::new("0xBB", U256::from(2u64), "b"),
        ]);

        // when
        interpret_event(&mut ui_state, &portal, press(KeyCode::PageDown));
        let after_down = ui_state.scroll();
        interpret_event(&mut ui_state, &portal, press(KeyCode::Up));
        interpret_event(&mut ui_state, &portal, press(KeyCode::Up));

        // then
        assert_eq!(after_down, 1);
        assert_eq!(ui_state.scroll(), 0);
    }
}
