use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::{
    event::{
        DisableBracketedPaste, EnableBracketedPaste, Event, EventStream, KeyCode, KeyEvent,
        KeyEventKind, KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time;
use tui_textarea::TextArea;

mod config;
mod error;
mod ledger;
mod logger;
mod session;
mod sync;
mod wallet;

use crate::error::{LedgerError, WalletError};
use crate::ledger::{BoardHandle, LedgerGateway, Link, RpcGateway};
use crate::session::{shorten, Session};
use crate::sync::{BoardState, Controller, ControllerTask, Intent, Snapshot};
use crate::wallet::{AgentWallet, WalletProvider};

const LINKU_LOGO: &str = r###"   LINKU BOARD
██╗     ██╗███╗   ██╗██╗  ██╗██╗   ██╗
██║     ██║████╗  ██║██║ ██╔╝██║   ██║
██║     ██║██╔██╗ ██║█████╔╝ ██║   ██║
██║     ██║██║╚██╗██║██╔═██╗ ██║   ██║
███████╗██║██║ ╚████║██║  ██╗╚██████╔╝
╚══════╝╚═╝╚═╝  ╚═══╝╚═╝  ╚═╝ ╚═════╝ "###;

const SPINNER: [char; 4] = ['|', '/', '-', '\\'];

#[derive(PartialEq, Debug, Clone, Copy)]
enum ActivePane {
    Board,
    Input,
}

#[derive(Debug)]
enum Message {
    Key(KeyEvent),
    Resize(u16, u16),
    Paste(String),
    Snapshot(Snapshot),
    Tick,
}

struct Model<'a> {
    snapshot: Snapshot,
    intent_tx: mpsc::UnboundedSender<Intent>,
    snapshot_rx: mpsc::UnboundedReceiver<Snapshot>,
    input: TextArea<'a>,
    list_state: ListState,
    active_pane: ActivePane,
    spinner_index: usize,
    clipboard: Option<arboard::Clipboard>,
    flash: Option<(String, Instant)>,
    config: config::AppConfig,
}

impl<'a> Model<'a> {
    fn new(
        intent_tx: mpsc::UnboundedSender<Intent>,
        snapshot_rx: mpsc::UnboundedReceiver<Snapshot>,
        config: config::AppConfig,
    ) -> Self {
        let mut model = Self {
            snapshot: Snapshot {
                identity: None,
                board: BoardState::Disconnected,
                pending_input: String::new(),
                last_error: None,
            },
            intent_tx,
            snapshot_rx,
            input: TextArea::default(),
            list_state: ListState::default(),
            active_pane: ActivePane::Board,
            spinner_index: 0,
            clipboard: arboard::Clipboard::new().ok(),
            flash: None,
            config,
        };
        model.setup_input();
        model
    }

    fn setup_input(&mut self) {
        let theme = &self.config.theme;
        self.input.set_block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Add link ")
                .border_style(Style::default().fg(theme.input_border)),
        );
        self.input.set_cursor_line_style(Style::default());
    }

    fn send(&self, intent: Intent) {
        let _ = self.intent_tx.send(intent);
    }

    fn links(&self) -> Option<&Vec<Link>> {
        match &self.snapshot.board {
            BoardState::Ready(links) => Some(links),
            _ => None,
        }
    }

    fn selected_link(&self) -> Option<&Link> {
        self.links()
            .and_then(|links| self.list_state.selected().and_then(|i| links.get(i)))
    }

    fn clamp_selection(&mut self) {
        let len = self.links().map(Vec::len).unwrap_or(0);
        if len == 0 {
            self.list_state.select(None);
        } else {
            match self.list_state.selected() {
                Some(i) if i < len => {}
                _ => self.list_state.select(Some(0)),
            }
        }
    }

    fn move_selection(&mut self, delta: i32) {
        let len = self.links().map(Vec::len).unwrap_or(0);
        if len == 0 {
            return;
        }
        let next = match self.list_state.selected() {
            Some(i) => (i as i32 + delta).clamp(0, len as i32 - 1) as usize,
            None => 0,
        };
        self.list_state.select(Some(next));
    }

    fn set_flash(&mut self, text: &str) {
        self.flash = Some((text.to_string(), Instant::now() + Duration::from_secs(1)));
    }

    fn copy_to_clipboard(&mut self, text: &str) {
        if let Some(cb) = &mut self.clipboard {
            if cb.set_text(text.to_string()).is_ok() {
                self.set_flash("Copied to clipboard");
            }
        }
    }

    async fn update(&mut self, msg: Message) -> Result<bool> {
        match msg {
            Message::Key(key) => {
                if matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) {
                    return self.handle_key_event(key);
                }
            }
            Message::Resize(_w, _h) => {}
            Message::Paste(text) => {
                if self.active_pane == ActivePane::Input {
                    self.input.insert_str(text.replace(['\r', '\n'], " "));
                }
            }
            Message::Snapshot(snapshot) => {
                // A submit that went through leaves an empty pending input
                // behind; mirror that by clearing the compose box.
                let consumed = !self.snapshot.pending_input.is_empty()
                    && snapshot.pending_input.is_empty();
                self.snapshot = snapshot;
                if consumed {
                    self.input = TextArea::default();
                    self.setup_input();
                    if self.active_pane == ActivePane::Input {
                        self.active_pane = ActivePane::Board;
                    }
                }
                self.clamp_selection();
            }
            Message::Tick => {
                self.spinner_index = (self.spinner_index + 1) % SPINNER.len();
                if let Some((_, until)) = &self.flash {
                    if Instant::now() >= *until {
                        self.flash = None;
                    }
                }
            }
        }
        Ok(false)
    }

    fn handle_key_event(&mut self, key: KeyEvent) -> Result<bool> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Ok(true);
        }

        match self.active_pane {
            ActivePane::Board => match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Char('c') => {
                    if self.snapshot.identity.is_none() {
                        self.send(Intent::Connect);
                    }
                }
                KeyCode::Char('i') => {
                    if self.snapshot.board == BoardState::Uninitialized {
                        self.send(Intent::Initialize);
                    }
                }
                KeyCode::Char('r') => self.send(Intent::Refresh),
                KeyCode::Char('a') => {
                    if matches!(self.snapshot.board, BoardState::Ready(_)) {
                        self.active_pane = ActivePane::Input;
                    }
                }
                KeyCode::Char('j') | KeyCode::Down => self.move_selection(1),
                KeyCode::Char('k') | KeyCode::Up => self.move_selection(-1),
                KeyCode::Char('o') => {
                    if let Some(link) = self.selected_link() {
                        open_browser(&link.url);
                    }
                }
                KeyCode::Char('y') => {
                    if let Some(link) = self.selected_link() {
                        let url = link.url.clone();
                        self.copy_to_clipboard(&url);
                    }
                }
                _ => {}
            },
            ActivePane::Input => match key.code {
                KeyCode::Enter => {
                    let text = self.input.lines().join(" ").trim().to_string();
                    // The controller owns the pending input; hand it the
                    // final text, then ask it to submit.
                    self.send(Intent::SetInput(text));
                    self.send(Intent::Submit);
                }
                KeyCode::Esc => {
                    self.active_pane = ActivePane::Board;
                }
                _ => {
                    self.input.input(key);
                }
            },
        }
        Ok(false)
    }

    async fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        let mut events = EventStream::new();
        let mut spinner_interval = time::interval(Duration::from_millis(120));
        let mut should_render = true;

        loop {
            if should_render {
                terminal.draw(|f| self.ui(f))?;
                should_render = false;
            }

            let mut messages = Vec::new();
            tokio::select! {
                maybe_event = events.next() => match maybe_event {
                    Some(Ok(Event::Key(key))) => messages.push(Message::Key(key)),
                    Some(Ok(Event::Resize(w, h))) => messages.push(Message::Resize(w, h)),
                    Some(Ok(Event::Paste(text))) => messages.push(Message::Paste(text)),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => logger::error(&format!("input stream: {}", e)),
                    None => return Ok(()),
                },
                Some(snapshot) = self.snapshot_rx.recv() => {
                    messages.push(Message::Snapshot(snapshot));
                }
                _ = spinner_interval.tick() => messages.push(Message::Tick),
            }

            for msg in messages {
                if self.update(msg).await? {
                    return Ok(());
                }
                should_render = true;
            }
        }
    }

    fn ui(&mut self, f: &mut Frame) {
        let theme = self.config.theme.clone();

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(8),
                Constraint::Min(1),
                Constraint::Length(2),
            ])
            .split(f.area());

        let session_line = match &self.snapshot.identity {
            Some(id) => format!("{} • Wallet: {}", config::APP_VERSION, id.short()),
            None => format!("{} • Wallet: not connected", config::APP_VERSION),
        };
        let header = Paragraph::new(format!("{}\n {}", LINKU_LOGO, session_line))
            .alignment(Alignment::Center)
            .style(Style::default().fg(theme.logo).add_modifier(Modifier::BOLD));
        f.render_widget(header, chunks[0]);

        match self.snapshot.board.clone() {
            BoardState::Ready(links) => self.render_board(f, chunks[1], &links),
            other => {
                let text = self.placeholder_text(&other);
                let paragraph = Paragraph::new(text)
                    .alignment(Alignment::Center)
                    .wrap(Wrap { trim: true })
                    .block(
                        Block::default()
                            .borders(Borders::ALL)
                            .title(" Board ")
                            .border_style(Style::default().fg(theme.border_inactive)),
                    );
                f.render_widget(paragraph, chunks[1]);
            }
        }

        self.render_footer(f, chunks[2]);
    }

    fn placeholder_text(&self, state: &BoardState) -> Vec<Line<'static>> {
        let theme = &self.config.theme;
        let mut lines = vec![Line::from("")];
        match state {
            BoardState::Disconnected => {
                lines.push(Line::from("Connect your wallet to view the link board."));
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled(
                    "Press c to connect.",
                    Style::default().fg(theme.session_disconnected),
                )));
            }
            BoardState::Loading => {
                lines.push(Line::from(format!(
                    "{} Loading board...",
                    SPINNER[self.spinner_index]
                )));
            }
            BoardState::Uninitialized => {
                lines.push(Line::from("The board account has not been created yet."));
                lines.push(Line::from("Creating it is a one-time step for this installation."));
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled(
                    "Press i to initialize the board.",
                    Style::default().fg(theme.board_uninitialized),
                )));
            }
            BoardState::Unknown => {
                lines.push(Line::from("The board could not be loaded."));
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled(
                    "Press r to retry.",
                    Style::default().fg(theme.board_error),
                )));
            }
            BoardState::Ready(_) => {}
        }
        lines
    }

    fn render_board(&mut self, f: &mut Frame, area: ratatui::layout::Rect, links: &[Link]) {
        let theme = self.config.theme.clone();

        let board_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(3)])
            .split(area);

        let list_block = Block::default()
            .borders(Borders::ALL)
            .title(format!(" Links ({}) ", links.len()))
            .border_style(Style::default().fg(if self.active_pane == ActivePane::Board {
                theme.border_active
            } else {
                theme.border_inactive
            }));

        if links.is_empty() {
            let empty = Paragraph::new("\nNo links yet. Press a to add the first one.")
                .alignment(Alignment::Center)
                .block(list_block);
            f.render_widget(empty, board_chunks[0]);
        } else {
            let items: Vec<ListItem> = links
                .iter()
                .map(|link| {
                    let lines = vec![
                        Line::from(format!("   {}", link.url)),
                        Line::from(Span::styled(
                            format!("    by {}", shorten(&link.submitter)),
                            Style::default().fg(Color::DarkGray),
                        )),
                    ];
                    ListItem::new(lines)
                })
                .collect();

            let list = List::new(items)
                .block(list_block)
                .highlight_style(
                    Style::default()
                        .bg(theme.selection_bg)
                        .fg(theme.selection_fg)
                        .add_modifier(Modifier::BOLD),
                )
                .highlight_symbol(">>");
            f.render_stateful_widget(list, board_chunks[0], &mut self.list_state);
        }

        let input_active = self.active_pane == ActivePane::Input;
        self.input.set_block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Add link (Enter to submit) ")
                .border_style(Style::default().fg(if input_active {
                    theme.input_border
                } else {
                    theme.border_inactive
                })),
        );
        if input_active {
            self.input
                .set_cursor_style(Style::default().add_modifier(Modifier::REVERSED));
        } else {
            self.input.set_cursor_style(Style::default());
        }
        f.render_widget(&self.input, board_chunks[1]);
    }

    fn render_footer(&self, f: &mut Frame, area: ratatui::layout::Rect) {
        let theme = &self.config.theme;

        let status_line = if let Some((text, _)) = &self.flash {
            Line::from(Span::styled(
                text.clone(),
                Style::default().fg(theme.board_ready),
            ))
        } else if let Some(err) = &self.snapshot.last_error {
            Line::from(Span::styled(
                err.clone(),
                Style::default().fg(theme.board_error),
            ))
        } else {
            let color = match self.snapshot.board {
                BoardState::Ready(_) => theme.board_ready,
                BoardState::Loading => theme.board_loading,
                BoardState::Unknown => theme.board_error,
                BoardState::Uninitialized => theme.board_uninitialized,
                BoardState::Disconnected => theme.session_disconnected,
            };
            Line::from(Span::styled(
                self.snapshot.board.label(),
                Style::default().fg(color),
            ))
        };

        let hints = match (self.active_pane, &self.snapshot.board) {
            (ActivePane::Input, _) => "Enter submit • Esc cancel",
            (_, BoardState::Disconnected) => "c connect • q quit",
            (_, BoardState::Loading) => "q quit",
            (_, BoardState::Uninitialized) => "i initialize • r refresh • q quit",
            (_, BoardState::Unknown) => "r retry • q quit",
            (_, BoardState::Ready(_)) => "a add • j/k move • o open • y yank • r refresh • q quit",
        };

        let footer = Paragraph::new(vec![
            status_line,
            Line::from(Span::styled(hints, Style::default().fg(theme.hint))),
        ])
        .alignment(Alignment::Center);
        f.render_widget(footer, area);
    }
}

fn open_browser(url: &str) {
    let _ = webbrowser::open(url);
}

fn restore_terminal() -> Result<()> {
    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen, DisableBracketedPaste)?;
    Ok(())
}

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the TUI application (default)
    Tui,
    /// Connect the wallet and print the session identity
    Connect,
    /// Print configuration, board account and remote state
    Status,
}

async fn handle_cli_connect(app_config: &config::AppConfig) -> Result<()> {
    let wallet = AgentWallet::new(config::get_wallet_url(app_config));

    if !wallet.is_available().await {
        eprintln!("{}", WalletError::NoProvider);
        return Ok(());
    }

    let mut session = Session::new(wallet);

    match session.connect_silent().await {
        Ok(id) => {
            println!("Connected (trusted): {}", id);
            return Ok(());
        }
        Err(WalletError::NoProvider) => {
            eprintln!("{}", WalletError::NoProvider);
            return Ok(());
        }
        Err(_) => {}
    }

    println!("Approve the connection request in your wallet...");
    match session.connect_interactive().await {
        Ok(id) => println!("Connected: {}", id),
        Err(e) => eprintln!("Connection failed: {}", e),
    }
    Ok(())
}

async fn handle_cli_status(app_config: &config::AppConfig) -> Result<()> {
    let rpc_url = config::get_rpc_url(app_config);
    let wallet_url = config::get_wallet_url(app_config);
    let program_id = config::get_program_id(app_config);

    let board_keypair = config::load_or_create_board_keypair(&config::get_config_dir())
        .context("Failed to load board keypair")?;
    let handle = BoardHandle::derive(&board_keypair, &program_id);

    println!("linku {}", config::APP_VERSION);
    println!("Config dir:    {}", config::get_config_dir().display());
    println!("Ledger RPC:    {}", rpc_url);
    println!("Wallet agent:  {}", wallet_url);
    println!("Program:       {}", handle.program);
    println!("Board account: {}", handle.account);

    let wallet = AgentWallet::new(wallet_url);
    let available = wallet.is_available().await;
    println!("Wallet agent running: {}", if available { "yes" } else { "no" });

    let gateway = RpcGateway::new(rpc_url, board_keypair.secret.clone());
    match gateway.fetch_links(&handle).await {
        Ok(links) => println!("Board: {} links", links.len()),
        Err(LedgerError::AccountNotFound) => println!("Board: not initialized yet"),
        Err(e) => println!("Board: unavailable ({})", e),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = restore_terminal();
        default_hook(info);
    }));

    logger::init();
    let args = Args::parse();
    let app_config = config::load_config();

    match args.command {
        Some(Commands::Connect) => return handle_cli_connect(&app_config).await,
        Some(Commands::Status) => return handle_cli_status(&app_config).await,
        None | Some(Commands::Tui) => {}
    }

    let board_keypair = config::load_or_create_board_keypair(&config::get_config_dir())
        .context("Failed to load board keypair")?;
    let handle = BoardHandle::derive(&board_keypair, &config::get_program_id(&app_config));

    let (intent_tx, intent_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();

    let wallet = AgentWallet::new(config::get_wallet_url(&app_config));
    let gateway = RpcGateway::new(
        config::get_rpc_url(&app_config),
        board_keypair.secret.clone(),
    );
    let controller = Controller::new(Session::new(wallet), gateway, handle, snapshot_tx);
    let controller_handle = tokio::spawn(ControllerTask::new(controller, intent_rx).start());

    // Trusted reconnect happens before the first frame; its outcome arrives
    // as a snapshot like any other.
    let _ = intent_tx.send(Intent::ConnectSilent);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let mut model = Model::new(intent_tx, snapshot_rx, app_config);
    let model_result = model.run(&mut terminal).await;

    // Dropping the model closes the intent channel, which stops the
    // controller task.
    drop(model);
    let _ = tokio::time::timeout(Duration::from_secs(1), controller_handle).await;
    let _ = restore_terminal();
    if let Err(err) = model_result {
        eprintln!("Error: {:?}", err);
    }
    Ok(())
}
