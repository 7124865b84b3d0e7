//! Interactive dashboard.
//!
//! Architecture:
//! - The refresh loop runs as its own task and publishes into `SharedState`.
//! - Playback commands are queued to a dispatcher task, which talks to the
//!   player actor and writes results (playback snapshot, failure toast) back.
//! - The foreground loop snapshots the state, composes a frame, lets the
//!   `Renderer` diff it onto the terminal, then waits for a key, a toast, a
//!   signal or the adaptive cadence timer.
//!
//! Shutdown order: stop input → stop the refresh loop → stop the player →
//! restore the terminal.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gaga_proto::protocol::{toggle_command, Command, PlaybackSnapshot, Stream, StreamId};
use gaga_proto::state::{SharedState, ToastSeverity};
use rand::Rng;
use ratatui::crossterm::{
    cursor::{Hide, Show},
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{self, disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metadata::TrackSource;
use crate::player::{PlaybackError, PlayerHandle};
use crate::refresh::RefreshLoop;
use crate::render::{compose_frame, Cadence, CrosstermSurface, FrameContext, Renderer};

const INPUT_POLL: Duration = Duration::from_millis(100);

// ── Terminal guard ────────────────────────────────────────────────────────────

/// Raw mode + alternate screen for as long as it lives.  Restores the
/// terminal on drop; a panic hook covers release builds, which abort
/// instead of unwinding.
struct TerminalGuard {
    active: bool,
}

impl TerminalGuard {
    fn enter() -> anyhow::Result<Self> {
        let default_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), Show, LeaveAlternateScreen);
            default_hook(info);
        }));

        enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen, Hide) {
            let _ = disable_raw_mode();
            return Err(e.into());
        }
        Ok(Self { active: true })
    }

    fn restore(&mut self) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        let mut stdout = io::stdout();
        execute!(stdout, Show, LeaveAlternateScreen)?;
        disable_raw_mode()
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}

// ── Signals ───────────────────────────────────────────────────────────────────

/// Resolves on SIGINT, SIGTERM, SIGHUP or SIGQUIT.
///
/// Listeners are installed when this is called, not when the future is
/// first polled, so a hangup right after startup still runs the stop
/// sequence instead of the default action.
#[cfg(unix)]
pub fn shutdown_signal() -> impl Future<Output = ()> {
    use tokio::signal::unix::{signal, Signal, SignalKind};

    fn listen(kind: SignalKind, name: &'static str) -> Option<(Signal, &'static str)> {
        match signal(kind) {
            Ok(sig) => Some((sig, name)),
            Err(e) => {
                warn!("cannot listen for {}: {}", name, e);
                None
            }
        }
    }

    async fn recv(listener: &mut Option<(Signal, &'static str)>) {
        match listener {
            Some((sig, name)) => {
                sig.recv().await;
                info!("received {}", name);
            }
            None => std::future::pending().await,
        }
    }

    let mut int = listen(SignalKind::interrupt(), "SIGINT");
    let mut term = listen(SignalKind::terminate(), "SIGTERM");
    let mut hup = listen(SignalKind::hangup(), "SIGHUP");
    let mut quit = listen(SignalKind::quit(), "SIGQUIT");
    async move {
        tokio::select! {
            _ = recv(&mut int) => {}
            _ = recv(&mut term) => {}
            _ = recv(&mut hup) => {}
            _ = recv(&mut quit) => {}
        }
    }
}

/// Resolves on Ctrl-C.
#[cfg(not(unix))]
pub fn shutdown_signal() -> impl Future<Output = ()> {
    async {
        let _ = tokio::signal::ctrl_c().await;
    }
}

// ── Command dispatch ──────────────────────────────────────────────────────────

/// Playback requests queued by the foreground.  The dispatcher turns each
/// into a [`Command`] against the controller's live status, so keys pressed
/// in quick succession never act on a stale frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    /// Enter/Space: play, stop or switch to the stream.
    Toggle(StreamId),
    /// Make the stream the one playing.
    Tune(StreamId),
    Stop,
}

impl Intent {
    fn resolve(self, live: &PlaybackSnapshot) -> Command {
        match self {
            Intent::Toggle(id) => toggle_command(id, live),
            Intent::Tune(id) if live.is_playing => Command::Switch { stream_id: id },
            Intent::Tune(id) => Command::Play { stream_id: id },
            Intent::Stop => Command::Stop,
        }
    }
}

/// Run queued playback requests in order, publishing each result.
async fn dispatch_commands(
    mut rx: mpsc::Receiver<Intent>,
    player: PlayerHandle,
    state: SharedState,
) {
    while let Some(intent) = rx.recv().await {
        let command = intent.resolve(&player.status().await);
        match player.execute(command).await {
            Ok(snapshot) => state.set_playback(snapshot).await,
            Err(e) => {
                warn!("command {:?} failed: {}", command, e);
                let message = match &e {
                    PlaybackError::LaunchFailed { stream, .. } => format!("Failed to start {}", stream),
                    other => other.to_string(),
                };
                state.set_playback(player.status().await).await;
                state.push_toast(message, ToastSeverity::Error).await;
            }
        }
    }
    debug!("command dispatcher stopped");
}

// ── Key handling ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum KeyAction {
    None,
    Redraw,
    Queue(Intent),
    Refresh,
    Quit,
}

/// Foreground-owned dashboard state.
pub struct Dashboard {
    streams: Vec<Stream>,
    selected: StreamId,
}

impl Dashboard {
    pub fn new(streams: Vec<Stream>) -> Self {
        Self {
            streams,
            selected: 0,
        }
    }

    fn select(&mut self, index: usize) -> KeyAction {
        if index < self.streams.len() && index != self.selected {
            self.selected = index;
            KeyAction::Redraw
        } else {
            KeyAction::None
        }
    }

    fn random_command(&mut self, playback: &PlaybackSnapshot) -> KeyAction {
        let candidates: Vec<StreamId> = self
            .streams
            .iter()
            .map(|s| s.id)
            .filter(|id| self.streams.len() == 1 || Some(*id) != playback.active_stream_id)
            .collect();
        if candidates.is_empty() {
            return KeyAction::None;
        }
        let pick = candidates[rand::thread_rng().gen_range(0..candidates.len())];
        self.selected = pick;
        KeyAction::Queue(Intent::Tune(pick))
    }

    fn on_key(&mut self, key: KeyEvent, playback: &PlaybackSnapshot) -> KeyAction {
        if self.streams.is_empty() {
            return match key.code {
                KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => KeyAction::Quit,
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => KeyAction::Quit,
                _ => KeyAction::None,
            };
        }

        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => KeyAction::Quit,
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => KeyAction::Quit,
            KeyCode::Up | KeyCode::Char('k') => self.select(self.selected.saturating_sub(1)),
            KeyCode::Down | KeyCode::Char('j') => self.select(self.selected + 1),
            KeyCode::Char(c @ '1'..='9') => self.select(c as usize - '1' as usize),
            KeyCode::Enter | KeyCode::Char(' ') => KeyAction::Queue(Intent::Toggle(self.selected)),
            KeyCode::Char('s') => KeyAction::Queue(Intent::Stop),
            KeyCode::Char('r') => KeyAction::Refresh,
            KeyCode::Char('x') => self.random_command(playback),
            _ => KeyAction::None,
        }
    }
}

// ── App ───────────────────────────────────────────────────────────────────────

pub struct App<A, T> {
    dashboard: Dashboard,
    state: SharedState,
    player: PlayerHandle,
    refresh: RefreshLoop<A, T>,
    autoplay: bool,
}

impl<A, T> App<A, T>
where
    A: TrackSource + 'static,
    T: TrackSource + 'static,
{
    pub fn new(
        streams: Vec<Stream>,
        state: SharedState,
        player: PlayerHandle,
        refresh: RefreshLoop<A, T>,
        autoplay: bool,
    ) -> Self {
        Self {
            dashboard: Dashboard::new(streams),
            state,
            player,
            refresh,
            autoplay,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let App {
            mut dashboard,
            state,
            player,
            refresh,
            autoplay,
        } = self;

        let mut guard = TerminalGuard::enter()?;
        debug!("run(): terminal ready");

        let cancel = CancellationToken::new();
        let force_refresh = Arc::new(Notify::new());
        let refresh_task = tokio::spawn(refresh.run(cancel.clone(), force_refresh.clone()));

        let (cmd_tx, cmd_rx) = mpsc::channel::<Intent>(32);
        let dispatcher = tokio::spawn(dispatch_commands(
            cmd_rx,
            player.clone(),
            state.clone(),
        ));

        if autoplay {
            if let Some(first) = dashboard.streams.first() {
                info!("autoplay: {}", first.name);
                let _ = cmd_tx.send(Intent::Tune(first.id)).await;
            }
        }

        // ── Background task: keyboard events ──────────────────────────────────
        let (event_tx, mut event_rx) = mpsc::channel::<Event>(64);
        let input_cancel = cancel.clone();
        let input_task = tokio::task::spawn_blocking(move || {
            while !input_cancel.is_cancelled() {
                match event::poll(INPUT_POLL) {
                    Ok(true) => match event::read() {
                        Ok(ev) => {
                            if event_tx.blocking_send(ev).is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    },
                    Ok(false) => {}
                    Err(_) => break,
                }
            }
        });

        let result = foreground(
            &mut dashboard,
            &state,
            &cmd_tx,
            &force_refresh,
            &mut event_rx,
        )
        .await;

        // ── Teardown ──────────────────────────────────────────────────────────
        info!("shutting down");
        cancel.cancel();
        drop(event_rx);
        if let Err(e) = refresh_task.await {
            warn!("refresh task ended abnormally: {}", e);
        }
        drop(cmd_tx);
        let _ = dispatcher.await;
        let outcome = player.shutdown().await;
        debug!("player stop outcome: {:?}", outcome);
        let _ = input_task.await;
        guard.restore()?;

        result
    }
}

/// Wake the refresh loop for an immediate tick and say so on screen.
async fn request_refresh(force_refresh: &Notify, state: &SharedState) {
    force_refresh.notify_one();
    state.push_toast("Refreshing now playing…", ToastSeverity::Info).await;
}

/// Render + input loop.  Returns when the user quits or a signal arrives.
async fn foreground(
    dashboard: &mut Dashboard,
    state: &SharedState,
    cmd_tx: &mpsc::Sender<Intent>,
    force_refresh: &Notify,
    event_rx: &mut mpsc::Receiver<Event>,
) -> anyhow::Result<()> {
    let mut renderer = Renderer::new(CrosstermSurface::new(io::stdout()));
    let mut cadence = Cadence::default();
    let (mut width, mut height) = terminal::size()?;

    let signal = shutdown_signal();
    tokio::pin!(signal);

    loop {
        let snapshot = state.snapshot().await;
        let now = Instant::now();
        let toast_visible = snapshot.toast.as_ref().is_some_and(|t| t.is_visible(now));
        let frame = compose_frame(
            &snapshot,
            &FrameContext {
                streams: &dashboard.streams,
                selected: dashboard.selected,
                now,
                clock: chrono::Local::now().format("%H:%M:%S").to_string(),
                width,
                height,
            },
        );
        let diff = renderer.render(frame)?;
        let wait = cadence.after_frame(diff, toast_visible);

        tokio::select! {
            ev = event_rx.recv() => {
                let Some(ev) = ev else { return Ok(()) };
                cadence.reset();
                match ev {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match dashboard.on_key(key, &snapshot.playback) {
                            KeyAction::Quit => return Ok(()),
                            KeyAction::Queue(intent) => {
                                if cmd_tx.send(intent).await.is_err() {
                                    warn!("command dispatcher gone");
                                }
                            }
                            KeyAction::Refresh => request_refresh(force_refresh, state).await,
                            KeyAction::Redraw | KeyAction::None => {}
                        }
                    }
                    Event::Resize(w, h) => {
                        width = w;
                        height = h;
                        renderer.invalidate();
                    }
                    _ => {}
                }
            }
            _ = tokio::time::sleep(wait) => {}
            _ = state.changed() => cadence.reset(),
            _ = &mut signal => {
                info!("termination signal received");
                return Ok(());
            }
        }
    }
}
