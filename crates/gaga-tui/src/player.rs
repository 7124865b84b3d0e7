//! Playback controller: owns the single player child process.
//!
//! Architecture:
//!
//! ```text
//!   PlayerHandle (cloneable)
//!         │  Request { command, oneshot reply }
//!         ▼
//!   PlaybackController::run()   ← sole owner of the child process
//!         │
//!         └── Child (own process group)
//!               stop: SIGTERM → group, wait grace period, SIGKILL → group
//! ```
//!
//! State machine: `Idle → Starting → Playing → Stopping → Idle`.  A process
//! handle exists iff a stream is active, and there is never more than one.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use gaga_proto::config::PlayerConfig;
use gaga_proto::protocol::{Command, PlaybackSnapshot, PlaybackStatus, Stream, StreamId};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

// ── errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("no stream with id {0}")]
    UnknownStream(StreamId),
    #[error("stream {0} is already playing, switch instead")]
    AlreadyPlaying(StreamId),
    #[error("failed to start player for {stream}: {source}")]
    LaunchFailed {
        stream: String,
        #[source]
        source: std::io::Error,
    },
    #[error("playback controller is not running")]
    ControllerGone,
}

/// How a stop request ended.  A forced kill is logged as a termination
/// timeout but is not an error for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    Exited,
    Killed,
}

// ── settings ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub binary: PathBuf,
    pub args: Vec<String>,
    /// 0.0 - 1.0
    pub volume: f32,
    pub grace_period: Duration,
}

impl PlayerSettings {
    pub fn from_config(binary: PathBuf, player: &PlayerConfig, volume: f32) -> Self {
        Self {
            binary,
            args: player.args.clone(),
            volume,
            grace_period: player.grace_period(),
        }
    }

    /// Expand the argument template for one stream.
    pub fn expand_args(&self, url: &str) -> Vec<String> {
        let volume = (self.volume * 100.0).clamp(0.0, 100.0).round() as i64;
        let mut saw_url = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|a| {
                if a.contains("{url}") {
                    saw_url = true;
                }
                a.replace("{url}", url)
                    .replace("{volume}", &volume.to_string())
            })
            .collect();
        if !saw_url {
            args.push(url.to_string());
        }
        args
    }
}

// ── controller ────────────────────────────────────────────────────────────────

struct ActivePlayback {
    stream_id: StreamId,
    child: Child,
    /// Process group of the player.  Kept separately because the leader's
    /// pid is gone once it has been waited on, while the group may not be.
    pgid: Option<u32>,
}

pub struct PlaybackController {
    streams: Vec<Stream>,
    settings: PlayerSettings,
    active: Option<ActivePlayback>,
    status: PlaybackStatus,
    shut_down: bool,
}

impl PlaybackController {
    pub fn new(streams: Vec<Stream>, settings: PlayerSettings) -> Self {
        Self {
            streams,
            settings,
            active: None,
            status: PlaybackStatus::Idle,
            shut_down: false,
        }
    }

    #[cfg(test)]
    fn active_pid(&self) -> Option<u32> {
        self.active.as_ref().and_then(|a| a.child.id())
    }

    fn set_status(&mut self, next: PlaybackStatus) {
        if next != self.status {
            debug!("player: {} → {}", self.status.label(), next.label());
            self.status = next;
        }
    }

    fn stream(&self, id: StreamId) -> Result<&Stream, PlaybackError> {
        self.streams
            .iter()
            .find(|s| s.id == id)
            .ok_or(PlaybackError::UnknownStream(id))
    }

    /// Start `id`.  Rejected while another stream is active.
    pub async fn play(&mut self, id: StreamId) -> Result<(), PlaybackError> {
        let stream = self.stream(id)?.clone();
        self.reap();
        if let Some(active) = &self.active {
            return Err(PlaybackError::AlreadyPlaying(active.stream_id));
        }

        self.set_status(PlaybackStatus::Starting);
        let args = self.settings.expand_args(&stream.url);
        debug!("player: {:?} {:?}", self.settings.binary, args);

        let mut cmd = tokio::process::Command::new(&self.settings.binary);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        match cmd.spawn() {
            Ok(child) => {
                info!(
                    "player: started '{}' (pid {:?})",
                    stream.name,
                    child.id()
                );
                self.active = Some(ActivePlayback {
                    stream_id: id,
                    pgid: child.id(),
                    child,
                });
                self.set_status(PlaybackStatus::Playing);
                Ok(())
            }
            Err(source) => {
                error!("player: launch failed for '{}': {}", stream.name, source);
                self.set_status(PlaybackStatus::Idle);
                Err(PlaybackError::LaunchFailed {
                    stream: stream.name,
                    source,
                })
            }
        }
    }

    /// Stop whatever is playing.  Succeeds without side effects when idle.
    pub async fn stop(&mut self) -> StopOutcome {
        let Some(ActivePlayback {
            stream_id,
            mut child,
            pgid,
        }) = self.active.take()
        else {
            self.set_status(PlaybackStatus::Idle);
            return StopOutcome::NotRunning;
        };

        self.set_status(PlaybackStatus::Stopping);
        let outcome = terminate(&mut child, pgid, self.settings.grace_period).await;
        match outcome {
            StopOutcome::Killed => warn!(
                "player: stream {} ignored SIGTERM for {:?}, killed (termination timeout)",
                stream_id, self.settings.grace_period
            ),
            _ => info!("player: stream {} stopped", stream_id),
        }
        self.set_status(PlaybackStatus::Idle);
        outcome
    }

    /// Stop the current stream and start `id`.  Switching to the stream that
    /// is already playing does nothing.  If the new stream fails to launch
    /// the controller ends up idle.
    pub async fn switch(&mut self, id: StreamId) -> Result<(), PlaybackError> {
        self.stream(id)?;
        self.reap();
        if self.active.as_ref().map(|a| a.stream_id) == Some(id) {
            debug!("player: switch to active stream {} ignored", id);
            return Ok(());
        }
        self.stop().await;
        self.play(id).await
    }

    /// Current playback, backed by a non-blocking liveness probe.
    pub fn status(&mut self) -> PlaybackSnapshot {
        self.reap();
        match &self.active {
            Some(active) => PlaybackSnapshot {
                is_playing: true,
                active_stream_id: Some(active.stream_id),
                process_alive: true,
            },
            None => PlaybackSnapshot::idle(),
        }
    }

    /// Final stop.  Runs the stop sequence once; later calls are no-ops.
    pub async fn shutdown(&mut self) -> StopOutcome {
        if self.shut_down {
            return StopOutcome::NotRunning;
        }
        self.shut_down = true;
        info!("player: shutting down");
        self.stop().await
    }

    pub async fn execute(&mut self, command: Command) -> Result<PlaybackSnapshot, PlaybackError> {
        match command {
            Command::Play { stream_id } => self.play(stream_id).await?,
            Command::Switch { stream_id } => self.switch(stream_id).await?,
            Command::Stop => {
                self.stop().await;
            }
        }
        Ok(self.status())
    }

    /// Drop the handle of a player that exited on its own.
    fn reap(&mut self) {
        let exited = match self.active.as_mut() {
            None => return,
            Some(active) => match active.child.try_wait() {
                Ok(None) => false,
                Ok(Some(status)) => {
                    if let Some(code) = status.code() {
                        warn!("player: process exited with code: {}", code);
                    } else {
                        warn!("player: process terminated by signal");
                    }
                    true
                }
                Err(e) => {
                    warn!("player: liveness check failed: {}", e);
                    true
                }
            },
        };
        if exited {
            if let Some(mut gone) = self.active.take() {
                signal_group(&mut gone.child, gone.pgid, false);
            }
            self.set_status(PlaybackStatus::Idle);
        }
    }

    // ── actor loop ────────────────────────────────────────────────────────────

    /// Serve requests until a shutdown request arrives or every handle is
    /// dropped.  The stop sequence runs exactly once on the way out.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Request>) {
        info!("player: controller loop started");
        while let Some(req) = rx.recv().await {
            match req {
                Request::Execute { command, reply } => {
                    debug!("player: command {:?}", command);
                    let _ = reply.send(self.execute(command).await);
                }
                Request::Status { reply } => {
                    let _ = reply.send(self.status());
                }
                Request::Shutdown { reply } => {
                    let outcome = self.shutdown().await;
                    let _ = reply.send(outcome);
                    return;
                }
            }
        }
        self.shutdown().await;
    }
}

/// Graceful-then-forced termination of the child's process group.  The
/// group is signalled even when the leader has already exited, so helpers a
/// wrapper script left behind go down with it.
async fn terminate(child: &mut Child, pgid: Option<u32>, grace: Duration) -> StopOutcome {
    signal_group(child, pgid, false);
    if tokio::time::timeout(grace, child.wait()).await.is_ok() {
        return StopOutcome::Exited;
    }

    signal_group(child, pgid, true);
    if let Err(e) = child.kill().await {
        warn!("player: forced kill failed: {}", e);
    }
    StopOutcome::Killed
}

#[cfg(unix)]
fn signal_group(_child: &mut Child, pgid: Option<u32>, force: bool) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pgid) = pgid else { return };
    let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
    if let Err(e) = killpg(Pid::from_raw(pgid as i32), signal) {
        debug!("player: killpg({}, {:?}) failed: {}", pgid, signal, e);
    }
}

#[cfg(not(unix))]
fn signal_group(child: &mut Child, _pgid: Option<u32>, _force: bool) {
    if let Err(e) = child.start_kill() {
        debug!("player: start_kill failed: {}", e);
    }
}

// ── handle ────────────────────────────────────────────────────────────────────

pub enum Request {
    Execute {
        command: Command,
        reply: oneshot::Sender<Result<PlaybackSnapshot, PlaybackError>>,
    },
    Status {
        reply: oneshot::Sender<PlaybackSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<StopOutcome>,
    },
}

/// Cloneable handle to the controller task.
#[derive(Clone)]
pub struct PlayerHandle {
    tx: mpsc::Sender<Request>,
}

impl PlayerHandle {
    /// Spawn the controller loop and return a handle to it.
    pub fn spawn(controller: PlaybackController) -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(32);
        let task = tokio::spawn(controller.run(rx));
        (Self { tx }, task)
    }

    pub async fn execute(&self, command: Command) -> Result<PlaybackSnapshot, PlaybackError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Execute { command, reply })
            .await
            .map_err(|_| PlaybackError::ControllerGone)?;
        rx.await.map_err(|_| PlaybackError::ControllerGone)?
    }

    /// Latest playback snapshot; idle when the controller is gone.
    pub async fn status(&self) -> PlaybackSnapshot {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Request::Status { reply }).await.is_err() {
            return PlaybackSnapshot::idle();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn shutdown(&self) -> StopOutcome {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Request::Shutdown { reply }).await.is_err() {
            return StopOutcome::NotRunning;
        }
        rx.await.unwrap_or(StopOutcome::NotRunning)
    }
}
