use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Result, StreamError};
use crate::process::{Launcher, OutputStream, ProcessExit, TranscoderProcess};
use crate::transcoder::{build_args, ingest_url, masked_ingest_url};

const OUTPUT_TAIL_LINES: usize = 32;
const EVENT_CAPACITY: usize = 16;
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);
const MASKED_KEY: &str = "****";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    Idle,
    Streaming { file_name: String },
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamStatus::Idle => write!(f, "Not streaming"),
            StreamStatus::Streaming { file_name } => write!(f, "Streaming: {}", file_name),
        }
    }
}

/// Lifecycle notifications for whoever presents the stream state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Started { file_name: String },
    /// The session ended because `stop` was called.
    Stopped { file_name: String },
    /// The transcoder exited without being asked to.
    Exited { file_name: String, code: Option<i32> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub file_name: String,
    pub source: PathBuf,
    pub pid: Option<u32>,
}

struct ActiveSession {
    info: SessionInfo,
    alive: Arc<AtomicBool>,
    stop_tx: Option<oneshot::Sender<()>>,
    watcher: JoinHandle<()>,
}

impl ActiveSession {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Owns at most one transcoder child at a time.
///
/// `start` and `stop` serialize on the same lock, so overlapping calls can
/// never leave two children running. A watcher task owns the child handle and
/// reports when it goes away.
pub struct StreamSupervisor {
    program: String,
    stop_timeout: Duration,
    launcher: Arc<dyn Launcher>,
    session: Mutex<Option<ActiveSession>>,
    events: broadcast::Sender<StreamEvent>,
    output_tail: Arc<Mutex<VecDeque<String>>>,
}

impl StreamSupervisor {
    pub fn new(config: &Config, launcher: Arc<dyn Launcher>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            program: config.transcoder.clone(),
            stop_timeout: config.stop_timeout,
            launcher,
            session: Mutex::new(None),
            events,
            output_tail: Arc::new(Mutex::new(VecDeque::with_capacity(OUTPUT_TAIL_LINES))),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn preflight_check(&self) -> bool {
        crate::transcoder::preflight_check(&self.program)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    pub async fn start(
        &self,
        source: Option<&Path>,
        destination_base_url: &str,
        stream_key: &str,
    ) -> Result<SessionInfo> {
        let source = source.ok_or(StreamError::NoMediaFound)?;
        if stream_key.is_empty() {
            return Err(StreamError::MissingCredential);
        }

        let mut slot = self.session.lock().await;
        if let Some(active) = slot.as_ref() {
            if active.is_alive() {
                return Err(StreamError::AlreadyStreaming(active.info.file_name.clone()));
            }
        }
        // Whatever is left in the slot has already exited.
        *slot = None;

        let file_name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());

        let args = build_args(source, &ingest_url(destination_base_url, stream_key));
        let masked_url = masked_ingest_url(destination_base_url);
        debug!(
            "Transcoder command: {} {} {}",
            self.program,
            args[..args.len() - 1].join(" "),
            masked_url
        );

        let mut child = self
            .launcher
            .launch(&self.program, &args)
            .map_err(|source| StreamError::Launch {
                program: self.program.clone(),
                source,
            })?;

        let pid = child.id();
        info!("Streaming {} to {} (pid {:?})", source.display(), masked_url, pid);

        self.output_tail.lock().await.clear();
        let drains = child
            .take_output()
            .into_iter()
            .map(|stream| {
                tokio::spawn(drain_output(
                    stream,
                    stream_key.to_string(),
                    self.output_tail.clone(),
                ))
            })
            .collect();

        let _ = self.events.send(StreamEvent::Started {
            file_name: file_name.clone(),
        });

        let alive = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = oneshot::channel();
        let watcher = tokio::spawn(watch_child(ChildWatch {
            child,
            drains,
            stop_rx,
            file_name: file_name.clone(),
            grace: self.stop_timeout,
            alive: alive.clone(),
            events: self.events.clone(),
            output_tail: self.output_tail.clone(),
        }));

        let info = SessionInfo {
            file_name,
            source: source.to_path_buf(),
            pid,
        };
        *slot = Some(ActiveSession {
            info: info.clone(),
            alive,
            stop_tx: Some(stop_tx),
            watcher,
        });

        Ok(info)
    }

    /// Ends the current session. Does nothing when idle.
    ///
    /// Sends one graceful termination request, waits up to the configured
    /// grace period, then kills the child if it is still running.
    pub async fn stop(&self) {
        let mut slot = self.session.lock().await;
        let Some(mut active) = slot.take() else {
            debug!("Stop requested while idle");
            return;
        };

        if let Some(stop_tx) = active.stop_tx.take() {
            if stop_tx.send(()).is_ok() {
                info!("Stopping stream of {}", active.info.file_name);
            }
        }

        if let Err(e) = active.watcher.await {
            error!("Transcoder watcher failed: {}", e);
        }
    }

    pub async fn status(&self) -> StreamStatus {
        let mut slot = self.session.lock().await;
        if let Some(active) = slot.as_ref() {
            if active.is_alive() {
                return StreamStatus::Streaming {
                    file_name: active.info.file_name.clone(),
                };
            }
        }
        // Reap a session whose child exited on its own.
        *slot = None;
        StreamStatus::Idle
    }

    /// Last lines the transcoder printed during the most recent session, with
    /// the stream key replaced by `****`.
    pub async fn recent_output(&self) -> Vec<String> {
        self.output_tail.lock().await.iter().cloned().collect()
    }
}

struct ChildWatch {
    child: Box<dyn TranscoderProcess>,
    drains: Vec<JoinHandle<()>>,
    stop_rx: oneshot::Receiver<()>,
    file_name: String,
    grace: Duration,
    alive: Arc<AtomicBool>,
    events: broadcast::Sender<StreamEvent>,
    output_tail: Arc<Mutex<VecDeque<String>>>,
}

enum WatchOutcome {
    Exited(std::io::Result<ProcessExit>),
    StopRequested,
}

async fn watch_child(watch: ChildWatch) {
    let ChildWatch {
        mut child,
        mut drains,
        stop_rx,
        file_name,
        grace,
        alive,
        events,
        output_tail,
    } = watch;

    // A dropped sender means the supervisor itself went away; treat it as stop.
    let outcome = tokio::select! {
        exit = child.wait() => WatchOutcome::Exited(exit),
        _ = stop_rx => WatchOutcome::StopRequested,
    };

    let outcome = match outcome {
        WatchOutcome::StopRequested => {
            shut_down(child.as_mut(), grace).await;
            WatchOutcome::StopRequested
        }
        exited => exited,
    };

    // The last lines ffmpeg prints usually explain why it exited, so let the
    // readers reach end of stream before reporting.
    if timeout(DRAIN_TIMEOUT, join_all(drains.iter_mut())).await.is_err() {
        debug!("Transcoder output still open after {:?}", DRAIN_TIMEOUT);
    }
    for drain in &drains {
        drain.abort();
    }

    let event = match outcome {
        WatchOutcome::Exited(Ok(exit)) => {
            if exit.success() {
                info!("Transcoder finished streaming {}", file_name);
            } else {
                let tail = output_tail.lock().await;
                warn!(
                    "Transcoder for {} exited with code {:?}; last output:\n{}",
                    file_name,
                    exit.code,
                    tail.iter().cloned().collect::<Vec<_>>().join("\n")
                );
            }
            StreamEvent::Exited {
                file_name,
                code: exit.code,
            }
        }
        WatchOutcome::Exited(Err(e)) => {
            error!("Failed to wait on transcoder for {}: {}", file_name, e);
            StreamEvent::Exited {
                file_name,
                code: None,
            }
        }
        WatchOutcome::StopRequested => StreamEvent::Stopped { file_name },
    };

    alive.store(false, Ordering::SeqCst);
    let _ = events.send(event);
}

async fn shut_down(child: &mut dyn TranscoderProcess, grace: Duration) {
    if let Err(e) = child.terminate() {
        warn!("Failed to signal transcoder: {}", e);
    }

    match timeout(grace, child.wait()).await {
        Ok(Ok(exit)) => debug!("Transcoder exited with code {:?} after stop", exit.code),
        Ok(Err(e)) => warn!("Failed to wait on transcoder after stop: {}", e),
        Err(_) => {
            warn!("Transcoder still running after {:?}, killing it", grace);
            if let Err(e) = child.kill() {
                error!("Failed to kill transcoder: {}", e);
                return;
            }
            if let Err(e) = child.wait().await {
                warn!("Failed to reap transcoder: {}", e);
            }
        }
    }
}

/// Keeps the last few lines of transcoder output. ffmpeg redraws its progress
/// line with `\r`, so both `\r` and `\n` end a line here. ffmpeg also echoes
/// its output URL, so the stream key is masked before a line is logged or kept.
async fn drain_output(stream: OutputStream, stream_key: String, tail: Arc<Mutex<VecDeque<String>>>) {
    let mut segments = BufReader::new(stream).split(b'\r');
    loop {
        let chunk = match segments.next_segment().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                debug!("Transcoder output closed: {}", e);
                break;
            }
        };

        let text = String::from_utf8_lossy(&chunk);
        let mut tail = tail.lock().await;
        for line in text.lines().map(str::trim_end).filter(|l| !l.is_empty()) {
            let line = mask_key(line, &stream_key);
            debug!(target: "restream::ffmpeg", "{}", line);
            if tail.len() == OUTPUT_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }
}

fn mask_key(line: &str, stream_key: &str) -> String {
    if stream_key.is_empty() {
        line.to_string()
    } else {
        line.replace(stream_key, MASKED_KEY)
    }
}
