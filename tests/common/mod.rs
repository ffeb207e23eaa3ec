#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;

use restream::process::OutputStream;
use restream::{Launcher, ProcessExit, TranscoderProcess};

#[derive(Debug, Clone)]
pub struct Launch {
    pub program: String,
    pub args: Vec<String>,
}

/// Records every launch and hands out fake children that exit when told to.
#[derive(Clone, Default)]
pub struct SpyLauncher {
    pub launches: Arc<Mutex<Vec<Launch>>>,
    pub terminates: Arc<AtomicUsize>,
    pub kills: Arc<AtomicUsize>,
    children: Arc<Mutex<Vec<Arc<watch::Sender<Option<ProcessExit>>>>>>,
    ignore_terminate: bool,
    fail_with: Option<io::ErrorKind>,
}

impl SpyLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Children ignore SIGTERM and only go away when killed.
    pub fn stubborn() -> Self {
        Self {
            ignore_terminate: true,
            ..Self::default()
        }
    }

    pub fn failing(kind: io::ErrorKind) -> Self {
        Self {
            fail_with: Some(kind),
            ..Self::default()
        }
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }

    pub fn last_launch(&self) -> Option<Launch> {
        self.launches.lock().unwrap().last().cloned()
    }

    pub fn terminate_count(&self) -> usize {
        self.terminates.load(Ordering::SeqCst)
    }

    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    /// Makes the most recently launched child exit on its own.
    pub fn exit_last(&self, code: Option<i32>) {
        let children = self.children.lock().unwrap();
        let child = children.last().expect("nothing launched");
        child.send_replace(Some(ProcessExit { code }));
    }

    pub fn into_launcher(self) -> Arc<dyn Launcher> {
        Arc::new(self)
    }
}

impl Launcher for SpyLauncher {
    fn launch(&self, program: &str, args: &[String]) -> io::Result<Box<dyn TranscoderProcess>> {
        self.launches.lock().unwrap().push(Launch {
            program: program.to_string(),
            args: args.to_vec(),
        });

        if let Some(kind) = self.fail_with {
            return Err(io::Error::new(kind, "spy launch failure"));
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let exit_tx = Arc::new(exit_tx);
        self.children.lock().unwrap().push(exit_tx.clone());

        let output_url = args.last().cloned().unwrap_or_default();
        let (output, writer) = tokio::io::duplex(4096);
        tokio::spawn(write_output(writer, output_url, exit_rx.clone()));

        Ok(Box::new(FakeProcess {
            pid: 4242,
            exit_tx,
            exit_rx,
            output: Some(Box::new(output)),
            ignore_terminate: self.ignore_terminate,
            terminates: self.terminates.clone(),
            kills: self.kills.clone(),
        }))
    }
}

struct FakeProcess {
    pid: u32,
    exit_tx: Arc<watch::Sender<Option<ProcessExit>>>,
    exit_rx: watch::Receiver<Option<ProcessExit>>,
    output: Option<OutputStream>,
    ignore_terminate: bool,
    terminates: Arc<AtomicUsize>,
    kills: Arc<AtomicUsize>,
}

impl TranscoderProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn take_output(&mut self) -> Vec<OutputStream> {
        self.output.take().into_iter().collect()
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.terminates.fetch_add(1, Ordering::SeqCst);
        if !self.ignore_terminate {
            self.exit_tx.send_replace(Some(ProcessExit { code: None }));
        }
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.exit_tx.send_replace(Some(ProcessExit { code: None }));
        Ok(())
    }

    fn wait(&mut self) -> BoxFuture<'_, io::Result<ProcessExit>> {
        Box::pin(async move {
            loop {
                let current = *self.exit_rx.borrow_and_update();
                if let Some(exit) = current {
                    return Ok(exit);
                }
                self.exit_rx
                    .changed()
                    .await
                    .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e))?;
            }
        })
    }
}

/// Prints what ffmpeg prints around an RTMP output: the banner and target up
/// front, and the failing URL only once the process is gone.
async fn write_output(
    mut writer: tokio::io::DuplexStream,
    output_url: String,
    mut exit_rx: watch::Receiver<Option<ProcessExit>>,
) {
    let banner = format!("ffmpeg version n6.0\nOutput #0, flv, to '{}':\n", output_url);
    let _ = writer.write_all(banner.as_bytes()).await;

    let exit = exit_rx.wait_for(|exit| exit.is_some()).await.ok().and_then(|e| *e);
    if matches!(exit, Some(ProcessExit { code: Some(code) }) if code != 0) {
        let last = format!("{}: Input/output error\n", output_url);
        let _ = writer.write_all(last.as_bytes()).await;
    }
}

pub fn test_config(dir: &std::path::Path) -> restream::Config {
    let mut config = restream::Config::new(dir);
    config.stop_timeout = Duration::from_millis(100);
    config
}
