use std::io;
use std::process::Stdio;

use futures_util::future::BoxFuture;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when the process was ended by a signal.
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// A running transcoder child as seen by the supervisor.
pub trait TranscoderProcess: Send {
    fn id(&self) -> Option<u32>;

    /// Hands over the captured stdout/stderr streams. Later calls return nothing.
    fn take_output(&mut self) -> Vec<OutputStream>;

    /// Asks the process to exit (SIGTERM on Unix).
    fn terminate(&mut self) -> io::Result<()>;

    /// Forcibly ends the process.
    fn kill(&mut self) -> io::Result<()>;

    fn wait(&mut self) -> BoxFuture<'_, io::Result<ProcessExit>>;
}

pub trait Launcher: Send + Sync {
    fn launch(&self, program: &str, args: &[String]) -> io::Result<Box<dyn TranscoderProcess>>;
}

/// Spawns real child processes through tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioLauncher;

impl Launcher for TokioLauncher {
    fn launch(&self, program: &str, args: &[String]) -> io::Result<Box<dyn TranscoderProcess>> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn()?;
        debug!("Spawned {} with pid {:?}", program, child.id());
        Ok(Box::new(TokioProcess { child }))
    }
}

struct TokioProcess {
    child: Child,
}

impl TranscoderProcess for TokioProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn take_output(&mut self) -> Vec<OutputStream> {
        let mut streams: Vec<OutputStream> = Vec::with_capacity(2);
        if let Some(stdout) = self.child.stdout.take() {
            streams.push(Box::new(stdout));
        }
        if let Some(stderr) = self.child.stderr.take() {
            streams.push(Box::new(stderr));
        }
        streams
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        // No pid means the child was already reaped.
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let pid = libc::pid_t::try_from(pid)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        // SAFETY: kill(2) has no memory-safety preconditions; the pid belongs
        // to a child we have not reaped yet.
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    fn wait(&mut self) -> BoxFuture<'_, io::Result<ProcessExit>> {
        Box::pin(async move {
            let status = self.child.wait().await?;
            Ok(ProcessExit {
                code: status.code(),
            })
        })
    }
}
