pub mod config;
pub mod controller;
pub mod error;
pub mod process;
pub mod scanner;
pub mod settings;
pub mod supervisor;
pub mod transcoder;

pub use config::Config;
pub use controller::StreamController;
pub use error::{Result, StreamError};
pub use process::{Launcher, ProcessExit, TokioLauncher, TranscoderProcess};
pub use scanner::find_newest;
pub use settings::{SettingsStore, StreamSettings};
pub use supervisor::{SessionInfo, StreamEvent, StreamStatus, StreamSupervisor};
