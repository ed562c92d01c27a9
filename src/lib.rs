#![forbid(unsafe_code)]

pub mod capability;
pub mod classifier;
pub mod cli;
pub mod error;
pub mod features;
pub mod lines;
pub mod logging;
pub mod mock;
pub mod model;
pub mod orchestrator;
pub mod refstore;
pub mod status;

pub use error::{StageError, StageResult};
pub use model::{RecognizeResult, RunRequest, RunResult, SceneId, SpeechStyle, TileLabel};
pub use orchestrator::{Expression, Orchestrator};
pub use status::StatusLedger;
