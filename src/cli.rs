//! Command-line surface for the stage demo.
//!
//! All commands drive the mock collaborator stack; the capability traits
//! are the seam where real arm, camera, and audio backends would plug in.
//! Machine-readable results go to stdout as JSON, human-oriented logging
//! goes to stderr via `tracing`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::capability::SpeechCapability;
use crate::classifier::Classifier;
use crate::error::StageResult;
use crate::lines;
use crate::mock::{FixtureCapture, GestureDelays, MockArm};
use crate::model::{LineKey, SceneId, SpeechStyle, TileLabel};
use crate::orchestrator::{Expression, Orchestrator};
use crate::refstore::ReferenceStore;
use crate::status::StatusLedger;

#[derive(Debug, Parser)]
#[command(name = "tilestage")]
#[command(about = "Robotic-arm tile stage demo: scene flows, calibration, classification")]
pub struct Cli {
    /// Directory holding calibrated reference data.
    #[arg(long, default_value = ".tilestage/refs", global = true)]
    pub refs: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one explicitly chosen scene end to end.
    Run(RunArgs),
    /// Pick, present, capture, classify, and route automatically.
    Auto(AutoArgs),
    /// Pick the tile and present it to the camera, then stop.
    Prepare(FlowArgs),
    /// Act on an externally supplied verdict for a scene.
    Execute(ExecuteArgs),
    /// Store the reference descriptor for a label from an image file.
    Calibrate(CalibrateArgs),
    /// Classify an image file without any arm motion.
    Identify(IdentifyArgs),
    /// Print the status snapshot and reference readiness.
    Status,
    /// Hard-stop the arm, busy or not.
    Estop,
    /// Move the arm to its home pose.
    Home,
    /// Play a cosmetic gesture.
    Express(ExpressArgs),
}

#[derive(Debug, Clone, Copy, Args)]
pub struct FlowArgs {
    /// Speech delivery style.
    #[arg(long, value_enum, default_value_t = SpeechStyle::Polite)]
    pub style: SpeechStyle,

    /// Disable the slower safe-motion profile.
    #[arg(long)]
    pub fast: bool,
}

impl FlowArgs {
    #[must_use]
    pub const fn safe(self) -> bool {
        !self.fast
    }
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Which scene to run.
    #[arg(value_enum)]
    pub scene: SceneId,

    #[command(flatten)]
    pub flow: FlowArgs,

    /// Fixture frame served to the mock camera.
    #[arg(long)]
    pub frame: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct AutoArgs {
    #[command(flatten)]
    pub flow: FlowArgs,

    /// Fixture frame served to the mock camera.
    #[arg(long)]
    pub frame: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ExecuteArgs {
    /// Which scene to act out.
    #[arg(value_enum)]
    pub scene: SceneId,

    #[command(flatten)]
    pub flow: FlowArgs,

    /// Label recognized by the external capture path.
    #[arg(long, value_enum)]
    pub label: Option<TileLabel>,

    /// Confidence of the external verdict.
    #[arg(long, default_value_t = 1.0)]
    pub confidence: f64,
}

#[derive(Debug, Args)]
pub struct CalibrateArgs {
    /// Label to calibrate.
    #[arg(value_enum)]
    pub label: TileLabel,

    /// Image file of the tile face.
    pub image: PathBuf,
}

#[derive(Debug, Args)]
pub struct IdentifyArgs {
    /// Image file to classify.
    pub image: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GestureKind {
    Tap,
    Nod,
    Shake,
}

#[derive(Debug, Args)]
pub struct ExpressArgs {
    #[arg(value_enum)]
    pub gesture: GestureKind,

    /// Tap repetitions (tap only).
    #[arg(long, default_value_t = 2)]
    pub times: u32,
}

impl ExpressArgs {
    #[must_use]
    pub const fn to_expression(&self) -> Expression {
        match self.gesture {
            GestureKind::Tap => Expression::Tap(self.times),
            GestureKind::Nod => Expression::Nod,
            GestureKind::Shake => Expression::Shake,
        }
    }
}

/// Speech adapter that prints the line text instead of playing audio.
///
/// The wav name is shown alongside so an operator can see which asset a
/// real playback backend would fetch.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSpeech;

impl SpeechCapability for ConsoleSpeech {
    fn say(&self, line: LineKey, style: SpeechStyle) -> StageResult<()> {
        println!("[{}] {}", lines::line_wav(line), lines::line_text(line, style));
        Ok(())
    }
}

/// The demo stage: orchestrator over mocks with demo-realistic delays.
///
/// The arm and capture handles stay exposed so commands can feed fixture
/// frames and inspect gesture traffic.
pub struct Stage {
    pub orchestrator: Orchestrator,
    pub arm: Arc<MockArm>,
    pub capture: Arc<FixtureCapture>,
}

/// Assemble the mock stage over the reference directory.
pub fn build_stage(refs: &Path) -> StageResult<Stage> {
    let ledger = Arc::new(StatusLedger::new());
    let store = ReferenceStore::open(refs, Arc::clone(&ledger))?;
    let classifier = Classifier::new(store, Arc::clone(&ledger));
    let arm = Arc::new(MockArm::new().with_delays(GestureDelays::demo()));
    let capture = Arc::new(FixtureCapture::new());
    let arm_handle: Arc<dyn crate::capability::ArmCapability> = arm.clone();
    let capture_handle: Arc<dyn crate::capability::CaptureCapability> = capture.clone();
    let orchestrator = Orchestrator::new(
        ledger,
        arm_handle,
        capture_handle,
        Arc::new(ConsoleSpeech),
        Arc::new(Mutex::new(classifier)),
    );
    Ok(Stage {
        orchestrator,
        arm,
        capture,
    })
}
