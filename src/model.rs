use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, StageError};

/// The closed set of tile classes the demo recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TileLabel {
    WhiteDragon,
    OneDot,
}

impl TileLabel {
    pub const ALL: [Self; 2] = [Self::WhiteDragon, Self::OneDot];

    /// The label whose recognition routes the automatic run to scene A
    /// ("discard"); every other label routes to scene B ("return").
    pub const DISCARD_LABEL: Self = Self::WhiteDragon;

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WhiteDragon => "white_dragon",
            Self::OneDot => "one_dot",
        }
    }
}

impl std::fmt::Display for TileLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TileLabel {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "white_dragon" => Ok(Self::WhiteDragon),
            "one_dot" => Ok(Self::OneDot),
            other => Err(StageError::InvalidRequest(format!(
                "unknown tile label `{other}`"
            ))),
        }
    }
}

/// The two follow-up branches after classification.
///
/// A throws the tile to the discard pile, B returns it to the wall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SceneId {
    A,
    B,
}

impl SceneId {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }

    /// Scene routing for the fully automatic flow: the designated discard
    /// label selects A, everything else (fallback results included) selects B.
    #[must_use]
    pub const fn route_for(label: TileLabel) -> Self {
        match label {
            TileLabel::WhiteDragon => Self::A,
            TileLabel::OneDot => Self::B,
        }
    }
}

impl std::fmt::Display for SceneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Speech delivery style, forwarded verbatim to the speech collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SpeechStyle {
    Polite,
    Meme,
}

impl SpeechStyle {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Polite => "polite",
            Self::Meme => "meme",
        }
    }
}

impl std::fmt::Display for SpeechStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifiers for the pre-recorded speech lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineKey {
    /// Opening line spoken at the start of every flow.
    LookDone,
    /// Closing line for scene A (discard).
    IWantCheck,
    /// Closing line for scene B (return).
    OkNoProblem,
}

impl LineKey {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LookDone => "LOOK_DONE",
            Self::IWantCheck => "I_WANT_CHECK",
            Self::OkNoProblem => "OK_NO_PROBLEM",
        }
    }

    /// The closing line for a given scene.
    #[must_use]
    pub const fn closing_for(scene: SceneId) -> Self {
        match scene {
            SceneId::A => Self::IWantCheck,
            SceneId::B => Self::OkNoProblem,
        }
    }
}

impl std::fmt::Display for LineKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classification outcome. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecognizeResult {
    pub label: TileLabel,
    pub confidence: f64,
}

impl RecognizeResult {
    #[must_use]
    pub fn new(label: TileLabel, confidence: f64) -> Self {
        Self {
            label,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// One scene invocation. Constructed per call, never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub scene: SceneId,
    pub style: SpeechStyle,
    pub safe: bool,
    /// A pre-computed classification supplied by an external capture path.
    /// When present, the single-shot flow skips its own classify step.
    pub recognized: Option<RecognizeResult>,
}

impl RunRequest {
    #[must_use]
    pub fn new(scene: SceneId) -> Self {
        Self {
            scene,
            style: SpeechStyle::Polite,
            safe: true,
            recognized: None,
        }
    }

    #[must_use]
    pub fn with_style(mut self, style: SpeechStyle) -> Self {
        self.style = style;
        self
    }

    #[must_use]
    pub fn with_safe(mut self, safe: bool) -> Self {
        self.safe = safe;
        self
    }

    #[must_use]
    pub fn with_recognized(mut self, recognized: RecognizeResult) -> Self {
        self.recognized = Some(recognized);
        self
    }
}

/// Outcome of one orchestrator flow.
///
/// `scene` is `None` when the flow never determined one: a `prepare`
/// call, or an automatic run that failed before routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub ok: bool,
    pub scene: Option<SceneId>,
    pub duration_ms: u64,
    pub error: Option<ErrorKind>,
    pub recognized: Option<RecognizeResult>,
    pub finished_at_rfc3339: String,
}

impl RunResult {
    /// The immediate rejection returned while another run holds the busy
    /// gate: zero duration, no side effects performed.
    #[must_use]
    pub fn busy(scene: Option<SceneId>) -> Self {
        Self {
            ok: false,
            scene,
            duration_ms: 0,
            error: Some(ErrorKind::Busy),
            recognized: None,
            finished_at_rfc3339: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[must_use]
    pub fn success(
        scene: Option<SceneId>,
        duration_ms: u64,
        recognized: Option<RecognizeResult>,
    ) -> Self {
        Self {
            ok: true,
            scene,
            duration_ms,
            error: None,
            recognized,
            finished_at_rfc3339: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// A failed run. Any classification obtained before the failure is kept
    /// attached so pollers still see the partial progress.
    #[must_use]
    pub fn failure(
        scene: Option<SceneId>,
        duration_ms: u64,
        error: ErrorKind,
        recognized: Option<RecognizeResult>,
    ) -> Self {
        Self {
            ok: false,
            scene,
            duration_ms,
            error: Some(error),
            recognized,
            finished_at_rfc3339: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Point-in-time view of the status ledger for external pollers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub busy: bool,
    pub last_scene: Option<SceneId>,
    pub last_error: Option<String>,
    pub recognized: Option<RecognizeResult>,
    pub logs: Vec<String>,
}
