//! Collaborator capability contracts.
//!
//! The orchestrator depends on these traits only; arm firmware, camera
//! transports, and audio backends live behind them. Every call blocks
//! until the physical side effect completes, and fails with a typed
//! [`StageError`] rather than panicking.
//!
//! Optional gestures are modeled as a separate sub-capability resolved
//! once at construction via [`ArmCapability::expressive`], never probed
//! per call.

use crate::error::StageResult;
use crate::model::{LineKey, SpeechStyle};

/// The named arm gestures every arm implementation must provide.
///
/// `safe` may lower motion speed and widen margins; implementations are
/// free to ignore it. `emergency_stop` must be callable at any time,
/// including while another gesture is in flight, and must never be gated
/// on the orchestrator's busy flag.
pub trait ArmCapability: Send + Sync {
    fn pick_tile(&self, safe: bool) -> StageResult<()>;
    fn present_to_camera(&self, safe: bool) -> StageResult<()>;
    fn throw_to_discard(&self, safe: bool) -> StageResult<()>;
    fn return_tile(&self, safe: bool) -> StageResult<()>;
    fn home(&self) -> StageResult<()>;
    fn emergency_stop(&self) -> StageResult<()>;

    /// The cosmetic gesture set, when this arm supports it.
    ///
    /// Resolved once at construction; a `None` here means callers skip
    /// cosmetic gestures entirely.
    fn expressive(&self) -> Option<&dyn ExpressiveGestures> {
        None
    }
}

/// Optional cosmetic gestures (crowd-pleasers, not part of any flow's
/// correctness).
pub trait ExpressiveGestures: Send + Sync {
    fn tap(&self, times: u32) -> StageResult<()>;
    fn nod(&self) -> StageResult<()>;
    fn shake(&self) -> StageResult<()>;
}

/// Produces one encoded still frame, or a typed capture failure.
/// Implementations must not block indefinitely.
pub trait CaptureCapability: Send + Sync {
    fn capture_frame(&self) -> StageResult<Vec<u8>>;
}

/// Blocking speech playback: the call returns only after the line has
/// finished playing, so spoken lines never overlap arm motion or each
/// other.
pub trait SpeechCapability: Send + Sync {
    fn say(&self, line: LineKey, style: SpeechStyle) -> StageResult<()>;
}
