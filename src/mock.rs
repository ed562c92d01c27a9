//! In-process mock collaborators.
//!
//! Used by the demo binary when no hardware is attached, and by the test
//! suite to script failures at arbitrary steps. Every mock records its
//! calls so tests can assert on exact collaborator traffic.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::capability::{ArmCapability, CaptureCapability, ExpressiveGestures, SpeechCapability};
use crate::error::{StageError, StageResult};
use crate::model::{LineKey, SpeechStyle};

/// How a scripted mock failure should present itself.
#[derive(Debug, Clone)]
pub enum FailureMode {
    /// A generic arm error with a message.
    ArmError(String),
    /// A collaborator timeout.
    Timeout,
}

impl FailureMode {
    fn into_error(self, operation: &str) -> StageError {
        match self {
            Self::ArmError(message) => StageError::arm(operation, message),
            Self::Timeout => StageError::timeout(operation, ""),
        }
    }
}

/// Gesture durations for a demo-realistic mock run. Zero by default so
/// tests stay fast.
#[derive(Debug, Clone, Copy, Default)]
pub struct GestureDelays {
    pub pick: Duration,
    pub present: Duration,
    pub throw: Duration,
    pub return_tile: Duration,
}

impl GestureDelays {
    /// Rough timings of the real arm, for the CLI demo.
    #[must_use]
    pub fn demo() -> Self {
        Self {
            pick: Duration::from_millis(500),
            present: Duration::from_millis(1000),
            throw: Duration::from_millis(2000),
            return_tile: Duration::from_millis(2000),
        }
    }
}

/// Recording arm mock with optional scripted failure injection.
#[derive(Debug, Default)]
pub struct MockArm {
    delays: GestureDelays,
    expressive_enabled: bool,
    calls: Mutex<Vec<String>>,
    fail_on: Mutex<Option<(String, FailureMode)>>,
}

impl MockArm {
    #[must_use]
    pub fn new() -> Self {
        Self {
            expressive_enabled: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_delays(mut self, delays: GestureDelays) -> Self {
        self.delays = delays;
        self
    }

    /// An arm without the cosmetic gesture set, for exercising the
    /// capability-absent path.
    #[must_use]
    pub fn without_expressive(mut self) -> Self {
        self.expressive_enabled = false;
        self
    }

    /// Script the next matching gesture to fail with the given mode.
    pub fn fail_on(&self, gesture: &str, mode: FailureMode) {
        *self.lock_fail() = Some((gesture.to_owned(), mode));
    }

    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock_calls().clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.lock_calls().len()
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_fail(&self) -> std::sync::MutexGuard<'_, Option<(String, FailureMode)>> {
        self.fail_on.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gesture(&self, name: &str, delay: Duration) -> StageResult<()> {
        self.lock_calls().push(name.to_owned());
        let scripted = {
            let mut slot = self.lock_fail();
            match slot.as_ref() {
                Some((target, _)) if target == name => slot.take(),
                _ => None,
            }
        };
        if let Some((_, mode)) = scripted {
            return Err(mode.into_error(name));
        }
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        Ok(())
    }
}

impl ArmCapability for MockArm {
    fn pick_tile(&self, _safe: bool) -> StageResult<()> {
        self.gesture("pick_tile", self.delays.pick)
    }

    fn present_to_camera(&self, _safe: bool) -> StageResult<()> {
        self.gesture("present_to_camera", self.delays.present)
    }

    fn throw_to_discard(&self, _safe: bool) -> StageResult<()> {
        self.gesture("throw_to_discard", self.delays.throw)
    }

    fn return_tile(&self, _safe: bool) -> StageResult<()> {
        self.gesture("return_tile", self.delays.return_tile)
    }

    fn home(&self) -> StageResult<()> {
        self.gesture("home", Duration::ZERO)
    }

    fn emergency_stop(&self) -> StageResult<()> {
        self.gesture("emergency_stop", Duration::ZERO)
    }

    fn expressive(&self) -> Option<&dyn ExpressiveGestures> {
        if self.expressive_enabled {
            Some(self)
        } else {
            None
        }
    }
}

impl ExpressiveGestures for MockArm {
    fn tap(&self, times: u32) -> StageResult<()> {
        self.gesture(&format!("tap_x{times}"), Duration::ZERO)
    }

    fn nod(&self) -> StageResult<()> {
        self.gesture("nod", Duration::ZERO)
    }

    fn shake(&self) -> StageResult<()> {
        self.gesture("shake", Duration::ZERO)
    }
}

/// Capture mock fed from a queue of fixture frames.
///
/// When the queue is exhausted it keeps serving the last frame, so a
/// single fixture can drive any number of runs. An empty mock fails with
/// `CaptureFailed`.
#[derive(Debug, Default)]
pub struct FixtureCapture {
    frames: Mutex<VecDeque<Vec<u8>>>,
    last: Mutex<Option<Vec<u8>>>,
    captures: Mutex<usize>,
}

impl FixtureCapture {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_frame(frame: Vec<u8>) -> Self {
        let capture = Self::default();
        capture.push_frame(frame);
        capture
    }

    pub fn push_frame(&self, frame: Vec<u8>) {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(frame);
    }

    #[must_use]
    pub fn capture_count(&self) -> usize {
        *self.captures.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CaptureCapability for FixtureCapture {
    fn capture_frame(&self) -> StageResult<Vec<u8>> {
        *self.captures.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        let next = self
            .frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(frame) = next {
            *last = Some(frame.clone());
            return Ok(frame);
        }
        last.clone()
            .ok_or_else(|| StageError::CaptureFailed("no fixture frame loaded".to_owned()))
    }
}

/// Speech mock that records spoken lines instead of playing audio.
#[derive(Debug, Default)]
pub struct RecordingSpeech {
    spoken: Mutex<Vec<(LineKey, SpeechStyle)>>,
    fail_next: Mutex<Option<FailureMode>>,
}

impl RecordingSpeech {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, mode: FailureMode) {
        *self.fail_next.lock().unwrap_or_else(PoisonError::into_inner) = Some(mode);
    }

    #[must_use]
    pub fn spoken(&self) -> Vec<(LineKey, SpeechStyle)> {
        self.spoken
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.spoken
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl SpeechCapability for RecordingSpeech {
    fn say(&self, line: LineKey, style: SpeechStyle) -> StageResult<()> {
        self.spoken
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((line, style));
        if let Some(mode) = self
            .fail_next
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            return Err(mode.into_error(&format!("say {line}")));
        }
        Ok(())
    }
}
