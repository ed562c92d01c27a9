//! Scene orchestration.
//!
//! One [`Orchestrator`] owns the whole stage: it serializes flows through
//! the ledger's busy gate, drives the arm/capture/speech collaborators in
//! a fixed order, and converts every outcome (success, collaborator
//! failure, busy rejection) into a [`RunResult`] instead of an error.
//!
//! The busy gate is a [`RunGuard`] held for the duration of the flow, so
//! the flag is released on every exit path. A rejected caller gets a
//! zero-duration busy result and no collaborator is touched.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::capability::{ArmCapability, CaptureCapability, SpeechCapability};
use crate::classifier::Classifier;
use crate::error::{StageError, StageResult};
use crate::model::{
    LineKey, RecognizeResult, RunRequest, RunResult, SceneId, SpeechStyle, StatusSnapshot,
    TileLabel,
};
use crate::status::{RunGuard, StatusLedger};

/// Pause between `present_to_camera` settling and the capture, so the
/// frame is taken after arm vibration has died down.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(800);

/// A cosmetic gesture request, served only by arms that expose the
/// expressive sub-capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expression {
    Tap(u32),
    Nod,
    Shake,
}

pub struct Orchestrator {
    ledger: Arc<StatusLedger>,
    arm: Arc<dyn ArmCapability>,
    capture: Arc<dyn CaptureCapability>,
    speech: Arc<dyn SpeechCapability>,
    classifier: Arc<Mutex<Classifier>>,
    settle_delay: Duration,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        ledger: Arc<StatusLedger>,
        arm: Arc<dyn ArmCapability>,
        capture: Arc<dyn CaptureCapability>,
        speech: Arc<dyn SpeechCapability>,
        classifier: Arc<Mutex<Classifier>>,
    ) -> Self {
        Self {
            ledger,
            arm,
            capture,
            speech,
            classifier,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Override the camera settle delay. Tests use zero.
    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    #[must_use]
    pub fn ledger(&self) -> Arc<StatusLedger> {
        Arc::clone(&self.ledger)
    }

    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        self.ledger.snapshot()
    }

    /// Run one explicitly chosen scene end to end.
    ///
    /// When the request carries a pre-computed classification the flow
    /// skips its own capture step and uses that result as-is.
    pub fn run_scene(&self, request: &RunRequest) -> RunResult {
        let Some(guard) = self.ledger.try_begin_run() else {
            self.ledger.log(format!("scene {} rejected: busy", request.scene));
            return RunResult::busy(Some(request.scene));
        };
        self.ledger.set_last_scene(request.scene);
        let mut recognized = request.recognized;
        let outcome = self.scene_flow(request, &mut recognized);
        self.finish(guard, Some(request.scene), recognized, outcome)
    }

    fn scene_flow(
        &self,
        request: &RunRequest,
        recognized: &mut Option<RecognizeResult>,
    ) -> StageResult<()> {
        self.ledger.log(format!(
            "scene {} start (style={}, safe={})",
            request.scene, request.style, request.safe
        ));
        self.speech.say(LineKey::LookDone, request.style)?;
        self.arm.pick_tile(request.safe)?;
        self.arm.present_to_camera(request.safe)?;
        // Capture immediately; the settle pause belongs to the automatic
        // flow only.
        if recognized.is_none() {
            let frame = self.capture.capture_frame()?;
            *recognized = Some(self.classify(&frame));
        }
        if let Some(result) = *recognized {
            self.ledger.set_recognized(result);
        }
        self.scene_gesture(request.scene, request.safe)?;
        self.speech
            .say(LineKey::closing_for(request.scene), request.style)?;
        Ok(())
    }

    /// First half of the split flow: pick the tile and hold it in front
    /// of the camera, then stop. An external capture path classifies the
    /// frame and calls [`Orchestrator::execute`] with the verdict.
    pub fn prepare(&self, style: SpeechStyle, safe: bool) -> RunResult {
        let Some(guard) = self.ledger.try_begin_run() else {
            self.ledger.log("prepare rejected: busy");
            return RunResult::busy(None);
        };
        // Stale verdicts must not leak into the follow-up execute call.
        self.ledger.clear_recognized();
        let outcome = self.prepare_flow(style, safe);
        self.finish(guard, None, None, outcome)
    }

    fn prepare_flow(&self, style: SpeechStyle, safe: bool) -> StageResult<()> {
        self.ledger.log("prepare: pick and present");
        self.speech.say(LineKey::LookDone, style)?;
        self.arm.pick_tile(safe)?;
        self.arm.present_to_camera(safe)?;
        Ok(())
    }

    /// Second half of the split flow: act on an externally supplied
    /// verdict while the arm is already presenting the tile.
    pub fn execute(
        &self,
        scene: SceneId,
        style: SpeechStyle,
        safe: bool,
        recognized: Option<RecognizeResult>,
    ) -> RunResult {
        let Some(guard) = self.ledger.try_begin_run() else {
            self.ledger.log(format!("execute {scene} rejected: busy"));
            return RunResult::busy(Some(scene));
        };
        self.ledger.set_last_scene(scene);
        if let Some(result) = recognized {
            self.ledger.set_recognized(result);
        }
        let outcome = self.execute_flow(scene, style, safe);
        self.finish(guard, Some(scene), recognized, outcome)
    }

    fn execute_flow(&self, scene: SceneId, style: SpeechStyle, safe: bool) -> StageResult<()> {
        self.ledger.log(format!("execute: scene {scene}"));
        self.scene_gesture(scene, safe)?;
        self.speech.say(LineKey::closing_for(scene), style)?;
        Ok(())
    }

    /// Fully automatic flow: pick, present, capture, classify, route.
    ///
    /// Routing is decided by the recognized label; a degraded fallback
    /// verdict routes like any other result. The routed scene and any
    /// classification obtained are attached to the result even when a
    /// later step fails.
    pub fn run_auto(&self, style: SpeechStyle, safe: bool) -> RunResult {
        let Some(guard) = self.ledger.try_begin_run() else {
            self.ledger.log("auto run rejected: busy");
            return RunResult::busy(None);
        };
        let mut scene = None;
        let mut recognized = None;
        let outcome = self.auto_flow(style, safe, &mut scene, &mut recognized);
        self.finish(guard, scene, recognized, outcome)
    }

    fn auto_flow(
        &self,
        style: SpeechStyle,
        safe: bool,
        scene: &mut Option<SceneId>,
        recognized: &mut Option<RecognizeResult>,
    ) -> StageResult<()> {
        self.ledger.log("auto run start");
        self.speech.say(LineKey::LookDone, style)?;
        self.arm.pick_tile(safe)?;
        self.arm.present_to_camera(safe)?;
        std::thread::sleep(self.settle_delay);
        let frame = self.capture.capture_frame()?;
        let result = self.classify(&frame);
        *recognized = Some(result);
        self.ledger.set_recognized(result);
        let routed = SceneId::route_for(result.label);
        *scene = Some(routed);
        self.ledger.set_last_scene(routed);
        self.ledger.log(format!(
            "auto: {} (conf {:.2}) -> scene {routed}",
            result.label, result.confidence
        ));
        self.scene_gesture(routed, safe)?;
        self.speech.say(LineKey::closing_for(routed), style)?;
        Ok(())
    }

    /// Drop the guard, then fold the outcome into a [`RunResult`].
    ///
    /// Failures keep whatever scene and classification the flow reached,
    /// so pollers see the partial progress alongside the error code.
    fn finish(
        &self,
        guard: RunGuard,
        scene: Option<SceneId>,
        recognized: Option<RecognizeResult>,
        outcome: StageResult<()>,
    ) -> RunResult {
        let duration_ms = guard.elapsed_ms();
        drop(guard);
        match outcome {
            Ok(()) => {
                self.ledger.log(format!("flow complete in {duration_ms} ms"));
                RunResult::success(scene, duration_ms, recognized)
            }
            Err(error) => {
                self.ledger.record_error(error.to_string());
                RunResult::failure(scene, duration_ms, error.kind(), recognized)
            }
        }
    }

    fn scene_gesture(&self, scene: SceneId, safe: bool) -> StageResult<()> {
        match scene {
            SceneId::A => self.arm.throw_to_discard(safe),
            SceneId::B => self.arm.return_tile(safe),
        }
    }

    fn classify(&self, frame: &[u8]) -> RecognizeResult {
        self.classifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .identify(frame)
    }

    /// Calibrate one reference label from encoded image bytes.
    pub fn calibrate(&self, label: TileLabel, image_bytes: &[u8]) -> StageResult<()> {
        self.classifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .calibrate(label, image_bytes)?;
        self.ledger.log(format!("calibrated reference `{label}`"));
        Ok(())
    }

    /// Classify supplied image bytes without driving the arm.
    #[must_use]
    pub fn identify(&self, image_bytes: &[u8]) -> RecognizeResult {
        self.classify(image_bytes)
    }

    /// Capture one frame and classify it, without any arm motion.
    pub fn capture_and_identify(&self) -> StageResult<RecognizeResult> {
        let frame = self.capture.capture_frame()?;
        Ok(self.classify(&frame))
    }

    #[must_use]
    pub fn reference_status(&self) -> std::collections::BTreeMap<TileLabel, bool> {
        self.classifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status()
    }

    /// Move the arm to its home pose. Busy-gated like the flows.
    pub fn home(&self) -> StageResult<()> {
        let Some(_guard) = self.ledger.try_begin_run() else {
            return Err(StageError::Busy);
        };
        self.ledger.log("homing arm");
        self.arm.home()
    }

    /// Hard stop. Deliberately not gated on the busy flag: an operator
    /// must be able to halt the arm mid-flow.
    pub fn emergency_stop(&self) -> StageResult<()> {
        self.ledger.log("ESTOP requested");
        self.arm.emergency_stop()
    }

    /// Play a cosmetic gesture on arms that support them.
    pub fn express(&self, expression: Expression) -> StageResult<()> {
        let Some(_guard) = self.ledger.try_begin_run() else {
            return Err(StageError::Busy);
        };
        let gestures = self.arm.expressive().ok_or_else(|| {
            StageError::InvalidRequest("this arm has no expressive gestures".to_owned())
        })?;
        match expression {
            Expression::Tap(times) => gestures.tap(times),
            Expression::Nod => gestures.nod(),
            Expression::Shake => gestures.shake(),
        }
    }
}
