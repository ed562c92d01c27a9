//! Process-wide status ledger.
//!
//! One explicitly-owned instance is shared (via `Arc`) between the
//! orchestrator, which writes, and any number of external pollers, which
//! read snapshots. A single mutex guards all mutable state so that the
//! busy check-and-set and the one-shot flag read-and-clear are atomic.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crate::model::{RecognizeResult, SceneId, StatusSnapshot};

/// Fixed capacity of the ledger's in-memory log.
pub const LOG_CAPACITY: usize = 200;

/// Ring buffer of status lines with silent oldest-first eviction.
#[derive(Debug)]
pub struct BoundedLog {
    entries: VecDeque<String>,
    capacity: usize,
}

impl BoundedLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: String) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }
}

#[derive(Debug)]
struct LedgerState {
    busy: bool,
    last_scene: Option<SceneId>,
    last_error: Option<String>,
    last_recognized: Option<RecognizeResult>,
    trigger_pending: bool,
    capture_pending: bool,
    log: BoundedLog,
}

impl LedgerState {
    fn new() -> Self {
        Self {
            busy: false,
            last_scene: None,
            last_error: None,
            last_recognized: None,
            trigger_pending: false,
            capture_pending: false,
            log: BoundedLog::new(LOG_CAPACITY),
        }
    }
}

/// Shared mutable status: busy gate, last result, one-shot flags, log.
#[derive(Debug)]
pub struct StatusLedger {
    state: Mutex<LedgerState>,
}

impl Default for StatusLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState::new()),
        }
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        // A poisoned ledger still holds consistent data; keep serving it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Busy check-and-set in one critical section.
    ///
    /// Returns `None` while another run is in flight. On success the
    /// returned [`RunGuard`] is the exit barrier: dropping it (on any path
    /// out of the flow) clears the busy flag.
    #[must_use]
    pub fn try_begin_run(self: &Arc<Self>) -> Option<RunGuard> {
        let mut state = self.locked();
        if state.busy {
            return None;
        }
        state.busy = true;
        state.last_error = None;
        drop(state);
        Some(RunGuard {
            ledger: Arc::clone(self),
            started: Instant::now(),
        })
    }

    pub fn set_last_scene(&self, scene: SceneId) {
        self.locked().last_scene = Some(scene);
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.locked().busy
    }

    /// Append a status line and mirror it to the tracing subscriber.
    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(target: "tilestage::ledger", "{message}");
        let stamped = format!("{} {message}", chrono::Utc::now().format("%H:%M:%S%.3f"));
        self.locked().log.push(stamped);
    }

    pub fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.log(format!("error {message}"));
        self.locked().last_error = Some(message);
    }

    pub fn set_recognized(&self, result: RecognizeResult) {
        self.locked().last_recognized = Some(result);
    }

    /// Drop any stale classification so callers cannot act on outdated data.
    pub fn clear_recognized(&self) {
        self.locked().last_recognized = None;
    }

    #[must_use]
    pub fn last_recognized(&self) -> Option<RecognizeResult> {
        self.locked().last_recognized
    }

    pub fn set_trigger_pending(&self) {
        self.locked().trigger_pending = true;
    }

    pub fn set_capture_pending(&self) {
        self.locked().capture_pending = true;
    }

    /// Read-and-clear the external trigger flag in one lock acquisition.
    #[must_use]
    pub fn take_trigger_pending(&self) -> bool {
        std::mem::take(&mut self.locked().trigger_pending)
    }

    /// Read-and-clear the capture request flag in one lock acquisition.
    #[must_use]
    pub fn take_capture_pending(&self) -> bool {
        std::mem::take(&mut self.locked().capture_pending)
    }

    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        let state = self.locked();
        StatusSnapshot {
            busy: state.busy,
            last_scene: state.last_scene,
            last_error: state.last_error.clone(),
            recognized: state.last_recognized,
            logs: state.log.to_vec(),
        }
    }
}

/// RAII exit barrier for one accepted run.
///
/// Holds the busy flag for its lifetime; `Drop` releases it on every exit
/// path, success or failure. Elapsed time is measured from the moment the
/// gate was acquired.
#[derive(Debug)]
pub struct RunGuard {
    ledger: Arc<StatusLedger>,
    started: Instant,
}

impl RunGuard {
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.ledger.locked().busy = false;
    }
}
