//! Request types for rebuild worker communication.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Handle for one submitted rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildTicket {
    /// Submission order, starting at 1.
    pub sequence: u64,
    /// Kernel generation reserved for this rebuild.
    pub generation: u64,
}

/// Build settings captured when a rebuild is requested, so later edits
/// cannot leak into an earlier request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RebuildSettings {
    /// Stretch target; `None` keeps the natural length and publishes it.
    pub(crate) target_decay_secs: Option<f64>,
    pub(crate) reverse: bool,
}

/// Command sent to the rebuild worker.
#[derive(Debug, Clone, Copy)]
pub(crate) enum RebuildCommand {
    Rebuild {
        ticket: RebuildTicket,
        settings: RebuildSettings,
    },
    Shutdown,
}

#[derive(Debug, Default)]
struct Counts {
    submitted: u64,
    completed: u64,
}

/// Submitted/completed counters the control context can wait on.
#[derive(Debug, Default)]
pub(crate) struct Progress {
    counts: Mutex<Counts>,
    done: Condvar,
}

impl Progress {
    /// Next sequence number.
    pub(crate) fn submit(&self) -> u64 {
        let mut counts = self.counts.lock();
        counts.submitted += 1;
        counts.submitted
    }

    /// Everything up to and including `sequence` is finished.
    pub(crate) fn complete(&self, sequence: u64) {
        let mut counts = self.counts.lock();
        counts.completed = counts.completed.max(sequence);
        self.done.notify_all();
    }

    pub(crate) fn complete_all(&self) {
        let mut counts = self.counts.lock();
        counts.completed = counts.submitted;
        self.done.notify_all();
    }

    pub(crate) fn is_idle(&self) -> bool {
        let counts = self.counts.lock();
        counts.completed >= counts.submitted
    }

    /// Block until everything submitted so far has completed.
    pub(crate) fn wait(&self) {
        let mut counts = self.counts.lock();
        let target = counts.submitted;
        while counts.completed < target {
            self.done.wait(&mut counts);
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`. Returns
    /// `true` if everything completed.
    pub(crate) fn wait_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut counts = self.counts.lock();
        let target = counts.submitted;
        while counts.completed < target {
            if self.done.wait_until(&mut counts, deadline).timed_out() {
                return counts.completed >= target;
            }
        }
        true
    }
}
