use std::time::Duration;
use tokio::time::Instant;

/// Repeating detection timer. Stopping it is final until the next `start`:
/// a cycle that finishes after `stop` cannot re-arm it.
#[derive(Clone, Copy, Debug, Default)]
pub struct DetectionSchedule {
    active: bool,
    next_due: Option<Instant>,
}

impl DetectionSchedule {
    pub fn start(&mut self, now: Instant) {
        self.active = true;
        self.next_due = Some(now);
    }

    pub fn stop(&mut self) {
        self.active = false;
        self.next_due = None;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Arm the next cycle `cadence` from `now`. Returns false if the schedule was stopped.
    pub fn reschedule(&mut self, now: Instant, cadence: Duration) -> bool {
        if !self.active {
            return false;
        }
        self.next_due = Some(now + cadence);
        true
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// Consume the pending deadline so one cycle runs per arming.
    pub fn take_due(&mut self) -> Option<Instant> {
        self.next_due.take()
    }
}
