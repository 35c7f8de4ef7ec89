use tokio::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClockTick {
    pub delta_secs: f32,
    pub elapsed_secs: f32,
}

/// Monotonic frame clock. The first tick after construction has a zero delta.
#[derive(Clone, Copy, Debug)]
pub struct PhaseClock {
    started: Instant,
    last: Instant,
}

impl PhaseClock {
    pub fn new(now: Instant) -> Self {
        Self {
            started: now,
            last: now,
        }
    }

    pub fn tick(&mut self, now: Instant) -> ClockTick {
        let delta = now.saturating_duration_since(self.last);
        self.last = now;
        ClockTick {
            delta_secs: delta.as_secs_f32(),
            elapsed_secs: now.saturating_duration_since(self.started).as_secs_f32(),
        }
    }
}
