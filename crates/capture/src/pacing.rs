use std::time::{Duration, Instant};

/// Holds a capture loop to a fixed frame rate.
pub struct FramePacing {
    interval: Duration,
    next_due: Option<Instant>,
}

impl FramePacing {
    pub fn new(fps: f64) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / fps),
            next_due: None,
        }
    }

    pub fn frame_duration(&self) -> Duration {
        self.interval
    }

    /// Sleep until the next frame is due and return how long that took.
    /// A loop that fell behind is re-anchored on the current time instead of
    /// bursting to catch up.
    pub fn wait(&mut self) -> Duration {
        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);

        let (anchor, slept) = if due > now {
            let remaining = due - now;
            std::thread::sleep(remaining);
            (due, remaining)
        } else {
            (now, Duration::ZERO)
        };

        self.next_due = Some(anchor + self.interval);
        slept
    }
}
