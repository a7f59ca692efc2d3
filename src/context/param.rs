use std::sync::{Mutex, PoisonError};

/// A control value that changes at scheduled context times.
#[derive(Debug)]
pub struct AudioParam {
    default_value: f32,
    /// `(time, value)` pairs sorted by time.
    events: Mutex<Vec<(f64, f32)>>,
}

impl AudioParam {
    pub fn new(default_value: f32) -> Self {
        Self {
            default_value,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn default_value(&self) -> f32 {
        self.default_value
    }

    /// Schedules `value` to take effect at `time` (seconds on the context clock).
    pub fn set_value_at_time(&self, value: f32, time: f64) {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let index = events.partition_point(|(at, _)| *at <= time);
        events.insert(index, (time, value));
    }

    /// The value in effect at `time`.
    pub fn value_at(&self, time: f64) -> f32 {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let index = events.partition_point(|(at, _)| *at <= time);

        match index {
            0 => self.default_value,
            i => events[i - 1].1,
        }
    }
}
