use std::time::{Duration, Instant};

/// Stopwatch used to measure tile fetches and terrain update cycles.
pub struct Timer {
    start_time: Option<Instant>,
    elapsed: Duration,
}

#[allow(dead_code)]
impl Timer {
    pub fn new() -> Timer {
        Timer {
            start_time: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Create a timer that is already running.
    pub fn started() -> Timer {
        let mut timer = Timer::new();
        timer.start();
        timer
    }

    // Start (or restart) the timer from zero
    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
        self.elapsed = Duration::ZERO;
    }

    // Stop the timer, freezing the elapsed time
    pub fn stop(&mut self) {
        if self.start_time.is_some() {
            self.elapsed = self.elapsed_duration();
            self.start_time = None;
        }
    }

    pub fn reset(&mut self) {
        self.start_time = None;
        self.elapsed = Duration::ZERO;
    }

    /// Return the elapsed time and restart the timer.
    pub fn lap(&mut self) -> Duration {
        let elapsed = self.elapsed_duration();
        self.start();
        elapsed
    }

    pub fn is_running(&self) -> bool {
        self.start_time.is_some()
    }

    pub fn elapsed_duration(&self) -> Duration {
        match self.start_time {
            Some(start_time) => start_time.elapsed(),
            None => self.elapsed,
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.elapsed_duration().as_millis()
    }

    pub fn elapsed_micro(&self) -> u128 {
        self.elapsed_duration().as_micros()
    }

    pub fn elapsed_seconds_f32(&self) -> f32 {
        self.elapsed_duration().as_secs_f32()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
