//! Discrete simulation clock

use super::error::{SimError, SimResult};

#[derive(Debug, Clone)]
pub struct Clock {
    tick: u64,
    running: bool,
    /// Simulated time one tick represents, relative to `tick_duration_secs`
    speed_multiplier: f32,
    tick_duration_secs: f32,
    elapsed_secs: f64,
}

impl Clock {
    /// A stopped clock at tick 0
    pub fn new(tick_duration_secs: f32) -> Self {
        Self {
            tick: 0,
            running: false,
            speed_multiplier: 1.0,
            tick_duration_secs,
            elapsed_secs: 0.0,
        }
    }

    /// Count one tick and return its number
    pub fn advance(&mut self) -> u64 {
        self.tick += 1;
        self.elapsed_secs += f64::from(self.tick_duration_secs * self.speed_multiplier);
        self.tick
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn speed_multiplier(&self) -> f32 {
        self.speed_multiplier
    }

    pub fn set_speed_multiplier(&mut self, factor: f32) -> SimResult<()> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(SimError::Configuration(format!(
                "speed multiplier must be a positive number, got {}",
                factor
            )));
        }
        self.speed_multiplier = factor;
        Ok(())
    }

    pub fn tick_duration_secs(&self) -> f32 {
        self.tick_duration_secs
    }

    /// Simulated seconds since the last reset
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs
    }

    /// Back to tick 0, stopped; the speed multiplier is kept
    pub fn reset(&mut self) {
        self.tick = 0;
        self.elapsed_secs = 0.0;
        self.running = false;
    }
}
