//! PID replication controller (§4.6): turns memory pressure into a new
//! adaptive replication factor. Pure and synchronous — the event loop that
//! ticks it lives in `replog-shared`.

use std::collections::VecDeque;

const HISTORY_LEN: usize = 10;

#[derive(Clone, Copy, Debug)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for PidGains {
    /// Not derived from first principles; gains and the 10-sample history
    /// window are tunables an operator can override per deployment.
    fn default() -> Self {
        PidGains { kp: 0.5, ki: 0.1, kd: 0.05 }
    }
}

/// Snapshot fed to the controller once per rebalance tick.
#[derive(Clone, Copy, Debug)]
pub struct PidInputs {
    pub used_memory: f64,
    pub current_factor: f64,
    pub total_participation: f64,
    pub peer_count: usize,
}

pub type ErrorFunction = Box<dyn Fn(&PidInputs, f64, f64) -> f64 + Send + Sync>;

fn default_error_function(inputs: &PidInputs, target_memory_limit: f64, target_occupancy: f64) -> f64 {
    if target_memory_limit <= 0.0 {
        return 0.0;
    }
    inputs.used_memory / target_memory_limit - target_occupancy
}

pub struct PidConfig {
    pub gains: PidGains,
    pub target_memory_limit: f64,
    pub target_occupancy: f64,
    pub error_function: ErrorFunction,
}

impl Default for PidConfig {
    fn default() -> Self {
        PidConfig {
            gains: PidGains::default(),
            target_memory_limit: 256.0 * 1024.0 * 1024.0,
            target_occupancy: 1.0,
            error_function: Box::new(default_error_function),
        }
    }
}

/// Stateful controller: bounded error history plus the last error, used to
/// approximate the integral and derivative terms.
pub struct PidController {
    config: PidConfig,
    history: VecDeque<f64>,
    prev_error: Option<f64>,
}

impl PidController {
    pub fn new(config: PidConfig) -> Self {
        PidController {
            config,
            history: VecDeque::with_capacity(HISTORY_LEN),
            prev_error: None,
        }
    }

    pub fn history(&self) -> &VecDeque<f64> {
        &self.history
    }

    /// Computes the next replication factor from `inputs`, clamped to
    /// `[0, 1]`.
    pub fn tick(&mut self, inputs: PidInputs) -> f64 {
        let error = (self.config.error_function)(&inputs, self.config.target_memory_limit, self.config.target_occupancy);

        self.history.push_back(error);
        if self.history.len() > HISTORY_LEN {
            self.history.pop_front();
        }
        let integral: f64 = self.history.iter().sum();
        let derivative = error - self.prev_error.unwrap_or(error);
        self.prev_error = Some(error);

        let gains = self.config.gains;
        let next = inputs.current_factor - gains.kp * error - gains.ki * integral - gains.kd * derivative;
        let clamped = next.clamp(0.0, 1.0);
        tracing::trace!(error, integral, derivative, next = clamped, "pid tick");
        clamped
    }
}
