//! Discharged energy integration

use tokio::time::Instant;
use tracing::warn;

/// Intervals at or above this are treated as a scheduling hiccup
pub const MAX_TICK_INTERVAL_SECS: f64 = 5.0;

const JOULES_PER_KWH: f64 = 3_600_000.0;

/// Rectangle-rule integrator of power over tick intervals, in kWh
#[derive(Debug, Default, Clone)]
pub struct EnergyAccumulator {
    total_kwh: f64,
    last_tick: Option<Instant>,
}

impl EnergyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_kwh(&self) -> f64 {
        self.total_kwh
    }

    /// Zero the total and forget the last tick
    pub fn reset(&mut self) {
        self.total_kwh = 0.0;
        self.last_tick = None;
    }

    /// Re-arm the interval baseline without integrating
    pub fn refresh(&mut self, now: Instant) {
        self.last_tick = Some(now);
    }

    /// Add `power_w` over `dt_s` seconds and return the increment
    ///
    /// Intervals outside `(0, 5)` s contribute nothing. Negative power is
    /// not subtracted, so the total never decreases.
    pub fn integrate(&mut self, power_w: f64, dt_s: f64) -> f64 {
        if !(dt_s > 0.0 && dt_s < MAX_TICK_INTERVAL_SECS) {
            warn!("Anomalous tick interval {dt_s:.3}s, energy not integrated");
            return 0.0;
        }
        if !power_w.is_finite() || power_w < 0.0 {
            warn!("Ignoring power reading {power_w} W for energy");
            return 0.0;
        }
        let delta = power_w * dt_s / JOULES_PER_KWH;
        self.total_kwh += delta;
        delta
    }

    /// Integrate `power_w` over the time since the previous tick
    pub fn record(&mut self, power_w: f64, now: Instant) -> f64 {
        let dt_s = self
            .last_tick
            .map(|last| now.saturating_duration_since(last).as_secs_f64())
            .unwrap_or(0.0);
        self.last_tick = Some(now);
        self.integrate(power_w, dt_s)
    }
}
