//! Periodic liveness indicator on one designated LED.
//!
//! A two-state toggle driven by the engine's ticker: `PulseOn` renders the
//! configured indicator color at the heartbeat LED, `PulseOff` falls back to
//! whatever entity aggregation says for that index. Disabled entirely when
//! configuration uses the negative-index sentinel.

use std::time::Duration;

use crate::color::Color;

#[derive(Debug, thiserror::Error)]
#[error("invalid heartbeat period: {millis}ms (must be positive)")]
pub struct InvalidHeartbeatPeriod {
    pub millis: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatPhase {
    PulseOn,
    PulseOff,
}

#[derive(Debug)]
pub struct Heartbeat {
    led: usize,
    period: Duration,
    color: Color,
    phase: HeartbeatPhase,
}

impl Heartbeat {
    /// Create a heartbeat on `led`, starting in `PulseOff`.
    pub fn new(led: usize, period_ms: i64, color: Color) -> Result<Self, InvalidHeartbeatPeriod> {
        if period_ms <= 0 {
            return Err(InvalidHeartbeatPeriod { millis: period_ms });
        }

        Ok(Self {
            led,
            period: Duration::from_millis(period_ms as u64),
            color,
            phase: HeartbeatPhase::PulseOff,
        })
    }

    pub fn led(&self) -> usize {
        self.led
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn phase(&self) -> HeartbeatPhase {
        self.phase
    }

    /// Flip the phase and return the new one.
    pub fn tick(&mut self) -> HeartbeatPhase {
        self.phase = match self.phase {
            HeartbeatPhase::PulseOn => HeartbeatPhase::PulseOff,
            HeartbeatPhase::PulseOff => HeartbeatPhase::PulseOn,
        };
        self.phase
    }
}
