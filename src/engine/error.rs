use chrono::NaiveDateTime;
use thiserror::Error;

/// Failures raised by the volatility surface and its numerical routines.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SurfaceError {
    #[error("quote snapshot at {0} is empty")]
    EmptySnapshot(NaiveDateTime),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("target {target} is outside the attainable range ({reason})")]
    InvalidTarget { target: f64, reason: String },

    #[error("implied volatility inversion failed: {0}")]
    Inversion(String),

    #[error("{what} solver did not converge for target {target} after {iterations} iterations")]
    NonConvergence {
        what: &'static str,
        target: f64,
        iterations: usize,
    },
}

impl SurfaceError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn inversion(msg: impl Into<String>) -> Self {
        Self::Inversion(msg.into())
    }

    pub fn invalid_target(target: f64, reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            target,
            reason: reason.into(),
        }
    }
}

/// Failures a strategy can hand back to the engine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StrategyError {
    #[error(transparent)]
    Surface(#[from] SurfaceError),

    #[error("{0}")]
    InvalidState(String),
}

/// Fatal run errors. Every variant raised inside the loop names the step.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SimulationError {
    #[error("at least one strategy is required")]
    NoStrategies,

    #[error("timing signal references strategy {index} but only {available} are configured")]
    InvalidTimingSignal { index: usize, available: usize },

    #[error("invalid simulation window: {0}")]
    InvalidWindow(String),

    #[error("step {step} ({time}): no quote data at or before this time")]
    NoMarketData { step: usize, time: NaiveDateTime },

    #[error("step {step} ({time}): strategy '{strategy}' failed: {source}")]
    Strategy {
        step: usize,
        time: NaiveDateTime,
        strategy: String,
        #[source]
        source: StrategyError,
    },

    #[error("step {step} ({time}): invalid position: {reason}")]
    InvalidPosition {
        step: usize,
        time: NaiveDateTime,
        reason: String,
    },
}
