use polars::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::action::SimulationAction;
use super::metrics::{calculate_metrics, PerformanceMetrics};
use super::status::TimelineRow;

/// Timeline, action log and summary statistics of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SimulationResult {
    pub timeline: Vec<TimelineRow>,
    pub actions: Vec<SimulationAction>,
    pub metrics: PerformanceMetrics,
    /// Same statistics for holding the underlying from the first step
    pub benchmark_metrics: PerformanceMetrics,
}

impl SimulationResult {
    pub fn new(timeline: Vec<TimelineRow>, actions: Vec<SimulationAction>, annual_periods: f64) -> Self {
        let nav: Vec<f64> = timeline.iter().map(|r| r.total_value).collect();
        let metrics = calculate_metrics(&nav, annual_periods);
        let benchmark_metrics = calculate_metrics(&buy_and_hold(&timeline), annual_periods);
        Self {
            timeline,
            actions,
            metrics,
            benchmark_metrics,
        }
    }

    pub fn final_value(&self) -> f64 {
        self.timeline.last().map_or(0.0, |r| r.total_value)
    }

    /// Value of converting the starting value into the underlying and holding it.
    pub fn benchmark_values(&self) -> Vec<f64> {
        buy_and_hold(&self.timeline)
    }

    pub fn timeline_frame(&self) -> PolarsResult<DataFrame> {
        let rows = &self.timeline;
        let f = |get: fn(&TimelineRow) -> f64| rows.iter().map(get).collect::<Vec<f64>>();
        let count = |get: fn(&TimelineRow) -> usize| {
            rows.iter().map(|r| get(r) as u32).collect::<Vec<u32>>()
        };
        df! {
            "timestamp" => rows.iter().map(|r| r.timestamp).collect::<Vec<_>>(),
            "spot" => f(|r| r.spot),
            "primary" => f(|r| r.primary),
            "secondary" => f(|r| r.secondary),
            "liquidity" => f(|r| r.liquidity),
            "num_long_positions" => count(|r| r.num_long_positions),
            "num_short_positions" => count(|r| r.num_short_positions),
            "size_long_positions" => f(|r| r.size_long_positions),
            "size_short_positions" => f(|r| r.size_short_positions),
            "collateral_primary" => f(|r| r.collateral_primary),
            "collateral_secondary" => f(|r| r.collateral_secondary),
            "total_collaterals" => f(|r| r.total_collaterals),
            "positions_delta" => f(|r| r.positions_delta),
            "total_delta" => f(|r| r.total_delta),
            "positions_value" => f(|r| r.positions_value),
            "total_value" => f(|r| r.total_value),
        }
    }

    pub fn action_frame(&self) -> PolarsResult<DataFrame> {
        let actions = &self.actions;
        let f = |get: fn(&SimulationAction) -> f64| actions.iter().map(get).collect::<Vec<f64>>();
        df! {
            "timestamp" => actions.iter().map(|a| a.timestamp).collect::<Vec<_>>(),
            "step" => actions.iter().map(|a| a.step as u32).collect::<Vec<_>>(),
            "spot" => f(|a| a.spot),
            "type" => actions.iter().map(|a| a.kind.as_str()).collect::<Vec<_>>(),
            "position_type" => actions.iter().map(|a| a.position.option_type.as_str()).collect::<Vec<_>>(),
            "position_strike" => f(|a| a.position.strike),
            "position_maturity" => actions.iter().map(|a| a.position.maturity).collect::<Vec<_>>(),
            "position_size" => f(|a| a.position.size),
            "position_collateral_primary" => f(|a| a.position.collateral_primary),
            "position_collateral_secondary" => f(|a| a.position.collateral_secondary),
            "position_iv_start" => f(|a| a.position.iv_start),
            "position_price_start" => f(|a| a.position.price_start),
            "liquidity_change" => f(|a| a.liquidity_change),
        }
    }
}

fn buy_and_hold(timeline: &[TimelineRow]) -> Vec<f64> {
    let Some(first) = timeline.first() else {
        return Vec::new();
    };
    if first.spot <= 0.0 {
        return vec![first.total_value; timeline.len()];
    }
    let units = first.total_value / first.spot;
    timeline.iter().map(|r| r.spot * units).collect()
}
