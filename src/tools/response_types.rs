use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::engine::action::SimulationAction;
use crate::engine::metrics::PerformanceMetrics;
use crate::engine::status::TimelineRow;
use crate::engine::types::{OptionType, QuoteSide};
use crate::tools::surface::Lookup;

/// AI-enriched response for `load_data`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LoadDataResponse {
    pub summary: String,
    pub file_path: String,
    pub rows: usize,
    pub snapshots: usize,
    pub date_range: DateRange,
    pub columns: Vec<String>,
    pub suggested_next_steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// AI-enriched response for `list_strategies`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StrategiesResponse {
    pub summary: String,
    pub total: usize,
    pub categories: HashMap<String, usize>,
    pub strategies: Vec<StrategyInfo>,
    pub suggested_next_steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StrategyInfo {
    pub name: String,
    pub category: String,
    pub description: String,
}

/// Response for `price_option`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PriceOptionResponse {
    pub summary: String,
    /// Snapshot the price was read from (latest at or before the request)
    pub snapshot: String,
    pub spot: f64,
    pub option_type: OptionType,
    pub side: QuoteSide,
    pub lookup: Lookup,
    pub target: f64,
    pub days: f64,
    pub strike: f64,
    pub iv: f64,
    /// Premium per unit of underlying
    pub price: f64,
    /// Premium as a fraction of spot
    pub price_ratio: f64,
}

/// AI-enriched response for `run_simulation`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SimulationResponse {
    pub summary: String,
    pub assessment: String,
    pub key_findings: Vec<String>,
    pub metrics: PerformanceMetrics,
    pub benchmark_metrics: PerformanceMetrics,
    pub starting_value: f64,
    pub final_value: f64,
    pub action_summary: ActionSummary,
    /// Evenly sampled timeline rows, first and last always included
    pub sampled_timeline: Vec<TimelineRow>,
    pub actions: Vec<SimulationAction>,
    /// Parquet files written when an output directory was given
    pub output_files: Vec<String>,
    pub suggested_next_steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ActionSummary {
    pub total: usize,
    pub by_kind: HashMap<String, usize>,
    pub net_liquidity_change: f64,
}

/// AI-enriched response for `compare_simulations`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CompareResponse {
    pub summary: String,
    pub ranking_by_sharpe: Vec<String>,
    pub ranking_by_return: Vec<String>,
    pub best_overall: Option<String>,
    pub results: Vec<CompareOutcome>,
    pub suggested_next_steps: Vec<String>,
}

/// One run of a comparison; failed runs carry `error` and no metrics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CompareOutcome {
    pub label: String,
    pub metrics: Option<PerformanceMetrics>,
    pub final_value: Option<f64>,
    pub actions: Option<usize>,
    pub error: Option<String>,
}
