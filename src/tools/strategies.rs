use super::ai_format;
use super::response_types::{StrategiesResponse, StrategyInfo};
use crate::strategies::all_strategies;

pub fn execute() -> StrategiesResponse {
    let strategies = all_strategies()
        .into_iter()
        .map(|s| StrategyInfo {
            name: s.name.to_string(),
            category: s.category.to_string(),
            description: s.description.to_string(),
        })
        .collect();
    ai_format::format_strategies(strategies)
}
