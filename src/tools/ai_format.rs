use std::collections::HashMap;

use crate::config::RunConfig;
use crate::engine::output::SimulationResult;
use crate::engine::status::TimelineRow;

use super::response_types::{
    ActionSummary, CompareOutcome, CompareResponse, DateRange, LoadDataResponse,
    SimulationResponse, StrategiesResponse, StrategyInfo,
};

/// Timeline rows returned inline with a simulation response.
const SAMPLED_ROWS: usize = 50;

fn assess_sharpe(sharpe: f64) -> &'static str {
    if sharpe >= 1.5 {
        "excellent"
    } else if sharpe >= 1.0 {
        "strong"
    } else if sharpe >= 0.5 {
        "moderate"
    } else if sharpe >= 0.0 {
        "weak"
    } else {
        "poor"
    }
}

fn format_pct(fraction: f64) -> String {
    let pct = fraction * 100.0;
    if pct >= 0.0 {
        format!("+{pct:.1}%")
    } else {
        format!("{pct:.1}%")
    }
}

fn sample_timeline(rows: &[TimelineRow], max_points: usize) -> Vec<TimelineRow> {
    if max_points == 0 {
        return vec![];
    }
    if max_points == 1 {
        return rows.last().cloned().into_iter().collect();
    }
    if rows.len() <= max_points {
        return rows.to_vec();
    }
    let step = (rows.len() - 1) as f64 / (max_points - 1) as f64;
    (0..max_points)
        .map(|i| {
            let idx = (i as f64 * step).round() as usize;
            rows[idx.min(rows.len() - 1)].clone()
        })
        .collect()
}

fn summarize_actions(result: &SimulationResult) -> ActionSummary {
    let mut by_kind: HashMap<String, usize> = HashMap::new();
    let mut net_liquidity_change = 0.0;
    for action in &result.actions {
        *by_kind.entry(action.kind.as_str().to_string()).or_default() += 1;
        net_liquidity_change += action.liquidity_change;
    }
    ActionSummary {
        total: result.actions.len(),
        by_kind,
        net_liquidity_change,
    }
}

pub fn format_load_data(
    file_path: String,
    rows: usize,
    snapshots: usize,
    date_range: DateRange,
    columns: Vec<String>,
) -> LoadDataResponse {
    let start = date_range.start.as_deref().unwrap_or("unknown");
    let end = date_range.end.as_deref().unwrap_or("unknown");
    let summary = format!(
        "Loaded {rows} quotes in {snapshots} snapshots from {file_path}, covering {start} to {end}."
    );

    LoadDataResponse {
        summary,
        file_path,
        rows,
        snapshots,
        date_range,
        columns,
        suggested_next_steps: vec![
            "Use price_option to inspect the volatility surface at a given time".to_string(),
            "Use list_strategies to see the available trading strategies".to_string(),
            "Use run_simulation to backtest a strategy over the loaded window".to_string(),
        ],
    }
}

pub fn format_strategies(strategies: Vec<StrategyInfo>) -> StrategiesResponse {
    let total = strategies.len();
    let mut categories: HashMap<String, usize> = HashMap::new();
    for s in &strategies {
        *categories.entry(s.category.clone()).or_default() += 1;
    }

    let cat_parts: Vec<String> = {
        let mut sorted: Vec<_> = categories.iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        sorted
            .iter()
            .map(|(cat, count)| format!("{cat} ({count})"))
            .collect()
    };

    let summary = format!(
        "{} strategies available across {} categories: {}.",
        total,
        categories.len(),
        cat_parts.join(", "),
    );

    StrategiesResponse {
        summary,
        total,
        categories,
        strategies,
        suggested_next_steps: vec![
            "Use run_simulation with a strategy config ({ \"strategy\": name, ... }) to backtest it"
                .to_string(),
            "Use compare_simulations to run several configurations side by side".to_string(),
        ],
    }
}

pub fn format_simulation(result: SimulationResult, config: &RunConfig) -> SimulationResponse {
    let m = result.metrics;
    let b = result.benchmark_metrics;
    let assessment = assess_sharpe(m.sharpe);
    let names: Vec<&str> = config.strategies.iter().map(|s| s.name()).collect();
    let starting_value = result.timeline.first().map_or(0.0, |r| r.total_value);
    let final_value = result.final_value();

    let summary = format!(
        "Simulated {} over {} steps from {} to {}: {} total return, Sharpe {:.2} indicates {} risk-adjusted returns.",
        names.join(" + "),
        result.timeline.len(),
        config.simulation.start,
        config.simulation.end,
        format_pct(m.total_return),
        m.sharpe,
        assessment,
    );

    let mut key_findings = vec![format!(
        "Buy-and-hold benchmark returned {} with Sharpe {:.2}; the strategy {} it",
        format_pct(b.total_return),
        b.sharpe,
        if m.total_return > b.total_return {
            "outperformed"
        } else {
            "underperformed"
        }
    )];
    key_findings.push(format!(
        "Max drawdown of {:.1}% against {:.1}% for the benchmark",
        m.max_drawdown * 100.0,
        b.max_drawdown * 100.0
    ));

    let action_summary = summarize_actions(&result);
    let liquidations = action_summary.by_kind.get("liquidation").copied().unwrap_or(0);
    if liquidations > 0 {
        key_findings.push(format!(
            "{liquidations} short positions were liquidated for lack of collateral"
        ));
    }

    let mut suggested_next_steps = vec![
        "Use compare_simulations to test variations of trade_interval, target or mode".to_string(),
    ];
    if m.max_drawdown > b.max_drawdown {
        suggested_next_steps.push(
            "Drawdown exceeds the benchmark; consider a lower utilization_ratio or further out-of-the-money targets"
                .to_string(),
        );
    }

    SimulationResponse {
        summary,
        assessment: assessment.to_string(),
        key_findings,
        metrics: m,
        benchmark_metrics: b,
        starting_value,
        final_value,
        action_summary,
        sampled_timeline: sample_timeline(&result.timeline, SAMPLED_ROWS),
        actions: result.actions,
        output_files: Vec::new(),
        suggested_next_steps,
    }
}

pub fn format_compare(results: Vec<CompareOutcome>) -> CompareResponse {
    let succeeded: Vec<usize> = (0..results.len())
        .filter(|&i| results[i].metrics.is_some())
        .collect();
    let metric = |i: usize, f: fn(&crate::engine::metrics::PerformanceMetrics) -> f64| {
        results[i].metrics.as_ref().map_or(f64::NEG_INFINITY, f)
    };

    let mut sharpe_indices = succeeded.clone();
    sharpe_indices.sort_by(|&a, &b| metric(b, |m| m.sharpe).total_cmp(&metric(a, |m| m.sharpe)));
    let ranking_by_sharpe: Vec<String> = sharpe_indices
        .iter()
        .map(|&i| results[i].label.clone())
        .collect();

    let mut return_indices = succeeded;
    return_indices.sort_by(|&a, &b| {
        metric(b, |m| m.total_return).total_cmp(&metric(a, |m| m.total_return))
    });
    let ranking_by_return: Vec<String> = return_indices
        .iter()
        .map(|&i| results[i].label.clone())
        .collect();

    let best_overall = ranking_by_sharpe.first().cloned();
    let failed = results.len() - sharpe_indices.len();

    let summary = match (sharpe_indices.first(), return_indices.first()) {
        (Some(&best_sharpe), Some(&best_return)) => format!(
            "Compared {} simulations ({failed} failed). Best by Sharpe: {} ({:.2}). Best by return: {} ({}).",
            results.len(),
            results[best_sharpe].label,
            metric(best_sharpe, |m| m.sharpe),
            results[best_return].label,
            format_pct(metric(best_return, |m| m.total_return)),
        ),
        _ => format!("All {} simulations failed.", results.len()),
    };

    let mut suggested_next_steps = Vec::new();
    if let Some(ref best) = best_overall {
        suggested_next_steps.push(format!(
            "Run run_simulation on {best} for the full timeline and action log",
        ));
    }
    if failed > 0 {
        suggested_next_steps
            .push("Inspect the error field of failed runs and adjust their configuration".to_string());
    }

    CompareResponse {
        summary,
        ranking_by_sharpe,
        ranking_by_return,
        best_overall,
        results,
        suggested_next_steps,
    }
}
