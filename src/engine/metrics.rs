use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Risk/return summary of a value series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PerformanceMetrics {
    pub sharpe: f64,
    pub sortino: f64,
    pub cagr: f64,
    /// Largest peak-to-trough loss as a positive fraction
    pub max_drawdown: f64,
    pub calmar: f64,
    pub total_return: f64,
}

/// Compute metrics from a value series sampled every `1 / annual_periods`
/// years. Undefined ratios are reported as zero.
pub fn calculate_metrics(values: &[f64], annual_periods: f64) -> PerformanceMetrics {
    if values.len() < 2 || !(annual_periods.is_finite() && annual_periods > 0.0) {
        return PerformanceMetrics::default();
    }

    let returns = period_returns(values);
    let mean_return = returns.iter().sum::<f64>() / returns.len() as f64;
    let annualization = annual_periods.sqrt();

    let std_return = std_dev(&returns);
    let sharpe = if std_return > 0.0 {
        mean_return / std_return * annualization
    } else {
        0.0
    };

    let downside = downside_deviation(&returns);
    let sortino = if downside > 0.0 {
        mean_return / downside * annualization
    } else {
        0.0
    };

    let first = values[0];
    let last = values[values.len() - 1];
    let total_return = if first > 0.0 { last / first - 1.0 } else { 0.0 };

    let years = (values.len() - 1) as f64 / annual_periods;
    let cagr = if first > 0.0 && last > 0.0 {
        (last / first).powf(1.0 / years) - 1.0
    } else {
        0.0
    };

    let max_drawdown = max_drawdown(values);
    let calmar = if max_drawdown > 0.0 {
        cagr / max_drawdown
    } else {
        0.0
    };

    PerformanceMetrics {
        sharpe,
        sortino,
        cagr: finite_or_zero(cagr),
        max_drawdown,
        calmar: finite_or_zero(calmar),
        total_return,
    }
}

/// Consecutive percentage changes; steps from a non-positive value count as
/// zero.
fn period_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| {
            if w[0] > 0.0 {
                finite_or_zero((w[1] - w[0]) / w[0])
            } else {
                0.0
            }
        })
        .collect()
}

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

fn std_dev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let mean = data.iter().sum::<f64>() / data.len() as f64;
    let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (data.len() - 1) as f64;
    variance.sqrt()
}

/// Root mean square of the negative returns over all periods.
fn downside_deviation(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = returns.iter().filter(|r| **r < 0.0).map(|r| r * r).sum();
    (sum_sq / returns.len() as f64).sqrt()
}

fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd: f64 = 0.0;
    for &v in values {
        peak = peak.max(v);
        if peak > 0.0 {
            max_dd = max_dd.max((peak - v) / peak);
        }
    }
    max_dd
}
