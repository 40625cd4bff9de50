use anyhow::Result;
use garde::Validate;
use rayon::prelude::*;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::warn;

use super::ai_format;
use super::load_data::LoadedQuotes;
use super::response_types::{CompareOutcome, CompareResponse};
use crate::config::RunConfig;

#[derive(Debug, Clone, Deserialize, JsonSchema, Validate)]
pub struct CompareEntry {
    /// Display name; defaults to the strategy names joined with '+'
    #[garde(inner(length(min = 1, max = 100)))]
    pub label: Option<String>,
    #[garde(dive)]
    pub config: RunConfig,
}

impl CompareEntry {
    fn display_label(&self, index: usize) -> String {
        self.label.clone().unwrap_or_else(|| {
            let names: Vec<&str> = self.config.strategies.iter().map(|s| s.name()).collect();
            format!("#{index} {}", names.join("+"))
        })
    }
}

/// Run every entry in parallel. A failing run is reported in its own
/// outcome and does not abort the others.
pub fn execute(loaded: &LoadedQuotes, entries: &[CompareEntry]) -> Result<CompareResponse> {
    let outcomes: Vec<CompareOutcome> = entries
        .par_iter()
        .enumerate()
        .map(|(index, entry)| {
            let label = entry.display_label(index);
            let run = loaded
                .timeline_for(&entry.config.simulation.surface)
                .and_then(|timeline| entry.config.run(&timeline));
            match run {
                Ok(result) => CompareOutcome {
                    label,
                    metrics: Some(result.metrics),
                    final_value: Some(result.final_value()),
                    actions: Some(result.actions.len()),
                    error: None,
                },
                Err(e) => {
                    warn!(label = %label, error = %e, "comparison run failed");
                    CompareOutcome {
                        label,
                        metrics: None,
                        final_value: None,
                        actions: None,
                        error: Some(format!("{e:#}")),
                    }
                }
            }
        })
        .collect();

    Ok(ai_format::format_compare(outcomes))
}
