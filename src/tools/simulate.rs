use anyhow::{Context, Result};
use polars::prelude::*;
use std::path::Path;
use tracing::info;

use super::ai_format;
use super::load_data::LoadedQuotes;
use super::response_types::SimulationResponse;
use crate::config::RunConfig;
use crate::engine::output::SimulationResult;

pub fn execute(
    loaded: &LoadedQuotes,
    config: &RunConfig,
    output_dir: Option<&str>,
) -> Result<SimulationResponse> {
    let timeline = loaded.timeline_for(&config.simulation.surface)?;
    let result = config.run(&timeline)?;

    let output_files = match output_dir {
        Some(dir) => write_frames(&result, Path::new(dir))?,
        None => Vec::new(),
    };

    let mut response = ai_format::format_simulation(result, config);
    response.output_files = output_files;
    Ok(response)
}

/// Write the timeline and the action log as `timeline.parquet` and
/// `actions.parquet` under `dir`.
pub fn write_frames(result: &SimulationResult, dir: &Path) -> Result<Vec<String>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let mut written = Vec::with_capacity(2);
    for (name, frame) in [
        ("timeline.parquet", result.timeline_frame()),
        ("actions.parquet", result.action_frame()),
    ] {
        let mut frame = frame?;
        let path = dir.join(name);
        let file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        ParquetWriter::new(file)
            .finish(&mut frame)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), rows = frame.height(), "wrote simulation output");
        written.push(path.to_string_lossy().to_string());
    }
    Ok(written)
}
