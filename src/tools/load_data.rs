use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::borrow::Cow;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::ai_format;
use super::response_types::{DateRange, LoadDataResponse};
use crate::data::parquet::ParquetStore;
use crate::data::QuoteStore;
use crate::engine::timeline::ChainTimeline;
use crate::engine::types::SurfaceConfig;

/// Quote table held by the server between tool calls, with the timeline
/// built from it.
pub struct LoadedQuotes {
    pub file_path: String,
    pub frame: DataFrame,
    pub timeline: ChainTimeline,
    pub surface: SurfaceConfig,
}

impl LoadedQuotes {
    pub fn new(file_path: String, frame: DataFrame, surface: SurfaceConfig) -> Result<Self> {
        let timeline = ChainTimeline::from_dataframe(&frame, surface)?;
        if timeline.is_empty() {
            bail!("{file_path} contains no usable quote snapshots");
        }
        Ok(Self {
            file_path,
            frame,
            timeline,
            surface,
        })
    }

    /// The cached timeline when `surface` matches the one it was built with,
    /// otherwise a fresh one from the same quotes.
    pub fn timeline_for(&self, surface: &SurfaceConfig) -> Result<Cow<'_, ChainTimeline>> {
        if *surface == self.surface {
            Ok(Cow::Borrowed(&self.timeline))
        } else {
            Ok(Cow::Owned(ChainTimeline::from_dataframe(&self.frame, *surface)?))
        }
    }
}

/// Accepts `YYYY-MM-DD` (midnight) or `YYYY-MM-DDTHH:MM:SS`.
pub fn parse_time(text: &str) -> Result<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt);
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .with_context(|| format!("Invalid date or datetime '{text}'"))?;
    Ok(date.and_time(chrono::NaiveTime::MIN))
}

pub async fn execute(
    data: &Arc<RwLock<Option<LoadedQuotes>>>,
    file_path: &str,
    start: Option<&str>,
    end: Option<&str>,
    surface: SurfaceConfig,
) -> Result<LoadDataResponse> {
    let start = start.map(parse_time).transpose()?;
    let end = end.map(parse_time).transpose()?;

    let store = ParquetStore::new(file_path);
    let df = store.load_quotes(start, end)?;
    let rows = df.height();
    let columns: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();

    let loaded = LoadedQuotes::new(file_path.to_string(), df, surface)?;
    let snapshots = loaded.timeline.len();
    let date_range = match loaded.timeline.date_range() {
        Some((first, last)) => DateRange {
            start: Some(first.to_string()),
            end: Some(last.to_string()),
        },
        None => DateRange {
            start: None,
            end: None,
        },
    };
    info!(file_path, rows, snapshots, "loaded quote data");

    let mut guard = data.write().await;
    *guard = Some(loaded);

    Ok(ai_format::format_load_data(
        file_path.to_string(),
        rows,
        snapshots,
        date_range,
        columns,
    ))
}
