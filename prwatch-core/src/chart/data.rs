//! JSON chart document consumed by the dashboard.

use serde::Serialize;

use crate::agents::AgentMeta;
use crate::config::ChartMetric;
use crate::error::Result;
use crate::types::History;

use super::{all_dates, build_series, Series};

pub const AGGREGATE_KEY: &str = "all";
pub const AGGREGATE_LABEL: &str = "All agents";
pub const AGGREGATE_COLOR: &str = "#555555";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    /// `YYYY-MM-DD`
    pub x: String,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub key: String,
    pub label: String,
    pub color: String,
    pub data: Vec<ChartPoint>,
}

impl From<&Series> for Dataset {
    fn from(series: &Series) -> Self {
        Self {
            key: series.key.clone(),
            label: series.label.clone(),
            color: series.color.clone(),
            data: series
                .points
                .iter()
                .map(|(date, y)| ChartPoint {
                    x: date.format("%Y-%m-%d").to_string(),
                    y: *y,
                })
                .collect(),
        }
    }
}

/// The whole chart document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub metric: &'static str,
    pub axis_label: &'static str,
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

impl ChartData {
    /// Build the document from the full history.
    pub fn build(history: &History, agents: &[AgentMeta], metric: ChartMetric) -> Self {
        let series = build_series(history, agents, metric);
        let labels = all_dates(&series)
            .into_iter()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .collect();

        Self {
            metric: metric.as_str(),
            axis_label: metric.axis_label(),
            labels,
            datasets: series.iter().map(Dataset::from).collect(),
        }
    }

    /// Pretty-printed JSON with a trailing newline.
    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }
}
