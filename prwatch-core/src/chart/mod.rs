//! Chart rendering.
//!
//! Two outputs come from the same series:
//! - [`ChartData`], the JSON document the dashboard's Chart.js instance loads
//!   (always the full history)
//! - a static PNG or SVG image for the README ([`render_image`]),
//!   downsampled to `chart.max_points` dates
//!
//! Missing days are skipped rather than interpolated, and each agent's line
//! starts on its first day with any PRs.

mod data;
mod image;

pub use data::{ChartData, ChartPoint, Dataset, AGGREGATE_COLOR, AGGREGATE_KEY, AGGREGATE_LABEL};
pub use image::render_image;

use chrono::NaiveDate;

use crate::agents::AgentMeta;
use crate::config::ChartMetric;
use crate::metrics::{self, totals_by_date};
use crate::types::History;

/// One plotted line.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub key: String,
    pub label: String,
    pub color: String,
    pub points: Vec<(NaiveDate, f64)>,
}

/// Build one series per agent (roster order) plus the cross-agent aggregate.
pub fn build_series(history: &History, agents: &[AgentMeta], metric: ChartMetric) -> Vec<Series> {
    let mut out: Vec<Series> = agents
        .iter()
        .map(|meta| {
            let series = history.series(&meta.key);
            let counts: Vec<(NaiveDate, u64, u64)> = series
                .skip_leading_zeros()
                .iter()
                .map(|r| (r.date, r.total, r.merged))
                .collect();
            Series {
                key: meta.key.clone(),
                label: meta.name.clone(),
                color: meta.color.clone(),
                points: metric_points(&counts, metric),
            }
        })
        .collect();

    let totals: Vec<(NaiveDate, u64, u64)> = totals_by_date(history, agents)
        .into_iter()
        .skip_while(|t| t.total == 0)
        .map(|t| (t.date, t.total, t.merged))
        .collect();
    out.push(Series {
        key: AGGREGATE_KEY.to_string(),
        label: AGGREGATE_LABEL.to_string(),
        color: AGGREGATE_COLOR.to_string(),
        points: metric_points(&totals, metric),
    });
    out
}

fn metric_points(counts: &[(NaiveDate, u64, u64)], metric: ChartMetric) -> Vec<(NaiveDate, f64)> {
    match metric {
        ChartMetric::SuccessRate => counts
            .iter()
            .map(|(date, total, merged)| (*date, metrics::rate(*merged, *total)))
            .collect(),
        ChartMetric::Total => counts
            .iter()
            .map(|(date, total, _)| (*date, *total as f64))
            .collect(),
        ChartMetric::DailyNew => counts
            .windows(2)
            .map(|pair| (pair[1].0, pair[1].1 as f64 - pair[0].1 as f64))
            .collect(),
    }
}

/// Every date that appears in at least one series, ascending.
pub fn all_dates(series: &[Series]) -> Vec<NaiveDate> {
    let mut dates: Vec<NaiveDate> = series
        .iter()
        .flat_map(|s| s.points.iter().map(|(d, _)| *d))
        .collect();
    dates.sort_unstable();
    dates.dedup();
    dates
}

/// Pick at most `max` dates spread evenly, keeping the first and last.
///
/// `max == 0` keeps everything.
pub fn downsample(dates: &[NaiveDate], max: usize) -> Vec<NaiveDate> {
    if max == 0 || dates.len() <= max {
        return dates.to_vec();
    }
    if max == 1 {
        return dates.last().copied().into_iter().collect();
    }
    let last = dates.len() - 1;
    let mut picked: Vec<NaiveDate> = (0..max)
        .map(|i| dates[(i * last + (max - 1) / 2) / (max - 1)])
        .collect();
    picked.dedup();
    picked
}
