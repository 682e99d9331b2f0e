//! Derived metrics: merge rates, cross-agent sums, deltas, and the
//! dashboard snapshot.
//!
//! Everything here is a pure function of the [`History`] and the roster.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::agents::AgentMeta;
use crate::types::{History, HistorySeries};

/// Merge rate in percent, rounded to two decimals. Zero when `total` is zero.
///
/// This is the stored and serialized value. Displays round [`exact_rate`]
/// instead, so the figure is rounded only once.
pub fn rate(merged: u64, total: u64) -> f64 {
    round_to(exact_rate(merged, total), 2)
}

/// Unrounded merge rate in percent. Zero when `total` is zero.
pub fn exact_rate(merged: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    100.0 * merged as f64 / total as f64
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Sum of counts across agents for one date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DateTotals {
    pub date: NaiveDate,
    pub total: u64,
    pub merged: u64,
}

impl DateTotals {
    pub fn rate(&self) -> f64 {
        rate(self.merged, self.total)
    }
}

/// Sum totals and merged counts across the roster for every date in the table.
///
/// Agents without a row on a given date contribute nothing to it.
pub fn totals_by_date(history: &History, agents: &[AgentMeta]) -> Vec<DateTotals> {
    history
        .dates()
        .into_iter()
        .map(|date| {
            let mut totals = DateTotals {
                date,
                total: 0,
                merged: 0,
            };
            for agent in agents {
                if let Some(record) = history.get(date, &agent.key) {
                    totals.total += record.total;
                    totals.merged += record.merged;
                }
            }
            totals
        })
        .collect()
}

/// Day-over-day change in total PRs between consecutive points.
///
/// The first point has no predecessor and is omitted.
pub fn daily_deltas(series: &HistorySeries) -> Vec<(NaiveDate, i64)> {
    series
        .points
        .windows(2)
        .map(|pair| (pair[1].date, pair[1].total as i64 - pair[0].total as i64))
        .collect()
}

// ============================================
// Dashboard snapshot
// ============================================

/// Latest metrics for one agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSnapshot {
    pub key: String,
    pub total: u64,
    pub merged: u64,
    pub rate: f64,
    /// Date of the record the values came from; `None` if never fetched
    pub as_of: Option<NaiveDate>,
    /// True when this run did not refresh the agent
    pub stale: bool,
}

/// Metrics for every configured agent, in roster order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub agents: Vec<AgentSnapshot>,
    /// Latest date present in the table
    pub as_of: Option<NaiveDate>,
}

impl DashboardSnapshot {
    /// Build the snapshot from the latest record per agent.
    ///
    /// Agents missing from `refreshed` are flagged stale.
    pub fn build(history: &History, agents: &[AgentMeta], refreshed: &HashSet<String>) -> Self {
        let agents = agents
            .iter()
            .map(|meta| {
                let latest = history.latest(&meta.key);
                let (total, merged, as_of) = match &latest {
                    Some(record) => (record.total, record.merged, Some(record.date)),
                    None => (0, 0, None),
                };
                AgentSnapshot {
                    key: meta.key.clone(),
                    total,
                    merged,
                    rate: rate(merged, total),
                    as_of,
                    stale: !refreshed.contains(&meta.key),
                }
            })
            .collect();

        Self {
            agents,
            as_of: history.latest_date(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&AgentSnapshot> {
        self.agents.iter().find(|a| a.key == key)
    }

    pub fn overall_total(&self) -> u64 {
        self.agents.iter().map(|a| a.total).sum()
    }

    pub fn overall_merged(&self) -> u64 {
        self.agents.iter().map(|a| a.merged).sum()
    }

    pub fn overall_rate(&self) -> f64 {
        rate(self.overall_merged(), self.overall_total())
    }

    /// Keys of agents whose values were carried over from an earlier run.
    pub fn stale_keys(&self) -> Vec<&str> {
        self.agents
            .iter()
            .filter(|a| a.stale)
            .map(|a| a.key.as_str())
            .collect()
    }
}
