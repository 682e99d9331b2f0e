//! Core domain types for prwatch
//!
//! - [`AgentRecord`]: one row of the persisted table
//! - [`History`]: the whole table, unique per (date, agent)
//! - [`HistorySeries`]: one agent's records ordered by date

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{Error, Result};

// ============================================
// AgentRecord
// ============================================

/// PR counts for one agent on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentRecord {
    pub date: NaiveDate,
    pub agent: String,
    pub total: u64,
    pub merged: u64,
}

impl AgentRecord {
    /// Build a record, rejecting `merged > total`.
    pub fn new(date: NaiveDate, agent: impl Into<String>, total: u64, merged: u64) -> Result<Self> {
        let agent = agent.into();
        if merged > total {
            return Err(Error::InvalidRecord(format!(
                "{agent} on {date}: merged ({merged}) exceeds total ({total})"
            )));
        }
        Ok(Self {
            date,
            agent,
            total,
            merged,
        })
    }
}

/// Raw counts returned by the search API for one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AgentCounts {
    pub total: u64,
    pub merged: u64,
}

impl AgentCounts {
    /// Clamp `merged` to `total`.
    ///
    /// The two queries run a moment apart and can disagree by a few PRs.
    pub fn clamped(self) -> Self {
        Self {
            total: self.total,
            merged: self.merged.min(self.total),
        }
    }
}

// ============================================
// History
// ============================================

/// The complete persisted table, keyed by (date, agent).
///
/// Iteration order is (date, agent) ascending. Display order is never
/// derived from this type; renderers walk the configured roster instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    rows: BTreeMap<(NaiveDate, String), AgentCounts>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any existing row for the same (date, agent).
    ///
    /// Returns the replaced counts, if any.
    pub fn upsert(&mut self, record: AgentRecord) -> Option<AgentCounts> {
        self.rows.insert(
            (record.date, record.agent),
            AgentCounts {
                total: record.total,
                merged: record.merged,
            },
        )
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look up a single row.
    pub fn get(&self, date: NaiveDate, agent: &str) -> Option<AgentRecord> {
        self.rows
            .get(&(date, agent.to_string()))
            .map(|counts| to_record(date, agent, counts))
    }

    /// All records in (date, agent) order.
    pub fn records(&self) -> impl Iterator<Item = AgentRecord> + '_ {
        self.rows
            .iter()
            .map(|((date, agent), counts)| to_record(*date, agent, counts))
    }

    /// Every distinct date present in the table, ascending.
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows
            .keys()
            .map(|(date, _)| *date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Most recent date in the table.
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.rows.keys().next_back().map(|(date, _)| *date)
    }

    /// One agent's records ordered by date.
    pub fn series(&self, agent: &str) -> HistorySeries {
        let points = self
            .rows
            .iter()
            .filter(|((_, key), _)| key == agent)
            .map(|((date, key), counts)| to_record(*date, key, counts))
            .collect();
        HistorySeries {
            agent: agent.to_string(),
            points,
        }
    }

    /// Most recent record for an agent.
    pub fn latest(&self, agent: &str) -> Option<AgentRecord> {
        self.rows
            .iter()
            .rev()
            .find(|((_, key), _)| key == agent)
            .map(|((date, key), counts)| to_record(*date, key, counts))
    }
}

fn to_record(date: NaiveDate, agent: &str, counts: &AgentCounts) -> AgentRecord {
    AgentRecord {
        date,
        agent: agent.to_string(),
        total: counts.total,
        merged: counts.merged,
    }
}

/// One agent's history, ordered by date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistorySeries {
    pub agent: String,
    pub points: Vec<AgentRecord>,
}

impl HistorySeries {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points from the first day the agent had any PRs onward.
    pub fn skip_leading_zeros(&self) -> &[AgentRecord] {
        let first = self
            .points
            .iter()
            .position(|p| p.total > 0)
            .unwrap_or(self.points.len());
        &self.points[first..]
    }
}
