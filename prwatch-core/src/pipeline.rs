//! The daily run: fetch, store, render, publish.
//!
//! ```text
//! Fetch -> Merge into store -> Compute metrics -> Render chart
//!       -> Render report -> Commit staged artifacts -> Publisher
//! ```
//!
//! A fetch failure only affects its agent: the run continues and the
//! agent's previous values stay on the dashboard. Any other failure aborts
//! the run, and since artifacts are staged until every render succeeds, the
//! previously published pages stay as they were.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use uuid::Uuid;

use crate::agents::AgentMeta;
use crate::artifact::ArtifactSet;
use crate::chart::{render_image, ChartData};
use crate::config::Config;
use crate::error::Result;
use crate::metrics::DashboardSnapshot;
use crate::publish::{PublishOutcome, Publisher};
use crate::report::{
    link_path, load_template, render_index, render_readme, ReportContext, DEFAULT_INDEX_TEMPLATE,
    DEFAULT_README_TEMPLATE,
};
use crate::search::PrCounter;
use crate::store::DataStore;
use crate::types::{AgentRecord, History};

/// An agent whose fetch failed this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub agent: String,
    pub message: String,
}

/// Result of the fetch and store steps.
#[derive(Debug)]
pub struct CollectReport {
    pub date: NaiveDate,
    /// Full table after the merge
    pub history: History,
    /// Agents refreshed this run, in roster order
    pub fetched: Vec<String>,
    pub failed: Vec<FetchFailure>,
}

/// Result of the render step.
#[derive(Debug)]
pub struct RenderReport {
    pub snapshot: DashboardSnapshot,
    /// Artifacts whose content changed
    pub changed: Vec<PathBuf>,
}

/// Result of a full run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub date: NaiveDate,
    pub fetched: Vec<String>,
    pub failed: Vec<FetchFailure>,
    pub snapshot: DashboardSnapshot,
    /// Data table and artifacts handed to the publisher
    pub changed: Vec<PathBuf>,
    pub publish: PublishOutcome,
}

impl RunReport {
    /// True when at least one agent kept stale values.
    pub fn is_degraded(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Drives one run against a configuration.
///
/// Output paths are used as given; callers rebase them onto the working
/// directory first (see [`crate::config::OutputConfig::rebased`]).
pub struct Pipeline<'a> {
    config: &'a Config,
    agents: Vec<AgentMeta>,
    store: DataStore,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            agents: config.agents(),
            store: DataStore::new(&config.output.data_file),
        }
    }

    pub fn agents(&self) -> &[AgentMeta] {
        &self.agents
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    /// Fetch every agent and merge the counts into the store.
    ///
    /// The table is loaded before any request so a malformed file fails the
    /// run without touching the network.
    pub fn collect(&self, counter: &dyn PrCounter, date: NaiveDate) -> Result<CollectReport> {
        let history = self.store.load()?;
        tracing::debug!(rows = history.len(), "Loaded data table");

        let mut records = Vec::with_capacity(self.agents.len());
        let mut fetched = Vec::new();
        let mut failed = Vec::new();

        for agent in &self.agents {
            match counter.fetch(agent) {
                Ok(counts) => {
                    let clamped = counts.clamped();
                    if clamped != counts {
                        tracing::warn!(
                            agent = %agent.key,
                            total = counts.total,
                            merged = counts.merged,
                            "Merged count above total; clamping"
                        );
                    }
                    records.push(AgentRecord::new(
                        date,
                        agent.key.as_str(),
                        clamped.total,
                        clamped.merged,
                    )?);
                    fetched.push(agent.key.clone());
                }
                Err(e) if e.is_fetch_error() => {
                    tracing::warn!(
                        agent = %agent.key,
                        error = %e,
                        "Fetch failed; keeping previous values"
                    );
                    failed.push(FetchFailure {
                        agent: agent.key.clone(),
                        message: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let history = if records.is_empty() {
            tracing::warn!("No agent could be fetched; data table left unchanged");
            history
        } else {
            self.store.append_all(&records)?
        };

        tracing::info!(
            date = %date,
            fetched = fetched.len(),
            failed = failed.len(),
            "Collect finished"
        );
        Ok(CollectReport {
            date,
            history,
            fetched,
            failed,
        })
    }

    /// Render the chart, chart data, README, and dashboard from `history`.
    ///
    /// Agents missing from `refreshed` are flagged stale in the snapshot.
    pub fn render(&self, history: &History, refreshed: &HashSet<String>) -> Result<RenderReport> {
        let output = &self.config.output;
        let snapshot = DashboardSnapshot::build(history, &self.agents, refreshed);
        let stale = snapshot.stale_keys();
        if !stale.is_empty() {
            tracing::info!(agents = ?stale, "Rendering with carried-over values");
        }

        let mut artifacts = ArtifactSet::new();

        let chart_data = ChartData::build(history, &self.agents, self.config.chart.metric);
        artifacts.stage_bytes(&output.chart_data, chart_data.to_json()?.as_bytes())?;
        artifacts.stage_with(&output.chart_image, |path| {
            render_image(path, history, &self.agents, &self.config.chart)
        })?;

        let ctx = ReportContext {
            agents: &self.agents,
            snapshot: &snapshot,
            chart_image: link_path(&output.chart_image, page_dir(&output.readme)),
            chart_data: link_path(&output.chart_data, page_dir(&output.index)),
            refresh_secs: self.config.dashboard.refresh_secs,
        };

        let readme_template = load_template(&output.readme_template, DEFAULT_README_TEMPLATE)?;
        artifacts.stage_bytes(&output.readme, render_readme(&readme_template, &ctx)?.as_bytes())?;

        let index_template = load_template(&output.index_template, DEFAULT_INDEX_TEMPLATE)?;
        artifacts.stage_bytes(&output.index, render_index(&index_template, &ctx)?.as_bytes())?;

        tracing::debug!(staged = artifacts.len(), "All artifacts rendered");
        let changed = artifacts.commit()?;

        Ok(RenderReport { snapshot, changed })
    }

    /// Run the whole pipeline for `date`.
    pub fn run(
        &self,
        counter: &dyn PrCounter,
        publisher: &dyn Publisher,
        date: NaiveDate,
    ) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", run_id = %run_id, date = %date);
        let _enter = span.enter();
        tracing::info!(agents = self.agents.len(), "Run started");

        let collected = self.collect(counter, date)?;
        let refreshed: HashSet<String> = collected.fetched.iter().cloned().collect();
        let rendered = self.render(&collected.history, &refreshed)?;

        let mut changed = Vec::with_capacity(rendered.changed.len() + 1);
        if !collected.fetched.is_empty() {
            changed.push(self.store.path().to_path_buf());
        }
        changed.extend(rendered.changed);

        let publish = publisher.publish(date, &changed)?;

        tracing::info!(
            fetched = collected.fetched.len(),
            failed = collected.failed.len(),
            changed = changed.len(),
            publish = ?publish,
            "Run finished"
        );

        Ok(RunReport {
            run_id,
            date,
            fetched: collected.fetched,
            failed: collected.failed,
            snapshot: rendered.snapshot,
            changed,
            publish,
        })
    }
}

fn page_dir(page: &Path) -> &Path {
    page.parent().unwrap_or_else(|| Path::new(""))
}
