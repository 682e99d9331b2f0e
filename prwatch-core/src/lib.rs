//! # prwatch-core
//!
//! Core library for prwatch - a daily tracker of pull requests opened and
//! merged by AI coding agents.
//!
//! This library provides:
//! - A search API client that counts PRs per agent
//! - A flat-file store holding one row per (date, agent)
//! - Merge-rate metrics and the dashboard snapshot
//! - Chart, README, and dashboard rendering
//! - Configuration, logging, and an optional git publisher
//!
//! ## Architecture
//!
//! A run is one linear pass driven by [`Pipeline`]:
//! - **Fetch:** one total and one merged query per agent ([`search`])
//! - **Store:** upsert today's rows into the data table ([`store`])
//! - **Render:** chart image, chart JSON, README, dashboard ([`chart`], [`report`])
//! - **Publish:** hand the changed files to a [`Publisher`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use prwatch_core::{BlockingSearchClient, Config, NoopPublisher, Pipeline};
//!
//! let config = Config::load().expect("failed to load config");
//! let client = BlockingSearchClient::new(config.github.clone()).expect("client");
//! let today = chrono::Utc::now().date_naive();
//!
//! let report = Pipeline::new(&config)
//!     .run(&client, &NoopPublisher, today)
//!     .expect("run failed");
//! println!("refreshed {} agents", report.fetched.len());
//! ```

// Re-export commonly used items at the crate root
pub use agents::{default_roster, AgentMeta};
pub use config::Config;
pub use error::{Error, Result};
pub use metrics::{AgentSnapshot, DashboardSnapshot};
pub use pipeline::{CollectReport, FetchFailure, Pipeline, RenderReport, RunReport};
pub use publish::{publisher_for, GitPublisher, NoopPublisher, PublishOutcome, Publisher};
pub use search::{BlockingSearchClient, PrCounter, SearchClient};
pub use store::DataStore;
pub use types::*;

// Public modules
pub mod agents;
pub mod artifact;
pub mod chart;
pub mod config;
pub mod error;
pub mod format;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod publish;
pub mod report;
pub mod search;
pub mod store;
pub mod template;
pub mod types;
