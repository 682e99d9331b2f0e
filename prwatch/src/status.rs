//! `prwatch status`: the current snapshot from the stored table.

use anyhow::{Context, Result};
use prwatch_core::format::{format_count, format_date_long, format_rate_of};
use prwatch_core::{Config, DashboardSnapshot};

use crate::{current_agents, load_history};

pub fn print(config: &Config, json: bool) -> Result<()> {
    let history = load_history(config)?;
    let agents = config.agents();
    let snapshot = DashboardSnapshot::build(&history, &agents, &current_agents(&history, config));

    if json {
        let out = serde_json::to_string_pretty(&snapshot).context("failed to encode snapshot")?;
        println!("{out}");
        return Ok(());
    }

    print!("{}", render_table(&snapshot, config));
    Ok(())
}

fn render_table(snapshot: &DashboardSnapshot, config: &Config) -> String {
    let Some(as_of) = snapshot.as_of else {
        return "No data yet. Run `prwatch run` to collect the first snapshot.\n".to_string();
    };

    let mut out = format!("PR stats as of {}\n\n", format_date_long(as_of));
    out.push_str(&format!(
        "{:<20} {:>12} {:>12} {:>8}\n",
        "Agent", "Total PRs", "Merged PRs", "Rate"
    ));

    for meta in config.agents() {
        let Some(agent) = snapshot.get(&meta.key) else {
            continue;
        };
        let mut line = format!(
            "{:<20} {:>12} {:>12} {:>8}",
            meta.display_name,
            format_count(agent.total),
            format_count(agent.merged),
            format_rate_of(agent.merged, agent.total)
        );
        match agent.as_of {
            Some(date) if agent.stale => line.push_str(&format!("  (from {date})")),
            None => line.push_str("  (no data)"),
            _ => {}
        }
        out.push_str(&line);
        out.push('\n');
    }

    out.push_str(&format!(
        "{:<20} {:>12} {:>12} {:>8}\n",
        "All agents",
        format_count(snapshot.overall_total()),
        format_count(snapshot.overall_merged()),
        format_rate_of(snapshot.overall_merged(), snapshot.overall_total())
    ));
    out
}
