//! README and dashboard rendering.
//!
//! Both pages are produced from templates (see [`crate::template`]) filled
//! with values derived from the [`DashboardSnapshot`]. Every list follows the
//! roster order, so identical input renders byte-identical pages.

use std::fs;
use std::path::{Component, Path};

use crate::agents::AgentMeta;
use crate::error::Result;
use crate::format::{escape_html, format_count, format_date_long, format_rate_of, format_width};
use crate::metrics::{exact_rate, DashboardSnapshot};
use crate::template::{self, Substitutions};

/// Built-in README template, used when no template file exists.
pub const DEFAULT_README_TEMPLATE: &str = include_str!("../templates/readme_template.md");

/// Built-in dashboard template, used when no template file exists.
pub const DEFAULT_INDEX_TEMPLATE: &str = include_str!("../templates/index_template.html");

/// Everything the report pages need besides the templates.
pub struct ReportContext<'a> {
    pub agents: &'a [AgentMeta],
    pub snapshot: &'a DashboardSnapshot,
    /// Chart image path, relative to the README
    pub chart_image: String,
    /// Chart data path, relative to the dashboard page
    pub chart_data: String,
    pub refresh_secs: u64,
}

impl ReportContext<'_> {
    /// Build the full placeholder table.
    pub fn substitutions(&self) -> Substitutions {
        let snapshot = self.snapshot;
        let mut subs = Substitutions::new();
        subs.insert("STATS_ROWS", self.stats_rows());
        subs.insert("DATA_SOURCES", self.data_sources());
        subs.insert("AGENT_ROWS", self.agent_rows());
        subs.insert("AGENT_TOGGLES", self.agent_toggles());
        subs.insert("AGENT_LIST_JS", self.agent_list_js());
        subs.insert(
            "LAST_UPDATED",
            snapshot
                .as_of
                .map(format_date_long)
                .unwrap_or_else(|| "never".to_string()),
        );
        subs.insert("REFRESH_SECONDS", self.refresh_secs.to_string());
        subs.insert("CHART_IMAGE", self.chart_image.clone());
        subs.insert("CHART_DATA", escape_html(&self.chart_data));
        subs.insert("TOTAL_PRS", format_count(snapshot.overall_total()));
        subs.insert("TOTAL_MERGED", format_count(snapshot.overall_merged()));
        subs.insert(
            "OVERALL_RATE",
            format_rate_of(snapshot.overall_merged(), snapshot.overall_total()),
        );
        subs
    }

    fn stats_rows(&self) -> String {
        self.agents
            .iter()
            .map(|meta| {
                let (total, merged) = self.values(meta);
                format!(
                    "| {} | {} | {} | {} |",
                    meta.name,
                    format_count(total),
                    format_count(merged),
                    format_rate_of(merged, total)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn data_sources(&self) -> String {
        let mut lines = Vec::with_capacity(self.agents.len() * 2);
        for meta in self.agents {
            lines.push(format!(
                "- **All {} PRs**: [{}]({})",
                meta.name,
                meta.total_query,
                meta.search_url()
            ));
            lines.push(format!(
                "- **Merged {} PRs**: [{}]({})",
                meta.name,
                meta.merged_query,
                meta.merged_search_url()
            ));
        }
        lines.join("\n")
    }

    fn agent_rows(&self) -> String {
        self.agents
            .iter()
            .enumerate()
            .map(|(idx, meta)| {
                let (total, merged) = self.values(meta);
                let key = escape_html(&meta.key);
                let color = escape_html(&meta.color);
                [
                    format!("    <li class=\"agent\" data-agent=\"{key}\">"),
                    format!("      <span class=\"rank\">{}</span>", idx + 1),
                    format!(
                        "      <span class=\"swatch\" style=\"background-color: {color}\"></span>"
                    ),
                    format!(
                        "      <a class=\"name\" href=\"{}\" target=\"_blank\">{}</a>",
                        escape_html(&meta.info_url),
                        escape_html(&meta.display_name)
                    ),
                    format!(
                        "      <a class=\"metric\" href=\"{}\" target=\"_blank\" id=\"{key}-total\">{}</a>",
                        escape_html(&meta.search_url()),
                        format_count(total)
                    ),
                    format!(
                        "      <a class=\"metric\" href=\"{}\" target=\"_blank\" id=\"{key}-merged\">{}</a>",
                        escape_html(&meta.merged_search_url()),
                        format_count(merged)
                    ),
                    format!(
                        "      <span class=\"rate\" id=\"{key}-rate\">{}</span>",
                        format_rate_of(merged, total)
                    ),
                    format!(
                        "      <div class=\"progress\"><div class=\"progress-bar\" style=\"width: {}%; background-color: {color}\"></div></div>",
                        format_width(exact_rate(merged, total))
                    ),
                    "    </li>".to_string(),
                ]
                .join("\n")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn agent_toggles(&self) -> String {
        self.agents
            .iter()
            .map(|meta| {
                format!(
                    "    <button class=\"toggle-btn active\" data-agent=\"{}\"><span class=\"toggle-icon\" style=\"background-color: {}\"></span>{}</button>",
                    escape_html(&meta.key),
                    escape_html(&meta.color),
                    escape_html(&meta.display_name)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn agent_list_js(&self) -> String {
        let keys: Vec<&str> = self.agents.iter().map(|a| a.key.as_str()).collect();
        // Keys are [a-z0-9_-]+, so serialization cannot fail.
        serde_json::to_string(&keys).unwrap_or_else(|_| "[]".to_string())
    }

    fn values(&self, meta: &AgentMeta) -> (u64, u64) {
        self.snapshot
            .get(&meta.key)
            .map(|a| (a.total, a.merged))
            .unwrap_or((0, 0))
    }
}

/// Render the README markdown.
pub fn render_readme(template: &str, ctx: &ReportContext<'_>) -> Result<String> {
    template::render("readme", template, &ctx.substitutions())
}

/// Render the dashboard HTML page.
pub fn render_index(template: &str, ctx: &ReportContext<'_>) -> Result<String> {
    template::render("index", template, &ctx.substitutions())
}

/// Read a template file, falling back to `builtin` when it does not exist.
pub fn load_template(path: &Path, builtin: &'static str) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Template not found; using built-in");
            Ok(builtin.to_string())
        }
        Err(e) => Err(e.into()),
    }
}

/// Path of `target` as referenced from a page located in `page_dir`.
///
/// Falls back to the bare file name when `target` is not under `page_dir`.
/// Always uses `/` separators since the result ends up in links.
pub fn link_path(target: &Path, page_dir: &Path) -> String {
    let relative = target.strip_prefix(page_dir).unwrap_or_else(|_| {
        target
            .file_name()
            .map(Path::new)
            .unwrap_or(target)
    });
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::default_roster;
    use crate::metrics::AgentSnapshot;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn snapshot(values: &[(&str, u64, u64)]) -> DashboardSnapshot {
        DashboardSnapshot {
            agents: values
                .iter()
                .map(|(key, total, merged)| AgentSnapshot {
                    key: key.to_string(),
                    total: *total,
                    merged: *merged,
                    rate: crate::metrics::rate(*merged, *total),
                    as_of: NaiveDate::from_ymd_opt(2025, 6, 1),
                    stale: false,
                })
                .collect(),
            as_of: NaiveDate::from_ymd_opt(2025, 6, 1),
        }
    }

    fn context<'a>(agents: &'a [AgentMeta], snapshot: &'a DashboardSnapshot) -> ReportContext<'a> {
        ReportContext {
            agents,
            snapshot,
            chart_image: "docs/chart.png".to_string(),
            chart_data: "chart-data.json".to_string(),
            refresh_secs: 3600,
        }
    }

    #[test]
    fn test_stats_rows_follow_roster_order() {
        let agents = default_roster();
        let snap = snapshot(&[
            ("codegen", 10, 5),
            ("copilot", 1000, 400),
            ("codex", 421_223, 360_271),
        ]);
        let rows = context(&agents, &snap).stats_rows();
        let lines: Vec<&str> = rows.lines().collect();
        assert_eq!(lines.len(), agents.len());
        assert_eq!(lines[0], "| Copilot | 1,000 | 400 | 40.0% |");
        assert_eq!(lines[1], "| Codex | 421,223 | 360,271 | 85.5% |");
        // Agents without data render as zero.
        assert!(lines[2].ends_with("| 0 | 0 | 0.0% |"), "{}", lines[2]);
    }

    #[test]
    fn test_displayed_rates_round_the_exact_ratio() {
        let agents = default_roster();
        // 6/13 is 46.1538..., which the two-decimal 46.15 would show as 46.1.
        let snap = snapshot(&[("copilot", 13, 6), ("codex", 19, 15), ("cursor", 1, 0)]);
        let ctx = context(&agents, &snap);

        let rows = ctx.stats_rows();
        assert!(rows.contains("| Copilot | 13 | 6 | 46.2% |"), "{rows}");
        assert!(rows.contains("| Codex | 19 | 15 | 78.9% |"), "{rows}");
        assert!(ctx.agent_rows().contains("id=\"copilot-rate\">46.2%</span>"));
        // 21/33 = 63.636...
        assert_eq!(ctx.substitutions()["OVERALL_RATE"], "63.6%");
    }

    #[test]
    fn test_default_templates_render_completely() {
        let agents = default_roster();
        let snap = snapshot(&[("copilot", 1000, 400), ("codex", 0, 0)]);
        let ctx = context(&agents, &snap);

        let readme = render_readme(DEFAULT_README_TEMPLATE, &ctx).unwrap();
        assert!(readme.contains("![PR chart](docs/chart.png)"));
        assert!(readme.contains("_Last updated: June 01, 2025_"));
        assert!(readme.contains("1,000 PRs, 400 merged (40.0%)"));

        let index = render_index(DEFAULT_INDEX_TEMPLATE, &ctx).unwrap();
        assert!(index.contains("content=\"3600\""));
        assert!(index.contains("fetch(\"chart-data.json\")"));
        assert!(index.contains("var AGENTS = [\"copilot\",\"codex\",\"cursor\",\"devin\",\"codegen\"];"));
        assert!(index.contains("style=\"width: 40.0%; background-color: #87ceeb\""));
        assert!(index.contains("<span class=\"rank\">1</span>"));
        assert!(!index.contains("${"));
    }

    #[test]
    fn test_render_is_byte_stable() {
        let agents = default_roster();
        let snap = snapshot(&[("copilot", 1000, 400)]);
        let a = render_index(DEFAULT_INDEX_TEMPLATE, &context(&agents, &snap)).unwrap();
        let b = render_index(DEFAULT_INDEX_TEMPLATE, &context(&agents, &snap)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_html_values_are_escaped() {
        let mut agents = default_roster();
        agents[0].display_name = "Copilot <beta>".to_string();
        let snap = snapshot(&[]);
        let ctx = context(&agents, &snap);
        let rows = ctx.agent_rows();
        assert!(rows.contains("Copilot &lt;beta&gt;"));
        assert!(rows.contains("&amp;type=pullrequests"));
        assert!(!rows.contains("&type="));
    }

    #[test]
    fn test_unknown_placeholder_is_error() {
        let agents = default_roster();
        let snap = snapshot(&[]);
        let err = render_readme("${STATS_ROWS}\n${NOPE}", &context(&agents, &snap)).unwrap_err();
        assert!(err.to_string().contains("NOPE"));
    }

    #[test]
    fn test_empty_snapshot_renders_never() {
        let agents = default_roster();
        let snap = DashboardSnapshot {
            agents: Vec::new(),
            as_of: None,
        };
        let subs = context(&agents, &snap).substitutions();
        assert_eq!(subs["LAST_UPDATED"], "never");
        assert_eq!(subs["OVERALL_RATE"], "0.0%");
    }

    #[test]
    fn test_load_template_falls_back_to_builtin() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope.md");
        assert_eq!(
            load_template(&missing, DEFAULT_README_TEMPLATE).unwrap(),
            DEFAULT_README_TEMPLATE
        );

        let present = dir.path().join("custom.md");
        fs::write(&present, "custom $$").unwrap();
        assert_eq!(load_template(&present, DEFAULT_README_TEMPLATE).unwrap(), "custom $$");
    }

    #[test]
    fn test_link_path() {
        assert_eq!(
            link_path(Path::new("docs/chart.png"), Path::new("")),
            "docs/chart.png"
        );
        assert_eq!(
            link_path(Path::new("docs/chart-data.json"), Path::new("docs")),
            "chart-data.json"
        );
        assert_eq!(
            link_path(&PathBuf::from("/elsewhere/chart.svg"), Path::new("/site")),
            "chart.svg"
        );
    }
}
