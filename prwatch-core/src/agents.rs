//! Tracked agent roster.
//!
//! The order of the roster is the display order used by every renderer.
//! It is never derived from map traversal.

use serde::Deserialize;

use crate::error::{Error, Result};

/// Web search page used for the human-facing links.
const SEARCH_PAGE_URL: &str = "https://github.com/search";

/// Static description of one tracked AI coding agent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentMeta {
    /// Stable identifier stored in the data table (e.g. "codex")
    pub key: String,
    /// Short label used in the README table and chart legend
    pub name: String,
    /// Long label used on the dashboard
    pub display_name: String,
    /// Hex color (`#RRGGBB`) for the swatch and chart line
    pub color: String,
    /// Product page for the agent
    pub info_url: String,
    /// Search query matching every PR opened by the agent
    pub total_query: String,
    /// Search query matching the agent's merged PRs
    pub merged_query: String,
}

impl AgentMeta {
    fn builtin(
        key: &str,
        name: &str,
        display_name: &str,
        color: &str,
        info_url: &str,
        selector: &str,
    ) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            display_name: display_name.to_string(),
            color: color.to_string(),
            info_url: info_url.to_string(),
            total_query: selector.to_string(),
            merged_query: format!("{selector} is:merged"),
        }
    }

    /// Link to the web search listing every PR of this agent.
    pub fn search_url(&self) -> String {
        search_page_url(&self.total_query)
    }

    /// Link to the web search listing merged PRs of this agent.
    pub fn merged_search_url(&self) -> String {
        search_page_url(&self.merged_query)
    }

    /// Validate a single agent entry.
    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty()
            || !self
                .key
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        {
            return Err(Error::Config(format!(
                "agent key {:?} must match [a-z0-9_-]+",
                self.key
            )));
        }
        if parse_hex_color(&self.color).is_none() {
            return Err(Error::Config(format!(
                "agent {} has invalid color {:?} (expected #RRGGBB)",
                self.key, self.color
            )));
        }
        if self.total_query.trim().is_empty() || self.merged_query.trim().is_empty() {
            return Err(Error::Config(format!(
                "agent {} needs both total_query and merged_query",
                self.key
            )));
        }
        Ok(())
    }
}

fn search_page_url(query: &str) -> String {
    format!(
        "{}?q={}&type=pullrequests",
        SEARCH_PAGE_URL,
        urlencoding::encode(query)
    )
}

/// The built-in roster, in display order.
pub fn default_roster() -> Vec<AgentMeta> {
    vec![
        AgentMeta::builtin(
            "copilot",
            "Copilot",
            "GitHub Copilot",
            "#87ceeb",
            "https://docs.github.com/en/copilot/using-github-copilot/coding-agent/using-copilot-to-work-on-an-issue",
            "is:pr head:copilot/",
        ),
        AgentMeta::builtin(
            "codex",
            "Codex",
            "OpenAI Codex",
            "#ff6b6b",
            "https://openai.com/index/introducing-codex/",
            "is:pr head:codex/",
        ),
        AgentMeta::builtin(
            "cursor",
            "Cursor",
            "Cursor Agents",
            "#9b59b6",
            "https://docs.cursor.com/background-agent",
            "is:pr head:cursor/",
        ),
        AgentMeta::builtin(
            "devin",
            "Devin",
            "Devin",
            "#52c41a",
            "https://devin.ai/pricing",
            "is:pr author:devin-ai-integration[bot]",
        ),
        AgentMeta::builtin(
            "codegen",
            "Codegen",
            "Codegen",
            "#daa520",
            "https://codegen.com/",
            "is:pr author:codegen-sh[bot]",
        ),
    ]
}

/// Validate a roster: every entry valid, keys unique, at least one agent.
pub fn validate_roster(agents: &[AgentMeta]) -> Result<()> {
    if agents.is_empty() {
        return Err(Error::Config("at least one agent must be configured".to_string()));
    }
    for (idx, agent) in agents.iter().enumerate() {
        agent.validate()?;
        if agents[..idx].iter().any(|a| a.key == agent.key) {
            return Err(Error::Config(format!("duplicate agent key {:?}", agent.key)));
        }
    }
    Ok(())
}

/// Parse `#RRGGBB` into its components.
pub fn parse_hex_color(color: &str) -> Option<(u8, u8, u8)> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roster_order_and_validity() {
        let roster = default_roster();
        let keys: Vec<_> = roster.iter().map(|a| a.key.as_str()).collect();
        assert_eq!(keys, vec!["copilot", "codex", "cursor", "devin", "codegen"]);
        assert!(validate_roster(&roster).is_ok());
    }

    #[test]
    fn test_merged_query_extends_total_query() {
        let roster = default_roster();
        let devin = roster.iter().find(|a| a.key == "devin").unwrap();
        assert_eq!(devin.total_query, "is:pr author:devin-ai-integration[bot]");
        assert_eq!(
            devin.merged_query,
            "is:pr author:devin-ai-integration[bot] is:merged"
        );
    }

    #[test]
    fn test_search_url_is_encoded() {
        let roster = default_roster();
        let url = roster[0].search_url();
        assert_eq!(
            url,
            "https://github.com/search?q=is%3Apr%20head%3Acopilot%2F&type=pullrequests"
        );
    }

    #[test]
    fn test_validate_rejects_duplicates_and_bad_colors() {
        let mut roster = default_roster();
        roster.push(roster[0].clone());
        assert!(validate_roster(&roster).is_err());

        let mut agent = default_roster().remove(0);
        agent.color = "skyblue".to_string();
        assert!(agent.validate().is_err());

        let mut agent = default_roster().remove(0);
        agent.key = "Co,pilot".to_string();
        assert!(agent.validate().is_err());

        assert!(validate_roster(&[]).is_err());
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#87ceeb"), Some((0x87, 0xce, 0xeb)));
        assert_eq!(parse_hex_color("#FFF"), None);
        assert_eq!(parse_hex_color("87ceeb"), None);
    }
}
