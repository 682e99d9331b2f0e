//! Placeholder substitution for the README and dashboard templates.
//!
//! Syntax:
//! - `${NAME}` or `$NAME` is replaced with the value for `NAME`
//! - `$$` renders a literal `$`
//!
//! Unknown placeholders and stray `$` signs are errors. A half-substituted
//! page must never be published.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Placeholder values, keyed by name.
pub type Substitutions = BTreeMap<&'static str, String>;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$(?:(\$)|\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*)|)")
            .expect("placeholder regex is valid")
    })
}

/// Substitute every placeholder in `template`.
///
/// `name` identifies the template in error messages.
pub fn render(name: &str, template: &str, values: &Substitutions) -> Result<String> {
    let mut out = String::with_capacity(template.len() + 1024);
    let mut missing: Vec<String> = Vec::new();
    let mut last = 0;

    for caps in placeholder_regex().captures_iter(template) {
        let whole = caps.get(0).expect("group 0 always matches");
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        if caps.get(1).is_some() {
            out.push('$');
            continue;
        }

        let key = match caps.get(2).or_else(|| caps.get(3)) {
            Some(key) => key.as_str(),
            None => {
                let line = template[..whole.start()].matches('\n').count() + 1;
                return Err(Error::TemplateRender {
                    template: name.to_string(),
                    message: format!("invalid placeholder at line {line} (use $$ for a literal $)"),
                });
            }
        };

        match values.get(key) {
            Some(value) => out.push_str(value),
            None => {
                if !missing.iter().any(|m| m == key) {
                    missing.push(key.to_string());
                }
            }
        }
    }
    out.push_str(&template[last..]);

    if !missing.is_empty() {
        return Err(Error::TemplateRender {
            template: name.to_string(),
            message: format!("no value for placeholder(s): {}", missing.join(", ")),
        });
    }
    Ok(out)
}
