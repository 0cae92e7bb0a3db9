//! Operator message templates
//!
//! Placeholders are `{name}`, `{ip}`, `{kind}`, `{status}`, `{date}`,
//! `{time}` and `{datetime}`. Anything else in braces is left as written.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};

pub const DEFAULT_DOWN_TEMPLATE: &str = "🔴 {name} ({ip}) is DOWN since {datetime}";
pub const DEFAULT_UP_TEMPLATE: &str = "✅ {name} ({ip}) is back UP at {datetime}";

/// Values substituted into a template
#[derive(Debug, Clone)]
pub struct TemplateContext<'a> {
    pub name: &'a str,
    pub ip: &'a str,
    pub kind: &'a str,
    pub status: &'a str,
    pub timestamp: DateTime<Utc>,
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("valid placeholder pattern"))
}

pub fn render(template: &str, ctx: &TemplateContext<'_>) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures<'_>| match &caps[1] {
            "name" => ctx.name.to_string(),
            "ip" => ctx.ip.to_string(),
            "kind" => ctx.kind.to_string(),
            "status" => ctx.status.to_string(),
            "date" => ctx.timestamp.format("%Y-%m-%d").to_string(),
            "time" => ctx.timestamp.format("%H:%M:%S").to_string(),
            "datetime" => ctx.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

/// Render `configured`, or `fallback` when no template is configured
pub fn render_or(configured: Option<&str>, fallback: &str, ctx: &TemplateContext<'_>) -> String {
    let template = configured
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(fallback);
    render(template, ctx)
}
