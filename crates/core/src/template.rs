//! Message template rendering.
//!
//! Templates use `{placeholder}` tokens drawn from a fixed variable set
//! ([`PLACEHOLDERS`]). Rendering is total: known placeholders without a value
//! render as an empty string, unknown placeholders are left verbatim. Rules
//! are validated with [`validate_template`] before they are stored or
//! evaluated, so unknown tokens never reach a subscriber.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::{Captures, Regex};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Every placeholder a template may reference.
pub const PLACEHOLDERS: [&str; 8] = [
    "patient_name",
    "date",
    "days_until",
    "week_number",
    "due_date",
    "cycle_day",
    "phase_name",
    "tenant_name",
];

/// Maximum template length in characters.
pub const MAX_TEMPLATE_LENGTH: usize = 2_000;

/// Date format used for `{date}` and `{due_date}`.
pub const DATE_FORMAT: &str = "%d/%m/%Y";

/// Regex pattern matching `{placeholder}` tokens.
pub const PLACEHOLDER_PATTERN: &str = r"\{([a-zA-Z_][a-zA-Z0-9_]*)\}";

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PLACEHOLDER_PATTERN).expect("valid regex"));

// ---------------------------------------------------------------------------
// TemplateContext
// ---------------------------------------------------------------------------

/// Values available to a template. `None` renders as an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateContext {
    pub patient_name: Option<String>,
    pub date: Option<NaiveDate>,
    pub days_until: Option<i64>,
    pub week_number: Option<u32>,
    pub due_date: Option<NaiveDate>,
    pub cycle_day: Option<i64>,
    pub phase_name: Option<String>,
    pub tenant_name: Option<String>,
}

impl TemplateContext {
    /// Look up a placeholder. The outer `None` means the name is not a known
    /// placeholder; the inner `None` means it is known but has no value.
    fn lookup(&self, name: &str) -> Option<Option<String>> {
        let value = match name {
            "patient_name" => self.patient_name.clone(),
            "date" => self.date.map(format_date),
            "days_until" => self.days_until.map(|d| d.to_string()),
            "week_number" => self.week_number.map(|w| w.to_string()),
            "due_date" => self.due_date.map(format_date),
            "cycle_day" => self.cycle_day.map(|d| d.to_string()),
            "phase_name" => self.phase_name.clone(),
            "tenant_name" => self.tenant_name.clone(),
            _ => return None,
        };
        Some(value)
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Substitute every known placeholder in `template`.
pub fn render(template: &str, ctx: &TemplateContext) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| match ctx.lookup(&caps[1]) {
            Some(value) => value.unwrap_or_default(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Placeholder names in `template` that are not part of [`PLACEHOLDERS`].
///
/// Returns a de-duplicated, sorted list.
pub fn unknown_placeholders(template: &str) -> Vec<String> {
    let mut unknown: Vec<String> = PLACEHOLDER_RE
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .filter(|name| !PLACEHOLDERS.contains(&name.as_str()))
        .collect();
    unknown.sort();
    unknown.dedup();
    unknown
}

/// Validate a template: non-empty, bounded, and only known placeholders.
pub fn validate_template(template: &str) -> Result<(), CoreError> {
    if template.trim().is_empty() {
        return Err(CoreError::Validation(
            "Message template must not be empty".to_string(),
        ));
    }
    if template.chars().count() > MAX_TEMPLATE_LENGTH {
        return Err(CoreError::Validation(format!(
            "Message template exceeds maximum length of {MAX_TEMPLATE_LENGTH} characters"
        )));
    }
    let unknown = unknown_placeholders(template);
    if !unknown.is_empty() {
        return Err(CoreError::Validation(format!(
            "Message template references unknown placeholders: {}",
            unknown.join(", ")
        )));
    }
    Ok(())
}
