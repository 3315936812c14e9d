//! Text output formatting with progress bars and colors.

use chrono::{DateTime, Utc};
use openusage_core::{MetricLine, ProbeOutput, ProgressFormat, reset_in};
use openusage_providers::ProviderDescriptor;
use openusage_store::ProviderState;

// ============================================================================
// ANSI Colors
// ============================================================================

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const BLUE: &str = "\x1b[34m";

// Progress bar characters
const BAR_FULL: char = '█';
const BAR_EMPTY: char = '░';

const LABEL_WIDTH: usize = 12;

/// Text formatter with optional colors.
pub struct TextFormatter {
    use_colors: bool,
    bar_width: usize,
}

impl TextFormatter {
    /// Creates a new text formatter.
    pub fn new(use_colors: bool) -> Self {
        Self {
            use_colors,
            bar_width: 10,
        }
    }

    /// Formats a successful probe for one provider.
    pub fn format_output(&self, name: &str, output: &ProbeOutput, now: DateTime<Utc>) -> String {
        let mut lines = Vec::with_capacity(output.lines.len() + 1);

        match &output.plan {
            Some(plan) => lines.push(format!("{} ({})", self.bold(name), self.blue(plan))),
            None => lines.push(self.bold(name)),
        }
        if output.lines.is_empty() {
            lines.push(format!("  {}", self.dim("No usage reported")));
        }
        for line in &output.lines {
            lines.push(format!("  {}", self.format_line(line, now)));
        }

        lines.join("\n")
    }

    /// Formats one metric line.
    pub fn format_line(&self, line: &MetricLine, now: DateTime<Utc>) -> String {
        match line {
            MetricLine::Text { label, value } => {
                format!("{:<LABEL_WIDTH$} {value}", format!("{label}:"))
            }
            MetricLine::Badge { label, text } => {
                format!("{:<LABEL_WIDTH$} [{}]", format!("{label}:"), self.blue(text))
            }
            MetricLine::Progress {
                label,
                used,
                limit,
                format,
                resets_at,
            } => {
                let used_percent = if *limit > 0.0 {
                    (used / limit * 100.0).clamp(0.0, 100.0)
                } else {
                    0.0
                };
                let remaining = 100.0 - used_percent;
                let amount = match format {
                    ProgressFormat::Percent => format!("{remaining:.0}% left"),
                    ProgressFormat::Dollars => format!("${used:.2} / ${limit:.2}"),
                    ProgressFormat::Count => format!("{used:.0} / {limit:.0}"),
                };

                let mut result = format!(
                    "{:<LABEL_WIDTH$} {} {}",
                    format!("{label}:"),
                    self.progress_bar(remaining),
                    self.color_for_percent(remaining, &amount)
                );
                if let Some(countdown) = resets_at.as_deref().and_then(|at| countdown(at, now)) {
                    result.push_str(&self.dim(&format!(" · resets in {countdown}")));
                }
                result
            }
        }
    }

    /// Formats the live state of a provider (watch mode).
    pub fn format_state(&self, name: &str, state: &ProviderState, now: DateTime<Utc>) -> String {
        if let Some(error) = &state.error {
            return self.format_error(name, &error.message);
        }
        match &state.data {
            Some(output) if state.loading => {
                format!("{}\n  {}", self.format_output(name, output, now), self.dim("Refreshing…"))
            }
            Some(output) => self.format_output(name, output, now),
            None if state.loading => format!("{}\n  {}", self.bold(name), self.dim("Loading…")),
            None => format!("{}\n  {}", self.bold(name), self.dim("No data")),
        }
    }

    /// Formats a progress bar of the remaining share.
    pub fn progress_bar(&self, percent_remaining: f64) -> String {
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let filled = ((percent_remaining.clamp(0.0, 100.0) / 100.0) * self.bar_width as f64)
            .round() as usize;
        let empty = self.bar_width.saturating_sub(filled);

        let bar = format!(
            "{}{}",
            BAR_FULL.to_string().repeat(filled),
            BAR_EMPTY.to_string().repeat(empty)
        );

        self.color_for_percent(percent_remaining, &bar)
    }

    /// Formats provider list header.
    pub fn format_providers_header(&self) -> String {
        format!(
            "{:<10} {:<10} {:<12} {:<8} {}",
            self.bold("Provider"),
            self.bold("CLI"),
            self.bold("Primary"),
            self.bold("Enabled"),
            self.bold("Dashboard")
        )
    }

    /// Formats a single provider line.
    pub fn format_provider_line(&self, desc: &ProviderDescriptor, enabled: bool) -> String {
        let enabled_str = if enabled {
            self.green("✓")
        } else {
            self.dim("−")
        };

        format!(
            "{:<10} {:<10} {:<12} {:<8} {}",
            desc.display_name(),
            desc.cli_name(),
            desc.metadata.primary_label,
            enabled_str,
            desc.metadata.dashboard_url.unwrap_or("−")
        )
    }

    /// Formats an error message.
    pub fn format_error(&self, provider: &str, error: &str) -> String {
        format!("{}\n  {} {}", self.bold(provider), self.red("Error:"), error)
    }

    // ========================================================================
    // Color/style helpers
    // ========================================================================

    fn color_for_percent(&self, percent_remaining: f64, text: &str) -> String {
        if percent_remaining < 20.0 {
            self.red(text)
        } else if percent_remaining < 50.0 {
            self.yellow(text)
        } else {
            self.green(text)
        }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.use_colors {
            format!("{code}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    pub(crate) fn bold(&self, text: &str) -> String {
        self.paint(BOLD, text)
    }

    pub(crate) fn dim(&self, text: &str) -> String {
        self.paint(DIM, text)
    }

    pub(crate) fn green(&self, text: &str) -> String {
        self.paint(GREEN, text)
    }

    fn yellow(&self, text: &str) -> String {
        self.paint(YELLOW, text)
    }

    pub(crate) fn red(&self, text: &str) -> String {
        self.paint(RED, text)
    }

    fn blue(&self, text: &str) -> String {
        self.paint(BLUE, text)
    }
}

/// Countdown until an RFC 3339 timestamp, `None` once it has passed.
fn countdown(resets_at: &str, now: DateTime<Utc>) -> Option<String> {
    let at = DateTime::parse_from_rfc3339(resets_at).ok()?;
    reset_in(at.with_timezone(&Utc).signed_duration_since(now).num_seconds())
}
