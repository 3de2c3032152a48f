//! CLI theme and styling.

use colored::{ColoredString, Colorize};
use warden_core::RiskLevel;

/// Inner width of an approval box, between the corner glyphs.
const BOX_INNER: usize = 58;
/// Room for text inside an approval box line.
const BOX_TEXT: usize = 56;

/// CLI theme configuration.
pub(crate) struct Theme;

impl Theme {
    /// Format a section header.
    pub(crate) fn header(text: &str) -> String {
        text.bold().cyan().to_string()
    }

    /// Format an allowed outcome.
    pub(crate) fn success(text: &str) -> String {
        format!("{} {text}", "✔".bold().green())
    }

    /// Format a denial or failure.
    pub(crate) fn error(text: &str) -> String {
        format!("{} {}", "✘".bold().red(), text.red())
    }

    /// Format a warning.
    pub(crate) fn warning(text: &str) -> String {
        format!("{} {}", "⚠".yellow(), text.yellow())
    }

    /// Format a hint.
    pub(crate) fn info(text: &str) -> String {
        format!("{} {text}", "›".blue())
    }

    /// Format secondary detail.
    pub(crate) fn dimmed(text: &str) -> String {
        text.dimmed().to_string()
    }

    /// Format a `key: value` line.
    pub(crate) fn kv(key: &str, value: &str) -> String {
        format!("{} {value}", format!("{key}:").bold())
    }

    /// Render a pending request as a box tinted by its risk.
    ///
    /// `rows` are plain `(label, value)` pairs; a `Risk` row is appended.
    /// Padding is computed before styling so every line has the same width.
    pub(crate) fn approval_box(title: &str, rows: &[(&str, &str)], risk: RiskLevel) -> String {
        let tint = |s: &str| risk_color(s, risk).to_string();
        let rule = "─".repeat(BOX_INNER);
        let line = |plain_len: usize, styled: &str| {
            let pad = BOX_TEXT.saturating_sub(plain_len);
            format!("│ {styled}{:pad$} │", "")
        };
        let row = |label: &str, plain: &str, styled: &str| {
            let label = format!("{label}:");
            let len = label
                .chars()
                .count()
                .saturating_add(1)
                .saturating_add(plain.chars().count());
            line(len, &format!("{} {styled}", label.bold()))
        };

        let mut lines = vec![
            tint(&format!("╭{rule}╮")),
            line(title.chars().count(), &title.bold().to_string()),
            tint(&format!("│{:w$}│", "", w = BOX_INNER)),
        ];
        for &(label, value) in rows {
            lines.push(row(label, value, value));
        }
        let level = risk_name(risk);
        lines.push(row("Risk", level, &Self::risk_level(risk)));
        lines.push(tint(&format!("╰{rule}╯")));
        lines.join("\n")
    }

    /// Format a risk level.
    pub(crate) fn risk_level(level: RiskLevel) -> String {
        let name = risk_color(risk_name(level), level);
        if level == RiskLevel::High {
            name.bold().to_string()
        } else {
            name.to_string()
        }
    }
}

fn risk_name(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Low => "Low",
        RiskLevel::Medium => "Medium",
        RiskLevel::High => "High",
    }
}

fn risk_color(text: &str, level: RiskLevel) -> ColoredString {
    match level {
        RiskLevel::Low => text.green(),
        RiskLevel::Medium => text.yellow(),
        RiskLevel::High => text.red(),
    }
}
