//! Terminal report of top senders and domains

use ga_core::Analytics;
use nu_ansi_term::Color;

/// Render the sender and domain tables.
///
/// Percentages are relative to `total`, the number of stored records.
pub fn render(analytics: &Analytics, total: usize) -> String {
    let mut out = String::new();

    out.push_str(&format!("\n{}\n", Color::Cyan.bold().paint("=== Top Senders ===")));
    out.push_str(&format!("{:<50} | {:<10} | {:<10}\n", "Sender", "Count", "Percentage"));
    out.push_str(&format!("{}\n", "-".repeat(72)));
    for sender in &analytics.top_senders {
        out.push_str(&format!(
            "{:<50} | {:<10} | {:.1}%\n",
            truncate(&sender.email, 50),
            sender.count,
            percentage(sender.count, total)
        ));
    }

    out.push_str(&format!("\n{}\n", Color::Cyan.bold().paint("=== Top Domains ===")));
    out.push_str(&format!("{:<30} | {:<10} | {:<10}\n", "Domain", "Count", "Percentage"));
    out.push_str(&format!("{}\n", "-".repeat(52)));
    for domain in &analytics.top_domains {
        out.push_str(&format!(
            "{:<30} | {:<10} | {:.1}%\n",
            truncate(&domain.domain, 30),
            domain.count,
            percentage(domain.count, total)
        ));
    }

    out
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    count as f64 / total as f64 * 100.0
}

/// First `max` characters, never splitting a code point
pub fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
