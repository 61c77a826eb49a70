//! Plain-text rendering of a [`SummaryReport`]

use crate::stats::SummaryReport;
use colored::Colorize;
use std::io::{self, Write};

const BAR_WIDTH: usize = 30;

pub fn write_text<W: Write>(writer: &mut W, report: &SummaryReport) -> io::Result<()> {
    let title = match &report.session_id {
        Some(id) => format!("AI Session Report: {}", id),
        None => "AI Session Report".to_string(),
    };
    writeln!(writer, "{}", title.cyan().bold())?;
    writeln!(writer, "Generated {}", report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"))?;

    heading(writer, "Sessions")?;
    writeln!(writer, "  Total:     {}", report.sessions.total)?;
    writeln!(writer, "  Completed: {}", report.sessions.completed)?;
    writeln!(writer, "  Active:    {}", report.sessions.active)?;

    let roi = &report.roi;
    heading(writer, "Return on Investment")?;
    writeln!(writer, "  Sessions counted:      {}", roi.completed_sessions)?;
    if roi.sessions_without_estimate > 0 {
        writeln!(
            writer,
            "  {}",
            format!("{} session(s) had no estimate", roi.sessions_without_estimate).yellow()
        )?;
    }
    writeln!(writer, "  AI time:               {}", hours(roi.total_ai_minutes))?;
    writeln!(writer, "  Human baseline:        {}", hours(roi.human_baseline_minutes))?;
    writeln!(writer, "  Time saved:            {}", hours(roi.time_saved_minutes))?;
    writeln!(writer, "  Human baseline cost:   {}", dollars(roi.human_baseline_cost))?;
    writeln!(
        writer,
        "  AI cost:               {} (subscription {}, oversight {})",
        dollars(roi.total_ai_cost),
        dollars(roi.ai_subscription_cost),
        dollars(roi.oversight_cost)
    )?;
    writeln!(writer, "  Net savings:           {}", dollars(roi.total_human_cost_saved))?;
    writeln!(writer, "  Productivity:          {:.1}x", roi.productivity_multiplier)?;

    let eff = &report.effectiveness;
    heading(writer, "Effectiveness")?;
    writeln!(writer, "  Interactions: {}", eff.total_interactions)?;
    writeln!(writer, "  Average:      {:.2}/5", eff.average)?;
    let most = eff.distribution.values().copied().max().unwrap_or(0);
    for (rating, count) in eff.distribution.iter().rev() {
        writeln!(
            writer,
            "  {} {:>4}  {}",
            stars(*rating),
            count,
            bar(*count, most)
        )?;
    }

    let gaps = &report.gaps;
    if !gaps.gaps.is_empty() {
        heading(writer, "Idle Time Between Sessions")?;
        writeln!(writer, "  Total:   {}", hours(gaps.total_idle_minutes))?;
        writeln!(writer, "  Average: {:.1} min", gaps.average_gap_minutes)?;
        writeln!(writer, "  Longest: {:.1} min", gaps.longest_gap_minutes)?;
    }

    let issues = &report.issues;
    heading(writer, "Issues")?;
    writeln!(writer, "  Total: {} ({} unresolved)", issues.total, issues.unresolved)?;
    for (severity, count) in &issues.by_severity {
        writeln!(writer, "  {:<10} {}", severity, count)?;
    }
    for (issue_type, count) in &issues.by_type {
        writeln!(writer, "  - {}: {}", issue_type, count)?;
    }

    let code = &report.code;
    if code.functions > 0 {
        heading(writer, "Code Metrics")?;
        writeln!(writer, "  Files:           {}", code.files)?;
        writeln!(writer, "  Functions:       {}", code.functions)?;
        writeln!(writer, "  Lines added:     {}", code.total_lines_added)?;
        writeln!(writer, "  Lines modified:  {}", code.total_lines_modified)?;
        writeln!(writer, "  Avg complexity:  {:.1}", code.average_complexity)?;
        writeln!(writer, "  Avg doc score:   {:.0}/100", code.average_documentation_score)?;
        writeln!(writer, "  Effort score:    {:.1}", code.total_effort_score)?;
    }

    writeln!(
        writer,
        "\n{}",
        format!(
            "Rates: ${:.0}/h human, ${:.0}/month AI over {:.0}h, {:.0}% oversight",
            report.rates.human_hourly_rate,
            report.rates.ai_monthly_cost,
            report.rates.working_hours_per_month,
            report.rates.oversight_ratio * 100.0
        )
        .dimmed()
    )?;
    Ok(())
}

fn heading<W: Write>(writer: &mut W, text: &str) -> io::Result<()> {
    writeln!(writer, "\n{}", text.bold())
}

fn hours(minutes: f64) -> String {
    format!("{:.1}h ({:.0} min)", minutes / 60.0, minutes)
}

fn dollars(amount: f64) -> String {
    if amount < 0.0 {
        format!("-${:.2}", -amount)
    } else {
        format!("${:.2}", amount)
    }
}

fn stars(rating: u8) -> String {
    let filled = usize::from(rating.min(5));
    format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
}

fn bar(count: usize, most: usize) -> String {
    if most == 0 {
        return String::new();
    }
    "█".repeat(count * BAR_WIDTH / most)
}
