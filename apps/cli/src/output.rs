//! Terminal rendering of reports and estimates.

use colored::Colorize;
use std::time::Duration;
use vidbatch_core::{BatchReport, CostEstimate, JobOutcome, KindCost, OutcomeStatus};

/// Prints one line per job, then totals.
pub fn render_report(report: &BatchReport) {
    println!("{}", "Batch Execution Complete".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for outcome in &report.results {
        println!("  {}", outcome_line(outcome));
    }

    println!();
    println!(
        "Total: {} | Succeeded: {} | Failed: {} | Cancelled: {}",
        report.total,
        report.succeeded.to_string().green(),
        report.failed.to_string().red(),
        report.cancelled.to_string().yellow()
    );
    println!(
        "Duration: {} | Cost: ${:.4}",
        format_duration(Duration::from_millis(report.total_elapsed_ms)),
        report.total_estimated_cost
    );
}

fn outcome_line(outcome: &JobOutcome) -> String {
    let label = format!("#{} [{}]", outcome.index, outcome.kind);
    match &outcome.status {
        OutcomeStatus::Completed { video_id, output_path, model, size, seconds, attempts, cost, .. } => {
            let location = output_path
                .as_ref()
                .map_or_else(|| video_id.clone(), |path| path.display().to_string());
            format!(
                "{} {} {} ({} {} {}s, ${:.2}, {})",
                "✓".green(),
                label,
                location.cyan(),
                model,
                size,
                seconds,
                cost,
                plural(*attempts, "attempt")
            )
        }
        OutcomeStatus::Failed { error, attempts, .. } => {
            format!("{} {} {} ({})", "✗".red(), label, error, plural(*attempts, "attempt"))
        }
        OutcomeStatus::Cancelled { reason } => format!("{} {} {}", "⚠".yellow(), label, reason.dimmed()),
    }
}

/// Prints the cost band and the per-kind breakdown.
pub fn render_estimate(estimate: &CostEstimate) {
    println!("{}", "Cost Estimate".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Jobs: {}", estimate.total_jobs);
    println!("Nominal: ${:.2}", estimate.nominal_cost);
    println!(
        "Estimate: {} - {}",
        format!("${:.2}", estimate.min_estimate).green(),
        format!("${:.2}", estimate.max_estimate).yellow()
    );
    println!();
    breakdown_line("Text to video", &estimate.breakdown.text_to_video);
    breakdown_line("Image to video", &estimate.breakdown.image_to_video);
    breakdown_line("Remix", &estimate.breakdown.remix);
}

fn breakdown_line(label: &str, kind: &KindCost) {
    if kind.count > 0 {
        println!("  {:<15} {:>3} x  ${:.2}", label, kind.count, kind.cost);
    }
}

fn plural(count: u32, noun: &str) -> String {
    if count == 1 { format!("1 {}", noun) } else { format!("{} {}s", count, noun) }
}

/// Format duration as human-readable string.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;

    if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}.{}s", seconds, duration.subsec_millis() / 100)
    }
}
