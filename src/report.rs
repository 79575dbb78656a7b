use std::fmt::Write;

use crate::district::{DistrictReport, Trend};
use crate::models::RecordKind;

fn trend_heading(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Attendance => "Attendance (last 6 months)",
        RecordKind::Members => "New Members (last 12 months)",
        RecordKind::Finance => "Finance Volume (last 12 months)",
        RecordKind::Events => "Events (last 12 months)",
    }
}

fn write_trend(output: &mut String, report: &DistrictReport, trend: &Trend) {
    let _ = writeln!(output);
    let _ = writeln!(output, "## {}", trend_heading(trend.kind));

    if trend.top.is_empty() {
        let _ = writeln!(output, "No activity recorded for this window.");
        return;
    }

    for id in &trend.top {
        let total = trend.buckets.totals.get(id);
        let _ = writeln!(output, "- {}: {}", report.label(id), total);
    }

    let _ = writeln!(output);
    let mut header = String::from("| Month |");
    let mut rule = String::from("| --- |");
    for id in &trend.top {
        let _ = write!(header, " {} |", report.label(id));
        rule.push_str(" ---: |");
    }
    let _ = writeln!(output, "{header}");
    let _ = writeln!(output, "{rule}");
    for row in &trend.chart {
        let mut line = format!("| {} |", row.month);
        for value in &row.values {
            let _ = write!(line, " {} |", value);
        }
        let _ = writeln!(output, "{line}");
    }
}

pub fn build_report(scope: Option<&str>, report: &DistrictReport) -> String {
    let mut output = String::new();
    let scope_label = scope.unwrap_or("all districts");

    let _ = writeln!(output, "# District Activity Report");
    let _ = writeln!(
        output,
        "Generated for {} on {} ({} branches)",
        scope_label,
        report.today,
        report.branches.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Branch Health (last 30 days)");

    if report.health.is_empty() {
        let _ = writeln!(output, "No branches in scope.");
    } else {
        for row in &report.health {
            let _ = writeln!(
                output,
                "- {}: score {} ({} attendance, {} new members, {} events, {} given)",
                row.branch,
                row.score,
                row.attendance_30d,
                row.new_members_30d,
                row.events_30d,
                row.finance_30d
            );
        }
    }

    for kind in RecordKind::ALL {
        write_trend(&mut output, report, report.trend_for(kind));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Monthly Finance Flow");
    let _ = writeln!(output, "| Month | Income | Expense | Net |");
    let _ = writeln!(output, "| --- | ---: | ---: | ---: |");
    for row in &report.flow {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} |",
            row.month, row.income, row.expense, row.net
        );
    }

    if !report.categories.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Giving and Spending by Category");
        for category in report.categories.iter().take(10) {
            let _ = writeln!(output, "- {}: {}", category.category, category.total);
        }
    }

    let malformed = report.malformed_dates();
    if malformed > 0 {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "_{malformed} rows had unparseable dates and were bucketed by their raw prefix._"
        );
    }

    output
}
