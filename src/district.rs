use std::collections::HashMap;

use chrono::NaiveDate;

use crate::buckets::{
    bucket_window, trailing_months, window_floor, Buckets, ParseMode, ATTENDANCE_WINDOW_MONTHS,
    YEAR_WINDOW_MONTHS,
};
use crate::db::Floors;
use crate::export::{ReportTab, Table};
use crate::finance::{category_totals, monthly_flow};
use crate::health::{cutoff_date, health_rows, HEALTH_WINDOW_DAYS};
use crate::models::{
    branch_labels, ActivitySet, Branch, BranchActivity, CategoryTotal, FinanceFlowRow, HealthRow,
    RecordKind,
};
use crate::ranking::{chart_rows, top_n, ChartRow, TOP_N};

pub fn window_months(kind: RecordKind) -> usize {
    match kind {
        RecordKind::Attendance => ATTENDANCE_WINDOW_MONTHS,
        RecordKind::Members | RecordKind::Finance | RecordKind::Events => YEAR_WINDOW_MONTHS,
    }
}

/// Oldest date each table must be read from to cover its trend window and
/// the health window.
pub fn floors(today: NaiveDate) -> Floors {
    let health = cutoff_date(today, HEALTH_WINDOW_DAYS);
    let floor = |kind: RecordKind| window_floor(today, window_months(kind)).min(health);
    Floors {
        attendance: floor(RecordKind::Attendance),
        members: floor(RecordKind::Members),
        finance: floor(RecordKind::Finance),
        events: floor(RecordKind::Events),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trend {
    pub kind: RecordKind,
    pub buckets: Buckets,
    pub top: Vec<String>,
    pub chart: Vec<ChartRow>,
}

pub fn trend<R: BranchActivity>(
    kind: RecordKind,
    records: &[R],
    today: NaiveDate,
    mode: ParseMode,
) -> anyhow::Result<Trend> {
    let months = trailing_months(today, window_months(kind));
    let buckets = bucket_window(records, &months, mode)?;
    if buckets.malformed_dates > 0 {
        tracing::warn!(
            table = kind.table(),
            malformed = buckets.malformed_dates,
            "bucketed malformed dates by their raw prefix"
        );
    }
    let top = top_n(&buckets.totals, TOP_N);
    let chart = chart_rows(&buckets, &top);
    Ok(Trend {
        kind,
        buckets,
        top,
        chart,
    })
}

/// Every tab of the district dashboard, computed from one fetched activity set.
#[derive(Debug, Clone)]
pub struct DistrictReport {
    pub today: NaiveDate,
    pub branches: Vec<Branch>,
    pub labels: HashMap<String, String>,
    pub health: Vec<HealthRow>,
    pub attendance: Trend,
    pub members: Trend,
    pub finance: Trend,
    pub events: Trend,
    pub flow: Vec<FinanceFlowRow>,
    pub categories: Vec<CategoryTotal>,
}

impl DistrictReport {
    pub fn build(
        branches: Vec<Branch>,
        activity: &ActivitySet,
        today: NaiveDate,
        mode: ParseMode,
    ) -> anyhow::Result<Self> {
        let flow_months = trailing_months(today, window_months(RecordKind::Finance));
        let report = DistrictReport {
            today,
            labels: branch_labels(&branches),
            health: health_rows(&branches, activity, today, mode)?,
            attendance: trend(RecordKind::Attendance, &activity.attendance, today, mode)?,
            members: trend(RecordKind::Members, &activity.members, today, mode)?,
            finance: trend(RecordKind::Finance, &activity.finance, today, mode)?,
            events: trend(RecordKind::Events, &activity.events, today, mode)?,
            flow: monthly_flow(&activity.finance, &flow_months, mode)?,
            categories: category_totals(&activity.finance),
            branches,
        };
        tracing::debug!(
            branches = report.branches.len(),
            malformed = report.malformed_dates(),
            "district report built"
        );
        Ok(report)
    }

    pub fn trend_for(&self, kind: RecordKind) -> &Trend {
        match kind {
            RecordKind::Attendance => &self.attendance,
            RecordKind::Members => &self.members,
            RecordKind::Finance => &self.finance,
            RecordKind::Events => &self.events,
        }
    }

    pub fn label<'a>(&'a self, branch_id: &'a str) -> &'a str {
        self.labels
            .get(branch_id)
            .map(String::as_str)
            .unwrap_or(branch_id)
    }

    pub fn malformed_dates(&self) -> usize {
        RecordKind::ALL
            .iter()
            .map(|kind| self.trend_for(*kind).buckets.malformed_dates)
            .sum()
    }

    pub fn table(&self, tab: ReportTab) -> Table {
        let trend_table = |kind: RecordKind| {
            let trend = self.trend_for(kind);
            Table::trend(tab, &trend.chart, &trend.top, &self.labels)
        };
        match tab {
            ReportTab::Attendance => trend_table(RecordKind::Attendance),
            ReportTab::Membership => trend_table(RecordKind::Members),
            ReportTab::Finance => trend_table(RecordKind::Finance),
            ReportTab::Events => trend_table(RecordKind::Events),
            ReportTab::Health => Table::health(&self.health),
            ReportTab::FinanceFlow => Table::finance_flow(&self.flow),
            ReportTab::Categories => Table::categories(&self.categories),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttendanceRecord, FinanceRecord};
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, 15).unwrap()
    }

    fn sample() -> (Vec<Branch>, ActivitySet) {
        let branches = vec![
            Branch {
                id: "b1".into(),
                name: "Central".into(),
                district: Some("north".into()),
            },
            Branch {
                id: "b2".into(),
                name: "Harbor".into(),
                district: Some("north".into()),
            },
        ];
        let visit = |branch: &str, date: &str| AttendanceRecord {
            branch_id: Some(branch.into()),
            attendance_date: date.into(),
        };
        let activity = ActivitySet {
            attendance: vec![
                visit("b2", "2025-08-03"),
                visit("b2", "2025-08-10"),
                visit("b1", "2025-07-06"),
                visit("b1", "2025-08-2x"),
            ],
            finance: vec![FinanceRecord {
                branch_id: Some("b1".into()),
                transaction_date: "2025-08-01".into(),
                amount: dec!(250),
                kind: "offering".into(),
                category: "offering".into(),
            }],
            ..ActivitySet::default()
        };
        (branches, activity)
    }

    #[test]
    fn floors_cover_trend_windows() {
        let floors = floors(today());
        assert_eq!(floors.attendance, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(floors.members, NaiveDate::from_ymd_opt(2024, 9, 1).unwrap());
        assert_eq!(floors.events, floors.finance);
    }

    #[test]
    fn report_builds_every_tab() {
        let (branches, activity) = sample();
        let report = DistrictReport::build(branches, &activity, today(), ParseMode::Lenient).unwrap();

        assert_eq!(report.attendance.chart.len(), 6);
        assert_eq!(report.members.chart.len(), 12);
        assert_eq!(report.attendance.top, vec!["b2", "b1"]);
        assert_eq!(report.malformed_dates(), 1);
        assert_eq!(report.label("b2"), "Harbor");
        assert_eq!(report.label("ghost"), "ghost");

        let table = report.table(ReportTab::Attendance);
        assert_eq!(table.headers, vec!["month", "Harbor", "Central"]);
        assert_eq!(table.rows.len(), 6);

        let flow = report.table(ReportTab::FinanceFlow);
        assert_eq!(flow.rows.len(), 12);
        assert_eq!(report.flow.last().unwrap().income, dec!(250));
    }

    #[test]
    fn finance_tab_exports_exact_totals() {
        let (branches, mut activity) = sample();
        let gift = |amount| FinanceRecord {
            branch_id: Some("b2".into()),
            transaction_date: "2025-08-09".into(),
            amount,
            kind: "income".into(),
            category: "offering".into(),
        };
        activity.finance = vec![gift(dec!(0.10)), gift(dec!(0.20))];
        let report = DistrictReport::build(branches, &activity, today(), ParseMode::Lenient).unwrap();

        let csv = crate::export::to_csv(&report.table(ReportTab::Finance)).unwrap();
        let csv = String::from_utf8(csv).unwrap();
        assert!(csv.starts_with("month,Harbor\n"));
        assert!(csv.ends_with("2025-08,0.30\n"));
    }

    #[test]
    fn strict_mode_fails_the_whole_report() {
        let (branches, activity) = sample();
        assert!(DistrictReport::build(branches, &activity, today(), ParseMode::Strict).is_err());
    }
}
