use rust_decimal::Decimal;

use crate::buckets::Buckets;
use crate::models::BranchTotals;

/// Number of branches kept for charts.
pub const TOP_N: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct ChartRow {
    pub month: String,
    pub values: Vec<Decimal>,
}

/// Branch ids by descending total. Ties keep first-seen order.
pub fn top_n(totals: &BranchTotals, n: usize) -> Vec<String> {
    let mut entries: Vec<(&str, Decimal)> = totals.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    entries
        .into_iter()
        .take(n)
        .map(|(id, _)| id.to_string())
        .collect()
}

/// One row per bucketed month with a value for each selected branch.
pub fn chart_rows(buckets: &Buckets, top: &[String]) -> Vec<ChartRow> {
    buckets
        .by_month
        .iter()
        .map(|(month, per_branch)| ChartRow {
            month: month.clone(),
            values: top
                .iter()
                .map(|id| per_branch.get(id).copied().unwrap_or_default())
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buckets::{bucket_window, trailing_months, ParseMode};
    use crate::models::AttendanceRecord;
    use chrono::NaiveDate;

    fn totals(entries: &[(&str, i64)]) -> BranchTotals {
        let mut totals = BranchTotals::default();
        for (id, amount) in entries {
            totals.add(id, Decimal::from(*amount));
        }
        totals
    }

    #[test]
    fn never_returns_more_than_limit() {
        let many = totals(&[
            ("a", 1),
            ("b", 7),
            ("c", 3),
            ("d", 9),
            ("e", 2),
            ("f", 5),
            ("g", 4),
        ]);
        assert_eq!(top_n(&many, TOP_N), vec!["d", "b", "f", "g", "c"]);
    }

    #[test]
    fn fewer_branches_are_returned_without_padding() {
        let few = totals(&[("a", 1), ("b", 2)]);
        assert_eq!(top_n(&few, TOP_N), vec!["b", "a"]);
        assert!(top_n(&BranchTotals::default(), TOP_N).is_empty());
    }

    #[test]
    fn ties_keep_insertion_order() {
        let tied = totals(&[("z", 4), ("m", 4), ("a", 4), ("q", 6)]);
        assert_eq!(top_n(&tied, TOP_N), vec!["q", "z", "m", "a"]);
    }

    #[test]
    fn chart_rows_zero_fill_quiet_months() {
        let rows = vec![AttendanceRecord {
            branch_id: Some("A".into()),
            attendance_date: "2025-03-02".into(),
        }];
        let today = NaiveDate::from_ymd_opt(2025, 3, 20).unwrap();
        let months = trailing_months(today, 3);
        let buckets = bucket_window(&rows, &months, ParseMode::Strict).unwrap();
        let top = top_n(&buckets.totals, TOP_N);

        let chart = chart_rows(&buckets, &top);
        assert_eq!(chart.len(), 3);
        assert_eq!(chart[0].values, vec![Decimal::ZERO]);
        assert_eq!(chart[2].month, "2025-03");
        assert_eq!(chart[2].values, vec![Decimal::ONE]);
    }
}
