use std::collections::HashMap;

use anyhow::bail;
use chrono::{Duration, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::buckets::{parse_date, ParseMode};
use crate::models::{ActivitySet, Branch, BranchActivity, BranchMetrics, HealthRow};

pub const HEALTH_WINDOW_DAYS: i64 = 30;

const ATTENDANCE_WEIGHT: f64 = 0.4;
const MEMBERS_WEIGHT: f64 = 0.2;
const EVENTS_WEIGHT: f64 = 0.2;
const FINANCE_WEIGHT: f64 = 0.2;

pub fn cutoff_date(today: NaiveDate, since_days: i64) -> NaiveDate {
    today - Duration::days(since_days.max(1))
}

/// Rolling 30-day activity for every branch in `branches`, in that order.
/// Rows for branches outside the set are ignored.
pub fn branch_metrics(
    branches: &[Branch],
    activity: &ActivitySet,
    today: NaiveDate,
    mode: ParseMode,
) -> anyhow::Result<Vec<BranchMetrics>> {
    let since = cutoff_date(today, HEALTH_WINDOW_DAYS);
    let mut metrics: Vec<BranchMetrics> = branches
        .iter()
        .map(|branch| BranchMetrics {
            branch_id: branch.id.clone(),
            branch: branch.name.clone(),
            ..BranchMetrics::default()
        })
        .collect();
    let index: HashMap<String, usize> = branches
        .iter()
        .enumerate()
        .map(|(pos, branch)| (branch.id.clone(), pos))
        .collect();

    for pos in recent_rows(&activity.attendance, &index, since, mode)? {
        metrics[pos].attendance_30d += 1;
    }
    for pos in recent_rows(&activity.members, &index, since, mode)? {
        metrics[pos].new_members_30d += 1;
    }
    for pos in recent_rows(&activity.events, &index, since, mode)? {
        metrics[pos].events_30d += 1;
    }

    let recent_finance = activity
        .finance
        .iter()
        .zip(recent_mask(&activity.finance, &index, since, mode)?);
    for (record, slot) in recent_finance {
        if let Some(pos) = slot {
            metrics[pos].finance_30d += record.amount;
        }
    }

    Ok(metrics)
}

fn recent_rows<R: BranchActivity>(
    records: &[R],
    index: &HashMap<String, usize>,
    since: NaiveDate,
    mode: ParseMode,
) -> anyhow::Result<Vec<usize>> {
    Ok(recent_mask(records, index, since, mode)?
        .into_iter()
        .flatten()
        .collect())
}

/// Branch slot for each record that falls inside the window.
fn recent_mask<R: BranchActivity>(
    records: &[R],
    index: &HashMap<String, usize>,
    since: NaiveDate,
    mode: ParseMode,
) -> anyhow::Result<Vec<Option<usize>>> {
    let mut mask = Vec::with_capacity(records.len());
    for record in records {
        let date = match parse_date(record.date_str()) {
            Some(date) => date,
            None if mode == ParseMode::Strict => {
                bail!("unparseable date '{}'", record.date_str())
            }
            None => {
                mask.push(None);
                continue;
            }
        };
        let slot = if date >= since {
            record
                .branch_id()
                .and_then(|id| index.get(id))
                .copied()
        } else {
            None
        };
        mask.push(slot);
    }
    Ok(mask)
}

/// Weighted 0-100 score per branch, highest first.
pub fn score_branches(metrics: &[BranchMetrics]) -> Vec<HealthRow> {
    let max_attendance = metrics.iter().map(|m| m.attendance_30d).max().unwrap_or(0).max(1);
    let max_members = metrics.iter().map(|m| m.new_members_30d).max().unwrap_or(0).max(1);
    let max_events = metrics.iter().map(|m| m.events_30d).max().unwrap_or(0).max(1);
    let max_finance = metrics
        .iter()
        .map(|m| m.finance_30d)
        .max()
        .unwrap_or(Decimal::ZERO)
        .max(Decimal::ONE)
        .to_f64()
        .unwrap_or(1.0);

    let mut rows: Vec<HealthRow> = metrics
        .iter()
        .map(|m| {
            let finance = m.finance_30d.to_f64().unwrap_or(0.0);
            let weighted = ATTENDANCE_WEIGHT * ratio(m.attendance_30d, max_attendance)
                + MEMBERS_WEIGHT * ratio(m.new_members_30d, max_members)
                + EVENTS_WEIGHT * ratio(m.events_30d, max_events)
                + FINANCE_WEIGHT * (finance / max_finance);
            let mut score = (100.0 * weighted).round();
            if !score.is_finite() {
                score = 0.0;
            }
            HealthRow {
                branch: m.branch.clone(),
                attendance_30d: m.attendance_30d,
                new_members_30d: m.new_members_30d,
                events_30d: m.events_30d,
                finance_30d: m.finance_30d,
                score: score.clamp(0.0, 100.0) as u8,
            }
        })
        .collect();

    rows.sort_by(|a, b| b.score.cmp(&a.score));
    rows
}

fn ratio(value: u32, max: u32) -> f64 {
    value as f64 / max as f64
}

pub fn health_rows(
    branches: &[Branch],
    activity: &ActivitySet,
    today: NaiveDate,
    mode: ParseMode,
) -> anyhow::Result<Vec<HealthRow>> {
    let metrics = branch_metrics(branches, activity, today, mode)?;
    Ok(score_branches(&metrics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttendanceRecord, EventRecord, FinanceRecord, MemberRecord};
    use rust_decimal_macros::dec;

    fn metrics(name: &str, a: u32, m: u32, e: u32, f: Decimal) -> BranchMetrics {
        BranchMetrics {
            branch_id: name.to_lowercase(),
            branch: name.to_string(),
            attendance_30d: a,
            new_members_30d: m,
            events_30d: e,
            finance_30d: f,
        }
    }

    fn branch(id: &str, name: &str) -> Branch {
        Branch {
            id: id.to_string(),
            name: name.to_string(),
            district: None,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()
    }

    #[test]
    fn cutoff_date_respects_since_days() {
        let cutoff = cutoff_date(today(), 14);
        assert_eq!(cutoff, NaiveDate::from_ymd_opt(2025, 6, 16).unwrap());
    }

    #[test]
    fn scores_follow_fixed_weights() {
        let rows = score_branches(&[
            metrics("B", 5, 1, 1, dec!(50)),
            metrics("A", 10, 2, 1, dec!(100)),
        ]);

        assert_eq!(rows[0].branch, "A");
        assert_eq!(rows[0].score, 100);
        // 0.4*0.5 + 0.2*0.5 + 0.2*1 + 0.2*0.5
        assert_eq!(rows[1].branch, "B");
        assert_eq!(rows[1].score, 60);
    }

    #[test]
    fn idle_branches_score_zero() {
        let rows = score_branches(&[metrics("Quiet", 0, 0, 0, Decimal::ZERO)]);
        assert_eq!(rows[0].score, 0);

        let rows = score_branches(&[
            metrics("Quiet", 0, 0, 0, Decimal::ZERO),
            metrics("Busy", 40, 3, 2, dec!(900)),
        ]);
        assert_eq!(rows[0].score, 100);
        assert_eq!(rows[1].score, 0);
    }

    #[test]
    fn scores_stay_in_range() {
        let rows = score_branches(&[
            metrics("A", 3, 0, 9, dec!(0.40)),
            metrics("B", 0, 7, 0, dec!(12000)),
            metrics("C", 1, 1, 1, dec!(-50)),
        ]);
        assert!(rows.iter().all(|row| row.score <= 100));
        assert!(rows.windows(2).all(|pair| pair[0].score >= pair[1].score));
    }

    #[test]
    fn metrics_only_count_the_last_thirty_days() {
        let branches = vec![branch("a", "Central"), branch("b", "Harbor")];
        let activity = ActivitySet {
            attendance: vec![
                AttendanceRecord {
                    branch_id: Some("a".into()),
                    attendance_date: "2025-06-29".into(),
                },
                AttendanceRecord {
                    branch_id: Some("a".into()),
                    attendance_date: "2025-04-01".into(),
                },
                AttendanceRecord {
                    branch_id: Some("b".into()),
                    attendance_date: "bad".into(),
                },
            ],
            members: vec![MemberRecord {
                branch_id: Some("b".into()),
                date_joined: "2025-06-10".into(),
            }],
            finance: vec![
                FinanceRecord {
                    branch_id: Some("a".into()),
                    transaction_date: "2025-06-05".into(),
                    amount: dec!(75.25),
                    kind: "income".into(),
                    category: "offering".into(),
                },
                FinanceRecord {
                    branch_id: Some("zz".into()),
                    transaction_date: "2025-06-05".into(),
                    amount: dec!(10),
                    kind: "income".into(),
                    category: "offering".into(),
                },
            ],
            events: vec![EventRecord {
                branch_id: None,
                event_date: "2025-06-20".into(),
            }],
        };

        let metrics = branch_metrics(&branches, &activity, today(), ParseMode::Lenient).unwrap();
        assert_eq!(metrics[0].attendance_30d, 1);
        assert_eq!(metrics[0].finance_30d, dec!(75.25));
        assert_eq!(metrics[1].attendance_30d, 0);
        assert_eq!(metrics[1].new_members_30d, 1);
        assert_eq!(metrics.iter().map(|m| m.events_30d).sum::<u32>(), 0);

        assert!(branch_metrics(&branches, &activity, today(), ParseMode::Strict).is_err());
    }

    #[test]
    fn health_rows_are_repeatable() {
        let branches = vec![branch("a", "Central")];
        let activity = ActivitySet {
            attendance: vec![AttendanceRecord {
                branch_id: Some("a".into()),
                attendance_date: "2025-06-29".into(),
            }],
            ..ActivitySet::default()
        };
        let first = health_rows(&branches, &activity, today(), ParseMode::Strict).unwrap();
        let second = health_rows(&branches, &activity, today(), ParseMode::Strict).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].score, 40);
    }
}
