use std::collections::{BTreeMap, HashMap};

use clap::ValueEnum;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Bucket key used for rows that arrive without a branch.
pub const UNASSIGNED_BRANCH: &str = "unassigned";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Branch {
    pub id: String,
    pub name: String,
    pub district: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttendanceRecord {
    pub branch_id: Option<String>,
    pub attendance_date: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberRecord {
    pub branch_id: Option<String>,
    pub date_joined: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FinanceRecord {
    pub branch_id: Option<String>,
    pub transaction_date: String,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventRecord {
    pub branch_id: Option<String>,
    pub event_date: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RecordKind {
    Attendance,
    Members,
    Finance,
    Events,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Attendance,
        RecordKind::Members,
        RecordKind::Finance,
        RecordKind::Events,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            RecordKind::Attendance => "attendance",
            RecordKind::Members => "members",
            RecordKind::Finance => "finance",
            RecordKind::Events => "events",
        }
    }

    pub fn date_column(&self) -> &'static str {
        match self {
            RecordKind::Attendance => "attendance_date",
            RecordKind::Members => "date_joined",
            RecordKind::Finance => "transaction_date",
            RecordKind::Events => "event_date",
        }
    }
}

/// A dated row owned by a branch. Counted records weigh 1, finance rows weigh
/// their exact amount.
pub trait BranchActivity {
    fn branch_id(&self) -> Option<&str>;
    fn date_str(&self) -> &str;

    fn weight(&self) -> Decimal {
        Decimal::ONE
    }

    fn branch_key(&self) -> &str {
        self.branch_id().unwrap_or(UNASSIGNED_BRANCH)
    }
}

impl BranchActivity for AttendanceRecord {
    fn branch_id(&self) -> Option<&str> {
        self.branch_id.as_deref()
    }

    fn date_str(&self) -> &str {
        &self.attendance_date
    }
}

impl BranchActivity for MemberRecord {
    fn branch_id(&self) -> Option<&str> {
        self.branch_id.as_deref()
    }

    fn date_str(&self) -> &str {
        &self.date_joined
    }
}

impl BranchActivity for FinanceRecord {
    fn branch_id(&self) -> Option<&str> {
        self.branch_id.as_deref()
    }

    fn date_str(&self) -> &str {
        &self.transaction_date
    }

    fn weight(&self) -> Decimal {
        self.amount
    }
}

impl BranchActivity for EventRecord {
    fn branch_id(&self) -> Option<&str> {
        self.branch_id.as_deref()
    }

    fn date_str(&self) -> &str {
        &self.event_date
    }
}

/// Everything fetched for one report run.
#[derive(Debug, Clone, Default)]
pub struct ActivitySet {
    pub attendance: Vec<AttendanceRecord>,
    pub members: Vec<MemberRecord>,
    pub finance: Vec<FinanceRecord>,
    pub events: Vec<EventRecord>,
}

/// Per-branch running totals that remember the order branches were first seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BranchTotals {
    order: Vec<String>,
    totals: HashMap<String, Decimal>,
}

impl BranchTotals {
    pub fn add(&mut self, branch_id: &str, amount: Decimal) {
        match self.totals.get_mut(branch_id) {
            Some(total) => *total += amount,
            None => {
                self.order.push(branch_id.to_string());
                self.totals.insert(branch_id.to_string(), amount);
            }
        }
    }

    pub fn get(&self, branch_id: &str) -> Decimal {
        self.totals.get(branch_id).copied().unwrap_or_default()
    }

    /// Entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> + '_ {
        self.order
            .iter()
            .map(|id| (id.as_str(), self.totals.get(id).copied().unwrap_or_default()))
    }
}

/// `"YYYY-MM" -> branch_id -> total`.
pub type MonthBucketMap = BTreeMap<String, BTreeMap<String, Decimal>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BranchMetrics {
    pub branch_id: String,
    pub branch: String,
    pub attendance_30d: u32,
    pub new_members_30d: u32,
    pub events_30d: u32,
    pub finance_30d: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthRow {
    pub branch: String,
    pub attendance_30d: u32,
    pub new_members_30d: u32,
    pub events_30d: u32,
    pub finance_30d: Decimal,
    pub score: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinanceFlowRow {
    pub month: String,
    pub income: Decimal,
    pub expense: Decimal,
    pub net: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryTotal {
    pub category: String,
    pub total: Decimal,
}

/// Lookup from branch id to display label.
pub fn branch_labels(branches: &[Branch]) -> HashMap<String, String> {
    branches
        .iter()
        .map(|branch| (branch.id.clone(), branch.name.clone()))
        .collect()
}
