use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;

use crate::models::{ActivitySet, Branch, RecordKind};

pub const BRANCHES_FILE: &str = "branches.csv";

/// CSV file name holding rows of `kind` inside an export directory.
pub fn file_name(kind: RecordKind) -> String {
    format!("{}.csv", kind.table())
}

pub fn read_rows<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut rows = Vec::new();
    for (idx, result) in reader.deserialize::<T>().enumerate() {
        // header is line 1
        let row = result.with_context(|| format!("{} line {}", path.display(), idx + 2))?;
        rows.push(row);
    }
    Ok(rows)
}

fn read_optional<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    if path.exists() {
        read_rows(path)
    } else {
        tracing::debug!(path = %path.display(), "no file, treating as empty");
        Ok(Vec::new())
    }
}

/// Loads a directory of table dumps. `branches.csv` is required, the activity
/// files are optional.
pub fn load_dir(dir: &Path) -> anyhow::Result<(Vec<Branch>, ActivitySet)> {
    let branches: Vec<Branch> = read_rows(&dir.join(BRANCHES_FILE))?;
    let activity = ActivitySet {
        attendance: read_optional(&dir.join(file_name(RecordKind::Attendance)))?,
        members: read_optional(&dir.join(file_name(RecordKind::Members)))?,
        finance: read_optional(&dir.join(file_name(RecordKind::Finance)))?,
        events: read_optional(&dir.join(file_name(RecordKind::Events)))?,
    };
    tracing::info!(
        dir = %dir.display(),
        branches = branches.len(),
        attendance = activity.attendance.len(),
        members = activity.members.len(),
        finance = activity.finance.len(),
        events = activity.events.len(),
        "loaded activity files"
    );
    Ok((branches, activity))
}

/// Keeps the branches of one district (all when `district` is `None`) and
/// the activity rows that belong to them.
pub fn scope(
    branches: Vec<Branch>,
    activity: ActivitySet,
    district: Option<&str>,
    branch_ids: &[String],
) -> (Vec<Branch>, ActivitySet) {
    let branches: Vec<Branch> = branches
        .into_iter()
        .filter(|b| district.map_or(true, |d| b.district.as_deref() == Some(d)))
        .filter(|b| branch_ids.is_empty() || branch_ids.contains(&b.id))
        .collect();
    if district.is_none() && branch_ids.is_empty() {
        return (branches, activity);
    }

    let keep = |id: &Option<String>| {
        id.as_deref()
            .map_or(false, |id| branches.iter().any(|b| b.id == id))
    };
    let activity = ActivitySet {
        attendance: activity.attendance.into_iter().filter(|r| keep(&r.branch_id)).collect(),
        members: activity.members.into_iter().filter(|r| keep(&r.branch_id)).collect(),
        finance: activity.finance.into_iter().filter(|r| keep(&r.branch_id)).collect(),
        events: activity.events.into_iter().filter(|r| keep(&r.branch_id)).collect(),
    };
    (branches, activity)
}
