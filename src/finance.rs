use std::collections::{BTreeMap, HashMap};

use anyhow::bail;
use rust_decimal::Decimal;

use crate::buckets::{month_key, ParseMode};
use crate::models::{CategoryTotal, FinanceFlowRow, FinanceRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinanceKind {
    Income,
    Expense,
}

impl FinanceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinanceKind::Income => "income",
            FinanceKind::Expense => "expense",
        }
    }

    /// Strict mode only accepts the enumerated names. Lenient mode treats any
    /// value mentioning "expense" or "out" as an expense.
    pub fn classify(raw: &str, mode: ParseMode) -> anyhow::Result<Self> {
        let value = raw.trim().to_ascii_lowercase();
        match value.as_str() {
            "income" => return Ok(FinanceKind::Income),
            "expense" => return Ok(FinanceKind::Expense),
            _ => {}
        }
        match mode {
            ParseMode::Strict => bail!("unknown transaction type '{raw}' (expected income or expense)"),
            ParseMode::Lenient if value.contains("expense") || value.contains("out") => {
                Ok(FinanceKind::Expense)
            }
            ParseMode::Lenient => Ok(FinanceKind::Income),
        }
    }
}

/// Income, expense and net per window month. Rows outside the window are skipped.
pub fn monthly_flow(
    records: &[FinanceRecord],
    months: &[String],
    mode: ParseMode,
) -> anyhow::Result<Vec<FinanceFlowRow>> {
    let mut flow: BTreeMap<String, (Decimal, Decimal)> = months
        .iter()
        .map(|month| (month.clone(), (Decimal::ZERO, Decimal::ZERO)))
        .collect();

    for record in records {
        let month = month_key(&record.transaction_date, mode)?.into_string();
        let Some(entry) = flow.get_mut(&month) else {
            continue;
        };
        match FinanceKind::classify(&record.kind, mode)? {
            FinanceKind::Income => entry.0 += record.amount,
            FinanceKind::Expense => entry.1 += record.amount,
        }
    }

    Ok(flow
        .into_iter()
        .map(|(month, (income, expense))| FinanceFlowRow {
            month,
            income,
            expense,
            net: income - expense,
        })
        .collect())
}

/// Sum per category, largest first. Equal totals keep first-seen order.
pub fn category_totals(records: &[FinanceRecord]) -> Vec<CategoryTotal> {
    let mut order: Vec<String> = Vec::new();
    let mut sums: HashMap<String, Decimal> = HashMap::new();

    for record in records {
        let category = match record.category.trim() {
            "" => "uncategorized",
            other => other,
        };
        match sums.get_mut(category) {
            Some(total) => *total += record.amount,
            None => {
                order.push(category.to_string());
                sums.insert(category.to_string(), record.amount);
            }
        }
    }

    let mut totals: Vec<CategoryTotal> = order
        .into_iter()
        .map(|category| {
            let total = sums.get(&category).copied().unwrap_or(Decimal::ZERO);
            CategoryTotal { category, total }
        })
        .collect();
    totals.sort_by(|a, b| b.total.cmp(&a.total));
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(date: &str, amount: Decimal, kind: &str, category: &str) -> FinanceRecord {
        FinanceRecord {
            branch_id: Some("a".into()),
            transaction_date: date.into(),
            amount,
            kind: kind.into(),
            category: category.into(),
        }
    }

    #[test]
    fn lenient_classification_uses_substrings() {
        assert_eq!(
            FinanceKind::classify("Cash Out", ParseMode::Lenient).unwrap(),
            FinanceKind::Expense
        );
        assert_eq!(
            FinanceKind::classify("ministry_expense", ParseMode::Lenient).unwrap(),
            FinanceKind::Expense
        );
        assert_eq!(
            FinanceKind::classify("donation", ParseMode::Lenient).unwrap(),
            FinanceKind::Income
        );
    }

    #[test]
    fn strict_classification_requires_known_kind() {
        assert_eq!(
            FinanceKind::classify(" Expense ", ParseMode::Strict).unwrap(),
            FinanceKind::Expense
        );
        assert!(FinanceKind::classify("payout", ParseMode::Strict).is_err());
    }

    #[test]
    fn monthly_flow_nets_income_against_expense() {
        let months = vec!["2025-01".to_string(), "2025-02".to_string()];
        let records = vec![
            record("2025-01-04", dec!(500), "income", "tithe"),
            record("2025-01-09", dec!(120.50), "expense", "utilities"),
            record("2024-12-30", dec!(999), "income", "tithe"),
        ];

        let flow = monthly_flow(&records, &months, ParseMode::Strict).unwrap();
        assert_eq!(flow.len(), 2);
        assert_eq!(flow[0].income, dec!(500));
        assert_eq!(flow[0].expense, dec!(120.50));
        assert_eq!(flow[0].net, dec!(379.50));
        assert_eq!(flow[1].net, Decimal::ZERO);
    }

    #[test]
    fn category_totals_sort_descending() {
        let records = vec![
            record("2025-01-04", dec!(20), "income", "offering"),
            record("2025-01-05", dec!(50), "income", "tithe"),
            record("2025-01-06", dec!(40), "income", "offering"),
            record("2025-01-07", dec!(5), "expense", ""),
        ];

        let totals = category_totals(&records);
        assert_eq!(totals[0].category, "offering");
        assert_eq!(totals[0].total, dec!(60));
        assert_eq!(totals[1].category, "tithe");
        assert_eq!(totals[2].category, "uncategorized");
    }
}
