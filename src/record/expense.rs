//! Expense run log and the effective-view fold.
//!
//! Expense verification evidence arrives in rounds: one `ExpenseRun` per
//! reconciliation pass plus one per supplemental submission. The run log is
//! append-only; readers never consume it directly but through [`fold_runs`],
//! which projects the log into one logical row per item identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Run id reserved for the first reconciliation pass.
pub const INITIAL_RUN_ID: &str = "initial";

/// Verification status of a single expense item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpenseStatus {
    /// Item verified against the evidence without findings.
    Pass,
    /// Item failed verification.
    Fail,
    /// Item could not be failed outright but carries a risk indicator.
    RiskFlag,
}

impl ExpenseStatus {
    /// Whether this status leaves the item outstanding for re-verification.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Fail | Self::RiskFlag)
    }
}

impl fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::RiskFlag => "RISK_FLAG",
        };
        write!(f, "{}", s)
    }
}

/// Whether a run came from the first reconciliation pass or a supplemental
/// evidence submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunType {
    Initial,
    Additional,
}

/// A single verified expense line as reported by one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseItem {
    /// Natural item id (e.g. an invoice number). Items without one get a
    /// synthetic identity scoped to their run and position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Short description of the expense line.
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    pub status: ExpenseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// One append-only round of expense verification evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRun {
    pub run_id: String,
    pub run_type: RunType,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<ExpenseItem>,
}

impl ExpenseRun {
    /// Create the first reconciliation run with the reserved id.
    pub fn initial(items: Vec<ExpenseItem>) -> Self {
        Self {
            run_id: INITIAL_RUN_ID.to_string(),
            run_type: RunType::Initial,
            created_at: Utc::now(),
            items,
        }
    }

    /// Create a supplemental run with a fresh unique id.
    pub fn additional(items: Vec<ExpenseItem>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            run_type: RunType::Additional,
            created_at: Utc::now(),
            items,
        }
    }
}

/// Identity of one expense item across runs: the natural id when present,
/// otherwise a synthetic key scoped to (run index, position).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExpenseKey {
    Natural(String),
    Synthetic { run: usize, position: usize },
}

/// One row of the folded expense view.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveExpenseItem {
    pub item: ExpenseItem,
    /// Id of the run that last wrote this row.
    pub source_run: String,
}

/// Fold the append-only run log into the effective expense view.
///
/// Runs are consumed oldest to newest. A repeated identity overwrites the
/// existing row in place, so a supplemental round that re-verifies a subset
/// of previously flagged items updates their verdicts without reshuffling
/// table positions. New identities append.
///
/// # Examples
///
/// ```
/// use scrutiny::record::expense::{fold_runs, ExpenseItem, ExpenseRun, ExpenseStatus};
///
/// let first = ExpenseRun::initial(vec![ExpenseItem {
///     id: Some("inv-7".into()),
///     label: "Roof repair".into(),
///     amount: Some(1200.0),
///     status: ExpenseStatus::Fail,
///     note: None,
/// }]);
/// let second = ExpenseRun::additional(vec![ExpenseItem {
///     id: Some("inv-7".into()),
///     label: "Roof repair".into(),
///     amount: Some(1200.0),
///     status: ExpenseStatus::Pass,
///     note: None,
/// }]);
///
/// let effective = fold_runs(&[first, second.clone()]);
/// assert_eq!(effective.len(), 1);
/// assert_eq!(effective[0].item.status, ExpenseStatus::Pass);
/// assert_eq!(effective[0].source_run, second.run_id);
/// ```
pub fn fold_runs(runs: &[ExpenseRun]) -> Vec<EffectiveExpenseItem> {
    let mut rows: Vec<EffectiveExpenseItem> = Vec::new();
    let mut positions: HashMap<ExpenseKey, usize> = HashMap::new();

    for (run_idx, run) in runs.iter().enumerate() {
        for (pos, item) in run.items.iter().enumerate() {
            let key = match &item.id {
                Some(id) => ExpenseKey::Natural(id.clone()),
                None => ExpenseKey::Synthetic {
                    run: run_idx,
                    position: pos,
                },
            };
            let row = EffectiveExpenseItem {
                item: item.clone(),
                source_run: run.run_id.clone(),
            };
            match positions.get(&key) {
                Some(&existing) => rows[existing] = row,
                None => {
                    positions.insert(key, rows.len());
                    rows.push(row);
                }
            }
        }
    }

    rows
}
