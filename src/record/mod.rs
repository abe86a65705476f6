//! The audit record: the accumulator for one whole review.
//!
//! A record is built up additively, one phase at a time. Sections are keyed
//! by domain and replaced wholesale by their phase, with two exceptions:
//! the expense run log is append-only, and the targeted re-verify section
//! only ever accretes annotations. Phase outcomes (including failures) are
//! recorded on the record itself so callers always hold an inspectable
//! last-known-good state.

pub mod expense;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::record::expense::{EffectiveExpenseItem, ExpenseRun, fold_runs};
use crate::review::resolution::UserResolution;
use crate::review::triage::TriageItem;
use crate::util::normalize_name;

/// Fund used for balance-sheet item identity when the oracle reported none.
pub const DEFAULT_FUND: &str = "general";

/// Review domains a section, triage item or target can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
    Levy,
    Expenses,
    BalanceSheet,
    Compliance,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Levy => "levy",
            Self::Expenses => "expenses",
            Self::BalanceSheet => "balance-sheet",
            Self::Compliance => "compliance",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Domain {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "levy" => Ok(Self::Levy),
            "expenses" => Ok(Self::Expenses),
            "balance-sheet" => Ok(Self::BalanceSheet),
            "compliance" => Ok(Self::Compliance),
            _ => anyhow::bail!(
                "Invalid domain '{}'. Valid values: levy, expenses, balance-sheet, compliance",
                s
            ),
        }
    }
}

/// Identity of one reviewable item: `(domain, item_id)`.
///
/// Triage items, targets and user resolutions all share this key space, so
/// a disposition recorded against a target automatically addresses the
/// matching triage item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub domain: Domain,
    pub item_id: String,
}

impl ItemKey {
    pub fn new(domain: Domain, item_id: impl Into<String>) -> Self {
        Self {
            domain,
            item_id: item_id.into(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.item_id)
    }
}

/// One evidence document identified during intake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeEntry {
    /// Document label as identified by the oracle.
    pub document: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Opaque evidence reference for downstream phases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

/// Registry of evidence documents produced by the intake phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntakeRegistry {
    #[serde(default)]
    pub entries: Vec<IntakeEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl IntakeRegistry {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Levy reconciliation results.
///
/// `variance` being `None` means the reconciliation never produced a figure;
/// `Some(0.0)` means it ran and balanced. The two must never be conflated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LevyReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levied_total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collected_total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl LevyReport {
    /// Whether the reconciliation has produced a variance figure at all.
    pub fn has_variance(&self) -> bool {
        self.variance.is_some()
    }
}

/// Verification status of one balance-sheet line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BalanceStatus {
    Verified,
    Deviation,
    Unclear,
}

impl BalanceStatus {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }
}

/// One balance-sheet line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheetItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fund: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    /// Absent status means the item has not been checked yet, which is
    /// distinct from a failed check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BalanceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl BalanceSheetItem {
    /// Stable identity: normalized name plus fund, `"general"` when the
    /// fund was not reported.
    pub fn item_id(&self) -> String {
        format!(
            "{}::{}",
            normalize_name(&self.name),
            self.fund.as_deref().unwrap_or(DEFAULT_FUND)
        )
    }
}

/// Balance-sheet verification results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BalanceSheetReport {
    #[serde(default)]
    pub items: Vec<BalanceSheetItem>,
}

/// Compliance check results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComplianceReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_variance: Option<f64>,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Verdict the oracle returned for one re-verified target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReverifyStatus {
    Resolved,
    Unresolved,
}

/// One row of a targeted re-verify resolution table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetResolution {
    pub domain: Domain,
    pub item_id: String,
    pub status: ReverifyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl TargetResolution {
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.domain, self.item_id.clone())
    }
}

/// One completed targeted re-verify pass, kept forever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverifyHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub target_count: usize,
    pub resolutions: Vec<TargetResolution>,
}

/// Targeted re-verify annotations: the latest resolution table, user
/// dispositions, and the append-only pass history. Never carries original
/// section data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReverifySection {
    #[serde(default)]
    pub resolutions: Vec<TargetResolution>,
    #[serde(default)]
    pub user_resolutions: Vec<UserResolution>,
    #[serde(default)]
    pub history: Vec<ReverifyHistoryEntry>,
}

/// Outcome of one attempted phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Completed,
    Failed,
}

/// One phase attempt recorded on the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRun {
    pub phase: String,
    pub status: PhaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Accumulator for one whole review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    /// Human-readable label for the review (e.g. property and period).
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intake: Option<IntakeRegistry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levy: Option<LevyReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_sheet: Option<BalanceSheetReport>,
    #[serde(default)]
    pub expense_runs: Vec<ExpenseRun>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance: Option<ComplianceReport>,
    #[serde(default)]
    pub reverify: ReverifySection,

    #[serde(default)]
    pub triage: Vec<TriageItem>,
    #[serde(default)]
    pub phase_log: Vec<PhaseRun>,
}

impl AuditRecord {
    /// Create an empty record for a new review.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: now,
            updated_at: now,
            intake: None,
            levy: None,
            balance_sheet: None,
            expense_runs: Vec::new(),
            compliance: None,
            reverify: ReverifySection::default(),
            triage: Vec::new(),
            phase_log: Vec::new(),
        }
    }

    /// Whether any expense item has been reported in any run.
    pub fn has_expense_items(&self) -> bool {
        self.expense_runs.iter().any(|run| !run.items.is_empty())
    }

    /// The folded expense view (derived, never stored).
    pub fn effective_expenses(&self) -> Vec<EffectiveExpenseItem> {
        fold_runs(&self.expense_runs)
    }

    /// Append a phase outcome and touch the update timestamp.
    pub fn record_phase(&mut self, phase: &str, status: PhaseStatus, message: Option<String>) {
        self.phase_log.push(PhaseRun {
            phase: phase.to_string(),
            status,
            message,
            timestamp: Utc::now(),
        });
        self.touch();
    }

    /// Most recent phase attempt, if any.
    pub fn last_phase_run(&self) -> Option<&PhaseRun> {
        self.phase_log.last()
    }

    /// Append one expense run to the append-only log.
    pub fn push_expense_run(&mut self, run: ExpenseRun) {
        self.expense_runs.push(run);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::expense::{ExpenseItem, ExpenseStatus};

    // =========================================
    // Section helpers
    // =========================================

    #[test]
    fn test_levy_presence_is_distinct_from_zero() {
        let unrun = LevyReport::default();
        assert!(!unrun.has_variance());

        let balanced = LevyReport {
            variance: Some(0.0),
            ..Default::default()
        };
        assert!(balanced.has_variance());
    }

    #[test]
    fn test_balance_sheet_item_id_normalizes_and_defaults_fund() {
        let item = BalanceSheetItem {
            name: "  Reserve   Fund ".into(),
            fund: None,
            amount: None,
            status: None,
            note: None,
        };
        assert_eq!(item.item_id(), "reserve fund::general");

        let funded = BalanceSheetItem {
            fund: Some("maintenance".into()),
            ..item
        };
        assert_eq!(funded.item_id(), "reserve fund::maintenance");
    }

    #[test]
    fn test_section_types_reject_unexpected_keys() {
        let raw = r#"{"variance": 12.5, "surprise": true}"#;
        assert!(serde_json::from_str::<LevyReport>(raw).is_err());

        let raw = r#"{"items": [], "extra": 1}"#;
        assert!(serde_json::from_str::<BalanceSheetReport>(raw).is_err());
    }

    // =========================================
    // AuditRecord
    // =========================================

    #[test]
    fn test_new_record_is_empty() {
        let record = AuditRecord::new("Elm Street 2025");
        assert!(record.intake.is_none());
        assert!(record.levy.is_none());
        assert!(record.expense_runs.is_empty());
        assert!(record.triage.is_empty());
        assert!(record.phase_log.is_empty());
        assert!(!record.has_expense_items());
    }

    #[test]
    fn test_record_phase_appends_and_touches() {
        let mut record = AuditRecord::new("test");
        let before = record.updated_at;
        record.record_phase("intake", PhaseStatus::Completed, None);
        record.record_phase(
            "reconciliation",
            PhaseStatus::Failed,
            Some("levy invocation timed out".into()),
        );

        assert_eq!(record.phase_log.len(), 2);
        let last = record.last_phase_run().unwrap();
        assert_eq!(last.phase, "reconciliation");
        assert_eq!(last.status, PhaseStatus::Failed);
        assert!(last.message.as_deref().unwrap().contains("timed out"));
        assert!(record.updated_at >= before);
    }

    #[test]
    fn test_effective_expenses_uses_fold() {
        let mut record = AuditRecord::new("test");
        record.push_expense_run(ExpenseRun::initial(vec![ExpenseItem {
            id: Some("g1".into()),
            label: "gardening".into(),
            amount: None,
            status: ExpenseStatus::Fail,
            note: None,
        }]));
        record.push_expense_run(ExpenseRun::additional(vec![ExpenseItem {
            id: Some("g1".into()),
            label: "gardening".into(),
            amount: None,
            status: ExpenseStatus::Pass,
            note: None,
        }]));

        let effective = record.effective_expenses();
        assert_eq!(effective.len(), 1);
        assert_eq!(effective[0].item.status, ExpenseStatus::Pass);
        assert!(record.has_expense_items());
    }

    #[test]
    fn test_record_serialization_roundtrip() {
        let mut record = AuditRecord::new("roundtrip");
        record.levy = Some(LevyReport {
            variance: Some(500.0),
            levied_total: Some(12_000.0),
            collected_total: Some(11_500.0),
            note: None,
        });
        record.record_phase("reconciliation", PhaseStatus::Completed, None);

        let json = serde_json::to_string_pretty(&record).unwrap();
        let parsed: AuditRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, parsed);
    }

    #[test]
    fn test_item_key_display() {
        let key = ItemKey::new(Domain::BalanceSheet, "reserve fund::general");
        assert_eq!(key.to_string(), "balance-sheet/reserve fund::general");
    }

    #[test]
    fn test_domain_serialization() {
        assert_eq!(
            serde_json::to_string(&Domain::BalanceSheet).unwrap(),
            "\"balance-sheet\""
        );
        let domain: Domain = serde_json::from_str("\"levy\"").unwrap();
        assert_eq!(domain, Domain::Levy);
    }
}
