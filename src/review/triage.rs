//! The triage watch list and its reconciliation against the record.
//!
//! Triage items track unresolved or user-flagged issues. After every phase
//! the list is reconciled: items whose underlying condition has become
//! resolved are dropped automatically — regardless of who created them —
//! and newly derived system items are appended unless already tracked.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::record::expense::ExpenseStatus;
use crate::record::{AuditRecord, Domain, ItemKey};
use crate::review::targets::build_targets;

/// Who created a triage item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriageSource {
    System,
    User,
}

/// Severity of a triage item, ordered most to least critical.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum TriageSeverity {
    Error,
    #[default]
    Warning,
    Info,
}

impl std::fmt::Display for TriageSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        };
        write!(f, "{}", s)
    }
}

/// One entry of the watch list. Identity is `(domain, item_id)`; at most
/// one active item exists per identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageItem {
    pub id: Uuid,
    pub domain: Domain,
    pub item_id: String,
    pub title: String,
    pub severity: TriageSeverity,
    pub source: TriageSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TriageItem {
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.domain, self.item_id.clone())
    }

    fn new(
        domain: Domain,
        item_id: impl Into<String>,
        title: impl Into<String>,
        severity: TriageSeverity,
        source: TriageSource,
        comment: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            domain,
            item_id: item_id.into(),
            title: title.into(),
            severity,
            source,
            comment,
            created_at: Utc::now(),
        }
    }

    /// Build a system-derived item.
    pub fn system(
        domain: Domain,
        item_id: impl Into<String>,
        title: impl Into<String>,
        severity: TriageSeverity,
    ) -> Self {
        Self::new(domain, item_id, title, severity, TriageSource::System, None)
    }

    /// Build a user-flagged item.
    pub fn user_flag(
        domain: Domain,
        item_id: impl Into<String>,
        title: impl Into<String>,
        severity: TriageSeverity,
        comment: Option<String>,
    ) -> Self {
        Self::new(domain, item_id, title, severity, TriageSource::User, comment)
    }
}

/// Compute the identity keys whose underlying condition is resolved.
///
/// This is the dual of the target selector's inclusion rules, with one
/// deliberate asymmetry: a missing levy or compliance variance counts as
/// resolved, while missing balance-sheet or expense data means the phase
/// has not run yet and resolves nothing. Expense and balance-sheet keys are
/// therefore only added positively, for items present with a passing
/// status.
pub fn resolved_keys(record: &AuditRecord) -> HashSet<ItemKey> {
    let mut keys = HashSet::new();

    let levy_resolved = match record.levy.as_ref().and_then(|l| l.variance) {
        None => true,
        Some(v) => v == 0.0,
    };
    if levy_resolved {
        keys.insert(ItemKey::new(Domain::Levy, "variance"));
    }

    let compliance_resolved = match record.compliance.as_ref().and_then(|c| c.tax_variance) {
        None => true,
        Some(v) => v == 0.0,
    };
    if compliance_resolved {
        keys.insert(ItemKey::new(Domain::Compliance, "tax-variance"));
    }

    for (position, effective) in record.effective_expenses().iter().enumerate() {
        if !effective.item.status.is_outstanding() {
            keys.insert(ItemKey::new(Domain::Expenses, format!("expense-{}", position)));
        }
    }

    if let Some(report) = &record.balance_sheet {
        for item in &report.items {
            if item.status.is_some_and(|s| s.is_verified()) {
                keys.insert(ItemKey::new(Domain::BalanceSheet, item.item_id()));
            }
        }
    }

    keys
}

/// Derive fresh system triage items from the current record state.
///
/// Uses the target selector's system rules so triage and target derivation
/// can never drift apart. Expense items failing outright are raised at
/// error severity; everything else enters as a warning.
pub fn derive_system_items(record: &AuditRecord) -> Vec<TriageItem> {
    let folded = record.effective_expenses();

    build_targets(record, &[])
        .into_iter()
        .map(|target| {
            let severity = match target.domain {
                Domain::Expenses => {
                    let failed = target
                        .item_id
                        .strip_prefix("expense-")
                        .and_then(|p| p.parse::<usize>().ok())
                        .and_then(|p| folded.get(p))
                        .is_some_and(|e| e.item.status == ExpenseStatus::Fail);
                    if failed {
                        TriageSeverity::Error
                    } else {
                        TriageSeverity::Warning
                    }
                }
                _ => TriageSeverity::Warning,
            };
            TriageItem::system(target.domain, target.item_id, target.description, severity)
        })
        .collect()
}

/// Reconcile the watch list against the record.
///
/// 1. Drop every existing item whose identity is resolved — user-sourced
///    items included; auto-resolution is independent of who flagged.
/// 2. Append each new system item unless an identity-equal survivor exists
///    or its key is itself resolved.
///
/// Idempotent: applying the function twice with the same inputs produces no
/// further change, duplicate insertion or oscillation.
pub fn reconcile(
    existing: &[TriageItem],
    new_system: &[TriageItem],
    record: &AuditRecord,
) -> Vec<TriageItem> {
    let resolved = resolved_keys(record);

    let mut reconciled: Vec<TriageItem> = existing
        .iter()
        .filter(|item| !resolved.contains(&item.key()))
        .cloned()
        .collect();

    for item in new_system {
        let key = item.key();
        if resolved.contains(&key) {
            continue;
        }
        if reconciled.iter().any(|existing| existing.key() == key) {
            continue;
        }
        reconciled.push(item.clone());
    }

    reconciled
}

/// Reconcile an existing watch list against the record, deriving the fresh
/// system items internally. Called after every phase completion.
pub fn reconcile_triage(record: &AuditRecord, existing: &[TriageItem]) -> Vec<TriageItem> {
    reconcile(existing, &derive_system_items(record), record)
}
