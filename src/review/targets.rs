//! Target derivation for scoped re-verification.
//!
//! A target names one outstanding item the oracle should look at again.
//! Targets are ephemeral: derived at call time from the record and the
//! triage list, never persisted — only the resulting resolution table is.

use serde::{Deserialize, Serialize};

use crate::record::{AuditRecord, Domain, ItemKey};
use crate::review::triage::TriageItem;

/// Where a target came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetSource {
    /// Derived from the record by the per-domain rules.
    System,
    /// Carried over from a user-flagged triage item.
    Triage,
}

/// One item eligible for targeted re-verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub domain: Domain,
    pub item_id: String,
    pub description: String,
    pub source: TargetSource,
}

impl Target {
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.domain, self.item_id.clone())
    }

    fn system(domain: Domain, item_id: impl Into<String>, description: String) -> Self {
        Self {
            domain,
            item_id: item_id.into(),
            description,
            source: TargetSource::System,
        }
    }
}

/// Derive the ordered target list for a record.
///
/// Deterministic: identical inputs yield an identical ordered list. Domains
/// are visited in a fixed order (levy, expenses, balance-sheet, compliance),
/// then triage-sourced targets are appended, skipping any identity a
/// system-derived target already covers.
///
/// An empty result means nothing is outstanding; callers requesting a
/// targeted re-verify must treat that as an error, not a silent no-op.
pub fn build_targets(record: &AuditRecord, triage: &[TriageItem]) -> Vec<Target> {
    let mut targets = Vec::new();

    // levy: only a non-zero variance is outstanding
    if let Some(levy) = &record.levy {
        if let Some(variance) = levy.variance {
            if variance != 0.0 {
                targets.push(Target::system(
                    Domain::Levy,
                    "variance",
                    format!("Levy variance of {:.2} outstanding", variance),
                ));
            }
        }
    }

    // expenses: folded view in its stable order, positional ids
    for (position, effective) in record.effective_expenses().iter().enumerate() {
        if effective.item.status.is_outstanding() {
            targets.push(Target::system(
                Domain::Expenses,
                format!("expense-{}", position),
                format!(
                    "Expense item '{}' has status {}",
                    effective.item.label, effective.item.status
                ),
            ));
        }
    }

    // balance-sheet: checked items that did not verify
    if let Some(report) = &record.balance_sheet {
        for item in &report.items {
            if let Some(status) = item.status {
                if !status.is_verified() {
                    targets.push(Target::system(
                        Domain::BalanceSheet,
                        item.item_id(),
                        format!("Balance-sheet item '{}' did not verify", item.name),
                    ));
                }
            }
        }
    }

    // compliance: only a non-zero tax variance is outstanding
    if let Some(compliance) = &record.compliance {
        if let Some(variance) = compliance.tax_variance {
            if variance != 0.0 {
                targets.push(Target::system(
                    Domain::Compliance,
                    "tax-variance",
                    format!("Tax variance of {:.2} outstanding", variance),
                ));
            }
        }
    }

    // triage-sourced targets last; system wins on identity collisions
    for item in triage {
        let key = item.key();
        if targets.iter().any(|t| t.key() == key) {
            continue;
        }
        targets.push(Target {
            domain: item.domain,
            item_id: item.item_id.clone(),
            description: triage_description(item),
            source: TargetSource::Triage,
        });
    }

    targets
}

fn triage_description(item: &TriageItem) -> String {
    match (&item.title, &item.comment) {
        (title, Some(comment)) if !title.is_empty() && !comment.is_empty() => {
            format!("{}: {}", title, comment)
        }
        (title, _) if !title.is_empty() => title.clone(),
        _ => "user flagged".to_string(),
    }
}
