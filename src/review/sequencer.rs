//! Phase sequencing: which phase does this record need next?

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::record::AuditRecord;

/// Phase token returned by [`next_phase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewPhase {
    Intake,
    Reconciliation,
    TargetedReverify,
}

impl fmt::Display for ReviewPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Intake => "intake",
            Self::Reconciliation => "reconciliation",
            Self::TargetedReverify => "targeted-reverify",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ReviewPhase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "intake" => Ok(Self::Intake),
            "reconciliation" => Ok(Self::Reconciliation),
            "targeted-reverify" | "reverify" => Ok(Self::TargetedReverify),
            _ => anyhow::bail!(
                "Invalid phase '{}'. Valid values: intake, reconciliation, targeted-reverify",
                s
            ),
        }
    }
}

/// Decide the next phase for a record. First matching rule wins:
///
/// 1. Intake registry missing or empty → `Intake`.
/// 2. No levy figure, no balance-sheet items, no expense items →
///    `Reconciliation`.
/// 3. Compliance section absent → `Reconciliation`.
/// 4. Otherwise → `TargetedReverify`.
///
/// There is no terminal state: a fully reconciled record can always re-enter
/// targeted re-verification. Audits are living documents.
///
/// The levy check is value presence (`variance.is_some()`), never `!= 0`: a
/// real zero variance and "reconciliation never ran" must not be conflated.
pub fn next_phase(record: &AuditRecord) -> ReviewPhase {
    let intake_empty = record.intake.as_ref().is_none_or(|i| i.is_empty());
    if intake_empty {
        return ReviewPhase::Intake;
    }

    let levy_present = record.levy.as_ref().is_some_and(|l| l.has_variance());
    let balance_present = record
        .balance_sheet
        .as_ref()
        .is_some_and(|b| !b.items.is_empty());
    if !levy_present && !balance_present && !record.has_expense_items() {
        return ReviewPhase::Reconciliation;
    }

    if record.compliance.is_none() {
        return ReviewPhase::Reconciliation;
    }

    ReviewPhase::TargetedReverify
}
