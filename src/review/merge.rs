//! Committing oracle phase outputs into the record.
//!
//! Every merge function is all-or-nothing: payloads are validated and
//! staged into typed sections first, and the record is only touched once
//! the whole batch has parsed. Section payloads are strongly typed and
//! reject unexpected top-level keys instead of silently accepting them.

use serde::Deserialize;
use serde_json::Value;

use crate::errors::ReviewError;
use crate::oracle::{OraclePhase, check_required_keys};
use crate::record::expense::{ExpenseItem, ExpenseRun};
use crate::record::{
    AuditRecord, BalanceSheetReport, ComplianceReport, IntakeRegistry, LevyReport,
    ReverifyHistoryEntry, TargetResolution,
};

/// One raw oracle output tagged with the phase that produced it.
#[derive(Debug, Clone)]
pub struct PhaseOutput {
    pub phase: OraclePhase,
    pub payload: Value,
}

impl PhaseOutput {
    pub fn new(phase: OraclePhase, payload: Value) -> Self {
        Self { phase, payload }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExpensePayload {
    items: Vec<ExpenseItem>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReverifyPayload {
    resolutions: Vec<TargetResolution>,
}

/// Check required keys, then deserialize the payload into its typed
/// section. Failures are oracle failures: the output was malformed, the
/// record stays untouched, and the same phase may be retried.
fn parse_section<T: serde::de::DeserializeOwned>(output: &PhaseOutput) -> Result<T, ReviewError> {
    check_required_keys(output.phase, &output.payload).map_err(|message| ReviewError::Oracle {
        phase: output.phase,
        message,
    })?;
    serde_json::from_value(output.payload.clone()).map_err(|e| ReviewError::Oracle {
        phase: output.phase,
        message: format!("malformed {} payload: {}", output.phase, e),
    })
}

/// Replace the intake registry wholesale from an intake phase output.
pub fn merge_intake(record: &mut AuditRecord, output: &PhaseOutput) -> Result<(), ReviewError> {
    if output.phase != OraclePhase::Intake {
        return Err(ReviewError::MergeConflict {
            section: output.phase.as_str().to_string(),
        });
    }
    let registry: IntakeRegistry = parse_section(output)?;
    record.intake = Some(registry);
    record.touch();
    Ok(())
}

/// Commit one reconciliation batch into the record.
///
/// The four domain outputs write disjoint sections, so the union is shallow
/// and order-independent. The whole batch is staged before the first write;
/// a duplicate or unexpected section key aborts with `MergeConflict` and
/// leaves the record unchanged. The expense output appends one new run
/// (`"initial"` on the first pass, a fresh unique id afterwards) instead of
/// overwriting.
pub fn merge_reconciliation(
    record: &mut AuditRecord,
    outputs: &[PhaseOutput],
) -> Result<(), ReviewError> {
    let mut levy: Option<LevyReport> = None;
    let mut balance_sheet: Option<BalanceSheetReport> = None;
    let mut expense_items: Option<Vec<ExpenseItem>> = None;
    let mut compliance: Option<ComplianceReport> = None;

    for output in outputs {
        match output.phase {
            OraclePhase::Levy => {
                stage(&mut levy, parse_section(output)?, "levy")?;
            }
            OraclePhase::BalanceSheet => {
                stage(&mut balance_sheet, parse_section(output)?, "balance-sheet")?;
            }
            OraclePhase::Expenses => {
                let payload: ExpensePayload = parse_section(output)?;
                stage(&mut expense_items, payload.items, "expenses")?;
            }
            OraclePhase::Compliance => {
                stage(&mut compliance, parse_section(output)?, "compliance")?;
            }
            other => {
                return Err(ReviewError::MergeConflict {
                    section: other.as_str().to_string(),
                });
            }
        }
    }

    // Everything parsed; commit in one pass.
    if let Some(report) = levy {
        record.levy = Some(report);
    }
    if let Some(report) = balance_sheet {
        record.balance_sheet = Some(report);
    }
    if let Some(items) = expense_items {
        let run = if record.expense_runs.is_empty() {
            ExpenseRun::initial(items)
        } else {
            ExpenseRun::additional(items)
        };
        record.push_expense_run(run);
    }
    if let Some(report) = compliance {
        record.compliance = Some(report);
    }
    record.touch();
    Ok(())
}

fn stage<T>(slot: &mut Option<T>, value: T, section: &str) -> Result<(), ReviewError> {
    if slot.is_some() {
        return Err(ReviewError::MergeConflict {
            section: section.to_string(),
        });
    }
    *slot = Some(value);
    Ok(())
}

/// Append a supplemental expense run from an `expensesAdditional` output.
pub fn merge_expenses_additional(
    record: &mut AuditRecord,
    output: &PhaseOutput,
) -> Result<(), ReviewError> {
    if output.phase != OraclePhase::ExpensesAdditional {
        return Err(ReviewError::MergeConflict {
            section: output.phase.as_str().to_string(),
        });
    }
    let payload: ExpensePayload = parse_section(output)?;
    record.push_expense_run(ExpenseRun::additional(payload.items));
    Ok(())
}

/// Merge a targeted re-verify output: replaces the latest resolution table
/// and appends one history entry. Never touches original section data.
pub fn merge_targeted_reverify(
    record: &mut AuditRecord,
    output: &PhaseOutput,
    target_count: usize,
) -> Result<Vec<TargetResolution>, ReviewError> {
    if output.phase != OraclePhase::TargetedReverify {
        return Err(ReviewError::MergeConflict {
            section: output.phase.as_str().to_string(),
        });
    }
    let payload: ReverifyPayload = parse_section(output)?;

    record.reverify.resolutions = payload.resolutions.clone();
    record.reverify.history.push(ReverifyHistoryEntry {
        timestamp: chrono::Utc::now(),
        target_count,
        resolutions: payload.resolutions.clone(),
    });
    record.touch();
    Ok(payload.resolutions)
}
