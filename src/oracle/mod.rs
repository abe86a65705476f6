//! The evidence-extraction oracle interface.
//!
//! The oracle is a black box mapping a phase plus evidence to structured
//! output; it may be slow or unreliable. The core only depends on the
//! [`Oracle`] trait and checks that the returned payload carries the
//! required top-level keys for its phase before anything is merged. Deep
//! schema validation is the collaborator's job.

pub mod command;
pub mod prompt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::review::targets::Target;
use crate::store::EvidenceRef;

/// Phase id for one oracle invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OraclePhase {
    Intake,
    Levy,
    BalanceSheet,
    Expenses,
    ExpensesAdditional,
    Compliance,
    TargetedReverify,
}

impl OraclePhase {
    /// Wire id used in requests and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Levy => "levy",
            Self::BalanceSheet => "balanceSheet",
            Self::Expenses => "expenses",
            Self::ExpensesAdditional => "expensesAdditional",
            Self::Compliance => "compliance",
            Self::TargetedReverify => "targetedReverify",
        }
    }

    /// Top-level keys the payload for this phase must carry.
    pub fn required_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Intake => &["entries"],
            Self::Levy => &["variance"],
            Self::BalanceSheet => &["items"],
            Self::Expenses | Self::ExpensesAdditional => &["items"],
            Self::Compliance => &["tax_variance"],
            Self::TargetedReverify => &["resolutions"],
        }
    }
}

impl fmt::Display for OraclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One oracle invocation: phase, locked context, evidence refs and, in
/// targeted mode, the explicit target list.
#[derive(Debug, Clone, Serialize)]
pub struct OracleRequest {
    pub phase: OraclePhase,
    /// Immutable snapshot of the intake output; downstream phases must not
    /// re-derive facts already established there. `Null` for intake itself.
    pub locked_context: Value,
    #[serde(default)]
    pub evidence: Vec<EvidenceRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<Target>,
}

impl OracleRequest {
    pub fn new(phase: OraclePhase, locked_context: Value) -> Self {
        Self {
            phase,
            locked_context,
            evidence: Vec::new(),
            targets: Vec::new(),
        }
    }

    pub fn with_evidence(mut self, evidence: Vec<EvidenceRef>) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_targets(mut self, targets: Vec<Target>) -> Self {
        self.targets = targets;
        self
    }
}

/// The external evidence-extraction oracle.
///
/// Retry and backoff policy belongs to implementations, never to the core;
/// from the core's perspective a failed invocation leaves the record
/// unchanged and the same request may be re-issued verbatim.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn invoke(&self, request: &OracleRequest) -> anyhow::Result<Value>;
}

/// Check that a payload is an object carrying the phase's required
/// top-level keys. Returns a human-readable description of the first
/// problem found.
pub fn check_required_keys(phase: OraclePhase, payload: &Value) -> Result<(), String> {
    let object = payload
        .as_object()
        .ok_or_else(|| format!("{} output is not a JSON object", phase))?;

    for key in phase.required_keys() {
        if !object.contains_key(*key) {
            return Err(format!("{} output is missing required key '{}'", phase, key));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_phase_wire_ids() {
        assert_eq!(OraclePhase::BalanceSheet.as_str(), "balanceSheet");
        assert_eq!(OraclePhase::ExpensesAdditional.as_str(), "expensesAdditional");
        assert_eq!(
            serde_json::to_string(&OraclePhase::TargetedReverify).unwrap(),
            "\"targetedReverify\""
        );
    }

    #[test]
    fn test_check_required_keys_accepts_complete_payload() {
        let payload = json!({"variance": 0.0, "note": "balanced"});
        assert!(check_required_keys(OraclePhase::Levy, &payload).is_ok());
    }

    #[test]
    fn test_check_required_keys_reports_missing_key() {
        let payload = json!({"note": "no figure"});
        let err = check_required_keys(OraclePhase::Levy, &payload).unwrap_err();
        assert!(err.contains("missing required key 'variance'"));
    }

    #[test]
    fn test_check_required_keys_rejects_non_object() {
        let err = check_required_keys(OraclePhase::Expenses, &json!([1, 2])).unwrap_err();
        assert!(err.contains("not a JSON object"));
    }

    #[test]
    fn test_request_builder() {
        let request = OracleRequest::new(OraclePhase::Intake, Value::Null)
            .with_evidence(vec![EvidenceRef::new("sha256:abc")]);
        assert_eq!(request.phase, OraclePhase::Intake);
        assert_eq!(request.evidence.len(), 1);
        assert!(request.targets.is_empty());
    }
}
