//! Request text composition for the command oracle.
//!
//! Rendering a request into instructions is an adapter concern: the
//! reconciliation core never sees prompt text, only structured payloads.

use crate::oracle::{OraclePhase, OracleRequest};

/// Render an oracle request to the instruction text sent on stdin.
pub fn compose(request: &OracleRequest) -> String {
    let evidence_section = if request.evidence.is_empty() {
        "No evidence documents attached.".to_string()
    } else {
        request
            .evidence
            .iter()
            .map(|r| format!("- {}", r))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let targets_section = if request.targets.is_empty() {
        String::new()
    } else {
        let list = request
            .targets
            .iter()
            .map(|t| format!("- [{}] {}: {}", t.domain, t.item_id, t.description))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "\n## Targets\n\nRe-verify ONLY the items listed below. Do not revisit anything else.\n{}\n",
            list
        )
    };

    let context_json = serde_json::to_string_pretty(&request.locked_context)
        .unwrap_or_else(|_| "null".to_string());

    format!(
        r#"# {phase} extraction

You are an audit evidence extraction service. Work strictly from the locked
context and the attached evidence; do not re-derive facts already established
in the locked context.

## Locked context

```json
{context_json}
```

## Evidence

{evidence_section}
{targets_section}
## Output format

Respond with a single JSON object. {shape}
"#,
        phase = request.phase,
        context_json = context_json,
        evidence_section = evidence_section,
        targets_section = targets_section,
        shape = output_shape(request.phase),
    )
}

/// Per-phase description of the expected payload shape.
fn output_shape(phase: OraclePhase) -> &'static str {
    match phase {
        OraclePhase::Intake => {
            r#"Required key: "entries" — an array of {"document", "kind"?, "evidence"?}."#
        }
        OraclePhase::Levy => {
            r#"Required key: "variance" — the levy variance as a number (0 when balanced). Optional: "levied_total", "collected_total", "note"."#
        }
        OraclePhase::BalanceSheet => {
            r#"Required key: "items" — an array of {"name", "fund"?, "amount"?, "status"? in VERIFIED|DEVIATION|UNCLEAR, "note"?}."#
        }
        OraclePhase::Expenses | OraclePhase::ExpensesAdditional => {
            r#"Required key: "items" — an array of {"id"?, "label", "amount"?, "status" in PASS|FAIL|RISK_FLAG, "note"?}."#
        }
        OraclePhase::Compliance => {
            r#"Required key: "tax_variance" — a number (0 when compliant). Optional: "findings" (array of strings), "note"."#
        }
        OraclePhase::TargetedReverify => {
            r#"Required key: "resolutions" — one entry per target: {"domain", "item_id", "status" in RESOLVED|UNRESOLVED, "note"?}."#
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Domain;
    use crate::review::targets::{Target, TargetSource};
    use crate::store::EvidenceRef;
    use serde_json::json;

    #[test]
    fn test_compose_includes_locked_context_and_evidence() {
        let request = OracleRequest::new(OraclePhase::Levy, json!({"entries": []}))
            .with_evidence(vec![EvidenceRef::new("sha256:abc123")]);

        let text = compose(&request);
        assert!(text.contains("# levy extraction"));
        assert!(text.contains("\"entries\""));
        assert!(text.contains("sha256:abc123"));
        assert!(text.contains("\"variance\""));
        assert!(!text.contains("## Targets"));
    }

    #[test]
    fn test_compose_targeted_mode_lists_targets_only_once() {
        let request = OracleRequest::new(OraclePhase::TargetedReverify, json!(null)).with_targets(
            vec![Target {
                domain: Domain::Levy,
                item_id: "variance".into(),
                description: "Levy variance of 500.00 outstanding".into(),
                source: TargetSource::System,
            }],
        );

        let text = compose(&request);
        assert!(text.contains("## Targets"));
        assert!(text.contains("[levy] variance"));
        assert!(text.contains("\"resolutions\""));
    }
}
