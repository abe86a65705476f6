//! The phase runner: validates, invokes the oracle, merges, reconciles.
//!
//! Error policy follows the record-first rule: oracle failures (including
//! malformed payloads) are recorded on the record as a failed phase and
//! returned inside `Ok`, so callers always hold an inspectable
//! last-known-good state. Only caller mistakes (validation, empty targets)
//! and impossible states (merge conflicts) surface as `Err`.

use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;

use crate::errors::ReviewError;
use crate::oracle::{Oracle, OraclePhase, OracleRequest};
use crate::record::{AuditRecord, Domain, ItemKey, PhaseStatus, TargetResolution};
use crate::review::merge::{
    PhaseOutput, merge_expenses_additional, merge_intake, merge_reconciliation,
    merge_targeted_reverify,
};
use crate::review::resolution::{self, ResolutionKind, UserResolution};
use crate::review::sequencer::{ReviewPhase, next_phase};
use crate::review::targets::build_targets;
use crate::review::triage::{self, TriageItem, TriageSeverity};
use crate::store::{EvidenceRef, RecordStore};

/// The four domain invocations of one reconciliation pass.
const RECONCILIATION_PHASES: [OraclePhase; 4] = [
    OraclePhase::Levy,
    OraclePhase::BalanceSheet,
    OraclePhase::Expenses,
    OraclePhase::Compliance,
];

/// Result of a successful targeted re-verify pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ReverifyOutcome {
    pub target_count: usize,
    pub resolutions: Vec<TargetResolution>,
}

/// Drives one record through its phases.
pub struct PhaseRunner {
    oracle: Arc<dyn Oracle>,
    store: Arc<dyn RecordStore>,
    parallel: bool,
}

impl PhaseRunner {
    pub fn new(oracle: Arc<dyn Oracle>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            oracle,
            store,
            parallel: true,
        }
    }

    /// Run the four reconciliation invocations sequentially instead of
    /// fanned out. The merge result is identical either way.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Run one phase against the record.
    ///
    /// `evidence` carries newly submitted document refs; downstream phases
    /// additionally see the refs registered during intake. A
    /// `TargetedReverify` request uses the record's own triage list; use
    /// [`Self::run_targeted_reverify`] to scope it explicitly.
    pub async fn run_phase(
        &self,
        record: AuditRecord,
        phase: ReviewPhase,
        evidence: &[EvidenceRef],
    ) -> Result<AuditRecord, ReviewError> {
        match phase {
            ReviewPhase::Intake => {
                if next_phase(&record) != ReviewPhase::Intake {
                    return Err(ReviewError::Validation(
                        "intake already completed for this record".into(),
                    ));
                }
                self.run_intake(record, evidence).await
            }
            ReviewPhase::Reconciliation => self.run_reconciliation(record, evidence).await,
            ReviewPhase::TargetedReverify => {
                let triage = record.triage.clone();
                let (record, _) = self.run_targeted_reverify(record, &triage).await?;
                Ok(record)
            }
        }
    }

    async fn run_intake(
        &self,
        mut record: AuditRecord,
        evidence: &[EvidenceRef],
    ) -> Result<AuditRecord, ReviewError> {
        let request =
            OracleRequest::new(OraclePhase::Intake, Value::Null).with_evidence(evidence.to_vec());

        let payload = match self.oracle.invoke(&request).await {
            Ok(payload) => payload,
            Err(e) => return self.fail_phase(record, "intake", e.to_string()).await,
        };

        let output = PhaseOutput::new(OraclePhase::Intake, payload);
        if let Err(e) = merge_intake(&mut record, &output) {
            return self.handle_merge_error(record, "intake", e).await;
        }

        self.complete_phase(record, "intake").await
    }

    /// Run the reconciliation phase: a four-way read-only fan-out against
    /// one locked intake snapshot, joined before a single atomic merge. If
    /// any invocation fails, the whole phase is marked failed and no
    /// partial section is committed.
    async fn run_reconciliation(
        &self,
        mut record: AuditRecord,
        evidence: &[EvidenceRef],
    ) -> Result<AuditRecord, ReviewError> {
        let locked = self.locked_context(&record)?;
        let mut all_evidence = intake_evidence(&record);
        all_evidence.extend(evidence.iter().cloned());

        let requests: Vec<OracleRequest> = RECONCILIATION_PHASES
            .iter()
            .map(|&phase| {
                OracleRequest::new(phase, locked.clone()).with_evidence(all_evidence.clone())
            })
            .collect();

        tracing::info!(record = %record.id, parallel = self.parallel, "running reconciliation fan-out");

        let results: Vec<anyhow::Result<Value>> = if self.parallel {
            join_all(requests.iter().map(|r| self.oracle.invoke(r))).await
        } else {
            let mut results = Vec::with_capacity(requests.len());
            for request in &requests {
                results.push(self.oracle.invoke(request).await);
            }
            results
        };

        let mut outputs = Vec::with_capacity(results.len());
        for (phase, result) in RECONCILIATION_PHASES.iter().zip(results) {
            match result {
                Ok(payload) => outputs.push(PhaseOutput::new(*phase, payload)),
                Err(e) => {
                    let message = format!("{} invocation failed: {}", phase, e);
                    return self.fail_phase(record, "reconciliation", message).await;
                }
            }
        }

        if let Err(e) = merge_reconciliation(&mut record, &outputs) {
            return self.handle_merge_error(record, "reconciliation", e).await;
        }

        self.complete_phase(record, "reconciliation").await
    }

    /// Append a supplemental expense run from newly submitted evidence.
    /// Already-settled items are not reprocessed; the new run only updates
    /// the identities it reports.
    pub async fn run_supplemental_expenses(
        &self,
        mut record: AuditRecord,
        evidence: &[EvidenceRef],
    ) -> Result<AuditRecord, ReviewError> {
        let locked = self.locked_context(&record)?;
        if record.expense_runs.is_empty() {
            return Err(ReviewError::Validation(
                "supplemental expense evidence requires a completed reconciliation pass".into(),
            ));
        }

        let request = OracleRequest::new(OraclePhase::ExpensesAdditional, locked)
            .with_evidence(evidence.to_vec());

        let payload = match self.oracle.invoke(&request).await {
            Ok(payload) => payload,
            Err(e) => {
                return self
                    .fail_phase(record, "expenses-additional", e.to_string())
                    .await;
            }
        };

        let output = PhaseOutput::new(OraclePhase::ExpensesAdditional, payload);
        if let Err(e) = merge_expenses_additional(&mut record, &output) {
            return self.handle_merge_error(record, "expenses-additional", e).await;
        }

        self.complete_phase(record, "expenses-additional").await
    }

    /// Run a targeted re-verify pass scoped to the given triage list.
    ///
    /// Rejected before any oracle call when the record is not yet fully
    /// reconciled or when no targets are outstanding. The merge writes
    /// only the resolution table and a history entry — original section
    /// data is never overwritten. A failed invocation yields
    /// `Ok((record, None))` with the failure on the phase log.
    pub async fn run_targeted_reverify(
        &self,
        mut record: AuditRecord,
        triage: &[TriageItem],
    ) -> Result<(AuditRecord, Option<ReverifyOutcome>), ReviewError> {
        if next_phase(&record) != ReviewPhase::TargetedReverify {
            return Err(ReviewError::Validation(
                "targeted re-verify requires a fully reconciled record".into(),
            ));
        }
        let locked = self.locked_context(&record)?;

        let targets = build_targets(&record, triage);
        if targets.is_empty() {
            return Err(ReviewError::EmptyTargets);
        }
        let target_count = targets.len();

        let request = OracleRequest::new(OraclePhase::TargetedReverify, locked)
            .with_evidence(intake_evidence(&record))
            .with_targets(targets);

        let payload = match self.oracle.invoke(&request).await {
            Ok(payload) => payload,
            Err(e) => {
                let record = self
                    .fail_phase(record, "targeted-reverify", e.to_string())
                    .await?;
                return Ok((record, None));
            }
        };

        let output = PhaseOutput::new(OraclePhase::TargetedReverify, payload);
        let resolutions = match merge_targeted_reverify(&mut record, &output, target_count) {
            Ok(resolutions) => resolutions,
            Err(e @ ReviewError::Oracle { .. }) => {
                let record = self
                    .fail_phase(record, "targeted-reverify", e.to_string())
                    .await?;
                return Ok((record, None));
            }
            Err(fatal) => return Err(fatal),
        };

        let record = self.complete_phase(record, "targeted-reverify").await?;
        Ok((
            record,
            Some(ReverifyOutcome {
                target_count,
                resolutions,
            }),
        ))
    }

    /// Flag an item for the watch list by explicit user action.
    pub async fn flag_item(
        &self,
        mut record: AuditRecord,
        domain: Domain,
        item_id: &str,
        title: &str,
        severity: TriageSeverity,
        comment: Option<String>,
    ) -> Result<AuditRecord, ReviewError> {
        let key = ItemKey::new(domain, item_id);
        if record.triage.iter().any(|t| t.key() == key) {
            return Err(ReviewError::Validation(format!(
                "item {} is already on the watch list",
                key
            )));
        }
        record
            .triage
            .push(TriageItem::user_flag(domain, item_id, title, severity, comment));
        record.touch();
        self.store.save(&record).await?;
        Ok(record)
    }

    /// Remove a watch-list item by explicit user action.
    pub async fn remove_flag(
        &self,
        mut record: AuditRecord,
        key: &ItemKey,
    ) -> Result<AuditRecord, ReviewError> {
        let before = record.triage.len();
        record.triage.retain(|t| &t.key() != key);
        if record.triage.len() == before {
            return Err(ReviewError::Validation(format!(
                "no watch-list item for {}",
                key
            )));
        }
        record.touch();
        self.store.save(&record).await?;
        Ok(record)
    }

    /// Record a user disposition for an item. The comment is validated
    /// here, before any mutation; the tracker itself does not validate.
    pub async fn resolve_item(
        &self,
        mut record: AuditRecord,
        key: ItemKey,
        kind: ResolutionKind,
        comment: &str,
        resolved_by: &str,
    ) -> Result<AuditRecord, ReviewError> {
        if comment.trim().is_empty() {
            return Err(ReviewError::Validation(
                "resolution comment must not be empty".into(),
            ));
        }
        resolution::upsert(
            &mut record.reverify.user_resolutions,
            UserResolution::new(key, kind, comment, resolved_by),
        );
        record.touch();
        self.store.save(&record).await?;
        Ok(record)
    }

    /// Locked context for downstream phases: the immutable intake snapshot.
    fn locked_context(&self, record: &AuditRecord) -> Result<Value, ReviewError> {
        let intake = record
            .intake
            .as_ref()
            .filter(|i| !i.is_empty())
            .ok_or_else(|| {
                ReviewError::Validation("missing locked intake context; run intake first".into())
            })?;
        serde_json::to_value(intake).map_err(|e| ReviewError::Other(e.into()))
    }

    async fn complete_phase(
        &self,
        mut record: AuditRecord,
        phase_label: &str,
    ) -> Result<AuditRecord, ReviewError> {
        record.record_phase(phase_label, PhaseStatus::Completed, None);
        reconcile_triage_in_place(&mut record);
        self.store.save(&record).await?;
        tracing::info!(record = %record.id, phase = phase_label, "phase completed");
        Ok(record)
    }

    async fn fail_phase(
        &self,
        mut record: AuditRecord,
        phase_label: &str,
        message: String,
    ) -> Result<AuditRecord, ReviewError> {
        tracing::warn!(record = %record.id, phase = phase_label, %message, "phase failed");
        record.record_phase(phase_label, PhaseStatus::Failed, Some(message));
        self.store.save(&record).await?;
        Ok(record)
    }

    /// Oracle-level merge errors (malformed payloads) land on the phase
    /// log; conflicts and validation bugs propagate as fatal.
    async fn handle_merge_error(
        &self,
        record: AuditRecord,
        phase_label: &str,
        error: ReviewError,
    ) -> Result<AuditRecord, ReviewError> {
        match error {
            ReviewError::Oracle { .. } => {
                self.fail_phase(record, phase_label, error.to_string()).await
            }
            fatal => Err(fatal),
        }
    }
}

/// Evidence refs registered during intake, passed to downstream phases.
fn intake_evidence(record: &AuditRecord) -> Vec<EvidenceRef> {
    record
        .intake
        .as_ref()
        .map(|intake| {
            intake
                .entries
                .iter()
                .filter_map(|entry| entry.evidence.as_deref())
                .map(EvidenceRef::new)
                .collect()
        })
        .unwrap_or_default()
}

/// Recompute the watch list from the current record state.
fn reconcile_triage_in_place(record: &mut AuditRecord) {
    record.triage = triage::reconcile_triage(record, &record.triage);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::expense::ExpenseStatus;
    use crate::store::repository::RecordRepository;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Oracle returning canned payloads per phase, recording every call.
    #[derive(Default)]
    struct MockOracle {
        payloads: HashMap<OraclePhase, Value>,
        failing: Vec<OraclePhase>,
        calls: Mutex<Vec<OraclePhase>>,
    }

    impl MockOracle {
        fn with_payload(mut self, phase: OraclePhase, payload: Value) -> Self {
            self.payloads.insert(phase, payload);
            self
        }

        fn with_failure(mut self, phase: OraclePhase) -> Self {
            self.failing.push(phase);
            self
        }

        fn calls(&self) -> Vec<OraclePhase> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Oracle for MockOracle {
        async fn invoke(&self, request: &OracleRequest) -> anyhow::Result<Value> {
            self.calls.lock().unwrap().push(request.phase);
            if self.failing.contains(&request.phase) {
                anyhow::bail!("simulated outage");
            }
            self.payloads
                .get(&request.phase)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no canned payload for {}", request.phase))
        }
    }

    fn intake_payload() -> Value {
        json!({"entries": [
            {"document": "annual statement", "evidence": "ref-1"},
            {"document": "invoice bundle", "evidence": "ref-2"}
        ]})
    }

    fn settled_oracle() -> MockOracle {
        MockOracle::default()
            .with_payload(OraclePhase::Intake, intake_payload())
            .with_payload(OraclePhase::Levy, json!({"variance": 0.0}))
            .with_payload(
                OraclePhase::BalanceSheet,
                json!({"items": [{"name": "reserve", "status": "VERIFIED"}]}),
            )
            .with_payload(
                OraclePhase::Expenses,
                json!({"items": [{"id": "e1", "label": "cleaning", "status": "PASS"}]}),
            )
            .with_payload(OraclePhase::Compliance, json!({"tax_variance": 0.0}))
    }

    fn outstanding_oracle() -> MockOracle {
        MockOracle::default()
            .with_payload(OraclePhase::Intake, intake_payload())
            .with_payload(OraclePhase::Levy, json!({"variance": 500.0}))
            .with_payload(OraclePhase::BalanceSheet, json!({"items": []}))
            .with_payload(
                OraclePhase::Expenses,
                json!({"items": [{"id": "g1", "label": "gardening", "status": "FAIL"}]}),
            )
            .with_payload(OraclePhase::Compliance, json!({"tax_variance": 0.0}))
    }

    fn runner(oracle: MockOracle) -> (PhaseRunner, Arc<RecordRepository>, Arc<MockOracle>) {
        let oracle = Arc::new(oracle);
        let store = Arc::new(RecordRepository::new());
        let runner = PhaseRunner::new(
            Arc::clone(&oracle) as Arc<dyn Oracle>,
            Arc::clone(&store) as Arc<dyn RecordStore>,
        );
        (runner, store, oracle)
    }

    async fn reconciled_record(
        runner: &PhaseRunner,
    ) -> AuditRecord {
        let record = AuditRecord::new("test");
        let record = runner
            .run_phase(record, ReviewPhase::Intake, &[])
            .await
            .unwrap();
        runner
            .run_phase(record, ReviewPhase::Reconciliation, &[])
            .await
            .unwrap()
    }

    // =========================================
    // Intake and sequencing
    // =========================================

    #[tokio::test]
    async fn test_intake_merges_registry_and_saves() {
        let (runner, store, _) = runner(settled_oracle());
        let record = AuditRecord::new("test");
        let id = record.id;

        let record = runner
            .run_phase(record, ReviewPhase::Intake, &[])
            .await
            .unwrap();

        assert_eq!(record.intake.as_ref().unwrap().entries.len(), 2);
        assert_eq!(record.last_phase_run().unwrap().status, PhaseStatus::Completed);
        assert_eq!(&*store.get(id).await.unwrap(), &record);
        assert_eq!(next_phase(&record), ReviewPhase::Reconciliation);
    }

    #[tokio::test]
    async fn test_intake_rerun_is_out_of_order() {
        let (runner, _, _) = runner(settled_oracle());
        let record = reconciled_record(&runner).await;

        let err = runner
            .run_phase(record, ReviewPhase::Intake, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::Validation(_)));
    }

    #[tokio::test]
    async fn test_reconciliation_without_intake_is_rejected() {
        let (runner, _, oracle) = runner(settled_oracle());
        let record = AuditRecord::new("test");

        let err = runner
            .run_phase(record, ReviewPhase::Reconciliation, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::Validation(_)));
        // Rejected before any external call.
        assert!(oracle.calls().is_empty());
    }

    // =========================================
    // Reconciliation fan-out
    // =========================================

    #[tokio::test]
    async fn test_reconciliation_invokes_all_four_domains() {
        let (runner, _, oracle) = runner(settled_oracle());
        let record = reconciled_record(&runner).await;

        let calls = oracle.calls();
        for phase in RECONCILIATION_PHASES {
            assert_eq!(calls.iter().filter(|&&p| p == phase).count(), 1);
        }

        assert_eq!(record.levy.as_ref().unwrap().variance, Some(0.0));
        assert_eq!(record.expense_runs.len(), 1);
        assert_eq!(record.expense_runs[0].run_id, "initial");
        assert_eq!(next_phase(&record), ReviewPhase::TargetedReverify);
        // Nothing outstanding: the watch list stays empty.
        assert!(record.triage.is_empty());
    }

    #[tokio::test]
    async fn test_reconciliation_failure_commits_nothing() {
        let (runner, store, _) = runner(
            outstanding_oracle().with_failure(OraclePhase::Compliance),
        );
        let record = AuditRecord::new("test");
        let id = record.id;
        let record = runner
            .run_phase(record, ReviewPhase::Intake, &[])
            .await
            .unwrap();

        let record = runner
            .run_phase(record, ReviewPhase::Reconciliation, &[])
            .await
            .unwrap();

        // Phase failed, but no partial section was committed.
        let last = record.last_phase_run().unwrap();
        assert_eq!(last.status, PhaseStatus::Failed);
        assert!(last.message.as_deref().unwrap().contains("compliance"));
        assert!(record.levy.is_none());
        assert!(record.balance_sheet.is_none());
        assert!(record.expense_runs.is_empty());
        assert!(record.triage.is_empty());
        // The failure itself is durable.
        assert_eq!(
            store.get(id).await.unwrap().last_phase_run().unwrap().status,
            PhaseStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_failed_reconciliation_is_retryable() {
        // First attempt fails on one domain; retrying against the same
        // locked snapshot succeeds and merges normally.
        let (runner, _, _) = runner(
            outstanding_oracle().with_failure(OraclePhase::Levy),
        );
        let record = AuditRecord::new("test");
        let record = runner
            .run_phase(record, ReviewPhase::Intake, &[])
            .await
            .unwrap();
        let record = runner
            .run_phase(record, ReviewPhase::Reconciliation, &[])
            .await
            .unwrap();
        assert_eq!(next_phase(&record), ReviewPhase::Reconciliation);

        let (retry_runner, _, _) = runner_from(outstanding_oracle());
        let record = retry_runner
            .run_phase(record, ReviewPhase::Reconciliation, &[])
            .await
            .unwrap();
        assert_eq!(record.levy.as_ref().unwrap().variance, Some(500.0));
        assert_eq!(record.expense_runs.len(), 1);
    }

    fn runner_from(oracle: MockOracle) -> (PhaseRunner, Arc<RecordRepository>, Arc<MockOracle>) {
        runner(oracle)
    }

    #[tokio::test]
    async fn test_malformed_payload_marks_phase_failed() {
        let oracle = outstanding_oracle()
            .with_payload(OraclePhase::Levy, json!({"note": "missing variance"}));
        let (runner, _, _) = runner_from(oracle);
        let record = AuditRecord::new("test");
        let record = runner
            .run_phase(record, ReviewPhase::Intake, &[])
            .await
            .unwrap();

        let record = runner
            .run_phase(record, ReviewPhase::Reconciliation, &[])
            .await
            .unwrap();

        let last = record.last_phase_run().unwrap();
        assert_eq!(last.status, PhaseStatus::Failed);
        assert!(last.message.as_deref().unwrap().contains("variance"));
        assert!(record.levy.is_none());
    }

    #[tokio::test]
    async fn test_reconciliation_populates_watch_list() {
        let (runner, _, _) = runner(outstanding_oracle());
        let record = reconciled_record(&runner).await;

        // Levy variance 500 and the failed expense item are both tracked.
        assert_eq!(record.triage.len(), 2);
        let keys: Vec<String> = record.triage.iter().map(|t| t.item_id.clone()).collect();
        assert!(keys.contains(&"variance".to_string()));
        assert!(keys.contains(&"expense-0".to_string()));
    }

    // =========================================
    // Supplemental expenses
    // =========================================

    #[tokio::test]
    async fn test_supplemental_run_auto_resolves_watch_list() {
        let oracle = outstanding_oracle().with_payload(
            OraclePhase::ExpensesAdditional,
            json!({"items": [{"id": "g1", "label": "gardening", "status": "PASS"}]}),
        );
        let (runner, _, _) = runner_from(oracle);
        let record = reconciled_record(&runner).await;
        assert!(record.triage.iter().any(|t| t.item_id == "expense-0"));

        let record = runner
            .run_supplemental_expenses(record, &[])
            .await
            .unwrap();

        assert_eq!(record.expense_runs.len(), 2);
        let effective = record.effective_expenses();
        assert_eq!(effective.len(), 1);
        assert_eq!(effective[0].item.status, ExpenseStatus::Pass);
        // The expense flag auto-resolved; the levy variance is still open.
        assert!(!record.triage.iter().any(|t| t.item_id == "expense-0"));
        assert!(record.triage.iter().any(|t| t.item_id == "variance"));
    }

    #[tokio::test]
    async fn test_supplemental_run_requires_prior_reconciliation() {
        let (runner, _, _) = runner(settled_oracle());
        let record = AuditRecord::new("test");
        let record = runner
            .run_phase(record, ReviewPhase::Intake, &[])
            .await
            .unwrap();

        let err = runner
            .run_supplemental_expenses(record, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::Validation(_)));
    }

    // =========================================
    // Targeted re-verify
    // =========================================

    #[tokio::test]
    async fn test_targeted_reverify_with_no_targets_is_rejected() {
        let (runner, _, oracle) = runner(settled_oracle());
        let record = reconciled_record(&runner).await;

        let err = runner
            .run_targeted_reverify(record, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::EmptyTargets));
        // No targeted invocation was attempted.
        assert!(!oracle.calls().contains(&OraclePhase::TargetedReverify));
    }

    #[tokio::test]
    async fn test_targeted_reverify_writes_annotation_only() {
        let oracle = outstanding_oracle().with_payload(
            OraclePhase::TargetedReverify,
            json!({"resolutions": [
                {"domain": "levy", "item_id": "variance", "status": "UNRESOLVED"},
                {"domain": "expenses", "item_id": "expense-0", "status": "RESOLVED", "note": "receipt found"}
            ]}),
        );
        let (runner, _, _) = runner_from(oracle);
        let record = reconciled_record(&runner).await;
        let levy_before = record.levy.clone();
        let runs_before = record.expense_runs.clone();
        let triage = record.triage.clone();

        let (record, outcome) = runner
            .run_targeted_reverify(record, &triage)
            .await
            .unwrap();
        let outcome = outcome.unwrap();

        assert_eq!(outcome.target_count, 2);
        assert_eq!(record.reverify.resolutions.len(), 2);
        assert_eq!(record.reverify.history.len(), 1);
        // Original section data untouched.
        assert_eq!(record.levy, levy_before);
        assert_eq!(record.expense_runs, runs_before);
        // The annotation does not settle the underlying sections, so the
        // watch list is unchanged too.
        assert_eq!(record.triage.len(), 2);
    }

    #[tokio::test]
    async fn test_targeted_reverify_failure_leaves_record_unchanged() {
        let oracle = outstanding_oracle().with_failure(OraclePhase::TargetedReverify);
        let (runner, _, _) = runner_from(oracle);
        let record = reconciled_record(&runner).await;
        let triage = record.triage.clone();
        let reverify_before = record.reverify.clone();

        let (record, outcome) = runner
            .run_targeted_reverify(record, &triage)
            .await
            .unwrap();

        assert!(outcome.is_none());
        assert_eq!(record.reverify, reverify_before);
        assert_eq!(
            record.last_phase_run().unwrap().status,
            PhaseStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_targeted_reverify_on_unreconciled_record_is_rejected() {
        let (runner, _, _) = runner(settled_oracle());
        let record = AuditRecord::new("test");
        let record = runner
            .run_phase(record, ReviewPhase::Intake, &[])
            .await
            .unwrap();

        let err = runner
            .run_targeted_reverify(record, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::Validation(_)));
    }

    // =========================================
    // User operations
    // =========================================

    #[tokio::test]
    async fn test_flag_item_rejects_duplicate_identity() {
        let (runner, _, _) = runner(settled_oracle());
        let record = AuditRecord::new("test");

        let record = runner
            .flag_item(
                record,
                Domain::Expenses,
                "expense-3",
                "odd invoice",
                TriageSeverity::Warning,
                None,
            )
            .await
            .unwrap();
        assert_eq!(record.triage.len(), 1);

        let err = runner
            .flag_item(
                record,
                Domain::Expenses,
                "expense-3",
                "again",
                TriageSeverity::Warning,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::Validation(_)));
    }

    #[tokio::test]
    async fn test_resolve_item_requires_comment() {
        let (runner, _, _) = runner(settled_oracle());
        let record = AuditRecord::new("test");
        let key = ItemKey::new(Domain::Levy, "variance");

        let err = runner
            .resolve_item(record, key.clone(), ResolutionKind::Resolved, "   ", "alex")
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::Validation(_)));

        let record = AuditRecord::new("test");
        let record = runner
            .resolve_item(record, key.clone(), ResolutionKind::Override, "accepted", "alex")
            .await
            .unwrap();
        let found = resolution::find(&record.reverify.user_resolutions, &key).unwrap();
        assert_eq!(found.kind, ResolutionKind::Override);
    }

    #[tokio::test]
    async fn test_remove_flag() {
        let (runner, _, _) = runner(settled_oracle());
        let record = AuditRecord::new("test");
        let record = runner
            .flag_item(
                record,
                Domain::Levy,
                "variance",
                "check",
                TriageSeverity::Info,
                None,
            )
            .await
            .unwrap();

        let key = ItemKey::new(Domain::Levy, "variance");
        let record = runner.remove_flag(record, &key).await.unwrap();
        assert!(record.triage.is_empty());

        let err = runner.remove_flag(record, &key).await.unwrap_err();
        assert!(matches!(err, ReviewError::Validation(_)));
    }
}
