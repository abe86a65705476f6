//! CLI command implementations.
//!
//! Each handler wires the file-backed stores and the command oracle from
//! the loaded configuration, runs one library operation, and prints a
//! short styled summary. All review logic lives in the library.

use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use scrutiny::config::ScrutinyConfig;
use scrutiny::oracle::command::CommandOracle;
use scrutiny::orchestrator::PhaseRunner;
use scrutiny::record::{AuditRecord, Domain, ItemKey, PhaseStatus};
use scrutiny::review::resolution::ResolutionKind;
use scrutiny::review::sequencer::{ReviewPhase, next_phase};
use scrutiny::review::targets::build_targets;
use scrutiny::review::triage::TriageSeverity;
use scrutiny::store::{EvidenceRef, EvidenceStore, FsEvidenceStore, JsonFileStore, RecordStore};

fn record_store(config: &ScrutinyConfig) -> Arc<JsonFileStore> {
    Arc::new(JsonFileStore::new(config.records_dir()))
}

fn runner(config: &ScrutinyConfig) -> PhaseRunner {
    let oracle = CommandOracle::new(&config.oracle.cmd)
        .with_args(config.oracle.args.clone())
        .with_timeout(Duration::from_secs(config.oracle.timeout_secs));
    PhaseRunner::new(Arc::new(oracle), record_store(config)).with_parallel(config.review.parallel)
}

/// Store evidence files and return their opaque refs.
async fn store_evidence(
    config: &ScrutinyConfig,
    files: &[PathBuf],
) -> Result<Vec<EvidenceRef>> {
    let store = FsEvidenceStore::new(config.evidence_dir());
    let mut refs = Vec::with_capacity(files.len());
    for file in files {
        let bytes = std::fs::read(file)
            .with_context(|| format!("Failed to read evidence file: {}", file.display()))?;
        refs.push(store.store(&bytes).await?);
    }
    Ok(refs)
}

fn print_phase_outcome(record: &AuditRecord) {
    match record.last_phase_run() {
        Some(run) if run.status == PhaseStatus::Completed => {
            println!(
                "{} phase {} completed",
                style("✓").green(),
                style(&run.phase).bold()
            );
        }
        Some(run) => {
            println!(
                "{} phase {} failed: {}",
                style("✗").red(),
                style(&run.phase).bold(),
                run.message.as_deref().unwrap_or("unknown error")
            );
        }
        None => {}
    }
}

pub async fn cmd_init(config: &ScrutinyConfig, name: &str) -> Result<()> {
    let record = AuditRecord::new(name);
    record_store(config).save(&record).await?;
    println!(
        "{} created record {} ({})",
        style("✓").green(),
        style(record.id).bold(),
        name
    );
    Ok(())
}

pub async fn cmd_list(config: &ScrutinyConfig) -> Result<()> {
    let store = record_store(config);
    let ids = store.list().await?;
    if ids.is_empty() {
        println!("No records yet. Create one with 'scrutiny init <name>'.");
        return Ok(());
    }
    for id in ids {
        let record = store.load(id).await?;
        println!("{}  {}  next: {}", id, record.name, next_phase(&record));
    }
    Ok(())
}

pub async fn cmd_status(config: &ScrutinyConfig, id: Uuid) -> Result<()> {
    let record = record_store(config).load(id).await?;

    println!("{} ({})", style(&record.name).bold(), record.id);
    println!("  next phase: {}", next_phase(&record));

    let intake = record
        .intake
        .as_ref()
        .map(|i| format!("{} entries", i.entries.len()))
        .unwrap_or_else(|| "—".into());
    let levy = record
        .levy
        .as_ref()
        .and_then(|l| l.variance)
        .map(|v| format!("variance {:.2}", v))
        .unwrap_or_else(|| "—".into());
    let balance = record
        .balance_sheet
        .as_ref()
        .map(|b| format!("{} items", b.items.len()))
        .unwrap_or_else(|| "—".into());
    let compliance = record
        .compliance
        .as_ref()
        .and_then(|c| c.tax_variance)
        .map(|v| format!("tax variance {:.2}", v))
        .unwrap_or_else(|| "—".into());
    println!("  intake:        {}", intake);
    println!("  levy:          {}", levy);
    println!("  balance sheet: {}", balance);
    println!(
        "  expenses:      {} runs, {} effective items",
        record.expense_runs.len(),
        record.effective_expenses().len()
    );
    println!("  compliance:    {}", compliance);

    if !record.triage.is_empty() {
        println!("  watch list:");
        for item in &record.triage {
            println!("    [{}] {} — {}", item.severity, item.key(), item.title);
        }
    }

    if !record.phase_log.is_empty() {
        println!("  phase log:");
        for run in &record.phase_log {
            let marker = match run.status {
                PhaseStatus::Completed => style("✓").green(),
                PhaseStatus::Failed => style("✗").red(),
            };
            match &run.message {
                Some(message) => println!("    {} {} — {}", marker, run.phase, message),
                None => println!("    {} {}", marker, run.phase),
            }
        }
    }
    Ok(())
}

pub async fn cmd_next(config: &ScrutinyConfig, id: Uuid) -> Result<()> {
    let record = record_store(config).load(id).await?;
    println!("{}", next_phase(&record));
    Ok(())
}

pub async fn cmd_run(
    config: &ScrutinyConfig,
    id: Uuid,
    phase: Option<&str>,
    evidence_files: &[PathBuf],
) -> Result<()> {
    let store = record_store(config);
    let record = store.load(id).await?;

    let phase = match phase {
        Some(s) => s.parse::<ReviewPhase>()?,
        None => next_phase(&record),
    };
    let evidence = store_evidence(config, evidence_files).await?;

    println!("Running phase {}...", style(phase).bold());
    let record = runner(config).run_phase(record, phase, &evidence).await?;

    print_phase_outcome(&record);
    if !record.triage.is_empty() {
        println!("{} item(s) on the watch list", record.triage.len());
    }
    Ok(())
}

pub async fn cmd_submit_expenses(
    config: &ScrutinyConfig,
    id: Uuid,
    evidence_files: &[PathBuf],
) -> Result<()> {
    let store = record_store(config);
    let record = store.load(id).await?;
    let evidence = store_evidence(config, evidence_files).await?;

    let record = runner(config)
        .run_supplemental_expenses(record, &evidence)
        .await?;

    print_phase_outcome(&record);
    Ok(())
}

pub async fn cmd_targets(config: &ScrutinyConfig, id: Uuid) -> Result<()> {
    let record = record_store(config).load(id).await?;
    let targets = build_targets(&record, &record.triage);

    if targets.is_empty() {
        println!("Nothing outstanding; a targeted re-verify would be rejected.");
        return Ok(());
    }
    for target in &targets {
        println!(
            "[{}] {} ({:?}) — {}",
            target.domain, target.item_id, target.source, target.description
        );
    }
    Ok(())
}

pub async fn cmd_reverify(config: &ScrutinyConfig, id: Uuid) -> Result<()> {
    let store = record_store(config);
    let record = store.load(id).await?;
    let triage = record.triage.clone();

    let (record, outcome) = runner(config).run_targeted_reverify(record, &triage).await?;

    print_phase_outcome(&record);
    if let Some(outcome) = outcome {
        println!(
            "Re-verified {} target(s); {} resolution(s) recorded.",
            outcome.target_count,
            outcome.resolutions.len()
        );
    }
    Ok(())
}

pub async fn cmd_flag(
    config: &ScrutinyConfig,
    id: Uuid,
    domain: &str,
    item: &str,
    title: &str,
    comment: Option<String>,
) -> Result<()> {
    let store = record_store(config);
    let record = store.load(id).await?;
    let domain = domain.parse::<Domain>()?;

    let record = runner(config)
        .flag_item(record, domain, item, title, TriageSeverity::Warning, comment)
        .await?;

    println!(
        "{} flagged {}/{} ({} items on the watch list)",
        style("✓").green(),
        domain,
        item,
        record.triage.len()
    );
    Ok(())
}

pub async fn cmd_unflag(config: &ScrutinyConfig, id: Uuid, domain: &str, item: &str) -> Result<()> {
    let store = record_store(config);
    let record = store.load(id).await?;
    let key = ItemKey::new(domain.parse::<Domain>()?, item);

    runner(config).remove_flag(record, &key).await?;
    println!("{} removed {}", style("✓").green(), key);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn cmd_resolve(
    config: &ScrutinyConfig,
    id: Uuid,
    domain: &str,
    item: &str,
    kind: &str,
    comment: &str,
    by: &str,
) -> Result<()> {
    let store = record_store(config);
    let record = store.load(id).await?;
    let key = ItemKey::new(domain.parse::<Domain>()?, item);
    let kind = kind.parse::<ResolutionKind>()?;

    runner(config)
        .resolve_item(record, key.clone(), kind, comment, by)
        .await?;
    println!("{} recorded disposition for {}", style("✓").green(), key);
    Ok(())
}
