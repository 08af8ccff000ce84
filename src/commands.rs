use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tracing::{info, warn};

use crate::context::AppContext;
use crate::indexer::{ConsistencyValidator, IndexingOutcome};

const RECENT_FILES_SHOWN: usize = 10;

/// Parse a log file, store its entries and index them
#[inline]
pub async fn ingest_file(ctx: &AppContext, path: &Path) -> Result<()> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Invalid file name: {}", path.display()))?;

    let content =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    info!("Ingesting log file: {}", path.display());
    let report = ctx.ingest(filename, &content).await?;

    println!("Stored file: {} (ID: {})", report.file.filename, report.file.file_id);
    println!("  Entries parsed: {}", report.file.entries_parsed);

    if let Some((first, last)) = report.date_range() {
        println!(
            "  Date range: {} to {}",
            first.format("%Y-%m-%d %H:%M:%S"),
            last.format("%Y-%m-%d %H:%M:%S")
        );
    }

    println!("  Severity breakdown:");
    for (severity, count) in report.severity_breakdown() {
        println!("    {}: {}", severity, count);
    }

    match &report.outcome {
        IndexingOutcome::Indexed {
            indexed,
            persisted: true,
        } => println!("✅ Indexed {} entries", indexed),
        IndexingOutcome::Indexed {
            indexed,
            persisted: false,
        } => {
            println!(
                "⚠️  Indexed {} entries, but the index could not be saved to disk",
                indexed
            );
        }
        IndexingOutcome::Skipped { indexed, reason } => {
            println!("⚠️  Indexing incomplete ({} entries indexed): {}", indexed, reason);
            println!("Entries are stored. Use 'log-rag reindex' once the embedding model is available.");
        }
    }

    Ok(())
}

/// Answer a question from the indexed logs
#[inline]
pub async fn query(ctx: &AppContext, question: &str, limit: Option<usize>, json: bool) -> Result<()> {
    let display_limit = limit.unwrap_or(ctx.config().retrieval.display_limit);
    let response = ctx.ask(question, display_limit).await?;

    if json {
        let output =
            serde_json::to_string_pretty(&response).context("Failed to serialize response")?;
        println!("{}", output);
        return Ok(());
    }

    println!("{}", response.answer);
    println!();
    println!("Suggested follow-up: {}", response.suggested_followup);

    if response.matches.is_empty() {
        println!();
        println!("No matching log entries.");
        return Ok(());
    }

    println!();
    println!("Top matches:");
    for (rank, matched) in response.matches.iter().enumerate() {
        let entry = &matched.entry;
        println!(
            "{:>2}. [{:.3}] {} {} {} {}",
            rank + 1,
            matched.score,
            entry.log_id,
            entry.timestamp_utc(),
            entry.severity,
            entry.source
        );
        println!("      {}", entry.message);
    }

    Ok(())
}

/// Rebuild the vector index from every stored entry
#[inline]
pub async fn reindex(ctx: &AppContext) -> Result<()> {
    let bar = if console::user_attended_stderr() {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template("{bar:40} [{pos}/{len}] Embedding entries")
        {
            bar.set_style(style);
        }
        bar
    } else {
        ProgressBar::hidden()
    };

    let result = ctx
        .indexer()
        .reindex_all(ctx.database(), |done, total| {
            bar.set_length(total as u64);
            bar.set_position(done as u64);
        })
        .await;
    bar.finish_and_clear();

    let stats = result.context("Re-index failed; the previous index was kept")?;
    println!(
        "✅ Re-indexed {} entries ({} vectors)",
        stats.entries, stats.indexed
    );

    Ok(())
}

/// Compare stored entries with the index, optionally repairing differences
#[inline]
pub async fn check(ctx: &AppContext, fix: bool) -> Result<()> {
    let validator = ConsistencyValidator::new(ctx.database(), ctx.indexer());
    let report = validator.validate().await?;

    println!("{}", report.summary());

    if report.is_consistent {
        return Ok(());
    }

    if !report.missing_in_index.is_empty() {
        println!("  Missing from index: {}", report.missing_in_index.len());
    }
    if !report.orphaned_in_index.is_empty() {
        println!("  Orphaned in index: {}", report.orphaned_in_index.len());
    }

    if !fix {
        println!("Use 'log-rag check --fix' to repair the index.");
        return Ok(());
    }

    let stats = validator.reconcile(&report).await?;
    println!("🔧 Removed {} orphaned vectors", stats.removed);
    match stats.indexing {
        IndexingOutcome::Indexed { indexed, .. } => {
            println!("🔧 Indexed {} missing entries", indexed);
        }
        IndexingOutcome::Skipped { indexed, reason } => {
            warn!("Reconcile could not index every missing entry: {}", reason);
            println!(
                "⚠️  Indexed {} of {} missing entries: {}",
                indexed,
                report.missing_in_index.len(),
                reason
            );
        }
    }

    Ok(())
}

/// Print the incident summary for all stored entries or one ingested file
#[inline]
pub async fn summary(ctx: &AppContext, file_id: Option<&str>, json: bool) -> Result<()> {
    let summary = ctx.summarize(file_id).await?;

    if json {
        let output =
            serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?;
        println!("{}", output);
        return Ok(());
    }

    println!("Incident Summary ({}, {} entries)", summary.period, summary.total_entries);
    println!("Generated at {}", summary.summary_generated_at);

    if summary.total_entries == 0 {
        println!();
        println!("No log entries to summarize. Use 'log-rag ingest <file>' first.");
        return Ok(());
    }

    println!();
    println!("Top incidents:");
    for (rank, incident) in summary.top_incidents.iter().enumerate() {
        println!(
            "{:>2}. {} [{}] ({} related entries, first seen {})",
            rank + 1,
            incident.incident,
            incident.severity,
            incident.related_entries,
            incident.timestamp
        );
        println!("      Suspected root cause: {}", incident.suspected_root_cause);
    }

    if !summary.patterns_detected.is_empty() {
        println!();
        println!("Patterns detected:");
        for pattern in &summary.patterns_detected {
            println!("  - {}", pattern);
        }
    }

    if !summary.recommended_actions.is_empty() {
        println!();
        println!("Recommended actions:");
        for action in &summary.recommended_actions {
            println!("  - {}", action);
        }
    }

    Ok(())
}

/// Show counts, index shape and data locations
#[inline]
pub async fn show_status(ctx: &AppContext) -> Result<()> {
    let database = ctx.database();
    let files = database.count_files().await?;
    let recent = database.list_files().await?;
    let entries = database.count_entries().await?;
    let breakdown = database.severity_breakdown().await?;

    let store = ctx.store();
    let vectors = store.len()?;
    let dimension = store.dimension()?;

    println!("Log RAG Status");
    println!("==============");
    println!();
    println!("Database: {}", ctx.config().database_path().display());
    println!("  Files ingested: {}", files);
    for file in recent.iter().take(RECENT_FILES_SHOWN) {
        println!(
            "    {} {} ({} entries, {})",
            file.file_id,
            file.filename,
            file.entries_parsed,
            file.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!("  Log entries: {}", entries);
    for count in &breakdown {
        println!("    {}: {}", count.severity, count.count);
    }
    println!();
    println!("Vector index: {}", store.index_path().display());
    println!("  Id map: {}", store.id_map_path().display());
    println!("  Vectors: {}", vectors);
    match dimension {
        Some(dimension) => println!("  Dimension: {}", dimension),
        None => println!("  Dimension: not bound yet"),
    }

    let unindexed = entries.saturating_sub(vectors as i64);
    if unindexed > 0 {
        println!("  ⚠️  {} entries may be missing from the index; run 'log-rag check'", unindexed);
    }

    println!();
    println!("Embedding model: {}", ctx.embedder().model_name());
    println!("Answer generator: {}", ctx.answers().primary_name());

    Ok(())
}
