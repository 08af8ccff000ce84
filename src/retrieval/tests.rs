use super::*;
use crate::IndexError;
use crate::database::{Database, NewLogEntry, Severity};
use crate::embeddings::testing::{HashingBackend, hashing_model};
use crate::indexer::IngestionIndexer;
use chrono::NaiveDate;
use std::sync::atomic::Ordering;
use tempfile::TempDir;

struct Setup {
    _temp_dir: TempDir,
    database: Arc<Database>,
    indexer: IngestionIndexer,
    retriever: Retriever,
    backend: Arc<HashingBackend>,
}

async fn create_setup(messages: &[&str]) -> anyhow::Result<Setup> {
    let temp_dir = TempDir::new()?;
    let database = Arc::new(Database::initialize_from_config_dir(temp_dir.path()).await?);
    let store = Arc::new(VectorIndexStore::new(
        temp_dir.path().join("index.bin"),
        temp_dir.path().join("id_map.json"),
    ));
    let (model, backend) = hashing_model();

    let indexer = IngestionIndexer::new(model.clone(), Arc::clone(&store), 16);
    let retriever = Retriever::new(model, store, database.clone());

    if !messages.is_empty() {
        let entries: Vec<NewLogEntry> = messages
            .iter()
            .map(|message| NewLogEntry {
                timestamp: NaiveDate::from_ymd_opt(2025, 2, 10)
                    .and_then(|d| d.and_hms_opt(14, 0, 0))
                    .expect("valid timestamp"),
                source: "UNIT-1".to_string(),
                severity: Severity::Info,
                message: message.to_string(),
            })
            .collect();
        let (_file, stored) = database.ingest_file("plant.txt", &entries).await?;
        indexer.index_entries(&stored).await;
    }

    Ok(Setup {
        _temp_dir: temp_dir,
        database,
        indexer,
        retriever,
        backend,
    })
}

fn messages(ranked: &[RankedEntry]) -> Vec<&str> {
    ranked.iter().map(|r| r.entry.message.as_str()).collect()
}

#[tokio::test]
async fn pressure_question_ranks_pressure_entries_first() -> anyhow::Result<()> {
    let setup = create_setup(&["low disk", "pressure drop detected", "pressure drop again"]).await?;

    let ranked = setup.retriever.retrieve("pressure issue", 3).await?;

    assert_eq!(ranked.len(), 3);
    let top_two: Vec<&str> = messages(&ranked)[..2].to_vec();
    assert!(top_two.contains(&"pressure drop detected"));
    assert!(top_two.contains(&"pressure drop again"));
    assert_eq!(ranked[2].entry.message, "low disk");
    assert!(ranked[1].score > ranked[2].score);
    assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));

    Ok(())
}

#[tokio::test]
async fn min_score_drops_unrelated_entries() -> anyhow::Result<()> {
    let mut setup =
        create_setup(&["low disk", "pressure drop detected", "pressure drop again"]).await?;
    setup.retriever = setup.retriever.with_min_score(Some(0.1));

    let ranked = setup.retriever.retrieve("pressure issue", 3).await?;
    assert_eq!(ranked.len(), 2);
    assert!(!messages(&ranked).contains(&"low disk"));

    Ok(())
}

#[tokio::test]
async fn k_limits_results() -> anyhow::Result<()> {
    let setup = create_setup(&["low disk", "pressure drop detected", "pressure drop again"]).await?;
    assert_eq!(setup.retriever.retrieve("pressure issue", 1).await?.len(), 1);
    assert!(setup.retriever.retrieve("pressure issue", 0).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn empty_index_is_an_empty_success() -> anyhow::Result<()> {
    let setup = create_setup(&[]).await?;
    let ranked = setup.retriever.retrieve("anything at all", 5).await?;
    assert!(ranked.is_empty());
    Ok(())
}

#[tokio::test]
async fn blank_question_is_rejected() -> anyhow::Result<()> {
    let setup = create_setup(&["low disk"]).await?;
    let err = setup.retriever.retrieve("   ", 5).await.unwrap_err();
    assert!(matches!(err, LogRagError::Retrieval(_)));
    Ok(())
}

#[tokio::test]
async fn unavailable_model_is_an_error_not_empty() -> anyhow::Result<()> {
    let setup = create_setup(&[]).await?;
    setup.backend.fail.store(true, Ordering::SeqCst);

    let err = setup.retriever.retrieve("pressure issue", 5).await.unwrap_err();
    assert!(matches!(
        err,
        LogRagError::Index(IndexError::ModelUnavailable(_))
    ));
    Ok(())
}

#[tokio::test]
async fn deleted_entries_are_skipped() -> anyhow::Result<()> {
    let setup = create_setup(&["low disk", "pressure drop detected", "pressure drop again"]).await?;
    setup.database.delete_entry("log_000002").await?;

    let ranked = setup.retriever.retrieve("pressure issue", 3).await?;

    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].entry.message, "pressure drop again");
    assert!(setup.indexer.store().contains("log_000002")?);

    Ok(())
}
