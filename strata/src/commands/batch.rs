//! Batch file processing.

use anyhow::{Context, Result};
use std::path::Path;
use strata_core::AccessRequest;

use crate::cli::BatchArgs;
use crate::config::Config;

pub async fn execute(args: BatchArgs, config: &Config) -> Result<()> {
    let requests = read_requests(&args.file)?;
    tracing::info!(requests = requests.len(), file = %args.file.display(), "Processing batch file");

    let coordinator = super::simulated_coordinator(config, !args.no_persist).await?;
    let responses = coordinator.process_batch_requests(requests).await;

    let output = if args.pretty {
        serde_json::to_string_pretty(&responses)?
    } else {
        serde_json::to_string(&responses)?
    };
    println!("{}", output);

    if !args.no_persist {
        coordinator
            .persist_patterns()
            .await
            .context("Failed to persist access patterns")?;
    }

    Ok(())
}

fn read_requests(path: &Path) -> Result<Vec<AccessRequest>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse requests in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{MemoryTier, RequestType};
    use tempfile::tempdir;

    #[test]
    fn test_read_requests() {
        let temp = tempdir().expect("Failed to create temp dir");
        let path = temp.path().join("batch.json");
        std::fs::write(
            &path,
            r#"[
                {"chapterNumber": 12, "requestType": "CHARACTER_ANALYSIS", "targetLayers": ["SHORT_TERM", "MID_TERM"]},
                {"chapterNumber": 3, "requestType": "WORLD_KNOWLEDGE", "targetLayers": ["LONG_TERM"]}
            ]"#,
        )
        .unwrap();

        let requests = read_requests(&path).expect("Failed to read requests");

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].request_type, RequestType::CharacterAnalysis);
        assert_eq!(requests[1].sorted_layers(), vec![MemoryTier::LongTerm]);
    }

    #[test]
    fn test_unknown_request_type_is_rejected() {
        let temp = tempdir().expect("Failed to create temp dir");
        let path = temp.path().join("batch.json");
        std::fs::write(
            &path,
            r#"[{"chapterNumber": 1, "requestType": "PLOT_TWIST", "targetLayers": ["LONG_TERM"]}]"#,
        )
        .unwrap();

        assert!(read_requests(&path).is_err());
    }
}
