//! 🚚 rowrelay: CSV rows in, batched events out.
//!
//! 🧠 Knowledge graph:
//! - `classify`: file name → event kind (+ collection)
//! - `decoders`: bytes → rows
//! - `transforms`: row → flat, snake_cased record
//! - `queue`: per-destination batching in front of a transport
//! - `transport`: one POST per batch, with retries
//! - `pipeline`: all of the above, for one file
//! - `app_config`: figment-loaded knobs
//!
//! 🦆

pub mod app_config;
pub mod classify;
pub mod common;
pub mod decoders;
pub mod error;
pub mod pipeline;
pub mod queue;
pub mod transforms;
pub mod transport;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::app_config::AppConfig;
use crate::pipeline::{FileReport, Pipeline};
use crate::transport::{HttpTransport, InMemoryTransport, Retrying, Transport, TransportBackend};

/// 📋 One file's fate: a report, or the reason there is none.
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: anyhow::Result<FileReport>,
}

/// 🏭 Pick the transport: the real HTTP one, or the in-memory recorder for dry runs.
///
/// A dry run needs no write key. A real run without one is a [`error::ConfigurationError`].
pub fn build_transport(config: &AppConfig, dry_run: bool) -> anyhow::Result<TransportBackend> {
    if dry_run {
        info!("🧪 dry run: batches are recorded in memory, nothing leaves the building");
        return Ok(TransportBackend::InMemory(InMemoryTransport::new()));
    }
    let http_config = config
        .http_transport_config()
        .context("💀 Cannot talk to the remote API without credentials")?;
    let http = HttpTransport::new(http_config)?;
    Ok(TransportBackend::Http(Retrying::new(http, config.retry_policy())))
}

/// 📄 Read one file from disk and relay it. The path is the source name.
pub async fn relay_file<T: Transport + 'static>(
    pipeline: &Pipeline<T>,
    path: &Path,
) -> anyhow::Result<FileReport> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("💀 Could not read '{}'. It exists in our hearts, not on disk.", path.display()))?;
    let source_name = path.to_string_lossy();
    pipeline
        .relay_bytes(&source_name, &bytes)
        .await
        .with_context(|| format!("💀 Could not relay '{}'", path.display()))
}

/// 🚀 Relay every file concurrently, each with its own queue, all sharing one transport.
pub async fn run(config: &AppConfig, files: &[PathBuf], dry_run: bool) -> anyhow::Result<Vec<FileOutcome>> {
    let transport = Arc::new(build_transport(config, dry_run)?);
    let pipeline = Pipeline::new(transport, config.flush_at);
    info!(files = files.len(), flush_at = config.flush_at, "🚀 relaying");

    let outcomes = futures::future::join_all(files.iter().map(|path| {
        let pipeline = &pipeline;
        async move {
            FileOutcome {
                path: path.clone(),
                result: relay_file(pipeline, path).await,
            }
        }
    }))
    .await;
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn dry_config() -> anyhow::Result<AppConfig> {
        Ok(toml::from_str("flush_at = 2")?)
    }

    #[test]
    fn the_one_where_a_real_run_demands_a_write_key() -> anyhow::Result<()> {
        let err = build_transport(&dry_config()?, false).unwrap_err();
        assert!(format!("{err:#}").contains("write key"), "{err:#}");
        assert!(matches!(build_transport(&dry_config()?, true)?, TransportBackend::InMemory(_)));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_files_succeed_and_fail_independently() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let good = dir.path().join("track_signups.csv");
        let bad = dir.path().join("mystery.csv");
        let missing = dir.path().join("identify_ghosts.csv");
        write!(std::fs::File::create(&good)?, "userId,event\nu1,A\nu2,B\nu3,C\n")?;
        write!(std::fs::File::create(&bad)?, "a\n1\n")?;

        let outcomes = run(&dry_config()?, &[good.clone(), bad, missing], true).await?;
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].path, good);

        let report = outcomes[0].result.as_ref().map_err(|e| anyhow::anyhow!("{e:#}"))?;
        assert_eq!(report.rows_read, 3);
        assert_eq!(report.batches.len(), 2);
        assert!(format!("{:#}", outcomes[1].result.as_ref().unwrap_err()).contains("no recognized prefix"));
        assert!(format!("{:#}", outcomes[2].result.as_ref().unwrap_err()).contains("Could not read"));
        Ok(())
    }
}
