use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single comment fetch. Stays inside the retry loop; the run
/// only ever sees it as a `FailedAfterRetries` status.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("could not run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("yt-dlp exited with {status} for {url}: {stderr}")]
    Exit {
        url: String,
        status: String,
        stderr: String,
    },
    #[error("invalid yt-dlp output for {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure of the channel listing call.
#[derive(Debug, Error)]
pub enum ListError {
    #[error("could not run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("listing {url} exited with {status}: {stderr}")]
    Exit {
        url: String,
        status: String,
        stderr: String,
    },
    #[error("invalid listing output for {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger io on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("serializing ledger: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact io on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no artifacts to combine")]
    Empty,
}

/// Errors that end a whole channel run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("target video count must be at least 1")]
    InvalidTarget,
    #[error("creating output directory {path}: {source}")]
    Prepare {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("listing videos for {channel} failed: {source}")]
    Listing {
        channel: String,
        #[source]
        source: ListError,
    },
    #[error("no videos found in channel {channel}")]
    NoVideosFound { channel: String },
    #[error(
        "no new videos processed for {channel}: {candidates} candidates, {skipped} skipped, {failed} failed"
    )]
    NoCommentsExtracted {
        channel: String,
        candidates: usize,
        skipped: usize,
        failed: usize,
    },
}

impl RunError {
    /// Conditions the caller should surface as "not found" rather than as an
    /// internal failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RunError::NoVideosFound { .. } | RunError::NoCommentsExtracted { .. }
        )
    }
}
