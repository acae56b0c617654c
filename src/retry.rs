//! Bounded retries around a single comment fetch.
//!
//! A failed fetch is retried after an exponentially growing pause. A fetch
//! that succeeds with no comments is final: it does not consume retries.

use std::time::Duration;

use tracing::{info, warn};

use crate::model::{Comment, VideoStatus};
use crate::source::CommentFetcher;

pub const MAX_ATTEMPTS: u32 = 3;

/// Maps the number of the attempt that just failed (starting at 1) to the
/// pause before the next one.
pub trait Backoff: Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

impl<F> Backoff for F
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    fn delay(&self, attempt: u32) -> Duration {
        self(attempt)
    }
}

/// `unit * 2^attempt`: 2, 4, 8... units.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub unit: Duration,
}

impl ExponentialBackoff {
    pub fn new(unit: Duration) -> Self {
        Self { unit }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Backoff for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.unit.saturating_mul(factor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome {
    Processed,
    NoComments,
    FailedAfterRetries { last_error: String },
}

impl ExtractOutcome {
    pub fn status(&self) -> VideoStatus {
        match self {
            ExtractOutcome::Processed => VideoStatus::Processed,
            ExtractOutcome::NoComments => VideoStatus::SkippedNoComments,
            ExtractOutcome::FailedAfterRetries { .. } => VideoStatus::FailedAfterRetries,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub comments: Vec<Comment>,
    pub outcome: ExtractOutcome,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct Retrier<B> {
    backoff: B,
    max_attempts: u32,
}

impl<B: Backoff> Retrier<B> {
    pub fn new(backoff: B) -> Self {
        Self {
            backoff,
            max_attempts: MAX_ATTEMPTS,
        }
    }

    pub async fn extract<F>(&self, fetcher: &F, video_url: &str) -> Extraction
    where
        F: CommentFetcher + ?Sized,
    {
        let mut attempt = 1;
        loop {
            match fetcher.fetch_video_comments(video_url).await {
                Ok(comments) if comments.is_empty() => {
                    info!(video_url, attempt, "no comments found");
                    return Extraction {
                        comments,
                        outcome: ExtractOutcome::NoComments,
                        attempts: attempt,
                    };
                }
                Ok(comments) => {
                    info!(video_url, attempt, count = comments.len(), "extracted comments");
                    return Extraction {
                        comments,
                        outcome: ExtractOutcome::Processed,
                        attempts: attempt,
                    };
                }
                Err(err) if attempt >= self.max_attempts => {
                    warn!(video_url, attempt, error = %err, "giving up after retries");
                    return Extraction {
                        comments: Vec::new(),
                        outcome: ExtractOutcome::FailedAfterRetries {
                            last_error: err.to_string(),
                        },
                        attempts: attempt,
                    };
                }
                Err(err) => {
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        video_url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "comment fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
