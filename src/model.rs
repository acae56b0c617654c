//! Data carried between the listing, extraction and export stages.
//!
//! Everything here is plain data: the orchestrator builds a fresh
//! `ChannelReport` per run and only the CSV artifacts outlive it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One entry of a channel listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRef {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_date: Option<String>,
}

impl VideoRef {
    /// The URL to extract from, if the listing gave us a usable one.
    pub fn resolvable_url(&self) -> Option<&str> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// A single extracted comment, already normalized for export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    pub like_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_time: Option<String>,
    #[serde(default)]
    pub is_pinned: bool,
}

/// Terminal state of one candidate video within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    Processed,
    SkippedAlreadyScraped,
    SkippedNoUrl,
    SkippedNoComments,
    FailedAfterRetries,
    ArtifactWriteFailed,
}

impl VideoStatus {
    /// Whether this outcome counts toward the requested number of videos and
    /// lands in the ledger.
    pub fn is_done(self) -> bool {
        matches!(self, VideoStatus::Processed | VideoStatus::SkippedNoComments)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResult {
    pub video: VideoRef,
    #[serde(skip)]
    pub comments: Vec<Comment>,
    pub comment_count: usize,
    pub status: VideoStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
}

impl VideoResult {
    pub fn new(video: VideoRef, status: VideoStatus) -> Self {
        Self {
            video,
            comments: Vec::new(),
            comment_count: 0,
            status,
            artifact_path: None,
        }
    }

    pub fn with_comments(mut self, comments: Vec<Comment>) -> Self {
        self.comment_count = comments.len();
        self.comments = comments;
        self
    }

    pub fn with_artifact(mut self, path: PathBuf) -> Self {
        self.artifact_path = Some(path);
        self
    }
}

/// Analytics row for one video that produced an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSummary {
    pub url: String,
    pub title: String,
    pub comment_count: usize,
    pub artifact_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_date: Option<String>,
}

/// Channel-level aggregate for one invocation.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelReport {
    pub channel_url: String,
    pub channel_id: String,
    /// Videos that wrote an artifact, in processing order.
    pub videos: Vec<VideoSummary>,
    /// Every candidate the run looked at, in listing order.
    pub results: Vec<VideoResult>,
    pub videos_processed: usize,
    pub total_comments: usize,
}

impl ChannelReport {
    pub fn new(channel_url: &str, channel_id: String) -> Self {
        Self {
            channel_url: channel_url.to_string(),
            channel_id,
            ..Self::default()
        }
    }

    /// Looks a processed video up by the URL it was extracted from.
    pub fn get(&self, url: &str) -> Option<&VideoSummary> {
        self.videos.iter().find(|summary| summary.url == url)
    }

    pub fn count_with_status(&self, status: VideoStatus) -> usize {
        self.results
            .iter()
            .filter(|result| result.status == status)
            .count()
    }

    pub(crate) fn record(&mut self, result: VideoResult) {
        if result.status.is_done() {
            self.videos_processed += 1;
        }
        if let (VideoStatus::Processed, Some(path), Some(url)) = (
            result.status,
            result.artifact_path.as_ref(),
            result.video.resolvable_url(),
        ) {
            self.total_comments += result.comment_count;
            self.videos.push(VideoSummary {
                url: url.to_string(),
                title: result.video.title.clone(),
                comment_count: result.comment_count,
                artifact_path: path.clone(),
                upload_date: result.video.upload_date.clone(),
            });
        }
        self.results.push(result);
    }
}

/// What `process_channel` hands back on success.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRun {
    pub report: ChannelReport,
    /// Last per-video artifact written, if any video had comments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_artifact: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_artifact: Option<PathBuf>,
    /// Set when a combined export was requested but could not be built.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_error: Option<String>,
}

impl ChannelRun {
    /// The artifact a caller should hand out: the combined export when one
    /// was requested, otherwise the last per-video file.
    pub fn artifact_path(&self) -> Option<&Path> {
        self.combined_artifact
            .as_deref()
            .or(self.last_artifact.as_deref())
    }
}
