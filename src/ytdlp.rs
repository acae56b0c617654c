//! yt-dlp backed implementation of the listing and comment capabilities.
//!
//! Both calls shell out to `yt-dlp --dump-single-json` and read the JSON it
//! prints. Anything yt-dlp writes to stderr is kept for error messages only.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ExtractorConfig;
use crate::error::{FetchError, ListError};
use crate::export::{normalize_comment_text, sanitize_field};
use crate::model::{Comment, VideoRef};
use crate::source::{CommentFetcher, VideoLister};
use crate::urls::{build_channel_videos_url, watch_url};

const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
    cookies: Option<PathBuf>,
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            cookies: None,
        }
    }

    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self {
            program: config.yt_dlp_bin.clone(),
            cookies: config.cookies().map(Path::to_path_buf),
        }
    }

    pub fn with_cookies(mut self, cookies: Option<PathBuf>) -> Self {
        self.cookies = cookies;
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cookies) = &self.cookies {
            command.arg("--cookies").arg(cookies);
        }
        command
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

/// `--flat-playlist` payload; only the entry list matters.
#[derive(Debug, Deserialize)]
struct PlaylistInfo {
    #[serde(default)]
    entries: Vec<Option<PlaylistEntry>>,
}

#[derive(Debug, Deserialize)]
struct PlaylistEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    upload_date: Option<String>,
}

/// `--write-comments` payload. Videos with comments disabled have no
/// `comments` key at all.
#[derive(Debug, Deserialize)]
struct CommentsInfo {
    #[serde(default)]
    comments: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    id: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    author_id: Option<String>,
    #[serde(default)]
    like_count: Option<i64>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    time_text: Option<String>,
    #[serde(default)]
    is_pinned: bool,
}

#[async_trait]
impl VideoLister for YtDlp {
    async fn list_channel_videos(
        &self,
        channel_url: &str,
        limit: usize,
    ) -> Result<Vec<VideoRef>, ListError> {
        let list_url = build_channel_videos_url(channel_url);
        info!(%list_url, limit, "listing channel videos");

        let mut command = self.command();
        command
            .arg("--flat-playlist")
            .arg("--dump-single-json")
            .arg("--no-warnings")
            .arg("--playlist-end")
            .arg(limit.to_string())
            .arg("--extractor-args")
            .arg("youtube:skip=dash,hls")
            .arg(&list_url);

        let output = command.output().await.map_err(|source| ListError::Spawn {
            program: self.program_name(),
            source,
        })?;
        if !output.status.success() {
            return Err(ListError::Exit {
                url: list_url,
                status: output.status.to_string(),
                stderr: stderr_tail(&output),
            });
        }

        let info: PlaylistInfo =
            serde_json::from_slice(&output.stdout).map_err(|source| ListError::Parse {
                url: list_url.clone(),
                source,
            })?;
        let videos: Vec<VideoRef> = info
            .entries
            .into_iter()
            .flatten()
            .take(limit)
            .map(video_ref_from_entry)
            .collect();
        info!(%list_url, count = videos.len(), "listed channel videos");
        Ok(videos)
    }
}

#[async_trait]
impl CommentFetcher for YtDlp {
    async fn fetch_video_comments(&self, video_url: &str) -> Result<Vec<Comment>, FetchError> {
        debug!(video_url, "running comment extraction");
        let mut command = self.command();
        command
            .arg("--skip-download")
            .arg("--write-comments")
            .arg("--dump-single-json")
            .arg("--no-warnings")
            .arg("--no-progress")
            .arg("--extractor-args")
            .arg("youtube:max_comments=all;comment_sort=top")
            .arg(video_url);

        let output = command.output().await.map_err(|source| FetchError::Spawn {
            program: self.program_name(),
            source,
        })?;
        if !output.status.success() {
            return Err(FetchError::Exit {
                url: video_url.to_string(),
                status: output.status.to_string(),
                stderr: stderr_tail(&output),
            });
        }

        let info: CommentsInfo =
            serde_json::from_slice(&output.stdout).map_err(|source| FetchError::Parse {
                url: video_url.to_string(),
                source,
            })?;
        Ok(normalize_comments(info.comments.unwrap_or_default()))
    }
}

fn video_ref_from_entry(entry: PlaylistEntry) -> VideoRef {
    let id = entry.id.filter(|id| !id.trim().is_empty());
    let url = id
        .as_deref()
        .map(watch_url)
        .or_else(|| entry.url.filter(|url| !url.trim().is_empty()));
    VideoRef {
        id: id.unwrap_or_default(),
        title: entry
            .title
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string()),
        url,
        upload_date: entry.upload_date.as_deref().and_then(normalize_upload_date),
    }
}

/// Turns raw yt-dlp comment objects into export-ready comments, dropping
/// nulls, malformed entries and repeated ids.
fn normalize_comments(values: Vec<Value>) -> Vec<Comment> {
    let mut comments = Vec::with_capacity(values.len());
    let mut seen_ids = HashSet::new();
    for value in values {
        if value.is_null() {
            continue;
        }
        let raw = match serde_json::from_value::<RawComment>(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "could not parse comment entry");
                continue;
            }
        };
        if !seen_ids.insert(raw.id.clone()) {
            continue;
        }
        comments.push(Comment {
            id: raw.id,
            text: normalize_comment_text(raw.text.as_deref().unwrap_or_default()),
            author: sanitize_field(raw.author.as_deref().unwrap_or_default()),
            author_id: raw.author_id,
            like_count: raw
                .like_count
                .and_then(|likes| u64::try_from(likes).ok())
                .unwrap_or(0),
            timestamp: raw.timestamp,
            display_time: raw.time_text,
            is_pinned: raw.is_pinned,
        });
    }
    comments
}

/// yt-dlp reports `YYYYMMDD`; keep anything else as-is.
fn normalize_upload_date(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed = (trimmed.len() == 8 && trimmed.is_ascii())
        .then(|| {
            NaiveDate::from_ymd_opt(
                trimmed[0..4].parse().ok()?,
                trimmed[4..6].parse().ok()?,
                trimmed[6..8].parse().ok()?,
            )
        })
        .flatten();
    match parsed {
        Some(date) => Some(date.format("%Y-%m-%d").to_string()),
        None => Some(trimmed.to_string()),
    }
}

fn stderr_tail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    stderr
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .unwrap_or("no error output")
        .chars()
        .take(500)
        .collect()
}
