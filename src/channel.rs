//! Channel-level orchestration: list, skip what is done, extract the rest one
//! video at a time, and assemble the report.
//!
//! Videos are processed strictly in listing order and never concurrently;
//! the fetch backend is rate limited and the retry pauses double as
//! backpressure.

use chrono::Local;
use tracing::{error, info, warn};

use crate::config::ExtractorConfig;
use crate::error::RunError;
use crate::export::{prepare_dir, write_combined_artifact, write_video_artifact};
use crate::ledger::Ledger;
use crate::model::{ChannelReport, ChannelRun, VideoRef, VideoResult, VideoStatus};
use crate::retry::{Backoff, ExponentialBackoff, ExtractOutcome, Retrier};
use crate::source::{CommentFetcher, VideoLister};
use crate::urls::{channel_id_from_url, video_id_from_url};
use crate::ytdlp::YtDlp;

/// How many candidates to request per wanted video, to make up for skips.
const OVERFETCH_FACTOR: usize = 2;

pub struct ChannelProcessor<L, F, B = ExponentialBackoff> {
    config: ExtractorConfig,
    lister: L,
    fetcher: F,
    retrier: Retrier<B>,
}

impl ChannelProcessor<YtDlp, YtDlp> {
    /// Processor backed by yt-dlp for both listing and extraction.
    pub fn from_config(config: ExtractorConfig) -> Self {
        let ytdlp = YtDlp::from_config(&config);
        Self::new(config, ytdlp.clone(), ytdlp)
    }
}

impl<L, F> ChannelProcessor<L, F>
where
    L: VideoLister,
    F: CommentFetcher,
{
    pub fn new(config: ExtractorConfig, lister: L, fetcher: F) -> Self {
        let retrier = Retrier::new(ExponentialBackoff::new(config.backoff_unit));
        Self {
            config,
            lister,
            fetcher,
            retrier,
        }
    }
}

impl<L, F, B> ChannelProcessor<L, F, B>
where
    L: VideoLister,
    F: CommentFetcher,
    B: Backoff,
{
    /// Swaps the pause strategy between failed attempts.
    pub fn with_backoff<B2: Backoff>(self, backoff: B2) -> ChannelProcessor<L, F, B2> {
        ChannelProcessor {
            config: self.config,
            lister: self.lister,
            fetcher: self.fetcher,
            retrier: Retrier::new(backoff),
        }
    }

    /// Extracts comments for up to `target_count` videos of the channel that
    /// were not processed by an earlier run.
    ///
    /// With `combined_export` the per-video files written by this run are
    /// also merged into one CSV, whose path is returned alongside.
    pub async fn process_channel(
        &self,
        channel_url: &str,
        target_count: usize,
        combined_export: bool,
    ) -> Result<ChannelRun, RunError> {
        if target_count == 0 {
            return Err(RunError::InvalidTarget);
        }
        let extracted_dir = &self.config.extracted_dir;
        prepare_dir(extracted_dir).map_err(|source| RunError::Prepare {
            path: extracted_dir.clone(),
            source,
        })?;

        let mut ledger = Ledger::load(&self.config.ledger_path);
        info!(
            channel = channel_url,
            target = target_count,
            already_scraped = ledger.len(),
            "starting channel extraction"
        );

        let candidates = self
            .lister
            .list_channel_videos(channel_url, target_count.saturating_mul(OVERFETCH_FACTOR))
            .await
            .map_err(|source| RunError::Listing {
                channel: channel_url.to_string(),
                source,
            })?;
        if candidates.is_empty() {
            return Err(RunError::NoVideosFound {
                channel: channel_url.to_string(),
            });
        }

        let total = candidates.len();
        let mut report = ChannelReport::new(channel_url, channel_id_from_url(channel_url));
        let mut last_artifact = None;

        for (index, video) in candidates.into_iter().enumerate() {
            if report.videos_processed >= target_count {
                break;
            }
            info!(
                candidate = index + 1,
                total,
                processed = report.videos_processed,
                target = target_count,
                title = %video.title,
                "examining candidate"
            );
            let result = self.process_candidate(video, &mut ledger).await;
            if let Some(path) = &result.artifact_path {
                last_artifact = Some(path.clone());
            }
            report.record(result);
        }

        if report.videos_processed == 0 {
            let failed = report.count_with_status(VideoStatus::FailedAfterRetries)
                + report.count_with_status(VideoStatus::ArtifactWriteFailed);
            let skipped = report.count_with_status(VideoStatus::SkippedAlreadyScraped)
                + report.count_with_status(VideoStatus::SkippedNoUrl);
            warn!(
                channel = channel_url,
                candidates = total,
                skipped,
                failed,
                "no new videos processed"
            );
            return Err(RunError::NoCommentsExtracted {
                channel: channel_url.to_string(),
                candidates: total,
                skipped,
                failed,
            });
        }

        // Not fatal: processed videos are already in the ledger.
        let mut combined_artifact = None;
        let mut combined_error = None;
        if combined_export && !report.videos.is_empty() {
            match write_combined_artifact(
                extracted_dir,
                &report.channel_id,
                &report.videos,
                Local::now(),
            ) {
                Ok(path) => {
                    info!(path = %path.display(), videos = report.videos.len(), "wrote combined export");
                    combined_artifact = Some(path);
                }
                Err(err) => {
                    error!(channel = channel_url, error = %err, "could not build combined export");
                    combined_error = Some(err.to_string());
                }
            }
        } else if combined_export {
            info!(channel = channel_url, "no per-video artifacts to combine");
        }

        info!(
            channel = channel_url,
            videos_processed = report.videos_processed,
            total_comments = report.total_comments,
            "channel extraction finished"
        );
        Ok(ChannelRun {
            report,
            last_artifact,
            combined_artifact,
            combined_error,
        })
    }

    async fn process_candidate(&self, video: VideoRef, ledger: &mut Ledger) -> VideoResult {
        let Some(video_url) = video.resolvable_url().map(str::to_owned) else {
            info!(title = %video.title, "skipping video without url");
            return VideoResult::new(video, VideoStatus::SkippedNoUrl);
        };
        let Some(video_id) = video_id_from_url(&video_url) else {
            info!(%video_url, "skipping video with unresolvable url");
            return VideoResult::new(video, VideoStatus::SkippedNoUrl);
        };
        if ledger.contains(&video_id) {
            info!(%video_id, "skipping already scraped video");
            return VideoResult::new(video, VideoStatus::SkippedAlreadyScraped);
        }

        let extraction = self.retrier.extract(&self.fetcher, &video_url).await;
        match extraction.outcome {
            ExtractOutcome::FailedAfterRetries { last_error } => {
                warn!(
                    %video_id,
                    attempts = extraction.attempts,
                    error = %last_error,
                    "leaving video for a later run"
                );
                VideoResult::new(video, VideoStatus::FailedAfterRetries)
            }
            ExtractOutcome::NoComments => {
                mark_done(ledger, &video_id);
                VideoResult::new(video, VideoStatus::SkippedNoComments)
            }
            ExtractOutcome::Processed => {
                match write_video_artifact(
                    &self.config.extracted_dir,
                    &video_id,
                    &extraction.comments,
                ) {
                    Ok(path) => {
                        mark_done(ledger, &video_id);
                        info!(
                            %video_id,
                            comments = extraction.comments.len(),
                            path = %path.display(),
                            "saved comments"
                        );
                        VideoResult::new(video, VideoStatus::Processed)
                            .with_comments(extraction.comments)
                            .with_artifact(path)
                    }
                    Err(err) => {
                        error!(%video_id, error = %err, "could not write comments artifact");
                        VideoResult::new(video, VideoStatus::ArtifactWriteFailed)
                            .with_comments(extraction.comments)
                    }
                }
            }
        }
    }
}

fn mark_done(ledger: &mut Ledger, video_id: &str) {
    if let Err(err) = ledger.add(video_id) {
        warn!(
            %video_id,
            path = %ledger.path().display(),
            error = %err,
            "could not persist ledger; video may be scraped again later"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, ListError};
    use crate::export::COMMENT_HEADER;
    use crate::model::Comment;
    use crate::source::testing::{Reply, ScriptedFetcher, StaticLister, comment, video};
    use async_trait::async_trait;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    fn test_config() -> (TempDir, ExtractorConfig) {
        let dir = tempdir().unwrap();
        let mut config = ExtractorConfig::with_root(dir.path());
        config.backoff_unit = Duration::ZERO;
        (dir, config)
    }

    fn url(id: &str) -> String {
        format!("https://youtube.com/watch?v={id}")
    }

    fn seed_ledger(path: &Path, ids: &[&str]) {
        let mut ledger = Ledger::load(path);
        for id in ids {
            ledger.add(id).unwrap();
        }
    }

    fn two_comments() -> Reply {
        Reply::Comments(vec![comment("c1", "first"), comment("c2", "second")])
    }

    #[tokio::test]
    async fn mixed_channel_processes_what_it_can() {
        let (_dir, config) = test_config();
        seed_ledger(&config.ledger_path, &["B"]);

        let lister = StaticLister::new(vec![video("A"), video("B"), video("C"), video("D")]);
        let fetcher = ScriptedFetcher::default()
            .script(&url("A"), vec![two_comments()])
            .script(&url("C"), vec![Reply::Comments(Vec::new())])
            .script(&url("D"), vec![Reply::Fail]);
        let processor = ChannelProcessor::new(config.clone(), lister, fetcher);

        let run = processor
            .process_channel("https://www.youtube.com/@chan", 3, false)
            .await
            .unwrap();

        let report = &run.report;
        assert_eq!(report.videos_processed, 2);
        assert_eq!(report.total_comments, 2);
        assert_eq!(report.channel_id, "chan");
        assert_eq!(report.videos.len(), 1);
        assert!(report.get(&url("A")).is_some());
        let statuses: Vec<VideoStatus> = report.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                VideoStatus::Processed,
                VideoStatus::SkippedAlreadyScraped,
                VideoStatus::SkippedNoComments,
                VideoStatus::FailedAfterRetries,
            ]
        );

        assert_eq!(processor.fetcher.calls_for(&url("A")), 1);
        assert_eq!(processor.fetcher.calls_for(&url("B")), 0);
        assert_eq!(processor.fetcher.calls_for(&url("C")), 1);
        assert_eq!(processor.fetcher.calls_for(&url("D")), 3);
        assert_eq!(*processor.lister.requested_limits.lock(), vec![6]);

        let ledger = Ledger::load(&config.ledger_path);
        assert!(ledger.contains("A"));
        assert!(ledger.contains("B"));
        assert!(ledger.contains("C"));
        assert!(!ledger.contains("D"));

        let artifact = run.last_artifact.as_deref().unwrap();
        assert_eq!(artifact, config.extracted_dir.join("A.csv"));
        let content = fs::read_to_string(artifact).unwrap();
        assert_eq!(content.lines().next(), Some(COMMENT_HEADER));
        assert_eq!(content.lines().count(), 3);
        assert!(run.combined_artifact.is_none());
    }

    #[tokio::test]
    async fn second_run_never_refetches_ledgered_videos() {
        let (_dir, config) = test_config();
        let videos = vec![video("A"), video("C")];
        let first = ChannelProcessor::new(
            config.clone(),
            StaticLister::new(videos.clone()),
            ScriptedFetcher::default()
                .script(&url("A"), vec![two_comments()])
                .script(&url("C"), vec![Reply::Comments(Vec::new())]),
        );
        let run = first
            .process_channel("https://www.youtube.com/@chan", 2, false)
            .await
            .unwrap();
        assert_eq!(run.report.videos_processed, 2);

        let second = ChannelProcessor::new(
            config.clone(),
            StaticLister::new(videos),
            ScriptedFetcher::default(),
        );
        let err = second
            .process_channel("https://www.youtube.com/@chan", 2, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunError::NoCommentsExtracted { candidates: 2, skipped: 2, failed: 0, .. }
        ));
        assert!(err.is_not_found());
        assert!(second.fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn stops_once_target_is_reached() {
        let (_dir, config) = test_config();
        let ids = ["v1", "v2", "v3", "v4", "v5", "v6"];
        let mut fetcher = ScriptedFetcher::default();
        for id in ids {
            fetcher = fetcher.script(&url(id), vec![two_comments()]);
        }
        let processor = ChannelProcessor::new(
            config,
            StaticLister::new(ids.iter().map(|id| video(id)).collect()),
            fetcher,
        );

        let run = processor
            .process_channel("https://www.youtube.com/@chan", 3, false)
            .await
            .unwrap();

        assert_eq!(run.report.videos_processed, 3);
        assert_eq!(run.report.results.len(), 3);
        assert_eq!(
            processor.fetcher.calls(),
            vec![url("v1"), url("v2"), url("v3")]
        );
        assert_eq!(*processor.lister.requested_limits.lock(), vec![6]);
    }

    #[tokio::test]
    async fn empty_listing_is_no_videos_found() {
        let (_dir, config) = test_config();
        let processor =
            ChannelProcessor::new(config, StaticLister::new(Vec::new()), ScriptedFetcher::default());
        let err = processor
            .process_channel("https://www.youtube.com/@empty", 1, false)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::NoVideosFound { ref channel } if channel.contains("@empty")));
        assert!(err.is_not_found());
    }

    struct BrokenLister;

    #[async_trait]
    impl VideoLister for BrokenLister {
        async fn list_channel_videos(
            &self,
            channel_url: &str,
            _limit: usize,
        ) -> Result<Vec<VideoRef>, ListError> {
            Err(ListError::Exit {
                url: channel_url.to_string(),
                status: "exit status: 1".into(),
                stderr: "ERROR: channel does not exist".into(),
            })
        }
    }

    #[tokio::test]
    async fn listing_failure_is_fatal_and_not_not_found() {
        let (_dir, config) = test_config();
        let processor = ChannelProcessor::new(config, BrokenLister, ScriptedFetcher::default());
        let err = processor
            .process_channel("https://www.youtube.com/@gone", 1, false)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Listing { .. }));
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn zero_target_is_rejected() {
        let (_dir, config) = test_config();
        let processor =
            ChannelProcessor::new(config, StaticLister::new(vec![video("A")]), ScriptedFetcher::default());
        let err = processor
            .process_channel("https://www.youtube.com/@chan", 0, false)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::InvalidTarget));
    }

    #[tokio::test]
    async fn videos_without_urls_are_skipped() {
        let (_dir, config) = test_config();
        let mut no_url = video("X");
        no_url.url = None;
        let mut bad_url = video("Y");
        bad_url.url = Some("https://youtube.com/watch".into());
        let processor = ChannelProcessor::new(
            config,
            StaticLister::new(vec![no_url, bad_url, video("A"), video("B")]),
            ScriptedFetcher::default()
                .script(&url("A"), vec![two_comments()])
                .script(&url("B"), vec![two_comments()]),
        );

        let run = processor
            .process_channel("https://www.youtube.com/@chan", 2, false)
            .await
            .unwrap();
        assert_eq!(run.report.count_with_status(VideoStatus::SkippedNoUrl), 2);
        assert_eq!(run.report.videos_processed, 2);
        assert_eq!(processor.fetcher.calls(), vec![url("A"), url("B")]);
        assert_eq!(*processor.lister.requested_limits.lock(), vec![4]);
    }

    #[tokio::test]
    async fn skips_beyond_the_overfetch_window_end_the_run_empty() {
        let (_dir, config) = test_config();
        let mut no_url = video("X");
        no_url.url = None;
        let processor = ChannelProcessor::new(
            config,
            StaticLister::new(vec![no_url.clone(), no_url, video("A")]),
            ScriptedFetcher::default().script(&url("A"), vec![two_comments()]),
        );

        let err = processor
            .process_channel("https://www.youtube.com/@chan", 1, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunError::NoCommentsExtracted { candidates: 2, skipped: 2, failed: 0, .. }
        ));
        assert!(processor.fetcher.calls().is_empty());
    }

    /// Removes a file as a side effect of fetching one particular video.
    struct FileRemovingFetcher {
        inner: ScriptedFetcher,
        trigger: String,
        doomed: PathBuf,
    }

    #[async_trait]
    impl CommentFetcher for FileRemovingFetcher {
        async fn fetch_video_comments(&self, video_url: &str) -> Result<Vec<Comment>, FetchError> {
            if video_url == self.trigger {
                let _ = fs::remove_file(&self.doomed);
            }
            self.inner.fetch_video_comments(video_url).await
        }
    }

    #[tokio::test]
    async fn failed_combined_export_keeps_the_report() {
        let (_dir, config) = test_config();
        let fetcher = FileRemovingFetcher {
            inner: ScriptedFetcher::default()
                .script(&url("A"), vec![two_comments()])
                .script(&url("B"), vec![two_comments()]),
            trigger: url("B"),
            doomed: config.extracted_dir.join("A.csv"),
        };
        let processor = ChannelProcessor::new(
            config.clone(),
            StaticLister::new(vec![video("A"), video("B")]),
            fetcher,
        );

        let run = processor
            .process_channel("https://www.youtube.com/@chan", 2, true)
            .await
            .unwrap();

        assert_eq!(run.report.videos_processed, 2);
        assert!(run.combined_artifact.is_none());
        assert!(run.combined_error.as_deref().unwrap().contains("A.csv"));
        assert_eq!(run.artifact_path(), Some(config.extracted_dir.join("B.csv").as_path()));
        let ledger = Ledger::load(&config.ledger_path);
        assert!(ledger.contains("A"));
        assert!(ledger.contains("B"));
    }

    #[tokio::test]
    async fn artifact_write_failure_leaves_video_for_later() {
        let (_dir, config) = test_config();
        fs::create_dir_all(config.extracted_dir.join("A.csv")).unwrap();
        let processor = ChannelProcessor::new(
            config.clone(),
            StaticLister::new(vec![video("A"), video("B")]),
            ScriptedFetcher::default()
                .script(&url("A"), vec![two_comments()])
                .script(&url("B"), vec![two_comments()]),
        );

        let run = processor
            .process_channel("https://www.youtube.com/@chan", 2, false)
            .await
            .unwrap();
        assert_eq!(run.report.videos_processed, 1);
        assert_eq!(run.report.results[0].status, VideoStatus::ArtifactWriteFailed);
        assert_eq!(run.report.results[0].comment_count, 2);
        let ledger = Ledger::load(&config.ledger_path);
        assert!(!ledger.contains("A"));
        assert!(ledger.contains("B"));
    }

    #[tokio::test]
    async fn ledger_persist_failure_does_not_abort_run() {
        let (dir, mut config) = test_config();
        config.ledger_path = dir.path().join("ledger-dir");
        fs::create_dir_all(&config.ledger_path).unwrap();
        let processor = ChannelProcessor::new(
            config,
            StaticLister::new(vec![video("A"), video("A"), video("B")]),
            ScriptedFetcher::default()
                .script(&url("A"), vec![two_comments()])
                .script(&url("B"), vec![two_comments()]),
        );

        let run = processor
            .process_channel("https://www.youtube.com/@chan", 2, false)
            .await
            .unwrap();
        assert_eq!(run.report.videos_processed, 2);
        // The in-memory ledger still prevents a repeat within the run.
        assert_eq!(run.report.results[1].status, VideoStatus::SkippedAlreadyScraped);
        assert_eq!(processor.fetcher.calls_for(&url("A")), 1);
    }

    #[tokio::test]
    async fn combined_export_merges_run_artifacts_in_order() {
        let (_dir, config) = test_config();
        let processor = ChannelProcessor::new(
            config.clone(),
            StaticLister::new(vec![video("A"), video("C"), video("B")]),
            ScriptedFetcher::default()
                .script(&url("A"), vec![two_comments()])
                .script(&url("C"), vec![Reply::Comments(Vec::new())])
                .script(&url("B"), vec![Reply::Comments(vec![comment("b1", "only")])]),
        )
        .with_backoff(|_: u32| Duration::ZERO);

        let run = processor
            .process_channel("https://www.youtube.com/@chan", 3, true)
            .await
            .unwrap();

        let combined = run.combined_artifact.clone().unwrap();
        assert_eq!(run.artifact_path(), Some(combined.as_path()));
        assert_eq!(run.last_artifact, Some(config.extracted_dir.join("B.csv")));
        let name = combined.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("combined_chan_"));

        let content = fs::read_to_string(&combined).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with(COMMENT_HEADER));
        assert!(lines[1].starts_with("c1,"));
        assert!(lines[2].starts_with("c2,"));
        assert!(lines[3].starts_with("b1,"));
        assert!(lines[3].contains(&url("B")));
    }

    #[tokio::test]
    async fn combined_export_without_artifacts_falls_back() {
        let (_dir, config) = test_config();
        let processor = ChannelProcessor::new(
            config,
            StaticLister::new(vec![video("C")]),
            ScriptedFetcher::default().script(&url("C"), vec![Reply::Comments(Vec::new())]),
        );
        let run = processor
            .process_channel("https://www.youtube.com/@chan", 1, true)
            .await
            .unwrap();
        assert_eq!(run.report.videos_processed, 1);
        assert!(run.combined_artifact.is_none());
        assert!(run.artifact_path().is_none());
    }
}
