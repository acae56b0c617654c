//! The two things we need from a scraping backend.

use async_trait::async_trait;

use crate::error::{FetchError, ListError};
use crate::model::{Comment, VideoRef};

#[async_trait]
pub trait VideoLister: Send + Sync {
    /// Returns at most `limit` videos of the channel, newest first.
    async fn list_channel_videos(
        &self,
        channel_url: &str,
        limit: usize,
    ) -> Result<Vec<VideoRef>, ListError>;
}

#[async_trait]
pub trait CommentFetcher: Send + Sync {
    /// Extracts every comment of one video. An empty list is a valid answer.
    async fn fetch_video_comments(&self, video_url: &str) -> Result<Vec<Comment>, FetchError>;
}
