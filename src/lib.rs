//! Channel comment extraction on top of yt-dlp.
//!
//! [`channel::ChannelProcessor`] drives a run: it lists a channel's uploads,
//! skips videos recorded in the [`ledger::Ledger`], extracts the rest with
//! bounded retries and writes one CSV per video.

pub mod channel;
pub mod config;
pub mod error;
pub mod export;
pub mod ledger;
pub mod model;
pub mod retry;
pub mod source;
pub mod urls;
pub mod ytdlp;
