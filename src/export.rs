//! CSV artifacts: one file per processed video plus an optional combined file
//! for the whole run.
//!
//! Fields never contain double quotes or line breaks (they are rewritten to
//! `'` and spaces), so every record is exactly one line and the combined file
//! can be built by concatenating data lines.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tempfile::NamedTempFile;

use crate::error::ArtifactError;
use crate::model::{Comment, VideoSummary};

pub const COMMENT_HEADER: &str =
    "comment_id,text,likes,author,author_id,timestamp,time_text,is_pinned";
pub const COMBINED_EXTRA_COLUMNS: &str = "channel_id,video_url,video_title,upload_date";
pub const MAX_COMMENT_CHARS: usize = 2000;

/// Rewrites characters that would break a one-line CSV record.
pub fn sanitize_field(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_space = false;
    for c in value.chars() {
        match c {
            '\r' | '\n' => pending_space = true,
            _ => {
                if pending_space {
                    out.push(' ');
                    pending_space = false;
                }
                out.push(if c == '"' { '\'' } else { c });
            }
        }
    }
    if pending_space {
        out.push(' ');
    }
    out
}

/// Bounds comment text and makes it CSV-safe.
pub fn normalize_comment_text(raw: &str) -> String {
    let bounded: String = raw.chars().take(MAX_COMMENT_CHARS).collect();
    sanitize_field(&bounded)
}

fn csv_field(value: &str) -> String {
    let clean = sanitize_field(value);
    if clean.contains(',') {
        format!("\"{clean}\"")
    } else {
        clean
    }
}

fn comment_row(comment: &Comment) -> String {
    format!(
        "{},\"{}\",{},{},{},{},{},{}",
        csv_field(&comment.id),
        sanitize_field(&comment.text),
        comment.like_count,
        csv_field(&comment.author),
        csv_field(comment.author_id.as_deref().unwrap_or_default()),
        comment
            .timestamp
            .map(|ts| ts.to_string())
            .unwrap_or_default(),
        csv_field(comment.display_time.as_deref().unwrap_or_default()),
        comment.is_pinned,
    )
}

/// Writes `<dir>/<video_id>.csv`, replacing any earlier file for the video.
pub fn write_video_artifact(
    dir: &Path,
    video_id: &str,
    comments: &[Comment],
) -> Result<PathBuf, ArtifactError> {
    let path = dir.join(format!("{}.csv", file_safe(video_id)));
    write_replacing(dir, &path, |writer, out_err| {
        writeln!(writer, "{COMMENT_HEADER}").map_err(out_err)?;
        for comment in comments {
            writeln!(writer, "{}", comment_row(comment)).map_err(out_err)?;
        }
        Ok(())
    })?;
    Ok(path)
}

/// Concatenates the per-video artifacts of one run, in the order given,
/// under a single header with channel and video columns appended.
pub fn write_combined_artifact(
    dir: &Path,
    channel_id: &str,
    videos: &[VideoSummary],
    now: DateTime<Local>,
) -> Result<PathBuf, ArtifactError> {
    if videos.is_empty() {
        return Err(ArtifactError::Empty);
    }

    let path = dir.join(combined_artifact_name(channel_id, now));
    write_replacing(dir, &path, |writer, out_err| {
        writeln!(writer, "{COMMENT_HEADER},{COMBINED_EXTRA_COLUMNS}").map_err(out_err)?;

        for video in videos {
            let suffix = [
                csv_field(channel_id),
                csv_field(&video.url),
                csv_field(&video.title),
                csv_field(video.upload_date.as_deref().unwrap_or("N/A")),
            ]
            .join(",");

            let in_err = |source| ArtifactError::Io {
                path: video.artifact_path.clone(),
                source,
            };
            let reader = BufReader::new(File::open(&video.artifact_path).map_err(in_err)?);
            for line in reader.lines().skip(1) {
                let line = line.map_err(in_err)?;
                if line.trim().is_empty() {
                    continue;
                }
                writeln!(writer, "{line},{suffix}").map_err(out_err)?;
            }
        }
        Ok(())
    })?;
    Ok(path)
}

/// Fills a temp file in `dir` and renames it over `path`, so `path` is
/// either the old file or the complete new one.
fn write_replacing<F>(dir: &Path, path: &Path, fill: F) -> Result<(), ArtifactError>
where
    F: FnOnce(&mut BufWriter<&File>, &dyn Fn(io::Error) -> ArtifactError) -> Result<(), ArtifactError>,
{
    let out_err = |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    };
    let staged = NamedTempFile::new_in(dir).map_err(out_err)?;
    {
        let mut writer = BufWriter::new(staged.as_file());
        fill(&mut writer, &out_err)?;
        writer.flush().map_err(out_err)?;
    }
    staged.persist(path).map_err(|err| out_err(err.error))?;
    Ok(())
}

pub fn combined_artifact_name(channel_id: &str, now: DateTime<Local>) -> String {
    format!(
        "combined_{}_{}.csv",
        file_safe(channel_id),
        now.format("%Y%m%d_%H%M%S")
    )
}

/// Makes an id usable as a file name component.
fn file_safe(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | ' ' | '?' | '*' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// Ensures the artifact directory exists.
pub fn prepare_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}
