//! Helpers for the handful of YouTube URL shapes we deal with.

use url::Url;

/// Derives the platform video id from a video URL.
///
/// Understands `watch?v=`, `youtu.be/<id>`, `/shorts/<id>`, `/embed/<id>` and
/// `/live/<id>` and bare 11-character ids. Other video links fall back to
/// their last path segment; channel pages yield `None`.
pub fn video_id_from_url(video_url: &str) -> Option<String> {
    let trimmed = video_url.trim();
    if trimmed.is_empty() {
        return None;
    }
    if is_bare_video_id(trimmed) {
        return Some(trimmed.to_string());
    }
    let parsed = match Url::parse(trimmed) {
        Ok(parsed) => parsed,
        // Schemeless links ("youtube.com/watch?v=...").
        Err(_) => Url::parse(&format!("https://{trimmed}")).ok()?,
    };

    if let Some((_, id)) = parsed.query_pairs().find(|(key, _)| key == "v") {
        return non_empty(&id);
    }

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    let host = parsed.host_str().unwrap_or_default();
    if host.ends_with("youtu.be") {
        return segments.first().and_then(|id| non_empty(id));
    }

    for window in segments.windows(2) {
        if matches!(window[0], "shorts" | "embed" | "live" | "v") {
            return non_empty(window[1]);
        }
    }

    let is_channel_page = match segments.first() {
        Some(first) => first.starts_with('@') || CHANNEL_PREFIXES.contains(first),
        None => false,
    };
    if is_channel_page {
        return None;
    }
    match segments.last() {
        Some(last) if *last != "watch" => non_empty(last),
        _ => None,
    }
}

const CHANNEL_PREFIXES: [&str; 3] = ["channel", "c", "user"];
const VIDEO_ID_LEN: usize = 11;

fn is_bare_video_id(value: &str) -> bool {
    value.len() == VIDEO_ID_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Short identifier for a channel URL, used in export names.
///
/// `https://www.youtube.com/@handle/videos` gives `handle`,
/// `/channel/UC...` gives the channel id.
pub fn channel_id_from_url(channel_url: &str) -> String {
    let trimmed = channel_url.trim();
    if let Some((_, after)) = trimmed.rsplit_once('@') {
        let handle = after.split(['/', '?', '#']).next().unwrap_or_default();
        if !handle.is_empty() {
            return handle.to_string();
        }
    }

    let path_segments: Vec<String> = Url::parse(trimmed)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .map(|segments| segments.filter(|s| !s.is_empty()).map(str::to_string).collect())
        })
        .unwrap_or_default();

    for window in path_segments.windows(2) {
        if CHANNEL_PREFIXES.contains(&window[0].as_str()) {
            return window[1].clone();
        }
    }
    path_segments
        .iter()
        .rev()
        .find(|segment| !matches!(segment.as_str(), "videos" | "shorts" | "streams" | "featured"))
        .cloned()
        .unwrap_or_else(|| "channel".to_string())
}

/// Points a channel URL at its uploads tab without doubling `/videos`.
pub fn build_channel_videos_url(channel_url: &str) -> String {
    let (without_fragment, fragment) = match channel_url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (channel_url, None),
    };
    let (base, query) = match without_fragment.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (without_fragment, None),
    };

    let base = base.trim_end_matches('/');
    let mut result = if base.ends_with("/videos") {
        base.to_string()
    } else {
        format!("{base}/videos")
    };

    if let Some(query) = query {
        result.push('?');
        result.push_str(query);
    }
    if let Some(fragment) = fragment {
        result.push('#');
        result.push_str(fragment);
    }

    result
}

/// Canonical watch URL for a video id.
pub fn watch_url(video_id: &str) -> String {
    format!("https://youtube.com/watch?v={video_id}")
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
