use std::path::Path;

use async_trait::async_trait;
use regex::Regex;

use crate::application::ports::{SubtitleParseError, SubtitleParser};
use crate::domain::{SubtitleSegment, SubtitleTrack};

/// Format-sniffing subtitle parser for SRT, VTT, YouTube word-level VTT,
/// and ASS/SSA.
///
/// Parsing is best-effort: individually malformed cues are skipped and the
/// preceding segments recovered. A file that yields nothing at all from a
/// recognized format is reported as malformed.
pub struct SniffingSubtitleParser;

#[async_trait]
impl SubtitleParser for SniffingSubtitleParser {
    async fn parse(&self, path: &Path) -> Result<SubtitleTrack, SubtitleParseError> {
        let raw = tokio::fs::read(path).await?;
        let content = String::from_utf8_lossy(&raw);
        parse_content(&content, extension_hint(path))
    }
}

fn extension_hint(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Sniff the format from content, with the file extension as a tiebreak.
pub fn parse_content(
    content: &str,
    ext: Option<String>,
) -> Result<SubtitleTrack, SubtitleParseError> {
    let trimmed = content.trim_start_matches('\u{feff}').trim_start();

    let track = if trimmed.starts_with("WEBVTT") {
        if content.contains("<c>") {
            parse_youtube_vtt(content)
        } else {
            parse_vtt(content)
        }
    } else if trimmed.starts_with("[Script Info]") || content.contains("\nDialogue:") {
        parse_ass(content)
    } else if looks_like_srt(trimmed) {
        parse_srt(content)
    } else {
        match ext.as_deref() {
            Some("srt") => parse_srt(content),
            Some("vtt") => {
                if content.contains("<c>") {
                    parse_youtube_vtt(content)
                } else {
                    parse_vtt(content)
                }
            }
            Some("ass") | Some("ssa") | Some("sub") => parse_ass(content),
            _ => {
                return Err(SubtitleParseError::UnsupportedFormat(
                    "no recognizable subtitle header".to_string(),
                ))
            }
        }
    };

    let track = track.normalize();
    if track.is_empty() {
        return Err(SubtitleParseError::Malformed(
            "no cues could be recovered".to_string(),
        ));
    }
    Ok(track)
}

fn looks_like_srt(content: &str) -> bool {
    content.contains("-->")
        && Regex::new(r"\d{2}:\d{2}:\d{1,2}[.,]\d{3}\s*-->")
            .map(|re| re.is_match(content))
            .unwrap_or(false)
}

fn timestamp_ms(h: &str, m: &str, s: &str, frac: &str) -> u64 {
    let h: u64 = h.parse().unwrap_or(0);
    let m: u64 = m.parse().unwrap_or(0);
    let s: u64 = s.parse().unwrap_or(0);
    let frac: u64 = frac.parse().unwrap_or(0);
    h * 3_600_000 + m * 60_000 + s * 1000 + frac
}

/// SRT: numbered blocks separated by blank lines, comma (or dot)
/// millisecond separators.
pub fn parse_srt(content: &str) -> SubtitleTrack {
    let time_re = Regex::new(
        r"(\d{2}):(\d{2}):(\d{1,2})[.,](\d{3})\s*-->\s*(\d{2}):(\d{2}):(\d{1,2})[.,](\d{3})",
    )
    .expect("static regex");

    let mut segments = Vec::new();
    for block in content.split("\n\n").map(str::trim) {
        if block.is_empty() {
            continue;
        }
        let lines: Vec<&str> = block.lines().collect();
        // Timestamp sits on the first or second line depending on whether
        // the cue index is present.
        let (caps, text_start) = match lines.iter().take(2).enumerate().find_map(|(i, &line)| {
            time_re.captures(line).map(|c| (c, i + 1))
        }) {
            Some(found) => found,
            None => continue,
        };

        let start = timestamp_ms(&caps[1], &caps[2], &caps[3], &caps[4]);
        let end = timestamp_ms(&caps[5], &caps[6], &caps[7], &caps[8]);
        let text = lines[text_start..].join(" ");
        let text = text.trim();
        if !text.is_empty() {
            segments.push(SubtitleSegment::new(text, start, end));
        }
    }
    SubtitleTrack::new(segments)
}

/// Plain WEBVTT without word-level tags.
pub fn parse_vtt(content: &str) -> SubtitleTrack {
    let time_re = Regex::new(
        r"(?:(\d{2,}):)?(\d{2}):(\d{2})\.(\d{3})\s*-->\s*(?:(\d{2,}):)?(\d{2}):(\d{2})\.(\d{3})",
    )
    .expect("static regex");
    let tag_re = Regex::new(r"<[^>]*>").expect("static regex");

    let mut segments = Vec::new();
    for block in content.split("\n\n").map(str::trim) {
        let lines: Vec<&str> = block.lines().collect();
        let Some((idx, caps)) = lines
            .iter()
            .take(2)
            .enumerate()
            .find_map(|(i, &line)| time_re.captures(line).map(|c| (i, c)))
        else {
            continue;
        };

        let start = timestamp_ms(
            caps.get(1).map_or("0", |m| m.as_str()),
            &caps[2],
            &caps[3],
            &caps[4],
        );
        let end = timestamp_ms(
            caps.get(5).map_or("0", |m| m.as_str()),
            &caps[6],
            &caps[7],
            &caps[8],
        );

        let text = lines[idx + 1..].join(" ");
        let text = tag_re.replace_all(&text, "");
        let text = text.trim();
        if !text.is_empty() {
            segments.push(SubtitleSegment::new(text, start, end));
        }
    }
    SubtitleTrack::new(segments)
}

/// YouTube auto-caption VTT with `<c>` word tags: each timestamped word
/// becomes its own segment.
pub fn parse_youtube_vtt(content: &str) -> SubtitleTrack {
    let cue_re = Regex::new(
        r"(\d{2}):(\d{2}):(\d{2})\.(\d{3})\s*-->\s*(\d{2}):(\d{2}):(\d{2})\.(\d{3})",
    )
    .expect("static regex");
    let word_re = Regex::new(r"<(\d{2}):(\d{2}):(\d{2})\.(\d{3})>([^<]*)").expect("static regex");

    let mut segments = Vec::new();
    for block in content.split("\n\n").map(str::trim) {
        let mut lines = block.lines();
        let Some(first) = lines.next() else { continue };
        let Some(caps) = cue_re.captures(first) else {
            continue;
        };

        let cue_start = timestamp_ms(&caps[1], &caps[2], &caps[3], &caps[4]);
        let cue_end = timestamp_ms(&caps[5], &caps[6], &caps[7], &caps[8]);

        let Some(timed_line) = lines.find(|l| l.contains("<c>")) else {
            continue;
        };
        let cleaned = timed_line.replace("<c>", "").replace("</c>", "");
        // Bracket the line with the cue boundaries so the first and last
        // words get timestamps too.
        let bracketed = format!(
            "<{}>{}<{}>",
            ms_to_stamp(cue_start),
            cleaned,
            ms_to_stamp(cue_end)
        );

        let matches: Vec<_> = word_re.captures_iter(&bracketed).collect();
        for pair in matches.windows(2) {
            let start = timestamp_ms(&pair[0][1], &pair[0][2], &pair[0][3], &pair[0][4]);
            let end = timestamp_ms(&pair[1][1], &pair[1][2], &pair[1][3], &pair[1][4]);
            let word = pair[0][5].trim();
            if !word.is_empty() {
                segments.push(SubtitleSegment::new(word, start, end));
            }
        }
    }
    SubtitleTrack::new(segments)
}

fn ms_to_stamp(ms: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        ms / 3_600_000,
        (ms / 60_000) % 60,
        (ms / 1000) % 60,
        ms % 1000
    )
}

/// ASS/SSA dialogue lines. Style overrides in braces are stripped; `\N`
/// becomes a space.
pub fn parse_ass(content: &str) -> SubtitleTrack {
    let dialogue_re = Regex::new(
        r"^Dialogue:\s*\d+,(\d+:\d{2}:\d{2}\.\d{2}),(\d+:\d{2}:\d{2}\.\d{2}),[^,]*,[^,]*,\d+,\d+,\d+,[^,]*,(.*)$",
    )
    .expect("static regex");
    let override_re = Regex::new(r"\{[^}]*\}").expect("static regex");

    fn ass_time_ms(stamp: &str) -> u64 {
        let mut parts = stamp.split(':');
        let h: u64 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let m: u64 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let rest = parts.next().unwrap_or("0.0");
        let mut sec_parts = rest.split('.');
        let s: u64 = sec_parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let cs: u64 = sec_parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        h * 3_600_000 + m * 60_000 + s * 1000 + cs * 10
    }

    let mut segments = Vec::new();
    for line in content.lines() {
        let Some(caps) = dialogue_re.captures(line) else {
            continue;
        };
        let start = ass_time_ms(&caps[1]);
        let end = ass_time_ms(&caps[2]);
        let text = override_re.replace_all(&caps[3], "");
        let text = text.replace("\\N", " ").replace("\\n", " ");
        let text = text.trim();
        if !text.is_empty() {
            segments.push(SubtitleSegment::new(text, start, end));
        }
    }
    SubtitleTrack::new(segments)
}
