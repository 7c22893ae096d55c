use std::path::Path;
use icu_segmenter::WordSegmenter;
use tokio::fs;
use tracing::info;

use crate::error::{JimakuError, Result};
use crate::pipeline::Segment;

/// Reference line width for subtitle wrapping, in characters.
pub const BASE_LINE_WIDTH: usize = 42;

/// Minimum duration given to a segment whose end does not follow its start.
const MIN_DURATION: f64 = 0.001;

/// Shift segments so each starts no earlier than the previous one ended and
/// lasts at least one millisecond.
pub fn repair_intervals(segments: &[Segment]) -> Vec<Segment> {
    let mut previous_end = 0.0_f64;
    segments
        .iter()
        .map(|segment| {
            let start = segment.start.max(previous_end);
            let end = segment.end.max(start + MIN_DURATION);
            previous_end = end;
            Segment {
                start,
                end,
                text: segment.text.clone(),
            }
        })
        .collect()
}

/// Format time in seconds to SRT time format (HH:MM:SS,mmm)
pub fn format_timestamp(seconds: f64) -> String {
    let total_micros = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1_000_000.0).round() as u64
    } else {
        0
    };
    let total_milliseconds = total_micros / 1_000;

    let hours = total_milliseconds / 3_600_000;
    let minutes = (total_milliseconds % 3_600_000) / 60_000;
    let secs = (total_milliseconds % 60_000) / 1_000;
    let millis = total_milliseconds % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

/// Split text into word-like units, spaces and punctuation included.
/// Scripts written without spaces (Thai, Lao, Khmer, CJK) go through the segmenter's dictionaries.
fn word_units(text: &str) -> Vec<&str> {
    let breaks: Vec<usize> = WordSegmenter::new_dictionary().segment_str(text).collect();
    breaks
        .windows(2)
        .map(|pair| &text[pair[0]..pair[1]])
        .filter(|unit| !unit.is_empty())
        .collect()
}

/// Break subtitle text into at most two lines on word boundaries.
pub fn wrap_text(text: &str) -> String {
    let text = text.trim();
    let length = text.chars().count();
    let ratio = length as f64 / BASE_LINE_WIDTH as f64;

    if ratio <= 1.5 {
        return text.to_string();
    }

    let max_chars = if ratio <= 2.5 {
        BASE_LINE_WIDTH
    } else if ratio <= 3.0 {
        length / 2
    } else {
        length / 3
    }
    .max(BASE_LINE_WIDTH);

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for token in word_units(text) {
        let token_len = token.chars().count();
        if current_len + token_len <= max_chars || current.is_empty() {
            current.push_str(token);
            current_len += token_len;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(token);
            current_len = token_len;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }

    // Overflow joins the second line so a cue never exceeds two rows.
    if lines.len() > 2 {
        let overflow: String = lines.drain(1..).collect();
        lines.push(overflow);
    }

    lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render segments as an SRT document after interval repair.
pub fn render(segments: &[Segment]) -> String {
    let entries: Vec<String> = repair_intervals(segments)
        .iter()
        .enumerate()
        .map(|(index, segment)| {
            format!(
                "{}\n{} --> {}\n{}",
                index + 1,
                format_timestamp(segment.start),
                format_timestamp(segment.end),
                wrap_text(&segment.text)
            )
        })
        .collect();

    if entries.is_empty() {
        return String::new();
    }

    let mut document = entries.join("\n\n");
    document.push('\n');
    document
}

/// Generate SRT subtitle file from segments
pub async fn write<P: AsRef<Path>>(segments: &[Segment], output_path: P) -> Result<()> {
    let output_path = output_path.as_ref();
    info!("Generating SRT file: {}", output_path.display());

    let storage_error = |source| JimakuError::Storage {
        path: output_path.to_path_buf(),
        source,
    };

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(storage_error)?;
    }

    fs::write(output_path, render(segments))
        .await
        .map_err(storage_error)?;

    info!(
        "Subtitles generated successfully: {} ({} entries)",
        output_path.display(),
        segments.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00:00,000");
        assert_eq!(format_timestamp(65.123), "00:01:05,123");
        assert_eq!(format_timestamp(3661.500), "01:01:01,500");
        assert_eq!(format_timestamp(3725.4), "01:02:05,400");
    }

    #[test]
    fn test_format_timestamp_truncates_and_clamps() {
        assert_eq!(format_timestamp(1.2349), "00:00:01,234");
        assert_eq!(format_timestamp(0.0009), "00:00:00,000");
        assert_eq!(format_timestamp(-3.0), "00:00:00,000");
        assert_eq!(format_timestamp(f64::NAN), "00:00:00,000");
    }

    #[test]
    fn test_repair_overlapping_segments() {
        let input = vec![Segment::new(0.0, 2.0, "a"), Segment::new(1.0, 3.0, "b")];
        let repaired = repair_intervals(&input);

        assert_eq!(repaired[0].start, 0.0);
        assert_eq!(repaired[0].end, 2.0);
        assert_eq!(repaired[1].start, 2.0);
        assert_eq!(repaired[1].end, 3.0);
    }

    #[test]
    fn test_repair_gives_zero_length_segments_a_millisecond() {
        let input = vec![
            Segment::new(1.0, 1.0, "a"),
            Segment::new(0.5, 0.8, "b"),
            Segment::new(5.0, 4.0, "c"),
        ];
        let repaired = repair_intervals(&input);

        for pair in repaired.windows(2) {
            assert!(pair[1].start >= pair[0].end);
        }
        for segment in &repaired {
            assert!(segment.end > segment.start);
        }
        assert_eq!(repaired[1].text, "b");
    }

    #[test]
    fn test_repair_is_idempotent() {
        let input = vec![
            Segment::new(0.0, 1.5, "a"),
            Segment::new(1.5, 2.0, "b"),
            Segment::new(4.0, 6.25, "c"),
        ];
        let once = repair_intervals(&input);
        assert_eq!(once, input);
        assert_eq!(repair_intervals(&once), once);
        assert_eq!(render(&once), render(&input));
    }

    #[test]
    fn test_short_text_stays_on_one_line() {
        assert_eq!(wrap_text("  Hello there, how are you?  "), "Hello there, how are you?");
        let sixty = "word ".repeat(12);
        assert_eq!(wrap_text(&sixty), sixty.trim());
    }

    #[test]
    fn test_medium_text_wraps_at_base_width() {
        let text = "The quick brown fox jumps over the lazy dog while the farmer watches from the porch";
        let wrapped = wrap_text(text);
        let lines: Vec<&str> = wrapped.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].chars().count() <= BASE_LINE_WIDTH);
        assert_eq!(lines.join(" "), text);
    }

    #[test]
    fn test_long_text_is_capped_at_two_lines() {
        let text = "lorem ipsum dolor sit amet ".repeat(10);
        let wrapped = wrap_text(&text);
        let lines: Vec<&str> = wrapped.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines.join(" "), text.trim());
    }

    #[test]
    fn test_wrap_counts_characters_not_bytes() {
        let thai = "สวัสดีครับ วันนี้เราจะมาเรียนรู้เรื่องการทำอาหาร";
        assert_eq!(wrap_text(thai), thai);
    }

    #[test]
    fn test_long_thai_text_breaks_between_words() {
        let words = [
            "วันนี้", "เรา", "จะ", "ไป", "กิน", "ข้าว", "ที่", "บ้าน", "กัน", "นะ", "ครับ",
        ];
        let sentence = words.concat();
        let text = vec![sentence.as_str(); 4].join(" ");
        let wrapped = wrap_text(&text);
        let lines: Vec<&str> = wrapped.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(words.iter().any(|w| lines[0].ends_with(w)), "line 1 ends mid-word: {}", lines[0]);
        assert!(words.iter().any(|w| lines[1].starts_with(w)), "line 2 starts mid-word: {}", lines[1]);
        assert_eq!(lines.concat().replace(' ', ""), text.replace(' ', ""));
    }

    #[test]
    fn test_render_layout() {
        let segments = vec![
            Segment::new(0.0, 1.0, "Hello"),
            Segment::new(1.0, 2.5, "World"),
        ];
        assert_eq!(
            render(&segments),
            "1\n00:00:00,000 --> 00:00:01,000\nHello\n\n2\n00:00:01,000 --> 00:00:02,500\nWorld\n"
        );
    }

    #[test]
    fn test_render_empty_is_empty() {
        assert_eq!(render(&[]), "");
    }

    #[tokio::test]
    async fn test_write_creates_parent_directories() {
        let temp = assert_fs::TempDir::new().unwrap();
        let output = temp.child("out/nested/video_th.srt");

        write(&[Segment::new(0.0, 2.0, "สวัสดี")], output.path())
            .await
            .unwrap();

        output.assert("1\n00:00:00,000 --> 00:00:02,000\nสวัสดี\n");
    }

    #[tokio::test]
    async fn test_write_empty_segments_creates_empty_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let output = temp.child("empty.srt");

        write(&[], output.path()).await.unwrap();

        output.assert("");
    }

    #[tokio::test]
    async fn test_write_failure_reports_path() {
        let temp = assert_fs::TempDir::new().unwrap();
        let blocker = temp.child("blocker");
        blocker.write_str("not a directory").unwrap();
        let output = blocker.path().join("video.srt");

        let err = write(&[Segment::new(0.0, 1.0, "a")], &output)
            .await
            .unwrap_err();

        match err {
            JimakuError::Storage { path, .. } => assert_eq!(path, output),
            other => panic!("unexpected error: {other}"),
        }
    }
}
