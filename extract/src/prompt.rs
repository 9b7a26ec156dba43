//! Per-category prompt construction from a video's transcript and commentary.

use crate::category::Category;
use crate::normalize::{MAX_ISSUES, MAX_PRIORITY_ACTIONS, MAX_STRENGTHS};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;

/// One transcript line with its time span in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start, seconds from the beginning.
    pub start: f64,
    /// End, seconds from the beginning.
    pub end: f64,
    /// Spoken text.
    pub text: String,
}

/// Everything known about the video being analysed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoContext {
    /// Working title.
    pub title: String,
    /// Total length in seconds, 0 when unknown.
    #[serde(default)]
    pub duration_secs: f64,
    /// Timed transcript lines in playback order.
    #[serde(default)]
    pub transcript: Vec<TranscriptSegment>,
    /// Free-form notes produced by an earlier pass over the footage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commentary: Option<String>,
}

/// `mm:ss`, or `h:mm:ss` past the first hour. Negative input clamps to zero.
#[must_use]
pub fn format_timestamp(secs: f64) -> String {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let total = if secs.is_finite() && secs > 0.0 {
        secs.floor() as u64
    } else {
        0
    };
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

/// Renders the prompt for `category`, embedding `schema` as the required
/// output shape.
#[must_use]
pub fn build_prompt(category: Category, video: &VideoContext, schema: &Value) -> String {
    let mut prompt = String::new();
    let title = if video.title.trim().is_empty() {
        "Untitled video"
    } else {
        video.title.trim()
    };

    let _ = writeln!(
        prompt,
        "You are an experienced video editor reviewing \"{title}\" ({}).",
        format_timestamp(video.duration_secs)
    );
    let _ = writeln!(prompt, "\nFocus area: {category}\n{}", category.brief());

    prompt.push_str("\nTranscript:\n");
    if video.transcript.is_empty() {
        prompt.push_str("(no transcript available)\n");
    }
    for segment in &video.transcript {
        let _ = writeln!(
            prompt,
            "[{}] {}",
            format_timestamp(segment.start),
            segment.text.trim()
        );
    }

    if let Some(commentary) = video.commentary.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        let _ = writeln!(prompt, "\nFootage commentary:\n{commentary}");
    }

    let _ = writeln!(
        prompt,
        "\nRules:\n\
         - score is a number between 0 and 1.\n\
         - At most {MAX_ISSUES} issues, {MAX_STRENGTHS} strengths and {MAX_PRIORITY_ACTIONS} priority actions.\n\
         - severity is one of: critical, major, minor, suggestion.\n\
         - issue type is one of: cut, trim, reorder, add_broll, add_text, add_music, audio_fix, color_correction, rewrite, other.\n\
         - issue category is one of: hook, scripting, pacing, visual_editing, audio, retention, engagement, technical.\n\
         - timestamps are {{\"start\": seconds, \"end\": seconds}}."
    );

    let schema_text = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    let _ = writeln!(
        prompt,
        "\nRespond with a single JSON object matching this schema, with no prose and no code fences:\n{schema_text}"
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn video() -> VideoContext {
        VideoContext {
            title: "Desk setup tour".into(),
            duration_secs: 754.0,
            transcript: vec![
                TranscriptSegment {
                    start: 0.0,
                    end: 4.2,
                    text: "Hey everyone ".into(),
                },
                TranscriptSegment {
                    start: 65.5,
                    end: 70.0,
                    text: "Here's the monitor arm".into(),
                },
            ],
            commentary: Some("Camera drifts out of focus around 1:10".into()),
        }
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(65.9), "01:05");
        assert_eq!(format_timestamp(3723.0), "1:02:03");
        assert_eq!(format_timestamp(-3.0), "00:00");
        assert_eq!(format_timestamp(f64::NAN), "00:00");
    }

    #[test]
    fn test_prompt_contains_transcript_markers_and_schema() {
        let schema = json!({"type": "object", "required": ["segments"]});
        let prompt = build_prompt(Category::Pacing, &video(), &schema);

        assert!(prompt.contains("\"Desk setup tour\" (12:34)"));
        assert!(prompt.contains("Focus area: pacing"));
        assert!(prompt.contains(Category::Pacing.brief()));
        assert!(prompt.contains("[00:00] Hey everyone\n"));
        assert!(prompt.contains("[01:05] Here's the monitor arm"));
        assert!(prompt.contains("Camera drifts out of focus"));
        assert!(prompt.contains("\"segments\""));
        assert!(prompt.contains("At most 10 issues, 5 strengths and 3 priority actions"));
    }

    #[test]
    fn test_prompt_without_transcript_or_commentary() {
        let prompt = build_prompt(Category::Hook, &VideoContext::default(), &json!({}));
        assert!(prompt.contains("Untitled video"));
        assert!(prompt.contains("(no transcript available)"));
        assert!(!prompt.contains("Footage commentary"));
    }

    #[test]
    fn test_video_context_deserialises_camel_case() {
        let ctx: VideoContext = serde_json::from_value(json!({
            "title": "t",
            "durationSecs": 30,
            "transcript": [{"start": 0, "end": 1, "text": "hi"}]
        }))
        .unwrap();
        assert!((ctx.duration_secs - 30.0).abs() < f64::EPSILON);
        assert_eq!(ctx.transcript.len(), 1);
        assert!(ctx.commentary.is_none());
    }
}
