//! The closed vocabularies a report is built from, and the synonym tables
//! that fold model drift back onto them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the eight independent analysis dimensions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// The opening seconds.
    Hook,
    /// Script, narration and wording.
    Scripting,
    /// Speed and rhythm across the video.
    Pacing,
    /// Cuts, b-roll, overlays and transitions.
    VisualEditing,
    /// Voice, music and noise.
    Audio,
    /// Where viewers are likely to leave.
    Retention,
    /// Calls to action and interaction.
    Engagement,
    /// Resolution, lighting, framing and export.
    Technical,
}

impl Category {
    /// Every category in default batch order.
    pub const ALL: [Self; 8] = [
        Self::Hook,
        Self::Scripting,
        Self::Pacing,
        Self::VisualEditing,
        Self::Audio,
        Self::Retention,
        Self::Engagement,
        Self::Technical,
    ];

    /// Canonical snake_case identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hook => "hook",
            Self::Scripting => "scripting",
            Self::Pacing => "pacing",
            Self::VisualEditing => "visual_editing",
            Self::Audio => "audio",
            Self::Retention => "retention",
            Self::Engagement => "engagement",
            Self::Technical => "technical",
        }
    }

    /// Name of the category-specific field in this category's report.
    #[must_use]
    pub const fn specific_field(self) -> &'static str {
        match self {
            Self::Hook => "hookAnalysis",
            Self::Scripting => "rewrites",
            Self::Pacing => "segments",
            Self::VisualEditing => "cutSuggestions",
            Self::Audio => "audioMix",
            Self::Retention => "dropOffRisks",
            Self::Engagement => "callsToAction",
            Self::Technical => "qualityChecks",
        }
    }

    /// Cap on the category-specific field when it is a list.
    #[must_use]
    pub const fn specific_limit(self) -> Option<usize> {
        match self {
            Self::Scripting | Self::Retention => Some(10),
            Self::Pacing => Some(20),
            Self::VisualEditing => Some(15),
            Self::Engagement => Some(5),
            Self::Hook | Self::Audio | Self::Technical => None,
        }
    }

    /// What the model is asked to look at.
    #[must_use]
    pub const fn brief(self) -> &'static str {
        match self {
            Self::Hook => {
                "Evaluate the first 15 seconds. Identify the hook type, whether it \
                 creates curiosity or promises value, and how quickly it gets to the point."
            }
            Self::Scripting => {
                "Evaluate the script and narration. Find filler, rambling, unclear \
                 explanations and weak phrasing, and propose concrete rewrites."
            }
            Self::Pacing => {
                "Evaluate pacing across the video. Split it into segments and mark each \
                 as too slow, good or too fast, noting dead air and rushed sections."
            }
            Self::VisualEditing => {
                "Evaluate visual editing. Suggest cuts, trims, b-roll, on-screen text and \
                 transitions, each anchored to a timestamp."
            }
            Self::Audio => {
                "Evaluate audio. Judge voice clarity, music balance against speech, \
                 background noise and level consistency."
            }
            Self::Retention => {
                "Predict where viewers are likely to drop off and why, ranking each \
                 risk by severity."
            }
            Self::Engagement => {
                "Evaluate calls to action and audience interaction. Suggest what to ask \
                 viewers to do and where in the video to ask it."
            }
            Self::Technical => {
                "Evaluate technical quality as far as the transcript and commentary \
                 reveal it: resolution, lighting, framing and export settings."
            }
        }
    }

    /// Resolves a loosely-worded category name, e.g. `"Visual Editing"` or `"b-roll"`.
    #[must_use]
    pub fn from_synonym(raw: &str) -> Option<Self> {
        let key = fold(raw);
        let found = match key.as_str() {
            "hook" | "hooks" | "opening" | "intro" | "introduction" | "first impression"
            | "thumbnail hook" => Self::Hook,
            "scripting" | "script" | "writing" | "dialogue" | "narration" | "storytelling"
            | "story" | "content" | "structure" | "messaging" => Self::Scripting,
            "pacing" | "pace" | "rhythm" | "timing" | "flow" | "speed" | "tempo" => Self::Pacing,
            "visual editing" | "visual" | "visuals" | "editing" | "video editing" | "cuts"
            | "cutting" | "b roll" | "broll" | "transitions" | "graphics" | "text overlay"
            | "color grading" | "color" | "colour" | "effects" => Self::VisualEditing,
            "audio" | "sound" | "music" | "voice" | "audio quality" | "sound design"
            | "mixing" | "audio mix" | "sound quality" => Self::Audio,
            "retention" | "audience retention" | "drop off" | "dropoff" | "watch time"
            | "viewer retention" => Self::Retention,
            "engagement" | "call to action" | "calls to action" | "cta" | "interaction"
            | "community" | "audience engagement" => Self::Engagement,
            "technical" | "technical quality" | "quality" | "video quality" | "resolution"
            | "lighting" | "framing" | "export" | "export settings" | "camera" => Self::Technical,
            _ => return None,
        };
        Some(found)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognised category name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category '{0}' (expected one of: hook, scripting, pacing, visual_editing, audio, retention, engagement, technical)")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_synonym(s).ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// How urgent an issue is. Declaration order is the aggregation sort order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Breaks the video; fix before publishing.
    Critical,
    /// Clearly hurts watch time or clarity.
    Major,
    /// Noticeable but small.
    Minor,
    /// Optional polish.
    Suggestion,
}

impl Severity {
    /// Canonical identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Suggestion => "suggestion",
        }
    }

    /// Resolves drifted severity words, e.g. `"high"` or `"Medium"`.
    #[must_use]
    pub fn from_synonym(raw: &str) -> Option<Self> {
        let found = match fold(raw).as_str() {
            "critical" | "high" | "very high" | "highest" | "severe" | "blocker" | "urgent"
            | "p0" | "error" => Self::Critical,
            "major" | "medium" | "moderate" | "important" | "significant" | "p1"
            | "warning" => Self::Major,
            "minor" | "low" | "small" | "trivial" | "cosmetic" | "p2" => Self::Minor,
            "suggestion" | "info" | "informational" | "tip" | "note" | "optional"
            | "nice to have" | "enhancement" | "idea" | "p3" => Self::Suggestion,
            _ => return None,
        };
        Some(found)
    }
}

/// Kind of edit an issue proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    /// Remove a section.
    Cut,
    /// Shorten a section.
    Trim,
    /// Move a section elsewhere.
    Reorder,
    /// Cover with b-roll.
    AddBroll,
    /// Add on-screen text.
    AddText,
    /// Add or change music.
    AddMusic,
    /// Fix levels, noise or clarity.
    AudioFix,
    /// Correct color or exposure.
    ColorCorrection,
    /// Reword narration.
    Rewrite,
    /// Anything else.
    Other,
}

impl IssueType {
    /// Canonical identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cut => "cut",
            Self::Trim => "trim",
            Self::Reorder => "reorder",
            Self::AddBroll => "add_broll",
            Self::AddText => "add_text",
            Self::AddMusic => "add_music",
            Self::AudioFix => "audio_fix",
            Self::ColorCorrection => "color_correction",
            Self::Rewrite => "rewrite",
            Self::Other => "other",
        }
    }

    /// Resolves drifted issue-type words, e.g. `"b-roll"` or `"Remove"`.
    #[must_use]
    pub fn from_synonym(raw: &str) -> Option<Self> {
        let found = match fold(raw).as_str() {
            "cut" | "remove" | "delete" | "cut out" | "removal" => Self::Cut,
            "trim" | "shorten" | "tighten" | "condense" => Self::Trim,
            "reorder" | "rearrange" | "move" | "restructure" | "reposition" => Self::Reorder,
            "add broll" | "add b roll" | "broll" | "b roll" | "cutaway" | "insert broll" => {
                Self::AddBroll
            }
            "add text" | "text" | "text overlay" | "caption" | "captions" | "subtitle"
            | "subtitles" | "title" | "lower third" => Self::AddText,
            "add music" | "music" | "soundtrack" | "background music" => Self::AddMusic,
            "audio fix" | "audio" | "sound" | "noise" | "volume" | "audio issue"
            | "audio levels" => Self::AudioFix,
            "color correction" | "color" | "colour" | "color grading" | "grading"
            | "exposure" | "colour correction" => Self::ColorCorrection,
            "rewrite" | "script" | "reword" | "rephrase" | "wording" | "script change" => {
                Self::Rewrite
            }
            "other" | "misc" | "miscellaneous" | "general" => Self::Other,
            _ => return None,
        };
        Some(found)
    }
}

/// Canonical form of a `category` value, or `None` if unrecognised.
#[must_use]
pub fn canonical_category(raw: &str) -> Option<&'static str> {
    Category::from_synonym(raw).map(Category::as_str)
}

/// Canonical form of a `severity` value, or `None` if unrecognised.
#[must_use]
pub fn canonical_severity(raw: &str) -> Option<&'static str> {
    Severity::from_synonym(raw).map(Severity::as_str)
}

/// Canonical form of an issue `type` value, or `None` if unrecognised.
#[must_use]
pub fn canonical_issue_type(raw: &str) -> Option<&'static str> {
    IssueType::from_synonym(raw).map(IssueType::as_str)
}

// Lowercase, treat `-` and `_` as spaces, collapse whitespace.
fn fold(raw: &str) -> String {
    raw.to_lowercase()
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
