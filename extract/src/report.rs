//! Typed category reports. Their `schemars` schemas are what the model is
//! asked to produce and what responses are validated against.

use crate::category::{Category, IssueType, Severity};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Span of the video in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimeRange {
    /// Start in seconds.
    pub start: f64,
    /// End in seconds.
    pub end: f64,
}

/// One concrete editing problem and how to fix it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// Identifier, unique within the report.
    pub id: String,
    /// Kind of edit proposed.
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    /// How urgent the fix is.
    pub severity: Severity,
    /// Dimension the issue belongs to.
    pub category: Category,
    /// Where in the video the issue occurs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimeRange>,
    /// What is wrong.
    pub description: String,
    /// How to fix it.
    pub suggestion: String,
}

/// Fields every category report carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisCore {
    /// Overall quality for this dimension, 0 (poor) to 1 (excellent).
    #[schemars(range(min = 0.0, max = 1.0))]
    pub score: f64,
    /// Two or three sentence verdict.
    pub summary: String,
    /// Problems found, most important first.
    #[schemars(length(max = 10))]
    pub issues: Vec<Issue>,
    /// What already works.
    #[schemars(length(max = 5))]
    pub strengths: Vec<String>,
    /// The fixes to make first.
    #[schemars(length(max = 3))]
    pub priority_actions: Vec<String>,
}

/// How the video opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HookAnalysis {
    /// E.g. question, bold claim, preview or story.
    pub hook_type: String,
    /// What happens in the opening seconds.
    pub opening_summary: String,
    /// How well the opening holds attention, 0 to 1.
    #[schemars(range(min = 0.0, max = 1.0))]
    pub effectiveness: f64,
}

/// A proposed rewording of one line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Rewrite {
    /// Identifier, unique within the report.
    pub id: String,
    /// Where the line is spoken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimeRange>,
    /// Current wording.
    pub original: String,
    /// Proposed wording.
    pub suggested: String,
}

/// Pacing verdict for one stretch of the video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaceSegment {
    /// Identifier, unique within the report.
    pub id: String,
    /// Span the segment covers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimeRange>,
    /// Free text such as `too_slow`, `good` or `too_fast`.
    pub pace: String,
    /// Why the segment feels that way.
    pub note: String,
}

/// One visual edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CutSuggestion {
    /// Identifier, unique within the report.
    pub id: String,
    /// Where to apply the edit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimeRange>,
    /// The edit to make.
    pub action: String,
    /// What it improves.
    pub reason: String,
}

/// Voice and music balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AudioMix {
    /// How intelligible the voice is, 0 to 1.
    #[schemars(range(min = 0.0, max = 1.0))]
    pub voice_clarity: f64,
    /// Music level against speech, 0 (drowns it) to 1 (well balanced).
    #[schemars(range(min = 0.0, max = 1.0))]
    pub music_balance: f64,
    /// Noise, levels and anything else worth fixing.
    pub notes: String,
}

/// A point where viewers are likely to leave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DropOffRisk {
    /// Identifier, unique within the report.
    pub id: String,
    /// Where viewers may leave.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimeRange>,
    /// How likely and costly the drop-off is.
    pub severity: Severity,
    /// Why viewers would leave here.
    pub reason: String,
}

/// One suggested call to action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CallToAction {
    /// Identifier, unique within the report.
    pub id: String,
    /// Where to place it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimeRange>,
    /// What to ask viewers to do.
    pub text: String,
    /// Placement in words, e.g. "after the demo".
    pub placement: String,
}

/// Technical quality notes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QualityChecks {
    /// Sharpness and resolution.
    pub resolution: String,
    /// Exposure and lighting.
    pub lighting: String,
    /// Composition and framing.
    pub framing: String,
    /// Codec, bitrate and export choices.
    pub export_settings: String,
}

macro_rules! category_report {
    ($(#[$doc:meta])* $name:ident { $field:ident : $ty:ty $(, max = $max:literal)? }) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            /// Fields shared by every category.
            #[serde(flatten)]
            pub core: AnalysisCore,
            /// The category-specific section.
            $(#[schemars(length(max = $max))])?
            pub $field: $ty,
        }
    };
}

category_report!(
    /// Opening-seconds analysis.
    HookReport { hook_analysis: HookAnalysis }
);
category_report!(
    /// Script and narration analysis.
    ScriptingReport { rewrites: Vec<Rewrite>, max = 10 }
);
category_report!(
    /// Pacing analysis.
    PacingReport { segments: Vec<PaceSegment>, max = 20 }
);
category_report!(
    /// Cut, b-roll and overlay analysis.
    VisualEditingReport { cut_suggestions: Vec<CutSuggestion>, max = 15 }
);
category_report!(
    /// Voice and music analysis.
    AudioReport { audio_mix: AudioMix }
);
category_report!(
    /// Predicted viewer drop-off.
    RetentionReport { drop_off_risks: Vec<DropOffRisk>, max = 10 }
);
category_report!(
    /// Calls to action and interaction.
    EngagementReport { calls_to_action: Vec<CallToAction>, max = 5 }
);
category_report!(
    /// Production quality.
    TechnicalReport { quality_checks: QualityChecks }
);

/// A validated report for any category.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CategoryReport {
    /// [`Category::Hook`]
    Hook(HookReport),
    /// [`Category::Scripting`]
    Scripting(ScriptingReport),
    /// [`Category::Pacing`]
    Pacing(PacingReport),
    /// [`Category::VisualEditing`]
    VisualEditing(VisualEditingReport),
    /// [`Category::Audio`]
    Audio(AudioReport),
    /// [`Category::Retention`]
    Retention(RetentionReport),
    /// [`Category::Engagement`]
    Engagement(EngagementReport),
    /// [`Category::Technical`]
    Technical(TechnicalReport),
}

impl CategoryReport {
    /// Deserialises a document already validated against `category`'s schema.
    ///
    /// # Errors
    /// Returns the serde error if the document does not fit the typed report.
    pub fn from_value(
        category: Category,
        value: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        Ok(match category {
            Category::Hook => Self::Hook(serde_json::from_value(value)?),
            Category::Scripting => Self::Scripting(serde_json::from_value(value)?),
            Category::Pacing => Self::Pacing(serde_json::from_value(value)?),
            Category::VisualEditing => Self::VisualEditing(serde_json::from_value(value)?),
            Category::Audio => Self::Audio(serde_json::from_value(value)?),
            Category::Retention => Self::Retention(serde_json::from_value(value)?),
            Category::Engagement => Self::Engagement(serde_json::from_value(value)?),
            Category::Technical => Self::Technical(serde_json::from_value(value)?),
        })
    }

    /// Which category this report answers.
    #[must_use]
    pub const fn category(&self) -> Category {
        match self {
            Self::Hook(_) => Category::Hook,
            Self::Scripting(_) => Category::Scripting,
            Self::Pacing(_) => Category::Pacing,
            Self::VisualEditing(_) => Category::VisualEditing,
            Self::Audio(_) => Category::Audio,
            Self::Retention(_) => Category::Retention,
            Self::Engagement(_) => Category::Engagement,
            Self::Technical(_) => Category::Technical,
        }
    }

    /// The shared fields.
    #[must_use]
    pub const fn core(&self) -> &AnalysisCore {
        match self {
            Self::Hook(r) => &r.core,
            Self::Scripting(r) => &r.core,
            Self::Pacing(r) => &r.core,
            Self::VisualEditing(r) => &r.core,
            Self::Audio(r) => &r.core,
            Self::Retention(r) => &r.core,
            Self::Engagement(r) => &r.core,
            Self::Technical(r) => &r.core,
        }
    }
}
