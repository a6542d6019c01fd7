use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::attachment::Attachment;
use crate::error::{OverlayError, Result};
use crate::translator::{self, Tier};

/// Subject the exam is about. `Custom` carries free text typed by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    General,
    Math,
    Physics,
    Chemistry,
    Biology,
    Geography,
    Coding,
    History,
    Science,
    Ethics,
    Philosophy,
    Custom(String),
}

impl Subject {
    /// Identifier used inside the instruction text.
    pub fn identifier(&self) -> &str {
        match self {
            Subject::General => "general",
            Subject::Math => "math",
            Subject::Physics => "physics",
            Subject::Chemistry => "chemistry",
            Subject::Biology => "biology",
            Subject::Geography => "geography",
            Subject::Coding => "coding",
            Subject::History => "history",
            Subject::Science => "science",
            Subject::Ethics => "ethics",
            Subject::Philosophy => "philosophy",
            Subject::Custom(text) => text.as_str(),
        }
    }

    /// Human label shown in the confirmation summary.
    pub fn label(&self) -> &str {
        match self {
            Subject::General => "General",
            Subject::Math => "Mathematics",
            Subject::Physics => "Physics",
            Subject::Chemistry => "Chemistry",
            Subject::Biology => "Biology",
            Subject::Geography => "Geography",
            Subject::Coding => "Programming",
            Subject::History => "History",
            Subject::Science => "Science (General)",
            Subject::Ethics => "Ethics",
            Subject::Philosophy => "Philosophy",
            Subject::Custom(text) if text.trim().is_empty() => "Custom",
            Subject::Custom(text) => text.as_str(),
        }
    }

    /// Parse a subject identifier. Anything unknown becomes a custom subject.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "general" => Subject::General,
            "math" => Subject::Math,
            "physics" => Subject::Physics,
            "chemistry" => Subject::Chemistry,
            "biology" => Subject::Biology,
            "geography" => Subject::Geography,
            "coding" => Subject::Coding,
            "history" => Subject::History,
            "science" => Subject::Science,
            "ethics" => Subject::Ethics,
            "philosophy" => Subject::Philosophy,
            _ => Subject::Custom(raw.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamType {
    Open,
    Closed,
    Mixed,
}

impl ExamType {
    pub const ALL: [ExamType; 3] = [ExamType::Open, ExamType::Closed, ExamType::Mixed];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExamType::Open => "open",
            ExamType::Closed => "closed",
            ExamType::Mixed => "mixed",
        }
    }

    /// Response styles a draft may pick for this exam type.
    pub fn valid_styles(&self) -> [ResponseStyle; 2] {
        match self {
            ExamType::Open => [ResponseStyle::Short, ResponseStyle::Detailed],
            ExamType::Closed => [ResponseStyle::OptionOnly, ResponseStyle::Detailed],
            ExamType::Mixed => [ResponseStyle::MixedShort, ResponseStyle::MixedDetailed],
        }
    }

    pub fn allows(&self, style: ResponseStyle) -> bool {
        self.valid_styles().contains(&style)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "open" => Some(ExamType::Open),
            "closed" => Some(ExamType::Closed),
            "mixed" => Some(ExamType::Mixed),
            _ => None,
        }
    }
}

impl fmt::Display for ExamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStyle {
    OptionOnly,
    Short,
    Detailed,
    MixedShort,
    MixedDetailed,
    /// Anything a newer or older client sends that this build does not know.
    #[serde(other)]
    Unknown,
}

impl ResponseStyle {
    pub const ALL: [ResponseStyle; 6] = [
        ResponseStyle::OptionOnly,
        ResponseStyle::Short,
        ResponseStyle::Detailed,
        ResponseStyle::MixedShort,
        ResponseStyle::MixedDetailed,
        ResponseStyle::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStyle::OptionOnly => "option_only",
            ResponseStyle::Short => "short",
            ResponseStyle::Detailed => "detailed",
            ResponseStyle::MixedShort => "mixed_short",
            ResponseStyle::MixedDetailed => "mixed_detailed",
            ResponseStyle::Unknown => "unknown",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "option_only" => ResponseStyle::OptionOnly,
            "short" => ResponseStyle::Short,
            "detailed" => ResponseStyle::Detailed,
            "mixed_short" => ResponseStyle::MixedShort,
            "mixed_detailed" => ResponseStyle::MixedDetailed,
            _ => ResponseStyle::Unknown,
        }
    }
}

impl fmt::Display for ResponseStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcademicLevel {
    HighSchool,
    University,
    Expert,
}

impl AcademicLevel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "high_school" => Some(AcademicLevel::HighSchool),
            "university" => Some(AcademicLevel::University),
            "expert" => Some(AcademicLevel::Expert),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Auto,
    Es,
    En,
}

impl Language {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "auto" => Some(Language::Auto),
            "es" => Some(Language::Es),
            "en" => Some(Language::En),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Language::Auto => "Auto",
            Language::Es => "Spanish",
            Language::En => "English",
        }
    }
}

/// Pre-session configuration describing how answers should look.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExamConfiguration {
    pub subject: Subject,
    pub exam_type: ExamType,
    pub response_style: ResponseStyle,
    pub academic_level: AcademicLevel,
    pub language: Language,
}

impl Default for ExamConfiguration {
    fn default() -> Self {
        Self {
            subject: Subject::General,
            exam_type: ExamType::Mixed,
            response_style: ResponseStyle::MixedShort,
            academic_level: AcademicLevel::University,
            language: Language::Es,
        }
    }
}

impl ExamConfiguration {
    pub fn validate(&self) -> Result<()> {
        if self.exam_type.allows(self.response_style) {
            Ok(())
        } else {
            Err(OverlayError::ConfigValidation {
                exam_type: self.exam_type,
                style: self.response_style,
            })
        }
    }

    pub fn readable_style(&self) -> &'static str {
        match self.response_style {
            ResponseStyle::MixedShort => "Short + options",
            ResponseStyle::MixedDetailed => "Detailed + options",
            ResponseStyle::OptionOnly => "Option only",
            ResponseStyle::Detailed if self.exam_type == ExamType::Closed => {
                "Option + explanation"
            }
            ResponseStyle::Detailed => "Detailed",
            ResponseStyle::Short => "Short",
            ResponseStyle::Unknown => "unknown",
        }
    }

    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            subject: self.subject.label().to_string(),
            exam_type: match self.exam_type {
                ExamType::Open => "Open",
                ExamType::Closed => "Closed",
                ExamType::Mixed => "Mixed",
            }
            .to_string(),
            response: self.readable_style().to_string(),
            language: self.language.label().to_string(),
        }
    }
}

/// What the confirmation step shows before a draft is promoted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigSummary {
    pub subject: String,
    pub exam_type: String,
    pub response: String,
    pub language: String,
}

impl fmt::Display for ConfigSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Subject:   {}", self.subject)?;
        writeln!(f, "Exam type: {}", self.exam_type)?;
        writeln!(f, "Response:  {}", self.response)?;
        write!(f, "Language:  {}", self.language)
    }
}

/// Mutable configuration being edited before a session starts.
///
/// Promotion is two-phase: `request_confirmation` arms the draft and returns the
/// summary to show, `confirm` turns an armed draft into an [`ActiveConfiguration`].
/// Any edit disarms.
#[derive(Debug, Clone, Default)]
pub struct ConfigDraft {
    config: ExamConfiguration,
    armed: bool,
}

impl ConfigDraft {
    pub fn new(config: ExamConfiguration) -> Self {
        Self {
            config,
            armed: false,
        }
    }

    pub fn config(&self) -> &ExamConfiguration {
        &self.config
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn set_subject(&mut self, subject: Subject) {
        self.config.subject = subject;
        self.armed = false;
    }

    /// Changing the exam type always re-derives the response style.
    pub fn set_exam_type(&mut self, exam_type: ExamType) {
        self.config.exam_type = exam_type;
        self.config.response_style = translator::default_style_for(exam_type);
        self.armed = false;
    }

    pub fn set_response_style(&mut self, style: ResponseStyle) -> Result<()> {
        if !self.config.exam_type.allows(style) {
            return Err(OverlayError::ConfigValidation {
                exam_type: self.config.exam_type,
                style,
            });
        }
        self.config.response_style = style;
        self.armed = false;
        Ok(())
    }

    pub fn set_academic_level(&mut self, level: AcademicLevel) {
        self.config.academic_level = level;
        self.armed = false;
    }

    pub fn set_language(&mut self, language: Language) {
        self.config.language = language;
        self.armed = false;
    }

    pub fn request_confirmation(&mut self) -> Result<ConfigSummary> {
        self.config.validate()?;
        self.armed = true;
        Ok(self.config.summary())
    }

    pub fn cancel_confirmation(&mut self) {
        self.armed = false;
    }

    pub fn confirm(&mut self) -> Result<ActiveConfiguration> {
        if !self.armed {
            return Err(OverlayError::NotArmed);
        }
        self.armed = false;
        ActiveConfiguration::new(self.config.clone())
    }
}

/// Confirmed configuration governing one session. Cheap to clone, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveConfiguration(Arc<ExamConfiguration>);

impl ActiveConfiguration {
    pub fn new(config: ExamConfiguration) -> Result<Self> {
        config.validate()?;
        Ok(Self(Arc::new(config)))
    }
}

impl Deref for ActiveConfiguration {
    type Target = ExamConfiguration;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptEntry {
    pub id: u64,
    pub role: Role,
    pub text: String,
    /// Display-only references to what was sent with this entry.
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
}

/// Instruction, size budget and service tier derived from an exam configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub instruction: String,
    pub token_budget: u32,
    pub tier: Tier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningEffort {
    Disabled,
}

/// One inline part of a multi-part request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Inline { mime_type: String, data: String },
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contents {
    Text(String),
    Parts(Vec<Part>),
}

/// Request handed to a [`crate::transport::Transport`].
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: Tier,
    pub system_instruction: String,
    pub contents: Contents,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub reasoning_effort: ReasoningEffort,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationResponse {
    pub text: Option<String>,
}

/// A run of answer text, bold when it was wrapped in `**`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Plain(&'a str),
    Bold(&'a str),
}

/// Split an answer on `**...**` markers. Unterminated markers stay plain.
pub fn render_bold(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("**") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("**") else {
            break;
        };
        if start > 0 {
            segments.push(Segment::Plain(&rest[..start]));
        }
        segments.push(Segment::Bold(&after[..end]));
        rest = &after[end + 2..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Plain(rest));
    }
    segments
}
