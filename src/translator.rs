use serde::Serialize;
use std::fmt;

use crate::error::Result;
use crate::models::{ExamConfiguration, ExamType, Language, ResponseStyle, Subject, Translation};

/// Budget used for any style without an entry in the table.
pub const DEFAULT_TOKEN_BUDGET: u32 = 200;

const ROLE_FRAMING: &str = "ROLE: High-Precision Exam Solver.";
const CORE_RULES: &str = "IMPERATIVE: MAXIMIZE SPEED. MINIMIZE TOKENS.

CORE RULES:
1. OUTPUT ONLY THE ANSWER. No intro, no reasoning (unless requested), no \"I think\".
2. IF MULTIPLE CHOICE: Output **LETTER** only.
3. IF OPEN QUESTION: Stick strictly to word limits.";

const VISION_DIRECTIVE: &str = " VISION: Extract text/diagrams accurately. Solve immediately.";
const LANG_ES: &str = " LANG: RESPOND IN SPANISH.";
const LANG_EN: &str = " LANG: RESPOND IN ENGLISH.";

const FORMAT_OPTION_ONLY: &str =
    " FORMAT: OPTION ONLY. Ex: **A**. Do not write the text of the option.";
const FORMAT_SHORT: &str = " FORMAT: ULTRA-CONCISE. Max 10 words. Telegraphic style.";
const FORMAT_DETAILED_CLOSED: &str =
    " FORMAT: Option (**A**) + 1 sentence explanation. Max 30 words.";
const FORMAT_DETAILED_OPEN: &str =
    " FORMAT: Concise Explanation. Max 30 words. High information density.";
const FORMAT_MIXED_SHORT: &str = " FORMAT: If MC -> **Letter** only. If Open -> Max 10 words.";
const FORMAT_MIXED_DETAILED: &str =
    " FORMAT: If MC -> **Letter** only. If Open -> Max 30 words.";

const MATH_DIRECTIVE: &str = " MATH: Return final numeric/algebraic result only.";
const CODE_DIRECTIVE: &str = " CODE: Return code block only.";

/// Service variant: text-only fast model or the vision-capable one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Fast,
    Vision,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Fast => f.write_str("fast"),
            Tier::Vision => f.write_str("vision"),
        }
    }
}

/// Style a draft falls back to whenever its exam type changes.
pub fn default_style_for(exam_type: ExamType) -> ResponseStyle {
    match exam_type {
        ExamType::Open => ResponseStyle::Short,
        ExamType::Closed => ResponseStyle::OptionOnly,
        ExamType::Mixed => ResponseStyle::MixedShort,
    }
}

pub fn token_budget(style: ResponseStyle) -> u32 {
    match style {
        ResponseStyle::OptionOnly => 20,
        ResponseStyle::Short => 50,
        ResponseStyle::MixedShort => 60,
        ResponseStyle::Detailed | ResponseStyle::MixedDetailed => 150,
        ResponseStyle::Unknown => DEFAULT_TOKEN_BUDGET,
    }
}

pub fn tier_for(has_attachments: bool) -> Tier {
    if has_attachments {
        Tier::Vision
    } else {
        Tier::Fast
    }
}

/// Map a configuration to the instruction, output budget and tier for one request.
///
/// Fails only when the response style does not belong to the exam type.
pub fn translate(config: &ExamConfiguration, has_attachments: bool) -> Result<Translation> {
    config.validate()?;

    let translation = Translation {
        instruction: build_instruction(config, has_attachments),
        token_budget: token_budget(config.response_style),
        tier: tier_for(has_attachments),
    };

    tracing::debug!(
        tier = %translation.tier,
        token_budget = translation.token_budget,
        instruction_len = translation.instruction.len(),
        "Translated exam configuration"
    );

    Ok(translation)
}

fn subject_label(subject: &Subject) -> &str {
    let label = subject.identifier().trim();
    if label.is_empty() { "General" } else { label }
}

fn build_instruction(config: &ExamConfiguration, has_attachments: bool) -> String {
    let mut instruction = format!(
        "{ROLE_FRAMING} Subject: {}.\n{CORE_RULES}",
        subject_label(&config.subject)
    );

    if has_attachments {
        instruction.push_str(VISION_DIRECTIVE);
    }

    match config.language {
        Language::Es => instruction.push_str(LANG_ES),
        Language::En => instruction.push_str(LANG_EN),
        Language::Auto => {}
    }

    let format = match (config.response_style, config.exam_type) {
        (ResponseStyle::OptionOnly, _) => Some(FORMAT_OPTION_ONLY),
        (ResponseStyle::Short, _) => Some(FORMAT_SHORT),
        (ResponseStyle::Detailed, ExamType::Closed) => Some(FORMAT_DETAILED_CLOSED),
        (ResponseStyle::Detailed, _) => Some(FORMAT_DETAILED_OPEN),
        (ResponseStyle::MixedShort, _) => Some(FORMAT_MIXED_SHORT),
        (ResponseStyle::MixedDetailed, _) => Some(FORMAT_MIXED_DETAILED),
        (ResponseStyle::Unknown, _) => None,
    };
    if let Some(format) = format {
        instruction.push_str(format);
    }

    match config.subject {
        Subject::Math => instruction.push_str(MATH_DIRECTIVE),
        Subject::Coding => instruction.push_str(CODE_DIRECTIVE),
        _ => {}
    }

    instruction
}
