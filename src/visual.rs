use colored::*;

use crate::capture::PasteOutcome;
use crate::identity::IdentityState;
use crate::models::{ConfigSummary, ExamConfiguration, Role, Segment, TranscriptEntry, render_bold};
use crate::session::SubmitOutcome;

/// Terminal rendering for the line-oriented overlay.
pub struct OverlayVisual;

impl OverlayVisual {
    /// Answer text with `**` runs shown in bold.
    pub fn styled_answer(text: &str) -> String {
        render_bold(text)
            .into_iter()
            .map(|segment| match segment {
                Segment::Plain(s) => s.normal().to_string(),
                Segment::Bold(s) => s.bold().bright_white().to_string(),
            })
            .collect()
    }

    pub fn display_entry(entry: &TranscriptEntry) {
        match entry.role {
            Role::User => {
                let images = if entry.attachments.is_empty() {
                    String::new()
                } else {
                    format!(" [{} image(s)]", entry.attachments.len())
                };
                println!("{} {}{}", ">".cyan(), entry.text.white(), images.dimmed());
            }
            Role::Assistant => {
                println!("{} {}", "=".bright_green(), Self::styled_answer(&entry.text));
            }
        }
    }

    pub fn display_transcript(entries: &[TranscriptEntry]) {
        if entries.is_empty() {
            println!("{}", "(empty)".dimmed());
        }
        for entry in entries {
            Self::display_entry(entry);
        }
    }

    pub fn display_draft(config: &ExamConfiguration) {
        println!("{}", "Exam configuration".bright_yellow());
        println!("   subject:  {}", config.subject.label().cyan());
        println!("   type:     {}", config.exam_type.to_string().cyan());
        println!(
            "   style:    {} ({})",
            config.response_style.to_string().cyan(),
            config.readable_style()
        );
        println!(
            "   allowed:  {}",
            config
                .exam_type
                .valid_styles()
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
                .dimmed()
        );
        println!("   language: {}", config.language.label().cyan());
    }

    pub fn display_summary(summary: &ConfigSummary) {
        println!("{}", "Confirm this setup with :confirm or go :back".bright_yellow());
        for line in summary.to_string().lines() {
            println!("   {}", line.white());
        }
    }

    pub fn display_submit(outcome: SubmitOutcome) {
        match outcome {
            SubmitOutcome::Sent { .. } => println!("{}", "...".dimmed()),
            SubmitOutcome::Empty => {}
            SubmitOutcome::Busy => println!("{}", "Still answering the previous question".yellow()),
            SubmitOutcome::NoSession => {
                println!("{}", "No active session: configure and :confirm first".yellow())
            }
        }
    }

    pub fn display_paste(outcome: &PasteOutcome, staged_total: usize) {
        if outcome.staged > 0 {
            println!(
                "{} {} staged ({} waiting)",
                "+".bright_cyan(),
                outcome.staged,
                staged_total
            );
        }
        if outcome.rejected > 0 {
            println!("{} {} rejected: staging is full", "!".red(), outcome.rejected);
        }
    }

    pub fn display_identity(state: &IdentityState) {
        match state {
            IdentityState::SignedIn { identifier } => {
                println!("{} {}", "Signed in as".bright_green(), identifier.bold())
            }
            IdentityState::SignedOut => println!("{}", "Signed out".bright_red()),
        }
    }

    pub fn display_notice(message: &str) {
        println!("{}", message.bright_yellow());
    }

    pub fn display_error(message: &str) {
        println!("{}", message.bright_red().bold());
    }
}
