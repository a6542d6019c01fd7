use anyhow::Result;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, BufReader};

use ready_overlay::Overlay;
use ready_overlay::capture::ClipboardItem;
use ready_overlay::config::Config;
use ready_overlay::error::{self, OverlayError};
use ready_overlay::logging;
use ready_overlay::models::{AcademicLevel, ExamType, Language, ResponseStyle, Subject};
use ready_overlay::session::AnswerReady;
use ready_overlay::shortcuts::{Dispatched, KeyChord, Surface, dispatch};
use ready_overlay::visual::OverlayVisual;

/// The terminal itself: closing just ends the input loop.
#[derive(Default)]
struct TerminalSurface {
    closed: AtomicBool,
}

impl Surface for TerminalSurface {
    fn close(&self) -> error::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

enum Input {
    Line(Option<String>),
    Answer(Option<AnswerReady>),
    Identity,
}

#[tokio::main]
async fn main() -> Result<()> {
    let logging = logging::init();
    let config = Config::load();
    logging.apply(&config.logging);

    let mut overlay = Overlay::new(&config)?;
    let mut identity_rx = overlay.identity.subscribe();
    let surface = TerminalSurface::default();
    tracing::info!(session = %overlay.session.id(), "Overlay ready");
    OverlayVisual::display_notice("Sign in with :login <email> <password> (:help for commands)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let input = tokio::select! {
            line = lines.next_line() => Input::Line(line?),
            event = overlay.session.next_event() => Input::Answer(event),
            changed = identity_rx.changed() => {
                changed?;
                Input::Identity
            }
        };

        match input {
            Input::Line(None) => break,
            Input::Line(Some(line)) => handle_line(&mut overlay, &surface, line.trim_end()).await,
            Input::Answer(Some(event)) => {
                if let Some(entry) = overlay.session.apply(event) {
                    OverlayVisual::display_entry(entry);
                }
            }
            Input::Answer(None) => break,
            Input::Identity => {
                let state = identity_rx.borrow_and_update().clone();
                OverlayVisual::display_identity(&state);
                overlay.session.handle_identity(state);
            }
        }

        if surface.closed.load(Ordering::SeqCst) {
            break;
        }
    }

    tracing::info!("Overlay closed");
    Ok(())
}

async fn handle_line(overlay: &mut Overlay, surface: &TerminalSurface, line: &str) {
    let Some(command) = line.strip_prefix(':') else {
        overlay.composer.text = line.to_string();
        press(overlay, surface, "enter").await;
        return;
    };

    let mut words = command.split_whitespace();
    let name = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();

    let result = match (name, args.as_slice()) {
        ("help", _) => {
            print_help();
            Ok(())
        }
        ("login", [identifier, secret]) => overlay.identity.sign_in(identifier, secret).await,
        ("login", [identifier]) => overlay.identity.sign_in(identifier, "").await,
        ("reset", [identifier]) => overlay
            .identity
            .password_reset(identifier)
            .await
            .map(OverlayVisual::display_notice),
        ("logout", _) => {
            press(overlay, surface, "ctrl+alt+q").await;
            Ok(())
        }
        ("set", [field, value @ ..]) if !value.is_empty() => {
            set_field(overlay, field, &value.join(" "))
        }
        ("start", _) => match overlay.session.draft_mut() {
            Some(draft) => draft
                .request_confirmation()
                .map(|summary| OverlayVisual::display_summary(&summary)),
            None => Err(OverlayError::Internal("session already started".to_string())),
        },
        ("confirm", _) => overlay.session.confirm().map(|()| {
            OverlayVisual::display_notice("Session started. Type a question or :paste an image.")
        }),
        ("back", _) => {
            match overlay.session.draft_mut() {
                Some(draft) => draft.cancel_confirmation(),
                None => overlay.session.reconfigure(),
            }
            show_config(overlay);
            Ok(())
        }
        ("cfg", _) => {
            show_config(overlay);
            Ok(())
        }
        ("paste", [path]) => paste_file(overlay, path).await,
        ("drop", [index]) => match index.parse::<usize>() {
            Ok(i) if i >= 1 && overlay.composer.staging.discard(i - 1).is_some() => {
                OverlayVisual::display_notice(&format!(
                    "{} attachment(s) staged",
                    overlay.composer.staging.len()
                ));
                Ok(())
            }
            _ => Err(OverlayError::Internal(format!("no staged attachment {index}"))),
        },
        ("send", _) => {
            press(overlay, surface, "enter").await;
            Ok(())
        }
        ("clear", _) => {
            press(overlay, surface, "ctrl+l").await;
            Ok(())
        }
        ("show", _) => {
            OverlayVisual::display_transcript(overlay.session.transcript());
            Ok(())
        }
        ("key", [chord]) => {
            press(overlay, surface, chord).await;
            Ok(())
        }
        ("quit", _) | ("esc", _) => {
            press(overlay, surface, "esc").await;
            Ok(())
        }
        _ => Err(OverlayError::Internal(format!("unknown command ':{command}'"))),
    };

    if let Err(e) = result {
        OverlayVisual::display_error(&e.to_string());
    }
}

async fn press(overlay: &mut Overlay, surface: &TerminalSurface, chord: &str) {
    let Some(chord) = KeyChord::parse(chord) else {
        OverlayVisual::display_error(&format!("unknown key '{chord}'"));
        return;
    };
    let outcome = dispatch(
        chord,
        &mut overlay.session,
        &mut overlay.composer,
        &overlay.identity,
        surface,
    )
    .await;
    match outcome {
        Dispatched::Submitted(outcome) => OverlayVisual::display_submit(outcome),
        Dispatched::Cleared => OverlayVisual::display_notice("Transcript cleared"),
        Dispatched::Closed | Dispatched::SignedOut => {}
        Dispatched::Ignored => tracing::debug!(%chord, "No action bound"),
    }
}

fn set_field(overlay: &mut Overlay, field: &str, value: &str) -> error::Result<()> {
    let Some(draft) = overlay.session.draft_mut() else {
        return Err(OverlayError::Internal(
            "configuration is locked during a session (:back to change it)".to_string(),
        ));
    };
    let invalid = || OverlayError::Config(format!("invalid {field} '{value}'"));
    match field {
        "subject" => draft.set_subject(Subject::parse(value)),
        "type" => draft.set_exam_type(ExamType::parse(value).ok_or_else(invalid)?),
        "style" => draft.set_response_style(ResponseStyle::parse(value))?,
        "level" => draft.set_academic_level(AcademicLevel::parse(value).ok_or_else(invalid)?),
        "lang" => draft.set_language(Language::parse(value).ok_or_else(invalid)?),
        _ => return Err(OverlayError::Config(format!("unknown field '{field}'"))),
    }
    show_config(overlay);
    Ok(())
}

fn show_config(overlay: &Overlay) {
    if let Some(config) = overlay.session.active_config() {
        OverlayVisual::display_notice(&config.summary().to_string());
    } else if let Some(draft) = overlay.session.draft() {
        OverlayVisual::display_draft(draft.config());
    }
}

async fn paste_file(overlay: &mut Overlay, path: &str) -> error::Result<()> {
    let bytes = tokio::fs::read(path).await?;
    let item = ClipboardItem {
        mime: mime_for(Path::new(path)).to_string(),
        bytes,
    };
    let outcome = overlay.composer.staging.paste(&[item]);
    if !outcome.suppress_default {
        return Err(OverlayError::Config(format!("'{path}' is not an image")));
    }
    OverlayVisual::display_paste(&outcome, overlay.composer.staging.len());
    Ok(())
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

fn print_help() {
    for line in [
        ":login <email> <password>   sign in",
        ":reset <email>              send a password reset email",
        ":logout                     sign out (ctrl+alt+q)",
        ":set subject|type|style|level|lang <value>",
        ":start / :confirm / :back   review, start, or leave the configuration",
        ":paste <image file>         stage an image for the next question",
        ":drop <n>                   remove staged image n",
        ":send                       send staged images without text",
        ":clear                      clear the transcript (ctrl+l)",
        ":show / :cfg                print the transcript or configuration",
        ":key <chord>                press a key chord, e.g. ctrl+l",
        ":quit                       close (esc)",
        "<text>                      ask a question",
    ] {
        println!("{line}");
    }
}
