use std::fmt;

use crate::capture::Composer;
use crate::error::Result;
use crate::identity::IdentityHub;
use crate::session::{SessionController, SubmitOutcome};

#[cfg(test)]
use mockall::automock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Enter,
    Char(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyChord {
    pub key: Key,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

impl KeyChord {
    pub fn plain(key: Key) -> Self {
        Self {
            key,
            ctrl: false,
            alt: false,
            shift: false,
        }
    }

    /// Parse chords written like `esc`, `ctrl+l` or `ctrl+alt+q`.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut chord = KeyChord::plain(Key::Escape);
        let mut key = None;
        for token in raw.split('+').map(|t| t.trim().to_lowercase()) {
            match token.as_str() {
                "ctrl" | "control" => chord.ctrl = true,
                "alt" => chord.alt = true,
                "shift" => chord.shift = true,
                "esc" | "escape" => key = Some(Key::Escape),
                "enter" | "return" => key = Some(Key::Enter),
                single if single.chars().count() == 1 => {
                    key = single.chars().next().map(Key::Char);
                }
                _ => return None,
            }
        }
        chord.key = key?;
        Some(chord)
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            f.write_str("CTRL + ")?;
        }
        if self.alt {
            f.write_str("ALT + ")?;
        }
        if self.shift {
            f.write_str("SHIFT + ")?;
        }
        match self.key {
            Key::Escape => f.write_str("ESC"),
            Key::Enter => f.write_str("ENTER"),
            Key::Char(c) => write!(f, "{}", c.to_ascii_uppercase()),
        }
    }
}

/// Semantic actions the keyboard surface can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    Panic,
    ClearTranscript,
    SignOut,
    Submit,
}

impl Shortcut {
    /// Look up the action bound to a chord. Clearing only exists with an active session.
    pub fn for_chord(chord: KeyChord, session_active: bool) -> Option<Self> {
        match chord {
            KeyChord {
                key: Key::Escape, ..
            } => Some(Shortcut::Panic),
            KeyChord {
                key: Key::Char('l'),
                ctrl: true,
                alt: false,
                ..
            } if session_active => Some(Shortcut::ClearTranscript),
            KeyChord {
                key: Key::Char('q'),
                ctrl: true,
                alt: true,
                ..
            } => Some(Shortcut::SignOut),
            KeyChord {
                key: Key::Enter,
                shift: false,
                ..
            } => Some(Shortcut::Submit),
            _ => None,
        }
    }
}

/// Whatever is presenting the overlay.
#[cfg_attr(test, automock)]
pub trait Surface: Send + Sync {
    fn close(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Closed,
    Cleared,
    SignedOut,
    Submitted(SubmitOutcome),
    Ignored,
}

/// Run the action bound to a chord against the session.
pub async fn dispatch(
    chord: KeyChord,
    session: &mut SessionController,
    composer: &mut Composer,
    identity: &IdentityHub,
    surface: &dyn Surface,
) -> Dispatched {
    let active = session.active_config().is_some();
    let Some(shortcut) = Shortcut::for_chord(chord, active) else {
        return Dispatched::Ignored;
    };
    tracing::debug!(?shortcut, chord = %chord, "Keyboard shortcut");

    match shortcut {
        Shortcut::Panic => {
            if let Err(e) = surface.close() {
                tracing::debug!("Close blocked: {}", e);
            }
            Dispatched::Closed
        }
        Shortcut::ClearTranscript => {
            session.reset();
            Dispatched::Cleared
        }
        Shortcut::SignOut => {
            // The session learns about it from its identity subscription.
            identity.sign_out().await;
            Dispatched::SignedOut
        }
        Shortcut::Submit => Dispatched::Submitted(composer.submit_into(session)),
    }
}
