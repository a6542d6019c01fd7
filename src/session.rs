//! Session controller: owns the transcript and the single-flight submission gate.
//!
//! `submit` appends the user entry right away and spawns exactly one task for the
//! generation call. The task reports back through an event channel that only the
//! controller reads, so the transcript is never touched from more than one place.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::answer::AnswerService;
use crate::attachment::Attachment;
use crate::config::SessionConfig;
use crate::error::{OverlayError, Result};
use crate::identity::IdentityState;
use crate::models::{ActiveConfiguration, ConfigDraft, ExamConfiguration, Role, TranscriptEntry};

/// Text stored for a user entry that carried only images.
pub const IMAGE_ONLY_TEXT: &str = "[Image]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The user entry was appended and the request is in flight.
    Sent { entry_id: u64 },
    /// Blank text and no attachments; nothing happened.
    Empty,
    /// A request is already outstanding; nothing happened.
    Busy,
    /// No confirmed configuration; nothing happened.
    NoSession,
}

/// Completion of a spawned generation task.
#[derive(Debug)]
pub struct AnswerReady {
    generation: u64,
    epoch: u64,
    text: String,
}

enum Mode {
    Drafting(ConfigDraft),
    Active {
        config: ActiveConfiguration,
        transcript: Vec<TranscriptEntry>,
    },
}

pub struct SessionController {
    id: Uuid,
    answers: Arc<AnswerService>,
    mode: Mode,
    identity: IdentityState,
    pending: bool,
    /// Bumped whenever a session is discarded (reconfigure, sign-out).
    generation: u64,
    /// Bumped whenever the transcript is cleared, including by discarding a session.
    epoch: u64,
    next_entry_id: u64,
    discard_stale_answers: bool,
    draft_defaults: ExamConfiguration,
    events_tx: mpsc::UnboundedSender<AnswerReady>,
    events_rx: mpsc::UnboundedReceiver<AnswerReady>,
}

impl SessionController {
    pub fn new(answers: Arc<AnswerService>, cfg: &SessionConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        tracing::info!(session = %id, "Session controller created");
        Self {
            id,
            answers,
            mode: Mode::Drafting(ConfigDraft::new(cfg.draft.clone())),
            identity: IdentityState::SignedOut,
            pending: false,
            generation: 0,
            epoch: 0,
            next_entry_id: 1,
            discard_stale_answers: cfg.discard_stale_answers,
            draft_defaults: cfg.draft.clone(),
            events_tx,
            events_rx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> SessionStatus {
        if self.pending {
            SessionStatus::Pending
        } else {
            SessionStatus::Idle
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn identity(&self) -> &IdentityState {
        &self.identity
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        match &self.mode {
            Mode::Active { transcript, .. } => transcript,
            Mode::Drafting(_) => &[],
        }
    }

    pub fn active_config(&self) -> Option<&ActiveConfiguration> {
        match &self.mode {
            Mode::Active { config, .. } => Some(config),
            Mode::Drafting(_) => None,
        }
    }

    pub fn draft(&self) -> Option<&ConfigDraft> {
        match &self.mode {
            Mode::Drafting(draft) => Some(draft),
            Mode::Active { .. } => None,
        }
    }

    pub fn draft_mut(&mut self) -> Option<&mut ConfigDraft> {
        match &mut self.mode {
            Mode::Drafting(draft) => Some(draft),
            Mode::Active { .. } => None,
        }
    }

    /// Promote the armed draft to the active configuration and open an empty transcript.
    pub fn confirm(&mut self) -> Result<()> {
        if !self.identity.is_signed_in() {
            return Err(OverlayError::SignedOut);
        }
        let Mode::Drafting(draft) = &mut self.mode else {
            return Err(OverlayError::Internal(
                "session already has an active configuration".to_string(),
            ));
        };
        let config = draft.confirm()?;
        tracing::info!(
            session = %self.id,
            exam_type = %config.exam_type,
            style = %config.response_style,
            "Session started"
        );
        self.mode = Mode::Active {
            config,
            transcript: Vec::new(),
        };
        Ok(())
    }

    /// Append the user entry and start the one generation call for it.
    pub fn submit(&mut self, text: &str, attachments: &[Attachment]) -> SubmitOutcome {
        let Mode::Active { config, transcript } = &mut self.mode else {
            return SubmitOutcome::NoSession;
        };
        if text.trim().is_empty() && attachments.is_empty() {
            return SubmitOutcome::Empty;
        }
        if self.pending {
            tracing::debug!(session = %self.id, "Submission ignored while a request is pending");
            return SubmitOutcome::Busy;
        }

        let entry_id = self.next_entry_id;
        self.next_entry_id += 1;
        let display_text = if text.trim().is_empty() {
            IMAGE_ONLY_TEXT.to_string()
        } else {
            text.to_string()
        };
        transcript.push(TranscriptEntry {
            id: entry_id,
            role: Role::User,
            text: display_text,
            attachments: attachments.to_vec(),
            created_at: Utc::now(),
        });
        self.pending = true;

        let answers = Arc::clone(&self.answers);
        let config = config.clone();
        let prompt = text.to_string();
        let attachments = attachments.to_vec();
        let events_tx = self.events_tx.clone();
        let generation = self.generation;
        let epoch = self.epoch;

        tracing::info!(
            session = %self.id,
            entry_id,
            attachments = attachments.len(),
            "Submission accepted"
        );

        tokio::spawn(async move {
            let text = answers.ask(&prompt, &attachments, &config).await;
            // The controller owns the receiver for its whole life; a send failure
            // only happens while it is being dropped.
            let _ = events_tx.send(AnswerReady {
                generation,
                epoch,
                text,
            });
        });

        SubmitOutcome::Sent { entry_id }
    }

    /// Wait for the next completion. Never returns `None` while the controller lives.
    pub async fn next_event(&mut self) -> Option<AnswerReady> {
        self.events_rx.recv().await
    }

    /// Apply a completion: clear the gate and append the assistant entry unless it
    /// belongs to a transcript that has since been cleared or discarded.
    pub fn apply(&mut self, event: AnswerReady) -> Option<&TranscriptEntry> {
        self.pending = false;

        let stale_session = event.generation != self.generation;
        let stale_transcript = event.epoch != self.epoch;
        if stale_session || (stale_transcript && self.discard_stale_answers) {
            tracing::info!(
                session = %self.id,
                event_epoch = event.epoch,
                current_epoch = self.epoch,
                "Discarding answer for a cleared transcript"
            );
            return None;
        }

        let Mode::Active { transcript, .. } = &mut self.mode else {
            return None;
        };
        let entry_id = self.next_entry_id;
        self.next_entry_id += 1;
        transcript.push(TranscriptEntry {
            id: entry_id,
            role: Role::Assistant,
            text: event.text,
            attachments: Vec::new(),
            created_at: Utc::now(),
        });
        tracing::info!(session = %self.id, entry_id, "Answer appended");
        transcript.last()
    }

    /// Drive the pending request to completion and return the entry it appended.
    pub async fn wait_for_answer(&mut self) -> Option<TranscriptEntry> {
        while self.pending {
            let event = self.events_rx.recv().await?;
            if let Some(entry) = self.apply(event) {
                return Some(entry.clone());
            }
        }
        None
    }

    /// Clear the transcript. An outstanding request keeps running.
    pub fn reset(&mut self) {
        if let Mode::Active { transcript, .. } = &mut self.mode {
            transcript.clear();
        }
        self.epoch += 1;
        tracing::info!(session = %self.id, pending = self.pending, "Transcript cleared");
    }

    /// Discard the active configuration and transcript and go back to drafting.
    pub fn reconfigure(&mut self) {
        self.generation += 1;
        self.epoch += 1;
        self.mode = Mode::Drafting(ConfigDraft::new(self.draft_defaults.clone()));
        tracing::info!(session = %self.id, "Returned to configuration drafting");
    }

    /// React to an identity change published by the identity hub.
    pub fn handle_identity(&mut self, state: IdentityState) {
        let signed_out = !state.is_signed_in();
        self.identity = state;
        if signed_out {
            self.reconfigure();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::{FALLBACK_PROMPT, SENTINEL_ANSWER};
    use crate::error::OverlayError;
    use crate::models::{
        Contents, ExamType, GenerationRequest, GenerationResponse, Part, ResponseStyle,
    };
    use crate::transport::{MockTransport, Transport};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Holds every call until released and records how many ran at once.
    #[derive(Default)]
    struct GatedTransport {
        release: Notify,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn generate(&self, _req: &GenerationRequest) -> Result<GenerationResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.release.notified().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(GenerationResponse {
                text: Some(format!("answer {n}")),
            })
        }
    }

    fn session_config(discard_stale_answers: bool) -> SessionConfig {
        SessionConfig {
            discard_stale_answers,
            ..Default::default()
        }
    }

    fn signed_in() -> IdentityState {
        IdentityState::SignedIn {
            identifier: "ana@example.com".to_string(),
        }
    }

    fn active(tx: Arc<dyn Transport>, discard_stale_answers: bool) -> SessionController {
        let answers = Arc::new(AnswerService::new(tx));
        let mut session = SessionController::new(answers, &session_config(discard_stale_answers));
        session.handle_identity(signed_in());
        let draft = session.draft_mut().unwrap();
        draft.set_exam_type(ExamType::Closed);
        draft.request_confirmation().unwrap();
        session.confirm().unwrap();
        session
    }

    fn gated() -> Arc<GatedTransport> {
        Arc::new(GatedTransport::default())
    }

    #[tokio::test]
    async fn test_empty_submit_is_noop() {
        let tx = gated();
        let mut session = active(tx.clone(), true);

        assert_eq!(session.submit("", &[]), SubmitOutcome::Empty);
        assert_eq!(session.submit("  \n", &[]), SubmitOutcome::Empty);
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.transcript().is_empty());
        assert_eq!(tx.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_submit_then_resolve() {
        let tx = gated();
        let mut session = active(tx.clone(), true);

        let outcome = session.submit("2+2=? A)3 B)4", &[]);
        assert_eq!(outcome, SubmitOutcome::Sent { entry_id: 1 });
        assert_eq!(session.status(), SessionStatus::Pending);
        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.transcript()[0].role, Role::User);

        tx.release.notify_one();
        let answer = session.wait_for_answer().await.unwrap();
        assert_eq!(answer.id, 2);
        assert_eq!(answer.role, Role::Assistant);
        assert_eq!(answer.text, "answer 1");
        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(session.transcript().len(), 2);
    }

    #[tokio::test]
    async fn test_rapid_submits_never_overlap() {
        let tx = gated();
        let mut session = active(tx.clone(), true);

        assert!(matches!(session.submit("one", &[]), SubmitOutcome::Sent { .. }));
        for _ in 0..10 {
            assert_eq!(session.submit("again", &[]), SubmitOutcome::Busy);
        }
        assert_eq!(session.transcript().len(), 1);

        tx.release.notify_one();
        session.wait_for_answer().await.unwrap();

        assert!(matches!(session.submit("two", &[]), SubmitOutcome::Sent { .. }));
        tx.release.notify_one();
        session.wait_for_answer().await.unwrap();

        assert_eq!(tx.calls.load(Ordering::SeqCst), 2);
        assert_eq!(tx.max_in_flight.load(Ordering::SeqCst), 1);
        let ids: Vec<u64> = session.transcript().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        let roles: Vec<Role> = session.transcript().iter().map(|e| e.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
    }

    #[tokio::test]
    async fn test_reset_when_idle() {
        let tx = gated();
        let mut session = active(tx.clone(), true);
        session.submit("q", &[]);
        tx.release.notify_one();
        session.wait_for_answer().await.unwrap();

        session.reset();
        assert!(session.transcript().is_empty());
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.active_config().is_some());
    }

    #[tokio::test]
    async fn test_reset_while_pending_discards_stale_answer() {
        let tx = gated();
        let mut session = active(tx.clone(), true);
        session.submit("q", &[]);
        session.reset();

        // The gate stays closed until the outstanding call resolves.
        assert_eq!(session.submit("other", &[]), SubmitOutcome::Busy);

        tx.release.notify_one();
        assert!(session.wait_for_answer().await.is_none());
        assert!(session.transcript().is_empty());
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn test_reset_while_pending_can_keep_late_answer() {
        let tx = gated();
        let mut session = active(tx.clone(), false);
        session.submit("q", &[]);
        session.reset();

        tx.release.notify_one();
        let entry = session.wait_for_answer().await.unwrap();
        assert_eq!(entry.role, Role::Assistant);
        assert_eq!(session.transcript().len(), 1);
    }

    #[tokio::test]
    async fn test_reconfigure_discards_session_and_late_answer() {
        let tx = gated();
        let mut session = active(tx.clone(), false);
        session.submit("q", &[]);
        session.reconfigure();

        assert!(session.active_config().is_none());
        assert!(session.draft().is_some());
        assert!(session.transcript().is_empty());
        assert_eq!(session.submit("q", &[]), SubmitOutcome::NoSession);

        tx.release.notify_one();
        assert!(session.wait_for_answer().await.is_none());
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn test_reconfigure_restores_draft_defaults() {
        let tx = gated();
        let mut session = active(tx, true);
        session.reconfigure();
        let draft = session.draft().unwrap();
        assert_eq!(draft.config(), &ExamConfiguration::default());
        assert!(!draft.is_armed());
    }

    #[tokio::test]
    async fn test_sign_out_returns_to_drafting() {
        let tx = gated();
        let mut session = active(tx.clone(), true);
        session.submit("q", &[]);
        tx.release.notify_one();
        session.wait_for_answer().await.unwrap();

        session.handle_identity(IdentityState::SignedOut);
        assert!(session.active_config().is_none());
        assert!(session.transcript().is_empty());

        let draft = session.draft_mut().unwrap();
        draft.request_confirmation().unwrap();
        assert!(matches!(session.confirm(), Err(OverlayError::SignedOut)));
    }

    #[tokio::test]
    async fn test_confirm_requires_armed_draft() {
        let tx = gated();
        let answers = Arc::new(AnswerService::new(tx));
        let mut session = SessionController::new(answers, &session_config(true));
        session.handle_identity(signed_in());
        assert!(matches!(session.confirm(), Err(OverlayError::NotArmed)));
        assert_eq!(session.submit("q", &[]), SubmitOutcome::NoSession);
    }

    #[tokio::test]
    async fn test_image_only_submission() {
        let mut mock = MockTransport::new();
        mock.expect_generate()
            .withf(|req| match &req.contents {
                Contents::Parts(parts) => {
                    parts.len() == 3 && parts[2] == Part::Text(FALLBACK_PROMPT.to_string())
                }
                Contents::Text(_) => false,
            })
            .times(1)
            .returning(|_| {
                Ok(GenerationResponse {
                    text: Some("**A**".to_string()),
                })
            });
        let mut session = active(Arc::new(mock), true);

        let attachments = vec![
            Attachment::from_bytes("image/png", b"first"),
            Attachment::from_bytes("image/png", b"second"),
        ];
        assert!(matches!(
            session.submit("", &attachments),
            SubmitOutcome::Sent { .. }
        ));
        let user = &session.transcript()[0];
        assert_eq!(user.text, IMAGE_ONLY_TEXT);
        assert_eq!(user.attachments, attachments);

        let answer = session.wait_for_answer().await.unwrap();
        assert_eq!(answer.text, "**A**");
        assert!(answer.attachments.is_empty());
    }

    #[tokio::test]
    async fn test_failure_still_appends_one_entry() {
        let mut mock = MockTransport::new();
        mock.expect_generate()
            .times(1)
            .returning(|_| Err(OverlayError::Transport("unreachable".to_string())));
        let mut session = active(Arc::new(mock), true);

        session.submit("q", &[]);
        let answer = session.wait_for_answer().await.unwrap();
        assert_eq!(answer.text, SENTINEL_ANSWER);
        assert_eq!(session.transcript().len(), 2);
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn test_active_configuration_is_what_was_confirmed() {
        let tx = gated();
        let session = active(tx, true);
        let config = session.active_config().unwrap();
        assert_eq!(config.exam_type, ExamType::Closed);
        assert_eq!(config.response_style, ResponseStyle::OptionOnly);
    }
}
