use crate::attachment::Attachment;
use crate::config::CaptureConfig;
use crate::session::{SessionController, SubmitOutcome};

/// One item of a clipboard payload.
#[derive(Debug, Clone)]
pub struct ClipboardItem {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ClipboardItem {
    pub fn is_image(&self) -> bool {
        self.mime.contains("image")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PasteOutcome {
    pub staged: usize,
    /// Image items refused because the buffer was full.
    pub rejected: usize,
    /// True whenever the payload held at least one image, so the host must not
    /// also paste it as text.
    pub suppress_default: bool,
}

/// Attachments captured but not yet sent. Capture keeps working while a request
/// is pending; the bounds come from [`CaptureConfig`].
#[derive(Debug)]
pub struct StagingBuffer {
    limits: CaptureConfig,
    staged: Vec<Attachment>,
    total_bytes: usize,
}

impl StagingBuffer {
    pub fn new(limits: CaptureConfig) -> Self {
        Self {
            limits,
            staged: Vec::new(),
            total_bytes: 0,
        }
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.staged
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub fn paste(&mut self, items: &[ClipboardItem]) -> PasteOutcome {
        let mut outcome = PasteOutcome::default();
        for item in items.iter().filter(|item| item.is_image()) {
            outcome.suppress_default = true;
            if self.stage(Attachment::from_bytes(&item.mime, &item.bytes)) {
                outcome.staged += 1;
            } else {
                outcome.rejected += 1;
            }
        }
        outcome
    }

    /// Stage an already encoded attachment. Returns false when it would exceed a bound.
    pub fn stage(&mut self, attachment: Attachment) -> bool {
        let size = attachment.byte_len();
        if self.staged.len() >= self.limits.max_attachments {
            tracing::warn!(
                max = self.limits.max_attachments,
                "Attachment rejected: staging buffer is full"
            );
            return false;
        }
        if self.total_bytes + size > self.limits.max_total_bytes {
            tracing::warn!(
                size,
                staged_bytes = self.total_bytes,
                max = self.limits.max_total_bytes,
                "Attachment rejected: staged size limit reached"
            );
            return false;
        }
        self.total_bytes += size;
        self.staged.push(attachment);
        true
    }

    /// Drop a staged attachment before it is sent.
    pub fn discard(&mut self, index: usize) -> Option<Attachment> {
        if index >= self.staged.len() {
            return None;
        }
        let removed = self.staged.remove(index);
        self.total_bytes -= removed.byte_len();
        Some(removed)
    }

    /// Drain everything staged, in capture order, for a submission.
    pub fn take(&mut self) -> Vec<Attachment> {
        self.total_bytes = 0;
        std::mem::take(&mut self.staged)
    }
}

/// Text being typed plus the attachments staged next to it.
#[derive(Debug)]
pub struct Composer {
    pub text: String,
    pub staging: StagingBuffer,
}

impl Composer {
    pub fn new(limits: CaptureConfig) -> Self {
        Self {
            text: String::new(),
            staging: StagingBuffer::new(limits),
        }
    }

    /// Hand the composed input to the session. Input is only cleared when the
    /// session actually took it, so a busy or empty submit loses nothing.
    pub fn submit_into(&mut self, session: &mut SessionController) -> SubmitOutcome {
        let outcome = session.submit(&self.text, self.staging.attachments());
        if matches!(outcome, SubmitOutcome::Sent { .. }) {
            self.text.clear();
            self.staging.take();
        }
        outcome
    }
}
