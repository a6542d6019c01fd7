use base64::Engine as _;
use serde::Serialize;

/// Mime type assumed when the captured data URL does not say.
pub const DEFAULT_MIME: &str = "image/jpeg";

/// A captured image held as a `data:<mime>;base64,<payload>` URL.
///
/// The same value is staged before sending and kept afterwards as the display
/// reference inside the transcript entry it was sent with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Attachment {
    data_url: String,
}

impl Attachment {
    pub fn from_data_url(data_url: impl Into<String>) -> Self {
        Self {
            data_url: data_url.into(),
        }
    }

    /// Encode raw image bytes the way a clipboard read produces them.
    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Self {
        let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self {
            data_url: format!("data:{mime};base64,{payload}"),
        }
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    pub fn byte_len(&self) -> usize {
        self.data_url.len()
    }

    pub fn decode(&self) -> InlineImage {
        decode(&self.data_url)
    }
}

/// Transport-ready form of an attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

/// Split a captured image into mime type and payload. Never fails: input without a
/// readable type descriptor gets [`DEFAULT_MIME`], input without a separator is
/// treated as payload in full.
pub fn decode(raw: &str) -> InlineImage {
    let data = match raw.split_once(',') {
        Some((_, payload)) => payload,
        None => raw,
    };

    let mime_type = extract_mime(raw).unwrap_or_else(|| {
        tracing::debug!("No mime type in captured image, defaulting to {DEFAULT_MIME}");
        DEFAULT_MIME
    });

    InlineImage {
        mime_type: mime_type.to_string(),
        data: data.to_string(),
    }
}

fn extract_mime(raw: &str) -> Option<&str> {
    let mut search = raw;
    while let Some(start) = search.find("data:") {
        let candidate = &search[start + "data:".len()..];
        if let Some(end) = candidate.find(';') {
            if end > 0 && candidate[end + 1..].starts_with("base64") {
                return Some(&candidate[..end]);
            }
        }
        search = candidate;
    }
    None
}
