//! Container negotiation
//!
//! Picks the first media type from an ordered preference list that the
//! platform encoder supports, with a guaranteed non-empty fallback.

use serde::{Deserialize, Serialize};

/// Used when the configured fallback is blank
pub const DEFAULT_FALLBACK_MIME: &str = "video/webm";

/// Default preference order, most compatible first
pub fn default_mime_preferences() -> Vec<String> {
    [
        "video/mp4;codecs=avc1,mp4a",
        "video/mp4",
        "video/webm;codecs=vp9,opus",
        "video/webm;codecs=vp8,opus",
        "video/webm",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Outcome of negotiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MimeChoice {
    pub mime_type: String,
    /// True when no preference was supported
    pub from_fallback: bool,
}

impl MimeChoice {
    /// Container part of the type, e.g. `video/webm`
    pub fn container(&self) -> &str {
        container_of(&self.mime_type)
    }

    /// `mp4` for MP4 containers, `webm` for everything else
    pub fn extension(&self) -> &'static str {
        if self.container() == "video/mp4" {
            "mp4"
        } else {
            "webm"
        }
    }

    pub fn is_broadly_compatible(&self) -> bool {
        is_broadly_compatible(&self.mime_type)
    }
}

/// Container part of a media type, without codec parameters
pub fn container_of(mime_type: &str) -> &str {
    mime_type.split(';').next().unwrap_or(mime_type).trim()
}

/// Whether common players open this container without extra software
pub fn is_broadly_compatible(mime_type: &str) -> bool {
    container_of(mime_type) == "video/mp4"
}

/// Return the first supported preference, or the fallback
pub fn resolve_mime_type<F>(preferences: &[String], fallback: &str, is_supported: F) -> MimeChoice
where
    F: Fn(&str) -> bool,
{
    for candidate in preferences.iter().filter(|p| !p.trim().is_empty()) {
        if is_supported(candidate) {
            tracing::debug!("Negotiated container {}", candidate);
            return MimeChoice {
                mime_type: candidate.clone(),
                from_fallback: false,
            };
        }
        tracing::debug!("Container {} not supported", candidate);
    }

    let fallback = if fallback.trim().is_empty() {
        DEFAULT_FALLBACK_MIME
    } else {
        fallback
    };
    tracing::warn!("No preferred container supported, falling back to {}", fallback);
    MimeChoice {
        mime_type: fallback.to_string(),
        from_fallback: true,
    }
}
