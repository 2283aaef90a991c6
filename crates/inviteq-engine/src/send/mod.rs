//! Send integration - the seam between the dispatcher and the provider

pub mod unipile;

pub use unipile::UnipileClient;

use async_trait::async_trait;

/// LinkedIn caps connection invite notes at 300 characters
pub const MAX_NOTE_CHARS: usize = 300;

/// Everything needed to send one connection invite
#[derive(Debug, Clone)]
pub struct InviteRequest {
    /// Provider-side ID of the sending account
    pub provider_ref: String,
    /// Provider-side ID of the target profile
    pub profile_ref: String,
    /// Optional invite note, already truncated
    pub message: Option<String>,
}

/// Outcome of a send attempt
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// Invite accepted by the provider
    Sent,
    /// Transient problem (rate limited, provider down, timeout); worth
    /// retrying later
    TransientFailure { error: String },
    /// The provider rejected the request; retrying cannot help
    PermanentFailure { error: String },
}

/// Provider abstraction the dispatcher sends through
#[async_trait]
pub trait SendIntegration: Send + Sync {
    async fn send_invite(&self, request: &InviteRequest) -> SendOutcome;
}

/// Cut an invite note down to the provider's limit, on a character
/// boundary, marking the cut with an ellipsis
pub fn truncate_note(note: &str) -> String {
    if note.chars().count() <= MAX_NOTE_CHARS {
        note.to_string()
    } else {
        let mut truncated: String = note.chars().take(MAX_NOTE_CHARS - 1).collect();
        truncated.push('…');
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_truncate_note_short_passes_through() {
        assert_eq!(truncate_note("hi there"), "hi there");
    }

    #[test]
    fn test_truncate_note_cuts_at_limit_with_ellipsis() {
        let long = "x".repeat(450);
        let truncated = truncate_note(&long);
        assert_eq!(truncated.chars().count(), MAX_NOTE_CHARS);
        assert!(truncated.ends_with('…'));
    }

    #[test]
    fn test_truncate_note_exactly_at_limit_is_untouched() {
        let note = "x".repeat(MAX_NOTE_CHARS);
        assert_eq!(truncate_note(&note), note);
    }

    #[test]
    fn test_truncate_note_respects_char_boundaries() {
        // Multi-byte characters must not be split.
        let long: String = "é".repeat(350);
        let truncated = truncate_note(&long);
        assert_eq!(truncated.chars().count(), MAX_NOTE_CHARS);
        assert!(truncated.ends_with('…'));
    }
}
