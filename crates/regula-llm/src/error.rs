#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited by {provider}")]
    RateLimited { provider: &'static str },

    #[error("{provider} unavailable (status {status})")]
    Unavailable { provider: &'static str, status: u16 },

    #[error("{provider} rejected credentials (status {status})")]
    Unauthorized { provider: &'static str, status: u16 },

    #[error("{provider} rejected request (status {status}): {message}")]
    InvalidRequest {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("{provider} call timed out after {seconds}s")]
    Timeout { provider: &'static str, seconds: u64 },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("{provider} returned {got} embeddings for {expected} inputs")]
    EmbeddingCount {
        provider: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("embedding not supported by {provider}")]
    EmbedUnsupported { provider: &'static str },

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Whether the failure may succeed on a later attempt.
    ///
    /// Rate limits, server-side unavailability, transport failures and
    /// per-attempt timeouts are transient. Credential and request-shape errors
    /// are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Unavailable { .. } | Self::Timeout { .. } => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Json(_)
            | Self::Unauthorized { .. }
            | Self::InvalidRequest { .. }
            | Self::EmptyResponse { .. }
            | Self::EmbeddingCount { .. }
            | Self::EmbedUnsupported { .. }
            | Self::Other(_) => false,
        }
    }

    /// Map a non-success HTTP status into the matching error kind.
    #[must_use]
    pub fn from_status(provider: &'static str, status: reqwest::StatusCode, body: &str) -> Self {
        let code = status.as_u16();
        match code {
            429 => Self::RateLimited { provider },
            401 | 403 => Self::Unauthorized {
                provider,
                status: code,
            },
            400..=499 => Self::InvalidRequest {
                provider,
                status: code,
                message: truncate(body, 200),
            },
            _ => Self::Unavailable {
                provider,
                status: code,
            },
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_owned(),
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_transient() {
        assert!(LlmError::RateLimited { provider: "openai" }.is_transient());
    }

    #[test]
    fn timeout_is_transient() {
        let err = LlmError::Timeout {
            provider: "ollama",
            seconds: 5,
        };
        assert!(err.is_transient());
    }

    #[test]
    fn auth_and_bad_request_are_fatal() {
        assert!(
            !LlmError::Unauthorized {
                provider: "openai",
                status: 401
            }
            .is_transient()
        );
        assert!(
            !LlmError::InvalidRequest {
                provider: "openai",
                status: 400,
                message: "bad".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn status_mapping() {
        use reqwest::StatusCode;
        assert!(matches!(
            LlmError::from_status("openai", StatusCode::TOO_MANY_REQUESTS, ""),
            LlmError::RateLimited { .. }
        ));
        assert!(matches!(
            LlmError::from_status("openai", StatusCode::UNAUTHORIZED, ""),
            LlmError::Unauthorized { status: 401, .. }
        ));
        assert!(matches!(
            LlmError::from_status("openai", StatusCode::UNPROCESSABLE_ENTITY, "nope"),
            LlmError::InvalidRequest { status: 422, .. }
        ));
        assert!(matches!(
            LlmError::from_status("openai", StatusCode::BAD_GATEWAY, ""),
            LlmError::Unavailable { status: 502, .. }
        ));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(500);
        let LlmError::InvalidRequest { message, .. } =
            LlmError::from_status("openai", reqwest::StatusCode::BAD_REQUEST, &body)
        else {
            panic!("expected InvalidRequest");
        };
        assert_eq!(message.chars().count(), 203);
    }
}
