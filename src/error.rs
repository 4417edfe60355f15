use reqwest::{Response, StatusCode};
use thiserror::Error;

/// Failures reported by one of the hosted services the bot talks to.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{provider} request failed: {status} - {body}")]
    Http {
        provider: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("{provider} returned a malformed response: {reason}")]
    Malformed {
        provider: &'static str,
        reason: String,
    },

    #[error("telegram api error {code}: {description}")]
    Telegram { code: i64, description: String },
}

impl ProviderError {
    pub fn malformed(provider: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            provider,
            reason: reason.into(),
        }
    }

    /// Passes successful responses through and turns everything else into `Http`.
    pub async fn check(provider: &'static str, response: Response) -> Result<Response, Self> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(Self::Http {
            provider,
            status,
            body,
        })
    }
}
