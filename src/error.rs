//! Typed error sum surfaced by the Platform Gateway.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The requested resource does not exist. Swallowed by `delete_ref`,
    /// `remove_label`, and merge-tag loading.
    #[error("not found: {0}")]
    NotFound(String),

    /// A validation-class failure whose meaning depends on the call site:
    /// on `update_ref(force=false)` it means "not fast-forwardable"; on
    /// `add_labels` it means "already exists".
    #[error("unprocessable: {0}")]
    Unprocessable(String),

    /// Any other failure that is plausibly transient (network blip, rate
    /// limit, 5xx). Callers retry or escalate per §7.
    #[error("transient error: {0}")]
    Transient(String),

    /// Any other failure that is not worth retrying.
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound(_))
    }

    pub fn is_unprocessable(&self) -> bool {
        matches!(self, GatewayError::Unprocessable(_))
    }

    /// Classifies an `octocrab::Error` into the typed sum by inspecting the
    /// HTTP status, where available.
    pub fn from_octocrab(context: &str, err: octocrab::Error) -> Self {
        match &err {
            octocrab::Error::GitHub { source, .. } => {
                let status = source.status_code;
                let detail = format!("{context}: {}", source.message);
                match status.as_u16() {
                    404 => GatewayError::NotFound(detail),
                    422 => GatewayError::Unprocessable(detail),
                    429 | 500..=599 => GatewayError::Transient(detail),
                    _ => GatewayError::Fatal(detail),
                }
            }
            octocrab::Error::Http { .. } => {
                GatewayError::Transient(format!("{context}: {err}"))
            }
            _ => GatewayError::Fatal(format!("{context}: {err}")),
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
