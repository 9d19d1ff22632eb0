//! Connection transport selection.
//!
//! Centralizes the transport fallback policy so it is not re-derived at every
//! deployment call site.

use serde::{Deserialize, Serialize};

/// Wire transport an MCP client uses to reach a deployed server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    /// Server-sent events; the system default for reliability
    Sse,
    StreamableHttp,
    Http,
}

impl TransportType {
    /// System-wide fallback when neither the caller nor the template states a
    /// preference. SSE has proven the most reliable transport for this
    /// protocol in practice.
    pub const DEFAULT: TransportType = TransportType::Sse;

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Sse => "sse",
            TransportType::StreamableHttp => "streamable_http",
            TransportType::Http => "http",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "sse" => Some(TransportType::Sse),
            "streamable_http" => Some(TransportType::StreamableHttp),
            "http" => Some(TransportType::Http),
            _ => None,
        }
    }
}

/// Resolve the transport for a new deployment.
///
/// Priority, first match wins: explicit user selection, then the template's
/// default, then [`TransportType::DEFAULT`].
pub fn resolve_transport_type(user_selection: Option<TransportType>, template_default: Option<TransportType>) -> TransportType {
    user_selection.or(template_default).unwrap_or(TransportType::DEFAULT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_selection_wins() {
        assert_eq!(
            resolve_transport_type(Some(TransportType::Http), Some(TransportType::StreamableHttp)),
            TransportType::Http
        );
    }

    #[test]
    fn template_default_wins_without_selection() {
        assert_eq!(
            resolve_transport_type(None, Some(TransportType::StreamableHttp)),
            TransportType::StreamableHttp
        );
    }

    #[test]
    fn system_default_is_sse() {
        assert_eq!(resolve_transport_type(None, None), TransportType::Sse);
    }
}
