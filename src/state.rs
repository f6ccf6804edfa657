//! OAuth redirect state codec
//!
//! The authorization flow threads its context (which project, which
//! integration) through the provider consent screen as a single opaque
//! query parameter. The payload is a small JSON record encoded with
//! URL-safe base64 so it survives any redirect shape the provider uses.
//!
//! The codec applies no signature or encryption: a decoded state selects
//! *which* credential row a callback writes, never *whether* the caller is
//! allowed to write it. Endpoints that mint states enforce authorization
//! separately.

use serde::{Deserialize, Serialize};

use crate::error::SyncFailure;
use crate::providers::Provider;

/// Flow context carried across the consent redirect round trip. Exists
/// only inside the encoded token; treated as untrusted input on return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowState {
    /// Integration being authorized; defaults to Search Console when the
    /// field is absent entirely.
    #[serde(default = "default_integration")]
    pub integration: Provider,

    /// Project the credential will be stored under
    #[serde(rename = "projectId", skip_serializing_if = "Option::is_none", default)]
    pub project_id: Option<i64>,
}

fn default_integration() -> Provider {
    Provider::Gsc
}

impl Default for FlowState {
    fn default() -> Self {
        Self {
            integration: default_integration(),
            project_id: None,
        }
    }
}

impl FlowState {
    pub fn new(integration: Provider, project_id: i64) -> Self {
        Self {
            integration,
            project_id: Some(project_id),
        }
    }
}

/// Encode a flow state into an opaque URL-safe token.
pub fn encode(state: &FlowState) -> String {
    // Serialization of this struct cannot fail
    let json = serde_json::to_vec(state).expect("flow state serializes");
    base64_url::encode(&json)
}

/// Decode an opaque token back into a flow state.
///
/// Missing optional fields take their documented defaults; anything else
/// (bad base64, bad JSON, unknown integration slug, wrong field type)
/// fails closed with [`SyncFailure::MalformedState`].
pub fn decode(token: &str) -> Result<FlowState, SyncFailure> {
    let bytes = base64_url::decode(token).map_err(|_| SyncFailure::MalformedState)?;
    serde_json::from_slice(&bytes).map_err(|_| SyncFailure::MalformedState)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for state in [
            FlowState::new(Provider::Gsc, 27),
            FlowState::new(Provider::Ga4, 1),
            FlowState::new(Provider::Ahrefs, i64::MAX),
            FlowState::default(),
        ] {
            let token = encode(&state);
            assert_eq!(decode(&token).unwrap(), state);
        }
    }

    #[test]
    fn test_token_is_url_safe() {
        let token = encode(&FlowState::new(Provider::Ga4, 999_999));
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_missing_integration_defaults_to_gsc() {
        let token = base64_url::encode(br#"{"projectId":27}"#);
        let state = decode(&token).unwrap();
        assert_eq!(state.integration, Provider::Gsc);
        assert_eq!(state.project_id, Some(27));
    }

    #[test]
    fn test_missing_project_is_none() {
        let token = base64_url::encode(br#"{"integration":"ga4"}"#);
        let state = decode(&token).unwrap();
        assert_eq!(state.integration, Provider::Ga4);
        assert_eq!(state.project_id, None);
    }

    #[test]
    fn test_malformed_tokens_fail_closed() {
        // Not base64
        assert!(matches!(decode("%%%"), Err(SyncFailure::MalformedState)));
        // Base64 but not JSON
        assert!(matches!(
            decode(&base64_url::encode(b"not json")),
            Err(SyncFailure::MalformedState)
        ));
        // Valid JSON, unknown integration slug: present-but-invalid fails
        assert!(matches!(
            decode(&base64_url::encode(br#"{"integration":"bing","projectId":3}"#)),
            Err(SyncFailure::MalformedState)
        ));
        // Wrong field type
        assert!(matches!(
            decode(&base64_url::encode(br#"{"projectId":"twenty"}"#)),
            Err(SyncFailure::MalformedState)
        ));
    }
}
