//! Provider registry
//!
//! Holds the configured provider clients keyed by the closed [`Provider`]
//! union. Built once from configuration at startup and passed explicitly
//! to the components that need it; there is no process-wide singleton.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::warn;

use crate::config::AppConfig;
use crate::providers::ga4::Ga4Client;
use crate::providers::google::GoogleOAuth;
use crate::providers::gsc::GscClient;
use crate::providers::trait_::{Provider, ProviderClient, ProviderMetadata};

/// Error type for registry operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("provider '{provider}' is not configured")]
    ProviderNotConfigured { provider: Provider },
}

/// Provider registry that stores configured clients
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: HashMap<Provider, Arc<dyn ProviderClient>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    /// Build the registry from application configuration, registering every
    /// provider whose credentials are present.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::new();

        let http_client = Client::builder()
            .timeout(Duration::from_millis(config.provider_http_timeout_ms))
            .build()
            .unwrap_or_default();

        match (
            config.google_client_id.clone(),
            config.google_client_secret.clone(),
        ) {
            (Some(client_id), Some(client_secret)) => {
                let oauth = |provider: Provider| {
                    GoogleOAuth::new(
                        http_client.clone(),
                        client_id.clone(),
                        client_secret.clone(),
                        config.oauth_redirect_uri(provider),
                        config.google_auth_base.clone(),
                        config.google_token_base.clone(),
                        config.google_userinfo_base.clone(),
                    )
                };

                registry.register(Arc::new(GscClient::new(
                    http_client.clone(),
                    oauth(Provider::Gsc),
                    config.gsc_api_base.clone(),
                    config.sync.page_size,
                )));

                registry.register(Arc::new(Ga4Client::new(
                    http_client.clone(),
                    oauth(Provider::Ga4),
                    config.ga4_data_api_base.clone(),
                    config.ga4_admin_api_base.clone(),
                    config.sync.page_size,
                )));
            }
            _ => {
                warn!(
                    "Google providers not registered: missing Google OAuth client credentials"
                );
            }
        }

        // Ahrefs is part of the provider union but has no sync client yet;
        // lookups report it unconfigured.

        registry
    }

    /// Register a provider client
    pub fn register(&mut self, client: Arc<dyn ProviderClient>) {
        self.clients.insert(client.provider(), client);
    }

    /// Get a client by provider
    pub fn get(&self, provider: Provider) -> Result<Arc<dyn ProviderClient>, RegistryError> {
        self.clients
            .get(&provider)
            .cloned()
            .ok_or(RegistryError::ProviderNotConfigured { provider })
    }

    /// Metadata for every provider in the union, sorted by slug for stable
    /// ordering; unconfigured providers are listed as such.
    pub fn list_metadata(&self) -> Vec<ProviderMetadata> {
        let mut metadata: Vec<_> = [Provider::Gsc, Provider::Ga4, Provider::Ahrefs]
            .into_iter()
            .map(|provider| match self.clients.get(&provider) {
                Some(client) => ProviderMetadata {
                    provider,
                    configured: true,
                    scopes: client.scopes(),
                },
                None => ProviderMetadata {
                    provider,
                    configured: false,
                    scopes: Vec::new(),
                },
            })
            .collect();
        metadata.sort_by_key(|m| m.provider.as_str());
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::trait_::{
        AuthorizeParams, DateRange, DiscoveredResource, MetricPage, PageCursor, ProviderError,
        TokenGrant,
    };
    use async_trait::async_trait;
    use url::Url;

    struct TestClient(Provider);

    #[async_trait]
    impl ProviderClient for TestClient {
        fn provider(&self) -> Provider {
            self.0
        }

        fn scopes(&self) -> Vec<String> {
            vec!["test.readonly".to_string()]
        }

        fn authorize_url(&self, _params: AuthorizeParams) -> Result<Url, ProviderError> {
            Ok(Url::parse("https://example.com/oauth/authorize").unwrap())
        }

        async fn exchange_code(&self, _code: &str) -> Result<TokenGrant, ProviderError> {
            Err(ProviderError::Config {
                details: "not implemented".to_string(),
            })
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, ProviderError> {
            Err(ProviderError::Config {
                details: "not implemented".to_string(),
            })
        }

        async fn discover(
            &self,
            _access_token: &str,
        ) -> Result<Vec<DiscoveredResource>, ProviderError> {
            Ok(vec![])
        }

        async fn fetch_page(
            &self,
            _access_token: &str,
            _resource_id: &str,
            _range: &DateRange,
            _cursor: PageCursor,
        ) -> Result<MetricPage, ProviderError> {
            Ok(MetricPage {
                rows: vec![],
                next: None,
            })
        }
    }

    #[test]
    fn test_registry_unconfigured_provider() {
        let registry = ProviderRegistry::new();

        let result = registry.get(Provider::Ahrefs);
        assert!(matches!(
            result,
            Err(RegistryError::ProviderNotConfigured {
                provider: Provider::Ahrefs
            })
        ));
    }

    #[test]
    fn test_registry_known_provider() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(TestClient(Provider::Gsc)));

        assert!(registry.get(Provider::Gsc).is_ok());
        assert!(registry.get(Provider::Ga4).is_err());
    }

    #[test]
    fn test_list_metadata_covers_whole_union() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(TestClient(Provider::Ga4)));

        let metadata = registry.list_metadata();
        assert_eq!(metadata.len(), 3);

        let ga4 = metadata
            .iter()
            .find(|m| m.provider == Provider::Ga4)
            .unwrap();
        assert!(ga4.configured);
        assert_eq!(ga4.scopes, vec!["test.readonly".to_string()]);

        let ahrefs = metadata
            .iter()
            .find(|m| m.provider == Provider::Ahrefs)
            .unwrap();
        assert!(!ahrefs.configured);
    }
}
