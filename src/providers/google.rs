//! Shared Google OAuth plumbing
//!
//! Both Google-backed providers (Search Console, Analytics) authenticate
//! against the same accounts.google.com consent screen and token endpoint;
//! this module holds the code exchange, refresh, and userinfo calls they
//! share. Per-provider scope and report logic stays in the provider files.

use std::collections::HashMap;

use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::providers::trait_::{AuthorizeParams, ProviderError, TokenGrant};

/// Default Google OAuth endpoints; overridable for tests.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Google OAuth token response
#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    expires_in: Option<u64>,
    refresh_token: Option<String>,
    scope: Option<String>,
}

/// Google userinfo response
#[derive(Debug, Deserialize)]
struct GoogleUserinfo {
    email: String,
}

/// OAuth client-credential half shared by the Google providers.
#[derive(Debug, Clone)]
pub struct GoogleOAuth {
    http_client: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    auth_base: String,
    token_base: String,
    userinfo_base: String,
}

impl GoogleOAuth {
    pub fn new(
        http_client: Client,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
        auth_base: String,
        token_base: String,
        userinfo_base: String,
    ) -> Self {
        Self {
            http_client,
            client_id,
            client_secret,
            redirect_uri,
            auth_base,
            token_base,
            userinfo_base,
        }
    }

    /// Build the consent URL. `access_type=offline` plus `prompt=consent`
    /// makes Google issue a refresh token on every full authorization, not
    /// just the first one for the account.
    pub fn authorize_url(
        &self,
        scopes: &[String],
        params: &AuthorizeParams,
    ) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.auth_base).map_err(|e| ProviderError::Config {
            details: format!("invalid Google auth base URL: {}", e),
        })?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", &params.state);
        Ok(url)
    }

    /// Exchange an authorization code for tokens, then resolve the account
    /// email from the userinfo endpoint for display.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ProviderError> {
        let mut params = HashMap::new();
        params.insert("client_id", self.client_id.as_str());
        params.insert("client_secret", self.client_secret.as_str());
        params.insert("code", code);
        params.insert("grant_type", "authorization_code");
        params.insert("redirect_uri", self.redirect_uri.as_str());

        let token = self.token_request(&params).await?;

        // Userinfo failure should not lose an otherwise valid grant; the
        // email is display-only.
        let account_email = match self.fetch_user_email(&token.access_token).await {
            Ok(email) => Some(email),
            Err(err) => {
                tracing::warn!(error = %err, "Failed to resolve account email after token exchange");
                None
            }
        };

        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
            scopes: split_scopes(token.scope.as_deref()),
            account_email,
        })
    }

    /// Redeem a refresh token. Google rarely rotates refresh tokens, so
    /// `refresh_token` is usually `None` in the returned grant.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError> {
        let mut params = HashMap::new();
        params.insert("client_id", self.client_id.as_str());
        params.insert("client_secret", self.client_secret.as_str());
        params.insert("refresh_token", refresh_token);
        params.insert("grant_type", "refresh_token");

        let token = self.token_request(&params).await?;

        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
            scopes: split_scopes(token.scope.as_deref()),
            account_email: None,
        })
    }

    async fn token_request(
        &self,
        params: &HashMap<&str, &str>,
    ) -> Result<GoogleTokenResponse, ProviderError> {
        let response = self
            .http_client
            .post(&self.token_base)
            .header("Accept", "application/json")
            .form(params)
            .send()
            .await
            .map_err(|e| ProviderError::Network {
                details: format!("token request failed: {}", e),
                retryable: e.is_timeout() || e.is_connect(),
            })?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = parse_retry_after(response.headers());
            return Err(ProviderError::RateLimited { retry_after });
        }

        if status.as_u16() == 400 || status.as_u16() == 401 {
            // invalid_grant / invalid_client: the code or refresh token is
            // no longer redeemable.
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Auth {
                details: format!("token endpoint rejected request ({}): {}", status, body),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: Some(body),
            });
        }

        response
            .json::<GoogleTokenResponse>()
            .await
            .map_err(|e| ProviderError::MalformedResponse {
                details: format!("failed to parse token response: {}", e),
            })
    }

    async fn fetch_user_email(&self, access_token: &str) -> Result<String, ProviderError> {
        let response = self
            .http_client
            .get(&self.userinfo_base)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ProviderError::Network {
                details: format!("userinfo request failed: {}", e),
                retryable: e.is_timeout() || e.is_connect(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: response.text().await.ok(),
            });
        }

        let userinfo =
            response
                .json::<GoogleUserinfo>()
                .await
                .map_err(|e| ProviderError::MalformedResponse {
                    details: format!("failed to parse userinfo response: {}", e),
                })?;

        Ok(userinfo.email)
    }
}

fn split_scopes(scope: Option<&str>) -> Vec<String> {
    scope
        .unwrap_or_default()
        .split_whitespace()
        .map(|s| s.to_string())
        .collect()
}

/// Parse a Retry-After header value in seconds.
pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

/// Map a report-API response status into a provider error, shared by the
/// Google report clients. Quota exhaustion surfaces as 403 with a reason
/// string as often as it does 429.
pub fn classify_report_failure(status: u16, retry_after: Option<u64>, body: &str) -> ProviderError {
    if status == 429 {
        return ProviderError::RateLimited { retry_after };
    }

    if status == 403 {
        let body_lower = body.to_lowercase();
        let quota_error_patterns = [
            "userratelimitexceeded",
            "ratelimitexceeded",
            "quotaexceeded",
            "dailylimitexceeded",
        ];
        if quota_error_patterns
            .iter()
            .any(|pattern| body_lower.contains(pattern))
        {
            return ProviderError::RateLimited { retry_after };
        }
        return ProviderError::Auth {
            details: format!("access forbidden: {}", body),
        };
    }

    if status == 401 {
        return ProviderError::Auth {
            details: format!("access token rejected: {}", body),
        };
    }

    ProviderError::Http {
        status,
        body: Some(body.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_report_failure() {
        assert!(matches!(
            classify_report_failure(429, Some(30), ""),
            ProviderError::RateLimited {
                retry_after: Some(30)
            }
        ));

        // Quota-flavored 403s are rate limits, plain 403s are auth failures
        assert!(matches!(
            classify_report_failure(403, None, r#"{"error":{"errors":[{"reason":"rateLimitExceeded"}]}}"#),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_report_failure(403, None, "user does not have access"),
            ProviderError::Auth { .. }
        ));

        assert!(matches!(
            classify_report_failure(401, None, "invalid credentials"),
            ProviderError::Auth { .. }
        ));
        assert!(matches!(
            classify_report_failure(500, None, "boom"),
            ProviderError::Http { status: 500, .. }
        ));
    }

    #[test]
    fn test_split_scopes() {
        assert_eq!(
            split_scopes(Some("a b  c")),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert!(split_scopes(None).is_empty());
    }
}
