//! Google Search Console provider client
//!
//! Pulls the Search Analytics report for a bound site, one page per call,
//! using `startRow` offset pagination. Discovery lists the verified sites
//! the authorized account can read.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::providers::google::{GoogleOAuth, classify_report_failure, parse_retry_after};
use crate::providers::trait_::{
    AuthorizeParams, DateRange, DiscoveredResource, GscMetricRow, MetricPage, MetricRow,
    PageCursor, Provider, ProviderClient, ProviderError, TokenGrant,
};

/// Scope granting read access to Search Console data
pub const GSC_SCOPE: &str = "https://www.googleapis.com/auth/webmasters.readonly";

/// Default Search Console API base
pub const GSC_API_BASE: &str = "https://www.googleapis.com/webmasters/v3";

/// Report dimensions requested per row; the order fixes the `keys` layout.
const REPORT_DIMENSIONS: [&str; 3] = ["date", "page", "query"];

/// Search Analytics query response
#[derive(Debug, Deserialize)]
struct SearchAnalyticsResponse {
    #[serde(default)]
    rows: Vec<SearchAnalyticsRow>,
}

#[derive(Debug, Deserialize)]
struct SearchAnalyticsRow {
    #[serde(default)]
    keys: Vec<String>,
    #[serde(default)]
    clicks: f64,
    #[serde(default)]
    impressions: f64,
    #[serde(default)]
    position: f64,
}

/// Sites listing response
#[derive(Debug, Deserialize)]
struct SitesListResponse {
    #[serde(rename = "siteEntry", default)]
    site_entry: Vec<SiteEntry>,
}

#[derive(Debug, Deserialize)]
struct SiteEntry {
    #[serde(rename = "siteUrl")]
    site_url: String,
    #[serde(rename = "permissionLevel")]
    permission_level: String,
}

/// Search Console client
pub struct GscClient {
    http_client: Client,
    oauth: GoogleOAuth,
    api_base: String,
    page_size: u64,
}

impl GscClient {
    pub fn new(http_client: Client, oauth: GoogleOAuth, api_base: String, page_size: u64) -> Self {
        Self {
            http_client,
            oauth,
            api_base,
            page_size,
        }
    }

    /// Endpoint for a site-scoped call; the site URL rides as a single
    /// percent-encoded path segment (it contains `:` and `/`).
    fn site_endpoint(&self, site_url: &str, tail: &str) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.api_base).map_err(|e| ProviderError::Config {
            details: format!("invalid GSC API base URL: {}", e),
        })?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::Config {
                details: "GSC API base URL cannot be a base".to_string(),
            })?
            .push("sites")
            .push(site_url)
            .extend(tail.split('/'));
        Ok(url)
    }
}

fn parse_report_rows(rows: Vec<SearchAnalyticsRow>) -> Result<Vec<MetricRow>, ProviderError> {
    rows.into_iter()
        .map(|row| {
            if row.keys.len() != REPORT_DIMENSIONS.len() {
                return Err(ProviderError::MalformedResponse {
                    details: format!(
                        "expected {} row keys, got {}",
                        REPORT_DIMENSIONS.len(),
                        row.keys.len()
                    ),
                });
            }

            let date = NaiveDate::parse_from_str(&row.keys[0], "%Y-%m-%d").map_err(|e| {
                ProviderError::MalformedResponse {
                    details: format!("unparseable row date '{}': {}", row.keys[0], e),
                }
            })?;

            Ok(MetricRow::Gsc(GscMetricRow {
                date,
                page: row.keys[1].clone(),
                query: row.keys[2].clone(),
                clicks: row.clicks as i64,
                impressions: row.impressions as i64,
                position: row.position,
            }))
        })
        .collect()
}

#[async_trait]
impl ProviderClient for GscClient {
    fn provider(&self) -> Provider {
        Provider::Gsc
    }

    fn scopes(&self) -> Vec<String> {
        vec![GSC_SCOPE.to_string()]
    }

    fn authorize_url(&self, params: AuthorizeParams) -> Result<Url, ProviderError> {
        self.oauth.authorize_url(&self.scopes(), &params)
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ProviderError> {
        self.oauth.exchange_code(code).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError> {
        self.oauth.refresh(refresh_token).await
    }

    async fn discover(&self, access_token: &str) -> Result<Vec<DiscoveredResource>, ProviderError> {
        let url = format!("{}/sites", self.api_base);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ProviderError::Network {
                details: format!("sites listing failed: {}", e),
                retryable: e.is_timeout() || e.is_connect(),
            })?;

        let status = response.status().as_u16();
        let retry_after = parse_retry_after(response.headers());
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_report_failure(status, retry_after, &body));
        }

        let listing = response.json::<SitesListResponse>().await.map_err(|e| {
            ProviderError::MalformedResponse {
                details: format!("failed to parse sites listing: {}", e),
            }
        })?;

        Ok(listing
            .site_entry
            .into_iter()
            .map(|entry| DiscoveredResource {
                resource_id: entry.site_url,
                display_name: Some(entry.permission_level),
            })
            .collect())
    }

    async fn fetch_page(
        &self,
        access_token: &str,
        resource_id: &str,
        range: &DateRange,
        cursor: PageCursor,
    ) -> Result<MetricPage, ProviderError> {
        let url = self.site_endpoint(resource_id, "searchAnalytics/query")?;

        let body = json!({
            "startDate": range.start.format("%Y-%m-%d").to_string(),
            "endDate": range.end.format("%Y-%m-%d").to_string(),
            "dimensions": REPORT_DIMENSIONS,
            "rowLimit": self.page_size,
            "startRow": cursor.0,
        });

        let response = self
            .http_client
            .post(url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network {
                details: format!("search analytics query failed: {}", e),
                retryable: e.is_timeout() || e.is_connect(),
            })?;

        let status = response.status().as_u16();
        let retry_after = parse_retry_after(response.headers());
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_report_failure(status, retry_after, &body));
        }

        let report = response
            .json::<SearchAnalyticsResponse>()
            .await
            .map_err(|e| ProviderError::MalformedResponse {
                details: format!("failed to parse search analytics response: {}", e),
            })?;

        let row_count = report.rows.len() as u64;
        let rows = parse_report_rows(report.rows)?;

        // A full page means more rows may follow; a short or empty page
        // ends the report.
        let next = if row_count == self.page_size {
            Some(PageCursor(cursor.0 + self.page_size))
        } else {
            None
        };

        Ok(MetricPage { rows, next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rows() -> Vec<SearchAnalyticsRow> {
        serde_json::from_value(serde_json::json!([
            {
                "keys": ["2026-06-01", "https://example.com/pricing", "seo tool pricing"],
                "clicks": 12.0,
                "impressions": 340.0,
                "ctr": 0.035,
                "position": 4.7
            },
            {
                "keys": ["2026-06-02", "https://example.com/", "seo dashboard"],
                "clicks": 3.0,
                "impressions": 95.0,
                "ctr": 0.031,
                "position": 11.2
            }
        ]))
        .unwrap()
    }

    #[test]
    fn test_parse_report_rows() {
        let rows = parse_report_rows(sample_rows()).unwrap();
        assert_eq!(rows.len(), 2);

        let MetricRow::Gsc(first) = &rows[0] else {
            panic!("expected a GSC row");
        };
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2026, 6, 1).unwrap());
        assert_eq!(first.page, "https://example.com/pricing");
        assert_eq!(first.query, "seo tool pricing");
        assert_eq!(first.clicks, 12);
        assert_eq!(first.impressions, 340);
        assert!((first.position - 4.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_report_rows_rejects_short_keys() {
        let rows: Vec<SearchAnalyticsRow> = serde_json::from_value(serde_json::json!([
            {"keys": ["2026-06-01"], "clicks": 1.0, "impressions": 2.0, "position": 3.0}
        ]))
        .unwrap();

        assert!(matches!(
            parse_report_rows(rows),
            Err(ProviderError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_site_endpoint_encodes_site_url() {
        let http_client = Client::new();
        let oauth = GoogleOAuth::new(
            http_client.clone(),
            "id".into(),
            "secret".into(),
            "https://app.example.com/callback".into(),
            crate::providers::google::GOOGLE_AUTH_URL.into(),
            crate::providers::google::GOOGLE_TOKEN_URL.into(),
            crate::providers::google::GOOGLE_USERINFO_URL.into(),
        );
        let client = GscClient::new(http_client, oauth, GSC_API_BASE.to_string(), 25_000);

        // ':' is a legal path-segment character and stays literal
        let url = client
            .site_endpoint("sc-domain:example.com", "searchAnalytics/query")
            .unwrap();
        assert!(
            url.as_str()
                .ends_with("/sites/sc-domain:example.com/searchAnalytics/query")
        );

        // '/' inside the site URL must ride encoded in its single segment
        let url = client
            .site_endpoint("https://www.example.com/", "searchAnalytics/query")
            .unwrap();
        assert!(
            url.as_str()
                .contains("/sites/https:%2F%2Fwww.example.com%2F/searchAnalytics/query")
        );
    }
}
