//! Google Analytics 4 provider client
//!
//! Pulls a daily traffic report from the GA4 Data API (`runReport`) with
//! offset pagination. Discovery lists the properties visible to the
//! authorized account via the Admin API's account summaries.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::providers::google::{GoogleOAuth, classify_report_failure, parse_retry_after};
use crate::providers::trait_::{
    AuthorizeParams, DateRange, DiscoveredResource, Ga4MetricRow, MetricPage, MetricRow,
    PageCursor, Provider, ProviderClient, ProviderError, TokenGrant,
};

/// Scope granting read access to Analytics data
pub const GA4_SCOPE: &str = "https://www.googleapis.com/auth/analytics.readonly";

/// Default GA4 Data API base
pub const GA4_DATA_API_BASE: &str = "https://analyticsdata.googleapis.com/v1beta";

/// Default GA4 Admin API base (property discovery)
pub const GA4_ADMIN_API_BASE: &str = "https://analyticsadmin.googleapis.com/v1beta";

/// Metric names requested per row; the order fixes the `metricValues` layout.
const REPORT_METRICS: [&str; 5] = [
    "sessions",
    "totalUsers",
    "newUsers",
    "engagedSessions",
    "engagementRate",
];

/// runReport response
#[derive(Debug, Deserialize)]
struct RunReportResponse {
    #[serde(default)]
    rows: Vec<ReportRow>,
    #[serde(rename = "rowCount", default)]
    row_count: u64,
}

#[derive(Debug, Deserialize)]
struct ReportRow {
    #[serde(rename = "dimensionValues", default)]
    dimension_values: Vec<ReportValue>,
    #[serde(rename = "metricValues", default)]
    metric_values: Vec<ReportValue>,
}

#[derive(Debug, Deserialize)]
struct ReportValue {
    #[serde(default)]
    value: String,
}

/// Admin API account summaries response
#[derive(Debug, Deserialize)]
struct AccountSummariesResponse {
    #[serde(rename = "accountSummaries", default)]
    account_summaries: Vec<AccountSummary>,
}

#[derive(Debug, Deserialize)]
struct AccountSummary {
    #[serde(rename = "propertySummaries", default)]
    property_summaries: Vec<PropertySummary>,
}

#[derive(Debug, Deserialize)]
struct PropertySummary {
    /// Resource name, e.g. `properties/123456789`
    property: String,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

/// Analytics client
pub struct Ga4Client {
    http_client: Client,
    oauth: GoogleOAuth,
    data_api_base: String,
    admin_api_base: String,
    page_size: u64,
}

impl Ga4Client {
    pub fn new(
        http_client: Client,
        oauth: GoogleOAuth,
        data_api_base: String,
        admin_api_base: String,
        page_size: u64,
    ) -> Self {
        Self {
            http_client,
            oauth,
            data_api_base,
            admin_api_base,
            page_size,
        }
    }
}

fn parse_report_rows(
    property_id: &str,
    rows: Vec<ReportRow>,
) -> Result<Vec<MetricRow>, ProviderError> {
    rows.into_iter()
        .map(|row| {
            let raw_date = row
                .dimension_values
                .first()
                .map(|v| v.value.as_str())
                .ok_or_else(|| ProviderError::MalformedResponse {
                    details: "report row is missing the date dimension".to_string(),
                })?;

            // GA4 reports the date dimension as YYYYMMDD
            let date = NaiveDate::parse_from_str(raw_date, "%Y%m%d").map_err(|e| {
                ProviderError::MalformedResponse {
                    details: format!("unparseable row date '{}': {}", raw_date, e),
                }
            })?;

            if row.metric_values.len() != REPORT_METRICS.len() {
                return Err(ProviderError::MalformedResponse {
                    details: format!(
                        "expected {} metric values, got {}",
                        REPORT_METRICS.len(),
                        row.metric_values.len()
                    ),
                });
            }

            let metric = |index: usize| -> Result<f64, ProviderError> {
                let raw = &row.metric_values[index].value;
                raw.parse::<f64>()
                    .map_err(|e| ProviderError::MalformedResponse {
                        details: format!(
                            "unparseable {} value '{}': {}",
                            REPORT_METRICS[index], raw, e
                        ),
                    })
            };

            Ok(MetricRow::Ga4(Ga4MetricRow {
                property_id: property_id.to_string(),
                date,
                sessions: metric(0)? as i64,
                total_users: metric(1)? as i64,
                new_users: metric(2)? as i64,
                engaged_sessions: metric(3)? as i64,
                engagement_rate: metric(4)?,
            }))
        })
        .collect()
}

#[async_trait]
impl ProviderClient for Ga4Client {
    fn provider(&self) -> Provider {
        Provider::Ga4
    }

    fn scopes(&self) -> Vec<String> {
        vec![GA4_SCOPE.to_string()]
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
        let url = format!("{}/accountSummaries", self.admin_api_base);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ProviderError::Network {
                details: format!("account summaries request failed: {}", e),
                retryable: e.is_timeout() || e.is_connect(),
            })?;

        let status = response.status().as_u16();
        let retry_after = parse_retry_after(response.headers());
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_report_failure(status, retry_after, &body));
        }

        let summaries = response
            .json::<AccountSummariesResponse>()
            .await
            .map_err(|e| ProviderError::MalformedResponse {
                details: format!("failed to parse account summaries: {}", e),
            })?;

        Ok(summaries
            .account_summaries
            .into_iter()
            .flat_map(|account| account.property_summaries)
            .map(|summary| DiscoveredResource {
                resource_id: summary
                    .property
                    .strip_prefix("properties/")
                    .unwrap_or(&summary.property)
                    .to_string(),
                display_name: summary.display_name,
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
        let url = format!(
            "{}/properties/{}:runReport",
            self.data_api_base, resource_id
        );

        let body = json!({
            "dateRanges": [{
                "startDate": range.start.format("%Y-%m-%d").to_string(),
                "endDate": range.end.format("%Y-%m-%d").to_string(),
            }],
            "dimensions": [{"name": "date"}],
            "metrics": REPORT_METRICS.map(|name| json!({"name": name})),
            "limit": self.page_size,
            "offset": cursor.0,
        });

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network {
                details: format!("runReport request failed: {}", e),
                retryable: e.is_timeout() || e.is_connect(),
            })?;

        let status = response.status().as_u16();
        let retry_after = parse_retry_after(response.headers());
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_report_failure(status, retry_after, &body));
        }

        let report = response
            .json::<RunReportResponse>()
            .await
            .map_err(|e| ProviderError::MalformedResponse {
                details: format!("failed to parse runReport response: {}", e),
            })?;

        let total = report.row_count;
        let rows = parse_report_rows(resource_id, report.rows)?;

        let consumed = cursor.0 + rows.len() as u64;
        let next = if rows.is_empty() || consumed >= total {
            None
        } else {
            Some(PageCursor(consumed))
        };

        Ok(MetricPage { rows, next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_report_rows() {
        let rows: Vec<ReportRow> = serde_json::from_value(serde_json::json!([
            {
                "dimensionValues": [{"value": "20260601"}],
                "metricValues": [
                    {"value": "120"},
                    {"value": "95"},
                    {"value": "40"},
                    {"value": "80"},
                    {"value": "0.6667"}
                ]
            }
        ]))
        .unwrap();

        let parsed = parse_report_rows("123456789", rows).unwrap();
        assert_eq!(parsed.len(), 1);

        let MetricRow::Ga4(row) = &parsed[0] else {
            panic!("expected a GA4 row");
        };
        assert_eq!(row.property_id, "123456789");
        assert_eq!(row.date, NaiveDate::from_ymd_opt(2026, 6, 1).unwrap());
        assert_eq!(row.sessions, 120);
        assert_eq!(row.total_users, 95);
        assert_eq!(row.new_users, 40);
        assert_eq!(row.engaged_sessions, 80);
        assert!((row.engagement_rate - 0.6667).abs() < 1e-9);
    }

    #[test]
    fn test_parse_report_rows_rejects_missing_metrics() {
        let rows: Vec<ReportRow> = serde_json::from_value(serde_json::json!([
            {
                "dimensionValues": [{"value": "20260601"}],
                "metricValues": [{"value": "120"}]
            }
        ]))
        .unwrap();

        assert!(matches!(
            parse_report_rows("123456789", rows),
            Err(ProviderError::MalformedResponse { .. })
        ));
    }
}
