//! Garmin Connect API client for authenticated requests
//!
//! A thin authenticated wrapper over the Connect REST endpoints the sync
//! reads from. Every fetcher returns raw `serde_json::Value`; shape
//! interpretation lives in the extraction layer, which is built to absorb
//! the upstream's schema drift.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;

use crate::client::session::OAuth2Token;
use crate::error::{Result, SyncError};

/// User agent for Connect API requests
const API_USER_AGENT: &str = "GCM-iOS-5.7.2.1";

/// Garmin Connect API client
pub struct GarminClient {
    client: Client,
    base_url: String,
}

impl GarminClient {
    /// Create a new API client for the given domain
    pub fn new(domain: &str) -> Result<Self> {
        Self::with_base_url(format!("https://connectapi.{}", domain))
    }

    /// Create a new API client with a custom base URL (for testing)
    #[doc(hidden)]
    pub fn new_with_base_url(base_url: &str) -> Result<Self> {
        Self::with_base_url(base_url.to_string())
    }

    fn with_base_url(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { client, base_url })
    }

    /// Build the full URL for a given path
    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Build headers with authorization
    fn build_headers(&self, token: &OAuth2Token) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(API_USER_AGENT));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&token.authorization_header())
                .map_err(|e| SyncError::auth(format!("invalid token material: {}", e)))?,
        );
        Ok(headers)
    }

    /// Make an authenticated GET request and return the response
    pub async fn get(&self, token: &OAuth2Token, path: &str) -> Result<Response> {
        let url = self.build_url(path);
        let headers = self.build_headers(token)?;

        let response = self
            .client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(SyncError::Http)?;

        self.handle_response_status(response, path).await
    }

    /// Make an authenticated GET request and parse the JSON response
    pub async fn get_json(&self, token: &OAuth2Token, path: &str) -> Result<Value> {
        let response = self.get(token, path).await?;
        response.json().await.map_err(|e| {
            SyncError::invalid_response(format!("Failed to parse JSON response: {}", e))
        })
    }

    /// Handle response status codes and convert to errors
    async fn handle_response_status(&self, response: Response, path: &str) -> Result<Response> {
        let status = response.status();

        match status {
            StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED | StatusCode::NO_CONTENT => {
                Ok(response)
            }
            StatusCode::UNAUTHORIZED => Err(SyncError::NotAuthenticated),
            StatusCode::TOO_MANY_REQUESTS => Err(SyncError::RateLimited),
            StatusCode::NOT_FOUND => Err(SyncError::NotFound(path.to_string())),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(SyncError::invalid_response(format!(
                    "API error {}: {}",
                    status, body
                )))
            }
        }
    }

    /// Get the user's display name, required by user-scoped endpoints.
    pub async fn display_name(&self, token: &OAuth2Token) -> Result<String> {
        let profile = self
            .get_json(token, "/userprofile-service/socialProfile")
            .await?;
        profile
            .get("displayName")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| SyncError::invalid_response("Could not get display name"))
    }

    pub async fn daily_summary(
        &self,
        token: &OAuth2Token,
        display_name: &str,
        date: &str,
    ) -> Result<Value> {
        let path = format!(
            "/usersummary-service/usersummary/daily/{}?calendarDate={}",
            display_name, date
        );
        self.get_json(token, &path).await
    }

    pub async fn sleep(
        &self,
        token: &OAuth2Token,
        display_name: &str,
        date: &str,
    ) -> Result<Value> {
        let path = format!(
            "/wellness-service/wellness/dailySleepData/{}?date={}&nonSleepBufferMinutes=60",
            display_name, date
        );
        self.get_json(token, &path).await
    }

    pub async fn body_composition(&self, token: &OAuth2Token, date: &str) -> Result<Value> {
        let path = format!(
            "/weight-service/weight/daterangesnapshot?startDate={}&endDate={}",
            date, date
        );
        self.get_json(token, &path).await
    }

    pub async fn training_status(&self, token: &OAuth2Token, date: &str) -> Result<Value> {
        let path = format!("/metrics-service/metrics/trainingstatus/aggregated/{}", date);
        self.get_json(token, &path).await
    }

    pub async fn hrv(&self, token: &OAuth2Token, date: &str) -> Result<Value> {
        let path = format!("/hrv-service/hrv/{}", date);
        self.get_json(token, &path).await
    }

    pub async fn blood_pressure(&self, token: &OAuth2Token, date: &str) -> Result<Value> {
        let path = format!(
            "/bloodpressure-service/bloodpressure/range/{}/{}?includeAll=true",
            date, date
        );
        self.get_json(token, &path).await
    }

    pub async fn activities_for_date(&self, token: &OAuth2Token, date: &str) -> Result<Value> {
        let path = format!(
            "/activitylist-service/activities/search/activities?startDate={}&endDate={}&start=0&limit=50",
            date, date
        );
        self.get_json(token, &path).await
    }

    /// HR-zone breakdown for one activity, fetched per activity id.
    pub async fn activity_hr_zones(&self, token: &OAuth2Token, activity_id: i64) -> Result<Value> {
        let path = format!("/activity-service/activity/{}/hrTimeInZones", activity_id);
        self.get_json(token, &path).await
    }

    /// Step stats for a single day; used as fallback when the daily
    /// summary omits the step count.
    pub async fn steps_range(&self, token: &OAuth2Token, date: &str) -> Result<Value> {
        let path = format!("/usersummary-service/stats/steps/daily/{}/{}", date, date);
        self.get_json(token, &path).await
    }

    pub async fn lactate_threshold_latest(&self, token: &OAuth2Token) -> Result<Value> {
        self.get_json(token, "/biometric-service/biometric/latestLactateThreshold")
            .await
    }

    pub async fn lactate_threshold_range(
        &self,
        token: &OAuth2Token,
        start: &str,
        end: &str,
    ) -> Result<Value> {
        let path = format!(
            "/biometric-service/stats/lactateThreshold/range/{}/{}?aggregation=daily",
            start, end
        );
        self.get_json(token, &path).await
    }
}
