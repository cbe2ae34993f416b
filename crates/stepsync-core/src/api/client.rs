//! API client for the Huami/Zepp REST endpoints.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use md5::{Digest, Md5};
use rand::Rng;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::ProviderError;
use crate::auth::{Identity, IdentityKind, IdentityProvider, LoginGrant, StepSubmitter};
use crate::steps::beijing_now;

// ============================================================================
// Constants
// ============================================================================

/// Base URL for account and data endpoints
const API_BASE_URL: &str = "https://api-mifit-cn2.huami.com";

const APP_SOURCE: &str = "com.xiaomi.hm.health";
const APP_VERSION: &str = "6.0.0";
const DEVICE_MODEL: &str = "iPhone13,2";
const USER_AGENT: &str = "MiFit/4.6.0 (iPhone; iOS 14.7.1; Scale/3.00)";

/// Header carrying the app token on data endpoints
const APP_TOKEN_HEADER: &str = "apptoken";

/// Default HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Default, Deserialize)]
struct ZeppResponse {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_info: Option<TokenInfo>,
    #[serde(default)]
    error_msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenInfo {
    #[serde(default)]
    login_token: Option<String>,
    #[serde(default)]
    app_token: Option<String>,
    #[serde(default)]
    user_id: Option<Value>,
}

impl ZeppResponse {
    fn is_ok(&self) -> bool {
        match &self.code {
            Some(Value::Number(n)) => n.as_i64() == Some(0),
            Some(Value::String(s)) => s.trim() == "0",
            _ => false,
        }
    }

    fn error_text(&self, fallback: &str) -> String {
        self.error_msg
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Map a non-success body to an error, treating token complaints as expiry
    fn into_error(self, fallback: &str) -> ProviderError {
        let text = self.error_text(fallback);
        let code_is_401 = matches!(&self.code, Some(Value::Number(n)) if n.as_i64() == Some(401));
        if code_is_401 || text.to_ascii_lowercase().contains("token") {
            ProviderError::Unauthorized
        } else {
            ProviderError::Rejected(text)
        }
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Password digest expected by the login endpoint
fn password_digest(secret: &str) -> String {
    hex::encode(Md5::digest(secret.as_bytes()))
}

/// Form body for a band data upload
fn band_payload(user_id: &str, steps: u32) -> Vec<(&'static str, String)> {
    let mut rng = rand::thread_rng();
    let timestamp = Utc::now().timestamp_millis();
    let date = beijing_now().format("%Y-%m-%d").to_string();
    let data_json = serde_json::json!([{
        "data_hr": format!("{},1,{}", rng.gen_range(60..=100), timestamp),
        "data_id": timestamp,
        "data_source": 1,
        "date": date,
        "device_type": 1,
        "is_local": 0,
        "last_update_time": timestamp,
        "source_id": rng.gen_range(1_000_000..=9_999_999),
        "steps": steps,
        "timestamp": timestamp,
        "user_id": user_id,
    }]);

    vec![
        ("userid", user_id.to_string()),
        ("last_sync_data_time", timestamp.to_string()),
        ("device_type", "1".to_string()),
        ("data_json", data_json.to_string()),
    ]
}

/// Zepp API client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ZeppClient {
    client: Client,
    base_url: String,
}

impl ZeppClient {
    pub fn new(request_timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Point the client at another host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn common_params(device_id: &str) -> Vec<(&'static str, String)> {
        vec![
            ("country_code", "CN".to_string()),
            ("device_id", device_id.to_string()),
            ("device_model", DEVICE_MODEL.to_string()),
            ("app_version", APP_VERSION.to_string()),
            ("source", APP_SOURCE.to_string()),
            ("lang", "zh_CN".to_string()),
        ]
    }

    /// Send a request and parse the JSON body, mapping HTTP failures
    async fn send(&self, request: RequestBuilder) -> Result<ZeppResponse, ProviderError> {
        let response = request.send().await.map_err(ProviderError::from_transport)?;
        let status = response.status();
        let body = response.text().await.map_err(ProviderError::from_transport)?;

        if !status.is_success() {
            return Err(ProviderError::from_status(status, &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| ProviderError::InvalidResponse(format!("unparseable body: {}", e)))
    }
}

#[async_trait]
impl IdentityProvider for ZeppClient {
    async fn login(&self, identity: &Identity, secret: &str) -> Result<String, ProviderError> {
        let url = format!("{}/v2/user/login", self.base_url);
        let mut params = Self::common_params(&uuid::Uuid::new_v4().to_string());
        let third_name = match identity.kind() {
            IdentityKind::Email => "email",
            IdentityKind::Phone => "huami",
        };
        params.push(("third_name", third_name.to_string()));

        let form = [
            ("dn", identity.as_str().to_string()),
            ("password", password_digest(secret)),
            ("grant_type", "password".to_string()),
        ];

        let body = self
            .send(self.client.post(&url).query(&params).form(&form))
            .await?;

        match body.access_token.clone() {
            Some(token) if !token.is_empty() => {
                debug!("Access token issued");
                Ok(token)
            }
            _ => Err(ProviderError::Rejected(body.error_text("login failed"))),
        }
    }

    async fn escalate(
        &self,
        access_token: &str,
        device_id: &str,
        kind: IdentityKind,
    ) -> Result<LoginGrant, ProviderError> {
        let url = format!("{}/v2/user/login", self.base_url);
        let mut params = Self::common_params(device_id);
        let third_name = match kind {
            IdentityKind::Phone => "huami_phone",
            IdentityKind::Email => "huami_email",
        };
        params.push(("third_name", third_name.to_string()));
        params.push(("grant_type", "access_token".to_string()));
        params.push(("access_token", access_token.to_string()));

        let body = self.send(self.client.post(&url).query(&params)).await?;
        if !body.is_ok() {
            return Err(ProviderError::Rejected(body.error_text("token exchange failed")));
        }

        let info = body.token_info.unwrap_or_default();
        match (
            info.login_token,
            info.app_token,
            info.user_id.as_ref().and_then(value_to_string),
        ) {
            (Some(login_token), Some(app_token), Some(user_id)) => Ok(LoginGrant {
                login_token,
                app_token,
                user_id,
            }),
            _ => Err(ProviderError::InvalidResponse(
                "token_info is missing login_token, app_token or user_id".to_string(),
            )),
        }
    }

    async fn refresh_app_token(&self, login_token: &str) -> Result<String, ProviderError> {
        let url = format!("{}/v2/user/app_tokens", self.base_url);
        let mut params = Self::common_params(&uuid::Uuid::new_v4().to_string());
        params.push(("login_token", login_token.to_string()));

        let body = self.send(self.client.post(&url).query(&params)).await?;
        if !body.is_ok() {
            return Err(ProviderError::Rejected(body.error_text("app token refresh failed")));
        }
        body.token_info
            .and_then(|info| info.app_token)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("token_info has no app_token".to_string()))
    }

    async fn validate(&self, app_token: &str) -> Result<bool, ProviderError> {
        let url = format!("{}/v1/sport/run/history.json", self.base_url);
        let request = self.client.get(&url).header(APP_TOKEN_HEADER, app_token);

        match self.send(request).await {
            Ok(body) => Ok(body.data.is_some() || body.is_ok()),
            Err(ProviderError::Unauthorized) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl StepSubmitter for ZeppClient {
    async fn submit(
        &self,
        app_token: &str,
        user_id: &str,
        steps: u32,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/v1/data/band_data.json", self.base_url);
        let form = band_payload(user_id, steps);

        let body = self
            .send(
                self.client
                    .post(&url)
                    .header(APP_TOKEN_HEADER, app_token)
                    .form(&form),
            )
            .await?;

        if body.is_ok() || body.message.as_deref() == Some("success") {
            Ok(format!("submitted {} steps", steps))
        } else {
            Err(body.into_error("submission failed"))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_digest_is_md5_hex() {
        assert_eq!(password_digest("password"), "5f4dcc3b5aa765d61d8327deb882cf99");
    }

    #[test]
    fn test_response_code_parsing() {
        let ok: ZeppResponse = serde_json::from_str(r#"{"code":0}"#).unwrap();
        assert!(ok.is_ok());
        let ok_text: ZeppResponse = serde_json::from_str(r#"{"code":"0"}"#).unwrap();
        assert!(ok_text.is_ok());
        let failed: ZeppResponse = serde_json::from_str(r#"{"code":1,"error_msg":"nope"}"#).unwrap();
        assert!(!failed.is_ok());
        assert_eq!(failed.error_text("x"), "nope");
        let missing: ZeppResponse = serde_json::from_str("{}").unwrap();
        assert!(!missing.is_ok());
        assert_eq!(missing.error_text("fallback"), "fallback");
    }

    #[test]
    fn test_token_info_user_id_number_or_string() {
        let body: ZeppResponse = serde_json::from_str(
            r#"{"code":0,"token_info":{"login_token":"B","app_token":"C","user_id":1234567}}"#,
        )
        .unwrap();
        let info = body.token_info.unwrap();
        assert_eq!(info.user_id.as_ref().and_then(value_to_string).as_deref(), Some("1234567"));

        assert_eq!(value_to_string(&Value::String("u-1".into())).as_deref(), Some("u-1"));
        assert_eq!(value_to_string(&Value::String(String::new())), None);
        assert_eq!(value_to_string(&Value::Null), None);
    }

    #[test]
    fn test_token_complaints_map_to_unauthorized() {
        let body: ZeppResponse =
            serde_json::from_str(r#"{"code":"0101","message":"invalid token"}"#).unwrap();
        assert!(body.into_error("x").is_credential_expired());

        let body: ZeppResponse =
            serde_json::from_str(r#"{"code":401,"message":"denied"}"#).unwrap();
        assert!(body.into_error("x").is_credential_expired());

        let body: ZeppResponse =
            serde_json::from_str(r#"{"code":1,"message":"busy"}"#).unwrap();
        assert!(matches!(body.into_error("x"), ProviderError::Rejected(m) if m == "busy"));
    }

    #[test]
    fn test_band_payload_fields() {
        let form = band_payload("uid-1", 12345);
        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(get("userid"), "uid-1");
        assert_eq!(get("device_type"), "1");

        let data: Value = serde_json::from_str(&get("data_json")).unwrap();
        assert_eq!(data[0]["steps"], 12345);
        assert_eq!(data[0]["user_id"], "uid-1");
        assert_eq!(data[0]["timestamp"].as_i64().unwrap().to_string(), get("last_sync_data_time"));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = ZeppClient::new(Duration::from_secs(1))
            .unwrap()
            .with_base_url("http://localhost:9/");
        assert_eq!(client.base_url, "http://localhost:9");
    }
}
