use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity handle to cached record. Ordered so the saved file is stable.
pub type TokenMap = BTreeMap<String, CredentialRecord>;

/// Cached credential chain for one account.
///
/// The three tokens depend on each other: the access token produced the
/// login token, and the app token was issued or refreshed against the login
/// token. Every field is optional so partial or older records still parse;
/// a missing field means that tier is not cached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "millis")]
    pub access_token_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "millis")]
    pub login_token_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "millis")]
    pub app_token_time: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    /// Build a record for a freshly completed login, all tiers stamped `now`
    pub fn issued(
        device_id: String,
        user_id: String,
        access_token: String,
        login_token: String,
        app_token: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id: Some(device_id),
            user_id: Some(user_id),
            access_token: Some(access_token),
            access_token_time: Some(now),
            login_token: Some(login_token),
            login_token_time: Some(now),
            app_token: Some(app_token),
            app_token_time: Some(now),
        }
    }

    /// Replace the app token after a refresh against the login token
    pub fn set_app_token(&mut self, app_token: String, now: DateTime<Utc>) {
        self.app_token = Some(app_token);
        self.app_token_time = Some(now);
    }

    /// Return the device id, generating and storing one if absent
    pub fn ensure_device_id(&mut self) -> &str {
        self.device_id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .as_str()
    }

    /// True when all three tiers and the user id are present
    pub fn has_full_chain(&self) -> bool {
        self.access_token.is_some()
            && self.login_token.is_some()
            && self.app_token.is_some()
            && self.user_id.is_some()
    }
}

/// Epoch-millisecond timestamps. Older files stored them as numeric strings.
mod millis {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_i64(ts.timestamp_millis()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<Raw> = Option::deserialize(deserializer)?;
        let millis = match raw {
            None => return Ok(None),
            Some(Raw::Int(ms)) => ms,
            Some(Raw::Float(ms)) => ms as i64,
            Some(Raw::Text(text)) => text
                .trim()
                .parse::<f64>()
                .map_err(|_| de::Error::custom(format!("invalid timestamp: {text}")))?
                as i64,
        };
        DateTime::from_timestamp_millis(millis)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {millis}")))
    }
}
