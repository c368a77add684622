use crate::schemas::UserId;
use actix_web::{http::header::HeaderValue, HttpRequest};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer};
use sha2::{Digest, Sha256};
use std::num::ParseIntError;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Header a service caller uses to say which user it acts for.
pub const ACTING_USER_HEADER: &str = "X-Acting-User";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub bot_token: String,
    /// Login payloads older than this many seconds are rejected.
    pub max_age_secs: Option<i64>,
}

/// A user as described by the Telegram login widget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TelegramUser {
    pub username: UserId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum AuthorizationLevel {
    Bot,
    Frontend(TelegramUser),
}

#[derive(Deserialize, Debug, Clone)]
struct TelegramAuthData {
    #[serde(deserialize_with = "string_or_number")]
    auth_date: String,
    first_name: Option<String>,
    last_name: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    photo_url: Option<String>,
    username: String,
    hash: String,
}

// The widget sends `id` and `auth_date` as JSON numbers
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}

pub fn check_authorization_level(
    request: &HttpRequest,
    config: &AuthConfig,
) -> Option<AuthorizationLevel> {
    let authorization = request
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .map(HeaderValue::to_str)?
        .ok()?;
    if is_bot_token(authorization, &config.bot_token) {
        return Some(AuthorizationLevel::Bot);
    }
    let auth_data: TelegramAuthData = serde_json::from_str(authorization).ok()?;
    let hash = auth_data
        .hash
        .chars()
        .collect::<Vec<_>>()
        .chunks(2)
        .map(|n| u8::from_str_radix(&String::from_iter(n), 16))
        .collect::<Result<Vec<u8>, ParseIntError>>()
        .ok()?;
    if !is_fresh(&auth_data.auth_date, config.max_age_secs) {
        debug!(username = %auth_data.username, "stale login payload");
        return None;
    }
    let mut mac = login_mac(&config.bot_token)?;
    mac.update(data_check_string(&auth_data).as_bytes());
    if mac.verify_slice(&hash).is_err() {
        debug!(username = %auth_data.username, "login payload hash mismatch");
        return None;
    }
    Some(AuthorizationLevel::Frontend(TelegramUser {
        username: auth_data.username,
        first_name: auth_data.first_name,
        last_name: auth_data.last_name,
        photo_url: auth_data.photo_url,
    }))
}

/// The user a request acts for: the logged-in user, or for the bot the user
/// named in [`ACTING_USER_HEADER`].
pub fn acting_user(request: &HttpRequest, level: &AuthorizationLevel) -> Option<UserId> {
    match level {
        AuthorizationLevel::Frontend(user) => Some(user.username.clone()),
        AuthorizationLevel::Bot => request
            .headers()
            .get(ACTING_USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string),
    }
}

fn is_fresh(auth_date: &str, max_age_secs: Option<i64>) -> bool {
    let Some(max_age) = max_age_secs else {
        return true;
    };
    match auth_date.parse::<i64>() {
        Ok(issued_at) => Utc::now().timestamp() - issued_at <= max_age,
        Err(_) => false,
    }
}

// Fields sorted alphabetically, one `key=value` per line, absent fields skipped
fn data_check_string(auth_data: &TelegramAuthData) -> String {
    [
        ("auth_date", Some(&auth_data.auth_date)),
        ("first_name", auth_data.first_name.as_ref()),
        ("id", Some(&auth_data.id)),
        ("last_name", auth_data.last_name.as_ref()),
        ("photo_url", auth_data.photo_url.as_ref()),
        ("username", Some(&auth_data.username)),
    ]
    .into_iter()
    .filter_map(|(key, val)| val.map(|val| format!("{}={}", key, val)))
    .collect::<Vec<_>>()
    .join("\n")
}

// Both sides go through the same MAC so the comparison runs in constant time
fn is_bot_token(authorization: &str, bot_token: &str) -> bool {
    let Some(mac) = login_mac(bot_token) else {
        return false;
    };
    let expected = mac.clone().chain_update(bot_token).finalize().into_bytes();
    mac.chain_update(authorization)
        .verify_slice(&expected)
        .is_ok()
}

fn login_mac(bot_token: &str) -> Option<HmacSha256> {
    let mut sha256_hasher = Sha256::new();
    sha256_hasher.update(bot_token.as_bytes());
    let bot_hash = sha256_hasher.finalize();
    HmacSha256::new_from_slice(&bot_hash).ok()
}

/// A login payload signed with `bot_token`, as the login widget would send it.
#[cfg(test)]
pub(crate) fn signed_login(bot_token: &str, username: &str, auth_date: i64) -> String {
    let unsigned = TelegramAuthData {
        auth_date: auth_date.to_string(),
        first_name: Some("Ada".to_string()),
        last_name: None,
        id: "42".to_string(),
        photo_url: None,
        username: username.to_string(),
        hash: String::new(),
    };
    let mut mac = login_mac(bot_token).unwrap();
    mac.update(data_check_string(&unsigned).as_bytes());
    let hash: String = mac
        .finalize()
        .into_bytes()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect();
    serde_json::json!({
        "auth_date": auth_date,
        "first_name": "Ada",
        "id": 42,
        "username": username,
        "hash": hash,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::header::AUTHORIZATION;
    use actix_web::test::TestRequest;

    const TOKEN: &str = "123456:test-bot-token";

    fn config(max_age_secs: Option<i64>) -> AuthConfig {
        AuthConfig {
            bot_token: TOKEN.to_string(),
            max_age_secs,
        }
    }

    #[test]
    fn bot_token_grants_bot_level() {
        let request = TestRequest::default()
            .insert_header((AUTHORIZATION, TOKEN))
            .to_http_request();
        assert_eq!(
            check_authorization_level(&request, &config(None)),
            Some(AuthorizationLevel::Bot)
        );
    }

    #[test]
    fn near_miss_tokens_are_not_the_bot() {
        for attempt in ["123456:test-bot-toke", "123456:test-bot-tokens", ""] {
            let request = TestRequest::default()
                .insert_header((AUTHORIZATION, attempt))
                .to_http_request();
            assert_eq!(check_authorization_level(&request, &config(None)), None);
        }
    }

    #[test]
    fn signed_login_identifies_the_user() {
        let login = signed_login(TOKEN, "ada", Utc::now().timestamp());
        let request = TestRequest::default()
            .insert_header((AUTHORIZATION, login))
            .to_http_request();
        let level = check_authorization_level(&request, &config(Some(3600))).unwrap();
        assert_eq!(acting_user(&request, &level), Some("ada".to_string()));
        match level {
            AuthorizationLevel::Frontend(user) => {
                assert_eq!(user.first_name.as_deref(), Some("Ada"));
                assert_eq!(user.last_name, None);
            }
            AuthorizationLevel::Bot => panic!("expected a frontend login"),
        }
    }

    #[test]
    fn tampered_login_is_rejected() {
        let forged =
            signed_login(TOKEN, "ada", Utc::now().timestamp()).replace("\"ada\"", "\"eve\"");
        let request = TestRequest::default()
            .insert_header((AUTHORIZATION, forged))
            .to_http_request();
        assert_eq!(check_authorization_level(&request, &config(None)), None);
    }

    #[test]
    fn stale_login_is_rejected_only_with_max_age() {
        let old = signed_login(TOKEN, "ada", Utc::now().timestamp() - 7200);
        let request = TestRequest::default()
            .insert_header((AUTHORIZATION, old))
            .to_http_request();
        assert_eq!(
            check_authorization_level(&request, &config(Some(3600))),
            None
        );
        assert!(check_authorization_level(&request, &config(None)).is_some());
    }

    #[test]
    fn numeric_and_string_fields_verify_alike() {
        let login = signed_login(TOKEN, "ada", Utc::now().timestamp());
        let mut payload: serde_json::Value = serde_json::from_str(&login).unwrap();
        assert!(payload["id"].is_number());
        assert!(payload["auth_date"].is_number());

        let auth_date = payload["auth_date"].to_string();
        payload["id"] = "42".into();
        payload["auth_date"] = auth_date.into();
        let request = TestRequest::default()
            .insert_header((AUTHORIZATION, payload.to_string()))
            .to_http_request();
        assert!(matches!(
            check_authorization_level(&request, &config(None)),
            Some(AuthorizationLevel::Frontend(_))
        ));
    }

    #[test]
    fn garbage_and_missing_headers_are_rejected() {
        let request = TestRequest::default()
            .insert_header((AUTHORIZATION, "not json"))
            .to_http_request();
        assert_eq!(check_authorization_level(&request, &config(None)), None);

        let request = TestRequest::default().to_http_request();
        assert_eq!(check_authorization_level(&request, &config(None)), None);
    }

    #[test]
    fn bot_acts_for_the_named_user() {
        let request = TestRequest::default()
            .insert_header((ACTING_USER_HEADER, "bob"))
            .to_http_request();
        assert_eq!(
            acting_user(&request, &AuthorizationLevel::Bot),
            Some("bob".to_string())
        );

        let request = TestRequest::default().to_http_request();
        assert_eq!(acting_user(&request, &AuthorizationLevel::Bot), None);
    }
}
