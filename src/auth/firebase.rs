//! Firebase email/password sign-in and ID token refresh

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::{AuthConfig, CredentialProvider, TokenStore};
use crate::api::client::build_http;
use crate::config::Config;

fn string_or_u64<'de, D: de::Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = u64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("u64 or stringified u64")
        }
        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<u64, E> {
            Ok(v)
        }
        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<u64, E> {
            v.parse().map_err(E::custom)
        }
    }
    d.deserialize_any(Visitor)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    pub id_token: String,
    pub refresh_token: String,
    #[serde(deserialize_with = "string_or_u64")]
    pub expires_in: u64,
    pub local_id: String,
    pub email: Option<String>,
}

/// The token endpoint answers in snake_case, unlike sign-in.
#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    pub id_token: String,
    pub refresh_token: String,
    #[serde(deserialize_with = "string_or_u64")]
    pub expires_in: u64,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Pull `error.message` (e.g. `INVALID_PASSWORD`) out of an error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

async fn check_response(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!(
            "{} failed (HTTP {}): {}",
            what,
            status.as_u16(),
            error_message(&body)
        );
    }
    Ok(resp)
}

fn api_key(config: &Config) -> Result<String> {
    config.firebase_api_key.clone().with_context(|| {
        format!(
            "No Firebase API key. Pass --api-key to login or set firebase_api_key in {}",
            Config::config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "the config file".into())
        )
    })
}

/// Exchange email and password for an ID token.
pub async fn sign_in(
    http: &reqwest::Client,
    auth: &AuthConfig,
    api_key: &str,
    email: &str,
    password: &str,
) -> Result<SignInResponse> {
    tracing::debug!("Signing in {} at {}", email, auth.sign_in_url);

    let body = serde_json::json!({
        "email": email,
        "password": password,
        "returnSecureToken": true
    });
    let resp = http
        .post(auth.sign_in_url)
        .query(&[("key", api_key)])
        .json(&body)
        .send()
        .await
        .context("Failed to call sign-in endpoint")?;

    check_response(resp, "Sign-in")
        .await?
        .json()
        .await
        .context("Failed to parse sign-in response")
}

/// Exchange a refresh token for a new ID token.
pub async fn exchange_refresh_token(
    http: &reqwest::Client,
    auth: &AuthConfig,
    api_key: &str,
    refresh_token: &str,
) -> Result<RefreshResponse> {
    tracing::debug!("Refreshing ID token at {}", auth.refresh_url);

    let resp = http
        .post(auth.refresh_url)
        .query(&[("key", api_key)])
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .send()
        .await
        .context("Failed to call token endpoint")?;

    check_response(resp, "Token refresh")
        .await?
        .json()
        .await
        .context("Failed to parse token response")
}

/// Refresh the stored ID token. Returns the new token, or `None` when no
/// refresh token is stored.
pub async fn refresh(http: &reqwest::Client) -> Result<Option<String>> {
    let mut config = Config::load()?;
    let refresh_token = match config.get_refresh_token() {
        Some(rt) => rt,
        None => return Ok(None),
    };
    let key = api_key(&config)?;

    tracing::info!("Refreshing ID token...");
    let resp = exchange_refresh_token(http, &AuthConfig::default(), &key, &refresh_token).await?;

    config.set_id_token(resp.id_token.clone(), Some(resp.expires_in));
    config.set_refresh_token(resp.refresh_token);
    config.user_id = Some(resp.user_id);
    config.save()?;

    tracing::info!("ID token refreshed");
    Ok(Some(resp.id_token))
}

/// Stdin is read as-is, so the prompt says the input is visible.
const PASSWORD_PROMPT: &str = "Password (shown as typed; set UMIT_PASSWORD to skip): ";

async fn prompt_password() -> Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(PASSWORD_PROMPT.as_bytes()).await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read password")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Sign in with email and password and store the tokens.
pub async fn login(email: &str, password: Option<String>, api_key_arg: Option<String>) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(key) = api_key_arg {
        config.firebase_api_key = Some(key);
    }
    let key = api_key(&config)?;

    let password = match password {
        Some(p) => p,
        None => prompt_password().await?,
    };
    if password.is_empty() {
        bail!("Password must not be empty");
    }

    let http = build_http(&config)?;
    tracing::info!("Signing in as {}...", email);
    let resp = sign_in(&http, &AuthConfig::default(), &key, email, &password).await?;

    config.set_id_token(resp.id_token, Some(resp.expires_in));
    config.set_refresh_token(resp.refresh_token);
    config.user_id = Some(resp.local_id.clone());
    config.email = Some(resp.email.unwrap_or_else(|| email.to_string()));
    config.save()?;

    println!("Logged in as {} (uid {}).", email, resp.local_id);
    Ok(())
}

/// Clear stored credentials
pub async fn logout() -> Result<()> {
    let mut config = Config::load()?;
    config.clear_tokens();
    config.save()?;
    println!("Logged out.");
    Ok(())
}

/// Print authentication state
pub async fn status() -> Result<()> {
    let config = Config::load()?;

    println!("Backend:     {}", config.backend_url);
    println!("Socket:      {}", config.socket_url);
    println!(
        "API key:     {}",
        if config.firebase_api_key.is_some() {
            "present"
        } else {
            "none"
        }
    );
    println!(
        "User:        {} ({})",
        config.email.as_deref().unwrap_or("(none)"),
        config.user_id.as_deref().unwrap_or("no uid")
    );

    match config.get_id_token() {
        Some(token) if !token.is_expired() => {
            println!("ID token:    valid");
            if let Some(exp) = token.expires_at {
                println!("  expires_at: {}", exp);
            }
        }
        Some(_) => {
            println!("ID token:    expired");
        }
        None => {
            println!("ID token:    none");
        }
    }

    match config.get_refresh_token() {
        Some(_) => println!("Refresh tok: present"),
        None => println!("Refresh tok: none"),
    }

    if config.get_refresh_token().is_none() {
        println!("\nRun 'umit-chat login' to authenticate.");
    }

    Ok(())
}

/// Supplies stream credentials from the stored Firebase session.
///
/// Every call forces a refresh so the handshake never carries a stale
/// token; a cached token that is still valid is used if refresh fails.
pub struct FirebaseCredentials {
    http: reqwest::Client,
}

impl FirebaseCredentials {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: build_http(config)?,
        })
    }
}

#[async_trait]
impl CredentialProvider for FirebaseCredentials {
    async fn fresh_credential(&self) -> Result<String> {
        match refresh(&self.http).await {
            Ok(Some(token)) => return Ok(token),
            Ok(None) => tracing::debug!("No refresh token stored"),
            Err(e) => tracing::warn!("ID token refresh failed: {:#}", e),
        }

        let config = Config::load()?;
        match config.get_id_token() {
            Some(token) if !token.is_expired() => Ok(token.token),
            Some(_) => bail!("ID token expired. Run 'umit-chat login'."),
            None => bail!("No ID token. Run 'umit-chat login' first."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_response_string_expiry() {
        let json = r#"{
            "kind": "identitytoolkit#VerifyPasswordResponse",
            "localId": "uid-123",
            "email": "patient@example.com",
            "displayName": "",
            "idToken": "eyJ.id",
            "registered": true,
            "refreshToken": "AMf-refresh",
            "expiresIn": "3600"
        }"#;
        let resp: SignInResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.local_id, "uid-123");
        assert_eq!(resp.expires_in, 3600);
        assert_eq!(resp.refresh_token, "AMf-refresh");
    }

    #[test]
    fn test_refresh_response_snake_case() {
        let json = r#"{
            "expires_in": "3600",
            "token_type": "Bearer",
            "refresh_token": "AMf-next",
            "id_token": "eyJ.next",
            "user_id": "uid-123",
            "project_id": "4242"
        }"#;
        let resp: RefreshResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.id_token, "eyJ.next");
        assert_eq!(resp.user_id, "uid-123");
        assert_eq!(resp.expires_in, 3600);
    }

    #[test]
    fn test_error_message_extraction() {
        let body = r#"{"error":{"code":400,"message":"INVALID_PASSWORD","errors":[]}}"#;
        assert_eq!(error_message(body), "INVALID_PASSWORD");
        assert_eq!(error_message(" upstream timeout \n"), "upstream timeout");
    }

    #[test]
    fn test_password_prompt_warns_about_echo() {
        assert!(PASSWORD_PROMPT.contains("shown as typed"));
        assert!(PASSWORD_PROMPT.contains("UMIT_PASSWORD"));
    }
}
