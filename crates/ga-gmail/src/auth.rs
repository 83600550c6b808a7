//! OAuth credentials for the Gmail API
//!
//! 同期ごとにリフレッシュトークンからアクセストークンを取得します。
//! トークンはキャッシュせず、同期の終了とともに破棄されます。

use std::path::Path;

use ga_core::GmailConfig;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{GmailError, Result};
use crate::models::{TokenError, TokenResponse};

/// OAuth client credentials plus a long-lived refresh token
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("refresh_token", &"***")
            .finish()
    }
}

/// How a sync session obtains its bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// Pre-issued access token, used as is
    Bearer(String),
    /// Exchanged at the token endpoint for every session
    RefreshToken(Credentials),
}

impl Authorization {
    /// Resolve credentials from configuration.
    ///
    /// A configured `access_token` wins. Otherwise client id, secret and
    /// refresh token are taken from the configuration, with gaps filled from
    /// `credentials_file` when it exists.
    pub fn from_config(config: &GmailConfig) -> Result<Self> {
        if let Some(token) = &config.access_token {
            debug!("Using configured Gmail access token");
            return Ok(Self::Bearer(token.clone()));
        }

        let mut client_id = config.client_id.clone();
        let mut client_secret = config.client_secret.clone();
        let mut refresh_token = config.refresh_token.clone();

        let incomplete = client_id.is_none() || client_secret.is_none() || refresh_token.is_none();
        if incomplete && Path::new(&config.credentials_file).exists() {
            let file = CredentialsFile::load(&config.credentials_file)?;
            let secrets = file.installed.or(file.web).unwrap_or_default();

            client_id = client_id.or(file.client_id).or(secrets.client_id);
            client_secret = client_secret.or(file.client_secret).or(secrets.client_secret);
            refresh_token = refresh_token.or(file.refresh_token);
        }

        match (client_id, client_secret, refresh_token) {
            (Some(client_id), Some(client_secret), Some(refresh_token)) => {
                Ok(Self::RefreshToken(Credentials {
                    client_id,
                    client_secret,
                    refresh_token,
                }))
            }
            _ => Err(GmailError::Config(format!(
                "Gmail credentials are incomplete: set client_id, client_secret and refresh_token \
                 or provide them in {}",
                config.credentials_file
            ))),
        }
    }

    /// Bearer token for one session
    pub async fn access_token(&self, http: &Client, token_url: &str) -> Result<String> {
        match self {
            Self::Bearer(token) => Ok(token.clone()),
            Self::RefreshToken(credentials) => {
                exchange_refresh_token(http, token_url, credentials).await
            }
        }
    }
}

/// Exchange a refresh token for an access token
pub async fn exchange_refresh_token(
    http: &Client,
    token_url: &str,
    credentials: &Credentials,
) -> Result<String> {
    debug!("Requesting Gmail access token from {}", token_url);

    let response = http
        .post(token_url)
        .form(&[
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("refresh_token", credentials.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let detail = match serde_json::from_str::<TokenError>(&body) {
            Ok(err) => match err.error_description {
                Some(desc) => format!("{}: {}", err.error, desc),
                None => err.error,
            },
            Err(_) => body,
        };
        return Err(GmailError::Auth(format!(
            "token request failed ({}): {}",
            status.as_u16(),
            detail
        )));
    }

    let token: TokenResponse = serde_json::from_str(&body)?;
    if token.access_token.is_empty() {
        return Err(GmailError::Auth("token response has no access_token".to_string()));
    }

    info!("Obtained Gmail access token (expires in {}s)", token.expires_in);
    Ok(token.access_token)
}

/// Credentials JSON file.
///
/// Accepts flat `{client_id, client_secret, refresh_token}` as well as the
/// Google client secrets layout nested under `installed` or `web`.
#[derive(Debug, Default, Deserialize)]
struct CredentialsFile {
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

#[derive(Debug, Default, Deserialize)]
struct ClientSecrets {
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl CredentialsFile {
    fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GmailError::Config(format!("Failed to read credentials file {}: {}", path, e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            GmailError::Config(format!("Failed to parse credentials file {}: {}", path, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_without_file() -> GmailConfig {
        GmailConfig {
            credentials_file: "/nonexistent/ga-gmail/credentials.json".to_string(),
            ..GmailConfig::default()
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: "refresh".to_string(),
        }
    }

    #[test]
    fn test_access_token_takes_precedence() {
        let config = GmailConfig {
            access_token: Some("ya29.token".to_string()),
            client_id: Some("cid".to_string()),
            ..config_without_file()
        };
        assert_eq!(
            Authorization::from_config(&config).unwrap(),
            Authorization::Bearer("ya29.token".to_string())
        );
    }

    #[test]
    fn test_credentials_from_config() {
        let config = GmailConfig {
            client_id: Some("cid".to_string()),
            client_secret: Some("secret".to_string()),
            refresh_token: Some("refresh".to_string()),
            ..config_without_file()
        };
        assert_eq!(
            Authorization::from_config(&config).unwrap(),
            Authorization::RefreshToken(credentials())
        );
    }

    #[test]
    fn test_credentials_from_flat_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"client_id": "cid", "client_secret": "secret", "refresh_token": "refresh"}}"#
        )
        .unwrap();

        let config = GmailConfig {
            credentials_file: file.path().to_string_lossy().into_owned(),
            ..GmailConfig::default()
        };
        assert_eq!(
            Authorization::from_config(&config).unwrap(),
            Authorization::RefreshToken(credentials())
        );
    }

    #[test]
    fn test_installed_client_secrets_with_configured_refresh_token() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"installed": {{"client_id": "cid", "client_secret": "secret", "redirect_uris": ["http://localhost"]}}}}"#
        )
        .unwrap();

        let config = GmailConfig {
            refresh_token: Some("refresh".to_string()),
            credentials_file: file.path().to_string_lossy().into_owned(),
            ..GmailConfig::default()
        };
        assert_eq!(
            Authorization::from_config(&config).unwrap(),
            Authorization::RefreshToken(credentials())
        );
    }

    #[test]
    fn test_missing_credentials_is_config_error() {
        let err = Authorization::from_config(&config_without_file()).unwrap_err();
        assert!(matches!(err, GmailError::Config(_)));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let printed = format!("{:?}", credentials());
        assert!(printed.contains("cid"));
        assert!(!printed.contains("refresh\""));
        assert!(!printed.contains("secret\""));
    }

    #[tokio::test]
    async fn test_exchange_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.fresh",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = Authorization::RefreshToken(credentials())
            .access_token(&Client::new(), &format!("{}/token", server.uri()))
            .await
            .unwrap();
        assert_eq!(token, "ya29.fresh");
    }

    #[tokio::test]
    async fn test_exchange_rejected_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let err = exchange_refresh_token(&Client::new(), &format!("{}/token", server.uri()), &credentials())
            .await
            .unwrap_err();
        match err {
            GmailError::Auth(msg) => {
                assert!(msg.contains("400"));
                assert!(msg.contains("invalid_grant"));
            }
            other => panic!("expected auth error, got {:?}", other),
        }
    }
}
