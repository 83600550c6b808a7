//! Configuration management
//!
//! 設定は以下の優先順位で読み込まれます:
//! 1. 環境変数
//! 2. gmail-analyzer.toml 設定ファイル
//! 3. デフォルト値
//!
//! 設定ファイル内では `${VAR_NAME}` 形式で環境変数を展開できます。

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Error, Result};

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "gmail-analyzer.toml";

/// Main configuration for gmail-analyzer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Record store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Gmail adapter configuration
    #[serde(default)]
    pub gmail: GmailConfig,

    /// Sync engine configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Analytics configuration
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Port for HTTP API server
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Allowed CORS origins (e.g., ["http://localhost:3000"])
    /// An empty list or "*" allows any origin
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Gmail REST adapter configuration
///
/// 認証情報は `client_id` / `client_secret` / `refresh_token` を直接指定するか、
/// `credentials_file` (JSON) から読み込みます。`access_token` が設定されている
/// 場合はトークン交換を行わずにそのまま使用します。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    /// Gmail API base URL
    #[serde(default = "default_gmail_base_url")]
    pub base_url: String,

    /// OAuth token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Mailbox owner (`me` for the authorized user)
    #[serde(default = "default_user_id")]
    pub user_id: String,

    pub client_id: Option<String>,

    #[serde(skip_serializing)]
    pub client_secret: Option<String>,

    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,

    #[serde(skip_serializing)]
    pub access_token: Option<String>,

    /// JSON file holding `client_id`, `client_secret` and `refresh_token`
    #[serde(default = "default_credentials_file")]
    pub credentials_file: String,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            base_url: default_gmail_base_url(),
            token_url: default_token_url(),
            user_id: default_user_id(),
            client_id: None,
            client_secret: None,
            refresh_token: None,
            access_token: None,
            credentials_file: default_credentials_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Message ids requested per listing call
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Staged records committed after this many insertions
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            flush_every: default_flush_every(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Number of senders/domains returned by `/api/analytics`
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
        }
    }
}

fn default_api_port() -> u16 {
    8000
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_db_path() -> String {
    "gmail_analyzer.db".to_string()
}

fn default_gmail_base_url() -> String {
    "https://gmail.googleapis.com/gmail/v1".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_user_id() -> String {
    "me".to_string()
}

fn default_credentials_file() -> String {
    "credentials.json".to_string()
}

fn default_page_size() -> u32 {
    500
}

fn default_flush_every() -> usize {
    100
}

fn default_top_n() -> usize {
    20
}

/// Gmail の messages.list が受け付ける最大件数
const MAX_PAGE_SIZE: u32 = 500;

impl Config {
    /// 設定ファイルから環境変数を展開する
    ///
    /// `${VAR_NAME}` 形式の文字列を環境変数の値に置換します。
    /// 環境変数が存在しない場合は空文字列になります。
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next(); // '{' を消費

                let mut var_name = String::new();
                while let Some(c) = chars.next_if(|&c| c != '}') {
                    var_name.push(c);
                }
                chars.next(); // '}' を消費

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// TOML 設定ファイルから設定を読み込む
    ///
    /// # 環境変数展開
    /// 設定ファイル内の `${VAR_NAME}` は環境変数の値に置換されます。
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let expanded_content = Self::expand_env_vars(&toml_content);

        let config: TomlConfig = toml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        let mut cfg = Self::from_toml_config(config);

        // 既存の環境変数で上書き（環境変数が優先）
        cfg.apply_env_overrides();
        cfg.validate()?;

        Ok(cfg)
    }

    /// デフォルトパスから設定を読み込む
    ///
    /// `./gmail-analyzer.toml` があればそれを使い、
    /// 見つからない場合はデフォルト値と環境変数のみを使います。
    pub fn load() -> Result<Self> {
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::from_toml_file(DEFAULT_CONFIG_FILE);
        }

        Self::from_env()
    }

    /// Load configuration from defaults and environment variables
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// TOML 構造から Config を構築
    fn from_toml_config(toml: TomlConfig) -> Self {
        let api = toml.api.unwrap_or_default();
        let store = toml.store.unwrap_or_default();
        let gmail = toml.gmail.unwrap_or_default();
        let sync = toml.sync.unwrap_or_default();
        let analytics = toml.analytics.unwrap_or_default();

        Config {
            api: ApiConfig {
                port: api.port.unwrap_or_else(default_api_port),
                allowed_origins: api.allowed_origins.unwrap_or_else(default_allowed_origins),
            },
            store: StoreConfig {
                db_path: store.db_path.unwrap_or_else(default_db_path),
            },
            gmail: GmailConfig {
                base_url: gmail.base_url.unwrap_or_else(default_gmail_base_url),
                token_url: gmail.token_url.unwrap_or_else(default_token_url),
                user_id: gmail.user_id.unwrap_or_else(default_user_id),
                client_id: non_empty(gmail.client_id),
                client_secret: non_empty(gmail.client_secret),
                refresh_token: non_empty(gmail.refresh_token),
                access_token: non_empty(gmail.access_token),
                credentials_file: gmail.credentials_file.unwrap_or_else(default_credentials_file),
            },
            sync: SyncConfig {
                page_size: sync.page_size.unwrap_or_else(default_page_size),
                flush_every: sync.flush_every.unwrap_or_else(default_flush_every),
            },
            analytics: AnalyticsConfig {
                top_n: analytics.top_n.unwrap_or_else(default_top_n),
            },
        }
    }

    /// 環境変数で設定を上書きする
    fn apply_env_overrides(&mut self) {
        // API 設定の上書き
        if let Ok(port) = std::env::var("API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.api.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Store 設定の上書き
        if let Ok(path) = std::env::var("DB_PATH") {
            if !path.is_empty() {
                self.store.db_path = path;
            }
        }

        // Gmail 設定の上書き (空文字列は無視)
        if let Some(url) = env_non_empty("GMAIL_API_BASE") {
            self.gmail.base_url = url;
        }
        if let Some(url) = env_non_empty("GMAIL_TOKEN_URL") {
            self.gmail.token_url = url;
        }
        if let Some(id) = env_non_empty("GMAIL_CLIENT_ID") {
            self.gmail.client_id = Some(id);
        }
        if let Some(secret) = env_non_empty("GMAIL_CLIENT_SECRET") {
            self.gmail.client_secret = Some(secret);
        }
        if let Some(token) = env_non_empty("GMAIL_REFRESH_TOKEN") {
            self.gmail.refresh_token = Some(token);
        }
        if let Some(token) = env_non_empty("GMAIL_ACCESS_TOKEN") {
            self.gmail.access_token = Some(token);
        }
        if let Some(path) = env_non_empty("GMAIL_CREDENTIALS_FILE") {
            self.gmail.credentials_file = path;
        }

        // Sync 設定の上書き
        if let Ok(size) = std::env::var("SYNC_PAGE_SIZE") {
            if let Ok(s) = size.parse() {
                self.sync.page_size = s;
            }
        }
        if let Ok(every) = std::env::var("SYNC_FLUSH_EVERY") {
            if let Ok(e) = every.parse() {
                self.sync.flush_every = e;
            }
        }
    }

    /// 値の範囲を検証する
    pub fn validate(&self) -> Result<()> {
        if self.sync.page_size == 0 || self.sync.page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "sync.page_size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.sync.page_size
            )));
        }
        if self.sync.flush_every == 0 {
            return Err(Error::Config("sync.flush_every must be at least 1".to_string()));
        }
        if self.analytics.top_n == 0 {
            return Err(Error::Config("analytics.top_n must be at least 1".to_string()));
        }
        Ok(())
    }

    /// CORS の制限が無効かどうか
    pub fn allows_any_origin(&self) -> bool {
        self.api.allowed_origins.is_empty()
            || self.api.allowed_origins.iter().any(|o| o == "*")
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn env_non_empty(key: &str) -> Option<String> {
    non_empty(std::env::var(key).ok())
}

// ============================================================================
// TOML 構造体定義（ファイル解析用）
// ============================================================================

/// TOML ファイル用のトップレベル構造
#[derive(Debug, Deserialize)]
struct TomlConfig {
    /// HTTP API 設定
    api: Option<TomlApiConfig>,
    /// ストア設定
    store: Option<TomlStoreConfig>,
    /// Gmail 設定
    gmail: Option<TomlGmailConfig>,
    /// 同期設定
    sync: Option<TomlSyncConfig>,
    /// 集計設定
    analytics: Option<TomlAnalyticsConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlApiConfig {
    /// ポート番号
    #[serde(default)]
    port: Option<u16>,
    /// 許可する CORS オリジン
    #[serde(default)]
    allowed_origins: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlStoreConfig {
    /// データベースパス
    #[serde(default)]
    db_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlGmailConfig {
    base_url: Option<String>,
    token_url: Option<String>,
    user_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
    access_token: Option<String>,
    /// 認証情報ファイルパス
    credentials_file: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlSyncConfig {
    page_size: Option<u32>,
    flush_every: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlAnalyticsConfig {
    top_n: Option<usize>,
}
