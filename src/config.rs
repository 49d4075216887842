use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, ScanError};

/// Tenant used when `TENANT_ID` is not set; "organizations" accepts any
/// work/school account for a public client.
pub const DEFAULT_TENANT_ID: &str = "organizations";

/// Default public client id (the Microsoft Graph command-line tools client,
/// which permits the device-code flow with delegated Mail.Read).
pub const DEFAULT_CLIENT_ID: &str = "14d82eec-204b-4c2f-b7e8-296a70dab67e";

/// Default mailbox sentinel: the authenticated user's own mailbox.
pub const DEFAULT_MAILBOX: &str = "me";

/// Delegated permission scope required for the scan.
pub const GRAPH_SCOPE: &str = "Mail.Read";

const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
const AUTHORITY_BASE_URL: &str = "https://login.microsoftonline.com";

const CACHE_FILE_NAME: &str = ".bec-scan-tokens.json";
const OUTPUT_FILE_NAME: &str = "hits.csv";

const DEFAULT_DAYS_BACK: u32 = 5;
const DEFAULT_MAX_SCAN: usize = 100;
const DEFAULT_MAX_RESULTS: usize = 100;
const DEFAULT_PAGE_SIZE: u32 = 50;

/// Runtime configuration, constructed once at startup and passed down.
#[derive(Debug, Clone)]
pub struct Config {
    pub tenant_id: String,
    pub client_id: String,
    /// Target mailbox address, or the literal "me" for the signed-in user.
    pub mailbox: String,
    pub scope: String,
    /// Lookback window in days.
    pub days_back: u32,
    /// Cap on messages scanned.
    pub max_scan: usize,
    /// Cap on matches collected.
    pub max_results: usize,
    pub page_size: u32,
    /// Token cache file; content is opaque outside the auth module.
    pub cache_path: PathBuf,
    pub output_path: PathBuf,
    pub graph_base_url: String,
    pub authority_base_url: String,
}

impl Config {
    /// Build configuration from the environment, falling back to the
    /// documented defaults. A variable that is present but unparsable is a
    /// hard error rather than a silent fallback.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            tenant_id: env_string("TENANT_ID", DEFAULT_TENANT_ID),
            client_id: env_string("CLIENT_ID", DEFAULT_CLIENT_ID),
            mailbox: env_string("MAILBOX", DEFAULT_MAILBOX),
            scope: GRAPH_SCOPE.to_string(),
            days_back: env_parsed("DAYS_BACK", DEFAULT_DAYS_BACK)?,
            max_scan: env_parsed("MAX_SCAN", DEFAULT_MAX_SCAN)?,
            max_results: env_parsed("MAX_RESULTS", DEFAULT_MAX_RESULTS)?,
            page_size: DEFAULT_PAGE_SIZE,
            cache_path: default_cache_path(),
            output_path: PathBuf::from(OUTPUT_FILE_NAME),
            graph_base_url: GRAPH_BASE_URL.to_string(),
            authority_base_url: AUTHORITY_BASE_URL.to_string(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.days_back == 0 {
            return Err(ScanError::Config(
                "DAYS_BACK must be at least 1".to_string(),
            ));
        }
        if self.max_scan == 0 {
            return Err(ScanError::Config("MAX_SCAN must be at least 1".to_string()));
        }
        if self.max_results == 0 {
            return Err(ScanError::Config(
                "MAX_RESULTS must be at least 1".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(ScanError::Config("page size must be at least 1".to_string()));
        }
        if self.mailbox.trim().is_empty() {
            return Err(ScanError::Config("mailbox cannot be empty".to_string()));
        }
        if self.client_id.trim().is_empty() {
            return Err(ScanError::Config("client id cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Message-listing endpoint: the signed-in user's mailbox for the "me"
    /// sentinel, otherwise the named (shared/impersonated) mailbox.
    pub fn messages_url(&self) -> String {
        if self.mailbox.trim().eq_ignore_ascii_case("me") {
            format!("{}/me/messages", self.graph_base_url)
        } else {
            format!("{}/users/{}/messages", self.graph_base_url, self.mailbox)
        }
    }

    pub fn device_code_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/devicecode",
            self.authority_base_url, self.tenant_id
        )
    }

    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_base_url, self.tenant_id
        )
    }
}

fn default_cache_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CACHE_FILE_NAME)
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parsed<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ScanError::Config(format!("invalid {}='{}': {}", name, raw, e))),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(e) => Err(ScanError::Config(format!("{}: {}", name, e))),
    }
}
