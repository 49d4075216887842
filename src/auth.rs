//! Device-code sign-in against the Microsoft identity platform.
//!
//! Tokens are cached in a JSON file in the user's home directory so repeat
//! runs are silent. A valid cached access token is used as-is; an expired
//! one is refreshed with the cached refresh token; only when both fail does
//! the interactive device-code prompt appear.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Result, ScanError};

/// Treat tokens expiring within this window as already expired.
const EXPIRY_SKEW_SECONDS: i64 = 60;

/// Polling interval to use when the authorization response omits one.
const fn default_interval() -> u64 {
    5
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenCache {
    access_token: Option<String>,
    refresh_token: Option<String>,
    /// Unix timestamp after which `access_token` is no longer usable.
    expires_at: Option<i64>,
}

impl TokenCache {
    /// Load the cache, tolerating a missing or corrupt file. The cache is an
    /// optimization, so any read problem just means signing in again.
    fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("ignoring unreadable token cache: {}", e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    fn save(&self, path: &Path) {
        let result = serde_json::to_string_pretty(self)
            .map_err(ScanError::from)
            .and_then(|json| {
                fs::write(path, json)?;
                secure_token_file(path)
            });
        if let Err(e) = result {
            tracing::warn!("could not persist token cache: {}", e);
        }
    }

    fn valid_access_token(&self) -> Option<&str> {
        let expires_at = self.expires_at?;
        if chrono::Utc::now().timestamp() + EXPIRY_SKEW_SECONDS >= expires_at {
            return None;
        }
        self.access_token.as_deref()
    }

    fn store(&mut self, response: TokenResponse) -> String {
        self.expires_at = Some(chrono::Utc::now().timestamp() + response.expires_in as i64);
        if response.refresh_token.is_some() {
            self.refresh_token = response.refresh_token;
        }
        self.access_token = Some(response.access_token.clone());
        response.access_token
    }
}

#[cfg(unix)]
fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}

/// Response to a device-authorization request (RFC 8628 section 3.2).
#[derive(Debug, Deserialize)]
struct DeviceAuthorization {
    device_code: String,
    user_code: String,
    verification_uri: String,
    /// Lifetime of the device code in seconds.
    expires_in: u64,
    #[serde(default = "default_interval")]
    interval: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Obtains access tokens for the configured client, caching across runs.
pub struct TokenProvider<'a> {
    config: &'a Config,
    http: &'a reqwest::blocking::Client,
}

impl<'a> TokenProvider<'a> {
    pub fn new(config: &'a Config, http: &'a reqwest::blocking::Client) -> Self {
        Self { config, http }
    }

    /// Return a usable access token, signing the user in interactively only
    /// when the cache holds nothing redeemable.
    pub fn get_token(&self) -> Result<String> {
        let mut cache = TokenCache::load(&self.config.cache_path);

        if let Some(token) = cache.valid_access_token() {
            tracing::debug!("using cached access token");
            return Ok(token.to_string());
        }

        if let Some(refresh_token) = cache.refresh_token.clone() {
            match self.redeem_refresh_token(&refresh_token) {
                Ok(response) => {
                    tracing::debug!("refreshed access token");
                    let token = cache.store(response);
                    cache.save(&self.config.cache_path);
                    return Ok(token);
                }
                Err(e) => {
                    tracing::warn!("token refresh failed, falling back to sign-in: {}", e);
                }
            }
        }

        let response = self.device_code_sign_in()?;
        let token = cache.store(response);
        cache.save(&self.config.cache_path);
        Ok(token)
    }

    fn redeem_refresh_token(&self, refresh_token: &str) -> Result<TokenResponse> {
        let response = self
            .http
            .post(self.config.token_url())
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("scope", self.config.scope.as_str()),
            ])
            .send()?;

        if !response.status().is_success() {
            return Err(ScanError::Auth(format!(
                "refresh grant rejected (HTTP {})",
                response.status().as_u16()
            )));
        }
        Ok(response.json()?)
    }

    fn device_code_sign_in(&self) -> Result<TokenResponse> {
        let authorization = self.request_device_authorization()?;
        println!(
            "[ACTION] Open {} and enter code: {}",
            authorization.verification_uri, authorization.user_code
        );
        self.poll_for_token(authorization)
    }

    fn request_device_authorization(&self) -> Result<DeviceAuthorization> {
        let response = self
            .http
            .post(self.config.device_code_url())
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("scope", self.config.scope.as_str()),
            ])
            .send()?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(ScanError::Auth(format!(
                "device authorization request failed (HTTP {}): {}",
                status,
                crate::error::redact_body(&body)
            )));
        }

        response
            .json()
            .map_err(|e| ScanError::Auth(format!("malformed device authorization response: {}", e)))
    }

    fn poll_for_token(&self, authorization: DeviceAuthorization) -> Result<TokenResponse> {
        let deadline = Instant::now() + Duration::from_secs(authorization.expires_in);
        let mut interval = authorization.interval.max(1);

        loop {
            thread::sleep(Duration::from_secs(interval));
            if Instant::now() >= deadline {
                return Err(ScanError::Auth("device code expired before sign-in completed".to_string()));
            }

            let response = self
                .http
                .post(self.config.token_url())
                .form(&[
                    ("client_id", self.config.client_id.as_str()),
                    ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
                    ("device_code", authorization.device_code.as_str()),
                ])
                .send()?;

            if response.status().is_success() {
                return response
                    .json()
                    .map_err(|e| ScanError::Auth(format!("malformed token response: {}", e)));
            }

            let body = response.text().unwrap_or_default();
            let error: TokenErrorResponse = serde_json::from_str(&body)
                .map_err(|_| ScanError::Auth(format!(
                    "unexpected token endpoint response: {}",
                    crate::error::redact_body(&body)
                )))?;

            match error.error.as_str() {
                // User has not finished signing in yet; keep waiting.
                "authorization_pending" => continue,
                // Server asks us to back off (RFC 8628 section 3.5).
                "slow_down" => interval += 5,
                _ => {
                    return Err(ScanError::Auth(format!(
                        "sign-in failed ({}): {}",
                        error.error, error.error_description
                    )));
                }
            }
        }
    }
}
