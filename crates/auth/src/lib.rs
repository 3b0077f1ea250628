use anyhow::{anyhow, Context, Result};
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

const USER_AGENT: &str = "prbot-github-app";
const ACCEPT: &str = "application/vnd.github+json";

/// Installation tokens this close to expiry are refreshed before use.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Installation {
    pub id: u64,
    pub account: Account,
    #[serde(default)]
    pub app_id: Option<u64>,
    #[serde(default)]
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub login: String,
    #[serde(rename = "type")]
    pub account_type: String,
}

#[derive(Clone, Deserialize)]
struct AccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now > Duration::seconds(REFRESH_MARGIN_SECS)
    }
}

/// Signs app-level requests with a JWT minted from the App's private key.
#[derive(Clone)]
pub struct AppAuthenticator {
    app_id: u64,
    key: EncodingKey,
    api_base: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for AppAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppAuthenticator")
            .field("app_id", &self.app_id)
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl AppAuthenticator {
    /// Loads the App's private key from `cert_path`. The file may hold the PEM
    /// itself or a base64 encoding of it.
    pub fn from_key_file(app_id: u64, cert_path: &Path, api_base: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(cert_path)
            .with_context(|| format!("Failed to read private key {}", cert_path.display()))?;
        let pem = decode_private_key(&raw)?;
        Self::from_pem(app_id, pem.as_bytes(), api_base)
    }

    pub fn from_pem(app_id: u64, pem: &[u8], api_base: &str) -> Result<Self> {
        let key = EncodingKey::from_rsa_pem(pem)
            .map_err(|e| anyhow!("Failed to parse private key: {}", e))?;

        Ok(Self {
            app_id,
            key,
            api_base: api_base.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        })
    }

    pub fn app_id(&self) -> u64 {
        self.app_id
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn generate_jwt(&self) -> Result<String> {
        let now = Utc::now();
        // Backdated to tolerate clock drift against GitHub; GitHub caps the
        // lifetime at ten minutes.
        let claims = Claims {
            iss: self.app_id.to_string(),
            iat: (now - Duration::seconds(60)).timestamp(),
            exp: (now + Duration::minutes(9)).timestamp(),
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| anyhow!("Failed to encode JWT: {}", e))
    }

    pub async fn find_organization_installation(&self, org: &str) -> Result<Installation> {
        let jwt = self.generate_jwt()?;
        let url = format!("{}/orgs/{}/installation", self.api_base, org);

        let response = self
            .http
            .get(&url)
            .bearer_auth(jwt)
            .header("Accept", ACCEPT)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(anyhow!(
                "GitHub App {} is not installed on organization {}",
                self.app_id,
                org
            ));
        }
        if !response.status().is_success() {
            return Err(anyhow!(
                "Failed to find installation for organization {}: {}",
                org,
                response.status()
            ));
        }

        Ok(response.json().await?)
    }

    async fn create_installation_token(&self, installation_id: u64) -> Result<AccessToken> {
        let jwt = self.generate_jwt()?;
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_base, installation_id
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(jwt)
            .header("Accept", ACCEPT)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Failed to get installation token: {}",
                response.status()
            ));
        }

        Ok(response.json().await?)
    }

    /// Wraps this authenticator into a credential scoped to one installation.
    pub fn installation_credential(self, installation_id: u64) -> InstallationCredential {
        InstallationCredential {
            app: self,
            installation_id,
            cached: Arc::new(Mutex::new(None)),
        }
    }
}

fn decode_private_key(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with("-----BEGIN") {
        return Ok(trimmed.to_string());
    }

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(trimmed)
        .context("Private key is neither PEM nor base64")?;
    Ok(String::from_utf8(decoded)?)
}

/// Installation access token that mints itself on first use and refreshes on
/// expiry. Clones share the same cached token.
#[derive(Debug, Clone)]
pub struct InstallationCredential {
    app: AppAuthenticator,
    installation_id: u64,
    cached: Arc<Mutex<Option<AccessToken>>>,
}

impl InstallationCredential {
    pub fn installation_id(&self) -> u64 {
        self.installation_id
    }

    pub async fn token(&self) -> Result<String> {
        // Held across the refresh so concurrent callers wait for one exchange.
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.token.clone());
            }
        }

        tracing::debug!(
            installation_id = self.installation_id,
            "Requesting installation access token"
        );
        let fresh = self
            .app
            .create_installation_token(self.installation_id)
            .await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);

        Ok(token)
    }
}

/// Everything request handling needs to act as the App's installation.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub installation: Installation,
    pub credential: InstallationCredential,
}

impl AuthContext {
    /// Runs the startup handshake: load the signing key, find the org's
    /// installation and derive the installation credential.
    pub async fn bootstrap(app_id: u64, cert_path: &Path, org: &str, api_base: &str) -> Result<Self> {
        let app = AppAuthenticator::from_key_file(app_id, cert_path, api_base)
            .context("Error creating GitHub App client")?;

        let installation = app
            .find_organization_installation(org)
            .await
            .context("Error finding organization installation")?;

        let credential = app.installation_credential(installation.id);

        Ok(Self {
            installation,
            credential,
        })
    }

    pub fn installation_id(&self) -> u64 {
        self.installation.id
    }

    pub fn api_base(&self) -> &str {
        self.credential.app.api_base()
    }

    pub async fn installation_token(&self) -> Result<String> {
        self.credential.token().await
    }
}
