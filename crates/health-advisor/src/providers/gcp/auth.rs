//! GCP access tokens for the dedicated Vertex AI endpoint
//!
//! A token is fetched on every call from the first available source:
//! an explicit token, a service account key (JWT bearer grant), or the
//! instance metadata server.

use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::GcpConfig;
use crate::error::{Error, Result};

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Where access tokens come from
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialSource {
    /// Pre-minted token (GOOGLE_OAUTH_ACCESS_TOKEN)
    StaticToken(String),
    /// Service account JSON key file
    ServiceAccount(PathBuf),
    /// Instance metadata server token URL
    MetadataServer(String),
}

#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// GCP authentication manager
pub struct GcpAuth {
    source: CredentialSource,
    client: Client,
}

impl GcpAuth {
    /// Create with an explicit credential source
    pub fn new(source: CredentialSource) -> Result<Self> {
        let client = Client::builder()
            .timeout(TOKEN_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { source, client })
    }

    /// Resolve the credential source from config and process environment
    pub fn from_config(config: &GcpConfig) -> Result<Self> {
        Self::new(Self::resolve_source(config, |key| std::env::var(key).ok()))
    }

    /// Pick the credential source: explicit token, then key file, then metadata server
    pub fn resolve_source<F>(config: &GcpConfig, lookup: F) -> CredentialSource
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("GOOGLE_OAUTH_ACCESS_TOKEN").filter(|t| !t.is_empty()) {
            return CredentialSource::StaticToken(token);
        }

        let key_path = config.service_account_key_path.clone().or_else(|| {
            lookup("GOOGLE_APPLICATION_CREDENTIALS")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
        });

        match key_path {
            Some(path) => CredentialSource::ServiceAccount(path),
            None => CredentialSource::MetadataServer(config.metadata_token_url.clone()),
        }
    }

    /// Credential source in use
    pub fn source(&self) -> &CredentialSource {
        &self.source
    }

    /// Fetch a fresh access token
    pub async fn get_token(&self) -> Result<String> {
        match &self.source {
            CredentialSource::StaticToken(token) => Ok(token.clone()),
            CredentialSource::ServiceAccount(path) => self.service_account_token(path).await,
            CredentialSource::MetadataServer(url) => self.metadata_token(url).await,
        }
    }

    async fn metadata_token(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| Error::provider(format!("Metadata server request failed: {}", e)))?;

        Self::read_token(response, "Metadata server").await
    }

    async fn service_account_token(&self, key_path: &Path) -> Result<String> {
        let key_content = tokio::fs::read_to_string(key_path).await.map_err(|e| {
            Error::Config(format!(
                "Failed to read service account key {}: {}",
                key_path.display(),
                e
            ))
        })?;

        let key: ServiceAccountKey = serde_json::from_str(&key_content)
            .map_err(|e| Error::Config(format!("Invalid service account key format: {}", e)))?;

        let jwt = sign_jwt(&key)?;

        let response = self
            .client
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", jwt.as_str())])
            .send()
            .await
            .map_err(|e| Error::provider(format!("Token exchange request failed: {}", e)))?;

        Self::read_token(response, "Token exchange").await
    }

    async fn read_token(response: reqwest::Response, what: &str) -> Result<String> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(format!(
                "{} failed ({}): {}",
                what, status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::provider(format!("Failed to parse token response: {}", e)))?;

        Ok(token.access_token)
    }
}

/// Build an RS256-signed JWT assertion for the key's token endpoint
fn sign_jwt(key: &ServiceAccountKey) -> Result<String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::Internal(format!("System clock before epoch: {}", e)))?
        .as_secs() as i64;

    let claims = serde_json::json!({
        "iss": key.client_email,
        "scope": CLOUD_PLATFORM_SCOPE,
        "aud": key.token_uri,
        "iat": now,
        "exp": now + 3600,
    });

    let engine = &base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = engine.encode(r#"{"alg":"RS256","typ":"JWT"}"#.as_bytes());
    let payload = engine.encode(claims.to_string().as_bytes());
    let signing_input = format!("{}.{}", header, payload);

    // Key files carry escaped newlines when pasted through env tooling
    let private_key = key.private_key.replace("\\n", "\n");
    let der = pem::parse(&private_key)
        .map_err(|e| Error::Config(format!("Failed to parse private key PEM: {}", e)))?;
    let key_pair = ring::signature::RsaKeyPair::from_pkcs8(der.contents())
        .map_err(|e| Error::Config(format!("Failed to parse private key: {:?}", e)))?;

    let mut signature = vec![0u8; key_pair.public().modulus_len()];
    key_pair
        .sign(
            &ring::signature::RSA_PKCS1_SHA256,
            &ring::rand::SystemRandom::new(),
            signing_input.as_bytes(),
            &mut signature,
        )
        .map_err(|e| Error::Config(format!("Failed to sign JWT: {:?}", e)))?;

    Ok(format!("{}.{}", signing_input, engine.encode(&signature)))
}
