//! GitHub Actions repository secrets: a write-only secondary store.
//!
//! Values are sealed to the repository public key (libsodium sealed box)
//! before upload; the API never returns them.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use crypto_box::PublicKey;
use envseal_core::config::GitHubConfig;
use envseal_core::SecretString;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use super::SecondaryStore;
use crate::credential::StoreKind;
use crate::error::{Result, RotationError};
use crate::http;

const KIND: StoreKind = StoreKind::GitHub;
const API_VERSION: &str = "2022-11-28";

#[derive(Debug, Clone, Deserialize)]
struct RepoPublicKey {
    key_id: String,
    key: String,
}

#[derive(Serialize)]
struct PutSecret<'a> {
    encrypted_value: String,
    key_id: &'a str,
}

pub struct GitHubStore {
    client: Client,
    api_url: String,
    repo: String,
    token: SecretString,
    public_key: Mutex<Option<RepoPublicKey>>,
}

impl GitHubStore {
    pub fn new(config: &GitHubConfig, token: SecretString, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http::client(KIND, timeout)?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            repo: config.repo.clone(),
            token,
            public_key: Mutex::new(None),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(self.token.expose_secret())
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn public_key(&self) -> Result<RepoPublicKey> {
        let mut cached = self.public_key.lock().await;
        if let Some(key) = cached.as_ref() {
            return Ok(key.clone());
        }

        let url = format!("{}/repos/{}/actions/secrets/public-key", self.api_url, self.repo);
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(|e| http::transport(KIND, e))?;
        let key: RepoPublicKey = http::json(KIND, http::check(KIND, response).await?).await?;
        debug!(repo = %self.repo, key_id = %key.key_id, "fetched repository public key");
        *cached = Some(key.clone());
        Ok(key)
    }
}

/// Seal `value` to a base64 X25519 public key; returns base64 ciphertext.
pub(crate) fn seal(public_key_b64: &str, value: &SecretString) -> Result<String> {
    let invalid = |reason: &str| RotationError::ExternalApi {
        store: KIND,
        status: None,
        message: format!("invalid repository public key: {reason}"),
    };
    let raw = STANDARD
        .decode(public_key_b64.trim())
        .map_err(|_| invalid("not base64"))?;
    let bytes: [u8; 32] = raw.try_into().map_err(|_| invalid("expected 32 bytes"))?;
    let sealed = PublicKey::from(bytes)
        .seal(&mut rand::rngs::OsRng, value.expose_secret().as_bytes())
        .map_err(|_| invalid("sealing failed"))?;
    Ok(STANDARD.encode(sealed))
}

#[async_trait]
impl SecondaryStore for GitHubStore {
    fn kind(&self) -> StoreKind {
        KIND
    }

    async fn push(&self, secret_name: &str, value: &SecretString) -> Result<()> {
        let key = self.public_key().await?;
        let body = PutSecret {
            encrypted_value: seal(&key.key, value)?,
            key_id: &key.key_id,
        };

        let url = format!(
            "{}/repos/{}/actions/secrets/{secret_name}",
            self.api_url, self.repo
        );
        let response = self
            .authorized(self.client.put(url))
            .json(&body)
            .send()
            .await
            .map_err(|e| http::transport(KIND, e))?;
        let status = http::check(KIND, response).await?.status();

        // 201 created, 204 updated.
        debug!(repo = %self.repo, secret = secret_name, status = status.as_u16(), "repository secret written");
        Ok(())
    }
}
