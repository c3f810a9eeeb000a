//! GCP Secret Manager: a readable secondary store.
//!
//! Pushing adds a new secret version (creating the secret on first use) and
//! then reads `latest` back to confirm the stored value.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use envseal_core::config::GcpConfig;
use envseal_core::secret::constant_time_eq;
use envseal_core::SecretString;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::SecondaryStore;
use crate::credential::StoreKind;
use crate::error::{Result, RotationError};
use crate::http;

const KIND: StoreKind = StoreKind::Gcp;

/// Where the OAuth access token comes from.
#[derive(Debug, Clone)]
pub enum GcpToken {
    Static(SecretString),
    /// Instance metadata server (service account of the host).
    Metadata { url: String },
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: SecretString,
}

#[derive(Serialize)]
struct AddVersion<'a> {
    payload: Payload<'a>,
}

#[derive(Serialize)]
struct Payload<'a> {
    data: &'a str,
}

#[derive(Deserialize)]
struct AccessResponse {
    payload: AccessPayload,
}

#[derive(Deserialize)]
struct AccessPayload {
    data: SecretString,
}

pub struct GcpStore {
    client: Client,
    api_url: String,
    project: String,
    token_source: GcpToken,
    token: Mutex<Option<SecretString>>,
}

impl GcpStore {
    pub fn new(config: &GcpConfig, token: GcpToken, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http::client(KIND, timeout)?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            project: config.project.clone(),
            token_source: token,
            token: Mutex::new(None),
        })
    }

    async fn token(&self) -> Result<SecretString> {
        let url = match &self.token_source {
            GcpToken::Static(token) => return Ok(token.clone()),
            GcpToken::Metadata { url } => url,
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let response = self
            .client
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| http::transport(KIND, e))?;
        let token: MetadataToken = http::json(KIND, http::check(KIND, response).await?).await?;
        debug!("obtained access token from metadata server");
        *cached = Some(token.access_token.clone());
        Ok(token.access_token)
    }

    fn secret_url(&self, secret_id: &str) -> String {
        format!(
            "{}/v1/projects/{}/secrets/{secret_id}",
            self.api_url, self.project
        )
    }

    async fn add_version(&self, secret_id: &str, encoded: &str) -> Result<()> {
        let token = self.token().await?;
        let response = self
            .client
            .post(format!("{}:addVersion", self.secret_url(secret_id)))
            .bearer_auth(token.expose_secret())
            .json(&AddVersion {
                payload: Payload { data: encoded },
            })
            .send()
            .await
            .map_err(|e| http::transport(KIND, e))?;
        http::check(KIND, response).await?;
        Ok(())
    }

    async fn create_secret(&self, secret_id: &str) -> Result<()> {
        let token = self.token().await?;
        let response = self
            .client
            .post(format!("{}/v1/projects/{}/secrets", self.api_url, self.project))
            .bearer_auth(token.expose_secret())
            .query(&[("secretId", secret_id)])
            .json(&json!({ "replication": { "automatic": {} } }))
            .send()
            .await
            .map_err(|e| http::transport(KIND, e))?;
        http::check(KIND, response).await?;
        info!(project = %self.project, secret = secret_id, "created secret");
        Ok(())
    }

    /// Base64 payload of the latest version.
    async fn access_latest(&self, secret_id: &str) -> Result<SecretString> {
        let token = self.token().await?;
        let response = self
            .client
            .get(format!("{}/versions/latest:access", self.secret_url(secret_id)))
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| http::transport(KIND, e))?;
        let body: AccessResponse = http::json(KIND, http::check(KIND, response).await?).await?;
        Ok(body.payload.data)
    }
}

#[async_trait]
impl SecondaryStore for GcpStore {
    fn kind(&self) -> StoreKind {
        KIND
    }

    async fn push(&self, secret_id: &str, value: &SecretString) -> Result<()> {
        let encoded = Zeroizing::new(STANDARD.encode(value.expose_secret()));

        match self.add_version(secret_id, &encoded).await {
            Err(RotationError::ExternalApi {
                status: Some(404), ..
            }) => {
                self.create_secret(secret_id).await?;
                self.add_version(secret_id, &encoded).await?;
            }
            other => other?,
        }

        let stored = self.access_latest(secret_id).await?;
        let stored = Zeroizing::new(STANDARD.decode(stored.expose_secret()).map_err(|_| {
            RotationError::ExternalApi {
                store: KIND,
                status: None,
                message: "latest version payload is not base64".into(),
            }
        })?);
        if !constant_time_eq(&stored, value.expose_secret().as_bytes()) {
            return Err(RotationError::ExternalApi {
                store: KIND,
                status: None,
                message: format!("read-back of '{secret_id}' does not match the pushed value"),
            });
        }

        debug!(project = %self.project, secret = secret_id, "secret version confirmed");
        Ok(())
    }
}
