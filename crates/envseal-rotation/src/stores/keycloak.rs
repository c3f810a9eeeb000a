//! Keycloak admin API: the authoritative store.
//!
//! Regenerating a client secret invalidates the previous one immediately.

use async_trait::async_trait;
use envseal_core::config::KeycloakConfig;
use envseal_core::SecretString;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use super::AuthoritativeStore;
use crate::credential::StoreKind;
use crate::error::{Result, RotationError};
use crate::http;

const KIND: StoreKind = StoreKind::Keycloak;

/// How envseal authenticates to the admin API.
#[derive(Debug, Clone)]
pub enum KeycloakAuth {
    /// Resource-owner password grant against the admin client.
    Password {
        username: String,
        password: SecretString,
    },
    /// Service-account client-credentials grant.
    ClientCredentials { client_secret: SecretString },
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: SecretString,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientRepresentation {
    id: String,
    client_id: String,
}

#[derive(Deserialize)]
struct CredentialRepresentation {
    value: SecretString,
}

pub struct KeycloakStore {
    client: Client,
    base_url: String,
    realm: String,
    admin_realm: String,
    admin_client_id: String,
    auth: KeycloakAuth,
    token: Mutex<Option<SecretString>>,
}

impl KeycloakStore {
    pub fn new(config: &KeycloakConfig, auth: KeycloakAuth, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http::client(KIND, timeout)?,
            base_url: config.url.trim_end_matches('/').to_string(),
            realm: config.realm.clone(),
            admin_realm: config.admin_realm.clone(),
            admin_client_id: config.admin_client_id.clone(),
            auth,
            token: Mutex::new(None),
        })
    }

    /// Cached admin token, fetching a new one when empty or `refresh` is set.
    async fn token(&self, refresh: bool) -> Result<SecretString> {
        let mut cached = self.token.lock().await;
        if !refresh {
            if let Some(token) = cached.as_ref() {
                return Ok(token.clone());
            }
        }
        let token = self.fetch_token().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn fetch_token(&self) -> Result<SecretString> {
        let url = format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.base_url, self.admin_realm
        );
        let request = self.client.post(url);
        let request = match &self.auth {
            KeycloakAuth::Password { username, password } => request.form(&[
                ("grant_type", "password"),
                ("client_id", self.admin_client_id.as_str()),
                ("username", username.as_str()),
                ("password", password.expose_secret()),
            ]),
            KeycloakAuth::ClientCredentials { client_secret } => request.form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.admin_client_id.as_str()),
                ("client_secret", client_secret.expose_secret()),
            ]),
        };

        let response = request.send().await.map_err(|e| http::transport(KIND, e))?;
        let token: TokenResponse = http::json(KIND, http::check(KIND, response).await?).await?;
        debug!(realm = %self.admin_realm, "obtained admin token");
        Ok(token.access_token)
    }

    /// Send an admin request, refreshing the token once if it was rejected.
    async fn send_admin(&self, build: impl Fn(&str) -> RequestBuilder) -> Result<Response> {
        let token = self.token(false).await?;
        let response = build(token.expose_secret())
            .send()
            .await
            .map_err(|e| http::transport(KIND, e))?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return http::check(KIND, response).await;
        }

        debug!("admin token rejected, refreshing");
        let token = self.token(true).await?;
        let response = build(token.expose_secret())
            .send()
            .await
            .map_err(|e| http::transport(KIND, e))?;
        http::check(KIND, response).await
    }

    /// Internal id of the client with `clientId == client_id`.
    async fn client_uuid(&self, client_id: &str) -> Result<String> {
        let url = format!("{}/admin/realms/{}/clients", self.base_url, self.realm);
        let response = self
            .send_admin(|token| {
                self.client
                    .get(&url)
                    .bearer_auth(token)
                    .query(&[("clientId", client_id)])
            })
            .await?;
        let clients: Vec<ClientRepresentation> = http::json(KIND, response).await?;

        clients
            .into_iter()
            .find(|c| c.client_id == client_id)
            .map(|c| c.id)
            .ok_or_else(|| RotationError::ExternalApi {
                store: KIND,
                status: Some(404),
                message: format!("client '{client_id}' not found in realm '{}'", self.realm),
            })
    }

    fn secret_url(&self, uuid: &str) -> String {
        format!(
            "{}/admin/realms/{}/clients/{uuid}/client-secret",
            self.base_url, self.realm
        )
    }
}

#[async_trait]
impl AuthoritativeStore for KeycloakStore {
    fn kind(&self) -> StoreKind {
        KIND
    }

    async fn regenerate(&self, client_id: &str) -> Result<SecretString> {
        let url = self.secret_url(&self.client_uuid(client_id).await?);
        let response = self
            .send_admin(|token| self.client.post(&url).bearer_auth(token))
            .await?;
        let credential: CredentialRepresentation = http::json(KIND, response).await?;
        debug!(client_id, realm = %self.realm, "client secret regenerated");
        Ok(credential.value)
    }

    async fn read(&self, client_id: &str) -> Result<SecretString> {
        let url = self.secret_url(&self.client_uuid(client_id).await?);
        let response = self
            .send_admin(|token| self.client.get(&url).bearer_auth(token))
            .await?;
        let credential: CredentialRepresentation = http::json(KIND, response).await?;
        Ok(credential.value)
    }
}
