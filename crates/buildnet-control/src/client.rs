//! HTTP client for the coordinator control plane

use async_trait::async_trait;
use buildnet_types::{truncate_diagnostic, AdminCredentials};
use reqwest::{redirect::Policy, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{ControlPlaneError, Result};
use crate::plane::{ControlPlane, CredentialRegistration, NodeRegistration};
use crate::wire::{self, Crumb, CredentialListing, ExtensionListing, NodeRequest};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Authenticated session against one coordinator
///
/// The crumb is fetched lazily and reused for credential and extension calls.
/// Node creation always runs on a fresh cookie session with its own crumb.
pub struct ControlPlaneClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    probe_timeout: Duration,
    remote_fs: String,
    crumb: Mutex<Option<Crumb>>,
}

impl std::fmt::Debug for ControlPlaneClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlaneClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl ControlPlaneClient {
    /// Create a client for the coordinator at `base_url`
    pub fn new(base_url: &str, admin: &AdminCredentials) -> Result<Self> {
        Ok(Self {
            client: session_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: admin.username.clone(),
            password: admin.password.clone(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            remote_fs: wire::DEFAULT_REMOTE_FS.to_string(),
            crumb: Mutex::new(None),
        })
    }

    /// Timeout of a single readiness probe
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Working directory of registered nodes
    pub fn with_remote_fs(mut self, remote_fs: impl Into<String>) -> Self {
        self.remote_fs = remote_fs.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.basic_auth(&self.username, Some(&self.password))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .authed(self.client.get(self.url(path)))
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn fetch_crumb(&self, client: &Client) -> Result<Crumb> {
        let response = self
            .authed(client.get(self.url(wire::CRUMB_PATH)))
            .send()
            .await
            .map_err(|e| ControlPlaneError::Crumb(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ControlPlaneError::Crumb(format!(
                "HTTP {}: {}",
                status.as_u16(),
                truncate_diagnostic(&body)
            )));
        }

        response
            .json::<Crumb>()
            .await
            .map_err(|e| ControlPlaneError::Crumb(e.to_string()))
    }

    /// Cached crumb, fetched on first use
    async fn crumb(&self) -> Result<Crumb> {
        let mut cached = self.crumb.lock().await;
        if let Some(crumb) = cached.as_ref() {
            return Ok(crumb.clone());
        }
        let crumb = self.fetch_crumb(&self.client).await?;
        debug!(field = %crumb.field, "Obtained crumb");
        *cached = Some(crumb.clone());
        Ok(crumb)
    }

    /// Send a crumb-protected request, refreshing the crumb once on 403
    async fn send_with_crumb<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let crumb = self.crumb().await?;
        let response = self
            .authed(build(&self.client))
            .header(crumb.field.as_str(), crumb.value.as_str())
            .send()
            .await?;

        if response.status() != StatusCode::FORBIDDEN {
            return Ok(response);
        }

        debug!("Crumb rejected, refreshing");
        *self.crumb.lock().await = None;
        let crumb = self.crumb().await?;
        Ok(self
            .authed(build(&self.client))
            .header(crumb.field.as_str(), crumb.value.as_str())
            .send()
            .await?)
    }

    async fn credential_present(&self) -> Result<bool> {
        let listing: CredentialListing = self.get_json(wire::CREDENTIAL_LIST_PATH).await?;
        Ok(listing.contains(wire::CREDENTIAL_ID))
    }

    /// Whether a node with this name exists
    pub async fn node_exists(&self, name: &str) -> Result<bool> {
        let response = self
            .authed(self.client.get(self.url(&wire::node_path(name))))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => ensure_success(response).await.map(|_| true),
        }
    }

    async fn try_register_credential(
        &self,
        private_key_path: &Path,
    ) -> Result<CredentialRegistration> {
        if self.credential_present().await? {
            info!(id = wire::CREDENTIAL_ID, "SSH credential already exists");
            return Ok(CredentialRegistration::AlreadyPresent);
        }

        let private_key = tokio::fs::read_to_string(private_key_path)
            .await
            .map_err(|e| {
                ControlPlaneError::CredentialRegistration(format!(
                    "cannot read private key {}: {}",
                    private_key_path.display(),
                    e
                ))
            })?;

        let form = wire::credential_form(&private_key);
        let url = self.url(wire::CREDENTIAL_CREATE_PATH);
        let response = self
            .send_with_crumb(|client| client.post(url.as_str()).form(&form))
            .await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), "Credential creation submitted");

        if self.credential_present().await? {
            info!(id = wire::CREDENTIAL_ID, "SSH credential created");
            Ok(CredentialRegistration::Created)
        } else {
            Err(ControlPlaneError::CredentialRegistration(format!(
                "{} not found after creation attempt (HTTP {}): {}",
                wire::CREDENTIAL_ID,
                status.as_u16(),
                truncate_diagnostic(&body)
            )))
        }
    }

    async fn try_register_node(
        &self,
        name: &str,
        host: &str,
        port: u16,
    ) -> Result<NodeRegistration> {
        if self.node_exists(name).await? {
            info!(node = name, "Node already registered");
            return Ok(NodeRegistration::AlreadyPresent);
        }

        let session = session_client()?;
        let cookie_response = self
            .authed(session.get(self.url(wire::NODE_SESSION_PATH)))
            .send()
            .await?;
        if cookie_response.status() != StatusCode::OK {
            return Err(ControlPlaneError::NodeRegistration(format!(
                "failed to obtain session cookie (HTTP {})",
                cookie_response.status().as_u16()
            )));
        }

        let crumb = self.fetch_crumb(&session).await?;
        let request = NodeRequest {
            name,
            host,
            port,
            remote_fs: &self.remote_fs,
        };

        let response = self
            .authed(session.post(self.url(wire::NODE_CREATE_PATH)))
            .header(crumb.field.as_str(), crumb.value.as_str())
            .form(&request.form(&crumb.value))
            .send()
            .await?;

        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            let body = response.text().await.unwrap_or_default();
            return Err(ControlPlaneError::NodeRegistration(format!(
                "HTTP {}: {}",
                status.as_u16(),
                truncate_diagnostic(&body)
            )));
        }

        if self.node_exists(name).await? {
            info!(node = name, host, port, "Node registered");
            Ok(NodeRegistration::Created)
        } else {
            Err(ControlPlaneError::NodeRegistration(format!(
                "node {} not found after creation (HTTP {})",
                name,
                status.as_u16()
            )))
        }
    }
}

#[async_trait]
impl ControlPlane for ControlPlaneClient {
    async fn is_ready(&self) -> bool {
        let result = self
            .client
            .get(self.url(wire::LOGIN_PATH))
            .timeout(self.probe_timeout)
            .send()
            .await;
        match result {
            Ok(response) => {
                debug!(status = response.status().as_u16(), "Readiness probe");
                response.status() == StatusCode::OK
            }
            Err(e) => {
                debug!(error = %e, "Readiness probe failed");
                false
            }
        }
    }

    #[instrument(skip(self), fields(coordinator = %self.base_url))]
    async fn register_trust_credential(
        &self,
        private_key_path: &Path,
    ) -> Result<CredentialRegistration> {
        self.try_register_credential(private_key_path)
            .await
            .map_err(|e| match e {
                ControlPlaneError::CredentialRegistration(_) => e,
                other => {
                    warn!(error = %other, "Credential registration failed");
                    ControlPlaneError::CredentialRegistration(truncate_diagnostic(
                        &other.to_string(),
                    ))
                }
            })
    }

    #[instrument(skip(self), fields(coordinator = %self.base_url))]
    async fn register_worker_node(
        &self,
        name: &str,
        host: &str,
        port: u16,
    ) -> Result<NodeRegistration> {
        self.try_register_node(name, host, port)
            .await
            .map_err(|e| match e {
                ControlPlaneError::NodeRegistration(_) => e,
                other => {
                    warn!(error = %other, node = name, "Node registration failed");
                    ControlPlaneError::NodeRegistration(truncate_diagnostic(&other.to_string()))
                }
            })
    }

    async fn installed_extensions(&self) -> Result<Vec<String>> {
        let listing: ExtensionListing = self
            .get_json(wire::EXTENSION_LIST_PATH)
            .await
            .map_err(|e| ControlPlaneError::Extension(e.to_string()))?;
        Ok(listing.names())
    }

    async fn install_extension(&self, name: &str) -> Result<()> {
        let url = self.url(wire::EXTENSION_INSTALL_PATH);
        let body = wire::extension_install_body(name);
        let response = self
            .send_with_crumb(|client| {
                client
                    .post(url.as_str())
                    .header(reqwest::header::CONTENT_TYPE, "text/xml")
                    .body(body.clone())
            })
            .await
            .map_err(|e| ControlPlaneError::Extension(e.to_string()))?;

        let status = response.status();
        if status.is_success() || status.is_redirection() {
            debug!(extension = name, "Install submitted");
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(ControlPlaneError::Extension(format!(
                "HTTP {}: {}",
                status.as_u16(),
                truncate_diagnostic(&text)
            )))
        }
    }
}

fn session_client() -> Result<Client> {
    Ok(Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .redirect(Policy::none())
        .cookie_store(true)
        .build()?)
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let message = response.text().await.unwrap_or_default();
        Err(ControlPlaneError::Api {
            status: status.as_u16(),
            message: truncate_diagnostic(&message),
        })
    }
}
