//! DigitalOcean steps and the droplet API client.

pub mod create_machine;
pub mod delete_cluster;
pub mod delete_machine;
pub mod register_key;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use cluster::clouds::CLUSTER_ID_TAG;
use cluster::{Error, Result};

use crate::config::DigitalOceanConfig;

const DEFAULT_BASE_URL: &str = "https://api.digitalocean.com";

/// Tag stamped on every droplet of a cluster so cluster-wide deletes can
/// enumerate them.
pub fn cluster_tag(cluster_id: &str) -> String {
    format!("{}-{}", CLUSTER_ID_TAG, cluster_id)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkV4 {
    pub ip_address: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Networks {
    #[serde(default)]
    pub v4: Vec<NetworkV4>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Droplet {
    pub id: u64,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub networks: Networks,
}

impl Droplet {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    fn ip_of_kind(&self, kind: &str) -> Option<&str> {
        self.networks
            .v4
            .iter()
            .find(|n| n.kind == kind)
            .map(|n| n.ip_address.as_str())
    }

    pub fn public_ip(&self) -> Option<&str> {
        self.ip_of_kind("public")
    }

    pub fn private_ip(&self) -> Option<&str> {
        self.ip_of_kind("private")
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DropletCreateRequest {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user_data: String,
}

/// An account SSH key known to the provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SshKey {
    pub id: u64,
    pub fingerprint: String,
    #[serde(default)]
    pub public_key: String,
}

/// Narrow droplet interface the steps consume; mocked in tests.
#[async_trait]
pub trait DropletService: Send + Sync {
    async fn create(&self, req: &DropletCreateRequest) -> Result<Droplet>;
    async fn get(&self, id: u64) -> Result<Droplet>;
    async fn list_by_tag(&self, tag: &str) -> Result<Vec<Droplet>>;
    async fn delete(&self, id: u64) -> Result<()>;
    async fn delete_by_tag(&self, tag: &str) -> Result<()>;
    /// Register an account SSH key. Converges on the existing key when
    /// the public key is already known to the account.
    async fn register_key(&self, name: &str, public_key: &str) -> Result<SshKey>;
}

pub type GetDropletFn =
    Arc<dyn Fn(&DigitalOceanConfig) -> Result<Arc<dyn DropletService>> + Send + Sync>;

/// Default factory: a REST client built from the account access token.
pub fn default_droplet_fn() -> GetDropletFn {
    Arc::new(|config| {
        let client = DoClient::new(&config.access_token)?;
        Ok(Arc::new(client) as Arc<dyn DropletService>)
    })
}

/// REST client against the DigitalOcean v2 API.
pub struct DoClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

#[derive(Deserialize)]
struct DropletEnvelope {
    droplet: Droplet,
}

#[derive(Deserialize)]
struct DropletsEnvelope {
    #[serde(default)]
    droplets: Vec<Droplet>,
}

#[derive(Deserialize)]
struct SshKeyEnvelope {
    ssh_key: SshKey,
}

#[derive(Deserialize)]
struct SshKeysEnvelope {
    #[serde(default)]
    ssh_keys: Vec<SshKey>,
}

impl DoClient {
    pub fn new(token: &str) -> Result<Self> {
        if token.is_empty() {
            return Err(Error::InvalidCredentials);
        }
        Ok(DoClient {
            http: reqwest::Client::new(),
            token: token.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the client at a fake API. Test hook.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        match status.as_u16() {
            401 => Err(Error::InvalidCredentials),
            403 => Err(Error::Unauthorized),
            404 => Err(Error::NotFound("droplet".to_string())),
            _ => Err(Error::provider(
                "digitalocean",
                format!("{}: {}", status, body),
            )),
        }
    }

    fn transport(err: reqwest::Error) -> Error {
        Error::provider("digitalocean", err.to_string())
    }
}

#[async_trait]
impl DropletService for DoClient {
    async fn create(&self, req: &DropletCreateRequest) -> Result<Droplet> {
        let response = self
            .http
            .post(format!("{}/v2/droplets", self.base_url))
            .bearer_auth(&self.token)
            .json(req)
            .send()
            .await
            .map_err(Self::transport)?;
        let envelope: DropletEnvelope = self
            .check(response)
            .await?
            .json()
            .await
            .map_err(Self::transport)?;
        Ok(envelope.droplet)
    }

    async fn get(&self, id: u64) -> Result<Droplet> {
        let response = self
            .http
            .get(format!("{}/v2/droplets/{}", self.base_url, id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(Self::transport)?;
        let envelope: DropletEnvelope = self
            .check(response)
            .await?
            .json()
            .await
            .map_err(Self::transport)?;
        Ok(envelope.droplet)
    }

    async fn list_by_tag(&self, tag: &str) -> Result<Vec<Droplet>> {
        let response = self
            .http
            .get(format!("{}/v2/droplets", self.base_url))
            .query(&[("tag_name", tag)])
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(Self::transport)?;
        let envelope: DropletsEnvelope = self
            .check(response)
            .await?
            .json()
            .await
            .map_err(Self::transport)?;
        Ok(envelope.droplets)
    }

    async fn delete(&self, id: u64) -> Result<()> {
        let response = self
            .http
            .delete(format!("{}/v2/droplets/{}", self.base_url, id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(Self::transport)?;
        self.check(response).await.map(|_| ())
    }

    async fn delete_by_tag(&self, tag: &str) -> Result<()> {
        let response = self
            .http
            .delete(format!("{}/v2/droplets", self.base_url))
            .query(&[("tag_name", tag)])
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(Self::transport)?;
        self.check(response).await.map(|_| ())
    }

    async fn register_key(&self, name: &str, public_key: &str) -> Result<SshKey> {
        let response = self
            .http
            .post(format!("{}/v2/account/keys", self.base_url))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({
                "name": name,
                "public_key": public_key,
            }))
            .send()
            .await
            .map_err(Self::transport)?;

        // A key that is already registered answers 422; converge on the
        // existing account key instead of failing the step.
        if response.status().as_u16() == 422 {
            let listing = self
                .http
                .get(format!("{}/v2/account/keys", self.base_url))
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(Self::transport)?;
            let envelope: SshKeysEnvelope = self
                .check(listing)
                .await?
                .json()
                .await
                .map_err(Self::transport)?;
            return envelope
                .ssh_keys
                .into_iter()
                .find(|key| key.public_key.trim() == public_key.trim())
                .ok_or_else(|| Error::NotFound("account ssh key".to_string()));
        }

        let envelope: SshKeyEnvelope = self
            .check(response)
            .await?
            .json()
            .await
            .map_err(Self::transport)?;
        Ok(envelope.ssh_key)
    }
}
