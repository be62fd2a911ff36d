//! Contracts consumed by the outer HTTP collaborator.
//!
//! The core does not serve HTTP. These are the request/response shapes
//! and the token validation contract the handlers are written against,
//! plus the status mapping of the error taxonomy.

use serde::{Deserialize, Serialize};

use cluster::{Error, Profile, Result};

use crate::provision::TaskRole;

/// Header carrying the bearer token on websocket upgrades.
pub const WEBSOCKET_PROTOCOL_HEADER: &str = "Sec-Websocket-Protocol";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionRequest {
    #[serde(rename = "clusterName")]
    pub cluster_name: String,
    pub profile: Profile,
    #[serde(rename = "cloudAccountName")]
    pub cloud_account_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub role: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionResponse {
    #[serde(rename = "clusterId")]
    pub cluster_id: String,
    pub tasks: Vec<TaskInfo>,
}

impl ProvisionResponse {
    pub fn new(
        cluster_id: String,
        tasks: &std::collections::HashMap<TaskRole, Vec<String>>,
    ) -> Self {
        let mut infos: Vec<TaskInfo> = tasks
            .iter()
            .flat_map(|(role, ids)| {
                ids.iter().map(|id| TaskInfo {
                    role: role.to_string(),
                    id: id.clone(),
                })
            })
            .collect();
        infos.sort_by(|a, b| a.role.cmp(&b.role).then(a.id.cmp(&b.id)));
        ProvisionResponse {
            cluster_id,
            tasks: infos,
        }
    }
}

/// Claims carried by a validated bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "user_id")]
    pub user_id: String,
}

/// Token validation contract of the auth middleware.
pub trait TokenValidator: Send + Sync {
    fn validate(&self, token: &str) -> Result<Claims>;
}

/// Claims without a user are rejected regardless of signature validity.
pub fn require_user(claims: &Claims) -> Result<()> {
    if claims.user_id.is_empty() {
        return Err(Error::InvalidCredentials);
    }
    Ok(())
}

/// HTTP status the outer layer answers with for a core error.
pub fn status_code(err: &Error) -> u16 {
    match err {
        Error::InvalidArguments(_) => 400,
        Error::NotFound(_) => 404,
        Error::InvalidCredentials | Error::Unauthorized => 403,
        Error::TimeoutExceeded => 504,
        Error::Cancelled | Error::Provider { .. } | Error::Internal(_) => 500,
    }
}
