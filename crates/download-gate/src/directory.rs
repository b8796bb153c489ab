//! Principal directory lookup
//!
//! Answers "is this email a known principal?" before any gated work starts.
//! A negative answer is `Ok(None)`; `Err` is reserved for a directory that
//! could not be asked.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::GateError;
use crate::graph::{GraphClient, GraphConfig};

/// A directory identity allowed to receive gated artifacts
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    /// Stable directory id
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
}

#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn lookup(&self, email: &str) -> Result<Option<Principal>, GateError>;
}

/// Fixed set of principals, keyed by lowercase email
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    principals: HashMap<String, Principal>,
}

impl StaticDirectory {
    pub fn new(principals: impl IntoIterator<Item = Principal>) -> Self {
        Self {
            principals: principals
                .into_iter()
                .map(|p| (p.email.to_lowercase(), p))
                .collect(),
        }
    }

    /// Parse a JSON array of principals
    pub fn from_json(json: &str) -> Result<Self, GateError> {
        let principals: Vec<Principal> = serde_json::from_str(json).map_err(|e| {
            GateError::DirectoryUnavailable(format!("Invalid directory file: {}", e))
        })?;
        Ok(Self::new(principals))
    }

    /// Load a JSON array of principals from `path`
    pub async fn load(path: &Path) -> Result<Self, GateError> {
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            GateError::DirectoryUnavailable(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let directory = Self::from_json(&json)?;
        debug!(
            "Loaded {} principals from {}",
            directory.len(),
            path.display()
        );
        Ok(directory)
    }

    pub fn len(&self) -> usize {
        self.principals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }
}

#[async_trait]
impl PrincipalDirectory for StaticDirectory {
    async fn lookup(&self, email: &str) -> Result<Option<Principal>, GateError> {
        Ok(self.principals.get(&email.trim().to_lowercase()).cloned())
    }
}

/// Graph user resource, only the fields we read
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    id: String,
    display_name: Option<String>,
    mail: Option<String>,
    user_principal_name: Option<String>,
    department: Option<String>,
    job_title: Option<String>,
}

/// Azure AD directory via Microsoft Graph `GET /v1.0/users/{email}`
#[derive(Debug)]
pub struct GraphDirectory {
    graph: GraphClient,
}

impl GraphDirectory {
    pub fn new(http: reqwest::Client, config: GraphConfig) -> Self {
        Self {
            graph: GraphClient::new(http, config),
        }
    }

    pub fn from_client(graph: GraphClient) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl PrincipalDirectory for GraphDirectory {
    async fn lookup(&self, email: &str) -> Result<Option<Principal>, GateError> {
        let email = email.trim();
        let token = self
            .graph
            .access_token()
            .await
            .map_err(GateError::DirectoryUnavailable)?;
        let url = self
            .graph
            .url(&["users", email])
            .map_err(GateError::DirectoryUnavailable)?;

        let response = self
            .graph
            .http()
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| GateError::DirectoryUnavailable(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let user: GraphUser = response
                    .json()
                    .await
                    .map_err(|e| GateError::DirectoryUnavailable(format!("Invalid user: {}", e)))?;
                let principal = Principal {
                    id: user.id,
                    email: user
                        .mail
                        .or(user.user_principal_name)
                        .unwrap_or_else(|| email.to_string()),
                    name: user.display_name.unwrap_or_else(|| email.to_string()),
                    department: user.department,
                    job_title: user.job_title,
                };
                debug!("Directory lookup for {} found {}", email, principal.id);
                Ok(Some(principal))
            }
            // Graph answers 400 for identifiers that cannot name a user at all
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => {
                debug!("Directory lookup for {} found nobody", email);
                Ok(None)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                warn!("Directory lookup for {} returned {}: {}", email, status, body);
                Err(GateError::DirectoryUnavailable(format!(
                    "Graph returned {}",
                    status
                )))
            }
        }
    }
}
