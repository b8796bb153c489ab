//! Microsoft Graph access shared by the directory lookup and the Graph mailer
//!
//! App-only access tokens come from the OAuth2 client-credentials grant and
//! are cached until shortly before they expire.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

/// Microsoft Graph API root
pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com";

/// Microsoft identity platform root
pub const LOGIN_BASE_URL: &str = "https://login.microsoftonline.com";

const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Tokens are refreshed this long before their stated expiry
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Azure AD application credentials
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// Authenticated Graph client
#[derive(Debug)]
pub struct GraphClient {
    http: reqwest::Client,
    config: GraphConfig,
    graph_base: String,
    login_base: String,
    cached: Mutex<Option<(String, Instant)>>,
}

impl GraphClient {
    pub fn new(http: reqwest::Client, config: GraphConfig) -> Self {
        Self::with_endpoints(http, config, GRAPH_BASE_URL, LOGIN_BASE_URL)
    }

    /// Point the client at other Graph and login hosts
    pub fn with_endpoints(
        http: reqwest::Client,
        config: GraphConfig,
        graph_base: &str,
        login_base: &str,
    ) -> Self {
        Self {
            http,
            config,
            graph_base: graph_base.trim_end_matches('/').to_string(),
            login_base: login_base.trim_end_matches('/').to_string(),
            cached: Mutex::new(None),
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Build `{graph_base}/v1.0/{segments...}` with each segment percent-encoded
    pub fn url(&self, segments: &[&str]) -> Result<reqwest::Url, String> {
        let mut url = reqwest::Url::parse(&format!("{}/v1.0", self.graph_base))
            .map_err(|e| format!("Invalid Graph URL: {}", e))?;
        url.path_segments_mut()
            .map_err(|_| "Graph URL cannot have path segments".to_string())?
            .extend(segments);
        Ok(url)
    }

    /// Current app-only access token, requesting a new one when needed
    pub async fn access_token(&self) -> Result<String, String> {
        let mut cached = self.cached.lock().await;
        if let Some((token, expires)) = cached.as_ref() {
            if Instant::now() < *expires {
                return Ok(token.clone());
            }
        }

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_base, self.config.tenant_id
        );
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("scope", GRAPH_SCOPE),
        ];

        let response = self
            .http
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| format!("Token request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Token request returned {}: {}", status, body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| format!("Invalid token response: {}", e))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        debug!("Acquired Graph access token valid for {:?}", lifetime);

        *cached = Some((token.access_token.clone(), Instant::now() + lifetime));
        Ok(token.access_token)
    }
}
