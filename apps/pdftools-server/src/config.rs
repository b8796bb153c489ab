//! Command-line and environment configuration

use std::path::PathBuf;

use clap::Parser;
use download_gate::RedemptionPolicy;

use crate::convert::DEFAULT_CONVERTER;

/// Command-line arguments for the PDF tools server
#[derive(Parser, Debug, Clone)]
#[command(name = "pdftools-server")]
#[command(about = "PDF tools server: DOCX conversion, gated download, split, extract and merge")]
pub struct Config {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Concurrent heavy jobs (conversion, split, merge)
    #[arg(long, env = "WORKER_THREADS", default_value = "2")]
    pub worker_threads: usize,

    /// Job timeout in milliseconds
    #[arg(long, env = "JOB_TIMEOUT_MS", default_value = "120000")]
    pub job_timeout_ms: u64,

    /// Largest accepted request body in megabytes
    #[arg(long, env = "MAX_UPLOAD_MB", default_value = "100")]
    pub max_upload_mb: usize,

    /// Rate limit: requests per second per IP
    #[arg(long, env = "RATE_LIMIT", default_value = "10")]
    pub rate_limit: u32,

    /// Parent directory for per-request scratch space
    #[arg(long, env = "WORK_DIR", default_value = "temp_files")]
    pub work_dir: PathBuf,

    /// Directory holding converted files awaiting gated download
    #[arg(long, env = "ARTIFACT_DIR", default_value = "temp_files/artifacts")]
    pub artifact_dir: PathBuf,

    /// External converter, `{input}` and `{output}` are substituted
    #[arg(long, env = "CONVERTER_COMMAND", default_value = DEFAULT_CONVERTER)]
    pub converter_command: String,

    /// HS256 secret for download tokens (at least 32 bytes). Gated delivery
    /// is disabled without it.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Download link lifetime in minutes
    #[arg(long, env = "TOKEN_TTL_MINUTES", default_value = "120")]
    pub token_ttl_minutes: i64,

    /// Whether a download link works once or until it expires
    #[arg(long, env = "REDEMPTION_POLICY", default_value = "reusable")]
    pub redemption_policy: RedemptionPolicy,

    /// Interval between sweeps of expired artifacts, in seconds
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value = "300")]
    pub sweep_interval_secs: u64,

    /// Base URL used in emailed download links
    #[arg(long, env = "PUBLIC_URL", default_value = "http://localhost:8000")]
    pub public_url: String,

    /// JSON file of allowed principals, used instead of Azure AD when set
    #[arg(long, env = "DIRECTORY_FILE")]
    pub directory_file: Option<PathBuf>,

    /// Azure AD tenant for Microsoft Graph
    #[arg(long, env = "AZURE_TENANT_ID")]
    pub azure_tenant_id: Option<String>,

    /// Azure AD application (client) id
    #[arg(long, env = "AZURE_CLIENT_ID")]
    pub azure_client_id: Option<String>,

    /// Azure AD application secret
    #[arg(long, env = "AZURE_CLIENT_SECRET", hide_env_values = true)]
    pub azure_client_secret: Option<String>,

    /// Mailbox that sends download links
    #[arg(long, env = "MAIL_SENDER")]
    pub mail_sender: Option<String>,

    /// Resend API key; when set, mail goes through Resend instead of Graph
    #[arg(long, env = "RESEND_API_KEY", hide_env_values = true)]
    pub resend_api_key: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// All three Azure settings, when present
    pub fn azure(&self) -> Option<(String, String, String)> {
        match (
            &self.azure_tenant_id,
            &self.azure_client_id,
            &self.azure_client_secret,
        ) {
            (Some(tenant), Some(client), Some(secret)) => {
                Some((tenant.clone(), client.clone(), secret.clone()))
            }
            _ => None,
        }
    }

    pub fn public_url(&self) -> &str {
        self.public_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["pdftools-server"]).unwrap();
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.token_ttl_minutes, 120);
        assert_eq!(config.redemption_policy, RedemptionPolicy::Reusable);
        assert_eq!(config.converter_command, DEFAULT_CONVERTER);
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = Config::try_parse_from([
            "pdftools-server",
            "--port",
            "9000",
            "--redemption-policy",
            "single-use",
            "--public-url",
            "https://files.example.com/",
        ])
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.redemption_policy, RedemptionPolicy::SingleUse);
        assert_eq!(config.public_url(), "https://files.example.com");
    }

    #[test]
    fn test_invalid_policy_is_rejected() {
        let result = Config::try_parse_from(["pdftools-server", "--redemption-policy", "twice"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_azure_requires_all_settings() {
        let partial = Config::try_parse_from([
            "pdftools-server",
            "--azure-tenant-id",
            "t",
            "--azure-client-id",
            "c",
        ])
        .unwrap();
        assert!(partial.azure().is_none());
    }
}
