//! Outbound mail for download links
//!
//! Each transport makes one attempt. Failures surface as `DeliveryFailed`
//! and are never retried here.

use async_trait::async_trait;
use chrono::Duration;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::directory::Principal;
use crate::error::GateError;
use crate::graph::{GraphClient, GraphConfig};

/// Resend API endpoint
pub const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// A single HTML email to one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub to_name: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), GateError>;
}

/// Build the email that carries a download link
pub fn download_notice(
    principal: &Principal,
    filename: &str,
    link: &str,
    ttl: Duration,
) -> MailMessage {
    let name = escape_html(&principal.name);
    let file = escape_html(filename);
    let link = escape_html(link);
    let validity = describe_duration(ttl);

    let html = format!(
        r#"<html>
<body style="font-family: Arial, sans-serif; color: #222;">
  <h2>Your document is ready</h2>
  <p>Hello {name},</p>
  <p>Your document <strong>{file}</strong> has been converted to Word.</p>
  <p>Use the link below to download it:</p>
  <p><a href="{link}" style="background-color: #0078d4; color: white; padding: 10px 20px; text-decoration: none; border-radius: 5px;">Download document</a></p>
  <p><strong>Important:</strong> this link expires in {validity}.</p>
  <p>If you did not request this conversion, please contact your administrator.</p>
  <hr>
  <p><small>This message was sent automatically by the PDF conversion service.</small></p>
</body>
</html>"#
    );

    MailMessage {
        to: principal.email.clone(),
        to_name: principal.name.clone(),
        subject: format!("Converted document: {}", filename),
        html,
    }
}

fn describe_duration(ttl: Duration) -> String {
    let minutes = ttl.num_minutes();
    match (minutes / 60, minutes % 60) {
        (1, 0) => "1 hour".to_string(),
        (hours, 0) if hours > 1 => format!("{} hours", hours),
        _ => format!("{} minutes", minutes),
    }
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Sends through Microsoft Graph `POST /v1.0/users/{sender}/sendMail`
#[derive(Debug)]
pub struct GraphMailer {
    graph: GraphClient,
    sender: String,
}

impl GraphMailer {
    pub fn new(http: reqwest::Client, config: GraphConfig, sender: impl Into<String>) -> Self {
        Self::from_client(GraphClient::new(http, config), sender)
    }

    pub fn from_client(graph: GraphClient, sender: impl Into<String>) -> Self {
        Self {
            graph,
            sender: sender.into(),
        }
    }
}

#[async_trait]
impl Mailer for GraphMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), GateError> {
        let token = self
            .graph
            .access_token()
            .await
            .map_err(GateError::DeliveryFailed)?;
        let url = self
            .graph
            .url(&["users", self.sender.as_str(), "sendMail"])
            .map_err(GateError::DeliveryFailed)?;

        let payload = json!({
            "message": {
                "subject": message.subject,
                "body": {"contentType": "HTML", "content": message.html},
                "toRecipients": [{
                    "emailAddress": {"address": message.to, "name": message.to_name}
                }]
            },
            "saveToSentItems": false
        });

        let response = self
            .graph
            .http()
            .post(url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GateError::DeliveryFailed(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            info!("Download link sent to {} via Graph", message.to);
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!("Graph sendMail returned {}: {}", status, body);
            Err(GateError::DeliveryFailed(format!("Graph returned {}", status)))
        }
    }
}

/// Resend API request payload
#[derive(Debug, Serialize)]
struct ResendPayload<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

/// Resend API success response
#[derive(Debug, Deserialize)]
struct ResendSuccessResponse {
    id: String,
}

/// Resend API error response
#[derive(Debug, Deserialize)]
struct ResendErrorResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Sends through the Resend REST API
#[derive(Debug)]
pub struct ResendMailer {
    http: reqwest::Client,
    api_key: String,
    from_address: String,
    endpoint: String,
}

impl ResendMailer {
    pub fn new(
        http: reqwest::Client,
        api_key: impl Into<String>,
        from_address: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            from_address: from_address.into(),
            endpoint: RESEND_API_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), GateError> {
        let payload = ResendPayload {
            from: &self.from_address,
            to: [message.to.as_str()],
            subject: &message.subject,
            html: &message.html,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GateError::DeliveryFailed(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::OK {
            match response.json::<ResendSuccessResponse>().await {
                Ok(success) => info!(
                    "Download link sent to {} via Resend: id={}",
                    message.to, success.id
                ),
                // Response parse error but email likely sent
                Err(e) => warn!("Resend response parse error: {}", e),
            }
            return Ok(());
        }

        let error_text = response.text().await.unwrap_or_default();
        let error_message = serde_json::from_str::<ResendErrorResponse>(&error_text)
            .ok()
            .and_then(|err| err.message.or(err.name))
            .unwrap_or_else(|| format!("HTTP {}: {}", status, error_text));
        warn!("Resend error ({}): {}", status, error_message);

        Err(GateError::DeliveryFailed(error_message))
    }
}

/// Writes the message to the log instead of sending it
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), GateError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            "Mail delivery disabled, message not sent:\n{}",
            message.html
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::post;
    use axum::{Json, Router};
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn ana() -> Principal {
        Principal {
            id: "id-ana".to_string(),
            email: "ana@example.com".to_string(),
            name: "Ana <Admin>".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_download_notice_contents() {
        let message = download_notice(
            &ana(),
            "report.pdf",
            "https://files.example.com/download?token=abc&x=1",
            Duration::hours(2),
        );

        assert_eq!(message.to, "ana@example.com");
        assert_eq!(message.subject, "Converted document: report.pdf");
        assert!(message.html.contains("Hello Ana &lt;Admin&gt;"));
        assert!(message
            .html
            .contains("https://files.example.com/download?token=abc&amp;x=1"));
        assert!(message.html.contains("expires in 2 hours"));
    }

    #[test]
    fn test_describe_duration() {
        assert_eq!(describe_duration(Duration::hours(1)), "1 hour");
        assert_eq!(describe_duration(Duration::hours(2)), "2 hours");
        assert_eq!(describe_duration(Duration::minutes(90)), "90 minutes");
    }

    #[tokio::test]
    async fn test_log_mailer_always_succeeds() {
        let message = download_notice(&ana(), "a.pdf", "http://x", Duration::hours(2));
        assert!(LogMailer.send(&message).await.is_ok());
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_resend_mailer_success() {
        let app = Router::new().route(
            "/emails",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let authorized = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    == Some("Bearer re_test");
                if authorized && body["to"][0] == "ana@example.com" {
                    Ok(Json(serde_json::json!({"id": "msg-1"})))
                } else {
                    Err(AxumStatus::UNAUTHORIZED)
                }
            }),
        );
        let base = serve(app).await;

        let mailer = ResendMailer::new(reqwest::Client::new(), "re_test", "noreply@example.com")
            .with_endpoint(format!("{}/emails", base));
        let message = download_notice(&ana(), "a.pdf", "http://x", Duration::hours(2));

        assert!(mailer.send(&message).await.is_ok());
    }

    #[tokio::test]
    async fn test_resend_mailer_error_is_delivery_failure() {
        let app = Router::new().route(
            "/emails",
            post(|| async {
                (
                    AxumStatus::UNPROCESSABLE_ENTITY,
                    Json(serde_json::json!({
                        "name": "validation_error",
                        "message": "Invalid from"
                    })),
                )
            }),
        );
        let base = serve(app).await;

        let mailer = ResendMailer::new(reqwest::Client::new(), "re_test", "bad")
            .with_endpoint(format!("{}/emails", base));
        let message = download_notice(&ana(), "a.pdf", "http://x", Duration::hours(2));

        assert_eq!(
            mailer.send(&message).await.unwrap_err(),
            GateError::DeliveryFailed("Invalid from".to_string())
        );
    }

    #[tokio::test]
    async fn test_graph_mailer_expects_accepted() {
        let app = Router::new()
            .route(
                "/:tenant/oauth2/v2.0/token",
                post(|| async {
                    Json(serde_json::json!({"access_token": "t", "expires_in": 3600}))
                }),
            )
            .route(
                "/v1.0/users/:sender/sendMail",
                post(|Json(body): Json<Value>| async move {
                    if body["message"]["toRecipients"][0]["emailAddress"]["address"]
                        == "ana@example.com"
                    {
                        AxumStatus::ACCEPTED
                    } else {
                        AxumStatus::BAD_REQUEST
                    }
                }),
            );
        let base = serve(app).await;

        let config = GraphConfig {
            tenant_id: "tenant".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
        };
        let mailer = GraphMailer::from_client(
            GraphClient::with_endpoints(reqwest::Client::new(), config, &base, &base),
            "system@example.com",
        );
        let message = download_notice(&ana(), "a.pdf", "http://x", Duration::hours(2));

        assert!(mailer.send(&message).await.is_ok());
    }

    #[tokio::test]
    async fn test_graph_mailer_token_failure_is_delivery_failure() {
        let app = Router::new().route(
            "/:tenant/oauth2/v2.0/token",
            post(|| async { AxumStatus::UNAUTHORIZED }),
        );
        let base = serve(app).await;

        let config = GraphConfig {
            tenant_id: "tenant".to_string(),
            client_id: "client".to_string(),
            client_secret: "wrong".to_string(),
        };
        let mailer = GraphMailer::from_client(
            GraphClient::with_endpoints(reqwest::Client::new(), config, &base, &base),
            "system@example.com",
        );
        let message = download_notice(&ana(), "a.pdf", "http://x", Duration::hours(2));

        assert!(matches!(
            mailer.send(&message).await,
            Err(GateError::DeliveryFailed(_))
        ));
    }
}
