//! HTTP client for the WhatsApp Business provider API

use super::{
    MessageSender, ReportFeed, ReportPage, ReportQuery, SendRequest, SendResponse, WhatsAppError,
};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use wapulse_common::config::WhatsAppConfig;
use wapulse_common::SessionContext;

/// Provider API client implementing both send and report feed
#[derive(Clone)]
pub struct WhatsAppClient {
    api_base: String,
    client: Client,
}

impl WhatsAppClient {
    /// Create a new provider client
    pub fn new(config: &WhatsAppConfig) -> Result<Self, WhatsAppError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| WhatsAppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Build a request with the bearer token from the session context
    fn build_request(
        &self,
        method: reqwest::Method,
        path: &str,
        context: &SessionContext,
    ) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.api_base, path);
        self.client
            .request(method, &url)
            .bearer_auth(&context.access_token)
    }
}

#[async_trait]
impl MessageSender for WhatsAppClient {
    async fn send(
        &self,
        context: &SessionContext,
        request: &SendRequest,
    ) -> Result<SendResponse, WhatsAppError> {
        let response = self
            .build_request(reqwest::Method::POST, "/messages", context)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|e| {
                warn!("Failed to read provider error body: {}", e);
                String::new()
            });
            return Err(WhatsAppError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SendResponse = response
            .json()
            .await
            .map_err(|e| WhatsAppError::Malformed(e.to_string()))?;

        debug!(
            recipient = %request.recipient,
            success = parsed.success,
            "Provider accepted send request"
        );

        Ok(parsed)
    }
}

#[async_trait]
impl ReportFeed for WhatsAppClient {
    async fn fetch_reports(
        &self,
        context: &SessionContext,
        query: &ReportQuery,
    ) -> Result<ReportPage, WhatsAppError> {
        let response = self
            .build_request(reqwest::Method::GET, "/reports", context)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WhatsAppError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let page: ReportPage = response
            .json()
            .await
            .map_err(|e| WhatsAppError::Malformed(e.to_string()))?;

        debug!(
            records = page.records.len(),
            has_more = page.next_cursor.is_some(),
            "Fetched report page"
        );

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> WhatsAppClient {
        let config = WhatsAppConfig {
            api_base: server.uri(),
            ..WhatsAppConfig::default()
        };
        WhatsAppClient::new(&config).unwrap()
    }

    fn context() -> SessionContext {
        SessionContext::new("acct-1", "tok-1")
    }

    fn request() -> SendRequest {
        SendRequest {
            recipient: "+15550001".into(),
            rendered_body: "Hello Ada".into(),
            message_type: "template".into(),
            template_name: "welcome".into(),
            campaign_id: uuid::Uuid::nil(),
            media: Some("media-7".into()),
        }
    }

    #[tokio::test]
    async fn test_send_posts_rendered_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("authorization", "Bearer tok-1"))
            .and(body_partial_json(serde_json::json!({
                "recipient": "+15550001",
                "renderedBody": "Hello Ada",
                "templateName": "welcome",
                "media": "media-7"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client_for(&server).send(&context(), &request()).await.unwrap();
        assert_eq!(
            response,
            SendResponse {
                success: true,
                error: None
            }
        );
    }

    #[tokio::test]
    async fn test_send_surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .send(&context(), &request())
            .await
            .unwrap_err();
        match err {
            WhatsAppError::Status { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_reports_sends_query_and_parses_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reports"))
            .and(query_param("ownerId", "acct-1"))
            .and(query_param("pageSize", "50"))
            .and(query_param("fromTime", "1000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "records": [{
                    "msgId": "wamid.1",
                    "recipient": "+1",
                    "status": "SENT",
                    "msgType": "template",
                    "submitTime": 1500,
                    "deliveryTime": 0,
                    "readTime": 0
                }],
                "total": 1
            })))
            .mount(&server)
            .await;

        let query = ReportQuery {
            owner_id: "acct-1".into(),
            from_time: 1000,
            to_time: 2000,
            recipient_filter: None,
            page_size: 50,
            cursor: None,
        };
        let page = client_for(&server)
            .fetch_reports(&context(), &query)
            .await
            .unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].msg_id, "wamid.1");
        assert_eq!(page.next_cursor, None);
    }

    #[tokio::test]
    async fn test_fetch_reports_malformed_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reports"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let query = ReportQuery {
            owner_id: "acct-1".into(),
            from_time: 0,
            to_time: 1,
            recipient_filter: None,
            page_size: 10,
            cursor: None,
        };
        let err = client_for(&server)
            .fetch_reports(&context(), &query)
            .await
            .unwrap_err();
        assert!(matches!(err, WhatsAppError::Malformed(_)));
    }
}
