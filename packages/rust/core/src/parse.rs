//! Client for the external document-parse service.
//!
//! Uploads a policy PDF as multipart form data and returns the HTML rendering
//! the page reconstructor walks. The call is slow for long documents, so it
//! runs under a [`with_heartbeat`] ticker.

use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, instrument};
use url::Url;

use policytag_shared::{PolicyTagError, Result, UpstageConfig, truncate_chars};

use crate::heartbeat::{log_tick, with_heartbeat};

const USER_AGENT: &str = concat!("policytag/", env!("CARGO_PKG_VERSION"));

/// Output of one parse call.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// HTML rendering of the whole document.
    pub html: String,
    /// Service-reported fields other than content (api, model, usage, ...).
    pub source: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    content: ParseContent,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ParseContent {
    #[serde(default)]
    html: String,
}

/// Document-parse client.
#[derive(Debug, Clone)]
pub struct DocumentParser {
    http: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    heartbeat: Duration,
}

impl DocumentParser {
    pub fn new(config: &UpstageConfig, api_key: String) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.parse_timeout_secs))
            .build()
            .map_err(|e| PolicyTagError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: config.endpoint("document-digitization")?,
            api_key,
            model: config.parse_model.clone(),
            heartbeat: Duration::from_secs(config.heartbeat_secs),
        })
    }

    /// Read `path` and parse it.
    pub async fn parse_file(&self, path: &Path) -> Result<ParsedDocument> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PolicyTagError::io(path, e))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document.pdf")
            .to_string();
        self.parse_bytes(&file_name, bytes).await
    }

    /// Upload `bytes` as `file_name` and return the HTML rendering.
    pub async fn parse_bytes(&self, file_name: &str, bytes: Vec<u8>) -> Result<ParsedDocument> {
        self.upload(file_name, bytes, log_tick("document parse")).await
    }

    /// The heartbeat covers the whole exchange, body read included.
    #[instrument(skip_all, fields(file_name = %file_name, bytes = bytes.len()))]
    async fn upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        on_tick: impl Fn(Duration) + Send + 'static,
    ) -> Result<ParsedDocument> {
        info!(model = %self.model, "uploading document for parsing");

        let form = Form::new()
            .text("model", self.model.clone())
            .text("output_formats", r#"["html"]"#)
            .part("document", Part::bytes(bytes).file_name(file_name.to_string()));

        let exchange = async {
            let response = self
                .http
                .post(self.endpoint.clone())
                .bearer_auth(&self.api_key)
                .multipart(form)
                .send()
                .await
                .map_err(|e| {
                    PolicyTagError::Network(format!("document parse request failed: {e}"))
                })?;

            let status = response.status();
            let body = response.text().await.map_err(|e| {
                PolicyTagError::Network(format!("failed to read parse response: {e}"))
            })?;
            Ok::<_, PolicyTagError>((status, body))
        };

        let (status, body) = with_heartbeat(self.heartbeat, on_tick, exchange).await?;

        if !status.is_success() {
            return Err(PolicyTagError::Network(format!(
                "document parse returned HTTP {status}: {}",
                truncate_chars(&body, 200)
            )));
        }

        let parsed: ParseResponse = serde_json::from_str(&body)
            .map_err(|e| PolicyTagError::parse(format!("invalid document parse response: {e}")))?;

        let mut source = parsed.rest;
        source.remove("elements");
        source.insert("file_name".into(), Value::from(file_name));

        info!(chars = parsed.content.html.len(), "document parsed");

        Ok(ParsedDocument {
            html: parsed.content.html,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_for(server: &wiremock::MockServer) -> UpstageConfig {
        UpstageConfig {
            base_url: server.uri(),
            heartbeat_secs: 1,
            ..UpstageConfig::default()
        }
    }

    #[tokio::test]
    async fn uploads_and_returns_html() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/document-digitization"))
            .and(wiremock::matchers::header("authorization", "Bearer parse-key"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "api": "2.0",
                "model": "document-parse-250116",
                "usage": { "pages": 2 },
                "content": { "html": "<p id='0'>제1조</p><footer id='1'>1</footer>", "markdown": "", "text": "" },
                "elements": [{ "id": 0 }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let parser = DocumentParser::new(&config_for(&server), "parse-key".into()).unwrap();
        let doc = parser
            .parse_bytes("meritz_1_x.pdf", b"%PDF-1.7".to_vec())
            .await
            .unwrap();

        assert!(doc.html.contains("<footer id='1'>1</footer>"));
        assert_eq!(doc.source["model"], "document-parse-250116");
        assert_eq!(doc.source["usage"]["pages"], 2);
        assert_eq!(doc.source["file_name"], "meritz_1_x.pdf");
        assert!(!doc.source.contains_key("elements"));
        assert!(!doc.source.contains_key("content"));
    }

    #[tokio::test]
    async fn heartbeat_ticks_until_slow_response_is_read() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(json!({ "content": { "html": "<p>느린 응답</p>" } }))
                    .set_delay(Duration::from_millis(2500)),
            )
            .mount(&server)
            .await;

        let ticks = Arc::new(AtomicUsize::new(0));
        let seen = ticks.clone();
        let parser = DocumentParser::new(&config_for(&server), "k".into()).unwrap();
        let doc = parser
            .upload("meritz_1_slow.pdf", b"%PDF-1.7".to_vec(), move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert_eq!(doc.html, "<p>느린 응답</p>");
        assert!(ticks.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn http_error_is_network_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let parser = DocumentParser::new(&config_for(&server), "bad".into()).unwrap();
        let err = parser.parse_bytes("a.pdf", vec![1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, PolicyTagError::Network(ref m) if m.contains("401")));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let parser = DocumentParser::new(&UpstageConfig::default(), "k".into()).unwrap();
        let err = parser
            .parse_file(Path::new("/nonexistent/policytag/meritz_1_x.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyTagError::Io { .. }));
    }
}
