//! Stage 2: structured-output LLM classifier.
//!
//! The tagger talks to the classifier through the [`Classifier`] trait. The
//! production implementation, [`SolarClassifier`], posts to an
//! OpenAI-compatible `chat/completions` endpoint with a strict JSON schema
//! response format. Whatever comes back is decoded into a [`RawTag`] of plain
//! strings and only turned into a [`Tag`] through [`RawTag::into_tag`], which
//! coerces anything outside the closed label sets.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use policytag_shared::{
    ClauseType, LabelSet, MAX_NOTE_CHARS, PolicyTagError, RiskDomain, Tag, TagMethod,
    UpstageConfig, normalize_domains, truncate_chars,
};

use super::validate::clamp_confidence;

/// User-Agent string for classifier requests.
const USER_AGENT: &str = concat!("policytag/", env!("CARGO_PKG_VERSION"));

/// Longest response body echoed into an error.
const MAX_ERROR_BODY_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A single failed classifier call. Always recovered by the tagger.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("classifier request timed out")]
    Timeout,

    #[error("classifier transport error: {0}")]
    Transport(String),

    #[error("classifier returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("malformed classifier response: {0}")]
    MalformedResponse(String),
}

impl ClassifierError {
    /// Stable failure category recorded in fallback notes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Transport(_) => "transport",
            Self::HttpStatus { .. } => "http_status",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }
}

impl From<reqwest::Error> for ClassifierError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::MalformedResponse(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// RawTag
// ---------------------------------------------------------------------------

/// Classifier output before validation: open strings, unchecked ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTag {
    pub clause_type: String,
    #[serde(default)]
    pub risk_domains: Vec<String>,
    pub confidence: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl RawTag {
    /// Decode into a [`Tag`] with `method = llm`.
    ///
    /// Unknown or disallowed clause types and unknown domains become `other`,
    /// confidence is clamped into `[0, 1]`, and notes are capped in length.
    pub fn into_tag(self, label_set: LabelSet) -> Tag {
        let clause_type = ClauseType::from_label(&self.clause_type)
            .filter(|c| label_set.allows(*c))
            .unwrap_or(ClauseType::Other);

        let risk_domains = normalize_domains(
            self.risk_domains
                .iter()
                .map(|d| RiskDomain::from_label(d).unwrap_or(RiskDomain::Other))
                .collect(),
        );

        let note = self
            .notes
            .map(|n| truncate_chars(n.trim(), MAX_NOTE_CHARS))
            .filter(|n| !n.is_empty());

        Tag {
            clause_type,
            risk_domains,
            confidence: clamp_confidence(self.confidence),
            method: TagMethod::Llm,
            note,
        }
    }
}

// ---------------------------------------------------------------------------
// Classifier trait
// ---------------------------------------------------------------------------

/// Anything that can classify one chunk of policy text.
pub trait Classifier {
    fn classify(
        &self,
        text: &str,
        label_set: LabelSet,
    ) -> impl Future<Output = Result<RawTag, ClassifierError>> + Send;
}

// ---------------------------------------------------------------------------
// Prompt and schema
// ---------------------------------------------------------------------------

fn label_list<T: Copy>(labels: &[T], as_str: fn(&T) -> &'static str) -> Vec<&'static str> {
    labels.iter().map(as_str).collect()
}

/// System instructions naming the closed label sets.
pub fn system_prompt(label_set: LabelSet) -> String {
    let clause = label_list(label_set.clause_types(), ClauseType::as_str).join(", ");
    let domains = label_list(&RiskDomain::ALL, RiskDomain::as_str).join(", ");
    format!(
        "너는 보험 약관 문서 청크를 분류(tagging)하는 분류기야.\n\
         아래 라벨 셋으로만 분류해.\n\
         - clause_type: {clause}\n\
         - risk_domains: {domains}\n\
         반드시 JSON schema에 맞는 JSON만 출력해."
    )
}

/// User message: labeling criteria followed by the chunk text.
pub fn user_prompt(text: &str, label_set: LabelSet) -> String {
    let criteria = match label_set {
        LabelSet::Basic => {
            "- exclusion: 보상하지 않음/지급하지 않음/면책/제외/부지급\n\
             - coverage: 보장 범위/지급 사유/보험금 지급/보상\n\
             - other: 위 두 가지에 명확히 해당하지 않는 내용\n"
        }
        LabelSet::Extended => {
            "- exclusion: 보상하지 않음/지급하지 않음/면책/제외\n\
             - waiting: 대기기간/면책기간/경과 N일\n\
             - deductible: 자기부담/본인부담/공제금\n\
             - limit: 한도/최대/연간한도/1회한도\n\
             - coverage: 지급 사유/보장/보험금 지급\n\
             - claim: 청구 절차/서류/접수\n\
             - definition: 용어 정의\n\
             - renewal: 갱신/재가입\n"
        }
    };
    format!(
        "다음 텍스트 청크를 라벨링해줘.\n분류 기준:\n{criteria}\
         risk_domains는 텍스트에 명시된 신체/질환 영역을 추정해.\n\nTEXT:\n{text}"
    )
}

/// Strict JSON schema the response must satisfy.
pub fn response_schema(label_set: LabelSet) -> Value {
    let clause = label_list(label_set.clause_types(), ClauseType::as_str);
    let domains = label_list(&RiskDomain::ALL, RiskDomain::as_str);
    json!({
        "name": "ChunkTag",
        "strict": true,
        "schema": {
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "clause_type": { "type": "string", "enum": clause },
                "risk_domains": {
                    "type": "array",
                    "items": { "type": "string", "enum": domains },
                    "minItems": 1
                },
                "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
                "notes": { "type": ["string", "null"], "maxLength": MAX_NOTE_CHARS }
            },
            "required": ["clause_type", "risk_domains", "confidence", "notes"]
        }
    })
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// SolarClassifier
// ---------------------------------------------------------------------------

/// Classifier backed by the Upstage Solar chat API.
#[derive(Debug, Clone)]
pub struct SolarClassifier {
    http: Client,
    endpoint: Url,
    api_key: String,
    model: String,
}

impl SolarClassifier {
    /// Build a client with the configured per-request timeout.
    pub fn new(config: &UpstageConfig, api_key: String) -> policytag_shared::Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PolicyTagError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: config.endpoint("chat/completions")?,
            api_key,
            model: config.chat_model.clone(),
        })
    }

    async fn request(&self, text: &str, label_set: LabelSet) -> Result<RawTag, ClassifierError> {
        let request = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt(label_set),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt(text, label_set),
                },
            ],
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: response_schema(label_set),
            },
        };

        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ClassifierError::HttpStatus {
                status: status.as_u16(),
                body: truncate_chars(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        let chat: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| ClassifierError::MalformedResponse(format!("envelope: {e}")))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ClassifierError::MalformedResponse("no message content".into()))?;

        debug!(chars = content.len(), "classifier responded");

        serde_json::from_str(&content)
            .map_err(|e| ClassifierError::MalformedResponse(format!("tag payload: {e}")))
    }
}

impl Classifier for SolarClassifier {
    fn classify(
        &self,
        text: &str,
        label_set: LabelSet,
    ) -> impl Future<Output = Result<RawTag, ClassifierError>> + Send {
        self.request(text, label_set)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(server: &wiremock::MockServer, timeout_secs: u64) -> UpstageConfig {
        UpstageConfig {
            base_url: server.uri(),
            timeout_secs,
            ..UpstageConfig::default()
        }
    }

    fn chat_body(content: &str) -> Value {
        json!({
            "id": "chatcmpl-1",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        })
    }

    #[test]
    fn raw_tag_coerces_unknown_labels() {
        let raw = RawTag {
            clause_type: "deductible".into(),
            risk_domains: vec!["joint".into(), "heart".into(), "joint".into()],
            confidence: 1.4,
            notes: Some("  ".into()),
        };
        let tag = raw.into_tag(LabelSet::Basic);
        assert_eq!(tag.clause_type, ClauseType::Other);
        assert_eq!(tag.risk_domains, vec![RiskDomain::Joint, RiskDomain::Other]);
        assert_eq!(tag.confidence, 1.0);
        assert_eq!(tag.method, TagMethod::Llm);
        assert!(tag.note.is_none());
    }

    #[test]
    fn raw_tag_keeps_allowed_extended_label() {
        let raw = RawTag {
            clause_type: "deductible".into(),
            risk_domains: vec![],
            confidence: 0.9,
            notes: Some("x".repeat(500)),
        };
        let tag = raw.into_tag(LabelSet::Extended);
        assert_eq!(tag.clause_type, ClauseType::Deductible);
        assert_eq!(tag.risk_domains, vec![RiskDomain::Other]);
        assert_eq!(tag.note.unwrap().chars().count(), MAX_NOTE_CHARS);
    }

    #[test]
    fn schema_enumerates_active_labels() {
        let schema = response_schema(LabelSet::Basic);
        let clause = &schema["schema"]["properties"]["clause_type"]["enum"];
        assert_eq!(clause, &json!(["coverage", "exclusion", "other"]));
        assert_eq!(schema["schema"]["properties"]["risk_domains"]["minItems"], 1);

        let schema = response_schema(LabelSet::Extended);
        assert_eq!(
            schema["schema"]["properties"]["clause_type"]["enum"]
                .as_array()
                .unwrap()
                .len(),
            9
        );
    }

    #[test]
    fn prompts_carry_labels_and_text() {
        assert!(system_prompt(LabelSet::Extended).contains("waiting"));
        assert!(!system_prompt(LabelSet::Basic).contains("waiting"));
        let user = user_prompt("제3조 보험금 지급", LabelSet::Basic);
        assert!(user.ends_with("TEXT:\n제3조 보험금 지급"));
    }

    #[test]
    fn failure_categories_are_stable() {
        assert_eq!(ClassifierError::Timeout.category(), "timeout");
        assert_eq!(
            ClassifierError::HttpStatus { status: 502, body: String::new() }.category(),
            "http_status"
        );
        assert_eq!(
            ClassifierError::MalformedResponse("x".into()).category(),
            "malformed_response"
        );
    }

    #[tokio::test]
    async fn classifies_against_mock_server() {
        let server = wiremock::MockServer::start().await;

        let payload = r#"{"clause_type":"exclusion","risk_domains":["joint"],"confidence":0.92,"notes":"면책 조항"}"#;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/chat/completions"))
            .and(wiremock::matchers::header("authorization", "Bearer test-key"))
            .and(wiremock::matchers::body_partial_json(json!({
                "model": "solar-pro2",
                "temperature": 0.0,
                "response_format": { "type": "json_schema" }
            })))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(chat_body(payload)))
            .expect(1)
            .mount(&server)
            .await;

        let client = SolarClassifier::new(&config_for(&server, 5), "test-key".into()).unwrap();
        let raw = client
            .classify("보상하지 않는 사항: 슬개골 탈구", LabelSet::Basic)
            .await
            .unwrap();

        assert_eq!(raw.clause_type, "exclusion");
        assert_eq!(raw.risk_domains, vec!["joint".to_string()]);
        assert_eq!(raw.notes.as_deref(), Some("면책 조항"));
    }

    #[tokio::test]
    async fn http_error_is_reported() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = SolarClassifier::new(&config_for(&server, 5), "k".into()).unwrap();
        let err = client.classify("text", LabelSet::Basic).await.unwrap_err();
        match err {
            ClassifierError::HttpStatus { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_content_is_malformed() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_json(chat_body("coverage, I think")),
            )
            .mount(&server)
            .await;

        let client = SolarClassifier::new(&config_for(&server, 5), "k".into()).unwrap();
        let err = client.classify("text", LabelSet::Basic).await.unwrap_err();
        assert_eq!(err.category(), "malformed_response");
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(chat_body("{}"))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let client = SolarClassifier::new(&config_for(&server, 1), "k".into()).unwrap();
        let err = client.classify("text", LabelSet::Basic).await.unwrap_err();
        assert!(matches!(err, ClassifierError::Timeout));
    }
}
