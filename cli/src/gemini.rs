use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, instrument};

use nutriscan_core::estimate::{
    EstimateRequest, EstimationError, NutritionEstimator, response_schema,
};

pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

// --- Wire types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

// --- Client ---

/// Estimates nutrition with Google Gemini's `generateContent` endpoint using
/// structured JSON output.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, EstimationError> {
        let client = Client::builder()
            .user_agent(format!(
                "nutriscan/{} (food log)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| EstimationError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_API_BASE.to_string(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn build_request(request: &EstimateRequest) -> GenerateContentRequest {
        let parts = match request {
            EstimateRequest::Text { prompt } => vec![Part::Text {
                text: prompt.clone(),
            }],
            EstimateRequest::Image { image, instruction } => vec![
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: image.mime_type.clone(),
                        data: image.to_base64(),
                    },
                },
                Part::Text {
                    text: (*instruction).to_string(),
                },
            ],
        };

        GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts,
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: response_schema(),
            },
        }
    }

    /// Concatenated text of the first candidate, skipping thought parts.
    /// Empty when the model produced no text.
    fn extract_text(response: &GenerateContentResponse) -> String {
        response
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter(|p| !p.thought)
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    fn map_api_error(status: u16, body: &str) -> EstimationError {
        let message = serde_json::from_str::<GenerateContentResponse>(body)
            .ok()
            .and_then(|r| r.error)
            .map_or_else(|| body.trim().to_string(), |e| e.message);
        EstimationError::Service { status, message }
    }
}

#[async_trait]
impl NutritionEstimator for GeminiClient {
    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn estimate(&self, request: &EstimateRequest) -> Result<String, EstimationError> {
        let body = Self::build_request(request);
        debug!(mode = ?request.mode(), "sending estimate request");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EstimationError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| EstimationError::Transport(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            error!(%status, "estimation service error");
            return Err(Self::map_api_error(status.as_u16(), &text));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text).map_err(|e| {
            error!(error = %e, "failed to parse estimation response");
            EstimationError::MalformedResponse(e.to_string())
        })?;

        if let Some(err) = parsed.error {
            return Err(EstimationError::Service {
                status: status.as_u16(),
                message: err.message,
            });
        }

        let output = Self::extract_text(&parsed);
        debug!(bytes = output.len(), "received estimate");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::extract::Path as UrlPath;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;

    use nutriscan_core::estimate::{
        EstimationGateway, IMAGE_INSTRUCTION, ImagePayload, text_prompt,
    };

    #[derive(Debug, Clone)]
    struct Seen {
        path: String,
        api_key: Option<String>,
        body: Value,
    }

    /// Local stand-in for the generateContent endpoint.
    async fn fake_gemini(status: StatusCode, reply: Value) -> (String, Arc<Mutex<Vec<Seen>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let app = Router::new().route(
            "/models/{action}",
            post(
                move |UrlPath(action): UrlPath<String>,
                      headers: HeaderMap,
                      Json(body): Json<Value>| async move {
                    recorder.lock().unwrap().push(Seen {
                        path: action,
                        api_key: headers
                            .get("x-goog-api-key")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string),
                        body,
                    });
                    (status, Json(reply))
                },
            ),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), seen)
    }

    fn client(base: &str) -> GeminiClient {
        GeminiClient::new("test-key", "gemini-test")
            .unwrap()
            .with_base_url(base)
    }

    fn candidate(text: &str) -> Value {
        json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": text}]},
                "finishReason": "STOP"
            }]
        })
    }

    #[test]
    fn test_build_text_request() {
        let request = EstimateRequest::Text {
            prompt: text_prompt("apple"),
        };
        let body = serde_json::to_value(GeminiClient::build_request(&request)).unwrap();
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], text_prompt("apple"));
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "OBJECT");
    }

    #[test]
    fn test_build_image_request() {
        let request = EstimateRequest::Image {
            image: ImagePayload::new(vec![1, 2, 3], "image/png"),
            instruction: IMAGE_INSTRUCTION,
        };
        let body = serde_json::to_value(GeminiClient::build_request(&request)).unwrap();
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[0]["inlineData"]["data"], "AQID");
        assert_eq!(parts[1]["text"], IMAGE_INSTRUCTION);
    }

    #[test]
    fn test_extract_text_joins_parts_and_skips_thoughts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "thinking...", "thought": true},
                    {"text": "{\"name\":"},
                    {"text": "\"Apple\"}"}
                ]}
            }]
        }))
        .unwrap();
        assert_eq!(GeminiClient::extract_text(&response), r#"{"name":"Apple"}"#);
    }

    #[test]
    fn test_extract_text_without_candidates() {
        let response: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(GeminiClient::extract_text(&response), "");
    }

    #[test]
    fn test_map_api_error_reads_message() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        match GeminiClient::map_api_error(400, body) {
            EstimationError::Service { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "API key not valid");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        match GeminiClient::map_api_error(502, "Bad Gateway\n") {
            EstimationError::Service { message, .. } => assert_eq!(message, "Bad Gateway"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_endpoint() {
        let c = client("http://localhost:9/v1beta/");
        assert_eq!(
            c.endpoint(),
            "http://localhost:9/v1beta/models/gemini-test:generateContent"
        );
    }

    #[tokio::test]
    async fn test_estimate_round_trip_through_gateway() {
        let (base, seen) = fake_gemini(
            StatusCode::OK,
            candidate(r#"{"name":"Apple","calories":95,"protein":0.5,"carbs":25,"fat":0.3,"servingSize":"1 medium"}"#),
        )
        .await;
        let gateway = EstimationGateway::new(client(&base));
        let record = gateway.estimate_from_text("an apple").await.unwrap();

        assert_eq!(record.name, "Apple");
        assert_eq!(record.calories, 95.0);
        assert_eq!(record.fiber, 0.0);
        assert_eq!(record.serving_size, "1 medium");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].path, "gemini-test:generateContent");
        assert_eq!(seen[0].api_key.as_deref(), Some("test-key"));
        assert_eq!(
            seen[0].body["contents"][0]["parts"][0]["text"],
            text_prompt("an apple")
        );
    }

    #[tokio::test]
    async fn test_estimate_image_sends_inline_data() {
        let (base, seen) = fake_gemini(StatusCode::OK, candidate(r#"{"name":"Salad"}"#)).await;
        let gateway = EstimationGateway::new(client(&base));
        let record = gateway
            .estimate_from_image(vec![0xff, 0xd8, 0xff], "image/jpeg")
            .await
            .unwrap();

        assert_eq!(record.name, "Salad");
        assert_eq!(record.image.as_deref(), Some("data:image/jpeg;base64,/9j/"));
        let seen = seen.lock().unwrap();
        assert_eq!(
            seen[0].body["contents"][0]["parts"][0]["inlineData"]["data"],
            "/9j/"
        );
    }

    #[tokio::test]
    async fn test_estimate_error_status() {
        let (base, _) = fake_gemini(
            StatusCode::TOO_MANY_REQUESTS,
            json!({"error": {"code": 429, "message": "Resource has been exhausted"}}),
        )
        .await;
        let err = client(&base)
            .estimate(&EstimateRequest::Text {
                prompt: "x".to_string(),
            })
            .await
            .unwrap_err();
        match err {
            EstimationError::Service { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "Resource has been exhausted");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_estimate_without_candidates_yields_default_record() {
        let (base, _) = fake_gemini(StatusCode::OK, json!({"candidates": []})).await;
        let gateway = EstimationGateway::new(client(&base));
        let record = gateway.estimate_from_text("???").await.unwrap();
        assert_eq!(record.name, "Unknown Food");
        assert_eq!(record.calories, 0.0);
    }

    #[tokio::test]
    async fn test_estimate_non_json_output_fails() {
        let (base, _) = fake_gemini(StatusCode::OK, candidate("I cannot help with that")).await;
        let gateway = EstimationGateway::new(client(&base));
        let err = gateway.estimate_from_text("pizza").await.unwrap_err();
        assert!(matches!(err, EstimationError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_estimate_unreachable_service() {
        // Nothing listens on port 9 locally
        let err = client("http://127.0.0.1:9")
            .estimate(&EstimateRequest::Text {
                prompt: "x".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EstimationError::Transport(_)));
    }
}
