use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{DEFAULT_FOOD_NAME, DEFAULT_SERVING_SIZE, Nutrient, NutritionRecord};

pub const IMAGE_INSTRUCTION: &str =
    "Identify the food in this image and provide its estimated nutritional content per serving.";

pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

#[must_use]
pub fn text_prompt(description: &str) -> String {
    format!(
        "Analyze the nutritional content of this food: \"{description}\". Provide estimates for standard portions if not specified."
    )
}

/// Structured-output schema, in the AI service's schema dialect.
#[must_use]
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "name": { "type": "STRING", "description": "The name of the food item identified." },
            "calories": { "type": "NUMBER", "description": "Estimated calories per serving." },
            "protein": { "type": "NUMBER", "description": "Estimated protein in grams." },
            "carbs": { "type": "NUMBER", "description": "Estimated carbohydrates in grams." },
            "fat": { "type": "NUMBER", "description": "Estimated fat in grams." },
            "fiber": { "type": "NUMBER", "description": "Estimated fiber in grams." },
            "sugar": { "type": "NUMBER", "description": "Estimated sugar in grams." },
            "servingSize": {
                "type": "STRING",
                "description": "The serving size used for the estimate (e.g., 100g, 1 piece)."
            },
            "additionalNutrients": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": { "type": "STRING" },
                        "amount": { "type": "STRING" }
                    },
                    "required": ["name", "amount"]
                }
            }
        },
        "required": ["name", "calories", "protein", "carbs", "fat", "servingSize"]
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Text,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImagePayload {
    /// A blank mime type is taken to mean JPEG.
    #[must_use]
    pub fn new(bytes: Vec<u8>, mime_type: &str) -> Self {
        let mime_type = mime_type.trim();
        let mime_type = if mime_type.is_empty() {
            DEFAULT_IMAGE_MIME
        } else {
            mime_type
        };
        Self {
            bytes,
            mime_type: mime_type.to_string(),
        }
    }

    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Self-contained `data:` URL suitable for embedding.
    #[must_use]
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EstimateRequest {
    Text {
        prompt: String,
    },
    Image {
        image: ImagePayload,
        instruction: &'static str,
    },
}

impl EstimateRequest {
    #[must_use]
    pub fn mode(&self) -> InputMode {
        match self {
            EstimateRequest::Text { .. } => InputMode::Text,
            EstimateRequest::Image { .. } => InputMode::Image,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EstimationError {
    #[error("nothing to estimate: input is empty")]
    EmptyInput,
    #[error("estimation service is not configured: {0}")]
    NotConfigured(String),
    #[error("estimation request failed: {0}")]
    Transport(String),
    #[error("estimation service returned {status}: {message}")]
    Service { status: u16, message: String },
    #[error("estimation response could not be parsed: {0}")]
    MalformedResponse(String),
}

impl EstimationError {
    /// Generic retry prompt shown to the user; details go to the log.
    #[must_use]
    pub fn user_message(&self, mode: InputMode) -> &'static str {
        match self {
            EstimationError::EmptyInput => "Nothing to analyze.",
            EstimationError::NotConfigured(_) => {
                "No AI service configured. Set GEMINI_API_KEY and try again."
            }
            _ => match mode {
                InputMode::Text => "Failed to analyze food. Please try again.",
                InputMode::Image => {
                    "Failed to recognize food from image. Please ensure the photo is clear."
                }
            },
        }
    }
}

/// The external AI service. Implementations send the request and return the
/// model's structured output as raw text, without interpreting it.
#[async_trait]
pub trait NutritionEstimator: Send + Sync {
    async fn estimate(&self, request: &EstimateRequest) -> Result<String, EstimationError>;
}

/// An estimate after coercion, before it is stamped into a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedEstimate {
    pub name: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
    pub sugar: f64,
    pub serving_size: String,
    pub additional_nutrients: Vec<Nutrient>,
}

impl SanitizedEstimate {
    #[must_use]
    pub fn into_record(
        self,
        id: String,
        timestamp: i64,
        image: Option<String>,
    ) -> NutritionRecord {
        NutritionRecord {
            id,
            name: self.name,
            calories: self.calories,
            protein: self.protein,
            carbs: self.carbs,
            fat: self.fat,
            fiber: self.fiber,
            sugar: self.sugar,
            serving_size: self.serving_size,
            additional_nutrients: self.additional_nutrients,
            timestamp,
            image,
        }
    }
}

/// Coerce any JSON value into a complete estimate. Never fails: every field
/// that is missing or unusable takes its default.
#[must_use]
pub fn sanitize(data: &Value) -> SanitizedEstimate {
    SanitizedEstimate {
        name: text_or(data.get("name"), DEFAULT_FOOD_NAME),
        calories: quantity(data.get("calories")),
        protein: quantity(data.get("protein")),
        carbs: quantity(data.get("carbs")),
        fat: quantity(data.get("fat")),
        fiber: quantity(data.get("fiber")),
        sugar: quantity(data.get("sugar")),
        serving_size: text_or(data.get("servingSize"), DEFAULT_SERVING_SIZE),
        additional_nutrients: nutrients(data.get("additionalNutrients")),
    }
}

/// Numeric coercion: numbers, numeric strings and booleans convert; anything
/// else, and any non-finite result, is 0.
#[must_use]
pub fn coerce_number(v: &Value) -> f64 {
    let n = match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => 0.0,
    };
    if n.is_finite() { n } else { 0.0 }
}

fn quantity(v: Option<&Value>) -> f64 {
    v.map_or(0.0, coerce_number).max(0.0)
}

fn text_or(v: Option<&Value>, default: &str) -> String {
    match v.and_then(Value::as_str).map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => default.to_string(),
    }
}

fn nutrients(v: Option<&Value>) -> Vec<Nutrient> {
    let Some(items) = v.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let name = item.get("name")?.as_str()?.trim();
            if name.is_empty() {
                return None;
            }
            let amount = match item.get("amount")? {
                Value::String(s) => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some(Nutrient {
                name: name.to_string(),
                amount,
            })
        })
        .collect()
}

/// Parse the model's output text. Empty output counts as an empty object;
/// output that is not JSON at all is an upstream failure.
pub fn parse_output(text: &str) -> Result<Value, EstimationError> {
    let text = text.trim();
    if text.is_empty() {
        warn!("estimation service returned no output, using defaults");
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(text).map_err(|e| EstimationError::MalformedResponse(e.to_string()))
}

/// Turns a food description or photo into a [`NutritionRecord`]: sends the
/// fixed instruction and schema through the estimator, coerces whatever comes
/// back into a well-formed record, then stamps it with an id and time.
pub struct EstimationGateway<E> {
    estimator: E,
}

impl<E: NutritionEstimator> EstimationGateway<E> {
    pub fn new(estimator: E) -> Self {
        Self { estimator }
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub async fn estimate_from_text(
        &self,
        description: &str,
    ) -> Result<NutritionRecord, EstimationError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(EstimationError::EmptyInput);
        }
        let request = EstimateRequest::Text {
            prompt: text_prompt(description),
        };
        let estimate = self.run(&request).await?;
        Ok(stamp(estimate, None))
    }

    pub async fn estimate_from_image(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<NutritionRecord, EstimationError> {
        if bytes.is_empty() {
            return Err(EstimationError::EmptyInput);
        }
        let image = ImagePayload::new(bytes, mime_type);
        let data_url = image.to_data_url();
        let request = EstimateRequest::Image {
            image,
            instruction: IMAGE_INSTRUCTION,
        };
        let estimate = self.run(&request).await?;
        Ok(stamp(estimate, Some(data_url)))
    }

    async fn run(&self, request: &EstimateRequest) -> Result<SanitizedEstimate, EstimationError> {
        let text = self.estimator.estimate(request).await?;
        let data = parse_output(&text)?;
        let estimate = sanitize(&data);
        debug!(name = %estimate.name, calories = estimate.calories, "estimate sanitized");
        Ok(estimate)
    }
}

/// Fresh id and the current time, taken once the estimate is in hand.
fn stamp(estimate: SanitizedEstimate, image: Option<String>) -> NutritionRecord {
    estimate.into_record(
        Uuid::new_v4().to_string(),
        Utc::now().timestamp_millis(),
        image,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeEstimator {
        reply: Result<String, u16>,
        seen: Mutex<Vec<EstimateRequest>>,
    }

    impl FakeEstimator {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                reply: Err(status),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl NutritionEstimator for FakeEstimator {
        async fn estimate(&self, request: &EstimateRequest) -> Result<String, EstimationError> {
            self.seen.lock().unwrap().push(request.clone());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(EstimationError::Service {
                    status: *status,
                    message: "upstream down".to_string(),
                }),
            }
        }
    }

    const PIZZA: &str = r#"{"name":"Pizza slice","calories":285,"protein":12,"carbs":36,
        "fat":10.4,"fiber":2.5,"sugar":3.8,"servingSize":"1 slice (107g)",
        "additionalNutrients":[{"name":"Sodium","amount":"640mg"},{"name":"Calcium","amount":"188mg"}]}"#;

    #[test]
    fn test_sanitize_complete_response() {
        let data: Value = serde_json::from_str(PIZZA).unwrap();
        let s = sanitize(&data);
        assert_eq!(s.name, "Pizza slice");
        assert_eq!(s.calories, 285.0);
        assert_eq!(s.fat, 10.4);
        assert_eq!(s.serving_size, "1 slice (107g)");
        assert_eq!(s.additional_nutrients.len(), 2);
        assert_eq!(s.additional_nutrients[0].name, "Sodium");
    }

    #[test]
    fn test_sanitize_empty_object() {
        let s = sanitize(&json!({}));
        assert_eq!(s.name, DEFAULT_FOOD_NAME);
        assert_eq!(s.serving_size, DEFAULT_SERVING_SIZE);
        for v in [s.calories, s.protein, s.carbs, s.fat, s.fiber, s.sugar] {
            assert_eq!(v, 0.0);
        }
        assert!(s.additional_nutrients.is_empty());
    }

    #[test]
    fn test_sanitize_is_total_for_non_objects() {
        for data in [json!(null), json!(42), json!("pizza"), json!([1, 2]), json!(true)] {
            let s = sanitize(&data);
            assert_eq!(s.name, DEFAULT_FOOD_NAME);
            assert!(s.calories.is_finite());
            assert_eq!(s.calories, 0.0);
        }
    }

    #[test]
    fn test_sanitize_coerces_field_types() {
        let s = sanitize(&json!({
            "name": "  Banana ",
            "calories": "105",
            "protein": "lots",
            "carbs": true,
            "fat": null,
            "fiber": [3],
            "sugar": -4,
            "servingSize": "",
        }));
        assert_eq!(s.name, "Banana");
        assert_eq!(s.calories, 105.0);
        assert_eq!(s.protein, 0.0);
        assert_eq!(s.carbs, 1.0);
        assert_eq!(s.fat, 0.0);
        assert_eq!(s.fiber, 0.0);
        assert_eq!(s.sugar, 0.0);
        assert_eq!(s.serving_size, DEFAULT_SERVING_SIZE);
    }

    #[test]
    fn test_sanitize_non_string_name_uses_default() {
        let s = sanitize(&json!({"name": 7, "servingSize": {"g": 100}}));
        assert_eq!(s.name, DEFAULT_FOOD_NAME);
        assert_eq!(s.serving_size, DEFAULT_SERVING_SIZE);
    }

    #[test]
    fn test_sanitize_nutrients() {
        let s = sanitize(&json!({
            "additionalNutrients": [
                {"name": "Iron", "amount": "2mg"},
                {"name": "Zinc", "amount": 1.5},
                {"name": "Potassium"},
                {"amount": "10mg"},
                "Vitamin A",
                {"name": "", "amount": "1mg"}
            ]
        }));
        assert_eq!(
            s.additional_nutrients,
            vec![
                Nutrient {
                    name: "Iron".to_string(),
                    amount: "2mg".to_string()
                },
                Nutrient {
                    name: "Zinc".to_string(),
                    amount: "1.5".to_string()
                },
            ]
        );

        let s = sanitize(&json!({"additionalNutrients": {"name": "Iron"}}));
        assert!(s.additional_nutrients.is_empty());
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let inputs = [
            serde_json::from_str::<Value>(PIZZA).unwrap(),
            json!({}),
            json!({"calories": "12.5", "name": " x ", "additionalNutrients": [{"name": "K", "amount": 3}]}),
            json!([]),
        ];
        for data in inputs {
            let once = sanitize(&data);
            let twice = sanitize(&serde_json::to_value(&once).unwrap());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_coerce_number() {
        assert_eq!(coerce_number(&json!(3.5)), 3.5);
        assert_eq!(coerce_number(&json!(" 12 ")), 12.0);
        assert_eq!(coerce_number(&json!("")), 0.0);
        assert_eq!(coerce_number(&json!("NaN")), 0.0);
        assert_eq!(coerce_number(&json!("inf")), 0.0);
        assert_eq!(coerce_number(&json!(false)), 0.0);
        assert_eq!(coerce_number(&json!({})), 0.0);
    }

    #[test]
    fn test_parse_output() {
        assert_eq!(parse_output("").unwrap(), json!({}));
        assert_eq!(parse_output("  \n").unwrap(), json!({}));
        assert_eq!(parse_output(r#"{"name":"x"}"#).unwrap(), json!({"name": "x"}));
        assert!(matches!(
            parse_output("Sure! Here is the nutrition"),
            Err(EstimationError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_image_payload_data_url() {
        let image = ImagePayload::new(vec![0xff, 0xd8, 0xff], "image/png");
        assert_eq!(image.to_base64(), "/9j/");
        assert_eq!(image.to_data_url(), "data:image/png;base64,/9j/");
    }

    #[test]
    fn test_image_payload_default_mime() {
        assert_eq!(ImagePayload::new(vec![1], "").mime_type, DEFAULT_IMAGE_MIME);
        assert_eq!(ImagePayload::new(vec![1], "  ").mime_type, DEFAULT_IMAGE_MIME);
    }

    #[test]
    fn test_text_prompt() {
        let prompt = text_prompt("2 eggs");
        assert!(prompt.contains("\"2 eggs\""));
        assert!(prompt.contains("standard portions"));
    }

    #[test]
    fn test_response_schema_required_fields() {
        let schema = response_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(
            required,
            vec!["name", "calories", "protein", "carbs", "fat", "servingSize"]
        );
    }

    #[test]
    fn test_user_message_by_mode() {
        let err = EstimationError::Transport("timeout".to_string());
        assert_eq!(
            err.user_message(InputMode::Text),
            "Failed to analyze food. Please try again."
        );
        assert_eq!(
            err.user_message(InputMode::Image),
            "Failed to recognize food from image. Please ensure the photo is clear."
        );
    }

    #[tokio::test]
    async fn test_estimate_from_text_stamps_record() {
        let gateway = EstimationGateway::new(FakeEstimator::replying(PIZZA));
        let before = Utc::now().timestamp_millis();
        let record = gateway.estimate_from_text("a slice of pizza").await.unwrap();
        let after = Utc::now().timestamp_millis();

        assert_eq!(record.name, "Pizza slice");
        assert!(record.image.is_none());
        assert!(Uuid::parse_str(&record.id).is_ok());
        assert!(record.timestamp >= before && record.timestamp <= after);

        let seen = gateway.estimator().seen.lock().unwrap();
        assert_eq!(
            seen[0],
            EstimateRequest::Text {
                prompt: text_prompt("a slice of pizza")
            }
        );
    }

    #[tokio::test]
    async fn test_each_estimate_gets_a_fresh_id() {
        let gateway = EstimationGateway::new(FakeEstimator::replying(PIZZA));
        let a = gateway.estimate_from_text("pizza").await.unwrap();
        let b = gateway.estimate_from_text("pizza").await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_estimate_from_text_empty_output_uses_defaults() {
        let gateway = EstimationGateway::new(FakeEstimator::replying(""));
        let record = gateway.estimate_from_text("mystery").await.unwrap();
        assert_eq!(record.name, DEFAULT_FOOD_NAME);
        assert_eq!(record.calories, 0.0);
    }

    #[tokio::test]
    async fn test_estimate_from_text_blank_input_skips_service() {
        let gateway = EstimationGateway::new(FakeEstimator::replying(PIZZA));
        let err = gateway.estimate_from_text("   ").await.unwrap_err();
        assert!(matches!(err, EstimationError::EmptyInput));
        assert_eq!(gateway.estimator().calls(), 0);
    }

    #[tokio::test]
    async fn test_estimate_from_text_non_json_output_fails() {
        let gateway = EstimationGateway::new(FakeEstimator::replying("I think it's a pizza"));
        let err = gateway.estimate_from_text("pizza").await.unwrap_err();
        assert!(matches!(err, EstimationError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_estimate_propagates_service_failure() {
        let gateway = EstimationGateway::new(FakeEstimator::failing(503));
        let err = gateway.estimate_from_text("pizza").await.unwrap_err();
        assert!(matches!(err, EstimationError::Service { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_estimate_from_image_carries_data_url() {
        let gateway = EstimationGateway::new(FakeEstimator::replying(PIZZA));
        let record = gateway
            .estimate_from_image(vec![0xff, 0xd8, 0xff], "image/jpeg")
            .await
            .unwrap();
        assert_eq!(record.image.as_deref(), Some("data:image/jpeg;base64,/9j/"));

        let seen = gateway.estimator().seen.lock().unwrap();
        match &seen[0] {
            EstimateRequest::Image { image, instruction } => {
                assert_eq!(image.bytes, vec![0xff, 0xd8, 0xff]);
                assert_eq!(*instruction, IMAGE_INSTRUCTION);
            }
            EstimateRequest::Text { .. } => panic!("expected an image request"),
        }
    }

    #[tokio::test]
    async fn test_estimate_from_image_empty_bytes() {
        let gateway = EstimationGateway::new(FakeEstimator::replying(PIZZA));
        let err = gateway.estimate_from_image(Vec::new(), "image/png").await.unwrap_err();
        assert!(matches!(err, EstimationError::EmptyInput));
        assert_eq!(gateway.estimator().calls(), 0);
    }
}
