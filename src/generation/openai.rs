//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{GenerationError, GenerationRequest, GenerationResult, GenerationService, OutputContract};
use crate::personas::Persona;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub request_timeout: Duration,
}

pub struct OpenAiGenerator {
    client: Client,
    config: OpenAiConfig,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    refusal: Option<String>,
}

fn response_format(contract: &OutputContract) -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": contract.name,
            "schema": contract.schema,
        }
    })
}

fn map_http_error(error: reqwest::Error, timeout: Duration) -> GenerationError {
    if error.is_timeout() {
        GenerationError::Timeout(timeout)
    } else if let Some(status) = error.status() {
        GenerationError::Upstream {
            status: status.as_u16(),
            message: error.to_string(),
        }
    } else {
        GenerationError::Transport(error.to_string())
    }
}

impl OpenAiGenerator {
    pub fn new(config: OpenAiConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GenerationError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn body<'a>(&'a self, persona: &'a Persona, request: &'a GenerationRequest) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                Message {
                    role: "system",
                    content: &persona.instructions,
                },
                Message {
                    role: "user",
                    content: &request.input,
                },
            ],
            response_format: request.contract.as_ref().map(response_format),
        }
    }
}

/// Decode a 2xx body. A body that arrived but has the wrong shape is
/// invalid output, not a transport failure.
fn parse_completion(body: &str) -> Result<ChatCompletionResponse, GenerationError> {
    serde_json::from_str(body)
        .map_err(|e| GenerationError::InvalidOutput(format!("Unexpected completion body: {}", e)))
}

/// Turn the first choice into the result shape. Structured requests must
/// come back as JSON; plain requests are returned as a bare string.
///
/// Usage is priced by the configured model. The dated id the service
/// answers with (e.g. `gpt-4-turbo-2024-04-09`) is kept as `response_model`.
fn into_result(
    completion: ChatCompletionResponse,
    structured: bool,
    configured_model: &str,
) -> Result<GenerationResult, GenerationError> {
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::InvalidOutput("No choices in response".to_string()))?;

    if let Some(refusal) = choice.message.refusal {
        return Err(GenerationError::Rejected(refusal));
    }
    let content = choice.message.content.unwrap_or_default();

    let output = if structured {
        serde_json::from_str(&content)
            .map_err(|e| GenerationError::InvalidOutput(format!("Response is not JSON: {}", e)))?
    } else {
        Value::String(content)
    };

    let mut usage = completion.usage.unwrap_or_else(|| json!({}));
    if let Value::Object(map) = &mut usage {
        map.insert("model_name".to_string(), Value::String(configured_model.to_string()));
        if let Some(returned) = completion.model {
            map.insert("response_model".to_string(), Value::String(returned));
        }
    }

    Ok(GenerationResult { output, usage })
}

#[async_trait]
impl GenerationService for OpenAiGenerator {
    async fn run(
        &self,
        persona: &Persona,
        request: GenerationRequest,
    ) -> Result<GenerationResult, GenerationError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let timeout = self.config.request_timeout;

        tracing::debug!(persona = %persona.role, model = %self.config.model, "Sending generation request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.body(persona, &request))
            .send()
            .await
            .map_err(|e| map_http_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| map_http_error(e, timeout))?;
        let completion = parse_completion(&body)?;

        into_result(completion, request.contract.is_some(), &self.config.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::TripsBreaker;
    use crate::ledger::{PriceTable, UsageLedger};
    use crate::models::{Cost, TextOutput};
    use crate::personas::PersonaKind;

    fn generator() -> OpenAiGenerator {
        OpenAiGenerator::new(OpenAiConfig {
            api_key: "sk-test".to_string(),
            base_url: "http://localhost:9".to_string(),
            model: "gpt-4-turbo".to_string(),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn completion(content: &str) -> ChatCompletionResponse {
        serde_json::from_value(json!({
            "model": "gpt-4-turbo-2024-04-09",
            "choices": [{ "message": { "content": content } }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15 }
        }))
        .unwrap()
    }

    #[test]
    fn request_carries_persona_and_contract() {
        let generator = generator();
        let persona = Persona::new("Editor", PersonaKind::Editor, "", "Be concise.");
        let request = GenerationRequest::new("Check this").expecting::<TextOutput>("text_output");

        let body = serde_json::to_value(generator.body(&persona, &request)).unwrap();
        assert_eq!(body["messages"][0]["content"], "Be concise.");
        assert_eq!(body["messages"][1]["content"], "Check this");
        assert_eq!(body["response_format"]["json_schema"]["name"], "text_output");
    }

    #[test]
    fn structured_output_is_parsed_and_model_recorded() {
        let result = into_result(completion(r#"{"text":"ok"}"#), true, "gpt-4-turbo").unwrap();
        assert_eq!(result.output, json!({ "text": "ok" }));
        assert_eq!(result.usage["model_name"], "gpt-4-turbo");
        assert_eq!(result.usage["response_model"], "gpt-4-turbo-2024-04-09");
        assert_eq!(result.usage["prompt_tokens"], 12);
    }

    #[test]
    fn dated_response_model_is_billed_at_the_configured_price() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "model": "gpt-4-turbo-2024-04-09",
            "choices": [{ "message": { "content": "{\"text\":\"ok\"}" } }],
            "usage": {
                "prompt_tokens": 1_000_000,
                "completion_tokens": 1_000_000,
                "total_tokens": 2_000_000
            }
        }))
        .unwrap();
        let result = into_result(response, true, "gpt-4-turbo").unwrap();

        let ledger = UsageLedger::new(PriceTable::default(), "gpt-4");
        let entry = ledger.entry(uuid::Uuid::new_v4(), "chapter_content", &result.usage);

        assert_eq!(entry.model_name, "gpt-4-turbo");
        // $10 prompt + $30 completion per 1M tokens.
        assert_eq!(entry.cost, Cost::from_nanos(40_000_000_000));
    }

    #[test]
    fn malformed_success_body_is_invalid_output() {
        let err = parse_completion(r#"{"unexpected":true}"#).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidOutput(_)));
        assert!(!err.trips_breaker());

        let err = parse_completion("<html>gateway</html>").unwrap_err();
        assert!(!err.trips_breaker());
    }

    #[test]
    fn non_json_structured_output_is_invalid() {
        let err = into_result(completion("plain words"), true, "gpt-4-turbo").unwrap_err();
        assert!(matches!(err, GenerationError::InvalidOutput(_)));
    }

    #[test]
    fn refusal_is_rejected() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "content": null, "refusal": "no" } }]
        }))
        .unwrap();
        let err = into_result(response, true, "gpt-4").unwrap_err();
        assert!(matches!(err, GenerationError::Rejected(_)));
    }
}
