use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;
use crate::error::AnalysisError;
use crate::models::AnalysisRequest;

const SYSTEM_PROMPT: &str = r#"You are a nutrition expert AI. Analyze food and provide accurate nutrition information.
Always respond with JSON in this exact format:
{
  "foodName": "detected food name",
  "calories": number (integer),
  "protein": number (decimal, grams),
  "carbs": number (decimal, grams),
  "fat": number (decimal, grams),
  "healthRating": "good" or "average" or "poor",
  "vitamins": "brief description of key vitamins",
  "minerals": "brief description of key minerals"
}

Rating guidelines:
- "good": balanced macros, high in vitamins/minerals, whole foods
- "average": moderate nutritional value, some processed elements
- "poor": high in unhealthy fats/sugars, low nutritional value

Be accurate with numeric values. Use realistic portion sizes."#;

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageData },
}

#[derive(Debug, Serialize)]
struct ImageData {
    url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Anything that can answer an analysis request with raw model text.
#[async_trait::async_trait]
pub trait NutritionGateway: Send + Sync {
    async fn complete(&self, request: &AnalysisRequest) -> Result<String, AnalysisError>;
}

/// Chat-completion client for the hosted AI gateway.
pub struct GatewayClient {
    config: GatewayConfig,
    client: reqwest::Client,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn build_request(&self, request: &AnalysisRequest) -> ChatRequest {
        let user_message = match request {
            AnalysisRequest::ByImage { image_url } => ChatMessage {
                role: "user",
                content: MessageContent::Parts(vec![
                    ContentPart::Text {
                        text: "Analyze this food image and provide detailed nutrition information."
                            .to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageData {
                            url: image_url.clone(),
                        },
                    },
                ]),
            },
            AnalysisRequest::ByName { food_name } => ChatMessage {
                role: "user",
                content: MessageContent::Text(format!(
                    "Analyze \"{}\" and provide detailed nutrition information for a standard serving.",
                    food_name
                )),
            },
        };

        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(SYSTEM_PROMPT.to_string()),
                },
                user_message,
            ],
            temperature: self.config.temperature,
        }
    }

    /// Send the request, retrying transport failures up to `max_retries` times.
    async fn send(&self, api_key: &str, body: &ChatRequest) -> Result<reqwest::Response, AnalysisError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .client
                .post(&self.config.url)
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match result {
                Ok(response) => return Ok(response),
                Err(e) if is_transient(&e) && attempt <= self.config.max_retries => {
                    log::warn!("⚠️ AI gateway call failed (attempt {}), retrying: {}", attempt, e);
                }
                Err(e) => {
                    log::error!("❌ AI gateway call failed after {} attempt(s): {}", attempt, e);
                    return Err(AnalysisError::Upstream {
                        status: None,
                        body: e.to_string(),
                    });
                }
            }
        }
    }
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_request()
}

#[async_trait::async_trait]
impl NutritionGateway for GatewayClient {
    async fn complete(&self, request: &AnalysisRequest) -> Result<String, AnalysisError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| AnalysisError::Configuration("AI gateway API key is not configured".to_string()))?;

        let body = self.build_request(request);
        log::info!("🤖 Sending request to AI gateway with model: {}", self.config.model);

        let response = self.send(api_key, &body).await?;
        let status = response.status();
        log::debug!("📥 AI gateway response status: {}", status);

        let response_text = response.text().await.map_err(|e| AnalysisError::Upstream {
            status: Some(status.as_u16()),
            body: format!("failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            log::error!("❌ AI gateway error ({}): {}", status, response_text);
            return Err(AnalysisError::Upstream {
                status: Some(status.as_u16()),
                body: response_text,
            });
        }

        log::debug!("📄 Raw AI gateway response size: {} bytes", response_text.len());

        let content = serde_json::from_str::<ChatResponse>(&response_text)
            .ok()
            .and_then(|r| r.choices.into_iter().next())
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|c| !c.trim().is_empty());

        match content {
            Some(content) => {
                log::info!("💬 AI response received ({} chars)", content.len());
                Ok(content)
            }
            None => {
                log::error!("❌ No content in AI response: {}", response_text);
                Err(AnalysisError::Upstream {
                    status: Some(status.as_u16()),
                    body: response_text,
                })
            }
        }
    }
}
