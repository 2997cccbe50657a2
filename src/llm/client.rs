//! Async model client with tool calling
//!
//! One client per model endpoint. Three wire formats are spoken: Anthropic
//! messages, OpenAI-compatible chat completions, and the free-text action
//! format of GUI-agent models (OpenAI transport, reply parsed from text).

use super::action_text;
use crate::core::config::{ModelConfig, ModelFormat};
use crate::core::error::{AgentError, Result};
use crate::core::types::Screen;
use crate::perception::image_ops::encode_png;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const DEFAULT_SYSTEM: &str = "You are a helpful assistant.";

/// A tool the model may call, with a JSON-schema for its input
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub input: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn add(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// What came back from one call
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    pub text: String,
    pub tool_call: Option<ToolCall>,
    pub usage: Usage,
}

/// One call: prompt, screenshots and the tools that may answer it
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub system: Option<&'a str>,
    pub prompt: &'a str,
    pub images: &'a [&'a Screen],
    pub tools: &'a [ToolSpec],
}

impl<'a> ModelRequest<'a> {
    pub fn new(prompt: &'a str) -> Self {
        Self {
            system: None,
            prompt,
            images: &[],
            tools: &[],
        }
    }

    pub fn with_images(mut self, images: &'a [&'a Screen]) -> Self {
        self.images = images;
        self
    }

    pub fn with_tools(mut self, tools: &'a [ToolSpec]) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_system(mut self, system: Option<&'a str>) -> Self {
        self.system = system;
        self
    }
}

pub struct LlmClient {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
    format: ModelFormat,
    max_tokens: u32,
}

impl LlmClient {
    pub fn new(api_key: String, api_url: String, model: String) -> Self {
        let format = Self::detect_format(&api_url);
        Self {
            client: Client::new(),
            api_key,
            api_url,
            model,
            format,
            max_tokens: ModelConfig::default().max_tokens,
        }
    }

    pub fn with_format(mut self, format: ModelFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn format(&self) -> ModelFormat {
        self.format
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn detect_format(url: &str) -> ModelFormat {
        if url.contains("anthropic.com") {
            ModelFormat::Anthropic
        } else {
            ModelFormat::OpenAi
        }
    }

    /// Build a client for an endpoint, reading its key from the named env var
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| AgentError::Config(format!("{} not set", config.api_key_env)))?;
        let client = Self::new(api_key, config.api_url.clone(), config.model.clone())
            .with_max_tokens(config.max_tokens);
        Ok(match config.format {
            Some(format) => client.with_format(format),
            None => client,
        })
    }

    /// Create a client from environment variables
    ///
    /// Required: LLM_API_KEY
    /// Optional: LLM_API_URL (defaults to Anthropic API)
    /// Optional: LLM_MODEL
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| AgentError::Config("LLM_API_KEY not set".into()))?;
        let defaults = ModelConfig::default();
        let api_url = std::env::var("LLM_API_URL").unwrap_or(defaults.api_url);
        let model = std::env::var("LLM_MODEL").unwrap_or(defaults.model);
        Ok(Self::new(api_key, api_url, model))
    }

    pub async fn complete(&self, request: &ModelRequest<'_>) -> Result<ModelReply> {
        match self.format {
            ModelFormat::Anthropic => {
                let body = self.anthropic_body(request)?;
                let response = self
                    .client
                    .post(&self.api_url)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", "2023-06-01")
                    .header("content-type", "application/json")
                    .json(&body);
                parse_anthropic(self.send(response).await?)
            }
            ModelFormat::OpenAi | ModelFormat::ActionText => {
                let body = self.openai_body(request)?;
                let response = self
                    .client
                    .post(&self.api_url)
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .header("content-type", "application/json")
                    .json(&body);
                let reply = parse_openai(self.send(response).await?)?;
                if self.format == ModelFormat::ActionText {
                    let size = request.images.first().map(|i| i.dimensions());
                    Ok(with_action_text(reply, size))
                } else {
                    Ok(reply)
                }
            }
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| AgentError::Judge(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AgentError::Judge(format!("API error: {}", error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| AgentError::Judge(e.to_string()))
    }

    fn anthropic_body(&self, request: &ModelRequest<'_>) -> Result<Value> {
        let mut content = vec![AnthropicContent::Text {
            text: request.prompt.to_string(),
        }];
        for image in request.images {
            content.push(AnthropicContent::Image {
                source: ImageSource {
                    kind: "base64",
                    media_type: "image/png",
                    data: png_base64(image)?,
                },
            });
        }
        let tools: Vec<AnthropicTool> = request
            .tools
            .iter()
            .map(|t| AnthropicTool {
                name: &t.name,
                description: &t.description,
                input_schema: &t.parameters,
            })
            .collect();

        let mut body = serde_json::to_value(AnthropicRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: request.system.unwrap_or(DEFAULT_SYSTEM),
            messages: vec![AnthropicMessage {
                role: "user",
                content,
            }],
            tools,
        })?;
        if !request.tools.is_empty() {
            body["tool_choice"] = json!({ "type": "any" });
        }
        Ok(body)
    }

    fn openai_body(&self, request: &ModelRequest<'_>) -> Result<Value> {
        let mut content = vec![json!({ "type": "text", "text": request.prompt })];
        for image in request.images {
            content.push(json!({
                "type": "image_url",
                "image_url": { "url": format!("data:image/png;base64,{}", png_base64(image)?) },
            }));
        }
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "system", "content": request.system.unwrap_or(DEFAULT_SYSTEM) },
                { "role": "user", "content": content },
            ],
        });
        // the action-text format answers in prose, never with tools
        if self.format == ModelFormat::OpenAi && !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
            body["tool_choice"] = json!("required");
        }
        Ok(body)
    }
}

fn png_base64(image: &Screen) -> Result<String> {
    Ok(BASE64.encode(encode_png(image)?))
}

fn parse_anthropic(body: Value) -> Result<ModelReply> {
    let response: AnthropicResponse = serde_json::from_value(body)
        .map_err(|e| AgentError::Judge(format!("unexpected response: {}", e)))?;

    let mut reply = ModelReply {
        usage: Usage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        },
        ..ModelReply::default()
    };
    for block in response.content {
        match block {
            AnthropicBlock::Text { text } => reply.text.push_str(&text),
            AnthropicBlock::ToolUse { name, input } => {
                if reply.tool_call.is_none() {
                    reply.tool_call = Some(ToolCall { name, input });
                }
            }
            AnthropicBlock::Other => {}
        }
    }
    Ok(reply)
}

fn parse_openai(body: Value) -> Result<ModelReply> {
    let response: OpenAiResponse = serde_json::from_value(body)
        .map_err(|e| AgentError::Judge(format!("unexpected response: {}", e)))?;

    let message = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| AgentError::Judge("Empty response".into()))?;

    // arguments arrive as a JSON string; a malformed one means no decision
    let tool_call = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|call| {
            serde_json::from_str(&call.function.arguments)
                .ok()
                .map(|input| ToolCall {
                    name: call.function.name,
                    input,
                })
        });

    Ok(ModelReply {
        text: message.content.unwrap_or_default(),
        tool_call,
        usage: response
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default(),
    })
}

/// Turn an `Action:` line into a tool call named after the operation kind
fn with_action_text(mut reply: ModelReply, size: Option<(u32, u32)>) -> ModelReply {
    let parsed = action_text::parse_reply(&reply.text);
    reply.tool_call = parsed.and_then(|action| {
        let action = match size {
            Some((w, h)) => action.rescale(w, h),
            None => action,
        };
        serde_json::to_value(&action.params)
            .ok()
            .map(|input| ToolCall {
                name: action.kind.name().to_string(),
                input,
            })
    });
    reply
}

// Anthropic API format
#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool<'a>>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<AnthropicContent>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContent {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: String,
}

#[derive(Serialize)]
struct AnthropicTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Default)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

// OpenAI-compatible API format
#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Deserialize)]
struct OpenAiToolCall {
    function: OpenAiFunction,
}

#[derive(Deserialize)]
struct OpenAiFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
