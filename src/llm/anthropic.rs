use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::llm::ModelBackendClient;
use crate::types::{ActionProposal, ExecutionContext, ToolCatalog};

#[derive(serde::Serialize)]
struct AnthropicRequest {
    model:      String,
    max_tokens: u32,
    system:     String,
    tools:      Vec<AnthropicToolDef>,
    messages:   Vec<AnthropicMessage>,
    stream:     bool,
}

#[derive(serde::Serialize)]
struct AnthropicToolDef {
    name:         String,
    description:  String,
    input_schema: serde_json::Value,
}

#[derive(serde::Serialize)]
struct AnthropicMessage {
    role:    &'static str,
    content: String,
}

#[derive(serde::Deserialize, Debug)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    usage:   AnthropicUsage,
}

#[derive(serde::Deserialize, Debug)]
struct AnthropicUsage {
    input_tokens:  u32,
    output_tokens: u32,
}

#[derive(serde::Deserialize, Debug)]
#[serde(tag = "type")]
enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String, input: serde_json::Value },
}

#[derive(serde::Deserialize, Debug)]
#[serde(tag = "type")]
enum AnthropicStreamEvent {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: AnthropicDelta },
    #[serde(other)]
    Other,
}

#[derive(serde::Deserialize, Debug)]
#[serde(tag = "type")]
enum AnthropicDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

pub struct AnthropicBackend {
    client:   reqwest::Client,
    api_key:  String,
    api_base: String,
}

impl AnthropicBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client:   reqwest::Client::new(),
            api_key:  api_key.into(),
            api_base: "https://api.anthropic.com".to_string(),
        }
    }

    pub fn from_env() -> Result<Self, String> {
        let key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| "ANTHROPIC_API_KEY not set".to_string())?;
        Ok(Self::new(key))
    }

    fn build_tool_defs(catalog: &ToolCatalog) -> Vec<AnthropicToolDef> {
        catalog.tools().iter().map(|t| AnthropicToolDef {
            name:         t.name.clone(),
            description:  t.description.clone(),
            input_schema: t.parameters.clone(),
        }).collect()
    }

    fn build_request(
        agent_role: &str,
        prompt_template_id: &str,
        context: &ExecutionContext,
        catalog: &ToolCatalog,
        model: &str,
        stream: bool,
    ) -> AnthropicRequest {
        AnthropicRequest {
            model: model.to_string(),
            max_tokens: 4096,
            system: format!(
                "You are the '{}' agent operating under prompt template '{}'. \
                 Propose exactly one tool call that makes progress on the task.",
                agent_role, prompt_template_id
            ),
            tools: Self::build_tool_defs(catalog),
            messages: vec![AnthropicMessage { role: "user", content: context.task_description.clone() }],
            stream,
        }
    }
}

#[async_trait]
impl ModelBackendClient for AnthropicBackend {
    async fn propose(
        &self,
        agent_role: &str,
        prompt_template_id: &str,
        context: &ExecutionContext,
        catalog: &ToolCatalog,
        model: &str,
    ) -> Result<ActionProposal, String> {
        let body = Self::build_request(agent_role, prompt_template_id, context, catalog, model, false);

        let response = self.client
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("network error: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Anthropic API error {}: {}", status, body));
        }

        let parsed: AnthropicResponse = response.json().await
            .map_err(|e| format!("failed to parse Anthropic response: {}", e))?;

        let usage = crate::budget::TokenUsage::new(parsed.usage.input_tokens, parsed.usage.output_tokens);

        for block in parsed.content {
            if let AnthropicContentBlock::ToolUse { name, input, .. } = block {
                let parameters: crate::types::Payload = serde_json::from_value(input)
                    .map_err(|e| format!("invalid tool arguments: {}", e))?;
                return Ok(ActionProposal {
                    action: name,
                    parameters,
                    reason: "selected by model tool-use block".to_string(),
                    expected_result: None,
                    usage: Some(usage),
                });
            }
        }

        Err("Anthropic response contained no tool_use block".to_string())
    }

    fn propose_stream<'a>(
        &'a self,
        agent_role: &'a str,
        prompt_template_id: &'a str,
        context: &'a ExecutionContext,
        catalog: &'a ToolCatalog,
        model: &'a str,
    ) -> BoxStream<'a, Result<String, String>> {
        let body = Self::build_request(agent_role, prompt_template_id, context, catalog, model, true);
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let api_base = self.api_base.clone();

        stream::once(async move {
            client.post(format!("{}/v1/messages", api_base))
                .header("x-api-key", &api_key)
                .header("anthropic-version", "2023-06-01")
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(|e| format!("network error: {}", e))
        })
        .flat_map(|res| match res {
            Ok(resp) if resp.status().is_success() => {
                resp.bytes_stream()
                    .map(|b| b.map_err(|e| format!("stream error: {}", e)))
                    .map(|res| {
                        let bytes = res?;
                        let text = String::from_utf8_lossy(&bytes);
                        let mut chunks = Vec::new();
                        for line in text.lines() {
                            if let Some(data) = line.strip_prefix("data: ") {
                                if let Ok(AnthropicStreamEvent::ContentBlockDelta {
                                    delta: AnthropicDelta::TextDelta { text },
                                }) = serde_json::from_str(data) {
                                    chunks.push(Ok(text));
                                }
                            }
                        }
                        Ok(chunks)
                    })
                    .flat_map(|res: Result<Vec<Result<String, String>>, String>| match res {
                        Ok(chunks) => stream::iter(chunks),
                        Err(e) => stream::iter(vec![Err(e)]),
                    })
                    .boxed()
            }
            Ok(resp) => stream::once(async move {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                Err(format!("Anthropic API error {}: {}", status, body))
            }).boxed(),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        })
        .boxed()
    }
}
