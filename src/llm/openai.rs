use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionToolType,
        CreateChatCompletionRequestArgs, FunctionObject,
    },
    Client,
};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::llm::ModelBackendClient;
use crate::types::{ActionProposal, ExecutionContext, ToolCatalog};

pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
}

impl OpenAiBackend {
    /// Standard OpenAI client using the `OPENAI_API_KEY` environment variable.
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    /// Custom base URL — for Groq, Together, Ollama, Fireworks, etc.
    pub fn with_base_url(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_base(api_base).with_api_key(api_key);
        Self { client: Client::with_config(config) }
    }

    fn build_tools(catalog: &ToolCatalog) -> Vec<ChatCompletionTool> {
        catalog.tools().iter().map(|t| ChatCompletionTool {
            r#type: ChatCompletionToolType::Function,
            function: FunctionObject {
                name:        t.name.clone(),
                description: Some(t.description.clone()),
                parameters:  Some(t.parameters.clone()),
            },
        }).collect()
    }

    fn system_prompt(agent_role: &str, prompt_template_id: &str) -> String {
        format!(
            "You are the '{}' agent operating under prompt template '{}'. \
             Given the task, propose exactly one tool call that makes progress. \
             Respond only via a tool call.",
            agent_role, prompt_template_id
        )
    }

    fn build_messages(agent_role: &str, prompt_template_id: &str, context: &ExecutionContext) -> Result<Vec<ChatCompletionRequestMessage>, String> {
        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(Self::system_prompt(agent_role, prompt_template_id))
            .build()
            .map_err(|e| e.to_string())?
            .into();
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(context.task_description.clone())
            .build()
            .map_err(|e| e.to_string())?
            .into();
        Ok(vec![system, user])
    }
}

impl Default for OpenAiBackend {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl ModelBackendClient for OpenAiBackend {
    async fn propose(
        &self,
        agent_role: &str,
        prompt_template_id: &str,
        context: &ExecutionContext,
        catalog: &ToolCatalog,
        model: &str,
    ) -> Result<ActionProposal, String> {
        let messages = Self::build_messages(agent_role, prompt_template_id, context)?;
        let tools = Self::build_tools(catalog);

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(model).messages(messages);
        if !tools.is_empty() {
            builder.tools(tools);
        }
        let request = builder.build().map_err(|e| format!("failed to build request: {}", e))?;

        let response = self.client.chat().create(request).await
            .map_err(|e| format!("OpenAI API error: {}", e))?;

        let usage = response.usage.map(|u| {
            crate::budget::TokenUsage::new(u.prompt_tokens, u.completion_tokens)
        });

        let choice = response.choices.into_iter().next().ok_or("empty response from OpenAI")?;
        let message = choice.message;

        if let Some(mut tool_calls) = message.tool_calls {
            let tc = tool_calls.drain(..).next().ok_or("empty tool_calls array")?;
            let parameters: crate::types::Payload = serde_json::from_str(&tc.function.arguments)
                .map_err(|e| format!("failed to parse tool arguments: {}", e))?;
            return Ok(ActionProposal {
                action: tc.function.name,
                parameters,
                reason: "selected by model tool-call".to_string(),
                expected_result: None,
                usage,
            });
        }

        Err(message.content.map(|_| "model returned text instead of a tool call".to_string())
            .unwrap_or_else(|| "model returned neither a tool call nor content".to_string()))
    }

    fn propose_stream<'a>(
        &'a self,
        agent_role: &'a str,
        prompt_template_id: &'a str,
        context: &'a ExecutionContext,
        catalog: &'a ToolCatalog,
        model: &'a str,
    ) -> BoxStream<'a, Result<String, String>> {
        let messages = match Self::build_messages(agent_role, prompt_template_id, context) {
            Ok(m) => m,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };
        let tools = Self::build_tools(catalog);

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(model).messages(messages).stream(true);
        if !tools.is_empty() {
            builder.tools(tools);
        }
        let request = match builder.build() {
            Ok(r) => r,
            Err(e) => return stream::once(async move { Err(e.to_string()) }).boxed(),
        };

        let client = self.client.clone();
        stream::once(async move {
            client.chat().create_stream(request).await.map_err(|e| format!("OpenAI API error: {}", e))
        })
        .flat_map(|res| match res {
            Ok(s) => s.map(|chunk| {
                let chunk = chunk.map_err(|e| format!("OpenAI stream error: {}", e))?;
                let choice = chunk.choices.into_iter().next().ok_or("empty choice in stream")?;
                choice.delta.content.ok_or_else(|| "SKIP".to_string())
            }).filter(|r| futures::future::ready(!matches!(r, Err(e) if e == "SKIP"))).boxed(),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        })
        .boxed()
    }
}
