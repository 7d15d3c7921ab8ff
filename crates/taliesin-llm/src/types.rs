//! Wire types for the Gemini generation API.
//!
//! These structs serialize to the exact JSON shapes the API expects
//! (`contents`, `systemInstruction`, `tools`, `generationConfig`), so the
//! backend can post them directly. Response-side conveniences
//! ([`GenerationResponse`], [`Citation`], [`Usage`]) are provider-neutral
//! and shared with the mock backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─────────────────────────────────────────────────────────────────────────────
// Conversation content
// ─────────────────────────────────────────────────────────────────────────────

/// Who produced a piece of conversation content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Content supplied by the end user (including tool results).
    User,
    /// Content produced by the model.
    Model,
}

/// A function the model asks the client to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Declared function name.
    pub name: String,
    /// Arguments as free-form JSON (validated by the caller).
    #[serde(default)]
    pub args: Value,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// The client's answer to a [`FunctionCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    /// Name of the function that was run.
    pub name: String,
    /// Result payload as free-form JSON.
    pub response: Value,
}

impl FunctionResponse {
    pub fn new(name: impl Into<String>, response: Value) -> Self {
        Self {
            name: name.into(),
            response,
        }
    }
}

/// One part of a content entry: text, a function call, or a function result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    /// Returns the text payload if this is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Returns the function call if this part carries one.
    pub fn as_function_call(&self) -> Option<&FunctionCall> {
        match self {
            Part::FunctionCall { function_call } => Some(function_call),
            _ => None,
        }
    }
}

/// One entry in the conversation history sent to the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    /// Create a user text entry.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::text(text)],
        }
    }

    /// Create a model text entry.
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::text(text)],
        }
    }

    /// Create a model entry from raw parts (used to echo function calls
    /// back into the history).
    pub fn model_parts(parts: Vec<Part>) -> Self {
        Self {
            role: Role::Model,
            parts,
        }
    }

    /// Create the entry that delivers function results back to the model.
    ///
    /// The API expects function responses under the `user` role.
    pub fn function_results(results: Vec<FunctionResponse>) -> Self {
        Self {
            role: Role::User,
            parts: results
                .into_iter()
                .map(|function_response| Part::FunctionResponse { function_response })
                .collect(),
        }
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

/// System instruction block (`systemInstruction` in the request body).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInstruction {
    pub parts: Vec<Part>,
}

impl SystemInstruction {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::text(text)],
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool declarations
// ─────────────────────────────────────────────────────────────────────────────

/// A single function the model may call, with a JSON Schema for its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON Schema object describing the expected arguments.
    pub parameters: Value,
}

impl ToolDeclaration {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Grouping the API uses for tool declarations (`tools[].functionDeclarations`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolGroup {
    pub function_declarations: Vec<ToolDeclaration>,
}

impl From<Vec<ToolDeclaration>> for ToolGroup {
    fn from(function_declarations: Vec<ToolDeclaration>) -> Self {
        Self {
            function_declarations,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Generation parameters and request
// ─────────────────────────────────────────────────────────────────────────────

/// Sampling parameters (`generationConfig` in the request body).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl GenerationConfig {
    /// Low-temperature settings for support conversations.
    pub fn chat() -> Self {
        Self {
            temperature: Some(0.1),
            top_p: Some(0.95),
            top_k: Some(40),
            max_output_tokens: None,
        }
    }

    /// Settings for transcript analysis, slightly warmer than chat.
    pub fn analysis() -> Self {
        Self {
            temperature: Some(0.2),
            ..Self::default()
        }
    }
}

/// A complete generation request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerationRequest {
    pub fn new(contents: Vec<Content>) -> Self {
        Self {
            contents,
            system_instruction: None,
            tools: Vec::new(),
            generation_config: None,
        }
    }

    pub fn with_system(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(SystemInstruction::new(instruction));
        self
    }

    pub fn with_tools(mut self, declarations: Vec<ToolDeclaration>) -> Self {
        if !declarations.is_empty() {
            self.tools = vec![ToolGroup::from(declarations)];
        }
        self
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = Some(config);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response-side types
// ─────────────────────────────────────────────────────────────────────────────

/// A source reference attached to generated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub uri: String,
}

impl Citation {
    pub fn new(title: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            uri: uri.into(),
        }
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    #[serde(other)]
    Other,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub response_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, response_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            response_tokens,
        }
    }
}

/// A fully assembled (non-streaming) generation result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub parts: Vec<Part>,
    pub citations: Vec<Citation>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<Usage>,
}

impl GenerationResponse {
    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    /// All function calls the model requested, in order.
    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.parts.iter().filter_map(Part::as_function_call).collect()
    }

    pub fn has_function_calls(&self) -> bool {
        self.parts.iter().any(|p| p.as_function_call().is_some())
    }
}
