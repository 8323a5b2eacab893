use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

/// Provider/model selection carried by prompt requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    #[serde(rename = "providerID")]
    pub provider_id: String,
    #[serde(rename = "modelID")]
    pub model_id: String,
}

/// One input part of a prompt request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PromptPart {
    Text {
        text: String,
    },
    File {
        mime: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
        url: String,
    },
}

impl PromptPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Inline image part encoded as a `data:` URL.
    pub fn image(mime: impl Into<String>, filename: Option<String>, bytes: &[u8]) -> Self {
        let mime = mime.into();
        let url = data_url(&mime, bytes);
        Self::File {
            mime,
            filename,
            url,
        }
    }
}

/// Body of `POST /session/{id}/prompt_async`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptBody {
    pub parts: Vec<PromptPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelRef>,
}

impl PromptBody {
    pub fn new(parts: Vec<PromptPart>) -> Self {
        Self { parts, model: None }
    }

    pub fn with_model(mut self, provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        self.model = Some(ModelRef {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
        });
        self
    }
}

/// Body of `POST /session/{id}/command`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandBody {
    pub command: String,
    pub arguments: String,
    /// `provider/model` selector.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Body of `POST /session`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Body of `PUT /auth/{provider}` for API-key credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyAuthBody {
    #[serde(rename = "type")]
    pub auth_type: String,
    pub key: String,
}

impl ApiKeyAuthBody {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            auth_type: "api".to_owned(),
            key: key.into(),
        }
    }
}

pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", general_purpose::STANDARD.encode(bytes))
}
