use serde::{Deserialize, Serialize};

/** \brief Default persona sent as the system turn. */
pub const DEFAULT_SYSTEM_MESSAGE: &str =
    "You are a helpful AI assistant that provides accurate and concise answers.";

/**
 * \brief Message structure, aligned with the OpenAI chat message format.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /** \brief Role: system/user/assistant */
    pub role: String,
    /** \brief Content */
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/**
 * \brief Sampling parameters and persona for one generation call.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /** \brief Sampling temperature, default 1.0 */
    pub temperature: f32,
    /** \brief Nucleus sampling mass, default 1.0 */
    pub top_p: f32,
    /** \brief System turn, default [`DEFAULT_SYSTEM_MESSAGE`] */
    pub system_message: String,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 1.0,
            system_message: DEFAULT_SYSTEM_MESSAGE.to_string(),
        }
    }
}

/**
 * \brief A validated prompt plus the parameters it will be generated with.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    pub prompt: String,
    pub params: GenerationParams,
}

impl PromptRequest {
    /**
     * \brief Builds a request, returning `None` for an empty prompt so that it
     * can never reach the provider.
     */
    pub fn new(prompt: impl Into<String>, params: GenerationParams) -> Option<Self> {
        let prompt = prompt.into();
        if prompt.is_empty() {
            return None;
        }
        Some(Self { prompt, params })
    }

    /** \brief The two turns sent upstream: persona then prompt. */
    pub fn messages(&self) -> Vec<Message> {
        vec![
            Message::system(self.params.system_message.clone()),
            Message::user(self.prompt.clone()),
        ]
    }
}

/** \brief Provider reply text. */
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    pub text: String,
}
