use crate::error::{to_env_var, ConfigError};
use chatrelay::agent::DEFAULT_MAX_STEPS;
use chatrelay::providers::configs::{OpenAiProviderConfig, ProviderConfig};
use config::{Config, Environment};
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};

pub const DEFAULT_TOOLS_SYSTEM_PROMPT: &str = "You are a helpful assistant. When you call a tool, \
you MUST wait for the result and then provide a natural language response explaining the \
information you received. Never end your response after calling a tool - always interpret and \
explain the tool results to the user.";

pub const DEFAULT_SIMPLE_SYSTEM_PROMPT: &str =
    "You are a helpful podcast assistant. Keep responses concise and friendly.";

#[derive(Debug, Default, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
}

impl ProviderSettings {
    // Convert to the chatrelay ProviderConfig
    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
        }
    }
}

/// How the chat routes drive the agent
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatSettings {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_tools_system_prompt")]
    pub tools_system_prompt: String,
    #[serde(default = "default_simple_system_prompt")]
    pub simple_system_prompt: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            tools_system_prompt: default_tools_system_prompt(),
            simple_system_prompt: default_simple_system_prompt(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub chat: ChatSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        // Start with default configuration
        let config = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Provider defaults
            .set_default("provider.type", "openai")?
            .set_default("provider.host", default_openai_host())?
            .set_default("provider.model", default_model())?
            // Chat defaults
            .set_default("chat.max_steps", default_max_steps() as u64)?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("CHATRELAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        // Try to deserialize the configuration
        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        // Handle missing field errors specially
        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                // Handle both NotFound and missing field message variants
                let error_str = err.to_string();
                if let Some(field) = missing_field(&error_str) {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(&qualify_field(field)),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

// Extract the field name from "missing field `api_key`", ignoring any trailing context
fn missing_field(message: &str) -> Option<&str> {
    message.strip_prefix("missing field `")?.split('`').next()
}

// serde reports missing fields without their section
fn qualify_field(field: &str) -> String {
    match field {
        "api_key" | "type" => format!("provider.{}", field),
        "provider" => "provider.api_key".to_string(),
        other => other.to_string(),
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_openai_host() -> String {
    "https://api.openai.com".to_string()
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}

fn default_tools_system_prompt() -> String {
    DEFAULT_TOOLS_SYSTEM_PROMPT.to_string()
}

fn default_simple_system_prompt() -> String {
    DEFAULT_SIMPLE_SYSTEM_PROMPT.to_string()
}
