use std::net::SocketAddr;

use crate::error::ConfigError;
use crate::models::GenerationParams;

/** \brief Inference endpoint, compiled in. */
pub const DEFAULT_ENDPOINT: &str = "https://models.github.ai/inference";
/** \brief Model identifier, compiled in. */
pub const DEFAULT_MODEL: &str = "openai/gpt-4.1-turbo";
/** \brief Environment variable holding the provider credential. */
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";
/** \brief Default listen address. */
pub const DEFAULT_ADDR: &str = "0.0.0.0:5000";

/**
 * \brief Provider configuration. Built once at startup and shared read-only.
 */
#[derive(Clone)]
pub struct ServiceConfig {
    pub endpoint: String,
    pub model: String,
    api_token: String,
}

impl ServiceConfig {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_token: api_token.into(),
        }
    }

    /**
     * \brief Reads the credential from `GITHUB_TOKEN`; endpoint and model are fixed.
     */
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_token(std::env::var(TOKEN_ENV).ok())
    }

    fn from_token(token: Option<String>) -> Result<Self, ConfigError> {
        let token = token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingToken(TOKEN_ENV))?;
        Ok(Self::new(DEFAULT_ENDPOINT, DEFAULT_MODEL, token))
    }

    pub fn api_token(&self) -> &str {
        &self.api_token
    }

    /** \brief `{endpoint}/chat/completions` */
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
    }
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_token", &"***")
            .finish()
    }
}

/**
 * \brief How a provider failure is rendered to the HTTP caller.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /** \brief 200 with an apology in `response`. */
    #[default]
    InBand,
    /** \brief 502 with the failure in `error`. */
    Status,
}

/**
 * \brief Server-side options that are not part of the provider config.
 */
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub addr: SocketAddr,
    pub failure_policy: FailurePolicy,
    pub params: GenerationParams,
}

impl ServerOptions {
    pub fn with_addr(mut self, addr: &str) -> Result<Self, ConfigError> {
        self.addr = parse_addr(addr)?;
        Ok(self)
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            failure_policy: FailurePolicy::default(),
            params: GenerationParams::default(),
        }
    }
}

pub fn parse_addr(addr: &str) -> Result<SocketAddr, ConfigError> {
    addr.parse().map_err(|e: std::net::AddrParseError| ConfigError::InvalidAddr {
        addr: addr.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_blank_token_is_fatal() {
        assert!(matches!(
            ServiceConfig::from_token(None),
            Err(ConfigError::MissingToken(TOKEN_ENV))
        ));
        assert!(ServiceConfig::from_token(Some("   ".to_string())).is_err());
    }

    #[test]
    fn token_uses_fixed_endpoint_and_model() {
        let cfg = ServiceConfig::from_token(Some(" ghp_abc \n".to_string())).unwrap();
        assert_eq!(cfg.api_token(), "ghp_abc");
        assert_eq!(cfg.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(cfg.model, DEFAULT_MODEL);
        assert_eq!(
            cfg.completions_url(),
            "https://models.github.ai/inference/chat/completions"
        );
    }

    #[test]
    fn debug_hides_token() {
        let cfg = ServiceConfig::new("http://x", "m", "secret");
        assert!(!format!("{:?}", cfg).contains("secret"));
    }

    #[test]
    fn default_addr_matches_constant() {
        assert_eq!(ServerOptions::default().addr, parse_addr(DEFAULT_ADDR).unwrap());
        assert!(ServerOptions::default().with_addr("not an addr").is_err());
    }
}
