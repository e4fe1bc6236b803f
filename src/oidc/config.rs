//! Token validation configuration.

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

/// Path of the key set document relative to the issuer.
pub const JWKS_PATH: &str = ".well-known/jwks.json";

/// Upper bound on the clock skew tolerance.
pub const MAX_CLOCK_SKEW_SECS: u64 = 3600;

/// Process-wide validator configuration. Read-only after startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationConfig {
    /// Token issuer (iss claim). Must match exactly.
    /// Example: "https://tenant.auth.example.com/"
    pub issuer: String,

    /// Expected audience (aud claim). The token's audience must contain it.
    pub audience: String,

    /// JWKS endpoint URL for fetching public keys.
    /// Example: "https://tenant.auth.example.com/.well-known/jwks.json"
    pub jwks_url: String,

    /// Signature algorithm tokens must use.
    #[serde(default = "default_algorithm")]
    pub algorithm: Algorithm,

    /// Clock skew tolerance in seconds for exp/iat/nbf validation.
    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: u64,

    /// How long a fetched key set is served before it is fetched again.
    #[serde(default = "default_jwks_ttl")]
    pub jwks_ttl_secs: u64,

    /// Timeout for a single key set fetch.
    #[serde(default = "default_jwks_timeout")]
    pub jwks_timeout_secs: u64,

    /// Minimum age of a fresh key set before an unknown kid may trigger
    /// another fetch.
    #[serde(default = "default_jwks_min_refetch")]
    pub jwks_min_refetch_secs: u64,
}

fn default_algorithm() -> Algorithm {
    Algorithm::RS256
}

fn default_clock_skew() -> u64 {
    60 // 1 minute
}

fn default_jwks_ttl() -> u64 {
    300 // 5 minutes
}

fn default_jwks_timeout() -> u64 {
    10
}

fn default_jwks_min_refetch() -> u64 {
    10
}

impl ValidationConfig {
    /// Build a configuration for an identity provider tenant domain such as
    /// `tenant.auth.example.com`. The issuer becomes `https://<domain>/` and
    /// the key set is read from `https://<domain>/.well-known/jwks.json`.
    pub fn for_domain(domain: &str, audience: &str) -> Result<Self, ConfigError> {
        let domain = domain.trim().trim_end_matches('/');
        if domain.is_empty() {
            return Err(ConfigError::Missing("issuer domain"));
        }

        let raw = format!("https://{}/", domain);
        let issuer = Url::parse(&raw).map_err(|source| ConfigError::InvalidIssuer {
            url: raw.clone(),
            source,
        })?;
        let jwks_url = issuer
            .join(JWKS_PATH)
            .map_err(|source| ConfigError::InvalidIssuer { url: raw, source })?;

        let config = Self {
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            jwks_url: jwks_url.to_string(),
            algorithm: default_algorithm(),
            clock_skew_secs: default_clock_skew(),
            jwks_ttl_secs: default_jwks_ttl(),
            jwks_timeout_secs: default_jwks_timeout(),
            jwks_min_refetch_secs: default_jwks_min_refetch(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::Missing("issuer"));
        }
        Url::parse(&self.issuer).map_err(|source| ConfigError::InvalidIssuer {
            url: self.issuer.clone(),
            source,
        })?;

        if self.audience.trim().is_empty() {
            return Err(ConfigError::Missing("audience"));
        }

        if self.jwks_url.is_empty() {
            return Err(ConfigError::Missing("jwks_url"));
        }
        if !self.jwks_url.starts_with("https://") && !self.jwks_url.starts_with("http://") {
            return Err(ConfigError::Invalid(
                "jwks_url must be a valid HTTP(S) URL".to_string(),
            ));
        }

        if self.clock_skew_secs > MAX_CLOCK_SKEW_SECS {
            return Err(ConfigError::Invalid(format!(
                "clock_skew_secs must not exceed {}",
                MAX_CLOCK_SKEW_SECS
            )));
        }

        if self.jwks_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "jwks_ttl_secs must be greater than zero".to_string(),
            ));
        }

        if !matches!(
            self.algorithm,
            Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512
                | Algorithm::ES256
                | Algorithm::ES384
        ) {
            return Err(ConfigError::Invalid(format!(
                "algorithm {:?} is not an asymmetric signature algorithm",
                self.algorithm
            )));
        }

        Ok(())
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_secs)
    }

    pub fn jwks_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_ttl_secs)
    }

    pub fn jwks_timeout(&self) -> Duration {
        Duration::from_secs(self.jwks_timeout_secs)
    }

    pub fn jwks_min_refetch(&self) -> Duration {
        Duration::from_secs(self.jwks_min_refetch_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_domain() {
        let config = ValidationConfig::for_domain("tenant.auth.example.com", "my-api").unwrap();
        assert_eq!(config.issuer, "https://tenant.auth.example.com/");
        assert_eq!(
            config.jwks_url,
            "https://tenant.auth.example.com/.well-known/jwks.json"
        );
        assert_eq!(config.audience, "my-api");
        assert_eq!(config.algorithm, Algorithm::RS256);
        assert_eq!(config.clock_skew_secs, 60);
        assert_eq!(config.jwks_ttl_secs, 300);
    }

    #[test]
    fn test_for_domain_trailing_slash() {
        let config = ValidationConfig::for_domain("tenant.auth.example.com/", "my-api").unwrap();
        assert_eq!(config.issuer, "https://tenant.auth.example.com/");
    }

    #[test]
    fn test_for_domain_rejects_garbage() {
        assert!(matches!(
            ValidationConfig::for_domain("", "my-api"),
            Err(ConfigError::Missing(_))
        ));
        assert!(matches!(
            ValidationConfig::for_domain("bad host name", "my-api"),
            Err(ConfigError::InvalidIssuer { .. })
        ));
        assert!(matches!(
            ValidationConfig::for_domain("tenant.auth.example.com", " "),
            Err(ConfigError::Missing("audience"))
        ));
    }

    #[test]
    fn test_validation() {
        let mut config = ValidationConfig::for_domain("tenant.auth.example.com", "my-api").unwrap();
        assert!(config.validate().is_ok());

        config.jwks_ttl_secs = 0;
        assert!(config.validate().is_err());
        config.jwks_ttl_secs = 300;

        config.clock_skew_secs = MAX_CLOCK_SKEW_SECS + 1;
        assert!(config.validate().is_err());
        config.clock_skew_secs = u64::MAX;
        assert!(config.validate().is_err());
        config.clock_skew_secs = MAX_CLOCK_SKEW_SECS;
        assert!(config.validate().is_ok());
        config.clock_skew_secs = 60;

        config.jwks_url = "ftp://tenant.auth.example.com/jwks".to_string();
        assert!(config.validate().is_err());
        config.jwks_url = "http://127.0.0.1:9999/.well-known/jwks.json".to_string();
        assert!(config.validate().is_ok());

        config.algorithm = Algorithm::HS256;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_applies_defaults() {
        let config: ValidationConfig = serde_json::from_str(
            r#"{
                "issuer": "https://tenant.auth.example.com/",
                "audience": "my-api",
                "jwks_url": "https://tenant.auth.example.com/.well-known/jwks.json"
            }"#,
        )
        .unwrap();
        assert_eq!(config.algorithm, Algorithm::RS256);
        assert_eq!(config.clock_skew(), Duration::from_secs(60));
        assert_eq!(config.jwks_ttl(), Duration::from_secs(300));
        assert_eq!(config.jwks_timeout(), Duration::from_secs(10));
        assert_eq!(config.jwks_min_refetch(), Duration::from_secs(10));
    }
}
