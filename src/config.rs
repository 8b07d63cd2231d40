//! Configuration management for Sitegate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::edge::{ExemptPaths, SecurityHeaders};
use crate::error::{Result, SitegateError};
use crate::ratelimit::{PolicyTableConfig, RoutePolicies};

/// Prefix for environment variable overrides, e.g. `SITEGATE__SERVER__LISTEN_ADDR`.
pub const ENV_PREFIX: &str = "SITEGATE";

/// Main configuration for the Sitegate service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SitegateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Admission control configuration
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Response security headers
    #[serde(default)]
    pub security_headers: SecurityHeadersConfig,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Derive the client address from `X-Forwarded-For` / `X-Real-IP`
    #[serde(default = "default_true")]
    pub trust_forwarded_headers: bool,

    /// Redirect plain-HTTP requests (per `X-Forwarded-Proto`) to HTTPS
    #[serde(default)]
    pub enforce_https: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            trust_forwarded_headers: true,
            enforce_https: false,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_true() -> bool {
    true
}

/// Admission control configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Ordered route policies
    #[serde(default)]
    pub policies: PolicyTableConfig,

    /// Interval between reaper cycles in seconds
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_secs: u64,

    /// Initial capacity of the window store
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,

    /// Static asset paths that skip admission and headers
    #[serde(default)]
    pub exempt: ExemptPaths,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            policies: PolicyTableConfig::default(),
            reaper_interval_secs: default_reaper_interval(),
            initial_capacity: default_initial_capacity(),
            exempt: ExemptPaths::default(),
        }
    }
}

impl AdmissionConfig {
    /// Interval between reaper cycles.
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }
}

fn default_reaper_interval() -> u64 {
    3600
}

fn default_initial_capacity() -> usize {
    10000
}

/// Security headers attached to every response.
///
/// Optional headers set to `None` are not emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityHeadersConfig {
    /// Master switch for the whole header set
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// `Content-Security-Policy`
    #[serde(default = "default_csp")]
    pub content_security_policy: Option<String>,

    /// `Strict-Transport-Security`
    #[serde(default)]
    pub hsts: HstsConfig,

    /// `X-Frame-Options`
    #[serde(default = "default_frame_options")]
    pub frame_options: Option<String>,

    /// Emit `X-Content-Type-Options: nosniff`
    #[serde(default = "default_true")]
    pub nosniff: bool,

    /// `Referrer-Policy`
    #[serde(default = "default_referrer_policy")]
    pub referrer_policy: Option<String>,

    /// `X-XSS-Protection`
    #[serde(default = "default_xss_protection")]
    pub xss_protection: Option<String>,

    /// `Permissions-Policy`
    #[serde(default = "default_permissions_policy")]
    pub permissions_policy: Option<String>,

    /// Replacement for the `Server` header
    #[serde(default = "default_server_name")]
    pub server_name: Option<String>,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            content_security_policy: default_csp(),
            hsts: HstsConfig::default(),
            frame_options: default_frame_options(),
            nosniff: true,
            referrer_policy: default_referrer_policy(),
            xss_protection: default_xss_protection(),
            permissions_policy: default_permissions_policy(),
            server_name: default_server_name(),
        }
    }
}

fn default_csp() -> Option<String> {
    Some(
        "default-src 'self'; script-src 'self' 'unsafe-inline' 'unsafe-eval' cdn.jsdelivr.net; \
         style-src 'self' 'unsafe-inline'; img-src 'self' data: https:; font-src 'self' data:; \
         connect-src 'self' https: wss:; frame-ancestors 'none';"
            .to_string(),
    )
}

fn default_frame_options() -> Option<String> {
    Some("DENY".to_string())
}

fn default_referrer_policy() -> Option<String> {
    Some("strict-origin-when-cross-origin".to_string())
}

fn default_xss_protection() -> Option<String> {
    Some("1; mode=block".to_string())
}

fn default_permissions_policy() -> Option<String> {
    Some(
        "geolocation=(), microphone=(), camera=(), payment=(), usb=(), accelerometer=(), \
         gyroscope=(), magnetometer=()"
            .to_string(),
    )
}

fn default_server_name() -> Option<String> {
    Some("Sitegate".to_string())
}

/// `Strict-Transport-Security` settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HstsConfig {
    /// Emit the header
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// `max-age` in seconds
    #[serde(default = "default_hsts_max_age")]
    pub max_age: u64,

    /// Append `includeSubDomains`
    #[serde(default = "default_true")]
    pub include_subdomains: bool,

    /// Append `preload`
    #[serde(default = "default_true")]
    pub preload: bool,
}

impl Default for HstsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age: default_hsts_max_age(),
            include_subdomains: true,
            preload: true,
        }
    }
}

fn default_hsts_max_age() -> u64 {
    31_536_000
}

impl SitegateConfig {
    /// Load configuration from a YAML file, then apply `SITEGATE__*` environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let name = path
            .to_str()
            .ok_or_else(|| SitegateError::Config(format!("non UTF-8 path: {}", path.display())))?;

        let config = config::Config::builder()
            .add_source(config::File::new(name, config::FileFormat::Yaml))
            .add_source(Self::environment())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Build configuration from defaults plus `SITEGATE__*` environment overrides.
    pub fn from_env() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(Self::environment())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| SitegateError::Config(format!("Failed to parse configuration: {}", e)))
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }

    /// Build the validated route table.
    pub fn route_policies(&self) -> Result<RoutePolicies> {
        RoutePolicies::from_config(&self.admission.policies)
    }

    /// Build the validated security header set.
    pub fn security_headers(&self) -> Result<SecurityHeaders> {
        SecurityHeaders::from_config(&self.security_headers)
    }

    /// Check every section, failing on the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.admission.reaper_interval_secs == 0 {
            return Err(SitegateError::Config(
                "admission.reaper_interval_secs must be at least 1".to_string(),
            ));
        }
        self.route_policies()?;
        self.security_headers()?;
        Ok(())
    }
}
