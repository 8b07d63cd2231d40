//! Security headers applied to every response leaving the gate.

use axum::http::header::{
    CONTENT_SECURITY_POLICY, REFERRER_POLICY, SERVER, STRICT_TRANSPORT_SECURITY,
    X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::{HstsConfig, SecurityHeadersConfig};
use crate::error::{Result, SitegateError};

const PERMISSIONS_POLICY: HeaderName = HeaderName::from_static("permissions-policy");

/// Pre-validated set of response headers.
#[derive(Debug, Clone, Default)]
pub struct SecurityHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaders {
    /// Build the header set, rejecting values that are not valid header values.
    pub fn from_config(config: &SecurityHeadersConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self::default());
        }

        let mut headers = Vec::new();

        let optional = [
            (CONTENT_SECURITY_POLICY, &config.content_security_policy),
            (X_FRAME_OPTIONS, &config.frame_options),
            (REFERRER_POLICY, &config.referrer_policy),
            (X_XSS_PROTECTION, &config.xss_protection),
            (PERMISSIONS_POLICY, &config.permissions_policy),
            (SERVER, &config.server_name),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                headers.push((name.clone(), header_value(&name, value)?));
            }
        }

        if config.nosniff {
            headers.push((X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")));
        }

        if config.hsts.enabled {
            let value = build_hsts_header(&config.hsts);
            headers.push((
                STRICT_TRANSPORT_SECURITY,
                header_value(&STRICT_TRANSPORT_SECURITY, &value)?,
            ));
        }

        Ok(Self { headers })
    }

    /// Insert every configured header, replacing any value already present.
    pub fn apply(&self, headers: &mut HeaderMap) {
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }
    }

    /// Number of headers in the set.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

fn header_value(name: &HeaderName, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| SitegateError::Config(format!("invalid value for header {}: {}", name, e)))
}

fn build_hsts_header(hsts: &HstsConfig) -> String {
    let mut parts = vec![format!("max-age={}", hsts.max_age)];

    if hsts.include_subdomains {
        parts.push("includeSubDomains".to_string());
    }

    if hsts.preload {
        parts.push("preload".to_string());
    }

    parts.join("; ")
}
