//! Rate policies and route classification.
//!
//! A request path is mapped to one of an ordered set of named policies. Rules
//! are checked in order and the first exact or prefix match wins; a path that
//! matches no rule falls through to the mandatory default policy.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, SitegateError};

/// Name of the catch-all policy.
pub const DEFAULT_POLICY: &str = "default";

/// Immutable limit applied to one route class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatePolicy {
    name: String,
    max_requests: u64,
    window_ms: u64,
}

impl RatePolicy {
    /// Create a validated policy.
    pub fn new(name: impl Into<String>, max_requests: u64, window_ms: u64) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SitegateError::Config(
                "policy name must not be empty".to_string(),
            ));
        }
        if max_requests == 0 {
            return Err(SitegateError::Config(format!(
                "policy '{}': max_requests must be at least 1",
                name
            )));
        }
        if window_ms == 0 {
            return Err(SitegateError::Config(format!(
                "policy '{}': window_ms must be at least 1",
                name
            )));
        }

        Ok(Self {
            name,
            max_requests,
            window_ms,
        })
    }

    /// Policy name, also used as part of the window key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requests admitted per window.
    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Serialized form of a route rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRuleConfig {
    /// Policy name
    pub name: String,
    /// Requests allowed per window
    pub max_requests: u64,
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Path prefixes that select this policy
    #[serde(default)]
    pub prefixes: Vec<String>,
    /// Exact paths that select this policy
    #[serde(default)]
    pub exact: Vec<String>,
}

/// Serialized form of the catch-all policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultPolicyConfig {
    /// Requests allowed per window
    pub max_requests: u64,
    /// Window length in milliseconds
    pub window_ms: u64,
}

/// Serialized form of the whole route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTableConfig {
    /// Ordered rules; earlier rules take precedence
    #[serde(default)]
    pub rules: Vec<RouteRuleConfig>,
    /// Policy for paths no rule matches
    pub default: DefaultPolicyConfig,
}

impl Default for PolicyTableConfig {
    fn default() -> Self {
        let minute = 60_000;
        Self {
            rules: vec![
                RouteRuleConfig {
                    name: "sensitive".to_string(),
                    max_requests: 10,
                    window_ms: minute,
                    prefixes: vec![
                        "/api/admin/".to_string(),
                        "/api/push/send".to_string(),
                        "/api/auth/login".to_string(),
                        "/api/auth/signup".to_string(),
                    ],
                    exact: Vec::new(),
                },
                RouteRuleConfig {
                    name: "auth".to_string(),
                    max_requests: 5,
                    window_ms: minute,
                    prefixes: vec!["/api/auth/".to_string(), "/auth/".to_string()],
                    exact: vec!["/login".to_string(), "/signup".to_string()],
                },
            ],
            default: DefaultPolicyConfig {
                max_requests: 100,
                window_ms: minute,
            },
        }
    }
}

#[derive(Debug, Clone)]
struct RouteRule {
    policy: Arc<RatePolicy>,
    prefixes: Vec<String>,
    exact: Vec<String>,
}

impl RouteRule {
    fn matches(&self, path: &str) -> bool {
        self.exact.iter().any(|p| p == path)
            || self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }
}

/// Validated, ordered route table.
#[derive(Debug, Clone)]
pub struct RoutePolicies {
    rules: Vec<RouteRule>,
    default: Arc<RatePolicy>,
}

impl RoutePolicies {
    /// Build and validate a route table from its serialized form.
    pub fn from_config(config: &PolicyTableConfig) -> Result<Self> {
        RatePolicy::new(
            DEFAULT_POLICY,
            config.default.max_requests,
            config.default.window_ms,
        )?;

        let mut seen: HashSet<&str> = HashSet::new();
        seen.insert(DEFAULT_POLICY);

        for rule in &config.rules {
            if !seen.insert(rule.name.as_str()) {
                return Err(SitegateError::Config(format!(
                    "duplicate policy name '{}'",
                    rule.name
                )));
            }
            if rule.prefixes.is_empty() && rule.exact.is_empty() {
                return Err(SitegateError::Config(format!(
                    "policy '{}' has no prefixes or exact paths",
                    rule.name
                )));
            }
            if rule.prefixes.iter().chain(&rule.exact).any(|p| p.is_empty()) {
                return Err(SitegateError::Config(format!(
                    "policy '{}' contains an empty path matcher",
                    rule.name
                )));
            }
            RatePolicy::new(rule.name.clone(), rule.max_requests, rule.window_ms)?;
        }

        Ok(Self::build(config))
    }

    fn build(config: &PolicyTableConfig) -> Self {
        let rules = config
            .rules
            .iter()
            .map(|rule| RouteRule {
                policy: Arc::new(RatePolicy {
                    name: rule.name.clone(),
                    max_requests: rule.max_requests,
                    window_ms: rule.window_ms,
                }),
                prefixes: rule.prefixes.clone(),
                exact: rule.exact.clone(),
            })
            .collect();

        Self {
            rules,
            default: Arc::new(RatePolicy {
                name: DEFAULT_POLICY.to_string(),
                max_requests: config.default.max_requests,
                window_ms: config.default.window_ms,
            }),
        }
    }

    /// Load a route table from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PolicyTableConfig = serde_yaml::from_str(yaml)
            .map_err(|e| SitegateError::Config(format!("Failed to parse policy table: {}", e)))?;
        Self::from_config(&config)
    }

    /// Resolve the policy that applies to `path`.
    ///
    /// Always returns a policy; unmatched paths get the default.
    pub fn resolve(&self, path: &str) -> &Arc<RatePolicy> {
        self.rules
            .iter()
            .find(|rule| rule.matches(path))
            .map(|rule| &rule.policy)
            .unwrap_or(&self.default)
    }

    /// Look up a policy by name.
    pub fn get(&self, name: &str) -> Option<&Arc<RatePolicy>> {
        if name == DEFAULT_POLICY {
            return Some(&self.default);
        }
        self.rules
            .iter()
            .map(|rule| &rule.policy)
            .find(|policy| policy.name() == name)
    }

    /// The catch-all policy.
    pub fn default_policy(&self) -> &Arc<RatePolicy> {
        &self.default
    }

    /// Number of policies, including the default.
    pub fn len(&self) -> usize {
        self.rules.len() + 1
    }

    /// Always false: the default policy is always present.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for RoutePolicies {
    fn default() -> Self {
        Self::build(&PolicyTableConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let policies = RoutePolicies::from_config(&PolicyTableConfig::default()).unwrap();
        assert_eq!(policies.len(), 3);
        assert_eq!(policies.default_policy().name(), DEFAULT_POLICY);
    }

    #[test]
    fn test_resolve_builtin_classes() {
        let policies = RoutePolicies::default();

        let sensitive = policies.resolve("/api/admin/login");
        assert_eq!(sensitive.name(), "sensitive");
        assert_eq!(sensitive.max_requests(), 10);
        assert_eq!(sensitive.window_ms(), 60_000);
        assert_eq!(sensitive.window(), Duration::from_secs(60));

        assert_eq!(policies.resolve("/api/push/send").name(), "sensitive");
        assert_eq!(policies.resolve("/api/auth/login").name(), "sensitive");
        assert_eq!(policies.resolve("/api/auth/callback").name(), "auth");
        assert_eq!(policies.resolve("/login").name(), "auth");
        assert_eq!(policies.resolve("/login/help").name(), DEFAULT_POLICY);

        let default = policies.resolve("/");
        assert_eq!(default.name(), DEFAULT_POLICY);
        assert_eq!(default.max_requests(), 100);
    }

    #[test]
    fn test_rule_order_takes_precedence() {
        let yaml = r#"
rules:
  - name: narrow
    max_requests: 1
    window_ms: 1000
    prefixes: ["/api/a/"]
  - name: broad
    max_requests: 50
    window_ms: 1000
    prefixes: ["/api/"]
default:
  max_requests: 100
  window_ms: 1000
"#;
        let policies = RoutePolicies::from_yaml(yaml).unwrap();
        assert_eq!(policies.resolve("/api/a/x").name(), "narrow");
        assert_eq!(policies.resolve("/api/b/x").name(), "broad");
        assert_eq!(policies.resolve("/other").name(), DEFAULT_POLICY);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let policies = RoutePolicies::default();
        for path in ["/api/admin/users", "/signup", "/sites/foo", ""] {
            let first = policies.resolve(path).clone();
            let second = policies.resolve(path).clone();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_get_by_name() {
        let policies = RoutePolicies::default();
        assert_eq!(policies.get("auth").unwrap().max_requests(), 5);
        assert_eq!(policies.get(DEFAULT_POLICY).unwrap().max_requests(), 100);
        assert!(policies.get("missing").is_none());
    }

    #[test]
    fn test_zero_max_requests_rejected() {
        let yaml = r#"
rules:
  - name: broken
    max_requests: 0
    window_ms: 1000
    prefixes: ["/x"]
default:
  max_requests: 10
  window_ms: 1000
"#;
        let err = RoutePolicies::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, SitegateError::Config(_)));
        assert!(err.to_string().contains("max_requests"));
    }

    #[test]
    fn test_zero_default_window_rejected() {
        let yaml = r#"
default:
  max_requests: 10
  window_ms: 0
"#;
        assert!(matches!(
            RoutePolicies::from_yaml(yaml),
            Err(SitegateError::Config(_))
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let yaml = r#"
rules:
  - name: default
    max_requests: 1
    window_ms: 1000
    prefixes: ["/x"]
default:
  max_requests: 10
  window_ms: 1000
"#;
        let err = RoutePolicies::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_rule_without_matchers_rejected() {
        let yaml = r#"
rules:
  - name: orphan
    max_requests: 1
    window_ms: 1000
default:
  max_requests: 10
  window_ms: 1000
"#;
        assert!(RoutePolicies::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_malformed_yaml_rejected() {
        assert!(matches!(
            RoutePolicies::from_yaml("rules: [oops"),
            Err(SitegateError::Config(_))
        ));
    }
}
