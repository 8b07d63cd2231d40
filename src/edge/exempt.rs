//! Paths that bypass the admission gate entirely.

use serde::{Deserialize, Serialize};

/// Static asset paths served without admission control or added headers.
///
/// A path is exempt when it starts with any prefix or equals any exact entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExemptPaths {
    /// Path prefixes, e.g. build output directories
    #[serde(default)]
    pub prefixes: Vec<String>,

    /// Exact paths, e.g. `/robots.txt`
    #[serde(default)]
    pub exact: Vec<String>,
}

impl Default for ExemptPaths {
    fn default() -> Self {
        Self {
            prefixes: vec!["/_next/static".to_string(), "/_next/image".to_string()],
            exact: vec![
                "/favicon.ico".to_string(),
                "/robots.txt".to_string(),
                "/sitemap.xml".to_string(),
                "/manifest.json".to_string(),
            ],
        }
    }
}

impl ExemptPaths {
    /// An empty list; every path is gated.
    pub fn none() -> Self {
        Self {
            prefixes: Vec::new(),
            exact: Vec::new(),
        }
    }

    /// Whether `path` skips admission.
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exact.iter().any(|p| p == path)
            || self
                .prefixes
                .iter()
                .any(|p| !p.is_empty() && path.starts_with(p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_assets_are_exempt() {
        let exempt = ExemptPaths::default();

        assert!(exempt.is_exempt("/_next/static/chunks/main.js"));
        assert!(exempt.is_exempt("/_next/image?url=%2Flogo.png&w=64"));
        assert!(exempt.is_exempt("/favicon.ico"));
        assert!(exempt.is_exempt("/robots.txt"));
        assert!(exempt.is_exempt("/sitemap.xml"));
        assert!(exempt.is_exempt("/manifest.json"));
    }

    #[test]
    fn test_pages_and_api_are_gated() {
        let exempt = ExemptPaths::default();

        assert!(!exempt.is_exempt("/"));
        assert!(!exempt.is_exempt("/login"));
        assert!(!exempt.is_exempt("/api/auth/login"));
        assert!(!exempt.is_exempt("/sites/robots.txt"));
        assert!(!exempt.is_exempt("/_next/data/build/index.json"));
    }

    #[test]
    fn test_empty_prefix_exempts_nothing() {
        let exempt = ExemptPaths {
            prefixes: vec![String::new()],
            exact: Vec::new(),
        };
        assert!(!exempt.is_exempt("/"));
        assert!(!ExemptPaths::none().is_exempt("/favicon.ico"));
    }
}
