//! Window key generation and handling.

/// Client identity shared by every request whose address could not be derived.
///
/// All such traffic is pooled into one window per policy.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// A key that uniquely identifies a counting window.
///
/// The key pairs the client identity with the name of the policy the request
/// resolved to, so each client has an independent window per route class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    /// Client identity, usually an IP address
    pub client: String,
    /// Name of the policy the window is counted against
    pub policy: String,
}

impl WindowKey {
    /// Create a new window key for a client and policy.
    ///
    /// An empty or whitespace-only client falls back to [`UNKNOWN_CLIENT`].
    pub fn new(client: &str, policy: &str) -> Self {
        let client = client.trim();
        let client = if client.is_empty() {
            UNKNOWN_CLIENT
        } else {
            client
        };

        Self {
            client: client.to_string(),
            policy: policy.to_string(),
        }
    }

    /// Convert the window key to a string representation.
    ///
    /// This is useful for logging and debugging.
    pub fn to_string_key(&self) -> String {
        format!("{}|{}", self.client, self.policy)
    }
}

impl std::fmt::Display for WindowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}
