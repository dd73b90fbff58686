//! Routing key patterns and their broker bindings.

/// The broker's multi-segment wildcard token.
pub const BROKER_WILDCARD: &str = "#";

/// A parsed routing-key pattern.
///
/// Only the literal `#` and a final `*` are special. Everything else,
/// including malformed input, is an exact key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Pattern {
    /// Matches exactly one routing key.
    Exact(String),
    /// Matches any routing key starting with the prefix (`prefix*`).
    Prefix(String),
    /// Matches every routing key (`#`).
    CatchAll,
}

impl Pattern {
    /// Parses a pattern string.
    pub fn parse(pattern: &str) -> Self {
        if pattern == "#" {
            Pattern::CatchAll
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            Pattern::Prefix(prefix.to_string())
        } else {
            Pattern::Exact(pattern.to_string())
        }
    }

    /// Returns true if the routing key matches this pattern.
    pub fn matches(&self, routing_key: &str) -> bool {
        match self {
            Pattern::Exact(key) => key == routing_key,
            Pattern::Prefix(prefix) => routing_key.starts_with(prefix.as_str()),
            Pattern::CatchAll => true,
        }
    }

    /// Translates the pattern into the broker's binding syntax.
    ///
    /// `#` binds to everything, `prefix*` becomes `prefix#`, and an exact key
    /// is bound verbatim.
    pub fn binding_key(&self) -> String {
        match self {
            Pattern::Exact(key) => key.clone(),
            Pattern::Prefix(prefix) => format!("{prefix}{BROKER_WILDCARD}"),
            Pattern::CatchAll => BROKER_WILDCARD.to_string(),
        }
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pattern::Exact(key) => f.write_str(key),
            Pattern::Prefix(prefix) => write!(f, "{prefix}*"),
            Pattern::CatchAll => f.write_str("#"),
        }
    }
}

/// Translates an internal pattern string into a broker binding key.
pub fn binding_key(pattern: &str) -> String {
    Pattern::parse(pattern).binding_key()
}
