//! Production vs. development behavior.

/// How much diagnostic detail leaks into responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationMode {
    /// Error bodies are minimal sanitized text.
    #[default]
    Production,
    /// Full diagnostic messages pass through to the client.
    Development,
}

impl OperationMode {
    /// The error text exposed to the client for a given diagnostic.
    pub fn error_message<'a>(&self, diagnostic: &'a str) -> &'a str {
        match self {
            Self::Production => "",
            Self::Development => diagnostic,
        }
    }

    /// True in development mode.
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}
