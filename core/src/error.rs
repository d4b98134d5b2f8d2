//! # Error Handling
//!
//! Provides the unified `AppError` enum for failures that happen while a
//! specification is compiled or a validator is assembled.
//!
//! Validation outcomes are never reported through this type: invalid
//! requests produce `ValidationError` values inside a `ValidationResult`.

use derive_more::{Display, From};

/// The Global Error Enum.
///
/// We use `derive_more` for boilerplate.
/// Note: String errors default to `General`.
#[derive(Debug, Display, From)]
pub enum AppError {
    /// The document could not be parsed as YAML.
    #[display("YAML Error: {_0}")]
    Yaml(serde_yaml::Error),

    /// The document could not be parsed as JSON, or a shim failed to map.
    #[display("JSON Error: {_0}")]
    Json(serde_json::Error),

    /// A `pattern` keyword or path template produced an invalid regex.
    #[display("Regex Error: {_0}")]
    Regex(regex::Error),

    /// A `$ref` that does not resolve inside the document.
    #[from(ignore)]
    #[display("Reference Error: {_0}")]
    Reference(String),

    /// The document is structurally unusable for validation.
    #[from(ignore)]
    #[display("Document Error: {_0}")]
    Document(String),

    /// Generic errors.
    #[display("General Error: {_0}")]
    General(String),
}

/// Manual implementation of the standard Error trait.
impl std::error::Error for AppError {}

/// Helper type alias for Result using AppError.
pub type AppResult<T> = Result<T, AppError>;
