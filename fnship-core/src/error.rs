//! Custom error types for fnship.
//!
//! Explicit enum error types throughout the core.
//! No `Box<dyn Error>`, no `anyhow::Result` - all errors are strongly typed.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Hook;

/// Top-level error type for the deployment engine.
#[derive(Debug, Error)]
pub enum ShipError {
    // =========================================================================
    // Configuration Errors - Fail-Fast at Open
    // =========================================================================
    #[error("Config validation error: {0}")]
    ConfigValidation(#[from] ConfigValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error in {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Invalid name template '{template}': {reason}")]
    NameTemplate { template: String, reason: String },

    #[error("Invalid ignore pattern in {path}: {message}")]
    Ignore { path: PathBuf, message: String },

    // =========================================================================
    // Plugin Pipeline Errors
    // =========================================================================
    #[error("Plugin '{name}' is not registered")]
    UnknownPlugin { name: String },

    #[error("Plugin '{name}' is already registered")]
    DuplicatePlugin { name: String },

    #[error("{hook} hook of plugin '{plugin}' failed: {source}")]
    Plugin {
        plugin: String,
        hook: Hook,
        #[source]
        source: Box<ShipError>,
    },

    #[error("Hook command failed: {0}")]
    Hook(#[from] HookError),

    // =========================================================================
    // Build Errors
    // =========================================================================
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    // =========================================================================
    // Remote Errors - Only NotFound Is Recovered Locally
    // =========================================================================
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Rollback error: {0}")]
    Rollback(#[from] RollbackError),

    #[error("Invocation error: {0}")]
    Invoke(#[from] InvokeError),

    // =========================================================================
    // Project Errors
    // =========================================================================
    #[error("function {name}: {source}")]
    Function {
        name: String,
        #[source]
        source: Box<ShipError>,
    },

    #[error("no function loaded")]
    NoFunctionLoaded,

    #[error("function {name} has not been opened")]
    NotOpen { name: String },

    #[error("Batch task failed: {message}")]
    Task { message: String },

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("Serialization error: {context} - {message}")]
    Serialization {
        context: &'static str,
        message: String,
    },

    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl ShipError {
    /// Wrap an error with the plugin and hook it came from.
    pub fn in_plugin(self, plugin: impl Into<String>, hook: Hook) -> Self {
        Self::Plugin {
            plugin: plugin.into(),
            hook,
            source: Box::new(self),
        }
    }

    /// Wrap an error with the function it came from.
    pub fn in_function(self, name: impl Into<String>) -> Self {
        Self::Function {
            name: name.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error, or the error it wraps, is a remote "not found".
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Remote(e) => e.is_not_found(),
            Self::Plugin { source, .. } | Self::Function { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

/// Required configuration missing or zero after default resolution.
#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {field} in function '{function}'")]
    MissingRequiredField {
        field: &'static str,
        function: String,
    },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },
}

/// A user-defined shell hook exited unsuccessfully.
#[derive(Debug, Error)]
#[error("{hook} hook `{command}` failed: {output}")]
pub struct HookError {
    pub hook: Hook,
    pub command: String,
    /// Combined stdout and stderr of the command.
    pub output: String,
}

/// Failures while reading or writing archive entries.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive is closed - no further entries can be written")]
    Closed,

    #[error("Duplicate archive entry: {path}")]
    DuplicateEntry { path: String },

    #[error("Only regular files are supported: {path}")]
    NotRegularFile { path: PathBuf },

    #[error("Archive IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Errors reported by the remote function platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Resource conflict: {resource} already exists")]
    Conflict { resource: String },

    #[error("{code}: {message}")]
    Api { code: String, message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },
}

impl RemoteError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn conflict(resource: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Rollback preconditions that were not met.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RollbackError {
    #[error("Can't rollback. Only one version deployed.")]
    SingleVersion,

    #[error("Specified version currently deployed: {version}")]
    VersionCurrentlyDeployed { version: String },
}

/// An error raised by the function code during invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct InvokeError {
    pub message: String,
    pub error_type: String,
    pub stack_trace: Vec<String>,
    /// True when the function reported the error itself rather than crashing.
    pub handled: bool,
    /// Decoded tail of the execution log.
    pub logs: String,
}

/// Result type alias using ShipError.
pub type ShipResult<T> = Result<T, ShipError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_display() {
        let err = ConfigValidationError::MissingRequiredField {
            field: "runtime",
            function: "api".to_string(),
        };
        assert!(err.to_string().contains("runtime"));
        assert!(err.to_string().contains("api"));
    }

    #[test]
    fn test_plugin_wrapping_keeps_not_found() {
        let err: ShipError = RemoteError::not_found("fn").into();
        let wrapped = err.in_plugin("hooks", Hook::Deploy).in_function("api");
        assert!(wrapped.is_not_found());
        assert!(wrapped.to_string().starts_with("function api:"));
    }

    #[test]
    fn test_error_chain() {
        let err: ShipError = RollbackError::SingleVersion.into();
        assert!(matches!(err, ShipError::Rollback(_)));
        assert!(err.to_string().contains("Only one version deployed"));
    }
}
