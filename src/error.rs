//! Error types for the autoreply filter.
//!
//! Each failure class of the pipeline has its own enum so the orchestrator
//! can decide, per class, whether a failure stops the run, only the current
//! reply, or nothing at all.

use std::path::PathBuf;

/// Settings file errors. Terminate the invocation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("settings file {} not found, a default one was written", .0.display())]
    Missing(PathBuf),

    #[error("failed to read settings file {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid settings: {0}")]
    Invalid(String),

    #[error("failed to write settings file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no home directory could be determined for {0}")]
    NoHome(&'static str),
}

/// Body template could not be resolved. Degrades to an empty body.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to read HTML body {}: {source}", .path.display())]
    HtmlBody {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single reply could not be generated.
#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error("cannot determine MIME type of attachment {}", .0.display())]
    UnknownMimeType(PathBuf),

    #[error("failed to read attachment {}: {source}", .path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid {field} address {value:?}: {source}")]
    Address {
        field: &'static str,
        value: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("invalid content type {0:?}")]
    ContentType(String),

    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
}

/// The original message could not be handed back to the MTA.
#[derive(Debug, thiserror::Error)]
pub enum ReinjectError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write message to {program} ({status}): {source}")]
    Write {
        program: String,
        status: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Status { program: String, status: String },

    #[error("invalid envelope: {0}")]
    Envelope(String),

    #[error("SMTP re-injection failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// A generated reply could not be delivered.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Compose(#[from] ReplyError),

    #[error("TLS setup for {host} failed: {source}")]
    Tls {
        host: String,
        #[source]
        source: lettre::transport::smtp::Error,
    },

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Failures that end a pipeline run early.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("re-injection failed: {0}")]
    Reinject(#[from] ReinjectError),
}
