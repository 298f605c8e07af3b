//! Error types for the BBS state cache and template extraction.

use thiserror::Error;

use crate::client::ClientError;

/// Failures surfaced by the cache, the projectors and the template extractor.
///
/// Every variant is local to one cycle, one record or one key. None of them
/// is fatal to the process.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The cache could not be constructed (bad endpoint, unreadable CA file...).
    #[error("cache configuration error: {0}")]
    Configuration(String),

    /// One of the two list calls failed; the refresh cycle was aborted.
    #[error("failed to list {what} from BBS: {source}")]
    RemoteFetch {
        what: &'static str,
        #[source]
        source: ClientError,
    },

    /// The auto-discovery payload of one instance is not a JSON object.
    #[error("cannot parse auto-discovery payload of {owner}: {message}")]
    PayloadParse { owner: String, message: String },

    /// One key of an auto-discovery payload is malformed.
    #[error("cannot parse config template {owner}/{key}: {message}")]
    TemplateParse {
        owner: String,
        key: String,
        message: String,
    },

    /// The process GUID is too short to slice the app GUID out of it.
    #[error("process guid {process_guid:?} is shorter than {expected} characters")]
    IdentifierFormat {
        process_guid: String,
        expected: usize,
    },
}

impl DiscoveryError {
    /// Short, stable label used for metrics and health output.
    pub fn kind(&self) -> &'static str {
        match self {
            DiscoveryError::Configuration(_) => "configuration",
            DiscoveryError::RemoteFetch { .. } => "remote_fetch",
            DiscoveryError::PayloadParse { .. } => "payload_parse",
            DiscoveryError::TemplateParse { .. } => "template_parse",
            DiscoveryError::IdentifierFormat { .. } => "identifier_format",
        }
    }
}
