//! # Engine Errors
//!
//! Error kinds surfaced by the credential issuance engine. Each variant
//! carries the structured data a caller needs to react programmatically
//! (exchange id, observed/expected state, …) rather than an opaque string.

use thiserror::Error;

use crate::state::ExchangeState;

/// Errors returned by engine flow functions.
#[derive(Error, Debug)]
pub enum Error {
    /// A flow was invoked while the exchange record was in a state outside
    /// the event's legal source-state set (spec §4.1).
    #[error(
        "exchange {exchange_id} in state {observed:?}, expected one of {expected}"
    )]
    WrongState {
        /// Exchange the flow was invoked against.
        exchange_id: String,
        /// State the record was actually found in (`None` after abandonment).
        observed: Option<ExchangeState>,
        /// Human-readable description of the legal source states.
        expected: &'static str,
    },

    /// No credential definition posted by this issuer matches the
    /// proposal's selectors.
    #[error("no usable credential definition for proposal selectors {selectors}")]
    NoUsableCredDef {
        /// Debug rendering of the selector tag query that failed to match.
        selectors: String,
    },

    /// The preview's attribute set does not equal the schema's attribute set.
    #[error("preview attributes {preview:?} do not match schema attributes {schema:?}")]
    PreviewMismatch {
        /// Attribute names carried by the proposal preview.
        preview: Vec<String>,
        /// Attribute names declared by the schema.
        schema: Vec<String>,
    },

    /// An inbound message did not carry exactly one attachment.
    #[error("expected exactly one attachment, found {found}")]
    BadAttachmentCount {
        /// Attachment count actually observed.
        found: usize,
    },

    /// Retries were exhausted waiting for a posted revocation registry.
    #[error("no active revocation registry for credential definition {credential_definition_id}")]
    NoActiveRevocationRegistry {
        /// Credential definition awaiting a registry.
        credential_definition_id: String,
    },

    /// The issuer capability reported the active registry has no slots left
    /// and retries were exhausted.
    #[error("revocation registry {registry_id} is full")]
    RevocationRegistryFull {
        /// Registry that reported itself full.
        registry_id: String,
    },

    /// A record lookup by key missed.
    #[error("no stored record for key {key}")]
    StorageNotFound {
        /// Lookup key (e.g. `(connection_id, thread_id)` rendering).
        key: String,
    },

    /// The holder capability rejected storage of a received credential.
    #[error("holder wallet rejected credential storage: {reason}")]
    HolderStoreFailure {
        /// Reason reported by the holder capability.
        reason: String,
    },

    /// `save` lost a compare-and-set race: another task persisted this
    /// exchange between this flow's load and its save (spec §4.5, §9 "the
    /// source comments flag this as FIXME"). The caller should reload the
    /// record and re-enter the flow from the top.
    #[error("exchange {exchange_id} was concurrently modified, reload and retry")]
    Conflict {
        /// Exchange whose version check failed.
        exchange_id: String,
    },

    /// Catch-all for failures in injected capabilities (ledger, issuer,
    /// holder, cache, responder, record store) not covered by a more
    /// specific variant above.
    #[error("{0}")]
    Provider(#[from] anyhow::Error),
}

/// Construct a [`Error::WrongState`] with the current record state.
#[macro_export]
macro_rules! wrong_state {
    ($id:expr, $observed:expr, $expected:expr) => {
        $crate::error::Error::WrongState {
            exchange_id: $id.to_string(),
            observed: $observed,
            expected: $expected,
        }
    };
}

/// Wrap an arbitrary error string as [`Error::Provider`].
#[macro_export]
macro_rules! server_err {
    ($fmt:expr $(, $arg:expr)*) => {
        $crate::error::Error::Provider(::anyhow::anyhow!($fmt $(, $arg)*))
    };
}

/// Convenience result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;
