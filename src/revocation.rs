//! # Revocation Registry Coordination
//!
//! Types describing issuer-side revocation registry lifecycle
//! (`POSTED → ACTIVE → FULL`, spec §5 "Cross-record sharing"). The registry
//! itself (accumulator, tails file) is an external capability
//! (`crate::provider::RevocationRegistry`); this module holds the metadata
//! record the engine reasons about when deciding whether to issue, rotate,
//! or wait.

use serde::{Deserialize, Serialize};

/// Lifecycle state of an issuer revocation registry record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryState {
    /// Published to the ledger but not yet the active registry for new
    /// issuance.
    Posted,
    /// The registry credentials are currently being issued into.
    Active,
    /// All slots are allocated; a new registry must take over.
    Full,
}

/// Metadata the engine holds about one issuer revocation registry.
///
/// The tails file and on-ledger accumulator are not modeled here — they
/// live behind `crate::provider::RevocationRegistry`; this is the record
/// the engine persists to track which registry is active for a credential
/// definition and how large the next one should be.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IssuerRevocationRegistryRecord {
    /// Opaque identifier for this registry record.
    pub revocation_registry_id: String,
    /// Credential definition this registry serves.
    pub credential_definition_id: String,
    /// Current lifecycle state.
    pub state: RegistryState,
    /// Maximum number of credentials this registry can hold.
    pub max_cred_num: u32,
    /// Local filesystem path of the tails file, once fetched.
    pub tails_local_path: Option<String>,
}

/// Default registry size used when no prior registry exists to copy the
/// size from (spec §4.2 step 2, "reusing the size of the most-recently-
/// created existing record if any (otherwise default)").
pub const DEFAULT_REGISTRY_SIZE: u32 = 1000;

/// Asynchronous signal that a new revocation registry should be
/// provisioned and published, consumed by a separate revocation subsystem
/// (spec §6, "Notification out-channel").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RevocationRegistryNeeded {
    /// Credential definition the new registry is for.
    pub credential_definition_id: String,
    /// Suggested size for the new registry.
    pub size: Option<u32>,
    /// Always `true` — the engine never asks for manual registry creation.
    pub auto_create_rev_reg: bool,
}

impl RevocationRegistryNeeded {
    /// Build a notification for `credential_definition_id` with an
    /// optional suggested `size`.
    #[must_use]
    pub fn new(credential_definition_id: impl Into<String>, size: Option<u32>) -> Self {
        Self {
            credential_definition_id: credential_definition_id.into(),
            size,
            auto_create_rev_reg: true,
        }
    }
}
