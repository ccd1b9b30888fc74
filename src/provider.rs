//! # Injected Capabilities
//!
//! Traits for the external collaborators the engine coordinates (spec §6).
//! None of these are implemented by this crate — the ledger, the
//! cryptographic issuer/holder, the revocation registry lifecycle, the
//! durable store, and the outbound transport are all owned by the hosting
//! agent. `crate::test_support` provides in-memory implementations used by
//! this crate's own tests.

use std::collections::BTreeMap;
use std::future::Future;

use serde_json::Value;
use thiserror::Error;

use crate::cache::Cache;
use crate::error::Result as EngineResult;
use crate::messages::OutboundMessage;
use crate::record::CredentialExchange;
use crate::revocation::{IssuerRevocationRegistryRecord, RegistryState, RevocationRegistryNeeded};

/// Ledger lookups needed to validate proposals and drive issuance (spec §6).
///
/// Implementations are expected to batch the handful of reads a single flow
/// makes (e.g. schema then cred-def) behind whatever connection pooling or
/// rate limiting the deployment needs; the engine does not hold a ledger
/// session open across suspension points other than its own lookups.
pub trait Ledger: Send + Sync {
    /// Fetch the schema identified by `schema_id`.
    fn get_schema(&self, schema_id: &str) -> impl Future<Output = anyhow::Result<Value>> + Send;

    /// Fetch the credential definition identified by `cred_def_id`.
    fn get_credential_definition(
        &self, cred_def_id: &str,
    ) -> impl Future<Output = anyhow::Result<Value>> + Send;

    /// Fetch the revocation registry definition identified by `rev_reg_id`.
    fn get_revoc_reg_def(
        &self, rev_reg_id: &str,
    ) -> impl Future<Output = anyhow::Result<Value>> + Send;

    /// Resolve the schema id a credential definition was created against.
    fn credential_definition_id2schema_id(
        &self, cred_def_id: &str,
    ) -> impl Future<Output = anyhow::Result<String>> + Send;

    /// Most recent credential definition this issuer posted to the ledger
    /// matching `tag_query`, tie-broken by the largest `epoch` tag (spec
    /// §4.2 step 1, §9 "`_match_sent_cred_def_id`"). `None` if nothing
    /// matches.
    fn find_posted_cred_def(
        &self, tag_query: &BTreeMap<&'static str, String>,
    ) -> impl Future<Output = anyhow::Result<Option<String>>> + Send;
}

/// Issuer-side cryptographic operations (spec §6).
pub trait Issuer: Send + Sync {
    /// Generate an offer payload for `cred_def_id`.
    fn create_credential_offer(
        &self, cred_def_id: &str,
    ) -> impl Future<Output = anyhow::Result<Value>> + Send;

    /// Create a credential from the given inputs. Returns the credential
    /// payload and the allocated revocation id (registry slot), if any.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerError::RevocationRegistryFull`] when a racing issuer
    /// took the last slot in `revocation_registry_id` first.
    fn create_credential(
        &self, schema: &Value, offer: &Value, request: &Value, values: &BTreeMap<String, String>,
        exchange_id: &str, revocation_registry_id: Option<&str>, tails_path: Option<&str>,
    ) -> impl Future<Output = Result<(Value, Option<String>), IssuerError>> + Send;
}

/// Errors the [`Issuer`] capability may report.
#[derive(Debug, Error)]
pub enum IssuerError {
    /// The active revocation registry has no free slots. Expected under
    /// concurrent issuance (spec §4.2, "the core concurrency hazard").
    #[error("revocation registry is full")]
    RevocationRegistryFull,
    /// Any other failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Holder-side cryptographic operations (spec §6).
pub trait Holder: Send + Sync {
    /// Create a `(request, metadata)` pair for `offer` against `cred_def`.
    fn create_credential_request(
        &self, offer: &Value, cred_def: &Value, holder_did: &str,
    ) -> impl Future<Output = anyhow::Result<(Value, Value)>> + Send;

    /// Store a received credential in the wallet, returning its local id.
    ///
    /// # Errors
    ///
    /// Returns [`HolderStoreError`] if the wallet rejects storage.
    fn store_credential(
        &self, cred_def: &Value, credential: &Value, metadata: &Value,
        mime_types: &BTreeMap<String, String>, credential_id: Option<&str>,
        rev_reg_def: Option<&Value>,
    ) -> impl Future<Output = Result<String, HolderStoreError>> + Send;

    /// Read a stored credential back by its wallet-local id.
    fn get_credential(&self, credential_id: &str) -> impl Future<Output = anyhow::Result<Value>> + Send;
}

/// Error reported by [`Holder::store_credential`] (spec §7,
/// `HolderStoreFailure`).
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct HolderStoreError {
    /// Wallet-reported error code.
    pub code: String,
    /// Wallet-reported error message.
    pub message: String,
}

/// Issuer revocation-registry lifecycle queries (spec §6).
pub trait RevocationRegistries: Send + Sync {
    /// The currently active (state `ACTIVE`) registry for
    /// `credential_definition_id`, if one exists.
    fn active_for(
        &self, credential_definition_id: &str,
    ) -> impl Future<Output = anyhow::Result<Option<IssuerRevocationRegistryRecord>>> + Send;

    /// Registry records for `credential_definition_id`, optionally filtered
    /// by `state`. Used both to check for a `POSTED` registry and, when
    /// unfiltered, to find the most-recently-created record to reuse its
    /// size (spec §4.2 step 2).
    fn query_by_cred_def(
        &self, credential_definition_id: &str, state: Option<RegistryState>,
    ) -> impl Future<Output = anyhow::Result<Vec<IssuerRevocationRegistryRecord>>> + Send;

    /// Ensure the tails file for `registry` is present locally, fetching it
    /// if needed, returning its local path.
    fn ensure_tails(
        &self, registry: &IssuerRevocationRegistryRecord,
    ) -> impl Future<Output = anyhow::Result<String>> + Send;

    /// Ensure the tails file for `revocation_registry_id` is present
    /// locally, by id rather than by record. Used by the holder side of
    /// `store_credential` (spec §4.3 step 5), which only learns the
    /// registry id from the received credential and has no
    /// [`IssuerRevocationRegistryRecord`] of its own.
    fn ensure_tails_by_id(
        &self, revocation_registry_id: &str,
    ) -> impl Future<Output = anyhow::Result<String>> + Send;

    /// Mark `registry_id` `FULL`. Idempotent: concurrent callers marking the
    /// same registry full is expected (spec §5).
    fn set_full(&self, registry_id: &str) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Asynchronous out-channel consumed by a separate revocation subsystem
/// that provisions and publishes new registries (spec §6).
pub trait NotificationSink: Send + Sync {
    /// Emit `notification`. Best-effort: the engine does not treat failure
    /// to notify as a reason to fail issuance.
    fn notify_registry_needed(
        &self, notification: RevocationRegistryNeeded,
    ) -> impl Future<Output = ()> + Send;
}

/// Outbound transport to the peer (spec §6). May be absent — see
/// `Provider::responder`.
pub trait Responder: Send + Sync {
    /// Send `message` to the peer on `connection_id`.
    fn send_reply(
        &self, message: OutboundMessage, connection_id: &str,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Durable storage for [`CredentialExchange`] records (spec §4.5).
pub trait RecordStore: Send + Sync {
    /// Look up the unique live record for `(connection_id, thread_id)`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::StorageNotFound`] on a miss.
    fn retrieve_by_connection_and_thread(
        &self, connection_id: Option<&str>, thread_id: &str,
    ) -> impl Future<Output = EngineResult<CredentialExchange>> + Send;

    /// Look up a record by thread id alone, for records not yet associated
    /// with a connection (spec §4.5, `(thread_id, no_connection)` index).
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::StorageNotFound`] on a miss.
    fn retrieve_by_thread_no_connection(
        &self, thread_id: &str,
    ) -> impl Future<Output = EngineResult<CredentialExchange>> + Send;

    /// Atomically persist `record`, updating secondary indices. `reason` is
    /// a short audit label (spec §4.5), logged but not interpreted.
    ///
    /// Implementations MUST perform the save as a compare-and-set against
    /// `record.version`: if a record already exists under `record.exchange_id`
    /// whose stored version does not equal `record.version`, the save MUST
    /// fail with [`crate::error::Error::Conflict`] rather than overwrite it,
    /// and otherwise MUST persist with the version incremented by one. This
    /// is the read-modify-write guard spec §4.5 and §9 ask implementers to
    /// add on top of the source behavior of saving without re-reading under
    /// lock. The engine does not retry a conflicted save itself — it
    /// surfaces the error so the caller reloads and re-enters the flow from
    /// the top (spec §9, optimistic-abort is this engine's chosen policy).
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Conflict`] if `record.version` does
    /// not match the currently stored version for this `exchange_id`.
    fn save(&self, record: &CredentialExchange, reason: &str) -> impl Future<Output = EngineResult<()>> + Send;

    /// Delete the record identified by `exchange_id`.
    fn delete(&self, exchange_id: &str) -> impl Future<Output = EngineResult<()>> + Send;
}

/// All capabilities a hosting agent must supply to run the engine.
///
/// `Cache` and `Responder` are associated types rather than direct
/// supertraits because both may be absent (spec §4.4, §6): a provider that
/// does not want deduplication or that has no transport configured yet
/// returns `None` from the corresponding accessor rather than implementing
/// a no-op trait.
pub trait Provider:
    Ledger + Issuer + Holder + RevocationRegistries + RecordStore + NotificationSink + Clone + Send + Sync
{
    /// Concrete dedup cache type, see [`crate::cache::Cache`].
    type Cache: Cache;

    /// The configured cache, or `None` to bypass deduplication.
    fn cache(&self) -> Option<&Self::Cache>;

    /// Concrete responder type, see [`Responder`].
    type Responder: Responder;

    /// The configured responder, or `None` if outbound transport is not
    /// yet wired up.
    fn responder(&self) -> Option<&Self::Responder>;
}
