//! # In-Memory Test Doubles
//!
//! A single [`MockProvider`] implementing every capability trait in
//! `crate::provider`, backed by `HashMap`s behind one `std::sync::Mutex`
//! (grounded on `crates/test-utils/src/store/issuance.rs` and
//! `src/test_utils/issuer.rs` in the corpus this engine was built
//! alongside). No real cryptography: credential and proof payloads are
//! opaque JSON the mock round-trips, not valid indy objects.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use crate::cache::{Cache, CacheLease};
use crate::error::{Error, Result};
use crate::messages::OutboundMessage;
use crate::provider::{
    Holder, HolderStoreError, Issuer, IssuerError, Ledger, NotificationSink, Provider, RecordStore,
    Responder, RevocationRegistries,
};
use crate::record::CredentialExchange;
use crate::revocation::{IssuerRevocationRegistryRecord, RegistryState, RevocationRegistryNeeded};

#[derive(Default)]
struct Inner {
    schemas: HashMap<String, Value>,
    cred_defs: HashMap<String, Value>,
    cred_def_schema: HashMap<String, String>,
    rev_reg_defs: HashMap<String, Value>,
    posted_cred_defs: Vec<(String, BTreeMap<String, String>)>,
    registries: Vec<IssuerRevocationRegistryRecord>,
    registry_slots: HashMap<String, u32>,
    stored_credentials: HashMap<String, Value>,
    records: HashMap<String, CredentialExchange>,
    by_thread: HashMap<(Option<String>, String), String>,
    sent: Vec<(OutboundMessage, String)>,
    notifications: Vec<RevocationRegistryNeeded>,
    cache: HashMap<String, (Value, Instant)>,
    offer_calls: u32,
    request_calls: u32,
    credential_calls: u32,
    fail_storage: bool,
}

/// Fully in-memory [`Provider`] for tests.
#[derive(Clone)]
pub struct MockProvider {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// A fresh provider with nothing seeded.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Register a schema with the given attribute names.
    pub fn seed_schema(&self, schema_id: &str, attr_names: &[&str]) {
        let mut inner = self.inner.lock().unwrap();
        inner.schemas.insert(schema_id.to_string(), json!({"id": schema_id, "attrNames": attr_names}));
    }

    /// Register a credential definition against `schema_id`, optionally
    /// revocable, and mark it posted with `tags` for
    /// [`Ledger::find_posted_cred_def`] lookups.
    pub fn seed_cred_def(&self, cred_def_id: &str, schema_id: &str, revocable: bool, tags: &[(&str, &str)]) {
        let mut inner = self.inner.lock().unwrap();
        let mut value = json!({"id": cred_def_id, "schemaId": schema_id});
        if revocable {
            value["value"] = json!({"revocation": {}});
        }
        inner.cred_defs.insert(cred_def_id.to_string(), value);
        inner.cred_def_schema.insert(cred_def_id.to_string(), schema_id.to_string());
        let tag_map = tags.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        inner.posted_cred_defs.push((cred_def_id.to_string(), tag_map));
    }

    /// Register a revocation registry record with `slots` free cred
    /// allocations.
    pub fn seed_registry(&self, registry: IssuerRevocationRegistryRecord, slots: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.registry_slots.insert(registry.revocation_registry_id.clone(), slots);
        inner.registries.push(registry);
    }

    /// Register a revocation registry definition for
    /// [`Ledger::get_revoc_reg_def`].
    pub fn seed_revoc_reg_def(&self, rev_reg_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.rev_reg_defs.insert(rev_reg_id.to_string(), json!({"id": rev_reg_id}));
    }

    /// Messages handed to [`Responder::send_reply`], in order.
    #[must_use]
    pub fn sent_messages(&self) -> Vec<(OutboundMessage, String)> {
        self.inner.lock().unwrap().sent.clone()
    }

    /// Notifications handed to [`NotificationSink::notify_registry_needed`].
    #[must_use]
    pub fn notifications(&self) -> Vec<RevocationRegistryNeeded> {
        self.inner.lock().unwrap().notifications.clone()
    }

    /// Remaining free slots tracked for `registry_id`, for assertions.
    #[must_use]
    pub fn free_slots(&self, registry_id: &str) -> Option<u32> {
        self.inner.lock().unwrap().registry_slots.get(registry_id).copied()
    }

    /// Number of times [`Issuer::create_credential_offer`] was called, for
    /// asserting dedup single-flight behavior (spec §8, invariant 4).
    #[must_use]
    pub fn offer_call_count(&self) -> u32 {
        self.inner.lock().unwrap().offer_calls
    }

    /// Number of times [`Holder::create_credential_request`] was called.
    #[must_use]
    pub fn request_call_count(&self) -> u32 {
        self.inner.lock().unwrap().request_calls
    }

    /// Number of times [`Issuer::create_credential`] was called.
    #[must_use]
    pub fn credential_call_count(&self) -> u32 {
        self.inner.lock().unwrap().credential_calls
    }

    /// Make every subsequent [`RecordStore::save`]/[`RecordStore::delete`]
    /// call fail, to exercise a flow's tolerance of a persistence failure
    /// (spec §4.3 "Ack").
    pub fn fail_storage(&self) {
        self.inner.lock().unwrap().fail_storage = true;
    }
}

impl Ledger for MockProvider {
    async fn get_schema(&self, schema_id: &str) -> anyhow::Result<Value> {
        self.inner.lock().unwrap().schemas.get(schema_id).cloned().ok_or_else(|| anyhow::anyhow!("unknown schema {schema_id}"))
    }

    async fn get_credential_definition(&self, cred_def_id: &str) -> anyhow::Result<Value> {
        self.inner
            .lock()
            .unwrap()
            .cred_defs
            .get(cred_def_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown cred def {cred_def_id}"))
    }

    async fn get_revoc_reg_def(&self, rev_reg_id: &str) -> anyhow::Result<Value> {
        self.inner
            .lock()
            .unwrap()
            .rev_reg_defs
            .get(rev_reg_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown revocation registry def {rev_reg_id}"))
    }

    async fn credential_definition_id2schema_id(&self, cred_def_id: &str) -> anyhow::Result<String> {
        self.inner
            .lock()
            .unwrap()
            .cred_def_schema
            .get(cred_def_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown cred def {cred_def_id}"))
    }

    async fn find_posted_cred_def(&self, tag_query: &BTreeMap<&'static str, String>) -> anyhow::Result<Option<String>> {
        let inner = self.inner.lock().unwrap();
        let found = inner
            .posted_cred_defs
            .iter()
            .rev()
            .find(|(_, tags)| tag_query.iter().all(|(k, v)| tags.get(*k) == Some(v)));
        Ok(found.map(|(id, _)| id.clone()))
    }
}

impl Issuer for MockProvider {
    async fn create_credential_offer(&self, cred_def_id: &str) -> anyhow::Result<Value> {
        let schema_id = {
            let mut inner = self.inner.lock().unwrap();
            inner.offer_calls += 1;
            inner.cred_def_schema.get(cred_def_id).cloned().ok_or_else(|| anyhow::anyhow!("unknown cred def {cred_def_id}"))?
        };
        Ok(json!({
            "cred_def_id": cred_def_id,
            "schema_id": schema_id,
            "nonce": uuid::Uuid::new_v4().to_string(),
            "key_correctness_proof": {},
        }))
    }

    async fn create_credential(
        &self, _schema: &Value, offer: &Value, _request: &Value, values: &BTreeMap<String, String>,
        _exchange_id: &str, revocation_registry_id: Option<&str>, _tails_path: Option<&str>,
    ) -> std::result::Result<(Value, Option<String>), IssuerError> {
        let mut inner = self.inner.lock().unwrap();
        inner.credential_calls += 1;
        let revocation_id = match revocation_registry_id {
            Some(rr_id) => {
                let max = inner
                    .registries
                    .iter()
                    .find(|r| r.revocation_registry_id == rr_id)
                    .map(|r| r.max_cred_num)
                    .ok_or_else(|| IssuerError::Other(anyhow::anyhow!("unknown registry {rr_id}")))?;
                let slots = inner
                    .registry_slots
                    .get_mut(rr_id)
                    .ok_or_else(|| IssuerError::Other(anyhow::anyhow!("unknown registry {rr_id}")))?;
                if *slots == 0 {
                    return Err(IssuerError::RevocationRegistryFull);
                }
                *slots -= 1;
                Some((max - *slots).to_string())
            }
            None => None,
        };
        let cred_def_id = offer.get("cred_def_id").cloned().unwrap_or(Value::Null);
        let mut credential = json!({"cred_def_id": cred_def_id, "values": values});
        if let Some(rr_id) = revocation_registry_id {
            credential["rev_reg_id"] = json!(rr_id);
            credential["cred_rev_id"] = json!(revocation_id);
        }
        Ok((credential, revocation_id))
    }
}

impl Holder for MockProvider {
    async fn create_credential_request(&self, offer: &Value, _cred_def: &Value, holder_did: &str) -> anyhow::Result<(Value, Value)> {
        self.inner.lock().unwrap().request_calls += 1;
        let nonce = offer.get("nonce").cloned().unwrap_or(Value::Null);
        let request = json!({"cred_def_id": offer.get("cred_def_id"), "blinded_ms": {}, "nonce": nonce});
        let metadata = json!({"holder_did": holder_did, "master_secret_blinding_data": {}});
        Ok((request, metadata))
    }

    async fn store_credential(
        &self, _cred_def: &Value, credential: &Value, _metadata: &Value, _mime_types: &BTreeMap<String, String>,
        credential_id: Option<&str>, _rev_reg_def: Option<&Value>,
    ) -> std::result::Result<String, HolderStoreError> {
        let mut inner = self.inner.lock().unwrap();
        let id = credential_id.map(str::to_string).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        inner.stored_credentials.insert(id.clone(), credential.clone());
        Ok(id)
    }

    async fn get_credential(&self, credential_id: &str) -> anyhow::Result<Value> {
        self.inner
            .lock()
            .unwrap()
            .stored_credentials
            .get(credential_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no stored credential {credential_id}"))
    }
}

impl RevocationRegistries for MockProvider {
    async fn active_for(&self, credential_definition_id: &str) -> anyhow::Result<Option<IssuerRevocationRegistryRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .registries
            .iter()
            .rev()
            .find(|r| r.credential_definition_id == credential_definition_id && r.state == RegistryState::Active)
            .cloned())
    }

    async fn query_by_cred_def(
        &self, credential_definition_id: &str, state: Option<RegistryState>,
    ) -> anyhow::Result<Vec<IssuerRevocationRegistryRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .registries
            .iter()
            .filter(|r| r.credential_definition_id == credential_definition_id && state.is_none_or(|s| r.state == s))
            .cloned()
            .collect())
    }

    async fn ensure_tails(&self, registry: &IssuerRevocationRegistryRecord) -> anyhow::Result<String> {
        Ok(registry.tails_local_path.clone().unwrap_or_else(|| format!("/tmp/tails/{}", registry.revocation_registry_id)))
    }

    async fn ensure_tails_by_id(&self, revocation_registry_id: &str) -> anyhow::Result<String> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .registries
            .iter()
            .find(|r| r.revocation_registry_id == revocation_registry_id)
            .and_then(|r| r.tails_local_path.clone())
            .unwrap_or_else(|| format!("/tmp/tails/{revocation_registry_id}")))
    }

    async fn set_full(&self, registry_id: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(registry) = inner.registries.iter_mut().find(|r| r.revocation_registry_id == registry_id) {
            registry.state = RegistryState::Full;
        }
        Ok(())
    }
}

impl NotificationSink for MockProvider {
    async fn notify_registry_needed(&self, notification: RevocationRegistryNeeded) {
        self.inner.lock().unwrap().notifications.push(notification);
    }
}

impl Responder for MockProvider {
    async fn send_reply(&self, message: OutboundMessage, connection_id: &str) -> anyhow::Result<()> {
        self.inner.lock().unwrap().sent.push((message, connection_id.to_string()));
        Ok(())
    }
}

impl RecordStore for MockProvider {
    async fn retrieve_by_connection_and_thread(&self, connection_id: Option<&str>, thread_id: &str) -> Result<CredentialExchange> {
        let inner = self.inner.lock().unwrap();
        let key = (connection_id.map(str::to_string), thread_id.to_string());
        let exchange_id = inner
            .by_thread
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::StorageNotFound { key: format!("{key:?}") })?;
        inner.records.get(&exchange_id).cloned().ok_or_else(|| Error::StorageNotFound { key: exchange_id })
    }

    async fn retrieve_by_thread_no_connection(&self, thread_id: &str) -> Result<CredentialExchange> {
        self.retrieve_by_connection_and_thread(None, thread_id).await
    }

    async fn save(&self, record: &CredentialExchange, _reason: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_storage {
            return Err(Error::Provider(anyhow::anyhow!("simulated storage failure")));
        }
        if let Some(existing) = inner.records.get(&record.exchange_id) {
            if existing.version != record.version {
                return Err(Error::Conflict {
                    exchange_id: record.exchange_id.clone(),
                });
            }
        }
        let mut stored = record.clone();
        stored.version += 1;
        inner.by_thread.insert((record.connection_id.clone(), record.thread_id.clone()), record.exchange_id.clone());
        inner.by_thread.insert((None, record.thread_id.clone()), record.exchange_id.clone());
        inner.records.insert(record.exchange_id.clone(), stored);
        Ok(())
    }

    async fn delete(&self, exchange_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_storage {
            return Err(Error::Provider(anyhow::anyhow!("simulated storage failure")));
        }
        if let Some(record) = inner.records.remove(exchange_id) {
            inner.by_thread.remove(&(record.connection_id.clone(), record.thread_id.clone()));
            inner.by_thread.remove(&(None, record.thread_id.clone()));
        }
        Ok(())
    }
}

/// Exclusive hold on a [`MockProvider`] cache key. Does not implement true
/// cross-task blocking — good enough to exercise the dedup code path in
/// tests, not to test the single-flight race itself.
pub struct MockLease {
    inner: Arc<Mutex<Inner>>,
    key: String,
    value: Option<Value>,
}

impl CacheLease for MockLease {
    fn result(&self) -> Option<Value> {
        self.value.clone()
    }

    async fn set_result(&mut self, value: Value, ttl_seconds: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.cache.insert(self.key.clone(), (value.clone(), Instant::now() + Duration::from_secs(ttl_seconds)));
        self.value = Some(value);
    }
}

impl Cache for MockProvider {
    type Lease<'a>
        = MockLease
    where
        Self: 'a;

    async fn acquire<'a>(&'a self, key: &'a str) -> Self::Lease<'a> {
        let value = {
            let inner = self.inner.lock().unwrap();
            inner.cache.get(key).and_then(|(v, exp)| (*exp > Instant::now()).then(|| v.clone()))
        };
        MockLease {
            inner: self.inner.clone(),
            key: key.to_string(),
            value,
        }
    }
}

impl Provider for MockProvider {
    type Cache = MockProvider;

    fn cache(&self) -> Option<&Self::Cache> {
        Some(self)
    }

    type Responder = MockProvider;

    fn responder(&self) -> Option<&Self::Responder> {
        Some(self)
    }
}
