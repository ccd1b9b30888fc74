//! # Credential Exchange Record
//!
//! The durable record a [`crate::provider::RecordStore`] persists across the
//! lifetime of one credential exchange (spec §3). Every flow function reads
//! one of these in, calls [`crate::state::assert_transition`] against its
//! `state`, mutates it, and saves it back.

use chrono::{DateTime, Utc};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::messages::{CredDefSelectors, CredentialOffer};
use crate::state::{ExchangeState, Initiator, Role};

/// One credential exchange, from proposal/offer through ack.
///
/// `state: None` marks the exchange abandoned (spec §3, §4.6) — there is no
/// `ExchangeState::Abandoned` variant, since a problem-report does not
/// itself occupy a position in the transition graph, it terminates it.
#[derive(Clone, Debug, Builder, Serialize, Deserialize)]
#[builder(setter(into), default)]
pub struct CredentialExchange {
    /// Primary key.
    pub exchange_id: String,
    /// Connection this exchange runs over, once known. Absent for the
    /// brief window between a holder-initiated proposal and the issuer
    /// accepting a connection for it.
    pub connection_id: Option<String>,
    /// Thread id; the `@id` of the message that started the exchange.
    pub thread_id: String,
    /// Parent thread id, propagated into the final ack (spec §3).
    pub parent_thread_id: Option<String>,
    /// Which party started the exchange.
    pub initiator: Initiator,
    /// Which side of the exchange this record represents.
    pub role: Role,
    /// Current state, or `None` if abandoned.
    pub state: Option<ExchangeState>,
    /// Credential-definition selectors from the proposal, if one was sent
    /// or received.
    pub proposal: Option<CredDefSelectors>,
    /// The offer message, if one was sent or received.
    pub offer_message: Option<CredentialOffer>,
    /// Decoded offer attachment payload (indy credential offer).
    pub offer: Option<serde_json::Value>,
    /// Decoded request attachment payload.
    pub request: Option<serde_json::Value>,
    /// Holder-side request metadata returned alongside the request, needed
    /// later to store the issued credential.
    pub request_metadata: Option<serde_json::Value>,
    /// Decoded credential attachment payload, prior to wallet storage.
    pub raw_credential: Option<serde_json::Value>,
    /// Credential payload after `store_credential` normalizes it.
    pub credential: Option<serde_json::Value>,
    /// Wallet-local id of the stored credential.
    pub credential_id: Option<String>,
    /// Schema id, once resolved.
    pub schema_id: Option<String>,
    /// Credential definition id. Immutable once set — set by `create_offer`
    /// or `receive_offer` and never overwritten afterward.
    pub credential_definition_id: Option<String>,
    /// Revocation registry used to issue this credential, if revocable.
    pub revocation_registry_id: Option<String>,
    /// Allocated slot within the revocation registry. Only meaningful
    /// together with `revocation_registry_id`.
    pub revocation_id: Option<String>,
    /// Issuer auto-responds to a proposal with an offer without operator
    /// confirmation.
    pub auto_offer: bool,
    /// Issuer auto-issues on receiving a request without operator
    /// confirmation.
    pub auto_issue: bool,
    /// Delete the record once acked.
    pub auto_remove: bool,
    /// Tracing opt-in, echoed onto every outbound message (spec §3).
    pub trace: bool,
    /// Reason recorded when a problem-report abandons the exchange.
    pub error_msg: Option<String>,
    /// When this record was first saved.
    #[builder(default = "Utc::now()")]
    pub created_at: DateTime<Utc>,
    /// When this record was last saved. Bumped by [`Self::touch`], which
    /// every flow calls immediately before
    /// [`crate::provider::RecordStore::save`].
    #[builder(default = "Utc::now()")]
    pub updated_at: DateTime<Utc>,
    /// Version this record was loaded at, for the compare-and-set `save`
    /// closes the read-modify-write race with (spec §4.5, §9). A freshly
    /// built record starts at `0`; `save` rejects a save whose `version`
    /// does not match what the store currently holds.
    #[builder(default)]
    pub version: u64,
}

impl CredentialExchange {
    /// Record abandonment: clears `state` to `None` and stores `reason`
    /// (spec §4.6). Does not touch any other field — a problem-report ends
    /// the exchange, it does not roll it back.
    pub fn abandon(&mut self, reason: impl Into<String>) {
        self.state = None;
        self.error_msg = Some(reason.into());
    }

    /// Whether this record still has a live (non-abandoned) state.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state.is_some()
    }

    /// Set `credential_definition_id` and, with it, `schema_id`. No-op if
    /// already set to the same value; the field is otherwise immutable for
    /// the life of the exchange (spec §3).
    ///
    /// # Panics
    ///
    /// Panics if called with a different id than one already recorded —
    /// this would indicate a flow bug, not a runtime condition.
    pub fn set_credential_definition(&mut self, cred_def_id: impl Into<String>, schema_id: impl Into<String>) {
        let cred_def_id = cred_def_id.into();
        if let Some(existing) = &self.credential_definition_id {
            assert_eq!(existing, &cred_def_id, "credential_definition_id must not change within an exchange");
            return;
        }
        self.credential_definition_id = Some(cred_def_id);
        self.schema_id = Some(schema_id.into());
    }

    /// Bump `updated_at` to now. Call immediately before every
    /// [`crate::provider::RecordStore::save`].
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> CredentialExchangeBuilder {
        let mut b = CredentialExchangeBuilder::default();
        b.exchange_id("ex-1").thread_id("th-1").initiator(Initiator::SelfParty).role(Role::Issuer);
        b
    }

    #[test]
    fn abandon_clears_state_and_sets_reason() {
        let mut record = base().state(Some(ExchangeState::OfferSent)).build().expect("builds");
        record.abandon("holder rejected offer");
        assert!(!record.is_live());
        assert_eq!(record.error_msg.as_deref(), Some("holder rejected offer"));
    }

    #[test]
    #[should_panic(expected = "must not change")]
    fn credential_definition_id_is_immutable() {
        let mut record = base().build().expect("builds");
        record.set_credential_definition("cd-1", "sc-1");
        record.set_credential_definition("cd-2", "sc-1");
    }

    #[test]
    fn round_trips_through_json() {
        let record = base().state(Some(ExchangeState::ProposalSent)).build().expect("builds");
        let s = serde_json::to_string(&record).expect("serialize");
        let back: CredentialExchange = serde_json::from_str(&s).expect("deserialize");
        assert_eq!(back.exchange_id, record.exchange_id);
        assert_eq!(back.state, record.state);
    }
}
