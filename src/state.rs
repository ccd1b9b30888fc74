//! # Exchange State Machine
//!
//! Single source of truth for legal transitions between credential exchange
//! states (spec §4.1). A flow that observes a source state outside the
//! legal set for its event fails with [`crate::error::Error::WrongState`],
//! carrying the exchange id, observed state, and expected state — callers
//! never mutate state directly, they call [`assert_transition`].

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::wrong_state;

/// States a [`crate::record::CredentialExchange`] may occupy.
///
/// `Abandoned` is the sink reached by a problem-report; in the persisted
/// record this is represented by `state: None` (see spec §3) rather than a
/// variant of this enum, since a problem-report clears the legal-transition
/// history entirely.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeState {
    /// Holder has sent a proposal.
    ProposalSent,
    /// Issuer has received a proposal.
    ProposalReceived,
    /// Issuer has sent an offer.
    OfferSent,
    /// Holder has received an offer.
    OfferReceived,
    /// Holder has sent a request.
    RequestSent,
    /// Issuer has received a request.
    RequestReceived,
    /// Issuer has issued the credential.
    Issued,
    /// Holder has received the credential (not yet stored).
    CredentialReceived,
    /// Exchange is complete; both parties have acknowledged.
    Acked,
}

/// Which party initiated the exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Initiator {
    /// This party started the exchange.
    #[serde(rename = "self")]
    SelfParty,
    /// The peer started the exchange.
    External,
}

/// Which side of the exchange this record represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Credential issuer.
    Issuer,
    /// Credential holder.
    Holder,
}

/// Events that drive the state machine. Each corresponds to one flow
/// function in `crate::flows`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    /// Holder: `create_proposal`.
    CreateProposal,
    /// Issuer: `receive_proposal`.
    ReceiveProposal,
    /// Issuer: `create_offer`.
    CreateOffer,
    /// Holder: `receive_offer`.
    ReceiveOffer,
    /// Holder: `create_request`.
    CreateRequest,
    /// Issuer: `receive_request`.
    ReceiveRequest,
    /// Issuer: `issue_credential`.
    IssueCredential,
    /// Holder: `receive_credential`.
    ReceiveCredential,
    /// Holder: `store_credential` (side-effect only, state unchanged).
    StoreCredential,
    /// Holder: `send_ack`.
    SendAck,
    /// Issuer: `receive_credential_ack`.
    ReceiveAck,
}

/// Check that `current` is a legal source state for `event`, per the edge
/// set in spec §4.1. Returns the description used in [`crate::error::Error::WrongState`]
/// when it is not.
///
/// # Errors
///
/// Returns [`crate::error::Error::WrongState`] if `current` is not a legal
/// source state for `event`.
pub fn assert_transition(
    exchange_id: &str, current: Option<ExchangeState>, event: Event,
) -> Result<()> {
    use ExchangeState::{
        CredentialReceived, Issued, OfferReceived, OfferSent, ProposalReceived, ProposalSent,
        RequestReceived, RequestSent,
    };

    let legal: &[Option<ExchangeState>] = match event {
        Event::CreateProposal => &[None],
        Event::ReceiveProposal => &[None],
        Event::CreateOffer => &[None, Some(ProposalReceived)],
        Event::ReceiveOffer => &[None, Some(ProposalSent)],
        Event::CreateRequest => &[Some(OfferReceived)],
        Event::ReceiveRequest => &[Some(OfferSent)],
        Event::IssueCredential => &[Some(RequestReceived)],
        Event::ReceiveCredential => &[Some(RequestSent)],
        Event::StoreCredential => &[Some(CredentialReceived)],
        Event::SendAck => &[Some(CredentialReceived)],
        Event::ReceiveAck => &[Some(Issued)],
    };

    if legal.contains(&current) {
        return Ok(());
    }

    let expected = match event {
        Event::CreateProposal | Event::ReceiveProposal => "∅ (new record)",
        Event::CreateOffer => "∅ or PROPOSAL_RECEIVED",
        Event::ReceiveOffer => "∅ or PROPOSAL_SENT",
        Event::CreateRequest => "OFFER_RECEIVED",
        Event::ReceiveRequest => "OFFER_SENT",
        Event::IssueCredential => "REQUEST_RECEIVED",
        Event::ReceiveCredential => "REQUEST_SENT",
        Event::StoreCredential | Event::SendAck => "CREDENTIAL_RECEIVED",
        Event::ReceiveAck => "ISSUED",
    };
    Err(wrong_state!(exchange_id, current, expected))
}
