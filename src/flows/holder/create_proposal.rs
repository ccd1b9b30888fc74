//! `create_proposal` (spec §4.3 step 1) — holder-initiated exchange.

use tracing::instrument;

use crate::error::{Error, Result};
use crate::generate::new_id;
use crate::messages::{CredDefSelectors, CredentialPreview, CredentialProposal, OutboundMessage};
use crate::provider::{Provider, RecordStore as _, Responder as _};
use crate::record::{CredentialExchange, CredentialExchangeBuilder};
use crate::state::{ExchangeState, Initiator, Role};

/// Build, persist, and send a `credential-proposal` starting a new exchange.
///
/// # Errors
///
/// Returns an error if the store fails, or if sending fails and a
/// [`crate::provider::Responder`] is configured.
#[instrument(skip(provider, selectors, preview))]
pub async fn create_proposal<P: Provider>(
    provider: &P, connection_id: &str, selectors: CredDefSelectors, preview: CredentialPreview,
    comment: Option<String>, auto_remove: bool, trace: bool,
) -> Result<(CredentialExchange, CredentialProposal)> {
    let proposal = CredentialProposal {
        id: new_id(),
        thread: None,
        trace: trace.then_some(true),
        comment,
        selectors: selectors.clone(),
        credential_proposal: preview,
    };

    let record = CredentialExchangeBuilder::default()
        .exchange_id(new_id())
        .connection_id(connection_id)
        .thread_id(proposal.id.clone())
        .initiator(Initiator::SelfParty)
        .role(Role::Holder)
        .state(Some(ExchangeState::ProposalSent))
        .proposal(selectors)
        .auto_remove(auto_remove)
        .trace(trace)
        .build()
        .expect("required fields are set above");

    provider.save(&record, "create_proposal").await?;
    if let Some(responder) = provider.responder() {
        responder.send_reply(OutboundMessage::Proposal(proposal.clone()), connection_id).await.map_err(Error::Provider)?;
    } else {
        tracing::warn!(exchange_id = %record.exchange_id, "no responder configured, proposal was not sent");
    }
    tracing::info!(exchange_id = %record.exchange_id, "proposal sent");
    Ok((record, proposal))
}
