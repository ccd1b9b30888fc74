//! `receive_offer` (spec §4.3 step 2) — holder side. The exchange may
//! already exist (holder proposed first) or this may be the first message
//! the holder has seen (issuer-initiated offer).

use tracing::instrument;

use crate::error::{Error, Result};
use crate::generate::new_id;
use crate::messages::{require_single, CredentialOffer};
use crate::provider::{Provider, RecordStore as _};
use crate::record::{CredentialExchange, CredentialExchangeBuilder};
use crate::server_err;
use crate::state::{assert_transition, Event, ExchangeState, Initiator, Role};

/// Record an incoming offer, creating the exchange if the issuer started it.
///
/// # Errors
///
/// Returns a wrong-state error if a prior record exists but isn't
/// `PROPOSAL_SENT`, or a store failure.
#[instrument(skip(provider, offer), fields(thread_id = %offer.thread.thid))]
pub async fn receive_offer<P: Provider>(
    provider: &P, connection_id: Option<&str>, offer: CredentialOffer,
) -> Result<CredentialExchange> {
    let thread_id = offer.thread.thid.clone();

    let mut record = match provider.retrieve_by_connection_and_thread(connection_id, &thread_id).await {
        Ok(record) => record,
        Err(Error::StorageNotFound { .. }) => CredentialExchangeBuilder::default()
            .exchange_id(new_id())
            .connection_id(connection_id.map(str::to_string))
            .thread_id(thread_id)
            .parent_thread_id(offer.thread.pthid.clone())
            .initiator(Initiator::External)
            .role(Role::Holder)
            .trace(offer.trace.unwrap_or(false))
            .build()
            .expect("required fields are set above"),
        Err(other) => return Err(other),
    };

    assert_transition(&record.exchange_id, record.state, Event::ReceiveOffer)?;

    let payload = require_single(&offer.offers_attach)?.decode()?;
    let cred_def_id = payload
        .get("cred_def_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| server_err!("offer payload missing cred_def_id"))?;
    let schema_id = payload
        .get("schema_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| server_err!("offer payload missing schema_id"))?;
    record.set_credential_definition(cred_def_id, schema_id);

    record.offer_message = Some(offer);
    record.offer = Some(payload);
    record.state = Some(ExchangeState::OfferReceived);
    if record.connection_id.is_none() {
        record.connection_id = connection_id.map(str::to_string);
    }
    record.touch();

    provider.save(&record, "receive_offer").await?;
    tracing::info!(exchange_id = %record.exchange_id, "offer received");
    Ok(record)
}
