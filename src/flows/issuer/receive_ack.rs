//! `receive_credential_ack` (spec §4.2 step 5) — issuer side, closes out
//! the exchange.

use tracing::instrument;

use crate::error::Result;
use crate::messages::CredentialAck;
use crate::provider::{Provider, RecordStore as _};
use crate::record::CredentialExchange;
use crate::state::{assert_transition, Event, ExchangeState};

/// Mark the exchange acked, deleting the record if `auto_remove` is set.
///
/// # Errors
///
/// Returns a wrong-state error if the exchange is not `ISSUED`, or a store
/// failure.
#[instrument(skip(provider, ack), fields(thread_id = %ack.thread.thid))]
pub async fn receive_credential_ack<P: Provider>(
    provider: &P, connection_id: Option<&str>, ack: CredentialAck,
) -> Result<CredentialExchange> {
    let thread_id = ack.thread.thid.clone();
    let mut record = provider.retrieve_by_connection_and_thread(connection_id, &thread_id).await?;

    assert_transition(&record.exchange_id, record.state, Event::ReceiveAck)?;
    record.state = Some(ExchangeState::Acked);
    record.touch();

    if record.auto_remove {
        provider.delete(&record.exchange_id).await?;
        tracing::info!(exchange_id = %record.exchange_id, "exchange acked and removed");
    } else {
        provider.save(&record, "receive_credential_ack").await?;
        tracing::info!(exchange_id = %record.exchange_id, "exchange acked");
    }
    Ok(record)
}
