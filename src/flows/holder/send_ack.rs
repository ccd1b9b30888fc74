//! `send_ack` (spec §4.3 step 6) — closes out the exchange from the holder
//! side.

use tracing::instrument;

use crate::error::{Error, Result};
use crate::generate::new_id;
use crate::messages::{CredentialAck, OutboundMessage, Thread};
use crate::provider::{Provider, RecordStore as _, Responder as _};
use crate::record::CredentialExchange;
use crate::state::{assert_transition, Event, ExchangeState};

/// Send the final ack and mark the exchange complete, deleting the record
/// if `auto_remove` is set.
///
/// # Errors
///
/// Returns a wrong-state error if the exchange is not `CREDENTIAL_RECEIVED`,
/// or a provider failure.
#[instrument(skip(provider, record), fields(exchange_id = %record.exchange_id))]
pub async fn send_ack<P: Provider>(
    provider: &P, mut record: CredentialExchange,
) -> Result<(CredentialExchange, CredentialAck)> {
    assert_transition(&record.exchange_id, record.state, Event::SendAck)?;

    let ack = CredentialAck {
        id: new_id(),
        thread: Thread {
            thid: record.thread_id.clone(),
            pthid: record.parent_thread_id.clone(),
        },
        trace: record.trace.then_some(true),
        status: "OK".to_string(),
    };

    record.state = Some(ExchangeState::Acked);
    record.touch();

    // The holder still owes the issuer an ack even if persisting the final
    // state fails (spec §4.3 "Ack"): log and carry on rather than bailing
    // out before `send_reply`.
    let persisted = if record.auto_remove {
        provider.delete(&record.exchange_id).await
    } else {
        provider.save(&record, "send_ack").await
    };
    if let Err(err) = persisted {
        tracing::warn!(exchange_id = %record.exchange_id, error = %err, "failed to persist ack, sending it anyway");
    }

    if let (Some(responder), Some(connection_id)) = (provider.responder(), record.connection_id.as_deref()) {
        responder.send_reply(OutboundMessage::Ack(ack.clone()), connection_id).await.map_err(Error::Provider)?;
    } else {
        tracing::warn!(exchange_id = %record.exchange_id, "no responder/connection configured, ack was not sent");
    }
    tracing::info!(exchange_id = %record.exchange_id, "ack sent");
    Ok((record, ack))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CredentialExchangeBuilder;
    use crate::state::{Initiator, Role};
    use crate::test_support::MockProvider;

    fn credential_received(auto_remove: bool) -> CredentialExchange {
        CredentialExchangeBuilder::default()
            .exchange_id("ex-1")
            .connection_id("c1".to_string())
            .thread_id("th-1")
            .initiator(Initiator::External)
            .role(Role::Holder)
            .state(Some(ExchangeState::CredentialReceived))
            .auto_remove(auto_remove)
            .build()
            .expect("builds")
    }

    #[tokio::test]
    async fn sends_ack_and_keeps_the_record() {
        let provider = MockProvider::new();
        let record = credential_received(false);

        let (updated, ack) = send_ack(&provider, record).await.expect("sends ack");

        assert_eq!(updated.state, Some(ExchangeState::Acked));
        assert_eq!(ack.status, "OK");
        assert_eq!(provider.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn auto_remove_deletes_the_record() {
        let provider = MockProvider::new();
        let record = credential_received(true);
        provider.save(&record, "seed").await.expect("seed save");

        send_ack(&provider, record).await.expect("sends ack");

        let err = provider.retrieve_by_connection_and_thread(Some("c1"), "th-1").await.expect_err("removed");
        assert!(matches!(err, crate::error::Error::StorageNotFound { .. }));
    }

    #[tokio::test]
    async fn wrong_state_is_rejected() {
        let provider = MockProvider::new();
        let mut record = credential_received(false);
        record.state = Some(ExchangeState::RequestSent);

        let err = send_ack(&provider, record).await.expect_err("wrong state");
        assert!(matches!(err, Error::WrongState { .. }));
    }

    #[tokio::test]
    async fn ack_is_still_sent_when_persisting_the_final_state_fails() {
        let provider = MockProvider::new();
        let record = credential_received(false);
        provider.fail_storage();

        let (updated, ack) = send_ack(&provider, record).await.expect("the holder still owes the ack");

        assert_eq!(updated.state, Some(ExchangeState::Acked));
        assert_eq!(ack.status, "OK");
        assert_eq!(provider.sent_messages().len(), 1, "ack must be sent even though persistence failed");
    }

    #[tokio::test]
    async fn no_connection_means_the_ack_is_not_sent() {
        let provider = MockProvider::new();
        let mut record = credential_received(false);
        record.connection_id = None;

        let (updated, _) = send_ack(&provider, record).await.expect("records the ack locally");

        assert_eq!(updated.state, Some(ExchangeState::Acked));
        assert!(provider.sent_messages().is_empty(), "no connection means there is nowhere to send the ack");
    }
}
