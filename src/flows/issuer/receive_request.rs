//! `receive_request` (spec §4.2 step 3) — issuer side.

use tracing::instrument;

use crate::error::Result;
use crate::messages::{require_single, CredentialRequest};
use crate::provider::{Provider, RecordStore as _};
use crate::record::CredentialExchange;
use crate::state::{assert_transition, Event, ExchangeState};

/// Record an incoming request against the exchange it threads to.
///
/// # Errors
///
/// Returns [`crate::error::Error::BadAttachmentCount`] if `request` does
/// not carry exactly one attachment, a wrong-state error if the exchange
/// is not in `OFFER_SENT`, or a store lookup failure.
#[instrument(skip(provider, request), fields(thread_id = %request.thread.thid))]
pub async fn receive_request<P: Provider>(
    provider: &P, connection_id: Option<&str>, request: CredentialRequest,
) -> Result<CredentialExchange> {
    let thread_id = request.thread.thid.clone();
    let mut record = provider.retrieve_by_connection_and_thread(connection_id, &thread_id).await?;

    assert_transition(&record.exchange_id, record.state, Event::ReceiveRequest)?;

    let attachment = require_single(&request.requests_attach)?;
    record.request = Some(attachment.decode()?);
    record.state = Some(ExchangeState::RequestReceived);
    record.touch();

    provider.save(&record, "receive_request").await?;
    tracing::info!(exchange_id = %record.exchange_id, "request received");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::messages::{Attachment, Thread};
    use crate::record::CredentialExchangeBuilder;
    use crate::state::{Initiator, Role};
    use crate::test_support::MockProvider;

    async fn offer_sent(provider: &MockProvider) -> CredentialExchange {
        let record = CredentialExchangeBuilder::default()
            .exchange_id("ex-1")
            .connection_id("c1".to_string())
            .thread_id("th-1")
            .initiator(Initiator::External)
            .role(Role::Issuer)
            .state(Some(ExchangeState::OfferSent))
            .build()
            .expect("builds");
        provider.save(&record, "seed").await.expect("seed save");
        record
    }

    fn request_message(thread_id: &str) -> CredentialRequest {
        CredentialRequest {
            id: "r-1".into(),
            thread: Thread {
                thid: thread_id.into(),
                pthid: None,
            },
            trace: None,
            requests_attach: vec![Attachment::wrap_indy(&serde_json::json!({"nonce": "n1"}))],
        }
    }

    #[tokio::test]
    async fn records_the_request() {
        let provider = MockProvider::new();
        offer_sent(&provider).await;

        let record = receive_request(&provider, Some("c1"), request_message("th-1")).await.expect("records request");

        assert_eq!(record.state, Some(ExchangeState::RequestReceived));
        assert!(record.request.is_some());
    }

    #[tokio::test]
    async fn wrong_attachment_count_is_rejected() {
        let provider = MockProvider::new();
        offer_sent(&provider).await;
        let mut request = request_message("th-1");
        request.requests_attach.clear();

        let err = receive_request(&provider, Some("c1"), request).await.expect_err("bad attachment count");
        assert!(matches!(err, Error::BadAttachmentCount { found: 0 }));
    }

    #[tokio::test]
    async fn wrong_state_is_rejected() {
        let provider = MockProvider::new();
        let record = CredentialExchangeBuilder::default()
            .exchange_id("ex-1")
            .connection_id("c1".to_string())
            .thread_id("th-1")
            .initiator(Initiator::External)
            .role(Role::Issuer)
            .state(Some(ExchangeState::ProposalReceived))
            .build()
            .expect("builds");
        provider.save(&record, "seed").await.expect("seed save");

        let err = receive_request(&provider, Some("c1"), request_message("th-1")).await.expect_err("wrong state");
        assert!(matches!(err, Error::WrongState { .. }));
    }
}
