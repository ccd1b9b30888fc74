//! `create_request` (spec §4.3 step 3) — holder side. Request payload
//! generation is deduplicated through the dedup cache when one is
//! configured (spec §4.4), mirroring `issuer::create_offer`.

use serde_json::json;
use tracing::instrument;

use crate::cache::{Cache as _, CacheLease as _};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::generate::request_cache_key;
use crate::messages::{Attachment, CredentialRequest, OutboundMessage, Thread};
use crate::provider::{Holder as _, Ledger as _, Provider, RecordStore as _, Responder as _};
use crate::record::CredentialExchange;
use crate::server_err;
use crate::state::{assert_transition, Event, ExchangeState};

/// Build, persist, and send a `credential-request` in answer to a
/// previously received offer.
///
/// Re-entrant (spec §4.1, "Idempotence"): if `record` already carries a
/// `request` — e.g. a prior call generated one but crashed before
/// persisting the `REQUEST_SENT` transition — the holder capability is not
/// called a second time; the stored request is reused to build and resend
/// the outbound message.
///
/// # Errors
///
/// Returns a wrong-state error if the exchange is not `OFFER_RECEIVED`, or
/// a provider failure.
#[instrument(skip(provider, config, record), fields(exchange_id = %record.exchange_id))]
pub async fn create_request<P: Provider>(
    provider: &P, config: &EngineConfig, mut record: CredentialExchange, holder_did: &str,
) -> Result<(CredentialExchange, CredentialRequest)> {
    assert_transition(&record.exchange_id, record.state, Event::CreateRequest)?;

    let request = if let Some(request) = record.request.clone() {
        tracing::info!(exchange_id = %record.exchange_id, "request already generated, skipping crypto step");
        request
    } else {
        let offer = record.offer.clone().ok_or_else(|| server_err!("exchange has no offer"))?;
        let cred_def_id = record
            .credential_definition_id
            .clone()
            .ok_or_else(|| server_err!("offer recorded without a credential definition"))?;
        let nonce = offer
            .get("nonce")
            .and_then(|v| v.as_str())
            .ok_or_else(|| server_err!("offer payload missing nonce"))?;
        let key = request_cache_key(&cred_def_id, holder_did, nonce);

        let (request, metadata) = if let Some(cache) = provider.cache() {
            let mut lease = cache.acquire(&key).await;
            if let Some(cached) = lease.result() {
                let request = cached.get("request").cloned().ok_or_else(|| server_err!("cached request payload missing `request`"))?;
                let metadata = cached
                    .get("metadata")
                    .cloned()
                    .ok_or_else(|| server_err!("cached request payload missing `metadata`"))?;
                (request, metadata)
            } else {
                let cred_def = provider.get_credential_definition(&cred_def_id).await.map_err(Error::Provider)?;
                let (request, metadata) =
                    provider.create_credential_request(&offer, &cred_def, holder_did).await.map_err(Error::Provider)?;
                lease.set_result(json!({"request": request, "metadata": metadata}), config.cache_ttl.as_secs()).await;
                (request, metadata)
            }
        } else {
            let cred_def = provider.get_credential_definition(&cred_def_id).await.map_err(Error::Provider)?;
            provider.create_credential_request(&offer, &cred_def, holder_did).await.map_err(Error::Provider)?
        };

        record.request_metadata = Some(metadata);
        request
    };

    let message = CredentialRequest {
        id: crate::generate::new_id(),
        thread: Thread {
            thid: record.thread_id.clone(),
            pthid: record.parent_thread_id.clone(),
        },
        trace: record.trace.then_some(true),
        requests_attach: vec![Attachment::wrap_indy(&request)],
    };

    record.request = Some(request);
    record.state = Some(ExchangeState::RequestSent);
    record.touch();

    provider.save(&record, "create_request").await?;
    if let (Some(responder), Some(connection_id)) = (provider.responder(), record.connection_id.as_deref()) {
        responder.send_reply(OutboundMessage::Request(message.clone()), connection_id).await.map_err(Error::Provider)?;
    } else {
        tracing::warn!(exchange_id = %record.exchange_id, "no responder/connection configured, request was not sent");
    }
    tracing::info!(exchange_id = %record.exchange_id, "request sent");
    Ok((record, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CredentialExchangeBuilder;
    use crate::state::{Initiator, Role};
    use crate::test_support::MockProvider;

    fn offer_received(provider: &MockProvider) -> CredentialExchange {
        provider.seed_schema("sc-1", &["name"]);
        provider.seed_cred_def("cd-1", "sc-1", false, &[]);
        CredentialExchangeBuilder::default()
            .exchange_id("ex-1")
            .thread_id("th-1")
            .initiator(Initiator::External)
            .role(Role::Holder)
            .state(Some(ExchangeState::OfferReceived))
            .credential_definition_id(Some("cd-1".to_string()))
            .schema_id(Some("sc-1".to_string()))
            .offer(Some(serde_json::json!({"cred_def_id": "cd-1", "schema_id": "sc-1", "nonce": "n1"})))
            .build()
            .expect("builds")
    }

    #[tokio::test]
    async fn builds_and_sends_a_request() {
        let provider = MockProvider::new();
        let record = offer_received(&provider);

        let (updated, message) =
            create_request(&provider, &EngineConfig::default(), record, "did:ex:h").await.expect("creates request");

        assert_eq!(updated.state, Some(ExchangeState::RequestSent));
        assert!(updated.request.is_some());
        assert!(updated.request_metadata.is_some());
        assert_eq!(message.requests_attach.len(), 1);
    }

    #[tokio::test]
    async fn replaying_on_an_already_generated_request_skips_the_crypto_step() {
        let provider = MockProvider::new();
        let record = offer_received(&provider);

        let (first, _) =
            create_request(&provider, &EngineConfig::default(), record, "did:ex:h").await.expect("first call");
        assert_eq!(provider.request_call_count(), 1);

        // Simulate a crash before the REQUEST_SENT transition was persisted:
        // the record still carries the generated request but not yet the
        // advanced state.
        let mut replay_record = first.clone();
        replay_record.state = Some(ExchangeState::OfferReceived);

        let (second, message) = create_request(&provider, &EngineConfig::default(), replay_record, "did:ex:h")
            .await
            .expect("replays");

        assert_eq!(provider.request_call_count(), 1, "a replay must not call the holder capability again");
        assert_eq!(second.request, first.request);
        assert_eq!(message.requests_attach.len(), 1);
    }

    #[tokio::test]
    async fn wrong_state_is_rejected() {
        let provider = MockProvider::new();
        let mut record = offer_received(&provider);
        record.state = Some(ExchangeState::RequestSent);

        let err = create_request(&provider, &EngineConfig::default(), record, "did:ex:h").await.expect_err("wrong state");
        assert!(matches!(err, Error::WrongState { .. }));
    }

    #[tokio::test]
    async fn second_request_for_same_cred_def_holder_and_nonce_reuses_cached_payload() {
        let provider = MockProvider::new();
        provider.seed_schema("sc-1", &["name"]);
        provider.seed_cred_def("cd-1", "sc-1", false, &[]);

        let build = |exchange_id: &str| {
            CredentialExchangeBuilder::default()
                .exchange_id(exchange_id)
                .thread_id(format!("th-{exchange_id}"))
                .initiator(Initiator::External)
                .role(Role::Holder)
                .state(Some(ExchangeState::OfferReceived))
                .credential_definition_id(Some("cd-1".to_string()))
                .schema_id(Some("sc-1".to_string()))
                .offer(Some(serde_json::json!({"cred_def_id": "cd-1", "schema_id": "sc-1", "nonce": "n1"})))
                .build()
                .expect("builds")
        };

        let config = EngineConfig::default();
        let (updated_a, request_a) =
            create_request(&provider, &config, build("ex-a"), "did:ex:h").await.expect("first request");
        let (updated_b, request_b) =
            create_request(&provider, &config, build("ex-b"), "did:ex:h").await.expect("second request");

        let payload_a = request_a.requests_attach[0].decode().expect("decodes");
        let payload_b = request_b.requests_attach[0].decode().expect("decodes");
        assert_eq!(payload_a, payload_b, "single-flight cache must serve the first generated request to the second caller");
        assert_eq!(updated_a.request_metadata, updated_b.request_metadata);
        assert_eq!(provider.request_call_count(), 1, "the holder capability must be invoked exactly once");
    }
}
