//! `create_offer` (spec §4.2 step 1-2) — the issuer picks a posted
//! credential definition matching the proposal's selectors (or an explicit
//! override), validates the preview against the schema, and sends an offer.
//! Offer payload generation is deduplicated through the dedup cache when
//! one is configured (spec §4.4).

use std::collections::BTreeSet;

use tracing::instrument;

use crate::cache::{Cache as _, CacheLease as _};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::generate::offer_cache_key;
use crate::messages::{Attachment, CredDefSelectors, CredentialOffer, CredentialPreview, Thread};
use crate::provider::{Issuer as _, Ledger as _, Provider, RecordStore as _, Responder as _};
use crate::record::CredentialExchange;
use crate::state::{assert_transition, Event, ExchangeState};

fn schema_attr_names(schema: &serde_json::Value) -> BTreeSet<String> {
    schema
        .get("attrNames")
        .and_then(|v| v.as_array())
        .map(|names| names.iter().filter_map(|n| n.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Resolve the credential definition id to offer: `explicit_cred_def_id` if
/// given, otherwise the most recently posted definition matching the
/// proposal's selectors (spec §4.2 step 1, `_match_sent_cred_def_id`).
///
/// # Errors
///
/// Returns [`Error::NoUsableCredDef`] if no override is given and nothing
/// on the ledger matches the selectors.
async fn resolve_cred_def_id<P: Provider>(
    provider: &P, selectors: Option<&CredDefSelectors>, explicit_cred_def_id: Option<&str>,
) -> Result<String> {
    if let Some(id) = explicit_cred_def_id {
        return Ok(id.to_string());
    }
    let tag_query = selectors.map(CredDefSelectors::tag_query).unwrap_or_default();
    provider
        .find_posted_cred_def(&tag_query)
        .await
        .map_err(Error::Provider)?
        .ok_or_else(|| Error::NoUsableCredDef {
            selectors: format!("{tag_query:?}"),
        })
}

/// Build and send a `credential-offer`.
///
/// # Errors
///
/// Returns [`Error::NoUsableCredDef`] if `explicit_cred_def_id` is absent
/// and no posted definition matches the stored proposal, or
/// [`Error::PreviewMismatch`] if `preview`'s attribute names don't match the
/// schema's, or a wrong-state/provider error.
#[instrument(skip(provider, record, preview), fields(exchange_id = %record.exchange_id))]
pub async fn create_offer<P: Provider>(
    provider: &P, config: &EngineConfig, mut record: CredentialExchange,
    explicit_cred_def_id: Option<&str>, preview: CredentialPreview, comment: Option<String>,
) -> Result<(CredentialExchange, CredentialOffer)> {
    assert_transition(&record.exchange_id, record.state, Event::CreateOffer)?;

    let cred_def_id = resolve_cred_def_id(provider, record.proposal.as_ref(), explicit_cred_def_id).await?;
    let schema_id = provider.credential_definition_id2schema_id(&cred_def_id).await.map_err(Error::Provider)?;
    let schema = provider.get_schema(&schema_id).await.map_err(Error::Provider)?;

    let schema_attrs = schema_attr_names(&schema);
    let preview_attrs = preview.attr_names();
    if preview_attrs != schema_attrs {
        return Err(Error::PreviewMismatch {
            preview: preview_attrs.into_iter().collect(),
            schema: schema_attrs.into_iter().collect(),
        });
    }

    let key = offer_cache_key(&cred_def_id);
    let offer_payload = if let Some(cache) = provider.cache() {
        let mut lease = cache.acquire(&key).await;
        if let Some(cached) = lease.result() {
            cached
        } else {
            let fresh = provider.create_credential_offer(&cred_def_id).await.map_err(Error::Provider)?;
            lease.set_result(fresh.clone(), config.cache_ttl.as_secs()).await;
            fresh
        }
    } else {
        provider.create_credential_offer(&cred_def_id).await.map_err(Error::Provider)?
    };

    let offer_message = CredentialOffer {
        id: crate::generate::new_id(),
        thread: Thread {
            thid: record.thread_id.clone(),
            pthid: record.parent_thread_id.clone(),
        },
        trace: record.trace.then_some(true),
        comment,
        credential_preview: preview,
        offers_attach: vec![Attachment::wrap_indy(&offer_payload)],
    };

    record.set_credential_definition(cred_def_id, schema_id);
    record.offer = Some(offer_payload);
    record.offer_message = Some(offer_message.clone());
    record.state = Some(ExchangeState::OfferSent);
    record.touch();

    provider.save(&record, "create_offer").await?;
    if let (Some(responder), Some(connection_id)) = (provider.responder(), record.connection_id.as_deref()) {
        responder
            .send_reply(crate::messages::OutboundMessage::Offer(offer_message.clone()), connection_id)
            .await
            .map_err(Error::Provider)?;
    } else {
        tracing::warn!(exchange_id = %record.exchange_id, "no responder/connection configured, offer was not sent");
    }
    tracing::info!(exchange_id = %record.exchange_id, "offer sent");
    Ok((record, offer_message))
}
