//! `store_credential` (spec §4.3 step 5) — a side-effecting operation that
//! does not advance the state machine (spec §4.1, [`crate::state::Event::StoreCredential`]
//! leaves `state` at `CREDENTIAL_RECEIVED`; [`super::send_ack`] is what
//! moves the exchange to `ACKED`).

use tracing::instrument;

use crate::error::{Error, Result};
use crate::provider::{Holder as _, Ledger as _, Provider, RecordStore as _, RevocationRegistries as _};
use crate::record::CredentialExchange;
use crate::server_err;
use crate::state::{assert_transition, Event};

/// Store the received credential in the wallet and record its local id.
///
/// # Errors
///
/// Returns [`crate::error::Error::HolderStoreFailure`] if the wallet
/// rejects storage, a wrong-state error if the exchange is not
/// `CREDENTIAL_RECEIVED`, or a provider failure.
#[instrument(skip(provider, record), fields(exchange_id = %record.exchange_id))]
pub async fn store_credential<P: Provider>(
    provider: &P, mut record: CredentialExchange, credential_id: Option<&str>,
) -> Result<CredentialExchange> {
    assert_transition(&record.exchange_id, record.state, Event::StoreCredential)?;

    let cred_def_id = record
        .credential_definition_id
        .clone()
        .ok_or_else(|| server_err!("exchange has no credential definition"))?;
    let cred_def = provider.get_credential_definition(&cred_def_id).await.map_err(Error::Provider)?;
    let raw_credential = record
        .raw_credential
        .clone()
        .ok_or_else(|| server_err!("exchange has no received credential"))?;
    let embedded_rev_reg_id = raw_credential.get("rev_reg_id").and_then(|v| v.as_str());
    let rev_reg_def = match embedded_rev_reg_id {
        Some(rr_id) => {
            provider.ensure_tails_by_id(rr_id).await.map_err(Error::Provider)?;
            Some(provider.get_revoc_reg_def(rr_id).await.map_err(Error::Provider)?)
        }
        None => None,
    };
    let metadata = record
        .request_metadata
        .clone()
        .ok_or_else(|| server_err!("exchange has no request metadata"))?;
    let mime_types = record
        .offer_message
        .as_ref()
        .map(|m| m.credential_preview.mime_types())
        .unwrap_or_default();

    let credential_id = provider
        .store_credential(&cred_def, &raw_credential, &metadata, &mime_types, credential_id, rev_reg_def.as_ref())
        .await
        .map_err(|e| Error::HolderStoreFailure { reason: e.to_string() })?;

    let stored = provider.get_credential(&credential_id).await.map_err(Error::Provider)?;
    let revocation_registry_id = stored.get("rev_reg_id").and_then(|v| v.as_str()).map(str::to_string);
    let revocation_id = stored.get("cred_rev_id").and_then(|v| v.as_str()).map(str::to_string);

    record.credential = Some(stored);
    record.credential_id = Some(credential_id);
    if revocation_registry_id.is_some() {
        record.revocation_registry_id = revocation_registry_id;
    }
    if revocation_id.is_some() {
        record.revocation_id = revocation_id;
    }
    record.touch();

    provider.save(&record, "store_credential").await?;
    tracing::info!(exchange_id = %record.exchange_id, "credential stored");
    Ok(record)
}
