//! `prepare_send` — a convenience wrapping `create_offer` for an issuer that
//! wants to send an unsolicited offer, with no prior proposal on record
//! (`manager.py::prepare_send`). Builds a fresh, self-initiated record and
//! immediately offers against it, optionally pre-setting `auto_issue` so the
//! caller can skip the confirmation step once the request comes back.

use tracing::instrument;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::generate::new_id;
use crate::messages::{CredentialOffer, CredentialPreview};
use crate::provider::Provider;
use crate::record::{CredentialExchange, CredentialExchangeBuilder};
use crate::state::{Initiator, Role};

use super::create_offer;

/// Build a new issuer-initiated exchange and send the offer in one call.
///
/// # Errors
///
/// Returns the same errors as [`super::create_offer`]: [`crate::error::Error::NoUsableCredDef`]
/// if `cred_def_id` doesn't resolve, [`crate::error::Error::PreviewMismatch`]
/// if `preview` doesn't match the schema, or a provider failure.
#[instrument(skip(provider, preview), fields(connection_id = %connection_id))]
pub async fn prepare_send<P: Provider>(
    provider: &P, config: &EngineConfig, connection_id: &str, cred_def_id: &str,
    preview: CredentialPreview, comment: Option<String>, auto_issue: bool, auto_remove: bool,
    trace: bool,
) -> Result<(CredentialExchange, CredentialOffer)> {
    let record = CredentialExchangeBuilder::default()
        .exchange_id(new_id())
        .connection_id(connection_id)
        .thread_id(new_id())
        .initiator(Initiator::SelfParty)
        .role(Role::Issuer)
        .auto_issue(auto_issue)
        .auto_remove(auto_remove)
        .trace(trace)
        .build()
        .expect("required fields are set above");

    create_offer(provider, config, record, Some(cred_def_id), preview, comment).await
}
