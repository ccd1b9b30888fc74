//! `receive_credential` (spec §4.3 step 4) — holder side.

use tracing::instrument;

use crate::error::Result;
use crate::messages::{require_single, CredentialIssue};
use crate::provider::{Provider, RecordStore as _};
use crate::record::CredentialExchange;
use crate::state::{assert_transition, Event, ExchangeState};

/// Record an incoming issued credential, prior to wallet storage.
///
/// # Errors
///
/// Returns [`crate::error::Error::BadAttachmentCount`] if `issue` does not
/// carry exactly one attachment, a wrong-state error if the exchange is
/// not `REQUEST_SENT`, or a store failure.
#[instrument(skip(provider, issue), fields(thread_id = %issue.thread.thid))]
pub async fn receive_credential<P: Provider>(
    provider: &P, connection_id: Option<&str>, issue: CredentialIssue,
) -> Result<CredentialExchange> {
    let thread_id = issue.thread.thid.clone();
    let mut record = provider.retrieve_by_connection_and_thread(connection_id, &thread_id).await?;

    assert_transition(&record.exchange_id, record.state, Event::ReceiveCredential)?;

    let attachment = require_single(&issue.credentials_attach)?;
    record.raw_credential = Some(attachment.decode()?);
    record.state = Some(ExchangeState::CredentialReceived);
    record.touch();

    provider.save(&record, "receive_credential").await?;
    tracing::info!(exchange_id = %record.exchange_id, "credential received");
    Ok(record)
}
