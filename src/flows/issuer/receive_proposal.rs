//! `receive_proposal` (spec §4.2) — issuer side of a holder-initiated
//! exchange.

use tracing::instrument;

use crate::error::Result;
use crate::generate::new_id;
use crate::messages::CredentialProposal;
use crate::provider::{Provider, RecordStore as _};
use crate::record::{CredentialExchange, CredentialExchangeBuilder};
use crate::state::{ExchangeState, Initiator, Role};

/// Record an incoming proposal and return the new exchange.
///
/// `auto_offer`/`auto_issue` seed the caller's later decision whether to
/// immediately continue with [`super::create_offer`] — see
/// [`super::should_auto_offer`].
///
/// # Errors
///
/// Returns an error if the store fails.
#[instrument(skip(provider, proposal), fields(thread_id))]
pub async fn receive_proposal<P: Provider>(
    provider: &P, connection_id: &str, proposal: CredentialProposal, auto_offer: bool,
    auto_issue: bool, auto_remove: bool,
) -> Result<CredentialExchange> {
    let thread_id = proposal.thread.as_ref().map(|t| t.thid.clone()).unwrap_or_else(|| proposal.id.clone());
    tracing::Span::current().record("thread_id", &thread_id.as_str());

    let record = CredentialExchangeBuilder::default()
        .exchange_id(new_id())
        .connection_id(connection_id)
        .thread_id(thread_id)
        .parent_thread_id(proposal.thread.as_ref().and_then(|t| t.pthid.clone()))
        .initiator(Initiator::External)
        .role(Role::Issuer)
        .state(Some(ExchangeState::ProposalReceived))
        .proposal(proposal.selectors)
        .auto_offer(auto_offer)
        .auto_issue(auto_issue)
        .auto_remove(auto_remove)
        .trace(proposal.trace.unwrap_or(false))
        .build()
        .expect("required fields are set above");

    provider.save(&record, "receive_proposal").await?;
    tracing::info!(exchange_id = %record.exchange_id, "proposal received");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{CredDefSelectors, CredentialPreview, Thread};

    fn proposal(thread_id: &str) -> CredentialProposal {
        CredentialProposal {
            id: "p-1".into(),
            thread: Some(Thread {
                thid: thread_id.into(),
                pthid: None,
            }),
            trace: None,
            comment: None,
            selectors: CredDefSelectors {
                schema_name: Some("identification".into()),
                ..Default::default()
            },
            credential_proposal: CredentialPreview::default(),
        }
    }

    #[tokio::test]
    async fn creates_a_new_record_in_proposal_received() {
        let provider = crate::test_support::MockProvider::new();

        let record =
            receive_proposal(&provider, "c1", proposal("th-1"), true, false, false).await.expect("records proposal");

        assert_eq!(record.state, Some(ExchangeState::ProposalReceived));
        assert_eq!(record.initiator, Initiator::External);
        assert!(record.auto_offer);
        assert!(!record.auto_issue);
        assert_eq!(record.proposal.as_ref().and_then(|p| p.schema_name.clone()), Some("identification".into()));
    }
}
