//! `receive_problem_report` — the only operation either role runs (spec
//! §4.6). The engine never originates a problem-report (spec §7); it only
//! records one arriving from the peer.

use tracing::instrument;

use crate::error::{Error, Result};
use crate::messages::{ProblemReport, DEFAULT_PROBLEM_CODE};
use crate::provider::{Provider, RecordStore as _};
use crate::record::CredentialExchange;
use crate::server_err;

/// Abandon the exchange named by `report`'s thread, recording the peer's
/// problem code and message.
///
/// # Errors
///
/// Returns an error if the thread is missing, the exchange cannot be found,
/// or the store fails.
#[instrument(skip(provider, report), fields(thread_id))]
pub async fn receive_problem_report<P: Provider>(
    provider: &P, connection_id: Option<&str>, report: ProblemReport,
) -> Result<CredentialExchange> {
    let thread_id = report
        .thread
        .as_ref()
        .map(|t| t.thid.clone())
        .ok_or_else(|| server_err!("problem-report missing ~thread"))?;
    tracing::Span::current().record("thread_id", &thread_id.as_str());

    let mut record = provider.retrieve_by_connection_and_thread(connection_id, &thread_id).await?;

    let code = report.description.code.clone().unwrap_or_else(|| DEFAULT_PROBLEM_CODE.to_string());
    let message = report.description.en.clone().unwrap_or_else(|| code.clone());
    tracing::warn!(exchange_id = %record.exchange_id, %code, "abandoning exchange on peer problem-report");
    record.abandon(format!("{code}: {message}"));
    record.touch();

    provider.save(&record, "receive_problem_report").await?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ProblemReportDescription, Thread};
    use crate::state::{ExchangeState, Initiator, Role};
    use crate::test_support::MockProvider;

    #[tokio::test]
    async fn abandons_the_matching_exchange() {
        let provider = MockProvider::new();
        let record = crate::record::CredentialExchangeBuilder::default()
            .exchange_id("ex-1")
            .thread_id("th-1")
            .initiator(Initiator::SelfParty)
            .role(Role::Holder)
            .state(Some(ExchangeState::OfferReceived))
            .build()
            .expect("builds");
        provider.save(&record, "seed").await.expect("seed save");

        let report = ProblemReport {
            id: "p-1".into(),
            thread: Some(Thread {
                thid: "th-1".into(),
                pthid: None,
            }),
            description: ProblemReportDescription {
                code: Some("issuance-abandoned".into()),
                en: Some("schema mismatch".into()),
            },
        };

        let updated = receive_problem_report(&provider, None, report).await.expect("abandons");
        assert!(!updated.is_live());
        assert!(updated.error_msg.unwrap().contains("schema mismatch"));
    }
}
