//! `issue_credential` (spec §4.2 step 4) — allocates a revocation slot and
//! issues the credential. This is where the concurrent-issuer race lives:
//! two exchanges for the same credential definition can both see the same
//! `ACTIVE` registry as having room, and only one will win the slot. The
//! loser rotates to a new registry and retries rather than failing the
//! exchange (spec §4.2, "the core concurrency hazard").

use tokio::time::sleep;
use tracing::instrument;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::messages::{Attachment, CredentialIssue, Thread};
use crate::provider::{
    Issuer as _, IssuerError, Ledger as _, NotificationSink as _, Provider, RecordStore as _,
    Responder as _, RevocationRegistries as _,
};
use crate::record::CredentialExchange;
use crate::revocation::{RegistryState, RevocationRegistryNeeded};
use crate::server_err;
use crate::state::{assert_transition, Event, ExchangeState};

fn is_revocable(cred_def: &serde_json::Value) -> bool {
    cred_def.get("value").and_then(|v| v.get("revocation")).is_some()
}

/// Allocate a registry slot (if the credential definition is revocable)
/// and issue the credential, retrying across registry rotation up to
/// `config.max_registry_retries` times.
///
/// # Errors
///
/// Returns [`Error::NoActiveRevocationRegistry`] if the retry budget is
/// exhausted without a registry ever becoming active, or
/// [`Error::RevocationRegistryFull`] if the last attempt raced and lost a
/// registry slot, or a wrong-state/provider error.
#[instrument(skip(provider, config, record), fields(exchange_id = %record.exchange_id))]
pub async fn issue_credential<P: Provider>(
    provider: &P, config: &EngineConfig, mut record: CredentialExchange, comment: Option<String>,
) -> Result<(CredentialExchange, CredentialIssue)> {
    assert_transition(&record.exchange_id, record.state, Event::IssueCredential)?;

    let (raw_credential, revocation_registry_id, revocation_id) = if let Some(credential) = record.raw_credential.clone() {
        tracing::info!(exchange_id = %record.exchange_id, "credential already issued, skipping crypto step");
        (credential, record.revocation_registry_id.clone(), record.revocation_id.clone())
    } else {
        let cred_def_id = record
            .credential_definition_id
            .clone()
            .ok_or_else(|| server_err!("offer sent without a credential definition"))?;
        let schema_id = record
            .schema_id
            .clone()
            .ok_or_else(|| server_err!("offer sent without a schema id"))?;
        let schema = provider.get_schema(&schema_id).await.map_err(Error::Provider)?;
        let cred_def = provider.get_credential_definition(&cred_def_id).await.map_err(Error::Provider)?;

        let offer = record.offer.clone().ok_or_else(|| server_err!("missing offer"))?;
        let request = record.request.clone().ok_or_else(|| server_err!("missing request"))?;
        let values = record
            .offer_message
            .as_ref()
            .map(|m| m.credential_preview.attr_values())
            .unwrap_or_default();

        if is_revocable(&cred_def) {
            issue_revocable(provider, config, &cred_def_id, &schema, &offer, &request, &values, &record.exchange_id)
                .await?
        } else {
            let (credential, _) = provider
                .create_credential(&schema, &offer, &request, &values, &record.exchange_id, None, None)
                .await
                .map_err(issuer_error_to_engine)?;
            (credential, None, None)
        }
    };

    let issue_message = CredentialIssue {
        id: crate::generate::new_id(),
        thread: Thread {
            thid: record.thread_id.clone(),
            pthid: record.parent_thread_id.clone(),
        },
        trace: record.trace.then_some(true),
        comment,
        credentials_attach: vec![Attachment::wrap_indy(&raw_credential)],
    };

    record.raw_credential = Some(raw_credential);
    record.revocation_registry_id = revocation_registry_id;
    record.revocation_id = revocation_id;
    record.state = Some(ExchangeState::Issued);
    record.touch();

    provider.save(&record, "issue_credential").await?;
    if let (Some(responder), Some(connection_id)) = (provider.responder(), record.connection_id.as_deref()) {
        responder
            .send_reply(crate::messages::OutboundMessage::Issue(issue_message.clone()), connection_id)
            .await
            .map_err(Error::Provider)?;
    } else {
        tracing::warn!(exchange_id = %record.exchange_id, "no responder/connection configured, issue message was not sent");
    }
    tracing::info!(exchange_id = %record.exchange_id, "credential issued");
    Ok((record, issue_message))
}

fn issuer_error_to_engine(e: IssuerError) -> Error {
    match e {
        IssuerError::RevocationRegistryFull => server_err!("unexpected registry-full for a non-revocable credential"),
        IssuerError::Other(err) => Error::Provider(err),
    }
}

#[allow(clippy::too_many_arguments)]
async fn issue_revocable<P: Provider>(
    provider: &P, config: &EngineConfig, cred_def_id: &str, schema: &serde_json::Value,
    offer: &serde_json::Value, request: &serde_json::Value,
    values: &std::collections::BTreeMap<String, String>, exchange_id: &str,
) -> Result<(serde_json::Value, Option<String>, Option<String>)> {
    let mut last_full_registry: Option<String> = None;

    for attempt in 0..=config.max_registry_retries {
        let active = provider.active_for(cred_def_id).await.map_err(Error::Provider)?;
        let Some(registry) = active else {
            provision_or_wait(provider, config, cred_def_id).await?;
            continue;
        };

        let tails_path = provider.ensure_tails(&registry).await.map_err(Error::Provider)?;
        let outcome = provider
            .create_credential(
                schema,
                offer,
                request,
                values,
                exchange_id,
                Some(registry.revocation_registry_id.as_str()),
                Some(tails_path.as_str()),
            )
            .await;

        match outcome {
            Ok((credential, revocation_id)) => {
                if revocation_id.as_deref().and_then(|id| id.parse::<u32>().ok()) == Some(registry.max_cred_num) {
                    tracing::info!(
                        exchange_id, registry_id = %registry.revocation_registry_id,
                        "allocated the last slot in the registry, marking full",
                    );
                    provider.set_full(&registry.revocation_registry_id).await.map_err(Error::Provider)?;
                    provider
                        .notify_registry_needed(RevocationRegistryNeeded::new(cred_def_id, Some(registry.max_cred_num)))
                        .await;
                }
                return Ok((credential, Some(registry.revocation_registry_id), revocation_id));
            }
            Err(IssuerError::RevocationRegistryFull) => {
                // The winner of the race already marked this registry FULL
                // and notified (above); this is just losing late. `set_full`
                // is idempotent, and the spec's scenario 4 has only the
                // winner notify — re-notifying here would double-count.
                tracing::warn!(
                    exchange_id, registry_id = %registry.revocation_registry_id, attempt,
                    "lost the race for the last registry slot, rotating",
                );
                provider.set_full(&registry.revocation_registry_id).await.map_err(Error::Provider)?;
                last_full_registry = Some(registry.revocation_registry_id);
                sleep(config.registry_full_backoff).await;
            }
            Err(IssuerError::Other(err)) => return Err(Error::Provider(err)),
        }
    }

    if let Some(registry_id) = last_full_registry {
        return Err(Error::RevocationRegistryFull { registry_id });
    }
    Err(Error::NoActiveRevocationRegistry {
        credential_definition_id: cred_def_id.to_string(),
    })
}

/// No active registry exists. If one has been posted but not yet activated
/// by the revocation subsystem, wait for it; otherwise ask for one to be
/// provisioned, sized from the most recently created record if any.
async fn provision_or_wait<P: Provider>(provider: &P, config: &EngineConfig, cred_def_id: &str) -> Result<()> {
    let posted = provider.query_by_cred_def(cred_def_id, Some(RegistryState::Posted)).await.map_err(Error::Provider)?;
    if !posted.is_empty() {
        sleep(config.posted_registry_poll).await;
        return Ok(());
    }

    let existing = provider.query_by_cred_def(cred_def_id, None).await.map_err(Error::Provider)?;
    let size = existing.last().map(|r| r.max_cred_num).unwrap_or(config.default_registry_size);
    // Two notifications, not one (spec §4.2 step 2) — the revocation
    // subsystem is expected to treat these as at-least-once delivery, not
    // to provision twice.
    for _ in 0..2 {
        provider.notify_registry_needed(RevocationRegistryNeeded::new(cred_def_id, Some(size))).await;
    }
    sleep(config.posted_registry_poll).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::messages::{CredDefSelectors, CredentialOffer, CredentialPreview, PreviewAttribute};
    use crate::record::CredentialExchangeBuilder;
    use crate::revocation::IssuerRevocationRegistryRecord;
    use crate::state::{Initiator, Role};
    use crate::test_support::MockProvider;

    fn fast_config() -> EngineConfig {
        EngineConfig {
            posted_registry_poll: Duration::from_millis(5),
            registry_full_backoff: Duration::from_millis(5),
            ..EngineConfig::default()
        }
    }

    fn request_received(provider: &MockProvider, exchange_id: &str, revocable: bool) -> CredentialExchange {
        provider.seed_schema("sc-1", &["name"]);
        provider.seed_cred_def("cd-1", "sc-1", revocable, &[]);
        let preview = CredentialPreview {
            attributes: vec![PreviewAttribute {
                name: "name".into(),
                mime_type: None,
                value: "Alice".into(),
            }],
        };
        CredentialExchangeBuilder::default()
            .exchange_id(exchange_id)
            .thread_id(format!("th-{exchange_id}"))
            .initiator(Initiator::External)
            .role(Role::Issuer)
            .state(Some(ExchangeState::RequestReceived))
            .proposal(CredDefSelectors::default())
            .credential_definition_id(Some("cd-1".to_string()))
            .schema_id(Some("sc-1".to_string()))
            .offer(Some(json!({"cred_def_id": "cd-1", "schema_id": "sc-1", "nonce": "n1"})))
            .offer_message(Some(CredentialOffer {
                id: "o-1".into(),
                thread: Thread {
                    thid: format!("th-{exchange_id}"),
                    pthid: None,
                },
                trace: None,
                comment: None,
                credential_preview: preview,
                offers_attach: vec![],
            }))
            .request(Some(json!({"cred_def_id": "cd-1", "blinded_ms": {}})))
            .build()
            .expect("builds")
    }

    #[tokio::test]
    async fn non_revocable_credential_issues_without_touching_registries() {
        let provider = MockProvider::new();
        let record = request_received(&provider, "ex-1", false);

        let (updated, message) = issue_credential(&provider, &fast_config(), record, None).await.expect("issues");

        assert_eq!(updated.state, Some(ExchangeState::Issued));
        assert!(updated.revocation_registry_id.is_none());
        assert_eq!(message.credentials_attach.len(), 1);
    }

    #[tokio::test]
    async fn revocable_credential_allocates_a_slot() {
        let provider = MockProvider::new();
        let record = request_received(&provider, "ex-1", true);
        provider.seed_registry(
            IssuerRevocationRegistryRecord {
                revocation_registry_id: "rr-1".into(),
                credential_definition_id: "cd-1".into(),
                state: RegistryState::Active,
                max_cred_num: 10,
                tails_local_path: None,
            },
            10,
        );

        let (updated, _) = issue_credential(&provider, &fast_config(), record, None).await.expect("issues");

        assert_eq!(updated.revocation_registry_id.as_deref(), Some("rr-1"));
        assert_eq!(updated.revocation_id.as_deref(), Some("1"));
        assert_eq!(provider.free_slots("rr-1"), Some(9));
    }

    #[tokio::test]
    async fn taking_the_last_slot_marks_the_registry_full() {
        let provider = MockProvider::new();
        let record = request_received(&provider, "ex-1", true);
        provider.seed_registry(
            IssuerRevocationRegistryRecord {
                revocation_registry_id: "rr-1".into(),
                credential_definition_id: "cd-1".into(),
                state: RegistryState::Active,
                max_cred_num: 1,
                tails_local_path: None,
            },
            1,
        );

        let (updated, _) = issue_credential(&provider, &fast_config(), record, None).await.expect("issues");

        assert_eq!(updated.revocation_id.as_deref(), Some("1"));
        assert_eq!(
            provider.query_by_cred_def("cd-1", Some(RegistryState::Full)).await.expect("query").len(),
            1,
            "registry must be FULL as soon as the last slot is allocated"
        );
        assert_eq!(provider.notifications().len(), 1);
    }

    #[tokio::test]
    async fn registry_full_race_rotates_to_the_next_registry() {
        let provider = MockProvider::new();
        let record = request_received(&provider, "ex-1", true);
        provider.seed_registry(
            IssuerRevocationRegistryRecord {
                revocation_registry_id: "rr-full".into(),
                credential_definition_id: "cd-1".into(),
                state: RegistryState::Active,
                max_cred_num: 1,
                tails_local_path: None,
            },
            0,
        );
        provider.seed_registry(
            IssuerRevocationRegistryRecord {
                revocation_registry_id: "rr-next".into(),
                credential_definition_id: "cd-1".into(),
                state: RegistryState::Posted,
                max_cred_num: 10,
                tails_local_path: None,
            },
            10,
        );

        // A second task activates the replacement registry shortly after the
        // losing attempt rotates, mimicking the revocation subsystem.
        let activator = {
            let provider = provider.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                provider
                    .query_by_cred_def("cd-1", Some(RegistryState::Posted))
                    .await
                    .expect("query")
                    .into_iter()
                    .for_each(|mut r| {
                        r.state = RegistryState::Active;
                        provider.seed_registry(r, 10);
                    });
            })
        };

        let config = EngineConfig {
            max_registry_retries: 20,
            ..fast_config()
        };
        let (updated, _) = issue_credential(&provider, &config, record, None).await.expect("issues after rotation");
        activator.await.expect("activator task");

        assert_eq!(updated.revocation_registry_id.as_deref(), Some("rr-next"));
        assert_eq!(
            provider.query_by_cred_def("cd-1", Some(RegistryState::Full)).await.expect("query").len(),
            1,
            "the exhausted registry must end up FULL"
        );
    }

    #[tokio::test]
    async fn exhausting_retries_without_a_registry_fails() {
        let provider = MockProvider::new();
        let record = request_received(&provider, "ex-1", true);
        let config = EngineConfig {
            max_registry_retries: 1,
            ..fast_config()
        };

        let err = issue_credential(&provider, &config, record, None).await.expect_err("no registry ever appears");

        assert!(matches!(err, Error::NoActiveRevocationRegistry { .. }));
        assert!(!provider.notifications().is_empty());
    }

    #[tokio::test]
    async fn wrong_state_is_rejected() {
        let provider = MockProvider::new();
        let mut record = request_received(&provider, "ex-1", false);
        record.state = Some(ExchangeState::OfferSent);

        let err = issue_credential(&provider, &fast_config(), record, None).await.expect_err("wrong state");

        assert!(matches!(err, Error::WrongState { .. }));
    }

    #[tokio::test]
    async fn replaying_on_an_already_issued_credential_skips_the_crypto_step() {
        let provider = MockProvider::new();
        let record = request_received(&provider, "ex-1", false);

        let (first, _) = issue_credential(&provider, &fast_config(), record, None).await.expect("first call");
        assert_eq!(provider.credential_call_count(), 1);

        // Simulate a crash before the ISSUED transition was persisted.
        let mut replay_record = first.clone();
        replay_record.state = Some(ExchangeState::RequestReceived);

        let (second, message) = issue_credential(&provider, &fast_config(), replay_record, None).await.expect("replays");

        assert_eq!(provider.credential_call_count(), 1, "a replay must not call the issuer capability again");
        assert_eq!(second.raw_credential, first.raw_credential);
        assert_eq!(message.credentials_attach.len(), 1);
    }
}
