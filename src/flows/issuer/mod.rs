//! Issuer-side flow functions (spec §4.2).

mod create_offer;
mod issue_credential;
mod prepare_send;
mod receive_ack;
mod receive_proposal;
mod receive_request;

pub use create_offer::create_offer;
pub use issue_credential::issue_credential;
pub use prepare_send::prepare_send;
pub use receive_ack::receive_credential_ack;
pub use receive_proposal::receive_proposal;
pub use receive_request::receive_request;

use crate::record::CredentialExchange;

/// Whether the caller should immediately follow `receive_proposal` with
/// `create_offer` rather than waiting for operator confirmation. Mirrors
/// the `auto_offer` flag on the record; the engine never auto-continues on
/// its own (spec §9).
#[must_use]
pub fn should_auto_offer(record: &CredentialExchange) -> bool {
    record.auto_offer
}

/// Whether the caller should immediately follow `receive_request` with
/// `issue_credential`. Mirrors the `auto_issue` flag on the record.
#[must_use]
pub fn should_auto_issue(record: &CredentialExchange) -> bool {
    record.auto_issue
}
