//! # Flows
//!
//! One module per credential-exchange operation (spec §4.2, §4.3, §4.6).
//! Every flow function takes the provider bundle plus whatever message or
//! identifiers it needs, loads or builds a [`crate::record::CredentialExchange`],
//! asserts the transition against [`crate::state::assert_transition`], does
//! its capability calls, and saves the updated record. None of them hide
//! retries or auto-continuation from the caller except the revocation-
//! registry rotation inside `issuer::issue_credential`, which spec §4.2
//! mandates the engine handle internally.

#[cfg(feature = "issuer")]
pub mod issuer;

#[cfg(feature = "holder")]
pub mod holder;

pub mod problem_report;
