//! A protocol engine coordinating two-party verifiable credential issuance
//! exchanges: propose, offer, request, issue, and acknowledge, plus
//! abandonment via an inbound problem-report.
//!
//! The engine owns the exchange state machine ([`state`]), the durable
//! [`record::CredentialExchange`], and the flow functions in [`flows`] that
//! drive one from the other. It does not own a ledger, cryptography, a
//! transport, or storage — those are injected through the capability
//! traits in [`provider`], which a hosting agent implements against its
//! own infrastructure.
//!
//! # Feature Flags
//!
//! Both are enabled by default:
//!
//! * `issuer` - Enables the issuer-side flows ([`flows::issuer`]).
//! * `holder` - Enables the holder-side flows ([`flows::holder`]).
//! * `test-support` - Exposes [`test_support::MockProvider`], an in-memory
//!   [`provider::Provider`] implementation, for use by dependents' own
//!   tests.

pub mod cache;
pub mod config;
pub mod error;
pub mod flows;
pub mod generate;
pub mod messages;
pub mod provider;
pub mod record;
pub mod revocation;
pub mod state;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
