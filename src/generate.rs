//! # Id Generation
//!
//! Small helpers flows use to mint identifiers. Centralized here so the
//! format can change in one place (spec GLOSSARY doesn't mandate a format
//! beyond uniqueness).

/// A fresh message/attachment/exchange id.
#[must_use]
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Cache key for a credential offer dedup lease (spec §4.4).
#[must_use]
pub fn offer_cache_key(cred_def_id: &str) -> String {
    format!("credential_offer::{cred_def_id}")
}

/// Cache key for a credential request dedup lease (spec §4.4).
#[must_use]
pub fn request_cache_key(cred_def_id: &str, holder_did: &str, nonce: &str) -> String {
    format!("credential_request::{cred_def_id}::{holder_did}::{nonce}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }

    #[test]
    fn cache_keys_are_stable_for_same_inputs() {
        assert_eq!(offer_cache_key("cd-1"), offer_cache_key("cd-1"));
        assert_eq!(
            request_cache_key("cd-1", "did:x", "n1"),
            "credential_request::cd-1::did:x::n1"
        );
    }
}
