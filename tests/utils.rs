//! Shared fixtures for the scenario tests.

use credential_issuance::messages::{CredDefSelectors, CredentialPreview, PreviewAttribute};
use credential_issuance::test_support::MockProvider;

/// A provider with one schema and one posted, non-revocable cred-def.
pub fn issuer_with_cred_def(schema_id: &str, cred_def_id: &str, attrs: &[&str]) -> MockProvider {
    let provider = MockProvider::new();
    provider.seed_schema(schema_id, attrs);
    provider.seed_cred_def(cred_def_id, schema_id, false, &[("schema_name", "identification schema")]);
    provider
}

pub fn preview(attrs: &[(&str, &str)]) -> CredentialPreview {
    CredentialPreview {
        attributes: attrs
            .iter()
            .map(|(name, value)| PreviewAttribute {
                name: (*name).to_string(),
                mime_type: None,
                value: (*value).to_string(),
            })
            .collect(),
    }
}

pub fn selectors_for(schema_name: &str) -> CredDefSelectors {
    CredDefSelectors {
        schema_name: Some(schema_name.to_string()),
        ..Default::default()
    }
}
