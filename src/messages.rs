//! # Outbound Protocol Messages
//!
//! Envelope types emitted by flows in `crate::flows` and handed to the
//! `Responder` capability. Every message carries the fields common to the
//! protocol (spec §6): `@type` is implicit in the Rust type, `@id` is
//! `id`, and `~thread`/`~trace` are the `thread`/`trace` fields below.
//!
//! Attachment payloads are base64-wrapped opaque JSON (spec GLOSSARY,
//! "Attachment"). Only the `indy` format exists today; `Attachment::format`
//! is a named tag rather than a fixed string so a future `ld_proof` variant
//! is a new match arm, not a breaking wire change (spec §9, "Dynamic
//! dispatch over cred-format").

use std::collections::BTreeSet;

use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// `~thread` decorator threading a message to its exchange.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Thread {
    /// Thread id of the exchange (spec GLOSSARY: "Thread id").
    pub thid: String,
    /// Parent thread id, propagated into acks (spec §3, `parent_thread_id`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pthid: Option<String>,
}

/// Base64-wrapped opaque payload carried by a protocol message.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    /// Attachment identifier, unique within the message.
    #[serde(rename = "@id")]
    pub id: String,
    /// Attachment format tag. Only `"indy"` is produced today; the field
    /// exists so a future credential format is an additional tag value
    /// rather than a new wire shape.
    pub format: String,
    /// Base64-encoded JSON payload.
    pub data_base64: String,
}

impl Attachment {
    /// Wrap a JSON payload as a base64 `indy` attachment.
    ///
    /// # Panics
    ///
    /// Panics if `payload` cannot be serialized to JSON — this indicates a
    /// programmer error (a non-serializable internal value), not a runtime
    /// condition callers should recover from.
    #[must_use]
    pub fn wrap_indy(payload: &serde_json::Value) -> Self {
        let bytes = serde_json::to_vec(payload).expect("payload must serialize");
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            format: "indy".to_string(),
            data_base64: Base64::encode_string(&bytes),
        }
    }

    /// Decode the attachment back to its JSON payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the base64 or JSON decoding fails.
    pub fn decode(&self) -> Result<serde_json::Value> {
        let bytes = Base64::decode_vec(&self.data_base64)
            .map_err(|e| Error::Provider(anyhow::anyhow!("bad base64 attachment: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::Provider(anyhow::anyhow!("bad attachment json: {e}")))
    }
}

/// Require that `attachments` carries exactly one entry, per spec §4.3
/// (`BadAttachmentCount`).
///
/// # Errors
///
/// Returns [`Error::BadAttachmentCount`] if the count is not exactly one.
pub fn require_single(attachments: &[Attachment]) -> Result<&Attachment> {
    if attachments.len() != 1 {
        return Err(Error::BadAttachmentCount {
            found: attachments.len(),
        });
    }
    Ok(&attachments[0])
}

/// One attribute of a credential preview.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreviewAttribute {
    /// Attribute name, matched against the schema's `attrNames`.
    pub name: String,
    /// MIME type of `value`, if not plain text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Attribute value.
    pub value: String,
}

/// Preview of credential attributes carried by a proposal or offer.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialPreview {
    /// Attributes offered/proposed.
    pub attributes: Vec<PreviewAttribute>,
}

impl CredentialPreview {
    /// Attribute names carried by this preview, used for the §4.2 step-2
    /// schema/preview set-equality check.
    #[must_use]
    pub fn attr_names(&self) -> BTreeSet<String> {
        self.attributes.iter().map(|a| a.name.clone()).collect()
    }

    /// Attribute name/value pairs, passed to the issuer capability as
    /// credential values.
    #[must_use]
    pub fn attr_values(&self) -> std::collections::BTreeMap<String, String> {
        self.attributes.iter().map(|a| (a.name.clone(), a.value.clone())).collect()
    }

    /// Attribute name/MIME-type pairs for attributes that declare one,
    /// passed through to holder storage (spec §4.3, `store_credential`).
    #[must_use]
    pub fn mime_types(&self) -> std::collections::BTreeMap<String, String> {
        self.attributes
            .iter()
            .filter_map(|a| a.mime_type.clone().map(|m| (a.name.clone(), m)))
            .collect()
    }
}

/// Credential-definition selectors carried by a proposal (spec §3,
/// `proposal`).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredDefSelectors {
    /// Issuer DID of the schema.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_issuer_did: Option<String>,
    /// Schema id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,
    /// Schema name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    /// Schema version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    /// Explicit credential definition id, if the proposer already knows it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cred_def_id: Option<String>,
    /// Issuer DID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_did: Option<String>,
}

impl CredDefSelectors {
    /// Non-empty selector fields as a tag query, used to look up a matching
    /// posted credential definition (spec §4.2 step 1).
    #[must_use]
    pub fn tag_query(&self) -> std::collections::BTreeMap<&'static str, String> {
        let mut q = std::collections::BTreeMap::new();
        if let Some(v) = &self.schema_issuer_did {
            q.insert("schema_issuer_did", v.clone());
        }
        if let Some(v) = &self.schema_id {
            q.insert("schema_id", v.clone());
        }
        if let Some(v) = &self.schema_name {
            q.insert("schema_name", v.clone());
        }
        if let Some(v) = &self.schema_version {
            q.insert("schema_version", v.clone());
        }
        if let Some(v) = &self.cred_def_id {
            q.insert("cred_def_id", v.clone());
        }
        if let Some(v) = &self.issuer_did {
            q.insert("issuer_did", v.clone());
        }
        q
    }
}

/// `credential-proposal` message (holder → issuer).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialProposal {
    /// Message id; becomes the exchange's `thread_id` if this starts a new
    /// thread.
    #[serde(rename = "@id")]
    pub id: String,
    /// Thread decorator, present on anything but the first message of a
    /// thread.
    #[serde(rename = "~thread", skip_serializing_if = "Option::is_none")]
    pub thread: Option<Thread>,
    /// Tracing opt-in, propagated from the exchange record.
    #[serde(rename = "~trace", skip_serializing_if = "Option::is_none")]
    pub trace: Option<bool>,
    /// Optional human-readable comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Credential-definition selectors.
    #[serde(flatten)]
    pub selectors: CredDefSelectors,
    /// Preview attributes being proposed.
    pub credential_proposal: CredentialPreview,
}

/// `credential-offer` message (issuer → holder).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialOffer {
    /// Message id.
    #[serde(rename = "@id")]
    pub id: String,
    /// Thread decorator.
    #[serde(rename = "~thread")]
    pub thread: Thread,
    /// Tracing opt-in.
    #[serde(rename = "~trace", skip_serializing_if = "Option::is_none")]
    pub trace: Option<bool>,
    /// Optional human-readable comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Preview of the attributes being offered.
    pub credential_preview: CredentialPreview,
    /// Exactly one base64 indy offer payload (spec §6).
    #[serde(rename = "offers~attach")]
    pub offers_attach: Vec<Attachment>,
}

/// `credential-request` message (holder → issuer).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialRequest {
    /// Message id.
    #[serde(rename = "@id")]
    pub id: String,
    /// Thread decorator.
    #[serde(rename = "~thread")]
    pub thread: Thread,
    /// Tracing opt-in.
    #[serde(rename = "~trace", skip_serializing_if = "Option::is_none")]
    pub trace: Option<bool>,
    /// Exactly one base64 indy request payload.
    #[serde(rename = "requests~attach")]
    pub requests_attach: Vec<Attachment>,
}

/// `credential-issue` message (issuer → holder).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialIssue {
    /// Message id.
    #[serde(rename = "@id")]
    pub id: String,
    /// Thread decorator.
    #[serde(rename = "~thread")]
    pub thread: Thread,
    /// Tracing opt-in.
    #[serde(rename = "~trace", skip_serializing_if = "Option::is_none")]
    pub trace: Option<bool>,
    /// Optional human-readable comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Exactly one base64 indy credential payload.
    #[serde(rename = "credentials~attach")]
    pub credentials_attach: Vec<Attachment>,
}

/// `credential-ack` message (holder → issuer).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialAck {
    /// Message id.
    #[serde(rename = "@id")]
    pub id: String,
    /// Thread decorator, threaded to the original exchange.
    #[serde(rename = "~thread")]
    pub thread: Thread,
    /// Tracing opt-in.
    #[serde(rename = "~trace", skip_serializing_if = "Option::is_none")]
    pub trace: Option<bool>,
    /// Status of the exchange, always `"OK"` once the holder acks.
    pub status: String,
}

/// `problem-report` message — inbound only, the engine never emits one
/// (spec §7: "this engine signals abandonment only by recording it").
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemReport {
    /// Message id.
    #[serde(rename = "@id")]
    pub id: String,
    /// Thread decorator, used to locate the abandoned exchange.
    #[serde(rename = "~thread", skip_serializing_if = "Option::is_none")]
    pub thread: Option<Thread>,
    /// Problem description.
    pub description: ProblemReportDescription,
}

/// `description` field of a [`ProblemReport`].
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemReportDescription {
    /// Machine-readable problem code. Defaults to `issuance-abandoned` when
    /// absent (spec §4.6).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable (English) problem text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub en: Option<String>,
}

/// Default problem-report code used when a peer omits one (spec §4.6).
pub const DEFAULT_PROBLEM_CODE: &str = "issuance-abandoned";

/// A protocol message ready to hand to `crate::provider::Responder`.
///
/// The engine never needs to send a [`ProblemReport`] itself (spec §7), so
/// this enum covers only the five messages a flow function can produce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundMessage {
    /// `credential-proposal`.
    Proposal(CredentialProposal),
    /// `credential-offer`.
    Offer(CredentialOffer),
    /// `credential-request`.
    Request(CredentialRequest),
    /// `credential-issue`.
    Issue(CredentialIssue),
    /// `credential-ack`.
    Ack(CredentialAck),
}
