//! Result models of a provisioning run.

use serde::Serialize;
use std::fmt;

/// How a bucket's default encryption is keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BucketEncryption {
    /// A customer-managed KMS key is configured
    #[serde(rename = "CMEK")]
    Cmek,
    /// No customer key reference; Google-managed encryption applies
    #[serde(rename = "Google-managed")]
    GoogleManaged,
}

impl fmt::Display for BucketEncryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cmek => f.write_str("CMEK"),
            Self::GoogleManaged => f.write_str("Google-managed"),
        }
    }
}

/// One bucket's verification row.
#[derive(Debug, Clone, Serialize)]
pub struct BucketReport {
    /// Short bucket name
    pub name: String,
    /// Encryption classification
    pub encryption: BucketEncryption,
}

/// Result of the optional verification pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationReport {
    /// Classified buckets, empty when verification did not get that far
    pub buckets: Vec<BucketReport>,
    /// Why verification stopped early, if it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl VerificationReport {
    /// A report that carries only a warning.
    pub(crate) fn warning(message: impl Into<String>) -> Self {
        Self {
            buckets: Vec::new(),
            warning: Some(message.into()),
        }
    }
}

/// The run's observable result: the resolved identifiers.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionSummary {
    /// Target project id
    pub project_id: String,
    /// Target project number
    pub project_number: String,
    /// Fully-qualified collector service account email
    pub service_account: String,
    /// The member string authorized to impersonate the collector
    pub collector_principal: String,
    /// Verification result, present only when verification was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationReport>,
}
