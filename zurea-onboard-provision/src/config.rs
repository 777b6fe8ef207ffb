//! Provisioning configuration model.
//!
//! A run is described by a single immutable [`ProvisionConfig`], constructed
//! once by the caller (the CLI applies flag > environment > default
//! precedence) and passed by reference through the pipeline. Nothing reads
//! ambient process state after construction.

/// APIs enabled unconditionally on every run.
pub const BASELINE_APIS: &[&str] = &[
    "iam.googleapis.com",
    "iamcredentials.googleapis.com",
    "cloudresourcemanager.googleapis.com",
    "sts.googleapis.com",
];

/// APIs enabled only when the target project has active billing.
pub const BILLING_GATED_APIS: &[&str] = &["storage.googleapis.com", "cloudasset.googleapis.com"];

/// Built-in read-only roles always bound to the collector identity.
pub const FIXED_READONLY_ROLES: &[&str] = &[
    "roles/iam.securityReviewer",
    "roles/cloudasset.viewer",
    "roles/serviceusage.serviceUsageConsumer",
];

/// Exact permission set of the Zurea custom role. Updates overwrite the
/// remote role to precisely this list.
pub const CUSTOM_ROLE_PERMISSIONS: &[&str] = &[
    "storage.buckets.list",
    "storage.buckets.get",
    "storage.buckets.getIamPolicy",
];

/// Broad built-in role used instead of the custom role when requested.
pub const VIEWER_ROLE: &str = "roles/viewer";

/// Role that allows a principal to mint short-lived tokens as the collector.
pub const TOKEN_CREATOR_ROLE: &str = "roles/iam.serviceAccountTokenCreator";

pub(crate) const SERVICE_ACCOUNT_DISPLAY_NAME: &str = "Zurea evidence collector";
pub(crate) const SERVICE_ACCOUNT_DESCRIPTION: &str =
    "Read-only identity impersonated by the Zurea evidence collector";
pub(crate) const CUSTOM_ROLE_TITLE: &str = "Zurea Evidence Reader";
pub(crate) const CUSTOM_ROLE_DESCRIPTION: &str =
    "Bucket inventory and bucket metadata read access for Zurea evidence collection";

/// How the remote collector is authorized to impersonate the provisioned
/// identity. The two variants are mutually exclusive per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImpersonationMode {
    /// The collector presents a federated AWS identity through a workload
    /// identity pool; no Google credential exists on the collector side.
    WorkloadFederation {
        /// Workload identity pool id in the target project
        pool: String,
        /// Provider id within the pool
        provider: String,
        /// AWS account the collector runs in
        external_account: String,
        /// AWS role the collector assumes
        external_role: String,
    },
    /// The collector is itself a service account in a Zurea-owned project
    /// and impersonates the provisioned identity cross-project.
    PeerServiceAccount {
        /// Fully-qualified collector service account email
        email: String,
    },
}

/// Immutable description of one provisioning run.
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    /// Target project to configure
    pub project_id: String,
    /// Short name of the collector service account
    pub service_account_name: String,
    /// Id of the project-level custom role
    pub custom_role_id: String,
    /// Impersonation-grant variant
    pub mode: ImpersonationMode,
    /// Bind `roles/viewer` instead of the custom role
    pub use_viewer_role: bool,
    /// Run the one-time verification read after provisioning
    pub verify: bool,
}

impl ProvisionConfig {
    /// Fully-qualified email of the collector service account.
    pub fn service_account_email(&self) -> String {
        format!(
            "{}@{}.iam.gserviceaccount.com",
            self.service_account_name, self.project_id
        )
    }

    /// IAM resource name of the collector service account.
    pub fn service_account_resource(&self) -> String {
        format!(
            "projects/{}/serviceAccounts/{}",
            self.project_id,
            self.service_account_email()
        )
    }

    /// Resource name of the target project.
    pub fn project_resource(&self) -> String {
        format!("projects/{}", self.project_id)
    }

    /// Resource name of the custom role, which doubles as the role id used
    /// in policy bindings.
    pub fn custom_role_resource(&self) -> String {
        format!("projects/{}/roles/{}", self.project_id, self.custom_role_id)
    }

    /// The IAM member string granted the token-creator role, resolved
    /// against the target project's number (federated principals embed the
    /// number, not the id).
    pub fn collector_principal(&self, project_number: &str) -> String {
        match &self.mode {
            ImpersonationMode::WorkloadFederation {
                pool,
                external_account,
                external_role,
                ..
            } => format!(
                "principalSet://iam.googleapis.com/projects/{project_number}/locations/global/workloadIdentityPools/{pool}/attribute.aws_role/arn:aws:sts::{external_account}:assumed-role/{external_role}"
            ),
            ImpersonationMode::PeerServiceAccount { email } => {
                format!("serviceAccount:{email}")
            }
        }
    }
}
