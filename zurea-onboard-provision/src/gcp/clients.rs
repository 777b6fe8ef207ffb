use google_cloud_api_serviceusage_v1::client::ServiceUsage;
use google_cloud_billing_v1::client::CloudBilling;
use google_cloud_iam_admin_v1::client::Iam;
use google_cloud_iam_credentials_v1::client::IAMCredentials as IamCredentials;
use google_cloud_resourcemanager_v3::client::Projects;

use crate::errors::{ProvisionError, Result};

/// Bundle of the administrative clients the reconciliation steps call,
/// all authenticated through Application Default Credentials.
pub(crate) struct GcpServices {
    pub(crate) iam: Iam,
    pub(crate) projects: Projects,
    pub(crate) service_usage: ServiceUsage,
    pub(crate) billing: CloudBilling,
    pub(crate) credentials: IamCredentials,
}

impl GcpServices {
    /// Construct every client up front so a broken environment fails the
    /// run before the first remote call.
    pub(crate) async fn new() -> Result<Self> {
        let iam = Iam::builder().build().await.map_err(|e| {
            ProvisionError::environment_with_source("failed to build the IAM admin client", e)
        })?;
        let projects = Projects::builder().build().await.map_err(|e| {
            ProvisionError::environment_with_source(
                "failed to build the Resource Manager client",
                e,
            )
        })?;
        let service_usage = ServiceUsage::builder().build().await.map_err(|e| {
            ProvisionError::environment_with_source("failed to build the Service Usage client", e)
        })?;
        let billing = CloudBilling::builder().build().await.map_err(|e| {
            ProvisionError::environment_with_source("failed to build the Cloud Billing client", e)
        })?;
        let credentials = IamCredentials::builder().build().await.map_err(|e| {
            ProvisionError::environment_with_source(
                "failed to build the IAM Credentials client",
                e,
            )
        })?;

        Ok(Self {
            iam,
            projects,
            service_usage,
            billing,
            credentials,
        })
    }
}
