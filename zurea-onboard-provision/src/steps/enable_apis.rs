//! Capability enablement: baseline APIs always, billing-gated APIs only
//! when the target project has active billing.

use google_cloud_api_serviceusage_v1::client::ServiceUsage;
use google_cloud_billing_v1::client::CloudBilling;
use google_cloud_lro::Poller;
use log::{debug, warn};

use crate::config::{BASELINE_APIS, BILLING_GATED_APIS, ProvisionConfig};
use crate::errors::{ProvisionError, Result};
use crate::gcp;
use crate::steps::StepOutcome;

/// Enable the required APIs on the target project. Each enable call is
/// independent; one failure does not stop the rest, and the last failure is
/// surfaced to the runner after everything else has been attempted.
pub(crate) async fn enable_apis(
    service_usage: &ServiceUsage,
    billing: &CloudBilling,
    config: &ProvisionConfig,
) -> Result<StepOutcome> {
    let mut last_failure = None;

    for api in BASELINE_APIS {
        if let Err(err) = enable_api(service_usage, &config.project_id, api).await {
            warn!("enabling '{api}' failed: {err}");
            last_failure = Some(err);
        }
    }

    if billing_enabled(billing, &config.project_id).await {
        for api in BILLING_GATED_APIS {
            if let Err(err) = enable_api(service_usage, &config.project_id, api).await {
                warn!("enabling '{api}' failed: {err}");
                last_failure = Some(err);
            }
        }
    } else {
        // fail-safe default: without confirmed billing, do less, not more
        debug!(
            "billing is not active on '{}'; skipping {:?}",
            config.project_id, BILLING_GATED_APIS
        );
    }

    match last_failure {
        Some(err) => Err(err),
        None => Ok(StepOutcome::Applied),
    }
}

async fn enable_api(service_usage: &ServiceUsage, project_id: &str, api: &str) -> Result<()> {
    debug!("enabling '{api}' on '{project_id}'");
    match service_usage
        .enable_service()
        .set_name(format!("projects/{project_id}/services/{api}"))
        .poller()
        .until_done()
        .await
    {
        Ok(_) => Ok(()),
        // an enable racing another run is still an enabled service
        Err(err) if gcp::is_already_exists(&err) => Ok(()),
        Err(err) => Err(ProvisionError::remote("capability enablement", api, err)),
    }
}

/// Whether the project has an active billing account. A failed query is
/// reported as "not enabled" so the gated set is skipped rather than
/// requested blind.
async fn billing_enabled(billing: &CloudBilling, project_id: &str) -> bool {
    match billing
        .get_project_billing_info()
        .set_name(format!("projects/{project_id}"))
        .send()
        .await
    {
        Ok(info) => info.billing_enabled,
        Err(err) => {
            warn!(
                "billing status of '{project_id}' could not be read, treating billing as disabled: {err}"
            );
            false
        }
    }
}
