//! Ensure the collector service account exists.

use google_cloud_iam_admin_v1::client::Iam;
use google_cloud_iam_admin_v1::model::ServiceAccount;
use log::debug;

use crate::config::{ProvisionConfig, SERVICE_ACCOUNT_DESCRIPTION, SERVICE_ACCOUNT_DISPLAY_NAME};
use crate::errors::{ProvisionError, Result};
use crate::gcp;
use crate::steps::StepOutcome;

const STEP: &str = "identity ensure";

/// Create the collector service account if it is absent. The account is
/// never deleted by this workflow; losing a creation race to a concurrent
/// run counts as the account existing.
pub(crate) async fn ensure_service_account(
    iam: &Iam,
    config: &ProvisionConfig,
) -> Result<StepOutcome> {
    let email = config.service_account_email();

    match iam
        .get_service_account()
        .set_name(config.service_account_resource())
        .send()
        .await
    {
        Ok(_) => {
            debug!("service account '{email}' already exists");
            return Ok(StepOutcome::AlreadySatisfied);
        }
        Err(err) if gcp::is_not_found(&err) => {}
        Err(err) => return Err(ProvisionError::remote(STEP, email, err)),
    }

    debug!("creating service account '{email}'");
    match iam
        .create_service_account()
        .set_name(config.project_resource())
        .set_account_id(config.service_account_name.clone())
        .set_service_account(
            ServiceAccount::new()
                .set_display_name(SERVICE_ACCOUNT_DISPLAY_NAME)
                .set_description(SERVICE_ACCOUNT_DESCRIPTION),
        )
        .send()
        .await
    {
        Ok(_) => Ok(StepOutcome::Applied),
        // another run created it between our check and our create
        Err(err) if gcp::is_already_exists(&err) => Ok(StepOutcome::AlreadySatisfied),
        Err(err) => Err(ProvisionError::remote(STEP, email, err)),
    }
}
