//! Token-creator bindings on the collector service account's own policy.
//!
//! This is the capability-transfer step: a principal holding
//! `roles/iam.serviceAccountTokenCreator` on the service account can mint
//! short-lived credentials as it, so no long-lived key ever exists.

use google_cloud_iam_admin_v1::client::Iam;
use log::debug;

use crate::config::TOKEN_CREATOR_ROLE;
use crate::errors::{ProvisionError, Result};
use crate::gcp::policy;
use crate::steps::StepOutcome;

const STEP: &str = "impersonation binding";

/// Grant `member` the token-creator role on the service account.
pub(crate) async fn grant_token_creator(
    iam: &Iam,
    service_account_resource: &str,
    member: &str,
) -> Result<StepOutcome> {
    let mut current = iam
        .get_iam_policy()
        .set_resource(service_account_resource)
        .send()
        .await
        .map_err(|e| ProvisionError::remote(STEP, member, e))?;

    if !policy::ensure_binding(&mut current, TOKEN_CREATOR_ROLE, member) {
        debug!("'{member}' can already impersonate '{service_account_resource}'");
        return Ok(StepOutcome::AlreadySatisfied);
    }

    iam.set_iam_policy()
        .set_resource(service_account_resource)
        .set_policy(current)
        .send()
        .await
        .map_err(|e| ProvisionError::remote(STEP, member, e))?;
    Ok(StepOutcome::Applied)
}

/// Remove `member`'s token-creator grant from the service account. Used to
/// tear down the transient verification binding.
pub(crate) async fn revoke_token_creator(
    iam: &Iam,
    service_account_resource: &str,
    member: &str,
) -> Result<StepOutcome> {
    let mut current = iam
        .get_iam_policy()
        .set_resource(service_account_resource)
        .send()
        .await
        .map_err(|e| ProvisionError::remote(STEP, member, e))?;

    if !policy::remove_binding(&mut current, TOKEN_CREATOR_ROLE, member) {
        return Ok(StepOutcome::AlreadySatisfied);
    }

    iam.set_iam_policy()
        .set_resource(service_account_resource)
        .set_policy(current)
        .send()
        .await
        .map_err(|e| ProvisionError::remote(STEP, member, e))?;
    Ok(StepOutcome::Applied)
}
