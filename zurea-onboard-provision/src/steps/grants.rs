//! Permission grants: the fixed read-only role set and the Zurea custom
//! role (or the broad `roles/viewer` alternative).

use google_cloud_iam_admin_v1::client::Iam;
use google_cloud_iam_admin_v1::model::{Role, role::RoleLaunchStage};
use google_cloud_resourcemanager_v3::client::Projects;
use google_cloud_wkt::FieldMask;
use log::{debug, warn};

use crate::config::{
    CUSTOM_ROLE_DESCRIPTION, CUSTOM_ROLE_PERMISSIONS, CUSTOM_ROLE_TITLE, FIXED_READONLY_ROLES,
    ProvisionConfig,
};
use crate::errors::{ProvisionError, Result};
use crate::gcp::{self, policy};
use crate::steps::StepOutcome;

/// Add `member` to `role` on the project policy via read-modify-write.
/// Returns whether anything was written.
pub(crate) async fn grant_project_role(
    projects: &Projects,
    project_resource: &str,
    role: &str,
    member: &str,
) -> Result<bool> {
    let mut current = projects
        .get_iam_policy()
        .set_resource(project_resource)
        .send()
        .await
        .map_err(|e| ProvisionError::remote("permission grant", role, e))?;

    if !policy::ensure_binding(&mut current, role, member) {
        debug!("'{member}' already holds '{role}' on '{project_resource}'");
        return Ok(false);
    }

    projects
        .set_iam_policy()
        .set_resource(project_resource)
        .set_policy(current)
        .send()
        .await
        .map_err(|e| ProvisionError::remote("permission grant", role, e))?;
    Ok(true)
}

/// Bind the fixed read-only role set to the collector. Each role is
/// independently best-effort: the workflow grants as much of the safe set
/// as succeeds rather than failing all-or-nothing.
pub(crate) async fn grant_fixed_roles(
    projects: &Projects,
    config: &ProvisionConfig,
) -> Result<StepOutcome> {
    let project_resource = config.project_resource();
    let member = format!("serviceAccount:{}", config.service_account_email());

    let mut changed = false;
    let mut failures = 0;
    let mut last_failure = None;
    for role in FIXED_READONLY_ROLES {
        match grant_project_role(projects, &project_resource, role, &member).await {
            Ok(wrote) => changed |= wrote,
            Err(err) => {
                warn!("binding '{role}' failed, continuing with the remaining roles: {err}");
                failures += 1;
                last_failure = Some(err);
            }
        }
    }

    match last_failure {
        Some(err) if failures == FIXED_READONLY_ROLES.len() => Err(err),
        _ if changed => Ok(StepOutcome::Applied),
        _ => Ok(StepOutcome::AlreadySatisfied),
    }
}

/// Bind a single role (the custom role or `roles/viewer`) to the collector
/// on the project policy.
pub(crate) async fn bind_collector_role(
    projects: &Projects,
    config: &ProvisionConfig,
    role: &str,
) -> Result<StepOutcome> {
    let member = format!("serviceAccount:{}", config.service_account_email());
    let wrote = grant_project_role(projects, &config.project_resource(), role, &member).await?;
    if wrote {
        Ok(StepOutcome::Applied)
    } else {
        Ok(StepOutcome::AlreadySatisfied)
    }
}

/// Create the Zurea custom role, or overwrite its permission list to exactly
/// the declared set when it drifted. Update semantics, not merge: a prior
/// run or a manual edit cannot leave stray permissions behind.
pub(crate) async fn ensure_custom_role(iam: &Iam, config: &ProvisionConfig) -> Result<StepOutcome> {
    const STEP: &str = "custom role ensure";
    let role_resource = config.custom_role_resource();
    let declared: Vec<String> = CUSTOM_ROLE_PERMISSIONS
        .iter()
        .map(ToString::to_string)
        .collect();

    let existing = match iam
        .get_role()
        .set_name(role_resource.clone())
        .send()
        .await
    {
        Ok(role) => Some(role),
        Err(err) if gcp::is_not_found(&err) => None,
        Err(err) => return Err(ProvisionError::remote(STEP, role_resource, err)),
    };

    let Some(existing) = existing else {
        debug!("creating custom role '{role_resource}'");
        iam.create_role()
            .set_parent(config.project_resource())
            .set_role_id(config.custom_role_id.clone())
            .set_role(
                Role::new()
                    .set_title(CUSTOM_ROLE_TITLE)
                    .set_description(CUSTOM_ROLE_DESCRIPTION)
                    .set_included_permissions(declared)
                    .set_stage(RoleLaunchStage::Ga),
            )
            .send()
            .await
            .map_err(|e| ProvisionError::remote(STEP, config.custom_role_id.clone(), e))?;
        return Ok(StepOutcome::Applied);
    };

    if same_permission_set(&existing.included_permissions, &declared) {
        debug!("custom role '{role_resource}' already matches the declared permission set");
        return Ok(StepOutcome::AlreadySatisfied);
    }

    debug!("overwriting the permission list of '{role_resource}'");
    iam.update_role()
        .set_name(role_resource.clone())
        .set_role(Role::new().set_included_permissions(declared))
        .set_update_mask(FieldMask::default().set_paths(["included_permissions"]))
        .send()
        .await
        .map_err(|e| ProvisionError::remote(STEP, role_resource, e))?;
    Ok(StepOutcome::Applied)
}

/// Permission lists compare as sets; the service does not guarantee order.
fn same_permission_set(current: &[String], declared: &[String]) -> bool {
    let mut current: Vec<&String> = current.iter().collect();
    let mut declared: Vec<&String> = declared.iter().collect();
    current.sort();
    declared.sort();
    current == declared
}
