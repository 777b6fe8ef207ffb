use std::time::{Duration, Instant};

use anyhow::Result;
use log::{debug, info};

use crate::api::model::ProvisionSummary;
use crate::backoff::FixedBackoff;
use crate::config::{ProvisionConfig, VIEWER_ROLE};
use crate::errors::ProvisionError;
use crate::gcp::caller::{self, CallerIdentity};
use crate::gcp::clients::GcpServices;
use crate::steps::{FailurePolicy, enable_apis, grants, identity, impersonation, run_step, verify};

/// Propagation retry schedule for the verification token mint.
const VERIFY_BACKOFF_ATTEMPTS: u32 = 12;
const VERIFY_BACKOFF_DELAY: Duration = Duration::from_secs(5);

/// Drive the target project to the desired state described by `config`.
///
/// The pipeline is linear and never rolls back: every step is idempotent and
/// safe to leave applied, so partial progress is always consistent with a
/// later re-run completing the rest.
pub async fn provision(config: &ProvisionConfig) -> Result<ProvisionSummary> {
    // fatal preconditions: working credentials and a discoverable caller
    info!("resolving Application Default Credentials and the active caller");
    let caller = caller::active_caller().await?;
    debug!("active caller is '{}'", caller.email);
    let services = GcpServices::new().await?;

    run(&services, &caller, config).await
}

pub(crate) async fn run(
    services: &GcpServices,
    caller: &CallerIdentity,
    config: &ProvisionConfig,
) -> Result<ProvisionSummary> {
    let pipeline_start = Instant::now();

    // target selection: everything below acts on this project
    let project = services
        .projects
        .get_project()
        .set_name(config.project_resource())
        .send()
        .await
        .map_err(|e| ProvisionError::project_access(config.project_id.clone(), e))?;
    let project_number = project_number(&project.name)?;
    debug!(
        "target project '{}' has number {project_number}",
        config.project_id
    );

    run_step(
        "capability enablement",
        FailurePolicy::BestEffort,
        enable_apis::enable_apis(&services.service_usage, &services.billing, config),
    )
    .await?;

    run_step(
        "identity ensure",
        FailurePolicy::Fatal,
        identity::ensure_service_account(&services.iam, config),
    )
    .await?;

    run_step(
        "fixed role grants",
        FailurePolicy::BestEffort,
        grants::grant_fixed_roles(&services.projects, config),
    )
    .await?;

    // the two permission strategies are mutually exclusive per run
    if config.use_viewer_role {
        run_step(
            "viewer role grant",
            FailurePolicy::Fatal,
            grants::bind_collector_role(&services.projects, config, VIEWER_ROLE),
        )
        .await?;
    } else {
        run_step(
            "custom role ensure",
            FailurePolicy::Fatal,
            grants::ensure_custom_role(&services.iam, config),
        )
        .await?;
        run_step(
            "custom role grant",
            FailurePolicy::Fatal,
            grants::bind_collector_role(&services.projects, config, &config.custom_role_resource()),
        )
        .await?;
    }

    let principal = config.collector_principal(&project_number);
    run_step(
        "impersonation binding",
        FailurePolicy::Fatal,
        impersonation::grant_token_creator(
            &services.iam,
            &config.service_account_resource(),
            &principal,
        ),
    )
    .await?;

    let verification = if config.verify {
        info!(
            "verifying read access as '{}'",
            config.service_account_email()
        );
        Some(
            verify::verify_read_access(
                services,
                caller,
                config,
                FixedBackoff::new(VERIFY_BACKOFF_ATTEMPTS, VERIFY_BACKOFF_DELAY),
            )
            .await,
        )
    } else {
        None
    };

    debug!("reconciliation completed in {:?}", pipeline_start.elapsed());

    Ok(ProvisionSummary {
        project_id: config.project_id.clone(),
        project_number,
        service_account: config.service_account_email(),
        collector_principal: principal,
        verification,
    })
}

/// Extract the numeric id from a v3 project resource name (`projects/123`).
fn project_number(resource_name: &str) -> crate::errors::Result<String> {
    let number = resource_name
        .strip_prefix("projects/")
        .unwrap_or(resource_name);
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProvisionError::unexpected_response(
            "target selection",
            format!("project resource name '{resource_name}' carries no numeric project id"),
        ));
    }
    Ok(number.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BASELINE_APIS, CUSTOM_ROLE_PERMISSIONS, FIXED_READONLY_ROLES, ImpersonationMode,
        TOKEN_CREATOR_ROLE,
    };
    use crate::gcp::policy;
    use google_cloud_api_serviceusage_v1 as serviceusage;
    use google_cloud_auth::credentials::testing::test_credentials;
    use google_cloud_billing_v1 as billing;
    use google_cloud_gax as gax;
    use google_cloud_iam_admin_v1 as iam_admin;
    use google_cloud_iam_credentials_v1 as iam_credentials;
    use google_cloud_iam_v1 as iam_v1;
    use google_cloud_longrunning as longrunning;
    use google_cloud_resourcemanager_v3 as resourcemanager;
    use google_cloud_wkt as wkt;

    mockall::mock! {
        #[derive(Debug)]
        Iam {}
        impl iam_admin::stub::Iam for Iam {
            async fn get_service_account(&self, req: iam_admin::model::GetServiceAccountRequest, _options: gax::options::RequestOptions) -> gax::Result<gax::response::Response<iam_admin::model::ServiceAccount>>;
            async fn create_service_account(&self, req: iam_admin::model::CreateServiceAccountRequest, _options: gax::options::RequestOptions) -> gax::Result<gax::response::Response<iam_admin::model::ServiceAccount>>;
            async fn get_role(&self, req: iam_admin::model::GetRoleRequest, _options: gax::options::RequestOptions) -> gax::Result<gax::response::Response<iam_admin::model::Role>>;
            async fn create_role(&self, req: iam_admin::model::CreateRoleRequest, _options: gax::options::RequestOptions) -> gax::Result<gax::response::Response<iam_admin::model::Role>>;
            async fn update_role(&self, req: iam_admin::model::UpdateRoleRequest, _options: gax::options::RequestOptions) -> gax::Result<gax::response::Response<iam_admin::model::Role>>;
            async fn get_iam_policy(&self, req: iam_v1::model::GetIamPolicyRequest, _options: gax::options::RequestOptions) -> gax::Result<gax::response::Response<iam_v1::model::Policy>>;
            async fn set_iam_policy(&self, req: iam_v1::model::SetIamPolicyRequest, _options: gax::options::RequestOptions) -> gax::Result<gax::response::Response<iam_v1::model::Policy>>;
        }
    }

    mockall::mock! {
        #[derive(Debug)]
        Projects {}
        impl resourcemanager::stub::Projects for Projects {
            async fn get_project(&self, req: resourcemanager::model::GetProjectRequest, _options: gax::options::RequestOptions) -> gax::Result<gax::response::Response<resourcemanager::model::Project>>;
            async fn get_iam_policy(&self, req: iam_v1::model::GetIamPolicyRequest, _options: gax::options::RequestOptions) -> gax::Result<gax::response::Response<iam_v1::model::Policy>>;
            async fn set_iam_policy(&self, req: iam_v1::model::SetIamPolicyRequest, _options: gax::options::RequestOptions) -> gax::Result<gax::response::Response<iam_v1::model::Policy>>;
        }
    }

    mockall::mock! {
        #[derive(Debug)]
        ServiceUsage {}
        impl serviceusage::stub::ServiceUsage for ServiceUsage {
            async fn enable_service(&self, req: serviceusage::model::EnableServiceRequest, _options: gax::options::RequestOptions) -> gax::Result<gax::response::Response<longrunning::model::Operation>>;
        }
    }

    mockall::mock! {
        #[derive(Debug)]
        CloudBilling {}
        impl billing::stub::CloudBilling for CloudBilling {
            async fn get_project_billing_info(&self, req: billing::model::GetProjectBillingInfoRequest, _options: gax::options::RequestOptions) -> gax::Result<gax::response::Response<billing::model::ProjectBillingInfo>>;
        }
    }

    // no test here runs verification; the default stub fails every call
    #[derive(Debug)]
    struct UnusedIamCredentials;
    impl iam_credentials::stub::IAMCredentials for UnusedIamCredentials {}

    const PROJECT_NUMBER: &str = "415104041262";
    const SA_MEMBER: &str = "serviceAccount:zurea-evidence@acme-1.iam.gserviceaccount.com";

    fn federation_config() -> ProvisionConfig {
        ProvisionConfig {
            project_id: "acme-1".to_string(),
            service_account_name: "zurea-evidence".to_string(),
            custom_role_id: "zureaEvidenceReader".to_string(),
            mode: ImpersonationMode::WorkloadFederation {
                pool: "zurea-collectors".to_string(),
                provider: "zurea-aws".to_string(),
                external_account: "835410981827".to_string(),
                external_role: "zurea-collector".to_string(),
            },
            use_viewer_role: false,
            verify: false,
        }
    }

    fn test_caller() -> CallerIdentity {
        CallerIdentity {
            email: "admin@acme.example".to_string(),
            credentials: test_credentials(),
        }
    }

    fn finished_enable_operation() -> gax::response::Response<longrunning::model::Operation> {
        let response = serviceusage::model::EnableServiceResponse::new();
        let any = wkt::Any::try_from(&response).expect("EnableServiceResponse serializes");
        gax::response::Response::from(
            longrunning::model::Operation::new()
                .set_done(true)
                .set_result(longrunning::model::operation::Result::Response(any.into())),
        )
    }

    fn not_found() -> gax::error::Error {
        gax::error::Error::service(
            gax::error::rpc::Status::default().set_code(gax::error::rpc::Code::NotFound),
        )
    }

    /// Project policy that already contains every grant the pipeline makes.
    fn converged_project_policy(config: &ProvisionConfig) -> iam_v1::model::Policy {
        let mut policy = iam_v1::model::Policy::new();
        for role in FIXED_READONLY_ROLES {
            policy::ensure_binding(&mut policy, role, SA_MEMBER);
        }
        policy::ensure_binding(&mut policy, &config.custom_role_resource(), SA_MEMBER);
        policy
    }

    fn project_lookup(mock: &mut MockProjects) {
        mock.expect_get_project()
            .withf(|req, _| req.name == "projects/acme-1")
            .returning(|_, _| {
                Ok(gax::response::Response::from(
                    resourcemanager::model::Project::new()
                        .set_name(format!("projects/{PROJECT_NUMBER}")),
                ))
            });
    }

    fn services_from(
        iam: MockIam,
        projects: MockProjects,
        service_usage: MockServiceUsage,
        cloud_billing: MockCloudBilling,
    ) -> GcpServices {
        GcpServices {
            iam: iam_admin::client::Iam::from_stub(iam),
            projects: resourcemanager::client::Projects::from_stub(projects),
            service_usage: serviceusage::client::ServiceUsage::from_stub(service_usage),
            billing: billing::client::CloudBilling::from_stub(cloud_billing),
            credentials: iam_credentials::client::IAMCredentials::from_stub(UnusedIamCredentials),
        }
    }

    #[tokio::test]
    async fn test_first_run_applies_the_full_desired_state() {
        let config = federation_config();
        let expected_principal = config.collector_principal(PROJECT_NUMBER);

        let mut projects = MockProjects::new();
        project_lookup(&mut projects);
        // three fixed roles plus the custom role binding, one RMW each
        projects
            .expect_get_iam_policy()
            .times(FIXED_READONLY_ROLES.len() + 1)
            .returning(|_, _| Ok(gax::response::Response::from(iam_v1::model::Policy::new())));
        projects
            .expect_set_iam_policy()
            .times(FIXED_READONLY_ROLES.len() + 1)
            .returning(|req, _| {
                Ok(gax::response::Response::from(
                    req.policy.clone().unwrap_or_default(),
                ))
            });

        let mut iam = MockIam::new();
        iam.expect_get_service_account()
            .return_once(|_, _| Err(not_found()));
        iam.expect_create_service_account().return_once(|_, _| {
            Ok(gax::response::Response::from(
                iam_admin::model::ServiceAccount::new(),
            ))
        });
        iam.expect_get_role().return_once(|_, _| Err(not_found()));
        iam.expect_create_role()
            .withf(|req, _| {
                req.role
                    .as_ref()
                    .is_some_and(|r| r.included_permissions.len() == CUSTOM_ROLE_PERMISSIONS.len())
            })
            .return_once(|_, _| Ok(gax::response::Response::from(iam_admin::model::Role::new())));
        iam.expect_get_iam_policy()
            .return_once(|_, _| Ok(gax::response::Response::from(iam_v1::model::Policy::new())));
        let principal_check = expected_principal.clone();
        iam.expect_set_iam_policy()
            .withf(move |req, _| {
                req.resource.ends_with("zurea-evidence@acme-1.iam.gserviceaccount.com")
                    && req.policy.as_ref().is_some_and(|p| {
                        policy::has_binding(p, TOKEN_CREATOR_ROLE, &principal_check)
                    })
            })
            .return_once(|_, _| Ok(gax::response::Response::from(iam_v1::model::Policy::new())));

        let mut service_usage = MockServiceUsage::new();
        service_usage
            .expect_enable_service()
            .times(BASELINE_APIS.len())
            .returning(|_, _| Ok(finished_enable_operation()));

        let mut cloud_billing = MockCloudBilling::new();
        cloud_billing
            .expect_get_project_billing_info()
            .returning(|_, _| {
                Ok(gax::response::Response::from(
                    billing::model::ProjectBillingInfo::new().set_billing_enabled(false),
                ))
            });

        let services = services_from(iam, projects, service_usage, cloud_billing);
        let summary = run(&services, &test_caller(), &config)
            .await
            .expect("pipeline succeeds");

        assert_eq!(
            summary.service_account,
            "zurea-evidence@acme-1.iam.gserviceaccount.com"
        );
        assert_eq!(summary.project_number, PROJECT_NUMBER);
        assert_eq!(summary.collector_principal, expected_principal);
        assert!(summary.verification.is_none());
    }

    #[tokio::test]
    async fn test_second_run_issues_no_iam_writes() {
        let config = federation_config();

        let mut projects = MockProjects::new();
        project_lookup(&mut projects);
        let converged = converged_project_policy(&config);
        projects
            .expect_get_iam_policy()
            .times(FIXED_READONLY_ROLES.len() + 1)
            .returning(move |_, _| Ok(gax::response::Response::from(converged.clone())));
        // no set_iam_policy expectation: any project write panics the mock

        let mut iam = MockIam::new();
        iam.expect_get_service_account().returning(|_, _| {
            Ok(gax::response::Response::from(
                iam_admin::model::ServiceAccount::new()
                    .set_email("zurea-evidence@acme-1.iam.gserviceaccount.com"),
            ))
        });
        iam.expect_get_role().returning(|_, _| {
            Ok(gax::response::Response::from(
                iam_admin::model::Role::new().set_included_permissions(
                    CUSTOM_ROLE_PERMISSIONS
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>(),
                ),
            ))
        });
        let config_for_policy = config.clone();
        iam.expect_get_iam_policy().returning(move |_, _| {
            let mut sa_policy = iam_v1::model::Policy::new();
            policy::ensure_binding(
                &mut sa_policy,
                TOKEN_CREATOR_ROLE,
                &config_for_policy.collector_principal(PROJECT_NUMBER),
            );
            Ok(gax::response::Response::from(sa_policy))
        });
        // no create/update/set expectations: any write panics the mock

        let mut service_usage = MockServiceUsage::new();
        service_usage
            .expect_enable_service()
            .times(BASELINE_APIS.len())
            .returning(|_, _| Ok(finished_enable_operation()));

        let mut cloud_billing = MockCloudBilling::new();
        cloud_billing
            .expect_get_project_billing_info()
            .returning(|_, _| {
                Ok(gax::response::Response::from(
                    billing::model::ProjectBillingInfo::new().set_billing_enabled(false),
                ))
            });

        let services = services_from(iam, projects, service_usage, cloud_billing);
        let summary = run(&services, &test_caller(), &config)
            .await
            .expect("a converged project re-runs cleanly");
        assert_eq!(summary.project_id, "acme-1");
    }

    #[tokio::test]
    async fn test_viewer_mode_skips_the_custom_role() {
        let mut config = federation_config();
        config.use_viewer_role = true;

        let mut projects = MockProjects::new();
        project_lookup(&mut projects);
        projects
            .expect_get_iam_policy()
            .times(FIXED_READONLY_ROLES.len() + 1)
            .returning(|_, _| Ok(gax::response::Response::from(iam_v1::model::Policy::new())));
        let roles_seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let roles_recorder = roles_seen.clone();
        projects
            .expect_set_iam_policy()
            .times(FIXED_READONLY_ROLES.len() + 1)
            .returning(move |req, _| {
                let written = req.policy.clone().unwrap_or_default();
                for binding in &written.bindings {
                    roles_recorder
                        .lock()
                        .expect("roles lock")
                        .push(binding.role.clone());
                }
                Ok(gax::response::Response::from(written))
            });

        let mut iam = MockIam::new();
        iam.expect_get_service_account().returning(|_, _| {
            Ok(gax::response::Response::from(
                iam_admin::model::ServiceAccount::new(),
            ))
        });
        // no get_role/create_role/update_role expectations: touching the
        // custom role in viewer mode panics the mock
        iam.expect_get_iam_policy()
            .return_once(|_, _| Ok(gax::response::Response::from(iam_v1::model::Policy::new())));
        iam.expect_set_iam_policy()
            .return_once(|_, _| Ok(gax::response::Response::from(iam_v1::model::Policy::new())));

        let mut service_usage = MockServiceUsage::new();
        service_usage
            .expect_enable_service()
            .returning(|_, _| Ok(finished_enable_operation()));
        let mut cloud_billing = MockCloudBilling::new();
        cloud_billing
            .expect_get_project_billing_info()
            .returning(|_, _| {
                Ok(gax::response::Response::from(
                    billing::model::ProjectBillingInfo::new().set_billing_enabled(false),
                ))
            });

        let services = services_from(iam, projects, service_usage, cloud_billing);
        run(&services, &test_caller(), &config)
            .await
            .expect("pipeline succeeds");

        let roles_seen = roles_seen.lock().expect("roles lock");
        assert!(roles_seen.iter().any(|r| r == VIEWER_ROLE));
        assert!(
            !roles_seen.iter().any(|r| r.contains("zureaEvidenceReader")),
            "viewer mode must not bind the custom role"
        );
    }

    #[test]
    fn test_project_number_parsing() {
        assert_eq!(
            project_number("projects/415104041262").expect("parses"),
            "415104041262"
        );
        assert!(project_number("projects/").is_err());
        assert!(project_number("projects/acme-1").is_err());
    }
}
