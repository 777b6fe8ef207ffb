//! One-time verification read.
//!
//! Grants the invoking identity a transient token-creator binding, mints a
//! short-lived token as the collector (retrying through IAM propagation
//! lag), reads bucket encryption metadata with the impersonated identity,
//! and unconditionally revokes the transient binding again. Nothing in this
//! step is fatal: the core provisioning already succeeded by the time it
//! runs.

use google_cloud_auth::credentials::impersonated;
use google_cloud_iam_credentials_v1::client::IAMCredentials as IamCredentials;
use google_cloud_storage::client::StorageControl;
use google_cloud_storage::model::Bucket;
use google_cloud_wkt as wkt;
use log::{debug, warn};

use crate::api::model::{BucketEncryption, BucketReport, VerificationReport};
use crate::backoff::FixedBackoff;
use crate::config::ProvisionConfig;
use crate::errors::{ProvisionError, Result};
use crate::gcp::caller::CallerIdentity;
use crate::gcp::clients::GcpServices;
use crate::steps::impersonation;

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const TOKEN_LIFETIME_SECS: i64 = 600;

/// Run the verification pass. Always returns a report; failures along the
/// way degrade to a warning inside it. The transient caller binding is
/// revoked on every path.
pub(crate) async fn verify_read_access(
    services: &GcpServices,
    caller: &CallerIdentity,
    config: &ProvisionConfig,
    backoff: FixedBackoff,
) -> VerificationReport {
    let sa_resource = config.service_account_resource();
    let member = caller.member();

    let report =
        match impersonation::grant_token_creator(&services.iam, &sa_resource, &member).await {
            Err(err) => {
                warn!("could not grant the transient verification binding: {err}");
                VerificationReport::warning(format!(
                    "verification skipped: the transient binding could not be granted ({err})"
                ))
            }
            Ok(_) => run_checks(services, caller, config, backoff).await,
        };

    // the transient grant must never outlive the run, whatever happened above
    if let Err(err) =
        impersonation::revoke_token_creator(&services.iam, &sa_resource, &member).await
    {
        warn!("failed to revoke the transient verification binding for '{member}': {err}");
    }

    report
}

async fn run_checks(
    services: &GcpServices,
    caller: &CallerIdentity,
    config: &ProvisionConfig,
    backoff: FixedBackoff,
) -> VerificationReport {
    let email = config.service_account_email();

    if let Err(err) = mint_with_backoff(&services.credentials, &email, backoff).await {
        warn!("{err}");
        return VerificationReport::warning(format!("verification skipped: {err}"));
    }

    let storage = match collector_storage(caller, &email).await {
        Ok(storage) => storage,
        Err(err) => {
            warn!("{err}");
            return VerificationReport::warning(format!("verification skipped: {err}"));
        }
    };

    match classify_buckets(&storage, &config.project_id).await {
        Ok(buckets) => VerificationReport {
            buckets,
            warning: None,
        },
        Err(err) => {
            warn!("{err}");
            VerificationReport::warning(format!("bucket metadata read as '{email}' failed: {err}"))
        }
    }
}

/// Mint a short-lived token as the collector, retrying on the fixed
/// schedule until IAM propagation catches up.
async fn mint_with_backoff(
    credentials: &IamCredentials,
    email: &str,
    backoff: FixedBackoff,
) -> Result<()> {
    backoff
        .run(|attempt| {
            debug!(
                "minting a short-lived token as '{email}' (attempt {attempt}/{})",
                backoff.attempts()
            );
            let request = credentials
                .generate_access_token()
                .set_name(format!("projects/-/serviceAccounts/{email}"))
                .set_scope([CLOUD_PLATFORM_SCOPE])
                .set_lifetime(wkt::Duration::clamp(TOKEN_LIFETIME_SECS, 0));
            async move { request.send().await }
        })
        .await
        .map(|_| ())
        .map_err(|err| ProvisionError::PropagationTimeout {
            principal: email.to_string(),
            attempts: backoff.attempts(),
            message: err.to_string(),
        })
}

/// Storage client authenticated as the collector via impersonation.
async fn collector_storage(caller: &CallerIdentity, email: &str) -> Result<StorageControl> {
    let credentials = impersonated::Builder::from_source_credentials(caller.credentials.clone())
        .with_target_principal(email)
        .with_scopes([CLOUD_PLATFORM_SCOPE])
        .build()
        .map_err(|e| {
            ProvisionError::environment_with_source(
                "could not build impersonated collector credentials",
                e,
            )
        })?;
    StorageControl::builder()
        .with_credentials(credentials)
        .build()
        .await
        .map_err(|e| {
            ProvisionError::environment_with_source(
                "could not build the impersonated storage client",
                e,
            )
        })
}

/// List the project's buckets and classify each one's encryption
/// configuration.
pub(crate) async fn classify_buckets(
    storage: &StorageControl,
    project_id: &str,
) -> Result<Vec<BucketReport>> {
    use google_cloud_gax::paginator::ItemPaginator as _;

    let mut reports = Vec::new();
    let mut buckets = storage
        .list_buckets()
        .set_parent(format!("projects/{project_id}"))
        .by_item();
    while let Some(bucket) = buckets.next().await {
        let bucket =
            bucket.map_err(|e| ProvisionError::remote("verification read", project_id, e))?;
        let detailed = storage
            .get_bucket()
            .set_name(bucket.name.clone())
            .send()
            .await
            .map_err(|e| ProvisionError::remote("verification read", bucket.name.clone(), e))?;
        reports.push(BucketReport {
            name: bucket_short_name(&detailed),
            encryption: classify(&detailed),
        });
    }
    Ok(reports)
}

fn classify(bucket: &Bucket) -> BucketEncryption {
    match &bucket.encryption {
        Some(encryption) if !encryption.default_kms_key.is_empty() => BucketEncryption::Cmek,
        _ => BucketEncryption::GoogleManaged,
    }
}

fn bucket_short_name(bucket: &Bucket) -> String {
    if !bucket.bucket_id.is_empty() {
        return bucket.bucket_id.clone();
    }
    bucket
        .name
        .rsplit('/')
        .next()
        .unwrap_or(bucket.name.as_str())
        .to_string()
}
