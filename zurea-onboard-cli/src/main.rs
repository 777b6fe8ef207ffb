//! `zurea-onboard` — provision the Zurea evidence collector identity in a
//! Google Cloud project.
//!
//! The binary is a thin shell around `zurea-onboard-provision`: it resolves
//! the configuration (flag > environment > default), runs the reconciliation
//! pipeline, and renders the summary. It exits non-zero only on fatal
//! precondition or environment failures; a skipped verification is a warning.

mod output;

use anyhow::Result;
use clap::Parser;
use zurea_onboard_provision::{ImpersonationMode, ProvisionConfig, api};

#[derive(Debug, Parser)]
#[command(
    name = "zurea-onboard",
    version,
    about = "Provision the least-privilege, read-only Zurea evidence collector identity in a Google Cloud project"
)]
struct Cli {
    /// Google Cloud project to onboard
    #[arg(long, env = "ZUREA_PROJECT_ID")]
    project_id: String,

    /// Short name of the collector service account
    #[arg(long, env = "ZUREA_SERVICE_ACCOUNT_NAME", default_value = "zurea-evidence")]
    service_account_name: String,

    /// Id of the project-level custom role holding the exact read permission set
    #[arg(long, env = "ZUREA_CUSTOM_ROLE_ID", default_value = "zureaEvidenceReader")]
    custom_role_id: String,

    /// Workload identity pool the collector federates through
    #[arg(long, env = "ZUREA_FEDERATION_POOL", default_value = "zurea-collectors")]
    federation_pool: String,

    /// Provider id within the workload identity pool
    #[arg(long, env = "ZUREA_FEDERATION_PROVIDER", default_value = "zurea-aws")]
    federation_provider: String,

    /// AWS account the Zurea collector runs in
    #[arg(long, env = "ZUREA_EXTERNAL_ACCOUNT", default_value = "835410981827")]
    external_account: String,

    /// AWS role the Zurea collector assumes
    #[arg(long, env = "ZUREA_EXTERNAL_ROLE", default_value = "zurea-collector")]
    external_role: String,

    /// Collector service account email; selects cross-project impersonation
    /// instead of workload identity federation
    #[arg(long, env = "ZUREA_COLLECTOR_SERVICE_ACCOUNT")]
    collector_service_account: Option<String>,

    /// Bind the broad built-in roles/viewer role instead of the custom role
    #[arg(long)]
    use_viewer_role: bool,

    /// Verify read access by impersonating the provisioned identity, then
    /// revoke the transient verification grant
    #[arg(long)]
    verify: bool,

    /// Print the final summary as JSON instead of plain text
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn into_config(self) -> ProvisionConfig {
        let mode = match self.collector_service_account {
            Some(email) => ImpersonationMode::PeerServiceAccount { email },
            None => ImpersonationMode::WorkloadFederation {
                pool: self.federation_pool,
                provider: self.federation_provider,
                external_account: self.external_account,
                external_role: self.external_role,
            },
        };
        ProvisionConfig {
            project_id: self.project_id,
            service_account_name: self.service_account_name,
            custom_role_id: self.custom_role_id,
            mode,
            use_viewer_role: self.use_viewer_role,
            verify: self.verify,
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let json = cli.json;
    let config = cli.into_config();

    output::note(&format!(
        "provisioning Zurea collector access in project '{}'",
        config.project_id
    ));
    if let ImpersonationMode::WorkloadFederation { pool, provider, .. } = &config.mode {
        output::note(&format!(
            "collector authenticates through workload identity pool '{pool}', provider '{provider}'"
        ));
    }

    let summary = api::provision(&config).await?;

    if let Some(verification) = &summary.verification {
        output::print_verification(verification);
    }
    if json {
        output::print_summary_json(&summary)?;
    } else {
        output::print_summary(&summary);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        output::error(&format!("{err:#}"));
        std::process::exit(1);
    }
}
