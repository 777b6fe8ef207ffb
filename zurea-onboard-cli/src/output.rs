use anyhow::{Context, Result};
use log::debug;
use std::io::{self, Write};
use zurea_onboard_provision::{ProvisionSummary, VerificationReport};

pub(crate) fn note(msg: &str) {
    let _ = writeln!(io::stderr(), "zurea-onboard: {}", msg);
}

pub(crate) fn warn(msg: &str) {
    let _ = writeln!(io::stderr(), "zurea-onboard (warning): {}", msg);
}

pub(crate) fn error(msg: &str) {
    let _ = writeln!(io::stderr(), "zurea-onboard (error): {}", msg);
}

/// Final plain-text summary: the resolved identifiers of the run.
pub(crate) fn print_summary(summary: &ProvisionSummary) {
    let stdout = io::stdout();
    let mut w = stdout.lock();
    let _ = writeln!(w, "Zurea onboarding complete");
    let _ = writeln!(
        w,
        "Project:             {} ({})",
        summary.project_id, summary.project_number
    );
    let _ = writeln!(w, "Service account:     {}", summary.service_account);
    let _ = writeln!(w, "Collector principal: {}", summary.collector_principal);
}

/// Machine-readable summary for `--json`.
pub(crate) fn print_summary_json(summary: &ProvisionSummary) -> Result<()> {
    debug!("serializing the run summary to stdout");
    let json = serde_json::to_string_pretty(summary)
        .context("Failed to serialize the run summary to JSON")?;
    println!("{}", json);
    Ok(())
}

/// Two-column bucket listing from the verification pass, or its warning.
pub(crate) fn print_verification(report: &VerificationReport) {
    if let Some(warning) = &report.warning {
        warn(warning);
        return;
    }
    let stdout = io::stdout();
    let mut w = stdout.lock();
    for bucket in &report.buckets {
        let _ = writeln!(w, "{},{}", bucket.name, bucket.encryption);
    }
}
