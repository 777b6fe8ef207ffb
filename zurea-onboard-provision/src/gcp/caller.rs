use google_cloud_auth::credentials::{Builder as AdcBuilder, CacheableResource, Credentials};
use http::Extensions;
use http::header::AUTHORIZATION;
use serde::Deserialize;

use crate::errors::{ProvisionError, Result};

const TOKENINFO_ENDPOINT: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Subset of the OAuth2 tokeninfo response we care about.
#[derive(Debug, Deserialize)]
struct TokenInfo {
    email: Option<String>,
}

/// The identity behind the Application Default Credentials of this run.
#[derive(Clone)]
pub(crate) struct CallerIdentity {
    /// Email of the active account
    pub(crate) email: String,
    /// The resolved credentials, reused for impersonation during verification
    pub(crate) credentials: Credentials,
}

impl CallerIdentity {
    /// IAM member string for the caller, used by the transient verification
    /// grant.
    pub(crate) fn member(&self) -> String {
        if self.email.ends_with(".gserviceaccount.com") {
            format!("serviceAccount:{}", self.email)
        } else {
            format!("user:{}", self.email)
        }
    }
}

/// Resolve Application Default Credentials and the account behind them.
///
/// This is the fatal precondition check: without working credentials and a
/// discoverable caller identity nothing else in the run can proceed.
pub(crate) async fn active_caller() -> Result<CallerIdentity> {
    let credentials = AdcBuilder::default().build().map_err(|e| {
        ProvisionError::environment_with_source(
            "no usable Application Default Credentials; run `gcloud auth application-default login` or point GOOGLE_APPLICATION_CREDENTIALS at a credentials file",
            e,
        )
    })?;

    let cached = credentials.headers(Extensions::new()).await.map_err(|e| {
        ProvisionError::environment_with_source(
            "the Application Default Credentials could not produce a token",
            e,
        )
    })?;
    let headers = match cached {
        CacheableResource::New { data, .. } => data,
        CacheableResource::NotModified => {
            return Err(ProvisionError::environment(
                "the credentials returned no authorization headers",
            ));
        }
    };
    let authorization = headers.get(AUTHORIZATION).cloned().ok_or_else(|| {
        ProvisionError::environment("the credentials returned no authorization header")
    })?;

    let response = reqwest::Client::new()
        .get(TOKENINFO_ENDPOINT)
        .header(AUTHORIZATION, authorization)
        .send()
        .await
        .map_err(|e| {
            ProvisionError::environment_with_source("tokeninfo lookup of the caller failed", e)
        })?;
    if !response.status().is_success() {
        return Err(ProvisionError::environment(format!(
            "tokeninfo rejected the active credentials (status {})",
            response.status()
        )));
    }
    let info: TokenInfo = response.json().await.map_err(|e| {
        ProvisionError::environment_with_source("tokeninfo returned an unreadable payload", e)
    })?;

    let email = info.email.ok_or_else(|| {
        ProvisionError::environment(
            "the active credentials carry no email; re-authenticate with an email-scoped account",
        )
    })?;

    Ok(CallerIdentity { email, credentials })
}

#[cfg(test)]
mod tests {
    use super::*;
    use google_cloud_auth::credentials::testing::test_credentials;

    #[test]
    fn test_member_string_distinguishes_humans_from_service_accounts() {
        let human = CallerIdentity {
            email: "admin@acme.example".to_string(),
            credentials: test_credentials(),
        };
        assert_eq!(human.member(), "user:admin@acme.example");

        let robot = CallerIdentity {
            email: "deployer@acme-1.iam.gserviceaccount.com".to_string(),
            credentials: test_credentials(),
        };
        assert_eq!(
            robot.member(),
            "serviceAccount:deployer@acme-1.iam.gserviceaccount.com"
        );
    }
}
