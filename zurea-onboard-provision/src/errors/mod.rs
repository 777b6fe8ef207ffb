//! Error handling module

use thiserror::Error;

/// Result type alias for operations that can fail with `ProvisionError`
pub(crate) type Result<T> = std::result::Result<T, ProvisionError>;

/// Error type for the provisioning pipeline.
///
/// The variants map onto the three failure tiers of the workflow: fatal
/// environment problems, remote-call failures (whose severity is decided by
/// the step that produced them), and propagation timeouts from the
/// verification retry loop.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Operator-environment problems: unusable credentials, no active caller
    /// identity, a client that cannot be constructed. Never retried.
    #[error("Environment error: {message}")]
    Environment {
        /// Detailed error message about the environment issue
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The target project does not exist or the caller cannot access it
    #[error("Project '{project_id}' is not accessible: {source}")]
    ProjectAccess {
        /// The project the run was asked to configure
        project_id: String,
        /// The underlying service error
        #[source]
        source: google_cloud_gax::error::Error,
    },

    /// A remote administrative call failed, with enough context to diagnose
    /// which step and which identifier were involved
    #[error("Remote call failed during {step} for '{identifier}': {source}")]
    Remote {
        /// The reconciliation step that issued the call
        step: &'static str,
        /// The resource, role or principal the call was about
        identifier: String,
        /// The underlying service error
        #[source]
        source: google_cloud_gax::error::Error,
    },

    /// A remote call succeeded but returned a payload the workflow cannot use
    #[error("Unexpected response during {step}: {message}")]
    UnexpectedResponse {
        /// The reconciliation step that issued the call
        step: &'static str,
        /// What was wrong with the payload
        message: String,
    },

    /// Impersonation never became effective within the bounded retry budget.
    /// The verification step downgrades this to a warning.
    #[error("impersonation of '{principal}' still failing after {attempts} attempts: {message}")]
    PropagationTimeout {
        /// The service account that was being impersonated
        principal: String,
        /// How many mint attempts were made
        attempts: u32,
        /// The last error observed
        message: String,
    },
}

impl ProvisionError {
    /// Create an environment error without an underlying cause
    pub(crate) fn environment(message: impl Into<String>) -> Self {
        Self::Environment {
            message: message.into(),
            source: None,
        }
    }

    /// Create an environment error with its underlying cause
    pub(crate) fn environment_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Environment {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a remote-call error carrying step and identifier context
    pub(crate) fn remote(
        step: &'static str,
        identifier: impl Into<String>,
        source: google_cloud_gax::error::Error,
    ) -> Self {
        Self::Remote {
            step,
            identifier: identifier.into(),
            source,
        }
    }

    /// Create a project-access error
    pub(crate) fn project_access(
        project_id: impl Into<String>,
        source: google_cloud_gax::error::Error,
    ) -> Self {
        Self::ProjectAccess {
            project_id: project_id.into(),
            source,
        }
    }

    /// Create an unexpected-response error
    pub(crate) fn unexpected_response(step: &'static str, message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            step,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_error_creation() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "no credentials file");
        let error =
            ProvisionError::environment_with_source("application default credentials", io_error);

        assert!(matches!(error, ProvisionError::Environment { .. }));
        assert!(error.to_string().contains("application default credentials"));
    }

    #[test]
    fn test_remote_error_carries_step_and_identifier() {
        use google_cloud_gax::error::rpc::{Code, Status};
        let status = Status::default()
            .set_code(Code::PermissionDenied)
            .set_message("denied");
        let error = ProvisionError::remote(
            "identity ensure",
            "zurea-evidence@acme-1.iam.gserviceaccount.com",
            google_cloud_gax::error::Error::service(status),
        );

        let rendered = error.to_string();
        assert!(rendered.contains("identity ensure"));
        assert!(rendered.contains("zurea-evidence@acme-1.iam.gserviceaccount.com"));
    }
}
