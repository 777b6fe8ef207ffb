//! Google Cloud integration: client bundle, caller identity, policy edits.

/// client bundle
pub(crate) mod clients;

/// active caller lookup
pub(crate) mod caller;

/// IAM policy read-modify-write helpers
pub(crate) mod policy;

use google_cloud_gax::error::rpc::Code;
use google_cloud_gax::error::Error;

/// True when the service reported the given canonical status code.
pub(crate) fn is_code(err: &Error, code: Code) -> bool {
    err.status().is_some_and(|status| status.code == code)
}

pub(crate) fn is_not_found(err: &Error) -> bool {
    is_code(err, Code::NotFound)
}

pub(crate) fn is_already_exists(err: &Error) -> bool {
    is_code(err, Code::AlreadyExists)
}
