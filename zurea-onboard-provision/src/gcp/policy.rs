//! Read-modify-write edits of IAM policies.
//!
//! The IAM surface has no "add one binding" verb; a grant is a
//! get-policy/edit/set-policy cycle. The fetched policy's etag rides along,
//! so a concurrent writer causes the set call to fail rather than silently
//! clobbering the other run's edit.

use google_cloud_iam_v1::model::{Binding, Policy};

/// Add `member` to the binding for `role`, creating the binding if needed.
/// Returns `false` when the member is already present and there is nothing
/// to write.
pub(crate) fn ensure_binding(policy: &mut Policy, role: &str, member: &str) -> bool {
    if let Some(binding) = policy.bindings.iter_mut().find(|b| b.role == role) {
        if binding.members.iter().any(|m| m == member) {
            return false;
        }
        binding.members.push(member.to_string());
        return true;
    }

    let mut binding = Binding::new();
    binding.role = role.to_string();
    binding.members.push(member.to_string());
    policy.bindings.push(binding);
    true
}

/// Remove `member` from the binding for `role`, dropping the binding once it
/// is empty. Returns `false` when no such grant existed.
pub(crate) fn remove_binding(policy: &mut Policy, role: &str, member: &str) -> bool {
    let Some(position) = policy
        .bindings
        .iter()
        .position(|b| b.role == role && b.members.iter().any(|m| m == member))
    else {
        return false;
    };

    let binding = &mut policy.bindings[position];
    binding.members.retain(|m| m != member);
    if binding.members.is_empty() {
        policy.bindings.remove(position);
    }
    true
}

/// True when `member` holds `role` in the policy.
pub(crate) fn has_binding(policy: &Policy, role: &str, member: &str) -> bool {
    policy
        .bindings
        .iter()
        .any(|b| b.role == role && b.members.iter().any(|m| m == member))
}
