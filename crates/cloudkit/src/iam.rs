//! Identity (IAM) client interface.

use crate::error::{Error, Result};
use crate::pager::{Page, Pager};
use crate::types::Tags;
use serde::{Deserialize, Serialize};

/// Longest role name the provider accepts.
pub const MAX_ROLE_NAME_LEN: usize = 64;

/// An IAM role as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Provider-assigned id
    pub id: String,
    /// Role name, unique per account
    pub name: String,
    /// Role ARN
    pub arn: String,
    /// Trust policy, URL-encoded the way the provider returns it
    pub assume_role_policy: String,
    /// ARN of the permissions boundary policy
    pub permissions_boundary: Option<String>,
    /// Role tags
    #[serde(default)]
    pub tags: Tags,
}

/// Parameters of a create-role call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRole {
    /// Role name
    pub name: String,
    /// Trust policy as plain JSON text
    pub assume_role_policy: String,
    /// Permissions boundary ARN
    pub permissions_boundary: Option<String>,
    /// Initial tags
    pub tags: Tags,
}

/// A managed policy attached to a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedPolicy {
    /// Policy name
    pub name: String,
    /// Policy ARN
    pub arn: String,
}

/// IAM API surface used by the role task.
///
/// Absence is reported as [`Error::NotFound`]. List calls are paginated.
pub trait IamApi: Send + Sync {
    /// Fetch a role by name.
    fn get_role(&self, name: &str) -> Result<Role>;
    /// Create a role.
    fn create_role(&self, request: &CreateRole) -> Result<Role>;
    /// Replace the role's trust policy.
    fn update_assume_role_policy(&self, name: &str, policy: &str) -> Result<()>;
    /// Set the permissions boundary.
    fn put_permissions_boundary(&self, name: &str, arn: &str) -> Result<()>;
    /// Remove the permissions boundary.
    fn delete_permissions_boundary(&self, name: &str) -> Result<()>;
    /// Add or overwrite tags.
    fn tag_role(&self, name: &str, tags: &Tags) -> Result<()>;
    /// Remove tags by key.
    fn untag_role(&self, name: &str, keys: &[String]) -> Result<()>;
    /// One page of inline policy names.
    fn list_role_policies(&self, name: &str, marker: Option<&str>) -> Result<Page<String>>;
    /// One page of attached managed policies.
    fn list_attached_role_policies(
        &self,
        name: &str,
        marker: Option<&str>,
    ) -> Result<Page<AttachedPolicy>>;
    /// Add or replace an inline policy.
    fn put_role_policy(&self, name: &str, policy_name: &str, document: &str) -> Result<()>;
    /// Attach a managed policy.
    fn attach_role_policy(&self, name: &str, policy_arn: &str) -> Result<()>;
    /// Delete an inline policy.
    fn delete_role_policy(&self, name: &str, policy_name: &str) -> Result<()>;
    /// Detach a managed policy.
    fn detach_role_policy(&self, name: &str, policy_arn: &str) -> Result<()>;
    /// Delete a role. Fails with a conflict while policies remain.
    fn delete_role(&self, name: &str) -> Result<()>;
}

/// Every inline policy name of a role, fetched page by page.
pub fn role_policies<'a>(
    api: &'a dyn IamApi,
    role: &'a str,
) -> Pager<String, impl FnMut(Option<&str>) -> Result<Page<String>> + 'a> {
    Pager::new(move |marker: Option<&str>| api.list_role_policies(role, marker))
}

/// Every managed policy attached to a role, fetched page by page.
pub fn attached_role_policies<'a>(
    api: &'a dyn IamApi,
    role: &'a str,
) -> Pager<AttachedPolicy, impl FnMut(Option<&str>) -> Result<Page<AttachedPolicy>> + 'a> {
    Pager::new(move |marker: Option<&str>| api.list_attached_role_policies(role, marker))
}

/// Decode a URL query-encoded policy document.
///
/// `+` decodes to a space and `%XX` to the byte it names.
pub fn decode_policy(text: &str) -> Result<String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| Error::Invalid {
                        message: format!("bad escape at offset {i} in policy document"),
                    })?;
                out.push(hex);
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8(out).map_err(|e| Error::Invalid {
        message: format!("policy document is not UTF-8: {e}"),
    })
}

/// URL query-encode a policy document.
pub fn encode_policy(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 3 / 2);
    for b in text.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(b));
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_encoding_round_trips() {
        let policy = r#"{"Version": "2012-10-17", "Statement": [{"Effect": "Allow"}]}"#;
        let encoded = encode_policy(policy);
        assert!(!encoded.contains('"'));
        assert!(encoded.starts_with("%7B%22Version%22%3A+"));
        assert_eq!(decode_policy(&encoded).unwrap(), policy);
    }

    #[test]
    fn test_decode_plain_text_unchanged() {
        assert_eq!(decode_policy("abc").unwrap(), "abc");
    }

    #[test]
    fn test_decode_rejects_bad_escape() {
        assert!(decode_policy("%7").is_err());
        assert!(decode_policy("%zz").is_err());
    }
}
