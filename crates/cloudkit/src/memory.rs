//! In-memory provider persisted to a JSON state file.
//!
//! Implements every client trait with the same observable behaviour as the
//! real APIs: not-found errors, paginated listings, conflicts when deleting a
//! role that still has policies, and URL-encoded trust policies. Every call
//! is recorded so tests can assert call order, and failures can be injected
//! per operation.

use crate::compute::{ComputeApi, InstanceTemplate};
use crate::dns::{DnsApi, RecordSet, RecordType, fqdn};
use crate::error::{Error, Result};
use crate::iam::{AttachedPolicy, CreateRole, IamApi, Role, encode_policy};
use crate::pager::{Page, paginate};
use crate::types::Tags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default number of items per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// A role plus the policies hanging off it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRole {
    /// The role as the API returns it
    #[serde(flatten)]
    pub role: Role,
    /// Inline policies by name
    #[serde(default)]
    pub inline_policies: BTreeMap<String, String>,
    /// Attached managed policies
    #[serde(default)]
    pub attached_policies: Vec<AttachedPolicy>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Everything the in-memory provider knows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudState {
    /// Roles by name
    #[serde(default)]
    pub roles: BTreeMap<String, StoredRole>,
    /// Instance templates by name
    #[serde(default)]
    pub instance_templates: BTreeMap<String, InstanceTemplate>,
    /// Zone name → "name TYPE" → record set
    #[serde(default)]
    pub zones: BTreeMap<String, BTreeMap<String, RecordSet>>,
    /// Counter for generated ids
    #[serde(default)]
    pub next_id: u64,
}

impl CloudState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn role_mut(&mut self, name: &str) -> Result<&mut StoredRole> {
        self.roles
            .get_mut(name)
            .ok_or_else(|| Error::not_found("role", name))
    }

    fn zone_mut(&mut self, zone: &str) -> Result<&mut BTreeMap<String, RecordSet>> {
        self.zones
            .get_mut(&fqdn(zone))
            .ok_or_else(|| Error::not_found("zone", zone))
    }
}

fn record_key(name: &str, record_type: RecordType) -> String {
    format!("{} {record_type}", fqdn(name))
}

/// In-memory cloud implementing [`IamApi`], [`ComputeApi`] and [`DnsApi`].
#[derive(Debug)]
pub struct MemoryCloud {
    state: Mutex<CloudState>,
    path: Option<PathBuf>,
    page_size: usize,
    calls: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<(String, String)>>,
}

impl Default for MemoryCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCloud {
    /// Empty cloud that is never persisted.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CloudState::default()),
            path: None,
            page_size: DEFAULT_PAGE_SIZE,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Load the cloud from a state file, or start empty if it does not exist.
    ///
    /// Every mutating call writes the state back to the same file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            CloudState::default()
        };
        log::debug!("loaded provider state from {}", path.display());
        Ok(Self {
            state: Mutex::new(state),
            path: Some(path),
            ..Self::new()
        })
    }

    /// Serve listings in pages of `size` items.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Create a hosted zone.
    pub fn with_zone(self, zone: &str) -> Self {
        self.lock_state().zones.entry(fqdn(zone)).or_default();
        self
    }

    /// Fail the next call of `operation` with the provider error `code`.
    pub fn inject_failure(&self, operation: &str, code: &str) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back((operation.to_string(), code.to_string()));
    }

    /// Every call made so far, as `Operation arguments`.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Calls whose operation is one of `operations`, in order.
    pub fn calls_to(&self, operations: &[&str]) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| {
                let op = c.split_whitespace().next().unwrap_or_default();
                operations.contains(&op)
            })
            .collect()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> CloudState {
        self.lock_state().clone()
    }

    /// Write the state file, if this cloud has one.
    pub fn save(&self) -> Result<()> {
        let state = self.lock_state();
        self.persist(&state)
    }

    fn lock_state(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, state: &CloudState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let mut content = serde_json::to_string_pretty(state)?;
        content.push('\n');
        fs::write(path, content)?;
        Ok(())
    }

    /// Record a call and fail it if a failure was injected for it.
    fn call(&self, operation: &str, args: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(format!("{operation} {args}").trim_end().to_string());

        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = failures.iter().position(|(op, _)| op == operation)
            && let Some((_, code)) = failures.remove(pos)
        {
            return Err(Error::from_api(&code, "injected failure", Some(args)));
        }
        Ok(())
    }

    /// Run a mutation against the state and persist it on success.
    fn mutate<T>(&self, f: impl FnOnce(&mut CloudState) -> Result<T>) -> Result<T> {
        let mut state = self.lock_state();
        let value = f(&mut state)?;
        self.persist(&state)?;
        Ok(value)
    }
}

impl IamApi for MemoryCloud {
    fn get_role(&self, name: &str) -> Result<Role> {
        self.call("GetRole", name)?;
        self.lock_state()
            .roles
            .get(name)
            .map(|r| r.role.clone())
            .ok_or_else(|| Error::not_found("role", name))
    }

    fn create_role(&self, request: &CreateRole) -> Result<Role> {
        self.call("CreateRole", &request.name)?;
        self.mutate(|state| {
            if state.roles.contains_key(&request.name) {
                return Err(Error::Conflict {
                    message: format!("EntityAlreadyExists: role {} already exists", request.name),
                });
            }
            let id = state.next_id();
            let role = Role {
                id: format!("AROA{id:016}"),
                name: request.name.clone(),
                arn: format!("arn:aws:iam::000000000000:role/{}", request.name),
                assume_role_policy: encode_policy(&request.assume_role_policy),
                permissions_boundary: request.permissions_boundary.clone(),
                tags: request.tags.clone(),
            };
            state.roles.insert(
                request.name.clone(),
                StoredRole {
                    role: role.clone(),
                    inline_policies: BTreeMap::new(),
                    attached_policies: Vec::new(),
                    created_at: Utc::now(),
                },
            );
            Ok(role)
        })
    }

    fn update_assume_role_policy(&self, name: &str, policy: &str) -> Result<()> {
        self.call("UpdateAssumeRolePolicy", name)?;
        self.mutate(|state| {
            state.role_mut(name)?.role.assume_role_policy = encode_policy(policy);
            Ok(())
        })
    }

    fn put_permissions_boundary(&self, name: &str, arn: &str) -> Result<()> {
        self.call("PutRolePermissionsBoundary", name)?;
        self.mutate(|state| {
            state.role_mut(name)?.role.permissions_boundary = Some(arn.to_string());
            Ok(())
        })
    }

    fn delete_permissions_boundary(&self, name: &str) -> Result<()> {
        self.call("DeleteRolePermissionsBoundary", name)?;
        self.mutate(|state| {
            state.role_mut(name)?.role.permissions_boundary = None;
            Ok(())
        })
    }

    fn tag_role(&self, name: &str, tags: &Tags) -> Result<()> {
        self.call("TagRole", name)?;
        self.mutate(|state| {
            let role = state.role_mut(name)?;
            role.role
                .tags
                .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
            Ok(())
        })
    }

    fn untag_role(&self, name: &str, keys: &[String]) -> Result<()> {
        self.call("UntagRole", name)?;
        self.mutate(|state| {
            let role = state.role_mut(name)?;
            for key in keys {
                role.role.tags.remove(key);
            }
            Ok(())
        })
    }

    fn list_role_policies(&self, name: &str, marker: Option<&str>) -> Result<Page<String>> {
        self.call("ListRolePolicies", name)?;
        let state = self.lock_state();
        let role = state
            .roles
            .get(name)
            .ok_or_else(|| Error::not_found("role", name))?;
        let names: Vec<String> = role.inline_policies.keys().cloned().collect();
        paginate(&names, marker, self.page_size)
    }

    fn list_attached_role_policies(
        &self,
        name: &str,
        marker: Option<&str>,
    ) -> Result<Page<AttachedPolicy>> {
        self.call("ListAttachedRolePolicies", name)?;
        let state = self.lock_state();
        let role = state
            .roles
            .get(name)
            .ok_or_else(|| Error::not_found("role", name))?;
        paginate(&role.attached_policies, marker, self.page_size)
    }

    fn put_role_policy(&self, name: &str, policy_name: &str, document: &str) -> Result<()> {
        self.call("PutRolePolicy", &format!("{name} {policy_name}"))?;
        self.mutate(|state| {
            state
                .role_mut(name)?
                .inline_policies
                .insert(policy_name.to_string(), document.to_string());
            Ok(())
        })
    }

    fn attach_role_policy(&self, name: &str, policy_arn: &str) -> Result<()> {
        self.call("AttachRolePolicy", &format!("{name} {policy_arn}"))?;
        self.mutate(|state| {
            let role = state.role_mut(name)?;
            if !role.attached_policies.iter().any(|p| p.arn == policy_arn) {
                let policy_name = policy_arn.rsplit('/').next().unwrap_or(policy_arn);
                role.attached_policies.push(AttachedPolicy {
                    name: policy_name.to_string(),
                    arn: policy_arn.to_string(),
                });
            }
            Ok(())
        })
    }

    fn delete_role_policy(&self, name: &str, policy_name: &str) -> Result<()> {
        self.call("DeleteRolePolicy", &format!("{name} {policy_name}"))?;
        self.mutate(|state| {
            state
                .role_mut(name)?
                .inline_policies
                .remove(policy_name)
                .map(|_| ())
                .ok_or_else(|| Error::not_found("role policy", policy_name))
        })
    }

    fn detach_role_policy(&self, name: &str, policy_arn: &str) -> Result<()> {
        self.call("DetachRolePolicy", &format!("{name} {policy_arn}"))?;
        self.mutate(|state| {
            let role = state.role_mut(name)?;
            let before = role.attached_policies.len();
            role.attached_policies.retain(|p| p.arn != policy_arn);
            if role.attached_policies.len() == before {
                return Err(Error::not_found("attached policy", policy_arn));
            }
            Ok(())
        })
    }

    fn delete_role(&self, name: &str) -> Result<()> {
        self.call("DeleteRole", name)?;
        self.mutate(|state| {
            let role = state.role_mut(name)?;
            if !role.inline_policies.is_empty() || !role.attached_policies.is_empty() {
                return Err(Error::Conflict {
                    message: format!("DeleteConflict: role {name} must have its policies removed first"),
                });
            }
            state.roles.remove(name);
            Ok(())
        })
    }
}

impl ComputeApi for MemoryCloud {
    fn get_instance_template(&self, name: &str) -> Result<InstanceTemplate> {
        self.call("GetInstanceTemplate", name)?;
        self.lock_state()
            .instance_templates
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found("instance template", name))
    }

    fn insert_instance_template(&self, template: &InstanceTemplate) -> Result<InstanceTemplate> {
        self.call("InsertInstanceTemplate", &template.name)?;
        self.mutate(|state| {
            if state.instance_templates.contains_key(&template.name) {
                return Err(Error::Conflict {
                    message: format!("alreadyExists: instance template {}", template.name),
                });
            }
            let mut stored = template.clone();
            stored.id = state.next_id().to_string();
            stored.self_link = format!(
                "https://compute.local/projects/local/global/instanceTemplates/{}",
                template.name
            );
            state
                .instance_templates
                .insert(template.name.clone(), stored.clone());
            Ok(stored)
        })
    }

    fn delete_instance_template(&self, name: &str) -> Result<()> {
        self.call("DeleteInstanceTemplate", name)?;
        self.mutate(|state| {
            state
                .instance_templates
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| Error::not_found("instance template", name))
        })
    }

    fn list_instance_templates(&self, marker: Option<&str>) -> Result<Page<InstanceTemplate>> {
        self.call("ListInstanceTemplates", "")?;
        let state = self.lock_state();
        let templates: Vec<InstanceTemplate> = state.instance_templates.values().cloned().collect();
        paginate(&templates, marker, self.page_size)
    }
}

impl DnsApi for MemoryCloud {
    fn list_record_sets(&self, zone: &str, marker: Option<&str>) -> Result<Page<RecordSet>> {
        self.call("ListRecordSets", zone)?;
        let state = self.lock_state();
        let records: Vec<RecordSet> = state
            .zones
            .get(&fqdn(zone))
            .ok_or_else(|| Error::not_found("zone", zone))?
            .values()
            .cloned()
            .collect();
        paginate(&records, marker, self.page_size)
    }

    fn upsert_record_set(&self, record_set: &RecordSet) -> Result<()> {
        let key = record_key(&record_set.name, record_set.record_type);
        self.call("UpsertRecordSet", &key)?;
        self.mutate(|state| {
            let zone = state.zone_mut(&record_set.zone)?;
            let mut stored = record_set.clone();
            stored.zone = fqdn(&record_set.zone);
            stored.name = fqdn(&record_set.name);
            zone.insert(key, stored);
            Ok(())
        })
    }

    fn delete_record_set(&self, zone: &str, name: &str, record_type: RecordType) -> Result<()> {
        let key = record_key(name, record_type);
        self.call("DeleteRecordSet", &key)?;
        self.mutate(|state| {
            state
                .zone_mut(zone)?
                .remove(&key)
                .map(|_| ())
                .ok_or_else(|| Error::not_found("record set", key.clone()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::find_record_set;
    use crate::iam::{decode_policy, role_policies};

    fn create(cloud: &MemoryCloud, name: &str) -> Role {
        cloud
            .create_role(&CreateRole {
                name: name.into(),
                assume_role_policy: r#"{"Version": "2012-10-17"}"#.into(),
                permissions_boundary: None,
                tags: Tags::new(),
            })
            .unwrap()
    }

    #[test]
    fn test_role_lifecycle() {
        let cloud = MemoryCloud::new();
        assert!(cloud.get_role("masters").unwrap_err().is_not_found());

        let role = create(&cloud, "masters");
        assert!(role.arn.ends_with(":role/masters"));
        assert_eq!(
            decode_policy(&cloud.get_role("masters").unwrap().assume_role_policy).unwrap(),
            r#"{"Version": "2012-10-17"}"#
        );

        cloud.delete_role("masters").unwrap();
        assert!(cloud.delete_role("masters").unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_role_with_policies_conflicts() {
        let cloud = MemoryCloud::new();
        create(&cloud, "nodes");
        cloud.put_role_policy("nodes", "inline", "{}").unwrap();

        let err = cloud.delete_role("nodes").unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Conflict);
    }

    #[test]
    fn test_listing_is_paginated() {
        let cloud = MemoryCloud::new().with_page_size(2);
        create(&cloud, "nodes");
        for i in 0..5 {
            cloud.put_role_policy("nodes", &format!("p{i}"), "{}").unwrap();
        }

        let names = role_policies(&cloud, "nodes").collect_all().unwrap();
        assert_eq!(names, ["p0", "p1", "p2", "p3", "p4"]);
        assert_eq!(cloud.calls_to(&["ListRolePolicies"]).len(), 3);
    }

    #[test]
    fn test_injected_failure_fires_once() {
        let cloud = MemoryCloud::new();
        cloud.inject_failure("GetRole", "Throttling");

        assert!(cloud.get_role("a").unwrap_err().is_retryable());
        assert!(cloud.get_role("a").unwrap_err().is_not_found());
    }

    #[test]
    fn test_state_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("cloud.json");

        let cloud = MemoryCloud::open(&path).unwrap().with_zone("example.com");
        create(&cloud, "masters");
        cloud
            .upsert_record_set(&RecordSet {
                zone: "example.com".into(),
                name: "api.example.com".into(),
                record_type: RecordType::A,
                ttl: 60,
                records: vec!["10.0.0.1".into()],
            })
            .unwrap();

        let reopened = MemoryCloud::open(&path).unwrap();
        assert_eq!(reopened.state(), cloud.state());
        let found = find_record_set(&reopened, "example.com", "api.example.com", RecordType::A)
            .unwrap()
            .unwrap();
        assert_eq!(found.name, "api.example.com.");
    }

    #[test]
    fn test_unknown_zone_is_not_found() {
        let cloud = MemoryCloud::new();
        let err = find_record_set(&cloud, "nope.com", "a.nope.com", RecordType::A).unwrap_err();
        assert!(err.is_not_found());
    }
}
