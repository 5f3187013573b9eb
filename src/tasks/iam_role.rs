//! IAM role task
//!
//! Manages the role itself: trust policy, permissions boundary and tags.
//! Deleting a role first removes every inline policy and detaches every
//! managed policy, since the provider refuses to delete a role that still
//! has policies.

use crate::cloud::Cloud;
use anyhow::{Context as _, Result, ensure};
use cloudkit::iam::{
    CreateRole, MAX_ROLE_NAME_LEN, Role, attached_role_policies, decode_policy, role_policies,
};
use cloudkit::Tags;
use converge::{
    Action, Change, Comparator, Context, Desired, DocumentFormat, Fields, Lifecycle,
    ResourceBlock, Task, TaskKey, compare,
};
use log::info;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

const ROLE_NAME_PATTERN: &str = r"^[\w+=,.@-]+$";

/// An IAM role
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IamRole {
    /// Role name, unique per account
    pub name: String,
    /// Trust policy as JSON text; leaving it unset deletes the role
    #[serde(default)]
    pub assume_role_policy: Option<String>,
    /// Permissions boundary policy ARN; an empty string removes the boundary
    #[serde(default)]
    pub permissions_boundary: Option<String>,
    /// Tags, replacing whatever the role carries today
    #[serde(default)]
    pub tags: Tags,
    /// Emit `<id>_role_arn` and `<id>_role_name` outputs in generated documents
    #[serde(default)]
    pub export_with_id: Option<String>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl IamRole {
    pub const KIND: &'static str = "iam_role";

    pub fn new(name: impl Into<String>, assume_role_policy: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            assume_role_policy: Some(assume_role_policy.into()),
            permissions_boundary: None,
            tags: Tags::new(),
            export_with_id: None,
            lifecycle: Lifecycle::Sync,
        }
    }

    fn boundary(&self) -> Option<&str> {
        self.permissions_boundary.as_deref().filter(|b| !b.is_empty())
    }

    fn create(&self, cloud: &Cloud, change: &Change) -> Result<Fields> {
        let policy = change
            .desired_str("assume_role_policy")
            .context("assume_role_policy is required to create a role")?;
        let request = CreateRole {
            name: self.name.clone(),
            assume_role_policy: policy.to_string(),
            permissions_boundary: self.boundary().map(String::from),
            tags: self.tags.clone(),
        };
        let role = cloud
            .call(|| cloud.iam().create_role(&request))
            .with_context(|| format!("creating role {}", self.name))?;
        Ok(produced(&role))
    }

    fn update(&self, cloud: &Cloud, change: &Change) -> Result<Fields> {
        let iam = cloud.iam();
        let name = self.name.as_str();

        if change.changed("assume_role_policy") {
            let policy = change
                .desired_str("assume_role_policy")
                .context("assume_role_policy is required")?;
            cloud
                .call(|| iam.update_assume_role_policy(name, policy))
                .with_context(|| format!("updating trust policy of role {name}"))?;
        }

        if change.changed("permissions_boundary") {
            let result = match change.desired_str("permissions_boundary").filter(|b| !b.is_empty()) {
                Some(arn) => cloud.call(|| iam.put_permissions_boundary(name, arn)),
                None => cloud.call(|| iam.delete_permissions_boundary(name)),
            };
            result.with_context(|| format!("updating permissions boundary of role {name}"))?;
        }

        if change.changed("tags") {
            let existing: Vec<String> = change
                .actual
                .as_ref()
                .and_then(|actual| actual.literal("tags"))
                .and_then(serde_json::Value::as_object)
                .map(|tags| tags.keys().cloned().collect())
                .unwrap_or_default();
            if !existing.is_empty() {
                cloud.call(|| iam.untag_role(name, &existing))?;
            }
            if !self.tags.is_empty() {
                cloud.call(|| iam.tag_role(name, &self.tags))?;
            }
        }

        Ok(Fields::new()
            .with("name", name)
            .with_opt("id", change.actual_str("id"))
            .with_opt("arn", change.actual_str("arn")))
    }

    fn delete(&self, cloud: &Cloud) -> Result<()> {
        let iam = cloud.iam();
        let name = self.name.as_str();

        let inline = cloud.call(|| role_policies(iam, name).collect_all())?;
        for policy in &inline {
            info!("deleting inline policy {policy} of role {name}");
            cloud.call(|| iam.delete_role_policy(name, policy))?;
        }

        let attached = cloud.call(|| attached_role_policies(iam, name).collect_all())?;
        for policy in &attached {
            info!("detaching {} from role {name}", policy.arn);
            cloud.call(|| iam.detach_role_policy(name, &policy.arn))?;
        }

        cloud
            .call(|| iam.delete_role(name))
            .with_context(|| format!("deleting role {name}"))
    }
}

/// Attributes other tasks may reference
fn produced(role: &Role) -> Fields {
    Fields::new()
        .with("name", role.name.as_str())
        .with("id", role.id.as_str())
        .with("arn", role.arn.as_str())
}

impl Task<Cloud> for IamRole {
    fn key(&self) -> TaskKey {
        TaskKey::new(Self::KIND, &self.name)
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn desired(&self) -> Result<Desired> {
        let Some(policy) = &self.assume_role_policy else {
            return Ok(Desired::Absent);
        };
        Ok(Desired::Present(
            Fields::new()
                .with("name", self.name.as_str())
                .with("assume_role_policy", policy.as_str())
                .with_opt("permissions_boundary", self.permissions_boundary.as_deref())
                .with("tags", &self.tags),
        ))
    }

    fn discover(&self, ctx: &Context<Cloud>) -> Result<Option<Fields>> {
        let cloud = ctx.provider();
        let Some(role) = cloud
            .find(|| cloud.iam().get_role(&self.name))
            .with_context(|| format!("reading role {}", self.name))?
        else {
            return Ok(None);
        };

        let policy = decode_policy(&role.assume_role_policy)
            .with_context(|| format!("decoding trust policy of role {}", self.name))?;
        // An absent boundary reads as empty so `permissions_boundary = ""` converges.
        let boundary = role.permissions_boundary.clone().unwrap_or_default();
        Ok(Some(
            produced(&role)
                .with("assume_role_policy", policy)
                .with("permissions_boundary", boundary)
                .with("tags", &role.tags),
        ))
    }

    fn comparator(&self, field: &str) -> Option<Comparator> {
        match field {
            "assume_role_policy" => Some(compare::json_document),
            _ => None,
        }
    }

    fn check(&self, _change: &Change) -> Result<()> {
        ensure!(
            self.name.len() <= MAX_ROLE_NAME_LEN,
            "role name {} is {} characters long; the limit is {MAX_ROLE_NAME_LEN}",
            self.name,
            self.name.len()
        );
        ensure!(
            Regex::new(ROLE_NAME_PATTERN)?.is_match(&self.name),
            "role name {} may only contain letters, digits and +=,.@_-",
            self.name
        );
        if let Some(policy) = &self.assume_role_policy {
            serde_json::from_str::<serde_json::Value>(policy)
                .with_context(|| format!("trust policy of role {} is not valid JSON", self.name))?;
        }
        Ok(())
    }

    fn apply(&self, ctx: &Context<Cloud>, change: &Change) -> Result<Fields> {
        let cloud = ctx.provider();
        match change.action {
            Action::Create => self.create(cloud, change),
            Action::Update => self.update(cloud, change),
            Action::Delete => {
                self.delete(cloud)?;
                Ok(Fields::new())
            }
            Action::NoOp | Action::ValidationFailed => Ok(Fields::new()),
        }
    }

    fn document(&self, format: DocumentFormat, change: &Change) -> Result<Vec<ResourceBlock>> {
        let policy = change
            .desired_str("assume_role_policy")
            .context("assume_role_policy is required")?;

        let mut block = match format {
            DocumentFormat::Terraform => {
                let mut block = ResourceBlock::new("aws_iam_role", &self.name)
                    .attr("name", self.name.as_str())
                    .attr("assume_role_policy", policy)
                    .attr_opt("permissions_boundary", self.boundary());
                if !self.tags.is_empty() {
                    block = block.attr("tags", &self.tags);
                }
                block
            }
            DocumentFormat::CloudFormation => {
                let document: serde_json::Value = serde_json::from_str(policy)
                    .with_context(|| format!("trust policy of role {} is not valid JSON", self.name))?;
                let tags: Vec<serde_json::Value> = self
                    .tags
                    .iter()
                    .map(|(key, value)| json!({ "Key": key, "Value": value }))
                    .collect();
                let mut block = ResourceBlock::new("AWS::IAM::Role", &self.name)
                    .attr("RoleName", self.name.as_str())
                    .attr("AssumeRolePolicyDocument", document)
                    .attr_opt("PermissionsBoundary", self.boundary());
                if !tags.is_empty() {
                    block = block.attr("Tags", serde_json::Value::from(tags));
                }
                block
            }
        };

        if let Some(id) = &self.export_with_id {
            let key = self.key();
            block = block
                .output(&format!("{id}_role_arn"), key.attr("arn"))
                .output(&format!("{id}_role_name"), key.attr("name"));
        }
        Ok(vec![block])
    }
}
