//! Compute instance template task
//!
//! Templates cannot be modified in place, so an update deletes the live
//! template and inserts the desired one under the same name.

use crate::cloud::Cloud;
use anyhow::{Context as _, Result};
use cloudkit::compute::InstanceTemplate as LiveTemplate;
use cloudkit::ports;
use converge::{
    Action, Change, Comparator, Context, Desired, DocumentFormat, Error, Fields, Lifecycle, Link,
    ResourceBlock, Task, TaskKey, compare,
};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Metadata key carrying the API server port
pub const API_SERVER_PORT_KEY: &str = "kube-api-server-port";

/// A compute instance template
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceTemplate {
    pub name: String,
    /// Machine type; leaving it unset deletes the template
    #[serde(default)]
    pub machine_type: Option<String>,
    /// Boot image; unset keeps whatever the live template boots
    #[serde(default)]
    pub image: Option<String>,
    /// Service account identity, usually a reference to a role's `arn`
    #[serde(default)]
    pub service_account: Option<Link>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Network tags
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl InstanceTemplate {
    pub const KIND: &'static str = "instance_template";

    pub fn new(
        name: impl Into<String>,
        machine_type: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            machine_type: Some(machine_type.into()),
            image: Some(image.into()),
            service_account: None,
            metadata: BTreeMap::new(),
            tags: Vec::new(),
            lifecycle: Lifecycle::Sync,
        }
    }

    /// Configured metadata plus the defaults every cluster instance needs
    fn metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = self.metadata.clone();
        metadata
            .entry(API_SERVER_PORT_KEY.to_string())
            .or_insert_with(|| ports::KUBE_API_SERVER.to_string());
        metadata
    }

    /// The template to insert, from resolved desired fields
    fn live(&self, change: &Change) -> Result<LiveTemplate> {
        let machine_type = change
            .desired_str("machine_type")
            .context("machine_type is required")?;
        // A replacement keeps the live image when none is configured
        let image = change
            .desired_str("image")
            .or_else(|| change.actual_str("image"))
            .unwrap_or_default();
        Ok(LiveTemplate {
            name: self.name.clone(),
            machine_type: machine_type.to_string(),
            image: image.to_string(),
            service_account: change.desired_str("service_account").map(String::from),
            metadata: self.metadata(),
            tags: self.tags.clone(),
            ..LiveTemplate::default()
        })
    }

    fn insert(&self, cloud: &Cloud, change: &Change) -> Result<Fields> {
        let template = self.live(change)?;
        let inserted = cloud
            .call(|| cloud.compute().insert_instance_template(&template))
            .with_context(|| format!("inserting instance template {}", self.name))?;
        Ok(produced(&inserted))
    }

    fn delete(&self, cloud: &Cloud) -> Result<()> {
        cloud
            .call(|| cloud.compute().delete_instance_template(&self.name))
            .with_context(|| format!("deleting instance template {}", self.name))
    }
}

fn produced(template: &LiveTemplate) -> Fields {
    Fields::new()
        .with("name", template.name.as_str())
        .with("id", template.id.as_str())
        .with("self_link", template.self_link.as_str())
}

impl Task<Cloud> for InstanceTemplate {
    fn key(&self) -> TaskKey {
        TaskKey::new(Self::KIND, &self.name)
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn desired(&self) -> Result<Desired> {
        let Some(machine_type) = &self.machine_type else {
            return Ok(Desired::Absent);
        };
        Ok(Desired::Present(
            Fields::new()
                .with("name", self.name.as_str())
                .with("machine_type", machine_type.as_str())
                .with_opt("image", self.image.as_deref())
                .with_opt("service_account", self.service_account.as_ref())
                .with("metadata", self.metadata())
                .with("tags", &self.tags),
        ))
    }

    fn discover(&self, ctx: &Context<Cloud>) -> Result<Option<Fields>> {
        let cloud = ctx.provider();
        let found = cloud
            .find(|| cloud.compute().get_instance_template(&self.name))
            .with_context(|| format!("reading instance template {}", self.name))?;

        Ok(found.map(|template| {
            produced(&template)
                .with("machine_type", template.machine_type)
                .with("image", template.image)
                .with_opt("service_account", template.service_account)
                .with("metadata", template.metadata)
                .with("tags", template.tags)
        }))
    }

    fn comparator(&self, field: &str) -> Option<Comparator> {
        match field {
            "tags" => Some(compare::unordered_list),
            _ => None,
        }
    }

    fn apply(&self, ctx: &Context<Cloud>, change: &Change) -> Result<Fields> {
        let cloud = ctx.provider();
        match change.action {
            Action::Create => self.insert(cloud, change),
            Action::Update => {
                log::info!(
                    "replacing instance template {} (changed: {})",
                    self.name,
                    change.changes.fields().join(", ")
                );
                self.delete(cloud)?;
                self.insert(cloud, change)
            }
            Action::Delete => {
                self.delete(cloud)?;
                Ok(Fields::new())
            }
            Action::NoOp | Action::ValidationFailed => Ok(Fields::new()),
        }
    }

    fn document(&self, format: DocumentFormat, change: &Change) -> Result<Vec<ResourceBlock>> {
        if format != DocumentFormat::Terraform {
            return Err(Error::Unsupported {
                key: self.key(),
                format: format.to_string(),
            }
            .into());
        }

        let desired = change
            .desired_fields()
            .context("instance template has no desired state")?;
        let mut block = ResourceBlock::new("google_compute_instance_template", &self.name)
            .attr("name", self.name.as_str())
            .attr_opt("machine_type", desired.str("machine_type"))
            .attr_opt("source_image", desired.str("image"))
            .attr("metadata", self.metadata());
        if let Some(account) = desired.get("service_account") {
            block = block.attr("service_account", account.clone());
        }
        if !self.tags.is_empty() {
            block = block.attr("tags", &self.tags);
        }
        Ok(vec![block])
    }
}
