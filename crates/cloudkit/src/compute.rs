//! Compute client interface.

use crate::error::Result;
use crate::pager::{Page, Pager};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A compute instance template.
///
/// Templates are immutable once created: changing one means deleting and
/// re-inserting it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceTemplate {
    /// Template name
    pub name: String,
    /// Provider-assigned id, empty before insertion
    #[serde(default)]
    pub id: String,
    /// Full resource URL, empty before insertion
    #[serde(default)]
    pub self_link: String,
    /// Machine type (e.g. "n1-standard-2")
    pub machine_type: String,
    /// Boot image
    pub image: String,
    /// Service account identity attached to instances
    pub service_account: Option<String>,
    /// Instance metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Network tags
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Compute API surface used by the instance template task.
pub trait ComputeApi: Send + Sync {
    /// Fetch a template by name.
    fn get_instance_template(&self, name: &str) -> Result<InstanceTemplate>;
    /// Insert a template; returns it with id and self link filled in.
    fn insert_instance_template(&self, template: &InstanceTemplate) -> Result<InstanceTemplate>;
    /// Delete a template by name.
    fn delete_instance_template(&self, name: &str) -> Result<()>;
    /// One page of templates.
    fn list_instance_templates(&self, marker: Option<&str>) -> Result<Page<InstanceTemplate>>;
}

/// Every instance template, fetched page by page.
pub fn instance_templates(
    api: &dyn ComputeApi,
) -> Pager<InstanceTemplate, impl FnMut(Option<&str>) -> Result<Page<InstanceTemplate>> + '_> {
    Pager::new(move |marker: Option<&str>| api.list_instance_templates(marker))
}
