//! Configuration-generation targets
//!
//! Instead of calling provider APIs these targets collect resource blocks in
//! a registry and serialize it once at finalize. References between tasks are
//! kept as symbolic literals (resource type, resource name, attribute) that
//! the downstream apply tool resolves, so a block may point at a block that
//! is rendered later in the run.

use super::{Target, TargetKind};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::lifecycle::Action;
use crate::task::{Change, Task};
use crate::value::{Fields, TaskKey, TaskRef, Value};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, json};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Declarative document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Terraform JSON configuration (`*.tf.json`)
    Terraform,
    /// AWS CloudFormation JSON template
    CloudFormation,
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terraform => f.write_str("terraform"),
            Self::CloudFormation => f.write_str("cloudformation"),
        }
    }
}

/// One named resource block, as emitted by a task
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceBlock {
    /// Resource type in the document's namespace (`aws_iam_role`, `AWS::IAM::Role`)
    pub resource_type: String,
    pub name: String,
    pub attributes: Fields,
    /// Output variables exported alongside the block
    pub outputs: Fields,
    /// Reads an existing object instead of declaring one (Terraform `data`)
    pub data_source: bool,
}

impl ResourceBlock {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            attributes: Fields::new(),
            outputs: Fields::new(),
            data_source: false,
        }
    }

    /// A Terraform data source looking up an object the document does not own
    ///
    /// Tasks emitting the same lookup share one block.
    pub fn data_source(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            data_source: true,
            ..Self::new(resource_type, name)
        }
    }

    /// Terraform expression for one of this data source's attributes
    pub fn data_ref(&self, attr: &str) -> Value {
        Value::from(format!(
            "${{data.{}.{}.{attr}}}",
            self.resource_type,
            terraform_name(&self.name)
        ))
    }

    pub fn attr(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name, value);
        self
    }

    pub fn attr_opt<T: Into<Value>>(mut self, name: &str, value: Option<T>) -> Self {
        self.attributes = self.attributes.with_opt(name, value);
        self
    }

    pub fn output(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.outputs.insert(name, value);
        self
    }
}

#[derive(Debug)]
struct StoredBlock {
    task: TaskKey,
    attributes: Fields,
}

/// Accumulates resource blocks and writes a single document at finalize
pub struct DocumentTarget {
    format: DocumentFormat,
    path: Option<PathBuf>,
    /// (resource type, document name) → block
    blocks: BTreeMap<(String, String), StoredBlock>,
    /// Task → its first block, the one references resolve to
    owners: BTreeMap<TaskKey, (String, String)>,
    /// (resource type, document name) → data source attributes
    lookups: BTreeMap<(String, String), Fields>,
    outputs: BTreeMap<String, Value>,
    rendered: Option<String>,
}

impl DocumentTarget {
    /// Keep the document in memory; read it with [`DocumentTarget::rendered`]
    pub fn new(format: DocumentFormat) -> Self {
        Self {
            format,
            path: None,
            blocks: BTreeMap::new(),
            owners: BTreeMap::new(),
            lookups: BTreeMap::new(),
            outputs: BTreeMap::new(),
            rendered: None,
        }
    }

    /// Write the document to `path` at finalize
    pub fn to_file(format: DocumentFormat, path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            ..Self::new(format)
        }
    }

    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    /// Document text, available after finalize
    pub fn rendered(&self) -> Option<&str> {
        self.rendered.as_deref()
    }

    /// Number of resource blocks collected so far
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn add_block(&mut self, task: &TaskKey, block: ResourceBlock) -> Result<()> {
        if block.data_source {
            return self.add_lookup(task, block);
        }
        let name = match self.format {
            DocumentFormat::Terraform => terraform_name(&block.name),
            DocumentFormat::CloudFormation => logical_id(&block.resource_type, &block.name),
        };
        let key = (block.resource_type, name);

        if let Some(existing) = self.blocks.get(&key) {
            return Err(Error::Document(format!(
                "{} {} emitted by both {} and {task}",
                key.0, key.1, existing.task
            )));
        }
        for (output, value) in block.outputs {
            if self.outputs.insert(output.clone(), value).is_some() {
                return Err(Error::Document(format!("output {output} defined twice")));
            }
        }

        debug!("document block {} {} from {task}", key.0, key.1);
        self.owners.entry(task.clone()).or_insert_with(|| key.clone());
        self.blocks.insert(
            key,
            StoredBlock {
                task: task.clone(),
                attributes: block.attributes,
            },
        );
        Ok(())
    }

    fn add_lookup(&mut self, task: &TaskKey, block: ResourceBlock) -> Result<()> {
        if self.format != DocumentFormat::Terraform {
            return Err(Error::Document(format!(
                "{task} needs a {} lookup, which {} cannot express",
                block.resource_type, self.format
            )));
        }
        let key = (block.resource_type, terraform_name(&block.name));
        match self.lookups.get(&key) {
            Some(existing) if *existing != block.attributes => Err(Error::Document(format!(
                "data source {} {} looked up with different arguments by {task}",
                key.0, key.1
            ))),
            Some(_) => Ok(()),
            None => {
                debug!("document data source {} {} from {task}", key.0, key.1);
                self.lookups.insert(key, block.attributes);
                Ok(())
            }
        }
    }

    /// Symbolic literal for another task's attribute
    fn literal(&self, reference: &TaskRef) -> Result<serde_json::Value> {
        let (resource_type, name) = self.owners.get(&reference.task).ok_or_else(|| {
            Error::Document(format!(
                "{reference} points at {} which rendered no block",
                reference.task
            ))
        })?;

        Ok(match self.format {
            DocumentFormat::Terraform => {
                json!(format!("${{{resource_type}.{name}.{}}}", reference.attr))
            }
            DocumentFormat::CloudFormation => match reference.attr.as_str() {
                "id" | "name" => json!({ "Ref": name }),
                attr => json!({ "Fn::GetAtt": [name, pascal_case(attr)] }),
            },
        })
    }

    fn resolve(&self, value: &Value) -> Result<serde_json::Value> {
        match value {
            Value::Literal(v) => Ok(v.clone()),
            Value::Ref(reference) => self.literal(reference),
            Value::Unknown => Err(Error::Document(
                "unknown value cannot be written to a document".into(),
            )),
        }
    }

    fn resolve_fields(&self, fields: &Fields) -> Result<Map<String, serde_json::Value>> {
        fields
            .iter()
            .map(|(name, value)| Ok((name.to_string(), self.resolve(value)?)))
            .collect()
    }

    /// Build the whole document with every symbolic literal in place
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut resources: BTreeMap<&str, Map<String, serde_json::Value>> = BTreeMap::new();
        for ((resource_type, name), block) in &self.blocks {
            let attributes = self.resolve_fields(&block.attributes)?;
            let entry = resources.entry(resource_type.as_str()).or_default();
            match self.format {
                DocumentFormat::Terraform => {
                    entry.insert(name.clone(), attributes.into());
                }
                DocumentFormat::CloudFormation => {
                    entry.insert(
                        name.clone(),
                        json!({ "Type": resource_type, "Properties": attributes }),
                    );
                }
            }
        }

        let mut outputs = Map::new();
        for (name, value) in &self.outputs {
            let value = self.resolve(value)?;
            match self.format {
                DocumentFormat::Terraform => {
                    outputs.insert(name.clone(), json!({ "value": value }));
                }
                DocumentFormat::CloudFormation => {
                    outputs.insert(logical_id("", name), json!({ "Value": value }));
                }
            }
        }

        let mut doc = Map::new();
        match self.format {
            DocumentFormat::Terraform => {
                let resource: Map<String, serde_json::Value> = resources
                    .into_iter()
                    .map(|(ty, blocks)| (ty.to_string(), blocks.into()))
                    .collect();
                let mut data: BTreeMap<&str, Map<String, serde_json::Value>> = BTreeMap::new();
                for ((resource_type, name), attributes) in &self.lookups {
                    data.entry(resource_type.as_str())
                        .or_default()
                        .insert(name.clone(), self.resolve_fields(attributes)?.into());
                }
                if !data.is_empty() {
                    let data: Map<String, serde_json::Value> = data
                        .into_iter()
                        .map(|(ty, blocks)| (ty.to_string(), blocks.into()))
                        .collect();
                    doc.insert("data".into(), data.into());
                }
                if !outputs.is_empty() {
                    doc.insert("output".into(), outputs.into());
                }
                doc.insert("resource".into(), resource.into());
            }
            DocumentFormat::CloudFormation => {
                let flat: Map<String, serde_json::Value> =
                    resources.into_values().flatten().collect();
                doc.insert("AWSTemplateFormatVersion".into(), "2010-09-09".into());
                if !outputs.is_empty() {
                    doc.insert("Outputs".into(), outputs.into());
                }
                doc.insert("Resources".into(), flat.into());
            }
        }
        Ok(doc.into())
    }
}

impl<C> Target<C> for DocumentTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::Document(self.format)
    }

    fn render(&mut self, _ctx: &Context<C>, task: &dyn Task<C>, change: &Change) -> Result<Fields> {
        if change.action == Action::Delete {
            // A document only describes what should exist.
            return Ok(Fields::new());
        }

        let blocks = task.document(self.format, change).map_err(|err| {
            Error::from_task(err, |source| Error::Render {
                key: change.key.clone(),
                source,
            })
        })?;
        for block in blocks {
            self.add_block(&change.key, block)?;
        }
        Ok(Fields::new())
    }

    fn finalize(&mut self, _ctx: &Context<C>) -> Result<()> {
        let mut text = serde_json::to_string_pretty(&self.to_json()?)?;
        text.push('\n');

        if let Some(path) = &self.path {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, &text)?;
            debug!("wrote {} document to {}", self.format, path.display());
        }
        self.rendered = Some(text);
        Ok(())
    }
}

/// Terraform block names allow letters, digits, `_` and `-`
fn terraform_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// CloudFormation logical ids are alphanumeric only
fn logical_id(resource_type: &str, name: &str) -> String {
    resource_type
        .chars()
        .chain(name.chars())
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// `self_link` → `SelfLink`
fn pascal_case(attr: &str) -> String {
    attr.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}
