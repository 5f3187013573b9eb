//! DNS record set task

use crate::cloud::Cloud;
use anyhow::{Context as _, Result, ensure};
use cloudkit::dns::{RecordSet, RecordType, find_record_set, fqdn};
use converge::{
    Action, Change, Comparator, Context, Desired, DocumentFormat, Fields, Lifecycle,
    ResourceBlock, Task, TaskKey, compare,
};
use serde::Deserialize;

fn default_ttl() -> u32 {
    60
}

/// One record set in a hosted zone
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DnsRecord {
    /// Record name (e.g. "api.prod.example.com")
    pub name: String,
    /// Hosted zone the record lives in
    pub zone: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    /// Record values; an empty list deletes the record set
    #[serde(default)]
    pub records: Vec<String>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl DnsRecord {
    pub const KIND: &'static str = "dns_record";

    pub fn new(name: &str, zone: &str, record_type: RecordType, records: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            zone: zone.to_string(),
            record_type,
            ttl: default_ttl(),
            records: records.iter().map(ToString::to_string).collect(),
            lifecycle: Lifecycle::Sync,
        }
    }

    /// Record sets are identified by name and type, e.g. `api.example.com/AAAA`
    fn id(&self) -> String {
        format!("{}/{}", self.name, self.record_type)
    }
}

impl Task<Cloud> for DnsRecord {
    fn key(&self) -> TaskKey {
        TaskKey::new(Self::KIND, self.id())
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn desired(&self) -> Result<Desired> {
        if self.records.is_empty() {
            return Ok(Desired::Absent);
        }
        Ok(Desired::Present(
            Fields::new()
                .with("name", fqdn(&self.name))
                .with("type", self.record_type.as_str())
                .with("ttl", self.ttl)
                .with("records", &self.records),
        ))
    }

    fn discover(&self, ctx: &Context<Cloud>) -> Result<Option<Fields>> {
        let cloud = ctx.provider();
        let found = cloud
            .call(|| find_record_set(cloud.dns(), &self.zone, &self.name, self.record_type))
            .with_context(|| format!("listing records of zone {}", self.zone))?;

        Ok(found.map(|set| {
            Fields::new()
                .with("name", set.name)
                .with("type", set.record_type.as_str())
                .with("ttl", set.ttl)
                .with("records", set.records)
        }))
    }

    fn comparator(&self, field: &str) -> Option<Comparator> {
        match field {
            "records" => Some(compare::unordered_list),
            _ => None,
        }
    }

    fn check(&self, _change: &Change) -> Result<()> {
        let name = fqdn(&self.name);
        let zone = fqdn(&self.zone);
        ensure!(
            name == zone || name.ends_with(&format!(".{zone}")),
            "record {name} is outside zone {zone}"
        );
        Ok(())
    }

    fn apply(&self, ctx: &Context<Cloud>, change: &Change) -> Result<Fields> {
        let cloud = ctx.provider();
        match change.action {
            Action::Create | Action::Update => {
                let set = RecordSet {
                    zone: self.zone.clone(),
                    name: self.name.clone(),
                    record_type: self.record_type,
                    ttl: self.ttl,
                    records: self.records.clone(),
                };
                cloud
                    .call(|| cloud.dns().upsert_record_set(&set))
                    .with_context(|| format!("writing record {} {}", self.name, self.record_type))?;
                Ok(Fields::new().with("name", fqdn(&self.name)))
            }
            Action::Delete => {
                cloud
                    .call(|| {
                        cloud
                            .dns()
                            .delete_record_set(&self.zone, &self.name, self.record_type)
                    })
                    .with_context(|| format!("deleting record {} {}", self.name, self.record_type))?;
                Ok(Fields::new())
            }
            Action::NoOp | Action::ValidationFailed => Ok(Fields::new()),
        }
    }

    fn document(&self, format: DocumentFormat, _change: &Change) -> Result<Vec<ResourceBlock>> {
        let name = fqdn(&self.name);
        let blocks = match format {
            DocumentFormat::Terraform => {
                let zone = ResourceBlock::data_source("aws_route53_zone", &self.zone)
                    .attr("name", fqdn(&self.zone));
                let record = ResourceBlock::new("aws_route53_record", self.id())
                    .attr("zone_id", zone.data_ref("zone_id"))
                    .attr("name", name)
                    .attr("type", self.record_type.as_str())
                    .attr("ttl", self.ttl)
                    .attr("records", &self.records);
                vec![record, zone]
            }
            DocumentFormat::CloudFormation => vec![
                ResourceBlock::new("AWS::Route53::RecordSet", self.id())
                    .attr("HostedZoneName", fqdn(&self.zone))
                    .attr("Name", name)
                    .attr("Type", self.record_type.as_str())
                    .attr("TTL", self.ttl.to_string())
                    .attr("ResourceRecords", &self.records),
            ],
        };
        Ok(blocks)
    }
}
