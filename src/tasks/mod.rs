//! Concrete task kinds for cluster infrastructure
//!
//! Every kind is a plain serde struct built from a `[[task]]` table of the
//! cluster config and implements [`converge::Task`] against [`Cloud`].

pub mod dns_record;
pub mod iam_role;
pub mod instance_template;

pub use dns_record::DnsRecord;
pub use iam_role::IamRole;
pub use instance_template::InstanceTemplate;

use crate::cloud::Cloud;
use anyhow::Result;
use converge::TaskRegistry;

/// Registry with every built-in task kind
pub fn registry() -> Result<TaskRegistry<Cloud>> {
    let mut registry = TaskRegistry::new();
    registry.register::<IamRole>(IamRole::KIND)?;
    registry.register::<InstanceTemplate>(InstanceTemplate::KIND)?;
    registry.register::<DnsRecord>(DnsRecord::KIND)?;
    Ok(registry)
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::cloud::Cloud;
    use cloudkit::{MemoryCloud, RetryConfig};
    use converge::{ApiTarget, BoxedTask, Context, RunReport, execute_simple};
    use std::sync::Arc;
    use std::time::Duration;

    /// A context over a fresh in-memory cloud with fast retries
    pub fn context() -> (Arc<MemoryCloud>, Context<Cloud>) {
        context_with(MemoryCloud::new().with_zone("example.com"))
    }

    pub fn context_with(memory: MemoryCloud) -> (Arc<MemoryCloud>, Context<Cloud>) {
        let memory = Arc::new(memory);
        let retry = RetryConfig::new(3, Duration::from_millis(1), 1.0);
        let cloud = Cloud::memory(memory.clone()).with_retry(retry);
        (memory, cloud.into_context())
    }

    /// Reconcile against the live (in-memory) API
    pub fn apply(ctx: &Context<Cloud>, tasks: &[BoxedTask<Cloud>]) -> RunReport {
        execute_simple(ctx, tasks, &mut ApiTarget::new()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_knows_every_kind() {
        let registry = registry().unwrap();
        let kinds: Vec<&str> = registry.kinds().collect();
        assert_eq!(kinds, ["dns_record", "iam_role", "instance_template"]);
    }

    #[test]
    fn test_registry_rejects_unknown_fields() {
        let registry = registry().unwrap();
        let table = serde_json::json!({ "name": "masters", "assume_role_polcy": "{}" });
        assert!(registry.build("iam_role", table).is_err());
    }
}
