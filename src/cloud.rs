//! Provider handle passed to every task through the run context

use cloudkit::retry::{LogCallback, with_retry_until};
use cloudkit::{ComputeApi, DnsApi, IamApi, MemoryCloud, RetryConfig};
use converge::CancelToken;
use std::sync::Arc;

/// The provider clients a run talks to, plus the retry policy for every call
#[derive(Clone)]
pub struct Cloud {
    iam: Arc<dyn IamApi>,
    compute: Arc<dyn ComputeApi>,
    dns: Arc<dyn DnsApi>,
    retry: RetryConfig,
    cancel: CancelToken,
}

impl Cloud {
    pub fn new(iam: Arc<dyn IamApi>, compute: Arc<dyn ComputeApi>, dns: Arc<dyn DnsApi>) -> Self {
        Self {
            iam,
            compute,
            dns,
            retry: RetryConfig::default(),
            cancel: CancelToken::new(),
        }
    }

    /// Serve every API from one in-memory cloud
    pub fn memory(cloud: Arc<MemoryCloud>) -> Self {
        Self::new(cloud.clone(), cloud.clone(), cloud)
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Run context whose cancellation also stops in-flight provider calls
    pub fn into_context(mut self) -> converge::Context<Self> {
        let cancel = CancelToken::new();
        self.cancel = cancel.clone();
        converge::Context::new(self).with_cancel(cancel)
    }

    pub fn iam(&self) -> &dyn IamApi {
        self.iam.as_ref()
    }

    pub fn compute(&self) -> &dyn ComputeApi {
        self.compute.as_ref()
    }

    pub fn dns(&self) -> &dyn DnsApi {
        self.dns.as_ref()
    }

    /// Run one provider call, retrying throttling and network errors
    ///
    /// Returns [`cloudkit::Error::Cancelled`] as soon as the run is cancelled,
    /// including while waiting between retries.
    pub fn call<T>(&self, operation: impl FnMut() -> cloudkit::Result<T>) -> cloudkit::Result<T> {
        let cancelled = || self.cancel.is_cancelled();
        with_retry_until(&self.retry, Some(&LogCallback), &cancelled, operation)
    }

    /// Like [`Cloud::call`], mapping "not found" to `None`
    pub fn find<T>(
        &self,
        operation: impl FnMut() -> cloudkit::Result<T>,
    ) -> cloudkit::Result<Option<T>> {
        match self.call(operation) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl converge::Provider for Cloud {
    fn is_not_found(&self, err: &anyhow::Error) -> bool {
        err.chain()
            .filter_map(|cause| cause.downcast_ref::<cloudkit::Error>())
            .any(cloudkit::Error::is_not_found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context as _;
    use converge::Provider;
    use std::time::Duration;

    fn cloud() -> (Arc<MemoryCloud>, Cloud) {
        let memory = Arc::new(MemoryCloud::new());
        let retry = RetryConfig::new(3, Duration::from_millis(1), 1.0);
        (memory.clone(), Cloud::memory(memory).with_retry(retry))
    }

    #[test]
    fn test_cancelled_context_stops_throttled_call() {
        let memory = Arc::new(MemoryCloud::new());
        let slow = RetryConfig::new(5, Duration::from_secs(10), 2.0);
        let ctx = Cloud::memory(memory.clone()).with_retry(slow).into_context();
        memory.inject_failure("GetRole", "Throttling");

        let cancel = ctx.cancel_token().clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            cancel.cancel();
        });
        let started = std::time::Instant::now();
        let cloud = ctx.provider();
        let err = cloud.call(|| cloud.iam().get_role("nodes")).unwrap_err();
        canceller.join().unwrap();

        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(memory.calls_to(&["GetRole"]).len(), 1);
    }

    #[test]
    fn test_not_found_is_detected_through_context() {
        let (_, cloud) = cloud();
        let err = cloud
            .call(|| cloud.iam().delete_role("gone"))
            .context("deleting role gone")
            .unwrap_err();
        assert!(cloud.is_not_found(&err));
        assert!(!cloud.is_not_found(&anyhow::anyhow!("role not found")));
    }

    #[test]
    fn test_find_maps_not_found_to_none() {
        let (_, cloud) = cloud();
        assert!(cloud.find(|| cloud.iam().get_role("nodes")).unwrap().is_none());
    }

    #[test]
    fn test_throttled_call_is_retried() {
        let (memory, cloud) = cloud();
        memory.inject_failure("GetRole", "Throttling");
        assert!(cloud.find(|| cloud.iam().get_role("nodes")).unwrap().is_none());
        assert_eq!(memory.calls_to(&["GetRole"]).len(), 2);
    }
}
