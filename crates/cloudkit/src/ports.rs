//! Well-known ports used by cluster components.

/// Port where the API server listens.
pub const KUBE_API_SERVER: u16 = 443;
/// Port where node bootstrap listens for challenges.
pub const NODEUP_CHALLENGE: u16 = 3987;
/// Port where the cluster controller listens.
pub const KOPS_CONTROLLER: u16 = 3988;
/// Node-local DNS health check.
pub const NODE_LOCAL_DNS_HEALTH_CHECK: u16 = 3989;
/// API server health check sidecar.
pub const KUBE_API_SERVER_HEALTH_CHECK: u16 = 3990;
/// Cilium etcd gRPC.
pub const ETCD_CILIUM_GRPC: u16 = 3991;
/// Cilium etcd client port while quarantined.
pub const ETCD_CILIUM_QUARANTINED_CLIENT: u16 = 3992;
/// DNS controller memberlist gossip.
pub const DNS_CONTROLLER_GOSSIP_MEMBERLIST: u16 = 3993;
/// Main etcd client port while quarantined.
pub const ETCD_MAIN_QUARANTINED_CLIENT: u16 = 3994;
/// Events etcd client port while quarantined.
pub const ETCD_EVENTS_QUARANTINED_CLIENT: u16 = 3995;
/// Main etcd-manager gRPC.
pub const ETCD_MAIN_GRPC: u16 = 3996;
/// Events etcd-manager gRPC.
pub const ETCD_EVENTS_GRPC: u16 = 3997;
/// DNS controller weave-mesh gossip.
pub const DNS_CONTROLLER_GOSSIP_WEAVE_MESH: u16 = 3998;
/// Protokube weave-mesh gossip.
pub const PROTOKUBE_GOSSIP_WEAVE_MESH: u16 = 3999;
/// Protokube memberlist gossip.
pub const PROTOKUBE_GOSSIP_MEMBERLIST: u16 = 4000;
/// Cilium etcd client port.
pub const ETCD_CILIUM_CLIENT: u16 = 4003;
/// Cilium operator metrics.
pub const CILIUM_OPERATOR_PROMETHEUS: u16 = 6942;
/// VXLAN over UDP.
pub const VXLAN_UDP: u16 = 8472;
/// Cilium agent metrics.
pub const CILIUM_PROMETHEUS: u16 = 9090;
/// AWS load balancer controller metrics.
pub const AWS_LBC_METRICS: u16 = 9442;
/// Hubble metrics.
pub const CILIUM_HUBBLE_PROMETHEUS: u16 = 9965;
/// Kubelet API.
pub const KUBELET_API: u16 = 10250;

/// An inclusive port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    /// First port
    pub min: u16,
    /// Last port
    pub max: u16,
}

impl PortRange {
    /// Whether `port` falls inside the range.
    pub fn contains(&self, port: u16) -> bool {
        (self.min..=self.max).contains(&port)
    }
}

/// Ports used by gossip-based DNS.
pub fn dns_gossip_port_ranges() -> Vec<PortRange> {
    vec![
        PortRange {
            min: DNS_CONTROLLER_GOSSIP_MEMBERLIST,
            max: DNS_CONTROLLER_GOSSIP_MEMBERLIST,
        },
        PortRange {
            min: DNS_CONTROLLER_GOSSIP_WEAVE_MESH,
            max: PROTOKUBE_GOSSIP_MEMBERLIST,
        },
    ]
}

/// Ports used by etcd-manager.
pub fn etcd_port_ranges() -> Vec<PortRange> {
    vec![PortRange {
        min: ETCD_MAIN_QUARANTINED_CLIENT,
        max: ETCD_EVENTS_GRPC,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges_cover_their_ports() {
        assert!(etcd_port_ranges()[0].contains(ETCD_MAIN_GRPC));
        assert!(!etcd_port_ranges()[0].contains(ETCD_CILIUM_GRPC));
        assert!(dns_gossip_port_ranges().iter().any(|r| r.contains(PROTOKUBE_GOSSIP_WEAVE_MESH)));
    }
}
