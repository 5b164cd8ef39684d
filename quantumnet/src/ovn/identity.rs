//! Deterministic names for logical network objects derived from platform ids, and the
//! identifier source used for row uuids and generated MAC addresses.
//!
//! The translator and the Northbound client both name port groups and address sets through the
//! functions here, so ACL match expressions always reference the port group the client creates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use crate::ovn::components::MacAddress;

/// Source of row uuids and MAC addresses. Injected into the client so tests can assert on
/// identifiers.
pub trait IdGenerator: Send + Sync {
    fn uuid(&self) -> String;
    fn mac(&self) -> MacAddress;
}

/// Random v4 uuids and random locally administered MACs.
pub struct RandomIdGenerator {
    rng: Mutex<StdRng>,
}

impl RandomIdGenerator {
    pub fn new() -> Self {
        Self { rng: Mutex::new(StdRng::from_entropy()) }
    }
}

impl Default for RandomIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for RandomIdGenerator {
    fn uuid(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn mac(&self) -> MacAddress {
        // a poisoned lock only means another thread panicked mid draw, the rng is still usable
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        MacAddress::random_local(&mut *rng)
    }
}

/// Counts up from 1, uuids are `00000000-0000-0000-0000-<counter>` and MACs `0a:00:<counter>`.
#[derive(Default)]
pub struct SequentialIdGenerator {
    next_uuid: AtomicU64,
    next_mac: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn uuid(&self) -> String {
        let n = self.next_uuid.fetch_add(1, Ordering::Relaxed) + 1;
        format!("00000000-0000-0000-0000-{:012x}", n & 0xffff_ffff_ffff)
    }

    fn mac(&self) -> MacAddress {
        let n = self.next_mac.fetch_add(1, Ordering::Relaxed) + 1;
        let num = 0x0a00_0000_0000u64 | (n & 0xff_ffff_ffff);
        MacAddress {
            address: format!(
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                (num >> 40) & 0xff, (num >> 32) & 0xff, (num >> 24) & 0xff,
                (num >> 16) & 0xff, (num >> 8) & 0xff, num & 0xff
            ),
            as_bytes: num,
        }
    }
}

fn underscored(id: &str) -> String {
    id.replace('-', "_")
}

/// Port group names only allow `[a-zA-Z_.][a-zA-Z_.0-9]*` since match expressions reference them
/// as `@<name>`, hence the underscores.
pub fn port_group_name(security_group_id: &str) -> String {
    format!("pg_sg_{}", underscored(security_group_id))
}

pub fn address_set_name(security_group_id: &str) -> String {
    format!("as_sg_{}", underscored(security_group_id))
}

pub fn switch_name(network_id: &str) -> String {
    format!("ls-{network_id}")
}

pub fn switch_port_name(port_id: &str) -> String {
    format!("lsp-{port_id}")
}

pub fn router_name(router_id: &str) -> String {
    format!("lr-{router_id}")
}

/// Router side of the interface between `router` and `switch`, both full object names.
pub fn router_port_name(router: &str, switch: &str) -> String {
    format!("{router}-to-{switch}")
}

/// Switch side peer of [`router_port_name`].
pub fn router_peer_port_name(router: &str, switch: &str) -> String {
    format!("{switch}-to-{router}")
}

pub fn localnet_port_name(switch: &str) -> String {
    format!("{switch}-localnet")
}

pub fn load_balancer_name(load_balancer_id: &str) -> String {
    format!("lb-{load_balancer_id}")
}

/// ACL name for a user rule, the description when there is one.
pub fn rule_acl_name(rule_id: &str, description: &str) -> String {
    if !description.is_empty() {
        return description.to_string();
    }
    let short: String = rule_id.chars().take(8).collect();
    format!("rule-{short}")
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(port_group_name("sg-1"), "pg_sg_sg_1");
        assert_eq!(address_set_name("6f1c-22"), "as_sg_6f1c_22");
        assert_eq!(switch_name("net-1"), "ls-net-1");
        assert_eq!(switch_port_name("p1"), "lsp-p1");
        assert_eq!(router_name("r1"), "lr-r1");
        assert_eq!(router_port_name("lr-r1", "ls-n1"), "lr-r1-to-ls-n1");
        assert_eq!(router_peer_port_name("lr-r1", "ls-n1"), "ls-n1-to-lr-r1");
        assert_eq!(localnet_port_name("ls-n1"), "ls-n1-localnet");
        assert_eq!(load_balancer_name("web"), "lb-web");
    }

    #[test]
    fn test_rule_acl_name() {
        assert_eq!(rule_acl_name("0123456789abcdef", ""), "rule-01234567");
        assert_eq!(rule_acl_name("r1", ""), "rule-r1");
        assert_eq!(rule_acl_name("r1", "allow https"), "allow https");
    }

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIdGenerator::new();
        assert_eq!(ids.uuid(), "00000000-0000-0000-0000-000000000001");
        assert_eq!(ids.uuid(), "00000000-0000-0000-0000-000000000002");
        let mac = ids.mac();
        assert_eq!(mac.address, "0a:00:00:00:00:01");
        assert_eq!(MacAddress::new(mac.address.clone()).unwrap(), mac);
    }

    #[test]
    fn test_random_ids_unique() {
        let ids = RandomIdGenerator::new();
        let uuids: HashSet<_> = (0..100).map(|_| ids.uuid()).collect();
        assert_eq!(uuids.len(), 100);
        assert!(uuid::Uuid::parse_str(&ids.uuid()).is_ok());
        let mac = ids.mac();
        assert!(MacAddress::new(mac.address).is_ok());
    }
}
