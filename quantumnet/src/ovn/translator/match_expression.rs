use quantumnet_schemas::domain::security_group::{RuleDirection, SecurityGroupRule};
use crate::ovn::components::OvnIpAddr;
use crate::ovn::identity::port_group_name;
use crate::ovn::TranslationError;

const MAX_PORT: u32 = 65535;

/// Build the OVN match expression for one rule scoped to the port group `pg_name`. Clauses are
/// always emitted in the order scope, ip version, protocol, remote ip, remote group and joined with
/// `&&`.
pub fn build_match_expression(
    rule: &SecurityGroupRule,
    pg_name: &str,
) -> Result<String, TranslationError> {
    let mut parts = Vec::new();

    // which of our ports the rule applies to
    match rule.direction {
        RuleDirection::Ingress => parts.push(format!("outport == @{pg_name}")),
        RuleDirection::Egress => parts.push(format!("inport == @{pg_name}")),
    }

    let prefix = rule.remote_ip_prefix.trim();
    if prefix.contains(':') {
        parts.push("ip6".to_string());
    } else {
        parts.push("ip4".to_string());
    }

    let protocol = rule.protocol.trim().to_lowercase();
    if !protocol.is_empty() && protocol != "any" {
        parts.extend(protocol_clauses(rule, &protocol)?);
    }

    if let Some(clause) = remote_ip_clause(rule, prefix)? {
        parts.push(clause);
    }

    if !rule.remote_security_group_id.is_empty() {
        let remote_pg = port_group_name(&rule.remote_security_group_id);
        match rule.direction {
            // source has to be a member of the remote group
            RuleDirection::Ingress => parts.push(format!("inport == @{remote_pg}")),
            // destination has to be a member of the remote group
            RuleDirection::Egress => parts.push(format!("outport == @{remote_pg}")),
        }
    }

    Ok(parts.join(" && "))
}

fn protocol_clauses(
    rule: &SecurityGroupRule,
    protocol: &str,
) -> Result<Vec<String>, TranslationError> {
    let mut parts = Vec::new();
    match protocol {
        "tcp" | "udp" | "sctp" => {
            parts.push(protocol.to_string());
            parts.extend(port_clauses(rule, protocol)?);
        }
        "icmp" => parts.extend(icmp_clauses(rule, "icmp4")?),
        "icmpv6" => parts.extend(icmp_clauses(rule, "icmp6")?),
        "gre" => parts.push("ip.proto == 47".to_string()),
        "esp" => parts.push("ip.proto == 50".to_string()),
        "ah" => parts.push("ip.proto == 51".to_string()),
        "vrrp" => parts.push("ip.proto == 112".to_string()),
        other => {
            // anything else has to be an IP protocol number
            let number = other.parse::<u8>().map_err(|_| TranslationError::UnknownProtocol {
                rule_id: rule.id.clone(),
                protocol: rule.protocol.clone(),
            })?;
            parts.push(format!("ip.proto == {number}"));
        }
    }
    Ok(parts)
}

/// A `port_min` of 0 means every port. A `port_max` of 0 or equal to `port_min` is one port.
fn port_clauses(
    rule: &SecurityGroupRule,
    protocol: &str,
) -> Result<Vec<String>, TranslationError> {
    let (min, max) = (rule.port_min, rule.port_max);
    if min == 0 {
        return Ok(Vec::new());
    }
    let invalid = || TranslationError::InvalidPortRange { rule_id: rule.id.clone(), min, max };
    if min > MAX_PORT || max > MAX_PORT {
        return Err(invalid());
    }
    if max == 0 || max == min {
        return Ok(vec![format!("{protocol}.dst == {min}")]);
    }
    if max < min {
        return Err(invalid());
    }
    Ok(vec![
        format!("{protocol}.dst >= {min}"),
        format!("{protocol}.dst <= {max}"),
    ])
}

fn icmp_clauses(
    rule: &SecurityGroupRule,
    field: &str,
) -> Result<Vec<String>, TranslationError> {
    let mut parts = vec![field.to_string()];
    for (name, value) in [("type", rule.icmp_type), ("code", rule.icmp_code)] {
        if !(-1..=255).contains(&value) {
            return Err(TranslationError::InvalidIcmp { rule_id: rule.id.clone(), field: name, value });
        }
        // -1 matches every type/code
        if value >= 0 {
            parts.push(format!("{field}.{name} == {value}"));
        }
    }
    Ok(parts)
}

fn remote_ip_clause(
    rule: &SecurityGroupRule,
    prefix: &str,
) -> Result<Option<String>, TranslationError> {
    if prefix.is_empty() {
        return Ok(None);
    }
    let parsed = OvnIpAddr::parse(prefix).map_err(|_| TranslationError::InvalidPrefix {
        rule_id: rule.id.clone(),
        prefix: prefix.to_string(),
    })?;
    if parsed.is_any() {
        return Ok(None);
    }
    let version = if prefix.contains(':') { "ip6" } else { "ip4" };
    let field = match rule.direction {
        RuleDirection::Ingress => "src",
        RuleDirection::Egress => "dst",
    };
    Ok(Some(format!("{version}.{field} == {prefix}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp_rule(port_min: u32, port_max: u32) -> SecurityGroupRule {
        SecurityGroupRule {
            id: "rule-1".into(),
            direction: RuleDirection::Ingress,
            protocol: "tcp".into(),
            port_min,
            port_max,
            ..Default::default()
        }
    }

    #[test]
    fn test_single_port() {
        let expr = build_match_expression(&tcp_rule(22, 22), "pg_sg_a").unwrap();
        assert_eq!(expr, "outport == @pg_sg_a && ip4 && tcp && tcp.dst == 22");
        assert!(!expr.contains(">="));
        let expr = build_match_expression(&tcp_rule(22, 0), "pg_sg_a").unwrap();
        assert!(expr.ends_with("tcp.dst == 22"));
    }

    #[test]
    fn test_port_range() {
        let expr = build_match_expression(&tcp_rule(1000, 2000), "pg_sg_a").unwrap();
        assert!(expr.contains("tcp.dst >= 1000"));
        assert!(expr.contains("tcp.dst <= 2000"));
    }

    #[test]
    fn test_all_ports() {
        let expr = build_match_expression(&tcp_rule(0, 0), "pg_sg_a").unwrap();
        assert_eq!(expr, "outport == @pg_sg_a && ip4 && tcp");
    }

    #[test]
    fn test_bad_port_ranges() {
        assert!(build_match_expression(&tcp_rule(2000, 1000), "pg").is_err());
        assert!(build_match_expression(&tcp_rule(70000, 70000), "pg").is_err());
        assert!(build_match_expression(&tcp_rule(1, 65536), "pg").is_err());
    }

    #[test]
    fn test_any_prefix_adds_nothing() {
        let mut rule = tcp_rule(443, 443);
        rule.remote_ip_prefix = "0.0.0.0/0".into();
        let expr = build_match_expression(&rule, "pg").unwrap();
        assert!(!expr.contains("ip4.src"));
        assert!(!expr.contains("ip4.dst"));

        rule.remote_ip_prefix = "::/0".into();
        let expr = build_match_expression(&rule, "pg").unwrap();
        assert_eq!(expr, "outport == @pg && ip6 && tcp && tcp.dst == 443");
    }

    #[test]
    fn test_remote_prefix_fields() {
        let mut rule = tcp_rule(0, 0);
        rule.remote_ip_prefix = "10.0.0.0/8".into();
        assert!(build_match_expression(&rule, "pg").unwrap().ends_with("ip4.src == 10.0.0.0/8"));

        rule.direction = RuleDirection::Egress;
        rule.remote_ip_prefix = "fd00::/64".into();
        let expr = build_match_expression(&rule, "pg").unwrap();
        assert_eq!(expr, "inport == @pg && ip6 && tcp && ip6.dst == fd00::/64");

        rule.remote_ip_prefix = "10.0.0.0/40".into();
        assert!(matches!(build_match_expression(&rule, "pg"), Err(TranslationError::InvalidPrefix { .. })));
    }

    #[test]
    fn test_icmp() {
        let mut rule = SecurityGroupRule {
            id: "icmp".into(),
            protocol: "ICMP".into(),
            ..Default::default()
        };
        assert_eq!(build_match_expression(&rule, "pg").unwrap(), "outport == @pg && ip4 && icmp4");
        rule.icmp_type = 8;
        rule.icmp_code = 0;
        assert_eq!(
            build_match_expression(&rule, "pg").unwrap(),
            "outport == @pg && ip4 && icmp4 && icmp4.type == 8 && icmp4.code == 0"
        );
        rule.protocol = "icmpv6".into();
        rule.icmp_code = -1;
        assert!(build_match_expression(&rule, "pg").unwrap().ends_with("icmp6 && icmp6.type == 8"));
        rule.icmp_type = 256;
        assert!(build_match_expression(&rule, "pg").is_err());
    }

    #[test]
    fn test_named_and_numeric_protocols() {
        let mut rule = SecurityGroupRule { id: "p".into(), protocol: "gre".into(), ..Default::default() };
        assert!(build_match_expression(&rule, "pg").unwrap().ends_with("ip.proto == 47"));
        rule.protocol = "vrrp".into();
        assert!(build_match_expression(&rule, "pg").unwrap().ends_with("ip.proto == 112"));
        rule.protocol = "132".into();
        assert!(build_match_expression(&rule, "pg").unwrap().ends_with("ip.proto == 132"));
        rule.protocol = "any".into();
        assert_eq!(build_match_expression(&rule, "pg").unwrap(), "outport == @pg && ip4");
        rule.protocol = "quic".into();
        assert!(matches!(build_match_expression(&rule, "pg"), Err(TranslationError::UnknownProtocol { .. })));
        rule.protocol = "300".into();
        assert!(build_match_expression(&rule, "pg").is_err());
    }

    #[test]
    fn test_remote_security_group() {
        let mut rule = SecurityGroupRule {
            id: "r".into(),
            remote_security_group_id: "web-tier".into(),
            ..Default::default()
        };
        assert_eq!(
            build_match_expression(&rule, "pg_sg_db").unwrap(),
            "outport == @pg_sg_db && ip4 && inport == @pg_sg_web_tier"
        );
        rule.direction = RuleDirection::Egress;
        assert_eq!(
            build_match_expression(&rule, "pg_sg_db").unwrap(),
            "inport == @pg_sg_db && ip4 && outport == @pg_sg_web_tier"
        );
    }
}
