use serde::{Deserialize, Serialize};
use quantumnet_schemas::domain::security_group::{RuleAction, RuleDirection, SecurityGroup, SecurityGroupRule};

/// A ready made security group template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroupPreset {
    pub name: String,
    pub description: String,
    pub rules: Vec<SecurityGroupRule>,
}

impl SecurityGroupPreset {
    /// Instantiate the preset as a security group with the given id. Rule ids are prefixed with
    /// the group id so two groups made from the same preset never share rule ids.
    pub fn to_security_group(&self, id: &str, project_id: &str, stateful: bool) -> SecurityGroup {
        SecurityGroup {
            id: id.to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
            project_id: project_id.to_string(),
            rules: self.rules.iter()
                .map(|rule| SecurityGroupRule { id: format!("{id}-{}", rule.id), ..rule.clone() })
                .collect(),
            stateful,
        }
    }
}

fn ingress_tcp(id: &str, port: u32, description: &str) -> SecurityGroupRule {
    SecurityGroupRule {
        id: id.to_string(),
        direction: RuleDirection::Ingress,
        protocol: "tcp".to_string(),
        port_min: port,
        port_max: port,
        action: RuleAction::Allow,
        description: description.to_string(),
        ..Default::default()
    }
}

fn ingress_from(id: &str, prefix: &str) -> SecurityGroupRule {
    SecurityGroupRule {
        id: id.to_string(),
        direction: RuleDirection::Ingress,
        protocol: "any".to_string(),
        remote_ip_prefix: prefix.to_string(),
        action: RuleAction::Allow,
        description: format!("Allow {prefix}"),
        ..Default::default()
    }
}

fn preset(name: &str, description: &str, rules: Vec<SecurityGroupRule>) -> SecurityGroupPreset {
    SecurityGroupPreset { name: name.to_string(), description: description.to_string(), rules }
}

/// The built in presets offered when creating a security group.
pub fn presets() -> Vec<SecurityGroupPreset> {
    vec![
        preset("allow-ssh", "Allow SSH access", vec![
            ingress_tcp("allow-ssh-rule", 22, "Allow SSH (TCP 22)"),
        ]),
        preset("allow-web", "Allow HTTP and HTTPS traffic", vec![
            ingress_tcp("allow-http-rule", 80, "Allow HTTP (TCP 80)"),
            ingress_tcp("allow-https-rule", 443, "Allow HTTPS (TCP 443)"),
        ]),
        preset("allow-rdp", "Allow RDP access", vec![
            ingress_tcp("allow-rdp-rule", 3389, "Allow RDP (TCP 3389)"),
        ]),
        preset("allow-icmp", "Allow ICMP (ping)", vec![
            SecurityGroupRule {
                id: "allow-icmp-rule".to_string(),
                direction: RuleDirection::Ingress,
                protocol: "icmp".to_string(),
                icmp_type: -1,
                icmp_code: -1,
                action: RuleAction::Allow,
                description: "Allow all ICMP".to_string(),
                ..Default::default()
            },
        ]),
        preset("allow-database", "Allow common database ports", vec![
            ingress_tcp("allow-mysql-rule", 3306, "Allow MySQL (TCP 3306)"),
            ingress_tcp("allow-postgres-rule", 5432, "Allow PostgreSQL (TCP 5432)"),
            ingress_tcp("allow-mongodb-rule", 27017, "Allow MongoDB (TCP 27017)"),
            ingress_tcp("allow-redis-rule", 6379, "Allow Redis (TCP 6379)"),
        ]),
        preset("allow-internal", "Allow all internal RFC1918 traffic", vec![
            ingress_from("allow-10-rule", "10.0.0.0/8"),
            ingress_from("allow-172-rule", "172.16.0.0/12"),
            ingress_from("allow-192-rule", "192.168.0.0/16"),
        ]),
    ]
}

pub fn preset_by_name(name: &str) -> Option<SecurityGroupPreset> {
    presets().into_iter().find(|preset| preset.name == name)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use crate::ovn::identity::SequentialIdGenerator;
    use crate::ovn::translator::AclTranslator;
    use super::*;

    #[test]
    fn test_presets_translate_cleanly() {
        let translator = AclTranslator::new(Arc::new(SequentialIdGenerator::new()));
        let presets = presets();
        assert_eq!(presets.len(), 6);
        for preset in presets {
            let sg = preset.to_security_group(&format!("sg-{}", preset.name), "prj", true);
            let translation = translator.translate_security_group(&sg).unwrap();
            assert!(translation.skipped.is_empty(), "{} skipped rules", preset.name);
            assert_eq!(translation.acls.len(), 4 + preset.rules.len() + 1);
        }
    }

    #[test]
    fn test_internal_preset_matches() {
        let preset = preset_by_name("allow-internal").unwrap();
        let sg = preset.to_security_group("sg-int", "", false);
        assert_eq!(sg.rules[0].id, "sg-int-allow-10-rule");
        let translator = AclTranslator::new(Arc::new(SequentialIdGenerator::new()));
        let translation = translator.translate_security_group(&sg).unwrap();
        assert_eq!(translation.acls[0]._match, "outport == @pg_sg_sg_int && ip4 && ip4.src == 10.0.0.0/8");
        assert!(preset_by_name("allow-everything").is_none());
    }
}
