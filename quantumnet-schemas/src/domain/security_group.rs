use std::fmt;
use std::fmt::Formatter;
use std::path::Path;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use crate::settings::is_json;

/// A tenant facing security group, an ordered list of rules that will be compiled into ACLs on a
/// port group.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub rules: Vec<SecurityGroupRule>,
    /// Use connection tracking, which turns `allow` into `allow-related` and adds the built in
    /// established/related/invalid rules.
    #[serde(default)]
    pub stateful: bool,
}

impl SecurityGroup {
    /// Load a security group definition, json when the extension says so and yaml otherwise.
    pub async fn read(path: &Path) -> anyhow::Result<Self> {
        if !path.is_file() {
            bail!("could not read security group at {path:?}");
        }
        let text = tokio::fs::read_to_string(path).await?;
        let sg = if is_json(path) {
            serde_json::from_str(&text).context("parsing security group json")?
        } else {
            serde_yaml::from_str(&text).context("parsing security group yaml")?
        };
        Ok(sg)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SecurityGroupRule {
    pub id: String,
    pub direction: RuleDirection,
    /// "tcp", "udp", "sctp", "icmp", "icmpv6", "gre", "esp", "ah", "vrrp", "any" or a protocol
    /// number
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub port_min: u32,
    #[serde(default)]
    pub port_max: u32,
    /// -1 matches every type
    #[serde(default = "default_icmp")]
    pub icmp_type: i32,
    /// -1 matches every code
    #[serde(default = "default_icmp")]
    pub icmp_code: i32,
    #[serde(default)]
    pub remote_ip_prefix: String,
    #[serde(default)]
    pub remote_security_group_id: String,
    #[serde(default)]
    pub action: RuleAction,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub description: String,
}

fn default_icmp() -> i32 { -1 }

impl Default for SecurityGroupRule {
    fn default() -> Self {
        Self {
            id: String::new(),
            direction: RuleDirection::Ingress,
            protocol: String::new(),
            port_min: 0,
            port_max: 0,
            icmp_type: default_icmp(),
            icmp_code: default_icmp(),
            remote_ip_prefix: String::new(),
            remote_security_group_id: String::new(),
            action: RuleAction::Allow,
            priority: 0,
            description: String::new(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleDirection {
    #[serde(rename = "INGRESS", alias = "ingress")]
    Ingress,
    #[serde(rename = "EGRESS", alias = "egress")]
    Egress,
}

impl fmt::Display for RuleDirection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let text = match self {
            RuleDirection::Ingress => "INGRESS",
            RuleDirection::Egress => "EGRESS",
        };
        f.write_str(text)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RuleAction {
    #[default]
    #[serde(rename = "ALLOW", alias = "allow")]
    Allow,
    #[serde(rename = "DROP", alias = "drop")]
    Drop,
    #[serde(rename = "REJECT", alias = "reject")]
    Reject,
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let text = match self {
            RuleAction::Allow => "ALLOW",
            RuleAction::Drop => "DROP",
            RuleAction::Reject => "REJECT",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_defaults_from_yaml() {
        let yaml = r#"
id: r1
direction: INGRESS
protocol: tcp
port_min: 22
port_max: 22
"#;
        let rule: SecurityGroupRule = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule.direction, RuleDirection::Ingress);
        assert_eq!(rule.action, RuleAction::Allow);
        assert_eq!(rule.icmp_type, -1);
        assert_eq!(rule.icmp_code, -1);
        assert!(rule.remote_ip_prefix.is_empty());
    }

    #[tokio::test]
    async fn test_read_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.yaml");
        tokio::fs::write(&path, "id: sg-1\nname: web\nstateful: true\nrules:\n  - id: r1\n    direction: INGRESS\n    protocol: tcp\n    port_min: 443\n").await.unwrap();
        let sg = SecurityGroup::read(&path).await.unwrap();
        assert!(sg.stateful);
        assert_eq!(sg.rules[0].port_min, 443);
        assert!(SecurityGroup::read(&dir.path().join("missing.json")).await.is_err());
    }

    #[test]
    fn test_lowercase_aliases() {
        let json = r#"{"id": "r2", "direction": "egress", "action": "reject"}"#;
        let rule: SecurityGroupRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.direction, RuleDirection::Egress);
        assert_eq!(rule.action, RuleAction::Reject);
        assert_eq!(rule.direction.to_string(), "EGRESS");
    }
}
