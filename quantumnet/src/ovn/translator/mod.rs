use std::sync::Arc;
use serde::{Deserialize, Serialize};
use quantumnet_schemas::domain::security_group::{RuleAction, RuleDirection, SecurityGroup, SecurityGroupRule};
use crate::ovn::components::acl::{Acl, AclAction, AclDirection};
use crate::ovn::components::address_set::AddressSet;
use crate::ovn::components::port_group::PortGroup;
use crate::ovn::components::{external_ids, external_ids_from};
use crate::ovn::identity::{address_set_name, port_group_name, rule_acl_name, IdGenerator};
use crate::ovn::TranslationError;

pub mod match_expression;
pub mod presets;

use match_expression::build_match_expression;

// ACL priorities, higher is evaluated first. 2000-2999 is kept free for admin overrides and 0 is
// the implicit default deny.
pub const PRIORITY_STATEFUL_ESTABLISHED: u16 = 32767;
pub const PRIORITY_STATEFUL_RELATED: u16 = PRIORITY_STATEFUL_ESTABLISHED - 1;
pub const PRIORITY_DROP_INVALID: u16 = 32000;
pub const PRIORITY_ADMIN_RULE_BASE: u16 = 2000;
pub const PRIORITY_USER_RULE_BASE: u16 = 1000;
pub const PRIORITY_DEFAULT_EGRESS_ALLOW: u16 = 100;
pub const PRIORITY_DEFAULT_DENY: u16 = 0;

/// A rule that could not be translated, the rest of the security group is still applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRule {
    pub rule_id: String,
    pub error: String,
}

/// Everything a security group compiles to. The port group lists every ACL uuid in `acls`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroupTranslation {
    pub acls: Vec<Acl>,
    pub port_group: PortGroup,
    pub address_set: AddressSet,
    pub skipped: Vec<SkippedRule>,
}

/// Compiles security groups into ACLs on a port group. Stateless apart from the identifier
/// source, every call recomputes the full ACL list from the rules.
#[derive(Clone)]
pub struct AclTranslator {
    ids: Arc<dyn IdGenerator>,
}

impl AclTranslator {
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self { ids }
    }

    /// Translate a whole security group. Rules that fail are skipped and reported in
    /// `skipped`, only a missing security group fails the translation.
    pub fn translate_security_group(
        &self,
        sg: &SecurityGroup,
    ) -> Result<SecurityGroupTranslation, TranslationError> {
        if sg.id.trim().is_empty() {
            return Err(TranslationError::MissingSecurityGroup);
        }
        tracing::info!("translating security group {} ({}) with {} rules, stateful {}",
            sg.id, sg.name, sg.rules.len(), sg.stateful);

        let pg_name = port_group_name(&sg.id);
        let mut acls = Vec::new();
        let mut skipped = Vec::new();

        if sg.stateful {
            acls.extend(self.stateful_acls(&pg_name, &sg.id));
        }

        for rule in &sg.rules {
            match self.translate_rule_in_group(rule, &pg_name, &sg.id, sg.stateful) {
                Ok(acl) => acls.push(acl),
                Err(err) => {
                    tracing::warn!("skipping rule {} of security group {}: {err}", rule.id, sg.id);
                    skipped.push(SkippedRule { rule_id: rule.id.clone(), error: err.to_string() });
                }
            }
        }

        acls.push(self.default_egress_allow(&pg_name, &sg.id));

        let group_ids = external_ids_from(&[
            (external_ids::SG_ID, &sg.id),
            (external_ids::SG_NAME, &sg.name),
        ]);
        let mut port_group = PortGroup::new(self.ids.uuid(), pg_name.clone());
        port_group.acls = acls.iter().map(|acl| acl.uuid.clone()).collect();
        port_group.external_ids = group_ids.clone();

        let mut address_set = AddressSet::new(self.ids.uuid(), address_set_name(&sg.id));
        address_set.external_ids = group_ids;

        tracing::info!("translated security group {} into {} ACLs on {pg_name}, {} rules skipped",
            sg.id, acls.len(), skipped.len());

        Ok(SecurityGroupTranslation { acls, port_group, address_set, skipped })
    }

    /// Translate a single rule of the security group `sg_id`.
    pub fn translate_rule(
        &self,
        rule: &SecurityGroupRule,
        sg_id: &str,
        stateful: bool,
    ) -> Result<Acl, TranslationError> {
        self.translate_rule_in_group(rule, &port_group_name(sg_id), sg_id, stateful)
    }

    fn translate_rule_in_group(
        &self,
        rule: &SecurityGroupRule,
        pg_name: &str,
        sg_id: &str,
        stateful: bool,
    ) -> Result<Acl, TranslationError> {
        let direction = translate_direction(rule.direction);
        let _match = build_match_expression(rule, pg_name)?;
        let action = translate_action(rule.action, stateful);
        let priority = user_rule_priority(rule.priority);

        let mut acl = Acl::new(self.ids.uuid(), direction, priority, _match, action);
        acl.name = Some(rule_acl_name(&rule.id, &rule.description));
        acl.external_ids = external_ids_from(&[
            (external_ids::RULE_ID, &rule.id),
            (external_ids::SG_ID, sg_id),
        ]);
        tracing::debug!("rule {} -> {direction} {priority} '{}' {action}", rule.id, acl._match);
        Ok(acl)
    }

    /// Established and related traffic is let through before any user rule is looked at and
    /// anything conntrack marks invalid is dropped. Always generated as a set of four.
    fn stateful_acls(&self, pg_name: &str, sg_id: &str) -> Vec<Acl> {
        let builtins = [
            ("stateful-established-ingress", "stateful-established", AclDirection::ToLport,
             PRIORITY_STATEFUL_ESTABLISHED, format!("outport == @{pg_name} && ct.est && !ct.new"), AclAction::Allow),
            ("stateful-established-egress", "stateful-established", AclDirection::FromLport,
             PRIORITY_STATEFUL_ESTABLISHED, format!("inport == @{pg_name} && ct.est && !ct.new"), AclAction::Allow),
            ("stateful-related-ingress", "stateful-related", AclDirection::ToLport,
             PRIORITY_STATEFUL_RELATED, format!("outport == @{pg_name} && ct.rel && !ct.new"), AclAction::Allow),
            ("drop-invalid", "drop-invalid", AclDirection::ToLport,
             PRIORITY_DROP_INVALID, format!("outport == @{pg_name} && ct.inv"), AclAction::Drop),
        ];
        builtins.into_iter()
            .map(|(name, builtin, direction, priority, _match, action)| {
                self.builtin_acl(name, builtin, sg_id, direction, priority, _match, action)
            })
            .collect()
    }

    fn default_egress_allow(&self, pg_name: &str, sg_id: &str) -> Acl {
        self.builtin_acl(
            "default-egress-allow",
            "default-egress-allow",
            sg_id,
            AclDirection::FromLport,
            PRIORITY_DEFAULT_EGRESS_ALLOW,
            format!("inport == @{pg_name}"),
            AclAction::Allow,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn builtin_acl(
        &self,
        name: &str,
        builtin: &str,
        sg_id: &str,
        direction: AclDirection,
        priority: u16,
        _match: String,
        action: AclAction,
    ) -> Acl {
        let mut acl = Acl::new(self.ids.uuid(), direction, priority, _match, action);
        acl.name = Some(name.to_string());
        acl.external_ids = external_ids_from(&[
            (external_ids::BUILTIN, builtin),
            (external_ids::SG_ID, sg_id),
        ]);
        acl
    }
}

/// Ingress inspects traffic going to the port, egress traffic coming from it.
pub fn translate_direction(direction: RuleDirection) -> AclDirection {
    match direction {
        RuleDirection::Ingress => AclDirection::ToLport,
        RuleDirection::Egress => AclDirection::FromLport,
    }
}

pub fn translate_action(action: RuleAction, stateful: bool) -> AclAction {
    match action {
        RuleAction::Allow if stateful => AclAction::AllowRelated,
        RuleAction::Allow => AclAction::Allow,
        RuleAction::Drop => AclAction::Drop,
        RuleAction::Reject => AclAction::Reject,
    }
}

/// User rules always land in `[1000, 2000)` whatever their own priority says.
pub fn user_rule_priority(rule_priority: u32) -> u16 {
    let cap = u32::from(PRIORITY_ADMIN_RULE_BASE - 1);
    let priority = u32::from(PRIORITY_USER_RULE_BASE).saturating_add(rule_priority).min(cap);
    // bounded by the cap above
    priority as u16
}
