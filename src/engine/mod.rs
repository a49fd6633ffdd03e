//! The evaluation path: enrich a raw check request into a context snapshot,
//! match it against every policy, and resolve a single decision.
//!
//! Everything here is synchronous and allocation-light; callers evaluate
//! under a read lock without suspending.

use crate::domain::{canonical, Actor, AttributeMap, Decision, GroupMember, Policy};
use crate::registry::Registry;

/// Name of the derived attribute listing an actor's groups.
pub const MEMBER_OF: &str = "member-of";
/// Name of the derived attribute listing an actor's roles.
pub const HAS_ROLE: &str = "has-role";

/// Immutable snapshot a single check is evaluated against.
///
/// Owned by the check in progress and discarded afterwards.
#[derive(Debug)]
pub struct CheckContext {
    /// The enriched actor: stored attributes merged in, groups and roles
    /// expanded into `member-of` / `has-role`.
    pub actor: Actor,
    /// Deterministic rollout bucket for the actor.
    pub bucket: u8,
    pub env_attributes: AttributeMap,
    pub target_name: String,
    pub target_type: String,
    pub target_action: String,
    /// Stored attributes of the target, empty when unregistered.
    pub target_attributes: AttributeMap,
}

impl CheckContext {
    /// Enrich a raw request into an evaluation context.
    ///
    /// Enrichment never fails: unknown actors and targets simply contribute
    /// nothing.
    pub fn build(
        registry: &Registry,
        mut actor: Actor,
        env_attributes: AttributeMap,
        target_name: &str,
        target_type: &str,
        target_action: &str,
    ) -> Self {
        // Merge stored attributes under the asserted ones. The enforcement
        // point speaks for the live request, so on a key collision the
        // asserted values win wholesale.
        if let Some(registered) = registry.get_actor(&actor.typestr, &actor.name) {
            for (key, values) in &registered.attributes {
                actor
                    .attributes
                    .entry(key.clone())
                    .or_insert_with(|| values.clone());
            }
        }

        let bucket = actor.bucket();
        expand_groups_and_roles(registry, &mut actor);

        let target_attributes = registry
            .get_target(target_type, target_name)
            .map(|t| t.attributes.clone())
            .unwrap_or_default();

        CheckContext {
            actor,
            bucket,
            env_attributes,
            target_name: canonical(target_name),
            target_type: canonical(target_type),
            target_action: canonical(target_action),
            target_attributes,
        }
    }
}

/// Append `member-of` and `has-role` attributes for every group the actor
/// belongs to. Expansion is one level deep: groups do not nest and roles are
/// not granted to roles.
pub fn expand_groups_and_roles(registry: &Registry, actor: &mut Actor) {
    let member = GroupMember::new(&actor.name, &actor.typestr);

    let mut member_of = Vec::new();
    let mut has_role = Vec::new();
    for group in registry.groups_of(&member) {
        member_of.push(group.key());
        has_role.extend(group.roles.iter().cloned());
    }

    if !member_of.is_empty() {
        actor
            .attributes
            .entry(MEMBER_OF.to_string())
            .or_default()
            .extend(member_of);
    }
    if !has_role.is_empty() {
        actor
            .attributes
            .entry(HAS_ROLE.to_string())
            .or_default()
            .extend(has_role);
    }
}

/// True when every present sub-check of the rule matches the context.
pub fn rule_matches(policy: &Policy, ctx: &CheckContext) -> bool {
    if let Some(ref actor_check) = policy.actor_check {
        if !actor_check.matches(&ctx.actor, ctx.bucket) {
            return false;
        }
    }

    if !policy
        .env_attributes
        .iter()
        .all(|check| check.check(&ctx.env_attributes))
    {
        return false;
    }

    if let Some(ref target_check) = policy.target_check {
        if !target_check.matches(
            &ctx.target_name,
            &ctx.target_type,
            &ctx.target_attributes,
            &ctx.target_action,
            &ctx.actor.attributes,
            &ctx.env_attributes,
        ) {
            return false;
        }
    }

    true
}

/// Combine the decisions of all matching policies.
///
/// Any matching DENY wins outright; otherwise one matching ALLOW suffices;
/// otherwise the implicit answer is DENY. The result is independent of
/// policy ordering.
pub fn resolve<'a, I>(policies: I, ctx: &CheckContext) -> Decision
where
    I: IntoIterator<Item = &'a Policy>,
{
    let mut allowed = false;

    for policy in policies {
        if !rule_matches(policy, ctx) {
            continue;
        }
        match policy.decision {
            Decision::Deny => return Decision::Deny,
            Decision::Allow => allowed = true,
        }
    }

    if allowed {
        Decision::Allow
    } else {
        Decision::Deny
    }
}
