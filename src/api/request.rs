use serde::Deserialize;

use crate::domain::AttributeArg;

// ---- targets ----

#[derive(Debug, Clone, Deserialize)]
pub struct AddTargetRequest {
    pub name: String,
    pub typestr: String,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub attributes: AttributeArg,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModifyTargetRequest {
    #[serde(default)]
    pub add_actions: Vec<String>,
    #[serde(default)]
    pub remove_actions: Vec<String>,
    #[serde(default)]
    pub add_attributes: AttributeArg,
    #[serde(default)]
    pub remove_attributes: AttributeArg,
}

/// Filter for target and actor listings; filters AND together and match
/// exact canonical names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityQuery {
    pub name: Option<String>,
    pub typestr: Option<String>,
}

// ---- actors ----

#[derive(Debug, Clone, Deserialize)]
pub struct AddActorRequest {
    pub name: String,
    pub typestr: String,
    #[serde(default)]
    pub attributes: AttributeArg,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModifyActorRequest {
    #[serde(default)]
    pub add_attributes: AttributeArg,
    #[serde(default)]
    pub remove_attributes: AttributeArg,
}

// ---- roles ----

#[derive(Debug, Clone, Deserialize)]
pub struct AddRoleRequest {
    pub name: String,
    #[serde(default)]
    pub desc: Option<String>,
    /// Groups this role is granted to; each must already exist.
    #[serde(default)]
    pub granted_to: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModifyRoleRequest {
    /// Replacement description; an empty string clears it.
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub add_granted_to: Vec<String>,
    #[serde(default)]
    pub remove_granted_to: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleQuery {
    pub name: Option<String>,
}

// ---- groups ----

/// A member reference: actors need not be registered to belong to a group.
#[derive(Debug, Clone, Deserialize)]
pub struct MemberRef {
    pub name: String,
    pub typestr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddGroupRequest {
    pub name: String,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub members: Vec<MemberRef>,
    /// Roles granted to this group; each must already exist.
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModifyGroupRequest {
    /// Replacement description; an empty string clears it.
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub add_members: Vec<MemberRef>,
    #[serde(default)]
    pub remove_members: Vec<MemberRef>,
    #[serde(default)]
    pub add_roles: Vec<String>,
    #[serde(default)]
    pub remove_roles: Vec<String>,
}

/// Group listing filter. The member filter needs both halves of the
/// identity tuple.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupQuery {
    pub name: Option<String>,
    pub member_name: Option<String>,
    pub member_typestr: Option<String>,
    pub role: Option<String>,
}

// ---- policies ----

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyQuery {
    pub name: Option<String>,
}

// ---- checks ----

/// The actor as asserted by the enforcement point.
#[derive(Debug, Clone, Deserialize)]
pub struct ActorRef {
    pub name: String,
    pub typestr: String,
    #[serde(default)]
    pub attributes: AttributeArg,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckRequest {
    pub actor: ActorRef,
    #[serde(default)]
    pub env_attributes: AttributeArg,
    pub target_name: String,
    pub target_type: String,
    pub target_action: String,
}
