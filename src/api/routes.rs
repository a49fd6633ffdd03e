use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use std::sync::Arc;

use crate::domain::{Actor, Group, GroupMember, Policy, Role, Target};
use crate::error::Error;
use crate::service::Gatehouse;

use super::request::{
    AddActorRequest, AddGroupRequest, AddRoleRequest, AddTargetRequest, CheckRequest, EntityQuery,
    GroupQuery, ModifyActorRequest, ModifyGroupRequest, ModifyRoleRequest, ModifyTargetRequest,
    PolicyQuery, RoleQuery,
};
use super::response::{CheckResponse, HealthResponse, ReadyResponse};

/// Shared application state.
pub struct AppState {
    pub service: Arc<Gatehouse>,
    pub version: String,
}

/// Create the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/check", post(handle_check))
        .route("/v1/targets", post(add_target).get(get_targets))
        .route(
            "/v1/targets/:typestr/:name",
            axum::routing::patch(modify_target).delete(remove_target),
        )
        .route("/v1/actors", post(add_actor).get(get_actors))
        .route(
            "/v1/actors/:typestr/:name",
            axum::routing::patch(modify_actor).delete(remove_actor),
        )
        .route("/v1/roles", post(add_role).get(get_roles))
        .route(
            "/v1/roles/:name",
            axum::routing::patch(modify_role).delete(remove_role),
        )
        .route("/v1/groups", post(add_group).get(get_groups))
        .route(
            "/v1/groups/:name",
            axum::routing::patch(modify_group).delete(remove_group),
        )
        .route("/v1/policies", post(add_policy).get(get_policies))
        .route(
            "/v1/policies/:name",
            put(replace_policy).delete(remove_policy),
        )
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .route("/metrics", get(handle_metrics))
        .with_state(state)
}

// ---- checks ----

async fn handle_check(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckRequest>,
) -> Result<Json<CheckResponse>, Error> {
    let decision = state.service.check(req)?;
    Ok(Json(CheckResponse { decision }))
}

// ---- targets ----

async fn add_target(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddTargetRequest>,
) -> Result<Json<Target>, Error> {
    Ok(Json(state.service.add_target(req).await?))
}

async fn modify_target(
    State(state): State<Arc<AppState>>,
    Path((typestr, name)): Path<(String, String)>,
    Json(req): Json<ModifyTargetRequest>,
) -> Result<Json<Target>, Error> {
    Ok(Json(state.service.modify_target(&typestr, &name, req).await?))
}

async fn remove_target(
    State(state): State<Arc<AppState>>,
    Path((typestr, name)): Path<(String, String)>,
) -> Result<Json<Target>, Error> {
    Ok(Json(state.service.remove_target(&typestr, &name).await?))
}

async fn get_targets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EntityQuery>,
) -> Json<Vec<Target>> {
    Json(
        state
            .service
            .get_targets(query.name.as_deref(), query.typestr.as_deref()),
    )
}

// ---- actors ----

async fn add_actor(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddActorRequest>,
) -> Result<Json<Actor>, Error> {
    Ok(Json(state.service.add_actor(req).await?))
}

async fn modify_actor(
    State(state): State<Arc<AppState>>,
    Path((typestr, name)): Path<(String, String)>,
    Json(req): Json<ModifyActorRequest>,
) -> Result<Json<Actor>, Error> {
    Ok(Json(state.service.modify_actor(&typestr, &name, req).await?))
}

async fn remove_actor(
    State(state): State<Arc<AppState>>,
    Path((typestr, name)): Path<(String, String)>,
) -> Result<Json<Actor>, Error> {
    Ok(Json(state.service.remove_actor(&typestr, &name).await?))
}

async fn get_actors(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EntityQuery>,
) -> Json<Vec<Actor>> {
    Json(
        state
            .service
            .get_actors(query.name.as_deref(), query.typestr.as_deref()),
    )
}

// ---- roles ----

async fn add_role(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddRoleRequest>,
) -> Result<Json<Role>, Error> {
    Ok(Json(state.service.add_role(req).await?))
}

async fn modify_role(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<ModifyRoleRequest>,
) -> Result<Json<Role>, Error> {
    Ok(Json(state.service.modify_role(&name, req).await?))
}

async fn remove_role(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Role>, Error> {
    Ok(Json(state.service.remove_role(&name).await?))
}

async fn get_roles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RoleQuery>,
) -> Json<Vec<Role>> {
    Json(state.service.get_roles(query.name.as_deref()))
}

// ---- groups ----

async fn add_group(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddGroupRequest>,
) -> Result<Json<Group>, Error> {
    Ok(Json(state.service.add_group(req).await?))
}

async fn modify_group(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<ModifyGroupRequest>,
) -> Result<Json<Group>, Error> {
    Ok(Json(state.service.modify_group(&name, req).await?))
}

async fn remove_group(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Group>, Error> {
    Ok(Json(state.service.remove_group(&name).await?))
}

async fn get_groups(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GroupQuery>,
) -> Result<Json<Vec<Group>>, Error> {
    let member = match (&query.member_name, &query.member_typestr) {
        (Some(name), Some(typestr)) => Some(GroupMember::new(name, typestr)),
        (None, None) => None,
        _ => {
            return Err(Error::invalid(
                "member filter needs both member_name and member_typestr",
            ))
        }
    };

    Ok(Json(state.service.get_groups(
        query.name.as_deref(),
        member.as_ref(),
        query.role.as_deref(),
    )))
}

// ---- policies ----

async fn add_policy(
    State(state): State<Arc<AppState>>,
    Json(rule): Json<Policy>,
) -> Result<Json<Policy>, Error> {
    Ok(Json(state.service.add_policy(rule).await?))
}

async fn replace_policy(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(rule): Json<Policy>,
) -> Result<Json<Policy>, Error> {
    Ok(Json(state.service.replace_policy(&name, rule).await?))
}

async fn remove_policy(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Policy>, Error> {
    Ok(Json(state.service.remove_policy(&name).await?))
}

async fn get_policies(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PolicyQuery>,
) -> Json<Vec<Policy>> {
    Json(state.service.get_policies(query.name.as_deref()))
}

// ---- service endpoints ----

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime_secs: state.service.uptime().as_secs(),
    })
}

async fn handle_ready(State(state): State<Arc<AppState>>) -> Json<ReadyResponse> {
    Json(ReadyResponse {
        ready: true,
        stats: state.service.stats(),
    })
}

async fn handle_metrics(State(state): State<Arc<AppState>>) -> impl axum::response::IntoResponse {
    let stats = state.service.stats();

    let metrics = format!(
        r#"# HELP gatehouse_uptime_seconds Application uptime in seconds
# TYPE gatehouse_uptime_seconds counter
gatehouse_uptime_seconds {}

# HELP gatehouse_targets Registered targets
# TYPE gatehouse_targets gauge
gatehouse_targets {}

# HELP gatehouse_actors Registered actors
# TYPE gatehouse_actors gauge
gatehouse_actors {}

# HELP gatehouse_roles Registered roles
# TYPE gatehouse_roles gauge
gatehouse_roles {}

# HELP gatehouse_groups Registered groups
# TYPE gatehouse_groups gauge
gatehouse_groups {}

# HELP gatehouse_policies Registered policies
# TYPE gatehouse_policies gauge
gatehouse_policies {}
"#,
        state.service.uptime().as_secs(),
        stats.targets,
        stats.actors,
        stats.roles,
        stats.groups,
        stats.policies,
    );

    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; charset=utf-8",
        )],
        metrics,
    )
}
