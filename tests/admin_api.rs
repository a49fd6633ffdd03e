mod common;

use serde_json::json;
use std::sync::Arc;

use common::{app_with_storage, check_plain, send, send_ok, test_app};
use gatehouse::storage::FileStorage;

#[tokio::test]
async fn test_target_lifecycle() {
    let app = test_app().await;

    // starts empty
    let listed = send_ok(&app, "GET", "/v1/targets", None).await;
    assert_eq!(listed.as_array().unwrap().len(), 0);

    let tgt = send_ok(
        &app,
        "POST",
        "/v1/targets",
        Some(json!({"name": "db1", "typestr": "database"})),
    )
    .await;
    assert_eq!(tgt["name"], "db1");
    assert_eq!(tgt["typestr"], "database");
    assert_eq!(tgt["actions"].as_array().unwrap().len(), 0);

    send_ok(
        &app,
        "POST",
        "/v1/targets",
        Some(json!({
            "name": "db2",
            "typestr": "database",
            "actions": ["read", "write"],
            "attributes": {"role": ["prod"]},
        })),
    )
    .await;
    send_ok(&app, "POST", "/v1/targets", Some(json!({"name": "www1", "typestr": "website"}))).await;

    // filters
    assert_eq!(send_ok(&app, "GET", "/v1/targets", None).await.as_array().unwrap().len(), 3);
    assert_eq!(
        send_ok(&app, "GET", "/v1/targets?typestr=database", None).await.as_array().unwrap().len(),
        2
    );
    let by_name = send_ok(&app, "GET", "/v1/targets?name=db2", None).await;
    assert_eq!(by_name.as_array().unwrap().len(), 1);
    assert_eq!(by_name[0]["name"], "db2");

    // duplicate identity is rejected, case-insensitively
    let (status, value) = send(
        &app,
        "POST",
        "/v1/targets",
        Some(json!({"name": "DB1", "typestr": "Database"})),
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(value["code"], "ALREADY_EXISTS");

    let removed = send_ok(&app, "DELETE", "/v1/targets/database/db1", None).await;
    assert_eq!(removed["name"], "db1");
    assert_eq!(send_ok(&app, "GET", "/v1/targets", None).await.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_target_modify_merges() {
    let app = test_app().await;

    send_ok(
        &app,
        "POST",
        "/v1/targets",
        Some(json!({"name": "www1", "typestr": "website", "actions": ["login", "logout"]})),
    )
    .await;

    // add attributes, drop one action
    let tgt = send_ok(
        &app,
        "PATCH",
        "/v1/targets/website/www1",
        Some(json!({
            "remove_actions": ["logout"],
            "add_attributes": {"auth": ["basic", "gssapi"], "api": ["json", "xml"]},
        })),
    )
    .await;
    assert_eq!(tgt["actions"], json!(["login"]));
    assert_eq!(tgt["attributes"]["auth"].as_array().unwrap().len(), 2);

    // removing one value keeps the key
    let tgt = send_ok(
        &app,
        "PATCH",
        "/v1/targets/website/www1",
        Some(json!({"remove_attributes": {"api": ["json"]}})),
    )
    .await;
    assert_eq!(tgt["attributes"]["api"], json!(["xml"]));

    // removing the last value clears the key; unknown values are ignored
    let tgt = send_ok(
        &app,
        "PATCH",
        "/v1/targets/website/www1",
        Some(json!({"remove_attributes": {"api": ["xml", "yaml"]}})),
    )
    .await;
    assert!(tgt["attributes"].get("api").is_none());
    assert!(tgt["attributes"].get("auth").is_some());

    // unknown target
    let (status, _) = send(
        &app,
        "PATCH",
        "/v1/targets/website/nosuch",
        Some(json!({})),
    )
    .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_actor_lifecycle_and_expansion() {
    let app = test_app().await;

    send_ok(
        &app,
        "POST",
        "/v1/actors",
        Some(json!({"name": "alice", "typestr": "email", "attributes": {"office": ["sfo"]}})),
    )
    .await;

    let actor = send_ok(
        &app,
        "PATCH",
        "/v1/actors/email/alice",
        Some(json!({"add_attributes": {"office": ["remote"]}})),
    )
    .await;
    assert_eq!(actor["attributes"]["office"].as_array().unwrap().len(), 2);

    // group membership shows up on actor listings
    send_ok(
        &app,
        "POST",
        "/v1/groups",
        Some(json!({"name": "staff", "members": [{"name": "alice", "typestr": "email"}]})),
    )
    .await;
    send_ok(&app, "POST", "/v1/roles", Some(json!({"name": "badge", "granted_to": ["staff"]}))).await;

    let listed = send_ok(&app, "GET", "/v1/actors?name=alice", None).await;
    assert_eq!(listed[0]["attributes"]["member-of"], json!(["staff"]));
    assert_eq!(listed[0]["attributes"]["has-role"], json!(["badge"]));

    let removed = send_ok(&app, "DELETE", "/v1/actors/email/alice", None).await;
    assert_eq!(removed["name"], "alice");
    assert_eq!(send_ok(&app, "GET", "/v1/actors", None).await.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_group_role_referential_integrity() {
    let app = test_app().await;

    send_ok(&app, "POST", "/v1/groups", Some(json!({"name": "g1"}))).await;

    // adding a reference to an unknown role fails and leaves the group alone
    let (status, value) = send(
        &app,
        "PATCH",
        "/v1/groups/g1",
        Some(json!({"add_roles": ["nosuch"]})),
    )
    .await;
    assert_eq!(status, 422);
    assert_eq!(value["code"], "REFERENCE_MISSING");
    let group = send_ok(&app, "GET", "/v1/groups?name=g1", None).await;
    assert_eq!(group[0]["roles"], json!([]));

    // once the role exists the same modify succeeds and both sides agree
    send_ok(&app, "POST", "/v1/roles", Some(json!({"name": "nosuch"}))).await;
    send_ok(&app, "PATCH", "/v1/groups/g1", Some(json!({"add_roles": ["nosuch"]}))).await;

    let group = send_ok(&app, "GET", "/v1/groups?name=g1", None).await;
    assert_eq!(group[0]["roles"], json!(["nosuch"]));
    let role = send_ok(&app, "GET", "/v1/roles?name=nosuch", None).await;
    assert_eq!(role[0]["granted_to"], json!(["g1"]));

    // groups referencing an unknown role in an add request are also rejected
    let (status, _) = send(
        &app,
        "POST",
        "/v1/groups",
        Some(json!({"name": "g2", "roles": ["phantom"]})),
    )
    .await;
    assert_eq!(status, 422);
}

#[tokio::test]
async fn test_remove_cascades_between_groups_and_roles() {
    let app = test_app().await;

    send_ok(&app, "POST", "/v1/groups", Some(json!({"name": "g1"}))).await;
    send_ok(&app, "POST", "/v1/groups", Some(json!({"name": "g2"}))).await;
    send_ok(
        &app,
        "POST",
        "/v1/roles",
        Some(json!({"name": "r1", "granted_to": ["g1", "g2"]})),
    )
    .await;

    // removing the group drops it from the role's grants
    send_ok(&app, "DELETE", "/v1/groups/g2", None).await;
    let role = send_ok(&app, "GET", "/v1/roles?name=r1", None).await;
    assert_eq!(role[0]["granted_to"], json!(["g1"]));

    // removing the role drops it from the remaining group
    send_ok(&app, "DELETE", "/v1/roles/r1", None).await;
    let group = send_ok(&app, "GET", "/v1/groups?name=g1", None).await;
    assert_eq!(group[0]["roles"], json!([]));
}

#[tokio::test]
async fn test_group_filters() {
    let app = test_app().await;

    send_ok(&app, "POST", "/v1/roles", Some(json!({"name": "root"}))).await;
    send_ok(
        &app,
        "POST",
        "/v1/groups",
        Some(json!({
            "name": "admins",
            "members": [{"name": "alice", "typestr": "email"}],
            "roles": ["root"],
        })),
    )
    .await;
    send_ok(
        &app,
        "POST",
        "/v1/groups",
        Some(json!({"name": "readers", "members": [{"name": "bob", "typestr": "email"}]})),
    )
    .await;

    assert_eq!(send_ok(&app, "GET", "/v1/groups", None).await.as_array().unwrap().len(), 2);

    let by_member =
        send_ok(&app, "GET", "/v1/groups?member_name=Alice&member_typestr=Email", None).await;
    assert_eq!(by_member.as_array().unwrap().len(), 1);
    assert_eq!(by_member[0]["name"], "admins");

    let by_role = send_ok(&app, "GET", "/v1/groups?role=root", None).await;
    assert_eq!(by_role.as_array().unwrap().len(), 1);
    assert_eq!(by_role[0]["name"], "admins");
}

#[tokio::test]
async fn test_policy_lifecycle() {
    let app = test_app().await;

    send_ok(
        &app,
        "POST",
        "/v1/policies",
        Some(json!({"name": "p1", "decision": "DENY"})),
    )
    .await;

    // duplicate
    let (status, _) = send(
        &app,
        "POST",
        "/v1/policies",
        Some(json!({"name": "P1", "decision": "ALLOW"})),
    )
    .await;
    assert_eq!(status, 409);

    // replacement is whole-rule and keyed by name
    let replaced = send_ok(
        &app,
        "PUT",
        "/v1/policies/p1",
        Some(json!({"name": "p1", "decision": "ALLOW"})),
    )
    .await;
    assert_eq!(replaced["decision"], "ALLOW");

    // name in body must match the path
    let (status, value) = send(
        &app,
        "PUT",
        "/v1/policies/p1",
        Some(json!({"name": "other", "decision": "ALLOW"})),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(value["code"], "INVALID_ARGUMENT");

    // replacing an absent policy is not an upsert
    let (status, _) = send(
        &app,
        "PUT",
        "/v1/policies/ghost",
        Some(json!({"name": "ghost", "decision": "ALLOW"})),
    )
    .await;
    assert_eq!(status, 404);

    // malformed decision enums are rejected at the boundary
    let (status, _) = send(
        &app,
        "POST",
        "/v1/policies",
        Some(json!({"name": "p2", "decision": "MAYBE"})),
    )
    .await;
    assert!(status.is_client_error());

    send_ok(&app, "DELETE", "/v1/policies/p1", None).await;
    assert_eq!(send_ok(&app, "GET", "/v1/policies", None).await.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_file_backend_survives_restart() {
    let dir = tempfile::TempDir::new().unwrap();

    {
        let storage = Arc::new(FileStorage::open(dir.path()).await.unwrap());
        let app = app_with_storage(storage).await;

        send_ok(
            &app,
            "POST",
            "/v1/targets",
            Some(json!({
                "name": "maindb",
                "typestr": "db",
                "actions": ["read"],
                "attributes": {"env": ["prod"]},
            })),
        )
        .await;
        send_ok(
            &app,
            "POST",
            "/v1/groups",
            Some(json!({"name": "g1", "members": [{"name": "alice", "typestr": "email"}]})),
        )
        .await;
        send_ok(&app, "POST", "/v1/roles", Some(json!({"name": "r1", "granted_to": ["g1"]}))).await;
        send_ok(
            &app,
            "POST",
            "/v1/policies",
            Some(json!({
                "name": "p",
                "actor_check": {"attributes": [{"has": {"key": "has-role", "values": ["r1"]}}]},
                "decision": "ALLOW",
            })),
        )
        .await;

        assert_eq!(check_plain(&app, ("alice", "email"), ("maindb", "db", "read")).await, "ALLOW");
    }

    // a fresh process over the same root sees the same registry
    let storage = Arc::new(FileStorage::open(dir.path()).await.unwrap());
    let app = app_with_storage(storage).await;

    let targets = send_ok(&app, "GET", "/v1/targets", None).await;
    assert_eq!(targets.as_array().unwrap().len(), 1);
    assert_eq!(targets[0]["attributes"]["env"], json!(["prod"]));

    let roles = send_ok(&app, "GET", "/v1/roles", None).await;
    assert_eq!(roles[0]["granted_to"], json!(["g1"]));

    assert_eq!(check_plain(&app, ("alice", "email"), ("maindb", "db", "read")).await, "ALLOW");
    assert_eq!(check_plain(&app, ("bob", "email"), ("maindb", "db", "read")).await, "DENY");
}

#[tokio::test]
async fn test_empty_names_are_rejected() {
    let app = test_app().await;

    for (uri, body) in [
        ("/v1/targets", json!({"name": "", "typestr": "db"})),
        ("/v1/targets", json!({"name": "db1", "typestr": ""})),
        ("/v1/actors", json!({"name": "", "typestr": "email"})),
        ("/v1/roles", json!({"name": ""})),
        ("/v1/groups", json!({"name": ""})),
        ("/v1/policies", json!({"name": "", "decision": "ALLOW"})),
    ] {
        let (status, value) = send(&app, "POST", uri, Some(body)).await;
        assert_eq!(status, 400, "expected rejection for {uri}");
        assert_eq!(value["code"], "INVALID_ARGUMENT");
    }
}
