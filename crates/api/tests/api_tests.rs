use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Body,
    http::{header::AUTHORIZATION, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use scenario_api::{
    auth::{PERM_GENERATE_PLAN, PERM_RELEASE_SCENARIO, PERM_VIEW_TASK},
    create_app, AppState,
};
use scenario_core::AppConfig;
use scenario_domain::{NewTask, ScenarioStatus, TaskRepository, TaskStatus, UserRepository};
use scenario_testing_utils::{seed_user, MockScenarioRegistry};
use scenario_worker::TaskSubmitter;
use serde_json::{json, Value};
use tower::ServiceExt;

struct Harness {
    registry: Arc<MockScenarioRegistry>,
    app: Router,
}

impl Harness {
    /// 默认场景中有超级用户 admin 与普通用户 planner
    async fn new(names: &[&str]) -> Result<Self> {
        let registry = Arc::new(MockScenarioRegistry::postgres(names));
        let users = &registry.stores("default").users;
        seed_user(users, "admin", "admin-pw", true).await?;
        seed_user(users, "planner", "plan-pw", false).await?;
        users.grant_permission("planner", PERM_VIEW_TASK).await?;
        users.add_to_group("planner", "planners").await?;
        users
            .grant_group_permission("planners", PERM_GENERATE_PLAN)
            .await?;

        let config = AppConfig::default();
        let state = AppState::new(
            &config,
            registry.clone(),
            TaskSubmitter::new(registry.clone()),
        );
        let app = create_app(state, &config.api, &config.observability.metrics_endpoint);
        Ok(Self { registry, app })
    }

    async fn send(&self, request: Request<Body>) -> Result<(StatusCode, Value)> {
        let response = self.app.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Ok((status, body))
    }

    async fn get(&self, uri: &str, auth: Option<&str>) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().uri(uri).method("GET");
        if let Some(auth) = auth {
            builder = builder.header(AUTHORIZATION, auth);
        }
        self.send(builder.body(Body::empty())?).await
    }

    async fn post(&self, uri: &str, auth: Option<&str>, body: Value) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder()
            .uri(uri)
            .method("POST")
            .header("content-type", "application/json");
        if let Some(auth) = auth {
            builder = builder.header(AUTHORIZATION, auth);
        }
        self.send(builder.body(Body::from(body.to_string()))?).await
    }

    async fn add_task(&self, scenario: &str, name: &str) -> Result<i64> {
        let task = NewTask::waiting(name, None, Some("admin".to_string()));
        Ok(self.registry.stores(scenario).tasks.insert(&task).await?)
    }
}

fn basic(username: &str, password: &str) -> String {
    format!(
        "Basic {}",
        general_purpose::STANDARD.encode(format!("{username}:{password}"))
    )
}

#[tokio::test]
async fn test_health_needs_no_auth() -> Result<()> {
    let harness = Harness::new(&["default"]).await?;
    let (status, body) = harness.get("/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn test_missing_or_wrong_credentials() -> Result<()> {
    let harness = Harness::new(&["default"]).await?;

    let (status, body) = harness.get("/api/tasks", None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["type"], "AUTHENTICATION_ERROR");

    let (status, _) = harness
        .get("/api/tasks", Some(&basic("planner", "wrong")))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = harness.get("/api/tasks", Some("Bearer nope")).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_prefix_routing_requires_in_use_scenario() -> Result<()> {
    let harness = Harness::new(&["default", "s1", "s2"]).await?;
    seed_user(&harness.registry.stores("s1").users, "admin", "x", true).await?;
    for _ in 0..3 {
        harness.add_task("s1", "empty database").await?;
    }
    harness.add_task("default", "backup database").await?;
    let auth = basic("admin", "admin-pw");

    // s1 空闲时前缀请求被拒绝，不会回退到默认场景
    let (status, body) = harness.get("/s1/api/tasks", Some(&auth)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "NOT_FOUND");

    harness.registry.set_status("s1", ScenarioStatus::InUse);
    let (status, body) = harness.get("/s1/api/tasks?limit=2", Some(&auth)).await?;
    assert_eq!(status, StatusCode::OK);
    let tasks = body["data"].as_array().unwrap();
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|t| t["name"] == "empty database"));

    // 无前缀时使用默认场景
    let (status, body) = harness.get("/api/tasks", Some(&auth)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["name"], "backup database");
    Ok(())
}

#[tokio::test]
async fn test_scenario_without_capability_is_forbidden() -> Result<()> {
    let harness = Harness::new(&["default", "s1"]).await?;
    harness.registry.set_status("s1", ScenarioStatus::InUse);

    // planner 不存在于 s1 的用户表中
    let (status, body) = harness
        .get("/s1/api/tasks", Some(&basic("planner", "plan-pw")))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["type"], "FORBIDDEN");

    let (status, _) = harness
        .get("/api/tasks", Some(&basic("planner", "plan-pw")))
        .await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_login_returns_capability_map() -> Result<()> {
    let harness = Harness::new(&["default", "s3", "s4"]).await?;
    harness.registry.set_status("s3", ScenarioStatus::InUse);
    seed_user(&harness.registry.stores("s3").users, "planner", "x", true).await?;
    seed_user(&harness.registry.stores("s4").users, "planner", "x", true).await?;

    let (status, body) = harness
        .post(
            "/api/auth/login",
            None,
            json!({"username": "planner", "password": "plan-pw"}),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["token_type"], "Bearer");
    assert_eq!(data["scenarios"]["default"], false);
    assert_eq!(data["scenarios"]["s3"], true);
    assert!(data["scenarios"].get("s4").is_none());

    // s3 中是超级用户，无需显式权限即可提交复制以外的任务
    let token = format!("Bearer {}", data["access_token"].as_str().unwrap());
    let (status, body) = harness
        .post(
            "/s3/api/tasks",
            Some(&token),
            json!({"name": "backup database"}),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["scenario"], "s3");
    Ok(())
}

#[tokio::test]
async fn test_login_rejects_bad_password() -> Result<()> {
    let harness = Harness::new(&["default"]).await?;
    let (status, _) = harness
        .post(
            "/api/auth/login",
            None,
            json!({"username": "planner", "password": "guess"}),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_submit_task_into_routed_scenario() -> Result<()> {
    let harness = Harness::new(&["default", "s1"]).await?;
    harness.registry.set_status("s1", ScenarioStatus::InUse);
    seed_user(&harness.registry.stores("s1").users, "admin", "x", true).await?;

    let (status, body) = harness
        .post(
            "/s1/api/tasks",
            Some(&basic("admin", "admin-pw")),
            json!({"name": "generate plan", "arguments": "--constraint=7"}),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["task_id"].as_i64().unwrap();

    let task = harness.registry.stores("s1").tasks.get(id).unwrap();
    assert_eq!(task.status, TaskStatus::Waiting);
    assert_eq!(task.user.as_deref(), Some("admin"));
    assert_eq!(task.arguments.as_deref(), Some("--constraint=7"));
    assert_eq!(harness.registry.stores("default").tasks.count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_submit_checks_permissions_and_arguments() -> Result<()> {
    let harness = Harness::new(&["default", "s1"]).await?;
    let planner = basic("planner", "plan-pw");

    // 没有 copy_scenario 权限
    let (status, _) = harness
        .post(
            "/api/tasks",
            Some(&planner),
            json!({"name": "copy scenario", "arguments": "default s1"}),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = harness
        .post(
            "/api/tasks",
            Some(&planner),
            json!({"name": "generate plan", "arguments": "--plantype=9"}),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "INVALID_TASK_PARAMS");

    let (status, _) = harness
        .post(
            "/api/tasks",
            Some(&planner),
            json!({"name": "generate plan", "arguments": "--constraint=3"}),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(harness.registry.stores("default").tasks.count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_get_task_by_id() -> Result<()> {
    let harness = Harness::new(&["default"]).await?;
    let id = harness.add_task("default", "empty database").await?;
    let auth = basic("planner", "plan-pw");

    let (status, body) = harness.get(&format!("/api/tasks/{id}"), Some(&auth)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id);

    let (status, body) = harness.get("/api/tasks/9999", Some(&auth)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "TASK_NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn test_scenario_administration() -> Result<()> {
    let harness = Harness::new(&["default", "s1"]).await?;
    harness.registry.set_status("s1", ScenarioStatus::InUse);
    let planner = basic("planner", "plan-pw");
    let admin = basic("admin", "admin-pw");

    let (status, _) = harness
        .post("/api/scenarios/s1/release", Some(&planner), json!({}))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    harness
        .registry
        .stores("default")
        .users
        .grant_permission("planner", PERM_RELEASE_SCENARIO)
        .await?;
    let (status, body) = harness
        .post("/api/scenarios/s1/release", Some(&planner), json!({}))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "Free");
    assert_eq!(
        harness.registry.scenario_repo().status_of("s1"),
        Some(ScenarioStatus::Free)
    );

    let (status, body) = harness
        .post("/api/scenarios/default/release", Some(&admin), json!({}))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["type"], "PRECONDITION_FAILED");

    let (status, body) = harness
        .post(
            "/api/scenarios/s1/description",
            Some(&admin),
            json!({"description": "what-if"}),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["description"], "what-if");

    let (status, _) = harness
        .post("/api/scenarios/sync", Some(&planner), json!({}))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = harness
        .post("/api/scenarios/sync", Some(&admin), json!({}))
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = harness.get("/api/scenarios", Some(&planner)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_worker_status_reflects_liveness() -> Result<()> {
    let harness = Harness::new(&["default"]).await?;
    let auth = basic("planner", "plan-pw");

    let (status, body) = harness.get("/api/worker", Some(&auth)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["alive"], false);

    harness
        .registry
        .stores("default")
        .liveness
        .set("host-a:12", Utc::now());
    let (_, body) = harness.get("/api/worker", Some(&auth)).await?;
    assert_eq!(body["data"]["alive"], true);
    assert_eq!(body["data"]["holder"], "host-a:12");
    Ok(())
}

#[tokio::test]
async fn test_metrics_disabled_without_recorder() -> Result<()> {
    let harness = Harness::new(&["default"]).await?;
    let (status, _) = harness.get("/metrics", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
