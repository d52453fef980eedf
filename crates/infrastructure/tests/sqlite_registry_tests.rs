use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use scenario_core::{AppConfig, ScenarioDescriptor, SchedulerError};
use scenario_domain::{
    NewTask, ScenarioRegistry, ScenarioService, ScenarioStatus, TaskStatus, User,
};
use scenario_infrastructure::{hash_password_with_cost, DatabaseScenarioRegistry};
use tempfile::TempDir;

/// 三个基于临时 SQLite 文件的场景
struct TestScenarios {
    dir: TempDir,
    config: AppConfig,
}

impl TestScenarios {
    fn new(names: &[&str]) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let mut config = AppConfig::default();
        config.scenarios = names
            .iter()
            .map(|name| {
                let path = dir.path().join(format!("{name}.db"));
                ScenarioDescriptor::new(*name, format!("sqlite://{}", path.display()))
            })
            .collect();
        config.validate()?;
        Ok(Self { dir, config })
    }

    async fn registry(&self) -> Result<Arc<DatabaseScenarioRegistry>> {
        let (registry, _) = DatabaseScenarioRegistry::initialize(&self.config).await?;
        Ok(registry)
    }
}

#[tokio::test]
async fn test_initialize_syncs_configured_scenarios() -> Result<()> {
    let env = TestScenarios::new(&["default", "s1", "s2"])?;
    let (registry, report) = DatabaseScenarioRegistry::initialize(&env.config).await?;
    assert_eq!(report.added, vec!["default", "s1", "s2"]);

    let scenarios = registry.scenarios().await?.list().await?;
    assert_eq!(scenarios.len(), 3);
    let default = scenarios.iter().find(|s| s.name == "default").unwrap();
    assert_eq!(default.status, ScenarioStatus::InUse);
    assert_eq!(default.description.as_deref(), Some("Production database"));
    assert!(scenarios
        .iter()
        .filter(|s| s.name != "default")
        .all(|s| s.status == ScenarioStatus::Free));

    // 第二次同步没有变化
    let report = ScenarioService::new(registry.clone()).sync().await?;
    assert!(report.is_noop());
    assert!(env.dir.path().join("default.db").exists());
    Ok(())
}

#[tokio::test]
async fn test_sync_removes_unconfigured_and_repairs_default() -> Result<()> {
    let env = TestScenarios::new(&["default", "s1", "s2"])?;
    let registry = env.registry().await?;
    let repo = registry.scenarios().await?;
    repo.transition_status("default", &[ScenarioStatus::InUse], ScenarioStatus::Free)
        .await?;
    repo.transition_status("s1", &[ScenarioStatus::Free], ScenarioStatus::InUse)
        .await?;

    let mut reduced = env.config.clone();
    reduced.scenarios.retain(|d| d.name != "s2");
    let (registry, report) = DatabaseScenarioRegistry::initialize(&reduced).await?;
    assert_eq!(report.removed, vec!["s2"]);
    assert_eq!(report.repaired, vec!["default"]);

    let repo = registry.scenarios().await?;
    assert_eq!(repo.find("default").await?.unwrap().status, ScenarioStatus::InUse);
    assert_eq!(repo.find("s1").await?.unwrap().status, ScenarioStatus::InUse);
    assert!(repo.find("s2").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_transition_status_is_conditional() -> Result<()> {
    let env = TestScenarios::new(&["default", "s1"])?;
    let registry = env.registry().await?;
    let repo = registry.scenarios().await?;

    assert!(repo.transition_status("s1", &[ScenarioStatus::Free], ScenarioStatus::Busy).await?);
    assert!(!repo.transition_status("s1", &[ScenarioStatus::Free], ScenarioStatus::Busy).await?);
    assert!(
        repo.transition_status(
            "s1",
            &[ScenarioStatus::Free, ScenarioStatus::Busy],
            ScenarioStatus::InUse
        )
        .await?
    );
    assert_eq!(repo.find("s1").await?.unwrap().status, ScenarioStatus::InUse);
    Ok(())
}

#[tokio::test]
async fn test_task_ledger_lifecycle() -> Result<()> {
    let env = TestScenarios::new(&["default"])?;
    let registry = env.registry().await?;
    let tasks = registry.tasks("default").await?;

    let first = tasks
        .insert(&NewTask::waiting("backup database", None, Some("admin".into())))
        .await?;
    let second = tasks
        .insert(&NewTask::waiting("empty database", None, None))
        .await?;
    assert!(second > first);

    let next = tasks.next_waiting().await?.unwrap();
    assert_eq!(next.id, first);
    assert_eq!(next.user.as_deref(), Some("admin"));

    let started_at = Utc::now();
    tasks
        .mark_started(first, started_at, &TaskStatus::progress(0), None)
        .await?;
    tasks.update_progress(first, &TaskStatus::progress(99)).await?;
    let running = tasks.find_by_id(first).await?.unwrap();
    assert_eq!(running.status, TaskStatus::Progress(99));
    assert!(running.started.is_some());
    assert!(running.finished.is_none());

    // 下一个等待任务已是第二个
    assert_eq!(tasks.next_waiting().await?.unwrap().id, second);
    let unfinished = tasks.list_unfinished().await?;
    assert_eq!(unfinished.iter().map(|t| t.id).collect::<Vec<_>>(), vec![first]);

    tasks
        .finish(first, &TaskStatus::Done, Some("ok"), Utc::now())
        .await?;
    let done = tasks.find_by_id(first).await?.unwrap();
    assert_eq!(done.status, TaskStatus::Done);
    assert!(done.finished.is_some());
    assert!(done.finished.unwrap() >= done.started.unwrap());
    assert!(tasks.list_unfinished().await?.is_empty());

    // 终态之后不可再修改
    let err = tasks
        .finish(first, &TaskStatus::Failed, Some("again"), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Precondition(_)));
    tasks.update_progress(first, &TaskStatus::progress(10)).await?;
    assert_eq!(tasks.find_by_id(first).await?.unwrap().status, TaskStatus::Done);

    let err = tasks
        .finish(9999, &TaskStatus::Done, None, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::TaskNotFound { id: 9999 }));

    let err = tasks
        .finish(second, &TaskStatus::progress(50), None, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidTaskParams(_)));

    let recent = tasks.list_recent(10).await?;
    assert_eq!(recent.iter().map(|t| t.id).collect::<Vec<_>>(), vec![second, first]);
    Ok(())
}

#[tokio::test]
async fn test_liveness_record() -> Result<()> {
    let env = TestScenarios::new(&["default", "s1"])?;
    let registry = env.registry().await?;
    let liveness = registry.liveness("s1").await?;

    assert!(liveness.read().await?.is_none());
    let now = Utc::now();
    liveness.beat("host:1", now).await?;
    liveness.beat("host:1", now).await?;
    let record = liveness.read().await?.unwrap();
    assert_eq!(record.holder, "host:1");
    assert!(record.is_fresh(now, std::time::Duration::from_secs(5)));

    // 场景之间互不影响
    assert!(registry.liveness("default").await?.read().await?.is_none());

    liveness.clear().await?;
    assert!(liveness.read().await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_user_permissions_union() -> Result<()> {
    let env = TestScenarios::new(&["default"])?;
    let registry = env.registry().await?;
    let users = registry.users("default").await?;

    users
        .create(&User {
            username: "planner".into(),
            email: Some("Planner@Example.com".into()),
            password_hash: hash_password_with_cost("pw", 4)?,
            is_superuser: false,
            is_active: true,
        })
        .await?;
    users.grant_permission("planner", "run_plan").await?;
    users.add_to_group("planner", "operators").await?;
    users.grant_group_permission("operators", "backup_database").await?;
    users.grant_group_permission("operators", "run_plan").await?;

    let permissions = users.permissions_of("planner").await?;
    assert_eq!(permissions, vec!["backup_database", "run_plan"]);

    let by_email = users.find_by_email("planner@example.com").await?.unwrap();
    assert_eq!(by_email.username, "planner");
    assert!(users.find_by_email("nobody@example.com").await?.is_none());
    assert!(users.permissions_of("nobody").await?.is_empty());

    let user = users.find_by_username("planner").await?.unwrap();
    assert!(user.is_active);
    assert!(!user.is_superuser);

    let duplicate = users.create(&user).await.unwrap_err();
    assert!(matches!(duplicate, SchedulerError::Precondition(_)));
    Ok(())
}

#[tokio::test]
async fn test_maintenance_flush_and_script() -> Result<()> {
    let env = TestScenarios::new(&["default"])?;
    let registry = env.registry().await?;
    let maintenance = registry.maintenance("default").await?;

    let script = env.dir.path().join("demo.sql");
    std::fs::write(
        &script,
        "CREATE TABLE IF NOT EXISTS item (name TEXT PRIMARY KEY);\n\
         INSERT INTO item (name) VALUES ('a');\n\
         INSERT INTO item (name) VALUES ('b');\n",
    )?;
    maintenance.execute_script(&script).await?;

    let deleted = maintenance.flush_tables(&["item".to_string()]).await?;
    assert_eq!(deleted, 2);

    let missing = env.dir.path().join("missing.sql");
    assert!(maintenance.execute_script(&missing).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_release_and_describe() -> Result<()> {
    let env = TestScenarios::new(&["default", "s1"])?;
    let registry = env.registry().await?;
    let service = ScenarioService::new(registry.clone());

    let err = service.release("s1").await.unwrap_err();
    assert!(matches!(err, SchedulerError::Precondition(_)));

    registry
        .scenarios()
        .await?
        .transition_status("s1", &[ScenarioStatus::Free], ScenarioStatus::InUse)
        .await?;
    let released = service.release("s1").await?;
    assert_eq!(released.status, ScenarioStatus::Free);
    assert!(released.last_refresh.is_some());

    let err = service.release("default").await.unwrap_err();
    assert!(matches!(err, SchedulerError::Precondition(_)));
    let err = service.release("unknown").await.unwrap_err();
    assert!(matches!(err, SchedulerError::Configuration(_)));

    let described = service
        .update_description("s1", Some("what-if".into()))
        .await?;
    assert_eq!(described.description.as_deref(), Some("what-if"));
    Ok(())
}

#[tokio::test]
async fn test_unknown_scenario_has_no_pool() -> Result<()> {
    let env = TestScenarios::new(&["default"])?;
    let registry = env.registry().await?;
    let err = registry.tasks("nope").await.err().unwrap();
    assert!(err.is_rejection());
    Ok(())
}
