//! # Scenario Testing Utils
//!
//! In-memory implementations of the repository and registry traits, a
//! scripted command runner and small helpers shared by the worker and API
//! test suites.
//!
//! ```toml
//! [dev-dependencies]
//! scenario-testing-utils = { path = "../testing-utils" }
//! ```

pub mod helpers;
pub mod mocks;

pub use helpers::{seed_user, TestEnv, TEST_BCRYPT_COST};
pub use mocks::*;

#[cfg(test)]
mod tests {
    use super::*;
    use scenario_domain::{NewTask, ScenarioRegistry, ScenarioStatus, TaskStatus};

    #[tokio::test]
    async fn test_mock_registry_layout() {
        let registry = MockScenarioRegistry::postgres(&["default", "s1", "s2"]);
        assert_eq!(registry.default_scenario(), "default");
        assert_eq!(
            registry.scenario_repo().status_of("default"),
            Some(ScenarioStatus::InUse)
        );
        assert_eq!(
            registry.scenario_repo().status_of("s1"),
            Some(ScenarioStatus::Free)
        );
        assert!(registry.tasks("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_task_ledger_orders_by_id() {
        let registry = MockScenarioRegistry::postgres(&["default"]);
        let tasks = registry.tasks("default").await.unwrap();
        let a = tasks.insert(&NewTask::waiting("empty database", None, None)).await.unwrap();
        let b = tasks.insert(&NewTask::waiting("backup database", None, None)).await.unwrap();
        assert_eq!(tasks.next_waiting().await.unwrap().unwrap().id, a);
        tasks
            .finish(a, &TaskStatus::Done, None, chrono::Utc::now())
            .await
            .unwrap();
        assert_eq!(tasks.next_waiting().await.unwrap().unwrap().id, b);
    }
}
