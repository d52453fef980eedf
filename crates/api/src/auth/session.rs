use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use scenario_domain::CapabilityMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// 登录会话，携带登录时计算的场景能力映射
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub capabilities: CapabilityMap,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

pub struct SessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 创建会话，同时清理已过期的会话
    pub async fn create(&self, username: &str, capabilities: CapabilityMap) -> Session {
        let now = Utc::now();
        let session = Session {
            token: Uuid::new_v4().to_string(),
            username: username.to_string(),
            capabilities,
            expires_at: now + self.ttl,
        };
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, existing| !existing.is_expired(now));
        sessions.insert(session.token.clone(), session.clone());
        session
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// 查找未过期的会话；过期会话在查找时移除
    pub async fn get(&self, token: &str) -> Option<Session> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                Some(session) if !session.is_expired(now) => return Some(session.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.sessions.write().await.remove(token);
        None
    }

    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_lifecycle() {
        let store = SessionStore::new(Duration::minutes(5));
        let mut caps = CapabilityMap::new();
        caps.insert("default", false);

        let session = store.create("alice", caps.clone()).await;
        let found = store.get(&session.token).await.unwrap();
        assert_eq!(found.username, "alice");
        assert_eq!(found.capabilities, caps);

        assert!(store.revoke(&session.token).await);
        assert!(store.get(&session.token).await.is_none());
    }

    #[tokio::test]
    async fn test_login_evicts_expired_sessions() {
        let store = SessionStore::new(Duration::milliseconds(-1));
        for _ in 0..3 {
            store.create("alice", CapabilityMap::new()).await;
        }
        // 每次创建都先清理，只剩最新的一个
        assert_eq!(store.len().await, 1);

        let store = SessionStore::new(Duration::minutes(5));
        store.create("alice", CapabilityMap::new()).await;
        store.create("bob", CapabilityMap::new()).await;
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_expired_session_is_dropped() {
        let store = SessionStore::new(Duration::seconds(-1));
        let session = store.create("alice", CapabilityMap::new()).await;
        assert!(store.get(&session.token).await.is_none());
        assert!(!store.revoke(&session.token).await);
    }
}
