//! 会话存储（内存）
//!
//! 每个会话保存一个 watch::Receiver，引擎执行过程中通过对应的 Sender 发布快照；
//! 查询总是读到最新快照，等待完成即等待通道上出现终态。

use std::collections::HashMap;

use tokio::sync::{watch, RwLock};

use crate::collab::types::{Session, SessionId, SessionSummary};
use crate::core::{CollabError, CollabResult};

#[derive(Default)]
struct StoreInner {
    sessions: HashMap<SessionId, watch::Receiver<Session>>,
    /// 提交顺序
    order: Vec<SessionId>,
}

#[derive(Default)]
pub struct SessionStore {
    inner: RwLock<StoreInner>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记新会话，返回发布快照用的 Sender；ID 已存在时返回 Validation
    pub async fn insert(&self, session: Session) -> CollabResult<watch::Sender<Session>> {
        let mut inner = self.inner.write().await;
        if inner.sessions.contains_key(&session.id) {
            return Err(CollabError::Validation(format!(
                "duplicate session id: {}",
                session.id
            )));
        }
        let id = session.id.clone();
        let (tx, rx) = watch::channel(session);
        inner.sessions.insert(id.clone(), rx);
        inner.order.push(id);
        Ok(tx)
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        let inner = self.inner.read().await;
        inner.sessions.get(id).map(|rx| rx.borrow().clone())
    }

    pub async fn receiver(&self, id: &str) -> Option<watch::Receiver<Session>> {
        self.inner.read().await.sessions.get(id).cloned()
    }

    /// 按提交顺序列出摘要
    pub async fn list(&self) -> Vec<SessionSummary> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.sessions.get(id))
            .map(|rx| rx.borrow().summary())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.order.len()
    }

    pub async fn active_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner
            .sessions
            .values()
            .filter(|rx| !rx.borrow().status.is_terminal())
            .count()
    }
}
