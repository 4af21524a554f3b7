//! 协作内核错误类型
//!
//! 规划阶段的错误（InvalidMode / UnknownWorker / Validation）直接拒绝请求；
//! WorkerExecution 在执行阶段按 Worker 捕获，转为失败结果而不中止会话。

use thiserror::Error;

/// 协作过程中可能出现的错误（模式非法、Worker 未注册、冲突类型未知、执行失败、校验失败等）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollabError {
    #[error("Invalid collaboration mode: {0}")]
    InvalidMode(String),

    #[error("Unknown worker: {0}")]
    UnknownWorker(String),

    #[error("Unknown conflict type: {0}")]
    UnknownConflictType(String),

    /// Worker 调用失败（包装 Worker 返回的任意错误）
    #[error("Worker {worker} failed: {message}")]
    WorkerExecution { worker: String, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cyclic dependency detected: {0}")]
    CyclicDependency(String),
}

impl CollabError {
    /// 是否属于「拒绝请求」类错误（规划阶段失败，不创建会话）
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            CollabError::InvalidMode(_) | CollabError::UnknownWorker(_) | CollabError::Validation(_)
        )
    }
}

pub type CollabResult<T> = Result<T, CollabError>;
