//! 分发错误类型
//!
//! 权限不足与冷却中不是错误（见 RouteOutcome），只有注册缺失、处理器失败与启动配置问题在这里。

use thiserror::Error;

use crate::capability::CapabilityKind;

#[derive(Error, Debug)]
pub enum DispatchError {
    /// 命令 / 菜单名未注册
    #[error("{kind} not registered: {name}")]
    NotRegistered { kind: CapabilityKind, name: String },

    /// 启动时宿主未提供任何能力表（唯一的致命错误）
    #[error("No capability table was provided at startup")]
    NoCapabilityTable,

    /// 处理器内部的 Err 或 panic，已在分发边界捕获
    #[error("Handler '{capability}' failed: {cause}")]
    HandlerFailure { capability: String, cause: String },

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Language error: {0}")]
    Lang(#[from] crate::lang::LangError),
}
