//! 处理器失败隔离边界
//!
//! 每次处理器调用都只在这里包裹一次：Err 与 panic 都被捕获，带能力名记录日志后转为
//! DispatchError::HandlerFailure 返回给调用方决定后续（通常只是继续分发）。

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::core::DispatchError;

/// 在隔离边界内调用处理器
pub fn invoke_isolated<R>(
    capability: &str,
    f: impl FnOnce() -> anyhow::Result<R>,
) -> Result<R, DispatchError> {
    let cause = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(e)) => format!("{e:#}"),
        Err(payload) => format!("panic: {}", panic_message(payload.as_ref())),
    };
    tracing::error!(capability = %capability, cause = %cause, "Handler failed");
    Err(DispatchError::HandlerFailure {
        capability: capability.to_string(),
        cause,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
