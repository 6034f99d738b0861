//! 核心层：分发组合根、错误类型、失败隔离边界、优雅关闭

pub mod dispatcher;
pub mod error;
pub mod isolation;
pub mod shutdown;

pub use dispatcher::{Collaborators, Dispatcher};
pub use error::DispatchError;
pub use isolation::invoke_isolated;
pub use shutdown::{DispatcherCleanup, ShutdownCoordinator, ShutdownManager, ShutdownReason};
