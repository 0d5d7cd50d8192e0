//! 注册命令模块入口。
//!
//! 子模块：
//! - `models`   — 命令条目、客户端、错误类型
//! - `acl`      — 授权接缝与基于配置的静态规则表
//! - `registry` — 注册/注销/分发，以及分发期间的延迟删除

pub mod acl;
pub mod models;
pub mod registry;

pub use acl::{Authorizer, StaticAcl};
pub use models::{
    Client, ClientKind, CommandEntry, CommandError, CommandInfo, MAX_REGISTERED_COMMAND_LENGTH,
};
pub use registry::RegisteredCommands;
