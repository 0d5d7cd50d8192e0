//! 远程调用编排与注册命令分发。
//!
//! 本 crate 负责：把脚本发起的远程调用 / fetch 按队列名路由到固定数量的传输通道，
//! 在传输完成后把结果或错误恰好一次地交还给发起会话；以及按命令名分发到注册的处理器。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志等基础设施
//! - `remote`：队列路由、调用记录、调用注册表
//! - `commands`：注册命令、授权与分发
//! - `network`：reqwest 通道池与域名白名单
//! - `script`：脚本运行时接缝（参数值、JSON 编解码、回调宿主）
//! - `runtime`：持有以上组件的上下文对象

pub mod base_system;
pub mod commands;
pub mod network;
pub mod remote;
pub mod runtime;
pub mod script;

pub use runtime::{Runtime, RuntimeError};
