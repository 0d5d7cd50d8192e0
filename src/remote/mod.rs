//! 远程调用模块入口。
//!
//! 子模块：
//! - `models`        — 通道标识、调用句柄、调用选项、载荷形态
//! - `transport`     — 通道池接缝与传输结果
//! - `queue_router`  — 队列名 → 通道槽位映射与空闲回收
//! - `call_record`   — 单次调用的构造、提交与结果组装
//! - `call_registry` — 存活调用的所有权、存在性检查与会话清理
//! - `memory`        — 手动完成的内存通道池

pub mod call_record;
pub mod call_registry;
pub mod memory;
pub mod models;
pub mod queue_router;
pub mod transport;

pub use call_record::CallRecord;
pub use call_registry::{CallScope, RemoteCalls};
pub use models::{
    CallHandle, CallKind, CallOptions, CallPayload, ChannelId, ChannelRegion, DEFAULT_QUEUE_NAME,
    MALFORMED_RESPONSE_CODE, RemoteCallError, RequestInfo,
};
pub use queue_router::QueueRouter;
pub use transport::{ChannelBatch, ChannelPool, TransferCompletion, TransferOutcome, TransferRequest};
