//! 传输层接缝：通道池只负责排队、传输与完成通知。

use std::time::Duration;

use super::models::{CallHandle, ChannelId};

// 交给调用方的传输错误码。
pub const CODE_FAILED: i32 = 1;
pub const CODE_MALFORMED_URL: i32 = 3;
pub const CODE_COULDNT_RESOLVE_HOST: i32 = 6;
pub const CODE_COULDNT_CONNECT: i32 = 7;
pub const CODE_TIMED_OUT: i32 = 28;
pub const CODE_HOST_REFUSED: i32 = 403;
pub const CODE_RESPONSE_TOO_LARGE: i32 = 413;

#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub url: String,
    pub extra_headers: Vec<(String, String)>,
    pub post_data: Vec<u8>,
    pub post_binary: bool,
    pub content_type: &'static str,
    pub token: CallHandle,
    pub connection_attempts: u32,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Success(Vec<u8>),
    Failed { code: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCompletion {
    pub token: CallHandle,
    pub outcome: TransferOutcome,
}

/// 单个通道一次 tick 的处理结果。
#[derive(Debug, Default)]
pub struct ChannelBatch {
    pub completed: Vec<TransferCompletion>,
    /// 排队与进行中的传输都已清空。
    pub idle: bool,
}

/// 固定数量的传输通道。
///
/// 完成通知只能通过 `process_queued_files` 在 tick 线程上交付，
/// 这样调用注册表不需要加锁。
pub trait ChannelPool {
    fn queue_file(&mut self, channel: ChannelId, transfer: TransferRequest);

    fn process_queued_files(&mut self, channel: ChannelId) -> ChannelBatch;
}
