//! 远程调用相关的数据模型。
//!
//! 包含通道标识、调用句柄、调用选项、载荷形态与错误类型。

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::base_system::context::Config;
use crate::script::ArgValue;

/// 默认队列名；它的槽位映射永远不会被回收。
pub const DEFAULT_QUEUE_NAME: &str = "default";

/// 调用模式下响应不是合法 JSON 数组时，交给回调的错误码。
pub const MALFORMED_RESPONSE_CODE: i32 = -1;

pub const DEFAULT_CONNECTION_ATTEMPTS: u32 = 10;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RemoteCallError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// 通道池的两个互不相交的区域。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelRegion {
    /// 只能访问源主机的通道。
    Restricted,
    /// 目标域名在白名单内时使用，绕过源主机限制。
    AnyHost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId {
    pub region: ChannelRegion,
    pub slot: usize,
}

impl ChannelId {
    pub fn restricted(slot: usize) -> Self {
        Self {
            region: ChannelRegion::Restricted,
            slot,
        }
    }

    pub fn any_host(slot: usize) -> Self {
        Self {
            region: ChannelRegion::AnyHost,
            slot,
        }
    }

}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.region {
            ChannelRegion::Restricted => write!(f, "restricted#{}", self.slot),
            ChannelRegion::AnyHost => write!(f, "any-host#{}", self.slot),
        }
    }
}

/// 调用记录的句柄，也是交给传输层的完成令牌。
///
/// 槽位被复用后代数会变化，旧句柄因此失效。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Display for CallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOptions {
    pub queue_name: String,
    pub connection_attempts: u32,
    pub connect_timeout: Duration,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            connection_attempts: DEFAULT_CONNECTION_ATTEMPTS,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }
}

impl CallOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            connection_attempts: cfg.connection_attempts.max(1),
            connect_timeout: Duration::from_millis(cfg.connect_timeout_ms),
        }
    }

    pub fn with_queue(mut self, queue_name: &str) -> Self {
        self.queue_name = queue_name.to_string();
        self
    }

    /// 空队列名视为默认队列。
    pub(crate) fn normalized(mut self) -> Self {
        if self.queue_name.trim().is_empty() {
            self.queue_name = DEFAULT_QUEUE_NAME.to_string();
        }
        self.connection_attempts = self.connection_attempts.max(1);
        self
    }
}

/// 请求载荷。extra_args 只存在于 fetch 形态，由类型本身保证。
#[derive(Debug, Clone, PartialEq)]
pub enum CallPayload {
    /// 参数列表编码成的 JSON 数组，响应同样按 JSON 数组解码。
    Json { body: String },
    /// 原样提交的 post 数据；extra_args 不上线，只在回调时追加给调用方。
    Fetch {
        body: Vec<u8>,
        binary: bool,
        extra_args: Vec<ArgValue>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Call,
    Fetch,
}

impl CallPayload {
    pub fn kind(&self) -> CallKind {
        match self {
            CallPayload::Json { .. } => CallKind::Call,
            CallPayload::Fetch { .. } => CallKind::Fetch,
        }
    }

    pub fn body(&self) -> &[u8] {
        match self {
            CallPayload::Json { body } => body.as_bytes(),
            CallPayload::Fetch { body, .. } => body,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, CallPayload::Fetch { binary: true, .. })
    }

    /// 请求头里的 Content-Type；文本 fetch 按表单数据提交。
    pub fn content_type(&self) -> &'static str {
        match self {
            CallPayload::Json { .. } => "application/json",
            CallPayload::Fetch { binary: true, .. } => "application/octet-stream",
            CallPayload::Fetch { binary: false, .. } => "application/x-www-form-urlencoded",
        }
    }
}

/// 对外展示的调用信息快照。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub url: String,
    pub queue_name: String,
    pub kind: CallKind,
    pub post_data_len: usize,
    pub connection_attempts: u32,
    pub connect_timeout: Duration,
    pub channel: Option<ChannelId>,
}
