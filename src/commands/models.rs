//! 注册命令的数据模型。

use thiserror::Error;

use crate::script::{ArgValue, FunctionRef, SessionId};

/// 命令键的最大长度（字符数），超出部分在比较和存储前截断。
pub const MAX_REGISTERED_COMMAND_LENGTH: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("command key must not be empty")]
    EmptyKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub(crate) u64);

#[derive(Debug, Clone)]
pub struct CommandEntry {
    pub(crate) id: CommandId,
    pub session: SessionId,
    pub key: String,
    pub handler: FunctionRef,
    /// 没有显式授权规则时默认拒绝。
    pub restricted: bool,
    pub case_sensitive: bool,
}

impl CommandEntry {
    /// 按本条目的大小写设置比较命令键。
    pub fn matches_key(&self, key: &str) -> bool {
        if self.case_sensitive {
            self.key == key
        } else {
            self.key.eq_ignore_ascii_case(key)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    Player,
    Console,
    Other,
}

/// 发起命令的客户端。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub kind: ClientKind,
    pub element: u32,
    pub account_name: String,
}

impl Client {
    pub fn player(element: u32, account_name: &str) -> Self {
        Self {
            kind: ClientKind::Player,
            element,
            account_name: account_name.to_string(),
        }
    }

    pub fn console(element: u32) -> Self {
        Self {
            kind: ClientKind::Console,
            element,
            account_name: "Console".to_string(),
        }
    }

    /// 传给处理器的第一个参数；无法识别的客户端类型为 `false`。
    pub fn to_argument(&self) -> ArgValue {
        match self.kind {
            ClientKind::Player | ClientKind::Console => ArgValue::Element(self.element),
            ClientKind::Other => ArgValue::Bool(false),
        }
    }
}

/// `commands()` 列出的条目。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInfo {
    pub key: String,
    pub session: SessionId,
}

pub(crate) fn truncate_key(key: &str) -> String {
    key.chars().take(MAX_REGISTERED_COMMAND_LENGTH).collect()
}

/// 按单个空格切分参数串，连续空格不产生空参数。
pub(crate) fn split_arguments(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(' ').filter(|s| !s.is_empty())
}
