//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息。

use serde::{Deserialize, Serialize};

use super::config::{ConfigError, ConfigSpec, FieldMeta};

/// 显式的命令授权规则；没有规则时使用命令注册时的默认值。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRight {
    pub principal: String,
    pub command: String,
    pub allow: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 通道配置
    #[serde(default = "default_channel_workers")]
    pub channel_workers: usize,
    #[serde(default = "default_queue_slots")]
    pub queue_slots: usize,
    #[serde(default = "default_connection_attempts")]
    pub connection_attempts: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    // 访问控制
    #[serde(default)]
    pub origin_host: String,
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    #[serde(default)]
    pub blocked_domains: Vec<String>,
    #[serde(default)]
    pub command_rights: Vec<CommandRight>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_workers: default_channel_workers(),
            queue_slots: default_queue_slots(),
            connection_attempts: default_connection_attempts(),
            connect_timeout_ms: default_connect_timeout_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            max_response_bytes: default_max_response_bytes(),
            user_agent: default_user_agent(),
            origin_host: String::new(),
            allowed_domains: Vec::new(),
            blocked_domains: Vec::new(),
            command_rights: Vec::new(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 11] = [
            FieldMeta {
                name: "channel_workers",
                description: "每个传输通道同时进行的请求数 (1-16)",
            },
            FieldMeta {
                name: "queue_slots",
                description: "每个区域（受限/任意主机）的通道槽位数",
            },
            FieldMeta {
                name: "connection_attempts",
                description: "默认连接尝试次数",
            },
            FieldMeta {
                name: "connect_timeout_ms",
                description: "默认单次尝试超时时间, 单位ms",
            },
            FieldMeta {
                name: "tick_interval_ms",
                description: "处理完成通知的 tick 间隔, 单位ms",
            },
            FieldMeta {
                name: "max_response_bytes",
                description: "单个响应体的最大字节数",
            },
            FieldMeta {
                name: "user_agent",
                description: "请求使用的 User-Agent",
            },
            FieldMeta {
                name: "origin_host",
                description: "受限通道允许访问的主机（留空表示不限制）",
            },
            FieldMeta {
                name: "allowed_domains",
                description: "允许绕过源主机限制的域名，支持通配符，如 *.example.com",
            },
            FieldMeta {
                name: "blocked_domains",
                description: "屏蔽的域名（优先于 allowed_domains）",
            },
            FieldMeta {
                name: "command_rights",
                description: "命令授权规则列表: {principal, command, allow}",
            },
        ];
        &FIELDS
    }

    fn validate(&mut self) -> Result<(), ConfigError> {
        if self.queue_slots == 0 {
            return Err(ConfigError::Validation(
                "queue_slots must be at least 1".to_string(),
            ));
        }
        if self.connection_attempts == 0 {
            return Err(ConfigError::Validation(
                "connection_attempts must be at least 1".to_string(),
            ));
        }
        self.channel_workers = self.channel_workers.clamp(1, 16);
        self.tick_interval_ms = self.tick_interval_ms.max(1);
        Ok(())
    }
}

fn default_channel_workers() -> usize {
    2
}

fn default_queue_slots() -> usize {
    100
}

fn default_connection_attempts() -> u32 {
    10
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_tick_interval_ms() -> u64 {
    50
}

fn default_max_response_bytes() -> u64 {
    16 * 1024 * 1024
}

fn default_user_agent() -> String {
    format!("remote-calls/{}", env!("CARGO_PKG_VERSION"))
}
