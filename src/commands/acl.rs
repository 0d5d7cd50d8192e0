//! 命令授权。

use std::collections::HashMap;

use crate::base_system::context::CommandRight;

/// 命令授权接缝：以客户端账号为主体、命令键为权限名查询。
pub trait Authorizer {
    /// 没有显式规则时返回 `default_grant`。
    fn can_use_command(&self, principal: &str, command: &str, default_grant: bool) -> bool;
}

/// 由配置里的 `command_rights` 构成的静态规则表；`*` 作为任意主体。
#[derive(Debug, Clone, Default)]
pub struct StaticAcl {
    rules: HashMap<(String, String), bool>,
}

impl StaticAcl {
    pub fn new(rights: &[CommandRight]) -> Self {
        let mut acl = Self::default();
        for right in rights {
            acl.set(&right.principal, &right.command, right.allow);
        }
        acl
    }

    pub fn set(&mut self, principal: &str, command: &str, allow: bool) {
        self.rules
            .insert((principal.to_string(), command.to_ascii_lowercase()), allow);
    }
}

impl Authorizer for StaticAcl {
    fn can_use_command(&self, principal: &str, command: &str, default_grant: bool) -> bool {
        let command = command.to_ascii_lowercase();
        self.rules
            .get(&(principal.to_string(), command.clone()))
            .or_else(|| self.rules.get(&("*".to_string(), command)))
            .copied()
            .unwrap_or(default_grant)
    }
}
