#![allow(dead_code)]

use std::collections::HashMap;

use remote_calls::Runtime;
use remote_calls::commands::{Authorizer, RegisteredCommands, StaticAcl};
use remote_calls::network::{AllowList, DomainPolicy, DomainState};
use remote_calls::remote::{CallOptions, CallScope};
use remote_calls::remote::memory::MemoryChannelPool;
use remote_calls::script::{ArgValue, CommandHost, FunctionRef, ScriptHost, SessionId};

pub type Delivery = (SessionId, FunctionRef, Vec<ArgValue>);

#[derive(Default)]
pub struct RecordingHost {
    pub delivered: Vec<Delivery>,
}

impl ScriptHost for RecordingHost {
    fn call_function(
        &mut self,
        _scope: &mut CallScope<'_>,
        session: SessionId,
        function: FunctionRef,
        args: Vec<ArgValue>,
    ) {
        self.delivered.push((session, function, args));
    }
}

/// 命令处理器：记录调用，并按脚本对注册表做重入修改。
#[derive(Default)]
pub struct ScriptedCommandHost {
    pub calls: Vec<Delivery>,
    /// 被调用时注销自己的处理器
    pub self_removing: Vec<FunctionRef>,
    /// 被调用时注销整个会话的处理器
    pub session_killers: Vec<FunctionRef>,
    /// 被调用时新注册 (key, handler) 的处理器
    pub registrars: HashMap<i32, (String, FunctionRef)>,
}

impl CommandHost for ScriptedCommandHost {
    fn call_command_handler(
        &mut self,
        commands: &mut RegisteredCommands,
        session: SessionId,
        handler: FunctionRef,
        args: Vec<ArgValue>,
    ) {
        if self.self_removing.contains(&handler)
            && let Some(ArgValue::String(key)) = args.get(1)
        {
            commands
                .remove_command(session, key, Some(handler))
                .expect("key is non-empty");
        }
        if self.session_killers.contains(&handler) {
            commands.clean_up_for_session(session);
        }
        if let Some((key, new_handler)) = self.registrars.get(&handler.0) {
            commands
                .add_command(session, key, *new_handler, false, false)
                .expect("key is non-empty");
        }
        self.calls.push((session, handler, args));
    }
}

/// 对指定主体给出固定答案，其余情况用默认值。
#[derive(Default)]
pub struct TableAcl {
    pub answers: HashMap<String, bool>,
}

impl Authorizer for TableAcl {
    fn can_use_command(&self, principal: &str, _command: &str, default_grant: bool) -> bool {
        self.answers
            .get(principal)
            .copied()
            .unwrap_or(default_grant)
    }
}

pub struct TrustEverything;

impl DomainPolicy for TrustEverything {
    fn domain_state(&self, _domain: &str) -> DomainState {
        DomainState::Allowed
    }
}

pub fn memory_runtime(slots: usize) -> Runtime<MemoryChannelPool> {
    memory_runtime_with(slots, Box::new(AllowList::default()), Box::new(StaticAcl::default()))
}

pub fn memory_runtime_with(
    slots: usize,
    domains: Box<dyn DomainPolicy>,
    acl: Box<dyn Authorizer>,
) -> Runtime<MemoryChannelPool> {
    Runtime::new(
        MemoryChannelPool::new(),
        domains,
        acl,
        slots,
        CallOptions::default(),
    )
}
