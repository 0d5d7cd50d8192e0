//! 运行时上下文：持有调用注册表、命令注册表、通道池、域名策略与授权器。
//!
//! 所有修改都在同一个 tick 线程上发生；传输完成通知也只在 `tick` 中交付。

use thiserror::Error;
use tracing::info;

use crate::base_system::context::Config;
use crate::commands::{Authorizer, Client, CommandError, RegisteredCommands, StaticAcl};
use crate::network::{AllowList, DomainPolicy, HttpChannelPool, HttpPoolOptions};
use crate::remote::{CallHandle, CallOptions, CallRecord, ChannelPool, RemoteCallError, RemoteCalls};
use crate::script::{ArgValue, CommandHost, FunctionRef, ScriptHost, SessionId};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("http client init failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid domain pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub struct Runtime<P: ChannelPool = HttpChannelPool> {
    calls: RemoteCalls,
    commands: RegisteredCommands,
    pool: P,
    domains: Box<dyn DomainPolicy>,
    acl: Box<dyn Authorizer>,
    defaults: CallOptions,
}

impl Runtime<HttpChannelPool> {
    pub fn from_config(cfg: &Config) -> Result<Self, RuntimeError> {
        let pool = HttpChannelPool::new(HttpPoolOptions::from_config(cfg))?;
        let domains = AllowList::new(&cfg.allowed_domains, &cfg.blocked_domains)?;
        let acl = StaticAcl::new(&cfg.command_rights);
        info!(
            slots = cfg.queue_slots,
            workers = cfg.channel_workers,
            "远程调用运行时已初始化"
        );
        Ok(Self::new(
            pool,
            Box::new(domains),
            Box::new(acl),
            cfg.queue_slots,
            CallOptions::from_config(cfg),
        ))
    }
}

impl<P: ChannelPool> Runtime<P> {
    pub fn new(
        pool: P,
        domains: Box<dyn DomainPolicy>,
        acl: Box<dyn Authorizer>,
        queue_slots: usize,
        defaults: CallOptions,
    ) -> Self {
        Self {
            calls: RemoteCalls::new(queue_slots),
            commands: RegisteredCommands::new(),
            pool,
            domains,
            acl,
            defaults,
        }
    }

    /// 默认调用选项（来自配置），可在此基础上改队列名。
    pub fn call_options(&self) -> CallOptions {
        self.defaults.clone()
    }

    pub fn submit(&mut self, record: CallRecord) -> CallHandle {
        self.calls
            .submit(record, &mut self.pool, self.domains.as_ref())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn call_remote(
        &mut self,
        host: &str,
        resource: &str,
        function: &str,
        args: &[ArgValue],
        session: SessionId,
        callback: FunctionRef,
        options: CallOptions,
    ) -> Result<CallHandle, RemoteCallError> {
        let record =
            CallRecord::structured(host, resource, function, args, session, callback, options)?;
        Ok(self.submit(record))
    }

    pub fn call_url(
        &mut self,
        url: &str,
        args: &[ArgValue],
        session: SessionId,
        callback: FunctionRef,
        options: CallOptions,
    ) -> Result<CallHandle, RemoteCallError> {
        let record = CallRecord::to_url(url, args, session, callback, options)?;
        Ok(self.submit(record))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn fetch_remote(
        &mut self,
        url: &str,
        post_data: Vec<u8>,
        post_binary: bool,
        extra_args: Vec<ArgValue>,
        session: SessionId,
        callback: FunctionRef,
        options: CallOptions,
    ) -> Result<CallHandle, RemoteCallError> {
        let record =
            CallRecord::fetch(url, post_data, post_binary, extra_args, session, callback, options)?;
        Ok(self.submit(record))
    }

    pub fn abort_call(&mut self, handle: CallHandle) -> bool {
        self.calls.abort(handle)
    }

    /// 处理一次所有通道的完成通知，并回收空闲队列映射。
    ///
    /// 回调只能重入调用注册表；需要同时注销命令的会话清理请在 tick 之后调用 `stop_session`。
    pub fn tick(&mut self, host: &mut dyn ScriptHost) {
        self.calls
            .process_queued_files(&mut self.pool, self.domains.as_ref(), host);
    }

    pub fn add_command(
        &mut self,
        session: SessionId,
        key: &str,
        handler: FunctionRef,
        restricted: bool,
        case_sensitive: bool,
    ) -> Result<bool, CommandError> {
        self.commands
            .add_command(session, key, handler, restricted, case_sensitive)
    }

    pub fn remove_command(
        &mut self,
        session: SessionId,
        key: &str,
        handler: Option<FunctionRef>,
    ) -> Result<bool, CommandError> {
        self.commands.remove_command(session, key, handler)
    }

    pub fn process_command(
        &mut self,
        key: &str,
        arguments: &str,
        client: Option<&Client>,
        host: &mut dyn CommandHost,
    ) -> Result<bool, CommandError> {
        self.commands
            .process_command(key, arguments, client, self.acl.as_ref(), host)
    }

    /// 会话销毁：取消其全部远程调用并注销其全部命令。
    pub fn stop_session(&mut self, session: SessionId) -> (usize, usize) {
        let calls = self.calls.remove_session(session);
        let commands = self.commands.clean_up_for_session(session);
        info!(%session, calls, commands, "会话资源已清理");
        (calls, commands)
    }

    pub fn shutdown(&mut self) {
        self.calls.clear();
        self.commands.clear_commands();
    }

    pub fn calls(&self) -> &RemoteCalls {
        &self.calls
    }

    pub fn commands(&self) -> &RegisteredCommands {
        &self.commands
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut P {
        &mut self.pool
    }
}
