//! 单次远程调用 / fetch 的记录：构造、提交与结果参数的组装。

use tracing::{debug, warn};

use super::models::{
    CallHandle, CallKind, CallOptions, CallPayload, ChannelId, MALFORMED_RESPONSE_CODE,
    RemoteCallError, RequestInfo,
};
use super::queue_router::QueueRouter;
use super::transport::{ChannelPool, TransferOutcome, TransferRequest};
use crate::network::domain_policy::DomainPolicy;
use crate::script::{ArgValue, FunctionRef, SessionId, decode_arguments_json, encode_arguments_json};

#[derive(Debug, Clone)]
pub struct CallRecord {
    session: SessionId,
    callback: FunctionRef,
    url: String,
    payload: CallPayload,
    options: CallOptions,
    channel: Option<ChannelId>,
}

impl CallRecord {
    /// `http://<host>/<resource>/call/<function>` 形式的结构化调用。
    pub fn structured(
        host: &str,
        resource: &str,
        function: &str,
        args: &[ArgValue],
        session: SessionId,
        callback: FunctionRef,
        options: CallOptions,
    ) -> Result<Self, RemoteCallError> {
        let host = non_empty(host, "host")?;
        let resource = non_empty(resource, "resource")?;
        let function = non_empty(function, "function")?;
        let url = format!("http://{host}/{resource}/call/{function}");
        Ok(Self::new(
            session,
            callback,
            url,
            CallPayload::Json {
                body: encode_arguments_json(args),
            },
            options,
        ))
    }

    /// 直接给出 URL 的调用，载荷同样是 JSON 数组。
    pub fn to_url(
        url: &str,
        args: &[ArgValue],
        session: SessionId,
        callback: FunctionRef,
        options: CallOptions,
    ) -> Result<Self, RemoteCallError> {
        let url = non_empty(url, "url")?;
        Ok(Self::new(
            session,
            callback,
            url.to_string(),
            CallPayload::Json {
                body: encode_arguments_json(args),
            },
            options,
        ))
    }

    pub fn fetch(
        url: &str,
        post_data: Vec<u8>,
        post_binary: bool,
        extra_args: Vec<ArgValue>,
        session: SessionId,
        callback: FunctionRef,
        options: CallOptions,
    ) -> Result<Self, RemoteCallError> {
        let url = non_empty(url, "url")?;
        Ok(Self::new(
            session,
            callback,
            url.to_string(),
            CallPayload::Fetch {
                body: post_data,
                binary: post_binary,
                extra_args,
            },
            options,
        ))
    }

    fn new(
        session: SessionId,
        callback: FunctionRef,
        url: String,
        payload: CallPayload,
        options: CallOptions,
    ) -> Self {
        Self {
            session,
            callback,
            url,
            payload,
            options: options.normalized(),
            channel: None,
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn callback(&self) -> FunctionRef {
        self.callback
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn payload(&self) -> &CallPayload {
        &self.payload
    }

    pub fn is_fetch(&self) -> bool {
        self.payload.kind() == CallKind::Fetch
    }

    pub fn queue_name(&self) -> &str {
        &self.options.queue_name
    }

    pub fn channel(&self) -> Option<ChannelId> {
        self.channel
    }

    /// 解析信任状态与通道后提交给通道池，`token` 作为完成令牌。
    pub(crate) fn make_call(
        &mut self,
        token: CallHandle,
        router: &mut QueueRouter,
        pool: &mut dyn ChannelPool,
        domains: &dyn DomainPolicy,
    ) {
        // 目标域名被允许时绕过源主机限制
        let any_host = domains.is_trusted_url(&self.url);
        let channel = router.channel_for_queue(&self.options.queue_name, any_host);
        self.channel = Some(channel);

        debug!(
            %token,
            url = %self.url,
            queue = %self.options.queue_name,
            %channel,
            "远程调用已入队"
        );

        pool.queue_file(
            channel,
            TransferRequest {
                url: self.url.clone(),
                extra_headers: Vec::new(),
                post_data: self.payload.body().to_vec(),
                post_binary: self.payload.is_binary(),
                content_type: self.payload.content_type(),
                token,
                connection_attempts: self.options.connection_attempts,
                connect_timeout: self.options.connect_timeout,
            },
        );
    }

    /// 组装交给回调的参数列表。
    ///
    /// - 成功 + fetch：`[body, 0, ...extra]`，body 原样保留字节
    /// - 成功 + call：响应 JSON 数组的各项；解码失败时为 `["ERROR", -1]`
    /// - 失败：`["ERROR", code, ...extra(仅 fetch)]`
    pub fn result_arguments(&self, outcome: &TransferOutcome) -> Vec<ArgValue> {
        match (outcome, &self.payload) {
            (TransferOutcome::Success(data), CallPayload::Fetch { extra_args, .. }) => {
                let mut args = Vec::with_capacity(extra_args.len() + 2);
                args.push(ArgValue::Bytes(data.clone()));
                args.push(ArgValue::Number(0.0));
                args.extend(extra_args.iter().cloned());
                args
            }
            (TransferOutcome::Success(data), CallPayload::Json { .. }) => {
                let text = String::from_utf8_lossy(data);
                match decode_arguments_json(&text) {
                    Ok(args) => args,
                    Err(err) => {
                        warn!(url = %self.url, "远程调用响应无法解析: {err}");
                        error_arguments(MALFORMED_RESPONSE_CODE, &[])
                    }
                }
            }
            (TransferOutcome::Failed { code }, CallPayload::Fetch { extra_args, .. }) => {
                error_arguments(*code, extra_args)
            }
            (TransferOutcome::Failed { code }, CallPayload::Json { .. }) => {
                error_arguments(*code, &[])
            }
        }
    }

    pub fn info(&self) -> RequestInfo {
        RequestInfo {
            url: self.url.clone(),
            queue_name: self.options.queue_name.clone(),
            kind: self.payload.kind(),
            post_data_len: self.payload.body().len(),
            connection_attempts: self.options.connection_attempts,
            connect_timeout: self.options.connect_timeout,
            channel: self.channel,
        }
    }
}

fn error_arguments(code: i32, extra: &[ArgValue]) -> Vec<ArgValue> {
    let mut args = Vec::with_capacity(extra.len() + 2);
    args.push(ArgValue::from("ERROR"));
    args.push(ArgValue::from(code));
    args.extend(extra.iter().cloned());
    args
}

fn non_empty<'a>(value: &'a str, what: &'static str) -> Result<&'a str, RemoteCallError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RemoteCallError::Empty(what));
    }
    Ok(trimmed)
}
