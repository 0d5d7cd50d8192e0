//! 基于 reqwest 的传输通道池。
//!
//! 每个通道按需创建，拥有若干工作线程；工作线程只负责传输，
//! 完成结果经 channel 送回，由 tick 线程在 `process_queued_files` 中取走并交付。

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel as channel;
use reqwest::Url;
use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, warn};

use crate::base_system::context::Config;
use crate::remote::models::{ChannelId, ChannelRegion};
use crate::remote::transport::{
    CODE_COULDNT_CONNECT, CODE_COULDNT_RESOLVE_HOST, CODE_FAILED, CODE_HOST_REFUSED,
    CODE_MALFORMED_URL, CODE_RESPONSE_TOO_LARGE, CODE_TIMED_OUT, ChannelBatch, ChannelPool,
    TransferCompletion, TransferOutcome, TransferRequest,
};

#[derive(Debug, Clone)]
pub struct HttpPoolOptions {
    pub workers: usize,
    pub user_agent: String,
    /// 受限通道唯一允许访问的主机；None 表示不限制。
    pub origin_host: Option<String>,
    pub max_response_bytes: u64,
}

impl HttpPoolOptions {
    pub fn from_config(cfg: &Config) -> Self {
        let origin = cfg.origin_host.trim().to_ascii_lowercase();
        Self {
            workers: cfg.channel_workers.clamp(1, 16),
            user_agent: cfg.user_agent.clone(),
            origin_host: (!origin.is_empty()).then_some(origin),
            max_response_bytes: cfg.max_response_bytes,
        }
    }
}

struct HttpChannel {
    tx: Option<channel::Sender<TransferRequest>>,
    rx_done: channel::Receiver<TransferCompletion>,
    workers: usize,
    in_flight: usize,
    // 工作线程已退出时直接记为失败
    local_failures: Vec<TransferCompletion>,
}

impl HttpChannel {
    // 工作线程不被 join：关闭后它们最多再跑完手头的一次尝试就退出
    fn spawn(
        id: ChannelId,
        client: Client,
        opts: Arc<HttpPoolOptions>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        let (tx, rx) = channel::unbounded::<TransferRequest>();
        let (tx_done, rx_done) = channel::unbounded::<TransferCompletion>();

        let mut workers = 0;
        for n in 0..opts.workers {
            let rx = rx.clone();
            let tx_done = tx_done.clone();
            let client = client.clone();
            let opts = opts.clone();
            let cancel = cancel.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("{id}-{n}"))
                .spawn(move || {
                    while let Ok(transfer) = rx.recv() {
                        let token = transfer.token;
                        let outcome = if cancel.load(Ordering::Relaxed) {
                            TransferOutcome::Failed { code: CODE_FAILED }
                        } else {
                            perform_transfer(&client, &opts, id, &transfer, &cancel)
                        };
                        if tx_done.send(TransferCompletion { token, outcome }).is_err() {
                            return;
                        }
                    }
                });
            match spawned {
                Ok(_) => workers += 1,
                Err(err) => warn!(channel = %id, "工作线程创建失败: {err}"),
            }
        }

        Self {
            tx: Some(tx),
            rx_done,
            workers,
            in_flight: 0,
            local_failures: Vec::new(),
        }
    }

    fn submit(&mut self, transfer: TransferRequest) {
        let token = transfer.token;
        let sent = self.workers > 0
            && self
                .tx
                .as_ref()
                .is_some_and(|tx| tx.send(transfer).is_ok());
        if sent {
            self.in_flight += 1;
        } else {
            self.local_failures.push(TransferCompletion {
                token,
                outcome: TransferOutcome::Failed { code: CODE_FAILED },
            });
        }
    }

    fn drain(&mut self) -> ChannelBatch {
        let mut completed = std::mem::take(&mut self.local_failures);
        for done in self.rx_done.try_iter() {
            self.in_flight = self.in_flight.saturating_sub(1);
            completed.push(done);
        }
        ChannelBatch {
            completed,
            idle: self.in_flight == 0,
        }
    }

    fn close(&mut self) {
        self.tx.take();
    }
}

pub struct HttpChannelPool {
    client: Client,
    opts: Arc<HttpPoolOptions>,
    channels: HashMap<ChannelId, HttpChannel>,
    cancel: Arc<AtomicBool>,
}

impl HttpChannelPool {
    pub fn new(opts: HttpPoolOptions) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        if let Ok(ua) = HeaderValue::from_str(&opts.user_agent) {
            headers.insert(USER_AGENT, ua);
        }
        let client = Client::builder().default_headers(headers).build()?;
        Ok(Self {
            client,
            opts: Arc::new(opts),
            channels: HashMap::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// 停止所有通道：不再发起新的尝试与重试，不等待进行中的请求。
    pub fn shutdown(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        for (_, mut ch) in self.channels.drain() {
            ch.close();
        }
    }
}

impl Drop for HttpChannelPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ChannelPool for HttpChannelPool {
    fn queue_file(&mut self, channel: ChannelId, transfer: TransferRequest) {
        let Self {
            client,
            opts,
            channels,
            cancel,
        } = self;
        channels
            .entry(channel)
            .or_insert_with(|| {
                HttpChannel::spawn(channel, client.clone(), opts.clone(), cancel.clone())
            })
            .submit(transfer);
    }

    fn process_queued_files(&mut self, channel: ChannelId) -> ChannelBatch {
        match self.channels.get_mut(&channel) {
            Some(ch) => ch.drain(),
            None => ChannelBatch {
                completed: Vec::new(),
                idle: true,
            },
        }
    }
}

/// 受限通道访问非源主机时返回拒绝错误码。
pub(crate) fn check_restricted(
    opts: &HttpPoolOptions,
    channel: ChannelId,
    url: &Url,
) -> Option<i32> {
    if channel.region != ChannelRegion::Restricted {
        return None;
    }
    let origin = opts.origin_host.as_deref()?;
    let host = url.host_str().map(|h| h.to_ascii_lowercase());
    if host.as_deref() == Some(origin) {
        None
    } else {
        Some(CODE_HOST_REFUSED)
    }
}

fn perform_transfer(
    client: &Client,
    opts: &HttpPoolOptions,
    channel: ChannelId,
    transfer: &TransferRequest,
    cancel: &AtomicBool,
) -> TransferOutcome {
    let url = match Url::parse(&transfer.url) {
        Ok(u) => u,
        Err(err) => {
            debug!(url = %transfer.url, "URL 无法解析: {err}");
            return TransferOutcome::Failed {
                code: CODE_MALFORMED_URL,
            };
        }
    };
    if let Some(code) = check_restricted(opts, channel, &url) {
        warn!(%channel, url = %transfer.url, "受限通道拒绝访问非源主机");
        return TransferOutcome::Failed { code };
    }

    let attempts = transfer.connection_attempts.max(1);
    let mut backoff = Duration::from_millis(250);
    let mut attempt = 1;
    let resp = loop {
        let mut req = client
            .post(url.clone())
            .timeout(transfer.connect_timeout)
            .header(CONTENT_TYPE, transfer.content_type)
            .body(transfer.post_data.clone());
        for (name, value) in &transfer.extra_headers {
            req = req.header(name.as_str(), value.as_str());
        }

        match req.send() {
            Ok(r) => break r,
            Err(err) => {
                let code = classify_error(&err);
                let retryable = err.is_timeout() || err.is_connect();
                if !retryable || attempt >= attempts || cancel.load(Ordering::Relaxed) {
                    debug!(%channel, url = %transfer.url, code, attempt, "传输失败: {err}");
                    return TransferOutcome::Failed { code };
                }
                debug!(%channel, attempt, url = %transfer.url, "连接失败，准备重试: {err}");
                std::thread::sleep(backoff);
                backoff = std::cmp::min(backoff * 2, Duration::from_secs(2));
                attempt += 1;
            }
        }
    };

    let status = resp.status();
    if !status.is_success() {
        return TransferOutcome::Failed {
            code: i32::from(status.as_u16()),
        };
    }
    read_capped(resp, opts.max_response_bytes)
}

/// 边读边计数，超过上限立即放弃；不依赖 Content-Length。
fn read_capped(resp: Response, limit: u64) -> TransferOutcome {
    if resp.content_length().is_some_and(|len| len > limit) {
        return TransferOutcome::Failed {
            code: CODE_RESPONSE_TOO_LARGE,
        };
    }
    let mut body = Vec::new();
    match resp.take(limit.saturating_add(1)).read_to_end(&mut body) {
        Ok(_) if body.len() as u64 > limit => TransferOutcome::Failed {
            code: CODE_RESPONSE_TOO_LARGE,
        },
        Ok(_) => TransferOutcome::Success(body),
        Err(err) if body_read_timed_out(&err) => TransferOutcome::Failed {
            code: CODE_TIMED_OUT,
        },
        Err(_) => TransferOutcome::Failed { code: CODE_FAILED },
    }
}

// reqwest 读取响应体时把自己的超时错误包在 io::Error 里
fn body_read_timed_out(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::TimedOut
        || err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
            .is_some_and(reqwest::Error::is_timeout)
}

fn classify_error(err: &reqwest::Error) -> i32 {
    if err.is_timeout() {
        return CODE_TIMED_OUT;
    }
    if err.is_builder() {
        return CODE_MALFORMED_URL;
    }
    if err.is_connect() {
        // reqwest 不单独暴露 DNS 失败，只能沿错误链按描述尽力判断
        let root: &(dyn std::error::Error + 'static) = err;
        let unresolved = std::iter::successors(Some(root), |e| e.source())
            .map(|e| e.to_string().to_ascii_lowercase())
            .any(|msg| msg.contains("dns error") || msg.contains("failed to lookup address"));
        return if unresolved {
            CODE_COULDNT_RESOLVE_HOST
        } else {
            CODE_COULDNT_CONNECT
        };
    }
    CODE_FAILED
}
