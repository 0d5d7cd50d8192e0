//! remote-calls 命令行入口：提交一次远程调用或 fetch，驱动 tick 直到结果交付，
//! 然后把交给回调的参数列表以 JSON 打印到 stdout。

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use remote_calls::Runtime;
use remote_calls::base_system::config::{load_or_create, load_or_create_with_base};
use remote_calls::base_system::context::Config;
use remote_calls::base_system::logging::{LogOptions, LogSystem};
use remote_calls::remote::CallScope;
use remote_calls::script::{
    ArgValue, FunctionRef, ScriptHost, SessionId, decode_arguments_json, encode_arguments_json,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

// 命令行只有一个会话和一个回调
const CLI_SESSION: SessionId = SessionId(1);
const CLI_CALLBACK: FunctionRef = FunctionRef(1);

#[derive(Debug, Parser)]
#[command(name = "remote-calls", version = VERSION)]
#[command(about = "Queue remote calls / fetches and print the delivered callback arguments")]
struct Cli {
    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 数据目录路径（用于存放 config.yml 和 logs）
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 指定配置文件（优先于 data_dir）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 队列名
    #[arg(long, default_value = remote_calls::remote::DEFAULT_QUEUE_NAME)]
    queue: String,

    /// 连接尝试次数（默认取配置）
    #[arg(long)]
    attempts: Option<u32>,

    /// 单次尝试超时, 单位ms（默认取配置）
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// 等待结果的最长时间, 单位秒
    #[arg(long, default_value_t = 120)]
    max_wait_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 调用 http://<host>/<resource>/call/<function>
    Call {
        host: String,
        resource: String,
        function: String,
        /// JSON 数组形式的参数
        #[arg(default_value = "[]")]
        args: String,
    },
    /// 以 JSON 数组参数调用任意 URL
    CallUrl {
        url: String,
        #[arg(default_value = "[]")]
        args: String,
    },
    /// 原样 post 数据到 URL
    Fetch {
        url: String,
        #[arg(long, default_value = "")]
        post_data: String,
        /// 从文件读取 post 数据（按二进制发送）
        #[arg(long, conflicts_with = "post_data")]
        post_file: Option<PathBuf>,
        /// 回调时追加的参数（JSON 数组）
        #[arg(long, default_value = "[]")]
        extra: String,
    },
}

#[derive(Default)]
struct PrintHost {
    delivered: Option<Vec<ArgValue>>,
}

impl ScriptHost for PrintHost {
    fn call_function(
        &mut self,
        _scope: &mut CallScope<'_>,
        session: SessionId,
        function: FunctionRef,
        args: Vec<ArgValue>,
    ) {
        info!(%session, function = function.0, argc = args.len(), "回调已交付");
        self.delivered = Some(args);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = cli.data_dir.as_deref();
    let _log = init_logging(cli.debug, data_dir)?;

    let config = load_config(cli.config.as_deref(), data_dir)?;
    let mut runtime = Runtime::from_config(&config)?;

    let mut options = runtime.call_options().with_queue(&cli.queue);
    if let Some(attempts) = cli.attempts {
        options.connection_attempts = attempts;
    }
    if let Some(ms) = cli.timeout_ms {
        options.connect_timeout = Duration::from_millis(ms);
    }

    let handle = match &cli.command {
        Command::Call {
            host,
            resource,
            function,
            args,
        } => {
            let args = parse_args(args)?;
            runtime.call_remote(
                host,
                resource,
                function,
                &args,
                CLI_SESSION,
                CLI_CALLBACK,
                options,
            )?
        }
        Command::CallUrl { url, args } => {
            let args = parse_args(args)?;
            runtime.call_url(url, &args, CLI_SESSION, CLI_CALLBACK, options)?
        }
        Command::Fetch {
            url,
            post_data,
            post_file,
            extra,
        } => {
            let extra = parse_args(extra)?;
            let (body, binary) = match post_file {
                Some(path) => (std::fs::read(path)?, true),
                None => (post_data.as_bytes().to_vec(), false),
            };
            runtime.fetch_remote(url, body, binary, extra, CLI_SESSION, CLI_CALLBACK, options)?
        }
    };

    if let Some(info) = runtime.calls().request_info(handle) {
        info!(url = %info.url, queue = %info.queue_name, "请求已提交");
    }

    let mut host = PrintHost::default();
    let tick = Duration::from_millis(config.tick_interval_ms);
    let deadline = Instant::now() + Duration::from_secs(cli.max_wait_secs);

    while host.delivered.is_none() {
        runtime.tick(&mut host);
        if host.delivered.is_some() {
            break;
        }
        if Instant::now() >= deadline {
            warn!("等待结果超时，放弃请求");
            runtime.abort_call(handle);
            runtime.shutdown();
            return Err(anyhow!("no result within {}s", cli.max_wait_secs));
        }
        std::thread::sleep(tick);
    }

    let args = host.delivered.take().unwrap_or_default();
    println!("{}", encode_arguments_json(&args));
    runtime.shutdown();
    Ok(())
}

fn parse_args(raw: &str) -> Result<Vec<ArgValue>> {
    decode_arguments_json(raw).map_err(|e| anyhow!("arguments must be a JSON array: {e}"))
}

fn load_config(path: Option<&Path>, data_dir: Option<&Path>) -> Result<Config> {
    let cfg = match (path, data_dir) {
        (Some(p), _) => load_or_create::<Config>(Some(p)),
        (None, Some(dir)) => load_or_create_with_base::<Config>(None, Some(dir)),
        (None, None) => load_or_create::<Config>(None),
    };
    cfg.map_err(|e| anyhow!(e.to_string()))
}

fn init_logging(debug: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        ..LogOptions::default()
    };
    LogSystem::init_with_base(opts, base_dir).map_err(|e| anyhow!(e))
}
