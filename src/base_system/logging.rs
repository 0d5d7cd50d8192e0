//! 日志系统：控制台 + 文件双输出，退出或过大时归档为 zip。
//!
//! 目录结构：`<base>/logs/latest.log` 为当前日志，`<base>/logs/log_<时间戳>.zip` 为归档。

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::{io, panic, thread, time::Duration};

use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{error, info};
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use zip::CompressionMethod;
use zip::write::FileOptions;

const LATEST_LOG: &str = "latest.log";
const ARCHIVE_PREFIX: &str = "log_";
const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
// Windows 上文件句柄释放需要一点时间
const ARCHIVE_WAIT_MS: u64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("logging already initialized")]
    AlreadyInitialized,
    #[error("subscriber init failed: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("time formatting failed: {0}")]
    Time(#[from] time::error::Format),
}

#[derive(Clone, Copy, Debug)]
pub struct LogOptions {
    pub debug: bool,
    pub use_color: bool,
    pub archive_on_exit: bool,
    /// 关闭后只写文件（例如 stdout/stderr 被调用方占用时）。
    pub console: bool,
    /// 保留的归档数量上限，0 表示不清理。
    pub keep_archives: usize,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            debug: false,
            use_color: true,
            archive_on_exit: !cfg!(feature = "docker"),
            console: true,
            keep_archives: 20,
        }
    }
}

impl LogOptions {
    fn console_level(&self) -> LevelFilter {
        if self.debug {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        }
    }
}

/// 日志目录里的当前日志与归档。
#[derive(Debug, Clone)]
struct LogArchive {
    dir: PathBuf,
}

impl LogArchive {
    fn new(base_dir: Option<&Path>) -> Self {
        let dir = base_dir
            .map(|d| d.join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"));
        Self { dir }
    }

    fn latest(&self) -> PathBuf {
        self.dir.join(LATEST_LOG)
    }

    /// 上次运行留下的日志过大时先归档，新进程从空文件开始写。
    fn rotate_if_large(&self) -> Result<Option<PathBuf>, LogError> {
        match fs::metadata(self.latest()) {
            Ok(meta) if meta.len() >= MAX_LOG_BYTES => self.archive_latest(),
            _ => Ok(None),
        }
    }

    /// 把 `latest.log` 压缩成带时间戳的 zip；空日志直接删除。
    fn archive_latest(&self) -> Result<Option<PathBuf>, LogError> {
        let latest = self.latest();
        let len = match fs::metadata(&latest) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if len == 0 {
            let _ = fs::remove_file(&latest);
            return Ok(None);
        }

        let stamp = OffsetDateTime::now_utc().format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))?;
        let archive_path = self.dir.join(format!("{ARCHIVE_PREFIX}{stamp}.zip"));

        // 先复制再压缩，写入端可能仍持有 latest.log
        let snapshot = self.dir.join(format!("temp_{stamp}.log"));
        fs::copy(&latest, &snapshot)?;
        let written = write_zip(&snapshot, &archive_path, &format!("{stamp}.log"));
        let _ = fs::remove_file(&snapshot);
        written?;

        let _ = fs::remove_file(&latest);
        Ok(Some(archive_path))
    }

    /// 按文件名（时间戳）排序，只保留最新的 `keep` 个归档。
    fn prune(&self, keep: usize) -> Result<usize, LogError> {
        if keep == 0 {
            return Ok(0);
        }
        let mut archives: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| is_archive(p))
            .collect();
        if archives.len() <= keep {
            return Ok(0);
        }
        archives.sort();
        let excess = archives.len() - keep;
        for old in &archives[..excess] {
            fs::remove_file(old)?;
        }
        Ok(excess)
    }
}

fn is_archive(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "zip")
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(ARCHIVE_PREFIX))
}

fn write_zip(source: &Path, target: &Path, entry_name: &str) -> Result<(), LogError> {
    let mut zip = zip::ZipWriter::new(File::create(target)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(entry_name, options)?;
    io::copy(&mut File::open(source)?, &mut zip)?;
    zip.finish()?;
    Ok(())
}

/// 持有文件写入线程的 guard；drop 或收到中断/panic 时冲刷并归档。
pub struct LogSystem {
    shutdown: Arc<LogShutdown>,
}

impl LogSystem {
    /// 日志目录为 `<base_dir>/logs`，未指定时使用当前目录。
    pub fn init_with_base(options: LogOptions, base_dir: Option<&Path>) -> Result<Self, LogError> {
        let archive = LogArchive::new(base_dir);
        fs::create_dir_all(&archive.dir)?;
        archive.rotate_if_large()?;
        archive.prune(options.keep_archives)?;

        let (file_writer, guard) = NonBlockingBuilder::default()
            .lossy(false)
            .finish(rolling::never(&archive.dir, LATEST_LOG));

        // 结果 JSON 走 stdout，控制台日志只能写 stderr
        let console_writer = if options.console {
            BoxMakeWriter::new(io::stderr)
        } else {
            BoxMakeWriter::new(io::sink)
        };
        let console_layer = fmt::layer()
            .with_target(false)
            .with_thread_names(true)
            .with_ansi(options.use_color)
            .with_writer(console_writer)
            .with_filter(options.console_level());
        let file_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_ansi(false)
            .with_writer(file_writer)
            .with_filter(LevelFilter::TRACE);

        tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .map_err(|e| {
                if e.to_string().contains("global") {
                    LogError::AlreadyInitialized
                } else {
                    LogError::SubscriberInit(e)
                }
            })?;

        let shutdown = Arc::new(LogShutdown {
            archive,
            guard: Mutex::new(Some(guard)),
            done: AtomicBool::new(false),
            archive_on_exit: options.archive_on_exit,
        });
        shutdown.install_signal_handler();
        shutdown.install_panic_hook();

        Ok(Self { shutdown })
    }
}

impl Drop for LogSystem {
    fn drop(&mut self) {
        self.shutdown.run();
    }
}

struct LogShutdown {
    archive: LogArchive,
    guard: Mutex<Option<WorkerGuard>>,
    done: AtomicBool,
    archive_on_exit: bool,
}

impl LogShutdown {
    fn install_signal_handler(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let _ = ctrlc::set_handler(move || {
            info!("收到中断信号，正在退出");
            this.run();
            std::process::exit(130);
        });
    }

    fn install_panic_hook(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            match info.location() {
                Some(at) => error!("panic at {}:{}: {info}", at.file(), at.line()),
                None => error!("panic: {info}"),
            }
            this.run();
            previous(info);
        }));
    }

    /// 只执行一次：冲刷文件写入线程，然后按需归档。
    fn run(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut guard) = self.guard.lock() {
            guard.take();
        }
        if !self.archive_on_exit {
            return;
        }
        thread::sleep(Duration::from_millis(ARCHIVE_WAIT_MS));
        if let Err(err) = self.archive.archive_latest() {
            eprintln!("failed to archive log: {err}");
        }
    }
}
