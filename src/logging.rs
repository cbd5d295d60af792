//! 日志初始化
//!
//! 控制台与文件双输出。文件按启动时间命名，超过大小上限时滚动为
//! `serve-folder.<启动时间>_N.log`，启动时清理超过保留天数的旧文件。

use crate::config::LogConfig;
use chrono::{Local, NaiveDate};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const LOG_FILE_PREFIX: &str = "serve-folder.";
const LOG_FILE_SUFFIX: &str = ".log";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

struct RotatingState {
    log_dir: PathBuf,
    /// 启动时间（YYYY-MM-DD-HHMMSS），同一进程的所有分片共用
    started_at: String,
    /// 0 为首个文件，之后依次递增
    index: u32,
    max_file_size: u64,
    written: u64,
    file: File,
}

impl RotatingState {
    fn file_path(log_dir: &Path, started_at: &str, index: u32) -> PathBuf {
        let name = if index == 0 {
            format!("{}{}{}", LOG_FILE_PREFIX, started_at, LOG_FILE_SUFFIX)
        } else {
            format!("{}{}_{}{}", LOG_FILE_PREFIX, started_at, index, LOG_FILE_SUFFIX)
        };
        log_dir.join(name)
    }

    fn open_file(path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }

    fn write_chunk(&mut self, buf: &[u8]) -> io::Result<usize> {
        // 空文件不滚动，超大的单条日志也要落盘
        if self.written > 0 && self.written + buf.len() as u64 > self.max_file_size {
            self.file.flush()?;
            self.index += 1;
            let path = Self::file_path(&self.log_dir, &self.started_at, self.index);
            self.file = Self::open_file(&path)?;
            self.written = 0;
        }

        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }
}

/// 按大小滚动的日志文件，可作为 `tracing_appender` 的写入目标
#[derive(Clone)]
pub struct RotatingLogFile {
    state: Arc<Mutex<RotatingState>>,
}

impl RotatingLogFile {
    pub fn create(log_dir: PathBuf, max_file_size: u64) -> io::Result<Self> {
        let started_at = Local::now().format("%Y-%m-%d-%H%M%S").to_string();
        let file = RotatingState::open_file(&RotatingState::file_path(&log_dir, &started_at, 0))?;

        Ok(Self {
            state: Arc::new(Mutex::new(RotatingState {
                log_dir,
                started_at,
                index: 0,
                max_file_size,
                written: 0,
                file,
            })),
        })
    }

    /// 当前正在写入的文件
    pub fn current_path(&self) -> PathBuf {
        let state = self.state.lock();
        RotatingState::file_path(&state.log_dir, &state.started_at, state.index)
    }
}

impl Write for RotatingLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.state.lock().write_chunk(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.state.lock().file.flush()
    }
}

/// 日志守卫，必须存活到进程结束，否则后台写入线程会提前退出
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// 初始化日志系统
pub fn init_logging(config: &LogConfig) -> LogGuard {
    // 环境变量 RUST_LOG 优先于配置
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .with_ansi(true);

    let file = if config.enabled {
        fs::create_dir_all(&config.log_dir)
            .and_then(|_| RotatingLogFile::create(config.log_dir.clone(), config.max_file_size))
            .map_err(|e| eprintln!("日志文件不可用: {:?}, 错误: {}，仅输出到控制台", config.log_dir, e))
            .ok()
    } else {
        None
    };

    let Some(file) = file else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
        info!("日志系统初始化完成（仅控制台输出）");
        return LogGuard { _file_guard: None };
    };

    let (writer, file_guard) = tracing_appender::non_blocking(file);
    let file_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .with_ansi(false)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(
        "日志系统初始化完成: 目录={:?}, 保留天数={}, 级别={}",
        config.log_dir, config.retention_days, config.level
    );

    let removed = cleanup_old_logs(&config.log_dir, config.retention_days, Local::now().date_naive());
    if removed > 0 {
        info!("已清理 {} 个过期日志文件", removed);
    }

    LogGuard {
        _file_guard: Some(file_guard),
    }
}

/// 删除早于保留期的日志文件，返回删除数量
///
/// 文件名中带日期的按日期判断，否则按修改时间判断
fn cleanup_old_logs(log_dir: &Path, retention_days: u32, today: NaiveDate) -> usize {
    let retention = chrono::Duration::days(retention_days as i64);

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("读取日志目录失败: {:?}, 错误: {}", log_dir, e);
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(filename) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if !path.is_file()
            || !filename.starts_with(LOG_FILE_PREFIX)
            || !filename.ends_with(LOG_FILE_SUFFIX)
        {
            continue;
        }

        let expired = match log_date(filename) {
            Some(date) => today.signed_duration_since(date) > retention,
            None => modified_before(&entry, retention),
        };
        if !expired {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                removed += 1;
                tracing::debug!("已删除过期日志文件: {:?}", path);
            }
            Err(e) => tracing::warn!("删除过期日志文件失败: {:?}, 错误: {}", path, e),
        }
    }
    removed
}

/// 从 `serve-folder.YYYY-MM-DD-HHMMSS[_N].log` 中取出日期
fn log_date(filename: &str) -> Option<NaiveDate> {
    let stem = filename
        .strip_prefix(LOG_FILE_PREFIX)?
        .strip_suffix(LOG_FILE_SUFFIX)?;
    let date = stem.get(..10)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn modified_before(entry: &fs::DirEntry, retention: chrono::Duration) -> bool {
    entry
        .metadata()
        .and_then(|m| m.modified())
        .map(|modified| {
            let modified: chrono::DateTime<chrono::Utc> = modified.into();
            chrono::Utc::now().signed_duration_since(modified) > retention
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_log_config() {
        let config = LogConfig::default();
        assert!(config.enabled);
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_log_date() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9);
        assert_eq!(log_date("serve-folder.2024-03-09-101500.log"), expected);
        assert_eq!(log_date("serve-folder.2024-03-09-101500_3.log"), expected);
        assert_eq!(log_date("other.2024-03-09-101500.log"), None);
        assert_eq!(log_date("serve-folder.garbage.log"), None);
    }

    #[test]
    fn test_rotation() {
        let temp_dir = TempDir::new().unwrap();
        let mut file = RotatingLogFile::create(temp_dir.path().to_path_buf(), 10).unwrap();
        let first = file.current_path();

        file.write_all(b"12345678").unwrap();
        file.write_all(b"abcdef").unwrap();
        file.flush().unwrap();

        let second = file.current_path();
        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with("_1.log"));
        assert_eq!(fs::read(&first).unwrap(), b"12345678");
        assert_eq!(fs::read(&second).unwrap(), b"abcdef");
    }

    #[test]
    fn test_cleanup_old_logs() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("serve-folder.2024-01-01-000000.log"), b"old").unwrap();
        fs::write(dir.join("serve-folder.2024-01-09-000000_2.log"), b"new").unwrap();
        fs::write(dir.join("unrelated.log"), b"keep").unwrap();

        let today = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        assert_eq!(cleanup_old_logs(dir, 7, today), 1);
        assert!(!dir.join("serve-folder.2024-01-01-000000.log").exists());
        assert!(dir.join("serve-folder.2024-01-09-000000_2.log").exists());
        assert!(dir.join("unrelated.log").exists());
    }
}
