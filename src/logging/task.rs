//! 日志维护任务: 零点切换当天文件, 压缩历史日志, 删除过期日志.

use super::{LoggingConfig, build_current_log_path};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDate, TimeZone, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{debug, error};

pub(super) fn spawn_log_maintenance_task(config: LoggingConfig, rotate_requested: Arc<AtomicBool>) {
    tokio::spawn(async move {
        let period = Duration::from_secs(config.cleanup_interval_seconds.max(1));
        let mut cleanup_interval = tokio::time::interval(period);

        if let Err(err) = touch_current_log(&config) {
            error!("初始化当前日志文件失败: {err:#}");
        }

        let mut next_rollover_at = next_rollover_instant(Local::now());
        loop {
            tokio::select! {
                _ = cleanup_interval.tick() => {
                    if let Err(err) = cleanup_logs(&config, Local::now().date_naive()) {
                        error!("清理日志失败: {err:#}");
                    }
                }
                _ = tokio::time::sleep_until(next_rollover_at) => {
                    match touch_current_log(&config) {
                        Ok(()) => rotate_requested.store(true, Ordering::Release),
                        Err(err) => error!("日志切换失败: {err:#}"),
                    }
                    if let Err(err) = cleanup_logs(&config, Local::now().date_naive()) {
                        error!("切换后清理日志失败: {err:#}");
                    }
                    next_rollover_at = next_rollover_instant(Local::now());
                }
            }
        }
    });
}

/// 确保当天日志文件存在
fn touch_current_log(config: &LoggingConfig) -> Result<()> {
    let directory = Path::new(&config.directory);
    fs::create_dir_all(directory)?;
    let path = build_current_log_path(directory, &config.file_prefix, Local::now().date_naive());
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("创建当天日志文件失败, path={}", path.display()))?;
    Ok(())
}

/// 删除早于保留期的日志, 压缩 `today` 之前未压缩的日志
fn cleanup_logs(config: &LoggingConfig, today: NaiveDate) -> Result<()> {
    let directory = Path::new(&config.directory);
    if !directory.exists() {
        return Ok(());
    }
    let cutoff = today - ChronoDuration::days(config.retention_days);

    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let Some((date, compressed)) = parse_log_file_name(&file_name, &config.file_prefix) else {
            continue;
        };

        let path = entry.path();
        if date < cutoff {
            debug!("删除过期日志 {}", path.display());
            if let Err(err) = fs::remove_file(&path) {
                error!("删除过期日志失败, path={}: {err}", path.display());
            }
        } else if config.compress_history && !compressed && date < today {
            if let Err(err) = compress_to_gz(&path) {
                error!("压缩日志失败: {err:#}");
            }
        }
    }
    Ok(())
}

fn compress_to_gz(path: &Path) -> Result<()> {
    let gz_path = PathBuf::from(format!("{}.gz", path.display()));
    if gz_path.exists() {
        return Ok(());
    }

    let mut input =
        File::open(path).with_context(|| format!("打开待压缩日志失败, path={}", path.display()))?;
    let output = File::create(&gz_path)
        .with_context(|| format!("创建压缩日志失败, path={}", gz_path.display()))?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;

    fs::remove_file(path).with_context(|| format!("删除已压缩日志失败, path={}", path.display()))?;
    Ok(())
}

/// 解析 `{prefix}.{YYYY-MM-DD}.log[.gz]`, 返回 (日期, 是否已压缩)
fn parse_log_file_name(file_name: &str, prefix: &str) -> Option<(NaiveDate, bool)> {
    let rest = file_name.strip_prefix(prefix)?.strip_prefix('.')?;
    let (date_part, compressed) = match rest.strip_suffix(".log.gz") {
        Some(date_part) => (date_part, true),
        None => (rest.strip_suffix(".log")?, false),
    };
    if date_part.len() != 10 {
        return None;
    }
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
    Some((date, compressed))
}

/// 下一个本地零点对应的 tokio 时刻, 无法换算时一秒后重试
fn next_rollover_instant(now: DateTime<Local>) -> tokio::time::Instant {
    let wait = (now.date_naive() + ChronoDuration::days(1))
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
        .map(|next| SystemTime::from(next.with_timezone(&Utc)))
        .map(|at| at.duration_since(SystemTime::now()).unwrap_or(Duration::ZERO))
        .unwrap_or(Duration::from_secs(1));
    tokio::time::Instant::now() + wait
}
