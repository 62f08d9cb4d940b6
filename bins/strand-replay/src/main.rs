//! strand-replay - 录像回放命令行工具
//!
//! 把一个通道的录像 (或单个录像文件) 回放进统计 sink, 结束后打印摘要.
//! 收到 `BurstLimit` 后暂停片刻再重新进入, 模拟下游调度器的节奏.

mod stats;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, warn};

use strand::logging::{self, LoggingConfig};
use strand_ingest::{Catalog, IngestConfig, MediaReader, PagePool, ReadFrameResult};

use stats::{ReplaySummary, StatsSink};

/// 两轮突发之间的间隔
const BURST_PAUSE: Duration = Duration::from_millis(10);

/// Strand 录像回放工具
#[derive(Parser, Debug)]
#[command(name = "strand-replay", version, about = "录像回放帧接入工具")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON 配置文件 (ingest / logging / catalog / recordings_root)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 下游突发字节上限, 覆盖配置文件 (0 表示不限制)
    #[arg(long, global = true)]
    burst_limit: Option<usize>,

    /// 以 JSON 输出摘要
    #[arg(long, global = true)]
    json: bool,

    /// 日志级别 (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 从指定时刻开始回放一个通道
    Channel {
        /// 录像根目录, 未指定时使用配置文件中的 catalog 或 recordings_root
        #[arg(long)]
        root: Option<PathBuf>,

        /// 通道名
        #[arg(long)]
        channel: String,

        /// 起始时刻 (Unix 秒)
        #[arg(long)]
        start: u64,
    },
    /// 传输单个录像文件
    File {
        /// 文件路径
        path: PathBuf,
    },
}

/// 配置文件内容
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReplayConfig {
    ingest: IngestConfig,
    logging: LoggingConfig,
    catalog: Option<Catalog>,
    recordings_root: Option<PathBuf>,
}

fn load_config(path: Option<&Path>) -> Result<ReplayConfig> {
    let Some(path) = path else {
        return Ok(ReplayConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("读取配置文件失败, path={}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("解析配置文件失败, path={}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(limit) = cli.burst_limit {
        config.ingest.burst_size_limit = limit;
    }

    let logging_config = LoggingConfig {
        file_prefix: "strand-replay".to_string(),
        ..config.logging.clone()
    };
    logging::init(logging_config.with_verbosity(cli.verbose))?;
    info!("strand-replay {}", strand::version());

    let pool = Arc::new(PagePool::new(config.ingest.page_size));
    let reader = match &cli.command {
        Command::Channel {
            root,
            channel,
            start,
        } => {
            let catalog = match (root, &config.catalog, &config.recordings_root) {
                (Some(root), _, _) | (None, None, Some(root)) => {
                    Catalog::scan_dir(root, channel, &config.ingest.file_extension)
                        .with_context(|| format!("扫描录像目录失败, root={}", root.display()))?
                }
                (None, Some(catalog), _) => catalog.clone(),
                (None, None, None) => bail!("必须通过 --root 或配置文件指定录像目录"),
            };
            info!("通道 {channel}: 目录共 {} 个分段", catalog.len());
            MediaReader::channel(pool, catalog, channel.as_str(), *start, config.ingest.clone())?
        }
        Command::File { path } => MediaReader::single_file(pool, path, config.ingest.clone())?,
    };

    let reader = Arc::new(reader);
    let sink = StatsSink::new(reader.burst_size_limit());
    let summary = replay(Arc::clone(&reader), sink).await?;

    let stats = reader.stats();
    info!(
        "会话 {} 结束: {} 个分段, {} 字节",
        reader.stream_name(),
        stats.segments_opened,
        stats.bytes_delivered
    );
    print_summary(&summary, cli.json)
}

/// 反复进入投递循环, 直到会话结束
async fn replay(reader: Arc<MediaReader>, mut sink: StatsSink) -> Result<ReplaySummary> {
    loop {
        let session = Arc::clone(&reader);
        let (result, returned) = tokio::task::spawn_blocking(move || {
            let result = session.read_more_data(&mut sink);
            (result, sink)
        })
        .await
        .context("回放任务异常退出")?;
        sink = returned;

        match result {
            ReadFrameResult::BurstLimit => {
                sink.start_burst();
                tokio::time::sleep(BURST_PAUSE).await;
            }
            ReadFrameResult::Finish | ReadFrameResult::NoData => {
                return Ok(sink.into_summary());
            }
            ReadFrameResult::Error => {
                warn!("会话 {} 失败", reader.stream_name());
                bail!("回放失败, 已投递 {} 字节", sink.summary().bytes);
            }
        }
    }
}

fn print_summary(summary: &ReplaySummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!(
        "视频: {} 关键帧, {} 非关键帧, {} 序列头",
        summary.key_frames, summary.inter_frames, summary.video_headers
    );
    println!(
        "音频: {} 帧, {} 序列头",
        summary.audio_frames, summary.audio_headers
    );
    println!("字节: {}, 突发轮数: {}", summary.bytes, summary.bursts + 1);
    if let (Some(first), Some(last)) = (
        summary.first_timestamp_nanos,
        summary.last_timestamp_nanos,
    ) {
        println!(
            "时间: {first} ns .. {last} ns ({:.3} 秒)",
            summary.span_seconds()
        );
    }
    if let Some(codec) = &summary.video_codec {
        println!("视频编码: {codec}");
    }
    if let Some(codec) = &summary.audio_codec {
        println!("音频编码: {codec}");
    }
    Ok(())
}
