//! # Strand
//!
//! 纯 Rust 实现的录像回放帧接入核心.
//!
//! Strand 把一个通道按时间切分的录像文件拼接成一条连续的音视频帧流,
//! 在下游分发管线的流控之下逐帧投递:
//! - **码流参数**: H.264 Annex-B 与 avcC 配置记录互转
//! - **容器格式**: FLV 解封装, 按秒定位
//! - **回放会话**: 分段拼接, 关键帧门控, 序列头变化检测, 背压感知投递
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use strand::ingest::{
//!     AudioMessage, Catalog, FrameSink, IngestConfig, MediaReader, PagePool, ReadFrameResult,
//!     SinkOutcome, VideoMessage,
//! };
//!
//! struct Discard;
//!
//! impl FrameSink for Discard {
//!     fn video_frame(&mut self, _msg: &VideoMessage<'_>) -> SinkOutcome {
//!         SinkOutcome::Success
//!     }
//!     fn audio_frame(&mut self, _msg: &AudioMessage<'_>) -> SinkOutcome {
//!         SinkOutcome::Success
//!     }
//! }
//!
//! let catalog = Catalog::scan_dir("recordings".as_ref(), "cam1", "flv")?;
//! let reader = MediaReader::channel(
//!     Arc::new(PagePool::default()),
//!     catalog,
//!     "cam1",
//!     1_700_000_000,
//!     IngestConfig::default(),
//! )?;
//! let mut sink = Discard;
//! while reader.read_more_data(&mut sink) == ReadFrameResult::BurstLimit {}
//! # Ok::<(), strand::core::StrandError>(())
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `strand-core` | 核心类型与工具 |
//! | `strand-codec` | 编码标识, 数据包, H.264 参数集转换 |
//! | `strand-format` | 容器格式框架 |
//! | `strand-ingest` | 录像回放会话 |

/// 核心类型与工具 (对标 libavutil)
pub use strand_core as core;

/// 码流参数转换 (对标 libavcodec 的 bitstream filter)
pub use strand_codec as codec;

/// 容器格式框架 (对标 libavformat)
pub use strand_format as format;

/// 录像回放会话
pub use strand_ingest as ingest;

pub mod logging;

/// 获取 Strand 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
