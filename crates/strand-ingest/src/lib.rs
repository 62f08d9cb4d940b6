//! # strand-ingest
//!
//! Strand 录像回放引擎.
//!
//! 把磁盘上按时间切分的 FLV 录像分段拼接成一条连续的帧流, 交给下游
//! [`FrameSink`]:
//!
//! - [`naming`]: 分段文件名与起始时刻的互相转换
//! - [`catalog`]: 通道的录像目录
//! - [`sequencer`]: 按目录顺序打开分段, 第一个分段做校正定位
//! - [`reader`]: 关键帧门控、瞬时错误重试、序列头派生
//! - [`dispatcher`]: 会话入口 [`MediaReader`], 处理 sink 背压
//! - [`pool`]: 零拷贝页池

pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod naming;
pub mod pool;
pub mod reader;
pub mod sequencer;
pub mod sink;

#[cfg(test)]
mod testing;

pub use catalog::{Catalog, RecordingSegment};
pub use config::IngestConfig;
pub use dispatcher::{MediaReader, ReadFrameResult, ReaderStats};
pub use naming::SegmentName;
pub use pool::{PageList, PagePool};
pub use reader::{Frame, FrameReader, FrameKind, StreamKind};
pub use sequencer::{SegmentSequencer, SequencerState};
pub use sink::{AudioFrameType, AudioMessage, FrameSink, SinkOutcome, VideoFrameType, VideoMessage};
