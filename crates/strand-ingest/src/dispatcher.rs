//! 帧分发器 (`MediaReader` 会话).
//!
//! `read_more_data` 驱动 "读帧 → 打包 → 投递" 循环, 直到需要停止
//! (见 [`ReadFrameResult`]). 循环在调用线程上同步执行,
//! `BurstLimit` 之后何时重新进入由外部调度器决定.
//!
//! 会话状态放在互斥锁内, 只在取帧与释放帧时持有; 投递给 sink 期间不持锁,
//! sink 可在回调中调用 `stats()` 或 `release_sequence_headers()`.
//! 统计单独加锁.
//!
//! 两种模式共用同一条流水线:
//! - 通道回放: 经 [`SegmentSequencer`] 拼接多个分段
//! - 单文件传输: 只打开一个指定文件, 时间戳为文件自身的时间, 读完即止

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};
use strand_core::StrandResult;
use strand_format::FormatContext;

use crate::catalog::Catalog;
use crate::config::IngestConfig;
use crate::pool::PagePool;
use crate::reader::{Frame, FrameKind, FrameReader, HeaderKind, StreamKind};
use crate::sequencer::SegmentSequencer;
use crate::sink::{AudioFrameType, AudioMessage, FrameSink, SinkOutcome, VideoFrameType, VideoMessage};

/// `read_more_data` 的结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFrameResult {
    /// sink 本轮突发已满, 可稍后再次调用继续
    BurstLimit,
    /// sink 主动结束会话
    Finish,
    /// 没有更多数据
    NoData,
    /// 会话失败
    Error,
}

/// 会话统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// 已投递的视频帧
    pub video_frames: u64,
    /// 已投递的音频帧
    pub audio_frames: u64,
    /// 已投递的序列头
    pub header_frames: u64,
    /// 已投递的字节数 (负载与序列头)
    pub bytes_delivered: u64,
    /// 已打开的分段数
    pub segments_opened: u64,
    /// 单文件模式下的文件大小
    pub total_size: Option<u64>,
}

enum Mode {
    Channel(SegmentSequencer),
    SingleFile { path: PathBuf, done: bool },
}

struct Session {
    mode: Mode,
    reader: FrameReader,
    /// 会话级失败后不再产出数据
    failed: bool,
}

/// 一个回放会话
pub struct MediaReader {
    pool: Arc<PagePool>,
    stream_name: String,
    config: IngestConfig,
    session: Mutex<Session>,
    stats: Mutex<ReaderStats>,
}

impl MediaReader {
    /// 通道回放会话
    ///
    /// 立即定位起始分段但不打开文件; 没有分段覆盖 `start_unixtime_sec`
    /// 时返回 `Configuration` 错误.
    pub fn channel(
        pool: Arc<PagePool>,
        catalog: Catalog,
        stream_name: impl Into<String>,
        start_unixtime_sec: u64,
        config: IngestConfig,
    ) -> StrandResult<Self> {
        config.validate()?;
        strand_format::init();

        let stream_name = stream_name.into();
        let mut sequencer =
            SegmentSequencer::new(catalog, start_unixtime_sec, config.file_extension.clone());
        sequencer.initialize()?;

        info!(
            "会话 {stream_name}: 通道回放, 起始 {start_unixtime_sec}, burst_size_limit={}",
            config.burst_size_limit
        );
        Ok(Self::with_mode(pool, stream_name, config, Mode::Channel(sequencer)))
    }

    /// 单文件传输会话, 文件在首次 `read_more_data` 时打开
    pub fn single_file(
        pool: Arc<PagePool>,
        path: impl Into<PathBuf>,
        config: IngestConfig,
    ) -> StrandResult<Self> {
        config.validate()?;
        strand_format::init();

        let path = path.into();
        let stream_name = path.to_string_lossy().into_owned();
        info!("会话 {stream_name}: 单文件传输, burst_size_limit={}", config.burst_size_limit);
        Ok(Self::with_mode(
            pool,
            stream_name,
            config,
            Mode::SingleFile { path, done: false },
        ))
    }

    fn with_mode(pool: Arc<PagePool>, stream_name: String, config: IngestConfig, mode: Mode) -> Self {
        let reader = FrameReader::new(config.transient_backoff());
        Self {
            pool,
            stream_name,
            config,
            session: Mutex::new(Session {
                mode,
                reader,
                failed: false,
            }),
            stats: Mutex::new(ReaderStats::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats_mut(&self) -> MutexGuard<'_, ReaderStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 会话名
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// 下游突发字节上限 (0 表示不限制)
    pub fn burst_size_limit(&self) -> usize {
        self.config.burst_size_limit
    }

    /// 会话使用的页池
    pub fn page_pool(&self) -> &Arc<PagePool> {
        &self.pool
    }

    /// 统计快照
    pub fn stats(&self) -> ReaderStats {
        self.stats_mut().clone()
    }

    /// 读取并投递帧, 直到需要停止
    pub fn read_more_data(&self, sink: &mut dyn FrameSink) -> ReadFrameResult {
        let result = loop {
            let frame = match self.next_frame() {
                Ok(frame) => frame,
                Err(result) => break result,
            };

            let outcome = self.send_frame(&frame, sink);

            let mut session = self.lock();
            session.reader.free_frame(frame);
            match outcome {
                SinkOutcome::Success => {}
                SinkOutcome::BurstLimit => break ReadFrameResult::BurstLimit,
                SinkOutcome::Finish => break ReadFrameResult::Finish,
                SinkOutcome::Failure => {
                    warn!("会话 {}: sink 投递失败", self.stream_name);
                    self.teardown(&mut session);
                    break ReadFrameResult::Error;
                }
            }
        };
        debug!("会话 {}: 本轮结束, {result:?}", self.stream_name);
        result
    }

    /// 取下一帧, 必要时打开下一个输入; 无帧可取时返回停止原因
    fn next_frame(&self) -> Result<Frame, ReadFrameResult> {
        let mut session = self.lock();
        loop {
            if session.failed {
                return Err(ReadFrameResult::Error);
            }
            if !session.reader.is_attached() {
                match self.open_next(&mut session) {
                    Ok(true) => {}
                    Ok(false) => return Err(ReadFrameResult::NoData),
                    Err(e) => {
                        error!("会话 {}: {e}", self.stream_name);
                        self.teardown(&mut session);
                        return Err(ReadFrameResult::Error);
                    }
                }
            }

            if let Some(frame) = session.reader.read_next() {
                return Ok(frame);
            }
            session.reader.detach();
            if let Mode::SingleFile { done, .. } = &mut session.mode {
                *done = true;
                info!(
                    "会话 {}: 文件读完, 共投递 {} 字节",
                    self.stream_name,
                    self.stats_mut().bytes_delivered
                );
                return Err(ReadFrameResult::NoData);
            }
        }
    }

    /// 打开下一个输入, 返回 false 表示没有更多输入
    fn open_next(&self, session: &mut Session) -> StrandResult<bool> {
        match &mut session.mode {
            Mode::Channel(sequencer) => {
                let Some(opened) = sequencer.advance()? else {
                    return Ok(false);
                };
                session.reader.attach(opened.input, opened.epoch_nanos)?;
            }
            Mode::SingleFile { path, done } => {
                if *done {
                    return Ok(false);
                }
                let input = FormatContext::open_input(&*path)?;
                self.stats_mut().total_size = input.file_size();
                session.reader.attach(input, 0)?;
            }
        }
        self.stats_mut().segments_opened += 1;
        Ok(true)
    }

    /// 投递一帧: 先序列头 (若有), 再负载
    ///
    /// 序列头返回 `Finish` 或失败时不再投递负载; 返回 `BurstLimit` 时
    /// 负载照常投递, 之后停止.
    fn send_frame(&self, frame: &Frame, sink: &mut dyn FrameSink) -> SinkOutcome {
        let mut burst_reached = false;

        if let Some(header) = &frame.header {
            let outcome = match (frame.stream_kind, header.kind) {
                (StreamKind::Video, HeaderKind::AvcSequenceHeader) => {
                    self.deliver_video(sink, frame, VideoFrameType::AvcSequenceHeader, &header.data)
                }
                (StreamKind::Audio, HeaderKind::AacSequenceHeader) => {
                    self.deliver_audio(sink, frame, AudioFrameType::AacSequenceHeader, &header.data)
                }
                (StreamKind::Audio, HeaderKind::SpeexHeader) => {
                    self.deliver_audio(sink, frame, AudioFrameType::SpeexHeader, &header.data)
                }
                (kind, header_kind) => {
                    error!("流类型 {kind:?} 不应带有 {header_kind:?}");
                    SinkOutcome::Failure
                }
            };
            {
                let mut stats = self.stats_mut();
                stats.header_frames += 1;
                stats.bytes_delivered += header.data.len() as u64;
            }

            match outcome {
                SinkOutcome::Success => {}
                SinkOutcome::BurstLimit => burst_reached = true,
                other => return other,
            }
        }

        let payload = frame.payload();
        let outcome = match frame.kind {
            FrameKind::KeyFrame => self.deliver_video(sink, frame, VideoFrameType::KeyFrame, payload),
            FrameKind::InterFrame => {
                self.deliver_video(sink, frame, VideoFrameType::InterFrame, payload)
            }
            FrameKind::RawAudio => self.deliver_audio(sink, frame, AudioFrameType::RawData, payload),
        };
        {
            let mut stats = self.stats_mut();
            match frame.stream_kind {
                StreamKind::Video => stats.video_frames += 1,
                _ => stats.audio_frames += 1,
            }
            stats.bytes_delivered += payload.len() as u64;
        }

        if burst_reached && outcome == SinkOutcome::Success {
            SinkOutcome::BurstLimit
        } else {
            outcome
        }
    }

    fn deliver_video(
        &self,
        sink: &mut dyn FrameSink,
        frame: &Frame,
        frame_type: VideoFrameType,
        data: &bytes::Bytes,
    ) -> SinkOutcome {
        let pages = self.pool.get_referenced_pages(data);
        let msg = VideoMessage {
            timestamp_nanos: frame.timestamp_nanos,
            frame_type,
            codec_id: frame.codec_id,
            pool: &self.pool,
            pages: &pages,
            msg_len: data.len(),
            msg_offset: 0,
            prechunk_size: 0,
            is_saved_frame: false,
        };
        let outcome = sink.video_frame(&msg);
        self.pool.release_pages(pages);
        outcome
    }

    fn deliver_audio(
        &self,
        sink: &mut dyn FrameSink,
        frame: &Frame,
        frame_type: AudioFrameType,
        data: &bytes::Bytes,
    ) -> SinkOutcome {
        let pages = self.pool.get_referenced_pages(data);
        let msg = AudioMessage {
            timestamp_nanos: frame.timestamp_nanos,
            frame_type,
            codec_id: frame.codec_id,
            pool: &self.pool,
            pages: &pages,
            msg_len: data.len(),
            msg_offset: 0,
            prechunk_size: 0,
        };
        let outcome = sink.audio_frame(&msg);
        self.pool.release_pages(pages);
        outcome
    }

    /// 会话级失败时释放所有资源
    fn teardown(&self, session: &mut Session) {
        session.failed = true;
        session.reader.release_headers();
        if let Some(input) = session.reader.detach() {
            debug!("会话 {}: 关闭 {}", self.stream_name, input.filename());
        }
    }

    /// 释放缓存的序列头, 可从任意线程调用
    pub fn release_sequence_headers(&self) {
        let mut session = self.lock();
        session.reader.release_headers();
        debug!("会话 {}: 已释放序列头", self.stream_name);
    }
}

impl Drop for MediaReader {
    fn drop(&mut self) {
        let session = self.session.get_mut().unwrap_or_else(PoisonError::into_inner);
        session.reader.release_headers();
        session.reader.detach();
        let outstanding = session.reader.outstanding_frames();
        if outstanding != 0 {
            warn!("会话 {}: {outstanding} 帧未释放", self.stream_name);
        }
    }
}

impl std::fmt::Debug for MediaReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaReader")
            .field("stream_name", &self.stream_name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
impl MediaReader {
    /// 直接挂接一个已打开的输入, 按单文件模式运行
    fn from_input(pool: Arc<PagePool>, input: FormatContext, config: IngestConfig) -> Self {
        let mode = Mode::SingleFile {
            path: PathBuf::from(input.filename()),
            done: false,
        };
        let reader = Self::with_mode(pool, input.filename().to_string(), config, mode);
        reader.lock().reader.attach(input, 0).unwrap();
        reader
    }
}
