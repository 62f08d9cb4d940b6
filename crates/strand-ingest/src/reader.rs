//! 帧读取器.
//!
//! 每次调用从当前分段取出一帧, 负责:
//! - 瞬时错误原地重试 (固定间隔, 不限次数)
//! - 关键帧门控: 首个视频关键帧之前的视频非关键帧与音频帧全部丢弃;
//!   通道没有视频流时, 第一个数据包直接打开门控
//! - 序列头比对: extradata 与缓存不同时派生新的序列头随帧一起输出
//!
//! 门控与流描述在整个会话内保持, 跨分段切换不会重新关闭门控.

use std::thread;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info, trace, warn};
use strand_codec::parsers::h264::build_config_record;
use strand_codec::{CodecId, Packet};
use strand_core::{MediaType, StrandError, StrandResult};
use strand_format::{FormatContext, Stream};

/// 流的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// 不转发的流 (编解码器不可识别或非音视频)
    None,
    /// 视频
    Video,
    /// 音频
    Audio,
}

/// 序列头的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    /// AVC 配置记录
    AvcSequenceHeader,
    /// AAC AudioSpecificConfig
    AacSequenceHeader,
    /// Speex 头
    SpeexHeader,
}

/// 随帧输出的序列头
#[derive(Debug, Clone)]
pub struct FrameHeader {
    /// 序列头字节
    pub data: Bytes,
    /// 种类
    pub kind: HeaderKind,
}

/// 帧类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// 视频关键帧
    KeyFrame,
    /// 视频非关键帧
    InterFrame,
    /// 音频帧
    RawAudio,
}

/// 单条流的描述与序列头缓存
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    kind: StreamKind,
    codec_id: CodecId,
    /// 上一次见到的原始 extradata
    extra_data: Vec<u8>,
    /// 由 extradata 派生的序列头
    header: Option<Bytes>,
}

impl StreamDescriptor {
    /// 根据流信息分类
    pub fn from_stream(stream: &Stream) -> Self {
        let kind = match stream.media_type {
            _ if !stream.is_usable() => StreamKind::None,
            MediaType::Video => StreamKind::Video,
            MediaType::Audio => StreamKind::Audio,
            MediaType::Data => StreamKind::None,
        };
        Self {
            kind,
            codec_id: stream.codec_id,
            extra_data: Vec::new(),
            header: None,
        }
    }

    /// 流分类
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// 编解码器
    pub fn codec_id(&self) -> CodecId {
        self.codec_id
    }

    /// 当前缓存的序列头
    pub fn cached_header(&self) -> Option<&Bytes> {
        self.header.as_ref()
    }

    /// 比对 extradata, 变化时派生新序列头
    ///
    /// 派生失败只影响本帧: 帧照常输出, 不带序列头.
    fn update_header(&mut self, extra_data: &[u8]) -> Option<FrameHeader> {
        if extra_data.is_empty() || extra_data == self.extra_data.as_slice() {
            return None;
        }
        self.extra_data = extra_data.to_vec();

        let derived = match (self.kind, self.codec_id) {
            (StreamKind::Video, CodecId::H264) => match build_config_record(extra_data) {
                Ok(record) => Some((Bytes::from(record), HeaderKind::AvcSequenceHeader)),
                Err(e) => {
                    warn!("构造 AVC 序列头失败, 本帧不带序列头: {e}");
                    None
                }
            },
            (StreamKind::Audio, CodecId::Aac) => Some((
                Bytes::copy_from_slice(extra_data),
                HeaderKind::AacSequenceHeader,
            )),
            (StreamKind::Audio, CodecId::Speex) => {
                Some((Bytes::copy_from_slice(extra_data), HeaderKind::SpeexHeader))
            }
            _ => None,
        };

        self.header = derived.as_ref().map(|(data, _)| data.clone());
        derived.map(|(data, kind)| {
            debug!("{} 序列头已变化, {} 字节", self.codec_id, data.len());
            FrameHeader { data, kind }
        })
    }

    fn clear(&mut self) {
        self.extra_data.clear();
        self.header = None;
    }

    fn same_layout(&self, other: &Self) -> bool {
        self.kind == other.kind && self.codec_id == other.codec_id
    }
}

/// 读出的一帧
///
/// 负载引用解封装器产出的数据包, 必须交回 [`FrameReader::free_frame`] 释放.
#[derive(Debug)]
#[must_use = "帧必须通过 FrameReader::free_frame 释放"]
pub struct Frame {
    /// 流分类 (Video 或 Audio)
    pub stream_kind: StreamKind,
    /// 所属流索引
    pub stream_index: usize,
    /// 时间轴上的时间戳 (纳秒)
    pub timestamp_nanos: u64,
    /// 编解码器
    pub codec_id: CodecId,
    /// 帧类型
    pub kind: FrameKind,
    /// 序列头 (仅在 extradata 变化时存在)
    pub header: Option<FrameHeader>,
    packet: Packet,
}

impl Frame {
    /// 帧负载
    pub fn payload(&self) -> &Bytes {
        &self.packet.data
    }
}

/// 帧读取器
pub struct FrameReader {
    input: Option<FormatContext>,
    /// 当前分段的起始时刻 (纳秒)
    epoch_nanos: u64,
    descriptors: Vec<StreamDescriptor>,
    has_video: bool,
    gate_open: bool,
    backoff: Duration,
    outstanding: usize,
}

impl FrameReader {
    /// 创建读取器, `backoff` 为瞬时错误的重试间隔
    pub fn new(backoff: Duration) -> Self {
        Self {
            input: None,
            epoch_nanos: 0,
            descriptors: Vec::new(),
            has_video: false,
            gate_open: false,
            backoff,
            outstanding: 0,
        }
    }

    /// 接入新打开的分段
    ///
    /// 流布局与上一分段一致时沿用序列头缓存, 否则重建.
    /// 没有任何可识别的音视频流时返回 `Format` 错误, 分段随之关闭.
    pub fn attach(&mut self, input: FormatContext, epoch_nanos: u64) -> StrandResult<()> {
        let fresh: Vec<StreamDescriptor> =
            input.streams().iter().map(StreamDescriptor::from_stream).collect();
        let usable = fresh.iter().filter(|d| d.kind != StreamKind::None).count();
        if usable == 0 {
            return Err(StrandError::Format(format!(
                "{}: 没有可用的音视频流",
                input.filename()
            )));
        }

        let same_layout = fresh.len() == self.descriptors.len()
            && fresh
                .iter()
                .zip(&self.descriptors)
                .all(|(a, b)| a.same_layout(b));
        if !same_layout {
            self.descriptors = fresh;
        }
        self.has_video = self.descriptors.iter().any(|d| d.kind == StreamKind::Video);

        info!(
            "接入分段 {}: {usable} 个可用流, 起始 {epoch_nanos} ns",
            input.filename()
        );
        self.input = Some(input);
        self.epoch_nanos = epoch_nanos;
        Ok(())
    }

    /// 关闭当前分段
    pub fn detach(&mut self) -> Option<FormatContext> {
        self.input.take()
    }

    /// 是否有打开的分段
    pub fn is_attached(&self) -> bool {
        self.input.is_some()
    }

    /// 门控是否已打开
    pub fn gate_open(&self) -> bool {
        self.gate_open
    }

    /// 各流描述
    pub fn stream_descriptors(&self) -> &[StreamDescriptor] {
        &self.descriptors
    }

    /// 尚未释放的帧数量
    pub fn outstanding_frames(&self) -> usize {
        self.outstanding
    }

    /// 读取下一帧
    ///
    /// 返回 `None` 表示当前分段结束 (正常结束或硬错误), 由调用方切换分段.
    pub fn read_next(&mut self) -> Option<Frame> {
        let input = self.input.as_mut()?;

        loop {
            let packet = match input.read_packet() {
                Ok(p) => p,
                Err(e) if e.is_transient() => {
                    trace!("{}: 数据暂不可用, {:?} 后重试", input.filename(), self.backoff);
                    thread::sleep(self.backoff);
                    continue;
                }
                Err(StrandError::Eof) => {
                    debug!("{}: 到达文件末尾", input.filename());
                    return None;
                }
                Err(e) => {
                    warn!("{}: 读取失败, 结束本分段: {e}", input.filename());
                    return None;
                }
            };

            let idx = packet.stream_index;
            // 解封装器可能在文件中途发现新的流
            if idx >= self.descriptors.len() {
                let streams = input.streams();
                for stream in streams.iter().skip(self.descriptors.len()) {
                    self.descriptors.push(StreamDescriptor::from_stream(stream));
                }
                self.has_video = self.descriptors.iter().any(|d| d.kind == StreamKind::Video);
            }
            let Some(descriptor) = self.descriptors.get_mut(idx) else {
                trace!("丢弃未知流 #{idx} 的数据包");
                continue;
            };

            let stream_kind = descriptor.kind;
            if stream_kind == StreamKind::None {
                trace!("丢弃流 #{idx} 的数据包");
                continue;
            }

            if !self.gate_open {
                if stream_kind == StreamKind::Video && packet.is_keyframe {
                    debug!("收到首个视频关键帧, pts={}", packet.pts);
                    self.gate_open = true;
                } else if !self.has_video {
                    debug!("通道没有视频流, 首个数据包直接放行");
                    self.gate_open = true;
                } else {
                    trace!("等待关键帧, 丢弃流 #{idx} pts={}", packet.pts);
                    continue;
                }
            }

            let header = input
                .streams()
                .get(idx)
                .and_then(|s| descriptor.update_header(&s.extra_data));

            let kind = match stream_kind {
                StreamKind::Video if packet.is_keyframe => FrameKind::KeyFrame,
                StreamKind::Video => FrameKind::InterFrame,
                _ => FrameKind::RawAudio,
            };
            let timestamp_nanos = self
                .epoch_nanos
                .saturating_add_signed(packet.timestamp().to_nanos());

            trace!(
                "读出帧: 流 #{idx} {kind:?} ts={timestamp_nanos} 负载 {} 字节, 序列头 {}",
                packet.size(),
                header.as_ref().map_or(0, |h| h.data.len()),
            );
            self.outstanding += 1;
            return Some(Frame {
                stream_kind,
                stream_index: idx,
                timestamp_nanos,
                codec_id: descriptor.codec_id,
                kind,
                header,
                packet,
            });
        }
    }

    /// 释放一帧
    pub fn free_frame(&mut self, frame: Frame) {
        drop(frame);
        self.outstanding = self.outstanding.saturating_sub(1);
    }

    /// 丢弃所有缓存的序列头, 之后出现的 extradata 会重新派生
    pub fn release_headers(&mut self) {
        for descriptor in &mut self.descriptors {
            descriptor.clear();
        }
    }
}
