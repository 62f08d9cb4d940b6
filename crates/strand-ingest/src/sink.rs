//! 下游 sink 接口.
//!
//! 每帧以一条或两条消息交给 sink (有序列头时先发序列头),
//! sink 通过返回值施加背压.

use std::fmt;

use strand_codec::CodecId;

use crate::pool::{PageList, PagePool};

/// sink 处理一条消息后的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOutcome {
    /// 继续投递
    Success,
    /// 本轮突发已满, 稍后重新进入
    BurstLimit,
    /// sink 主动结束会话
    Finish,
    /// 其他失败
    Failure,
}

/// 视频消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameType {
    /// 关键帧
    KeyFrame,
    /// 非关键帧
    InterFrame,
    /// AVC 序列头 (avcC)
    AvcSequenceHeader,
}

impl VideoFrameType {
    /// 是否为序列头
    pub fn is_sequence_header(self) -> bool {
        self == Self::AvcSequenceHeader
    }
}

/// 音频消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFrameType {
    /// 原始音频帧
    RawData,
    /// AAC 序列头 (AudioSpecificConfig)
    AacSequenceHeader,
    /// Speex 头
    SpeexHeader,
}

impl AudioFrameType {
    /// 是否为序列头
    pub fn is_sequence_header(self) -> bool {
        self != Self::RawData
    }
}

impl fmt::Display for VideoFrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::KeyFrame => "关键帧",
            Self::InterFrame => "非关键帧",
            Self::AvcSequenceHeader => "AVC 序列头",
        };
        write!(f, "{name}")
    }
}

impl fmt::Display for AudioFrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RawData => "音频帧",
            Self::AacSequenceHeader => "AAC 序列头",
            Self::SpeexHeader => "Speex 头",
        };
        write!(f, "{name}")
    }
}

/// 视频消息
///
/// 页列表只在回调期间有效; 需要继续持有时调用 `pool.retain(pages)`.
#[derive(Debug)]
pub struct VideoMessage<'a> {
    /// 时间轴上的时间戳 (纳秒)
    pub timestamp_nanos: u64,
    /// 消息类型
    pub frame_type: VideoFrameType,
    /// 编解码器
    pub codec_id: CodecId,
    /// 页所属的池
    pub pool: &'a PagePool,
    /// 负载页
    pub pages: &'a PageList,
    /// 消息长度 (字节)
    pub msg_len: usize,
    /// 负载在首页中的偏移
    pub msg_offset: usize,
    /// 预分块大小 (总为 0)
    pub prechunk_size: usize,
    /// 是否为缓存重发的帧 (回放时总为 false)
    pub is_saved_frame: bool,
}

/// 音频消息
#[derive(Debug)]
pub struct AudioMessage<'a> {
    /// 时间轴上的时间戳 (纳秒)
    pub timestamp_nanos: u64,
    /// 消息类型
    pub frame_type: AudioFrameType,
    /// 编解码器
    pub codec_id: CodecId,
    /// 页所属的池
    pub pool: &'a PagePool,
    /// 负载页
    pub pages: &'a PageList,
    /// 消息长度 (字节)
    pub msg_len: usize,
    /// 负载在首页中的偏移
    pub msg_offset: usize,
    /// 预分块大小 (总为 0)
    pub prechunk_size: usize,
}

/// 帧的下游消费者
pub trait FrameSink {
    /// 接收一条视频消息
    fn video_frame(&mut self, msg: &VideoMessage<'_>) -> SinkOutcome;

    /// 接收一条音频消息
    fn audio_frame(&mut self, msg: &AudioMessage<'_>) -> SinkOutcome;
}
