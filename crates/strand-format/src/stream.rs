//! 流信息定义.
//!
//! 对标 FFmpeg 的 `AVStream`, 描述容器中的一条音视频流.

use strand_codec::CodecId;
use strand_core::{MediaType, Rational};

/// 流信息
#[derive(Debug, Clone)]
pub struct Stream {
    /// 流索引 (从 0 开始)
    pub index: usize,
    /// 媒体类型
    pub media_type: MediaType,
    /// 编解码器标识
    pub codec_id: CodecId,
    /// 时间基
    pub time_base: Rational,
    /// 流时长 (以 time_base 为单位, -1 表示未知)
    pub duration: i64,
    /// 编解码器私有数据 (extradata)
    ///
    /// H.264 为 avcC 或 Annex B 形式的 SPS/PPS, AAC 为 AudioSpecificConfig.
    /// 码流中途出现新的序列头时会被原地替换.
    pub extra_data: Vec<u8>,
    /// 流特定参数
    pub params: StreamParams,
}

impl Stream {
    /// 编解码器是否可识别
    pub fn is_usable(&self) -> bool {
        self.codec_id.is_known()
    }
}

/// 流特定参数
#[derive(Debug, Clone)]
pub enum StreamParams {
    /// 视频流参数
    Video(VideoStreamParams),
    /// 音频流参数
    Audio(AudioStreamParams),
    /// 其他
    Other,
}

/// 视频流参数
#[derive(Debug, Clone)]
pub struct VideoStreamParams {
    /// 宽度 (像素, 0 表示未知)
    pub width: u32,
    /// 高度 (像素, 0 表示未知)
    pub height: u32,
    /// 帧率 (0/1 表示未知)
    pub frame_rate: Rational,
}

/// 音频流参数
#[derive(Debug, Clone)]
pub struct AudioStreamParams {
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 声道数
    pub channels: u32,
    /// 采样位宽
    pub bits_per_sample: u32,
}
