//! 编解码器标识符.
//!
//! 只收录录像文件 (FLV) 中可能出现的编解码器.

use std::fmt;
use strand_core::MediaType;

/// 编解码器标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    /// 未知编解码器
    None,

    // ========================
    // 视频编解码器
    // ========================
    /// H.264 / AVC
    H264,
    /// H.265 / HEVC
    H265,
    /// AV1
    Av1,
    /// Sorenson H.263
    SorensonH263,
    /// Screen Video
    ScreenVideo,
    /// On2 VP6
    Vp6,

    // ========================
    // 音频编解码器
    // ========================
    /// AAC
    Aac,
    /// MP3
    Mp3,
    /// Speex
    Speex,
    /// Nellymoser
    Nellymoser,
    /// G.711 A-law
    PcmAlaw,
    /// G.711 mu-law
    PcmMulaw,
    /// PCM 有符号 16 位小端
    PcmS16le,
}

impl CodecId {
    /// 获取编解码器对应的媒体类型
    pub const fn media_type(&self) -> Option<MediaType> {
        match self {
            Self::None => None,
            Self::H264
            | Self::H265
            | Self::Av1
            | Self::SorensonH263
            | Self::ScreenVideo
            | Self::Vp6 => Some(MediaType::Video),
            Self::Aac
            | Self::Mp3
            | Self::Speex
            | Self::Nellymoser
            | Self::PcmAlaw
            | Self::PcmMulaw
            | Self::PcmS16le => Some(MediaType::Audio),
        }
    }

    /// 获取编解码器名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::H264 => "h264",
            Self::H265 => "hevc",
            Self::Av1 => "av1",
            Self::SorensonH263 => "flv1",
            Self::ScreenVideo => "flashsv",
            Self::Vp6 => "vp6f",
            Self::Aac => "aac",
            Self::Mp3 => "mp3",
            Self::Speex => "speex",
            Self::Nellymoser => "nellymoser",
            Self::PcmAlaw => "pcm_alaw",
            Self::PcmMulaw => "pcm_mulaw",
            Self::PcmS16le => "pcm_s16le",
        }
    }

    /// 是否为已知编解码器
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_media_type() {
        assert_eq!(CodecId::H264.media_type(), Some(MediaType::Video));
        assert_eq!(CodecId::Speex.media_type(), Some(MediaType::Audio));
        assert_eq!(CodecId::None.media_type(), None);
        assert!(!CodecId::None.is_known());
    }

    #[test]
    fn test_codec_display() {
        assert_eq!(format!("{}", CodecId::H264), "h264");
        assert_eq!(format!("{}", CodecId::Aac), "aac");
    }
}
