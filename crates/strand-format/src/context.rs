//! 输入文件上下文.
//!
//! 对标 FFmpeg 的 `AVFormatContext`: 把 I/O 与解封装器绑在一起,
//! 录像回放只需要 "打开 / 读包 / 按秒定位" 三种操作.

use std::path::Path;

use log::{debug, info};
use strand_codec::Packet;
use strand_core::{MediaType, StrandError, StrandResult};

use crate::demuxer::{Demuxer, SeekFlags};
use crate::io::IoContext;
use crate::registry::{init, probe_lock};
use crate::stream::Stream;

/// 已打开的输入文件
pub struct FormatContext {
    demuxer: Box<dyn Demuxer>,
    io: IoContext,
    filename: String,
    file_size: Option<u64>,
}

impl FormatContext {
    /// 打开输入文件, 探测格式并解析头部
    ///
    /// 探测与解析头部在全局探测锁内完成.
    pub fn open_input(path: impl AsRef<Path>) -> StrandResult<Self> {
        let path = path.as_ref();
        let registry = init();
        let filename = path.to_string_lossy().into_owned();
        let mut io = IoContext::open_read(path)?;

        let demuxer = {
            let _guard = probe_lock();
            registry.open_input(&mut io, Some(&filename))?
        };

        if demuxer.streams().is_empty() {
            return Err(StrandError::Format(format!("{filename}: 没有任何流")));
        }

        let file_size = io.size();
        info!(
            "打开输入 {filename}: 格式 {}, {} 个流, 时长 {:?}",
            demuxer.name(),
            demuxer.streams().len(),
            demuxer.duration(),
        );
        Ok(Self {
            demuxer,
            io,
            filename,
            file_size,
        })
    }

    /// 用已打开的解封装器构造上下文
    pub fn from_demuxer(demuxer: Box<dyn Demuxer>, io: IoContext, filename: impl Into<String>) -> Self {
        let file_size = io.size();
        Self {
            demuxer,
            io,
            filename: filename.into(),
            file_size,
        }
    }

    /// 所有流信息
    pub fn streams(&self) -> &[Stream] {
        self.demuxer.streams()
    }

    /// 编解码器可识别的流数量
    pub fn usable_stream_count(&self) -> usize {
        self.streams().iter().filter(|s| s.is_usable()).count()
    }

    /// 读取下一个数据包
    pub fn read_packet(&mut self) -> StrandResult<Packet> {
        self.demuxer.read_packet(&mut self.io)
    }

    /// 相对文件起点按秒定位
    ///
    /// 有视频流时定位到目标之前最近的视频关键帧,
    /// 纯音频文件定位到第一个不早于目标的音频帧.
    pub fn seek_seconds(&mut self, seconds: f64) -> StrandResult<()> {
        let streams = self.demuxer.streams();
        let (stream_index, flags) = match streams
            .iter()
            .find(|s| s.media_type == MediaType::Video)
        {
            Some(video) => (video.index, SeekFlags::default()),
            None => {
                let first = streams.first().ok_or(StrandError::StreamNotFound(0))?;
                (
                    first.index,
                    SeekFlags {
                        backward: false,
                        any: true,
                    },
                )
            }
        };

        let tb = streams[stream_index].time_base;
        if !tb.is_valid() {
            return Err(StrandError::InvalidArgument(format!(
                "流 #{stream_index} 时间基无效: {tb}"
            )));
        }
        let timestamp = (seconds * f64::from(tb.den) / f64::from(tb.num)).round() as i64;
        debug!("{}: 定位到 {seconds:.3}s (流 #{stream_index}, ts={timestamp})", self.filename);
        self.demuxer.seek(&mut self.io, stream_index, timestamp, flags)
    }

    /// 容器时长 (秒), None 表示未知
    pub fn duration(&self) -> Option<f64> {
        self.demuxer.duration()
    }

    /// 文件大小 (字节)
    pub fn file_size(&self) -> Option<u64> {
        self.file_size
    }

    /// 打开时使用的文件路径
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// 容器格式名称
    pub fn format_name(&self) -> &str {
        self.demuxer.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn tag(tag_type: u8, timestamp: u32, body: &[u8]) -> Vec<u8> {
        let size = body.len() as u32;
        let mut out = vec![tag_type];
        out.extend_from_slice(&size.to_be_bytes()[1..]);
        out.extend_from_slice(&timestamp.to_be_bytes()[1..]);
        out.push((timestamp >> 24) as u8);
        out.extend_from_slice(&[0, 0, 0]);
        out.extend_from_slice(body);
        out.extend_from_slice(&(11 + size).to_be_bytes());
        out
    }

    fn write_flv(audio_only: bool) -> tempfile::NamedTempFile {
        let mut data = b"FLV\x01\x05\x00\x00\x00\x09\x00\x00\x00\x00".to_vec();
        for i in 0..4u32 {
            if !audio_only {
                let frame = if i % 2 == 0 { 0x17 } else { 0x27 };
                data.extend_from_slice(&tag(9, i * 1000, &[frame, 1, 0, 0, 0, i as u8]));
            }
            data.extend_from_slice(&tag(8, i * 1000 + 10, &[0xAF, 1, 0xA0 + i as u8]));
        }
        let mut file = tempfile::Builder::new().suffix(".flv").tempfile().unwrap();
        file.write_all(&data).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_open_input_flv() {
        let file = write_flv(false);
        let ctx = FormatContext::open_input(file.path()).unwrap();
        assert_eq!(ctx.format_name(), "flv");
        assert_eq!(ctx.streams().len(), 2);
        assert_eq!(ctx.usable_stream_count(), 2);
        assert_eq!(ctx.duration(), Some(3.01));
        assert!(ctx.file_size().unwrap() > 0);
    }

    #[test]
    fn test_seek_seconds_video_keyframe() {
        let file = write_flv(false);
        let mut ctx = FormatContext::open_input(file.path()).unwrap();
        ctx.seek_seconds(3.5).unwrap();
        let pkt = ctx.read_packet().unwrap();
        assert_eq!(pkt.pts, 2000);
        assert!(pkt.is_keyframe);
    }

    #[test]
    fn test_seek_seconds_audio_only() {
        let file = write_flv(true);
        let mut ctx = FormatContext::open_input(file.path()).unwrap();
        ctx.seek_seconds(1.5).unwrap();
        assert_eq!(ctx.read_packet().unwrap().pts, 2010);
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = FormatContext::open_input(dir.path().join("absent.flv"));
        assert!(matches!(result, Err(StrandError::Io(_))));
    }
}
