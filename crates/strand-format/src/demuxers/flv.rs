//! FLV (Flash Video) 容器解封装器.
//!
//! 录像分段统一以 FLV 落盘 (RTMP 推流直接写文件).
//!
//! # FLV 文件结构
//! ```text
//! FLV Header (9 bytes):
//!   "FLV" (3 bytes)
//!   Version (1 byte, 通常 = 1)
//!   Flags (1 byte): bit0=video, bit2=audio
//!   DataOffset (4 bytes, BE): 头部大小 (通常 9)
//!
//! PreviousTagSize0 (4 bytes, BE): 0
//!
//! FLV Tag:
//!   TagType (1 byte): 8=Audio, 9=Video, 18=Script
//!   DataSize (3 bytes, BE)
//!   Timestamp (3 bytes, BE) + TimestampExtended (1 byte, 高8位)
//!   StreamID (3 bytes, BE): always 0
//!   TagData (DataSize bytes)
//! PreviousTagSize (4 bytes, BE) = 11 + DataSize
//! ```
//!
//! # 音频 Tag 数据
//! ```text
//! SoundFormat (4 bits): 10=AAC, 11=Speex, 2=MP3, ...
//! SoundRate (2 bits): 0=5.5kHz, 1=11kHz, 2=22kHz, 3=44kHz
//! SoundSize (1 bit): 0=8bit, 1=16bit
//! SoundType (1 bit): 0=mono, 1=stereo
//! [AAC: AACPacketType (1 byte): 0=Sequence Header, 1=Raw]
//! ```
//!
//! # 视频 Tag 数据
//! ```text
//! FrameType (4 bits): 1=keyframe, 2=inter, ...
//! CodecID (4 bits): 7=AVC(H.264), 12=HEVC(H.265), 13=AV1
//! [AVC: AVCPacketType (1 byte): 0=SeqHeader, 1=NALU, 2=EndOfSeq]
//! [AVC: CompositionTimeOffset (3 bytes, BE, signed)]
//! ```
//!
//! 序列头 Tag 不产生数据包, 只替换对应流的 extradata.
//! 上层通过比较前后 extradata 感知参数变化.

use std::io::SeekFrom;

use bytes::Bytes;
use log::{debug, warn};
use strand_codec::{CodecId, Packet};
use strand_core::{MediaType, Rational, StrandError, StrandResult, Timestamp};

use crate::demuxer::{Demuxer, SeekFlags};
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::probe::{FormatProbe, ProbeScore, SCORE_EXTENSION, SCORE_MAX};
use crate::stream::{AudioStreamParams, Stream, StreamParams, VideoStreamParams};

/// FLV Tag 类型
const TAG_AUDIO: u8 = 8;
const TAG_VIDEO: u8 = 9;
const TAG_SCRIPT: u8 = 18;

/// Tag 头部长度
const TAG_HEADER_SIZE: u64 = 11;

/// FLV 视频编解码器 ID
const FLV_CODEC_H263: u8 = 2;
const FLV_CODEC_SCREEN: u8 = 3;
const FLV_CODEC_VP6: u8 = 4;
const FLV_CODEC_VP6A: u8 = 5;
const FLV_CODEC_SCREEN2: u8 = 6;
const FLV_CODEC_AVC: u8 = 7;
const FLV_CODEC_HEVC: u8 = 12;
const FLV_CODEC_AV1: u8 = 13;

/// FLV 音频编解码器 ID (SoundFormat)
const FLV_AUDIO_PCM: u8 = 0;
const FLV_AUDIO_MP3: u8 = 2;
const FLV_AUDIO_PCM_LE: u8 = 3;
const FLV_AUDIO_NELLY_16K: u8 = 4;
const FLV_AUDIO_NELLY_8K: u8 = 5;
const FLV_AUDIO_NELLY: u8 = 6;
const FLV_AUDIO_ALAW: u8 = 7;
const FLV_AUDIO_MULAW: u8 = 8;
const FLV_AUDIO_AAC: u8 = 10;
const FLV_AUDIO_SPEEX: u8 = 11;
const FLV_AUDIO_MP3_8K: u8 = 14;

/// 预读 Tag 上限
const MAX_PROBE_TAGS: usize = 32;

/// FLV 解封装器
pub struct FlvDemuxer {
    /// 流信息
    streams: Vec<Stream>,
    /// 音频流索引 (None 表示还未出现音频 Tag)
    audio_stream_idx: Option<usize>,
    /// 视频流索引
    video_stream_idx: Option<usize>,
    /// 文件时长 (毫秒)
    duration_ms: Option<f64>,
    /// onMetaData 中的画面尺寸
    meta_video_size: Option<(u32, u32)>,
    /// onMetaData 中的帧率
    meta_frame_rate: Option<f64>,
    /// 数据区起始偏移
    data_offset: u64,
}

impl FlvDemuxer {
    /// 创建 FLV 解封装器实例 (工厂函数)
    pub fn create() -> StrandResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self::new()))
    }

    fn new() -> Self {
        Self {
            streams: Vec::new(),
            audio_stream_idx: None,
            video_stream_idx: None,
            duration_ms: None,
            meta_video_size: None,
            meta_frame_rate: None,
            data_offset: 0,
        }
    }

    /// 读取 FLV 文件头部, 结束后位于第一个 Tag 之前
    fn read_header(&mut self, io: &mut IoContext) -> StrandResult<()> {
        let sig = io.read_bytes(3)?;
        if sig != b"FLV" {
            return Err(StrandError::InvalidData("不是 FLV 文件".into()));
        }

        let version = io.read_u8()?;
        let flags = io.read_u8()?;
        let data_offset = io.read_u32_be()?;
        if data_offset < 9 {
            return Err(StrandError::InvalidData(format!(
                "FLV: 非法的数据区偏移 {data_offset}"
            )));
        }

        debug!(
            "FLV: version={version} flags=0x{flags:02X} data_offset={data_offset} has_audio={} has_video={}",
            flags & 0x04 != 0,
            flags & 0x01 != 0,
        );

        self.data_offset = u64::from(data_offset);
        self.rewind_to_first_tag(io)
    }

    /// 回到数据区开始, 跳过 PreviousTagSize0
    fn rewind_to_first_tag(&self, io: &mut IoContext) -> StrandResult<()> {
        io.seek(SeekFrom::Start(self.data_offset))?;
        io.skip(4)
    }

    /// 读取一个 FLV Tag 头部, 返回 (类型, 数据长度, 时间戳毫秒)
    fn read_tag_header(&self, io: &mut IoContext) -> StrandResult<(u8, u32, u32)> {
        let tag_type = io.read_u8()?;
        let data_size = io.read_u24_be()?;
        let timestamp_low = io.read_u24_be()?;
        let timestamp_ext = io.read_u8()?;
        let timestamp = (u32::from(timestamp_ext) << 24) | timestamp_low;
        let _stream_id = io.read_u24_be()?;

        Ok((tag_type & 0x1F, data_size, timestamp))
    }

    /// 读取一个完整 Tag (含 PreviousTagSize), 非数据 Tag 返回 None
    fn read_tag(&mut self, io: &mut IoContext) -> StrandResult<Option<Packet>> {
        let (tag_type, data_size, timestamp) = self.read_tag_header(io)?;

        let pkt = match tag_type {
            TAG_AUDIO => self.handle_audio_tag(io, data_size, timestamp)?,
            TAG_VIDEO => self.handle_video_tag(io, data_size, timestamp)?,
            TAG_SCRIPT => {
                self.parse_script_tag(io, data_size)?;
                None
            }
            other => {
                debug!("FLV: 跳过未知 Tag 类型 {other}, {data_size} 字节");
                io.skip(data_size as usize)?;
                None
            }
        };

        let _prev_tag_size = io.read_u32_be()?;
        Ok(pkt)
    }

    fn audio_codec(sound_format: u8) -> CodecId {
        match sound_format {
            FLV_AUDIO_PCM | FLV_AUDIO_PCM_LE => CodecId::PcmS16le,
            FLV_AUDIO_MP3 | FLV_AUDIO_MP3_8K => CodecId::Mp3,
            FLV_AUDIO_NELLY_16K | FLV_AUDIO_NELLY_8K | FLV_AUDIO_NELLY => CodecId::Nellymoser,
            FLV_AUDIO_ALAW => CodecId::PcmAlaw,
            FLV_AUDIO_MULAW => CodecId::PcmMulaw,
            FLV_AUDIO_AAC => CodecId::Aac,
            FLV_AUDIO_SPEEX => CodecId::Speex,
            _ => CodecId::None,
        }
    }

    fn video_codec(codec_byte: u8) -> CodecId {
        match codec_byte {
            FLV_CODEC_H263 => CodecId::SorensonH263,
            FLV_CODEC_SCREEN | FLV_CODEC_SCREEN2 => CodecId::ScreenVideo,
            FLV_CODEC_VP6 | FLV_CODEC_VP6A => CodecId::Vp6,
            FLV_CODEC_AVC => CodecId::H264,
            FLV_CODEC_HEVC => CodecId::H265,
            FLV_CODEC_AV1 => CodecId::Av1,
            _ => CodecId::None,
        }
    }

    /// 首次出现音频 Tag 时建立音频流
    fn ensure_audio_stream(&mut self, audio_header: u8) -> usize {
        if let Some(idx) = self.audio_stream_idx {
            return idx;
        }

        let sound_format = audio_header >> 4;
        let codec_id = Self::audio_codec(sound_format);
        // Speex / Nellymoser / AAC 的采样率不由 SoundRate 决定
        let sample_rate = match sound_format {
            FLV_AUDIO_SPEEX | FLV_AUDIO_NELLY_16K => 16000,
            FLV_AUDIO_NELLY_8K | FLV_AUDIO_ALAW | FLV_AUDIO_MULAW | FLV_AUDIO_MP3_8K => 8000,
            FLV_AUDIO_AAC => 44100,
            _ => match (audio_header >> 2) & 0x03 {
                0 => 5512,
                1 => 11025,
                2 => 22050,
                _ => 44100,
            },
        };
        let channels = if sound_format == FLV_AUDIO_SPEEX {
            1
        } else {
            u32::from(audio_header & 0x01) + 1
        };
        let bits_per_sample = if (audio_header >> 1) & 0x01 == 1 { 16 } else { 8 };

        let idx = self.streams.len();
        self.audio_stream_idx = Some(idx);
        self.streams.push(Stream {
            index: idx,
            media_type: MediaType::Audio,
            codec_id,
            time_base: Rational::MILLI,
            duration: -1,
            extra_data: Vec::new(),
            params: StreamParams::Audio(AudioStreamParams {
                sample_rate,
                channels,
                bits_per_sample,
            }),
        });
        debug!("FLV: 建立音频流 #{idx}, codec={codec_id}, {sample_rate} Hz, {channels} 声道");
        idx
    }

    /// 首次出现视频 Tag 时建立视频流
    fn ensure_video_stream(&mut self, codec_byte: u8) -> usize {
        if let Some(idx) = self.video_stream_idx {
            return idx;
        }

        let codec_id = Self::video_codec(codec_byte);
        let (width, height) = self.meta_video_size.unwrap_or((0, 0));
        let frame_rate = self
            .meta_frame_rate
            .map(|fps| Rational::new((fps * 1000.0).round() as i32, 1000))
            .unwrap_or(Rational::new(0, 1));

        let idx = self.streams.len();
        self.video_stream_idx = Some(idx);
        self.streams.push(Stream {
            index: idx,
            media_type: MediaType::Video,
            codec_id,
            time_base: Rational::MILLI,
            duration: -1,
            extra_data: Vec::new(),
            params: StreamParams::Video(VideoStreamParams {
                width,
                height,
                frame_rate,
            }),
        });
        debug!("FLV: 建立视频流 #{idx}, codec={codec_id}, {width}x{height}");
        idx
    }

    /// 处理音频 Tag
    fn handle_audio_tag(
        &mut self,
        io: &mut IoContext,
        data_size: u32,
        timestamp: u32,
    ) -> StrandResult<Option<Packet>> {
        if data_size == 0 {
            return Ok(None);
        }

        let audio_header = io.read_u8()?;
        let stream_index = self.ensure_audio_stream(audio_header);
        let mut remaining = (data_size - 1) as usize;

        if audio_header >> 4 == FLV_AUDIO_AAC {
            if remaining < 1 {
                return Ok(None);
            }
            let aac_packet_type = io.read_u8()?;
            remaining -= 1;

            if aac_packet_type == 0 {
                let config = io.read_bytes(remaining)?;
                debug!("FLV: 收到 AAC sequence header, {} 字节", config.len());
                self.streams[stream_index].extra_data = config;
                return Ok(None);
            }
        }

        let data = io.read_bytes(remaining)?;
        Ok(Some(Self::make_packet(
            data,
            stream_index,
            i64::from(timestamp),
            0,
            true,
        )))
    }

    /// 处理视频 Tag
    fn handle_video_tag(
        &mut self,
        io: &mut IoContext,
        data_size: u32,
        timestamp: u32,
    ) -> StrandResult<Option<Packet>> {
        if data_size == 0 {
            return Ok(None);
        }

        let video_header = io.read_u8()?;
        let frame_type = video_header >> 4;
        let codec_byte = video_header & 0x0F;
        let stream_index = self.ensure_video_stream(codec_byte);
        let mut remaining = (data_size - 1) as usize;

        // 命令帧 (frame_type = 5) 不含画面数据
        if frame_type == 5 {
            io.skip(remaining)?;
            return Ok(None);
        }

        let mut cts = 0i64;
        if matches!(codec_byte, FLV_CODEC_AVC | FLV_CODEC_HEVC | FLV_CODEC_AV1) {
            if remaining < 4 {
                io.skip(remaining)?;
                return Ok(None);
            }

            let avc_packet_type = io.read_u8()?;
            let cts_bytes = io.read_u24_be()?;
            remaining -= 4;

            match avc_packet_type {
                0 => {
                    let config = io.read_bytes(remaining)?;
                    debug!("FLV: 收到视频 sequence header, {} 字节", config.len());
                    self.streams[stream_index].extra_data = config;
                    return Ok(None);
                }
                2 => {
                    io.skip(remaining)?;
                    return Ok(None);
                }
                _ => {}
            }

            // 有符号 24 位
            cts = i64::from(((cts_bytes << 8) as i32) >> 8);
        } else if codec_byte == FLV_CODEC_VP6 || codec_byte == FLV_CODEC_VP6A {
            // VP6 带 1 字节尺寸调整
            if remaining < 1 {
                return Ok(None);
            }
            io.skip(1)?;
            remaining -= 1;
        }

        let data = io.read_bytes(remaining)?;
        Ok(Some(Self::make_packet(
            data,
            stream_index,
            i64::from(timestamp),
            cts,
            frame_type == 1,
        )))
    }

    fn make_packet(
        data: Vec<u8>,
        stream_index: usize,
        dts: i64,
        cts: i64,
        is_keyframe: bool,
    ) -> Packet {
        let mut pkt = Packet::from_data(Bytes::from(data));
        pkt.stream_index = stream_index;
        pkt.dts = dts;
        pkt.pts = dts + cts;
        pkt.is_keyframe = is_keyframe;
        pkt.time_base = Rational::MILLI;
        pkt
    }

    /// 解析 onMetaData (AMF0), 只提取时长、画面尺寸和帧率
    fn parse_script_tag(&mut self, io: &mut IoContext, data_size: u32) -> StrandResult<()> {
        let data = io.read_bytes(data_size as usize)?;

        if let Some(dur) = amf_number_after(&data, b"duration") {
            self.duration_ms = Some(dur * 1000.0);
            debug!("FLV: onMetaData duration={dur}s");
        }
        let width = amf_number_after(&data, b"width");
        let height = amf_number_after(&data, b"height");
        if let (Some(w), Some(h)) = (width, height) {
            self.meta_video_size = Some((w as u32, h as u32));
            if let Some(idx) = self.video_stream_idx {
                if let StreamParams::Video(ref mut vp) = self.streams[idx].params {
                    vp.width = w as u32;
                    vp.height = h as u32;
                }
            }
        }
        if let Some(fps) = amf_number_after(&data, b"framerate") {
            self.meta_frame_rate = Some(fps);
        }
        Ok(())
    }

    /// 没有 onMetaData 时长时, 用最后一个 Tag 的时间戳估算
    fn probe_duration_from_tail(&self, io: &mut IoContext) -> Option<f64> {
        let size = io.size()?;
        if size < self.data_offset + 4 + TAG_HEADER_SIZE + 4 {
            return None;
        }

        io.seek(SeekFrom::End(-4)).ok()?;
        let last_tag_size = u64::from(io.read_u32_be().ok()?);
        if last_tag_size < TAG_HEADER_SIZE || last_tag_size + 4 > size - self.data_offset - 4 {
            return None;
        }

        io.seek(SeekFrom::End(-4 - last_tag_size as i64)).ok()?;
        let (_, data_size, timestamp) = self.read_tag_header(io).ok()?;
        if u64::from(data_size) + TAG_HEADER_SIZE != last_tag_size {
            return None;
        }
        Some(f64::from(timestamp))
    }
}

/// 在 AMF0 数据中查找键名, 读取其后紧跟的 Number 值
fn amf_number_after(data: &[u8], key: &[u8]) -> Option<f64> {
    let pos = data.windows(key.len()).position(|w| w == key)?;
    let after = pos + key.len();
    // AMF0 Number: type(0x00) + 8 bytes IEEE 754
    let bytes = data.get(after..after + 9)?;
    if bytes[0] != 0x00 {
        return None;
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[1..]);
    let val = f64::from_be_bytes(raw);
    (val > 0.0 && val.is_finite()).then_some(val)
}

impl Demuxer for FlvDemuxer {
    fn format_id(&self) -> FormatId {
        FormatId::Flv
    }

    fn name(&self) -> &str {
        "flv"
    }

    fn open(&mut self, io: &mut IoContext) -> StrandResult<()> {
        self.read_header(io)?;

        // 预读若干 Tag 以建立流信息
        let mut tags_read = 0;
        while tags_read < MAX_PROBE_TAGS {
            match self.read_tag(io) {
                Ok(_) => {}
                Err(StrandError::Eof) => break,
                Err(e) => return Err(e),
            }
            tags_read += 1;

            let has_audio = self.audio_stream_idx.is_some();
            let has_video = self.video_stream_idx.is_some();
            if has_audio && has_video {
                break;
            }
        }

        if self.streams.is_empty() {
            return Err(StrandError::InvalidData("FLV: 未找到音频或视频流".into()));
        }

        if self.duration_ms.is_none() {
            self.duration_ms = self.probe_duration_from_tail(io);
        }
        if let Some(dur_ms) = self.duration_ms {
            for stream in &mut self.streams {
                stream.duration = dur_ms as i64;
            }
        }

        // 回到数据区开始, 准备顺序读取
        self.rewind_to_first_tag(io)?;

        debug!(
            "FLV: 打开完成, {} 个流, 时长 {:?} ms",
            self.streams.len(),
            self.duration_ms
        );
        Ok(())
    }

    fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn read_packet(&mut self, io: &mut IoContext) -> StrandResult<Packet> {
        loop {
            let tag_pos = io.position()?;
            match self.read_tag(io) {
                Ok(Some(mut pkt)) => {
                    pkt.pos = tag_pos as i64;
                    return Ok(pkt);
                }
                Ok(None) => continue,
                Err(StrandError::Again) => {
                    // Tag 尚未写完整, 回到 Tag 起点等待重试
                    io.seek(SeekFrom::Start(tag_pos))?;
                    return Err(StrandError::Again);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn seek(
        &mut self,
        io: &mut IoContext,
        stream_index: usize,
        timestamp: i64,
        flags: SeekFlags,
    ) -> StrandResult<()> {
        let stream = self
            .streams
            .get(stream_index)
            .ok_or(StrandError::StreamNotFound(stream_index))?;
        if !io.is_seekable() {
            return Err(StrandError::Unsupported("FLV: 输入不支持随机访问".into()));
        }

        let target_ms = Timestamp::new(timestamp, stream.time_base)
            .rescale(Rational::MILLI)
            .pts;
        let key_only = !flags.any && stream.media_type == MediaType::Video;
        let wanted_tag = match stream.media_type {
            MediaType::Video => TAG_VIDEO,
            _ => TAG_AUDIO,
        };

        // 顺序扫描 Tag 头部, 记录目标前后最近的候选位置
        self.rewind_to_first_tag(io)?;
        let mut before: Option<u64> = None;
        let mut after: Option<u64> = None;
        loop {
            let tag_pos = io.position()?;
            let (tag_type, data_size, ts) = match self.read_tag_header(io) {
                Ok(v) => v,
                Err(StrandError::Eof) => break,
                Err(e) => return Err(e),
            };

            let mut candidate = tag_type == wanted_tag && data_size > 0;
            if candidate && key_only {
                let video_header = io.read_u8()?;
                candidate = video_header >> 4 == 1;
                io.skip(data_size as usize - 1)?;
            } else {
                io.skip(data_size as usize)?;
            }
            io.skip(4)?;

            if !candidate {
                continue;
            }
            let reached = if flags.backward {
                i64::from(ts) > target_ms
            } else {
                i64::from(ts) >= target_ms
            };
            if reached {
                after = Some(tag_pos);
                break;
            }
            before = Some(tag_pos);
        }

        let found = if flags.backward {
            before.or(after)
        } else {
            after
        };
        match found {
            Some(pos) => {
                debug!("FLV: seek {target_ms} ms → 字节偏移 {pos}");
                io.seek(SeekFrom::Start(pos))?;
            }
            None => {
                warn!("FLV: seek 目标 {target_ms} ms 超出文件范围, 定位到文件末尾");
                io.seek(SeekFrom::End(0))?;
            }
        }
        Ok(())
    }

    fn duration(&self) -> Option<f64> {
        self.duration_ms.map(|ms| ms / 1000.0)
    }
}

/// FLV 格式探测器
pub struct FlvProbe;

impl FormatProbe for FlvProbe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore> {
        if data.len() >= 9 && data.starts_with(b"FLV") && data[3] == 1 {
            return Some(SCORE_MAX);
        }

        let ext = filename?.rsplit('.').next()?;
        ext.eq_ignore_ascii_case("flv").then_some(SCORE_EXTENSION)
    }

    fn format_id(&self) -> FormatId {
        FormatId::Flv
    }
}
