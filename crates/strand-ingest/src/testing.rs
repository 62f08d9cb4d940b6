//! 单元测试共用的脚本化解封装器与记录型 sink.

use std::collections::VecDeque;

use bytes::Bytes;
use strand_codec::{CodecId, Packet};
use strand_core::{MediaType, Rational, StrandError, StrandResult};
use strand_format::demuxer::{Demuxer, SeekFlags};
use strand_format::stream::{Stream, StreamParams};
use strand_format::{FormatContext, FormatId, IoContext};

use crate::sink::{AudioFrameType, AudioMessage, FrameSink, SinkOutcome, VideoFrameType, VideoMessage};

/// 脚本中的一步
pub enum Step {
    /// 返回一个数据包
    Packet(Packet),
    /// 替换某个流的 extradata, 不产生数据包
    Extra(usize, Vec<u8>),
    /// 返回 `Again`
    Again,
    /// 返回硬错误
    Fail,
}

/// 按脚本吐出数据包的解封装器
pub struct ScriptedDemuxer {
    streams: Vec<Stream>,
    script: VecDeque<Step>,
}

impl ScriptedDemuxer {
    pub fn new(streams: Vec<Stream>, script: Vec<Step>) -> Self {
        Self {
            streams,
            script: script.into(),
        }
    }

    pub fn into_context(self) -> FormatContext {
        FormatContext::from_demuxer(Box::new(self), IoContext::from_memory(Vec::new()), "scripted")
    }
}

impl Demuxer for ScriptedDemuxer {
    fn format_id(&self) -> FormatId {
        FormatId::Flv
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn open(&mut self, _io: &mut IoContext) -> StrandResult<()> {
        Ok(())
    }

    fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn read_packet(&mut self, _io: &mut IoContext) -> StrandResult<Packet> {
        loop {
            match self.script.pop_front() {
                None => return Err(StrandError::Eof),
                Some(Step::Packet(p)) => return Ok(p),
                Some(Step::Extra(idx, data)) => self.streams[idx].extra_data = data,
                Some(Step::Again) => return Err(StrandError::Again),
                Some(Step::Fail) => return Err(StrandError::InvalidData("脚本错误".into())),
            }
        }
    }

    fn seek(&mut self, _io: &mut IoContext, _s: usize, _t: i64, _f: SeekFlags) -> StrandResult<()> {
        Ok(())
    }

    fn duration(&self) -> Option<f64> {
        None
    }
}

pub fn stream(index: usize, media_type: MediaType, codec_id: CodecId, extra: &[u8]) -> Stream {
    Stream {
        index,
        media_type,
        codec_id,
        time_base: Rational::MILLI,
        duration: -1,
        extra_data: extra.to_vec(),
        params: StreamParams::Other,
    }
}

pub fn packet(stream_index: usize, pts_ms: i64, key: bool, data: &[u8]) -> Step {
    let mut p = Packet::from_data(Bytes::copy_from_slice(data));
    p.stream_index = stream_index;
    p.pts = pts_ms;
    p.dts = pts_ms;
    p.time_base = Rational::MILLI;
    p.is_keyframe = key;
    Step::Packet(p)
}

/// sink 收到的一条消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
    Video(VideoFrameType, u64, Vec<u8>),
    Audio(AudioFrameType, u64, Vec<u8>),
}

/// 记录所有消息, 按预设序列返回结果 (用尽后返回 Success)
#[derive(Default)]
pub struct RecordingSink {
    pub delivered: Vec<Delivered>,
    pub outcomes: VecDeque<SinkOutcome>,
}

impl RecordingSink {
    pub fn with_outcomes(outcomes: Vec<SinkOutcome>) -> Self {
        Self {
            delivered: Vec::new(),
            outcomes: outcomes.into(),
        }
    }

    fn next_outcome(&mut self) -> SinkOutcome {
        self.outcomes.pop_front().unwrap_or(SinkOutcome::Success)
    }
}

impl FrameSink for RecordingSink {
    fn video_frame(&mut self, msg: &VideoMessage<'_>) -> SinkOutcome {
        self.delivered.push(Delivered::Video(
            msg.frame_type,
            msg.timestamp_nanos,
            msg.pages.to_vec(),
        ));
        self.next_outcome()
    }

    fn audio_frame(&mut self, msg: &AudioMessage<'_>) -> SinkOutcome {
        self.delivered.push(Delivered::Audio(
            msg.frame_type,
            msg.timestamp_nanos,
            msg.pages.to_vec(),
        ));
        self.next_outcome()
    }
}

/// 构造一个 FLV Tag (含 PreviousTagSize)
pub fn flv_tag(tag_type: u8, ts: u32, body: &[u8]) -> Vec<u8> {
    let size = body.len() as u32;
    let mut out = vec![tag_type];
    out.extend_from_slice(&size.to_be_bytes()[1..]);
    out.extend_from_slice(&ts.to_be_bytes()[1..]);
    out.push((ts >> 24) as u8);
    out.extend_from_slice(&[0, 0, 0]);
    out.extend_from_slice(body);
    out.extend_from_slice(&(11 + size).to_be_bytes());
    out
}

/// FLV 文件头 (含 PreviousTagSize0)
pub fn flv_header(audio: bool, video: bool) -> Vec<u8> {
    let flags = (u8::from(audio) << 2) | u8::from(video);
    vec![b'F', b'L', b'V', 1, flags, 0, 0, 0, 9, 0, 0, 0, 0]
}
