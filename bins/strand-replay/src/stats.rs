//! 统计 sink: 记录投递情况, 按突发上限施加背压.

use serde::Serialize;
use strand_codec::CodecId;
use strand_ingest::{AudioFrameType, AudioMessage, FrameSink, SinkOutcome, VideoFrameType, VideoMessage};

/// 回放摘要
#[derive(Debug, Default, Clone, Serialize)]
pub struct ReplaySummary {
    pub key_frames: u64,
    pub inter_frames: u64,
    pub audio_frames: u64,
    pub video_headers: u64,
    pub audio_headers: u64,
    pub bytes: u64,
    pub bursts: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_timestamp_nanos: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_timestamp_nanos: Option<u64>,
}

impl ReplaySummary {
    /// 首末帧之间的时长 (秒)
    pub fn span_seconds(&self) -> f64 {
        match (self.first_timestamp_nanos, self.last_timestamp_nanos) {
            (Some(first), Some(last)) => last.saturating_sub(first) as f64 / 1e9,
            _ => 0.0,
        }
    }
}

/// 统计 sink
pub struct StatsSink {
    burst_size_limit: usize,
    burst_bytes: usize,
    summary: ReplaySummary,
}

impl StatsSink {
    /// `burst_size_limit` 为 0 表示不限制
    pub fn new(burst_size_limit: usize) -> Self {
        Self {
            burst_size_limit,
            burst_bytes: 0,
            summary: ReplaySummary::default(),
        }
    }

    /// 开始新一轮突发
    pub fn start_burst(&mut self) {
        self.burst_bytes = 0;
        self.summary.bursts += 1;
    }

    pub fn summary(&self) -> &ReplaySummary {
        &self.summary
    }

    pub fn into_summary(self) -> ReplaySummary {
        self.summary
    }

    fn account(&mut self, timestamp_nanos: u64, msg_len: usize) -> SinkOutcome {
        let summary = &mut self.summary;
        summary.first_timestamp_nanos.get_or_insert(timestamp_nanos);
        summary.last_timestamp_nanos = Some(timestamp_nanos);
        summary.bytes += msg_len as u64;

        self.burst_bytes += msg_len;
        if self.burst_size_limit > 0 && self.burst_bytes >= self.burst_size_limit {
            SinkOutcome::BurstLimit
        } else {
            SinkOutcome::Success
        }
    }
}

fn codec_name(codec_id: CodecId) -> Option<String> {
    codec_id.is_known().then(|| codec_id.name().to_string())
}

impl FrameSink for StatsSink {
    fn video_frame(&mut self, msg: &VideoMessage<'_>) -> SinkOutcome {
        match msg.frame_type {
            VideoFrameType::KeyFrame => self.summary.key_frames += 1,
            VideoFrameType::InterFrame => self.summary.inter_frames += 1,
            VideoFrameType::AvcSequenceHeader => self.summary.video_headers += 1,
        }
        if self.summary.video_codec.is_none() {
            self.summary.video_codec = codec_name(msg.codec_id);
        }
        self.account(msg.timestamp_nanos, msg.msg_len)
    }

    fn audio_frame(&mut self, msg: &AudioMessage<'_>) -> SinkOutcome {
        match msg.frame_type {
            AudioFrameType::RawData => self.summary.audio_frames += 1,
            AudioFrameType::AacSequenceHeader | AudioFrameType::SpeexHeader => {
                self.summary.audio_headers += 1
            }
        }
        if self.summary.audio_codec.is_none() {
            self.summary.audio_codec = codec_name(msg.codec_id);
        }
        self.account(msg.timestamp_nanos, msg.msg_len)
    }
}
