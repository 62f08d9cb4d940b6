//! 通道回放集成测试: 多分段拼接, 校正定位, 背压恢复, 资源释放

use std::fs;
use std::path::Path;
use std::sync::Arc;

use strand::codec::parsers::h264::build_config_record;
use strand::core::StrandError;
use strand::ingest::{
    AudioFrameType, AudioMessage, Catalog, FrameSink, IngestConfig, MediaReader, PageList,
    PagePool, ReadFrameResult, RecordingSegment, SegmentName, SinkOutcome, VideoFrameType,
    VideoMessage,
};

const BASE: u64 = 1_709_618_828;
const NANOS: u64 = 1_000_000_000;
const MS: u64 = 1_000_000;

// ============================================================
// FLV 构造
// ============================================================

fn flv_tag(tag_type: u8, ts: u32, body: &[u8]) -> Vec<u8> {
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

fn avc_record() -> Vec<u8> {
    let mut annex_b = vec![0, 0, 0, 1, 0x67, 0x64, 0x00, 0x1F, 0xAC, 0xD9];
    annex_b.extend_from_slice(&[0, 0, 0, 1, 0x68, 0xEB, 0xE3, 0xCB]);
    build_config_record(&annex_b).unwrap()
}

/// 音视频 FLV: 每秒一个关键帧, +20ms 一个音频帧, +500ms 一个非关键帧
fn write_segment(root: &Path, channel: &str, start: u64, secs: u32) -> RecordingSegment {
    let mut data = vec![b'F', b'L', b'V', 1, 0x05, 0, 0, 0, 9, 0, 0, 0, 0];
    let mut avc_header = vec![0x17, 0x00, 0, 0, 0];
    avc_header.extend_from_slice(&avc_record());
    data.extend_from_slice(&flv_tag(9, 0, &avc_header));
    data.extend_from_slice(&flv_tag(8, 0, &[0xAF, 0x00, 0x12, 0x10]));

    for s in 0..secs {
        let n = s as u8;
        data.extend_from_slice(&flv_tag(9, s * 1000, &[0x17, 1, 0, 0, 0, 0x65, n]));
        data.extend_from_slice(&flv_tag(8, s * 1000 + 20, &[0xAF, 0x01, n]));
        data.extend_from_slice(&flv_tag(9, s * 1000 + 500, &[0x27, 1, 0, 0, 0, 0x41, n]));
    }

    let name = SegmentName::new(channel, start * NANOS);
    let path = name.file_path(root, "flv").unwrap();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, data).unwrap();
    RecordingSegment {
        disk_location: root.to_path_buf(),
        channel_key: name.encode().unwrap(),
        time_start: start,
        time_end: start + u64::from(secs),
    }
}

// ============================================================
// 测试 sink
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Video(VideoFrameType, u64, Vec<u8>),
    Audio(AudioFrameType, u64, Vec<u8>),
}

/// 收集全部消息, 可选按字节数施加背压, 可选保留页引用
#[derive(Default)]
struct CollectingSink {
    events: Vec<Event>,
    burst_limit: usize,
    burst_bytes: usize,
    retained: Vec<PageList>,
    retain_pages: bool,
}

impl CollectingSink {
    fn with_burst_limit(burst_limit: usize) -> Self {
        Self {
            burst_limit,
            ..Self::default()
        }
    }

    fn outcome(&mut self, len: usize) -> SinkOutcome {
        self.burst_bytes += len;
        if self.burst_limit > 0 && self.burst_bytes >= self.burst_limit {
            self.burst_bytes = 0;
            SinkOutcome::BurstLimit
        } else {
            SinkOutcome::Success
        }
    }
}

impl FrameSink for CollectingSink {
    fn video_frame(&mut self, msg: &VideoMessage<'_>) -> SinkOutcome {
        assert!(!msg.is_saved_frame);
        assert_eq!(msg.pages.len(), msg.msg_len);
        self.events.push(Event::Video(
            msg.frame_type,
            msg.timestamp_nanos,
            msg.pages.to_vec(),
        ));
        if self.retain_pages {
            self.retained.push(msg.pool.retain(msg.pages));
        }
        self.outcome(msg.msg_len)
    }

    fn audio_frame(&mut self, msg: &AudioMessage<'_>) -> SinkOutcome {
        self.events.push(Event::Audio(
            msg.frame_type,
            msg.timestamp_nanos,
            msg.pages.to_vec(),
        ));
        if self.retain_pages {
            self.retained.push(msg.pool.retain(msg.pages));
        }
        self.outcome(msg.msg_len)
    }
}

fn config() -> IngestConfig {
    IngestConfig {
        transient_backoff_ms: 1,
        ..IngestConfig::default()
    }
}

fn open_channel(catalog: Catalog, start: u64) -> MediaReader {
    MediaReader::channel(Arc::new(PagePool::new(4)), catalog, "cam1", start, config()).unwrap()
}

fn drain(reader: &MediaReader, sink: &mut CollectingSink) -> usize {
    let mut rounds = 1;
    loop {
        match reader.read_more_data(sink) {
            ReadFrameResult::BurstLimit => rounds += 1,
            ReadFrameResult::NoData => return rounds,
            other => panic!("意外的结束原因: {other:?}"),
        }
    }
}

fn timestamp(event: &Event) -> u64 {
    match event {
        Event::Video(_, ts, _) | Event::Audio(_, ts, _) => *ts,
    }
}

// ============================================================
// 测试
// ============================================================

#[test]
fn test_channel_stitches_segments_into_one_timeline() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::new(vec![
        write_segment(dir.path(), "cam1", BASE, 2),
        write_segment(dir.path(), "cam1", BASE + 2, 2),
    ]);
    let reader = open_channel(catalog, BASE);
    let mut sink = CollectingSink::default();
    assert_eq!(drain(&reader, &mut sink), 1);

    let base = BASE * NANOS;
    assert_eq!(
        sink.events[..4],
        [
            Event::Video(VideoFrameType::AvcSequenceHeader, base, avc_record()),
            Event::Video(VideoFrameType::KeyFrame, base, vec![0x65, 0]),
            Event::Audio(AudioFrameType::AacSequenceHeader, base + 20 * MS, vec![0x12, 0x10]),
            Event::Audio(AudioFrameType::RawData, base + 20 * MS, vec![0]),
        ]
    );

    // 第二个分段的参数集未变化, 不再重复序列头
    let headers = sink
        .events
        .iter()
        .filter(|e| {
            matches!(
                e,
                Event::Video(VideoFrameType::AvcSequenceHeader, ..)
                    | Event::Audio(AudioFrameType::AacSequenceHeader, ..)
            )
        })
        .count();
    assert_eq!(headers, 2);
    assert_eq!(sink.events.len(), 2 + 4 * 3);

    let stamps: Vec<u64> = sink.events.iter().map(timestamp).collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]), "时间戳必须单调: {stamps:?}");
    assert_eq!(stamps.last(), Some(&(base + 3 * NANOS + 500 * MS)));
    assert!(sink.events.contains(&Event::Video(
        VideoFrameType::KeyFrame,
        base + 2 * NANOS,
        vec![0x65, 0]
    )));

    let stats = reader.stats();
    assert_eq!(stats.segments_opened, 2);
    assert_eq!(stats.video_frames, 8);
    assert_eq!(stats.audio_frames, 4);
    assert_eq!(stats.header_frames, 2);
    assert_eq!(reader.page_pool().outstanding(), 0);
}

#[test]
fn test_corrective_seek_on_first_segment_only() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::new(vec![
        write_segment(dir.path(), "cam1", BASE, 3),
        write_segment(dir.path(), "cam1", BASE + 3, 3),
    ]);
    let reader = open_channel(catalog, BASE + 1);
    let mut sink = CollectingSink::default();
    drain(&reader, &mut sink);

    let first_second = (BASE + 1) * NANOS;
    assert_eq!(
        sink.events[0],
        Event::Video(VideoFrameType::AvcSequenceHeader, first_second, avc_record())
    );
    assert_eq!(
        sink.events[1],
        Event::Video(VideoFrameType::KeyFrame, first_second, vec![0x65, 1])
    );

    // 第二个分段从头读起
    let second_segment: Vec<&Event> = sink
        .events
        .iter()
        .filter(|e| timestamp(e) >= (BASE + 3) * NANOS)
        .collect();
    assert_eq!(second_segment.len(), 9);
    assert_eq!(
        *second_segment[0],
        Event::Video(VideoFrameType::KeyFrame, (BASE + 3) * NANOS, vec![0x65, 0])
    );
}

#[test]
fn test_burst_limit_resume_matches_unthrottled_run() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::new(vec![
        write_segment(dir.path(), "cam1", BASE, 2),
        write_segment(dir.path(), "cam1", BASE + 2, 2),
    ]);

    let reference = {
        let reader = open_channel(catalog.clone(), BASE);
        let mut sink = CollectingSink::default();
        drain(&reader, &mut sink);
        sink.events
    };

    let reader = open_channel(catalog, BASE);
    let mut sink = CollectingSink::with_burst_limit(2);
    let rounds = drain(&reader, &mut sink);

    assert!(rounds > 5, "突发上限应触发多轮投递, rounds={rounds}");
    assert_eq!(sink.events, reference);
    assert_eq!(reader.page_pool().outstanding(), 0);
}

#[test]
fn test_start_outside_catalog_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    // 目录条目指向不存在的文件, 初始化失败时不会尝试打开
    let catalog = Catalog::new(vec![RecordingSegment {
        disk_location: dir.path().to_path_buf(),
        channel_key: SegmentName::new("cam1", BASE * NANOS).encode().unwrap(),
        time_start: BASE,
        time_end: BASE + 60,
    }]);

    let pool = Arc::new(PagePool::default());
    let result = MediaReader::channel(pool.clone(), catalog.clone(), "cam1", BASE + 60, config());
    assert!(matches!(result, Err(StrandError::Configuration(_))));

    let result = MediaReader::channel(pool, Catalog::default(), "cam1", BASE, config());
    assert!(matches!(result, Err(StrandError::Configuration(_))));

    // 覆盖起始时间但文件缺失: 会话失败
    let reader = open_channel(catalog, BASE);
    let mut sink = CollectingSink::default();
    assert_eq!(reader.read_more_data(&mut sink), ReadFrameResult::Error);
    assert!(sink.events.is_empty());
}

#[test]
fn test_sink_retained_pages_outlive_delivery() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::new(vec![write_segment(dir.path(), "cam1", BASE, 1)]);
    let reader = open_channel(catalog, BASE);
    let mut sink = CollectingSink {
        retain_pages: true,
        ..CollectingSink::default()
    };
    drain(&reader, &mut sink);

    let pool = Arc::clone(reader.page_pool());
    drop(reader);
    let retained_pages: usize = sink.retained.iter().map(PageList::page_count).sum();
    assert!(retained_pages > 0);
    assert_eq!(pool.outstanding(), retained_pages);

    // 保留的页仍能读出原始数据
    assert_eq!(sink.retained[1].to_vec(), vec![0x65, 0]);
    for pages in sink.retained.drain(..) {
        pool.release_pages(pages);
    }
    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn test_scan_dir_catalog_drives_playback() {
    let dir = tempfile::tempdir().unwrap();
    write_segment(dir.path(), "cam1", BASE, 2);
    write_segment(dir.path(), "cam1", BASE + 2, 2);
    write_segment(dir.path(), "cam2", BASE, 2);

    let catalog = Catalog::scan_dir(dir.path(), "cam1", "flv").unwrap();
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.find_covering(BASE + 1), Some(0));
    assert_eq!(catalog.find_covering(BASE + 2), Some(1));

    let reader = open_channel(catalog, BASE + 2);
    let mut sink = CollectingSink::default();
    drain(&reader, &mut sink);
    assert_eq!(reader.stats().segments_opened, 1);
    assert_eq!(timestamp(&sink.events[0]), (BASE + 2) * NANOS);
}
