//! 录像目录 (catalog).
//!
//! 一个通道的所有录像分段, 按时间顺序排列, 每段覆盖 `[time_start, time_end)` 秒.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use strand_core::StrandResult;
use strand_format::FormatContext;

use crate::naming::{SegmentName, segment_path};

/// 一个录像分段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingSegment {
    /// 存储位置 (磁盘根目录)
    pub disk_location: PathBuf,
    /// 分段键, 见 [`crate::naming`]
    pub channel_key: String,
    /// 起始时间 (Unix 秒, 含)
    pub time_start: u64,
    /// 结束时间 (Unix 秒, 不含)
    pub time_end: u64,
}

impl RecordingSegment {
    /// 该分段是否覆盖时刻 `t`
    pub fn covers(&self, t: u64) -> bool {
        self.time_start <= t && t < self.time_end
    }

    /// 分段文件路径
    pub fn path(&self, ext: &str) -> PathBuf {
        segment_path(&self.disk_location, &self.channel_key, ext)
    }
}

/// 有序的录像目录
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    segments: Vec<RecordingSegment>,
}

impl Catalog {
    /// 由已排好序的分段列表创建
    pub fn new(segments: Vec<RecordingSegment>) -> Self {
        Self { segments }
    }

    /// 分段数量
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// 按下标获取分段
    pub fn get(&self, index: usize) -> Option<&RecordingSegment> {
        self.segments.get(index)
    }

    /// 遍历所有分段
    pub fn iter(&self) -> impl Iterator<Item = &RecordingSegment> {
        self.segments.iter()
    }

    /// 查找覆盖时刻 `t` 的分段下标
    pub fn find_covering(&self, t: u64) -> Option<usize> {
        self.segments.iter().position(|s| s.covers(t))
    }

    /// 扫描 `{root}/{channel}/{YYYYMMDD}/*.{ext}` 建立目录
    ///
    /// 每段的结束时间取下一段的起始时间; 最后一段用探测到的时长,
    /// 时长未知时按 1 秒计. 无法解析的文件名会被跳过.
    pub fn scan_dir(root: &Path, channel: &str, ext: &str) -> StrandResult<Self> {
        let channel_dir = root.join(channel);
        let mut names = Vec::new();

        let mut day_dirs: Vec<PathBuf> = fs::read_dir(&channel_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        day_dirs.sort();

        for day_dir in day_dirs {
            for entry in fs::read_dir(&day_dir)? {
                let path = entry?.path();
                let matches_ext = path
                    .extension()
                    .is_some_and(|e| e.eq_ignore_ascii_case(ext));
                if !matches_ext {
                    continue;
                }
                match SegmentName::decode(&path.to_string_lossy()) {
                    Ok(name) if name.channel == channel => names.push(name),
                    Ok(name) => debug!("跳过其他通道的分段 {}: {}", path.display(), name.channel),
                    Err(e) => warn!("跳过 {}: {e}", path.display()),
                }
            }
        }
        names.sort_by_key(|n| n.epoch_nanos);

        let mut segments = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let channel_key = name.encode()?;
            let time_start = name.epoch_secs();
            let time_end = match names.get(i + 1) {
                Some(next) => next.epoch_secs().max(time_start),
                None => time_start + last_segment_secs(&segment_path(root, &channel_key, ext)),
            };
            segments.push(RecordingSegment {
                disk_location: root.to_path_buf(),
                channel_key,
                time_start,
                time_end,
            });
        }

        info!(
            "扫描通道 {channel}: {} 个分段, 目录 {}",
            segments.len(),
            channel_dir.display()
        );
        Ok(Self::new(segments))
    }
}

/// 最后一段的时长 (秒, 向上取整, 至少 1 秒)
fn last_segment_secs(path: &Path) -> u64 {
    match FormatContext::open_input(path).map(|ctx| ctx.duration()) {
        Ok(Some(secs)) if secs > 0.0 => secs.ceil() as u64,
        Ok(_) => 1,
        Err(e) => {
            warn!("无法探测 {} 的时长: {e}", path.display());
            1
        }
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a RecordingSegment;
    type IntoIter = std::slice::Iter<'a, RecordingSegment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}
