//! 录像分段命名编解码.
//!
//! 录制程序把分段的起始时刻编码进文件名, 回放端据此恢复绝对时间轴.
//! 分段键 (channel key) 的格式为:
//!
//! ```text
//! {channel}/{YYYYMMDD}/{HHMMSS}_{nanos:09}
//! ```
//!
//! 日期与时间均为 UTC. 磁盘路径为 `{disk_location}/{channel key}.{ext}`.
//! 同一通道的分段键按字典序排列即为时间顺序.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use strand_core::timestamp::NANOS_PER_SEC;
use strand_core::{StrandError, StrandResult};

/// 解析后的分段名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentName {
    /// 通道名
    pub channel: String,
    /// 分段起始时刻 (Unix 纪元纳秒)
    pub epoch_nanos: u64,
}

impl SegmentName {
    /// 创建分段名
    pub fn new(channel: impl Into<String>, epoch_nanos: u64) -> Self {
        Self {
            channel: channel.into(),
            epoch_nanos,
        }
    }

    /// 分段起始时刻 (秒, 向下取整)
    pub fn epoch_secs(&self) -> u64 {
        self.epoch_nanos / NANOS_PER_SEC
    }

    /// 编码为分段键
    pub fn encode(&self) -> StrandResult<String> {
        if self.channel.is_empty() {
            return Err(StrandError::InvalidArgument("通道名不能为空".into()));
        }
        let secs = i64::try_from(self.epoch_secs())
            .map_err(|_| StrandError::InvalidArgument("时间超出范围".into()))?;
        let nanos = self.epoch_nanos % NANOS_PER_SEC;
        let dt = DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| {
            StrandError::InvalidArgument(format!("无法表示的时间: {secs}s"))
        })?;
        Ok(format!(
            "{}/{}/{}_{nanos:09}",
            self.channel,
            dt.format("%Y%m%d"),
            dt.format("%H%M%S"),
        ))
    }

    /// 从分段键或完整文件路径解码
    ///
    /// 路径中的目录前缀与扩展名会被忽略, 只解析最后三级:
    /// 通道名 / 日期 / 时间.
    pub fn decode(name: &str) -> StrandResult<Self> {
        let invalid = || StrandError::InvalidData(format!("无法解析的分段名: {name}"));

        let mut parts = name.trim_end_matches('/').rsplit(['/', '\\']);
        let file = parts.next().ok_or_else(invalid)?;
        let date = parts.next().ok_or_else(invalid)?;
        let channel = parts.next().filter(|c| !c.is_empty()).ok_or_else(invalid)?;

        let stem = file.split_once('.').map_or(file, |(stem, _)| stem);
        let (time, nanos) = stem.split_once('_').ok_or_else(invalid)?;
        if !all_digits(date, 8) || !all_digits(time, 6) || !all_digits(nanos, 9) {
            return Err(invalid());
        }

        let date = NaiveDate::parse_from_str(date, "%Y%m%d").map_err(|_| invalid())?;
        let time = NaiveTime::parse_from_str(time, "%H%M%S").map_err(|_| invalid())?;
        let secs = u64::try_from(date.and_time(time).and_utc().timestamp()).map_err(|_| invalid())?;
        let nanos: u64 = nanos.parse().map_err(|_| invalid())?;

        let epoch_nanos = secs
            .checked_mul(NANOS_PER_SEC)
            .and_then(|n| n.checked_add(nanos))
            .ok_or_else(invalid)?;
        Ok(Self::new(channel, epoch_nanos))
    }

    /// 磁盘上的文件路径
    pub fn file_path(&self, disk_location: &Path, ext: &str) -> StrandResult<PathBuf> {
        Ok(segment_path(disk_location, &self.encode()?, ext))
    }
}

/// 由存储位置与分段键拼出文件路径
pub fn segment_path(disk_location: &Path, channel_key: &str, ext: &str) -> PathBuf {
    disk_location.join(format!("{channel_key}.{ext}"))
}

fn all_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}
