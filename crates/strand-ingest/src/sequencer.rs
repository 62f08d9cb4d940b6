//! 分段定序器.
//!
//! 把一个通道的录像目录呈现为一条连续的流: 从覆盖起始时间的分段开始,
//! 按目录顺序依次打开后续分段.
//!
//! 状态: `Unopened → Positioned → SegmentOpen → (advance) →
//! SegmentOpen | ExhaustedCatalog | Failed`.
//!
//! 只有第一个打开的分段会做校正定位: 若文件名中的起始时刻早于请求的起始时间,
//! 向后跳过两者之差 (秒). 目录窗口与文件自身时间轴不一致 (录制起始抖动) 时,
//! 首帧时间戳会偏差同样的量, 这里不做修正.

use std::path::PathBuf;

use log::{debug, error, info};
use strand_core::{StrandError, StrandResult};
use strand_format::FormatContext;

use crate::catalog::Catalog;
use crate::naming::SegmentName;

/// 定序器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// 尚未初始化
    Unopened,
    /// 已定位到起始分段, 尚未打开
    Positioned,
    /// 有分段处于打开状态
    SegmentOpen,
    /// 目录已读完
    ExhaustedCatalog,
    /// 失败, 不再产出数据
    Failed,
}

/// 新打开的分段
pub struct OpenedSegment {
    /// 已打开 (且可能已定位) 的输入
    pub input: FormatContext,
    /// 文件名中编码的起始时刻 (纳秒)
    pub epoch_nanos: u64,
    /// 文件路径
    pub path: PathBuf,
}

/// 分段定序器
#[derive(Debug)]
pub struct SegmentSequencer {
    catalog: Catalog,
    cursor: usize,
    start_unixtime_sec: u64,
    file_extension: String,
    state: SequencerState,
    segments_opened: usize,
}

impl SegmentSequencer {
    /// 创建定序器
    pub fn new(catalog: Catalog, start_unixtime_sec: u64, file_extension: impl Into<String>) -> Self {
        Self {
            catalog,
            cursor: 0,
            start_unixtime_sec,
            file_extension: file_extension.into(),
            state: SequencerState::Unopened,
            segments_opened: 0,
        }
    }

    /// 定位到覆盖起始时间的分段, 不打开任何文件
    pub fn initialize(&mut self) -> StrandResult<()> {
        match self.catalog.find_covering(self.start_unixtime_sec) {
            Some(index) => {
                self.cursor = index;
                self.state = SequencerState::Positioned;
                info!(
                    "起始时间 {} 落在第 {index} 个分段 (共 {} 个)",
                    self.start_unixtime_sec,
                    self.catalog.len()
                );
                Ok(())
            }
            None => {
                self.state = SequencerState::Failed;
                error!("没有录像覆盖起始时间 {}", self.start_unixtime_sec);
                Err(StrandError::Configuration(format!(
                    "没有录像覆盖起始时间 {}",
                    self.start_unixtime_sec
                )))
            }
        }
    }

    /// 打开目录游标处的下一个分段
    ///
    /// 返回 `Ok(None)` 表示目录已读完.
    pub fn advance(&mut self) -> StrandResult<Option<OpenedSegment>> {
        match self.state {
            SequencerState::Unopened => {
                return Err(StrandError::Internal("定序器尚未初始化".into()));
            }
            SequencerState::Failed => {
                return Err(StrandError::Internal("定序器已失败".into()));
            }
            SequencerState::ExhaustedCatalog => return Ok(None),
            SequencerState::Positioned | SequencerState::SegmentOpen => {}
        }

        let Some(segment) = self.catalog.get(self.cursor) else {
            info!("录像目录已读完, 共打开 {} 个分段", self.segments_opened);
            self.state = SequencerState::ExhaustedCatalog;
            return Ok(None);
        };
        let path = segment.path(&self.file_extension);
        self.cursor += 1;

        match self.open_segment(path) {
            Ok(opened) => {
                self.state = SequencerState::SegmentOpen;
                self.segments_opened += 1;
                Ok(Some(opened))
            }
            Err(e) => {
                error!("打开分段失败: {e}");
                self.state = SequencerState::Failed;
                Err(e)
            }
        }
    }

    fn open_segment(&self, path: PathBuf) -> StrandResult<OpenedSegment> {
        debug!("打开分段 {}", path.display());
        let mut input = FormatContext::open_input(&path)?;
        let name = SegmentName::decode(&path.to_string_lossy())?;

        let file_secs = name.epoch_secs();
        if self.segments_opened == 0 && file_secs < self.start_unixtime_sec {
            let skip = (self.start_unixtime_sec - file_secs) as f64;
            info!("{}: 文件起始 {file_secs} 早于请求时间, 跳过 {skip} 秒", path.display());
            input.seek_seconds(skip)?;
        }

        Ok(OpenedSegment {
            input,
            epoch_nanos: name.epoch_nanos,
            path,
        })
    }

    /// 当前状态
    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// 目录游标 (下一个要打开的分段)
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// 已打开的分段数
    pub fn segments_opened(&self) -> usize {
        self.segments_opened
    }
}
