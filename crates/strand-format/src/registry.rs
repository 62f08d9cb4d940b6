//! 容器格式注册表.
//!
//! 管理所有已注册的解封装器, 支持按格式标识查找和自动探测.
//! 进程内只有一份全局注册表, 由 [`init`] 惰性建立, 重复调用无副作用.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use log::info;
use strand_core::{StrandError, StrandResult};

use crate::demuxer::Demuxer;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::probe::{FormatProbe, PROBE_SIZE, ProbeResult};

/// 解封装器工厂函数类型
pub type DemuxerFactory = fn() -> StrandResult<Box<dyn Demuxer>>;

static REGISTRY: OnceLock<FormatRegistry> = OnceLock::new();

/// 探测与打开输入时持有的全局锁
static PROBE_LOCK: Mutex<()> = Mutex::new(());

/// 获取全局注册表, 首次调用时注册所有内置格式
pub fn init() -> &'static FormatRegistry {
    REGISTRY.get_or_init(|| {
        let mut registry = FormatRegistry::new();
        crate::demuxers::register_all_demuxers(&mut registry);
        info!("容器格式注册完成, 共 {} 个解封装器", registry.demuxers.len());
        registry
    })
}

/// 获取探测锁
///
/// 同一时刻只允许一个会话执行 "探测 + 解析头部", 其余读取操作不受限制.
pub fn probe_lock() -> MutexGuard<'static, ()> {
    PROBE_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 容器格式注册表
pub struct FormatRegistry {
    /// 解封装器工厂映射
    demuxers: HashMap<FormatId, DemuxerEntry>,
    /// 格式探测器列表
    probes: Vec<Box<dyn FormatProbe + Send + Sync>>,
}

/// 解封装器注册条目
struct DemuxerEntry {
    /// 格式名称
    name: String,
    /// 工厂函数
    factory: DemuxerFactory,
}

impl FormatRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            demuxers: HashMap::new(),
            probes: Vec::new(),
        }
    }

    /// 注册一个解封装器
    pub fn register_demuxer(
        &mut self,
        format_id: FormatId,
        name: impl Into<String>,
        factory: DemuxerFactory,
    ) {
        self.demuxers.insert(
            format_id,
            DemuxerEntry {
                name: name.into(),
                factory,
            },
        );
    }

    /// 注册一个格式探测器
    pub fn register_probe(&mut self, probe: Box<dyn FormatProbe + Send + Sync>) {
        self.probes.push(probe);
    }

    /// 创建指定格式的解封装器实例
    pub fn create_demuxer(&self, format_id: FormatId) -> StrandResult<Box<dyn Demuxer>> {
        let entry = self.demuxers.get(&format_id).ok_or_else(|| {
            StrandError::FormatNotFound(format!("未找到 {} 的解封装器", format_id))
        })?;
        (entry.factory)()
    }

    /// 探测数据的容器格式, 返回置信度最高的结果
    pub fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeResult> {
        let mut best: Option<ProbeResult> = None;
        for probe in &self.probes {
            if let Some(score) = probe.probe(data, filename) {
                let is_better = best.as_ref().is_none_or(|b| score > b.score);
                if is_better {
                    best = Some(ProbeResult {
                        format_id: probe.format_id(),
                        score,
                    });
                }
            }
        }
        best
    }

    /// 获取所有已注册的解封装器名称
    pub fn list_demuxers(&self) -> Vec<(FormatId, &str)> {
        self.demuxers
            .iter()
            .map(|(id, entry)| (*id, entry.name.as_str()))
            .collect()
    }

    /// 探测输入格式并创建解封装器, 调用 `open()` 解析头部
    ///
    /// 探测读取的数据会被回退, 解封装器从文件开头开始解析.
    pub fn open_input(
        &self,
        io: &mut IoContext,
        filename: Option<&str>,
    ) -> StrandResult<Box<dyn Demuxer>> {
        let head = io.read_probe_data(PROBE_SIZE)?;
        let result = self
            .probe(&head, filename)
            .ok_or_else(|| StrandError::FormatNotFound("无法识别输入文件格式".into()))?;
        let mut demuxer = self.create_demuxer(result.format_id)?;
        demuxer.open(io)?;
        Ok(demuxer)
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}
