//! 回放会话配置.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strand_core::{StrandError, StrandResult};

fn default_transient_backoff_ms() -> u64 {
    100
}

fn default_page_size() -> usize {
    4096
}

fn default_file_extension() -> String {
    "flv".to_string()
}

/// 回放会话配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// 下游单次突发的字节上限 (0 表示不限制), 由 sink 据此返回 `BurstLimit`
    #[serde(default)]
    pub burst_size_limit: usize,
    /// 读到 "暂时不可用" 时的重试间隔 (毫秒)
    #[serde(default = "default_transient_backoff_ms")]
    pub transient_backoff_ms: u64,
    /// 页池的页大小 (字节)
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// 录像分段的文件扩展名 (不含 `.`)
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            burst_size_limit: 0,
            transient_backoff_ms: default_transient_backoff_ms(),
            page_size: default_page_size(),
            file_extension: default_file_extension(),
        }
    }
}

impl IngestConfig {
    /// 瞬时错误重试间隔
    pub fn transient_backoff(&self) -> Duration {
        Duration::from_millis(self.transient_backoff_ms)
    }

    /// 校验配置
    pub fn validate(&self) -> StrandResult<()> {
        if self.page_size == 0 {
            return Err(StrandError::InvalidArgument("page_size 不能为 0".into()));
        }
        let ext = &self.file_extension;
        if ext.is_empty() || ext.contains(['.', '/', '\\']) {
            return Err(StrandError::InvalidArgument(format!(
                "非法的文件扩展名: {ext:?}"
            )));
        }
        Ok(())
    }
}
