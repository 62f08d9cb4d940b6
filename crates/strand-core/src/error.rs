//! 统一错误类型定义.
//!
//! 所有 Strand crate 共用的错误类型, 支持跨模块传播.
//!
//! 控制信号 (BurstLimit / Finish / NoData) 不属于错误,
//! 由 `strand-ingest` 中的结果枚举表达.

use thiserror::Error;

/// Strand 框架统一错误类型
#[derive(Debug, Error)]
pub enum StrandError {
    /// 配置错误 (如: 没有任何录像覆盖请求的起始时间)
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的操作
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// 容器或码流格式错误 (无可用流, 缺少 SPS/PPS 等)
    #[error("格式错误: {0}")]
    Format(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 数据暂时不可用, 稍后重试
    #[error("数据暂时不可用, 请稍后重试")]
    Again,

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 定长缓冲区容量不足
    #[error("缓冲区容量不足: 已用 {used}, 需要追加 {requested}, 容量 {capacity}")]
    BufferOverflow {
        /// 已写入字节数
        used: usize,
        /// 本次追加字节数
        requested: usize,
        /// 缓冲区容量
        capacity: usize,
    },

    /// 未找到指定的容器格式
    #[error("未找到容器格式: {0}")]
    FormatNotFound(String),

    /// 未找到指定的流
    #[error("未找到流: 索引 {0}")]
    StreamNotFound(usize),

    /// 无效数据 (损坏的码流、无法解析的文件名等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 功能未实现
    #[error("功能未实现: {0}")]
    NotImplemented(String),

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

impl StrandError {
    /// 是否为可原地重试的瞬时错误
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Again => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

/// Strand 框架统一 Result 类型
pub type StrandResult<T> = Result<T, StrandError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StrandError::Again.is_transient());
        let would_block = std::io::Error::from(std::io::ErrorKind::WouldBlock);
        assert!(StrandError::Io(would_block).is_transient());
        let not_found = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert!(!StrandError::Io(not_found).is_transient());
        assert!(!StrandError::Eof.is_transient());
    }

    #[test]
    fn test_buffer_overflow_message() {
        let err = StrandError::BufferOverflow {
            used: 10,
            requested: 4,
            capacity: 12,
        };
        let msg = format!("{err}");
        assert!(msg.contains("容量 12"), "actual={msg}");
    }
}
