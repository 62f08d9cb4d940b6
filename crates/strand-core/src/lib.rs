//! # strand-core
//!
//! Strand 录像回放框架核心库, 提供基础类型定义、错误处理和工具函数.
//!
//! 其余 crate (codec / format / ingest) 都依赖本 crate 的错误类型与时间类型.

pub mod error;
pub mod fixed_buffer;
pub mod media_type;
pub mod rational;
pub mod timestamp;

// 重导出常用类型
pub use error::{StrandError, StrandResult};
pub use fixed_buffer::FixedBuffer;
pub use media_type::MediaType;
pub use rational::Rational;
pub use timestamp::Timestamp;
