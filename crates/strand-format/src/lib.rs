//! # strand-format
//!
//! Strand 容器格式库, 负责打开录像分段文件并读出压缩数据包.
//!
//! 对标 FFmpeg 的 libavformat, 目前只实现 FLV 解封装.

pub mod context;
pub mod demuxer;
pub mod demuxers;
pub mod format_id;
pub mod io;
pub mod probe;
pub mod registry;
pub mod stream;

// 重导出常用类型
pub use context::FormatContext;
pub use demuxer::{Demuxer, SeekFlags};
pub use format_id::FormatId;
pub use io::IoContext;
pub use probe::ProbeResult;
pub use registry::{FormatRegistry, init, probe_lock};
pub use stream::{Stream, StreamParams};
