//! # strand-codec
//!
//! Strand 码流层: 编解码器标识、压缩数据包, 以及 H.264 码流参数转换.
//!
//! 不做任何解码/编码, 只处理码流封装形式:
//! - Annex B (起始码分隔) NAL 单元扫描
//! - Annex B extradata → AVCDecoderConfigurationRecord (avcC)
//! - Annex B 码流 → 4 字节长度前缀码流

pub mod codec_id;
pub mod packet;
pub mod parsers;

// 重导出常用类型
pub use codec_id::CodecId;
pub use packet::Packet;
