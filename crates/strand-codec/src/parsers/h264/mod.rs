//! H.264/AVC 码流参数转换.
//!
//! - NAL 单元扫描与类型识别
//! - Annex B → 长度前缀格式转换
//! - AVCDecoderConfigurationRecord (avcC) 的构建与解析

pub mod avcc;
pub mod nal;

pub use avcc::{AvccConfig, build_config_record, parse_config_record, write_config_record};
pub use nal::{
    NalUnitType, NalUnits, annex_b_to_length_prefixed, has_start_code, length_prefixed_size,
    scan_nal_units,
};
