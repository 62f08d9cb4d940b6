//! H.264 NAL (Network Abstraction Layer) 单元扫描.
//!
//! # Annex B 格式
//!
//! Annex B 使用起始码 (start code) 分隔 NAL 单元:
//! - 3 字节起始码: `00 00 01`
//! - 4 字节起始码: `00 00 00 01`
//!
//! 4 字节起始码被视为 "1 个填充 0 + 3 字节起始码", 因此紧挨在起始码前的
//! 单个 0 字节不属于上一个 NAL 单元.
//!
//! # NAL 头部 (1 字节)
//! ```text
//! ┌─────────────────────────────────────┐
//! │ forbidden(1) | ref_idc(2) | type(5) │
//! └─────────────────────────────────────┘
//! ```
//!
//! # 长度前缀格式
//! ```text
//! [length: 4 bytes BE] [NAL data: length bytes]
//! ```

use strand_core::{FixedBuffer, StrandResult};

/// 3 字节起始码
const START_CODE: [u8; 3] = [0x00, 0x00, 0x01];

/// NAL 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum NalUnitType {
    /// 非 IDR 图像切片 (P/B slice)
    Slice,
    /// IDR 图像切片 (关键帧)
    SliceIdr,
    /// 增补增强信息 (SEI)
    Sei,
    /// 序列参数集 (SPS)
    Sps,
    /// 图像参数集 (PPS)
    Pps,
    /// 访问单元分隔符 (AUD)
    Aud,
    /// 其他类型
    Other(u8),
}

impl NalUnitType {
    /// 从 NAL 头部字节解析类型 (`type = header & 0x1F`)
    pub fn from_header(header: u8) -> Self {
        match header & 0x1F {
            1 => Self::Slice,
            5 => Self::SliceIdr,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            id => Self::Other(id),
        }
    }

    /// 从 NAL 单元数据 (含头部字节) 解析类型, 空数据返回 `None`
    pub fn of(nal: &[u8]) -> Option<Self> {
        nal.first().map(|&h| Self::from_header(h))
    }

    /// 获取类型编号
    pub fn type_id(&self) -> u8 {
        match self {
            Self::Slice => 1,
            Self::SliceIdr => 5,
            Self::Sei => 6,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::Aud => 9,
            Self::Other(id) => *id,
        }
    }
}

impl std::fmt::Display for NalUnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slice => write!(f, "Slice"),
            Self::SliceIdr => write!(f, "IDR"),
            Self::Sei => write!(f, "SEI"),
            Self::Sps => write!(f, "SPS"),
            Self::Pps => write!(f, "PPS"),
            Self::Aud => write!(f, "AUD"),
            Self::Other(id) => write!(f, "Other({id})"),
        }
    }
}

/// 判断数据是否以起始码开头 (3 字节或 4 字节)
pub fn has_start_code(data: &[u8]) -> bool {
    data.starts_with(&START_CODE) || data.starts_with(&[0x00, 0x00, 0x00, 0x01])
}

/// Annex B NAL 单元迭代器
///
/// 惰性扫描, 每次产出一个不含起始码的 NAL 单元切片. 迭代器可克隆,
/// 克隆体从当前位置独立继续; 对同一数据重新调用 [`scan_nal_units`] 即从头开始.
#[derive(Debug, Clone)]
pub struct NalUnits<'a> {
    data: &'a [u8],
    /// 下一个起始码 (或其前导 0) 的位置
    pos: usize,
}

/// 扫描 Annex B 数据中的 NAL 单元
///
/// - 第一个起始码之前的数据被忽略, 起始码前的 0 填充被跳过
/// - 紧挨在下一个起始码前的单个 0 字节不计入当前 NAL
/// - 连续起始码之间的空单元被跳过
pub fn scan_nal_units(data: &[u8]) -> NalUnits<'_> {
    NalUnits {
        data,
        pos: find_start_code(data, 0),
    }
}

impl<'a> Iterator for NalUnits<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let len = self.data.len();
        loop {
            // 跳过填充 0 以及起始码末尾的 0x01
            let mut start = self.pos;
            loop {
                if start >= len {
                    self.pos = len;
                    return None;
                }
                let b = self.data[start];
                start += 1;
                if b != 0x00 {
                    break;
                }
            }
            if start >= len {
                self.pos = len;
                return None;
            }

            let end = find_start_code(self.data, start);
            self.pos = end;
            if end > start {
                return Some(&self.data[start..end]);
            }
        }
    }
}

/// 计算转换为长度前缀格式后的总字节数
pub fn length_prefixed_size(data: &[u8]) -> usize {
    scan_nal_units(data).map(|nal| 4 + nal.len()).sum()
}

/// 将 Annex B 码流转换为 4 字节长度前缀格式
///
/// 每个 NAL 单元输出 `[u32 BE 长度][NAL 数据]`, 返回本次写入的总字节数.
/// 输出缓冲区容量不足时返回错误, 缓冲区回退到调用前的状态.
pub fn annex_b_to_length_prefixed(data: &[u8], out: &mut FixedBuffer) -> StrandResult<usize> {
    let checkpoint = out.len();
    let mut total = 0usize;

    for nal in scan_nal_units(data) {
        let written = out
            .write_u32_be(nal.len() as u32)
            .and_then(|()| out.write_bytes(nal));
        if let Err(e) = written {
            log::debug!(
                "H.264: 长度前缀转换失败, nal_len={}, used={}, capacity={}",
                nal.len(),
                out.len(),
                out.capacity()
            );
            out.truncate(checkpoint);
            return Err(e);
        }
        total += 4 + nal.len();
    }

    Ok(total)
}

// ============================================================
// 内部工具函数
// ============================================================

/// 从 `from` 开始查找下一个起始码
///
/// 返回起始码位置; 若起始码前恰有一个 0 字节, 返回该 0 字节的位置.
/// 找不到时返回数据长度.
fn find_start_code(data: &[u8], from: usize) -> usize {
    let pos = data
        .get(from..)
        .and_then(|tail| tail.windows(START_CODE.len()).position(|w| w == START_CODE))
        .map_or(data.len(), |p| from + p);

    if from < pos && pos < data.len() && data[pos - 1] == 0x00 {
        pos - 1
    } else {
        pos
    }
}
