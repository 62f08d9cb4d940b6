//! 定长输出缓冲区.
//!
//! 容量在创建时确定, 之后不再增长. 任何会使已用长度达到或超过容量的追加
//! 都直接失败, 且不改动已写入的内容和已用长度.
//!
//! 调用方需要按输入规模预留足够空间 (经验值: 不小于输入的 2 倍).

use byteorder::{BigEndian, ByteOrder};
use log::debug;

use crate::error::{StrandError, StrandResult};

/// 定长输出缓冲区
#[derive(Debug, Clone)]
pub struct FixedBuffer {
    /// 底层存储, 长度恒等于容量
    data: Vec<u8>,
    /// 已写入字节数
    used: usize,
}

impl FixedBuffer {
    /// 以指定容量创建缓冲区
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
            used: 0,
        }
    }

    /// 缓冲区容量
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// 已写入字节数
    pub fn len(&self) -> usize {
        self.used
    }

    /// 是否尚未写入任何数据
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// 已写入的数据
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.used]
    }

    /// 回退到指定长度 (只能缩短)
    pub fn truncate(&mut self, len: usize) {
        if len < self.used {
            self.used = len;
        }
    }

    /// 清空已写入内容, 容量不变
    pub fn clear(&mut self) {
        self.used = 0;
    }

    /// 消耗自身, 返回已写入的数据
    pub fn into_vec(mut self) -> Vec<u8> {
        self.data.truncate(self.used);
        self.data
    }

    /// 预留 `n` 字节并返回可写区间
    fn reserve(&mut self, n: usize) -> StrandResult<&mut [u8]> {
        let end = self.used.checked_add(n);
        match end {
            Some(end) if end < self.data.len() => {
                let start = self.used;
                self.used = end;
                Ok(&mut self.data[start..end])
            }
            _ => {
                debug!(
                    "定长缓冲区溢出: 已用 {}, 追加 {n}, 容量 {}",
                    self.used,
                    self.data.len()
                );
                Err(StrandError::BufferOverflow {
                    used: self.used,
                    requested: n,
                    capacity: self.data.len(),
                })
            }
        }
    }

    /// 写入 1 字节
    pub fn write_u8(&mut self, v: u8) -> StrandResult<()> {
        self.reserve(1)?[0] = v;
        Ok(())
    }

    /// 写入 u16 大端
    pub fn write_u16_be(&mut self, v: u16) -> StrandResult<()> {
        BigEndian::write_u16(self.reserve(2)?, v);
        Ok(())
    }

    /// 写入 u32 大端
    pub fn write_u32_be(&mut self, v: u32) -> StrandResult<()> {
        BigEndian::write_u32(self.reserve(4)?, v);
        Ok(())
    }

    /// 写入原始字节区间
    pub fn write_bytes(&mut self, bytes: &[u8]) -> StrandResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.reserve(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_writes() {
        let mut buf = FixedBuffer::with_capacity(16);
        buf.write_u8(0x01).unwrap();
        buf.write_u16_be(0x0203).unwrap();
        buf.write_u32_be(0x0405_0607).unwrap();
        buf.write_bytes(&[0xAA, 0xBB]).unwrap();
        assert_eq!(
            buf.as_slice(),
            &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0xAA, 0xBB]
        );
    }

    #[test]
    fn test_write_reaching_capacity_fails() {
        // 容量 4: 写满 4 字节 (达到容量) 也算失败
        let mut buf = FixedBuffer::with_capacity(4);
        assert!(buf.write_u32_be(0xDEAD_BEEF).is_err());
        assert_eq!(buf.len(), 0);

        buf.write_u16_be(0x1122).unwrap();
        buf.write_u8(0x33).unwrap();
        assert!(buf.write_u8(0x44).is_err());
        assert_eq!(buf.as_slice(), &[0x11, 0x22, 0x33]);
    }

    #[test]
    fn test_failed_write_keeps_previous_bytes() {
        let mut buf = FixedBuffer::with_capacity(8);
        buf.write_bytes(&[1, 2, 3, 4, 5]).unwrap();
        let err = buf.write_u32_be(0xFFFF_FFFF).expect_err("应溢出");
        assert!(matches!(
            err,
            StrandError::BufferOverflow {
                used: 5,
                requested: 4,
                capacity: 8
            }
        ));
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.as_slice(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_truncate_and_into_vec() {
        let mut buf = FixedBuffer::with_capacity(8);
        buf.write_bytes(&[9, 8, 7]).unwrap();
        buf.truncate(1);
        buf.truncate(5);
        assert_eq!(buf.into_vec(), vec![9]);
    }

    #[test]
    fn test_zero_capacity_buffer() {
        let mut buf = FixedBuffer::with_capacity(0);
        assert!(buf.write_u8(0).is_err());
        assert!(buf.write_bytes(&[]).is_ok());
        assert!(buf.is_empty());
    }
}
