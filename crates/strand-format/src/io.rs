//! I/O 抽象层.
//!
//! 对标 FFmpeg 的 `AVIOContext`, 为解封装器提供统一的带缓冲读取接口,
//! 支持文件与内存缓冲区两种后端.
//!
//! 后端返回 `WouldBlock` 时 (例如正在被录制程序追加写入的文件),
//! 读取方法返回 [`StrandError::Again`], 由上层决定何时重试.

use byteorder::{BigEndian, ByteOrder};
use std::io::{self, Read, Seek};
use std::path::Path;
use strand_core::{StrandError, StrandResult};

/// I/O 上下文
pub struct IoContext {
    /// 内部 I/O 实现
    inner: Box<dyn IoBackend>,
    /// 读缓冲区
    buffer: Vec<u8>,
    /// 缓冲区中的有效数据长度
    buf_len: usize,
    /// 缓冲区当前读取位置
    buf_pos: usize,
}

/// I/O 后端 trait
pub trait IoBackend: Send {
    /// 读取数据到缓冲区
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// 定位 (seek)
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64>;
    /// 获取当前位置
    fn position(&mut self) -> io::Result<u64>;
    /// 获取总大小 (如果可知)
    fn size(&self) -> Option<u64>;
    /// 是否支持 seek
    fn is_seekable(&self) -> bool;
}

/// 默认缓冲区大小 (32 KB)
const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

impl IoContext {
    /// 从 I/O 后端创建上下文
    pub fn new(backend: Box<dyn IoBackend>) -> Self {
        Self {
            inner: backend,
            buffer: vec![0u8; DEFAULT_BUFFER_SIZE],
            buf_len: 0,
            buf_pos: 0,
        }
    }

    /// 从文件路径打开 (只读)
    pub fn open_read(path: impl AsRef<Path>) -> StrandResult<Self> {
        let file = std::fs::File::open(path)?;
        Ok(Self::new(Box::new(FileBackend::new(file))))
    }

    /// 从内存数据创建 (只读)
    pub fn from_memory(data: Vec<u8>) -> Self {
        Self::new(Box::new(MemoryBackend::from_data(data)))
    }

    /// 从后端填充读缓冲区, 返回读到的字节数 (0 表示 EOF)
    fn fill_buffer(&mut self) -> StrandResult<usize> {
        self.buf_pos = 0;
        self.buf_len = 0;
        loop {
            match self.inner.read(&mut self.buffer) {
                Ok(n) => {
                    self.buf_len = n;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Err(StrandError::Again),
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ========================
    // 读取方法
    // ========================

    /// 读取指定字节数
    pub fn read_exact(&mut self, buf: &mut [u8]) -> StrandResult<()> {
        let mut total_read = 0;
        while total_read < buf.len() {
            let buffered = self.buf_len - self.buf_pos;
            if buffered > 0 {
                let to_copy = buffered.min(buf.len() - total_read);
                buf[total_read..total_read + to_copy]
                    .copy_from_slice(&self.buffer[self.buf_pos..self.buf_pos + to_copy]);
                self.buf_pos += to_copy;
                total_read += to_copy;
            } else if self.fill_buffer()? == 0 {
                return Err(StrandError::Eof);
            }
        }
        Ok(())
    }

    /// 读取 1 个字节
    pub fn read_u8(&mut self) -> StrandResult<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// 读取 u24 大端 (3 字节无符号整数)
    pub fn read_u24_be(&mut self) -> StrandResult<u32> {
        let mut buf = [0u8; 3];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_u24(&buf))
    }

    /// 读取 u32 大端
    pub fn read_u32_be(&mut self) -> StrandResult<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_u32(&buf))
    }

    /// 读取指定数量的字节
    pub fn read_bytes(&mut self, count: usize) -> StrandResult<Vec<u8>> {
        let mut buf = vec![0u8; count];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// 从文件头读取最多 `max` 字节用于格式探测, 读完后回到开头
    pub fn read_probe_data(&mut self, max: usize) -> StrandResult<Vec<u8>> {
        self.seek(io::SeekFrom::Start(0))?;
        let mut data = Vec::with_capacity(max.min(DEFAULT_BUFFER_SIZE));
        while data.len() < max {
            let buffered = self.buf_len - self.buf_pos;
            if buffered == 0 {
                if self.fill_buffer()? == 0 {
                    break;
                }
                continue;
            }
            let take = buffered.min(max - data.len());
            data.extend_from_slice(&self.buffer[self.buf_pos..self.buf_pos + take]);
            self.buf_pos += take;
        }
        self.seek(io::SeekFrom::Start(0))?;
        Ok(data)
    }

    /// 跳过指定字节数
    pub fn skip(&mut self, count: usize) -> StrandResult<()> {
        let buffered = self.buf_len - self.buf_pos;
        if count <= buffered {
            self.buf_pos += count;
            return Ok(());
        }

        let remaining = count - buffered;
        self.buf_pos = self.buf_len;

        if self.inner.is_seekable() {
            self.inner.seek(io::SeekFrom::Current(remaining as i64))?;
        } else {
            // 逐块丢弃读取的数据
            let mut left = remaining;
            while left > 0 {
                let n = self.fill_buffer()?;
                if n == 0 {
                    return Err(StrandError::Eof);
                }
                let used = n.min(left);
                self.buf_pos = used;
                left -= used;
            }
        }
        Ok(())
    }

    // ========================
    // 定位方法
    // ========================

    /// 定位 (seek), 会清空读缓冲区
    pub fn seek(&mut self, pos: io::SeekFrom) -> StrandResult<u64> {
        let pos = match pos {
            // 相对定位需要扣除缓冲区中尚未消耗的数据
            io::SeekFrom::Current(offset) => {
                let buffered = (self.buf_len - self.buf_pos) as i64;
                io::SeekFrom::Current(offset - buffered)
            }
            other => other,
        };
        self.buf_pos = 0;
        self.buf_len = 0;
        Ok(self.inner.seek(pos)?)
    }

    /// 获取当前位置 (考虑读缓冲区中尚未消耗的数据量)
    pub fn position(&mut self) -> StrandResult<u64> {
        let raw_pos = self.inner.position()?;
        let buffered = (self.buf_len - self.buf_pos) as u64;
        Ok(raw_pos - buffered)
    }

    /// 是否支持随机访问
    pub fn is_seekable(&self) -> bool {
        self.inner.is_seekable()
    }

    /// 获取总大小
    pub fn size(&self) -> Option<u64> {
        self.inner.size()
    }
}

/// 文件 I/O 后端
struct FileBackend {
    file: std::fs::File,
    size: Option<u64>,
}

impl FileBackend {
    fn new(file: std::fs::File) -> Self {
        let size = file.metadata().ok().map(|m| m.len());
        Self { file, size }
    }
}

impl IoBackend for FileBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }

    fn position(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

/// 内存缓冲区 I/O 后端, 用于测试和内存中处理
pub struct MemoryBackend {
    /// 数据缓冲区
    data: Vec<u8>,
    /// 当前位置
    pos: usize,
}

impl MemoryBackend {
    /// 从已有数据创建
    pub fn from_data(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

impl IoBackend for MemoryBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.data.len().saturating_sub(self.pos);
        let to_read = buf.len().min(available);
        if to_read == 0 {
            return Ok(0);
        }
        buf[..to_read].copy_from_slice(&self.data[self.pos..self.pos + to_read]);
        self.pos += to_read;
        Ok(to_read)
    }

    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            io::SeekFrom::Start(offset) => offset as i64,
            io::SeekFrom::End(offset) => self.data.len() as i64 + offset,
            io::SeekFrom::Current(offset) => self.pos as i64 + offset,
        };
        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek 位置不能为负",
            ));
        }
        self.pos = new_pos as usize;
        Ok(self.pos as u64)
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.pos as u64)
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 只暴露前 `limit` 字节, 超出部分返回 WouldBlock
    struct GrowingBackend {
        inner: MemoryBackend,
        limit: Arc<AtomicUsize>,
    }

    impl IoBackend for GrowingBackend {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let limit = self.limit.load(Ordering::SeqCst);
            let pos = self.inner.pos;
            if pos >= limit {
                return Err(io::Error::from(io::ErrorKind::WouldBlock));
            }
            let n = buf.len().min(limit - pos);
            self.inner.read(&mut buf[..n])
        }
        fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
        fn position(&mut self) -> io::Result<u64> {
            self.inner.position()
        }
        fn size(&self) -> Option<u64> {
            None
        }
        fn is_seekable(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_big_endian_reads() {
        let mut io = IoContext::from_memory(vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        assert_eq!(io.read_u8().unwrap(), 0x01);
        assert_eq!(io.read_u24_be().unwrap(), 0x020304);
        assert_eq!(io.read_u32_be().unwrap(), 0x05060708);
        assert!(matches!(io.read_u8(), Err(StrandError::Eof)));
    }

    #[test]
    fn test_skip_and_position() {
        let mut io = IoContext::from_memory((0u8..100).collect());
        io.skip(10).unwrap();
        assert_eq!(io.position().unwrap(), 10);
        assert_eq!(io.read_u8().unwrap(), 10);
        io.seek(io::SeekFrom::Current(5)).unwrap();
        assert_eq!(io.read_u8().unwrap(), 16);
    }

    #[test]
    fn test_probe_data_rewinds() {
        let mut io = IoContext::from_memory(b"FLV\x01\x05rest".to_vec());
        let head = io.read_probe_data(4).unwrap();
        assert_eq!(head, b"FLV\x01");
        assert_eq!(io.read_u8().unwrap(), b'F');
    }

    #[test]
    fn test_would_block_maps_to_again() {
        let limit = Arc::new(AtomicUsize::new(2));
        let backend = GrowingBackend {
            inner: MemoryBackend::from_data(vec![0xAA, 0xBB, 0xCC, 0xDD]),
            limit: Arc::clone(&limit),
        };
        let mut io = IoContext::new(Box::new(backend));
        assert!(matches!(io.read_u32_be(), Err(StrandError::Again)));

        io.seek(io::SeekFrom::Start(0)).unwrap();
        limit.store(4, Ordering::SeqCst);
        assert_eq!(io.read_u32_be().unwrap(), 0xAABBCCDD);
    }
}
