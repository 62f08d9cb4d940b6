//! 零拷贝页池.
//!
//! 把一段字节切成固定大小的页交给下游, 每页都是同一块 `Bytes` 的切片,
//! 不复制负载. 页列表必须通过 [`PagePool::release_pages`] 归还,
//! `outstanding()` 用于发现泄漏.

use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;

/// 页池
#[derive(Debug)]
pub struct PagePool {
    page_size: usize,
    outstanding: AtomicUsize,
}

/// 一条消息占用的页列表
#[derive(Debug)]
#[must_use = "页列表必须通过 PagePool::release_pages 归还"]
pub struct PageList {
    pages: Vec<Bytes>,
    len: usize,
}

impl PageList {
    /// 总字节数
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 页数量
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// 各页数据
    pub fn pages(&self) -> &[Bytes] {
        &self.pages
    }

    /// 拼接为连续字节 (会复制)
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for page in &self.pages {
            out.extend_from_slice(page);
        }
        out
    }
}

impl PagePool {
    /// 创建页池, 页大小至少 1 字节
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            outstanding: AtomicUsize::new(0),
        }
    }

    /// 页大小
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// 引用 `data` 的内容生成页列表, 不复制负载
    pub fn get_referenced_pages(&self, data: &Bytes) -> PageList {
        let pages: Vec<Bytes> = (0..data.len())
            .step_by(self.page_size)
            .map(|off| data.slice(off..(off + self.page_size).min(data.len())))
            .collect();
        self.outstanding.fetch_add(pages.len(), Ordering::AcqRel);
        PageList {
            pages,
            len: data.len(),
        }
    }

    /// 为已有页列表再增加一份引用, 供下游在回调之后继续持有
    pub fn retain(&self, list: &PageList) -> PageList {
        self.outstanding.fetch_add(list.pages.len(), Ordering::AcqRel);
        PageList {
            pages: list.pages.clone(),
            len: list.len,
        }
    }

    /// 归还页列表
    pub fn release_pages(&self, list: PageList) {
        self.outstanding.fetch_sub(list.pages.len(), Ordering::AcqRel);
    }

    /// 尚未归还的页引用数
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }
}

impl Default for PagePool {
    fn default() -> Self {
        Self::new(4096)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pages_split_without_copy() {
        let pool = PagePool::new(4);
        let data = Bytes::from_static(b"0123456789");
        let list = pool.get_referenced_pages(&data);

        assert_eq!(list.len(), 10);
        assert_eq!(list.page_count(), 3);
        assert_eq!(&list.pages()[2][..], b"89");
        assert_eq!(list.pages()[0].as_ptr(), data.as_ptr());
        assert_eq!(list.to_vec(), data.to_vec());
        assert_eq!(pool.outstanding(), 3);

        pool.release_pages(list);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_retain_counts_separately() {
        let pool = PagePool::new(8);
        let list = pool.get_referenced_pages(&Bytes::from(vec![7u8; 20]));
        let kept = pool.retain(&list);
        pool.release_pages(list);
        assert_eq!(pool.outstanding(), 3);
        assert_eq!(kept.to_vec(), vec![7u8; 20]);
        pool.release_pages(kept);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_empty_payload() {
        let pool = PagePool::new(0);
        assert_eq!(pool.page_size(), 1);
        let list = pool.get_referenced_pages(&Bytes::new());
        assert!(list.is_empty());
        assert_eq!(list.page_count(), 0);
        pool.release_pages(list);
        assert_eq!(pool.outstanding(), 0);
    }
}
