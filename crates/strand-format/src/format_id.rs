//! 容器格式标识符.

use std::fmt;

/// 容器格式标识符
///
/// 录像系统目前只落盘 FLV 分段, 枚举保持非穷尽以便扩展.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FormatId {
    /// Flash Video (FLV)
    Flv,
}

impl FormatId {
    /// 所有已知格式标识的列表
    pub const ALL: &[FormatId] = &[Self::Flv];

    /// 格式短名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Flv => "flv",
        }
    }

    /// 该格式常用的文件扩展名
    pub const fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Flv => &["flv"],
        }
    }

    /// 根据文件扩展名猜测格式 (不含 `.`)
    pub fn from_extension(ext: &str) -> Option<FormatId> {
        let ext_lower = ext.to_lowercase();
        Self::ALL
            .iter()
            .find(|id| id.extensions().contains(&ext_lower.as_str()))
            .copied()
    }

    /// 从文件路径猜测格式
    pub fn from_filename(filename: &str) -> Option<FormatId> {
        let ext = filename.rsplit('.').next()?;
        Self::from_extension(ext)
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_filename() {
        assert_eq!(FormatId::from_filename("cam1/20240101/000000_000000000.FLV"), Some(FormatId::Flv));
        assert_eq!(FormatId::from_filename("movie.mp4"), None);
        assert_eq!(FormatId::Flv.to_string(), "flv");
    }
}
