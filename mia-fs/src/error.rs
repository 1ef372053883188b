use std::fmt;
use std::io;

/// 命令层面的错误分类，最终以一行 `Error: <text>` 呈现。
#[derive(Debug)]
pub enum Error {
    /// 参数缺失、越界、枚举值非法、名字过长
    Validation(String),
    /// 磁盘文件、分区名、挂载ID或路径组件不存在
    NotFound(String),
    /// 磁盘、分区名或文件名冲突
    AlreadyExists(String),
    /// 磁盘、分区或目录容量不足
    Capacity(String),
    /// 会话缺失、特权操作非root执行、UGO检查失败
    PermissionDenied(String),
    /// 在EXT2分区上执行仅限EXT3的命令
    FilesystemMismatch(String),
    /// 宿主文件读写失败，对当前命令是致命的
    Io(io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg)
            | Self::NotFound(msg)
            | Self::AlreadyExists(msg)
            | Self::Capacity(msg)
            | Self::PermissionDenied(msg)
            | Self::FilesystemMismatch(msg) => f.write_str(msg),
            Self::Io(err) => write!(f, "i/o failure: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}
