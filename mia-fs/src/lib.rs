//! # mia-fs
//!
//! 以一个普通宿主文件模拟原始磁盘的教学磁盘/文件系统：
//! MBR + EBR 分区表，位图式 inode 文件系统（EXT2 与带日志的 EXT3 变体）。
//!
//! 自下而上的分层：
//!
//! - 块设备接口层：在宿主文件的绝对字节偏移处读写定长记录
//! - 磁盘数据结构层：落盘记录的定长小端布局
//! - 磁盘管理层：分区表、挂载表与格式化
//! - 操作层：路径解析、文件与目录操作、用户与权限、日志

// 块设备接口层
mod block_io;
pub use block_io::{read_record, write_record, BlockFile};

// 磁盘数据结构层
pub mod layout;

// 磁盘管理层
mod disk;
pub use disk::{
    fdisk_add, fdisk_create, fdisk_delete, mkdisk, rmdisk, DeleteMode, Fit, PartitionKind, Unit,
};
mod kernel;
pub use kernel::{Kernel, MountKind, MountedPartition};
mod volume;
pub use volume::Volume;

// 操作层
pub mod fs;

mod clock;
mod error;
pub use error::{Error, Result};

/// 数据块大小（字节）
pub const BLOCK_SIZE: usize = 64;
/// inode 的直接索引数
pub const DIRECT_COUNT: usize = 12;
/// 一级索引块的索引数
pub const INDIRECT_COUNT: usize = 16;
/// 单文件内容上限：12 个直接块 + 16 个一级间接块
pub const MAX_CONTENT: usize = (DIRECT_COUNT + INDIRECT_COUNT) * BLOCK_SIZE;
/// 目录项名字上限（字节）
pub const NAME_LEN: usize = 12;
/// EXT3 日志槽数
pub const JOURNAL_SLOTS: usize = 50;
/// 超级块魔数
pub const MAGIC: i32 = 0xEF53;
/// 挂载ID前缀：学号后两位
pub const CARNET_SUFFIX: &str = "85";
