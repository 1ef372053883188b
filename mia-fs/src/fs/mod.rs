//! # 操作层
//!
//! 格式化、路径解析、文件与目录操作、用户与权限、EXT3日志。
//! 所有修改性操作都要求有效会话并通过UGO检查；root(uid=1)绕过检查。

pub mod content;
pub mod file;
pub mod journal;
pub mod mkfs;
pub mod path;
pub mod perm;
pub mod users;
