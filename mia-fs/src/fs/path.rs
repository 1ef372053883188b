//! # 路径解析与目录操作
//!
//! 只接受绝对路径；组件不超过12字节；名字比较区分大小写、
//! 精确匹配。`.` 与 `..` 就是普通目录项，照常参与查找。
//!
//! 目录的内容全部放在块表的15个直接槽里（每块4项）；
//! 目录列表不使用间接索引。

use crate::layout::FolderBlock;
use crate::{Error, Result, Volume, BLOCK_SIZE, NAME_LEN};

/// 根目录的inode号。
pub const ROOT_INODE: i32 = 0;
/// `/users.txt` 的inode号。
pub const USERS_INODE: i32 = 1;

/// 规范化路径并拆成 `(父目录, 末项名)`。根目录不可拆。
pub fn split(path: &str) -> Result<(String, String)> {
    let norm = normalize(path)?;
    if norm == "/" {
        return Err(Error::Validation("the path has no final component".into()));
    }
    let cut = norm.rfind('/').expect("normalized path keeps its slashes");
    let (parent, name) = (&norm[..cut], &norm[cut + 1..]);
    let parent = if parent.is_empty() { "/" } else { parent };
    Ok((parent.to_owned(), name.to_owned()))
}

/// 压缩 `//`、去掉尾部 `/`；相对路径拒绝。
pub fn normalize(path: &str) -> Result<String> {
    let path = path.trim();
    if !path.starts_with('/') {
        return Err(Error::Validation(format!(
            "path '{path}' must be absolute (start with '/')"
        )));
    }
    let mut norm = String::with_capacity(path.len());
    for c in path.chars() {
        if c == '/' && norm.ends_with('/') {
            continue;
        }
        norm.push(c);
    }
    if norm.len() > 1 && norm.ends_with('/') {
        norm.pop();
    }
    Ok(norm)
}

pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

/// 逐组件解析目录路径，返回目录inode号。
pub fn resolve_dir(vol: &Volume, path: &str) -> Result<i32> {
    let norm = normalize(path)?;
    let mut current = ROOT_INODE;
    for comp in components(&norm) {
        if comp.len() > NAME_LEN {
            return Err(Error::Validation(format!(
                "path component '{comp}' exceeds {NAME_LEN} bytes"
            )));
        }
        current = find_in_dir(vol, current, comp, true)?.ok_or_else(|| {
            Error::NotFound(format!("directory '{comp}' not found in '{path}'"))
        })?;
    }
    Ok(current)
}

/// 解析任意路径（文件或目录），返回inode号。
pub fn resolve_any(vol: &Volume, path: &str) -> Result<i32> {
    let norm = normalize(path)?;
    if norm == "/" {
        return Ok(ROOT_INODE);
    }
    let (parent, name) = split(&norm)?;
    let dir = resolve_dir(vol, &parent)?;
    find_in_dir(vol, dir, &name, false)?
        .ok_or_else(|| Error::NotFound(format!("path '{path}' does not exist")))
}

/// 在目录里按名字找一项；`only_dirs` 时跳过非目录的命中。
pub fn find_in_dir(vol: &Volume, dir: i32, name: &str, only_dirs: bool) -> Result<Option<i32>> {
    let inode = vol.read_inode(dir)?;
    if !inode.is_dir() {
        return Err(Error::Validation(format!("inode {dir} is not a directory")));
    }
    for &block in &inode.block {
        if block == -1 {
            break;
        }
        let folder = vol.read_folder(block)?;
        for entry in &folder.entries {
            if entry.is_empty() || entry.name() != name {
                continue;
            }
            if only_dirs && !vol.read_inode(entry.inode)?.is_dir() {
                continue;
            }
            return Ok(Some(entry.inode));
        }
    }
    Ok(None)
}

/// 目录的全部有效项（含 `.` 与 `..`），按块序返回。
pub fn list_dir(vol: &Volume, dir: i32) -> Result<Vec<(String, i32)>> {
    let inode = vol.read_inode(dir)?;
    if !inode.is_dir() {
        return Err(Error::Validation(format!("inode {dir} is not a directory")));
    }
    let mut out = Vec::new();
    for &block in &inode.block {
        if block == -1 {
            break;
        }
        let folder = vol.read_folder(block)?;
        for entry in &folder.entries {
            if !entry.is_empty() {
                out.push((entry.name(), entry.inode));
            }
        }
    }
    Ok(out)
}

/// 往目录里添一项：先找现有块的空槽，不够就占用下一个
/// 空闲块表槽并新建目录块（目录大小随之+64）。
pub fn add_entry(vol: &mut Volume, dir: i32, name: &str, child: i32) -> Result<()> {
    let mut inode = vol.read_inode(dir)?;
    for &block in &inode.block {
        if block == -1 {
            break;
        }
        let mut folder = vol.read_folder(block)?;
        for entry in folder.entries.iter_mut() {
            if entry.is_empty() {
                entry.set(name, child);
                return vol.write_folder(block, &folder);
            }
        }
    }

    let slot = inode.block.iter().position(|&b| b == -1).ok_or_else(|| {
        Error::Capacity(format!(
            "directory inode {dir} has used all 15 block slots"
        ))
    })?;
    let block = vol.alloc_block()?;
    let mut folder = FolderBlock::empty();
    folder.entries[0].set(name, child);
    vol.write_folder(block, &folder)?;

    inode.block[slot] = block;
    inode.size += BLOCK_SIZE as i32;
    vol.write_inode(dir, &inode)
}

/// 摘掉目录里的一项：腾空槽位，目录大小-64。
pub fn remove_entry(vol: &mut Volume, dir: i32, name: &str) -> Result<()> {
    let mut inode = vol.read_inode(dir)?;
    for &block in &inode.block {
        if block == -1 {
            break;
        }
        let mut folder = vol.read_folder(block)?;
        for entry in folder.entries.iter_mut() {
            if !entry.is_empty() && entry.name() == name {
                entry.clear();
                vol.write_folder(block, &folder)?;
                inode.size -= BLOCK_SIZE as i32;
                return vol.write_inode(dir, &inode);
            }
        }
    }
    Err(Error::NotFound(format!(
        "entry '{name}' not found in directory inode {dir}"
    )))
}

/// 只改名字字节，inode号原地不动。
pub fn rename_entry(vol: &mut Volume, dir: i32, old: &str, new: &str) -> Result<()> {
    let inode = vol.read_inode(dir)?;
    for &block in &inode.block {
        if block == -1 {
            break;
        }
        let mut folder = vol.read_folder(block)?;
        for entry in folder.entries.iter_mut() {
            if !entry.is_empty() && entry.name() == old {
                let child = entry.inode;
                entry.set(new, child);
                return vol.write_folder(block, &folder);
            }
        }
    }
    Err(Error::NotFound(format!(
        "entry '{old}' not found in directory inode {dir}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_basic() {
        assert_eq!(split("/a").unwrap(), ("/".into(), "a".into()));
        assert_eq!(split("/a/b/c").unwrap(), ("/a/b".into(), "c".into()));
        assert_eq!(split("/a//b/").unwrap(), ("/a".into(), "b".into()));
    }

    #[test]
    fn split_rejects_relative_and_root() {
        assert!(split("a/b").is_err());
        assert!(split("/").is_err());
    }
}
