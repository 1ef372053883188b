//! # 文件与目录操作
//!
//! 每个修改性操作的前置条件：存在有效会话，且目标通过UGO检查。
//! root 的新文件/目录是 `777`，其他用户是 `664`（这是对外契约，
//! 不是标准UNIX行为）。EXT3 卷上每个成功的修改都会追加一条日志。

use std::path::Path;

use crate::fs::users::Session;
use crate::fs::{content, journal, path, perm, users};
use crate::fs::perm::Perm;
use crate::layout::{FolderBlock, Inode, InodeKind};
use crate::{clock, Error, Kernel, Result, Volume, BLOCK_SIZE, MAX_CONTENT, NAME_LEN};

/// copy 的结果：复制与因无读权限而跳过的子树数。
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyStats {
    pub copied: usize,
    pub skipped: usize,
}

/// 创建文件。内容来自宿主文件（`content_from`）或
/// `'0'..'9'` 循环填充的 `size` 个字节。
pub fn mkfile(
    kernel: &Kernel,
    file_path: &str,
    recursive: bool,
    size: i64,
    content_from: Option<&Path>,
) -> Result<()> {
    let (session, mut vol) = session_volume(kernel)?;
    if size < 0 {
        return Err(Error::Validation("file size must not be negative".into()));
    }
    let data = match content_from {
        Some(host) => std::fs::read(host).map_err(|err| {
            Error::NotFound(format!("content file {}: {err}", host.display()))
        })?,
        None => content::digits(size as usize),
    };
    if data.len() > MAX_CONTENT {
        return Err(Error::Capacity(format!(
            "content of {} bytes exceeds the {MAX_CONTENT}-byte limit",
            data.len()
        )));
    }

    let (parent_path, name) = path::split(file_path)?;
    check_name(&name)?;
    let parent = resolve_parent(&mut vol, &session, &parent_path, recursive)?;

    let parent_inode = vol.read_inode(parent)?;
    perm::require(&parent_inode, &session, Perm::Write, &parent_path)?;
    if path::find_in_dir(&vol, parent, &name, false)?.is_some() {
        return Err(Error::AlreadyExists(format!(
            "'{file_path}' already exists"
        )));
    }

    let index = vol.alloc_inode()?;
    let mut inode = Inode::new(
        InodeKind::File,
        session.uid,
        session.gid,
        default_perm(&session),
        &clock::timestamp(),
    );
    content::write(&mut vol, &mut inode, &data)?;
    vol.write_inode(index, &inode)?;
    path::add_entry(&mut vol, parent, &name, index)?;

    let preview = match content_from {
        Some(host) => format!("from:{}", host.display()),
        None => format!("size={}", data.len()),
    };
    journal::append(&vol, "mkfile", file_path, &preview)?;
    vol.sync()
}

/// 创建目录；`parents` 时沿途补齐缺失的父目录。
pub fn mkdir(kernel: &Kernel, dir_path: &str, parents: bool) -> Result<()> {
    let (session, mut vol) = session_volume(kernel)?;
    let (parent_path, name) = path::split(dir_path)?;
    check_name(&name)?;
    let parent = resolve_parent(&mut vol, &session, &parent_path, parents)?;

    let parent_inode = vol.read_inode(parent)?;
    perm::require(&parent_inode, &session, Perm::Write, &parent_path)?;
    if path::find_in_dir(&vol, parent, &name, false)?.is_some() {
        return Err(Error::AlreadyExists(format!("'{dir_path}' already exists")));
    }

    create_directory(
        &mut vol,
        parent,
        &name,
        session.uid,
        session.gid,
        default_perm(&session),
    )?;
    journal::append(&vol, "mkdir", dir_path, "directory")?;
    vol.sync()
}

/// 读文件，多个路径的内容拼接返回；缺尾部换行的补一个。
pub fn cat(kernel: &Kernel, paths: &[String]) -> Result<String> {
    let (session, vol) = session_volume(kernel)?;
    let mut out = String::new();
    for file_path in paths {
        let index = path::resolve_any(&vol, file_path)?;
        let inode = vol.read_inode(index)?;
        if inode.is_dir() {
            return Err(Error::Validation(format!("'{file_path}' is a directory")));
        }
        perm::require(&inode, &session, Perm::Read, file_path)?;
        let bytes = content::read(&vol, &inode)?;
        out.push_str(&String::from_utf8_lossy(&bytes));
        if !out.ends_with('\n') {
            out.push('\n');
        }
    }
    Ok(out)
}

/// 重写文件内容：释放旧块、按新内容重新铺排、更新mtime。
pub fn edit(kernel: &Kernel, file_path: &str, content_from: &Path) -> Result<()> {
    let (session, mut vol) = session_volume(kernel)?;
    let data = std::fs::read(content_from).map_err(|err| {
        Error::NotFound(format!("content file {}: {err}", content_from.display()))
    })?;
    if data.len() > MAX_CONTENT {
        return Err(Error::Capacity(format!(
            "content of {} bytes exceeds the {MAX_CONTENT}-byte limit",
            data.len()
        )));
    }

    let index = path::resolve_any(&vol, file_path)?;
    let mut inode = vol.read_inode(index)?;
    if inode.is_dir() {
        return Err(Error::Validation(format!("'{file_path}' is a directory")));
    }
    perm::require(&inode, &session, Perm::Read, file_path)?;
    perm::require(&inode, &session, Perm::Write, file_path)?;

    content::free(&mut vol, &mut inode)?;
    content::write(&mut vol, &mut inode, &data)?;
    inode.touch(&clock::timestamp());
    vol.write_inode(index, &inode)?;

    journal::append(&vol, "edit", file_path, &format!("size={}", data.len()))?;
    vol.sync()
}

/// 删除文件或目录树。
///
/// 目录先走一遍只读预检：目标与每个后代都要有写权限，
/// 任何一个不过就指名报错、不删任何东西。
pub fn remove(kernel: &Kernel, target_path: &str) -> Result<()> {
    let (session, mut vol) = session_volume(kernel)?;
    let norm = path::normalize(target_path)?;
    if norm == "/" {
        return Err(Error::Validation(
            "the root directory cannot be removed".into(),
        ));
    }

    let index = path::resolve_any(&vol, &norm)?;
    let inode = vol.read_inode(index)?;
    perm::require(&inode, &session, Perm::Write, &norm)?;
    if inode.is_dir() {
        if let Some(denied) = deletion_blocker(&vol, &session, index, &norm)? {
            return Err(Error::PermissionDenied(format!(
                "missing write permission on {denied}; nothing was removed"
            )));
        }
    }

    let (parent_path, name) = path::split(&norm)?;
    let parent = path::resolve_dir(&vol, &parent_path)?;
    let parent_inode = vol.read_inode(parent)?;
    perm::require(&parent_inode, &session, Perm::Write, &parent_path)?;

    if inode.is_dir() {
        delete_directory(&mut vol, index)?;
    } else {
        delete_file(&mut vol, index)?;
    }
    path::remove_entry(&mut vol, parent, &name)?;

    let kind = if inode.is_dir() { "directory" } else { "file" };
    journal::append(&vol, "remove", &norm, kind)?;
    vol.sync()
}

/// 改名：只重写父目录项的名字字节。
pub fn rename(kernel: &Kernel, target_path: &str, new_name: &str) -> Result<()> {
    let (session, mut vol) = session_volume(kernel)?;
    let norm = path::normalize(target_path)?;
    if norm == "/" {
        return Err(Error::Validation(
            "the root directory cannot be renamed".into(),
        ));
    }
    if new_name.is_empty() {
        return Err(Error::Validation("the new name must not be empty".into()));
    }
    if new_name.contains('/') {
        return Err(Error::Validation("the new name must not contain '/'".into()));
    }
    if new_name.len() > NAME_LEN {
        return Err(Error::Validation(format!(
            "name '{new_name}' exceeds {NAME_LEN} bytes"
        )));
    }

    path::resolve_any(&vol, &norm)?;
    let (parent_path, name) = path::split(&norm)?;
    let parent = path::resolve_dir(&vol, &parent_path)?;
    let parent_inode = vol.read_inode(parent)?;
    perm::require(&parent_inode, &session, Perm::Write, &parent_path)?;

    if path::find_in_dir(&vol, parent, new_name, false)?.is_some() {
        return Err(Error::AlreadyExists(format!(
            "'{parent_path}' already holds an entry named '{new_name}'"
        )));
    }

    path::rename_entry(&mut vol, parent, &name, new_name)?;
    journal::append(&vol, "rename", &norm, &format!("{name}->{new_name}"))?;
    vol.sync()
}

/// 深拷贝到目标目录。副本归会话用户所有，权限沿用原件；
/// 读不到的子树整个跳过并计数。
pub fn copy(kernel: &Kernel, src_path: &str, dest_path: &str) -> Result<CopyStats> {
    let (session, mut vol) = session_volume(kernel)?;
    let src = path::resolve_any(&vol, src_path)?;
    let src_inode = vol.read_inode(src)?;
    perm::require(&src_inode, &session, Perm::Read, src_path)?;

    let dest = path::resolve_dir(&vol, dest_path)?;
    let dest_inode = vol.read_inode(dest)?;
    perm::require(&dest_inode, &session, Perm::Write, dest_path)?;

    let (_, name) = path::split(src_path)?;
    if path::find_in_dir(&vol, dest, &name, false)?.is_some() {
        return Err(Error::AlreadyExists(format!(
            "'{dest_path}' already holds an entry named '{name}'"
        )));
    }

    let mut stats = CopyStats::default();
    copy_node(&mut vol, &session, src, dest, &name, &mut stats)?;
    journal::append(&vol, "copy", src_path, &format!("{src_path}->{dest_path}"))?;
    vol.sync()?;
    Ok(stats)
}

/// 换父目录不换inode：摘旧目录项、挂新目录项；
/// 被移动的目录还要把 `..` 指向新父。
pub fn mv(kernel: &Kernel, src_path: &str, dest_path: &str) -> Result<()> {
    let (session, mut vol) = session_volume(kernel)?;
    let src_norm = path::normalize(src_path)?;
    let dest_norm = path::normalize(dest_path)?;
    if src_norm == "/" {
        return Err(Error::Validation("the root directory cannot be moved".into()));
    }
    if dest_norm == src_norm || dest_norm.starts_with(&format!("{src_norm}/")) {
        return Err(Error::Validation(
            "the destination lies inside the source".into(),
        ));
    }

    let src = path::resolve_any(&vol, &src_norm)?;
    let src_inode = vol.read_inode(src)?;
    perm::require(&src_inode, &session, Perm::Write, &src_norm)?;

    let dest = path::resolve_dir(&vol, &dest_norm)?;
    let dest_inode = vol.read_inode(dest)?;
    perm::require(&dest_inode, &session, Perm::Write, &dest_norm)?;

    let (src_parent_path, name) = path::split(&src_norm)?;
    let src_parent = path::resolve_dir(&vol, &src_parent_path)?;
    if path::find_in_dir(&vol, dest, &name, false)?.is_some() {
        return Err(Error::AlreadyExists(format!(
            "'{dest_norm}' already holds an entry named '{name}'"
        )));
    }

    path::remove_entry(&mut vol, src_parent, &name)?;
    path::add_entry(&mut vol, dest, &name, src)?;
    if src_inode.is_dir() {
        repoint_dotdot(&vol, src, dest)?;
    }

    journal::append(&vol, "move", &src_norm, &format!("{src_norm}->{dest_norm}"))?;
    vol.sync()
}

/// 按通配模式搜索：`?` 恰好一个字节，`*` 一个或多个字节。
/// 深度上限100；读不到的目录整棵剪掉。
pub fn find(kernel: &Kernel, start_path: &str, pattern: &str) -> Result<Vec<String>> {
    let (session, vol) = session_volume(kernel)?;
    let norm = path::normalize(start_path)?;
    let start = path::resolve_any(&vol, &norm)?;
    let mut results = Vec::new();
    find_walk(&vol, &session, start, &norm, pattern, &mut results, 0)?;
    Ok(results)
}

/// 换属主：仅root或当前属主可执行；递归时无条件覆盖后代。
pub fn chown(kernel: &Kernel, target_path: &str, recursive: bool, user: &str) -> Result<()> {
    let (session, mut vol) = session_volume(kernel)?;
    let registry = users::read_registry(&vol)?;
    let (target_uid, _, _) = registry
        .user(user)
        .ok_or_else(|| Error::NotFound(format!("user '{user}' does not exist")))?;

    let index = path::resolve_any(&vol, target_path)?;
    let mut inode = vol.read_inode(index)?;
    if !session.is_root() && inode.uid != session.uid {
        return Err(Error::PermissionDenied(
            "only root or the owner may change ownership".into(),
        ));
    }

    if recursive && inode.is_dir() {
        chown_walk(&mut vol, index, target_uid)?;
    } else {
        inode.uid = target_uid;
        vol.write_inode(index, &inode)?;
    }
    journal::append(&vol, "chown", target_path, &format!("uid={target_uid}"))?;
    vol.sync()
}

/// 改权限：三个 `[0-7]` 数位；仅root或属主可执行。
/// 非root的递归会静默跳过不属于自己的后代。
pub fn chmod(kernel: &Kernel, target_path: &str, ugo: &str, recursive: bool) -> Result<()> {
    if ugo.len() != 3 || !ugo.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
        return Err(Error::Validation(format!(
            "ugo must be three octal digits in [0-7] (got '{ugo}')"
        )));
    }
    let (session, mut vol) = session_volume(kernel)?;
    let index = path::resolve_any(&vol, target_path)?;
    let mut inode = vol.read_inode(index)?;
    if !session.is_root() && inode.uid != session.uid {
        return Err(Error::PermissionDenied(
            "only root or the owner may change permissions".into(),
        ));
    }

    let perm: [u8; 3] = [ugo.as_bytes()[0], ugo.as_bytes()[1], ugo.as_bytes()[2]];
    if recursive && inode.is_dir() {
        chmod_walk(&mut vol, &session, index, perm)?;
    } else {
        inode.perm = perm;
        vol.write_inode(index, &inode)?;
    }
    journal::append(&vol, "chmod", target_path, ugo)?;
    vol.sync()
}

// ---------------------------------------------------------------------------

fn session_volume(kernel: &Kernel) -> Result<(Session, Volume)> {
    let session = kernel
        .session()
        .cloned()
        .ok_or_else(|| Error::PermissionDenied("no active session; login first".into()))?;
    let mount = kernel.mount_entry(&session.partition_id)?.clone();
    Ok((session, Volume::open(&mount)?))
}

fn default_perm(session: &Session) -> [u8; 3] {
    if session.is_root() {
        *b"777"
    } else {
        *b"664"
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation("the name must not be empty".into()));
    }
    if name.len() > NAME_LEN {
        return Err(Error::Validation(format!(
            "name '{name}' exceeds {NAME_LEN} bytes"
        )));
    }
    Ok(())
}

// 解析父目录；允许递归创建时沿途补齐
fn resolve_parent(
    vol: &mut Volume,
    session: &Session,
    parent_path: &str,
    create_missing: bool,
) -> Result<i32> {
    match path::resolve_dir(vol, parent_path) {
        Ok(index) => Ok(index),
        Err(Error::NotFound(_)) if create_missing => make_dirs(vol, session, parent_path),
        Err(Error::NotFound(msg)) => Err(Error::NotFound(format!(
            "{msg}; pass the parents flag to create missing directories"
        ))),
        Err(err) => Err(err),
    }
}

fn make_dirs(vol: &mut Volume, session: &Session, dir_path: &str) -> Result<i32> {
    let mut current = path::ROOT_INODE;
    let norm = path::normalize(dir_path)?;
    for comp in path::components(&norm) {
        check_name(comp)?;
        current = match path::find_in_dir(vol, current, comp, true)? {
            Some(next) => next,
            None => create_directory(
                vol,
                current,
                comp,
                session.uid,
                session.gid,
                default_perm(session),
            )?,
        };
    }
    Ok(current)
}

// 新目录：一个inode + 一个装着 `.`/`..` 的目录块
fn create_directory(
    vol: &mut Volume,
    parent: i32,
    name: &str,
    uid: i32,
    gid: i32,
    perm: [u8; 3],
) -> Result<i32> {
    let index = vol.alloc_inode()?;
    let block = vol.alloc_block()?;

    let mut inode = Inode::new(InodeKind::Directory, uid, gid, perm, &clock::timestamp());
    inode.size = BLOCK_SIZE as i32;
    inode.block[0] = block;

    let mut folder = FolderBlock::empty();
    folder.entries[0].set(".", index);
    folder.entries[1].set("..", parent);

    vol.write_folder(block, &folder)?;
    vol.write_inode(index, &inode)?;
    path::add_entry(vol, parent, name, index)?;
    Ok(index)
}

// 预检：返回第一个缺写权限的后代路径
fn deletion_blocker(
    vol: &Volume,
    session: &Session,
    dir: i32,
    dir_path: &str,
) -> Result<Option<String>> {
    for (name, child) in path::list_dir(vol, dir)? {
        if name == "." || name == ".." {
            continue;
        }
        let child_path = join(dir_path, &name);
        let child_inode = vol.read_inode(child)?;
        if !perm::allows(&child_inode, session, Perm::Write) {
            return Ok(Some(child_path));
        }
        if child_inode.is_dir() {
            if let Some(denied) = deletion_blocker(vol, session, child, &child_path)? {
                return Ok(Some(denied));
            }
        }
    }
    Ok(None)
}

fn delete_file(vol: &mut Volume, index: i32) -> Result<()> {
    let mut inode = vol.read_inode(index)?;
    content::free(vol, &mut inode)?;
    vol.free_inode(index)
}

fn delete_directory(vol: &mut Volume, index: i32) -> Result<()> {
    let inode = vol.read_inode(index)?;
    for &block in &inode.block {
        if block == -1 {
            break;
        }
        let folder = vol.read_folder(block)?;
        for entry in &folder.entries {
            if entry.is_empty() {
                continue;
            }
            let name = entry.name();
            if name == "." || name == ".." {
                continue;
            }
            let child = vol.read_inode(entry.inode)?;
            if child.is_dir() {
                delete_directory(vol, entry.inode)?;
            } else {
                delete_file(vol, entry.inode)?;
            }
        }
        vol.free_block(block)?;
    }
    vol.free_inode(index)
}

fn copy_node(
    vol: &mut Volume,
    session: &Session,
    src: i32,
    dest_dir: i32,
    name: &str,
    stats: &mut CopyStats,
) -> Result<()> {
    let src_inode = vol.read_inode(src)?;
    if src_inode.is_file() {
        let data = content::read(vol, &src_inode)?;
        let index = vol.alloc_inode()?;
        let mut inode = Inode::new(
            InodeKind::File,
            session.uid,
            session.gid,
            src_inode.perm,
            &clock::timestamp(),
        );
        content::write(vol, &mut inode, &data)?;
        vol.write_inode(index, &inode)?;
        path::add_entry(vol, dest_dir, name, index)?;
        stats.copied += 1;
        return Ok(());
    }

    let index = create_directory(vol, dest_dir, name, session.uid, session.gid, src_inode.perm)?;
    stats.copied += 1;
    for (child_name, child) in path::list_dir(vol, src)? {
        if child_name == "." || child_name == ".." {
            continue;
        }
        let child_inode = vol.read_inode(child)?;
        if !perm::allows(&child_inode, session, Perm::Read) {
            stats.skipped += 1;
            continue;
        }
        copy_node(vol, session, child, index, &child_name, stats)?;
    }
    Ok(())
}

// 被移动目录的 `..` 指向新父目录
fn repoint_dotdot(vol: &Volume, dir: i32, new_parent: i32) -> Result<()> {
    let inode = vol.read_inode(dir)?;
    for &block in &inode.block {
        if block == -1 {
            break;
        }
        let mut folder = vol.read_folder(block)?;
        for entry in folder.entries.iter_mut() {
            if !entry.is_empty() && entry.name() == ".." {
                entry.inode = new_parent;
                return vol.write_folder(block, &folder);
            }
        }
    }
    Ok(())
}

fn find_walk(
    vol: &Volume,
    session: &Session,
    index: i32,
    current_path: &str,
    pattern: &str,
    results: &mut Vec<String>,
    depth: usize,
) -> Result<()> {
    if depth > 100 {
        return Ok(());
    }
    let inode = vol.read_inode(index)?;
    if !perm::allows(&inode, session, Perm::Read) {
        return Ok(());
    }
    let name = current_path.rsplit('/').next().unwrap_or("");

    if inode.is_file() {
        if matches_pattern(name, pattern) {
            results.push(current_path.to_owned());
        }
        return Ok(());
    }

    if current_path != "/" && matches_pattern(name, pattern) {
        results.push(current_path.to_owned());
    }
    for (child_name, child) in path::list_dir(vol, index)? {
        if child_name == "." || child_name == ".." {
            continue;
        }
        let child_path = join(current_path, &child_name);
        find_walk(vol, session, child, &child_path, pattern, results, depth + 1)?;
    }
    Ok(())
}

/// `?` 恰好一个字节；`*` 一个或多个字节。
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    match_at(name.as_bytes(), pattern.as_bytes(), 0, 0)
}

fn match_at(name: &[u8], pattern: &[u8], ni: usize, pi: usize) -> bool {
    if ni == name.len() && pi == pattern.len() {
        return true;
    }
    if pi == pattern.len() {
        return false;
    }
    if ni == name.len() {
        // 名字耗尽时剩余模式须全为 `*`
        return pattern[pi..].iter().all(|&c| c == b'*');
    }
    match pattern[pi] {
        b'?' => match_at(name, pattern, ni + 1, pi + 1),
        b'*' => (1..=name.len() - ni).any(|k| match_at(name, pattern, ni + k, pi + 1)),
        c => name[ni] == c && match_at(name, pattern, ni + 1, pi + 1),
    }
}

fn chown_walk(vol: &mut Volume, index: i32, uid: i32) -> Result<()> {
    let mut inode = vol.read_inode(index)?;
    inode.uid = uid;
    vol.write_inode(index, &inode)?;
    if inode.is_dir() {
        for (name, child) in path::list_dir(vol, index)? {
            if name == "." || name == ".." {
                continue;
            }
            chown_walk(vol, child, uid)?;
        }
    }
    Ok(())
}

fn chmod_walk(vol: &mut Volume, session: &Session, index: i32, perm: [u8; 3]) -> Result<()> {
    let mut inode = vol.read_inode(index)?;
    if session.is_root() || inode.uid == session.uid {
        inode.perm = perm;
        vol.write_inode(index, &inode)?;
    }
    if inode.is_dir() {
        for (name, child) in path::list_dir(vol, index)? {
            if name == "." || name == ".." {
                continue;
            }
            chmod_walk(vol, session, child, perm)?;
        }
    }
    Ok(())
}

fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::matches_pattern;

    #[test]
    fn question_mark_is_exactly_one() {
        assert!(matches_pattern("abc", "a?c"));
        assert!(!matches_pattern("ac", "a?c"));
    }

    #[test]
    fn star_is_one_or_more() {
        assert!(matches_pattern("abc", "a*"));
        assert!(matches_pattern("abc", "*"));
        assert!(!matches_pattern("a", "a*"));
        assert!(matches_pattern("a.txt", "*.txt"));
    }

    #[test]
    fn literal_match_is_exact() {
        assert!(matches_pattern("f1", "f1"));
        assert!(!matches_pattern("f1", "F1"));
    }
}
