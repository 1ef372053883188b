//! # 用户注册表与会话
//!
//! 注册表就是 `/users.txt`（inode 1）里的纯文本，
//! 行格式 `id,G,组名` 与 `id,U,组名,用户名,密码`；
//! `id == 0` 表示已删除（墓碑行保留原位）。
//! 改动一律整文件重写，走与 edit 相同的内容分配路径。

use crate::fs::{content, journal, path};
use crate::layout::fixed;
use crate::{clock, Error, Kernel, MountedPartition, Result, Volume};

/// 用户名、组名与密码的长度上限（字节）。
pub const NAME_MAX: usize = 10;

/// 进程内至多一个活动会话。
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub uid: i32,
    pub gid: i32,
    pub partition_id: String,
}

impl Session {
    pub fn is_root(&self) -> bool {
        self.uid == 1
    }
}

#[derive(Debug, Clone)]
pub enum Row {
    Group {
        id: i32,
        name: String,
    },
    User {
        id: i32,
        group: String,
        name: String,
        password: String,
    },
}

/// 解析后的注册表；墓碑行保留，序列化时原样回写。
#[derive(Debug, Default)]
pub struct Registry {
    pub rows: Vec<Row>,
}

impl Registry {
    /// 宽容解析：空行与畸形行丢弃。
    pub fn parse(text: &str) -> Self {
        let mut rows = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.split(',').map(str::trim).collect();
            match parts.as_slice() {
                [id, "G", name] => rows.push(Row::Group {
                    id: id.parse().unwrap_or(0),
                    name: (*name).to_owned(),
                }),
                [id, "U", group, name, password] => rows.push(Row::User {
                    id: id.parse().unwrap_or(0),
                    group: (*group).to_owned(),
                    name: (*name).to_owned(),
                    password: (*password).to_owned(),
                }),
                _ => {}
            }
        }
        Self { rows }
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            match row {
                Row::Group { id, name } => out.push_str(&format!("{id},G,{name}\n")),
                Row::User {
                    id,
                    group,
                    name,
                    password,
                } => out.push_str(&format!("{id},U,{group},{name},{password}\n")),
            }
        }
        out
    }

    /// 在世（非墓碑）的组。
    pub fn group(&self, name: &str) -> Option<i32> {
        self.rows.iter().find_map(|row| match row {
            Row::Group { id, name: n } if *id != 0 && n == name => Some(*id),
            _ => None,
        })
    }

    /// 在世的用户。
    pub fn user(&self, name: &str) -> Option<(i32, String, String)> {
        self.rows.iter().find_map(|row| match row {
            Row::User {
                id,
                group,
                name: n,
                password,
            } if *id != 0 && n == name => Some((*id, group.clone(), password.clone())),
            _ => None,
        })
    }

    // 墓碑的id是0，天然不影响最大值
    fn next_group_id(&self) -> i32 {
        self.rows
            .iter()
            .filter_map(|row| match row {
                Row::Group { id, .. } => Some(*id),
                _ => None,
            })
            .max()
            .unwrap_or(0)
            + 1
    }

    fn next_user_id(&self) -> i32 {
        self.rows
            .iter()
            .filter_map(|row| match row {
                Row::User { id, .. } => Some(*id),
                _ => None,
            })
            .max()
            .unwrap_or(0)
            + 1
    }
}

pub fn read_registry(vol: &Volume) -> Result<Registry> {
    let inode = vol.read_inode(path::USERS_INODE)?;
    let bytes = content::read(vol, &inode)?;
    Ok(Registry::parse(&String::from_utf8_lossy(&bytes)))
}

pub fn write_registry(vol: &mut Volume, registry: &Registry) -> Result<()> {
    let mut inode = vol.read_inode(path::USERS_INODE)?;
    content::free(vol, &mut inode)?;
    content::write(vol, &mut inode, registry.serialize().as_bytes())?;
    inode.mtime = fixed(&clock::timestamp());
    vol.write_inode(path::USERS_INODE, &inode)
}

/// 登录：大小写敏感地核对用户名与密码，进程内仅允许一个会话。
pub fn login(kernel: &mut Kernel, user: &str, pass: &str, id: &str) -> Result<()> {
    if let Some(active) = kernel.session() {
        return Err(Error::PermissionDenied(format!(
            "user '{}' already has an active session; logout first",
            active.username
        )));
    }
    let mount = kernel.mount_entry(id)?.clone();
    let vol = Volume::open(&mount)?;
    let registry = read_registry(&vol)?;

    let (uid, group, password) = registry
        .user(user)
        .ok_or_else(|| Error::NotFound(format!("user '{user}' does not exist")))?;
    if password != pass {
        return Err(Error::PermissionDenied(format!(
            "wrong password for user '{user}'"
        )));
    }

    kernel.session = Some(Session {
        username: user.to_owned(),
        uid,
        gid: registry.group(&group).unwrap_or(0),
        partition_id: id.to_owned(),
    });
    log::info!("session opened for '{user}' on {id}");
    Ok(())
}

pub fn logout(kernel: &mut Kernel) -> Result<Session> {
    kernel
        .session
        .take()
        .ok_or_else(|| Error::PermissionDenied("no active session".into()))
}

pub fn mkgrp(kernel: &Kernel, name: &str) -> Result<i32> {
    let (_, mut vol) = root_volume(kernel)?;
    validate_name(name, "group name")?;

    let mut registry = read_registry(&vol)?;
    if registry.group(name).is_some() {
        return Err(Error::AlreadyExists(format!(
            "group '{name}' already exists"
        )));
    }
    let id = registry.next_group_id();
    registry.rows.push(Row::Group {
        id,
        name: name.to_owned(),
    });
    write_registry(&mut vol, &registry)?;
    journal::append(&vol, "mkgrp", "/users.txt", name)?;
    vol.sync()?;
    Ok(id)
}

pub fn rmgrp(kernel: &Kernel, name: &str) -> Result<()> {
    let (_, mut vol) = root_volume(kernel)?;
    if name == "root" {
        return Err(Error::Validation("the root group cannot be removed".into()));
    }

    let mut registry = read_registry(&vol)?;
    let row = registry
        .rows
        .iter_mut()
        .find(|row| matches!(row, Row::Group { id, name: n } if *id != 0 && n == name))
        .ok_or_else(|| Error::NotFound(format!("group '{name}' does not exist")))?;
    if let Row::Group { id, .. } = row {
        *id = 0;
    }
    write_registry(&mut vol, &registry)?;
    journal::append(&vol, "rmgrp", "/users.txt", name)?;
    vol.sync()?;
    Ok(())
}

pub fn mkusr(kernel: &Kernel, user: &str, pass: &str, group: &str) -> Result<i32> {
    let (_, mut vol) = root_volume(kernel)?;
    validate_name(user, "user name")?;
    validate_name(pass, "password")?;

    let mut registry = read_registry(&vol)?;
    if registry.group(group).is_none() {
        return Err(Error::NotFound(format!("group '{group}' does not exist")));
    }
    if registry.user(user).is_some() {
        return Err(Error::AlreadyExists(format!("user '{user}' already exists")));
    }
    let id = registry.next_user_id();
    registry.rows.push(Row::User {
        id,
        group: group.to_owned(),
        name: user.to_owned(),
        password: pass.to_owned(),
    });
    write_registry(&mut vol, &registry)?;
    journal::append(&vol, "mkusr", "/users.txt", user)?;
    vol.sync()?;
    Ok(id)
}

pub fn rmusr(kernel: &Kernel, user: &str) -> Result<()> {
    let (_, mut vol) = root_volume(kernel)?;
    if user == "root" {
        return Err(Error::Validation("the root user cannot be removed".into()));
    }

    let mut registry = read_registry(&vol)?;
    let row = registry
        .rows
        .iter_mut()
        .find(|row| matches!(row, Row::User { id, name, .. } if *id != 0 && name == user))
        .ok_or_else(|| Error::NotFound(format!("user '{user}' does not exist")))?;
    if let Row::User { id, .. } = row {
        *id = 0;
    }
    write_registry(&mut vol, &registry)?;
    journal::append(&vol, "rmusr", "/users.txt", user)?;
    vol.sync()?;
    Ok(())
}

/// 调整用户所属组。
pub fn chgrp(kernel: &Kernel, user: &str, group: &str) -> Result<()> {
    let (_, mut vol) = root_volume(kernel)?;

    let mut registry = read_registry(&vol)?;
    if registry.group(group).is_none() {
        return Err(Error::NotFound(format!("group '{group}' does not exist")));
    }
    let row = registry
        .rows
        .iter_mut()
        .find(|row| matches!(row, Row::User { id, name, .. } if *id != 0 && name == user))
        .ok_or_else(|| Error::NotFound(format!("user '{user}' does not exist")))?;
    if let Row::User { group: g, .. } = row {
        *g = group.to_owned();
    }
    write_registry(&mut vol, &registry)?;
    journal::append(&vol, "chgrp", "/users.txt", &format!("{user}->{group}"))?;
    vol.sync()?;
    Ok(())
}

// 用户/组管理只对root开放
fn root_volume(kernel: &Kernel) -> Result<(Session, Volume)> {
    let session = kernel
        .session()
        .cloned()
        .ok_or_else(|| Error::PermissionDenied("no active session; login first".into()))?;
    if !session.is_root() {
        return Err(Error::PermissionDenied(format!(
            "only root may manage users and groups (current user: '{}')",
            session.username
        )));
    }
    let mount: MountedPartition = kernel.mount_entry(&session.partition_id)?.clone();
    let vol = Volume::open(&mount)?;
    Ok((session, vol))
}

fn validate_name(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{what} must not be empty")));
    }
    if value.len() > NAME_MAX {
        return Err(Error::Validation(format!(
            "{what} '{value}' exceeds {NAME_MAX} bytes"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_serialize_round_trip() {
        let text = "1,G,root\n1,U,root,root,123\n2,G,dev\n0,U,dev,gone,x\n";
        let registry = Registry::parse(text);
        assert_eq!(registry.rows.len(), 4);
        assert_eq!(registry.serialize(), text);
    }

    #[test]
    fn tombstones_are_invisible_but_counted() {
        let registry = Registry::parse("1,G,root\n0,G,dead\n");
        assert!(registry.group("dead").is_none());
        // 新id基于最大现存id
        assert_eq!(registry.next_group_id(), 2);
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let registry = Registry::parse("1,G,root\n1,U,root,root,123\n");
        assert!(registry.user("Root").is_none());
        assert!(registry.user("root").is_some());
    }
}
