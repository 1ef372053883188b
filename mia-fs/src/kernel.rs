//! # 挂载内核
//!
//! 进程全局状态的唯一载体：挂载表、磁盘字母次序与会话。
//! 每条命令都接收 `&mut Kernel` 串行执行；结构本身不做并发防护。
//!
//! 挂载ID的编码是对外契约：学号后两位 + 盘内序号 + 磁盘字母，
//! 例如第二块磁盘上挂的第二个分区得到 `"852B"`。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::fs::users::Session;
use crate::layout::{fixed, Ebr, Mbr};
use crate::{read_record, write_record, BlockFile, Error, Result, CARNET_SUFFIX};

#[derive(Debug, Default)]
pub struct Kernel {
    mounts: BTreeMap<String, MountedPartition>,
    /// 按首次挂载顺序排列的磁盘，位置即字母；磁盘清空挂载后让位
    disk_order: Vec<PathBuf>,
    pub(crate) session: Option<Session>,
}

/// 挂载表项：状态位落盘，其余仅存于内存。
#[derive(Debug, Clone)]
pub struct MountedPartition {
    pub path: PathBuf,
    pub name: String,
    pub id: String,
    pub kind: MountKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    Primary { index: usize },
    Logical { ebr_pos: i64 },
}

impl Kernel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mounted(&self) -> impl Iterator<Item = &MountedPartition> {
        self.mounts.values()
    }

    pub fn mount_entry(&self, id: &str) -> Result<&MountedPartition> {
        self.mounts
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("no mounted partition with id '{id}'")))
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// 只有主分区与逻辑分区可挂载；扩展分区拒绝。
    pub fn mount(&mut self, path: &Path, name: &str) -> Result<String> {
        require_mia(path)?;
        if self
            .mounts
            .values()
            .any(|m| m.path == path && m.name == name)
        {
            return Err(Error::AlreadyExists(format!(
                "partition '{name}' of {} is already mounted",
                path.display()
            )));
        }

        let io = BlockFile::open(path)?;
        let mbr: Mbr = read_record(&io, 0)?;

        let kind = match mbr.find_by_name(name) {
            Some(index) => {
                if mbr.partitions[index].kind == b'e' {
                    return Err(Error::Validation(
                        "extended partitions cannot be mounted; mount a primary or logical partition"
                            .into(),
                    ));
                }
                MountKind::Primary { index }
            }
            None => {
                let ebr_pos = find_logical(&io, &mbr, name)?.ok_or_else(|| {
                    Error::NotFound(format!(
                        "partition '{name}' not found in {}",
                        path.display()
                    ))
                })?;
                MountKind::Logical { ebr_pos }
            }
        };

        let id = self.generate_id(path);
        match kind {
            MountKind::Primary { index } => {
                let mut mbr = mbr;
                let slot = &mut mbr.partitions[index];
                slot.status = b'1';
                slot.id = fixed(&id);
                slot.correlative = 1;
                write_record(&io, &mbr, 0)?;
            }
            MountKind::Logical { ebr_pos } => {
                let mut ebr: Ebr = read_record(&io, ebr_pos as u64)?;
                ebr.status = b'1';
                write_record(&io, &ebr, ebr_pos as u64)?;
            }
        }
        io.sync()?;

        log::info!("mounted '{name}' from {} as {id}", path.display());
        self.mounts.insert(
            id.clone(),
            MountedPartition {
                path: path.to_path_buf(),
                name: name.to_owned(),
                id: id.clone(),
                kind,
            },
        );
        Ok(id)
    }

    pub fn unmount(&mut self, id: &str) -> Result<MountedPartition> {
        let entry = self
            .mounts
            .remove(id)
            .ok_or_else(|| Error::NotFound(format!("no mounted partition with id '{id}'")))?;

        let io = BlockFile::open(&entry.path)?;
        match entry.kind {
            MountKind::Primary { index } => {
                let mut mbr: Mbr = read_record(&io, 0)?;
                let slot = &mut mbr.partitions[index];
                slot.status = b'0';
                slot.id = [0; 4];
                slot.correlative = 0;
                write_record(&io, &mbr, 0)?;
            }
            MountKind::Logical { ebr_pos } => {
                let mut ebr: Ebr = read_record(&io, ebr_pos as u64)?;
                ebr.status = b'0';
                write_record(&io, &ebr, ebr_pos as u64)?;
            }
        }
        io.sync()?;

        if !self.mounts.values().any(|m| m.path == entry.path) {
            self.disk_order.retain(|p| p != &entry.path);
        }
        log::info!("unmounted {id}");
        Ok(entry)
    }

    fn generate_id(&mut self, path: &Path) -> String {
        let index = match self.disk_order.iter().position(|p| p == path) {
            Some(i) => i,
            None => {
                self.disk_order.push(path.to_path_buf());
                self.disk_order.len() - 1
            }
        };
        let letter = (b'A' + index as u8) as char;
        let number = self.mounts.values().filter(|m| m.path == path).count() + 1;
        format!("{CARNET_SUFFIX}{number}{letter}")
    }

    /// rmdisk 之后清掉指向该文件的挂载与字母占位。
    pub(crate) fn forget_disk(&mut self, path: &Path) {
        self.mounts.retain(|_, m| m.path != path);
        self.disk_order.retain(|p| p != path);
    }
}

pub(crate) fn require_mia(path: &Path) -> Result<()> {
    let ok = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mia"));
    if ok {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "{} is not a valid disk image (.mia)",
            path.display()
        )))
    }
}

// 沿EBR链查名字，返回命中EBR的绝对偏移
fn find_logical(io: &BlockFile, mbr: &Mbr, name: &str) -> Result<Option<i64>> {
    let Some(ext) = mbr.extended() else {
        return Ok(None);
    };
    let mut pos = mbr.partitions[ext].start as i64;
    loop {
        let ebr: Ebr = read_record(io, pos as u64)?;
        if !ebr.is_empty() && ebr.name() == name {
            return Ok(Some(pos));
        }
        if ebr.next == -1 {
            return Ok(None);
        }
        pos = ebr.next as i64;
    }
}
