//! # 磁盘与分区管理
//!
//! 创建/删除磁盘文件，MBR 上的主/扩展分区与扩展分区内的
//! EBR 逻辑分区链。布局策略是线性追加：新分区从上一个已
//! 占用槽的末尾开始，不做空洞压缩；fit 码只落盘存档，
//! 分配本身始终first-fit。

use std::fs;
use std::path::Path;

use crate::kernel::require_mia;
use crate::layout::{fixed, Ebr, Mbr, Partition, Record};
use crate::{clock, read_record, write_record, BlockFile, Error, Kernel, Result};

/// 存档用的空闲适配策略，分配器并不消费它。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    Best,
    First,
    Worst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Byte,
    Kib,
    Mib,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    Primary,
    Extended,
    Logical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// 只清分区表项
    Fast,
    /// 另外把数据区覆写为零
    Full,
}

impl Fit {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "bf" => Ok(Self::Best),
            "ff" => Ok(Self::First),
            "wf" => Ok(Self::Worst),
            other => Err(Error::Validation(format!(
                "fit must be bf, ff or wf (got '{other}')"
            ))),
        }
    }

    pub fn bytes(self) -> [u8; 2] {
        match self {
            Self::Best => *b"bf",
            Self::First => *b"ff",
            Self::Worst => *b"wf",
        }
    }

    /// EBR 的单字节形式。
    pub fn byte(self) -> u8 {
        self.bytes()[0]
    }
}

impl Unit {
    pub fn parse(s: &str, allow_bytes: bool) -> Result<Self> {
        match s {
            "b" if allow_bytes => Ok(Self::Byte),
            "k" => Ok(Self::Kib),
            "m" => Ok(Self::Mib),
            other => {
                let accepted = if allow_bytes { "b, k or m" } else { "k or m" };
                Err(Error::Validation(format!(
                    "unit must be {accepted} (got '{other}')"
                )))
            }
        }
    }

    pub fn scale(self) -> i64 {
        match self {
            Self::Byte => 1,
            Self::Kib => 1024,
            Self::Mib => 1024 * 1024,
        }
    }
}

impl PartitionKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "p" => Ok(Self::Primary),
            "e" => Ok(Self::Extended),
            "l" => Ok(Self::Logical),
            other => Err(Error::Validation(format!(
                "partition type must be p, e or l (got '{other}')"
            ))),
        }
    }

    fn byte(self) -> u8 {
        match self {
            Self::Primary => b'p',
            Self::Extended => b'e',
            Self::Logical => b'l',
        }
    }
}

impl DeleteMode {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "fast" => Ok(Self::Fast),
            "full" => Ok(Self::Full),
            other => Err(Error::Validation(format!(
                "delete mode must be fast or full (got '{other}')"
            ))),
        }
    }
}

/// 创建磁盘文件：零填充到 `size × unit` 并写入MBR。
pub fn mkdisk(size: i64, fit: Fit, unit: Unit, path: &Path) -> Result<()> {
    if size <= 0 {
        return Err(Error::Validation("disk size must be greater than 0".into()));
    }
    if unit == Unit::Byte {
        return Err(Error::Validation("mkdisk unit must be k or m".into()));
    }
    let bytes = size * unit.scale();
    if bytes > i32::MAX as i64 {
        return Err(Error::Validation(format!(
            "disk of {bytes} bytes exceeds the {} byte limit",
            i32::MAX
        )));
    }

    let io = BlockFile::create(path, bytes as u64)?;
    let mbr = Mbr::new(
        bytes as i32,
        fit.bytes(),
        &clock::date(),
        clock::unix_seconds() as i32,
    );
    write_record(&io, &mbr, 0)?;
    io.sync()?;
    log::info!("created disk {} ({bytes} bytes)", path.display());
    Ok(())
}

/// 删除磁盘文件并清掉指向它的挂载记录。
pub fn rmdisk(kernel: &mut Kernel, path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(Error::NotFound(format!(
            "disk file {} does not exist",
            path.display()
        )));
    }
    require_mia(path)?;
    fs::remove_file(path)?;
    kernel.forget_disk(path);
    log::info!("removed disk {}", path.display());
    Ok(())
}

/// 创建主/扩展/逻辑分区。
pub fn fdisk_create(
    size: i64,
    path: &Path,
    name: &str,
    kind: PartitionKind,
    fit: Fit,
    unit: Unit,
) -> Result<()> {
    require_mia(path)?;
    if name.trim().is_empty() {
        return Err(Error::Validation("partition name is required".into()));
    }
    if name.len() > 16 {
        return Err(Error::Validation(format!(
            "partition name '{name}' exceeds 16 bytes"
        )));
    }
    if size <= 0 {
        return Err(Error::Validation(
            "partition size must be greater than 0".into(),
        ));
    }
    let bytes = size * unit.scale();

    let io = BlockFile::open(path)?;
    let mut mbr: Mbr = read_record(&io, 0)?;

    // 磁盘空间：主+扩展的总和不得越过 MBR 预留之外的可用区
    let used: i64 = mbr
        .partitions
        .iter()
        .filter(|p| !p.is_empty())
        .map(|p| p.size as i64)
        .sum();
    let available = mbr.size as i64 - Mbr::SIZE as i64;
    if kind != PartitionKind::Logical && used + bytes > available {
        return Err(Error::Capacity(format!(
            "not enough disk space: {} of {available} bytes in use, {bytes} requested",
            used
        )));
    }

    // 名字在全盘唯一，包括逻辑分区
    if mbr.find_by_name(name).is_some() || find_logical_by_name(&io, &mbr, name)?.is_some() {
        return Err(Error::AlreadyExists(format!(
            "a partition named '{name}' already exists"
        )));
    }

    match kind {
        PartitionKind::Primary | PartitionKind::Extended => {
            if mbr.populated() >= 4 {
                return Err(Error::Validation(
                    "all 4 primary/extended slots are in use".into(),
                ));
            }
            if kind == PartitionKind::Extended && mbr.extended().is_some() {
                return Err(Error::Validation(
                    "the disk already has an extended partition".into(),
                ));
            }

            // 线性布局：接在最后一个已占用槽的末尾
            let mut gap = 0;
            for p in mbr.partitions.iter().filter(|p| !p.is_empty()) {
                gap = p.end();
            }
            let start = if gap > 0 { gap } else { Mbr::SIZE as i32 };

            let slot = mbr
                .partitions
                .iter_mut()
                .find(|p| p.is_empty())
                .ok_or_else(|| Error::Validation("no empty MBR slot available".into()))?;
            *slot = Partition {
                status: b'0',
                kind: kind.byte(),
                fit: fit.bytes(),
                start,
                size: bytes as i32,
                name: fixed(name),
                correlative: 0,
                id: [0; 4],
            };

            if kind == PartitionKind::Extended {
                write_record(&io, &Ebr::empty(), start as u64)?;
            }
            write_record(&io, &mbr, 0)?;
        }
        PartitionKind::Logical => {
            create_logical(&io, &mbr, bytes, name, fit)?;
        }
    }
    io.sync()?;
    log::info!("created {kind:?} partition '{name}' ({bytes} bytes)");
    Ok(())
}

fn create_logical(io: &BlockFile, mbr: &Mbr, bytes: i64, name: &str, fit: Fit) -> Result<()> {
    let ext = mbr.extended().ok_or_else(|| {
        Error::NotFound("a logical partition requires an extended partition".into())
    })?;
    let ext = &mbr.partitions[ext];

    // 找插入点：头EBR为空就地复用，否则接在链尾数据区之后
    let mut pos = ext.start as i64;
    let mut prev: Option<i64> = None;
    let new_pos;
    loop {
        let ebr: Ebr = read_record(io, pos as u64)?;
        if ebr.is_empty() {
            new_pos = pos;
            break;
        }
        if ebr.next != -1 {
            prev = Some(pos);
            pos = ebr.next as i64;
        } else {
            new_pos = ebr.end() as i64;
            prev = Some(pos);
            break;
        }
    }

    let ext_end = ext.end() as i64;
    if new_pos + Ebr::SIZE as i64 + bytes > ext_end {
        return Err(Error::Capacity(
            "not enough space left in the extended partition".into(),
        ));
    }

    let new_ebr = Ebr {
        status: b'0',
        fit: fit.byte(),
        start: (new_pos + Ebr::SIZE as i64) as i32,
        size: bytes as i32,
        next: -1,
        name: fixed(name),
    };
    write_record(io, &new_ebr, new_pos as u64)?;

    if let Some(prev_pos) = prev {
        if prev_pos != new_pos {
            let mut prev_ebr: Ebr = read_record(io, prev_pos as u64)?;
            prev_ebr.next = new_pos as i32;
            write_record(io, &prev_ebr, prev_pos as u64)?;
        }
    }
    Ok(())
}

/// 给指定分区增减空间；`delta` 为字节数，可负。
/// 扩张要求紧随其后的空间确实空闲，收缩不得把大小压到0以下。
pub fn fdisk_add(path: &Path, name: &str, delta: i64) -> Result<()> {
    require_mia(path)?;
    if delta == 0 {
        return Err(Error::Validation("-add must not be 0".into()));
    }

    let io = BlockFile::open(path)?;
    let mut mbr: Mbr = read_record(&io, 0)?;

    if let Some(index) = mbr.find_by_name(name) {
        let new_size = mbr.partitions[index].size as i64 + delta;
        if new_size <= 0 {
            return Err(Error::Validation(
                "the resulting partition size would not be positive".into(),
            ));
        }
        if delta > 0 {
            let end = mbr.partitions[index].end();
            let next_start = mbr
                .partitions
                .iter()
                .enumerate()
                .filter(|(i, p)| *i != index && !p.is_empty() && p.start > end)
                .map(|(_, p)| p.start)
                .min()
                .unwrap_or(mbr.size);
            if delta > (next_start - end) as i64 {
                return Err(Error::Capacity(format!(
                    "only {} free bytes follow partition '{name}'",
                    next_start - end
                )));
            }
        }
        mbr.partitions[index].size = new_size as i32;
        write_record(&io, &mbr, 0)?;
        io.sync()?;
        return Ok(());
    }

    // 逻辑分区：界限是下一个EBR或扩展分区末尾
    let (pos, mut ebr) = find_logical_by_name(&io, &mbr, name)?
        .ok_or_else(|| Error::NotFound(format!("partition '{name}' not found")))?;
    let new_size = ebr.size as i64 + delta;
    if new_size <= 0 {
        return Err(Error::Validation(
            "the resulting partition size would not be positive".into(),
        ));
    }
    if delta > 0 {
        let ext = &mbr.partitions[mbr.extended().expect("logical without extended")];
        let bound = if ebr.next != -1 { ebr.next } else { ext.end() };
        let free = (bound - ebr.end()) as i64;
        if delta > free {
            return Err(Error::Capacity(format!(
                "only {free} free bytes follow logical partition '{name}'"
            )));
        }
    }
    ebr.size = new_size as i32;
    write_record(&io, &ebr, pos as u64)?;
    io.sync()?;
    Ok(())
}

/// 删除分区。`full` 把数据区覆写为零；
/// 删除扩展分区会连带删除其中全部逻辑分区。
pub fn fdisk_delete(path: &Path, name: &str, mode: DeleteMode) -> Result<()> {
    require_mia(path)?;
    let io = BlockFile::open(path)?;
    let mut mbr: Mbr = read_record(&io, 0)?;

    if let Some(index) = mbr.find_by_name(name) {
        let part = mbr.partitions[index].clone();
        if part.kind == b'e' {
            wipe_logicals(&io, &part, mode)?;
        }
        if mode == DeleteMode::Full {
            io.zero_range(part.start as u64, part.size as u64)?;
        }
        mbr.partitions[index].clear();
        write_record(&io, &mbr, 0)?;
        io.sync()?;
        log::info!("deleted partition '{name}' ({mode:?})");
        return Ok(());
    }

    // 逻辑分区：摘链并腾空EBR槽
    let ext = mbr
        .extended()
        .ok_or_else(|| Error::NotFound(format!("partition '{name}' not found")))?;
    let ext = &mbr.partitions[ext];
    let mut pos = ext.start as i64;
    let mut prev: Option<i64> = None;
    loop {
        let ebr: Ebr = read_record(&io, pos as u64)?;
        if !ebr.is_empty() && ebr.name() == name {
            if mode == DeleteMode::Full {
                io.zero_range(ebr.start as u64, ebr.size as u64)?;
            }
            match prev {
                Some(prev_pos) => {
                    let mut prev_ebr: Ebr = read_record(&io, prev_pos as u64)?;
                    prev_ebr.next = ebr.next;
                    write_record(&io, &prev_ebr, prev_pos as u64)?;
                    write_record(&io, &Ebr::empty(), pos as u64)?;
                }
                None => {
                    // 链头：保留next，只腾空本槽
                    let mut blank = Ebr::empty();
                    blank.next = ebr.next;
                    write_record(&io, &blank, pos as u64)?;
                }
            }
            io.sync()?;
            log::info!("deleted logical partition '{name}' ({mode:?})");
            return Ok(());
        }
        if ebr.next == -1 {
            return Err(Error::NotFound(format!("partition '{name}' not found")));
        }
        prev = Some(pos);
        pos = ebr.next as i64;
    }
}

fn wipe_logicals(io: &BlockFile, ext: &Partition, mode: DeleteMode) -> Result<()> {
    if mode != DeleteMode::Full {
        return Ok(());
    }
    let mut pos = ext.start as i64;
    loop {
        let ebr: Ebr = read_record(io, pos as u64)?;
        if !ebr.is_empty() {
            io.zero_range(ebr.start as u64, ebr.size as u64)?;
        }
        if ebr.next == -1 {
            return Ok(());
        }
        pos = ebr.next as i64;
    }
}

// 沿EBR链查名字，返回 (EBR偏移, EBR)
fn find_logical_by_name(io: &BlockFile, mbr: &Mbr, name: &str) -> Result<Option<(i64, Ebr)>> {
    let Some(ext) = mbr.extended() else {
        return Ok(None);
    };
    let mut pos = mbr.partitions[ext].start as i64;
    loop {
        let ebr: Ebr = read_record(io, pos as u64)?;
        if !ebr.is_empty() && ebr.name() == name {
            return Ok(Some((pos, ebr)));
        }
        if ebr.next == -1 {
            return Ok(None);
        }
        pos = ebr.next as i64;
    }
}
