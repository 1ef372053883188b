//! # EXT3 日志
//!
//! 紧跟超级块的50个定长槽构成环：追加时线性扫出最后一个
//! 已用槽，写到它后面，写满则绕回槽0。EXT2 卷静默跳过。
//!
//! `loss` 把元数据区清零模拟灾难，`recovery` 只重播 mkfs 基线
//! （根目录 + `/users.txt`）——日志区自身从不被触碰，
//! 之后的记录留作审计。

use crate::fs::mkfs::seed_root;
use crate::layout::{fixed, JournalEntry, Record, SuperBlock};
use crate::{clock, read_record, write_record, Error, Kernel, Result, Volume, JOURNAL_SLOTS};

fn journal_base(vol: &Volume) -> u64 {
    (vol.start() + SuperBlock::SIZE as i64) as u64
}

fn slot_offset(vol: &Volume, slot: usize) -> u64 {
    journal_base(vol) + (slot * JournalEntry::SIZE) as u64
}

/// 记一笔操作。内容字段按宽度截断；EXT2 卷什么也不做。
pub fn append(vol: &Volume, operation: &str, path: &str, content: &str) -> Result<()> {
    if !vol.sb.is_ext3() {
        return Ok(());
    }
    let mut last: i64 = -1;
    for slot in 0..JOURNAL_SLOTS {
        let entry: JournalEntry = read_record(vol.io(), slot_offset(vol, slot))?;
        if entry.count > 0 {
            last = slot as i64;
        }
    }
    let slot = (last + 1) as usize % JOURNAL_SLOTS;
    let entry = JournalEntry::new(
        slot as i32 + 1,
        operation,
        path,
        content,
        clock::unix_seconds() as f32,
    );
    write_record(vol.io(), &entry, slot_offset(vol, slot))?;
    log::debug!("journal[{slot}] <- {operation} {path}");
    Ok(())
}

/// 非空日志条目，按槽序。仅限EXT3。
pub fn entries(vol: &Volume) -> Result<Vec<JournalEntry>> {
    require_ext3(vol, "journaling")?;
    let mut out = Vec::new();
    for slot in 0..JOURNAL_SLOTS {
        let entry: JournalEntry = read_record(vol.io(), slot_offset(vol, slot))?;
        if !entry.is_blank() {
            out.push(entry);
        }
    }
    Ok(out)
}

/// 灾难模拟：两张位图、inode表与数据区全部清零。
/// 超级块与日志保持原样。
pub fn loss(kernel: &Kernel, id: &str) -> Result<()> {
    let mount = kernel.mount_entry(id)?.clone();
    let vol = Volume::open(&mount)?;
    require_ext3(&vol, "loss")?;

    // 先记账再动手：擦除不会波及日志区
    append(&vol, "loss", id, "metadata wiped")?;

    let sb = &vol.sb;
    vol.io()
        .zero_range(sb.bm_inode_start as u64, sb.inodes_count as u64)?;
    vol.io()
        .zero_range(sb.bm_block_start as u64, sb.blocks_count as u64)?;
    vol.io().zero_range(
        sb.inode_start as u64,
        (sb.inodes_count * sb.inode_size) as u64,
    )?;
    vol.io().zero_range(
        sb.block_start as u64,
        (sb.blocks_count * sb.block_size) as u64,
    )?;
    vol.sync()?;
    log::warn!("simulated metadata loss on {id}");
    Ok(())
}

/// 从日志恢复：要求日志里有 mkfs 记录，然后重建基线并
/// 复位空闲计数。返回截至最后一条 mkfs 的日志条数。
pub fn recovery(kernel: &Kernel, id: &str) -> Result<usize> {
    let mount = kernel.mount_entry(id)?.clone();
    let vol = Volume::open(&mount)?;
    require_ext3(&vol, "recovery")?;

    // 扫描在首个空槽处停下，与追加时的线性扫描对应
    let mut log_entries = Vec::new();
    for slot in 0..JOURNAL_SLOTS {
        let entry: JournalEntry = read_record(vol.io(), slot_offset(&vol, slot))?;
        if entry.is_blank() {
            break;
        }
        log_entries.push(entry);
    }
    let last_mkfs = log_entries
        .iter()
        .rposition(|e| e.operation().eq_ignore_ascii_case("mkfs"))
        .ok_or_else(|| {
            Error::NotFound("the journal holds no mkfs entry; nothing to recover to".into())
        })?;

    let stamp = clock::timestamp();
    seed_root(vol.io(), &vol.sb, &stamp)?;

    let mut sb = vol.sb.clone();
    sb.free_inodes_count = sb.inodes_count - 2;
    sb.free_blocks_count = sb.blocks_count - 2;
    sb.first_ino = 2;
    sb.first_blo = 2;
    sb.umtime = fixed(&stamp);
    write_record(vol.io(), &sb, vol.start() as u64)?;
    vol.sync()?;

    log::info!("recovered {id} to the baseline of journal entry #{}", last_mkfs + 1);
    Ok(last_mkfs + 1)
}

fn require_ext3(vol: &Volume, command: &str) -> Result<()> {
    if vol.sb.is_ext3() {
        Ok(())
    } else {
        Err(Error::FilesystemMismatch(format!(
            "{command} requires an EXT3 filesystem (this partition is EXT{})",
            vol.sb.filesystem_type
        )))
    }
}
