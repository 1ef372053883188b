//! # 格式化
//!
//! 由分区大小解出inode数N，铺出
//! `超级块 | [50个日志槽] | inode位图(N) | 块位图(3N) | inode表 | 数据区`，
//! 再播下根目录与 `/users.txt` 的种子。

use crate::layout::{
    fixed, FileBlock, FolderBlock, Inode, InodeKind, JournalEntry, Record, SuperBlock,
};
use crate::volume::partition_span;
use crate::{
    clock, write_record, BlockFile, Error, Kernel, Result, BLOCK_SIZE, JOURNAL_SLOTS, MAGIC,
};

/// mkfs 的初始 `/users.txt` 内容。
pub const USERS_SEED: &str = "1,G,root\n1,U,root,root,123\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsKind {
    Ext2,
    Ext3,
}

impl FsKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "2fs" => Ok(Self::Ext2),
            "3fs" => Ok(Self::Ext3),
            other => Err(Error::Validation(format!(
                "filesystem must be 2fs or 3fs (got '{other}')"
            ))),
        }
    }

    fn type_num(self) -> i32 {
        match self {
            Self::Ext2 => 2,
            Self::Ext3 => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MkfsReport {
    pub kind: FsKind,
    pub inodes: i32,
    pub blocks: i32,
}

/// 在挂载分区上建文件系统，覆写整个分区跨度。
pub fn mkfs(kernel: &Kernel, id: &str, full: bool, kind: FsKind) -> Result<MkfsReport> {
    let mount = kernel.mount_entry(id)?;
    let io = BlockFile::open(&mount.path)?;
    let (start, size) = partition_span(&io, mount)?;

    // 每个inode连带1字节inode位图、3字节块位图与3个数据块
    let journal_total = match kind {
        FsKind::Ext3 => (JOURNAL_SLOTS * JournalEntry::SIZE) as i64,
        FsKind::Ext2 => 0,
    };
    let per_inode = (1 + Inode::SIZE + 3 + 3 * BLOCK_SIZE) as i64;
    let available = size - SuperBlock::SIZE as i64 - journal_total;
    let n = available / per_inode;
    if n <= 0 {
        return Err(Error::Capacity(format!(
            "partition of {size} bytes is too small for a filesystem"
        )));
    }
    let n = n as i32;

    let stamp = clock::timestamp();
    let journal_start = start + SuperBlock::SIZE as i64;
    let bm_inode_start = journal_start + journal_total;
    let bm_block_start = bm_inode_start + n as i64;
    let inode_start = bm_block_start + 3 * n as i64;
    let block_start = inode_start + n as i64 * Inode::SIZE as i64;

    let sb = SuperBlock {
        filesystem_type: kind.type_num(),
        inodes_count: n,
        blocks_count: 3 * n,
        // inode 0/1 与块 0/1 预留给种子
        free_blocks_count: 3 * n - 2,
        free_inodes_count: n - 2,
        mtime: fixed(&stamp),
        umtime: fixed(&stamp),
        mnt_count: 1,
        magic: MAGIC,
        inode_size: Inode::SIZE as i32,
        block_size: BLOCK_SIZE as i32,
        first_ino: 2,
        first_blo: 2,
        bm_inode_start: bm_inode_start as i32,
        bm_block_start: bm_block_start as i32,
        inode_start: inode_start as i32,
        block_start: block_start as i32,
    };

    if full {
        io.zero_range(start as u64, size as u64)?;
    }

    if kind == FsKind::Ext3 {
        let blank = JournalEntry::blank();
        for i in 0..JOURNAL_SLOTS {
            write_record(
                &io,
                &blank,
                (journal_start + (i * JournalEntry::SIZE) as i64) as u64,
            )?;
        }
        let first = JournalEntry::new(
            1,
            "mkfs",
            id,
            &format!("EXT3 format - Inodes:{n} Blocks:{}", 3 * n),
            clock::unix_seconds() as f32,
        );
        write_record(&io, &first, journal_start as u64)?;
    }

    // 位图清零
    io.zero_range(bm_inode_start as u64, n as u64)?;
    io.zero_range(bm_block_start as u64, (3 * n) as u64)?;

    // inode表写满空槽：块表全-1，其余为零
    let mut slot = vec![0u8; Inode::SIZE];
    Inode::blank().encode(&mut slot);
    let mut table = vec![0u8; n as usize * Inode::SIZE];
    for chunk in table.chunks_exact_mut(Inode::SIZE) {
        chunk.copy_from_slice(&slot);
    }
    io.write_at(&table, inode_start as u64)?;

    // 数据区清零
    io.zero_range(block_start as u64, (3 * n as u64) * BLOCK_SIZE as u64)?;

    write_record(&io, &sb, start as u64)?;
    seed_root(&io, &sb, &stamp)?;
    io.sync()?;

    log::info!(
        "formatted {id} as EXT{} with {n} inodes / {} blocks",
        sb.filesystem_type,
        3 * n
    );
    Ok(MkfsReport {
        kind,
        inodes: n,
        blocks: 3 * n,
    })
}

/// 根目录与 `/users.txt` 的基线：inode 0/1、块 0/1、
/// 两张位图的前两个字节。mkfs 与 recovery 共用。
pub(crate) fn seed_root(io: &BlockFile, sb: &SuperBlock, stamp: &str) -> Result<()> {
    let mut root = Inode::new(InodeKind::Directory, 1, 1, *b"777", stamp);
    root.block[0] = 0;

    let mut root_dir = FolderBlock::empty();
    root_dir.entries[0].set(".", 0);
    root_dir.entries[1].set("..", 0);
    root_dir.entries[2].set("users.txt", 1);

    let mut users = Inode::new(InodeKind::File, 1, 1, *b"777", stamp);
    users.size = USERS_SEED.len() as i32;
    users.block[0] = 1;
    let users_block = FileBlock::from_bytes(USERS_SEED.as_bytes());

    write_record(io, &root, sb.inode_start as u64)?;
    write_record(io, &users, (sb.inode_start + sb.inode_size) as u64)?;
    write_record(io, &root_dir, sb.block_start as u64)?;
    write_record(io, &users_block, (sb.block_start + sb.block_size) as u64)?;

    io.write_at(&[1, 1], sb.bm_inode_start as u64)?;
    io.write_at(&[1, 1], sb.bm_block_start as u64)?;
    Ok(())
}
