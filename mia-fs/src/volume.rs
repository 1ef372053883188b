//! # 卷
//!
//! 已挂载、已格式化分区的打开视图：超级块 + 针对 inode 与
//! 各类块的定型读写，以及字节位图分配器。
//!
//! 位图一槽一字节，`0` 空闲 `1` 占用；分配始终线性首次适配。
//! 每次分配/释放都当场把空闲计数持久化到分区起始处的超级块，
//! 持久化失败对当前命令是致命的。

use crate::layout::{Ebr, FileBlock, FolderBlock, Inode, Mbr, PointerBlock, Record, SuperBlock};
use crate::{
    read_record, write_record, BlockFile, Error, MountKind, MountedPartition, Result,
};

pub struct Volume {
    io: BlockFile,
    start: i64,
    size: i64,
    pub sb: SuperBlock,
}

impl Volume {
    /// 打开挂载分区上的文件系统；魔数不符即视为未格式化。
    pub fn open(mount: &MountedPartition) -> Result<Self> {
        let io = BlockFile::open(&mount.path)?;
        let (start, size) = partition_span(&io, mount)?;
        let sb: SuperBlock = read_record(&io, start as u64)?;
        if !sb.is_valid() {
            return Err(Error::NotFound(format!(
                "partition '{}' has no filesystem; run mkfs first",
                mount.id
            )));
        }
        Ok(Self { io, start, size, sb })
    }

    pub fn io(&self) -> &BlockFile {
        &self.io
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn size(&self) -> i64 {
        self.size
    }

    pub fn sync(&self) -> Result<()> {
        self.io.sync()
    }

    fn inode_pos(&self, index: i32) -> u64 {
        (self.sb.inode_start + index * self.sb.inode_size) as u64
    }

    fn block_pos(&self, index: i32) -> u64 {
        (self.sb.block_start + index * self.sb.block_size) as u64
    }

    pub fn read_inode(&self, index: i32) -> Result<Inode> {
        read_record(&self.io, self.inode_pos(index))
    }

    pub fn write_inode(&self, index: i32, inode: &Inode) -> Result<()> {
        write_record(&self.io, inode, self.inode_pos(index))
    }

    pub fn read_folder(&self, block: i32) -> Result<FolderBlock> {
        read_record(&self.io, self.block_pos(block))
    }

    pub fn write_folder(&self, block: i32, folder: &FolderBlock) -> Result<()> {
        write_record(&self.io, folder, self.block_pos(block))
    }

    pub fn read_file_block(&self, block: i32) -> Result<FileBlock> {
        read_record(&self.io, self.block_pos(block))
    }

    pub fn write_file_block(&self, block: i32, data: &FileBlock) -> Result<()> {
        write_record(&self.io, data, self.block_pos(block))
    }

    pub fn read_pointer_block(&self, block: i32) -> Result<PointerBlock> {
        read_record(&self.io, self.block_pos(block))
    }

    pub fn write_pointer_block(&self, block: i32, pointers: &PointerBlock) -> Result<()> {
        write_record(&self.io, pointers, self.block_pos(block))
    }

    /// 分配inode：扫第一个空闲字节，置1并更新空闲计数。
    pub fn alloc_inode(&mut self) -> Result<i32> {
        let index = self
            .scan_bitmap(self.sb.bm_inode_start, self.sb.inodes_count)?
            .ok_or_else(|| Error::Capacity("no free inodes left".into()))?;
        self.io.write_at(&[1], (self.sb.bm_inode_start + index) as u64)?;
        self.sb.free_inodes_count -= 1;
        self.persist_sb()?;
        Ok(index)
    }

    /// 分配数据块，语义同 [`Volume::alloc_inode`]。
    pub fn alloc_block(&mut self) -> Result<i32> {
        let index = self
            .scan_bitmap(self.sb.bm_block_start, self.sb.blocks_count)?
            .ok_or_else(|| Error::Capacity("no free blocks left".into()))?;
        self.io.write_at(&[1], (self.sb.bm_block_start + index) as u64)?;
        self.sb.free_blocks_count -= 1;
        self.persist_sb()?;
        Ok(index)
    }

    pub fn free_inode(&mut self, index: i32) -> Result<()> {
        self.io.write_at(&[0], (self.sb.bm_inode_start + index) as u64)?;
        self.sb.free_inodes_count += 1;
        self.persist_sb()
    }

    pub fn free_block(&mut self, index: i32) -> Result<()> {
        self.io.write_at(&[0], (self.sb.bm_block_start + index) as u64)?;
        self.sb.free_blocks_count += 1;
        self.persist_sb()
    }

    /// inode 位图的在盘字节，报表与一致性检查用。
    pub fn inode_bitmap(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; self.sb.inodes_count as usize];
        self.io.read_at(&mut bytes, self.sb.bm_inode_start as u64)?;
        Ok(bytes)
    }

    /// 块位图的在盘字节。
    pub fn block_bitmap(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; self.sb.blocks_count as usize];
        self.io.read_at(&mut bytes, self.sb.bm_block_start as u64)?;
        Ok(bytes)
    }

    fn scan_bitmap(&self, start: i32, count: i32) -> Result<Option<i32>> {
        let mut bytes = vec![0u8; count as usize];
        self.io.read_at(&mut bytes, start as u64)?;
        Ok(bytes.iter().position(|&b| b == 0).map(|i| i as i32))
    }

    /// 超级块写回分区起始处。
    pub fn persist_sb(&self) -> Result<()> {
        write_record(&self.io, &self.sb, self.start as u64)
    }
}

/// 挂载项对应的分区跨度 `(起始, 大小)`。
/// 逻辑分区的数据区紧跟其EBR之后。
pub(crate) fn partition_span(io: &BlockFile, mount: &MountedPartition) -> Result<(i64, i64)> {
    match mount.kind {
        MountKind::Primary { index } => {
            let mbr: Mbr = read_record(io, 0)?;
            let part = &mbr.partitions[index];
            if part.is_empty() {
                return Err(Error::NotFound(format!(
                    "partition '{}' no longer exists on disk",
                    mount.name
                )));
            }
            Ok((part.start as i64, part.size as i64))
        }
        MountKind::Logical { ebr_pos } => {
            let ebr: Ebr = read_record(io, ebr_pos as u64)?;
            Ok((ebr_pos + Ebr::SIZE as i64, ebr.size as i64))
        }
    }
}
