use crate::layout::{get_array, get_i32, put_array, put_i32, Record};
use crate::MAGIC;

/// 超级块：mkfs 后位于分区起始处。
///
/// 区域起点（两张位图、inode表、数据区）都是磁盘文件内的
/// **绝对**字节偏移；EXT3 时超级块与inode位图之间还隔着
/// 恰好50个日志槽。
#[derive(Debug, Clone)]
pub struct SuperBlock {
    /// 2 = EXT2，3 = EXT3
    pub filesystem_type: i32,
    pub inodes_count: i32,
    pub blocks_count: i32,
    pub free_blocks_count: i32,
    pub free_inodes_count: i32,
    pub mtime: [u8; 17],
    pub umtime: [u8; 17],
    pub mnt_count: i32,
    pub magic: i32,
    pub inode_size: i32,
    pub block_size: i32,
    /// 空闲inode提示
    pub first_ino: i32,
    /// 空闲块提示
    pub first_blo: i32,
    pub bm_inode_start: i32,
    pub bm_block_start: i32,
    pub inode_start: i32,
    pub block_start: i32,
}

impl SuperBlock {
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    pub fn is_ext3(&self) -> bool {
        self.filesystem_type == 3
    }
}

impl Record for SuperBlock {
    const SIZE: usize = 94;

    fn encode(&self, buf: &mut [u8]) {
        put_i32(buf, 0, self.filesystem_type);
        put_i32(buf, 4, self.inodes_count);
        put_i32(buf, 8, self.blocks_count);
        put_i32(buf, 12, self.free_blocks_count);
        put_i32(buf, 16, self.free_inodes_count);
        put_array(buf, 20, &self.mtime);
        put_array(buf, 37, &self.umtime);
        put_i32(buf, 54, self.mnt_count);
        put_i32(buf, 58, self.magic);
        put_i32(buf, 62, self.inode_size);
        put_i32(buf, 66, self.block_size);
        put_i32(buf, 70, self.first_ino);
        put_i32(buf, 74, self.first_blo);
        put_i32(buf, 78, self.bm_inode_start);
        put_i32(buf, 82, self.bm_block_start);
        put_i32(buf, 86, self.inode_start);
        put_i32(buf, 90, self.block_start);
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            filesystem_type: get_i32(buf, 0),
            inodes_count: get_i32(buf, 4),
            blocks_count: get_i32(buf, 8),
            free_blocks_count: get_i32(buf, 12),
            free_inodes_count: get_i32(buf, 16),
            mtime: get_array(buf, 20),
            umtime: get_array(buf, 37),
            mnt_count: get_i32(buf, 54),
            magic: get_i32(buf, 58),
            inode_size: get_i32(buf, 62),
            block_size: get_i32(buf, 66),
            first_ino: get_i32(buf, 70),
            first_blo: get_i32(buf, 74),
            bm_inode_start: get_i32(buf, 78),
            bm_block_start: get_i32(buf, 82),
            inode_start: get_i32(buf, 86),
            block_start: get_i32(buf, 90),
        }
    }
}
