use crate::layout::{fixed, get_array, get_i32, put_array, put_i32, text, Record};
use crate::{BLOCK_SIZE, INDIRECT_COUNT, NAME_LEN};

/// 数据块：64字节纯内容。
#[derive(Debug, Clone)]
pub struct FileBlock {
    pub content: [u8; BLOCK_SIZE],
}

/// 目录块：恰好4个 `(名字[12], inode)` 项，`inode == -1` 为空项。
#[derive(Debug, Clone)]
pub struct FolderBlock {
    pub entries: [FolderEntry; 4],
}

#[derive(Debug, Clone)]
pub struct FolderEntry {
    pub name: [u8; NAME_LEN],
    pub inode: i32,
}

/// 一级索引块：16个指向数据块的int32，`-1` 为空。
#[derive(Debug, Clone)]
pub struct PointerBlock {
    pub pointers: [i32; INDIRECT_COUNT],
}

impl FileBlock {
    pub fn zeroed() -> Self {
        Self {
            content: [0; BLOCK_SIZE],
        }
    }

    pub fn from_bytes(data: &[u8]) -> Self {
        let mut block = Self::zeroed();
        let n = data.len().min(BLOCK_SIZE);
        block.content[..n].copy_from_slice(&data[..n]);
        block
    }
}

impl FolderEntry {
    fn vacant() -> Self {
        Self {
            name: [0; NAME_LEN],
            inode: -1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inode == -1
    }

    pub fn name(&self) -> String {
        text(&self.name)
    }

    pub fn set(&mut self, name: &str, inode: i32) {
        self.name = fixed(name);
        self.inode = inode;
    }

    pub fn clear(&mut self) {
        *self = Self::vacant();
    }
}

impl FolderBlock {
    /// 四个空项。磁盘上清零的块解码后 inode 为0，
    /// 目录块必须经由本构造器显式初始化。
    pub fn empty() -> Self {
        Self {
            entries: [
                FolderEntry::vacant(),
                FolderEntry::vacant(),
                FolderEntry::vacant(),
                FolderEntry::vacant(),
            ],
        }
    }
}

impl PointerBlock {
    pub fn empty() -> Self {
        Self {
            pointers: [-1; INDIRECT_COUNT],
        }
    }
}

impl Record for FileBlock {
    const SIZE: usize = BLOCK_SIZE;

    fn encode(&self, buf: &mut [u8]) {
        put_array(buf, 0, &self.content);
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            content: get_array(buf, 0),
        }
    }
}

impl Record for FolderBlock {
    const SIZE: usize = BLOCK_SIZE;

    fn encode(&self, buf: &mut [u8]) {
        for (i, e) in self.entries.iter().enumerate() {
            put_array(buf, i * 16, &e.name);
            put_i32(buf, i * 16 + NAME_LEN, e.inode);
        }
    }

    fn decode(buf: &[u8]) -> Self {
        let mut block = Self::empty();
        for (i, e) in block.entries.iter_mut().enumerate() {
            e.name = get_array(buf, i * 16);
            e.inode = get_i32(buf, i * 16 + NAME_LEN);
        }
        block
    }
}

impl Record for PointerBlock {
    const SIZE: usize = BLOCK_SIZE;

    fn encode(&self, buf: &mut [u8]) {
        for (i, p) in self.pointers.iter().enumerate() {
            put_i32(buf, i * 4, *p);
        }
    }

    fn decode(buf: &[u8]) -> Self {
        let mut block = Self::empty();
        for (i, p) in block.pointers.iter_mut().enumerate() {
            *p = get_i32(buf, i * 4);
        }
        block
    }
}
