use crate::layout::{fixed, get_array, get_i32, put_array, put_i32, Record};

/// inode：文件与目录共用的定长元数据槽。
///
/// 块表语义：`block[0..12]` 直接数据块，`block[12]` 一级索引块
/// （16个int32），13/14 预留给二级/三级索引，本实现拒绝使用。
#[derive(Debug, Clone)]
pub struct Inode {
    pub uid: i32,
    pub gid: i32,
    pub size: i32,
    pub atime: [u8; 17],
    pub ctime: [u8; 17],
    pub mtime: [u8; 17],
    pub block: [i32; 15],
    /// `'0'` 目录，`'1'` 文件
    pub kind: u8,
    /// 三个ASCII八进制位：属主/同组/其他
    pub perm: [u8; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    Directory,
    File,
}

impl Inode {
    pub fn new(kind: InodeKind, uid: i32, gid: i32, perm: [u8; 3], stamp: &str) -> Self {
        let stamp = fixed(stamp);
        Self {
            uid,
            gid,
            size: 0,
            atime: stamp,
            ctime: stamp,
            mtime: stamp,
            block: [-1; 15],
            kind: match kind {
                InodeKind::Directory => b'0',
                InodeKind::File => b'1',
            },
            perm,
        }
    }

    /// mkfs 写满inode表用的空槽：全零，仅块表置 `-1`。
    pub fn blank() -> Self {
        Self {
            uid: 0,
            gid: 0,
            size: 0,
            atime: [0; 17],
            ctime: [0; 17],
            mtime: [0; 17],
            block: [-1; 15],
            kind: 0,
            perm: [0; 3],
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == b'0'
    }

    pub fn is_file(&self) -> bool {
        self.kind == b'1'
    }

    pub fn touch(&mut self, stamp: &str) {
        self.mtime = fixed(stamp);
    }

    pub fn perm_text(&self) -> String {
        String::from_utf8_lossy(&self.perm).into_owned()
    }

    pub fn mtime_text(&self) -> String {
        crate::layout::text(&self.mtime)
    }
}

impl Record for Inode {
    const SIZE: usize = 127;

    fn encode(&self, buf: &mut [u8]) {
        put_i32(buf, 0, self.uid);
        put_i32(buf, 4, self.gid);
        put_i32(buf, 8, self.size);
        put_array(buf, 12, &self.atime);
        put_array(buf, 29, &self.ctime);
        put_array(buf, 46, &self.mtime);
        for (i, b) in self.block.iter().enumerate() {
            put_i32(buf, 63 + i * 4, *b);
        }
        buf[123] = self.kind;
        put_array(buf, 124, &self.perm);
    }

    fn decode(buf: &[u8]) -> Self {
        let mut block = [0i32; 15];
        for (i, b) in block.iter_mut().enumerate() {
            *b = get_i32(buf, 63 + i * 4);
        }
        Self {
            uid: get_i32(buf, 0),
            gid: get_i32(buf, 4),
            size: get_i32(buf, 8),
            atime: get_array(buf, 12),
            ctime: get_array(buf, 29),
            mtime: get_array(buf, 46),
            block,
            kind: buf[123],
            perm: get_array(buf, 124),
        }
    }
}
