use crate::layout::{fixed, get_array, get_i32, put_array, put_i32, text, Record};

/// 磁盘头：总大小、创建日期、签名、适配策略与4个分区槽。
/// 始终位于磁盘文件偏移0处。
#[derive(Debug, Clone)]
pub struct Mbr {
    pub size: i32,
    pub created: [u8; 10],
    pub signature: i32,
    pub fit: [u8; 2],
    pub partitions: [Partition; 4],
}

/// MBR 分区槽。`size == 0` 即空槽。
#[derive(Debug, Clone, Default)]
pub struct Partition {
    /// `'0'` 未挂载，`'1'` 已挂载
    pub status: u8,
    /// `'p'` 主分区，`'e'` 扩展分区
    pub kind: u8,
    pub fit: [u8; 2],
    pub start: i32,
    pub size: i32,
    pub name: [u8; 16],
    pub correlative: i32,
    /// 挂载ID，未挂载时为NUL
    pub id: [u8; 4],
}

impl Mbr {
    /// `fit` 字段在记录内的偏移（落盘布局的一部分，测试依赖）。
    pub const FIT_OFFSET: usize = 18;

    pub fn new(size: i32, fit: [u8; 2], created: &str, signature: i32) -> Self {
        Self {
            size,
            created: fixed(created),
            signature,
            fit,
            partitions: Default::default(),
        }
    }

    pub fn created(&self) -> String {
        text(&self.created)
    }

    /// 已占用的主/扩展分区槽数。
    pub fn populated(&self) -> usize {
        self.partitions.iter().filter(|p| !p.is_empty()).count()
    }

    /// 扩展分区槽位，至多一个。
    pub fn extended(&self) -> Option<usize> {
        self.partitions
            .iter()
            .position(|p| !p.is_empty() && p.kind == b'e')
    }

    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.partitions
            .iter()
            .position(|p| !p.is_empty() && p.name() == name)
    }
}

impl Partition {
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn name(&self) -> String {
        text(&self.name)
    }

    pub fn end(&self) -> i32 {
        self.start + self.size
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl Record for Partition {
    const SIZE: usize = 36;

    fn encode(&self, buf: &mut [u8]) {
        buf[0] = self.status;
        buf[1] = self.kind;
        put_array(buf, 2, &self.fit);
        put_i32(buf, 4, self.start);
        put_i32(buf, 8, self.size);
        put_array(buf, 12, &self.name);
        put_i32(buf, 28, self.correlative);
        put_array(buf, 32, &self.id);
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            status: buf[0],
            kind: buf[1],
            fit: get_array(buf, 2),
            start: get_i32(buf, 4),
            size: get_i32(buf, 8),
            name: get_array(buf, 12),
            correlative: get_i32(buf, 28),
            id: get_array(buf, 32),
        }
    }
}

impl Record for Mbr {
    const SIZE: usize = 164;

    fn encode(&self, buf: &mut [u8]) {
        put_i32(buf, 0, self.size);
        put_array(buf, 4, &self.created);
        put_i32(buf, 14, self.signature);
        put_array(buf, Self::FIT_OFFSET, &self.fit);
        for (i, p) in self.partitions.iter().enumerate() {
            p.encode(&mut buf[20 + i * Partition::SIZE..20 + (i + 1) * Partition::SIZE]);
        }
    }

    fn decode(buf: &[u8]) -> Self {
        let mut partitions: [Partition; 4] = Default::default();
        for (i, p) in partitions.iter_mut().enumerate() {
            *p = Partition::decode(&buf[20 + i * Partition::SIZE..20 + (i + 1) * Partition::SIZE]);
        }
        Self {
            size: get_i32(buf, 0),
            created: get_array(buf, 4),
            signature: get_i32(buf, 14),
            fit: get_array(buf, Self::FIT_OFFSET),
            partitions,
        }
    }
}
