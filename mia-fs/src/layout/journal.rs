use crate::layout::{fixed, get_array, get_f32, get_i32, put_array, put_f32, put_i32, text, Record};

/// EXT3 日志槽：操作名、路径与内容预览都按字段宽度截断。
#[derive(Debug, Clone)]
pub struct JournalEntry {
    /// 槽号+1；0 表示从未写入
    pub count: i32,
    pub operation: [u8; 10],
    pub path: [u8; 32],
    pub content: [u8; 64],
    /// unix 秒
    pub date: f32,
}

impl JournalEntry {
    pub fn new(count: i32, operation: &str, path: &str, content: &str, date: f32) -> Self {
        Self {
            count,
            operation: fixed(operation),
            path: fixed(path),
            content: fixed(content),
            date,
        }
    }

    /// mkfs 初始化日志区用的空槽。
    pub fn blank() -> Self {
        Self {
            count: 0,
            operation: [0; 10],
            path: [0; 32],
            content: [0; 64],
            date: 0.0,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.operation[0] == 0
    }

    pub fn operation(&self) -> String {
        text(&self.operation)
    }

    pub fn path(&self) -> String {
        text(&self.path)
    }

    pub fn content_text(&self) -> String {
        text(&self.content)
    }
}

impl Record for JournalEntry {
    const SIZE: usize = 114;

    fn encode(&self, buf: &mut [u8]) {
        put_i32(buf, 0, self.count);
        put_array(buf, 4, &self.operation);
        put_array(buf, 14, &self.path);
        put_array(buf, 46, &self.content);
        put_f32(buf, 110, self.date);
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            count: get_i32(buf, 0),
            operation: get_array(buf, 4),
            path: get_array(buf, 14),
            content: get_array(buf, 46),
            date: get_f32(buf, 110),
        }
    }
}
