//! # 块设备接口层
//!
//! 后备设备是一个普通的宿主文件；[`BlockFile`] 在绝对字节偏移处
//! 读写定长记录。每条命令打开一次文件，返回前尽力同步。

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::layout::Record;
use crate::{Error, Result};

pub struct BlockFile(Mutex<File>);

impl BlockFile {
    /// 以读写方式打开已存在的磁盘文件。
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "disk file {} does not exist",
                path.display()
            )));
        }
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self(Mutex::new(file)))
    }

    /// 创建磁盘文件并零填充到指定长度；父目录缺失时一并创建。
    pub fn create(path: &Path, len: u64) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let io = Self(Mutex::new(file));
        io.zero_range(0, len)?;
        Ok(io)
    }

    pub fn len(&self) -> Result<u64> {
        Ok(self.0.lock().unwrap().metadata()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        let mut file = self.0.lock().unwrap();
        check_bounds(&file, offset, buf.len())?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    pub fn write_at(&self, buf: &[u8], offset: u64) -> Result<()> {
        let mut file = self.0.lock().unwrap();
        check_bounds(&file, offset, buf.len())?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        Ok(())
    }

    /// 以 1 KiB 为步长写零。
    /// mkdisk 的填充、`fdisk -delete=full` 与 `loss` 的擦除都走这里。
    pub fn zero_range(&self, offset: u64, len: u64) -> Result<()> {
        const CHUNK: usize = 1024;
        let zeros = [0u8; CHUNK];

        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        let mut left = len;
        while left > 0 {
            let n = left.min(CHUNK as u64) as usize;
            file.write_all(&zeros[..n])?;
            left -= n as u64;
        }
        Ok(())
    }

    /// 尽力而为的落盘同步。
    pub fn sync(&self) -> Result<()> {
        self.0.lock().unwrap().sync_all()?;
        Ok(())
    }
}

// 越过文件末尾的读写按命令级致命错误处理
fn check_bounds(file: &File, offset: u64, len: usize) -> Result<()> {
    let end = offset
        .checked_add(len as u64)
        .ok_or_else(|| Error::Io(io::Error::other("offset overflow")))?;
    if end > file.metadata()?.len() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("access past end of device: offset {offset}, len {len}"),
        )));
    }
    Ok(())
}

/// 在绝对偏移处读出一条定长记录。
pub fn read_record<T: Record>(io: &BlockFile, offset: u64) -> Result<T> {
    let mut buf = vec![0u8; T::SIZE];
    io.read_at(&mut buf, offset)?;
    Ok(T::decode(&buf))
}

/// 把一条定长记录写到绝对偏移处。
pub fn write_record<T: Record>(io: &BlockFile, record: &T, offset: u64) -> Result<()> {
    let mut buf = vec![0u8; T::SIZE];
    record.encode(&mut buf);
    io.write_at(&buf, offset)
}
