//! # 文件内容的块铺排
//!
//! 12个直接块，外加一个一级索引块（16项），合计28块、1792字节封顶。
//! 13/14号槽（二级/三级索引）不启用，超限一律按容量错误拒绝。

use crate::layout::{FileBlock, Inode, PointerBlock};
use crate::{Error, Result, Volume, BLOCK_SIZE, DIRECT_COUNT, INDIRECT_COUNT, MAX_CONTENT};

/// 读出整个文件内容。
pub fn read(vol: &Volume, inode: &Inode) -> Result<Vec<u8>> {
    let size = inode.size as usize;
    if size == 0 {
        return Ok(Vec::new());
    }
    let mut out = Vec::with_capacity(size);
    for block in data_blocks(vol, inode)? {
        let data = vol.read_file_block(block)?;
        let take = (size - out.len()).min(BLOCK_SIZE);
        out.extend_from_slice(&data.content[..take]);
        if out.len() == size {
            break;
        }
    }
    Ok(out)
}

/// 按序收集数据块号（不含索引块本身）。
pub fn data_blocks(vol: &Volume, inode: &Inode) -> Result<Vec<i32>> {
    let wanted = (inode.size as usize).div_ceil(BLOCK_SIZE);
    let mut out = Vec::with_capacity(wanted);
    for i in 0..DIRECT_COUNT.min(wanted) {
        let block = inode.block[i];
        if block == -1 {
            break;
        }
        out.push(block);
    }
    if wanted > DIRECT_COUNT && inode.block[DIRECT_COUNT] != -1 {
        let pointers = vol.read_pointer_block(inode.block[DIRECT_COUNT])?;
        for j in 0..(wanted - DIRECT_COUNT).min(INDIRECT_COUNT) {
            let block = pointers.pointers[j];
            if block == -1 {
                break;
            }
            out.push(block);
        }
    }
    Ok(out)
}

/// 释放全部数据块与索引块并清空块表。大小由调用方管理。
pub fn free(vol: &mut Volume, inode: &mut Inode) -> Result<()> {
    for i in 0..DIRECT_COUNT {
        if inode.block[i] != -1 {
            vol.free_block(inode.block[i])?;
        }
    }
    if inode.block[DIRECT_COUNT] != -1 {
        let pointers = vol.read_pointer_block(inode.block[DIRECT_COUNT])?;
        for p in pointers.pointers {
            if p != -1 {
                vol.free_block(p)?;
            }
        }
        vol.free_block(inode.block[DIRECT_COUNT])?;
    }
    inode.block = [-1; 15];
    Ok(())
}

/// 写入全新内容并更新大小；调用前块表须已清空。
pub fn write(vol: &mut Volume, inode: &mut Inode, data: &[u8]) -> Result<()> {
    if data.len() > MAX_CONTENT {
        return Err(Error::Capacity(format!(
            "content of {} bytes exceeds the {MAX_CONTENT}-byte limit \
             (12 direct + 16 indirect blocks of {BLOCK_SIZE} bytes)",
            data.len()
        )));
    }
    let wanted = data.len().div_ceil(BLOCK_SIZE);
    let mut required = wanted as i32;
    if wanted > DIRECT_COUNT {
        required += 1; // 索引块本身
    }
    if vol.sb.free_blocks_count < required {
        return Err(Error::Capacity(format!(
            "not enough free blocks: need {required}, have {}",
            vol.sb.free_blocks_count
        )));
    }

    let mut blocks = Vec::with_capacity(wanted);
    for _ in 0..wanted {
        blocks.push(vol.alloc_block()?);
    }

    for (i, &block) in blocks.iter().enumerate() {
        let lo = i * BLOCK_SIZE;
        let hi = (lo + BLOCK_SIZE).min(data.len());
        vol.write_file_block(block, &FileBlock::from_bytes(&data[lo..hi]))?;
        if i < DIRECT_COUNT {
            inode.block[i] = block;
        }
    }

    if wanted > DIRECT_COUNT {
        let pointer_block = vol.alloc_block()?;
        let mut pointers = PointerBlock::empty();
        for (j, &block) in blocks[DIRECT_COUNT..].iter().enumerate() {
            pointers.pointers[j] = block;
        }
        vol.write_pointer_block(pointer_block, &pointers)?;
        inode.block[DIRECT_COUNT] = pointer_block;
    }

    inode.size = data.len() as i32;
    Ok(())
}

/// `'0'..'9'` 循环填充的生成内容，`mkfile -size` 用。
pub fn digits(size: usize) -> Vec<u8> {
    (0..size).map(|i| b'0' + (i % 10) as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_cycle() {
        assert_eq!(digits(12), b"012345678901".to_vec());
        assert!(digits(0).is_empty());
    }
}
