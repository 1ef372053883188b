//! Read-only report generators: Graphviz DOT for the structural
//! views, plain text for content dumps. A report never mutates
//! the disk; failures leave the filesystem untouched.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use mia_fs::fs::{content, journal, path as fspath};
use mia_fs::layout::{Ebr, Mbr, Record};
use mia_fs::{read_record, BlockFile, Error, Kernel, Result, Volume};
use typed_bytesize::ByteSizeIec;

pub fn generate(
    kernel: &Kernel,
    report: &str,
    out: &Path,
    id: &str,
    ls_path: Option<&str>,
) -> Result<String> {
    let mount = kernel.mount_entry(id)?.clone();
    let text = match report {
        "mbr" => mbr_report(&mount.path)?,
        "disk" => disk_report(&mount.path)?,
        "sb" => sb_report(&Volume::open(&mount)?),
        "tree" => tree_report(&Volume::open(&mount)?)?,
        "ls" => ls_report(&Volume::open(&mount)?, ls_path.unwrap_or("/"))?,
        "file" => {
            let file = ls_path.ok_or_else(|| {
                Error::Validation("-path_file_ls is required for the file report".into())
            })?;
            file_report(&Volume::open(&mount)?, file)?
        }
        "bm_inode" => bitmap_report(&Volume::open(&mount)?.inode_bitmap()?),
        "bm_block" => bitmap_report(&Volume::open(&mount)?.block_bitmap()?),
        "journaling" => journaling_report(&Volume::open(&mount)?)?,
        other => {
            return Err(Error::Validation(format!("unknown report '{other}'")));
        }
    };

    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(out, &text)?;
    Ok(format!("report '{report}' written to {}", out.display()))
}

fn mbr_report(disk: &Path) -> Result<String> {
    let io = BlockFile::open(disk)?;
    let mbr: Mbr = read_record(&io, 0)?;

    let mut dot = String::from("digraph mbr {\n  node [shape=plaintext];\n");
    let mut table = String::from(
        "  mbr [label=<<table border=\"0\" cellborder=\"1\" cellspacing=\"0\">\n",
    );
    let _ = writeln!(table, "    <tr><td colspan=\"2\"><b>MBR</b></td></tr>");
    let _ = writeln!(table, "    <tr><td>size</td><td>{}</td></tr>", mbr.size);
    let _ = writeln!(
        table,
        "    <tr><td>created</td><td>{}</td></tr>",
        mbr.created()
    );
    let _ = writeln!(
        table,
        "    <tr><td>signature</td><td>{}</td></tr>",
        mbr.signature
    );
    for (i, part) in mbr.partitions.iter().enumerate() {
        if part.is_empty() {
            let _ = writeln!(
                table,
                "    <tr><td colspan=\"2\">slot {i}: empty</td></tr>"
            );
            continue;
        }
        let _ = writeln!(
            table,
            "    <tr><td>slot {i}</td><td>{} type={} start={} size={}</td></tr>",
            part.name(),
            part.kind as char,
            part.start,
            part.size
        );
    }
    table.push_str("  </table>>];\n");
    dot.push_str(&table);

    // EBR chain, if an extended partition exists
    if let Some(ext) = mbr.extended() {
        let ext = &mbr.partitions[ext];
        let mut pos = ext.start as i64;
        let mut index = 0;
        loop {
            let ebr: Ebr = read_record(&io, pos as u64)?;
            if !ebr.is_empty() {
                let _ = writeln!(
                    dot,
                    "  ebr{index} [label=\"EBR {} start={} size={}\"];",
                    ebr.name(),
                    ebr.start,
                    ebr.size
                );
                if index > 0 {
                    let _ = writeln!(dot, "  ebr{} -> ebr{index};", index - 1);
                }
                index += 1;
            }
            if ebr.next == -1 {
                break;
            }
            pos = ebr.next as i64;
        }
    }
    dot.push_str("}\n");
    Ok(dot)
}

fn disk_report(disk: &Path) -> Result<String> {
    let io = BlockFile::open(disk)?;
    let mbr: Mbr = read_record(&io, 0)?;

    let mut used = Mbr::SIZE as i64;
    let mut dot = String::from("digraph disk {\n  node [shape=record];\n  layout [label=\"MBR");
    for part in mbr.partitions.iter().filter(|p| !p.is_empty()) {
        let _ = write!(
            dot,
            "|{} ({}, {})",
            part.name(),
            part.kind as char,
            ByteSizeIec(part.size as u64)
        );
        used += part.size as i64;
    }
    let free = mbr.size as i64 - used;
    if free > 0 {
        let _ = write!(dot, "|free ({})", ByteSizeIec(free as u64));
    }
    dot.push_str("\"];\n}\n");
    Ok(dot)
}

fn sb_report(vol: &Volume) -> String {
    let sb = &vol.sb;
    let rows = [
        ("filesystem_type", sb.filesystem_type),
        ("inodes_count", sb.inodes_count),
        ("blocks_count", sb.blocks_count),
        ("free_inodes_count", sb.free_inodes_count),
        ("free_blocks_count", sb.free_blocks_count),
        ("mnt_count", sb.mnt_count),
        ("magic", sb.magic),
        ("inode_size", sb.inode_size),
        ("block_size", sb.block_size),
        ("first_ino", sb.first_ino),
        ("first_blo", sb.first_blo),
        ("bm_inode_start", sb.bm_inode_start),
        ("bm_block_start", sb.bm_block_start),
        ("inode_start", sb.inode_start),
        ("block_start", sb.block_start),
    ];
    let mut dot = String::from(
        "digraph sb {\n  node [shape=plaintext];\n  sb [label=<<table border=\"0\" \
         cellborder=\"1\" cellspacing=\"0\">\n    <tr><td colspan=\"2\"><b>SuperBlock</b></td></tr>\n",
    );
    for (name, value) in rows {
        let _ = writeln!(dot, "    <tr><td>{name}</td><td>{value}</td></tr>");
    }
    dot.push_str("  </table>>];\n}\n");
    dot
}

fn tree_report(vol: &Volume) -> Result<String> {
    let mut dot = String::from("digraph tree {\n  node [shape=box];\n");
    let mut stack = vec![(fspath::ROOT_INODE, String::from("/"))];
    while let Some((inode_index, label)) = stack.pop() {
        let inode = vol.read_inode(inode_index)?;
        let shape = if inode.is_dir() { "folder" } else { "note" };
        let _ = writeln!(
            dot,
            "  i{inode_index} [shape={shape} label=\"{label}\\ninode {inode_index} perm {}\"];",
            inode.perm_text()
        );
        if !inode.is_dir() {
            continue;
        }
        for (name, child) in fspath::list_dir(vol, inode_index)? {
            if name == "." || name == ".." {
                continue;
            }
            let _ = writeln!(dot, "  i{inode_index} -> i{child};");
            stack.push((child, name));
        }
    }
    dot.push_str("}\n");
    Ok(dot)
}

fn ls_report(vol: &Volume, dir_path: &str) -> Result<String> {
    let dir = fspath::resolve_dir(vol, dir_path)?;
    let mut dot = String::from(
        "digraph ls {\n  node [shape=plaintext];\n  ls [label=<<table border=\"0\" \
         cellborder=\"1\" cellspacing=\"0\">\n    <tr><td>perm</td><td>uid</td><td>gid</td>\
         <td>size</td><td>mtime</td><td>type</td><td>name</td></tr>\n",
    );
    for (name, child) in fspath::list_dir(vol, dir)? {
        let inode = vol.read_inode(child)?;
        let kind = if inode.is_dir() { "dir" } else { "file" };
        let _ = writeln!(
            dot,
            "    <tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{kind}</td><td>{name}</td></tr>",
            inode.perm_text(),
            inode.uid,
            inode.gid,
            inode.size,
            inode.mtime_text()
        );
    }
    dot.push_str("  </table>>];\n}\n");
    Ok(dot)
}

fn file_report(vol: &Volume, file_path: &str) -> Result<String> {
    let index = fspath::resolve_any(vol, file_path)?;
    let inode = vol.read_inode(index)?;
    if inode.is_dir() {
        return Err(Error::Validation(format!("'{file_path}' is a directory")));
    }
    let bytes = content::read(vol, &inode)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn bitmap_report(bitmap: &[u8]) -> String {
    let mut out = String::with_capacity(bitmap.len() + bitmap.len() / 20 + 1);
    for (i, byte) in bitmap.iter().enumerate() {
        out.push(if *byte == 0 { '0' } else { '1' });
        if (i + 1) % 20 == 0 {
            out.push('\n');
        }
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn journaling_report(vol: &Volume) -> Result<String> {
    let entries = journal::entries(vol)?;
    let mut out = String::from("#    operation  path                             content\n");
    for (i, entry) in entries.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:<4} {:<10} {:<32} {}",
            i + 1,
            entry.operation(),
            entry.path(),
            entry.content_text()
        );
    }
    Ok(out)
}
