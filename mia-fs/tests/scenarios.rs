//! End-to-end scenarios over temp disks: mkdisk → fdisk → mount →
//! mkfs → file operations, plus the documented boundary behaviors.

use std::path::PathBuf;

use mia_fs::fs::mkfs::{mkfs, FsKind, USERS_SEED};
use mia_fs::fs::{content, file, journal, users};
use mia_fs::layout::{Mbr, Record};
use mia_fs::{
    fdisk_create, mkdisk, BlockFile, Error, Fit, Kernel, PartitionKind, Unit, Volume,
};

struct TempDisk(PathBuf);

impl TempDisk {
    fn new(tag: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "mia-scenario-{}-{tag}.mia",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        Self(path)
    }
}

impl Drop for TempDisk {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn part(path: &std::path::Path, name: &str, size_k: i64) {
    fdisk_create(
        size_k,
        path,
        name,
        PartitionKind::Primary,
        Fit::Worst,
        Unit::Kib,
    )
    .unwrap();
}

/// 5 MiB 磁盘 + 一个已格式化分区 + root 会话。
fn formatted(tag: &str, kind: FsKind) -> (TempDisk, Kernel, String) {
    let disk = TempDisk::new(tag);
    mkdisk(5, Fit::First, Unit::Mib, &disk.0).unwrap();
    part(&disk.0, "P1", 1024);
    let mut kernel = Kernel::new();
    let id = kernel.mount(&disk.0, "P1").unwrap();
    mkfs(&kernel, &id, true, kind).unwrap();
    users::login(&mut kernel, "root", "123", &id).unwrap();
    (disk, kernel, id)
}

fn host_file(tag: &str, data: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("mia-content-{}-{tag}", std::process::id()));
    std::fs::write(&path, data).unwrap();
    path
}

#[test]
fn mkdisk_writes_a_little_endian_mbr() {
    let disk = TempDisk::new("mkdisk");
    mkdisk(5, Fit::First, Unit::Mib, &disk.0).unwrap();

    let io = BlockFile::open(&disk.0).unwrap();
    assert_eq!(io.len().unwrap(), 5 * 1024 * 1024);

    let mut head = [0u8; Mbr::SIZE];
    io.read_at(&mut head, 0).unwrap();
    assert_eq!(&head[..4], &5_242_880i32.to_le_bytes());
    assert_eq!(&head[Mbr::FIT_OFFSET..Mbr::FIT_OFFSET + 2], b"ff");
}

#[test]
fn duplicate_partition_name_is_rejected() {
    let disk = TempDisk::new("dup-name");
    mkdisk(5, Fit::First, Unit::Mib, &disk.0).unwrap();
    part(&disk.0, "P1", 1024);
    part(&disk.0, "P2", 1024);

    let err = fdisk_create(
        1024,
        &disk.0,
        "P1",
        PartitionKind::Primary,
        Fit::Worst,
        Unit::Kib,
    )
    .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)));
}

#[test]
fn fifth_primary_partition_is_rejected() {
    let disk = TempDisk::new("five");
    mkdisk(5, Fit::First, Unit::Mib, &disk.0).unwrap();
    for name in ["A", "B", "C", "D"] {
        part(&disk.0, name, 64);
    }
    let err = fdisk_create(64, &disk.0, "E", PartitionKind::Primary, Fit::Worst, Unit::Kib)
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn mount_ids_follow_the_carnet_scheme() {
    let disk_a = TempDisk::new("ids-a");
    let disk_b = TempDisk::new("ids-b");
    for disk in [&disk_a, &disk_b] {
        mkdisk(5, Fit::First, Unit::Mib, &disk.0).unwrap();
        part(&disk.0, "P1", 512);
        part(&disk.0, "P2", 512);
    }

    let mut kernel = Kernel::new();
    assert_eq!(kernel.mount(&disk_a.0, "P1").unwrap(), "851A");
    assert_eq!(kernel.mount(&disk_a.0, "P2").unwrap(), "852A");
    assert_eq!(kernel.mount(&disk_b.0, "P1").unwrap(), "851B");
    assert_eq!(kernel.mounted().count(), 3);

    // 磁盘清空挂载后释放字母
    kernel.unmount("851A").unwrap();
    kernel.unmount("852A").unwrap();
    kernel.unmount("851B").unwrap();
    assert_eq!(kernel.mount(&disk_b.0, "P2").unwrap(), "851A");
}

#[test]
fn extended_partitions_cannot_be_mounted() {
    let disk = TempDisk::new("mount-ext");
    mkdisk(5, Fit::First, Unit::Mib, &disk.0).unwrap();
    fdisk_create(1024, &disk.0, "EXT", PartitionKind::Extended, Fit::Worst, Unit::Kib).unwrap();

    let mut kernel = Kernel::new();
    let err = kernel.mount(&disk.0, "EXT").unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn logical_partitions_mount_and_format() {
    let disk = TempDisk::new("logical");
    mkdisk(5, Fit::First, Unit::Mib, &disk.0).unwrap();
    fdisk_create(2048, &disk.0, "EXT", PartitionKind::Extended, Fit::Worst, Unit::Kib).unwrap();
    fdisk_create(512, &disk.0, "L1", PartitionKind::Logical, Fit::Worst, Unit::Kib).unwrap();
    fdisk_create(512, &disk.0, "L2", PartitionKind::Logical, Fit::Worst, Unit::Kib).unwrap();

    let mut kernel = Kernel::new();
    let id = kernel.mount(&disk.0, "L2").unwrap();
    mkfs(&kernel, &id, true, FsKind::Ext2).unwrap();
    users::login(&mut kernel, "root", "123", &id).unwrap();
    assert_eq!(file::cat(&kernel, &["/users.txt".into()]).unwrap(), USERS_SEED);
}

#[test]
fn fdisk_add_respects_neighbours() {
    let disk = TempDisk::new("resize");
    mkdisk(5, Fit::First, Unit::Mib, &disk.0).unwrap();
    part(&disk.0, "P1", 1024);
    part(&disk.0, "P2", 1024);

    // P1 紧挨着 P2，长不动
    let err = mia_fs::fdisk_add(&disk.0, "P1", 1024).unwrap_err();
    assert!(matches!(err, Error::Capacity(_)));
    // P2 后面是自由空间
    mia_fs::fdisk_add(&disk.0, "P2", 1024 * 1024).unwrap();
    // 收缩不得归零
    let err = mia_fs::fdisk_add(&disk.0, "P1", -(2 * 1024 * 1024)).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn deleting_a_middle_logical_keeps_the_chain() {
    let disk = TempDisk::new("unlink");
    mkdisk(5, Fit::First, Unit::Mib, &disk.0).unwrap();
    fdisk_create(3072, &disk.0, "EXT", PartitionKind::Extended, Fit::Worst, Unit::Kib).unwrap();
    for name in ["L1", "L2", "L3"] {
        fdisk_create(512, &disk.0, name, PartitionKind::Logical, Fit::Worst, Unit::Kib).unwrap();
    }

    mia_fs::fdisk_delete(&disk.0, "L2", mia_fs::DeleteMode::Fast).unwrap();

    // L1 与 L3 仍可挂载，L2 不复存在
    let mut kernel = Kernel::new();
    kernel.mount(&disk.0, "L1").unwrap();
    kernel.mount(&disk.0, "L3").unwrap();
    let err = kernel.mount(&disk.0, "L2").unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn deleting_the_extended_partition_drops_its_logicals() {
    let disk = TempDisk::new("drop-ext");
    mkdisk(5, Fit::First, Unit::Mib, &disk.0).unwrap();
    fdisk_create(2048, &disk.0, "EXT", PartitionKind::Extended, Fit::Worst, Unit::Kib).unwrap();
    fdisk_create(512, &disk.0, "L1", PartitionKind::Logical, Fit::Worst, Unit::Kib).unwrap();

    mia_fs::fdisk_delete(&disk.0, "EXT", mia_fs::DeleteMode::Full).unwrap();

    let io = BlockFile::open(&disk.0).unwrap();
    let mbr: Mbr = mia_fs::read_record(&io, 0).unwrap();
    assert!(mbr.partitions.iter().all(|p| p.is_empty()));
    // full 擦除把原EBR区清零了
    let mut head = [0u8; 30];
    io.read_at(&mut head, 164).unwrap();
    assert!(head.iter().all(|&b| b == 0));
}

#[test]
fn mkfs_seeds_root_and_users() {
    let (_disk, kernel, id) = formatted("seed", FsKind::Ext2);
    let vol = Volume::open(kernel.mount_entry(&id).unwrap()).unwrap();

    let users_inode = vol.read_inode(1).unwrap();
    let bytes = content::read(&vol, &users_inode).unwrap();
    assert_eq!(bytes, USERS_SEED.as_bytes());

    let root = vol.read_inode(0).unwrap();
    assert!(root.is_dir());
    let entries = mia_fs::fs::path::list_dir(&vol, 0).unwrap();
    assert_eq!(
        entries,
        vec![(".".to_string(), 0), ("..".to_string(), 0), ("users.txt".to_string(), 1)]
    );

    // 位图与空闲计数自洽
    let used = vol.inode_bitmap().unwrap().iter().filter(|&&b| b == 1).count() as i32;
    assert_eq!(used, vol.sb.inodes_count - vol.sb.free_inodes_count);
    assert_eq!(used, 2);
}

#[test]
fn mkfile_then_cat_round_trips() {
    let (_disk, kernel, _id) = formatted("cat", FsKind::Ext2);
    let host = host_file("abc", b"abc");

    file::mkfile(&kernel, "/f", false, 0, Some(host.as_path())).unwrap();
    assert_eq!(file::cat(&kernel, &["/f".into()]).unwrap(), "abc\n");

    file::mkfile(&kernel, "/digits", false, 10, None).unwrap();
    assert_eq!(file::cat(&kernel, &["/digits".into()]).unwrap(), "0123456789\n");

    // 同目录下名字唯一
    let err = file::mkfile(&kernel, "/f", false, 0, None).unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)));

    let _ = std::fs::remove_file(host);
}

#[test]
fn large_files_use_the_indirect_block() {
    let (_disk, kernel, id) = formatted("indirect", FsKind::Ext2);
    file::mkfile(&kernel, "/big", false, 1000, None).unwrap();

    let vol = Volume::open(kernel.mount_entry(&id).unwrap()).unwrap();
    let index = mia_fs::fs::path::resolve_any(&vol, "/big").unwrap();
    let inode = vol.read_inode(index).unwrap();
    assert!(inode.block[12] != -1);
    assert_eq!(content::read(&vol, &inode).unwrap(), content::digits(1000));
}

#[test]
fn files_past_the_block_cap_are_rejected() {
    let (_disk, kernel, _id) = formatted("cap", FsKind::Ext2);
    file::mkfile(&kernel, "/ok", false, 1792, None).unwrap();
    let err = file::mkfile(&kernel, "/too-big", false, 1793, None).unwrap_err();
    assert!(matches!(err, Error::Capacity(_)));
}

#[test]
fn a_13_byte_name_is_rejected() {
    let (_disk, kernel, _id) = formatted("long-name", FsKind::Ext2);
    let err = file::mkfile(&kernel, "/abcdefghijklm", false, 0, None).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn copy_duplicates_content() {
    let (_disk, kernel, _id) = formatted("copy", FsKind::Ext2);
    file::mkfile(&kernel, "/f", false, 100, None).unwrap();
    file::mkdir(&kernel, "/d", false).unwrap();

    let stats = file::copy(&kernel, "/f", "/d").unwrap();
    assert_eq!(stats.copied, 1);
    assert_eq!(stats.skipped, 0);
    assert_eq!(
        file::cat(&kernel, &["/d/f".into()]).unwrap(),
        file::cat(&kernel, &["/f".into()]).unwrap()
    );
}

#[test]
fn rename_back_restores_the_tree() {
    let (_disk, kernel, _id) = formatted("rename", FsKind::Ext2);
    file::mkdir(&kernel, "/d", false).unwrap();
    file::mkfile(&kernel, "/d/x", false, 20, None).unwrap();

    file::rename(&kernel, "/d/x", "y").unwrap();
    assert!(file::cat(&kernel, &["/d/x".into()]).is_err());
    file::rename(&kernel, "/d/y", "x").unwrap();
    assert_eq!(file::cat(&kernel, &["/d/x".into()]).unwrap(), content_text(20));
}

fn content_text(n: usize) -> String {
    let mut s = String::from_utf8(content::digits(n)).unwrap();
    s.push('\n');
    s
}

#[test]
fn edit_replaces_content_and_reuses_blocks() {
    let (_disk, kernel, id) = formatted("edit", FsKind::Ext2);
    file::mkfile(&kernel, "/notes", false, 900, None).unwrap();
    let free_after_create = Volume::open(kernel.mount_entry(&id).unwrap())
        .unwrap()
        .sb
        .free_blocks_count;

    let host = host_file("edit", b"rewritten");
    file::edit(&kernel, "/notes", &host).unwrap();

    assert_eq!(file::cat(&kernel, &["/notes".into()]).unwrap(), "rewritten\n");
    let vol = Volume::open(kernel.mount_entry(&id).unwrap()).unwrap();
    // 900字节占16块（15个数据块+1个索引块），9字节只占1块
    assert_eq!(vol.sb.free_blocks_count, free_after_create + 15);
    let _ = std::fs::remove_file(host);
}

#[test]
fn chown_and_chmod_follow_ownership_rules() {
    let (_disk, mut kernel, id) = formatted("chown", FsKind::Ext2);
    users::mkgrp(&kernel, "dev").unwrap();
    users::mkusr(&kernel, "alice", "pw", "dev").unwrap();
    file::mkfile(&kernel, "/shared", false, 4, None).unwrap();
    file::chown(&kernel, "/shared", false, "alice").unwrap();

    let vol = Volume::open(kernel.mount_entry(&id).unwrap()).unwrap();
    let index = mia_fs::fs::path::resolve_any(&vol, "/shared").unwrap();
    assert_eq!(vol.read_inode(index).unwrap().uid, 2);
    drop(vol);

    // 新属主可以改权限，改别人的东西不行
    users::logout(&mut kernel).unwrap();
    users::login(&mut kernel, "alice", "pw", &id).unwrap();
    file::chmod(&kernel, "/shared", "640", false).unwrap();
    let err = file::chmod(&kernel, "/users.txt", "777", false).unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));
    let err = file::chown(&kernel, "/users.txt", false, "alice").unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));
}

#[test]
fn removed_paths_disappear_from_find() {
    let (_disk, kernel, _id) = formatted("remove", FsKind::Ext2);
    file::mkfile(&kernel, "/p", false, 4, None).unwrap();
    assert!(file::find(&kernel, "/", "*").unwrap().contains(&"/p".to_string()));

    file::remove(&kernel, "/p").unwrap();
    assert!(!file::find(&kernel, "/", "*").unwrap().contains(&"/p".to_string()));
}

#[test]
fn remove_frees_what_it_allocated() {
    let (_disk, kernel, id) = formatted("free", FsKind::Ext2);
    let before = {
        let vol = Volume::open(kernel.mount_entry(&id).unwrap()).unwrap();
        (vol.sb.free_inodes_count, vol.sb.free_blocks_count)
    };

    file::mkdir(&kernel, "/d", false).unwrap();
    file::mkfile(&kernel, "/d/big", false, 1500, None).unwrap();
    file::remove(&kernel, "/d").unwrap();

    let vol = Volume::open(kernel.mount_entry(&id).unwrap()).unwrap();
    assert_eq!((vol.sb.free_inodes_count, vol.sb.free_blocks_count), before);
    let used = vol.block_bitmap().unwrap().iter().filter(|&&b| b == 1).count() as i32;
    assert_eq!(used, vol.sb.blocks_count - vol.sb.free_blocks_count);
}

#[test]
fn move_relinks_without_copying() {
    let (_disk, kernel, id) = formatted("move", FsKind::Ext2);
    file::mkdir(&kernel, "/a", false).unwrap();
    file::mkdir(&kernel, "/b", false).unwrap();
    file::mkfile(&kernel, "/a/f", false, 30, None).unwrap();

    let vol = Volume::open(kernel.mount_entry(&id).unwrap()).unwrap();
    let before = mia_fs::fs::path::resolve_any(&vol, "/a/f").unwrap();
    drop(vol);

    file::mv(&kernel, "/a/f", "/b").unwrap();

    let vol = Volume::open(kernel.mount_entry(&id).unwrap()).unwrap();
    assert_eq!(mia_fs::fs::path::resolve_any(&vol, "/b/f").unwrap(), before);
    assert!(mia_fs::fs::path::resolve_any(&vol, "/a/f").is_err());
}

#[test]
fn moving_a_directory_rewrites_dotdot() {
    let (_disk, kernel, id) = formatted("dotdot", FsKind::Ext2);
    file::mkdir(&kernel, "/a", false).unwrap();
    file::mkdir(&kernel, "/b", false).unwrap();
    file::mkdir(&kernel, "/a/sub", false).unwrap();

    file::mv(&kernel, "/a/sub", "/b").unwrap();

    let vol = Volume::open(kernel.mount_entry(&id).unwrap()).unwrap();
    let b = mia_fs::fs::path::resolve_any(&vol, "/b").unwrap();
    let sub = mia_fs::fs::path::resolve_any(&vol, "/b/sub").unwrap();
    let dotdot = mia_fs::fs::path::find_in_dir(&vol, sub, "..", false)
        .unwrap()
        .unwrap();
    assert_eq!(dotdot, b);
}

#[test]
fn non_root_users_get_664_and_cannot_manage_groups() {
    let (_disk, mut kernel, id) = formatted("authz", FsKind::Ext2);
    users::mkgrp(&kernel, "dev").unwrap();
    users::mkusr(&kernel, "alice", "pw", "dev").unwrap();
    users::logout(&mut kernel).unwrap();
    users::login(&mut kernel, "alice", "pw", &id).unwrap();

    let err = users::mkgrp(&kernel, "x").unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));

    file::mkfile(&kernel, "/af", false, 4, None).unwrap();
    let vol = Volume::open(kernel.mount_entry(&id).unwrap()).unwrap();
    let index = mia_fs::fs::path::resolve_any(&vol, "/af").unwrap();
    assert_eq!(vol.read_inode(index).unwrap().perm_text(), "664");
}

#[test]
fn permission_checks_gate_reads_and_removals() {
    let (_disk, mut kernel, id) = formatted("perm", FsKind::Ext2);
    users::mkgrp(&kernel, "dev").unwrap();
    users::mkusr(&kernel, "alice", "pw", "dev").unwrap();
    file::mkdir(&kernel, "/d", false).unwrap();
    file::mkfile(&kernel, "/d/secret", false, 8, None).unwrap();
    file::chmod(&kernel, "/d/secret", "600", false).unwrap();
    // 其他人可写目录，但 secret 仍拦着整树删除
    file::chmod(&kernel, "/d", "777", false).unwrap();
    users::logout(&mut kernel).unwrap();
    users::login(&mut kernel, "alice", "pw", &id).unwrap();

    let err = file::cat(&kernel, &["/d/secret".into()]).unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));

    let err = file::remove(&kernel, "/d").unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));
    // 预检挡下后整棵树原样健在
    users::logout(&mut kernel).unwrap();
    users::login(&mut kernel, "root", "123", &id).unwrap();
    assert_eq!(file::cat(&kernel, &["/d/secret".into()]).unwrap(), content_text(8));
}

#[test]
fn rmgrp_root_is_refused() {
    let (_disk, kernel, _id) = formatted("rmgrp", FsKind::Ext2);
    assert!(users::rmgrp(&kernel, "root").is_err());
    assert!(users::rmusr(&kernel, "root").is_err());
}

#[test]
fn tombstoned_groups_stay_in_the_file() {
    let (_disk, kernel, id) = formatted("tombstone", FsKind::Ext2);
    users::mkgrp(&kernel, "dev").unwrap();
    users::rmgrp(&kernel, "dev").unwrap();

    let out = file::cat(&kernel, &["/users.txt".into()]).unwrap();
    assert!(out.contains("0,G,dev"));

    // 墓碑组不可再挂用户
    let err = users::mkusr(&kernel, "bob", "pw", "dev").unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    let _ = id;
}

#[test]
fn loss_on_ext2_is_a_filesystem_mismatch() {
    let (_disk, kernel, id) = formatted("loss2fs", FsKind::Ext2);
    let err = journal::loss(&kernel, &id).unwrap_err();
    assert!(matches!(err, Error::FilesystemMismatch(_)));
}

#[test]
fn ext3_journals_mutations_in_order() {
    let (_disk, kernel, id) = formatted("journal", FsKind::Ext3);
    file::mkdir(&kernel, "/d", false).unwrap();
    file::mkfile(&kernel, "/d/f", false, 10, None).unwrap();

    let vol = Volume::open(kernel.mount_entry(&id).unwrap()).unwrap();
    let ops: Vec<String> = journal::entries(&vol)
        .unwrap()
        .iter()
        .map(|e| e.operation())
        .collect();
    assert_eq!(ops, ["mkfs", "mkdir", "mkfile"]);
}

#[test]
fn loss_then_recovery_restores_the_baseline() {
    let (_disk, kernel, id) = formatted("recovery", FsKind::Ext3);
    file::mkdir(&kernel, "/d", false).unwrap();
    file::mkfile(&kernel, "/d/f", false, 10, None).unwrap();

    journal::loss(&kernel, &id).unwrap();
    journal::recovery(&kernel, &id).unwrap();

    // 基线一致：根目录与 users.txt 可读，计数自洽
    assert_eq!(file::cat(&kernel, &["/users.txt".into()]).unwrap(), USERS_SEED);
    let vol = Volume::open(kernel.mount_entry(&id).unwrap()).unwrap();
    assert_eq!(vol.sb.free_inodes_count, vol.sb.inodes_count - 2);
    let ops: Vec<String> = journal::entries(&vol)
        .unwrap()
        .iter()
        .map(|e| e.operation())
        .collect();
    assert_eq!(ops, ["mkfs", "mkdir", "mkfile", "loss"]);
}

#[test]
fn directories_grow_block_by_block() {
    let (_disk, kernel, id) = formatted("grow", FsKind::Ext2);
    // 根块0有 `.`/`..`/users.txt，再放13个文件要逼出新目录块
    for i in 0..13 {
        file::mkfile(&kernel, &format!("/f{i}"), false, 0, None).unwrap();
    }
    let vol = Volume::open(kernel.mount_entry(&id).unwrap()).unwrap();
    let root = vol.read_inode(0).unwrap();
    assert!(root.block[1] != -1);
    for i in 0..13 {
        assert!(mia_fs::fs::path::resolve_any(&vol, &format!("/f{i}")).is_ok());
    }
}
