use mia_fs::layout::{
    Ebr, FileBlock, FolderBlock, Inode, JournalEntry, Mbr, Partition, PointerBlock, Record,
    SuperBlock,
};

#[test]
fn records() {
    assert_eq!(36, Partition::SIZE);
    assert_eq!(164, Mbr::SIZE);
    assert_eq!(30, Ebr::SIZE);
    assert_eq!(94, SuperBlock::SIZE);
    assert_eq!(127, Inode::SIZE);
    assert_eq!(64, FileBlock::SIZE);
    assert_eq!(64, FolderBlock::SIZE);
    assert_eq!(64, PointerBlock::SIZE);
    assert_eq!(114, JournalEntry::SIZE);
}

#[test]
fn mbr_wire_layout() {
    let mbr = Mbr::new(5 * 1024 * 1024, *b"ff", "2025-08-04", 7);
    let mut buf = [0u8; Mbr::SIZE];
    mbr.encode(&mut buf);

    assert_eq!(&buf[..4], &5242880i32.to_le_bytes());
    assert_eq!(&buf[4..14], b"2025-08-04");
    assert_eq!(&buf[Mbr::FIT_OFFSET..Mbr::FIT_OFFSET + 2], b"ff");

    let back = Mbr::decode(&buf);
    assert_eq!(back.size, mbr.size);
    assert_eq!(back.created(), "2025-08-04");
    assert!(back.partitions.iter().all(|p| p.is_empty()));
}

#[test]
fn inode_block_table_round_trip() {
    let mut inode = Inode::blank();
    inode.block[0] = 7;
    inode.block[12] = 42;

    let mut buf = [0u8; Inode::SIZE];
    inode.encode(&mut buf);
    let back = Inode::decode(&buf);

    assert_eq!(back.block[0], 7);
    assert_eq!(back.block[11], -1);
    assert_eq!(back.block[12], 42);
    assert_eq!(back.block[14], -1);
}

#[test]
fn pointer_block_is_raw_le_i32() {
    let mut pointers = PointerBlock::empty();
    pointers.pointers[0] = 19;

    let mut buf = [0u8; PointerBlock::SIZE];
    pointers.encode(&mut buf);
    assert_eq!(&buf[..4], &19i32.to_le_bytes());
    assert_eq!(&buf[4..8], &(-1i32).to_le_bytes());

    // FileBlock 字节与 PointerBlock 解码互通
    let as_data = FileBlock::decode(&buf);
    let again = PointerBlock::decode(&as_data.content);
    assert_eq!(again.pointers[0], 19);
    assert_eq!(again.pointers[1], -1);
}

#[test]
fn journal_entry_truncates_fields() {
    let entry = JournalEntry::new(
        1,
        "mkfile-with-a-long-name",
        "/a/very/long/path/that/overflows/the/field",
        "x",
        0.0,
    );
    assert_eq!(entry.operation(), "mkfile-wit");
    assert_eq!(entry.path().len(), 32);
}
