//! End-to-end tests driving the public API only (SPEC_FULL.md "Test
//! tooling"): a hand-assembled ext4 image mounted through
//! [`ext4ro::Partition::mount`], then walked with `open`/`read`/`read_dir`,
//! mirroring spec.md §8's scenarios and invariants.

use std::fs::File;
use std::io::{Read as _, Seek, SeekFrom, Write as _};
use std::sync::Mutex;

use ext4ro::{DiskReader, Ext4Error, Partition, SimpleCalendar, SimpleCollation};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const EXT4_SUPER_MAGIC: u16 = 0xEF53;
const EXT4_EXTENT_MAGIC: u16 = 0xF30A;
const EXT4_EXTENTS_FL: u32 = 0x0008_0000;
const EXT4_VALID_FS: u16 = 0x0001;
const EXT4_FEATURE_RO_COMPAT_METADATA_CSUM: u32 = 0x0400;
const EXT4_ROOT_INO: u32 = 2;
const S_IFDIR: u16 = 0x4000;
const S_IFREG: u16 = 0x8000;

const BLOCK_SIZE: u32 = 1024;
const BLOCKS_PER_GROUP: u32 = 8 * BLOCK_SIZE;
const INODES_PER_GROUP: u32 = 128;
const INODE_SIZE: u16 = 128;
const INODE_TABLE_BLOCK: u64 = 20;
const ROOT_DIR_BLOCK: u64 = 36;
const HELLO_DATA_BLOCK: u64 = 37;
const SUB_DIR_BLOCK: u64 = 38;
const HELLO_INODE: u32 = 12;
const SUB_INODE: u32 = 13;
const SYMLINK_INODE: u32 = 14;
const S_IFLNK: u16 = 0xA000;

struct MemDisk(Mutex<Vec<u8>>);

impl DiskReader for MemDisk {
    fn read(&self, offset: u64, length: usize) -> ext4ro::Result<Vec<u8>> {
        let image = self.0.lock().unwrap();
        let start = offset as usize;
        let end = start + length;
        if end > image.len() {
            return Err(Ext4Error::DeviceError(format!(
                "read past end of device: {end} > {}",
                image.len()
            )));
        }
        Ok(image[start..end].to_vec())
    }
}

fn write_block(image: &mut [u8], block: u64, data: &[u8]) {
    let start = block as usize * BLOCK_SIZE as usize;
    image[start..start + data.len()].copy_from_slice(data);
}

fn dirent(inode: u32, name: &str, rec_len: u16) -> Vec<u8> {
    let mut rec = vec![0u8; rec_len as usize];
    rec[0..4].copy_from_slice(&inode.to_le_bytes());
    rec[4..6].copy_from_slice(&rec_len.to_le_bytes());
    rec[6] = name.len() as u8;
    rec[7] = 1; // EXT4_FT_REG_FILE, unused by the reader
    rec[8..8 + name.len()].copy_from_slice(name.as_bytes());
    rec
}

fn write_inode(buf: &mut [u8], mode: u16, links: u16, size: u32, block: u64) {
    buf[0x00..0x02].copy_from_slice(&mode.to_le_bytes());
    buf[0x04..0x08].copy_from_slice(&size.to_le_bytes());
    buf[0x1A..0x1C].copy_from_slice(&links.to_le_bytes());
    buf[0x20..0x24].copy_from_slice(&EXT4_EXTENTS_FL.to_le_bytes());
    let i_block = &mut buf[0x28..0x28 + 60];
    i_block[0..2].copy_from_slice(&EXT4_EXTENT_MAGIC.to_le_bytes());
    i_block[2..4].copy_from_slice(&1u16.to_le_bytes()); // eh_entries
    i_block[4..6].copy_from_slice(&4u16.to_le_bytes()); // eh_max
    i_block[8..12].copy_from_slice(&0u32.to_le_bytes());
    i_block[12..16].copy_from_slice(&0u32.to_le_bytes()); // ee_block
    i_block[16..18].copy_from_slice(&1u16.to_le_bytes()); // ee_len
    i_block[18..20].copy_from_slice(&0u16.to_le_bytes()); // ee_start_hi
    i_block[20..24].copy_from_slice(&(block as u32).to_le_bytes()); // ee_start_lo
}

/// Builds the minimal single-group, 1 KiB-block image spec.md §8 Scenario A
/// describes: root -> "hello.txt" (inode 12) and "sub" (inode 13, empty
/// beyond "."/".."), no checksums.
fn build_image() -> Vec<u8> {
    let number_blocks = BLOCKS_PER_GROUP as u64;
    let mut image = vec![0u8; number_blocks as usize * BLOCK_SIZE as usize];

    let mut root_block = vec![0u8; BLOCK_SIZE as usize];
    let mut off = 0usize;
    for rec in [
        dirent(EXT4_ROOT_INO, ".", 12),
        dirent(EXT4_ROOT_INO, "..", 12),
        dirent(HELLO_INODE, "hello.txt", 20),
        dirent(SUB_INODE, "sub", BLOCK_SIZE as u16 - 44),
    ] {
        root_block[off..off + rec.len()].copy_from_slice(&rec);
        off += rec.len();
    }
    write_block(&mut image, ROOT_DIR_BLOCK, &root_block);

    let hello_content = b"Hello, world!\n";
    write_block(&mut image, HELLO_DATA_BLOCK, hello_content);

    // "sub" also holds a symlink, used only to exercise the "non-openable
    // intermediate segment" rejection (spec.md §7's AccessDenied case).
    let mut sub_block = vec![0u8; BLOCK_SIZE as usize];
    off = 0;
    for rec in [
        dirent(SUB_INODE, ".", 12),
        dirent(EXT4_ROOT_INO, "..", 12),
        dirent(SYMLINK_INODE, "link", BLOCK_SIZE as u16 - 24),
    ] {
        sub_block[off..off + rec.len()].copy_from_slice(&rec);
        off += rec.len();
    }
    write_block(&mut image, SUB_DIR_BLOCK, &sub_block);

    let inode_table_start = INODE_TABLE_BLOCK as usize * BLOCK_SIZE as usize;
    let inode_at = |n: u32| inode_table_start + (n as usize - 1) * INODE_SIZE as usize;

    let mut root_inode = vec![0u8; INODE_SIZE as usize];
    write_inode(&mut root_inode, S_IFDIR | 0o755, 3, BLOCK_SIZE, ROOT_DIR_BLOCK);
    image[inode_at(EXT4_ROOT_INO)..inode_at(EXT4_ROOT_INO) + INODE_SIZE as usize].copy_from_slice(&root_inode);

    let mut hello = vec![0u8; INODE_SIZE as usize];
    write_inode(&mut hello, S_IFREG | 0o644, 1, hello_content.len() as u32, HELLO_DATA_BLOCK);
    image[inode_at(HELLO_INODE)..inode_at(HELLO_INODE) + INODE_SIZE as usize].copy_from_slice(&hello);

    let mut sub = vec![0u8; INODE_SIZE as usize];
    write_inode(&mut sub, S_IFDIR | 0o755, 2, BLOCK_SIZE, SUB_DIR_BLOCK);
    image[inode_at(SUB_INODE)..inode_at(SUB_INODE) + INODE_SIZE as usize].copy_from_slice(&sub);

    // A symlink, never traversed, only used to exercise the "non-openable
    // intermediate segment" rejection (it has no data block of its own).
    let mut link = vec![0u8; INODE_SIZE as usize];
    write_inode(&mut link, S_IFLNK | 0o777, 1, 0, 0);
    image[inode_at(SYMLINK_INODE)..inode_at(SYMLINK_INODE) + INODE_SIZE as usize].copy_from_slice(&link);

    let mut desc = [0u8; 32];
    desc[8..12].copy_from_slice(&(INODE_TABLE_BLOCK as u32).to_le_bytes());
    write_block(&mut image, 2, &desc);

    let mut sb = vec![0u8; 1024];
    sb[0x00..0x04].copy_from_slice(&INODES_PER_GROUP.to_le_bytes());
    sb[0x04..0x08].copy_from_slice(&(number_blocks as u32).to_le_bytes());
    sb[0x0C..0x10].copy_from_slice(&(number_blocks as u32 - 40).to_le_bytes());
    sb[0x10..0x14].copy_from_slice(&(INODES_PER_GROUP - 4).to_le_bytes());
    sb[0x14..0x18].copy_from_slice(&1u32.to_le_bytes()); // s_first_data_block
    sb[0x18..0x1C].copy_from_slice(&0u32.to_le_bytes()); // s_log_block_size -> 1024
    sb[0x20..0x24].copy_from_slice(&BLOCKS_PER_GROUP.to_le_bytes());
    sb[0x28..0x2C].copy_from_slice(&INODES_PER_GROUP.to_le_bytes());
    sb[0x38..0x3A].copy_from_slice(&EXT4_SUPER_MAGIC.to_le_bytes());
    sb[0x3A..0x3C].copy_from_slice(&EXT4_VALID_FS.to_le_bytes());
    sb[0x4C..0x50].copy_from_slice(&0u32.to_le_bytes()); // s_rev_level = GOOD_OLD
    sb[0x76..0x86].copy_from_slice(b"test\0\0\0\0\0\0\0\0\0\0\0\0");
    write_block(&mut image, 1, &sb);

    image
}

fn mount(image: Vec<u8>) -> Partition {
    let dev = Box::new(MemDisk(Mutex::new(image)));
    Partition::mount(dev, Box::new(SimpleCollation), Box::new(SimpleCalendar)).unwrap()
}

/// A `DiskReader` backed by a real temp file, in the style of the teacher's
/// `reader_tests.rs` (`create_test_device`), for the one test that wants to
/// exercise the seam against actual file I/O rather than an in-memory `Vec`.
struct FileDisk(Mutex<File>);

impl DiskReader for FileDisk {
    fn read(&self, offset: u64, length: usize) -> ext4ro::Result<Vec<u8>> {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| Ext4Error::DeviceError(e.to_string()))?;
        let mut buf = vec![0u8; length];
        file.read_exact(&mut buf).map_err(|e| Ext4Error::DeviceError(e.to_string()))?;
        Ok(buf)
    }
}

#[test]
fn mounts_and_reads_from_a_real_temp_file_backed_device() {
    init_logging();

    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&build_image()).unwrap();
    tmp.flush().unwrap();

    let file = File::open(tmp.path()).unwrap();
    let dev = Box::new(FileDisk(Mutex::new(file)));
    let mut p = Partition::mount(dev, Box::new(SimpleCollation), Box::new(SimpleCalendar)).unwrap();

    let root = p.root();
    let h = p.open(root, "\\hello.txt", ext4ro::MODE_READ).unwrap();
    let mut buf = vec![0u8; 64];
    let n = p.read(h, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"Hello, world!\n");
    p.close(h).unwrap();
}

#[test]
fn scenario_a_open_read_hello_txt() {
    init_logging();
    let mut p = mount(build_image());
    let root = p.root();
    let h = p.open(root, "\\hello.txt", ext4ro::MODE_READ).unwrap();

    let mut buf = vec![0u8; 64];
    let n = p.read(h, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"Hello, world!\n");

    let n2 = p.read(h, &mut buf).unwrap();
    assert_eq!(n2, 0);

    p.close(h).unwrap();
}

#[test]
fn scenario_f_dotdot_on_root_is_not_found() {
    let mut p = mount(build_image());
    let root = p.root();
    let err = p.open(root, "..", ext4ro::MODE_READ).unwrap_err();
    assert!(matches!(err, Ext4Error::NotFound));
}

#[test]
fn absolute_path_anchors_at_root_regardless_of_base() {
    let mut p = mount(build_image());
    let root = p.root();
    let sub = p.open(root, "\\sub", ext4ro::MODE_READ).unwrap();

    let via_sub = p.open(sub, "\\hello.txt", ext4ro::MODE_READ).unwrap();
    let via_root = p.open(root, "\\hello.txt", ext4ro::MODE_READ).unwrap();

    let mut a = vec![0u8; 32];
    let mut b = vec![0u8; 32];
    let na = p.read(via_sub, &mut a).unwrap();
    let nb = p.read(via_root, &mut b).unwrap();
    assert_eq!(&a[..na], &b[..nb]);

    p.close(sub).unwrap();
    p.close(via_sub).unwrap();
    p.close(via_root).unwrap();
}

#[test]
fn close_is_a_no_op_on_the_live_root() {
    let mut p = mount(build_image());
    let root = p.root();
    p.close(root).unwrap();
    // root must still be usable after "closing" it
    let h = p.open(root, "\\hello.txt", ext4ro::MODE_READ).unwrap();
    p.close(h).unwrap();
}

#[test]
fn directory_enumeration_skips_dot_and_dotdot() {
    let mut p = mount(build_image());
    let root = p.root();
    let dir = p.open(root, "\\", ext4ro::MODE_READ).unwrap();

    let mut names = Vec::new();
    while let Some(info) = p.read_dir(dir).unwrap() {
        names.push(info.name);
    }
    names.sort();
    assert_eq!(names, vec!["hello.txt".to_string(), "sub".to_string()]);

    p.close(dir).unwrap();
}

#[test]
fn set_position_seek_to_end_and_directory_rules() {
    let mut p = mount(build_image());
    let root = p.root();
    let h = p.open(root, "\\hello.txt", ext4ro::MODE_READ).unwrap();

    p.set_position(h, u64::MAX).unwrap();
    assert_eq!(p.get_position(h).unwrap(), "Hello, world!\n".len() as u64);

    let mut buf = [0u8; 4];
    assert_eq!(p.read(h, &mut buf).unwrap(), 0);
    p.close(h).unwrap();

    let dir = p.open(root, "\\sub", ext4ro::MODE_READ).unwrap();
    assert!(matches!(p.set_position(dir, 5), Err(Ext4Error::Unsupported(_))));
    assert!(matches!(p.get_position(dir), Err(Ext4Error::Unsupported(_))));
    p.close(dir).unwrap();
}

#[test]
fn opening_a_missing_name_is_not_found() {
    let mut p = mount(build_image());
    let root = p.root();
    let err = p.open(root, "\\nonexistent.txt", ext4ro::MODE_READ).unwrap_err();
    assert!(matches!(err, Ext4Error::NotFound));
}

#[test]
fn opening_the_symlink_itself_is_access_denied() {
    let mut p = mount(build_image());
    let root = p.root();
    let err = p.open(root, "\\sub\\link", ext4ro::MODE_READ).unwrap_err();
    assert!(matches!(err, Ext4Error::AccessDenied(_)));
}

#[test]
fn path_through_a_non_openable_intermediate_segment_is_access_denied() {
    let mut p = mount(build_image());
    let root = p.root();
    let err = p.open(root, "\\sub\\link\\hello.txt", ext4ro::MODE_READ).unwrap_err();
    assert!(matches!(err, Ext4Error::AccessDenied(_)));
}

#[test]
fn path_segment_through_a_regular_file_is_invalid_parameter() {
    let mut p = mount(build_image());
    let root = p.root();
    let err = p.open(root, "\\hello.txt\\nope", ext4ro::MODE_READ).unwrap_err();
    assert!(matches!(err, Ext4Error::InvalidParameter(_)));
}

#[test]
fn scenario_c_corrupted_group_descriptor_is_volume_corrupted() {
    use crc32c::crc32c_append;

    let mut image = build_image();

    // Turn on metadata_csum and give every structure a valid checksum,
    // then flip one bit in the group descriptor's inode-table pointer to
    // break just that checksum (spec.md §8 Scenario C).
    image[1024 + 0x60] = 1; // s_feature_ro_compat bit 0x0400's low byte... see below
    let ro_compat_off = 1024 + 0x60;
    image[ro_compat_off..ro_compat_off + 4].copy_from_slice(&EXT4_FEATURE_RO_COMPAT_METADATA_CSUM.to_le_bytes());
    image[1024 + 0xFC] = 1; // s_checksum_type = CRC32C

    let crc32c = |init: u32, data: &[u8]| -> u32 { !crc32c_append(!init, data) };
    let seed = crc32c(!0u32, &[0u8; 16]); // no CSUM_SEED bit -> derived from (zeroed) uuid

    // group descriptor checksum
    let desc_off = 2 * BLOCK_SIZE as usize;
    {
        let desc = image[desc_off..desc_off + 32].to_vec();
        let mut crc = crc32c(seed, &0u32.to_le_bytes());
        crc = crc32c(crc, &desc[0..0x1E]);
        crc = crc32c(crc, &[0u8, 0u8]);
        let checksum = (crc & 0xFFFF) as u16;
        image[desc_off + 0x1E..desc_off + 0x20].copy_from_slice(&checksum.to_le_bytes());
    }

    // inode checksums for root, hello.txt, sub (generation 0 throughout)
    let inode_table_start = INODE_TABLE_BLOCK as usize * BLOCK_SIZE as usize;
    let inode_at = |n: u32| inode_table_start + (n as usize - 1) * INODE_SIZE as usize;
    for n in [EXT4_ROOT_INO, HELLO_INODE, SUB_INODE] {
        let start = inode_at(n);
        let mut crc = crc32c(seed, &n.to_le_bytes());
        crc = crc32c(crc, &[0u8; 4]);
        crc = crc32c(crc, &image[start..start + 0x7C]);
        crc = crc32c(crc, &[0u8, 0u8]);
        crc = crc32c(crc, &image[start + 0x7E..start + INODE_SIZE as usize]);
        let lo = (crc & 0xFFFF) as u16;
        image[start + 0x7C..start + 0x7E].copy_from_slice(&lo.to_le_bytes());
    }

    // superblock checksum over bytes [0, 0x3FC), always keyed off the fixed
    // initial value rather than the derived seed.
    {
        let sb_start = 1024usize;
        let checksum = crc32c(!0u32, &image[sb_start..sb_start + 0x3FC]);
        image[sb_start + 0x3FC..sb_start + 0x400].copy_from_slice(&checksum.to_le_bytes());
    }

    // Sanity: this image mounts cleanly before corruption.
    let clean = image.clone();
    let dev = MemDisk(Mutex::new(clean));
    Partition::mount(Box::new(dev), Box::new(SimpleCollation), Box::new(SimpleCalendar)).unwrap();

    // Flip one bit in bg_inode_table_lo without updating the checksum.
    image[desc_off + 8] ^= 0x01;

    let dev = MemDisk(Mutex::new(image));
    match Partition::mount(Box::new(dev), Box::new(SimpleCollation), Box::new(SimpleCalendar)) {
        Err(Ext4Error::VolumeCorrupted(_)) => {}
        Err(other) => panic!("expected VolumeCorrupted, got {other:?}"),
        Ok(_) => panic!("expected mount to fail on corrupted group descriptor checksum"),
    }
}
