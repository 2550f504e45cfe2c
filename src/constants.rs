//! On-disk constants from the ext2/ext3/ext4 specification.
//!
//! Grounded on the teacher's `filesystems/src/ext4_native/core/constants.rs`,
//! trimmed to what the read-only metadata engine consults.
//!
//! Kept as a complete reference table even where a given bit isn't consulted
//! by any code path yet (e.g. file-type tags, mode bits for non-file/dir
//! inode kinds).
#![allow(dead_code)]

// Magic numbers
pub const EXT4_SUPER_MAGIC: u16 = 0xEF53;
pub const EXT4_EXTENT_MAGIC: u16 = 0xF30A;

// Revision levels
pub const EXT4_GOOD_OLD_REV: u32 = 0;
pub const EXT4_DYNAMIC_REV: u32 = 1;
pub const EXT4_GOOD_OLD_INODE_SIZE: u16 = 128;

// Special inode numbers
pub const EXT4_ROOT_INO: u32 = 2;

// Filesystem state flags
pub const EXT4_VALID_FS: u16 = 0x0001; // cleanly unmounted

// Feature flags - incompatible
pub const EXT4_FEATURE_INCOMPAT_COMPRESSION: u32 = 0x0001;
pub const EXT4_FEATURE_INCOMPAT_FILETYPE: u32 = 0x0002;
pub const EXT4_FEATURE_INCOMPAT_RECOVER: u32 = 0x0004;
pub const EXT4_FEATURE_INCOMPAT_JOURNAL_DEV: u32 = 0x0008;
pub const EXT4_FEATURE_INCOMPAT_META_BG: u32 = 0x0010;
pub const EXT4_FEATURE_INCOMPAT_EXTENTS: u32 = 0x0040;
pub const EXT4_FEATURE_INCOMPAT_64BIT: u32 = 0x0080;
pub const EXT4_FEATURE_INCOMPAT_MMP: u32 = 0x0100;
pub const EXT4_FEATURE_INCOMPAT_FLEX_BG: u32 = 0x0200;
pub const EXT4_FEATURE_INCOMPAT_EA_INODE: u32 = 0x0400;
pub const EXT4_FEATURE_INCOMPAT_DIRDATA: u32 = 0x1000;
pub const EXT4_FEATURE_INCOMPAT_CSUM_SEED: u32 = 0x2000;
pub const EXT4_FEATURE_INCOMPAT_LARGEDIR: u32 = 0x4000;
pub const EXT4_FEATURE_INCOMPAT_INLINE_DATA: u32 = 0x8000;
pub const EXT4_FEATURE_INCOMPAT_ENCRYPT: u32 = 0x10000;

/// Incompat bits this read-only driver knows how to ignore safely (spec.md §4.2 step 4).
pub const SUPPORTED_INCOMPAT: u32 = EXT4_FEATURE_INCOMPAT_64BIT
    | EXT4_FEATURE_INCOMPAT_DIRDATA
    | EXT4_FEATURE_INCOMPAT_FLEX_BG
    | EXT4_FEATURE_INCOMPAT_FILETYPE
    | EXT4_FEATURE_INCOMPAT_EXTENTS
    | EXT4_FEATURE_INCOMPAT_LARGEDIR
    | EXT4_FEATURE_INCOMPAT_MMP;

// Feature flags - compatible
pub const EXT4_FEATURE_COMPAT_HAS_JOURNAL: u32 = 0x0004;

// Feature flags - read-only compatible
pub const EXT4_FEATURE_RO_COMPAT_SPARSE_SUPER: u32 = 0x0001;
pub const EXT4_FEATURE_RO_COMPAT_LARGE_FILE: u32 = 0x0002;
pub const EXT4_FEATURE_RO_COMPAT_BTREE_DIR: u32 = 0x0004;
pub const EXT4_FEATURE_RO_COMPAT_HUGE_FILE: u32 = 0x0008;
pub const EXT4_FEATURE_RO_COMPAT_GDT_CSUM: u32 = 0x0010;
pub const EXT4_FEATURE_RO_COMPAT_DIR_NLINK: u32 = 0x0020;
pub const EXT4_FEATURE_RO_COMPAT_EXTRA_ISIZE: u32 = 0x0040;
pub const EXT4_FEATURE_RO_COMPAT_QUOTA: u32 = 0x0100;
pub const EXT4_FEATURE_RO_COMPAT_BIGALLOC: u32 = 0x0200;
pub const EXT4_FEATURE_RO_COMPAT_METADATA_CSUM: u32 = 0x0400;
pub const EXT4_FEATURE_RO_COMPAT_REPLICA: u32 = 0x0800;
pub const EXT4_FEATURE_RO_COMPAT_READONLY: u32 = 0x1000;
pub const EXT4_FEATURE_RO_COMPAT_PROJECT: u32 = 0x2000;

/// Ro-compat bits this driver understands; unknown bits force read-only
/// rather than refusing the mount (spec.md §4.2 step 7).
pub const SUPPORTED_RO_COMPAT: u32 = EXT4_FEATURE_RO_COMPAT_DIR_NLINK
    | EXT4_FEATURE_RO_COMPAT_EXTRA_ISIZE
    | EXT4_FEATURE_RO_COMPAT_HUGE_FILE
    | EXT4_FEATURE_RO_COMPAT_LARGE_FILE
    | EXT4_FEATURE_RO_COMPAT_GDT_CSUM
    | EXT4_FEATURE_RO_COMPAT_METADATA_CSUM
    | EXT4_FEATURE_RO_COMPAT_SPARSE_SUPER;

// Inode flags
pub const EXT4_INDEX_FL: u32 = 0x0000_1000;
pub const EXT4_HUGE_FILE_FL: u32 = 0x0004_0000;
pub const EXT4_EXTENTS_FL: u32 = 0x0008_0000;
pub const EXT4_INLINE_DATA_FL: u32 = 0x1000_0000;

// File types for directory entries
pub const EXT4_FT_UNKNOWN: u8 = 0;
pub const EXT4_FT_REG_FILE: u8 = 1;
pub const EXT4_FT_DIR: u8 = 2;
pub const EXT4_FT_CHRDEV: u8 = 3;
pub const EXT4_FT_BLKDEV: u8 = 4;
pub const EXT4_FT_FIFO: u8 = 5;
pub const EXT4_FT_SOCK: u8 = 6;
pub const EXT4_FT_SYMLINK: u8 = 7;

// Inode mode bits
pub const S_IFMT: u16 = 0xF000;
pub const S_IFSOCK: u16 = 0xC000;
pub const S_IFLNK: u16 = 0xA000;
pub const S_IFREG: u16 = 0x8000;
pub const S_IFBLK: u16 = 0x6000;
pub const S_IFDIR: u16 = 0x4000;
pub const S_IFCHR: u16 = 0x2000;
pub const S_IFIFO: u16 = 0x1000;

pub const S_IRUSR: u16 = 0x0100;
pub const S_IWUSR: u16 = 0x0080;
