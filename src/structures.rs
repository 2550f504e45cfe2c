//! Bit-exact on-disk layouts (spec.md §6). Grounded on the teacher's
//! `formatters/src/ext4_native/core/structures.rs`, trimmed to the fields
//! the read-only core consults and stripped of formatter-only (write-side)
//! construction helpers.

use static_assertions::assert_eq_size;

use crate::constants::*;

/// The on-disk superblock, 1024 bytes, at absolute byte offset 1024.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Ext4Superblock {
    pub s_inodes_count: u32,
    pub s_blocks_count_lo: u32,
    pub s_r_blocks_count_lo: u32,
    pub s_free_blocks_count_lo: u32,
    pub s_free_inodes_count: u32,
    pub s_first_data_block: u32,
    pub s_log_block_size: u32,
    pub s_log_cluster_size: u32,
    pub s_blocks_per_group: u32,
    pub s_clusters_per_group: u32,
    pub s_inodes_per_group: u32,
    pub s_mtime: u32,
    pub s_wtime: u32,
    pub s_mnt_count: u16,
    pub s_max_mnt_count: u16,
    pub s_magic: u16,
    pub s_state: u16,
    pub s_errors: u16,
    pub s_minor_rev_level: u16,
    pub s_lastcheck: u32,
    pub s_checkinterval: u32,
    pub s_creator_os: u32,
    pub s_rev_level: u32,
    pub s_def_resuid: u16,
    pub s_def_resgid: u16,

    // Dynamic-revision fields (only valid if s_rev_level > GOOD_OLD_REV)
    pub s_first_ino: u32,
    pub s_inode_size: u16,
    pub s_block_group_nr: u16,
    pub s_feature_compat: u32,
    pub s_feature_incompat: u32,
    pub s_feature_ro_compat: u32,
    pub s_uuid: [u8; 16],
    pub s_volume_name: [u8; 16],
    pub s_last_mounted: [u8; 64],
    pub s_algorithm_usage_bitmap: u32,

    pub s_prealloc_blocks: u8,
    pub s_prealloc_dir_blocks: u8,
    pub s_reserved_gdt_blocks: u16,

    pub s_journal_uuid: [u8; 16],
    pub s_journal_inum: u32,
    pub s_journal_dev: u32,
    pub s_last_orphan: u32,
    pub s_hash_seed: [u32; 4],
    pub s_def_hash_version: u8,
    pub s_jnl_backup_type: u8,
    pub s_desc_size: u16,
    pub s_default_mount_opts: u32,
    pub s_first_meta_bg: u32,
    pub s_mkfs_time: u32,
    pub s_jnl_blocks: [u32; 17],

    pub s_blocks_count_hi: u32,
    pub s_r_blocks_count_hi: u32,
    pub s_free_blocks_count_hi: u32,
    pub s_min_extra_isize: u16,
    pub s_want_extra_isize: u16,
    pub s_flags: u32,
    pub s_raid_stride: u16,
    pub s_mmp_interval: u16,
    pub s_mmp_block: u64,
    pub s_raid_stripe_width: u32,
    pub s_log_groups_per_flex: u8,
    pub s_checksum_type: u8,
    pub s_reserved_pad: u16,
    pub s_kbytes_written: u64,
    pub s_snapshot_inum: u32,
    pub s_snapshot_id: u32,
    pub s_snapshot_r_blocks_count: u64,
    pub s_snapshot_list: u32,
    pub s_error_count: u32,
    pub s_first_error_time: u32,
    pub s_first_error_ino: u32,
    pub s_first_error_block: u64,
    pub s_first_error_func: [u8; 32],
    pub s_first_error_line: u32,
    pub s_last_error_time: u32,
    pub s_last_error_ino: u32,
    pub s_last_error_line: u32,
    pub s_last_error_block: u64,
    pub s_last_error_func: [u8; 32],
    pub s_mount_opts: [u8; 64],
    pub s_usr_quota_inum: u32,
    pub s_grp_quota_inum: u32,
    pub s_overhead_blocks: u32,
    pub s_backup_bgs: [u32; 2],
    pub s_encrypt_algos: [u8; 4],
    pub s_encrypt_pw_salt: [u8; 16],
    pub s_lpf_ino: u32,
    pub s_prj_quota_inum: u32,
    pub s_checksum_seed: u32,
    pub s_reserved: [u32; 98],
    pub s_checksum: u32,
}

assert_eq_size!(Ext4Superblock, [u8; 1024]);

impl Ext4Superblock {
    pub fn has_feature_incompat(&self, bit: u32) -> bool {
        self.s_feature_incompat & bit != 0
    }

    pub fn has_feature_ro_compat(&self, bit: u32) -> bool {
        self.s_feature_ro_compat & bit != 0
    }

    pub fn has_feature_compat(&self, bit: u32) -> bool {
        self.s_feature_compat & bit != 0
    }

    pub fn block_size(&self) -> u32 {
        1024u32 << self.s_log_block_size
    }

    pub fn is_64bit(&self) -> bool {
        self.has_feature_incompat(EXT4_FEATURE_INCOMPAT_64BIT)
    }

    pub fn blocks_count(&self) -> u64 {
        let hi = if self.is_64bit() {
            self.s_blocks_count_hi as u64
        } else {
            0
        };
        (hi << 32) | self.s_blocks_count_lo as u64
    }

    pub fn free_blocks_count(&self) -> u64 {
        let hi = if self.is_64bit() {
            self.s_free_blocks_count_hi as u64
        } else {
            0
        };
        (hi << 32) | self.s_free_blocks_count_lo as u64
    }

    pub fn r_blocks_count(&self) -> u64 {
        let hi = if self.is_64bit() {
            self.s_r_blocks_count_hi as u64
        } else {
            0
        };
        (hi << 32) | self.s_r_blocks_count_lo as u64
    }

    pub fn desc_size(&self) -> u16 {
        if self.is_64bit() {
            self.s_desc_size
        } else {
            32
        }
    }

    pub fn metadata_csum(&self) -> bool {
        self.has_feature_ro_compat(EXT4_FEATURE_RO_COMPAT_METADATA_CSUM)
    }

    #[allow(dead_code)] // mirrors metadata_csum(); group.rs inlines this check locally
    pub fn gdt_csum(&self) -> bool {
        self.has_feature_ro_compat(EXT4_FEATURE_RO_COMPAT_GDT_CSUM)
    }

    pub fn volume_label(&self) -> String {
        String::from_utf8_lossy(&self.s_volume_name)
            .trim_end_matches('\0')
            .to_string()
    }

    pub fn uuid_string(&self) -> String {
        let u = &self.s_uuid;
        format!(
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            u[0], u[1], u[2], u[3], u[4], u[5], u[6], u[7],
            u[8], u[9], u[10], u[11], u[12], u[13], u[14], u[15]
        )
    }

    /// Safety: `bytes` must be at least 1024 bytes, as read from the device
    /// at the fixed superblock offset.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() >= 1024);
        unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const Self) }
    }
}

/// Block group descriptor, 32 or 64 bytes depending on `s_desc_size`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Ext4GroupDesc {
    pub bg_block_bitmap_lo: u32,
    pub bg_inode_bitmap_lo: u32,
    pub bg_inode_table_lo: u32,
    pub bg_free_blocks_count_lo: u16,
    pub bg_free_inodes_count_lo: u16,
    pub bg_used_dirs_count_lo: u16,
    pub bg_flags: u16,
    pub bg_exclude_bitmap_lo: u32,
    pub bg_block_bitmap_csum_lo: u16,
    pub bg_inode_bitmap_csum_lo: u16,
    pub bg_itable_unused_lo: u16,
    pub bg_checksum: u16,
    pub bg_block_bitmap_hi: u32,
    pub bg_inode_bitmap_hi: u32,
    pub bg_inode_table_hi: u32,
    pub bg_free_blocks_count_hi: u16,
    pub bg_free_inodes_count_hi: u16,
    pub bg_used_dirs_count_hi: u16,
    pub bg_itable_unused_hi: u16,
    pub bg_exclude_bitmap_hi: u32,
    pub bg_block_bitmap_csum_hi: u16,
    pub bg_inode_bitmap_csum_hi: u16,
    pub bg_reserved: u32,
}

assert_eq_size!(Ext4GroupDesc, [u8; 64]);

impl Ext4GroupDesc {
    /// Parse a descriptor from its on-disk bytes, zero-extending a 32-byte
    /// (non-64BIT) descriptor up to the full 64-byte in-memory shape.
    pub fn from_bytes(bytes: &[u8], desc_size: u16) -> Self {
        let mut buf = [0u8; 64];
        let n = (desc_size as usize).min(64).min(bytes.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        unsafe { std::ptr::read_unaligned(buf.as_ptr() as *const Self) }
    }

    #[allow(dead_code)] // kept alongside inode_bitmap/inode_table for a complete descriptor accessor surface
    pub fn block_bitmap(&self) -> u64 {
        ((self.bg_block_bitmap_hi as u64) << 32) | self.bg_block_bitmap_lo as u64
    }

    #[allow(dead_code)]
    pub fn inode_bitmap(&self) -> u64 {
        ((self.bg_inode_bitmap_hi as u64) << 32) | self.bg_inode_bitmap_lo as u64
    }

    pub fn inode_table(&self) -> u64 {
        ((self.bg_inode_table_hi as u64) << 32) | self.bg_inode_table_lo as u64
    }

    #[allow(dead_code)]
    pub fn free_blocks_count(&self) -> u32 {
        ((self.bg_free_blocks_count_hi as u32) << 16) | self.bg_free_blocks_count_lo as u32
    }

    #[allow(dead_code)]
    pub fn free_inodes_count(&self) -> u32 {
        ((self.bg_free_inodes_count_hi as u32) << 16) | self.bg_free_inodes_count_lo as u32
    }

    #[allow(dead_code)]
    pub fn used_dirs_count(&self) -> u32 {
        ((self.bg_used_dirs_count_hi as u32) << 16) | self.bg_used_dirs_count_lo as u32
    }
}

/// Extent tree header, 12 bytes, found at the start of `i_block` when
/// `EXT4_EXTENTS_FL` is set.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Ext4ExtentHeader {
    pub eh_magic: u16,
    pub eh_entries: u16,
    pub eh_max: u16,
    pub eh_depth: u16,
    pub eh_generation: u32,
}

assert_eq_size!(Ext4ExtentHeader, [u8; 12]);

impl Ext4ExtentHeader {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const Self) }
    }

    pub fn is_valid_magic(&self) -> bool {
        self.eh_magic == EXT4_EXTENT_MAGIC
    }
}

/// Interior extent-tree node: a logical-block key plus a pointer to a child
/// block at the next depth.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Ext4ExtentIdx {
    pub ei_block: u32,
    pub ei_leaf_lo: u32,
    pub ei_leaf_hi: u16,
    pub ei_unused: u16,
}

assert_eq_size!(Ext4ExtentIdx, [u8; 12]);

impl Ext4ExtentIdx {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const Self) }
    }

    pub fn leaf_block(&self) -> u64 {
        ((self.ei_leaf_hi as u64) << 32) | self.ei_leaf_lo as u64
    }
}

/// Leaf extent: a contiguous run of physical blocks mapped to a contiguous
/// run of logical blocks.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ext4Extent {
    pub ee_block: u32,
    pub ee_len: u16,
    pub ee_start_hi: u16,
    pub ee_start_lo: u32,
}

assert_eq_size!(Ext4Extent, [u8; 12]);

/// ee_len's high bit marks an unwritten ("allocated but zeroed") extent.
const EXT_INIT_MAX_LEN: u16 = 32768;

impl Ext4Extent {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const Self) }
    }

    pub fn start_block(&self) -> u64 {
        ((self.ee_start_hi as u64) << 32) | self.ee_start_lo as u64
    }

    pub fn is_unwritten(&self) -> bool {
        self.ee_len >= EXT_INIT_MAX_LEN
    }

    /// Number of blocks actually covered, regardless of the unwritten marker.
    pub fn len(&self) -> u32 {
        if self.is_unwritten() {
            (self.ee_len - EXT_INIT_MAX_LEN) as u32
        } else {
            self.ee_len as u32
        }
    }
}
