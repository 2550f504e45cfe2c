//! Superblock location, parsing and validation (spec.md §4.2).
//!
//! Grounded on the teacher's `formatters/src/ext4_native/core/types.rs`
//! (`FilesystemLayout`) for geometry derivation and `verify.rs` for the
//! step-by-step validation shape, adapted from write-time sanity checks to
//! mount-time ones.

use log::{debug, warn};

use crate::checksum::crc32c;
use crate::constants::*;
use crate::device::{read_exact, DiskReader};
use crate::error::{Ext4Error, Result};
use crate::structures::Ext4Superblock;

pub const SUPERBLOCK_OFFSET: u64 = 1024;
pub const SUPERBLOCK_SIZE: usize = 1024;

/// Constants derived from the superblock once, then frozen for the mount's
/// lifetime (spec.md §3, "Partition").
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub block_size: u32,
    pub inode_size: u16,
    pub inodes_per_group: u32,
    #[allow(dead_code)] // recorded for parity with Ext4Superblock::blocks_count(); no caller needs it outside VolumeInfo's own re-derivation
    pub number_blocks: u64,
    pub number_block_groups: u32,
    pub desc_size: u16,
    pub read_only: bool,
    pub seed: u32,
}

fn compose64(lo: u32, hi: u32) -> u64 {
    ((hi as u64) << 32) | lo as u64
}

/// `OpenSuperblock` (spec.md §4.2, steps 1–11). Group-descriptor-table
/// loading and checksum verification (steps 12–13) live in [`crate::group`];
/// reading the root inode (step 14) is the caller's job once both the
/// superblock and group table are in hand.
pub fn open_superblock(dev: &dyn DiskReader) -> Result<(Ext4Superblock, Geometry)> {
    let bytes = read_exact(dev, SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE)?;
    let mut sb = Ext4Superblock::from_bytes(&bytes);

    if sb.s_magic != EXT4_SUPER_MAGIC {
        return Err(Ext4Error::VolumeCorrupted(format!(
            "bad superblock magic: {:#06x}",
            sb.s_magic
        )));
    }
    if sb.s_rev_level != EXT4_GOOD_OLD_REV && sb.s_rev_level != EXT4_DYNAMIC_REV {
        return Err(Ext4Error::VolumeCorrupted(format!(
            "unknown revision level {}",
            sb.s_rev_level
        )));
    }
    if sb.s_state & EXT4_VALID_FS == 0 {
        return Err(Ext4Error::VolumeCorrupted(
            "filesystem was not cleanly unmounted".into(),
        ));
    }

    if sb.s_rev_level == EXT4_GOOD_OLD_REV {
        sb.s_feature_compat = 0;
        sb.s_feature_incompat = 0;
        sb.s_feature_ro_compat = 0;
        sb.s_inode_size = EXT4_GOOD_OLD_INODE_SIZE;
    }

    let unsupported_incompat = sb.s_feature_incompat & !SUPPORTED_INCOMPAT;
    if unsupported_incompat != 0 {
        return Err(Ext4Error::Unsupported(format!(
            "incompat feature bits {unsupported_incompat:#x} not supported"
        )));
    }

    let metadata_csum = sb.metadata_csum();
    if metadata_csum && sb.s_checksum_type != 1 {
        return Err(Ext4Error::Unsupported(format!(
            "unsupported checksum type {}",
            sb.s_checksum_type
        )));
    }

    let seed = if sb.has_feature_incompat(EXT4_FEATURE_INCOMPAT_CSUM_SEED) {
        sb.s_checksum_seed
    } else {
        crc32c(!0u32, &sb.s_uuid)
    };

    let unsupported_ro_compat = sb.s_feature_ro_compat & !SUPPORTED_RO_COMPAT;
    let read_only = unsupported_ro_compat != 0;
    if read_only {
        warn!("ro_compat feature bits {unsupported_ro_compat:#x} not supported, forcing read-only");
    }

    let block_size = sb.block_size();
    if sb.s_blocks_per_group != 8 * block_size {
        return Err(Ext4Error::Unsupported(format!(
            "blocks_per_group {} != 8 * block_size {}",
            sb.s_blocks_per_group, block_size
        )));
    }

    let number_blocks = compose64(sb.s_blocks_count_lo, sb.s_blocks_count_hi);
    let number_block_groups = (number_blocks / sb.s_blocks_per_group as u64) as u32;

    let desc_size = sb.desc_size();
    if sb.is_64bit() && desc_size < 64 {
        return Err(Ext4Error::VolumeCorrupted(format!(
            "64bit feature set but desc_size {desc_size} < 64"
        )));
    }

    if metadata_csum {
        // Always keyed off the fixed initial value, not the partition's
        // derived seed — unlike group-descriptor/inode checksums.
        let computed = crc32c(!0u32, &bytes[0..0x3FC]);
        if computed != sb.s_checksum {
            return Err(Ext4Error::VolumeCorrupted(format!(
                "superblock checksum mismatch: computed {computed:#x}, stored {:#x}",
                sb.s_checksum
            )));
        }
    }

    let inode_size = if sb.s_rev_level == EXT4_GOOD_OLD_REV {
        EXT4_GOOD_OLD_INODE_SIZE
    } else {
        sb.s_inode_size
    };

    debug!(
        "mounted: block_size={block_size} inode_size={inode_size} groups={number_block_groups} desc_size={desc_size} read_only={read_only}"
    );

    Ok((
        sb,
        Geometry {
            block_size,
            inode_size,
            inodes_per_group: sb.s_inodes_per_group,
            number_blocks,
            number_block_groups,
            desc_size,
            read_only,
            seed,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemDisk;

    #[test]
    fn rejects_bad_magic() {
        let mut image = vec![0u8; 4096];
        image[1024 + 56] = 0x00;
        image[1024 + 57] = 0x00;
        let dev = MemDisk::new(image);
        let err = open_superblock(&dev).unwrap_err();
        assert!(matches!(err, Ext4Error::VolumeCorrupted(_)));
    }

    #[test]
    fn rejects_dirty_state() {
        let mut image = vec![0u8; 4096];
        image[1024 + 56] = 0x53;
        image[1024 + 57] = 0xEF;
        // s_state at offset 58, leave as 0 (UNMOUNTED bit clear)
        let dev = MemDisk::new(image);
        let err = open_superblock(&dev).unwrap_err();
        assert!(matches!(err, Ext4Error::VolumeCorrupted(_)));
    }
}
