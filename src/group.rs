//! Block-group descriptor table: loading and checksum verification
//! (spec.md §4.3), plus the GDT-load half of `OpenSuperblock` (steps 12–13).
//!
//! Grounded on the teacher's `structures.rs` (`Ext4GroupDesc` field layout)
//! and `checksum.rs` (`calculate_group_desc_checksum`), adapted to the two
//! distinct checksum schemes spec.md separates out (metadata_csum vs.
//! gdt_csum) rather than the teacher's single CRC16-only helper.

use log::trace;

use crate::checksum::{crc16, fold_crc32c};
use crate::constants::EXT4_FEATURE_RO_COMPAT_GDT_CSUM;
use crate::device::{read_exact, DiskReader};
use crate::error::{Ext4Error, Result};
use crate::structures::{Ext4GroupDesc, Ext4Superblock};
use crate::superblock::Geometry;

/// The block-group-descriptor checksum scheme in effect for this volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChecksumScheme {
    None,
    Gdt,
    Metadata,
}

pub struct BlockGroupTable {
    descriptors: Vec<Ext4GroupDesc>,
}

impl BlockGroupTable {
    /// Loads and verifies the group-descriptor table (spec.md §4.2 steps
    /// 12–13).
    pub fn load(dev: &dyn DiskReader, sb: &Ext4Superblock, geo: &Geometry, seed: u32) -> Result<Self> {
        let gdt_start_block: u64 = if geo.block_size == 1024 { 2 } else { 1 };
        let table_bytes = geo.number_block_groups as u64 * geo.desc_size as u64;
        let table_blocks = table_bytes.div_ceil(geo.block_size as u64);
        let raw = read_exact(
            dev,
            gdt_start_block * geo.block_size as u64,
            (table_blocks * geo.block_size as u64) as usize,
        )?;

        let scheme = if sb.metadata_csum() {
            ChecksumScheme::Metadata
        } else if has_gdt_csum(sb) {
            ChecksumScheme::Gdt
        } else {
            ChecksumScheme::None
        };

        let mut descriptors = Vec::with_capacity(geo.number_block_groups as usize);
        for group_number in 0..geo.number_block_groups {
            let start = group_number as usize * geo.desc_size as usize;
            let end = start + geo.desc_size as usize;
            let desc_bytes = &raw[start..end];
            let desc = Ext4GroupDesc::from_bytes(desc_bytes, geo.desc_size);

            verify_checksum(scheme, desc_bytes, &desc, &sb.s_uuid, group_number, seed)?;
            trace!("group {group_number}: loaded and verified");
            descriptors.push(desc);
        }

        Ok(Self { descriptors })
    }

    /// `GetBlockGroupDesc` (spec.md §4.3): the `group_number`-th entry.
    pub fn get(&self, group_number: u32) -> Result<&Ext4GroupDesc> {
        self.descriptors
            .get(group_number as usize)
            .ok_or_else(|| Ext4Error::VolumeCorrupted(format!("group {group_number} out of range")))
    }

    #[allow(dead_code)] // part of the descriptor-table surface; no caller needs a count yet
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

fn verify_checksum(
    scheme: ChecksumScheme,
    desc_bytes: &[u8],
    desc: &Ext4GroupDesc,
    uuid: &[u8; 16],
    group_number: u32,
    seed: u32,
) -> Result<()> {
    // bg_checksum sits at byte offset 0x1E in both the 32- and 64-byte
    // descriptor layouts.
    const CHECKSUM_OFFSET: usize = 0x1E;
    let desc_size = desc_bytes.len();

    match scheme {
        ChecksumScheme::None => Ok(()),
        ChecksumScheme::Metadata => {
            let tail: &[u8] = if desc_size > CHECKSUM_OFFSET + 2 {
                &desc_bytes[CHECKSUM_OFFSET + 2..desc_size]
            } else {
                &[]
            };
            let crc = fold_crc32c(
                seed,
                &[&group_number.to_le_bytes(), &desc_bytes[0..CHECKSUM_OFFSET], &[0u8, 0u8], tail],
            );
            if (crc & 0xFFFF) as u16 != desc.bg_checksum {
                return Err(Ext4Error::VolumeCorrupted(format!(
                    "group {group_number} descriptor checksum mismatch (metadata_csum)"
                )));
            }
            Ok(())
        }
        ChecksumScheme::Gdt => {
            let mut crc = crc16(0xFFFF, uuid);
            crc = crc16(crc, &group_number.to_le_bytes());
            crc = crc16(crc, &desc_bytes[0..CHECKSUM_OFFSET]);
            crc = crc16(crc, &[0u8, 0u8]);
            if desc_size > CHECKSUM_OFFSET + 2 {
                crc = crc16(crc, &desc_bytes[CHECKSUM_OFFSET + 2..desc_size]);
            }
            if crc != desc.bg_checksum {
                return Err(Ext4Error::VolumeCorrupted(format!(
                    "group {group_number} descriptor checksum mismatch (gdt_csum)"
                )));
            }
            Ok(())
        }
    }
}

/// Per spec.md §9 Open Questions: the source's `Ext4HasGdtCsum` predicate
/// tests metadata_csum, which is a bug. This port tests the actual
/// gdt_csum ro_compat bit.
fn has_gdt_csum(sb: &Ext4Superblock) -> bool {
    sb.has_feature_ro_compat(EXT4_FEATURE_RO_COMPAT_GDT_CSUM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_out_of_range_is_volume_corrupted() {
        let table = BlockGroupTable { descriptors: vec![] };
        let err = table.get(0).unwrap_err();
        assert!(matches!(err, Ext4Error::VolumeCorrupted(_)));
    }
}
