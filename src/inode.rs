//! InodeStore: inode location and checksum-verified retrieval (spec.md
//! §4.4, §4.4.1).
//!
//! The teacher's `Ext4Inode` (`formatters/core/structures.rs`) is a fixed
//! 256-byte `#[repr(C)]` struct, which doesn't fit here: spec.md requires
//! `InodeSize` to be a runtime value (128 for GOOD_OLD, otherwise whatever
//! the superblock says), so this reads fields by byte offset over a
//! variable-length buffer instead of transmuting a fixed-size struct.

use log::trace;

use crate::checksum::crc32c;
use crate::constants::*;
use crate::device::{read_exact, DiskReader};
use crate::error::{Ext4Error, Result};
use crate::group::BlockGroupTable;
use crate::superblock::Geometry;

fn u16_at(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes(buf[off..off + 2].try_into().unwrap())
}

fn u32_at(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}

/// A fully parsed inode record. Owns the raw `i_block`/data region verbatim
/// so the extent engine and the indirect-block walker can each reinterpret
/// it as their format requires.
#[derive(Debug, Clone)]
pub struct Inode {
    pub mode: u16,
    pub uid: u32,
    pub gid: u32,
    pub links_count: u16,
    pub size: u64,
    pub flags: u32,
    pub generation: u32,
    pub atime: u32,
    pub ctime: u32,
    pub mtime: u32,
    pub dtime: u32,
    /// Extra-precision timestamp halves; zero when `i_extra_isize` doesn't
    /// reach far enough to carry them (spec.md §3, §6).
    pub atime_extra: u32,
    pub ctime_extra: u32,
    pub mtime_extra: u32,
    pub crtime: u32,
    pub crtime_extra: u32,
    /// The 60-byte `i_data`/`i_block` region: either 15 direct/indirect
    /// block pointers, or an extent header plus entries.
    pub i_block: [u8; 60],
}

impl Inode {
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_regular(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    pub fn uses_extents(&self) -> bool {
        self.flags & EXT4_EXTENTS_FL != 0
    }
}

const I_BLOCKS_OFFSET: usize = 0x28;
const I_GENERATION_OFFSET: usize = 0x64;
const CHECKSUM_LO_OFFSET: usize = 0x7C;
const EXTRA_ISIZE_OFFSET: usize = 0x80;
const CHECKSUM_HI_OFFSET: usize = 0x82;

/// `ReadInode` (spec.md §4.4): locate, read, and (if metadata_csum is on)
/// checksum-verify an on-disk inode record.
pub fn read_inode(
    dev: &dyn DiskReader,
    metadata_csum: bool,
    seed: u32,
    groups: &BlockGroupTable,
    geo: &Geometry,
    inode_num: u32,
) -> Result<Inode> {
    if inode_num == 0 {
        return Err(Ext4Error::InvalidParameter("inode number must be >= 1".into()));
    }

    let block_group = (inode_num - 1) / geo_inodes_per_group(geo);
    let offset_in_group = (inode_num - 1) % geo_inodes_per_group(geo);

    if block_group >= geo.number_block_groups {
        return Err(Ext4Error::VolumeCorrupted(format!(
            "inode {inode_num} maps to out-of-range block group {block_group}"
        )));
    }

    let bg = groups.get(block_group)?;
    let inode_table_start = bg.inode_table();
    let inode_size = geo.inode_size as u64;
    let offset = inode_table_start * geo.block_size as u64 + offset_in_group as u64 * inode_size;

    let buf = read_exact(dev, offset, inode_size as usize)?;

    if metadata_csum {
        verify_inode_checksum(&buf, inode_num, seed)?;
    }

    trace!("inode {inode_num}: read from group {block_group}, offset_in_group {offset_in_group}");

    let mut i_block = [0u8; 60];
    i_block.copy_from_slice(&buf[I_BLOCKS_OFFSET..I_BLOCKS_OFFSET + 60]);

    let size_lo = u32_at(&buf, 0x04);
    let size_high = u32_at(&buf, 0x6C);

    let extra_isize = if buf.len() >= EXTRA_ISIZE_OFFSET + 2 {
        u16_at(&buf, EXTRA_ISIZE_OFFSET)
    } else {
        0
    };
    let field_present = |offset: usize, size: usize| {
        buf.len() >= offset + size && extra_isize as u32 + EXT4_GOOD_OLD_INODE_SIZE as u32 >= (offset + size) as u32
    };
    let extra_u32 = |offset: usize| if field_present(offset, 4) { u32_at(&buf, offset) } else { 0 };

    Ok(Inode {
        mode: u16_at(&buf, 0x00),
        uid: u32_uid(&buf),
        gid: u32_gid(&buf),
        links_count: u16_at(&buf, 0x1A),
        size: ((size_high as u64) << 32) | size_lo as u64,
        flags: u32_at(&buf, 0x20),
        generation: u32_at(&buf, I_GENERATION_OFFSET),
        atime: u32_at(&buf, 0x08),
        ctime: u32_at(&buf, 0x0C),
        mtime: u32_at(&buf, 0x10),
        dtime: u32_at(&buf, 0x14),
        atime_extra: extra_u32(0x8C),
        ctime_extra: extra_u32(0x84),
        mtime_extra: extra_u32(0x88),
        crtime: extra_u32(0x90),
        crtime_extra: extra_u32(0x94),
        i_block,
    })
}

fn u32_uid(buf: &[u8]) -> u32 {
    let lo = u16_at(buf, 0x02) as u32;
    let hi = u16_at(buf, 0x78) as u32; // l_i_uid_high
    (hi << 16) | lo
}

fn u32_gid(buf: &[u8]) -> u32 {
    let lo = u16_at(buf, 0x18) as u32;
    let hi = u16_at(buf, 0x7A) as u32; // l_i_gid_high
    (hi << 16) | lo
}

fn geo_inodes_per_group(geo: &Geometry) -> u32 {
    // Cached on Geometry's owner (superblock) in practice; re-derived here
    // to keep Geometry a pure function of mount-time decisions.
    geo.inodes_per_group
}

/// `4.4.1 Inode checksum`.
fn verify_inode_checksum(buf: &[u8], inode_num: u32, seed: u32) -> Result<()> {
    let len = buf.len();
    let extra_isize = if len >= EXTRA_ISIZE_OFFSET + 2 {
        u16_at(buf, EXTRA_ISIZE_OFFSET)
    } else {
        0
    };
    let has_hi = len >= CHECKSUM_HI_OFFSET + 2
        && extra_isize as u32 + EXT4_GOOD_OLD_INODE_SIZE as u32 >= (CHECKSUM_HI_OFFSET + 2) as u32;

    let mut crc = crc32c(seed, &inode_num.to_le_bytes());
    crc = crc32c(crc, &buf[I_GENERATION_OFFSET..I_GENERATION_OFFSET + 4]);
    crc = crc32c(crc, &buf[0..CHECKSUM_LO_OFFSET]);
    crc = crc32c(crc, &[0u8, 0u8]);

    let stored_lo = u16_at(buf, CHECKSUM_LO_OFFSET);

    if has_hi {
        crc = crc32c(crc, &buf[CHECKSUM_LO_OFFSET + 2..EXTRA_ISIZE_OFFSET + 2]);
        crc = crc32c(crc, &[0u8, 0u8]);
        if len > CHECKSUM_HI_OFFSET + 2 {
            crc = crc32c(crc, &buf[CHECKSUM_HI_OFFSET + 2..len]);
        }
        let stored_hi = u16_at(buf, CHECKSUM_HI_OFFSET);
        let stored = ((stored_hi as u32) << 16) | stored_lo as u32;
        if crc != stored {
            return Err(Ext4Error::VolumeCorrupted(format!(
                "inode {inode_num} checksum mismatch"
            )));
        }
    } else {
        if len > CHECKSUM_LO_OFFSET + 2 {
            crc = crc32c(crc, &buf[CHECKSUM_LO_OFFSET + 2..len]);
        }
        if (crc & 0xFFFF) as u16 != stored_lo {
            return Err(Ext4Error::VolumeCorrupted(format!(
                "inode {inode_num} checksum mismatch"
            )));
        }
    }

    Ok(())
}
