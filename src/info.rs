//! FS-info reporting: file-info and volume-info records (spec.md §4.9, §6).
//!
//! Grounded on the teacher's `ExtInfo` (`filesystems/src/families/ext/ext4_native/reader/mod.rs`)
//! shape, split into the two GetInfo variants spec.md's external interface
//! calls out ("file-info or volume-info GUID").

use crate::constants::*;
use crate::inode::Inode;
use crate::structures::Ext4Superblock;
use crate::time::{decode_extra_timestamp, Calendar, EpochToCalendar};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
}

impl FileKind {
    pub fn from_inode(inode: &Inode) -> Option<Self> {
        if inode.is_regular() {
            Some(FileKind::Regular)
        } else if inode.is_dir() {
            Some(FileKind::Directory)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileInfo {
    pub name: String,
    pub inode: u32,
    pub kind: FileKind,
    pub size: u64,
    pub mode: u16,
    pub modified: Calendar,
    pub accessed: Calendar,
    pub created: Calendar,
}

impl FileInfo {
    pub fn build(name: String, inode_num: u32, inode: &Inode, calendar: &dyn EpochToCalendar) -> Option<Self> {
        let kind = FileKind::from_inode(inode)?;
        let (mtime_secs, mtime_nanos) = decode_extra_timestamp(inode.mtime, inode.mtime_extra);
        let (atime_secs, atime_nanos) = decode_extra_timestamp(inode.atime, inode.atime_extra);
        let (ctime_secs, ctime_nanos) = decode_extra_timestamp(inode.crtime, inode.crtime_extra);
        Some(FileInfo {
            name,
            inode: inode_num,
            kind,
            size: inode.size,
            mode: inode.mode,
            modified: calendar.to_calendar(mtime_secs, mtime_nanos),
            accessed: calendar.to_calendar(atime_secs, atime_nanos),
            created: calendar.to_calendar(ctime_secs, ctime_nanos),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtVersion {
    Ext2,
    Ext3,
    Ext4,
}

/// Classifies the mounted volume from its compat/incompat feature bits,
/// the way the teacher's `ExtReader` does (`detect_version`), purely for
/// reporting — it has no effect on how the core reads data.
pub fn detect_version(sb: &Ext4Superblock) -> ExtVersion {
    if sb.has_feature_incompat(EXT4_FEATURE_INCOMPAT_EXTENTS)
        || sb.has_feature_ro_compat(EXT4_FEATURE_RO_COMPAT_METADATA_CSUM)
        || sb.is_64bit()
    {
        ExtVersion::Ext4
    } else if sb.has_feature_compat(EXT4_FEATURE_COMPAT_HAS_JOURNAL) {
        ExtVersion::Ext3
    } else {
        ExtVersion::Ext2
    }
}

#[derive(Debug, Clone)]
pub struct VolumeInfo {
    pub volume_label: String,
    pub uuid: String,
    pub version: ExtVersion,
    pub block_size: u32,
    pub total_blocks: u64,
    pub free_blocks: u64,
    pub total_inodes: u32,
    pub free_inodes: u32,
    pub read_only: bool,
}

impl VolumeInfo {
    pub fn build(sb: &Ext4Superblock, read_only: bool) -> Self {
        VolumeInfo {
            volume_label: sb.volume_label(),
            uuid: sb.uuid_string(),
            version: detect_version(sb),
            block_size: sb.block_size(),
            total_blocks: sb.blocks_count(),
            free_blocks: sb.free_blocks_count(),
            total_inodes: sb.s_inodes_count,
            free_inodes: sb.s_free_inodes_count,
            read_only,
        }
    }
}
