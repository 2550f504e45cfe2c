//! DirectoryScanner: linear directory-block iteration, record validation,
//! and case-insensitive name matching (spec.md §4.7).
//!
//! Per the "Directory UTF-8 decoding" design note, names are decoded as
//! full UTF-8 (skipping on invalid sequences) rather than the source's
//! ASCII-only conversion.

use std::cmp::Ordering;

use crate::device::DiskReader;
use crate::error::{Ext4Error, Result};
use crate::extent::ExtentMap;
use crate::inode::Inode;
use crate::read;
use crate::unicode::UnicodeCollation;

/// One on-disk directory record, name kept as raw bytes (spec.md §4.7:
/// "typically UTF-8 on modern systems, ASCII on older ones").
#[derive(Debug, Clone)]
pub struct RawDirent {
    pub inode: u32,
    pub rec_len: u16,
    #[allow(dead_code)] // kept for record-layout fidelity; length is re-derived from `name`
    pub name_len: u8,
    #[allow(dead_code)] // kept for record-layout fidelity; this engine doesn't discriminate by dirent file-type tag
    pub file_type: u8,
    pub name: Vec<u8>,
}

fn u32_at(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}

fn u16_at(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes(buf[off..off + 2].try_into().unwrap())
}

/// `IsValidDirent`: `rec_len` covers at least the fixed 8-byte prefix plus
/// the name, and is 4-byte aligned.
pub fn is_valid_dirent(rec_len: u16, name_len: u8) -> bool {
    rec_len >= name_len as u16 + 8 && rec_len.is_multiple_of(4)
}

/// Parses every record in one already-read directory block. A violation on
/// any record anywhere in the block is fatal to the whole scan (spec.md
/// §4.7).
pub fn scan_block(block: &[u8]) -> Result<Vec<RawDirent>> {
    let mut out = Vec::new();
    let mut off = 0usize;
    while off + 8 <= block.len() {
        let remaining = block.len() - off;
        let inode = u32_at(block, off);
        let rec_len = u16_at(block, off + 4);
        let name_len = block[off + 6];
        let file_type = block[off + 7];

        if name_len as usize > remaining || rec_len as usize > remaining {
            return Err(Ext4Error::VolumeCorrupted(
                "directory record exceeds remaining block bytes".into(),
            ));
        }
        if !is_valid_dirent(rec_len, name_len) {
            return Err(Ext4Error::VolumeCorrupted(format!(
                "invalid directory record: rec_len={rec_len} name_len={name_len}"
            )));
        }

        let name = block[off + 8..off + 8 + name_len as usize].to_vec();
        out.push(RawDirent {
            inode,
            rec_len,
            name_len,
            file_type,
            name,
        });
        off += rec_len as usize;
    }
    Ok(out)
}

/// `RetrieveDirent(dir_file, target_utf16_name)`.
pub fn retrieve_dirent(
    dev: &dyn DiskReader,
    block_size: u32,
    dir_inode: &Inode,
    map: &mut ExtentMap,
    collation: &dyn UnicodeCollation,
    target_utf16: &[u16],
) -> Result<RawDirent> {
    if !dir_inode.size.is_multiple_of(block_size as u64) {
        return Err(Ext4Error::VolumeCorrupted(
            "directory size is not a multiple of the block size".into(),
        ));
    }

    let num_blocks = dir_inode.size / block_size as u64;
    let mut buf = vec![0u8; block_size as usize];

    for blk_idx in 0..num_blocks {
        let n = read::read(dev, block_size, dir_inode, map, &mut buf, blk_idx * block_size as u64)?;
        let entries = scan_block(&buf[..n])?;
        for entry in entries {
            if entry.inode == 0 {
                continue;
            }
            let Ok(name) = String::from_utf8(entry.name.clone()) else {
                continue;
            };
            let utf16: Vec<u16> = name.encode_utf16().collect();
            if utf16.len() == target_utf16.len() && collation.stricmp(&utf16, target_utf16) == Ordering::Equal {
                return Ok(entry);
            }
        }
    }

    Err(Ext4Error::NotFound)
}

/// `ReadDir(dir_file, offset)`: the next non-"."/".."/unused record at or
/// after `offset`, plus the byte offset immediately past it. Returns
/// `Ok(None)` at end of directory. Composing the returned record into a
/// `FileInfo` (which requires opening the named inode) is the caller's job
/// — see [`crate::handle`].
pub fn read_dir_entry(
    dev: &dyn DiskReader,
    block_size: u32,
    dir_inode: &Inode,
    map: &mut ExtentMap,
    offset: u64,
) -> Result<Option<(RawDirent, u64)>> {
    if !dir_inode.size.is_multiple_of(block_size as u64) {
        return Err(Ext4Error::VolumeCorrupted(
            "directory size is not a multiple of the block size".into(),
        ));
    }

    let mut cur = offset;
    let mut buf = vec![0u8; block_size as usize];

    while cur < dir_inode.size {
        let block_start = (cur / block_size as u64) * block_size as u64;
        let n = read::read(dev, block_size, dir_inode, map, &mut buf, block_start)?;
        let entries = scan_block(&buf[..n])?;

        let mut pos = block_start;
        for entry in entries {
            let next = pos + entry.rec_len as u64;
            if pos < cur {
                pos = next;
                continue;
            }
            if entry.inode == 0 || entry.name == b"." || entry.name == b".." {
                cur = next;
                pos = next;
                continue;
            }
            return Ok(Some((entry, next)));
        }
        cur = block_start + block_size as u64;
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(inode: u32, name: &str, pad_to: u16) -> Vec<u8> {
        let mut rec = vec![0u8; 8 + name.len()];
        rec[0..4].copy_from_slice(&inode.to_le_bytes());
        rec[4..6].copy_from_slice(&pad_to.to_le_bytes());
        rec[6] = name.len() as u8;
        rec[7] = 1; // EXT4_FT_REG_FILE
        rec[8..].copy_from_slice(name.as_bytes());
        rec.resize(pad_to as usize, 0);
        rec
    }

    #[test]
    fn scenario_d_unused_slot_is_skipped() {
        let mut block = vec![0u8; 4096];
        let mut off = 0;
        for rec in [record(11, "first", 16), record(0, "", 40), record(12, "third", 4096 - 56)] {
            block[off..off + rec.len()].copy_from_slice(&rec);
            off += rec.len();
        }
        let entries = scan_block(&block).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].inode, 0);
        assert_eq!(entries[2].inode, 12);
        assert_eq!(entries[2].name, b"third");
    }

    #[test]
    fn invalid_rec_len_is_volume_corrupted() {
        let mut block = vec![0u8; 4096];
        block[4..6].copy_from_slice(&7u16.to_le_bytes()); // not a multiple of 4
        let err = scan_block(&block).unwrap_err();
        assert!(matches!(err, Ext4Error::VolumeCorrupted(_)));
    }
}
