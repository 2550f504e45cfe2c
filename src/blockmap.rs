//! Indirect-block data mapping for ext2/ext3 inodes that do not carry
//! `EXT4_EXTENTS_FL` (SPEC_FULL.md "Supplemented features"). The classic
//! 12-direct-plus-single/double/triple-indirect scheme, read-only.
//!
//! Grounded on the teacher's `reader/mod.rs::get_inode_blocks`, which
//! handles only the first 12 direct pointers and leaves indirect blocks as
//! a TODO; this generalizes that TODO into the full three-level scheme.

use crate::device::{read_exact, DiskReader};
use crate::error::Result;

const DIRECT_COUNT: u64 = 12;

fn u32_at(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}

/// Reads the `idx`-th `u32` block-pointer stored in on-disk block
/// `block_num`. A `block_num` of zero denotes an unallocated (hole) block
/// whose whole subtree is absent, in which case every pointer it "contains"
/// is implicitly zero.
fn read_ptr(dev: &dyn DiskReader, block_size: u32, block_num: u32, idx: u64) -> Result<u32> {
    if block_num == 0 {
        return Ok(0);
    }
    let ptr_offset = block_num as u64 * block_size as u64 + idx * 4;
    let bytes = read_exact(dev, ptr_offset, 4)?;
    Ok(u32_at(&bytes, 0))
}

/// Resolves a logical block number to a physical block number for a
/// non-extent inode. Returns `Ok(None)` for a hole (an unallocated
/// pointer), mirroring the extent engine's `NoMapping` case one level up
/// in `ReadStream`.
pub fn get_block(
    dev: &dyn DiskReader,
    block_size: u32,
    i_block: &[u8; 60],
    logical_block: u64,
) -> Result<Option<u64>> {
    let ptrs_per_block = block_size as u64 / 4;

    if logical_block < DIRECT_COUNT {
        let ptr = u32_at(i_block, logical_block as usize * 4);
        return Ok(non_zero(ptr));
    }

    let mut lb = logical_block - DIRECT_COUNT;
    if lb < ptrs_per_block {
        let indirect = u32_at(i_block, 12 * 4);
        let ptr = read_ptr(dev, block_size, indirect, lb)?;
        return Ok(non_zero(ptr));
    }

    lb -= ptrs_per_block;
    let double_span = ptrs_per_block * ptrs_per_block;
    if lb < double_span {
        let double = u32_at(i_block, 13 * 4);
        let outer = lb / ptrs_per_block;
        let inner = lb % ptrs_per_block;
        let indirect = read_ptr(dev, block_size, double, outer)?;
        let ptr = read_ptr(dev, block_size, indirect, inner)?;
        return Ok(non_zero(ptr));
    }

    lb -= double_span;
    let triple_span = double_span * ptrs_per_block;
    if lb < triple_span {
        let triple = u32_at(i_block, 14 * 4);
        let outer = lb / double_span;
        let rem = lb % double_span;
        let middle = rem / ptrs_per_block;
        let inner = rem % ptrs_per_block;
        let double = read_ptr(dev, block_size, triple, outer)?;
        let indirect = read_ptr(dev, block_size, double, middle)?;
        let ptr = read_ptr(dev, block_size, indirect, inner)?;
        return Ok(non_zero(ptr));
    }

    // Beyond the maximum file size representable by the triple-indirect
    // scheme: treat as a hole rather than erroring, consistent with
    // ReadStream's clamp on offset against the inode's own recorded size.
    Ok(None)
}

fn non_zero(ptr: u32) -> Option<u64> {
    if ptr == 0 {
        None
    } else {
        Some(ptr as u64)
    }
}
