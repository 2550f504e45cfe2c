//! ReadStream: maps a file offset+length into extent (or indirect-block)
//! reads, filling holes with zeros (spec.md §4.6).

use crate::blockmap;
use crate::device::{read_exact, DiskReader};
use crate::error::{Ext4Error, Result};
use crate::extent::{get_extent, ExtentMap};
use crate::inode::Inode;

/// `Read(file, dst, offset, length)`. `dst.len()` is the requested length;
/// returns the number of bytes actually produced.
pub fn read(
    dev: &dyn DiskReader,
    block_size: u32,
    inode: &Inode,
    map: &mut ExtentMap,
    dst: &mut [u8],
    offset: u64,
) -> Result<usize> {
    if offset > inode.size {
        return Err(Ext4Error::DeviceError(format!(
            "read offset {offset} beyond inode size {}",
            inode.size
        )));
    }

    let capped_len = (dst.len() as u64).min(inode.size - offset) as usize;
    let mut remaining = capped_len;
    let mut pos = 0usize;
    let mut cur_offset = offset;

    while remaining > 0 {
        let block = cur_offset / block_size as u64;
        let offset_in_block = cur_offset % block_size as u64;

        let n = if inode.uses_extents() {
            match get_extent(dev, block_size, &inode.i_block, map, block) {
                Ok(extent) => {
                    let physical_start = extent.start_block() * block_size as u64;
                    let extent_byte_length = extent.len() as u64 * block_size as u64;
                    let extent_logical_start = extent.ee_block as u64 * block_size as u64;
                    let extent_offset = cur_offset - extent_logical_start;
                    let may_read = extent_byte_length - extent_offset;
                    let n = may_read.min(remaining as u64) as usize;
                    let bytes = read_exact(dev, physical_start + extent_offset, n)?;
                    dst[pos..pos + n].copy_from_slice(&bytes);
                    n
                }
                Err(Ext4Error::NoMapping) => {
                    let n = ((block_size as u64 - offset_in_block).min(remaining as u64)) as usize;
                    dst[pos..pos + n].fill(0);
                    n
                }
                Err(e) => return Err(e),
            }
        } else {
            match blockmap::get_block(dev, block_size, &inode.i_block, block)? {
                Some(phys_block) => {
                    let n = ((block_size as u64 - offset_in_block).min(remaining as u64)) as usize;
                    let physical_start = phys_block * block_size as u64 + offset_in_block;
                    let bytes = read_exact(dev, physical_start, n)?;
                    dst[pos..pos + n].copy_from_slice(&bytes);
                    n
                }
                None => {
                    let n = ((block_size as u64 - offset_in_block).min(remaining as u64)) as usize;
                    dst[pos..pos + n].fill(0);
                    n
                }
            }
        };

        pos += n;
        cur_offset += n as u64;
        remaining -= n;
    }

    Ok(capped_len)
}
