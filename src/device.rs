//! The block-device read primitive. Out of scope per spec.md §1 — this is
//! the seam the host environment plugs into; the core only ever calls
//! `DiskReader::read`.

use crate::error::{Ext4Error, Result};

/// Byte-addressable, random-access read side of the backing block device.
///
/// Implementations are expected to be synchronous and to return bytes that
/// are consistent for offsets the caller has not been told have changed
/// (spec.md §5, "Disk ordering"). This driver never calls anything but
/// `read`.
pub trait DiskReader {
    fn read(&self, offset: u64, length: usize) -> Result<Vec<u8>>;
}

/// Reads exactly `length` bytes at `offset`, propagating device errors
/// unchanged (spec.md §6).
pub(crate) fn read_exact(dev: &dyn DiskReader, offset: u64, length: usize) -> Result<Vec<u8>> {
    let buf = dev.read(offset, length)?;
    if buf.len() != length {
        return Err(Ext4Error::DeviceError(format!(
            "short read: requested {length} bytes at {offset}, got {}",
            buf.len()
        )));
    }
    Ok(buf)
}
