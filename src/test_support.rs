//! In-memory `DiskReader` used by unit tests across the crate (SPEC_FULL.md
//! "Test tooling"). Grounded on the teacher's practice of testing against a
//! `Vec<u8>`-backed fake device rather than a real block device.
//!
//! End-to-end image assembly (a full superblock/GDT/inode-table image
//! exercised through the public API) lives in `tests/integration.rs`
//! instead of here, since it only needs `MemDisk` plus public crate types.

#![cfg(test)]

use std::sync::Mutex;

use crate::device::DiskReader;
use crate::error::{Ext4Error, Result};

pub struct MemDisk {
    image: Mutex<Vec<u8>>,
}

impl MemDisk {
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            image: Mutex::new(image),
        }
    }
}

impl DiskReader for MemDisk {
    fn read(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let image = self.image.lock().unwrap();
        let start = offset as usize;
        let end = start
            .checked_add(length)
            .ok_or_else(|| Ext4Error::DeviceError("offset overflow".into()))?;
        if end > image.len() {
            return Err(Ext4Error::DeviceError(format!(
                "read past end of device: {end} > {}",
                image.len()
            )));
        }
        Ok(image[start..end].to_vec())
    }
}

