//! A read-only ext2/ext3/ext4 metadata engine for pre-boot firmware
//! embedding: mount a volume over a caller-supplied [`DiskReader`], walk
//! paths, list directories, and stream file contents, without ever writing
//! to the backing device.
//!
//! The public surface mirrors the firmware file-protocol shape this crate
//! targets: [`Partition::mount`] then [`Partition::open`]/[`Partition::read`]/
//! [`Partition::read_dir`]/[`Partition::close`], finishing with
//! [`Partition::unmount`].

mod blockmap;
mod checksum;
mod constants;
mod device;
mod dir;
mod error;
mod extent;
mod group;
mod handle;
mod info;
mod inode;
mod path;
mod read;
mod structures;
mod superblock;
#[cfg(test)]
mod test_support;
mod time;
mod unicode;

pub use device::DiskReader;
pub use error::{Ext4Error, Result};
pub use handle::{HandleId, Partition, MODE_CREATE, MODE_READ, MODE_WRITE};
pub use info::{ExtVersion, FileInfo, FileKind, VolumeInfo};
pub use time::{Calendar, EpochToCalendar, SimpleCalendar};
pub use unicode::{SimpleCollation, UnicodeCollation};
