//! Pathwalk & FileHandle: the mount context, handle arena, and `Open`
//! operation (spec.md §4.8).
//!
//! Per the "cyclic root handle ↔ partition reference" design note, handles
//! are addressed by index into the partition's handle arena rather than by
//! shared-ownership pointer (`Rc`/`Arc`) — the root handle's "back
//! reference" to its owning partition is simply that the partition is the
//! thing you call these methods on.

use log::{debug, trace};

use crate::constants::{EXT4_ROOT_INO, S_IRUSR, S_IWUSR};
use crate::device::DiskReader;
use crate::error::{Ext4Error, Result};
use crate::extent::ExtentMap;
use crate::group::BlockGroupTable;
use crate::inode::{self, Inode};
use crate::info::{FileInfo, FileKind, VolumeInfo};
use crate::path;
use crate::superblock::{self, Geometry};
use crate::structures::Ext4Superblock;
use crate::time::EpochToCalendar;
use crate::unicode::UnicodeCollation;
use crate::{dir, read};

pub const MODE_READ: u32 = 0x1;
pub const MODE_WRITE: u32 = 0x2;
pub const MODE_CREATE: u32 = 0x4;

pub type HandleId = usize;

#[derive(Debug, Clone)]
pub struct FileHandle {
    pub inode_num: u32,
    pub inode: Inode,
    pub position: u64,
    pub name: Vec<u16>,
    extent_map: ExtentMap,
}

/// The mount context (spec.md §3, "Partition"). Effectively immutable after
/// mount except for the handle arena and the one-shot `unmounting` flag.
pub struct Partition {
    dev: Box<dyn DiskReader>,
    sb: Ext4Superblock,
    geo: Geometry,
    groups: BlockGroupTable,
    collation: Box<dyn UnicodeCollation>,
    calendar: Box<dyn EpochToCalendar>,
    handles: Vec<Option<FileHandle>>,
    root: HandleId,
    unmounting: bool,
}

impl Partition {
    /// `Mount`: `OpenSuperblock` plus loading the group table and installing
    /// the root handle (spec.md §4.2 steps 12–14).
    pub fn mount(
        dev: Box<dyn DiskReader>,
        collation: Box<dyn UnicodeCollation>,
        calendar: Box<dyn EpochToCalendar>,
    ) -> Result<Self> {
        let (sb, geo) = superblock::open_superblock(dev.as_ref())?;
        let groups = BlockGroupTable::load(dev.as_ref(), &sb, &geo, geo.seed)?;
        let root_inode = inode::read_inode(dev.as_ref(), sb.metadata_csum(), geo.seed, &groups, &geo, EXT4_ROOT_INO)?;

        if !root_inode.is_dir() {
            return Err(Ext4Error::VolumeCorrupted("root inode is not a directory".into()));
        }

        let root_handle = FileHandle {
            inode_num: EXT4_ROOT_INO,
            inode: root_inode,
            position: 0,
            name: Vec::new(),
            extent_map: ExtentMap::new(),
        };

        debug!("mount complete, root inode installed");

        Ok(Partition {
            dev,
            sb,
            geo,
            groups,
            collation,
            calendar,
            handles: vec![Some(root_handle)],
            root: 0,
            unmounting: false,
        })
    }

    /// `Unmount`: frees every remaining handle including the root.
    pub fn unmount(mut self) {
        self.unmounting = true;
        let _ = self.close(self.root);
        for slot in self.handles.iter_mut() {
            *slot = None;
        }
    }

    /// `OpenVolume`: the root directory handle.
    pub fn root(&self) -> HandleId {
        self.root
    }

    pub fn read_only(&self) -> bool {
        self.geo.read_only
    }

    pub fn volume_info(&self) -> VolumeInfo {
        VolumeInfo::build(&self.sb, self.geo.read_only)
    }

    fn handle_ref(&self, id: HandleId) -> Result<&FileHandle> {
        self.handles
            .get(id)
            .and_then(|o| o.as_ref())
            .ok_or_else(|| Ext4Error::InvalidParameter("invalid or closed handle".into()))
    }

    fn alloc_handle(&mut self, fh: FileHandle) -> HandleId {
        for (i, slot) in self.handles.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(fh);
                return i;
            }
        }
        self.handles.push(Some(fh));
        self.handles.len() - 1
    }

    fn free_handle(&mut self, id: HandleId) {
        if let Some(mut fh) = self.handles.get_mut(id).and_then(|o| o.take()) {
            fh.extent_map.drain_all();
        }
    }

    /// `Open(base, pathname, mode)` (spec.md §4.8).
    pub fn open(&mut self, base: HandleId, pathname: &str, mode: u32) -> Result<HandleId> {
        if mode & MODE_CREATE != 0 {
            return Err(Ext4Error::Unsupported("create is not supported by this read-only core".into()));
        }

        let segments = path::split_segments(pathname)?;
        let mut current = if path::is_absolute(pathname) { self.root } else { base };
        let mut consumed_any = false;

        for seg in &segments {
            consumed_any = true;

            let (dir_inode_num, dir_is_dir, dir_inode) = {
                let h = self.handle_ref(current)?;
                (h.inode_num, h.inode.is_dir(), h.inode.clone())
            };
            if !dir_is_dir {
                return Err(Ext4Error::InvalidParameter(
                    "path segment opened against a non-directory handle".into(),
                ));
            }

            let target_utf16: Vec<u16> = seg.encode_utf16().collect();
            let entry = {
                let dev = self.dev.as_ref();
                let bs = self.geo.block_size;
                let collation = self.collation.as_ref();
                let extent_map = &mut self
                    .handles
                    .get_mut(current)
                    .and_then(|o| o.as_mut())
                    .ok_or_else(|| Ext4Error::InvalidParameter("invalid or closed handle".into()))?
                    .extent_map;
                dir::retrieve_dirent(dev, bs, &dir_inode, extent_map, collation, &target_utf16)?
            };

            if entry.inode == dir_inode_num {
                // Blocks ".." on the root (and any self-referencing entry).
                return Err(Ext4Error::NotFound);
            }

            let new_inode = inode::read_inode(
                self.dev.as_ref(),
                self.sb.metadata_csum(),
                self.geo.seed,
                &self.groups,
                &self.geo,
                entry.inode,
            )?;

            if FileKind::from_inode(&new_inode).is_none() {
                if current != self.root {
                    self.free_handle(current);
                }
                return Err(Ext4Error::AccessDenied(
                    "only regular files and directories can be opened".into(),
                ));
            }

            let new_handle = FileHandle {
                inode_num: entry.inode,
                inode: new_inode,
                position: 0,
                name: target_utf16,
                extent_map: ExtentMap::new(),
            };
            let new_id = self.alloc_handle(new_handle);

            if current != self.root {
                self.free_handle(current);
            }
            current = new_id;
        }

        if !consumed_any {
            let dup = self.handle_ref(current)?.clone();
            current = self.alloc_handle(dup);
        }

        let check_result = (|| {
            let h = self.handle_ref(current)?;
            if mode & MODE_READ != 0 && h.inode.mode & S_IRUSR == 0 {
                return Err(Ext4Error::AccessDenied("missing owner-read permission".into()));
            }
            if mode & MODE_WRITE != 0 && h.inode.mode & S_IWUSR == 0 {
                return Err(Ext4Error::AccessDenied("missing owner-write permission".into()));
            }
            Ok(())
        })();

        if let Err(e) = check_result {
            if current != self.root {
                self.free_handle(current);
            }
            return Err(e);
        }

        trace!("open: resolved '{pathname}' to handle {current}");
        Ok(current)
    }

    /// `Close(handle)` (spec.md §4.8.2).
    pub fn close(&mut self, id: HandleId) -> Result<()> {
        if id == self.root && !self.unmounting {
            return Ok(());
        }
        self.free_handle(id);
        Ok(())
    }

    /// `Read(handle, dst)` at the handle's current position, advancing it.
    pub fn read(&mut self, id: HandleId, dst: &mut [u8]) -> Result<usize> {
        let block_size = self.geo.block_size;
        let dev = self.dev.as_ref();
        let h = self
            .handles
            .get_mut(id)
            .and_then(|o| o.as_mut())
            .ok_or_else(|| Ext4Error::InvalidParameter("invalid or closed handle".into()))?;
        let n = read::read(dev, block_size, &h.inode, &mut h.extent_map, dst, h.position)?;
        h.position += n as u64;
        Ok(n)
    }

    /// `SetPosition` (spec.md §4.8.3).
    pub fn set_position(&mut self, id: HandleId, pos: u64) -> Result<()> {
        let h = self
            .handles
            .get_mut(id)
            .and_then(|o| o.as_mut())
            .ok_or_else(|| Ext4Error::InvalidParameter("invalid or closed handle".into()))?;
        if h.inode.is_dir() {
            if pos != 0 {
                return Err(Ext4Error::Unsupported(
                    "directories only support resetting position to 0".into(),
                ));
            }
            h.position = 0;
        } else {
            h.position = if pos == u64::MAX { h.inode.size } else { pos };
        }
        Ok(())
    }

    /// `GetPosition` (spec.md §4.8.3).
    pub fn get_position(&self, id: HandleId) -> Result<u64> {
        let h = self.handle_ref(id)?;
        if h.inode.is_dir() {
            return Err(Ext4Error::Unsupported("directories do not support GetPosition".into()));
        }
        Ok(h.position)
    }

    /// `ReadDir(dir_file, out_buf, offset)`: advances the handle's position
    /// past the returned record.
    pub fn read_dir(&mut self, id: HandleId) -> Result<Option<FileInfo>> {
        let (dir_inode, offset) = {
            let h = self.handle_ref(id)?;
            if !h.inode.is_dir() {
                return Err(Ext4Error::InvalidParameter("ReadDir on a non-directory handle".into()));
            }
            (h.inode.clone(), h.position)
        };

        let block_size = self.geo.block_size;
        let found = {
            let dev = self.dev.as_ref();
            let extent_map = &mut self
                .handles
                .get_mut(id)
                .and_then(|o| o.as_mut())
                .ok_or_else(|| Ext4Error::InvalidParameter("invalid or closed handle".into()))?
                .extent_map;
            dir::read_dir_entry(dev, block_size, &dir_inode, extent_map, offset)?
        };

        let Some((entry, next_offset)) = found else {
            return Ok(None);
        };

        if let Some(h) = self.handles.get_mut(id).and_then(|o| o.as_mut()) {
            h.position = next_offset;
        }

        let name = String::from_utf8_lossy(&entry.name).into_owned();
        let child_inode = inode::read_inode(
            self.dev.as_ref(),
            self.sb.metadata_csum(),
            self.geo.seed,
            &self.groups,
            &self.geo,
            entry.inode,
        )?;
        Ok(FileInfo::build(name, entry.inode, &child_inode, self.calendar.as_ref()))
    }

    /// `GetInfo` for a file handle.
    pub fn file_info(&self, id: HandleId) -> Result<Option<FileInfo>> {
        let h = self.handle_ref(id)?;
        let name = String::from_utf16_lossy(&h.name);
        Ok(FileInfo::build(name, h.inode_num, &h.inode, self.calendar.as_ref()))
    }
}
