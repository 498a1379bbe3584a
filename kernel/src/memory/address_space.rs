/*!
 * Address Spaces
 *
 * Paged user address space: a list of regions, a sparse page map and the code
 * routines mapped into executable regions. Every backed page is charged to the
 * shared [`FramePool`]; the frames go back to the pool when the address space
 * is dropped.
 *
 * # Layout
 *
 * - Page 0 is never mapped so NULL dereferences fault
 * - Everything at or above `USERSPACE_TOP` belongs to the kernel
 * - The stack occupies `stack_pages` pages directly below `USERSTACK`
 */

use super::frames::FramePool;
use super::types::{MemoryError, MemoryResult};
use crate::core::limits::{ADDRESS_SPACE_ROOT_FRAMES, PAGE_SIZE, USERSPACE_TOP, USERSTACK};
use crate::core::types::{Address, Size};
use crate::thread::UserText;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

static NEXT_SPACE_ID: AtomicU64 = AtomicU64::new(1);

/// Access rights of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protection {
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
}

impl Protection {
    pub const READ_ONLY: Self = Self {
        readable: true,
        writable: false,
        executable: false,
    };

    pub const READ_WRITE: Self = Self {
        readable: true,
        writable: true,
        executable: false,
    };

    pub const READ_EXEC: Self = Self {
        readable: true,
        writable: false,
        executable: true,
    };
}

#[derive(Debug, Clone)]
struct Region {
    base: Address,
    pages: usize,
    prot: Protection,
}

impl Region {
    #[inline]
    fn end(&self) -> Address {
        self.base + self.pages * PAGE_SIZE
    }

    #[inline]
    fn contains(&self, addr: Address) -> bool {
        (self.base..self.end()).contains(&addr)
    }

    fn vpns(&self) -> impl Iterator<Item = usize> {
        let first = self.base / PAGE_SIZE;
        first..first + self.pages
    }
}

/// A process's memory image
pub struct AddressSpace {
    id: u64,
    frames: FramePool,
    held: usize,
    regions: Vec<Region>,
    pages: BTreeMap<usize, Box<[u8]>>,
    text: BTreeMap<Address, UserText>,
    entry: Option<Address>,
    stack_pages: usize,
    active: bool,
}

impl AddressSpace {
    /// Create an empty address space (as_create)
    pub fn create(frames: &FramePool, stack_pages: usize) -> MemoryResult<Self> {
        frames.allocate(ADDRESS_SPACE_ROOT_FRAMES)?;
        let space = Self {
            id: NEXT_SPACE_ID.fetch_add(1, Ordering::Relaxed),
            frames: frames.clone(),
            held: ADDRESS_SPACE_ROOT_FRAMES,
            regions: Vec::new(),
            pages: BTreeMap::new(),
            text: BTreeMap::new(),
            entry: None,
            stack_pages,
            active: false,
        };
        trace!(space = space.id, "address space created");
        Ok(space)
    }

    /// Duplicate this address space page by page (as_copy)
    ///
    /// The copy is charged for as many frames as the original holds and is
    /// returned inactive.
    pub fn copy(&self) -> MemoryResult<Self> {
        self.frames.allocate(self.held)?;
        let copy = Self {
            id: NEXT_SPACE_ID.fetch_add(1, Ordering::Relaxed),
            frames: self.frames.clone(),
            held: self.held,
            regions: self.regions.clone(),
            pages: self.pages.clone(),
            text: self.text.clone(),
            entry: self.entry,
            stack_pages: self.stack_pages,
            active: false,
        };
        debug!(from = self.id, to = copy.id, frames = copy.held, "address space copied");
        Ok(copy)
    }

    /// Unique identifier, for diagnostics
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Frames currently charged to this address space
    #[inline]
    pub fn resident_frames(&self) -> usize {
        self.held
    }

    /// Declare a region; it is backed by [`AddressSpace::prepare_load`]
    pub fn define_region(&mut self, vaddr: Address, size: Size, prot: Protection) -> MemoryResult<()> {
        let bad = MemoryError::BadRegion { base: vaddr, size };
        let base = vaddr - vaddr % PAGE_SIZE;
        let end = vaddr
            .checked_add(size)
            .and_then(|end| end.checked_next_multiple_of(PAGE_SIZE))
            .ok_or_else(|| bad.clone())?;

        if size == 0 || base < PAGE_SIZE || end > USERSPACE_TOP {
            return Err(bad);
        }
        if self
            .regions
            .iter()
            .any(|r| base < r.end() && r.base < end)
        {
            return Err(bad);
        }

        self.regions.push(Region {
            base,
            pages: (end - base) / PAGE_SIZE,
            prot,
        });
        Ok(())
    }

    /// Back every defined region with zero-filled frames (as_prepare_load)
    pub fn prepare_load(&mut self) -> MemoryResult<()> {
        let missing: Vec<usize> = self
            .regions
            .iter()
            .flat_map(Region::vpns)
            .filter(|vpn| !self.pages.contains_key(vpn))
            .collect();

        self.frames.allocate(missing.len())?;
        self.held += missing.len();
        for vpn in missing {
            self.pages.insert(vpn, vec![0u8; PAGE_SIZE].into_boxed_slice());
        }
        Ok(())
    }

    /// Define and back the user stack, returning the initial stack pointer (as_define_stack)
    pub fn define_stack(&mut self) -> MemoryResult<Address> {
        let size = self.stack_pages * PAGE_SIZE;
        self.define_region(USERSTACK - size, size, Protection::READ_WRITE)?;
        self.prepare_load()?;
        Ok(USERSTACK)
    }

    /// Map the program's code at its entry point
    pub fn install_entry(&mut self, entry: Address, text: UserText) {
        self.text.insert(entry, text);
        self.entry = Some(entry);
    }

    /// Entry point of the loaded program, if any
    #[inline]
    pub fn entry(&self) -> Option<Address> {
        self.entry
    }

    /// Code to run when resuming at `addr`
    ///
    /// Resume addresses past a routine's base resolve to that routine; the
    /// routine itself must start inside an executable region.
    pub fn text_at(&self, addr: Address) -> Option<UserText> {
        let (&base, text) = self.text.range(..=addr).next_back()?;
        self.region_of(base)
            .filter(|r| r.prot.executable)
            .map(|_| Arc::clone(text))
    }

    /// Make this the address space the current CPU translates through (as_activate)
    pub fn activate(&mut self) {
        self.active = true;
        trace!(space = self.id, "address space activated");
    }

    /// Stop translating through this address space (as_deactivate)
    pub fn deactivate(&mut self) {
        self.active = false;
        trace!(space = self.id, "address space deactivated");
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Tear down the address space and return its frames (as_destroy)
    pub fn destroy(self) {
        debug_assert!(!self.active, "destroying the active address space");
        debug!(space = self.id, frames = self.held, "address space destroyed");
        drop(self);
    }

    /// User-mode load
    pub fn read(&self, addr: Address, buf: &mut [u8]) -> MemoryResult<()> {
        self.check_range(addr, buf.len(), false)?;
        let mut done = 0;
        while done < buf.len() {
            let cursor = addr + done;
            let offset = cursor % PAGE_SIZE;
            let n = (PAGE_SIZE - offset).min(buf.len() - done);
            let page = self
                .pages
                .get(&(cursor / PAGE_SIZE))
                .ok_or(MemoryError::InvalidAddress(cursor))?;
            buf[done..done + n].copy_from_slice(&page[offset..offset + n]);
            done += n;
        }
        Ok(())
    }

    /// User-mode store; honours region protection
    pub fn write(&mut self, addr: Address, bytes: &[u8]) -> MemoryResult<()> {
        self.check_range(addr, bytes.len(), true)?;
        self.store(addr, bytes)
    }

    /// Loader store; ignores write protection so text can be filled in
    pub(crate) fn poke(&mut self, addr: Address, bytes: &[u8]) -> MemoryResult<()> {
        self.check_range(addr, bytes.len(), false)?;
        self.store(addr, bytes)
    }

    /// Whether `len` bytes at `addr` are mapped, backed and writable
    pub fn is_writable(&self, addr: Address, len: usize) -> bool {
        self.check_range(addr, len, true).is_ok()
    }

    fn store(&mut self, addr: Address, bytes: &[u8]) -> MemoryResult<()> {
        let mut done = 0;
        while done < bytes.len() {
            let cursor = addr + done;
            let offset = cursor % PAGE_SIZE;
            let n = (PAGE_SIZE - offset).min(bytes.len() - done);
            let page = self
                .pages
                .get_mut(&(cursor / PAGE_SIZE))
                .ok_or(MemoryError::InvalidAddress(cursor))?;
            page[offset..offset + n].copy_from_slice(&bytes[done..done + n]);
            done += n;
        }
        Ok(())
    }

    fn region_of(&self, addr: Address) -> Option<&Region> {
        self.regions.iter().find(|r| r.contains(addr))
    }

    fn check_range(&self, addr: Address, len: usize, write: bool) -> MemoryResult<()> {
        if len == 0 {
            return Ok(());
        }
        let end = addr
            .checked_add(len)
            .filter(|&end| end <= USERSPACE_TOP)
            .ok_or(MemoryError::InvalidAddress(addr))?;

        for vpn in addr / PAGE_SIZE..=(end - 1) / PAGE_SIZE {
            let at = (vpn * PAGE_SIZE).max(addr);
            let region = self
                .region_of(at)
                .filter(|_| self.pages.contains_key(&vpn))
                .ok_or(MemoryError::InvalidAddress(at))?;
            if write && !region.prot.writable {
                return Err(MemoryError::ProtectionViolation(at));
            }
        }
        Ok(())
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        self.frames.release(self.held);
    }
}

impl std::fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressSpace")
            .field("id", &self.id)
            .field("held", &self.held)
            .field("regions", &self.regions)
            .field("entry", &self.entry)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}
