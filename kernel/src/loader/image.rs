/*!
 * Program Images
 *
 * An image is a list of segments plus the user code that runs at its entry
 * point. Loading defines one region per segment, backs it with frames, copies
 * the initialized bytes in and maps the code at the entry address.
 */

use crate::core::limits::{PAGE_SIZE, USERSPACE_TOP, USER_DATA_BASE, USER_TEXT_BASE};
use crate::core::types::{Address, Size};
use crate::memory::{AddressSpace, MemoryError, Protection};
use crate::thread::UserText;
use thiserror::Error;

pub type LoaderResult<T> = Result<T, LoaderError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoaderError {
    #[error("No such program: {0}")]
    NotFound(String),

    #[error("Invalid program image: {0}")]
    InvalidImage(String),

    #[error("Loading failed: {0}")]
    Memory(#[from] MemoryError),
}

/// One loadable segment
#[derive(Debug, Clone)]
pub struct Segment {
    pub vaddr: Address,
    /// Size in memory; bytes past `data` are zero-filled
    pub mem_size: Size,
    pub data: Vec<u8>,
    pub prot: Protection,
}

impl Segment {
    fn page_span(&self) -> (Address, Address) {
        let start = self.vaddr - self.vaddr % PAGE_SIZE;
        let end = (self.vaddr + self.mem_size).div_ceil(PAGE_SIZE) * PAGE_SIZE;
        (start, end)
    }
}

/// An executable program
#[derive(Clone)]
pub struct ProgramImage {
    name: String,
    segments: Vec<Segment>,
    entry: Address,
    text: UserText,
}

impl ProgramImage {
    pub fn builder(name: impl Into<String>, text: UserText) -> ProgramImageBuilder {
        ProgramImageBuilder {
            name: name.into(),
            segments: Vec::new(),
            entry: None,
            text,
        }
    }

    /// One page of text at `USER_TEXT_BASE` and one page of data at `USER_DATA_BASE`
    pub fn simple(name: impl Into<String>, text: UserText) -> Self {
        Self::builder(name, text)
            .text_segment(USER_TEXT_BASE, PAGE_SIZE)
            .data_segment(USER_DATA_BASE, Vec::new(), PAGE_SIZE)
            .build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn entry(&self) -> Address {
        self.entry
    }

    /// Check the image can be loaded into an empty address space
    pub fn validate(&self) -> LoaderResult<()> {
        let invalid = |reason: String| Err(LoaderError::InvalidImage(reason));

        if self.segments.is_empty() {
            return invalid(format!("{}: no segments", self.name));
        }

        for (i, seg) in self.segments.iter().enumerate() {
            if seg.mem_size == 0 || seg.data.len() > seg.mem_size {
                return invalid(format!("{}: segment {} has bad size", self.name, i));
            }
            let in_user_space = seg.vaddr >= PAGE_SIZE
                && seg
                    .vaddr
                    .checked_add(seg.mem_size)
                    .is_some_and(|end| end <= USERSPACE_TOP);
            if !in_user_space {
                return invalid(format!(
                    "{}: segment {} at 0x{:x} leaves user space",
                    self.name, i, seg.vaddr
                ));
            }
        }

        // Regions are page granular, so overlap is checked on page spans
        for (i, a) in self.segments.iter().enumerate() {
            let (a_start, a_end) = a.page_span();
            for b in &self.segments[i + 1..] {
                let (b_start, b_end) = b.page_span();
                if a_start < b_end && b_start < a_end {
                    return invalid(format!("{}: overlapping segments", self.name));
                }
            }
        }

        let entry_ok = self.segments.iter().any(|seg| {
            seg.prot.executable && (seg.vaddr..seg.vaddr + seg.mem_size).contains(&self.entry)
        });
        if !entry_ok {
            return invalid(format!(
                "{}: entry 0x{:x} is not in an executable segment",
                self.name, self.entry
            ));
        }

        Ok(())
    }

    /// Load into `space`, returning the entry point (load_elf)
    pub fn load_into(&self, space: &mut AddressSpace) -> LoaderResult<Address> {
        for seg in &self.segments {
            space.define_region(seg.vaddr, seg.mem_size, seg.prot)?;
        }
        space.prepare_load()?;
        for seg in self.segments.iter().filter(|seg| !seg.data.is_empty()) {
            space.poke(seg.vaddr, &seg.data)?;
        }
        space.install_entry(self.entry, self.text.clone());
        Ok(self.entry)
    }
}

impl std::fmt::Debug for ProgramImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramImage")
            .field("name", &self.name)
            .field("segments", &self.segments)
            .field("entry", &format_args!("0x{:x}", self.entry))
            .finish_non_exhaustive()
    }
}

/// Builder for [`ProgramImage`]
pub struct ProgramImageBuilder {
    name: String,
    segments: Vec<Segment>,
    entry: Option<Address>,
    text: UserText,
}

impl ProgramImageBuilder {
    /// Add a read/execute segment; the first one also becomes the entry unless set
    pub fn text_segment(mut self, vaddr: Address, size: Size) -> Self {
        self.entry.get_or_insert(vaddr);
        self.segments.push(Segment {
            vaddr,
            mem_size: size,
            data: Vec::new(),
            prot: Protection::READ_EXEC,
        });
        self
    }

    /// Add a read/write segment initialized with `data`
    pub fn data_segment(mut self, vaddr: Address, data: Vec<u8>, mem_size: Size) -> Self {
        self.segments.push(Segment {
            vaddr,
            mem_size,
            data,
            prot: Protection::READ_WRITE,
        });
        self
    }

    pub fn entry(mut self, entry: Address) -> Self {
        self.entry = Some(entry);
        self
    }

    /// Assemble the image; validation is deferred to exec
    pub fn build(self) -> ProgramImage {
        ProgramImage {
            name: self.name,
            segments: self.segments,
            entry: self.entry.unwrap_or(0),
            text: self.text,
        }
    }
}
