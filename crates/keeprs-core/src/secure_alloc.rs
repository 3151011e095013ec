//! Zero-on-free allocation for buffers holding secrets.
//!
//! Blocks handed out on the secure path carry a small header in front of the
//! user data recording a sentinel and the requested size. Releasing such a
//! block wipes exactly that many bytes before the memory goes back to the
//! global allocator. Blocks from the insecure path are a plain pass-through.

use std::alloc::{self, Layout};
use std::mem;
use std::ptr::NonNull;

use zeroize::Zeroize;

/// Sentinel stored in the header of every secure block.
pub const MAGIC_NUMBER: usize = 384_723_333;

/// Header written immediately before the user data of a secure block.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct AllocHeader {
    magic: usize,
    size: usize,
}

/// Alignment every secure block is at least allocated with.
const HEADER_ALIGN: usize = 16;

/// Which allocation strategy a caller wants for a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocPath {
    /// Header + zero-on-free.
    #[default]
    Secure,
    /// No header, no zeroing.
    Insecure,
}

/// Stateless allocator with a secure and an insecure path.
///
/// There is no shared mutable state, so one value can be used from any number
/// of threads without coordination.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecureAllocator;

impl SecureAllocator {
    /// Offset of the user data from the start of the underlying block.
    fn data_offset(align: usize) -> usize {
        mem::size_of::<AllocHeader>().max(align).max(HEADER_ALIGN)
    }

    /// Layout of the whole underlying block for a secure allocation.
    fn block_layout(layout: Layout) -> Layout {
        let offset = Self::data_offset(layout.align());
        let size = layout
            .size()
            .checked_add(offset)
            .expect("secure allocation size overflow");
        Layout::from_size_align(size, layout.align().max(HEADER_ALIGN))
            .expect("secure allocation layout")
    }

    /// Allocate a block for `layout` on the requested path.
    ///
    /// Aborts through [`alloc::handle_alloc_error`] when the global allocator
    /// is out of memory. Zero-sized layouts are a caller bug.
    pub fn allocate(&self, layout: Layout, path: AllocPath) -> NonNull<u8> {
        assert!(layout.size() > 0, "zero-sized allocation requested");

        match path {
            AllocPath::Insecure => {
                // SAFETY: the layout has a non-zero size.
                let ptr = unsafe { alloc::alloc(layout) };
                NonNull::new(ptr).unwrap_or_else(|| alloc::handle_alloc_error(layout))
            }
            AllocPath::Secure => {
                let block = Self::block_layout(layout);
                // SAFETY: the block layout is at least one header long.
                let base = unsafe { alloc::alloc(block) };
                if base.is_null() {
                    alloc::handle_alloc_error(block);
                }
                let offset = Self::data_offset(layout.align());
                // SAFETY: `offset` is within the block and leaves room for the
                // header right in front of it; alignment of the header slot
                // follows from `offset` and the block being HEADER_ALIGN aligned.
                unsafe {
                    let data = base.add(offset);
                    let header = data.sub(mem::size_of::<AllocHeader>()).cast::<AllocHeader>();
                    header.write(AllocHeader {
                        magic: MAGIC_NUMBER,
                        size: layout.size(),
                    });
                    NonNull::new_unchecked(data)
                }
            }
        }
    }

    /// Release a block through the secure path.
    ///
    /// If the header carries the sentinel, the recorded number of bytes is
    /// wiped first. Otherwise the block is released as-is with `layout`.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`SecureAllocator::allocate`] with the
    /// same `layout` and must not be used afterwards. For blocks that did not
    /// come from the secure path, the header-sized range in front of `ptr` is
    /// read to look for the sentinel and must therefore be readable.
    pub unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded caller contract.
        match unsafe { Self::scrub(ptr, layout) } {
            Some((base, block)) => {
                // SAFETY: `base`/`block` describe the block allocated in `allocate`.
                unsafe { alloc::dealloc(base.as_ptr(), block) };
            }
            None => {
                tracing::trace!(size = layout.size(), "secure header missing, releasing without wipe");
                // SAFETY: the block came from the insecure path with `layout`.
                unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
            }
        }
    }

    /// Release a block obtained from the insecure path. No wiping happens.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate(layout, AllocPath::Insecure)`.
    pub unsafe fn deallocate_insecure(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded caller contract.
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
    }

    /// Wipe a secure block and return the underlying allocation, or `None`
    /// when the header does not carry the sentinel.
    ///
    /// The memory stays allocated; the caller releases it with the returned
    /// pointer and layout.
    ///
    /// # Safety
    ///
    /// Same contract as [`SecureAllocator::deallocate`].
    pub(crate) unsafe fn scrub(ptr: NonNull<u8>, layout: Layout) -> Option<(NonNull<u8>, Layout)> {
        let data = ptr.as_ptr();
        // SAFETY: the caller guarantees the header slot is readable.
        let header = unsafe {
            data.sub(mem::size_of::<AllocHeader>())
                .cast::<AllocHeader>()
                .read()
        };
        if header.magic != MAGIC_NUMBER {
            return None;
        }

        // SAFETY: the header says `size` bytes of user data follow `data`.
        let bytes = unsafe { std::slice::from_raw_parts_mut(data, header.size) };
        bytes.zeroize();

        // Clear the sentinel too so a stale pointer is never taken for a live block.
        // SAFETY: same header slot as read above.
        unsafe {
            data.sub(mem::size_of::<AllocHeader>())
                .cast::<AllocHeader>()
                .write(AllocHeader { magic: 0, size: 0 });
        }

        let offset = Self::data_offset(layout.align());
        // SAFETY: `data` was produced as `base + offset` in `allocate`.
        let base = unsafe { NonNull::new_unchecked(data.sub(offset)) };
        Some((base, Self::block_layout(layout)))
    }
}
