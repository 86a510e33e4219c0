//! Guest memory image.
//!
//! The real-mode address space visible to the virtual CPU. The image is
//! fixed-size for its whole lifetime and is aliased, not copied, into the
//! virtualization backend; the same bytes the guest executes are the bytes
//! these accessors touch. All accesses are bounds-checked.

use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

/// Compute the linear address of a real-mode `segment:offset` pair.
pub fn linear(segment: u16, offset: u16) -> u64 {
    (u64::from(segment) << 4) + u64::from(offset)
}

enum Image {
    Owned(Box<[u8]>),
    Raw { ptr: *mut u8, len: usize },
}

// Safety: the Raw variant aliases a host buffer that the caller guarantees
// outlives this image (see GuestMemory::from_raw); all access goes through
// the enclosing mutex.
unsafe impl Send for Image {}

impl Image {
    fn len(&self) -> usize {
        match self {
            Image::Owned(buf) => buf.len(),
            Image::Raw { len, .. } => *len,
        }
    }

    fn as_slice(&self) -> &[u8] {
        match self {
            Image::Owned(buf) => buf,
            Image::Raw { ptr, len } => unsafe {
                std::slice::from_raw_parts(*ptr, *len)
            },
        }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            Image::Owned(buf) => buf,
            Image::Raw { ptr, len } => unsafe {
                std::slice::from_raw_parts_mut(*ptr, *len)
            },
        }
    }
}

/// Handle to the guest memory image.
///
/// Cheap to clone; clones refer to the same bytes, so the host loop can
/// load a program image while the kernel handle holds its own reference.
#[derive(Clone)]
pub struct GuestMemory {
    inner: Arc<Mutex<Image>>,
}

impl GuestMemory {
    /// Allocate a zero-filled image of `size` bytes.
    pub fn alloc(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidMemorySize(size));
        }
        Ok(Self {
            inner: Arc::new(Mutex::new(Image::Owned(
                vec![0u8; size].into_boxed_slice(),
            ))),
        })
    }

    /// Alias a host-provided buffer as the guest image.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes for the
    /// lifetime of the returned handle and all of its clones, and must not
    /// be accessed concurrently from other threads while the guest runs.
    pub unsafe fn from_raw(ptr: *mut u8, len: usize) -> Result<Self> {
        if ptr.is_null() || len == 0 {
            return Err(Error::InvalidMemorySize(len));
        }
        Ok(Self {
            inner: Arc::new(Mutex::new(Image::Raw { ptr, len })),
        })
    }

    /// Size of the image in bytes. Never changes after construction.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read one byte at a linear address.
    pub fn read_u8(&self, addr: u64) -> Result<u8> {
        let image = self.inner.lock().unwrap();
        let start = check_range(addr, 1, image.len())?;
        Ok(image.as_slice()[start])
    }

    /// Write one byte at a linear address.
    pub fn write_u8(&self, addr: u64, value: u8) -> Result<()> {
        let mut image = self.inner.lock().unwrap();
        let start = check_range(addr, 1, image.len())?;
        image.as_mut_slice()[start] = value;
        Ok(())
    }

    /// Fill `buf` from guest memory starting at a linear address.
    pub fn read_bytes(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let image = self.inner.lock().unwrap();
        let start = check_range(addr, buf.len(), image.len())?;
        buf.copy_from_slice(&image.as_slice()[start..start + buf.len()]);
        Ok(())
    }

    /// Copy `data` into guest memory starting at a linear address.
    pub fn write_bytes(&self, addr: u64, data: &[u8]) -> Result<()> {
        let mut image = self.inner.lock().unwrap();
        let start = check_range(addr, data.len(), image.len())?;
        image.as_mut_slice()[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Read bytes starting at `addr` up to (not including) `terminator`.
    ///
    /// Stops after `max` bytes if no terminator is found within the image.
    pub fn read_until(&self, addr: u64, terminator: u8, max: usize) -> Result<Vec<u8>> {
        let image = self.inner.lock().unwrap();
        let start = check_range(addr, 1, image.len())?;
        let slice = image.as_slice();
        let mut out = Vec::new();
        for &byte in slice[start..].iter().take(max) {
            if byte == terminator {
                break;
            }
            out.push(byte);
        }
        Ok(out)
    }
}

fn check_range(addr: u64, count: usize, len: usize) -> Result<usize> {
    let start = usize::try_from(addr).map_err(|_| Error::InvalidGuestAddress(addr))?;
    let end = start
        .checked_add(count)
        .ok_or(Error::InvalidGuestAddress(addr))?;
    if end > len {
        return Err(Error::InvalidGuestAddress(addr));
    }
    Ok(start)
}
