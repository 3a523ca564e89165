//! `tickshaper-mmap`: POSIX shared-memory segments for the tick ring.
//!
//! Wraps `shm_open` + `mmap` (via `memmap2`) behind an owned handle. The
//! creating side picks a unique segment name and unlinks it on drop; external
//! consumers open the same name read-write and never unlink.

use memmap2::MmapMut;
use rand::Rng;
use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::fd::FromRawFd;

#[derive(Debug, thiserror::Error)]
pub enum ShmError {
    #[error("segment name '{0}' contains an interior NUL")]
    BadName(String),

    #[error("shm_open('{name}') failed")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to size segment '{name}' to {size} bytes")]
    Resize {
        name: String,
        size: usize,
        #[source]
        source: io::Error,
    },

    #[error("failed to map segment '{name}'")]
    Map {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// An owned, mapped POSIX shared-memory segment.
///
/// The mapping stays valid for the lifetime of the handle; raw pointers
/// handed out by [`as_ptr`](Self::as_ptr) must not outlive it.
pub struct ShmSegment {
    name: String,
    /// Owns the shm fd; the mapping below borrows it for its lifetime.
    _file: File,
    mmap: MmapMut,
    owns_name: bool,
}

impl ShmSegment {
    /// Creates a fresh segment named `/tickshaper_shm_<4-digit-nonce>` of
    /// `size` bytes, zero-initialized by the OS.
    pub fn create(size: usize) -> Result<Self, ShmError> {
        let nonce: u16 = rand::thread_rng().gen_range(1000..10000);
        Self::create_named(&format!("/tickshaper_shm_{nonce}"), size)
    }

    /// Creates (or truncates) a segment with an explicit name.
    pub fn create_named(name: &str, size: usize) -> Result<Self, ShmError> {
        let file = shm_file(name, libc::O_CREAT | libc::O_RDWR)?;
        file.set_len(size as u64).map_err(|source| ShmError::Resize {
            name: name.to_string(),
            size,
            source,
        })?;
        Self::map(name, file, true)
    }

    /// Opens an existing segment read-write without taking ownership of the
    /// name; dropping this handle unmaps but does not unlink.
    pub fn open(name: &str) -> Result<Self, ShmError> {
        let file = shm_file(name, libc::O_RDWR)?;
        Self::map(name, file, false)
    }

    fn map(name: &str, file: File, owns_name: bool) -> Result<Self, ShmError> {
        // SAFETY: the fd refers to a freshly sized shm object we own.
        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|source| ShmError::Map {
            name: name.to_string(),
            source,
        })?;
        Ok(Self {
            name: name.to_string(),
            _file: file,
            mmap,
            owns_name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.len() == 0
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }
}

impl Drop for ShmSegment {
    fn drop(&mut self) {
        if self.owns_name {
            if let Ok(cname) = CString::new(self.name.as_str()) {
                // SAFETY: plain libc call on a NUL-terminated name.
                unsafe { libc::shm_unlink(cname.as_ptr()) };
            }
        }
    }
}

fn shm_file(name: &str, flags: libc::c_int) -> Result<File, ShmError> {
    let cname = CString::new(name).map_err(|_| ShmError::BadName(name.to_string()))?;
    // SAFETY: cname is NUL-terminated; we check the returned fd before use.
    let fd = unsafe { libc::shm_open(cname.as_ptr(), flags, 0o666) };
    if fd < 0 {
        return Err(ShmError::Open {
            name: name.to_string(),
            source: io::Error::last_os_error(),
        });
    }
    // SAFETY: fd is a valid, owned descriptor returned by shm_open.
    Ok(unsafe { File::from_raw_fd(fd) })
}
