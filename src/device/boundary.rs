//! Validated byte transfers between a caller's address space and the driver.
//!
//! Callers never hand the driver a reference it can trust. A caller region is
//! described by [`UserSource`] (readable) or [`UserDest`] (writable), either of
//! which may be unmapped. Every transfer checks the whole range first and
//! either copies all of it or nothing, returning a [`CopyFault`] instead of a
//! raw status code.

use std::fmt::{Display, Formatter};

use crate::AppError;

/// Reason a boundary copy was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyFault {
    /// The caller region does not exist.
    Unmapped,
    /// The range `offset..offset + len` does not fit inside the region.
    OutOfBounds {
        /// First byte of the requested range.
        offset: usize,
        /// Requested byte count.
        len: usize,
        /// Size of the region that was actually mapped.
        available: usize,
    },
}

impl Display for CopyFault {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unmapped => write!(f, "caller region is unmapped"),
            Self::OutOfBounds {
                offset,
                len,
                available,
            } => write!(
                f,
                "range {offset}+{len} exceeds caller region of {available} bytes"
            ),
        }
    }
}

impl std::error::Error for CopyFault {}

impl From<CopyFault> for AppError {
    fn from(fault: CopyFault) -> Self {
        Self::InvalidAddress(fault.to_string())
    }
}

/// Readable region in the caller's address space.
#[derive(Debug, Clone, Copy)]
pub struct UserSource<'a> {
    region: Option<&'a [u8]>,
}

impl<'a> UserSource<'a> {
    /// Region backed by `bytes`.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            region: Some(bytes),
        }
    }

    /// Region that faults on any access, like a null or unmapped pointer.
    #[must_use]
    pub fn unmapped() -> Self {
        Self { region: None }
    }

    /// Number of mapped bytes; zero when unmapped.
    #[must_use]
    pub fn len(&self) -> usize {
        self.region.map_or(0, <[u8]>::len)
    }

    /// Whether the region has no mapped bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Writable region in the caller's address space.
#[derive(Debug)]
pub struct UserDest<'a> {
    region: Option<&'a mut [u8]>,
}

impl<'a> UserDest<'a> {
    /// Region backed by `bytes`.
    #[must_use]
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self {
            region: Some(bytes),
        }
    }

    /// Region that faults on any access.
    #[must_use]
    pub fn unmapped() -> Self {
        Self { region: None }
    }

    /// Number of mapped bytes; zero when unmapped.
    #[must_use]
    pub fn len(&self) -> usize {
        self.region.as_deref().map_or(0, <[u8]>::len)
    }

    /// Whether the region has no mapped bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that `offset..offset + len` is writable.
    ///
    /// # Errors
    ///
    /// Returns [`CopyFault`] when the region is unmapped or too small.
    pub fn access_ok(&self, offset: usize, len: usize) -> Result<(), CopyFault> {
        let region = self.region.as_deref().ok_or(CopyFault::Unmapped)?;
        check_range(offset, len, region.len())
    }

    fn range_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8], CopyFault> {
        let region = self.region.as_deref_mut().ok_or(CopyFault::Unmapped)?;
        check_range(offset, len, region.len())?;
        Ok(&mut region[offset..offset + len])
    }
}

fn check_range(offset: usize, len: usize, available: usize) -> Result<(), CopyFault> {
    match offset.checked_add(len) {
        Some(end) if end <= available => Ok(()),
        _ => Err(CopyFault::OutOfBounds {
            offset,
            len,
            available,
        }),
    }
}

/// Copy `len` bytes from the caller's `src` into the driver-owned `dst`.
///
/// # Errors
///
/// Returns [`CopyFault`] without touching `dst` when `src` cannot supply
/// `len` bytes or `dst` cannot hold them.
pub fn copy_from_user(
    dst: &mut [u8],
    src: &UserSource<'_>,
    len: usize,
) -> Result<usize, CopyFault> {
    let region = src.region.ok_or(CopyFault::Unmapped)?;
    check_range(0, len, region.len())?;
    check_range(0, len, dst.len())?;
    dst[..len].copy_from_slice(&region[..len]);
    Ok(len)
}

/// Copy all of the driver-owned `src` to the start of the caller's `dst`.
///
/// # Errors
///
/// Returns [`CopyFault`] without touching `dst` when it cannot take
/// `src.len()` bytes.
pub fn copy_to_user(dst: &mut UserDest<'_>, src: &[u8]) -> Result<usize, CopyFault> {
    dst.range_mut(0, src.len())?.copy_from_slice(src);
    Ok(src.len())
}

/// Zero `len` bytes of the caller's `dst` starting at `offset`.
///
/// # Errors
///
/// Returns [`CopyFault`] without touching `dst` when the range is not
/// writable.
pub fn clear_user(
    dst: &mut UserDest<'_>,
    offset: usize,
    len: usize,
) -> Result<usize, CopyFault> {
    dst.range_mut(offset, len)?.fill(0);
    Ok(len)
}
