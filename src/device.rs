// Pickle Prefetching Accelerator Rust Bindings
// SPDX-License-Identifier: MIT

//! Low-level device I/O: device node, page mapping, ioctl queries, and
//! the two-phase command write.
//!
//! The Pickle driver exposes a single character device. Communication
//! pages are obtained by mmap-ing it; the mapping *length* tells the
//! driver which page variant is wanted (4096 bytes for a general
//! communication page, 16 bytes for the performance-counter page). That
//! size-based dispatch is the device's own convention; this module keeps
//! it at the wire but exposes it to callers as an explicit [`PageKind`].
//!
//! # Platform Support
//!
//! The device only exists as a Linux character device. On other platforms
//! every operation returns `PickleError::PlatformNotSupported`.

use crate::command::{DeviceCommand, COMMAND_HEADER_SIZE};
use crate::error::PickleError;

/// Path of the Pickle driver's device node.
pub const DEVICE_PATH: &str = "/dev/hey_pickle";

/// Size of a general communication page mapping.
pub const COMM_PAGE_SIZE: usize = 4096;

/// Size of the performance-counter page mapping. The 16-byte length is
/// what signals the driver to hand out the performance page.
pub const PERF_PAGE_SIZE: usize = 16;

/// The two page variants the driver hands out, distinguished at the wire
/// purely by mapping length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// General job/command communication page (4096 bytes).
    Communication,
    /// Performance-counter page (16 bytes).
    Performance,
}

impl PageKind {
    /// The mapping length for this page variant.
    #[inline]
    pub const fn len(self) -> usize {
        match self {
            Self::Communication => COMM_PAGE_SIZE,
            Self::Performance => PERF_PAGE_SIZE,
        }
    }
}

/// ioctl parameter block for the physical-address queries.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct MmapPaddrParams {
    /// Communication-page id (ignored by the performance-page query).
    pub mmap_id: u64,
    /// Physical address, filled in by the driver.
    pub paddr: u64,
}

/// Raw device capabilities as reported by the driver.
///
/// `prefetch_mode` is the driver's enumerant; see
/// [`crate::manager::PrefetchMode`] for the library-side classification.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct RawDeviceSpecs {
    pub availability: u64,
    pub prefetch_distance: u64,
    pub prefetch_mode: u64,
    pub bulk_chunk_size: u64,
}

// The driver reads these blocks byte-for-byte; keep the layouts fixed.
const _: () = assert!(std::mem::size_of::<MmapPaddrParams>() == 16);
const _: () = assert!(std::mem::size_of::<RawDeviceSpecs>() == 32);

// ============================================================================
// Linux Implementation
// ============================================================================

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;
    use std::fs::File;
    use std::os::unix::fs::{FileExt, OpenOptionsExt};
    use std::os::unix::io::AsRawFd;

    // _IOWR('p', nr, sizeof(param)) with the Linux _IOC bit layout.
    const fn iowr(nr: u64, size: usize) -> u64 {
        const IOC_WRITE: u64 = 1;
        const IOC_READ: u64 = 2;
        ((IOC_READ | IOC_WRITE) << 30) | ((size as u64) << 16) | ((b'p' as u64) << 8) | nr
    }

    const IOC_MMAP_PADDR: u64 = iowr(1, std::mem::size_of::<MmapPaddrParams>());
    const IOC_PERF_PAGE_PADDR: u64 = iowr(2, std::mem::size_of::<MmapPaddrParams>());
    const IOC_GET_DEVICE_SPECS: u64 = iowr(3, std::mem::size_of::<RawDeviceSpecs>());

    /// Handle to the open Pickle device node.
    ///
    /// Owns the file descriptor; mappings created through it stay valid
    /// independently of the handle's lifetime and are torn down by their
    /// owner (see [`crate::manager::DeviceManager`]).
    pub struct PickleDevice {
        file: File,
    }

    impl PickleDevice {
        /// Open the device node read/write with synchronous writes.
        ///
        /// # Errors
        ///
        /// `PermissionDenied` or `Io` if the node is absent or
        /// inaccessible (driver not loaded).
        pub fn open() -> Result<Self, PickleError> {
            let file = File::options()
                .read(true)
                .write(true)
                .custom_flags(libc::O_SYNC)
                .open(DEVICE_PATH)
                .map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        PickleError::PermissionDenied(DEVICE_PATH.to_string())
                    } else {
                        PickleError::Io(e)
                    }
                })?;
            Ok(Self { file })
        }

        fn map(&self, len: usize) -> Result<*mut u8, PickleError> {
            let ptr = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    len,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED,
                    self.file.as_raw_fd(),
                    0,
                )
            };
            if ptr == libc::MAP_FAILED {
                return Err(PickleError::MmapFailed(format!(
                    "mmap of {len} bytes failed for {DEVICE_PATH}"
                )));
            }
            Ok(ptr as *mut u8)
        }

        /// Map a general communication page.
        ///
        /// The driver correlates mappings with page ids on its side;
        /// `mmap_id` is not part of the mmap call, only of the later
        /// physical-address query.
        pub fn map_comm_page(&self, mmap_id: u64) -> Result<*mut u8, PickleError> {
            log::debug!("mapping communication page {mmap_id}");
            self.map(COMM_PAGE_SIZE)
        }

        /// Map the performance-counter page. The 16-byte length alone
        /// tells the driver which variant is wanted.
        pub fn map_perf_page(&self) -> Result<*mut u8, PickleError> {
            log::debug!("mapping performance page");
            self.map(PERF_PAGE_SIZE)
        }

        fn ioctl_paddr(&self, op: &'static str, request: u64, mmap_id: u64) -> Result<u64, PickleError> {
            let mut params = MmapPaddrParams { mmap_id, paddr: 0 };
            let ret = unsafe {
                libc::ioctl(
                    self.file.as_raw_fd(),
                    request as libc::c_ulong,
                    &mut params as *mut MmapPaddrParams,
                )
            };
            if ret != 0 {
                return Err(PickleError::Ioctl {
                    op,
                    source: std::io::Error::last_os_error(),
                });
            }
            Ok(params.paddr)
        }

        /// Physical address backing the communication page `mmap_id`.
        ///
        /// Only valid after the page has been written at least once, so
        /// the OS has bound a physical frame to it.
        pub fn query_page_paddr(&self, mmap_id: u64) -> Result<u64, PickleError> {
            self.ioctl_paddr("MMAP_PADDR", IOC_MMAP_PADDR, mmap_id)
        }

        /// Physical address backing the performance page. Same
        /// touched-first requirement as [`Self::query_page_paddr`].
        pub fn query_perf_page_paddr(&self) -> Result<u64, PickleError> {
            self.ioctl_paddr("PERF_PAGE_PADDR", IOC_PERF_PAGE_PADDR, 0)
        }

        /// Query device-wide capabilities.
        ///
        /// Callers cannot proceed meaningfully without these; a failure
        /// here is fatal to them, but propagates as an error like any
        /// other.
        pub fn query_raw_specs(&self) -> Result<RawDeviceSpecs, PickleError> {
            let mut specs = RawDeviceSpecs::default();
            let ret = unsafe {
                libc::ioctl(
                    self.file.as_raw_fd(),
                    IOC_GET_DEVICE_SPECS as libc::c_ulong,
                    &mut specs as *mut RawDeviceSpecs,
                )
            };
            if ret != 0 {
                return Err(PickleError::Ioctl {
                    op: "GET_DEVICE_SPECS",
                    source: std::io::Error::last_os_error(),
                });
            }
            Ok(specs)
        }

        /// Write a command to the device: 16-byte header at offset 0,
        /// then the payload.
        ///
        /// The driver consumes the payload phase at file offset 1, not
        /// past the header; offsets here are command-channel framing, not
        /// positions in a backing file.
        ///
        /// # Errors
        ///
        /// `ShortWrite` if either phase transfers fewer bytes than
        /// requested. No retry is attempted; callers own retry policy.
        pub fn write_command(
            &self,
            command: DeviceCommand,
            payload: &[u8],
        ) -> Result<(), PickleError> {
            log::debug!("writing {} with {} payload bytes", command, payload.len());

            let header = command.encode_header(payload.len() as u64);
            let written = self.file.write_at(&header, 0)?;
            if written != COMMAND_HEADER_SIZE {
                return Err(PickleError::ShortWrite {
                    expected: COMMAND_HEADER_SIZE,
                    written,
                });
            }

            let written = self.file.write_at(payload, 1)?;
            if written != payload.len() {
                return Err(PickleError::ShortWrite {
                    expected: payload.len(),
                    written,
                });
            }
            Ok(())
        }

        /// Unmap a page previously returned by one of the map calls.
        ///
        /// # Safety
        ///
        /// `ptr` must come from a mapping of exactly `kind.len()` bytes
        /// that has not already been unmapped, and no live references into
        /// the page may remain.
        pub unsafe fn unmap_page(ptr: *mut u8, kind: PageKind) {
            libc::munmap(ptr as *mut libc::c_void, kind.len());
        }
    }

}

// ============================================================================
// Non-Linux Stub Implementation
// ============================================================================

#[cfg(not(target_os = "linux"))]
mod stub_impl {
    use super::*;

    /// Stub device handle for platforms without the Pickle driver.
    ///
    /// All operations return `PickleError::PlatformNotSupported`.
    pub struct PickleDevice {
        _private: (),
    }

    impl PickleDevice {
        pub fn open() -> Result<Self, PickleError> {
            Err(PickleError::PlatformNotSupported)
        }

        pub fn map_comm_page(&self, _mmap_id: u64) -> Result<*mut u8, PickleError> {
            Err(PickleError::PlatformNotSupported)
        }

        pub fn map_perf_page(&self) -> Result<*mut u8, PickleError> {
            Err(PickleError::PlatformNotSupported)
        }

        pub fn query_page_paddr(&self, _mmap_id: u64) -> Result<u64, PickleError> {
            Err(PickleError::PlatformNotSupported)
        }

        pub fn query_perf_page_paddr(&self) -> Result<u64, PickleError> {
            Err(PickleError::PlatformNotSupported)
        }

        pub fn query_raw_specs(&self) -> Result<RawDeviceSpecs, PickleError> {
            Err(PickleError::PlatformNotSupported)
        }

        pub fn write_command(
            &self,
            _command: DeviceCommand,
            _payload: &[u8],
        ) -> Result<(), PickleError> {
            Err(PickleError::PlatformNotSupported)
        }

        /// # Safety
        ///
        /// No-op on this platform.
        pub unsafe fn unmap_page(_ptr: *mut u8, _kind: PageKind) {}
    }
}

// Re-export the appropriate implementation
#[cfg(target_os = "linux")]
pub use linux_impl::PickleDevice;

#[cfg(not(target_os = "linux"))]
pub use stub_impl::PickleDevice;
