// Pickle Prefetching Accelerator Rust Bindings
// SPDX-License-Identifier: MIT

//! Device manager: communication-page lifecycle and job transmission.
//!
//! The manager owns every page it maps and drives each one through
//! `Unallocated -> Mapped -> Backed -> WatchRegistered` exactly once:
//! map the page, write one byte so the OS binds a physical frame (the
//! physical-address query is only valid after that fault), query the
//! physical address, then register the physical range with the device so
//! it starts observing writes to the page. Repeat requests for the same
//! page id return the cached pointer without repeating any step.
//!
//! Single-threaded by design: the page map is unsynchronized shared
//! state, the protocol has no request/response correlation, and only one
//! job should be in flight at a time.

use crate::command::DeviceCommand;
use crate::descriptor::DescriptorArena;
use crate::device::{PageKind, PickleDevice, COMM_PAGE_SIZE};
use crate::error::PickleResult;
use crate::job::Job;
use std::collections::HashMap;

/// Id of the communication page the manager establishes for itself at
/// construction.
const MANAGER_PAGE_ID: u64 = 0;

/// How the device prefetches per hint, classified from the driver's raw
/// enumerant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchMode {
    /// One element per hint.
    Single,
    /// A bulk chunk per hint (chunk size in [`PrefetcherSpecs`]).
    Bulk,
    /// An enumerant this library version does not recognize. Preserved
    /// raw so newer drivers keep working against older libraries.
    Unknown(u64),
}

impl From<u64> for PrefetchMode {
    fn from(raw: u64) -> Self {
        match raw {
            0 => Self::Single,
            1 => Self::Bulk,
            other => Self::Unknown(other),
        }
    }
}

/// Device prefetcher capabilities.
#[derive(Debug, Clone, Copy)]
pub struct PrefetcherSpecs {
    pub availability: u64,
    pub prefetch_distance: u64,
    pub mode: PrefetchMode,
    /// Chunk size used in [`PrefetchMode::Bulk`].
    pub bulk_chunk_size: u64,
}

/// A page the manager has driven to `WatchRegistered`.
#[derive(Debug)]
struct OwnedPage {
    ptr: *mut u8,
    paddr: u64,
    kind: PageKind,
}

/// Owns the device handle and the lifecycle of every communication page.
///
/// Construction opens the device and establishes the manager's own
/// communication page (id 0) up front, watch range included. Pages are
/// released only when the manager is dropped.
///
/// Holds raw page pointers; deliberately not `Send`/`Sync` (see module
/// docs).
pub struct DeviceManager {
    device: PickleDevice,
    pages: HashMap<u64, OwnedPage>,
    perf_page: Option<OwnedPage>,
}

impl DeviceManager {
    /// Open the device and establish communication page 0.
    ///
    /// # Errors
    ///
    /// Any failure to open, map, query, or register propagates; there is
    /// no degraded mode for this channel, so callers typically treat an
    /// error here as fatal.
    pub fn new() -> PickleResult<Self> {
        let device = PickleDevice::open()?;
        let mut manager = Self {
            device,
            pages: HashMap::new(),
            perf_page: None,
        };
        manager.page_ptr(MANAGER_PAGE_ID)?;
        Ok(manager)
    }

    /// Pointer to the communication page `mmap_id`, establishing the page
    /// on first request.
    ///
    /// Subsequent requests for the same id return the identical pointer
    /// and perform no further syscalls.
    pub fn page_ptr(&mut self, mmap_id: u64) -> PickleResult<*mut u8> {
        if let Some(page) = self.pages.get(&mmap_id) {
            return Ok(page.ptr);
        }

        let ptr = self.device.map_comm_page(mmap_id)?;
        // Touch the page: the paddr query is only valid once a frame is
        // bound, which happens on first access.
        unsafe { ptr.write_volatile(0xAF) };
        let paddr = self.device.query_page_paddr(mmap_id)?;
        log::info!(
            "registered communication page: mmap_id {mmap_id}, vaddr {ptr:p}, paddr {paddr:#x}"
        );
        self.add_watch_range(paddr)?;

        self.pages.insert(
            mmap_id,
            OwnedPage {
                ptr,
                paddr,
                kind: PageKind::Communication,
            },
        );
        Ok(ptr)
    }

    /// Pointer to the performance-counter page, establishing it lazily on
    /// first request.
    pub fn perf_page_ptr(&mut self) -> PickleResult<*mut u8> {
        if let Some(page) = &self.perf_page {
            return Ok(page.ptr);
        }

        let ptr = self.device.map_perf_page()?;
        unsafe { ptr.write_volatile(0xAF) };
        let paddr = self.device.query_perf_page_paddr()?;
        log::info!("registered performance page: vaddr {ptr:p}, paddr {paddr:#x}");
        self.add_watch_range(paddr)?;

        self.perf_page = Some(OwnedPage {
            ptr,
            paddr,
            kind: PageKind::Performance,
        });
        Ok(ptr)
    }

    /// Physical address of an established communication page, if any.
    pub fn page_paddr(&self, mmap_id: u64) -> Option<u64> {
        self.pages.get(&mmap_id).map(|p| p.paddr)
    }

    /// Serialize `job` and transmit it as a `SEND_JOB_DESCRIPTOR`
    /// command.
    ///
    /// A send failure is not fatal to the manager; retry or abort is the
    /// caller's decision.
    pub fn send_job(&self, job: &Job, arena: &DescriptorArena) -> PickleResult<()> {
        let buffer = job.serialize(arena)?;
        log::debug!(
            "sending job '{}': {} descriptors, {} bytes",
            job.kernel_name(),
            job.descriptor_count(),
            buffer.len()
        );
        self.device
            .write_command(DeviceCommand::SendJobDescriptor, &buffer)
    }

    /// Query the device's prefetcher capabilities, classifying the raw
    /// mode enumerant into [`PrefetchMode`].
    pub fn prefetcher_specs(&self) -> PickleResult<PrefetcherSpecs> {
        let raw = self.device.query_raw_specs()?;
        Ok(PrefetcherSpecs {
            availability: raw.availability,
            prefetch_distance: raw.prefetch_distance,
            mode: PrefetchMode::from(raw.prefetch_mode),
            bulk_chunk_size: raw.bulk_chunk_size,
        })
    }

    fn add_watch_range(&self, paddr: u64) -> PickleResult<()> {
        self.device
            .write_command(DeviceCommand::AddWatchRange, &watch_range_payload(paddr))
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        for page in self.pages.values() {
            unsafe { PickleDevice::unmap_page(page.ptr, page.kind) };
        }
        if let Some(page) = &self.perf_page {
            // Unmapped with its actual 16-byte length, not the
            // communication-page span.
            unsafe { PickleDevice::unmap_page(page.ptr, page.kind) };
        }
    }
}

/// `ADD_WATCH_RANGE` payload: physical range `[paddr, paddr + 0x1000)`,
/// two little-endian u64s.
fn watch_range_payload(paddr: u64) -> [u8; 16] {
    let mut payload = [0u8; 16];
    payload[..8].copy_from_slice(&paddr.to_le_bytes());
    payload[8..].copy_from_slice(&(paddr + COMM_PAGE_SIZE as u64).to_le_bytes());
    payload
}
