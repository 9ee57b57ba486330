// Pickle Prefetching Accelerator Rust Bindings
// SPDX-License-Identifier: MIT

//! # Pickle Prefetching Accelerator Rust Bindings
//!
//! This crate lets a host program describe, to the Pickle hardware
//! prefetcher, the memory layout and index relationships among the arrays
//! it is about to traverse (e.g. a CSR graph's offset and neighbor
//! arrays), and deliver that description plus control commands to the
//! device through its character-device/mmap/ioctl channel.
//!
//! ## Components
//!
//! - [`ArrayDescriptor`] — one array's address range, element size,
//!   access pattern, and indirection relationship to another array.
//! - [`DescriptorArena`] — owns all descriptors; containers keep a
//!   [`DescriptorHandle`] and reuse it across jobs.
//! - [`Job`] — the descriptors one kernel launch touches, densified into
//!   the 0-based id space the device expects and serialized to the fixed
//!   little-endian wire layout.
//! - [`PickleDevice`] — low-level device node access: page mapping,
//!   physical-address and capability ioctls, the two-phase command write.
//! - [`DeviceManager`] — communication-page lifecycle (map, fault-in,
//!   physical-address resolution, watch-range registration) and job
//!   transmission.
//!
//! ## Platform Support
//!
//! The device exists only as a Linux character device (`/dev/hey_pickle`).
//! Descriptor and job assembly work everywhere; device operations return
//! [`PickleError::PlatformNotSupported`] elsewhere.
//!
//! ## Example
//!
//! ```rust,no_run
//! use pickle_rs::{
//!     AccessType, AddressRange, AddressingMode, ArrayDescriptor, DescriptorArena,
//!     DeviceManager, Job, PickleError,
//! };
//!
//! fn main() -> Result<(), PickleError> {
//!     let offsets: Vec<u64> = vec![0, 3];
//!     let neighbors: Vec<u64> = vec![1, 2, 3, 0, 2, 4];
//!
//!     let mut arena = DescriptorArena::new();
//!     let offsets_desc = arena.insert(ArrayDescriptor::new(
//!         AddressRange::of_slice(&offsets),
//!         std::mem::size_of::<u64>() as u64,
//!     ));
//!     let neighbors_desc = arena.insert(ArrayDescriptor::new(
//!         AddressRange::of_slice(&neighbors),
//!         std::mem::size_of::<u64>() as u64,
//!     ));
//!     // Neighbor elements are addressed through offset-array values.
//!     arena.link_indexed_by(neighbors_desc, offsets_desc);
//!     arena.get_mut(neighbors_desc).set_addressing_mode(AddressingMode::Index);
//!     arena.get_mut(neighbors_desc).set_access_type(AccessType::Ranged);
//!
//!     let mut job = Job::new("bfs");
//!     job.register(&mut arena, offsets_desc);
//!     job.register(&mut arena, neighbors_desc);
//!
//!     let manager = DeviceManager::new()?;
//!     manager.send_job(&job, &arena)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency
//!
//! Single-threaded by design: id assignment, job registration, and the
//! manager's page map are unsynchronized shared state, and the command
//! protocol has no request/response correlation. Send one job at a time.

// Module declarations
pub mod command;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod job;
pub mod manager;

// Re-exports for convenient access
pub use command::DeviceCommand;
pub use descriptor::{
    AccessType, AddressRange, AddressingMode, ArrayDescriptor, ArrayId, DescriptorArena,
    DescriptorHandle, DescriptorProvider, RenameMap,
};
pub use device::{PageKind, PickleDevice, DEVICE_PATH};
pub use error::{PickleError, PickleResult};
pub use job::Job;
pub use manager::{DeviceManager, PrefetchMode, PrefetcherSpecs};
