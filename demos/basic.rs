// Pickle Prefetching Accelerator Rust Bindings
// SPDX-License-Identifier: MIT

//! Basic example: describe a small CSR graph to the prefetcher and send a
//! job for it.
//!
//! Run with: `cargo run --example basic`

use pickle_rs::{
    AccessType, AddressRange, AddressingMode, ArrayDescriptor, DescriptorArena, DeviceManager,
    Job, PickleError,
};

fn main() {
    println!("Pickle Basic Example");
    println!("====================\n");

    // A tiny CSR graph: per-vertex offsets into a flat neighbor array.
    let offsets: Vec<u64> = vec![0, 3, 5];
    let neighbors: Vec<u64> = vec![1, 2, 3, 0, 2, 4];

    let mut arena = DescriptorArena::new();
    let offsets_desc = arena.insert(ArrayDescriptor::new(
        AddressRange::of_slice(&offsets),
        std::mem::size_of::<u64>() as u64,
    ));
    let neighbors_desc = arena.insert(ArrayDescriptor::new(
        AddressRange::of_slice(&neighbors),
        std::mem::size_of::<u64>() as u64,
    ));

    // The neighbor array is addressed through the offset array's values:
    // a ranged run of small integer indices per offset.
    arena.link_indexed_by(neighbors_desc, offsets_desc);
    arena
        .get_mut(neighbors_desc)
        .set_addressing_mode(AddressingMode::Index);
    arena
        .get_mut(neighbors_desc)
        .set_access_type(AccessType::Ranged);

    let mut job = Job::new("bfs");
    job.register(&mut arena, offsets_desc);
    job.register(&mut arena, neighbors_desc);

    println!("Assembled job '{}':", job.kernel_name());
    println!("  descriptors: {}", job.descriptor_count());
    for handle in [offsets_desc, neighbors_desc] {
        let desc = arena.get(handle);
        println!(
            "  array {}: {} elements of {} bytes at {:#x}",
            desc.id().as_u64(),
            desc.element_count(),
            desc.element_size,
            desc.range.start
        );
    }

    let wire = match job.serialize(&arena) {
        Ok(wire) => wire,
        Err(e) => {
            println!("Serialization failed: {e}");
            return;
        }
    };
    println!("  wire buffer: {} bytes\n", wire.len());

    println!("Opening Pickle device...");
    let mut manager = match DeviceManager::new() {
        Ok(manager) => {
            println!("  communication page 0 established");
            manager
        }
        Err(PickleError::PlatformNotSupported) => {
            println!("  platform not supported, stopping here");
            return;
        }
        Err(e) => {
            println!("  no device: {e}");
            return;
        }
    };

    match manager.prefetcher_specs() {
        Ok(specs) => {
            println!("  availability:      {}", specs.availability);
            println!("  prefetch distance: {}", specs.prefetch_distance);
            println!("  mode:              {:?}", specs.mode);
            println!("  bulk chunk size:   {}", specs.bulk_chunk_size);
        }
        Err(e) => {
            println!("  specs query failed: {e}");
            return;
        }
    }

    match manager.page_ptr(1) {
        Ok(ptr) => println!("  communication page 1 at {ptr:p}"),
        Err(e) => println!("  page 1 failed: {e}"),
    }

    match manager.send_job(&job, &arena) {
        Ok(()) => println!("\nJob sent."),
        Err(e) => println!("\nJob send failed: {e}"),
    }
}
