// Pickle Prefetching Accelerator Rust Bindings
// SPDX-License-Identifier: MIT

//! Per-kernel-invocation job assembly and wire serialization.
//!
//! A [`Job`] collects the descriptors one kernel launch will touch,
//! renumbers their sparse global ids into the dense 0-based space the
//! device expects, and serializes everything into the fixed little-endian
//! buffer sent with `SEND_JOB_DESCRIPTOR`.
//!
//! # Wire layout
//!
//! ```text
//! [count: 1 byte]
//! [count x 7 x u64 LE]   renamed id, renamed indexed-by, address start,
//!                        address end, element size, access type,
//!                        addressing mode
//! [kernel name bytes]    unterminated; the receiver derives the length
//!                        from the total buffer size
//! ```
//!
//! The access-type and addressing-mode bits each occupy a full 8-byte slot
//! to match the device's fixed-stride record expectation.

use crate::descriptor::{AccessType, AddressingMode, ArrayId, DescriptorArena, DescriptorHandle, RenameMap};
use crate::error::{PickleError, PickleResult};

/// Bytes per serialized descriptor record (7 u64 fields).
pub const WIRE_RECORD_SIZE: usize = 7 * 8;

/// The set of descriptors relevant to one kernel invocation, plus the id
/// densification needed before transmission.
///
/// Created per kernel launch, populated by [`Job::register`], consumed by
/// [`Job::serialize`], then discarded. Registration order is wire order.
#[derive(Debug, Clone)]
pub struct Job {
    // Selects which on-device prefetch generator handles this job.
    kernel_name: String,
    handles: Vec<DescriptorHandle>,
    rename: RenameMap,
}

impl Job {
    /// New empty job for the prefetch strategy named `kernel_name`.
    pub fn new(kernel_name: impl Into<String>) -> Self {
        Self {
            kernel_name: kernel_name.into(),
            handles: Vec::with_capacity(5),
            rename: RenameMap::new(),
        }
    }

    /// Register a descriptor for this job.
    ///
    /// The first registration assigns the descriptor the next dense id
    /// (starting at 0) and appends it to the wire order. Registering the
    /// same descriptor again is a no-op: it keeps its original dense id
    /// and position.
    ///
    /// The device assumes contiguous array ids (0, 1, 2, ...) while the
    /// arena hands out sparse ids across unrelated jobs, so every job
    /// renumbers its participants locally.
    pub fn register(&mut self, arena: &mut DescriptorArena, handle: DescriptorHandle) {
        let id = arena.identity(handle);
        if self.rename.contains(id) {
            return;
        }
        self.rename.insert_next(id);
        self.handles.push(handle);
    }

    /// Set the access type of the registered descriptor with global id
    /// `id`. Returns `true` if a matching descriptor was found.
    ///
    /// Callers may speculatively adjust descriptors that were never
    /// registered for this job, so a miss is not an error: it logs a
    /// warning, mutates nothing, and returns `false`.
    pub fn set_access_type_by_id(
        &self,
        arena: &mut DescriptorArena,
        id: ArrayId,
        access_type: AccessType,
    ) -> bool {
        match self.find_registered(arena, id) {
            Some(handle) => {
                arena.get_mut(handle).set_access_type(access_type);
                true
            }
            None => {
                log::warn!(
                    "set_access_type_by_id: array id {} not registered in job '{}'",
                    id.as_u64(),
                    self.kernel_name
                );
                false
            }
        }
    }

    /// Set the addressing mode of the registered descriptor with global id
    /// `id`. Same miss semantics as [`Job::set_access_type_by_id`].
    pub fn set_addressing_mode_by_id(
        &self,
        arena: &mut DescriptorArena,
        id: ArrayId,
        addressing_mode: AddressingMode,
    ) -> bool {
        match self.find_registered(arena, id) {
            Some(handle) => {
                arena.get_mut(handle).set_addressing_mode(addressing_mode);
                true
            }
            None => {
                log::warn!(
                    "set_addressing_mode_by_id: array id {} not registered in job '{}'",
                    id.as_u64(),
                    self.kernel_name
                );
                false
            }
        }
    }

    fn find_registered(&self, arena: &DescriptorArena, id: ArrayId) -> Option<DescriptorHandle> {
        self.handles
            .iter()
            .copied()
            .find(|&h| arena.get(h).id() == id)
    }

    /// Kernel name identifying the on-device prefetch strategy.
    pub fn kernel_name(&self) -> &str {
        &self.kernel_name
    }

    /// Number of registered descriptors.
    pub fn descriptor_count(&self) -> usize {
        self.handles.len()
    }

    /// This job's global-to-dense id mapping.
    pub fn rename_map(&self) -> &RenameMap {
        &self.rename
    }

    /// Serialize the job into the device's wire buffer.
    ///
    /// Deterministic: the same descriptor set in the same registration
    /// order always yields identical bytes. Fails with
    /// [`PickleError::UnknownArrayId`] if any registered descriptor is
    /// indexed by an array that was not registered in this job, and with
    /// [`PickleError::TooManyDescriptors`] if the count does not fit the
    /// 1-byte header.
    pub fn serialize(&self, arena: &DescriptorArena) -> PickleResult<Vec<u8>> {
        let n = self.handles.len();
        if n > u8::MAX as usize {
            return Err(PickleError::TooManyDescriptors(n));
        }

        let mut buf = Vec::with_capacity(1 + WIRE_RECORD_SIZE * n + self.kernel_name.len());
        buf.push(n as u8);
        for &handle in &self.handles {
            let desc = arena.get(handle);
            let fields = [
                self.rename.get(desc.id())?,
                self.rename.get(desc.indexed_by)?,
                desc.range.start,
                desc.range.end,
                desc.element_size,
                desc.access_type.as_u64(),
                desc.addressing_mode.as_u64(),
            ];
            for field in fields {
                buf.extend_from_slice(&field.to_le_bytes());
            }
        }
        buf.extend_from_slice(self.kernel_name.as_bytes());
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{AddressRange, ArrayDescriptor};

    fn arena_with(ranges: &[(u64, u64, u64)]) -> (DescriptorArena, Vec<DescriptorHandle>) {
        let mut arena = DescriptorArena::new();
        let handles = ranges
            .iter()
            .map(|&(start, end, es)| {
                arena.insert(ArrayDescriptor::new(AddressRange::new(start, end), es))
            })
            .collect();
        (arena, handles)
    }

    fn field_at(buf: &[u8], record: usize, field: usize) -> u64 {
        let off = 1 + record * WIRE_RECORD_SIZE + field * 8;
        u64::from_le_bytes(buf[off..off + 8].try_into().unwrap())
    }

    #[test]
    fn test_rename_ids_are_dense_in_registration_order() {
        let (mut arena, handles) =
            arena_with(&[(0, 8, 8), (8, 16, 8), (16, 24, 8), (24, 32, 8)]);
        // Burn some global ids so the sparse space is not 1..=4.
        let _ = arena.identity(handles[2]);
        let _ = arena.identity(handles[0]);

        let mut job = Job::new("bfs");
        for &h in &handles {
            job.register(&mut arena, h);
        }

        for (expected_dense, &h) in handles.iter().enumerate() {
            let id = arena.get(h).id();
            assert_eq!(job.rename_map().get(id).unwrap(), expected_dense as u64);
        }
        assert_eq!(job.rename_map().len(), handles.len());
    }

    #[test]
    fn test_double_registration_is_a_noop() {
        let (mut arena, handles) = arena_with(&[(0, 8, 8), (8, 16, 8)]);
        let mut job = Job::new("bfs");
        job.register(&mut arena, handles[0]);
        job.register(&mut arena, handles[1]);

        let before = job.serialize(&arena).unwrap();
        job.register(&mut arena, handles[0]);
        let after = job.serialize(&arena).unwrap();

        assert_eq!(job.descriptor_count(), 2);
        assert_eq!(before, after);
        let id0 = arena.get(handles[0]).id();
        assert_eq!(job.rename_map().get(id0).unwrap(), 0);
    }

    #[test]
    fn test_serialized_length() {
        let (mut arena, handles) = arena_with(&[(0, 64, 8), (64, 128, 8), (128, 192, 8)]);
        let mut job = Job::new("pagerank");
        for &h in &handles {
            job.register(&mut arena, h);
        }
        let buf = job.serialize(&arena).unwrap();
        assert_eq!(buf.len(), 1 + 3 * WIRE_RECORD_SIZE + "pagerank".len());
    }

    #[test]
    fn test_empty_job_serializes_to_header_and_name() {
        let arena = DescriptorArena::new();
        let job = Job::new("bfs");
        let buf = job.serialize(&arena).unwrap();
        assert_eq!(buf, b"\x00bfs");
    }

    #[test]
    fn test_serialize_is_deterministic() {
        let (mut arena, handles) = arena_with(&[(1000, 1016, 8), (2000, 2096, 16)]);
        let mut job = Job::new("bfs");
        job.register(&mut arena, handles[0]);
        job.register(&mut arena, handles[1]);
        assert_eq!(job.serialize(&arena).unwrap(), job.serialize(&arena).unwrap());
    }

    #[test]
    fn test_scenario_csr_offsets_and_neighbors() {
        // Offset array [1000, 1016) with 8-byte elements, neighbor array
        // [2000, 2096) with 16-byte elements, neighbors indexed by offsets.
        let (mut arena, handles) = arena_with(&[(1000, 1016, 8), (2000, 2096, 16)]);
        let (offsets, neighbors) = (handles[0], handles[1]);
        arena.link_indexed_by(neighbors, offsets);

        let mut job = Job::new("bfs");
        job.register(&mut arena, offsets);
        job.register(&mut arena, neighbors);

        assert_eq!(arena.get(offsets).element_count(), 2);
        assert_eq!(arena.get(neighbors).element_count(), 6);

        let rename = job.rename_map();
        assert_eq!(rename.get(arena.get(offsets).id()).unwrap(), 0);
        assert_eq!(rename.get(arena.get(neighbors).id()).unwrap(), 1);

        let buf = job.serialize(&arena).unwrap();
        assert_eq!(buf.len(), 116); // 1 + 2 * 56 + 3

        assert_eq!(buf[0], 2);
        // Record 0: the offset array, the root of the indirection chain.
        assert_eq!(field_at(&buf, 0, 0), 0);
        assert_eq!(field_at(&buf, 0, 1), u64::MAX);
        assert_eq!(field_at(&buf, 0, 2), 1000);
        assert_eq!(field_at(&buf, 0, 3), 1016);
        assert_eq!(field_at(&buf, 0, 4), 8);
        // Record 1: the neighbor array, indexed by record 0.
        assert_eq!(field_at(&buf, 1, 0), 1);
        assert_eq!(field_at(&buf, 1, 1), 0);
        assert_eq!(field_at(&buf, 1, 2), 2000);
        assert_eq!(field_at(&buf, 1, 3), 2096);
        assert_eq!(field_at(&buf, 1, 4), 16);
        assert_eq!(&buf[113..], b"bfs");
    }

    #[test]
    fn test_access_bits_widen_to_full_slots() {
        let (mut arena, handles) = arena_with(&[(0, 32, 8)]);
        arena.get_mut(handles[0]).set_access_type(AccessType::Ranged);
        arena
            .get_mut(handles[0])
            .set_addressing_mode(AddressingMode::Index);

        let mut job = Job::new("x");
        job.register(&mut arena, handles[0]);
        let buf = job.serialize(&arena).unwrap();

        assert_eq!(field_at(&buf, 0, 5), 1); // access type
        assert_eq!(field_at(&buf, 0, 6), 1); // addressing mode
    }

    #[test]
    fn test_serialize_fails_when_indexed_by_unregistered_array() {
        let (mut arena, handles) = arena_with(&[(1000, 1016, 8), (2000, 2096, 16)]);
        let (offsets, neighbors) = (handles[0], handles[1]);
        arena.link_indexed_by(neighbors, offsets);

        let mut job = Job::new("bfs");
        job.register(&mut arena, neighbors); // offsets deliberately left out

        let offsets_id = arena.get(offsets).id().as_u64();
        match job.serialize(&arena) {
            Err(PickleError::UnknownArrayId(id)) => assert_eq!(id, offsets_id),
            other => panic!("expected UnknownArrayId, got {other:?}"),
        }
    }

    #[test]
    fn test_mutation_by_unregistered_id_is_observable_noop() {
        let (mut arena, handles) = arena_with(&[(0, 32, 8)]);
        let mut job = Job::new("bfs");
        job.register(&mut arena, handles[0]);

        let registered_id = arena.get(handles[0]).id();
        let bogus = {
            // A real id from the arena that this job never registered.
            let other = arena.insert(ArrayDescriptor::new(AddressRange::new(0, 0), 1));
            arena.identity(other)
        };

        assert!(!job.set_access_type_by_id(&mut arena, bogus, AccessType::Ranged));
        assert!(!job.set_addressing_mode_by_id(&mut arena, bogus, AddressingMode::Index));
        assert_eq!(arena.get(handles[0]).access_type, AccessType::SingleElement);
        assert_eq!(
            arena.get(handles[0]).addressing_mode,
            AddressingMode::Pointer
        );

        assert!(job.set_access_type_by_id(&mut arena, registered_id, AccessType::Ranged));
        assert_eq!(arena.get(handles[0]).access_type, AccessType::Ranged);
    }

    #[test]
    fn test_too_many_descriptors_rejected() {
        let mut arena = DescriptorArena::new();
        let mut job = Job::new("big");
        for i in 0..256u64 {
            let h = arena.insert(ArrayDescriptor::new(
                AddressRange::new(i * 8, i * 8 + 8),
                8,
            ));
            job.register(&mut arena, h);
        }
        assert!(matches!(
            job.serialize(&arena),
            Err(PickleError::TooManyDescriptors(256))
        ));
    }
}
