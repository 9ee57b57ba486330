// Pickle Prefetching Accelerator Rust Bindings
// SPDX-License-Identifier: MIT

//! Array descriptors and the arena that owns them.
//!
//! An [`ArrayDescriptor`] tells the prefetcher where one array lives in
//! virtual memory, how wide its elements are, and which other array's
//! element values act as indices into it (e.g. a CSR offset array indexing
//! a neighbor array). Descriptors are allocated in a [`DescriptorArena`]
//! and addressed by stable [`DescriptorHandle`]s; containers keep their
//! handle and reuse it across jobs.
//!
//! Two id spaces are in play:
//! - the *global* [`ArrayId`], sparse and unique across the whole arena,
//!   assigned lazily on first use;
//! - the *dense* per-job id in a [`RenameMap`], which is what actually goes
//!   on the wire (the device indexes internal tables with small contiguous
//!   integers).

use crate::error::{PickleError, PickleResult};
use std::collections::HashMap;

/// Globally unique, sparse id of an array descriptor.
///
/// `0` means "not yet assigned"; the all-ones value is [`ArrayId::NONE`],
/// the "no indexing relation / root" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArrayId(u64);

impl ArrayId {
    /// Id of a descriptor whose identity has not been assigned yet.
    pub const UNASSIGNED: ArrayId = ArrayId(0);

    /// Sentinel for "no indexing relation" (the root of an indirection
    /// chain). Maps to itself in every rename map.
    pub const NONE: ArrayId = ArrayId(u64::MAX);

    /// Raw id value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns true once an identity has been assigned.
    #[inline]
    pub const fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

/// How the consumer reads the array per index: one element, or a
/// contiguous run of elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u64)]
pub enum AccessType {
    #[default]
    SingleElement = 0,
    Ranged = 1,
}

impl AccessType {
    /// Wire encoding (widened to a full 8-byte slot, see [`crate::job::Job::serialize`]).
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self as u64
    }
}

/// Whether the array's consumer dereferences raw addresses or small
/// integer indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u64)]
pub enum AddressingMode {
    #[default]
    Pointer = 0,
    Index = 1,
}

impl AddressingMode {
    /// Wire encoding (widened to a full 8-byte slot).
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self as u64
    }
}

/// Half-open `[start, end)` virtual byte range of an array's backing
/// storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddressRange {
    pub start: u64,
    pub end: u64,
}

impl AddressRange {
    /// Create a range. `end` must not be below `start`.
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(end >= start, "address range end below start");
        Self { start, end }
    }

    /// Range covering a slice's backing storage.
    pub fn of_slice<T>(slice: &[T]) -> Self {
        let start = slice.as_ptr() as u64;
        let end = start + (std::mem::size_of_val(slice) as u64);
        Self { start, end }
    }

    /// Length of the range in bytes.
    #[inline]
    pub const fn len(&self) -> u64 {
        self.end - self.start
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Metadata describing one array to the prefetcher.
///
/// Invariants: `range.end >= range.start`, and `element_size` divides
/// `range.len()` exactly and is nonzero whenever the range is nonempty.
#[derive(Debug, Clone)]
pub struct ArrayDescriptor {
    /// Global identity; assigned lazily by [`DescriptorArena::identity`].
    id: ArrayId,
    /// Global id of the array whose element values index into this one,
    /// or [`ArrayId::NONE`].
    pub indexed_by: ArrayId,
    /// Virtual byte range of the backing storage.
    pub range: AddressRange,
    /// Bytes per element.
    pub element_size: u64,
    pub access_type: AccessType,
    pub addressing_mode: AddressingMode,
}

impl ArrayDescriptor {
    /// Descriptor for an array at `range` with `element_size`-byte elements.
    ///
    /// Access pattern defaults to single-element / pointer addressing.
    pub fn new(range: AddressRange, element_size: u64) -> Self {
        debug_assert!(
            range.is_empty() || element_size > 0,
            "nonempty array with zero element size"
        );
        debug_assert!(
            element_size == 0 || range.len() % element_size == 0,
            "element size does not divide the address range"
        );
        Self {
            id: ArrayId::UNASSIGNED,
            indexed_by: ArrayId::NONE,
            range,
            element_size,
            access_type: AccessType::SingleElement,
            addressing_mode: AddressingMode::Pointer,
        }
    }

    /// Current global id. [`ArrayId::UNASSIGNED`] until the arena has
    /// handed the descriptor an identity.
    #[inline]
    pub fn id(&self) -> ArrayId {
        self.id
    }

    /// Number of elements in the array.
    #[inline]
    pub fn element_count(&self) -> u64 {
        if self.element_size == 0 {
            0
        } else {
            self.range.len() / self.element_size
        }
    }

    pub fn set_access_type(&mut self, access_type: AccessType) {
        self.access_type = access_type;
    }

    pub fn set_addressing_mode(&mut self, addressing_mode: AddressingMode) {
        self.addressing_mode = addressing_mode;
    }

    /// Wire-facing view of this descriptor under a job's rename map:
    /// `(renamed_id, renamed_indexed_by, addressing_mode_bit,
    /// access_type_bit, address_start, element_count, element_size)`.
    ///
    /// Fails with [`PickleError::UnknownArrayId`] if either id is absent
    /// from `rename` — i.e. the descriptor (or the array it is indexed by)
    /// was never registered into the job being serialized.
    pub fn wire_tuple(
        &self,
        rename: &RenameMap,
    ) -> PickleResult<(u64, u64, bool, bool, u64, u64, u64)> {
        Ok((
            rename.get(self.id)?,
            rename.get(self.indexed_by)?,
            self.addressing_mode == AddressingMode::Index,
            self.access_type == AccessType::Ranged,
            self.range.start,
            self.element_count(),
            self.element_size,
        ))
    }
}

/// Mapping from sparse global [`ArrayId`]s to the dense 0-based id space
/// one job presents to the device.
///
/// Always contains the fixed entry `NONE -> NONE`; every other entry is
/// assigned sequentially from 0 in registration order.
#[derive(Debug, Clone)]
pub struct RenameMap {
    map: HashMap<ArrayId, u64>,
    next_dense: u64,
}

impl RenameMap {
    pub fn new() -> Self {
        let mut map = HashMap::new();
        map.insert(ArrayId::NONE, ArrayId::NONE.as_u64());
        Self { map, next_dense: 0 }
    }

    /// Number of registered descriptors (the `NONE` entry not counted).
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len() - 1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn contains(&self, id: ArrayId) -> bool {
        self.map.contains_key(&id)
    }

    /// Dense id for `id`, or [`PickleError::UnknownArrayId`] if it was
    /// never registered. Never substitutes a default.
    pub fn get(&self, id: ArrayId) -> PickleResult<u64> {
        self.map
            .get(&id)
            .copied()
            .ok_or(PickleError::UnknownArrayId(id.as_u64()))
    }

    /// Assign the next dense id to `id`. Idempotent: an already-present id
    /// keeps its original entry.
    pub(crate) fn insert_next(&mut self, id: ArrayId) -> u64 {
        if let Some(&dense) = self.map.get(&id) {
            return dense;
        }
        let dense = self.next_dense;
        self.map.insert(id, dense);
        self.next_dense += 1;
        dense
    }
}

impl Default for RenameMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable handle to a descriptor in a [`DescriptorArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorHandle(usize);

/// Owns every [`ArrayDescriptor`] in the process and the counter that
/// hands out global ids.
///
/// A descriptor never outlives the arena; containers hold their own
/// [`DescriptorHandle`], jobs hold copies. Id assignment is an
/// unsynchronized read-modify-write — callers must not share an arena
/// across threads without external locking.
#[derive(Debug, Default)]
pub struct DescriptorArena {
    slots: Vec<ArrayDescriptor>,
    // Global ids start at 1; 0 is the "unassigned" marker.
    next_id: u64,
}

impl DescriptorArena {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            next_id: 1,
        }
    }

    /// Move `descriptor` into the arena, returning its handle.
    pub fn insert(&mut self, descriptor: ArrayDescriptor) -> DescriptorHandle {
        let handle = DescriptorHandle(self.slots.len());
        self.slots.push(descriptor);
        handle
    }

    #[inline]
    pub fn get(&self, handle: DescriptorHandle) -> &ArrayDescriptor {
        &self.slots[handle.0]
    }

    #[inline]
    pub fn get_mut(&mut self, handle: DescriptorHandle) -> &mut ArrayDescriptor {
        &mut self.slots[handle.0]
    }

    /// Number of descriptors in the arena.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Global id of the descriptor behind `handle`, assigning one from the
    /// arena's counter on first call. Idempotent: later calls return the
    /// same id, never reassign.
    pub fn identity(&mut self, handle: DescriptorHandle) -> ArrayId {
        let desc = &mut self.slots[handle.0];
        if !desc.id.is_assigned() {
            desc.id = ArrayId(self.next_id);
            self.next_id += 1;
        }
        desc.id
    }

    /// Declare that `array`'s elements are addressed by the values stored
    /// in `index_array` ("this neighbor array is addressed by this offset
    /// array"). Assigns `index_array` an identity if it has none.
    pub fn link_indexed_by(&mut self, array: DescriptorHandle, index_array: DescriptorHandle) {
        let index_id = self.identity(index_array);
        self.slots[array.0].indexed_by = index_id;
    }
}

/// Contract a container implements to participate in prefetch jobs.
///
/// The container describes its own backing storage and keeps its
/// descriptor handle around so the same descriptor (and therefore the same
/// global id) is reused across jobs.
pub trait DescriptorProvider {
    /// Virtual byte range of the container's backing storage.
    fn address_range(&self) -> AddressRange;

    /// Bytes per element of the backing storage.
    fn element_size(&self) -> u64;

    /// Handle to this container's descriptor, created in `arena` on the
    /// first call and reused afterwards.
    fn descriptor(&mut self, arena: &mut DescriptorArena) -> DescriptorHandle;
}
