//! Per-binding-object storage for the resource handles currently bound to each slot.
//!
//! A [`ResourceCache`] is allocated when a binding object is created from a pipeline: one slot
//! per `(set, cache offset)` pair the layout declares, at array-element granularity. Slots
//! record the expected resource category and the owning variable's update-frequency class at
//! initialization and never change them afterwards; only the bound handle varies.
//!
//! The cache is exclusively owned and mutated by one thread at a time. The exception is the
//! static-resource cache inside a shared shader/pipeline, which becomes immutable after its
//! one-time initialization and is then read concurrently by many binding contexts.

use crate::{
    device::{ContextId, DescriptorSetHandle, DeviceObject},
    pipeline::layout::ResourceClass,
    shader::resources::{ResourceCategory, ResourceViewKind},
};
use smallvec::SmallVec;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    sync::Arc,
};

/// Error returned when a bind or unbind request violates the cache's policy.
///
/// None of these corrupt the cache: the previous binding is always preserved, the operation is
/// a no-op, and the caller is expected to log and continue.
#[derive(Clone, Debug)]
pub enum BindError {
    /// The `(set, offset)` pair does not exist in this cache.
    SlotOutOfRange { set: u32, offset: u32 },

    /// The handle's view kind does not match what the slot's category requires.
    CategoryMismatch {
        slot_category: ResourceCategory,
        view_kind: ResourceViewKind,
    },

    /// The slot already holds a resource and the owning variable is not dynamic. A resource
    /// that may still be in flight on the GPU must not be silently replaced.
    SlotOccupied { class: ResourceClass },

    /// The slot is backed by an immutable sampler and never receives a resource.
    ImmutableSamplerSlot,
}

impl Error for BindError {}

impl Display for BindError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            BindError::SlotOutOfRange { set, offset } => {
                write!(f, "slot (set {}, offset {}) is out of range", set, offset)
            }
            BindError::CategoryMismatch {
                slot_category,
                view_kind,
            } => write!(
                f,
                "the resource exposes a {:?} view, which cannot be bound to a {} slot",
                view_kind, slot_category,
            ),
            BindError::SlotOccupied { class } => write!(
                f,
                "the slot already holds a resource and its variable class ({:?}) does not allow \
                rebinding",
                class,
            ),
            BindError::ImmutableSamplerSlot => {
                write!(f, "the slot is permanently backed by an immutable sampler")
            }
        }
    }
}

#[derive(Debug)]
struct Slot {
    category: ResourceCategory,
    class: ResourceClass,
    immutable_sampler: bool,
    object: Option<Arc<dyn DeviceObject>>,
}

#[derive(Debug)]
struct CacheSet {
    declared_size: u32,
    slots: Vec<Slot>,
    native_set: Option<DescriptorSetHandle>,
}

/// The bound-resource storage of one binding object.
#[derive(Debug)]
pub struct ResourceCache {
    sets: SmallVec<[CacheSet; 2]>,
    // Bound slots whose resource is frequently-updated and whose category takes a per-draw
    // offset. Sizes the dynamic-offset array at commit time.
    dynamic_buffer_count: u32,
}

impl ResourceCache {
    // Layouts create caches; the two-step initialization below (declare sizes, then describe
    // slots in offset order) is crate-internal.
    pub(crate) fn with_set_sizes(set_sizes: &[u32]) -> ResourceCache {
        ResourceCache {
            sets: set_sizes
                .iter()
                .map(|&size| CacheSet {
                    declared_size: size,
                    slots: Vec::with_capacity(size as usize),
                    native_set: None,
                })
                .collect(),
            dynamic_buffer_count: 0,
        }
    }

    // Describes `array_size` consecutive slots starting at the set's next free offset. Slots
    // must be described in strictly increasing offset order, exactly once each.
    pub(crate) fn init_slots(
        &mut self,
        set: u32,
        offset: u32,
        array_size: u32,
        category: ResourceCategory,
        class: ResourceClass,
        immutable_sampler: bool,
    ) {
        let set = &mut self.sets[set as usize];
        debug_assert_eq!(
            set.slots.len(),
            offset as usize,
            "cache slots must be initialized in offset order",
        );
        debug_assert!(offset + array_size <= set.declared_size);
        for _ in 0..array_size {
            set.slots.push(Slot {
                category,
                class,
                immutable_sampler,
                object: None,
            });
        }
    }

    #[cfg(debug_assertions)]
    pub(crate) fn verify_fully_initialized(&self) {
        for (index, set) in self.sets.iter().enumerate() {
            debug_assert_eq!(
                set.slots.len(),
                set.declared_size as usize,
                "set {} has uninitialized cache slots",
                index,
            );
        }
    }

    /// The number of descriptor sets the cache spans.
    #[inline]
    pub fn set_count(&self) -> u32 {
        self.sets.len() as u32
    }

    /// The number of slots in one set.
    #[inline]
    pub fn set_size(&self, set: u32) -> u32 {
        self.sets[set as usize].declared_size
    }

    /// The native descriptor set currently associated with `set`, if one has been assigned.
    #[inline]
    pub fn native_set(&self, set: u32) -> Option<DescriptorSetHandle> {
        self.sets[set as usize].native_set
    }

    /// Associates an allocated native descriptor set with `set`. For the slowly-changing set
    /// this happens once at binding-object creation; for the per-draw set it happens before
    /// every commit.
    #[inline]
    pub fn assign_native_set(&mut self, set: u32, handle: DescriptorSetHandle) {
        self.sets[set as usize].native_set = Some(handle);
    }

    /// The resource currently bound at `(set, offset)`.
    #[inline]
    pub fn bound_object(&self, set: u32, offset: u32) -> Option<&Arc<dyn DeviceObject>> {
        self.sets
            .get(set as usize)
            .and_then(|s| s.slots.get(offset as usize))
            .and_then(|slot| slot.object.as_ref())
    }

    /// The category a slot was initialized with.
    #[inline]
    pub fn slot_category(&self, set: u32, offset: u32) -> Option<ResourceCategory> {
        self.sets
            .get(set as usize)
            .and_then(|s| s.slots.get(offset as usize))
            .map(|slot| slot.category)
    }

    /// The update-frequency class of the variable owning a slot.
    #[inline]
    pub fn slot_class(&self, set: u32, offset: u32) -> Option<ResourceClass> {
        self.sets
            .get(set as usize)
            .and_then(|s| s.slots.get(offset as usize))
            .map(|slot| slot.class)
    }

    /// The number of bound slots whose resource needs a per-draw offset.
    #[inline]
    pub fn dynamic_buffer_count(&self) -> u32 {
        self.dynamic_buffer_count
    }

    /// Binds `object` at `(set, offset)`.
    ///
    /// The bind is refused — leaving the previous binding intact — if the handle's view kind
    /// does not match the slot's category, or if the slot already holds a resource and its
    /// variable class is not [`ResourceClass::Dynamic`].
    pub fn bind(
        &mut self,
        set: u32,
        offset: u32,
        object: Arc<dyn DeviceObject>,
    ) -> Result<(), BindError> {
        let slot = self.slot_mut(set, offset)?;

        if slot.immutable_sampler {
            return Err(BindError::ImmutableSamplerSlot);
        }

        let view_kind = object.view_kind();
        if slot.category.required_view_kind() != view_kind {
            return Err(BindError::CategoryMismatch {
                slot_category: slot.category,
                view_kind,
            });
        }

        if slot.object.is_some() && slot.class != ResourceClass::Dynamic {
            return Err(BindError::SlotOccupied { class: slot.class });
        }

        let counts = slot.category.takes_dynamic_offset();
        let old_dynamic = counts
            && slot
                .object
                .as_ref()
                .is_some_and(|old| old.is_frequently_updated());
        let new_dynamic = counts && object.is_frequently_updated();

        slot.object = Some(object);

        if old_dynamic {
            self.dynamic_buffer_count -= 1;
        }
        if new_dynamic {
            self.dynamic_buffer_count += 1;
        }
        Ok(())
    }

    /// Removes the resource bound at `(set, offset)` and returns it.
    ///
    /// Follows the same policy as [`bind`](Self::bind): an occupied non-dynamic slot cannot be
    /// cleared. Unbinding an empty slot is a no-op returning `None`.
    pub fn unbind(
        &mut self,
        set: u32,
        offset: u32,
    ) -> Result<Option<Arc<dyn DeviceObject>>, BindError> {
        let slot = self.slot_mut(set, offset)?;

        if slot.immutable_sampler {
            return Err(BindError::ImmutableSamplerSlot);
        }
        if slot.object.is_some() && slot.class != ResourceClass::Dynamic {
            return Err(BindError::SlotOccupied { class: slot.class });
        }

        let old = slot.object.take();
        if slot.category.takes_dynamic_offset()
            && old.as_ref().is_some_and(|old| old.is_frequently_updated())
        {
            self.dynamic_buffer_count -= 1;
        }
        Ok(old)
    }

    // Used when propagating static resources between caches: the destination slot is known to
    // be empty and the policy checks have already been applied on the source side.
    pub(crate) fn copy_binding(&mut self, set: u32, offset: u32, object: Arc<dyn DeviceObject>) {
        let slot = &mut self.sets[set as usize].slots[offset as usize];
        debug_assert!(slot.object.is_none());
        debug_assert_eq!(slot.category.required_view_kind(), object.view_kind());
        if slot.category.takes_dynamic_offset() && object.is_frequently_updated() {
            self.dynamic_buffer_count += 1;
        }
        slot.object = Some(object);
    }

    /// Returns `true` iff every slot that is not backed by an immutable sampler holds a
    /// resource. A binding object must satisfy this before it can be committed to a draw.
    pub fn is_fully_bound(&self) -> bool {
        self.sets.iter().all(|set| {
            set.slots
                .iter()
                .all(|slot| slot.immutable_sampler || slot.object.is_some())
        })
    }

    /// The first unbound slot, for diagnostics.
    pub fn first_unbound(&self) -> Option<(u32, u32)> {
        self.sets.iter().enumerate().find_map(|(set, cache_set)| {
            cache_set
                .slots
                .iter()
                .position(|slot| !slot.immutable_sampler && slot.object.is_none())
                .map(|offset| (set as u32, offset as u32))
        })
    }

    /// Appends the per-draw byte offset of every bound frequently-updated buffer to `offsets`
    /// and returns how many were written.
    ///
    /// Offsets are emitted in the order the native binding call consumes them: sets in index
    /// order, and within each set uniform buffers first, then storage buffers — the
    /// front-loaded order the slot allocator established. Each offset is obtained from the
    /// bound object's current position in the ring buffer of `ctx`, so this must run on the
    /// thread owning that context, immediately before the draw.
    pub fn dynamic_offsets(&self, ctx: ContextId, offsets: &mut Vec<u32>) -> u32 {
        let mut written = 0;
        for set in &self.sets {
            let mut slots = set.slots.iter().peekable();

            while let Some(slot) =
                slots.next_if(|slot| slot.category == ResourceCategory::UniformBuffer)
            {
                written += push_offset(slot, ctx, offsets);
            }
            while let Some(slot) = slots.next_if(|slot| slot.category.takes_dynamic_offset()) {
                written += push_offset(slot, ctx, offsets);
            }
            debug_assert!(
                slots.all(|slot| !slot.category.takes_dynamic_offset()),
                "offset-taking buffers must be front-loaded in every set",
            );
        }
        written
    }

    fn slot_mut(&mut self, set: u32, offset: u32) -> Result<&mut Slot, BindError> {
        self.sets
            .get_mut(set as usize)
            .and_then(|s| s.slots.get_mut(offset as usize))
            .ok_or(BindError::SlotOutOfRange { set, offset })
    }
}

fn push_offset(slot: &Slot, ctx: ContextId, offsets: &mut Vec<u32>) -> u32 {
    match &slot.object {
        Some(object) if object.is_frequently_updated() => {
            offsets.push(object.dynamic_offset(ctx));
            1
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{MockBuffer, MockTexture};

    // One set: UB (static), UB (dynamic), RW storage buffer (dynamic), sampled image (mutable).
    fn cache() -> ResourceCache {
        let mut cache = ResourceCache::with_set_sizes(&[4]);
        cache.init_slots(
            0,
            0,
            1,
            ResourceCategory::UniformBuffer,
            ResourceClass::Static,
            false,
        );
        cache.init_slots(
            0,
            1,
            1,
            ResourceCategory::UniformBuffer,
            ResourceClass::Dynamic,
            false,
        );
        cache.init_slots(
            0,
            2,
            1,
            ResourceCategory::StorageBufferReadWrite,
            ResourceClass::Dynamic,
            false,
        );
        cache.init_slots(
            0,
            3,
            1,
            ResourceCategory::SampledImage,
            ResourceClass::Mutable,
            false,
        );
        cache
    }

    #[test]
    fn binding_every_slot_makes_it_fully_bound() {
        let mut cache = cache();
        assert!(!cache.is_fully_bound());

        cache
            .bind(0, 0, MockBuffer::uniform("cb0"))
            .unwrap();
        cache
            .bind(0, 1, MockBuffer::uniform("cb1"))
            .unwrap();
        cache
            .bind(0, 2, MockBuffer::storage("sb0"))
            .unwrap();
        cache
            .bind(0, 3, MockTexture::sampled("tex"))
            .unwrap();
        assert!(cache.is_fully_bound());

        cache.unbind(0, 1).unwrap();
        assert!(!cache.is_fully_bound());
        assert_eq!(cache.first_unbound(), Some((0, 1)));
    }

    #[test]
    fn wrong_category_is_rejected_and_preserves_previous_binding() {
        let mut cache = cache();
        cache.bind(0, 3, MockTexture::sampled("tex")).unwrap();

        let err = cache
            .bind(0, 3, MockTexture::storage("uav"))
            .unwrap_err();
        assert!(matches!(err, BindError::CategoryMismatch { .. }));
        assert_eq!(cache.bound_object(0, 3).unwrap().name(), "tex");
    }

    #[test]
    fn non_dynamic_slots_are_write_once() {
        let mut cache = cache();
        cache.bind(0, 0, MockBuffer::uniform("a")).unwrap();

        let err = cache.bind(0, 0, MockBuffer::uniform("b")).unwrap_err();
        assert!(matches!(err, BindError::SlotOccupied { .. }));
        assert_eq!(cache.bound_object(0, 0).unwrap().name(), "a");

        // The mutable image slot follows the same policy.
        cache.bind(0, 3, MockTexture::sampled("t0")).unwrap();
        assert!(cache.bind(0, 3, MockTexture::sampled("t1")).is_err());
    }

    #[test]
    fn dynamic_slots_can_be_rebound() {
        let mut cache = cache();
        cache.bind(0, 1, MockBuffer::uniform("a")).unwrap();
        cache.bind(0, 1, MockBuffer::uniform("b")).unwrap();
        assert_eq!(cache.bound_object(0, 1).unwrap().name(), "b");
    }

    #[test]
    fn rebinding_the_same_dynamic_handle_keeps_the_counter() {
        let mut cache = cache();
        let ring = MockBuffer::uniform_ring("ring", 256);

        cache.bind(0, 1, ring.clone()).unwrap();
        assert_eq!(cache.dynamic_buffer_count(), 1);
        cache.bind(0, 1, ring.clone()).unwrap();
        assert_eq!(cache.dynamic_buffer_count(), 1);

        let unbound = cache.unbind(0, 1).unwrap().unwrap();
        assert_eq!(cache.dynamic_buffer_count(), 0);
        cache.bind(0, 1, unbound).unwrap();
        assert_eq!(cache.dynamic_buffer_count(), 1);
    }

    #[test]
    fn counter_tracks_frequently_updated_transitions() {
        let mut cache = cache();
        cache.bind(0, 1, MockBuffer::uniform("plain")).unwrap();
        assert_eq!(cache.dynamic_buffer_count(), 0);

        // Dynamic slot: plain buffer replaced by a ring-backed one, and back.
        cache
            .bind(0, 1, MockBuffer::uniform_ring("ring", 64))
            .unwrap();
        assert_eq!(cache.dynamic_buffer_count(), 1);
        cache.bind(0, 1, MockBuffer::uniform("plain")).unwrap();
        assert_eq!(cache.dynamic_buffer_count(), 0);
    }

    #[test]
    fn dynamic_offsets_are_front_loaded_and_skip_plain_buffers() {
        let mut cache = cache();
        cache.bind(0, 0, MockBuffer::uniform("plain")).unwrap();
        cache
            .bind(0, 1, MockBuffer::uniform_ring("ub_ring", 128))
            .unwrap();
        cache
            .bind(0, 2, MockBuffer::storage_ring("sb_ring", 512))
            .unwrap();
        cache.bind(0, 3, MockTexture::sampled("tex")).unwrap();

        let mut offsets = Vec::new();
        let written = cache.dynamic_offsets(ContextId(0), &mut offsets);
        assert_eq!(written, 2);
        // Uniform ring first, storage ring second, nothing for the plain buffer.
        assert_eq!(offsets, [128, 512]);
        assert_eq!(written, cache.dynamic_buffer_count());
    }
}
