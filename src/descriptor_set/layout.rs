//! Describes the layout of all binding slots within one descriptor set.

use crate::{
    device::{Device, DeviceError, DeviceObject, SetLayoutHandle},
    shader::{resources::ResourceCategory, ShaderStages},
};
use std::{
    hash::{Hash, Hasher},
    sync::Arc,
};

/// One binding slot of a descriptor set layout.
#[derive(Clone, Debug)]
pub struct SetLayoutBinding {
    /// The slot number within the set.
    pub binding: u32,

    /// The category of resource bound to the slot, which dictates the native descriptor type.
    pub category: ResourceCategory,

    /// The number of descriptors in the slot (the declared array size).
    pub descriptor_count: u32,

    /// The stages that access the slot.
    pub stages: ShaderStages,

    /// A sampler bound permanently into the layout at build time. Slots with an immutable
    /// sampler never receive a resource through the cache.
    pub immutable_sampler: Option<Arc<dyn DeviceObject>>,
}

impl SetLayoutBinding {
    /// Returns whether two bindings are identically defined to the backend.
    ///
    /// The *identity* of an immutable sampler is deliberately excluded: two layouts that differ
    /// only in which sampler object occupies an immutable slot are still binding-compatible.
    /// Only the presence of an immutable sampler participates.
    #[inline]
    pub fn is_compatible_with(&self, other: &SetLayoutBinding) -> bool {
        self.binding == other.binding
            && self.category == other.category
            && self.descriptor_count == other.descriptor_count
            && self.stages == other.stages
            && self.immutable_sampler.is_some() == other.immutable_sampler.is_some()
    }

    fn hash_shape(&self, hasher: &mut impl Hasher) {
        self.binding.hash(hasher);
        (self.category as u8).hash(hasher);
        self.descriptor_count.hash(hasher);
        self.stages.bits().hash(hasher);
        self.immutable_sampler.is_some().hash(hasher);
    }
}

/// The finalized layout of one descriptor set: an ordered binding list plus the backend's
/// native layout object.
///
/// Within a set, binding numbers strictly increase in list order, and offset-taking buffer
/// bindings come before everything else — both guaranteed by the slot allocator that produced
/// the list.
#[derive(Debug)]
pub struct DescriptorSetLayout {
    device: Arc<dyn Device>,
    handle: SetLayoutHandle,
    set_index: u32,
    bindings: Vec<SetLayoutBinding>,
    total_descriptors: u32,
    dynamic_descriptors: u32,
}

impl DescriptorSetLayout {
    /// Finalizes an ordered binding list into a native layout object.
    pub fn new(
        device: Arc<dyn Device>,
        set_index: u32,
        bindings: Vec<SetLayoutBinding>,
    ) -> Result<DescriptorSetLayout, DeviceError> {
        debug_assert!(bindings.windows(2).all(|w| w[0].binding < w[1].binding));

        let mut total_descriptors = 0;
        let mut dynamic_descriptors = 0;
        for binding in &bindings {
            total_descriptors += binding.descriptor_count;
            if binding.category.takes_dynamic_offset() {
                dynamic_descriptors += binding.descriptor_count;
            }
        }

        let handle = device.create_set_layout(&bindings)?;

        Ok(DescriptorSetLayout {
            device,
            handle,
            set_index,
            bindings,
            total_descriptors,
            dynamic_descriptors,
        })
    }

    /// The native layout handle.
    #[inline]
    pub fn handle(&self) -> SetLayoutHandle {
        self.handle
    }

    /// The set index this layout occupies in its pipeline layout.
    #[inline]
    pub fn set_index(&self) -> u32 {
        self.set_index
    }

    /// The bindings, in binding-number order.
    #[inline]
    pub fn bindings(&self) -> &[SetLayoutBinding] {
        &self.bindings
    }

    /// The total number of descriptors across all bindings, counting array elements. This is
    /// also the number of cache slots a [`ResourceCache`](super::cache::ResourceCache) set
    /// allocates for this layout.
    #[inline]
    pub fn total_descriptors(&self) -> u32 {
        self.total_descriptors
    }

    /// The number of descriptors that take a per-draw offset (uniform and storage buffers,
    /// counting array elements).
    #[inline]
    pub fn dynamic_descriptors(&self) -> u32 {
        self.dynamic_descriptors
    }

    /// Returns whether `self` and `other` are identically defined, binding for binding.
    /// Immutable sampler identity is excluded from the comparison.
    pub fn is_compatible_with(&self, other: &DescriptorSetLayout) -> bool {
        self.bindings.len() == other.bindings.len()
            && self
                .bindings
                .iter()
                .zip(other.bindings.iter())
                .all(|(a, b)| a.is_compatible_with(b))
    }

    pub(crate) fn hash_shape(&self, hasher: &mut impl Hasher) {
        self.bindings.len().hash(hasher);
        for binding in &self.bindings {
            binding.hash_shape(hasher);
        }
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        self.device.destroy_set_layout(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{MockDevice, MockSampler};

    fn binding(num: u32, category: ResourceCategory, count: u32) -> SetLayoutBinding {
        SetLayoutBinding {
            binding: num,
            category,
            descriptor_count: count,
            stages: ShaderStages::FRAGMENT,
            immutable_sampler: None,
        }
    }

    #[test]
    fn counts_total_and_dynamic_descriptors() {
        let device = MockDevice::new();
        let layout = DescriptorSetLayout::new(
            device,
            0,
            vec![
                binding(0, ResourceCategory::UniformBuffer, 1),
                binding(1, ResourceCategory::StorageBufferReadWrite, 3),
                binding(2, ResourceCategory::SampledImage, 4),
            ],
        )
        .unwrap();

        assert_eq!(layout.total_descriptors(), 8);
        assert_eq!(layout.dynamic_descriptors(), 4);
    }

    #[test]
    fn compatibility_ignores_immutable_sampler_identity() {
        let device = MockDevice::new();

        let with_sampler = |sampler: Option<Arc<dyn DeviceObject>>| {
            DescriptorSetLayout::new(
                device.clone(),
                0,
                vec![SetLayoutBinding {
                    binding: 0,
                    category: ResourceCategory::Sampler,
                    descriptor_count: 1,
                    stages: ShaderStages::FRAGMENT,
                    immutable_sampler: sampler,
                }],
            )
            .unwrap()
        };

        let a = with_sampler(Some(MockSampler::new("s0")));
        let b = with_sampler(Some(MockSampler::new("s1")));
        let c = with_sampler(None);

        assert!(a.is_compatible_with(&b));
        assert!(!a.is_compatible_with(&c));
    }

    #[test]
    fn compatibility_requires_identical_binding_shape() {
        let device = MockDevice::new();
        let build = |category| {
            DescriptorSetLayout::new(device.clone(), 0, vec![binding(0, category, 1)]).unwrap()
        };

        let a = build(ResourceCategory::UniformBuffer);
        let b = build(ResourceCategory::UniformBuffer);
        let c = build(ResourceCategory::StorageBufferReadOnly);

        assert!(a.is_compatible_with(&b));
        assert!(!a.is_compatible_with(&c));
    }

    #[test]
    fn releases_native_layout_on_drop() {
        let device = MockDevice::new();
        let layout = DescriptorSetLayout::new(
            device.clone(),
            0,
            vec![binding(0, ResourceCategory::UniformBuffer, 1)],
        )
        .unwrap();
        let handle = layout.handle();
        drop(layout);
        assert!(device.set_layout_destroyed(handle));
    }
}
