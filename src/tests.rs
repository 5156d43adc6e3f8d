//! Mock collaborators shared by the unit tests: a recording device and plain-struct resource
//! handles standing in for the device object layer.

use crate::{
    descriptor_set::layout::SetLayoutBinding,
    device::{
        ContextId, DescriptorBinder, DescriptorSetHandle, DescriptorWrite, Device, DeviceError,
        DeviceFeatures, DeviceObject, PipelineLayoutHandle, SetLayoutHandle,
    },
    sampler::SamplerCreateInfo,
    shader::resources::ResourceViewKind,
};
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex,
};

// Tests that exercise the logged-error paths call this so the messages show up under
// `RUST_LOG=error cargo test -- --nocapture`.
pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug)]
pub(crate) struct MockDevice {
    features: DeviceFeatures,
    next_handle: AtomicU64,
    destroyed_set_layouts: Mutex<Vec<SetLayoutHandle>>,
    destroyed_pipeline_layouts: Mutex<Vec<PipelineLayoutHandle>>,
    descriptor_writes: AtomicUsize,
    samplers_created: AtomicUsize,
}

impl MockDevice {
    pub(crate) fn new() -> Arc<MockDevice> {
        Self::with_features(DeviceFeatures::default())
    }

    pub(crate) fn with_sampler_arrays() -> Arc<MockDevice> {
        Self::with_features(DeviceFeatures {
            immutable_sampler_arrays: true,
        })
    }

    fn with_features(features: DeviceFeatures) -> Arc<MockDevice> {
        Arc::new(MockDevice {
            features,
            next_handle: AtomicU64::new(1),
            destroyed_set_layouts: Mutex::new(Vec::new()),
            destroyed_pipeline_layouts: Mutex::new(Vec::new()),
            descriptor_writes: AtomicUsize::new(0),
            samplers_created: AtomicUsize::new(0),
        })
    }

    fn next_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn set_layout_destroyed(&self, handle: SetLayoutHandle) -> bool {
        self.destroyed_set_layouts.lock().unwrap().contains(&handle)
    }

    pub(crate) fn pipeline_layout_destroyed(&self, handle: PipelineLayoutHandle) -> bool {
        self.destroyed_pipeline_layouts
            .lock()
            .unwrap()
            .contains(&handle)
    }

    pub(crate) fn descriptor_writes(&self) -> usize {
        self.descriptor_writes.load(Ordering::Relaxed)
    }

    pub(crate) fn samplers_created(&self) -> usize {
        self.samplers_created.load(Ordering::Relaxed)
    }
}

impl Device for MockDevice {
    fn features(&self) -> DeviceFeatures {
        self.features
    }

    fn create_set_layout(
        &self,
        bindings: &[SetLayoutBinding],
    ) -> Result<SetLayoutHandle, DeviceError> {
        assert!(bindings.windows(2).all(|w| w[0].binding < w[1].binding));
        Ok(SetLayoutHandle(self.next_handle()))
    }

    fn destroy_set_layout(&self, layout: SetLayoutHandle) {
        self.destroyed_set_layouts.lock().unwrap().push(layout);
    }

    fn create_pipeline_layout(
        &self,
        _set_layouts: &[SetLayoutHandle],
    ) -> Result<PipelineLayoutHandle, DeviceError> {
        Ok(PipelineLayoutHandle(self.next_handle()))
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle) {
        self.destroyed_pipeline_layouts.lock().unwrap().push(layout);
    }

    fn create_sampler(
        &self,
        _create_info: &SamplerCreateInfo,
    ) -> Result<Arc<dyn DeviceObject>, DeviceError> {
        let index = self.samplers_created.fetch_add(1, Ordering::Relaxed);
        Ok(MockSampler::new(format!("immutable_sampler_{}", index)))
    }

    fn update_descriptor(&self, _set: DescriptorSetHandle, _write: &DescriptorWrite<'_>) {
        self.descriptor_writes.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub(crate) struct MockBuffer {
    name: String,
    view: ResourceViewKind,
    ring_offset: Option<u32>,
}

impl MockBuffer {
    pub(crate) fn uniform(name: &str) -> Arc<dyn DeviceObject> {
        Arc::new(MockBuffer {
            name: name.to_owned(),
            view: ResourceViewKind::UniformBuffer,
            ring_offset: None,
        })
    }

    pub(crate) fn storage(name: &str) -> Arc<dyn DeviceObject> {
        Arc::new(MockBuffer {
            name: name.to_owned(),
            view: ResourceViewKind::StorageBuffer,
            ring_offset: None,
        })
    }

    /// A uniform buffer suballocated from a per-context ring, reporting `offset` as its
    /// current position.
    pub(crate) fn uniform_ring(name: &str, offset: u32) -> Arc<dyn DeviceObject> {
        Arc::new(MockBuffer {
            name: name.to_owned(),
            view: ResourceViewKind::UniformBuffer,
            ring_offset: Some(offset),
        })
    }

    pub(crate) fn storage_ring(name: &str, offset: u32) -> Arc<dyn DeviceObject> {
        Arc::new(MockBuffer {
            name: name.to_owned(),
            view: ResourceViewKind::StorageBuffer,
            ring_offset: Some(offset),
        })
    }
}

impl DeviceObject for MockBuffer {
    fn name(&self) -> &str {
        &self.name
    }

    fn view_kind(&self) -> ResourceViewKind {
        self.view
    }

    fn is_frequently_updated(&self) -> bool {
        self.ring_offset.is_some()
    }

    fn dynamic_offset(&self, _ctx: ContextId) -> u32 {
        self.ring_offset.unwrap_or(0)
    }
}

#[derive(Debug)]
pub(crate) struct MockTexture {
    name: String,
    view: ResourceViewKind,
    sampler: Option<Arc<dyn DeviceObject>>,
}

impl MockTexture {
    pub(crate) fn sampled(name: &str) -> Arc<dyn DeviceObject> {
        Arc::new(MockTexture {
            name: name.to_owned(),
            view: ResourceViewKind::SampledImage,
            sampler: None,
        })
    }

    /// A shader-resource view carrying its own sampler, as views do when combined-sampler
    /// conventions are in use.
    pub(crate) fn sampled_with_sampler(name: &str, sampler_name: &str) -> Arc<dyn DeviceObject> {
        Arc::new(MockTexture {
            name: name.to_owned(),
            view: ResourceViewKind::SampledImage,
            sampler: Some(MockSampler::new(sampler_name)),
        })
    }

    pub(crate) fn storage(name: &str) -> Arc<dyn DeviceObject> {
        Arc::new(MockTexture {
            name: name.to_owned(),
            view: ResourceViewKind::StorageImage,
            sampler: None,
        })
    }
}

impl DeviceObject for MockTexture {
    fn name(&self) -> &str {
        &self.name
    }

    fn view_kind(&self) -> ResourceViewKind {
        self.view
    }

    fn paired_sampler(&self) -> Option<Arc<dyn DeviceObject>> {
        self.sampler.clone()
    }
}

#[derive(Debug)]
pub(crate) struct MockSampler {
    name: String,
}

impl MockSampler {
    pub(crate) fn new(name: impl Into<String>) -> Arc<dyn DeviceObject> {
        Arc::new(MockSampler { name: name.into() })
    }
}

impl DeviceObject for MockSampler {
    fn name(&self) -> &str {
        &self.name
    }

    fn view_kind(&self) -> ResourceViewKind {
        ResourceViewKind::Sampler
    }
}

#[derive(Debug)]
pub(crate) struct BindCall {
    pub(crate) pipeline_layout: PipelineLayoutHandle,
    pub(crate) first_set: u32,
    pub(crate) sets: Vec<DescriptorSetHandle>,
    pub(crate) dynamic_offsets: Vec<u32>,
}

#[derive(Debug, Default)]
pub(crate) struct MockBinder {
    pub(crate) calls: Vec<BindCall>,
}

impl DescriptorBinder for MockBinder {
    fn bind_descriptor_sets(
        &mut self,
        pipeline_layout: PipelineLayoutHandle,
        first_set: u32,
        sets: &[DescriptorSetHandle],
        dynamic_offsets: &[u32],
    ) {
        self.calls.push(BindCall {
            pipeline_layout,
            first_set,
            sets: sets.to_vec(),
            dynamic_offsets: dynamic_offsets.to_vec(),
        });
    }
}
