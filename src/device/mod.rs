//! Traits through which the excluded collaborators are reached.
//!
//! This subsystem owns no GPU objects of its own. Three narrow interfaces connect it to the
//! rest of an engine:
//!
//! - [`Device`] — the native graphics device. Allocates and destroys the backend's
//!   set-layout/pipeline-layout equivalents, creates sampler objects for immutable-sampler
//!   rules, and performs descriptor writes.
//! - [`DeviceObject`] — a resource handle supplied by the device object layer (a buffer,
//!   buffer view, texture view or sampler). Exposes the view kind used for bind-time category
//!   validation and, for frequently-updated buffers, the per-context ring-buffer offset.
//! - [`DescriptorBinder`] — the GPU submission path that receives the prepared descriptor sets
//!   and resolved dynamic offsets immediately before a draw.
//!
//! Handles are opaque `u64` newtypes; their meaning is entirely up to the backend.

use crate::{
    descriptor_set::layout::SetLayoutBinding,
    sampler::SamplerCreateInfo,
    shader::resources::{ResourceCategory, ResourceViewKind},
};
use std::{
    error::Error,
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    sync::Arc,
};

/// Backend handle to a native descriptor-set-layout equivalent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct SetLayoutHandle(pub u64);

/// Backend handle to a native pipeline-layout equivalent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct PipelineLayoutHandle(pub u64);

/// Backend handle to one allocated descriptor set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct DescriptorSetHandle(pub u64);

/// Identifies the thread-affine context whose ring-buffer allocations a dynamic offset is
/// resolved against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ContextId(pub u32);

/// Capabilities of the backend that influence layout construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceFeatures {
    /// Whether the backend's shader model allows an immutable sampler to be assigned to an
    /// array resource. When `false`, immutable-sampler rules matching array resources are
    /// dropped with a warning.
    pub immutable_sampler_arrays: bool,
}

/// Error returned by the native device collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceError {
    /// There is no memory available on the host.
    OutOfHostMemory,
    /// There is no memory available on the device.
    OutOfDeviceMemory,
    /// Object creation could not be completed for backend-specific reasons.
    InitializationFailed,
}

impl Error for DeviceError {}

impl Display for DeviceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DeviceError::OutOfHostMemory => write!(f, "no memory available on the host"),
            DeviceError::OutOfDeviceMemory => {
                write!(f, "no memory available on the graphics device")
            }
            DeviceError::InitializationFailed => {
                write!(f, "object initialization failed on the device")
            }
        }
    }
}

/// One descriptor update, handed to [`Device::update_descriptor`].
#[derive(Clone, Debug)]
pub struct DescriptorWrite<'a> {
    /// The binding slot within the target set.
    pub binding: u32,
    /// The array element within the binding.
    pub array_element: u32,
    /// The category of the slot, which dictates the native descriptor type.
    pub category: ResourceCategory,
    /// The resource whose descriptor is written.
    pub object: &'a Arc<dyn DeviceObject>,
}

/// The native graphics device, as far as this subsystem is concerned.
pub trait Device: Debug + Send + Sync {
    /// The capabilities relevant to layout construction.
    fn features(&self) -> DeviceFeatures;

    /// Creates the native equivalent of a descriptor set layout from an ordered binding list.
    fn create_set_layout(
        &self,
        bindings: &[SetLayoutBinding],
    ) -> Result<SetLayoutHandle, DeviceError>;

    /// Destroys a layout previously returned by
    /// [`create_set_layout`](Device::create_set_layout).
    fn destroy_set_layout(&self, layout: SetLayoutHandle);

    /// Creates the native pipeline-wide layout from the finalized set layouts, in set-index
    /// order.
    fn create_pipeline_layout(
        &self,
        set_layouts: &[SetLayoutHandle],
    ) -> Result<PipelineLayoutHandle, DeviceError>;

    /// Destroys a layout previously returned by
    /// [`create_pipeline_layout`](Device::create_pipeline_layout).
    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle);

    /// Creates a real sampler object for an immutable-sampler rule.
    fn create_sampler(
        &self,
        create_info: &SamplerCreateInfo,
    ) -> Result<Arc<dyn DeviceObject>, DeviceError>;

    /// Writes one descriptor into an allocated set.
    fn update_descriptor(&self, set: DescriptorSetHandle, write: &DescriptorWrite<'_>);
}

/// A resource handle supplied by the device object layer.
///
/// Implementations are expected to be cheap, thread-safe views onto the underlying GPU object;
/// the cache holds them by `Arc` and releases them when the binding object is destroyed or the
/// slot is rebound.
pub trait DeviceObject: Debug + Send + Sync {
    /// The object's diagnostic name.
    fn name(&self) -> &str;

    /// The view this handle exposes; must equal the bound slot's
    /// [required view kind](ResourceCategory::required_view_kind).
    fn view_kind(&self) -> ResourceViewKind;

    /// Whether the object is backed by a per-context ring allocation and therefore needs a
    /// per-draw byte offset at commit time.
    fn is_frequently_updated(&self) -> bool {
        false
    }

    /// The current byte offset of the object's allocation within the given context's ring
    /// buffer. Only meaningful when [`is_frequently_updated`](DeviceObject::is_frequently_updated)
    /// returns `true`; must be called from the thread that owns `ctx`.
    fn dynamic_offset(&self, ctx: ContextId) -> u32 {
        let _ = ctx;
        0
    }

    /// For texture views: the sampler object associated with the view, if any. When a separate
    /// image is implicitly paired with a sampler variable through a combined-sampler naming
    /// convention, binding the view also binds this sampler into the paired slot.
    fn paired_sampler(&self) -> Option<Arc<dyn DeviceObject>> {
        None
    }
}

/// The GPU submission path: receives the final descriptor-set binding call.
pub trait DescriptorBinder {
    /// Binds `sets` (in set-index order, starting at `first_set`) with the given dynamic
    /// offsets, using `pipeline_layout`.
    fn bind_descriptor_sets(
        &mut self,
        pipeline_layout: PipelineLayoutHandle,
        first_set: u32,
        sets: &[DescriptorSetHandle],
        dynamic_offsets: &[u32],
    );
}
