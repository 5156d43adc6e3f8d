//! The normalized model of a compiled shader's declared resources.
//!
//! [`ShaderResourceTable::build`] walks a [`ShaderReflection`] once and produces an immutable
//! table in which every declared resource is one [`ResourceAttributes`] record. The records live
//! in a single contiguous allocation, grouped by [`ResourceCategory`] in a fixed order, so that
//! the boundaries of every category sub-range can be derived from the group sizes alone.
//!
//! Samplers are grouped ahead of separate images. This is a load-bearing ordering contract:
//! when a combined-sampler naming convention is in use, the sampler implicitly paired with a
//! separate image must already exist in the table by the time the image's pairing is resolved.
//!
//! The table is built once when a shader is compiled or loaded, then shared read-only (via
//! `Arc`) by every pipeline that uses the shader.

use crate::shader::{ShaderReflection, ShaderStage};
use foldhash::{HashMap, HashMapExt};
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    hash::{BuildHasher, Hash, Hasher},
    ops::Range,
    sync::Arc,
};

/// Sentinel value for a [`ResourceAttributes`] bind point that carries no backend register.
pub const INVALID_BIND_POINT: u16 = u16::MAX;

/// The kind of GPU object a shader resource slot refers to.
///
/// The discriminant order is the category group order inside a [`ShaderResourceTable`]:
/// uniform buffers first, then storage buffers, and [`Sampler`](ResourceCategory::Sampler)
/// strictly before [`SampledImage`](ResourceCategory::SampledImage).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ResourceCategory {
    /// A uniform (constant) buffer.
    UniformBuffer = 0,
    /// A read-only structured or byte-address storage buffer.
    StorageBufferReadOnly = 1,
    /// A read-write storage buffer.
    StorageBufferReadWrite = 2,
    /// A formatted buffer read through a texel view.
    UniformTexelBuffer = 3,
    /// A formatted buffer written through a texel view.
    StorageTexelBuffer = 4,
    /// An image written from the shader.
    StorageImage = 5,
    /// An image sampled through a sampler that is part of the same declaration
    /// (GLSL `sampler2D`).
    CombinedImageSampler = 6,
    /// An atomic counter, backed by storage-buffer memory.
    AtomicCounter = 7,
    /// A standalone sampler declaration.
    Sampler = 8,
    /// An image sampled through a separately declared sampler (HLSL `Texture2D`).
    SampledImage = 9,
    /// A render-pass input attachment.
    InputAttachment = 10,
}

impl ResourceCategory {
    /// All categories, in group order.
    pub const ALL: [ResourceCategory; 11] = [
        ResourceCategory::UniformBuffer,
        ResourceCategory::StorageBufferReadOnly,
        ResourceCategory::StorageBufferReadWrite,
        ResourceCategory::UniformTexelBuffer,
        ResourceCategory::StorageTexelBuffer,
        ResourceCategory::StorageImage,
        ResourceCategory::CombinedImageSampler,
        ResourceCategory::AtomicCounter,
        ResourceCategory::Sampler,
        ResourceCategory::SampledImage,
        ResourceCategory::InputAttachment,
    ];

    pub(crate) const COUNT: usize = 11;

    /// Returns the view kind a resource handle must expose to be bindable to a slot of this
    /// category.
    #[inline]
    pub fn required_view_kind(self) -> ResourceViewKind {
        match self {
            ResourceCategory::UniformBuffer => ResourceViewKind::UniformBuffer,
            ResourceCategory::StorageBufferReadOnly
            | ResourceCategory::StorageBufferReadWrite
            | ResourceCategory::AtomicCounter => ResourceViewKind::StorageBuffer,
            ResourceCategory::UniformTexelBuffer | ResourceCategory::StorageTexelBuffer => {
                ResourceViewKind::TexelBuffer
            }
            ResourceCategory::StorageImage => ResourceViewKind::StorageImage,
            ResourceCategory::CombinedImageSampler
            | ResourceCategory::SampledImage
            | ResourceCategory::InputAttachment => ResourceViewKind::SampledImage,
            ResourceCategory::Sampler => ResourceViewKind::Sampler,
        }
    }

    /// Whether slots of this category are bound with a per-draw byte offset when the bound
    /// buffer is backed by a per-context ring allocation.
    #[inline]
    pub fn takes_dynamic_offset(self) -> bool {
        matches!(
            self,
            ResourceCategory::UniformBuffer
                | ResourceCategory::StorageBufferReadOnly
                | ResourceCategory::StorageBufferReadWrite
        )
    }

    /// The slot-allocation pass this category is assigned in: uniform-buffer-like resources
    /// are placed first in every set, storage-buffer-like resources second, everything else
    /// third. The native binding call expects offset-taking buffers at the front of each set.
    #[inline]
    pub(crate) fn allocation_pass(self) -> usize {
        match self {
            ResourceCategory::UniformBuffer => 0,
            ResourceCategory::StorageBufferReadOnly | ResourceCategory::StorageBufferReadWrite => 1,
            _ => 2,
        }
    }

    #[inline]
    fn name(self) -> &'static str {
        match self {
            ResourceCategory::UniformBuffer => "uniform buffer",
            ResourceCategory::StorageBufferReadOnly => "read-only storage buffer",
            ResourceCategory::StorageBufferReadWrite => "read-write storage buffer",
            ResourceCategory::UniformTexelBuffer => "uniform texel buffer",
            ResourceCategory::StorageTexelBuffer => "storage texel buffer",
            ResourceCategory::StorageImage => "storage image",
            ResourceCategory::CombinedImageSampler => "combined image sampler",
            ResourceCategory::AtomicCounter => "atomic counter",
            ResourceCategory::Sampler => "sampler",
            ResourceCategory::SampledImage => "sampled image",
            ResourceCategory::InputAttachment => "input attachment",
        }
    }
}

impl Display for ResourceCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

/// The view a resource handle exposes, queried at bind time to validate that the handle is
/// compatible with the slot it is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceViewKind {
    UniformBuffer,
    StorageBuffer,
    TexelBuffer,
    SampledImage,
    StorageImage,
    Sampler,
}

/// The dimensionality of a shader resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResourceDimension {
    Buffer,
    Tex1d,
    Tex1dArray,
    Tex2d,
    Tex2dArray,
    Tex3d,
    TexCube,
    TexCubeArray,
}

/// The immutable description of one declared shader resource.
///
/// Records are created by [`ShaderResourceTable::build`] and owned exclusively by their table;
/// cross-references between records ([`paired_resource`](Self::paired_resource)) are indices
/// into the same table.
#[derive(Clone, Debug)]
pub struct ResourceAttributes {
    name: Arc<str>,
    bind_point: u16,
    array_size: u16,
    category: ResourceCategory,
    dimension: ResourceDimension,
    multisampled: bool,
    paired_resource: Option<u16>,
}

impl ResourceAttributes {
    /// The declared name, with any array brackets stripped.
    #[inline]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// The backend register of the first array element, or [`INVALID_BIND_POINT`].
    #[inline]
    pub fn bind_point(&self) -> u16 {
        self.bind_point
    }

    /// The number of array elements; at least 1.
    #[inline]
    pub fn array_size(&self) -> u16 {
        self.array_size
    }

    #[inline]
    pub fn category(&self) -> ResourceCategory {
        self.category
    }

    #[inline]
    pub fn dimension(&self) -> ResourceDimension {
        self.dimension
    }

    #[inline]
    pub fn multisampled(&self) -> bool {
        self.multisampled
    }

    /// For a separate image: the table index of the sampler implicitly paired with it.
    /// For a separate sampler: the table index of the image it is paired with.
    /// `None` when no naming convention is active or no counterpart matched.
    #[inline]
    pub fn paired_resource(&self) -> Option<usize> {
        self.paired_resource.map(usize::from)
    }

    /// The name of one array element as it appears in diagnostics (`"g_Tex[2]"`), or the plain
    /// name for non-arrays.
    pub fn element_name(&self, array_index: u32) -> String {
        debug_assert!(array_index < u32::from(self.array_size));
        if self.array_size > 1 {
            format!("{}[{}]", self.name, array_index)
        } else {
            self.name.to_string()
        }
    }

    /// Returns whether two records describe the same slot shape: equal bind point, array size,
    /// category, dimensionality and pairing.
    #[inline]
    pub fn is_compatible_with(&self, other: &ResourceAttributes) -> bool {
        self.bind_point == other.bind_point
            && self.array_size == other.array_size
            && self.category == other.category
            && self.dimension == other.dimension
            && self.multisampled == other.multisampled
            && self.paired_resource == other.paired_resource
    }
}

/// Error that can happen when building a [`ShaderResourceTable`].
///
/// All of these indicate reflection data that violates the compiler contract, so they abort the
/// build: a table must never be constructed from inconsistent input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReflectionError {
    /// An element-enumerated array uses bind points that are not contiguous with its base
    /// element.
    NonContiguousArrayElements {
        name: String,
        expected_bind_point: u32,
        actual_bind_point: u32,
    },

    /// A bracketed resource name does not parse as `base[index]`, or an element-enumerated
    /// entry declared an array size greater than 1.
    MalformedArrayElement { name: String },

    /// Two distinct declarations share one name.
    DuplicateResource { name: String },

    /// A bind point or array size exceeds the representable range.
    BindPointOutOfRange { name: String, bind_point: u32 },

    /// A separate sampler is paired with an image array, but is neither scalar (broadcast)
    /// nor an array of the same size.
    SamplerArraySizeMismatch {
        sampler: String,
        image: String,
        sampler_size: u16,
        image_size: u16,
    },

    /// More resources were declared than a table can index.
    TooManyResources { count: usize },
}

impl Error for ReflectionError {}

impl Display for ReflectionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ReflectionError::NonContiguousArrayElements {
                name,
                expected_bind_point,
                actual_bind_point,
            } => write!(
                f,
                "array elements of `{}` use non-contiguous bind points (expected register {}, \
                found {})",
                name, expected_bind_point, actual_bind_point,
            ),
            ReflectionError::MalformedArrayElement { name } => {
                write!(f, "`{}` is not a valid array element declaration", name)
            }
            ReflectionError::DuplicateResource { name } => {
                write!(f, "resource `{}` is declared more than once", name)
            }
            ReflectionError::BindPointOutOfRange { name, bind_point } => write!(
                f,
                "bind point {} of `{}` exceeds the representable range",
                bind_point, name,
            ),
            ReflectionError::SamplerArraySizeMismatch {
                sampler,
                image,
                sampler_size,
                image_size,
            } => write!(
                f,
                "sampler `{}` (array size {}) paired with image `{}` (array size {}) must be \
                scalar or match the image's array size",
                sampler, sampler_size, image, image_size,
            ),
            ReflectionError::TooManyResources { count } => {
                write!(f, "{} resources exceed the table capacity", count)
            }
        }
    }
}

/// Returns whether `full` equals `base` with `suffix` appended. A `None` suffix degrades to
/// plain equality, which is what suffix-driven lookups want when no combined-sampler convention
/// is active.
#[inline]
pub(crate) fn matches_with_suffix(full: &str, base: &str, suffix: Option<&str>) -> bool {
    match suffix {
        Some(suffix) => {
            full.len() == base.len() + suffix.len()
                && full.starts_with(base)
                && full.ends_with(suffix)
        }
        None => full == base,
    }
}

// Intermediate record used while merging element-enumerated arrays, before the attributes are
// frozen into the table.
struct PendingResource {
    name: String,
    bind_point: u32,
    array_size: u32,
    category: ResourceCategory,
    dimension: ResourceDimension,
    multisampled: bool,
    element_enumerated: bool,
}

/// The per-shader, immutable table of all declared resources.
#[derive(Debug)]
pub struct ShaderResourceTable {
    stage: ShaderStage,
    shader_name: Arc<str>,
    combined_sampler_suffix: Option<Box<str>>,
    // One contiguous allocation, sliced into category sub-ranges by `group_ends`.
    resources: Box<[ResourceAttributes]>,
    // group_ends[i] is the end offset of category i's sub-range.
    group_ends: [u16; ResourceCategory::COUNT],
    content_hash: u64,
}

impl ShaderResourceTable {
    /// Builds a table from the reflection output of one compiled shader.
    ///
    /// Element-enumerated arrays (bracketed names) are merged into a single record with the
    /// correct array size; their bind points must be contiguous. When
    /// [`combined_sampler_suffix`](ShaderReflection::combined_sampler_suffix) is set, every
    /// separate image is paired with the sampler named `image_name + suffix` if one exists;
    /// images without a match stay unpaired, which is valid.
    pub fn build(reflection: ShaderReflection) -> Result<Arc<ShaderResourceTable>, ReflectionError> {
        let ShaderReflection {
            stage,
            shader_name,
            resources: reflected,
            combined_sampler_suffix,
            _ne: _,
        } = reflection;

        let mut pending: Vec<PendingResource> = Vec::with_capacity(reflected.len());
        let mut by_name: HashMap<String, usize> = HashMap::with_capacity(reflected.len());

        for res in reflected {
            match res.name.find('[') {
                Some(bracket) => {
                    let index = parse_array_index(&res.name, bracket)
                        .ok_or_else(|| ReflectionError::MalformedArrayElement {
                            name: res.name.clone(),
                        })?;
                    if res.array_size > 1 {
                        return Err(ReflectionError::MalformedArrayElement { name: res.name });
                    }
                    let base = &res.name[..bracket];

                    match by_name.get(base) {
                        Some(&at) => {
                            let merged = &mut pending[at];
                            if !merged.element_enumerated || merged.category != res.category {
                                return Err(ReflectionError::DuplicateResource {
                                    name: base.to_owned(),
                                });
                            }
                            let expected = merged.bind_point + index;
                            if res.bind_point != expected {
                                return Err(ReflectionError::NonContiguousArrayElements {
                                    name: base.to_owned(),
                                    expected_bind_point: expected,
                                    actual_bind_point: res.bind_point,
                                });
                            }
                            merged.array_size = merged.array_size.max(index + 1);
                        }
                        None => {
                            // The first element encountered anchors the base register; later
                            // elements must land at base + index.
                            let bind_point = res.bind_point.checked_sub(index).ok_or_else(|| {
                                ReflectionError::NonContiguousArrayElements {
                                    name: base.to_owned(),
                                    expected_bind_point: index,
                                    actual_bind_point: res.bind_point,
                                }
                            })?;
                            by_name.insert(base.to_owned(), pending.len());
                            pending.push(PendingResource {
                                name: base.to_owned(),
                                bind_point,
                                array_size: index + 1,
                                category: res.category,
                                dimension: res.dimension,
                                multisampled: res.multisampled,
                                element_enumerated: true,
                            });
                        }
                    }
                }
                None => {
                    if by_name.contains_key(res.name.as_str()) {
                        return Err(ReflectionError::DuplicateResource { name: res.name });
                    }
                    by_name.insert(res.name.clone(), pending.len());
                    pending.push(PendingResource {
                        bind_point: res.bind_point,
                        array_size: res.array_size.max(1),
                        category: res.category,
                        dimension: res.dimension,
                        multisampled: res.multisampled,
                        element_enumerated: false,
                        name: res.name,
                    });
                }
            }
        }

        if pending.len() >= usize::from(u16::MAX) {
            return Err(ReflectionError::TooManyResources {
                count: pending.len(),
            });
        }

        // Stable sort: groups land in the fixed category order while the reflection order is
        // preserved inside every group.
        pending.sort_by_key(|res| res.category as u8);

        let mut resources = Vec::with_capacity(pending.len());
        for res in pending {
            if res.bind_point >= u32::from(INVALID_BIND_POINT)
                || res.array_size > u32::from(u16::MAX)
            {
                return Err(ReflectionError::BindPointOutOfRange {
                    name: res.name,
                    bind_point: res.bind_point,
                });
            }
            resources.push(ResourceAttributes {
                name: Arc::from(res.name.as_str()),
                bind_point: res.bind_point as u16,
                array_size: res.array_size as u16,
                category: res.category,
                dimension: res.dimension,
                multisampled: res.multisampled,
                paired_resource: None,
            });
        }

        let mut group_ends = [0u16; ResourceCategory::COUNT];
        {
            let mut counts = [0u16; ResourceCategory::COUNT];
            for res in &resources {
                counts[res.category as usize] += 1;
            }
            let mut end = 0u16;
            for (end_slot, count) in group_ends.iter_mut().zip(counts) {
                end += count;
                *end_slot = end;
            }
        }

        let suffix = combined_sampler_suffix.as_deref();
        if suffix.is_some() {
            pair_separate_images(&mut resources, &group_ends, suffix)?;
        }

        let content_hash = {
            let mut hasher = foldhash::quality::FixedState::default().build_hasher();
            (stage as u8).hash(&mut hasher);
            for res in &resources {
                res.name.hash(&mut hasher);
                res.bind_point.hash(&mut hasher);
                res.array_size.hash(&mut hasher);
                (res.category as u8).hash(&mut hasher);
                (res.dimension as u8).hash(&mut hasher);
                res.multisampled.hash(&mut hasher);
                res.paired_resource.hash(&mut hasher);
            }
            hasher.finish()
        };

        Ok(Arc::new(ShaderResourceTable {
            stage,
            shader_name: Arc::from(shader_name.as_str()),
            combined_sampler_suffix: combined_sampler_suffix.map(String::into_boxed_str),
            resources: resources.into_boxed_slice(),
            group_ends,
            content_hash,
        }))
    }

    /// The stage of the shader this table was reflected from.
    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// The diagnostic name of the shader.
    #[inline]
    pub fn shader_name(&self) -> &Arc<str> {
        &self.shader_name
    }

    /// The combined-sampler naming suffix, if the convention is active.
    #[inline]
    pub fn combined_sampler_suffix(&self) -> Option<&str> {
        self.combined_sampler_suffix.as_deref()
    }

    /// Whether convention-based texture/sampler pairing was performed.
    #[inline]
    pub fn uses_combined_samplers(&self) -> bool {
        self.combined_sampler_suffix.is_some()
    }

    /// All records, grouped by category.
    #[inline]
    pub fn resources(&self) -> &[ResourceAttributes] {
        &self.resources
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// The index range of one category's sub-range.
    #[inline]
    pub fn category_range(&self, category: ResourceCategory) -> Range<usize> {
        let index = category as usize;
        let start = if index == 0 {
            0
        } else {
            usize::from(self.group_ends[index - 1])
        };
        start..usize::from(self.group_ends[index])
    }

    /// The number of resources in one category.
    #[inline]
    pub fn category_count(&self, category: ResourceCategory) -> u32 {
        let range = self.category_range(category);
        (range.end - range.start) as u32
    }

    /// The records of one category.
    #[inline]
    pub fn resources_in(&self, category: ResourceCategory) -> &[ResourceAttributes] {
        &self.resources[self.category_range(category)]
    }

    /// One record by table index.
    #[inline]
    pub fn resource(&self, index: usize) -> &ResourceAttributes {
        &self.resources[index]
    }

    /// Looks a record up by its declared name.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.resources.iter().position(|res| &*res.name == name)
    }

    /// The record paired with the one at `index`, if any.
    #[inline]
    pub fn paired_of(&self, index: usize) -> Option<&ResourceAttributes> {
        self.resources[index]
            .paired_resource()
            .map(|paired| &self.resources[paired])
    }

    /// A deterministic hash over the table contents. Two tables with different hashes are never
    /// compatible; equal hashes are confirmed by [`is_compatible_with`](Self::is_compatible_with).
    #[inline]
    pub fn content_hash(&self) -> u64 {
        self.content_hash
    }

    /// Returns whether two tables declare pairwise-identical resources: the same count in every
    /// category, and matching bind point, array size, category and dimensionality for every
    /// record. Pipelines whose shaders satisfy this can share binding objects.
    pub fn is_compatible_with(&self, other: &ShaderResourceTable) -> bool {
        if self.group_ends != other.group_ends {
            return false;
        }
        self.resources
            .iter()
            .zip(other.resources.iter())
            .all(|(a, b)| a.is_compatible_with(b))
    }
}

fn parse_array_index(name: &str, bracket: usize) -> Option<u32> {
    let rest = &name[bracket + 1..];
    let close = rest.find(']')?;
    if close + 1 != rest.len() {
        return None;
    }
    rest[..close].parse().ok()
}

// Resolves `image_name + suffix` pairing for every separate image. Samplers live in an earlier
// sub-range, so the pairing target always exists in the table by now.
fn pair_separate_images(
    resources: &mut [ResourceAttributes],
    group_ends: &[u16; ResourceCategory::COUNT],
    suffix: Option<&str>,
) -> Result<(), ReflectionError> {
    let range_of = |category: ResourceCategory| {
        let index = category as usize;
        let start = if index == 0 { 0 } else { group_ends[index - 1] };
        usize::from(start)..usize::from(group_ends[index])
    };

    let sampler_range = range_of(ResourceCategory::Sampler);
    let image_range = range_of(ResourceCategory::SampledImage);

    for image_index in image_range {
        let image_name = resources[image_index].name.clone();
        let sampler_index = resources[sampler_range.clone()]
            .iter()
            .position(|sampler| matches_with_suffix(&sampler.name, &image_name, suffix))
            .map(|offset| sampler_range.start + offset);

        let Some(sampler_index) = sampler_index else {
            // Not every image needs a static sampler.
            continue;
        };

        let sampler_size = resources[sampler_index].array_size;
        let image_size = resources[image_index].array_size;
        if sampler_size != 1 && sampler_size != image_size {
            return Err(ReflectionError::SamplerArraySizeMismatch {
                sampler: resources[sampler_index].name.to_string(),
                image: image_name.to_string(),
                sampler_size,
                image_size,
            });
        }

        resources[image_index].paired_resource = Some(sampler_index as u16);
        resources[sampler_index].paired_resource = Some(image_index as u16);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::{ReflectedResource, ShaderReflection, ShaderStage};

    fn reflection(resources: Vec<ReflectedResource>) -> ShaderReflection {
        ShaderReflection {
            resources,
            ..ShaderReflection::new(ShaderStage::Fragment)
        }
    }

    #[test]
    fn merges_element_enumerated_arrays() {
        let table = ShaderResourceTable::build(reflection(vec![
            ReflectedResource::new("g_Tex[0]", 3, ResourceCategory::SampledImage),
            ReflectedResource::new("g_Tex[1]", 4, ResourceCategory::SampledImage),
            ReflectedResource::new("g_Tex[2]", 5, ResourceCategory::SampledImage),
            ReflectedResource::new("g_Other", 6, ResourceCategory::SampledImage),
        ]))
        .unwrap();

        assert_eq!(table.len(), 2);
        let merged = &table.resources_in(ResourceCategory::SampledImage)[0];
        assert_eq!(&**merged.name(), "g_Tex");
        assert_eq!(merged.array_size(), 3);
        assert_eq!(merged.bind_point(), 3);
    }

    #[test]
    fn merges_arrays_with_unused_elements() {
        // Element [1] never referenced by the shader; the remaining elements still anchor
        // contiguous registers.
        let table = ShaderResourceTable::build(reflection(vec![
            ReflectedResource::new("g_Tex[0]", 7, ResourceCategory::SampledImage),
            ReflectedResource::new("g_Tex[3]", 10, ResourceCategory::SampledImage),
        ]))
        .unwrap();

        let merged = &table.resources_in(ResourceCategory::SampledImage)[0];
        assert_eq!(merged.array_size(), 4);
    }

    #[test]
    fn non_contiguous_array_elements_are_fatal() {
        let err = ShaderResourceTable::build(reflection(vec![
            ReflectedResource::new("g_Tex[0]", 3, ResourceCategory::SampledImage),
            ReflectedResource::new("g_Tex[1]", 5, ResourceCategory::SampledImage),
        ]))
        .unwrap_err();

        assert_eq!(
            err,
            ReflectionError::NonContiguousArrayElements {
                name: "g_Tex".into(),
                expected_bind_point: 4,
                actual_bind_point: 5,
            },
        );
    }

    #[test]
    fn duplicate_names_are_fatal() {
        let err = ShaderResourceTable::build(reflection(vec![
            ReflectedResource::new("g_Data", 0, ResourceCategory::UniformBuffer),
            ReflectedResource::new("g_Data", 1, ResourceCategory::UniformBuffer),
        ]))
        .unwrap_err();
        assert!(matches!(err, ReflectionError::DuplicateResource { .. }));
    }

    #[test]
    fn groups_follow_fixed_category_order() {
        let table = ShaderResourceTable::build(reflection(vec![
            ReflectedResource::new("g_Image", 0, ResourceCategory::SampledImage),
            ReflectedResource::new("g_Sampler", 0, ResourceCategory::Sampler),
            ReflectedResource::new("g_Storage", 1, ResourceCategory::StorageBufferReadWrite),
            ReflectedResource::new("g_Constants", 0, ResourceCategory::UniformBuffer),
        ]))
        .unwrap();

        let order: Vec<ResourceCategory> =
            table.resources().iter().map(|res| res.category()).collect();
        assert_eq!(
            order,
            [
                ResourceCategory::UniformBuffer,
                ResourceCategory::StorageBufferReadWrite,
                ResourceCategory::Sampler,
                ResourceCategory::SampledImage,
            ],
        );
        assert_eq!(table.category_count(ResourceCategory::Sampler), 1);
        assert_eq!(table.category_range(ResourceCategory::Sampler), 2..3);
    }

    #[test]
    fn pairs_separate_images_with_suffixed_samplers() {
        let mut refl = reflection(vec![
            ReflectedResource::new("g_Tex", 0, ResourceCategory::SampledImage),
            ReflectedResource::new("g_Tex_sampler", 0, ResourceCategory::Sampler),
            ReflectedResource::new("g_Unpaired", 1, ResourceCategory::SampledImage),
        ]);
        refl.combined_sampler_suffix = Some("_sampler".into());
        let table = ShaderResourceTable::build(refl).unwrap();

        let image_index = table.find("g_Tex").unwrap();
        let sampler = table.paired_of(image_index).unwrap();
        assert_eq!(&**sampler.name(), "g_Tex_sampler");
        assert_eq!(sampler.paired_resource(), Some(image_index));

        let unpaired_index = table.find("g_Unpaired").unwrap();
        assert!(table.paired_of(unpaired_index).is_none());
    }

    #[test]
    fn no_pairing_without_convention() {
        let table = ShaderResourceTable::build(reflection(vec![
            ReflectedResource::new("g_Tex", 0, ResourceCategory::SampledImage),
            ReflectedResource::new("g_Tex_sampler", 0, ResourceCategory::Sampler),
        ]))
        .unwrap();
        assert!(table.paired_of(table.find("g_Tex").unwrap()).is_none());
    }

    #[test]
    fn sampler_array_must_broadcast_or_match() {
        let array_image = |size| {
            let mut res = ReflectedResource::new("g_Tex", 0, ResourceCategory::SampledImage);
            res.array_size = size;
            res
        };
        let array_sampler = |size| {
            let mut res = ReflectedResource::new("g_Tex_sampler", 0, ResourceCategory::Sampler);
            res.array_size = size;
            res
        };

        for (sampler_size, ok) in [(1, true), (4, true), (2, false)] {
            let mut refl = reflection(vec![array_image(4), array_sampler(sampler_size)]);
            refl.combined_sampler_suffix = Some("_sampler".into());
            let result = ShaderResourceTable::build(refl);
            assert_eq!(result.is_ok(), ok, "sampler array size {}", sampler_size);
        }
    }

    #[test]
    fn compatible_tables_match_pairwise() {
        let build = |bind_point| {
            ShaderResourceTable::build(reflection(vec![
                ReflectedResource::new("g_Constants", bind_point, ResourceCategory::UniformBuffer),
                ReflectedResource::new("g_Tex", 0, ResourceCategory::SampledImage),
            ]))
            .unwrap()
        };

        let a = build(0);
        let b = build(0);
        assert!(a.is_compatible_with(&b));
        assert_eq!(a.content_hash(), b.content_hash());

        let c = build(1);
        assert!(!a.is_compatible_with(&c));
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn compatibility_ignores_names_but_not_shape() {
        let a = ShaderResourceTable::build(reflection(vec![ReflectedResource::new(
            "g_A",
            0,
            ResourceCategory::UniformBuffer,
        )]))
        .unwrap();
        let b = ShaderResourceTable::build(reflection(vec![ReflectedResource::new(
            "g_B",
            0,
            ResourceCategory::UniformBuffer,
        )]))
        .unwrap();
        let c = ShaderResourceTable::build(reflection(vec![ReflectedResource::new(
            "g_A",
            0,
            ResourceCategory::StorageBufferReadOnly,
        )]))
        .unwrap();

        assert!(a.is_compatible_with(&b));
        assert!(!a.is_compatible_with(&c));
    }
}
