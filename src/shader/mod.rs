//! Shader stages and the reflection data handed over by the shader compiler.
//!
//! The shader compiler/reflection layer is an external collaborator: after compiling a shader it
//! produces a [`ShaderReflection`] — the flat list of resources the shader declares, together
//! with the stage and the optional combined-sampler naming convention. This module only defines
//! that hand-over format; the normalization into a queryable table happens in
//! [`resources::ShaderResourceTable`].

use crate::NonExhaustive;
use bitflags::bitflags;
use std::fmt::{Display, Formatter, Result as FmtResult};

pub mod resources;

use resources::{ResourceCategory, ResourceDimension};

/// A single shader stage within a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    TessellationControl,
    TessellationEvaluation,
    Geometry,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// Returns a short lowercase name, suitable for log messages.
    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::TessellationControl => "tessellation control",
            ShaderStage::TessellationEvaluation => "tessellation evaluation",
            ShaderStage::Geometry => "geometry",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        }
    }
}

impl Display for ShaderStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

bitflags! {
    /// A set of [`ShaderStage`]s, used wherever a rule or binding applies to more than one stage.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const TESSELLATION_CONTROL = 1 << 1;
        const TESSELLATION_EVALUATION = 1 << 2;
        const GEOMETRY = 1 << 3;
        const FRAGMENT = 1 << 4;
        const COMPUTE = 1 << 5;
    }
}

impl From<ShaderStage> for ShaderStages {
    #[inline]
    fn from(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => ShaderStages::VERTEX,
            ShaderStage::TessellationControl => ShaderStages::TESSELLATION_CONTROL,
            ShaderStage::TessellationEvaluation => ShaderStages::TESSELLATION_EVALUATION,
            ShaderStage::Geometry => ShaderStages::GEOMETRY,
            ShaderStage::Fragment => ShaderStages::FRAGMENT,
            ShaderStage::Compute => ShaderStages::COMPUTE,
        }
    }
}

/// The reflected resource list of one compiled shader, as supplied by the compiler.
///
/// Contract with the reflection layer: bind points are backend registers, and array elements of
/// the same resource are either declared with an explicit `array_size`, or enumerated
/// element-by-element under bracketed names (`"g_Tex[0]"`, `"g_Tex[1]"`, ...) with contiguous
/// bind points and `array_size == 1` per element.
#[derive(Clone, Debug)]
pub struct ShaderReflection {
    /// The stage the shader executes in.
    pub stage: ShaderStage,

    /// A name identifying the shader in diagnostics.
    ///
    /// The default value is empty.
    pub shader_name: String,

    /// Every resource the shader declares, in reflection order.
    ///
    /// The default value is empty.
    pub resources: Vec<ReflectedResource>,

    /// The suffix appended to a texture name to derive the name of its implicitly paired
    /// sampler (`"g_Tex"` + `"_sampler"` → `"g_Tex_sampler"`). `None` means the shading
    /// language pairs textures and samplers explicitly, and no convention-based pairing is
    /// performed.
    ///
    /// The default value is `None`.
    pub combined_sampler_suffix: Option<String>,

    pub _ne: NonExhaustive,
}

impl ShaderReflection {
    /// Returns a `ShaderReflection` with the given stage and default values for everything else.
    #[inline]
    pub fn new(stage: ShaderStage) -> Self {
        Self {
            stage,
            shader_name: String::new(),
            resources: Vec::new(),
            combined_sampler_suffix: None,
            _ne: NonExhaustive(()),
        }
    }
}

/// One resource declaration inside a [`ShaderReflection`].
#[derive(Clone, Debug)]
pub struct ReflectedResource {
    /// The declared name. A bracketed suffix (`"[3]"`) marks an element-enumerated array.
    pub name: String,

    /// The backend register the resource is bound to.
    pub bind_point: u32,

    /// The number of array elements; `1` for non-arrays and for element-enumerated arrays.
    ///
    /// The default value is `1`.
    pub array_size: u32,

    /// What kind of GPU object the declaration refers to.
    pub category: ResourceCategory,

    /// The dimensionality of the resource.
    ///
    /// The default value is [`ResourceDimension::Buffer`].
    pub dimension: ResourceDimension,

    /// Whether the resource is a multisampled image.
    ///
    /// The default value is `false`.
    pub multisampled: bool,

    pub _ne: NonExhaustive,
}

impl ReflectedResource {
    /// Returns a `ReflectedResource` with the given name, bind point and category, and default
    /// values for everything else.
    #[inline]
    pub fn new(name: impl Into<String>, bind_point: u32, category: ResourceCategory) -> Self {
        Self {
            name: name.into(),
            bind_point,
            array_size: 1,
            category,
            dimension: ResourceDimension::Buffer,
            multisampled: false,
            _ne: NonExhaustive(()),
        }
    }
}
