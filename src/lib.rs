//! Backend-agnostic shader resource binding and descriptor layout management.
//!
//! This crate implements the bookkeeping that sits between a shader compiler's
//! reflection output and a native graphics API's resource binding model:
//!
//! - A [`ShaderResourceTable`](crate::shader::resources::ShaderResourceTable) is built once per
//!   compiled shader from the reflection data supplied by the compiler. It normalizes the
//!   declared resources (buffers, images, samplers) into an immutable, category-grouped table
//!   and resolves combined texture/sampler pairing by name convention.
//!
//! - A [`PipelineResourceLayout`](crate::pipeline::layout::PipelineResourceLayout) is built once
//!   per pipeline from the per-stage tables. It assigns every resource a
//!   `(set, binding, cache offset)` slot, grouping slowly-changing resources into one descriptor
//!   set and per-draw-varying resources into another, finalizes the native set-layout objects
//!   through the [`Device`](crate::device::Device) collaborator, and exposes a compatibility
//!   fingerprint so binding objects can be shared between pipelines with identical layouts.
//!
//! - A [`ResourceCache`](crate::descriptor_set::cache::ResourceCache) holds the resource handles
//!   currently bound to each slot of one binding object, validates every bind against the slot's
//!   expected category and update-frequency class, and produces the per-draw dynamic offsets
//!   consumed by the submission path.
//!
//! - A [`ShaderResourceBinding`](crate::binding::ShaderResourceBinding) is the public facade:
//!   named, stage-scoped variables backed by a layout/cache pair.
//!
//! The native device, the device object layer (buffers, textures, samplers) and the GPU
//! submission path are reached exclusively through the traits in the [`device`] module; this
//! crate does not talk to any graphics API directly.

pub mod binding;
pub mod descriptor_set;
pub mod device;
pub mod pipeline;
pub mod sampler;
pub mod shader;
#[cfg(test)]
pub(crate) mod tests;

/// A helper type for non-exhaustive structs.
///
/// This type cannot be constructed outside the crate. Structures with a field of this type can
/// only be constructed by calling a constructor function or `Default::default()`. The effect is
/// similar to the standard Rust `#[non_exhaustive]` attribute, except that it does not prevent
/// update syntax from being used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NonExhaustive(pub(crate) ());
