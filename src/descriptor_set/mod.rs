//! Descriptor sets: coarse groups of binding slots that are bound together at draw time.
//!
//! A [`DescriptorSetLayout`](layout::DescriptorSetLayout) describes the ordered bindings of one
//! set and owns the backend's native layout object. A [`ResourceCache`](cache::ResourceCache)
//! holds, for one binding object, the resource handles currently occupying every slot those
//! layouts declare.

pub mod cache;
pub mod layout;
