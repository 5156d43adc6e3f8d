//! Pipeline-wide resource layout construction.
//!
//! A pipeline aggregates the resource tables of all its shader stages into one
//! [`PipelineResourceLayout`](layout::PipelineResourceLayout): every declared resource receives
//! a `(set, binding, cache offset)` slot, the at-most-two descriptor sets are finalized into
//! native layout objects, and the result carries a fingerprint that decides whether two
//! pipelines can share binding objects.

pub mod layout;
