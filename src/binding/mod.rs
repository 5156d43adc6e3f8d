//! The public binding surface: named, stage-scoped variables backed by a layout/cache pair.
//!
//! A [`ShaderResourceBinding`] is created once per draw-call binding context from a shared
//! [`PipelineResourceLayout`]. Callers address resources by stage and declared name; the facade
//! resolves the variable to its `(set, cache offset)` slot and forwards to the cache, which
//! enforces the category and rebind policies. Every policy violation is logged and leaves the
//! previous binding intact, so one bad call never corrupts the binding state.
//!
//! Separate samplers that are implicitly paired with a texture (combined-sampler convention)
//! are not exposed as variables — the texture is the binding surface for the pair. Samplers
//! backed by an immutable sampler are never exposed.

use crate::{
    descriptor_set::cache::ResourceCache,
    device::{DescriptorWrite, DeviceObject},
    pipeline::layout::{PipelineResourceLayout, ResourceClass, StageResourceLayout},
    shader::{resources::ResourceCategory, ShaderStage},
};
use foldhash::{HashMap, HashMapExt};
use log::{error, warn};
use std::sync::Arc;

/// A bulk name → resource mapping consumed by [`ShaderResourceBinding::bind_all`].
pub type ResourceMap = HashMap<String, Arc<dyn DeviceObject>>;

// The exposed variables of one stage: the subset of the stage's slots that callers may bind,
// addressable by name or by index.
#[derive(Debug)]
struct StageVariables {
    stage: ShaderStage,
    stage_index: usize,
    // Values index into `slot_indices`.
    by_name: HashMap<Arc<str>, u32>,
    // Values index into the stage layout's slot list.
    slot_indices: Vec<u32>,
}

// Everything needed to act on one resolved variable, copied out so the borrow on `self` can be
// released before mutating the cache.
#[derive(Clone)]
struct ResolvedVariable {
    name: Arc<str>,
    set: u32,
    cache_offset: u32,
    array_size: u32,
    binding: u32,
    category: ResourceCategory,
    class: ResourceClass,
    paired: Option<ResolvedPaired>,
}

// The sampler slot implicitly paired with a separate-image variable.
#[derive(Clone)]
struct ResolvedPaired {
    name: Arc<str>,
    set: u32,
    cache_offset: u32,
    array_size: u32,
    binding: u32,
    class: ResourceClass,
    immutable: bool,
}

/// The per-binding-object facade over a [`PipelineResourceLayout`] and its [`ResourceCache`].
#[derive(Debug)]
pub struct ShaderResourceBinding {
    layout: Arc<PipelineResourceLayout>,
    cache: ResourceCache,
    stages: Vec<StageVariables>,
}

impl ShaderResourceBinding {
    /// Creates a binding object for `layout`, with an empty cache shaped by it.
    pub fn new(layout: Arc<PipelineResourceLayout>) -> ShaderResourceBinding {
        let cache = layout.create_cache();

        let stages = layout
            .stages()
            .iter()
            .enumerate()
            .map(|(stage_index, stage)| {
                let mut by_name = HashMap::new();
                let mut slot_indices = Vec::new();

                for (slot_index, slot) in stage.slots().iter().enumerate() {
                    let attribs = stage.attributes(slot);
                    if attribs.category() == ResourceCategory::Sampler {
                        if slot.has_immutable_sampler() {
                            continue;
                        }
                        if stage.table().uses_combined_samplers()
                            && attribs.paired_resource().is_some()
                        {
                            continue;
                        }
                    }
                    by_name.insert(attribs.name().clone(), slot_indices.len() as u32);
                    slot_indices.push(slot_index as u32);
                }

                StageVariables {
                    stage: stage.stage(),
                    stage_index,
                    by_name,
                    slot_indices,
                }
            })
            .collect();

        ShaderResourceBinding {
            layout,
            cache,
            stages,
        }
    }

    /// The layout this binding object was created from.
    #[inline]
    pub fn layout(&self) -> &Arc<PipelineResourceLayout> {
        &self.layout
    }

    /// The underlying cache, for the commit path.
    #[inline]
    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Mutable access to the cache, used by callers that assign native descriptor sets.
    #[inline]
    pub fn cache_mut(&mut self) -> &mut ResourceCache {
        &mut self.cache
    }

    /// The number of variables exposed for one stage.
    pub fn variable_count(&self, stage: ShaderStage) -> u32 {
        self.stage_variables(stage)
            .map_or(0, |vars| vars.slot_indices.len() as u32)
    }

    /// The name of the `index`-th variable of one stage.
    pub fn variable_name(&self, stage: ShaderStage, index: u32) -> Option<&Arc<str>> {
        let vars = self.stage_variables(stage)?;
        let slot_index = *vars.slot_indices.get(index as usize)? as usize;
        let stage_layout = &self.layout.stages()[vars.stage_index];
        Some(stage_layout.attributes(&stage_layout.slots()[slot_index]).name())
    }

    /// Binds `object` to the variable named `name` in `stage`. Equivalent to
    /// [`set_element`](Self::set_element) with array index 0.
    ///
    /// Returns `false` — after logging — if the name does not resolve or the cache refuses the
    /// bind.
    pub fn set(&mut self, stage: ShaderStage, name: &str, object: Arc<dyn DeviceObject>) -> bool {
        self.set_element(stage, name, 0, object)
    }

    /// Binds `object` to one array element of the variable named `name` in `stage`.
    pub fn set_element(
        &mut self,
        stage: ShaderStage,
        name: &str,
        array_index: u32,
        object: Arc<dyn DeviceObject>,
    ) -> bool {
        let Some(var) = self.resolve(stage, name) else {
            error!(
                "the {} stage exposes no variable named `{}`; the resource `{}` was not bound",
                stage,
                name,
                object.name(),
            );
            return false;
        };
        if array_index >= var.array_size {
            error!(
                "array index {} is out of range for `{}` (array size {})",
                array_index, var.name, var.array_size,
            );
            return false;
        }

        let offset = var.cache_offset + array_index;
        if let Err(err) = self.cache.bind(var.set, offset, object) {
            error!("failed to bind `{}`: {}", var.name, err);
            return false;
        }
        self.write_descriptor(var.set, offset, var.binding, array_index, var.category, var.class);

        if let Some(paired) = &var.paired {
            self.bind_paired_sampler(&var, paired, array_index);
        }
        true
    }

    // Binding a separate image also binds the sampler carried by the texture view into the
    // implicitly paired sampler slot. A scalar sampler is broadcast to element 0 regardless of
    // the image element.
    fn bind_paired_sampler(
        &mut self,
        var: &ResolvedVariable,
        paired: &ResolvedPaired,
        array_index: u32,
    ) {
        if paired.immutable {
            return;
        }
        let view = self
            .cache
            .bound_object(var.set, var.cache_offset + array_index)
            .expect("the image bind just succeeded")
            .clone();

        let Some(sampler) = view.paired_sampler() else {
            error!(
                "failed to bind sampler to `{}` assigned to separate image `{}`: no sampler is \
                set in texture view `{}`",
                paired.name,
                var.name,
                view.name(),
            );
            return;
        };

        let element = if paired.array_size > 1 { array_index } else { 0 };
        let offset = paired.cache_offset + element;
        // A broadcast sampler is re-bound for every image element; re-binding the identical
        // object is not a policy violation.
        if self
            .cache
            .bound_object(paired.set, offset)
            .is_some_and(|existing| Arc::ptr_eq(existing, &sampler))
        {
            return;
        }
        match self.cache.bind(paired.set, offset, sampler) {
            Ok(()) => self.write_descriptor(
                paired.set,
                offset,
                paired.binding,
                element,
                ResourceCategory::Sampler,
                paired.class,
            ),
            Err(err) => error!("failed to bind sampler `{}`: {}", paired.name, err),
        }
    }

    // Non-dynamic descriptors are written as soon as the resource is known (and a native set
    // exists to write into); dynamic-class descriptors are flushed in one batch by the commit
    // path.
    fn write_descriptor(
        &self,
        set: u32,
        offset: u32,
        binding: u32,
        array_element: u32,
        category: ResourceCategory,
        class: ResourceClass,
    ) {
        if class == ResourceClass::Dynamic {
            return;
        }
        let Some(native_set) = self.cache.native_set(set) else {
            return;
        };
        let Some(object) = self.cache.bound_object(set, offset) else {
            return;
        };
        self.layout.device().update_descriptor(
            native_set,
            &DescriptorWrite {
                binding,
                array_element,
                category,
                object,
            },
        );
    }

    /// Removes the resource bound to a variable, subject to the same policy as binding.
    pub fn unset(&mut self, stage: ShaderStage, name: &str, array_index: u32) -> bool {
        let Some(var) = self.resolve(stage, name) else {
            error!("the {} stage exposes no variable named `{}`", stage, name);
            return false;
        };
        if array_index >= var.array_size {
            error!(
                "array index {} is out of range for `{}` (array size {})",
                array_index, var.name, var.array_size,
            );
            return false;
        }
        match self.cache.unbind(var.set, var.cache_offset + array_index) {
            Ok(_) => true,
            Err(err) => {
                error!("failed to unbind `{}`: {}", var.name, err);
                false
            }
        }
    }

    /// Applies a bulk name → resource mapping across every stage.
    ///
    /// Each entry is bound to every stage that exposes a variable of that name. Entries that
    /// resolve nowhere are logged and skipped; they do not fail the call.
    pub fn bind_all(&mut self, resources: &ResourceMap) {
        let stage_list: Vec<ShaderStage> = self.stages.iter().map(|vars| vars.stage).collect();

        for (name, object) in resources {
            let mut resolved = false;
            for &stage in &stage_list {
                if self.resolve(stage, name).is_some() {
                    resolved = true;
                    self.set(stage, name, object.clone());
                }
            }
            if !resolved {
                warn!(
                    "`{}` does not resolve to any variable in any stage; the resource `{}` was \
                    not bound",
                    name,
                    object.name(),
                );
            }
        }
    }

    /// Propagates the static-class resources already bound on a shader's shared static cache
    /// into this object's cache. Called once, right after creation.
    pub fn initialize_static_resources(
        &mut self,
        src_layout: &StageResourceLayout,
        src_cache: &ResourceCache,
    ) {
        let layout = self.layout.clone();
        layout.copy_static_resources(src_layout, src_cache, &mut self.cache);
    }

    /// Returns `true` iff every non-immutable-sampler slot holds a resource.
    #[inline]
    pub fn is_fully_bound(&self) -> bool {
        self.cache.is_fully_bound()
    }

    fn stage_variables(&self, stage: ShaderStage) -> Option<&StageVariables> {
        self.stages.iter().find(|vars| vars.stage == stage)
    }

    fn resolve(&self, stage: ShaderStage, name: &str) -> Option<ResolvedVariable> {
        let vars = self.stage_variables(stage)?;
        let var_index = *vars.by_name.get(name)?;
        let slot_index = vars.slot_indices[var_index as usize] as usize;
        let stage_layout = &self.layout.stages()[vars.stage_index];
        let slot = &stage_layout.slots()[slot_index];
        let attribs = stage_layout.attributes(slot);

        let paired = slot.paired_sampler().map(|paired_index| {
            let paired_slot = &stage_layout.slots()[paired_index];
            let paired_attribs = stage_layout.attributes(paired_slot);
            ResolvedPaired {
                name: paired_attribs.name().clone(),
                set: paired_slot.set(),
                cache_offset: paired_slot.cache_offset(),
                array_size: u32::from(paired_attribs.array_size()),
                binding: paired_slot.binding(),
                class: paired_slot.class(),
                immutable: paired_slot.has_immutable_sampler(),
            }
        });

        Some(ResolvedVariable {
            name: attribs.name().clone(),
            set: slot.set(),
            cache_offset: slot.cache_offset(),
            array_size: u32::from(attribs.array_size()),
            binding: slot.binding(),
            category: attribs.category(),
            class: slot.class(),
            paired,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        device::{ContextId, DescriptorSetHandle},
        pipeline::layout::{
            ImmutableSamplerRule, PipelineResourceLayoutCreateInfo, PreparedBind,
            ResourceLayoutRules, VariableRule,
        },
        sampler::SamplerCreateInfo,
        shader::{
            resources::ShaderResourceTable, ReflectedResource, ShaderReflection, ShaderStages,
        },
        tests::{init_logger, MockBinder, MockBuffer, MockDevice, MockSampler, MockTexture},
    };

    fn table(
        stage: ShaderStage,
        suffix: Option<&str>,
        resources: Vec<ReflectedResource>,
    ) -> Arc<ShaderResourceTable> {
        let mut reflection = ShaderReflection::new(stage);
        reflection.resources = resources;
        reflection.combined_sampler_suffix = suffix.map(str::to_owned);
        ShaderResourceTable::build(reflection).unwrap()
    }

    fn two_stage_layout(device: Arc<MockDevice>) -> Arc<PipelineResourceLayout> {
        let vs = table(
            ShaderStage::Vertex,
            None,
            vec![
                ReflectedResource::new("g_Constants", 0, ResourceCategory::UniformBuffer),
                ReflectedResource::new("g_PerDraw", 1, ResourceCategory::UniformBuffer),
            ],
        );
        let ps = table(
            ShaderStage::Fragment,
            Some("_sampler"),
            vec![
                ReflectedResource::new("g_Tex", 0, ResourceCategory::SampledImage),
                ReflectedResource::new("g_Tex_sampler", 0, ResourceCategory::Sampler),
            ],
        );
        PipelineResourceLayout::new(
            device,
            PipelineResourceLayoutCreateInfo {
                tables: vec![vs, ps],
                rules: ResourceLayoutRules {
                    variables: vec![
                        VariableRule::new(
                            "g_Constants",
                            ShaderStages::VERTEX,
                            ResourceClass::Static,
                        ),
                        VariableRule::new(
                            "g_PerDraw",
                            ShaderStages::VERTEX,
                            ResourceClass::Dynamic,
                        ),
                        VariableRule::new("g_Tex", ShaderStages::FRAGMENT, ResourceClass::Mutable),
                    ],
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn paired_samplers_are_hidden_from_the_variable_list() {
        let srb = ShaderResourceBinding::new(two_stage_layout(MockDevice::new()));

        assert_eq!(srb.variable_count(ShaderStage::Vertex), 2);
        // Only the texture is exposed; its suffix-paired sampler is bound through it.
        assert_eq!(srb.variable_count(ShaderStage::Fragment), 1);
        assert_eq!(
            &**srb.variable_name(ShaderStage::Fragment, 0).unwrap(),
            "g_Tex",
        );
    }

    #[test]
    fn immutable_samplers_are_never_exposed() {
        let device = MockDevice::new();
        let ps = table(
            ShaderStage::Fragment,
            None,
            vec![
                ReflectedResource::new("g_Tex", 0, ResourceCategory::SampledImage),
                ReflectedResource::new("g_Sampler", 0, ResourceCategory::Sampler),
            ],
        );
        let layout = PipelineResourceLayout::new(
            device,
            PipelineResourceLayoutCreateInfo {
                tables: vec![ps],
                rules: ResourceLayoutRules {
                    immutable_samplers: vec![ImmutableSamplerRule::new(
                        "g_Sampler",
                        ShaderStages::FRAGMENT,
                        SamplerCreateInfo::default(),
                    )],
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .unwrap();

        let mut srb = ShaderResourceBinding::new(layout);
        assert_eq!(srb.variable_count(ShaderStage::Fragment), 1);

        // The immutable slot does not block completeness and cannot be rebound.
        assert!(!srb.set(
            ShaderStage::Fragment,
            "g_Sampler",
            MockSampler::new("other"),
        ));
        assert!(srb.set(
            ShaderStage::Fragment,
            "g_Tex",
            MockTexture::sampled("tex"),
        ));
        assert!(srb.is_fully_bound());
    }

    #[test]
    fn set_enforces_the_rebind_policy_per_class() {
        init_logger();
        let mut srb = ShaderResourceBinding::new(two_stage_layout(MockDevice::new()));

        assert!(srb.set(
            ShaderStage::Vertex,
            "g_Constants",
            MockBuffer::uniform("a"),
        ));
        // Static: rejected, previous binding preserved.
        assert!(!srb.set(
            ShaderStage::Vertex,
            "g_Constants",
            MockBuffer::uniform("b"),
        ));

        // Dynamic: rebinding succeeds.
        assert!(srb.set(ShaderStage::Vertex, "g_PerDraw", MockBuffer::uniform("c")));
        assert!(srb.set(ShaderStage::Vertex, "g_PerDraw", MockBuffer::uniform("d")));

        // Unknown names and wrong stages are logged, not fatal.
        assert!(!srb.set(
            ShaderStage::Vertex,
            "g_Missing",
            MockBuffer::uniform("e"),
        ));
        assert!(!srb.set(
            ShaderStage::Fragment,
            "g_Constants",
            MockBuffer::uniform("f"),
        ));
    }

    #[test]
    fn bind_all_spans_stages_and_skips_unresolved_names() {
        init_logger();
        let mut srb = ShaderResourceBinding::new(two_stage_layout(MockDevice::new()));

        let mut resources = ResourceMap::new();
        resources.insert("g_Constants".into(), MockBuffer::uniform("cb"));
        resources.insert("g_PerDraw".into(), MockBuffer::uniform("per_draw"));
        resources.insert(
            "g_Tex".into(),
            MockTexture::sampled_with_sampler("tex", "tex_smp"),
        );
        resources.insert("g_Nonexistent".into(), MockBuffer::uniform("orphan"));
        srb.bind_all(&resources);

        // The paired sampler came along with the texture view, so the whole object is bound.
        assert!(srb.is_fully_bound());
        // The hidden sampler is not addressable by name.
        assert!(!srb.set(
            ShaderStage::Fragment,
            "g_Tex_sampler",
            MockSampler::new("smp"),
        ));
    }

    #[test]
    fn binding_an_image_without_a_view_sampler_leaves_the_pair_unbound() {
        let mut srb = ShaderResourceBinding::new(two_stage_layout(MockDevice::new()));
        assert!(srb.set(
            ShaderStage::Fragment,
            "g_Tex",
            MockTexture::sampled("bare_tex"),
        ));
        // The image slot is bound, the paired sampler slot is not.
        assert!(!srb.is_fully_bound());
    }

    #[test]
    fn static_resources_propagate_through_the_facade() {
        let device = MockDevice::new();
        let layout = two_stage_layout(device);

        let vs_table = layout.stage(ShaderStage::Vertex).unwrap().table().clone();
        let static_rules = ResourceLayoutRules {
            variables: vec![
                VariableRule::new("g_Constants", ShaderStages::VERTEX, ResourceClass::Static),
                VariableRule::new("g_PerDraw", ShaderStages::VERTEX, ResourceClass::Dynamic),
            ],
            ..Default::default()
        };
        let static_layout = StageResourceLayout::static_only(vs_table, &static_rules);
        let mut static_cache = static_layout.create_static_cache();
        let slot = static_layout.find_slot("g_Constants").unwrap();
        static_cache
            .bind(0, slot.cache_offset(), MockBuffer::uniform("shared_cb"))
            .unwrap();

        let mut srb = ShaderResourceBinding::new(layout);
        srb.initialize_static_resources(&static_layout, &static_cache);

        // The propagated binding observes the write-once policy like any other static bind.
        assert!(!srb.set(
            ShaderStage::Vertex,
            "g_Constants",
            MockBuffer::uniform("replacement"),
        ));
        let vs = srb.layout().stage(ShaderStage::Vertex).unwrap();
        let dst = vs.find_slot("g_Constants").unwrap();
        assert_eq!(
            srb.cache().bound_object(dst.set(), dst.cache_offset()).unwrap().name(),
            "shared_cb",
        );
    }

    #[test]
    fn full_commit_round_trip() {
        let device = MockDevice::new();
        let layout = two_stage_layout(device.clone());
        let mut srb = ShaderResourceBinding::new(layout.clone());

        srb.set(
            ShaderStage::Vertex,
            "g_Constants",
            MockBuffer::uniform("cb"),
        );
        srb.set(
            ShaderStage::Vertex,
            "g_PerDraw",
            MockBuffer::uniform_ring("ring", 192),
        );
        srb.set(
            ShaderStage::Fragment,
            "g_Tex",
            MockTexture::sampled_with_sampler("tex", "tex_smp"),
        );
        assert!(srb.is_fully_bound());

        srb.cache_mut().assign_native_set(0, DescriptorSetHandle(1));
        srb.cache_mut().assign_native_set(1, DescriptorSetHandle(2));

        layout.commit_dynamic_resources(srb.cache(), DescriptorSetHandle(2));

        let mut prepared = PreparedBind::default();
        assert!(layout.prepare_bind(srb.cache(), &mut prepared));
        assert_eq!(prepared.dynamic_offset_count(), 1);

        let mut binder = MockBinder::default();
        layout.bind_descriptor_sets(srb.cache(), ContextId(0), &mut prepared, &mut binder);
        let call = binder.calls.last().unwrap();
        assert_eq!(call.pipeline_layout, layout.handle());
        assert_eq!(call.first_set, 0);
        assert_eq!(
            call.sets,
            vec![DescriptorSetHandle(1), DescriptorSetHandle(2)],
        );
        assert_eq!(call.dynamic_offsets, vec![192]);
    }
}
