//! The pipeline-wide layout of shader resources.
//!
//! [`PipelineResourceLayout::new`] consumes one [`ShaderResourceTable`] per stage and a set of
//! [`ResourceLayoutRules`] that classify every resource by update frequency. Slots are handed
//! out by a two-set allocator: slowly-changing resources (static and mutable classes) share one
//! descriptor set, per-draw-varying (dynamic class) resources the other. Within every set,
//! allocation runs in three ordered passes across *all* stages — uniform-buffer-like resources
//! first, storage-buffer-like second, everything else third — because the native binding call
//! expects offset-taking buffers at the front of each set.
//!
//! The layout is mutated only during construction and immutable afterwards; it is owned by the
//! pipeline object and destroyed with it, releasing the native layout handles it created.

use crate::{
    descriptor_set::{
        cache::ResourceCache,
        layout::{DescriptorSetLayout, SetLayoutBinding},
    },
    device::{
        ContextId, DescriptorBinder, DescriptorSetHandle, DescriptorWrite, Device, DeviceError,
        DeviceObject, PipelineLayoutHandle,
    },
    sampler::SamplerCreateInfo,
    shader::{
        resources::{
            matches_with_suffix, ResourceAttributes, ResourceCategory, ShaderResourceTable,
        },
        ShaderStage, ShaderStages,
    },
    NonExhaustive,
};
use foldhash::quality::FixedState;
use log::{error, warn};
use smallvec::SmallVec;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    hash::{BuildHasher, Hash, Hasher},
    sync::Arc,
};

/// Update-frequency classification of a bound resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ResourceClass {
    /// Bound once, shared across all binding objects of a pipeline.
    Static = 0,
    /// Bound per binding object, rarely changed afterwards.
    Mutable = 1,
    /// Rebound freely, typically per draw.
    Dynamic = 2,
}

impl ResourceClass {
    pub(crate) const COUNT: usize = 3;
}

/// Assigns an update-frequency class to every resource whose name and stage match.
#[derive(Clone, Debug)]
pub struct VariableRule {
    /// The declared resource name the rule applies to. For separate samplers under a
    /// combined-sampler convention, this is the *texture* name; the sampler inherits the
    /// texture's class.
    pub name: String,

    /// The stages the rule applies to.
    pub stages: ShaderStages,

    /// The class assigned to matching resources.
    pub class: ResourceClass,

    pub _ne: NonExhaustive,
}

impl VariableRule {
    #[inline]
    pub fn new(name: impl Into<String>, stages: ShaderStages, class: ResourceClass) -> Self {
        Self {
            name: name.into(),
            stages,
            class,
            _ne: NonExhaustive(()),
        }
    }
}

/// Binds a sampler permanently into the layout for every matching sampler resource.
#[derive(Clone, Debug)]
pub struct ImmutableSamplerRule {
    /// The sampler or texture name the rule applies to. Combined image samplers are matched by
    /// their own name; separate samplers by the name of the texture they are paired with.
    pub name: String,

    /// The stages the rule applies to.
    pub stages: ShaderStages,

    /// The sampler the device collaborator is asked to create at layout-build time.
    pub sampler: SamplerCreateInfo,

    pub _ne: NonExhaustive,
}

impl ImmutableSamplerRule {
    #[inline]
    pub fn new(name: impl Into<String>, stages: ShaderStages, sampler: SamplerCreateInfo) -> Self {
        Self {
            name: name.into(),
            stages,
            sampler,
            _ne: NonExhaustive(()),
        }
    }
}

/// The configuration surface of layout construction: a list of per-name classification rules, a
/// default class for everything unmatched, and the immutable-sampler assignments.
#[derive(Clone, Debug)]
pub struct ResourceLayoutRules {
    /// The class of resources no rule matches.
    ///
    /// The default value is [`ResourceClass::Static`].
    pub default_class: ResourceClass,

    /// The per-resource classification rules.
    ///
    /// The default value is empty.
    pub variables: Vec<VariableRule>,

    /// The immutable-sampler assignments.
    ///
    /// The default value is empty.
    pub immutable_samplers: Vec<ImmutableSamplerRule>,

    pub _ne: NonExhaustive,
}

impl Default for ResourceLayoutRules {
    #[inline]
    fn default() -> Self {
        Self {
            default_class: ResourceClass::Static,
            variables: Vec::new(),
            immutable_samplers: Vec::new(),
            _ne: NonExhaustive(()),
        }
    }
}

impl ResourceLayoutRules {
    /// The class of one resource in one stage.
    ///
    /// Separate samplers are matched through the combined-sampler suffix, so that a rule naming
    /// a texture also classifies the sampler implicitly paired with it.
    pub fn class_of(
        &self,
        stage: ShaderStage,
        attribs: &ResourceAttributes,
        suffix: Option<&str>,
    ) -> ResourceClass {
        let stage_bit = ShaderStages::from(stage);
        let rule = self.variables.iter().find(|rule| {
            rule.stages.intersects(stage_bit)
                && if attribs.category() == ResourceCategory::Sampler {
                    matches_with_suffix(attribs.name(), &rule.name, suffix)
                } else {
                    **attribs.name() == *rule.name
                }
        });
        rule.map_or(self.default_class, |rule| rule.class)
    }

    // The immutable-sampler rule matching one sampler-carrying resource, if any. Only combined
    // image samplers and separate samplers can carry one.
    fn immutable_sampler_rule(
        &self,
        stage: ShaderStage,
        attribs: &ResourceAttributes,
        suffix: Option<&str>,
    ) -> Option<usize> {
        let stage_bit = ShaderStages::from(stage);
        match attribs.category() {
            ResourceCategory::CombinedImageSampler => self.immutable_samplers.iter().position(
                |rule| rule.stages.intersects(stage_bit) && **attribs.name() == *rule.name,
            ),
            ResourceCategory::Sampler => self.immutable_samplers.iter().position(|rule| {
                rule.stages.intersects(stage_bit)
                    && matches_with_suffix(attribs.name(), &rule.name, suffix)
            }),
            _ => None,
        }
    }
}

/// Controls how strictly layout construction verifies that every rule matched something.
///
/// Unmatched rules may be legitimate — a pipeline permutation may simply not use a resource the
/// rules were written for — so the default is to warn. Callers that want configuration typos to
/// fail loudly opt into strictness.
#[derive(Clone, Copy, Debug)]
pub struct LayoutVerification {
    /// Fail construction when a variable rule matches no resource in any designated stage.
    ///
    /// The default value is `false`.
    pub strict_variables: bool,

    /// Fail construction when an immutable-sampler rule matches no resource in any designated
    /// stage.
    ///
    /// The default value is `false`.
    pub strict_immutable_samplers: bool,

    pub _ne: NonExhaustive,
}

impl Default for LayoutVerification {
    #[inline]
    fn default() -> Self {
        Self {
            strict_variables: false,
            strict_immutable_samplers: false,
            _ne: NonExhaustive(()),
        }
    }
}

/// Parameters to create a new [`PipelineResourceLayout`].
#[derive(Clone, Debug)]
pub struct PipelineResourceLayoutCreateInfo {
    /// One resource table per active shader stage.
    ///
    /// The default value is empty.
    pub tables: Vec<Arc<ShaderResourceTable>>,

    /// The classification rules.
    ///
    /// The default value is `ResourceLayoutRules::default()`.
    pub rules: ResourceLayoutRules,

    /// Rule-coverage verification strictness.
    ///
    /// The default value is `LayoutVerification::default()`.
    pub verification: LayoutVerification,

    pub _ne: NonExhaustive,
}

impl Default for PipelineResourceLayoutCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            rules: ResourceLayoutRules::default(),
            verification: LayoutVerification::default(),
            _ne: NonExhaustive(()),
        }
    }
}

/// Error that can happen when building a [`PipelineResourceLayout`].
#[derive(Clone, Debug)]
pub enum LayoutBuildError {
    /// Two tables were supplied for the same shader stage.
    DuplicateStage { stage: ShaderStage },

    /// A set ran out of representable binding indices.
    SetCapacityExceeded { set: u32 },

    /// Strict verification: variable rules that matched no resource in any designated stage.
    UnmatchedVariableRules { names: Vec<String> },

    /// Strict verification: immutable-sampler rules that matched no resource in any designated
    /// stage.
    UnmatchedImmutableSamplerRules { names: Vec<String> },

    /// The device collaborator failed to create a native object.
    Device(DeviceError),
}

impl Error for LayoutBuildError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LayoutBuildError::Device(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for LayoutBuildError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            LayoutBuildError::DuplicateStage { stage } => {
                write!(f, "two resource tables target the {} stage", stage)
            }
            LayoutBuildError::SetCapacityExceeded { set } => {
                write!(f, "descriptor set {} ran out of binding indices", set)
            }
            LayoutBuildError::UnmatchedVariableRules { names } => write!(
                f,
                "variable rules matched no resource in any designated stage: {}",
                names.join(", "),
            ),
            LayoutBuildError::UnmatchedImmutableSamplerRules { names } => write!(
                f,
                "immutable-sampler rules matched no resource in any designated stage: {}",
                names.join(", "),
            ),
            LayoutBuildError::Device(err) => write!(f, "device object creation failed: {}", err),
        }
    }
}

impl From<DeviceError> for LayoutBuildError {
    #[inline]
    fn from(err: DeviceError) -> Self {
        LayoutBuildError::Device(err)
    }
}

/// One resource's place in the pipeline layout: a reference into its stage's table plus the
/// assigned `(set, binding, cache offset)` triple.
#[derive(Clone, Debug)]
pub struct ResourceSlot {
    resource_index: u16,
    class: ResourceClass,
    set: u16,
    binding: u16,
    cache_offset: u32,
    paired_sampler: Option<u16>,
    immutable_sampler: bool,
}

impl ResourceSlot {
    /// Index of the resource's attributes in the stage's table.
    #[inline]
    pub fn resource_index(&self) -> usize {
        usize::from(self.resource_index)
    }

    #[inline]
    pub fn class(&self) -> ResourceClass {
        self.class
    }

    /// The descriptor set the resource was assigned to.
    #[inline]
    pub fn set(&self) -> u32 {
        u32::from(self.set)
    }

    /// The binding slot within the set.
    #[inline]
    pub fn binding(&self) -> u32 {
        u32::from(self.binding)
    }

    /// The offset of the resource's first array element in the set's cache.
    #[inline]
    pub fn cache_offset(&self) -> u32 {
        self.cache_offset
    }

    /// For a separate image: the stage-local slot index of the sampler paired with it.
    #[inline]
    pub fn paired_sampler(&self) -> Option<usize> {
        self.paired_sampler.map(usize::from)
    }

    /// Whether an immutable sampler was assigned to the resource at layout-build time.
    #[inline]
    pub fn has_immutable_sampler(&self) -> bool {
        self.immutable_sampler
    }
}

/// The resource slots of one shader stage, grouped by class (static, then mutable, then
/// dynamic), each group in allocation order.
#[derive(Debug)]
pub struct StageResourceLayout {
    table: Arc<ShaderResourceTable>,
    slots: Vec<ResourceSlot>,
    class_counts: [u32; ResourceClass::COUNT],
}

impl StageResourceLayout {
    /// Builds the artificial static-only layout used to manage a shader's shared static
    /// resources. Slots are confined to a single set with sequential bindings and offsets; the
    /// matching cache comes from [`create_static_cache`](Self::create_static_cache).
    pub fn static_only(
        table: Arc<ShaderResourceTable>,
        rules: &ResourceLayoutRules,
    ) -> StageResourceLayout {
        let stage = table.stage();
        let suffix = table.combined_sampler_suffix();
        let mut slots = Vec::new();
        let mut cache_offset = 0u32;

        for (resource_index, attribs) in table.resources().iter().enumerate() {
            if rules.class_of(stage, attribs, suffix) != ResourceClass::Static {
                continue;
            }

            let paired_sampler = match attribs.category() {
                ResourceCategory::SampledImage => find_paired_slot(&table, &slots, attribs),
                _ => None,
            };
            let immutable_sampler = rules
                .immutable_sampler_rule(stage, attribs, suffix)
                .is_some();

            slots.push(ResourceSlot {
                resource_index: resource_index as u16,
                class: ResourceClass::Static,
                set: 0,
                binding: slots.len() as u16,
                cache_offset,
                paired_sampler,
                immutable_sampler,
            });
            cache_offset += u32::from(attribs.array_size());
        }

        let class_counts = [slots.len() as u32, 0, 0];
        StageResourceLayout {
            table,
            slots,
            class_counts,
        }
    }

    /// The table this stage layout references.
    #[inline]
    pub fn table(&self) -> &Arc<ShaderResourceTable> {
        &self.table
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.table.stage()
    }

    /// All slots: static group, then mutable, then dynamic.
    #[inline]
    pub fn slots(&self) -> &[ResourceSlot] {
        &self.slots
    }

    /// The number of resources of one class.
    #[inline]
    pub fn class_count(&self, class: ResourceClass) -> u32 {
        self.class_counts[class as usize]
    }

    /// The slots of one class, in allocation order.
    pub fn slots_of_class(&self, class: ResourceClass) -> &[ResourceSlot] {
        let start: u32 = self.class_counts[..class as usize].iter().sum();
        let end = start + self.class_counts[class as usize];
        &self.slots[start as usize..end as usize]
    }

    /// The attributes of the resource a slot refers to.
    #[inline]
    pub fn attributes(&self, slot: &ResourceSlot) -> &ResourceAttributes {
        self.table.resource(slot.resource_index())
    }

    /// Finds the slot of the resource with the given declared name.
    pub fn find_slot(&self, name: &str) -> Option<&ResourceSlot> {
        self.slots
            .iter()
            .find(|slot| &**self.attributes(slot).name() == name)
    }

    /// Allocates the cache backing a static-only layout: one set, one slot per array element.
    pub fn create_static_cache(&self) -> ResourceCache {
        debug_assert_eq!(self.class_counts[1] + self.class_counts[2], 0);
        let total: u32 = self
            .slots
            .iter()
            .map(|slot| u32::from(self.attributes(slot).array_size()))
            .sum();
        let mut cache = ResourceCache::with_set_sizes(&[total]);
        for slot in &self.slots {
            let attribs = self.attributes(slot);
            cache.init_slots(
                0,
                slot.cache_offset,
                u32::from(attribs.array_size()),
                attribs.category(),
                slot.class,
                slot.immutable_sampler && attribs.category() == ResourceCategory::Sampler,
            );
        }
        #[cfg(debug_assertions)]
        cache.verify_fully_initialized();
        cache
    }
}

// Separate samplers are allocated before separate images (category group order), so the sampler
// paired with `attribs` must already have a slot. A missing slot means the sampler was given a
// different class than its image, which breaks the implicit pairing.
fn find_paired_slot(
    table: &ShaderResourceTable,
    built: &[ResourceSlot],
    attribs: &ResourceAttributes,
) -> Option<u16> {
    let sampler_index = attribs.paired_resource()?;
    let found = built
        .iter()
        .position(|slot| slot.resource_index() == sampler_index);
    if found.is_none() {
        error!(
            "separate image `{}` is paired with sampler `{}`, but the sampler was classified \
            into a different variable class; the pairing is ignored",
            attribs.name(),
            table.resource(sampler_index).name(),
        );
    }
    found.map(|slot| slot as u16)
}

// The two coarse descriptor-set builders. Set indices are handed out lazily, in first-use
// order, so a pipeline whose resources are all dynamic still occupies set 0.
struct SetBuilder {
    set_index: Option<u16>,
    bindings: Vec<SetLayoutBinding>,
    descriptor_count: u32,
}

struct SlotAllocator {
    // [0]: static + mutable, [1]: dynamic.
    sets: [SetBuilder; 2],
    next_set_index: u16,
}

impl SlotAllocator {
    fn new() -> SlotAllocator {
        SlotAllocator {
            sets: [
                SetBuilder {
                    set_index: None,
                    bindings: Vec::new(),
                    descriptor_count: 0,
                },
                SetBuilder {
                    set_index: None,
                    bindings: Vec::new(),
                    descriptor_count: 0,
                },
            ],
            next_set_index: 0,
        }
    }

    fn allocate(
        &mut self,
        attribs: &ResourceAttributes,
        class: ResourceClass,
        stage: ShaderStage,
        immutable_sampler: Option<Arc<dyn DeviceObject>>,
    ) -> Result<(u16, u16, u32), LayoutBuildError> {
        let group = usize::from(class == ResourceClass::Dynamic);
        let builder = &mut self.sets[group];

        let set_index = match builder.set_index {
            Some(index) => index,
            None => {
                let index = self.next_set_index;
                self.next_set_index += 1;
                builder.set_index = Some(index);
                index
            }
        };

        if builder.bindings.len() >= usize::from(u16::MAX) {
            return Err(LayoutBuildError::SetCapacityExceeded {
                set: u32::from(set_index),
            });
        }

        let binding = builder.bindings.len() as u16;
        let cache_offset = builder.descriptor_count;
        builder.descriptor_count += u32::from(attribs.array_size());
        builder.bindings.push(SetLayoutBinding {
            binding: u32::from(binding),
            category: attribs.category(),
            descriptor_count: u32::from(attribs.array_size()),
            stages: stage.into(),
            immutable_sampler,
        });

        Ok((set_index, binding, cache_offset))
    }
}

/// A reusable snapshot of everything the native binding call needs besides the dynamic offsets,
/// produced by [`PipelineResourceLayout::prepare_bind`].
#[derive(Debug, Default)]
pub struct PreparedBind {
    sets: SmallVec<[DescriptorSetHandle; 2]>,
    dynamic_offset_count: u32,
    offsets: Vec<u32>,
}

impl PreparedBind {
    /// The native descriptor sets, in set-index order.
    #[inline]
    pub fn sets(&self) -> &[DescriptorSetHandle] {
        &self.sets
    }

    /// The number of dynamic offsets the bind call will supply.
    #[inline]
    pub fn dynamic_offset_count(&self) -> u32 {
        self.dynamic_offset_count
    }
}

/// The pipeline-wide resource layout: per-stage slot assignments, the finalized descriptor set
/// layouts, the native pipeline-layout object, and the compatibility fingerprint.
#[derive(Debug)]
pub struct PipelineResourceLayout {
    device: Arc<dyn Device>,
    stages: Vec<StageResourceLayout>,
    set_layouts: Vec<DescriptorSetLayout>,
    handle: PipelineLayoutHandle,
    immutable_samplers: Vec<Arc<dyn DeviceObject>>,
    fingerprint: u64,
}

impl PipelineResourceLayout {
    /// Builds the layout for one pipeline.
    ///
    /// Runs the rule-coverage verification, classifies and allocates every resource of every
    /// stage in the three-pass order, creates the immutable samplers through `device`, and
    /// finalizes the native set-layout and pipeline-layout objects.
    pub fn new(
        device: Arc<dyn Device>,
        create_info: PipelineResourceLayoutCreateInfo,
    ) -> Result<Arc<PipelineResourceLayout>, LayoutBuildError> {
        let PipelineResourceLayoutCreateInfo {
            tables,
            rules,
            verification,
            _ne: _,
        } = create_info;

        for (index, table) in tables.iter().enumerate() {
            if tables[..index].iter().any(|t| t.stage() == table.stage()) {
                return Err(LayoutBuildError::DuplicateStage {
                    stage: table.stage(),
                });
            }
        }

        verify_rule_coverage(&tables, &rules, verification)?;

        let features = device.features();
        let mut allocator = SlotAllocator::new();
        let mut immutable_samplers = Vec::new();
        // One sampler object per rule, shared by every resource the rule matches.
        let mut samplers_by_rule: Vec<Option<Arc<dyn DeviceObject>>> =
            vec![None; rules.immutable_samplers.len()];

        // Per stage, per class: slots in allocation order. Groups are concatenated afterwards.
        let mut buckets: Vec<[Vec<ResourceSlot>; ResourceClass::COUNT]> = tables
            .iter()
            .map(|_| [Vec::new(), Vec::new(), Vec::new()])
            .collect();

        for pass in 0..3 {
            for (stage_index, table) in tables.iter().enumerate() {
                let stage = table.stage();
                let suffix = table.combined_sampler_suffix();

                for (resource_index, attribs) in table.resources().iter().enumerate() {
                    if attribs.category().allocation_pass() != pass {
                        continue;
                    }
                    let class = rules.class_of(stage, attribs, suffix);
                    let bucket = &mut buckets[stage_index][class as usize];

                    let paired_sampler = match attribs.category() {
                        ResourceCategory::SampledImage => find_paired_slot(table, bucket, attribs),
                        _ => None,
                    };

                    let mut immutable_sampler = None;
                    if let Some(rule) = rules.immutable_sampler_rule(stage, attribs, suffix) {
                        if attribs.array_size() > 1 && !features.immutable_sampler_arrays {
                            warn!(
                                "immutable sampler `{}` matches array resource `{}`, but the \
                                device does not support immutable sampler arrays; the \
                                assignment is dropped",
                                rules.immutable_samplers[rule].name,
                                attribs.name(),
                            );
                        } else {
                            let sampler = match &samplers_by_rule[rule] {
                                Some(sampler) => sampler.clone(),
                                None => {
                                    let sampler = device
                                        .create_sampler(&rules.immutable_samplers[rule].sampler)?;
                                    samplers_by_rule[rule] = Some(sampler.clone());
                                    immutable_samplers.push(sampler.clone());
                                    sampler
                                }
                            };
                            immutable_sampler = Some(sampler);
                        }
                    }
                    let has_immutable = immutable_sampler.is_some();

                    let (set, binding, cache_offset) =
                        allocator.allocate(attribs, class, stage, immutable_sampler)?;

                    bucket.push(ResourceSlot {
                        resource_index: resource_index as u16,
                        class,
                        set,
                        binding,
                        cache_offset,
                        paired_sampler,
                        immutable_sampler: has_immutable,
                    });
                }
            }
        }

        let stages = tables
            .into_iter()
            .zip(buckets)
            .map(|(table, groups)| {
                let class_counts =
                    [0, 1, 2].map(|class: usize| groups[class].len() as u32);
                // `paired_sampler` was recorded as an index into the class bucket; rebase it
                // onto the concatenated slot list.
                let mut slots = Vec::with_capacity(groups.iter().map(Vec::len).sum());
                let mut base = 0u16;
                for group in groups {
                    let group_base = base;
                    base += group.len() as u16;
                    slots.extend(group.into_iter().map(|mut slot| {
                        slot.paired_sampler =
                            slot.paired_sampler.map(|within| group_base + within);
                        slot
                    }));
                }
                StageResourceLayout {
                    table,
                    slots,
                    class_counts,
                }
            })
            .collect::<Vec<_>>();

        let mut set_layouts = Vec::new();
        for builder in allocator.sets {
            if let Some(set_index) = builder.set_index {
                set_layouts.push(DescriptorSetLayout::new(
                    device.clone(),
                    u32::from(set_index),
                    builder.bindings,
                )?);
            }
        }
        set_layouts.sort_by_key(|layout| layout.set_index());

        let handles: SmallVec<[_; 2]> = set_layouts.iter().map(|layout| layout.handle()).collect();
        let handle = device.create_pipeline_layout(&handles)?;

        let fingerprint = {
            let mut hasher = FixedState::default().build_hasher();
            set_layouts.len().hash(&mut hasher);
            for layout in &set_layouts {
                layout.hash_shape(&mut hasher);
            }
            hasher.finish()
        };

        Ok(Arc::new(PipelineResourceLayout {
            device,
            stages,
            set_layouts,
            handle,
            immutable_samplers,
            fingerprint,
        }))
    }

    /// The device the native objects were created from.
    #[inline]
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// The per-stage slot assignments, in table order.
    #[inline]
    pub fn stages(&self) -> &[StageResourceLayout] {
        &self.stages
    }

    /// The stage layout for one shader stage, if the pipeline has it.
    pub fn stage(&self, stage: ShaderStage) -> Option<&StageResourceLayout> {
        self.stages.iter().find(|s| s.stage() == stage)
    }

    /// The finalized set layouts, in set-index order.
    #[inline]
    pub fn set_layouts(&self) -> &[DescriptorSetLayout] {
        &self.set_layouts
    }

    /// The native pipeline-layout handle.
    #[inline]
    pub fn handle(&self) -> PipelineLayoutHandle {
        self.handle
    }

    /// The sampler objects bound permanently into the layout.
    #[inline]
    pub fn immutable_samplers(&self) -> &[Arc<dyn DeviceObject>] {
        &self.immutable_samplers
    }

    /// The number of cache slots each set needs, in set-index order. External descriptor-pool
    /// allocators size their per-set allocations from this.
    pub fn descriptor_set_sizes(&self) -> SmallVec<[u32; 2]> {
        self.set_layouts
            .iter()
            .map(|layout| layout.total_descriptors())
            .collect()
    }

    /// The compatibility fingerprint. Two layouts with equal fingerprints are compatible in the
    /// sense of [`is_same_as`](Self::is_same_as) barring hash collisions; immutable sampler
    /// identity does not participate.
    #[inline]
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Returns whether two layouts expose identical resource layouts: the same active-set
    /// count, and per corresponding set, identical ordered bindings (type, count, stage mask).
    /// Binding objects created from one can be committed against the other.
    pub fn is_same_as(&self, other: &PipelineResourceLayout) -> bool {
        self.set_layouts.len() == other.set_layouts.len()
            && self
                .set_layouts
                .iter()
                .zip(other.set_layouts.iter())
                .all(|(a, b)| a.is_compatible_with(b))
    }

    /// Allocates the resource cache for one binding object: one slot per cache offset declared
    /// by the layout, each recording its expected category and class. No handles are populated.
    pub fn create_cache(&self) -> ResourceCache {
        let sizes = self.descriptor_set_sizes();
        let mut cache = ResourceCache::with_set_sizes(&sizes);

        // Cache slots must be described in offset order within each set; allocation order
        // interleaves stages, so gather and sort.
        let mut slots: Vec<(&StageResourceLayout, &ResourceSlot)> = self
            .stages
            .iter()
            .flat_map(|stage| stage.slots.iter().map(move |slot| (stage, slot)))
            .collect();
        slots.sort_by_key(|(_, slot)| (slot.set, slot.cache_offset));

        for (stage, slot) in slots {
            let attribs = stage.attributes(slot);
            cache.init_slots(
                slot.set(),
                slot.cache_offset,
                u32::from(attribs.array_size()),
                attribs.category(),
                slot.class,
                slot.immutable_sampler && attribs.category() == ResourceCategory::Sampler,
            );
        }
        #[cfg(debug_assertions)]
        cache.verify_fully_initialized();
        cache
    }

    /// Propagates the resources bound on a shader's shared static cache into a binding
    /// object's cache. Called once, at binding-object creation; relies on both layouts
    /// enumerating static resources in the same order.
    pub fn copy_static_resources(
        &self,
        src_layout: &StageResourceLayout,
        src_cache: &ResourceCache,
        dst_cache: &mut ResourceCache,
    ) {
        let Some(dst_stage) = self.stage(src_layout.stage()) else {
            error!(
                "cannot propagate static resources: the pipeline has no {} stage",
                src_layout.stage(),
            );
            return;
        };

        let src_slots = src_layout.slots_of_class(ResourceClass::Static);
        let dst_slots = dst_stage.slots_of_class(ResourceClass::Static);
        debug_assert_eq!(src_slots.len(), dst_slots.len());

        for (src_slot, dst_slot) in src_slots.iter().zip(dst_slots) {
            debug_assert_eq!(src_slot.resource_index, dst_slot.resource_index);
            let array_size = u32::from(dst_stage.attributes(dst_slot).array_size());
            for element in 0..array_size {
                if let Some(object) = src_cache.bound_object(0, src_slot.cache_offset + element) {
                    dst_cache.copy_binding(
                        dst_slot.set(),
                        dst_slot.cache_offset + element,
                        object.clone(),
                    );
                }
            }
        }
    }

    /// The stage layout and slot covering one `(set, cache offset)` pair, for diagnostics.
    pub fn slot_at(&self, set: u32, offset: u32) -> Option<(&StageResourceLayout, &ResourceSlot)> {
        self.stages.iter().find_map(|stage| {
            stage
                .slots
                .iter()
                .find(|slot| {
                    slot.set() == set
                        && (slot.cache_offset..slot.cache_offset
                            + u32::from(stage.attributes(slot).array_size()))
                            .contains(&offset)
                })
                .map(|slot| (stage, slot))
        })
    }

    /// First phase of the commit: validates that the cache is complete and snapshots the native
    /// set handles into `prepared`. Pure computation, callable ahead of the draw.
    ///
    /// Returns `false` — after logging, without issuing anything — if a non-immutable slot is
    /// unbound or a set has no native descriptor set assigned. A draw is never partially
    /// committed.
    pub fn prepare_bind(&self, cache: &ResourceCache, prepared: &mut PreparedBind) -> bool {
        if let Some((set, offset)) = cache.first_unbound() {
            match self.slot_at(set, offset) {
                Some((stage, slot)) => error!(
                    "binding object committed while `{}` ({} stage) is unbound; skipping the \
                    bind",
                    stage.attributes(slot).name(),
                    stage.stage(),
                ),
                None => error!(
                    "binding object committed while slot (set {}, offset {}) is unbound; \
                    skipping the bind",
                    set, offset,
                ),
            }
            return false;
        }

        prepared.sets.clear();
        for layout in &self.set_layouts {
            match cache.native_set(layout.set_index()) {
                Some(handle) => prepared.sets.push(handle),
                None => {
                    error!(
                        "no native descriptor set is assigned for set {}; skipping the bind",
                        layout.set_index(),
                    );
                    return false;
                }
            }
        }
        prepared.dynamic_offset_count = cache.dynamic_buffer_count();
        true
    }

    /// Writes the descriptors of every bound dynamic-class resource into `native_set`. Called
    /// once per draw for the per-draw set, whose native allocation changes every time.
    pub fn commit_dynamic_resources(&self, cache: &ResourceCache, native_set: DescriptorSetHandle) {
        for stage in &self.stages {
            for slot in stage.slots_of_class(ResourceClass::Dynamic) {
                let attribs = stage.attributes(slot);
                for element in 0..u32::from(attribs.array_size()) {
                    if let Some(object) = cache.bound_object(slot.set(), slot.cache_offset + element)
                    {
                        self.device.update_descriptor(
                            native_set,
                            &DescriptorWrite {
                                binding: slot.binding(),
                                array_element: element,
                                category: attribs.category(),
                                object,
                            },
                        );
                    }
                }
            }
        }
    }

    /// Second phase of the commit: resolves the per-draw offsets of every bound
    /// frequently-updated buffer against `ctx` and issues the native binding call. Must run on
    /// the thread owning `ctx`, immediately before the draw.
    pub fn bind_descriptor_sets(
        &self,
        cache: &ResourceCache,
        ctx: ContextId,
        prepared: &mut PreparedBind,
        binder: &mut dyn DescriptorBinder,
    ) {
        prepared.offsets.clear();
        let written = cache.dynamic_offsets(ctx, &mut prepared.offsets);
        debug_assert_eq!(written, prepared.dynamic_offset_count);
        binder.bind_descriptor_sets(self.handle, 0, &prepared.sets, &prepared.offsets);
    }
}

impl Drop for PipelineResourceLayout {
    fn drop(&mut self) {
        self.device.destroy_pipeline_layout(self.handle);
    }
}

// Walks every rule once and reports the ones that matched nothing anywhere. Unused rules are
// legitimate in some pipeline permutations, hence warnings by default and failure only under
// strict verification.
fn verify_rule_coverage(
    tables: &[Arc<ShaderResourceTable>],
    rules: &ResourceLayoutRules,
    verification: LayoutVerification,
) -> Result<(), LayoutBuildError> {
    let mut unmatched_variables = Vec::new();
    for rule in &rules.variables {
        if rule.stages.is_empty() {
            warn!("variable rule `{}` designates no shader stages", rule.name);
            continue;
        }
        let found = tables.iter().any(|table| {
            rule.stages.intersects(table.stage().into())
                && table
                    .resources()
                    .iter()
                    .any(|attribs| **attribs.name() == *rule.name)
        });
        if !found {
            warn!(
                "variable rule `{}` matches no resource in any designated stage",
                rule.name,
            );
            unmatched_variables.push(rule.name.clone());
        }
    }
    if verification.strict_variables && !unmatched_variables.is_empty() {
        return Err(LayoutBuildError::UnmatchedVariableRules {
            names: unmatched_variables,
        });
    }

    let mut unmatched_samplers = Vec::new();
    for rule in &rules.immutable_samplers {
        if rule.stages.is_empty() {
            warn!(
                "immutable-sampler rule `{}` designates no shader stages",
                rule.name,
            );
            continue;
        }
        let found = tables.iter().any(|table| {
            if !rule.stages.intersects(table.stage().into()) {
                return false;
            }
            let suffix = table.combined_sampler_suffix();
            table
                .resources_in(ResourceCategory::CombinedImageSampler)
                .iter()
                .any(|attribs| **attribs.name() == *rule.name)
                || table
                    .resources_in(ResourceCategory::Sampler)
                    .iter()
                    .any(|attribs| matches_with_suffix(attribs.name(), &rule.name, suffix))
        });
        if !found {
            warn!(
                "immutable-sampler rule `{}` matches no resource in any designated stage",
                rule.name,
            );
            unmatched_samplers.push(rule.name.clone());
        }
    }
    if verification.strict_immutable_samplers && !unmatched_samplers.is_empty() {
        return Err(LayoutBuildError::UnmatchedImmutableSamplerRules {
            names: unmatched_samplers,
        });
    }

    Ok(())
}
