//! Rig embedding pipeline.
//!
//! A request moves strictly forward through
//! `Idle → Parsed → BudgetResolved → Planned → Generated → Serialized`;
//! any error ends it in `Failed` and no output is returned.

pub mod advisory;
pub mod budget;
pub mod deadline;
pub mod mesh;
pub mod morph;
pub mod serializer;
pub mod sizing;
pub mod skeleton;
pub mod types;

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::error::RigError;
use crate::glb::{self, GlbContainer};
use crate::tier::{TierBudget, TierResolver};

pub use advisory::{RigAdvice, RigAdvisor, StaticAdvisor};
pub use deadline::Deadline;
pub use mesh::{MeshBounds, MeshProfile};
pub use serializer::RigContext;
pub use sizing::SizeModel;
pub use types::{
    BoneDefinition, BoneType, CountPlan, DEFAULT_EXTENSION_NAME, DEFAULT_SEED, MorphCategory,
    MorphTarget, RigOptions, RigOutput, RigPlan, RigReport,
};

// ─── Stages ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Parsed,
    BudgetResolved,
    Planned,
    Generated,
    Serialized,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Parsed => "parsed",
            PipelineStage::BudgetResolved => "budget-resolved",
            PipelineStage::Planned => "planned",
            PipelineStage::Generated => "generated",
            PipelineStage::Serialized => "serialized",
            PipelineStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks the current stage of one request.
#[derive(Debug)]
struct StageTracker {
    current: PipelineStage,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            current: PipelineStage::Idle,
        }
    }

    fn advance(&mut self, next: PipelineStage) {
        log::debug!("rig pipeline: {} -> {next}", self.current);
        self.current = next;
    }

    fn fail(&mut self, err: &RigError) {
        log::warn!("rig pipeline failed after stage {}: {err}", self.current);
        self.current = PipelineStage::Failed;
    }
}

// ─── Pipeline ─────────────────────────────────────────────────────────────────

/// Counts chosen for an input without generating any buffers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RigEstimate {
    pub budget: TierBudget,
    pub vertex_count: usize,
    pub original_size_bytes: u64,
    /// Input length as it will be re-encoded; the size model starts here.
    pub encoded_size_bytes: u64,
    pub plan: CountPlan,
    pub advisory_applied: bool,
}

/// Everything decided before generation starts.
struct Prepared {
    container: GlbContainer,
    profile: MeshProfile,
    budget: TierBudget,
    encoded_size: u64,
    plan: CountPlan,
    advisory_applied: bool,
}

/// Runs rig embedding requests against one tier resolver.
pub struct RigPipeline<'a, R: TierResolver + ?Sized> {
    resolver: &'a R,
    advisor: Option<&'a dyn RigAdvisor>,
    options: RigOptions,
}

impl<'a, R: TierResolver + ?Sized> RigPipeline<'a, R> {
    pub fn new(resolver: &'a R, options: RigOptions) -> Self {
        Self {
            resolver,
            advisor: None,
            options,
        }
    }

    pub fn with_advisor(mut self, advisor: &'a dyn RigAdvisor) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn options(&self) -> &RigOptions {
        &self.options
    }

    /// Embed a budget-fitted rig into `input` for the tier `plan_id`.
    ///
    /// On any failure, including an expired deadline, no output is returned.
    pub fn run(&self, input: &[u8], plan_id: &str) -> Result<RigOutput, RigError> {
        let mut stages = StageTracker::new();
        self.execute(input, plan_id, &mut stages)
            .inspect_err(|err| stages.fail(err))
    }

    /// Resolve the tier and choose counts, stopping before generation.
    pub fn plan_only(&self, input: &[u8], plan_id: &str) -> Result<RigEstimate, RigError> {
        let mut stages = StageTracker::new();
        let prepared = self
            .prepare(input, plan_id, &mut stages)
            .inspect_err(|err| stages.fail(err))?;
        Ok(RigEstimate {
            budget: prepared.budget,
            vertex_count: prepared.profile.vertex_count,
            original_size_bytes: input.len() as u64,
            encoded_size_bytes: prepared.encoded_size,
            plan: prepared.plan,
            advisory_applied: prepared.advisory_applied,
        })
    }

    fn prepare(
        &self,
        input: &[u8],
        plan_id: &str,
        stages: &mut StageTracker,
    ) -> Result<Prepared, RigError> {
        let deadline = self.options.deadline;

        let container = glb::parse(input)?;
        stages.advance(PipelineStage::Parsed);
        deadline.check("parse")?;

        let tier = self.resolver.resolve(plan_id)?;
        let profile = mesh::profile(&container)?;
        let (budget, advisory_applied) = advisory::apply(self.advisor, &profile, &tier);
        stages.advance(PipelineStage::BudgetResolved);
        deadline.check("tier resolution")?;

        // the output carries the document as serde_json writes it, which can be
        // longer than the uploaded text
        let encoded_size = glb::encoded_len(&container)?;
        let model = SizeModel::new(encoded_size);
        let plan = budget::plan(&model, profile.vertex_count, &budget);
        stages.advance(PipelineStage::Planned);
        deadline.check("planning")?;

        Ok(Prepared {
            container,
            profile,
            budget,
            encoded_size,
            plan,
            advisory_applied,
        })
    }

    fn execute(
        &self,
        input: &[u8],
        plan_id: &str,
        stages: &mut StageTracker,
    ) -> Result<RigOutput, RigError> {
        let Prepared {
            container,
            profile,
            budget,
            plan,
            advisory_applied,
            ..
        } = self.prepare(input, plan_id, stages)?;
        let deadline = self.options.deadline;

        let bones = skeleton::synthesize(&profile, plan.bone_count);
        let morphs = morph::synthesize(&profile, plan.morph_count, self.options.seed, deadline)?;
        let rig = RigPlan {
            bones,
            morphs,
            projected_size_bytes: plan.projected_size_bytes,
            quality_degraded: plan.quality_degraded,
        };
        stages.advance(PipelineStage::Generated);
        deadline.check("generation")?;

        let glb = serializer::write_rig(
            &container,
            &rig,
            profile.positions.as_deref(),
            RigContext {
                plan_id: &budget.plan_id,
                vertex_count: profile.vertex_count,
                extension_name: &self.options.extension_name,
            },
        )?;
        deadline.check("serialization")?;
        stages.advance(PipelineStage::Serialized);

        let report = RigReport {
            plan_id: budget.plan_id.clone(),
            vertex_count: profile.vertex_count,
            bone_count: rig.bones.len(),
            morph_count: rig.morphs.len(),
            bone_names: rig.bones.iter().map(|bone| bone.name.clone()).collect(),
            morph_names: rig.morphs.iter().map(|morph| morph.name.clone()).collect(),
            projected_size_bytes: rig.projected_size_bytes,
            output_size_bytes: glb.len() as u64,
            max_file_size_bytes: budget.max_file_size_bytes,
            quality_degraded: rig.quality_degraded,
            advisory_applied,
        };
        log::info!(
            "embedded rig for tier {}: {} bone(s), {} morph(s), {} -> {} bytes{}",
            report.plan_id,
            report.bone_count,
            report.morph_count,
            input.len(),
            report.output_size_bytes,
            if report.quality_degraded { " (degraded)" } else { "" }
        );

        Ok(RigOutput { glb, report })
    }
}

/// One-shot embedding with default options.
pub fn embed_rig<R: TierResolver + ?Sized>(
    resolver: &R,
    input: &[u8],
    plan_id: &str,
) -> Result<RigOutput, RigError> {
    RigPipeline::new(resolver, RigOptions::default()).run(input, plan_id)
}

// ─── Inspection ───────────────────────────────────────────────────────────────

/// Rig stored in a container's document extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedRigSummary {
    pub tier: Option<String>,
    pub bone_count: usize,
    pub morph_count: usize,
    pub quality_degraded: bool,
}

/// Structural overview of a GLB container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSummary {
    pub version: u32,
    pub total_length: u32,
    pub binary_length: usize,
    pub mesh_count: usize,
    /// `None` when the document has no usable POSITION data.
    pub vertex_count: Option<usize>,
    pub extensions_used: Vec<String>,
    pub rig: Option<EmbeddedRigSummary>,
}

/// Summarize `bytes` without modifying them. `extension_name` selects the
/// rig extension to report on.
pub fn inspect(bytes: &[u8], extension_name: &str) -> Result<ContainerSummary, RigError> {
    let container = glb::parse(bytes)?;
    let json = &container.json;

    let vertex_count = match mesh::profile(&container) {
        Ok(profile) => Some(profile.vertex_count),
        Err(err) => {
            log::debug!("no vertex count for inspected container: {err}");
            None
        }
    };

    let extensions_used = json
        .get("extensionsUsed")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();

    let rig = json
        .get("extensions")
        .and_then(|extensions| extensions.get(extension_name))
        .map(|body| {
            let len = |key: &str| body.get(key).and_then(Value::as_array).map_or(0, Vec::len);
            EmbeddedRigSummary {
                tier: body.get("tier").and_then(Value::as_str).map(str::to_string),
                bone_count: len("bones"),
                morph_count: len("morphTargets"),
                quality_degraded: body
                    .get("qualityDegraded")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            }
        });

    Ok(ContainerSummary {
        version: container.header.version,
        total_length: container.header.total_length,
        binary_length: container.binary_payload.len(),
        mesh_count: json
            .get("meshes")
            .and_then(Value::as_array)
            .map_or(0, Vec::len),
        vertex_count,
        extensions_used,
        rig,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::fixtures::{exponent_extras_json, mesh_document, mesh_glb, mesh_payload, raw_glb};
    use crate::tier::{BYTES_PER_MB, StaticTierSource, TierCache, TierRecord};
    use super::sizing::HARD_SIZE_CEILING_BYTES;

    fn resolver() -> TierCache<StaticTierSource> {
        TierCache::new(StaticTierSource::builtin())
    }

    #[test]
    fn given_free_tier_and_12k_vertices_when_embedding_then_tier_maxima_are_used() {
        let input = mesh_glb(12_000);

        let output = embed_rig(&resolver(), &input, "free").expect("embed");
        let report = &output.report;
        assert_eq!(report.bone_count, 20);
        assert_eq!(report.morph_count, 10);
        assert!(!report.quality_degraded);
        assert!(report.output_size_bytes <= 25 * BYTES_PER_MB);
        assert!(report.output_size_bytes <= report.projected_size_bytes);
        assert_eq!(report.bone_names[0], "root");
        assert_eq!(report.morph_names[..4], ["smile", "frown", "blink", "mouthOpen"]);
    }

    #[test]
    fn given_embedded_output_when_reparsing_then_original_document_is_preserved() {
        let input = mesh_glb(500);
        let original = glb::parse(&input).expect("parse input");

        let output = embed_rig(&resolver(), &input, "goat").expect("embed");
        let reparsed = glb::parse(&output.glb).expect("reparse");
        gltf::Gltf::from_slice(&output.glb).expect("gltf crate accepts output");

        for key in ["asset", "scenes", "nodes", "meshes", "materials", "accessors"] {
            assert_eq!(reparsed.json[key], original.json[key], "{key} changed");
        }
        let views = reparsed.json["bufferViews"].as_array().expect("views");
        assert_eq!(views[0], original.json["bufferViews"][0]);
        assert_eq!(
            reparsed.binary_payload[..original.binary_payload.len()],
            original.binary_payload[..]
        );
        assert_eq!(output.glb.len() % 4, 0);
    }

    #[test]
    fn given_goat_tier_when_embedding_then_output_respects_budget() {
        let input = mesh_glb(2_000);

        let output = embed_rig(&resolver(), &input, "goat").expect("embed");
        let report = &output.report;
        assert_eq!(report.bone_count, 82);
        assert_eq!(report.morph_count, 100);
        assert!(report.output_size_bytes <= report.projected_size_bytes);
        assert!(report.projected_size_bytes <= 95 * BYTES_PER_MB);
    }

    #[test]
    fn given_corrupted_magic_when_embedding_then_malformed_container_is_returned() {
        let mut input = mesh_glb(100);
        input[0] = b'x';

        assert!(matches!(
            embed_rig(&resolver(), &input, "free"),
            Err(RigError::MalformedContainer(_))
        ));
    }

    #[test]
    fn given_zero_vertices_when_embedding_then_invalid_mesh_is_returned() {
        let input = mesh_glb(0);

        assert!(matches!(
            embed_rig(&resolver(), &input, "free"),
            Err(RigError::InvalidMesh(_))
        ));
    }

    #[test]
    fn given_unknown_plan_when_embedding_then_unknown_tier_is_returned() {
        let input = mesh_glb(100);

        assert_eq!(
            embed_rig(&resolver(), &input, "platinum").map(|output| output.report.bone_count),
            Err(RigError::UnknownTier("platinum".to_string()))
        );
    }

    #[test]
    fn given_same_input_and_seed_when_embedding_twice_then_outputs_are_identical() {
        let input = mesh_glb(300);
        let resolver = resolver();

        let first = embed_rig(&resolver, &input, "goat").expect("first");
        let second = embed_rig(&resolver, &input, "goat").expect("second");
        assert_eq!(first.glb, second.glb);
    }

    #[test]
    fn given_expired_deadline_when_running_then_no_output_is_returned() {
        let input = mesh_glb(100);
        let resolver = resolver();
        let options = RigOptions {
            deadline: Deadline::at(Instant::now()),
            ..RigOptions::default()
        };

        let result = RigPipeline::new(&resolver, options).run(&input, "free");
        assert!(matches!(result, Err(RigError::DeadlineExceeded { .. })));
    }

    #[test]
    fn given_advisor_caps_when_running_then_counts_are_lowered() {
        let input = mesh_glb(400);
        let resolver = resolver();
        let advisor = StaticAdvisor {
            bone_cap: Some(14),
            morph_cap: Some(6),
        };

        let output = RigPipeline::new(&resolver, RigOptions::default())
            .with_advisor(&advisor)
            .run(&input, "goat")
            .expect("embed");
        assert_eq!(output.report.bone_count, 14);
        assert_eq!(output.report.morph_count, 6);
        assert!(output.report.advisory_applied);
    }

    #[test]
    fn given_custom_extension_name_when_running_then_rig_is_stored_under_it() {
        let input = mesh_glb(64);
        let resolver = resolver();
        let options = RigOptions {
            extension_name: "ACME_avatar_rig".to_string(),
            ..RigOptions::default()
        };

        let output = RigPipeline::new(&resolver, options)
            .run(&input, "free")
            .expect("embed");
        let summary = inspect(&output.glb, "ACME_avatar_rig").expect("inspect");
        assert!(summary.extensions_used.contains(&"ACME_avatar_rig".to_string()));
        assert_eq!(summary.rig.map(|rig| rig.bone_count), Some(20));
    }

    #[test]
    fn given_plan_only_when_estimating_then_no_output_is_built() {
        let input = mesh_glb(12_000);
        let resolver = resolver();

        let estimate = RigPipeline::new(&resolver, RigOptions::default())
            .plan_only(&input, "free")
            .expect("estimate");
        assert_eq!(estimate.vertex_count, 12_000);
        assert_eq!(estimate.original_size_bytes, input.len() as u64);
        assert_eq!(estimate.plan.bone_count, 20);
        assert_eq!(estimate.plan.morph_count, 10);
    }

    #[test]
    fn given_plain_mesh_when_inspecting_then_no_rig_is_reported() {
        let input = mesh_glb(32);

        let summary = inspect(&input, DEFAULT_EXTENSION_NAME).expect("inspect");
        assert_eq!(summary.version, 2);
        assert_eq!(summary.total_length as usize, input.len());
        assert_eq!(summary.vertex_count, Some(32));
        assert!(summary.extensions_used.is_empty());
        assert!(summary.rig.is_none());
    }

    #[test]
    fn given_embedded_output_when_inspecting_then_rig_is_reported() {
        let input = mesh_glb(32);
        let output = embed_rig(&resolver(), &input, "free").expect("embed");

        let summary = inspect(&output.glb, DEFAULT_EXTENSION_NAME).expect("inspect");
        let rig = summary.rig.expect("rig");
        assert_eq!(rig.tier.as_deref(), Some("free"));
        assert_eq!(rig.bone_count, 20);
        assert_eq!(rig.morph_count, 10);
        assert!(!rig.quality_degraded);
    }

    #[test]
    fn given_count_far_past_buffer_when_embedding_then_invalid_mesh_is_returned() {
        let mut document = mesh_document(4);
        document["accessors"][0]["count"] = json!(1u64 << 62);
        let input = raw_glb(
            &serde_json::to_vec(&document).expect("encode"),
            Some(&mesh_payload(4)),
        );

        assert!(matches!(
            embed_rig(&resolver(), &input, "free"),
            Err(RigError::InvalidMesh(_))
        ));
    }

    #[test]
    fn given_weights_alone_over_ceiling_when_embedding_then_output_stays_under_ceiling() {
        let mut document = mesh_document(0);
        document["accessors"][0]["count"] = json!(4_000_000);
        let input = raw_glb(&serde_json::to_vec(&document).expect("encode"), None);

        let output = embed_rig(&resolver(), &input, "goat").expect("embed");
        let report = &output.report;
        assert!(report.quality_degraded);
        assert_eq!(report.bone_count, 0);
        assert_eq!(report.morph_count, 0);
        assert!(report.output_size_bytes <= report.projected_size_bytes);
        assert!(report.output_size_bytes <= HARD_SIZE_CEILING_BYTES);
    }

    #[test]
    fn given_exponent_numbers_in_document_when_embedding_then_output_stays_within_projection() {
        let json_bytes = exponent_extras_json(&mesh_document(2_000), 3_000);
        let input = raw_glb(&json_bytes, Some(&mesh_payload(2_000)));

        let resolver = resolver();
        let pipeline = RigPipeline::new(&resolver, RigOptions::default());
        let estimate = pipeline.plan_only(&input, "free").expect("estimate");
        assert!(estimate.encoded_size_bytes > estimate.original_size_bytes);

        let output = pipeline.run(&input, "free").expect("embed");
        assert!(output.report.output_size_bytes <= output.report.projected_size_bytes);
        assert_eq!(output.report.projected_size_bytes, estimate.plan.projected_size_bytes);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn embedded_output_respects_tier_and_projection(
            vertex_count in 1usize..3_000,
            max_bones in 0usize..100,
            max_morph_targets in 0usize..300,
            max_file_size_mb in 1u64..40,
            extras in 0usize..400,
        ) {
            let json_bytes = exponent_extras_json(&mesh_document(vertex_count), extras);
            let input = raw_glb(&json_bytes, Some(&mesh_payload(vertex_count)));
            let resolver = TierCache::new(StaticTierSource::from_records([TierRecord {
                plan_id: "custom".to_string(),
                max_bones,
                max_morph_targets,
                max_file_size_mb,
            }]));

            let output = embed_rig(&resolver, &input, "custom").expect("embed");
            let report = &output.report;
            prop_assert_eq!(report.output_size_bytes, output.glb.len() as u64);
            prop_assert!(report.bone_count <= max_bones);
            prop_assert!(report.morph_count <= max_morph_targets);
            prop_assert!(report.output_size_bytes <= report.projected_size_bytes);
            prop_assert!(report.output_size_bytes <= HARD_SIZE_CEILING_BYTES);
            if !report.quality_degraded {
                prop_assert!(report.output_size_bytes <= report.max_file_size_bytes);
            }
        }
    }
}
