use crate::tier::TierBudget;

use super::sizing::{HARD_SIZE_CEILING_BYTES, SizeModel};
use super::types::{BONE_CATALOGUE, CountPlan, MORPH_CATALOGUE_LEN};

/// Morph count the optimizer will not go below while trying to fit a budget.
pub const MIN_MORPH_TARGETS: usize = 5;
/// Smallest skeleton the optimizer considers viable.
pub const MIN_VIABLE_BONES: usize = 9;

/// Choose bone and morph counts for `vertex_count` vertices under `budget`.
///
/// Morphs are reduced first because they dominate the size, then bones. If
/// both floors are reached and the estimate is still over budget, the plan is
/// marked degraded; if it is also over the absolute ceiling, both counts are
/// scaled down proportionally and then trimmed, down to zero bones if the
/// vertex weights alone would cross the ceiling. Tier maxima are never
/// exceeded and this function never fails.
pub fn plan(model: &SizeModel, vertex_count: usize, budget: &TierBudget) -> CountPlan {
    let max_bones = budget.max_bones.min(BONE_CATALOGUE.len());
    let max_morphs = budget.max_morph_targets.min(MORPH_CATALOGUE_LEN);
    let limit = budget.max_file_size_bytes;

    let mut bones = max_bones;
    let mut morphs = max_morphs;
    let mut estimate = model.estimate(vertex_count, bones, morphs);

    let morph_floor = MIN_MORPH_TARGETS.min(max_morphs);
    while estimate > limit && morphs > morph_floor {
        morphs -= 1;
        estimate = model.estimate(vertex_count, bones, morphs);
    }

    let bone_floor = MIN_VIABLE_BONES.min(max_bones);
    while estimate > limit && bones > bone_floor {
        bones -= 1;
        estimate = model.estimate(vertex_count, bones, morphs);
    }

    if estimate <= limit {
        log::debug!(
            "plan for tier {}: {bones} bones, {morphs} morphs, {estimate} of {limit} bytes",
            budget.plan_id
        );
        return CountPlan {
            bone_count: bones,
            morph_count: morphs,
            projected_size_bytes: estimate,
            quality_degraded: false,
        };
    }

    log::warn!(
        "tier {} cannot hold a minimal rig ({estimate} > {limit} bytes); degrading quality",
        budget.plan_id
    );

    if estimate > HARD_SIZE_CEILING_BYTES {
        (bones, morphs) = scale_to_ceiling(model, vertex_count, bones, morphs);
        estimate = model.estimate(vertex_count, bones, morphs);

        while estimate > HARD_SIZE_CEILING_BYTES && morphs > 0 {
            morphs -= 1;
            estimate = model.estimate(vertex_count, bones, morphs);
        }
        while estimate > HARD_SIZE_CEILING_BYTES && bones > 0 {
            bones -= 1;
            estimate = model.estimate(vertex_count, bones, morphs);
        }
        if estimate > HARD_SIZE_CEILING_BYTES {
            log::warn!(
                "input alone exceeds the {HARD_SIZE_CEILING_BYTES}-byte ceiling; embedding an empty rig"
            );
        }
    }

    CountPlan {
        bone_count: bones,
        morph_count: morphs,
        projected_size_bytes: estimate,
        quality_degraded: true,
    }
}

/// One proportional scale-down of both counts so the count-dependent part of
/// the estimate fits under the hard ceiling.
fn scale_to_ceiling(
    model: &SizeModel,
    vertex_count: usize,
    bones: usize,
    morphs: usize,
) -> (usize, usize) {
    let fixed = model.estimate(vertex_count, 0, 0);
    let variable = model.estimate(vertex_count, bones, morphs).saturating_sub(fixed);
    let available = HARD_SIZE_CEILING_BYTES.saturating_sub(fixed);
    if variable == 0 {
        return (bones, morphs);
    }

    let factor = (available as f64 / variable as f64).clamp(0.0, 1.0);
    let scaled_bones = ((bones as f64 * factor).floor() as usize).max(bones.min(1));
    let scaled_morphs = (morphs as f64 * factor).floor() as usize;
    (scaled_bones, scaled_morphs)
}
