use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use rayon::prelude::*;

use crate::error::RigError;

use super::deadline::Deadline;
use super::mesh::MeshProfile;
use super::types::{
    ESSENTIAL_MORPHS, FACIAL_MORPHS, GESTURE_MORPHS, MORPH_CATALOGUE_LEN, MorphCategory,
    MorphTarget,
};

/// Normalized height above which a vertex belongs to the head.
const HEAD_REGION_START: f32 = 0.85;
/// Normalized lateral distance beyond which a vertex belongs to a hand.
const HAND_REGION_START: f32 = 0.3;
/// Width of the linear falloff at a region border.
const REGION_FALLOFF: f32 = 0.05;

const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Catalogue entry `index`: name and category.
///
/// Entries past the fixed tables are procedurally named micro-expressions.
pub fn catalogue_entry(index: usize) -> (String, MorphCategory) {
    let facial_start = ESSENTIAL_MORPHS.len();
    let gesture_start = facial_start + FACIAL_MORPHS.len();
    let micro_start = gesture_start + GESTURE_MORPHS.len();

    if index < facial_start {
        (ESSENTIAL_MORPHS[index].to_string(), MorphCategory::Essential)
    } else if index < gesture_start {
        (FACIAL_MORPHS[index - facial_start].to_string(), MorphCategory::Facial)
    } else if index < micro_start {
        (GESTURE_MORPHS[index - gesture_start].to_string(), MorphCategory::Gesture)
    } else {
        (
            format!("microExpression{:03}", index - micro_start + 1),
            MorphCategory::Micro,
        )
    }
}

/// Generate the first `max_morphs` catalogue morph targets for `profile`.
///
/// Each target carries exactly one delta per vertex. Every delta component
/// stays within `intensity * mesh height`; facial and micro targets fade out
/// below the head and gestures fade out toward the body's centre line when
/// vertex positions are known. Targets are generated in parallel, each with
/// its own generator derived from `seed` and its catalogue index, so the
/// output is identical for every run with the same inputs.
pub fn synthesize(
    profile: &MeshProfile,
    max_morphs: usize,
    seed: u64,
    deadline: Deadline,
) -> Result<Vec<MorphTarget>, RigError> {
    if profile.vertex_count == 0 {
        return Err(RigError::invalid_mesh(
            "cannot generate morph targets for a mesh with zero vertices",
        ));
    }

    let count = max_morphs.min(MORPH_CATALOGUE_LEN);
    let regions = RegionFrame::from_profile(profile);

    let morphs = (0..count)
        .into_par_iter()
        .map(|index| {
            deadline.check("morph generation")?;
            let (name, category) = catalogue_entry(index);
            Ok(generate_target(profile, &regions, name, category, target_seed(seed, index)))
        })
        .collect::<Result<Vec<_>, RigError>>()?;

    log::debug!(
        "generated {} morph target(s) over {} vertices",
        morphs.len(),
        profile.vertex_count
    );
    Ok(morphs)
}

fn target_seed(seed: u64, index: usize) -> u64 {
    seed ^ (index as u64 + 1).wrapping_mul(SEED_STRIDE)
}

fn generate_target(
    profile: &MeshProfile,
    regions: &RegionFrame,
    name: String,
    category: MorphCategory,
    seed: u64,
) -> MorphTarget {
    let intensity = category.intensity();
    let amplitude = intensity * regions.height;
    let mut rng = Pcg64Mcg::seed_from_u64(seed);

    let vertex_deltas = (0..profile.vertex_count)
        .map(|vertex| {
            let region = profile
                .positions
                .as_ref()
                .and_then(|positions| positions.get(vertex))
                .map_or(1.0, |position| regions.weight(category, position));
            let scale = amplitude * region;
            Vector3::new(
                rng.random_range(-1.0f32..=1.0) * scale,
                rng.random_range(-1.0f32..=1.0) * scale,
                rng.random_range(-1.0f32..=1.0) * scale,
            )
        })
        .collect();

    MorphTarget {
        name,
        category,
        intensity,
        vertex_deltas,
        weight: 0.0,
    }
}

/// Mesh frame used to place vertices into head/hand regions.
struct RegionFrame {
    min_y: f32,
    center_x: f32,
    height: f32,
}

impl RegionFrame {
    fn from_profile(profile: &MeshProfile) -> Self {
        match profile.bounds.as_ref() {
            Some(bounds) => Self {
                min_y: bounds.min.y,
                center_x: bounds.center().x,
                height: bounds.height(),
            },
            None => Self {
                min_y: 0.0,
                center_x: 0.0,
                height: 1.0,
            },
        }
    }

    /// Region weight in `[0, 1]` of a vertex for one category.
    fn weight(&self, category: MorphCategory, position: &Vector3<f32>) -> f32 {
        let ramp = |value: f32, start: f32| ((value - start) / REGION_FALLOFF).clamp(0.0, 1.0);
        match category {
            MorphCategory::Essential | MorphCategory::Facial | MorphCategory::Micro => {
                ramp((position.y - self.min_y) / self.height, HEAD_REGION_START)
            }
            MorphCategory::Gesture => ramp(
                (position.x - self.center_x).abs() / self.height,
                HAND_REGION_START,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::{fixtures::mesh_glb, glb, rig::mesh};

    fn humanoid_profile(vertex_count: usize) -> MeshProfile {
        let container = glb::parse(&mesh_glb(vertex_count)).expect("parse");
        mesh::profile(&container).expect("profile")
    }

    #[test]
    fn given_catalogue_indices_when_naming_then_tables_come_before_filler() {
        assert_eq!(catalogue_entry(0), ("smile".to_string(), MorphCategory::Essential));
        assert_eq!(catalogue_entry(3).0, "mouthOpen");
        assert_eq!(catalogue_entry(4).1, MorphCategory::Facial);
        assert_eq!(catalogue_entry(47), ("fistLeft".to_string(), MorphCategory::Gesture));
        assert_eq!(
            catalogue_entry(57),
            ("microExpression001".to_string(), MorphCategory::Micro)
        );
        assert_eq!(catalogue_entry(MORPH_CATALOGUE_LEN - 1).0, "microExpression199");
    }

    #[test]
    fn given_profile_when_synthesizing_then_every_target_covers_every_vertex() {
        let profile = humanoid_profile(200);

        let morphs = synthesize(&profile, 60, 7, Deadline::none()).expect("morphs");
        assert_eq!(morphs.len(), 60);
        assert!(morphs.iter().all(|morph| morph.vertex_deltas.len() == 200));
        assert_eq!(morphs[0].name, "smile");
    }

    #[test]
    fn given_limit_above_catalogue_when_synthesizing_then_catalogue_bounds_output() {
        let profile = humanoid_profile(8);

        let morphs = synthesize(&profile, 1_000, 7, Deadline::none()).expect("morphs");
        assert_eq!(morphs.len(), MORPH_CATALOGUE_LEN);
    }

    #[test]
    fn given_generated_deltas_when_inspecting_then_components_stay_within_intensity() {
        let profile = humanoid_profile(300);
        let height = profile.height();

        let morphs = synthesize(&profile, 80, 11, Deadline::none()).expect("morphs");
        for morph in &morphs {
            let bound = morph.intensity * height + 1e-6;
            assert!(
                morph
                    .vertex_deltas
                    .iter()
                    .all(|delta| delta.iter().all(|component| component.abs() <= bound)),
                "{} exceeds its bound",
                morph.name
            );
        }
    }

    #[test]
    fn given_same_seed_when_synthesizing_twice_then_deltas_are_identical() {
        let profile = humanoid_profile(150);

        let first = synthesize(&profile, 30, 42, Deadline::none()).expect("first");
        let second = synthesize(&profile, 30, 42, Deadline::none()).expect("second");
        assert_eq!(first, second);

        let other = synthesize(&profile, 30, 43, Deadline::none()).expect("other seed");
        assert_ne!(first[0].vertex_deltas, other[0].vertex_deltas);
    }

    #[test]
    fn given_categories_when_comparing_intensity_then_facial_is_subtler_than_gesture() {
        assert!(MorphCategory::Facial.intensity() < MorphCategory::Gesture.intensity());
        assert!(MorphCategory::Micro.intensity() < MorphCategory::Facial.intensity());
    }

    #[test]
    fn given_known_positions_when_synthesizing_then_facial_morphs_leave_feet_still() {
        let profile = humanoid_profile(400);
        let positions = profile.positions.clone().expect("positions");
        let bounds = profile.bounds.expect("bounds");

        let morphs = synthesize(&profile, 5, 3, Deadline::none()).expect("morphs");
        let facial = &morphs[4];
        assert_eq!(facial.category, MorphCategory::Facial);
        for (position, delta) in positions.iter().zip(&facial.vertex_deltas) {
            if position.y - bounds.min.y < 0.5 * bounds.height() {
                assert_eq!(*delta, Vector3::zeros());
            }
        }
    }

    #[test]
    fn given_zero_vertices_when_synthesizing_then_invalid_mesh_error_is_returned() {
        let profile = MeshProfile {
            vertex_count: 0,
            mesh_count: 1,
            bounds: None,
            positions: None,
        };

        assert!(matches!(
            synthesize(&profile, 10, 1, Deadline::none()),
            Err(RigError::InvalidMesh(_))
        ));
    }

    #[test]
    fn given_expired_deadline_when_synthesizing_then_generation_is_abandoned() {
        let profile = humanoid_profile(50);

        assert_eq!(
            synthesize(&profile, 10, 1, Deadline::at(Instant::now())),
            Err(RigError::DeadlineExceeded {
                stage: "morph generation"
            })
        );
    }
}
