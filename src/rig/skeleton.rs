use std::collections::HashSet;

use nalgebra::{UnitQuaternion, Vector3};

use super::mesh::MeshProfile;
use super::types::{BONE_CATALOGUE, BoneDefinition};

// ─── Public API ───────────────────────────────────────────────────────────────

/// Build the first `max_bones` catalogue bones, placed inside the mesh bounds.
///
/// The catalogue is ordered core → arms → legs → face → fingers and every
/// entry's parent precedes it, so the result is always a single rooted tree.
/// Without bounds the skeleton is laid out at unit height on the origin.
pub fn synthesize(profile: &MeshProfile, max_bones: usize) -> Vec<BoneDefinition> {
    let (origin, height) = match profile.bounds.as_ref() {
        Some(bounds) => {
            let center = bounds.center();
            (Vector3::new(center.x, bounds.min.y, center.z), bounds.height())
        }
        None => (Vector3::zeros(), 1.0),
    };

    let bones: Vec<BoneDefinition> = BONE_CATALOGUE
        .iter()
        .take(max_bones)
        .map(|spec| BoneDefinition {
            name: spec.name.to_string(),
            bone_type: spec.bone_type,
            position: origin + Vector3::from(spec.position) * height,
            rotation: UnitQuaternion::identity(),
            parent: spec.parent.map(str::to_string),
            weight: spec.weight,
        })
        .collect();

    log::debug!(
        "synthesized {} bone(s) at height {height:.3} (limit {max_bones})",
        bones.len()
    );
    bones
}

/// Index of each bone's parent within `bones`, `None` for the root.
///
/// Fails when a parent is missing or defined after its child.
pub fn parent_indices(bones: &[BoneDefinition]) -> Result<Vec<Option<usize>>, String> {
    let mut indices = Vec::with_capacity(bones.len());
    for (index, bone) in bones.iter().enumerate() {
        let parent = match bone.parent.as_deref() {
            None => None,
            Some(parent_name) => {
                let parent_index = bones[..index]
                    .iter()
                    .position(|candidate| candidate.name == parent_name)
                    .ok_or_else(|| {
                        format!("bone '{}' references undefined parent '{parent_name}'", bone.name)
                    })?;
                Some(parent_index)
            }
        };
        indices.push(parent);
    }
    Ok(indices)
}

/// Check that `bones` form a single rooted tree with unique names.
pub fn check_hierarchy(bones: &[BoneDefinition]) -> Result<(), String> {
    if bones.is_empty() {
        return Ok(());
    }

    let mut names = HashSet::new();
    if let Some(duplicate) = bones.iter().find(|bone| !names.insert(bone.name.as_str())) {
        return Err(format!("duplicate bone name '{}'", duplicate.name));
    }

    let parents = parent_indices(bones)?;
    let roots = parents.iter().filter(|parent| parent.is_none()).count();
    if roots != 1 {
        return Err(format!("expected exactly one root bone, found {roots}"));
    }
    Ok(())
}
