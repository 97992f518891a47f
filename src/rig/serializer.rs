//! Binary layout of the embedded rig and its document extension.
//!
//! Three segments are appended to the BIN chunk in fixed order:
//!
//! - `boneMatrices`: one 256-byte record per bone
//!   (inverse bind matrix, local transform, position, rotation xyzw,
//!   parent index, bone type code, weight, 88-byte zero-padded name);
//! - `vertexWeights`: 4 × u32 joint indices + 4 × f32 weights per vertex,
//!   omitted when the rig has no bones;
//! - `morphDeltas`: x/y/z f32 per vertex, morph-major.
//!
//! All values are little-endian; matrices are column-major.

use nalgebra::{Isometry3, Matrix4, Translation3, Vector3};
use rayon::prelude::*;
use serde_json::{Value, json};

use crate::error::RigError;
use crate::glb::{self, BinarySegment, DocumentExtension, GlbContainer};

use super::sizing::{
    BONE_RECORD_BYTES, BONE_WEIGHT_ENTRIES, BONE_WEIGHT_ENTRY_BYTES, VERTEX_DELTA_BYTES,
    bone_matrix_bytes, morph_delta_bytes, vertex_weight_bytes,
};
use super::skeleton::parent_indices;
use super::types::{BoneDefinition, MorphTarget, RigPlan};

/// Version of the extension body layout.
pub const RIG_FORMAT_VERSION: u32 = 1;
/// Bytes reserved for the UTF-8 bone name at the end of each bone record.
pub const BONE_NAME_BYTES: usize = 88;
/// Bones influencing each vertex.
pub const INFLUENCES_PER_VERTEX: usize = 4;

pub const BONE_SEGMENT: &str = "boneMatrices";
pub const WEIGHT_SEGMENT: &str = "vertexWeights";
pub const MORPH_SEGMENT: &str = "morphDeltas";

/// Request-level facts recorded in the extension body.
#[derive(Debug, Clone, Copy)]
pub struct RigContext<'a> {
    pub plan_id: &'a str,
    pub vertex_count: usize,
    pub extension_name: &'a str,
}

// ─── Public API ───────────────────────────────────────────────────────────────

/// Serialize `container` with `plan` embedded as binary segments plus one
/// document extension.
///
/// `positions`, when known, drive nearest-bone skin weights; otherwise every
/// vertex is bound to the root bone.
pub fn write_rig(
    container: &GlbContainer,
    plan: &RigPlan,
    positions: Option<&[Vector3<f32>]>,
    context: RigContext<'_>,
) -> Result<Vec<u8>, RigError> {
    let parents = parent_indices(&plan.bones).map_err(|message| {
        RigError::invalid_mesh(format!("synthesized skeleton is not a tree: {message}"))
    })?;
    let bones = BoneSegment::new(&plan.bones, &parents);
    let weights = WeightSegment::new(&plan.bones, positions, context.vertex_count);
    let morphs = MorphSegment {
        morphs: &plan.morphs,
        vertex_count: context.vertex_count,
    };

    let extension = DocumentExtension {
        name: context.extension_name.to_string(),
        body: extension_body(plan, &parents, context),
    };

    let output = glb::serialize(container, &[&bones, &weights, &morphs], &extension)?;
    log::debug!(
        "serialized rig: {} bone(s), {} morph(s), {} bytes (projected {})",
        plan.bones.len(),
        plan.morphs.len(),
        output.len(),
        plan.projected_size_bytes
    );
    Ok(output)
}

// ─── Bone records ─────────────────────────────────────────────────────────────

struct BoneSegment<'a> {
    bones: &'a [BoneDefinition],
    parents: &'a [Option<usize>],
}

impl<'a> BoneSegment<'a> {
    fn new(bones: &'a [BoneDefinition], parents: &'a [Option<usize>]) -> Self {
        Self { bones, parents }
    }
}

fn world_transform(bone: &BoneDefinition) -> Isometry3<f32> {
    Isometry3::from_parts(Translation3::from(bone.position), bone.rotation)
}

fn write_matrix(out: &mut Vec<u8>, matrix: &Matrix4<f32>) {
    for value in matrix.as_slice() {
        out.extend_from_slice(&value.to_le_bytes());
    }
}

impl BinarySegment for BoneSegment<'_> {
    fn name(&self) -> &str {
        BONE_SEGMENT
    }

    fn byte_len(&self) -> usize {
        bone_matrix_bytes(self.bones.len()) as usize
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        for (bone, parent) in self.bones.iter().zip(self.parents) {
            let start = out.len();
            let world = world_transform(bone);
            let local = match parent {
                Some(index) => world_transform(&self.bones[*index]).inverse() * world,
                None => world,
            };

            write_matrix(out, &world.inverse().to_homogeneous());
            write_matrix(out, &local.to_homogeneous());
            for value in bone.position.iter() {
                out.extend_from_slice(&value.to_le_bytes());
            }
            for value in bone.rotation.coords.iter() {
                out.extend_from_slice(&value.to_le_bytes());
            }
            let parent_index = parent.map_or(-1, |index| index as i32);
            out.extend_from_slice(&parent_index.to_le_bytes());
            out.extend_from_slice(&bone.bone_type.code().to_le_bytes());
            out.extend_from_slice(&bone.weight.to_le_bytes());

            let name = truncate_utf8(&bone.name, BONE_NAME_BYTES);
            out.extend_from_slice(name.as_bytes());
            out.resize(start + BONE_RECORD_BYTES as usize, 0);
        }
    }
}

/// Longest prefix of `value` that fits in `max` bytes without splitting a
/// character.
fn truncate_utf8(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

// ─── Vertex weights ───────────────────────────────────────────────────────────

type Influence = ([u32; INFLUENCES_PER_VERTEX], [f32; INFLUENCES_PER_VERTEX]);

struct WeightSegment {
    influences: Vec<Influence>,
}

const ROOT_INFLUENCE: Influence = ([0; INFLUENCES_PER_VERTEX], [1.0, 0.0, 0.0, 0.0]);

impl WeightSegment {
    fn new(
        bones: &[BoneDefinition],
        positions: Option<&[Vector3<f32>]>,
        vertex_count: usize,
    ) -> Self {
        if bones.is_empty() {
            return Self {
                influences: Vec::new(),
            };
        }

        let influences = match positions {
            Some(positions) if positions.len() == vertex_count => positions
                .par_iter()
                .map(|position| nearest_influences(bones, position))
                .collect(),
            _ => vec![ROOT_INFLUENCE; vertex_count],
        };
        Self { influences }
    }
}

/// Up to four nearest bones by distance, weighted by inverse distance times
/// each bone's weight, normalized to sum to one.
fn nearest_influences(bones: &[BoneDefinition], position: &Vector3<f32>) -> Influence {
    let mut nearest: Vec<(usize, f32)> = bones
        .iter()
        .enumerate()
        .map(|(index, bone)| (index, (bone.position - position).norm()))
        .collect();
    nearest.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    nearest.truncate(INFLUENCES_PER_VERTEX);

    let mut joints = [0u32; INFLUENCES_PER_VERTEX];
    let mut weights = [0f32; INFLUENCES_PER_VERTEX];
    for (slot, (index, distance)) in nearest.iter().enumerate() {
        joints[slot] = *index as u32;
        weights[slot] = bones[*index].weight / (distance + 1e-4);
    }

    let total: f32 = weights.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return ROOT_INFLUENCE;
    }
    for weight in &mut weights {
        *weight /= total;
    }
    (joints, weights)
}

impl BinarySegment for WeightSegment {
    fn name(&self) -> &str {
        WEIGHT_SEGMENT
    }

    fn byte_len(&self) -> usize {
        self.influences.len() * (BONE_WEIGHT_ENTRIES * BONE_WEIGHT_ENTRY_BYTES) as usize
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        for (joints, weights) in &self.influences {
            for joint in joints {
                out.extend_from_slice(&joint.to_le_bytes());
            }
            for weight in weights {
                out.extend_from_slice(&weight.to_le_bytes());
            }
        }
    }
}

// ─── Morph deltas ─────────────────────────────────────────────────────────────

struct MorphSegment<'a> {
    morphs: &'a [MorphTarget],
    vertex_count: usize,
}

impl BinarySegment for MorphSegment<'_> {
    fn name(&self) -> &str {
        MORPH_SEGMENT
    }

    fn byte_len(&self) -> usize {
        morph_delta_bytes(self.vertex_count, self.morphs.len()) as usize
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        for morph in self.morphs {
            debug_assert_eq!(morph.vertex_deltas.len(), self.vertex_count);
            for delta in &morph.vertex_deltas {
                for value in delta.iter() {
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
        }
    }
}

// ─── Extension body ───────────────────────────────────────────────────────────

fn extension_body(plan: &RigPlan, parents: &[Option<usize>], context: RigContext<'_>) -> Value {
    let bones: Vec<Value> = plan
        .bones
        .iter()
        .zip(parents)
        .map(|(bone, parent)| {
            json!({
                "name": bone.name,
                "type": bone.bone_type.as_str(),
                "position": [bone.position.x, bone.position.y, bone.position.z],
                "rotation": [bone.rotation.i, bone.rotation.j, bone.rotation.k, bone.rotation.w],
                "parent": parent,
                "weight": bone.weight,
            })
        })
        .collect();

    let morph_targets: Vec<Value> = plan
        .morphs
        .iter()
        .map(|morph| {
            json!({
                "name": morph.name,
                "category": morph.category.as_str(),
                "intensity": morph.intensity,
                "weight": morph.weight,
            })
        })
        .collect();

    json!({
        "version": RIG_FORMAT_VERSION,
        "tier": context.plan_id,
        "qualityDegraded": plan.quality_degraded,
        "vertexCount": context.vertex_count,
        "layout": {
            "boneRecordBytes": BONE_RECORD_BYTES,
            "boneNameBytes": BONE_NAME_BYTES,
            "influencesPerVertex": INFLUENCES_PER_VERTEX,
            "vertexWeightBytes": vertex_weight_bytes(1, 1),
            "vertexDeltaBytes": VERTEX_DELTA_BYTES,
        },
        "bones": bones,
        "morphTargets": morph_targets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fixtures::mesh_glb,
        rig::{deadline::Deadline, mesh, morph, sizing::SizeModel, skeleton},
    };

    fn read_f32(bytes: &[u8], offset: usize) -> f32 {
        f32::from_le_bytes(bytes[offset..offset + 4].try_into().expect("4 bytes"))
    }

    fn read_u32(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().expect("4 bytes"))
    }

    struct Rigged {
        input_len: usize,
        output: Vec<u8>,
        plan: RigPlan,
        vertex_count: usize,
    }

    fn rig(vertex_count: usize, bone_count: usize, morph_count: usize) -> Rigged {
        let input = mesh_glb(vertex_count);
        let container = glb::parse(&input).expect("parse");
        let profile = mesh::profile(&container).expect("profile");
        let bones = skeleton::synthesize(&profile, bone_count);
        let morphs = morph::synthesize(&profile, morph_count, 9, Deadline::none()).expect("morphs");
        let projected =
            SizeModel::new(input.len() as u64).estimate(vertex_count, bones.len(), morphs.len());
        let plan = RigPlan {
            bones,
            morphs,
            projected_size_bytes: projected,
            quality_degraded: false,
        };
        let output = write_rig(
            &container,
            &plan,
            profile.positions.as_deref(),
            RigContext {
                plan_id: "free",
                vertex_count,
                extension_name: "GLBRIG_rig",
            },
        )
        .expect("serialize");
        Rigged {
            input_len: input.len(),
            output,
            plan,
            vertex_count,
        }
    }

    fn segment<'a>(rigged: &'a Rigged, name: &str) -> Option<&'a [u8]> {
        let container = glb::parse(&rigged.output).expect("reparse");
        let index = container.json["extensions"]["GLBRIG_rig"]["bufferViews"][name].as_u64()?;
        let view = &container.json["bufferViews"][index as usize];
        let offset = view["byteOffset"].as_u64().expect("offset") as usize;
        let length = view["byteLength"].as_u64().expect("length") as usize;
        // the BIN chunk is the last chunk of the output
        let start = rigged.output.len() - container.binary_payload.len() + offset;
        Some(&rigged.output[start..start + length])
    }

    #[test]
    fn given_rig_plan_when_serializing_then_output_fits_projection() {
        let rigged = rig(120, 20, 10);

        assert!(rigged.output.len() as u64 <= rigged.plan.projected_size_bytes);
        assert!(rigged.output.len() > rigged.input_len);
        assert_eq!(rigged.output.len() % 4, 0);
    }

    #[test]
    fn given_rig_plan_when_serializing_then_segment_lengths_match_layout() {
        let rigged = rig(64, 12, 6);

        let bones = segment(&rigged, BONE_SEGMENT).expect("bones");
        assert_eq!(bones.len(), 12 * BONE_RECORD_BYTES as usize);
        let weights = segment(&rigged, WEIGHT_SEGMENT).expect("weights");
        assert_eq!(weights.len(), rigged.vertex_count * 32);
        let deltas = segment(&rigged, MORPH_SEGMENT).expect("deltas");
        assert_eq!(deltas.len(), 6 * rigged.vertex_count * 12);
    }

    #[test]
    fn given_bone_records_when_decoding_then_fields_are_at_fixed_offsets() {
        let rigged = rig(32, 6, 1);
        let bones = segment(&rigged, BONE_SEGMENT).expect("bones");

        let record = |index: usize| &bones[index * 256..(index + 1) * 256];
        let root = record(0);
        assert_eq!(read_u32(root, 156), u32::MAX, "root parent is -1");
        let spine = record(1);
        assert_eq!(read_u32(spine, 156), 0);
        assert_eq!(read_u32(spine, 160), rigged.plan.bones[1].bone_type.code());
        assert_eq!(read_f32(spine, 164), 1.0);
        assert_eq!(&spine[168..173], b"spine");
        assert!(spine[173..].iter().all(|byte| *byte == 0));

        let position = rigged.plan.bones[1].position;
        assert_eq!(read_f32(spine, 128), position.x);
        assert_eq!(read_f32(spine, 132), position.y);
        // inverse bind translation cancels the bone position
        assert!((read_f32(spine, 52) + position.y).abs() < 1e-5);
        // rotation w
        assert_eq!(read_f32(spine, 152), 1.0);
    }

    #[test]
    fn given_weights_when_decoding_then_each_vertex_sums_to_one() {
        let rigged = rig(48, 20, 1);
        let weights = segment(&rigged, WEIGHT_SEGMENT).expect("weights");

        for vertex in weights.chunks_exact(32) {
            let sum: f32 = (0..4).map(|slot| read_f32(vertex, 16 + slot * 4)).sum();
            assert!((sum - 1.0).abs() < 1e-4);
            assert!((0..4).all(|slot| read_u32(vertex, slot * 4) < 20));
        }
    }

    #[test]
    fn given_zero_bones_when_serializing_then_weight_segment_is_omitted() {
        let rigged = rig(16, 0, 3);

        assert!(segment(&rigged, BONE_SEGMENT).is_none());
        assert!(segment(&rigged, WEIGHT_SEGMENT).is_none());
        assert!(segment(&rigged, MORPH_SEGMENT).is_some());
        assert!(rigged.output.len() as u64 <= rigged.plan.projected_size_bytes);
    }

    #[test]
    fn given_rig_plan_when_serializing_then_extension_describes_rig() {
        let rigged = rig(40, 9, 5);
        let container = glb::parse(&rigged.output).expect("reparse");
        let body = &container.json["extensions"]["GLBRIG_rig"];

        assert_eq!(body["version"], 1);
        assert_eq!(body["tier"], "free");
        assert_eq!(body["vertexCount"], 40);
        assert_eq!(body["bones"].as_array().map(Vec::len), Some(9));
        assert_eq!(body["bones"][0]["parent"], Value::Null);
        assert_eq!(body["bones"][1]["parent"], 0);
        assert_eq!(body["morphTargets"][0]["name"], "smile");
        assert_eq!(body["morphTargets"][0]["category"], "essential");
        assert!(
            container.json["extensionsUsed"]
                .as_array()
                .expect("extensionsUsed")
                .contains(&json!("GLBRIG_rig"))
        );
    }

    #[test]
    fn given_long_multibyte_name_when_truncating_then_char_boundary_is_kept() {
        let name = "é".repeat(50);

        let truncated = truncate_utf8(&name, BONE_NAME_BYTES);
        assert_eq!(truncated.len(), BONE_NAME_BYTES);
        assert_eq!(truncate_utf8(&"é".repeat(45), 89).len(), 88);
    }
}
