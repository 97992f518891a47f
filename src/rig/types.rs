use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use super::deadline::Deadline;

/// Default key of the document extension carrying the rig.
pub const DEFAULT_EXTENSION_NAME: &str = "GLBRIG_rig";

/// Default seed for morph delta generation.
pub const DEFAULT_SEED: u64 = 0x5EED_F00D_CAFE_0001;

// ─── Bone catalogue ───────────────────────────────────────────────────────────

/// Anatomical tier of a bone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoneType {
    Root,
    Spine,
    Neck,
    Head,
    Shoulder,
    Arm,
    Hand,
    Hip,
    Leg,
    Foot,
    Face,
}

impl BoneType {
    pub fn as_str(self) -> &'static str {
        match self {
            BoneType::Root => "root",
            BoneType::Spine => "spine",
            BoneType::Neck => "neck",
            BoneType::Head => "head",
            BoneType::Shoulder => "shoulder",
            BoneType::Arm => "arm",
            BoneType::Hand => "hand",
            BoneType::Hip => "hip",
            BoneType::Leg => "leg",
            BoneType::Foot => "foot",
            BoneType::Face => "face",
        }
    }

    /// Stable numeric code written into bone records.
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// One catalogue entry. Positions are normalized to a 1.0-high T-posed
/// figure standing on the origin, +X to the figure's left, +Z forward.
#[derive(Debug, Clone, Copy)]
pub(super) struct BoneSpec {
    pub(super) name: &'static str,
    pub(super) bone_type: BoneType,
    pub(super) parent: Option<&'static str>,
    pub(super) position: [f32; 3],
    pub(super) weight: f32,
}

const fn bone(
    name: &'static str,
    bone_type: BoneType,
    parent: &'static str,
    position: [f32; 3],
    weight: f32,
) -> BoneSpec {
    BoneSpec {
        name,
        bone_type,
        parent: Some(parent),
        position,
        weight,
    }
}

/// Size of the core skeleton (root through head).
pub const CORE_SKELETON_LEN: usize = 6;

/// Priority-ordered bone catalogue. Every entry's parent appears earlier, so
/// any prefix is a rooted tree.
pub(super) const BONE_CATALOGUE: [BoneSpec; 82] = [
    // ─ core: spine / neck / head ─
    BoneSpec {
        name: "root",
        bone_type: BoneType::Root,
        parent: None,
        position: [0.0, 0.0, 0.0],
        weight: 1.0,
    },
    bone("spine", BoneType::Spine, "root", [0.0, 0.56, 0.0], 1.0),
    bone("chest", BoneType::Spine, "spine", [0.0, 0.66, 0.01], 1.0),
    bone("upperChest", BoneType::Spine, "chest", [0.0, 0.74, 0.01], 1.0),
    bone("neck", BoneType::Neck, "upperChest", [0.0, 0.84, 0.0], 1.0),
    bone("head", BoneType::Head, "neck", [0.0, 0.9, 0.01], 1.0),
    // ─ shoulders / arms / hands ─
    bone("leftShoulder", BoneType::Shoulder, "upperChest", [0.04, 0.8, 0.0], 1.0),
    bone("rightShoulder", BoneType::Shoulder, "upperChest", [-0.04, 0.8, 0.0], 1.0),
    bone("leftUpperArm", BoneType::Arm, "leftShoulder", [0.1, 0.8, 0.0], 1.0),
    bone("rightUpperArm", BoneType::Arm, "rightShoulder", [-0.1, 0.8, 0.0], 1.0),
    bone("leftLowerArm", BoneType::Arm, "leftUpperArm", [0.26, 0.8, 0.0], 1.0),
    bone("rightLowerArm", BoneType::Arm, "rightUpperArm", [-0.26, 0.8, 0.0], 1.0),
    bone("leftHand", BoneType::Hand, "leftLowerArm", [0.4, 0.8, 0.0], 1.0),
    bone("rightHand", BoneType::Hand, "rightLowerArm", [-0.4, 0.8, 0.0], 1.0),
    // ─ hips / legs / feet ─
    bone("hips", BoneType::Hip, "root", [0.0, 0.52, 0.0], 1.0),
    bone("leftUpperLeg", BoneType::Leg, "hips", [0.05, 0.5, 0.0], 1.0),
    bone("rightUpperLeg", BoneType::Leg, "hips", [-0.05, 0.5, 0.0], 1.0),
    bone("leftLowerLeg", BoneType::Leg, "leftUpperLeg", [0.055, 0.28, 0.0], 1.0),
    bone("rightLowerLeg", BoneType::Leg, "rightUpperLeg", [-0.055, 0.28, 0.0], 1.0),
    bone("leftFoot", BoneType::Foot, "leftLowerLeg", [0.06, 0.04, 0.0], 1.0),
    bone("rightFoot", BoneType::Foot, "rightLowerLeg", [-0.06, 0.04, 0.0], 1.0),
    bone("leftToes", BoneType::Foot, "leftFoot", [0.06, 0.0, 0.07], 0.5),
    bone("rightToes", BoneType::Foot, "rightFoot", [-0.06, 0.0, 0.07], 0.5),
    // ─ facial ─
    bone("jaw", BoneType::Face, "head", [0.0, 0.905, 0.02], 0.5),
    bone("leftEye", BoneType::Face, "head", [0.018, 0.94, 0.04], 0.5),
    bone("rightEye", BoneType::Face, "head", [-0.018, 0.94, 0.04], 0.5),
    bone("leftEyelidUpper", BoneType::Face, "head", [0.018, 0.948, 0.045], 0.5),
    bone("rightEyelidUpper", BoneType::Face, "head", [-0.018, 0.948, 0.045], 0.5),
    bone("leftEyelidLower", BoneType::Face, "head", [0.018, 0.932, 0.045], 0.5),
    bone("rightEyelidLower", BoneType::Face, "head", [-0.018, 0.932, 0.045], 0.5),
    bone("leftBrowInner", BoneType::Face, "head", [0.01, 0.955, 0.05], 0.5),
    bone("rightBrowInner", BoneType::Face, "head", [-0.01, 0.955, 0.05], 0.5),
    bone("leftBrowOuter", BoneType::Face, "head", [0.03, 0.955, 0.045], 0.5),
    bone("rightBrowOuter", BoneType::Face, "head", [-0.03, 0.955, 0.045], 0.5),
    bone("leftCheek", BoneType::Face, "head", [0.03, 0.925, 0.045], 0.5),
    bone("rightCheek", BoneType::Face, "head", [-0.03, 0.925, 0.045], 0.5),
    bone("noseTip", BoneType::Face, "head", [0.0, 0.93, 0.06], 0.5),
    bone("leftLipCorner", BoneType::Face, "jaw", [0.015, 0.912, 0.05], 0.5),
    bone("rightLipCorner", BoneType::Face, "jaw", [-0.015, 0.912, 0.05], 0.5),
    bone("upperLip", BoneType::Face, "head", [0.0, 0.916, 0.055], 0.5),
    bone("lowerLip", BoneType::Face, "jaw", [0.0, 0.908, 0.055], 0.5),
    bone("chin", BoneType::Face, "jaw", [0.0, 0.895, 0.05], 0.5),
    bone("tongueBase", BoneType::Face, "jaw", [0.0, 0.91, 0.03], 0.5),
    bone("tongueTip", BoneType::Face, "tongueBase", [0.0, 0.912, 0.045], 0.5),
    // ─ fingers ─
    bone("leftThumbProximal", BoneType::Hand, "leftHand", [0.42, 0.79, 0.02], 0.25),
    bone("leftThumbIntermediate", BoneType::Hand, "leftThumbProximal", [0.44, 0.785, 0.03], 0.25),
    bone("leftThumbDistal", BoneType::Hand, "leftThumbIntermediate", [0.455, 0.78, 0.035], 0.25),
    bone("rightThumbProximal", BoneType::Hand, "rightHand", [-0.42, 0.79, 0.02], 0.25),
    bone("rightThumbIntermediate", BoneType::Hand, "rightThumbProximal", [-0.44, 0.785, 0.03], 0.25),
    bone("rightThumbDistal", BoneType::Hand, "rightThumbIntermediate", [-0.455, 0.78, 0.035], 0.25),
    bone("leftIndexMetacarpal", BoneType::Hand, "leftHand", [0.43, 0.8, 0.015], 0.25),
    bone("leftIndexProximal", BoneType::Hand, "leftIndexMetacarpal", [0.46, 0.8, 0.015], 0.25),
    bone("leftIndexIntermediate", BoneType::Hand, "leftIndexProximal", [0.485, 0.8, 0.015], 0.25),
    bone("leftIndexDistal", BoneType::Hand, "leftIndexIntermediate", [0.5, 0.8, 0.015], 0.25),
    bone("rightIndexMetacarpal", BoneType::Hand, "rightHand", [-0.43, 0.8, 0.015], 0.25),
    bone("rightIndexProximal", BoneType::Hand, "rightIndexMetacarpal", [-0.46, 0.8, 0.015], 0.25),
    bone("rightIndexIntermediate", BoneType::Hand, "rightIndexProximal", [-0.485, 0.8, 0.015], 0.25),
    bone("rightIndexDistal", BoneType::Hand, "rightIndexIntermediate", [-0.5, 0.8, 0.015], 0.25),
    bone("leftMiddleMetacarpal", BoneType::Hand, "leftHand", [0.43, 0.8, 0.005], 0.25),
    bone("leftMiddleProximal", BoneType::Hand, "leftMiddleMetacarpal", [0.462, 0.8, 0.005], 0.25),
    bone("leftMiddleIntermediate", BoneType::Hand, "leftMiddleProximal", [0.49, 0.8, 0.005], 0.25),
    bone("leftMiddleDistal", BoneType::Hand, "leftMiddleIntermediate", [0.507, 0.8, 0.005], 0.25),
    bone("rightMiddleMetacarpal", BoneType::Hand, "rightHand", [-0.43, 0.8, 0.005], 0.25),
    bone("rightMiddleProximal", BoneType::Hand, "rightMiddleMetacarpal", [-0.462, 0.8, 0.005], 0.25),
    bone("rightMiddleIntermediate", BoneType::Hand, "rightMiddleProximal", [-0.49, 0.8, 0.005], 0.25),
    bone("rightMiddleDistal", BoneType::Hand, "rightMiddleIntermediate", [-0.507, 0.8, 0.005], 0.25),
    bone("leftRingMetacarpal", BoneType::Hand, "leftHand", [0.43, 0.8, -0.005], 0.25),
    bone("leftRingProximal", BoneType::Hand, "leftRingMetacarpal", [0.46, 0.8, -0.005], 0.25),
    bone("leftRingIntermediate", BoneType::Hand, "leftRingProximal", [0.485, 0.8, -0.005], 0.25),
    bone("leftRingDistal", BoneType::Hand, "leftRingIntermediate", [0.5, 0.8, -0.005], 0.25),
    bone("rightRingMetacarpal", BoneType::Hand, "rightHand", [-0.43, 0.8, -0.005], 0.25),
    bone("rightRingProximal", BoneType::Hand, "rightRingMetacarpal", [-0.46, 0.8, -0.005], 0.25),
    bone("rightRingIntermediate", BoneType::Hand, "rightRingProximal", [-0.485, 0.8, -0.005], 0.25),
    bone("rightRingDistal", BoneType::Hand, "rightRingIntermediate", [-0.5, 0.8, -0.005], 0.25),
    bone("leftLittleMetacarpal", BoneType::Hand, "leftHand", [0.428, 0.8, -0.015], 0.25),
    bone("leftLittleProximal", BoneType::Hand, "leftLittleMetacarpal", [0.452, 0.8, -0.015], 0.25),
    bone("leftLittleIntermediate", BoneType::Hand, "leftLittleProximal", [0.47, 0.8, -0.015], 0.25),
    bone("leftLittleDistal", BoneType::Hand, "leftLittleIntermediate", [0.483, 0.8, -0.015], 0.25),
    bone("rightLittleMetacarpal", BoneType::Hand, "rightHand", [-0.428, 0.8, -0.015], 0.25),
    bone("rightLittleProximal", BoneType::Hand, "rightLittleMetacarpal", [-0.452, 0.8, -0.015], 0.25),
    bone("rightLittleIntermediate", BoneType::Hand, "rightLittleProximal", [-0.47, 0.8, -0.015], 0.25),
    bone("rightLittleDistal", BoneType::Hand, "rightLittleIntermediate", [-0.483, 0.8, -0.015], 0.25),
];

// ─── Morph catalogue ──────────────────────────────────────────────────────────

/// Group a morph target belongs to; decides its intensity and mesh region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MorphCategory {
    Essential,
    Facial,
    Gesture,
    Micro,
}

impl MorphCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            MorphCategory::Essential => "essential",
            MorphCategory::Facial => "facial",
            MorphCategory::Gesture => "gesture",
            MorphCategory::Micro => "micro",
        }
    }

    /// Maximum delta per axis, as a fraction of mesh height.
    pub fn intensity(self) -> f32 {
        match self {
            MorphCategory::Essential => 0.02,
            MorphCategory::Facial => 0.015,
            MorphCategory::Gesture => 0.05,
            MorphCategory::Micro => 0.004,
        }
    }
}

pub(super) const ESSENTIAL_MORPHS: [&str; 4] = ["smile", "frown", "blink", "mouthOpen"];

pub(super) const FACIAL_MORPHS: [&str; 43] = [
    "browDownLeft",
    "browDownRight",
    "browInnerUp",
    "browOuterUpLeft",
    "browOuterUpRight",
    "cheekPuff",
    "cheekSquintLeft",
    "cheekSquintRight",
    "eyeBlinkLeft",
    "eyeBlinkRight",
    "eyeSquintLeft",
    "eyeSquintRight",
    "eyeWideLeft",
    "eyeWideRight",
    "eyeLookUpLeft",
    "eyeLookUpRight",
    "eyeLookDownLeft",
    "eyeLookDownRight",
    "eyeLookInLeft",
    "eyeLookInRight",
    "eyeLookOutLeft",
    "eyeLookOutRight",
    "jawForward",
    "jawLeft",
    "jawRight",
    "mouthClose",
    "mouthFunnel",
    "mouthPucker",
    "mouthLeft",
    "mouthRight",
    "mouthSmileLeft",
    "mouthSmileRight",
    "mouthFrownLeft",
    "mouthFrownRight",
    "mouthDimpleLeft",
    "mouthDimpleRight",
    "mouthStretchLeft",
    "mouthStretchRight",
    "mouthRollLower",
    "mouthRollUpper",
    "noseSneerLeft",
    "noseSneerRight",
    "tongueOut",
];

pub(super) const GESTURE_MORPHS: [&str; 10] = [
    "fistLeft",
    "fistRight",
    "openPalmLeft",
    "openPalmRight",
    "pointLeft",
    "pointRight",
    "thumbsUpLeft",
    "thumbsUpRight",
    "peaceLeft",
    "peaceRight",
];

/// Total catalogue size; entries past the fixed tables are micro-expression
/// filler.
pub const MORPH_CATALOGUE_LEN: usize = 256;

// ─── Rig data ─────────────────────────────────────────────────────────────────

/// A synthesized bone.
#[derive(Debug, Clone, PartialEq)]
pub struct BoneDefinition {
    pub name: String,
    pub bone_type: BoneType,
    /// Model-space position.
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub parent: Option<String>,
    pub weight: f32,
}

/// A synthesized morph target with one delta per mesh vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct MorphTarget {
    pub name: String,
    pub category: MorphCategory,
    pub intensity: f32,
    pub vertex_deltas: Vec<Vector3<f32>>,
    /// Default blend weight.
    pub weight: f32,
}

/// Bone and morph counts chosen by the budget optimizer, fixed before any
/// buffer is generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountPlan {
    pub bone_count: usize,
    pub morph_count: usize,
    pub projected_size_bytes: u64,
    pub quality_degraded: bool,
}

/// Everything the serializer needs for one request.
#[derive(Debug, Clone)]
pub struct RigPlan {
    pub bones: Vec<BoneDefinition>,
    pub morphs: Vec<MorphTarget>,
    pub projected_size_bytes: u64,
    pub quality_degraded: bool,
}

/// Per-request options.
#[derive(Debug, Clone)]
pub struct RigOptions {
    /// Seed for morph delta generation.
    pub seed: u64,
    pub deadline: Deadline,
    /// Key of the document extension that receives the rig.
    pub extension_name: String,
}

impl Default for RigOptions {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            deadline: Deadline::none(),
            extension_name: DEFAULT_EXTENSION_NAME.to_string(),
        }
    }
}

/// Summary of one completed request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RigReport {
    pub plan_id: String,
    pub vertex_count: usize,
    pub bone_count: usize,
    pub morph_count: usize,
    pub bone_names: Vec<String>,
    pub morph_names: Vec<String>,
    pub projected_size_bytes: u64,
    pub output_size_bytes: u64,
    pub max_file_size_bytes: u64,
    pub quality_degraded: bool,
    pub advisory_applied: bool,
}

/// Output GLB plus its report.
#[derive(Debug, Clone)]
pub struct RigOutput {
    pub glb: Vec<u8>,
    pub report: RigReport,
}
