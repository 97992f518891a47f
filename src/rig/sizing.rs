//! Closed-form output size model.
//!
//! The byte helpers here are also what the rig serializer uses for its
//! segment lengths, so the model and the written layout cannot drift.

/// One bone record: inverse bind matrix, local transform and metadata.
pub const BONE_RECORD_BYTES: u64 = 256;
/// Joint/weight entries per vertex (4 joint indices + 4 weights).
pub const BONE_WEIGHT_ENTRIES: u64 = 8;
pub const BONE_WEIGHT_ENTRY_BYTES: u64 = 4;
/// One (x, y, z) float32 delta.
pub const VERTEX_DELTA_BYTES: u64 = 12;

/// Fixed allowance for container growth: new chunk header, bufferViews,
/// the extension envelope and padding.
pub const STRUCTURAL_OVERHEAD_BYTES: u64 = 4096;
/// Upper bound of one bone entry in the extension JSON.
pub const BONE_JSON_ALLOWANCE_BYTES: u64 = 256;
/// Upper bound of one morph entry in the extension JSON.
pub const MORPH_JSON_ALLOWANCE_BYTES: u64 = 128;

/// Absolute output ceiling a degraded plan must still respect.
pub const HARD_SIZE_CEILING_BYTES: u64 = 100 * 1024 * 1024;

pub fn bone_matrix_bytes(bone_count: usize) -> u64 {
    bone_count as u64 * BONE_RECORD_BYTES
}

/// Vertex weights are only written when there is at least one bone to bind.
pub fn vertex_weight_bytes(vertex_count: usize, bone_count: usize) -> u64 {
    if bone_count == 0 {
        return 0;
    }
    (vertex_count as u64)
        .saturating_mul(BONE_WEIGHT_ENTRIES)
        .saturating_mul(BONE_WEIGHT_ENTRY_BYTES)
}

pub fn morph_delta_bytes(vertex_count: usize, morph_count: usize) -> u64 {
    (morph_count as u64)
        .saturating_mul(vertex_count as u64)
        .saturating_mul(VERTEX_DELTA_BYTES)
}

pub fn structural_overhead(bone_count: usize, morph_count: usize) -> u64 {
    STRUCTURAL_OVERHEAD_BYTES
        + bone_count as u64 * BONE_JSON_ALLOWANCE_BYTES
        + morph_count as u64 * MORPH_JSON_ALLOWANCE_BYTES
}

/// Predicts output size from counts alone, before any buffer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeModel {
    original_size: u64,
}

impl SizeModel {
    /// `original_size` is the byte length of the input container as it
    /// would be written back, see [`crate::glb::encoded_len`].
    pub fn new(original_size: u64) -> Self {
        Self { original_size }
    }

    pub fn original_size(&self) -> u64 {
        self.original_size
    }

    pub fn estimate(&self, vertex_count: usize, bone_count: usize, morph_count: usize) -> u64 {
        self.original_size
            .saturating_add(bone_matrix_bytes(bone_count))
            .saturating_add(vertex_weight_bytes(vertex_count, bone_count))
            .saturating_add(morph_delta_bytes(vertex_count, morph_count))
            .saturating_add(structural_overhead(bone_count, morph_count))
    }
}
