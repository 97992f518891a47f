//! GLB builders shared by unit tests.

use serde_json::{Value, json};

/// Deterministic vertex cloud shaped roughly like a 1.8m T-posed humanoid:
/// a central column plus outstretched arms.
pub(crate) fn humanoid_positions(vertex_count: usize) -> Vec<[f32; 3]> {
    (0..vertex_count)
        .map(|index| {
            let a = ((index * 7919) % 1000) as f32 / 999.0;
            let b = ((index * 104_729) % 1000) as f32 / 999.0;
            let c = ((index * 15_485_863) % 100) as f32 / 99.0;
            if index % 4 == 0 {
                // arm span at shoulder height
                [(b * 2.0 - 1.0) * 0.8, 1.40 + a * 0.08, (c - 0.5) * 0.1]
            } else {
                [(b * 2.0 - 1.0) * 0.2, a * 1.8, (c - 0.5) * 0.25]
            }
        })
        .collect()
}

/// glTF document with one mesh whose POSITION accessor covers `vertex_count`
/// vertices stored at the start of buffer 0.
pub(crate) fn mesh_document(vertex_count: usize) -> Value {
    let positions = humanoid_positions(vertex_count);
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for position in &positions {
        for axis in 0..3 {
            min[axis] = min[axis].min(position[axis]);
            max[axis] = max[axis].max(position[axis]);
        }
    }
    if positions.is_empty() {
        min = [0.0; 3];
        max = [0.0; 3];
    }

    let mut document = json!({
        "asset": {"version": "2.0", "generator": "glbrig-fixtures"},
        "scene": 0,
        "scenes": [{"nodes": [0]}],
        "nodes": [{"name": "Avatar", "mesh": 0}],
        "materials": [{"name": "Skin", "pbrMetallicRoughness": {"baseColorFactor": [0.9, 0.7, 0.6, 1.0]}}],
        "meshes": [{
            "name": "Body",
            "primitives": [{"attributes": {"POSITION": 0}, "material": 0}]
        }],
        "accessors": [{
            "componentType": 5126,
            "count": vertex_count,
            "type": "VEC3",
            "min": min,
            "max": max
        }]
    });

    if vertex_count > 0 {
        document["accessors"][0]["bufferView"] = json!(0);
        document["bufferViews"] = json!([{
            "buffer": 0,
            "byteOffset": 0,
            "byteLength": vertex_count * 12,
            "target": 34962
        }]);
        document["buffers"] = json!([{"byteLength": vertex_count * 12}]);
    }

    document
}

/// JSON text for `document` with `entries` node extras written as `1E5`,
/// which serde_json re-encodes as the longer `100000.0`.
pub(crate) fn exponent_extras_json(document: &Value, entries: usize) -> Vec<u8> {
    let text = serde_json::to_string(document).unwrap_or_default();
    let extras: Vec<String> = (0..entries).map(|i| format!("\"k{i}\":1E5")).collect();
    text.replacen(
        "\"name\":\"Avatar\"",
        &format!("\"name\":\"Avatar\",\"extras\":{{{}}}", extras.join(",")),
        1,
    )
    .into_bytes()
}

pub(crate) fn mesh_payload(vertex_count: usize) -> Vec<u8> {
    humanoid_positions(vertex_count)
        .iter()
        .flat_map(|position| position.iter().flat_map(|value| value.to_le_bytes()))
        .collect()
}

/// Complete GLB for [`mesh_document`].
pub(crate) fn mesh_glb(vertex_count: usize) -> Vec<u8> {
    let json_bytes = serde_json::to_vec(&mesh_document(vertex_count)).unwrap_or_default();
    let payload = mesh_payload(vertex_count);
    raw_glb(&json_bytes, (vertex_count > 0).then_some(payload.as_slice()))
}

/// Write a GLB by hand. The JSON chunk is space-padded; the BIN chunk is
/// written exactly as given so tests can exercise unaligned payloads.
pub(crate) fn raw_glb(json_bytes: &[u8], bin: Option<&[u8]>) -> Vec<u8> {
    let mut json_chunk = json_bytes.to_vec();
    while json_chunk.len() % 4 != 0 {
        json_chunk.push(b' ');
    }

    let mut total = 12 + 8 + json_chunk.len();
    if let Some(bin) = bin {
        total += 8 + bin.len();
    }

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"glTF");
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
    out.extend_from_slice(b"JSON");
    out.extend_from_slice(&json_chunk);
    if let Some(bin) = bin {
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(b"BIN\0");
        out.extend_from_slice(bin);
    }
    out
}
