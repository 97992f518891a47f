use std::collections::HashSet;

use nalgebra::Vector3;
use serde_json::Value;

use crate::{error::RigError, glb::GlbContainer};

const COMPONENT_FLOAT: u64 = 5126;

/// Axis-aligned bounds of all POSITION data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshBounds {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl MeshBounds {
    /// Vertical extent, falling back to 1.0 for flat or inverted bounds.
    pub fn height(&self) -> f32 {
        let height = self.max.y - self.min.y;
        if height.is_finite() && height > f32::EPSILON {
            height
        } else {
            1.0
        }
    }

    pub fn center(&self) -> Vector3<f32> {
        (self.min + self.max) * 0.5
    }

    fn union(&self, other: &MeshBounds) -> MeshBounds {
        MeshBounds {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }
}

/// What the rig stages need to know about the input mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshProfile {
    /// Sum of the counts of all distinct POSITION accessors.
    pub vertex_count: usize,
    pub mesh_count: usize,
    pub bounds: Option<MeshBounds>,
    /// Vertex positions in the same order as `vertex_count`, when every
    /// POSITION accessor is plain float data stored in the BIN chunk.
    pub positions: Option<Vec<Vector3<f32>>>,
}

impl MeshProfile {
    pub fn height(&self) -> f32 {
        self.bounds.as_ref().map_or(1.0, MeshBounds::height)
    }
}

/// Collect vertex count, bounds and (when readable) positions of every mesh
/// primitive in the document.
///
/// Fails with [`RigError::InvalidMesh`] when no primitive declares POSITION,
/// a POSITION accessor is missing, or the total vertex count is zero.
pub fn profile(container: &GlbContainer) -> Result<MeshProfile, RigError> {
    let json = &container.json;
    let position_accessors = collect_position_accessors(json);
    if position_accessors.is_empty() {
        return Err(RigError::invalid_mesh(
            "no mesh primitive declares a POSITION accessor",
        ));
    }

    let accessors = json
        .get("accessors")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut vertex_count = 0usize;
    let mut bounds: Option<MeshBounds> = None;
    let mut declared_bounds = true;
    for &index in &position_accessors {
        let accessor = accessors.get(index).ok_or_else(|| {
            RigError::invalid_mesh(format!("POSITION accessor {index} does not exist"))
        })?;
        let count = accessor
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                RigError::invalid_mesh(format!("POSITION accessor {index} has no count"))
            })?;
        check_position_storage(container, index, accessor, count)?;
        let count = usize::try_from(count).map_err(|_| {
            RigError::invalid_mesh(format!("POSITION accessor {index} count {count} is too large"))
        })?;
        vertex_count = vertex_count.saturating_add(count);

        match accessor_bounds(accessor) {
            Some(accessor_bounds) => {
                bounds = Some(match bounds {
                    Some(current) => current.union(&accessor_bounds),
                    None => accessor_bounds,
                });
            }
            None => declared_bounds = false,
        }
    }

    if vertex_count == 0 {
        return Err(RigError::invalid_mesh("mesh has zero vertices"));
    }

    let positions = read_positions(container, &position_accessors);
    if !declared_bounds {
        bounds = positions.as_deref().and_then(bounds_of);
    }

    let mesh_count = json
        .get("meshes")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);

    log::debug!(
        "mesh profile: {} vertices across {} POSITION accessor(s), positions {}",
        vertex_count,
        position_accessors.len(),
        if positions.is_some() { "read" } else { "unavailable" }
    );

    Ok(MeshProfile {
        vertex_count,
        mesh_count,
        bounds,
        positions,
    })
}

/// Distinct POSITION accessor indices in mesh/primitive order.
fn collect_position_accessors(json: &Value) -> Vec<usize> {
    let mut seen = HashSet::new();
    json.get("meshes")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|mesh| mesh.get("primitives").and_then(Value::as_array))
        .flatten()
        .filter_map(|primitive| primitive.pointer("/attributes/POSITION"))
        .filter_map(Value::as_u64)
        .map(|index| index as usize)
        .filter(|index| seen.insert(*index))
        .collect()
}

fn accessor_bounds(accessor: &Value) -> Option<MeshBounds> {
    let read = |key: &str| -> Option<Vector3<f32>> {
        let values = accessor.get(key)?.as_array()?;
        if values.len() != 3 {
            return None;
        }
        Some(Vector3::new(
            values[0].as_f64()? as f32,
            values[1].as_f64()? as f32,
            values[2].as_f64()? as f32,
        ))
    };
    Some(MeshBounds {
        min: read("min")?,
        max: read("max")?,
    })
}

fn bounds_of(positions: &[Vector3<f32>]) -> Option<MeshBounds> {
    let first = positions.first()?;
    Some(positions.iter().fold(
        MeshBounds {
            min: *first,
            max: *first,
        },
        |bounds, position| MeshBounds {
            min: bounds.min.inf(position),
            max: bounds.max.sup(position),
        },
    ))
}

fn component_size(component_type: u64) -> Option<u64> {
    match component_type {
        5120 | 5121 => Some(1),
        5122 | 5123 => Some(2),
        5125 | 5126 => Some(4),
        _ => None,
    }
}

/// Reject a POSITION accessor whose declared count cannot fit in the
/// bufferView backing it, or whose view runs past the BIN chunk.
///
/// Accessors without a bufferView are zero-filled (or sparse) and carry no
/// storage to check.
fn check_position_storage(
    container: &GlbContainer,
    index: usize,
    accessor: &Value,
    count: u64,
) -> Result<(), RigError> {
    let Some(view_index) = accessor.get("bufferView").and_then(Value::as_u64) else {
        return Ok(());
    };
    let view = container
        .json
        .pointer(&format!("/bufferViews/{view_index}"))
        .ok_or_else(|| {
            RigError::invalid_mesh(format!(
                "POSITION accessor {index} references missing bufferView {view_index}"
            ))
        })?;
    let view_length = view
        .get("byteLength")
        .and_then(Value::as_u64)
        .ok_or_else(|| {
            RigError::invalid_mesh(format!("bufferView {view_index} has no byteLength"))
        })?;
    let component = accessor
        .get("componentType")
        .and_then(Value::as_u64)
        .and_then(component_size)
        .ok_or_else(|| {
            RigError::invalid_mesh(format!(
                "POSITION accessor {index} has an unknown componentType"
            ))
        })?;

    let element = 3 * component;
    let stride = view.get("byteStride").and_then(Value::as_u64).unwrap_or(element);
    let accessor_offset = accessor.get("byteOffset").and_then(Value::as_u64).unwrap_or(0);
    if count > 0 {
        let needed = (count - 1)
            .checked_mul(stride)
            .and_then(|span| span.checked_add(element))
            .and_then(|span| span.checked_add(accessor_offset));
        if needed.is_none_or(|needed| needed > view_length) {
            return Err(RigError::invalid_mesh(format!(
                "POSITION accessor {index} declares {count} vertices but bufferView \
                 {view_index} holds {view_length} bytes"
            )));
        }
    }

    let embedded = view.get("buffer").and_then(Value::as_u64) == Some(0)
        && container
            .json
            .pointer("/buffers/0")
            .is_some_and(|buffer| buffer.get("uri").is_none());
    if embedded {
        let view_offset = view.get("byteOffset").and_then(Value::as_u64).unwrap_or(0);
        let payload_len = container.binary_payload.len() as u64;
        if view_offset
            .checked_add(view_length)
            .is_none_or(|end| end > payload_len)
        {
            return Err(RigError::invalid_mesh(format!(
                "bufferView {view_index} runs past the {payload_len}-byte BIN chunk"
            )));
        }
    }
    Ok(())
}

/// Read all POSITION data, or `None` when any accessor is not plain VEC3
/// float data inside the embedded buffer.
fn read_positions(container: &GlbContainer, accessor_indices: &[usize]) -> Option<Vec<Vector3<f32>>> {
    let json = &container.json;
    let embedded = json
        .pointer("/buffers/0")
        .is_some_and(|buffer| buffer.get("uri").is_none());
    if !embedded {
        return None;
    }

    let mut positions = Vec::new();
    for &index in accessor_indices {
        let accessor = json.pointer(&format!("/accessors/{index}"))?;
        if accessor.get("type").and_then(Value::as_str) != Some("VEC3")
            || accessor.get("componentType").and_then(Value::as_u64) != Some(COMPONENT_FLOAT)
            || accessor.get("sparse").is_some()
        {
            return None;
        }

        let count = usize::try_from(accessor.get("count")?.as_u64()?).ok()?;
        let view_index = accessor.get("bufferView")?.as_u64()?;
        let view = json.pointer(&format!("/bufferViews/{view_index}"))?;
        if view.get("buffer").and_then(Value::as_u64) != Some(0) {
            return None;
        }

        let field = |value: &Value, key: &str, default: u64| {
            usize::try_from(value.get(key).and_then(Value::as_u64).unwrap_or(default)).ok()
        };
        let view_offset = field(view, "byteOffset", 0)?;
        let accessor_offset = field(accessor, "byteOffset", 0)?;
        let stride = field(view, "byteStride", 12)?;
        let base = view_offset.checked_add(accessor_offset)?;

        // the last vertex must be in the payload before anything is allocated
        let last = count
            .checked_sub(1)
            .map_or(Some(base), |tail| tail.checked_mul(stride)?.checked_add(base))?;
        if count > 0 && last.checked_add(12)? > container.binary_payload.len() {
            return None;
        }

        positions.reserve(count);
        for vertex in 0..count {
            let offset = base + vertex * stride;
            let bytes = container.binary_payload.get(offset..offset + 12)?;
            let component = |lane: usize| {
                f32::from_le_bytes([
                    bytes[lane * 4],
                    bytes[lane * 4 + 1],
                    bytes[lane * 4 + 2],
                    bytes[lane * 4 + 3],
                ])
            };
            positions.push(Vector3::new(component(0), component(1), component(2)));
        }
    }

    Some(positions)
}
