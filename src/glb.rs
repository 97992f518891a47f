//! GLB (binary glTF 2.0) container codec.
//!
//! [`parse`] walks the 12-byte header and the chunk list of an uploaded
//! container; [`serialize`] rebuilds a container from a parsed one plus a set
//! of extra binary segments and one document extension. The original document
//! entries and the original binary payload are carried over untouched; new
//! data is only ever appended.

use serde_json::{Map, Value};

use crate::error::RigError;

/// `glTF` in little-endian byte order.
pub const GLB_MAGIC: u32 = 0x4654_6C67;
/// The only container version this codec understands.
pub const GLB_VERSION: u32 = 2;
/// `JSON` chunk type.
pub const CHUNK_TYPE_JSON: u32 = 0x4E4F_534A;
/// `BIN\0` chunk type.
pub const CHUNK_TYPE_BIN: u32 = 0x004E_4942;

const HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

// ─── Types ────────────────────────────────────────────────────────────────────

/// Fixed 12-byte GLB header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlbHeader {
    pub magic: u32,
    pub version: u32,
    pub total_length: u32,
}

/// A parsed GLB container.
///
/// The container is never mutated once parsed; [`serialize`] always writes a
/// fresh output buffer.
#[derive(Debug, Clone)]
pub struct GlbContainer {
    pub header: GlbHeader,
    pub json: Value,
    pub binary_payload: Vec<u8>,
    has_bin_chunk: bool,
}

impl GlbContainer {
    /// True when the source container carried a `BIN` chunk (possibly empty).
    pub fn has_bin_chunk(&self) -> bool {
        self.has_bin_chunk
    }
}

/// A block of binary data appended after the original payload.
///
/// Implementors must write exactly [`BinarySegment::byte_len`] bytes.
pub trait BinarySegment {
    /// Key under which the segment's bufferView index is published.
    fn name(&self) -> &str;
    fn byte_len(&self) -> usize;
    fn write_to(&self, out: &mut Vec<u8>);
}

/// Vendor extension block merged into the document's `extensions` object.
#[derive(Debug, Clone)]
pub struct DocumentExtension {
    pub name: String,
    pub body: Value,
}

// ─── Parsing ──────────────────────────────────────────────────────────────────

/// Parse a GLB container.
///
/// Fails with [`RigError::MalformedContainer`] on bad magic, an unsupported
/// version, a truncated header or chunk, a first chunk that is not `JSON`, or
/// a JSON chunk that is not a glTF document.
pub fn parse(bytes: &[u8]) -> Result<GlbContainer, RigError> {
    if bytes.len() < HEADER_LEN {
        return Err(RigError::malformed(format!(
            "input is {} bytes, shorter than the 12-byte GLB header",
            bytes.len()
        )));
    }

    let header = GlbHeader {
        magic: read_u32(bytes, 0).unwrap_or_default(),
        version: read_u32(bytes, 4).unwrap_or_default(),
        total_length: read_u32(bytes, 8).unwrap_or_default(),
    };

    if header.magic != GLB_MAGIC {
        return Err(RigError::malformed(format!(
            "bad magic 0x{:08X}, expected 'glTF'",
            header.magic
        )));
    }
    if header.version != GLB_VERSION {
        return Err(RigError::malformed(format!(
            "unsupported GLB version {}",
            header.version
        )));
    }

    let declared = header.total_length as usize;
    if declared > bytes.len() {
        return Err(RigError::malformed(format!(
            "declared length {} exceeds the {} bytes received",
            declared,
            bytes.len()
        )));
    }
    if declared < HEADER_LEN + CHUNK_HEADER_LEN {
        return Err(RigError::malformed(format!(
            "declared length {declared} leaves no room for a JSON chunk"
        )));
    }
    if declared < bytes.len() {
        log::debug!(
            "ignoring {} trailing bytes after the declared GLB length",
            bytes.len() - declared
        );
    }
    let data = &bytes[..declared];

    let mut chunks = ChunkReader {
        data,
        offset: HEADER_LEN,
    };

    let (json_type, json_bytes) = chunks
        .next_chunk()?
        .ok_or_else(|| RigError::malformed("container has no chunks"))?;
    if json_type != CHUNK_TYPE_JSON {
        return Err(RigError::malformed(format!(
            "first chunk has type 0x{json_type:08X}, expected JSON"
        )));
    }
    let json = parse_document(json_bytes)?;

    let mut binary_payload: Option<Vec<u8>> = None;
    while let Some((chunk_type, body)) = chunks.next_chunk()? {
        match chunk_type {
            CHUNK_TYPE_BIN if binary_payload.is_none() => {
                binary_payload = Some(body.to_vec());
            }
            CHUNK_TYPE_BIN => return Err(RigError::malformed("container has two BIN chunks")),
            CHUNK_TYPE_JSON => return Err(RigError::malformed("container has two JSON chunks")),
            other => {
                log::debug!(
                    "skipping unknown GLB chunk 0x{other:08X} ({} bytes)",
                    body.len()
                );
            }
        }
    }

    let has_bin_chunk = binary_payload.is_some();
    Ok(GlbContainer {
        header,
        json,
        binary_payload: binary_payload.unwrap_or_default(),
        has_bin_chunk,
    })
}

struct ChunkReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ChunkReader<'a> {
    fn next_chunk(&mut self) -> Result<Option<(u32, &'a [u8])>, RigError> {
        if self.offset == self.data.len() {
            return Ok(None);
        }

        let (Some(length), Some(chunk_type)) = (
            read_u32(self.data, self.offset),
            read_u32(self.data, self.offset + 4),
        ) else {
            return Err(RigError::malformed(format!(
                "truncated chunk header at byte {}",
                self.offset
            )));
        };

        let start = self.offset + CHUNK_HEADER_LEN;
        let end = start
            .checked_add(length as usize)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                RigError::malformed(format!(
                    "chunk 0x{chunk_type:08X} at byte {} declares {length} bytes but the container ends at {}",
                    self.offset,
                    self.data.len()
                ))
            })?;

        self.offset = end;
        Ok(Some((chunk_type, &self.data[start..end])))
    }
}

fn parse_document(json_bytes: &[u8]) -> Result<Value, RigError> {
    let text = std::str::from_utf8(json_bytes)
        .map_err(|err| RigError::malformed(format!("JSON chunk is not UTF-8: {err}")))?;
    let json: Value = serde_json::from_str(text)
        .map_err(|err| RigError::malformed(format!("JSON chunk does not parse: {err}")))?;
    if !json.is_object() {
        return Err(RigError::malformed("JSON chunk is not an object"));
    }

    gltf::json::Root::from_slice(json_bytes)
        .map_err(|err| RigError::malformed(format!("JSON chunk is not a glTF document: {err}")))?;

    Ok(json)
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let slice = bytes.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

// ─── Serialization ────────────────────────────────────────────────────────────

/// Serialize `container` with `segments` appended to its binary payload and
/// `extension` merged into the document.
///
/// Segments are appended in the order given, each starting on a 4-byte
/// boundary, and each non-empty segment gets one new bufferView on buffer 0.
/// The indices of those bufferViews are published in the extension body
/// under `bufferViews.<segment name>` (`null` for empty segments).
///
/// The total length is computed before anything is written; the output is
/// allocated once and returned only when complete.
pub fn serialize(
    container: &GlbContainer,
    segments: &[&dyn BinarySegment],
    extension: &DocumentExtension,
) -> Result<Vec<u8>, RigError> {
    let mut document = container.json.clone();
    let root = document
        .as_object_mut()
        .ok_or_else(|| RigError::malformed("glTF document is not an object"))?;

    let payload_len = container.binary_payload.len();
    let mut cursor = payload_len;
    let mut placements = Vec::<Option<(usize, usize)>>::with_capacity(segments.len());
    for segment in segments {
        let length = segment.byte_len();
        if length == 0 {
            placements.push(None);
            continue;
        }
        cursor = align4(cursor);
        placements.push(Some((cursor, length)));
        cursor += length;
    }
    let bin_len = cursor;

    if bin_len > payload_len {
        ensure_embedded_first_buffer(root)?;
    }

    let mut view_indices = Map::new();
    let had_views = root.contains_key("bufferViews");
    let buffer_views = root
        .entry("bufferViews")
        .or_insert_with(|| Value::Array(Vec::new()));
    let Some(buffer_views) = buffer_views.as_array_mut() else {
        return Err(RigError::malformed("bufferViews is not an array"));
    };
    for (segment, placement) in segments.iter().zip(&placements) {
        let index = placement.map(|(offset, length)| {
            buffer_views.push(serde_json::json!({
                "buffer": 0,
                "byteOffset": offset,
                "byteLength": length,
                "name": segment.name(),
            }));
            buffer_views.len() - 1
        });
        view_indices.insert(segment.name().to_string(), Value::from(index));
    }
    if buffer_views.is_empty() && !had_views {
        root.remove("bufferViews");
    }

    if bin_len > payload_len {
        set_first_buffer_length(root, bin_len);
    }

    let mut body = extension.body.clone();
    if let Some(object) = body.as_object_mut() {
        object.insert("bufferViews".to_string(), Value::Object(view_indices));
    }
    merge_extension(root, &extension.name, body)?;

    let json_bytes = serde_json::to_vec(&document)
        .map_err(|err| RigError::malformed(format!("failed to encode glTF document: {err}")))?;

    let has_bin = container.has_bin_chunk || bin_len > 0;
    let total = container_length(json_bytes.len(), bin_len, has_bin)?;

    let mut out = Vec::with_capacity(total as usize);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&total.to_le_bytes());

    let json_chunk_len = align4(json_bytes.len());
    out.extend_from_slice(&(json_chunk_len as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_TYPE_JSON.to_le_bytes());
    out.extend_from_slice(&json_bytes);
    out.resize(out.len() + (json_chunk_len - json_bytes.len()), b' ');

    if has_bin {
        let bin_chunk_len = align4(bin_len);
        out.extend_from_slice(&(bin_chunk_len as u32).to_le_bytes());
        out.extend_from_slice(&CHUNK_TYPE_BIN.to_le_bytes());
        let bin_start = out.len();
        out.extend_from_slice(&container.binary_payload);
        for (segment, placement) in segments.iter().zip(&placements) {
            let Some((offset, length)) = placement else {
                continue;
            };
            out.resize(bin_start + offset, 0);
            segment.write_to(&mut out);
            debug_assert_eq!(
                out.len() - bin_start,
                offset + length,
                "segment {} wrote an unexpected byte count",
                segment.name()
            );
        }
        out.resize(bin_start + bin_chunk_len, 0);
    }

    debug_assert_eq!(out.len(), total as usize);
    Ok(out)
}

/// Total container length for a JSON document of `json_len` bytes and a
/// binary chunk of `bin_len` bytes, both before padding.
pub fn container_length(json_len: usize, bin_len: usize, has_bin: bool) -> Result<u32, RigError> {
    let mut total = (HEADER_LEN + CHUNK_HEADER_LEN) as u64 + align4_u64(json_len as u64);
    if has_bin {
        total += CHUNK_HEADER_LEN as u64 + align4_u64(bin_len as u64);
    }
    u32::try_from(total).map_err(|_| RigError::SerializationOverflow { length: total })
}

/// Length `container` would have if written back unchanged.
///
/// This is the re-encoded size, which may differ from the uploaded bytes
/// when the source JSON used a different number or whitespace style.
pub fn encoded_len(container: &GlbContainer) -> Result<u64, RigError> {
    let json_bytes = serde_json::to_vec(&container.json)
        .map_err(|err| RigError::malformed(format!("failed to encode glTF document: {err}")))?;
    let total = container_length(
        json_bytes.len(),
        container.binary_payload.len(),
        container.has_bin_chunk,
    )?;
    Ok(u64::from(total))
}

fn ensure_embedded_first_buffer(root: &Map<String, Value>) -> Result<(), RigError> {
    let uri = root
        .get("buffers")
        .and_then(Value::as_array)
        .and_then(|buffers| buffers.first())
        .and_then(|buffer| buffer.get("uri"));
    if uri.is_some() {
        return Err(RigError::malformed(
            "buffers[0] references an external uri and cannot host the BIN chunk",
        ));
    }
    Ok(())
}

fn set_first_buffer_length(root: &mut Map<String, Value>, bin_len: usize) {
    let buffers = root
        .entry("buffers")
        .or_insert_with(|| Value::Array(Vec::new()));
    if !buffers.is_array() {
        *buffers = Value::Array(Vec::new());
    }
    if let Some(buffers) = buffers.as_array_mut() {
        if buffers.is_empty() {
            buffers.push(Value::Object(Map::new()));
        }
        match buffers[0].as_object_mut() {
            Some(buffer) => {
                buffer.insert("byteLength".to_string(), Value::from(bin_len));
            }
            None => buffers[0] = serde_json::json!({ "byteLength": bin_len }),
        }
    }
}

fn merge_extension(
    root: &mut Map<String, Value>,
    name: &str,
    body: Value,
) -> Result<(), RigError> {
    let extensions = root
        .entry("extensions")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(extensions) = extensions.as_object_mut() else {
        return Err(RigError::malformed("document extensions is not an object"));
    };
    extensions.insert(name.to_string(), body);

    let used = root
        .entry("extensionsUsed")
        .or_insert_with(|| Value::Array(Vec::new()));
    let Some(used) = used.as_array_mut() else {
        return Err(RigError::malformed("extensionsUsed is not an array"));
    };
    if !used.iter().any(|entry| entry.as_str() == Some(name)) {
        used.push(Value::from(name));
    }
    Ok(())
}

fn align4(length: usize) -> usize {
    length.next_multiple_of(4)
}

fn align4_u64(length: u64) -> u64 {
    length.next_multiple_of(4)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
