use thiserror::Error;

/// Error values returned by the rig embedding pipeline.
///
/// The variants map one-to-one onto the failure classes a calling service
/// needs to distinguish; translating them into transport-level responses is
/// the caller's job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RigError {
    /// Bad magic, unsupported version, wrong chunk type, truncation or an
    /// unparseable JSON chunk.
    #[error("malformed GLB container: {0}")]
    MalformedContainer(String),

    /// The document has no POSITION data or the mesh has zero vertices.
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),

    /// The plan identifier could not be resolved to a tier budget.
    #[error("unknown subscription tier: {0}")]
    UnknownTier(String),

    /// The serialized container would not fit the 32-bit GLB length field.
    #[error("serialized GLB length {length} exceeds the 32-bit length field")]
    SerializationOverflow {
        /// Total byte length the output would have needed.
        length: u64,
    },

    /// The caller-supplied deadline expired; any partial output was dropped.
    #[error("deadline exceeded during {stage}")]
    DeadlineExceeded {
        /// Pipeline stage that observed the expiry.
        stage: &'static str,
    },
}

impl RigError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedContainer(message.into())
    }

    pub(crate) fn invalid_mesh(message: impl Into<String>) -> Self {
        Self::InvalidMesh(message.into())
    }
}
