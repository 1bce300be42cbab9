//! Error types for the inventory graph engine.

/// Result type alias for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;

/// Broad classification of an [`InventoryError`].
///
/// Callers use the category to decide how to surface a failure: only
/// [`ErrorCategory::Storage`] is retried locally, [`ErrorCategory::DamagedVertex`]
/// is logged and skipped, everything else aborts the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Schema,
    Path,
    Cardinality,
    Concurrency,
    Storage,
    Referential,
    DamagedVertex,
    NotFound,
    Config,
    Internal,
}

/// Main error type for the inventory engine.
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    /// Malformed or inconsistent schema definition
    #[error("Schema error: {0}")]
    Schema(String),

    /// Node type is not declared in the loaded schema version
    #[error("Unknown node type '{0}'")]
    UnknownType(String),

    /// Property is not declared on the node type
    #[error("Property '{property}' not found on '{node_type}'")]
    PropertyNotFound { node_type: String, property: String },

    /// Value could not be coerced into the declared property type
    #[error("Type mismatch on '{node_type}.{property}': expected {expected}, got {found}")]
    TypeMismatch {
        node_type: String,
        property: String,
        expected: String,
        found: String,
    },

    /// No edge rule is declared for the pair in either order
    #[error("No edge rule between '{from}' and '{to}'")]
    NoEdgeRule { from: String, to: String },

    /// A cousin edge was requested for a pair governed by a tree rule (or vice versa)
    #[error("Edge rule between '{from}' and '{to}' is a {declared} rule, not {requested}")]
    EdgeKindMismatch {
        from: String,
        to: String,
        declared: String,
        requested: String,
    },

    /// Path segment does not name a known type
    #[error("Path '{path}' has an unresolvable segment '{segment}'")]
    UnresolvableSegment { path: String, segment: String },

    /// First resolved type of a path is neither abstract nor a namespace child
    #[error("Path '{path}' does not start from a valid namespace: '{node_type}'")]
    InvalidNamespaceStart { path: String, node_type: String },

    /// Resolved type is not a declared child of the previous resolved type
    #[error("Path '{path}' is not a valid path: '{node_type}' is not a child of '{parent}'")]
    InvalidPath {
        path: String,
        node_type: String,
        parent: String,
    },

    /// Path is syntactically incomplete (missing key segments, empty path)
    #[error("Malformed path '{path}': {message}")]
    MalformedPath { path: String, message: String },

    /// Creating the edge would violate the declared multiplicity
    #[error("Cardinality violation for '{label}' edge {out_type} -> {in_type} ({multiplicity})")]
    Cardinality {
        label: String,
        out_type: String,
        in_type: String,
        multiplicity: String,
    },

    /// The exact edge already exists
    #[error("Edge '{label}' between '{out_type}' and '{in_type}' already exists")]
    EdgeExists {
        label: String,
        out_type: String,
        in_type: String,
    },

    /// Resource version supplied on create
    #[error("Resource version passed on create of '{uri}'")]
    VersionPassedOnCreate { uri: String },

    /// Resource version required but not supplied
    #[error("Resource version missing for '{uri}'")]
    VersionMissing { uri: String },

    /// Resource version supplied does not match the stored one
    #[error("Resource version mismatch for '{uri}': supplied '{supplied}', stored '{stored}'")]
    VersionMismatch {
        uri: String,
        supplied: String,
        stored: String,
    },

    /// Transient write-write collision reported by the graph store
    #[error("Storage conflict: {0}")]
    StorageConflict(String),

    /// Retry bound exhausted on transient conflicts
    #[error("Too many retries ({attempts}): {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Relationship or parent resolution failed
    #[error("Referential error for '{node_type}' at '{path}': {message}")]
    Referential {
        node_type: String,
        path: String,
        message: String,
    },

    /// Delete blocked by the node type's delete semantic or an edge flag
    #[error("Cannot delete '{node_type}' ({semantic}): {message}")]
    DeleteBlocked {
        node_type: String,
        semantic: String,
        message: String,
    },

    /// Neighbour vertex without a readable node-type tag
    #[error("Damaged vertex {0}: missing node type")]
    DamagedVertex(String),

    /// More than one vertex matched where exactly one was required
    #[error("Multiple '{node_type}' vertices ({count}) matched '{path}'")]
    MultipleResults {
        node_type: String,
        path: String,
        count: usize,
    },

    /// Not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Mutation hook rejected the request
    #[error("Hook error: {0}")]
    Hook(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage primitive errors that are not conflicts
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Wrapped anyhow errors for compatibility
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl InventoryError {
    /// Create a new schema error
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Create a new property-not-found error
    pub fn property_not_found(node_type: impl Into<String>, property: impl Into<String>) -> Self {
        Self::PropertyNotFound {
            node_type: node_type.into(),
            property: property.into(),
        }
    }

    /// Create a new malformed path error
    pub fn malformed_path(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedPath {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new referential error
    pub fn referential(
        node_type: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Referential {
            node_type: node_type.into(),
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new storage conflict
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::StorageConflict(msg.into())
    }

    /// Create a new storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new not found error
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new hook error
    pub fn hook(msg: impl Into<String>) -> Self {
        Self::Hook(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Taxonomy class of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Schema(_)
            | Self::UnknownType(_)
            | Self::PropertyNotFound { .. }
            | Self::TypeMismatch { .. }
            | Self::NoEdgeRule { .. }
            | Self::EdgeKindMismatch { .. } => ErrorCategory::Schema,
            Self::UnresolvableSegment { .. }
            | Self::InvalidNamespaceStart { .. }
            | Self::InvalidPath { .. }
            | Self::MalformedPath { .. } => ErrorCategory::Path,
            Self::Cardinality { .. } | Self::EdgeExists { .. } => ErrorCategory::Cardinality,
            Self::VersionPassedOnCreate { .. }
            | Self::VersionMissing { .. }
            | Self::VersionMismatch { .. } => ErrorCategory::Concurrency,
            Self::StorageConflict(_)
            | Self::RetriesExhausted { .. }
            | Self::Storage(_)
            | Self::Hook(_) => ErrorCategory::Storage,
            Self::Referential { .. } | Self::DeleteBlocked { .. } | Self::MultipleResults { .. } => {
                ErrorCategory::Referential
            }
            Self::DamagedVertex(_) => ErrorCategory::DamagedVertex,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Config(_) => ErrorCategory::Config,
            Self::InvalidInput(_)
            | Self::Serialization(_)
            | Self::Io(_)
            | Self::Internal(_)
            | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Whether the failed unit of work may be replayed on a fresh transaction
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageConflict(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
