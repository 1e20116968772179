use std::fmt;

/// Failure taxonomy for snapshot queries.
///
/// `CorruptData` and `UninitializedLeaf` are recoverable: a scanning caller
/// reports them and moves on. `UnsupportedConfiguration` is a compatibility
/// problem and must abort the current operation instead of being defaulted
/// away. `UnreadableMemory` means the underlying byte read itself failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// An invariant was violated while decoding snapshot bytes.
    CorruptData { address: u64, detail: &'static str },
    /// An arraylet leaf slot is null: the leaf was reserved but never
    /// committed. Callers may skip instead of flagging an error.
    UninitializedLeaf { spine: u64, leaf_index: usize },
    /// The snapshot records a heap policy combination this engine has no
    /// implementation for.
    UnsupportedConfiguration { detail: &'static str },
    /// The address is unmapped or outside every known segment.
    UnreadableMemory { address: u64, size: usize },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::CorruptData { address, detail } => {
                write!(f, "corrupt data at {:#x}: {}", address, detail)
            }
            ModelError::UninitializedLeaf { spine, leaf_index } => {
                write!(
                    f,
                    "uninitialized arraylet leaf {} of spine {:#x}",
                    leaf_index, spine
                )
            }
            ModelError::UnsupportedConfiguration { detail } => {
                write!(f, "unsupported configuration: {}", detail)
            }
            ModelError::UnreadableMemory { address, size } => {
                write!(f, "cannot read {} bytes at {:#x}", size, address)
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
