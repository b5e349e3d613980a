//! Error types for IR construction, validation, and analysis.

use crate::ir::{BlockId, InstId};

/// Errors produced while building or validating a function.
///
/// These indicate structural inconsistencies that would make dataflow
/// analysis or code motion unsound, so they are reported eagerly instead
/// of being tolerated downstream.
#[derive(Debug, thiserror::Error)]
pub enum LcmError {
    /// A block ID references a block that does not exist.
    #[error("Block {0:?} not found in function")]
    InvalidBlock(BlockId),

    /// An instruction ID references an instruction that does not exist.
    #[error("Instruction {0:?} not found in function")]
    InvalidInst(InstId),

    /// A block is missing its terminator instruction.
    #[error("Block {0:?} does not end with a terminator")]
    MissingTerminator(BlockId),

    /// A terminator appears before the end of a block.
    #[error("Block {block:?} has a terminator at position {position}, before the block end")]
    EarlyTerminator {
        /// Block containing the stray terminator.
        block: BlockId,
        /// Index of the offending instruction within the block.
        position: usize,
    },

    /// A phi node appears after a non-phi instruction.
    #[error("Block {block:?} has a phi at position {position} after non-phi instructions")]
    MisplacedPhi {
        /// Block containing the stray phi.
        block: BlockId,
        /// Index of the offending instruction within the block.
        position: usize,
    },

    /// A phi's incoming list does not match the block's predecessors.
    #[error("Phi {inst:?} in block {block:?} does not cover predecessor {pred:?}")]
    PhiPredecessorMismatch {
        /// The phi instruction.
        inst: InstId,
        /// Block containing the phi.
        block: BlockId,
        /// Predecessor with no incoming value.
        pred: BlockId,
    },

    /// The builder was asked to append to a block with no insertion point.
    #[error("No current block selected in builder")]
    NoCurrentBlock,

    /// The builder was asked to append past a terminator.
    #[error("Block {0:?} is already terminated")]
    BlockTerminated(BlockId),

    /// A function was finalized with no blocks.
    #[error("Function '{0}' has no basic blocks")]
    EmptyFunction(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LcmError>;
