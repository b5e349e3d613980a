//! IR type definitions.
//!
//! The instruction set is deliberately small: binary arithmetic, comparisons,
//! copies, phis, stores, and terminators. That is exactly the surface the
//! redundancy analyses reason about; everything else an expression-level
//! optimizer would treat as opaque is out of scope.
//!
//! Instructions live in a per-function arena and blocks hold ordered lists of
//! [`InstId`]s, so moving or deleting an instruction never invalidates the
//! identity other instructions use to refer to its value.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::{LcmError, Result};

// =============================================================================
// Identifiers and values
// =============================================================================

/// Unique identifier for a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub usize);

/// Unique identifier for an instruction in the function arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstId(pub usize);

/// An SSA value: something an instruction operand can name.
///
/// Values are identities, not snapshots. Two operands are the same value
/// exactly when they are the same constant, the same parameter, or the
/// result of the same instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    /// Integer constant.
    Const(i64),
    /// Function parameter, by index.
    Param(u32),
    /// Result of an instruction.
    Inst(InstId),
}

impl Value {
    /// The defining instruction, if this value is an instruction result.
    #[inline]
    pub fn defining_inst(self) -> Option<InstId> {
        match self {
            Value::Inst(id) => Some(id),
            _ => None,
        }
    }
}

// =============================================================================
// Instructions
// =============================================================================

/// Binary arithmetic and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Opcode {
    Add,
    Sub,
    Mul,
    Sdiv,
    Udiv,
    Srem,
    Urem,
    Shl,
    Lshr,
    Ashr,
    And,
    Or,
    Xor,
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Opcode::Add => "+",
            Opcode::Sub => "-",
            Opcode::Mul => "*",
            Opcode::Sdiv => "/",
            Opcode::Udiv => "/u",
            Opcode::Srem => "%",
            Opcode::Urem => "%u",
            Opcode::Shl => "<<",
            Opcode::Lshr => ">>l",
            Opcode::Ashr => ">>a",
            Opcode::And => "&",
            Opcode::Or => "|",
            Opcode::Xor => "^",
        };
        write!(f, "{}", s)
    }
}

/// Comparison predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl std::fmt::Display for CmpOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}

/// The operation an instruction performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstKind {
    /// Pure binary arithmetic: the only kind the expression domain tracks.
    Binary {
        op: Opcode,
        lhs: Value,
        rhs: Value,
    },
    /// Comparison producing a boolean, used by conditional branches.
    Cmp {
        op: CmpOp,
        lhs: Value,
        rhs: Value,
    },
    /// Value copy.
    Copy { src: Value },
    /// SSA phi: one incoming value per predecessor block.
    Phi { incoming: Vec<(BlockId, Value)> },
    /// Store to an abstract memory slot; void-typed side effect.
    Store { slot: u32, value: Value },
    /// Unconditional branch.
    Br { dest: BlockId },
    /// Conditional branch.
    CondBr {
        cond: Value,
        then_dest: BlockId,
        else_dest: BlockId,
    },
    /// Function return.
    Ret { value: Option<Value> },
    /// Tombstone left behind after deletion; never appears in a block's list.
    Removed,
}

impl InstKind {
    /// True for instructions that end a block.
    #[inline]
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Br { .. } | InstKind::CondBr { .. } | InstKind::Ret { .. }
        )
    }

    /// True for phi nodes.
    #[inline]
    pub fn is_phi(&self) -> bool {
        matches!(self, InstKind::Phi { .. })
    }

    /// True for instructions whose result can carry an expression value
    /// forward: non-void, not a store, not a terminator, not a phi, and not
    /// a comparison. Only these definitions participate in kill sets.
    #[inline]
    pub fn defines_trackable_value(&self) -> bool {
        matches!(self, InstKind::Binary { .. } | InstKind::Copy { .. })
    }

    /// All value operands, in a fixed order. Phi operands come paired with
    /// their incoming block elsewhere; here only the values are listed.
    pub fn operands(&self) -> Vec<Value> {
        match self {
            InstKind::Binary { lhs, rhs, .. } | InstKind::Cmp { lhs, rhs, .. } => {
                vec![*lhs, *rhs]
            }
            InstKind::Copy { src } => vec![*src],
            InstKind::Phi { incoming } => incoming.iter().map(|(_, v)| *v).collect(),
            InstKind::Store { value, .. } => vec![*value],
            InstKind::Br { .. } => Vec::new(),
            InstKind::CondBr { cond, .. } => vec![*cond],
            InstKind::Ret { value } => value.iter().copied().collect(),
            InstKind::Removed => Vec::new(),
        }
    }

    /// Successor blocks named by this instruction, if it is a terminator.
    pub fn branch_targets(&self) -> Vec<BlockId> {
        match self {
            InstKind::Br { dest } => vec![*dest],
            InstKind::CondBr {
                then_dest,
                else_dest,
                ..
            } => vec![*then_dest, *else_dest],
            _ => Vec::new(),
        }
    }
}

/// An instruction: its operation plus the block it lives in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inst {
    /// The operation.
    pub kind: InstKind,
    /// Owning block.
    pub block: BlockId,
}

/// A basic block: a label and an ordered list of instructions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicBlock {
    /// Human-readable label.
    pub label: String,
    /// Instruction order within the block.
    pub insts: Vec<InstId>,
}

// =============================================================================
// Function
// =============================================================================

/// Cached adjacency lists for O(1) successor/predecessor lookups.
///
/// Built lazily on first access; derived entirely from block terminators.
#[derive(Debug)]
struct AdjacencyCache {
    /// Block index -> successor blocks (branch target order).
    successors: Vec<Vec<BlockId>>,
    /// Block index -> predecessor blocks (ascending block order).
    predecessors: Vec<Vec<BlockId>>,
}

/// A function: parameters, blocks, and the instruction arena.
///
/// The first block added is the entry block.
#[derive(Debug, Serialize, Deserialize)]
pub struct Function {
    /// Function name, for diagnostics and rendering.
    pub name: String,
    /// Number of parameters; `Value::Param(i)` must satisfy `i < num_params`.
    pub num_params: u32,
    blocks: Vec<BasicBlock>,
    insts: Vec<Inst>,
    #[serde(skip)]
    adjacency_cache: OnceCell<AdjacencyCache>,
}

impl Function {
    /// Create an empty function.
    pub fn new(name: impl Into<String>, num_params: u32) -> Self {
        Self {
            name: name.into(),
            num_params,
            blocks: Vec::new(),
            insts: Vec::new(),
            adjacency_cache: OnceCell::new(),
        }
    }

    /// Entry block. Functions are never analyzed empty, but an empty
    /// function still answers consistently.
    #[inline]
    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    /// Number of basic blocks.
    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Iterate over all block IDs in creation order. Double-ended so the
    /// backward dataflow worklist can seed itself in reverse.
    pub fn block_ids(&self) -> impl DoubleEndedIterator<Item = BlockId> {
        (0..self.blocks.len()).map(BlockId)
    }

    /// Append a new empty block.
    pub fn add_block(&mut self, label: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(BasicBlock {
            label: label.into(),
            insts: Vec::new(),
        });
        self.adjacency_cache = OnceCell::new();
        id
    }

    /// Look up a block.
    #[inline]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    /// Look up an instruction.
    #[inline]
    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id.0]
    }

    /// Mutable instruction access, for operand rewriting.
    #[inline]
    pub fn inst_mut(&mut self, id: InstId) -> &mut Inst {
        &mut self.insts[id.0]
    }

    /// Append an instruction to the end of a block.
    pub fn append_inst(&mut self, block: BlockId, kind: InstKind) -> InstId {
        let id = InstId(self.insts.len());
        self.insts.push(Inst { kind, block });
        self.blocks[block.0].insts.push(id);
        self.adjacency_cache = OnceCell::new();
        id
    }

    /// Insert an instruction at a given position within a block.
    pub fn insert_inst_at(&mut self, block: BlockId, position: usize, kind: InstKind) -> InstId {
        let id = InstId(self.insts.len());
        self.insts.push(Inst { kind, block });
        self.blocks[block.0].insts.insert(position, id);
        id
    }

    /// Delete an instruction: unlink it from its block and leave a tombstone
    /// in the arena so stale IDs stay detectable.
    pub fn remove_inst(&mut self, id: InstId) {
        let block = self.insts[id.0].block;
        self.blocks[block.0].insts.retain(|&i| i != id);
        self.insts[id.0].kind = InstKind::Removed;
    }

    /// Position of the first instruction in `block` that is not a phi.
    /// A valid block always has one: the terminator at minimum.
    pub fn first_non_phi_position(&self, block: BlockId) -> usize {
        self.blocks[block.0]
            .insts
            .iter()
            .position(|&id| !self.insts[id.0].kind.is_phi())
            .unwrap_or(self.blocks[block.0].insts.len())
    }

    /// Position of an instruction within its block, or `None` if it has
    /// been removed.
    pub fn position_in_block(&self, id: InstId) -> Option<usize> {
        let block = self.insts[id.0].block;
        self.blocks[block.0].insts.iter().position(|&i| i == id)
    }

    /// The block's terminator instruction, if the block is well-formed.
    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        self.blocks[block.0]
            .insts
            .last()
            .copied()
            .filter(|&id| self.insts[id.0].kind.is_terminator())
    }

    /// Successor blocks of `block`.
    pub fn successors(&self, block: BlockId) -> &[BlockId] {
        &self.adjacency().successors[block.0]
    }

    /// Predecessor blocks of `block`.
    pub fn predecessors(&self, block: BlockId) -> &[BlockId] {
        &self.adjacency().predecessors[block.0]
    }

    /// True when the block has no successors (returns or falls off the CFG).
    pub fn is_exit(&self, block: BlockId) -> bool {
        self.successors(block).is_empty()
    }

    /// Drop the memoized adjacency lists. Must be called after any edit
    /// that changes branch targets.
    pub fn invalidate_adjacency_cache(&mut self) {
        self.adjacency_cache = OnceCell::new();
    }

    fn adjacency(&self) -> &AdjacencyCache {
        self.adjacency_cache.get_or_init(|| {
            let n = self.blocks.len();
            let mut successors = vec![Vec::new(); n];
            let mut predecessors = vec![Vec::new(); n];
            for (idx, block) in self.blocks.iter().enumerate() {
                let Some(&last) = block.insts.last() else {
                    continue;
                };
                for target in self.insts[last.0].kind.branch_targets() {
                    if target.0 < n {
                        successors[idx].push(target);
                        predecessors[target.0].push(BlockId(idx));
                    }
                }
            }
            AdjacencyCache {
                successors,
                predecessors,
            }
        })
    }

    /// Check structural invariants the analyses rely on.
    ///
    /// Every block must end with exactly one terminator, phis must be
    /// contiguous at the block head, branch targets must exist, and each
    /// phi must cover every predecessor.
    pub fn validate(&self) -> Result<()> {
        if self.blocks.is_empty() {
            return Err(LcmError::EmptyFunction(self.name.clone()));
        }
        for (idx, block) in self.blocks.iter().enumerate() {
            let block_id = BlockId(idx);
            let Some(&last) = block.insts.last() else {
                return Err(LcmError::MissingTerminator(block_id));
            };
            if !self.insts[last.0].kind.is_terminator() {
                return Err(LcmError::MissingTerminator(block_id));
            }
            let mut seen_non_phi = false;
            for (position, &inst_id) in block.insts.iter().enumerate() {
                let kind = &self.insts[inst_id.0].kind;
                if kind.is_terminator() && position + 1 != block.insts.len() {
                    return Err(LcmError::EarlyTerminator {
                        block: block_id,
                        position,
                    });
                }
                if kind.is_phi() {
                    if seen_non_phi {
                        return Err(LcmError::MisplacedPhi {
                            block: block_id,
                            position,
                        });
                    }
                } else {
                    seen_non_phi = true;
                }
                for target in kind.branch_targets() {
                    if target.0 >= self.blocks.len() {
                        return Err(LcmError::InvalidBlock(target));
                    }
                }
            }
        }
        // Phi coverage needs adjacency, which needs valid branch targets.
        for (idx, block) in self.blocks.iter().enumerate() {
            let block_id = BlockId(idx);
            for &inst_id in &block.insts {
                if let InstKind::Phi { incoming } = &self.insts[inst_id.0].kind {
                    for &pred in self.predecessors(block_id) {
                        if !incoming.iter().any(|(b, _)| *b == pred) {
                            return Err(LcmError::PhiPredecessorMismatch {
                                inst: inst_id,
                                block: block_id,
                                pred,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
