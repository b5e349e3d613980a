//! Minimal SSA-style intermediate representation.
//!
//! Blocks, instructions, a builder, dominators, and text rendering. The IR
//! exists to give the redundancy analyses and the code motion pass a precise
//! substrate; it is not a general-purpose compiler IR.

pub mod builder;
pub mod display;
pub mod dom;
pub mod types;

pub use builder::FunctionBuilder;
pub use display::inst_to_text;
pub use dom::DomTree;
pub use types::{BasicBlock, BlockId, CmpOp, Function, Inst, InstId, InstKind, Opcode, Value};
