//! Lazy code motion over an explicit control-flow graph.
//!
//! This crate implements partial redundancy elimination in the lazy code
//! motion style: four classical bit-vector dataflow analyses over a shared
//! expression domain, a placement derivation (EARLIEST / LATEST_IN /
//! INSERT), and a transformation that inserts temporaries, rewrites
//! consumers, and deletes the computations that became fully redundant.
//!
//! # Pipeline
//!
//! ```
//! use lazy_motion::dataflow::{compute_anticipated, compute_available, compute_used};
//! use lazy_motion::ir::{DomTree, FunctionBuilder, Opcode, Value};
//! use lazy_motion::lcm::{run_lcm, LcmConfig};
//!
//! // x = a + b on both paths to a merge that recomputes it.
//! let mut b = FunctionBuilder::new("example", 2);
//! b.block("entry");
//! let x = b.binary(Opcode::Add, Value::Param(0), Value::Param(1)).unwrap();
//! b.ret(Some(x)).unwrap();
//! let mut func = b.finish().unwrap();
//!
//! let avail = compute_available(&func);
//! let antic = compute_anticipated(&func);
//! let used = compute_used(&func);
//! let dom = DomTree::compute(&func);
//! let result = run_lcm(&mut func, &avail, &antic, &used, &dom, &LcmConfig::default());
//! assert!(!result.changed); // nothing redundant in a single block
//! ```
//!
//! Or use [`lcm::optimize`] to run the whole pipeline in one call.
//!
//! # Scope
//!
//! Only pure binary expressions over SSA values move. Memory, calls,
//! comparisons, and phis stay where they are; critical edges are reported,
//! never split. The pass runs on one function at a time and a result with
//! `changed == true` invalidates every previously computed analysis.

pub mod dataflow;
pub mod error;
pub mod ir;
pub mod lcm;

pub use dataflow::{
    compute_anticipated, compute_available, compute_postponable, compute_used, AnalysisResult,
    BitSet, ExprDomain, ExprId, Expression,
};
pub use error::{LcmError, Result};
pub use ir::{
    BasicBlock, BlockId, CmpOp, DomTree, Function, FunctionBuilder, Inst, InstId, InstKind,
    Opcode, Value,
};
pub use lcm::{optimize, run_lcm, CriticalEdge, InsertMode, LcmConfig, LcmResult};
