//! Classical bit-vector dataflow analyses over a shared expression domain.
//!
//! Four analyses feed lazy code motion:
//!
//! | Analysis    | Direction | Meet | Boundary | Initial |
//! |-------------|-----------|------|----------|---------|
//! | Available   | forward   | ∩    | EMPTY    | ALL     |
//! | Anticipated | backward  | ∩    | EMPTY    | ALL     |
//! | Used        | backward  | ∪    | EMPTY    | EMPTY   |
//! | Postponable | backward  | ∪    | EMPTY    | EMPTY   |
//!
//! The must-analyses start optimistic (ALL) and converge down; the
//! may-analyses start empty and converge up. All four share the transfer
//! shape `outgoing = (incoming - KILL) ∪ GEN` and report their results as
//! an [`AnalysisResult`] over one [`ExprDomain`].

pub mod anticipated;
pub mod available;
pub mod bitset;
pub mod domain;
pub mod engine;
pub mod postponable;
pub mod used;

use rustc_hash::FxHashMap;
use serde_json::json;

use crate::ir::{BlockId, Function};

pub use anticipated::compute_anticipated;
pub use available::compute_available;
pub use bitset::BitSet;
pub use domain::{ExprDomain, ExprId, Expression};
pub use engine::{BlockState, Dataflow, Direction, InitValue};
pub use postponable::compute_postponable;
pub use used::compute_used;

/// Solved per-block facts of one analysis, together with the expression
/// domain they are indexed by and the GEN/KILL sets that produced them.
#[derive(Debug)]
pub struct AnalysisResult {
    /// The expression universe all bit sets index into.
    pub domain: ExprDomain,
    gen: FxHashMap<BlockId, BitSet>,
    kill: FxHashMap<BlockId, BitSet>,
    block_in: FxHashMap<BlockId, BitSet>,
    block_out: FxHashMap<BlockId, BitSet>,
    iterations: usize,
    empty: BitSet,
}

impl AnalysisResult {
    pub(crate) fn new(
        domain: ExprDomain,
        gen: FxHashMap<BlockId, BitSet>,
        kill: FxHashMap<BlockId, BitSet>,
        states: FxHashMap<BlockId, BlockState>,
        iterations: usize,
    ) -> Self {
        let empty = BitSet::with_capacity(domain.len());
        let mut block_in = FxHashMap::default();
        let mut block_out = FxHashMap::default();
        for (block, state) in states {
            block_in.insert(block, state.input);
            block_out.insert(block, state.output);
        }
        Self {
            domain,
            gen,
            kill,
            block_in,
            block_out,
            iterations,
            empty,
        }
    }

    /// IN[B]. Unknown blocks answer with the empty set.
    pub fn in_of(&self, block: BlockId) -> &BitSet {
        self.block_in.get(&block).unwrap_or(&self.empty)
    }

    /// OUT[B]. Unknown blocks answer with the empty set.
    pub fn out_of(&self, block: BlockId) -> &BitSet {
        self.block_out.get(&block).unwrap_or(&self.empty)
    }

    /// GEN[B].
    pub fn gen_of(&self, block: BlockId) -> &BitSet {
        self.gen.get(&block).unwrap_or(&self.empty)
    }

    /// KILL[B].
    pub fn kill_of(&self, block: BlockId) -> &BitSet {
        self.kill.get(&block).unwrap_or(&self.empty)
    }

    /// Number of block visits the fixed-point solve took.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Render a fact set as `{expr, expr, ...}`.
    pub fn render_set(&self, set: &BitSet) -> String {
        let exprs: Vec<String> = set
            .iter()
            .map(|i| self.domain.expr(ExprId(i)).to_string())
            .collect();
        format!("{{{}}}", exprs.join(", "))
    }

    /// JSON rendering for machine consumption.
    pub fn to_json(&self, func: &Function) -> serde_json::Value {
        let domain: Vec<String> = self.domain.iter().map(|(_, e)| e.to_string()).collect();
        let blocks: Vec<serde_json::Value> = func
            .block_ids()
            .map(|block| {
                json!({
                    "block": block.0,
                    "label": func.block(block).label,
                    "gen": self.gen_of(block).iter().collect::<Vec<_>>(),
                    "kill": self.kill_of(block).iter().collect::<Vec<_>>(),
                    "in": self.in_of(block).iter().collect::<Vec<_>>(),
                    "out": self.out_of(block).iter().collect::<Vec<_>>(),
                })
            })
            .collect();
        json!({
            "function": func.name,
            "domain": domain,
            "blocks": blocks,
            "iterations": self.iterations,
        })
    }

    /// Human-readable rendering, one block per stanza.
    pub fn to_text(&self, func: &Function) -> String {
        use std::fmt::Write as _;
        let mut out = String::new();
        let _ = writeln!(out, "function {} ({} expressions)", func.name, self.domain.len());
        for block in func.block_ids() {
            let _ = writeln!(out, "{}:", func.block(block).label);
            let _ = writeln!(out, "  gen  {}", self.render_set(self.gen_of(block)));
            let _ = writeln!(out, "  kill {}", self.render_set(self.kill_of(block)));
            let _ = writeln!(out, "  in   {}", self.render_set(self.in_of(block)));
            let _ = writeln!(out, "  out  {}", self.render_set(self.out_of(block)));
        }
        out
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use crate::ir::{BlockId, CmpOp, Function, FunctionBuilder, Opcode, Value};

    /// entry: x = a + b; branch
    /// then:  a - b
    /// else:  a * b
    /// merge: z = a + b; ret z
    ///
    /// `a + b` is fully redundant at merge; the other two expressions are
    /// branch-local.
    pub fn create_conditional_cfg() -> (Function, [BlockId; 4]) {
        let mut b = FunctionBuilder::new("conditional", 3);
        let entry = b.block("entry");
        let then_bb = b.block("then");
        let else_bb = b.block("else");
        let merge = b.block("merge");

        b.switch_to(entry);
        let x = b.binary(Opcode::Add, Value::Param(0), Value::Param(1)).unwrap();
        let c = b.cmp(CmpOp::Lt, Value::Param(2), Value::Const(10)).unwrap();
        b.cond_br(c, then_bb, else_bb).unwrap();

        b.switch_to(then_bb);
        let d = b.binary(Opcode::Sub, Value::Param(0), Value::Param(1)).unwrap();
        b.store(0, d).unwrap();
        b.br(merge).unwrap();

        b.switch_to(else_bb);
        let m = b.binary(Opcode::Mul, Value::Param(0), Value::Param(1)).unwrap();
        b.store(1, m).unwrap();
        b.br(merge).unwrap();

        b.switch_to(merge);
        b.phi(vec![(then_bb, x), (else_bb, x)]).unwrap();
        let z = b.binary(Opcode::Add, Value::Param(0), Value::Param(1)).unwrap();
        b.ret(Some(z)).unwrap();

        (b.finish().unwrap(), [entry, then_bb, else_bb, merge])
    }

    /// entry -> body; body -> body | exit (rotated loop).
    /// body recomputes `a + b` every iteration.
    pub fn create_rotated_loop_cfg() -> (Function, [BlockId; 3]) {
        let mut b = FunctionBuilder::new("rotated_loop", 3);
        let entry = b.block("entry");
        let body = b.block("body");
        let exit = b.block("exit");

        b.switch_to(entry);
        b.br(body).unwrap();

        b.switch_to(body);
        // Incoming values are patched below once the loop-carried defs exist.
        let y_phi = b.phi(vec![(entry, Value::Const(0))]).unwrap();
        let i_phi = b.phi(vec![(entry, Value::Const(0))]).unwrap();
        let t = b.binary(Opcode::Add, Value::Param(0), Value::Param(1)).unwrap();
        let y_next = b.binary(Opcode::Add, y_phi, t).unwrap();
        let i_next = b.binary(Opcode::Add, i_phi, Value::Const(1)).unwrap();
        let c = b.cmp(CmpOp::Lt, i_next, Value::Param(2)).unwrap();
        b.cond_br(c, body, exit).unwrap();

        b.switch_to(exit);
        b.ret(Some(y_phi)).unwrap();

        let mut f = b.finish_unchecked();
        patch_phi(&mut f, y_phi, body, y_next);
        patch_phi(&mut f, i_phi, body, i_next);
        f.validate().unwrap();
        (f, [entry, body, exit])
    }

    fn patch_phi(f: &mut Function, phi: Value, pred: BlockId, value: Value) {
        let id = phi.defining_inst().unwrap();
        if let crate::ir::InstKind::Phi { incoming } = &mut f.inst_mut(id).kind {
            incoming.push((pred, value));
        }
    }
}
