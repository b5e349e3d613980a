//! Dominator computation and dominance queries.
//!
//! Uses the classic iterative set-based algorithm: start every block at the
//! full universe, pin the entry to itself, and intersect over predecessors
//! until fixpoint. Quadratic in the worst case but simple, and fast at the
//! CFG sizes an expression-level optimizer sees. Unreachable blocks keep the
//! full set, which makes them vacuously dominated; code motion never inserts
//! into them because no anticipated facts reach them.

use crate::dataflow::BitSet;
use crate::ir::types::{BlockId, Function, InstId, Value};

/// Per-block dominator sets with block-, instruction-, and value-level
/// queries.
///
/// The tree is a snapshot: it must be recomputed after any transformation
/// that changes the CFG or moves instructions.
#[derive(Debug, Clone)]
pub struct DomTree {
    /// `doms[b]` = set of blocks that dominate block `b` (including `b`).
    doms: Vec<BitSet>,
}

impl DomTree {
    /// Compute dominator sets for `func`.
    pub fn compute(func: &Function) -> Self {
        let n = func.num_blocks();
        let mut doms: Vec<BitSet> = (0..n).map(|_| BitSet::full(n)).collect();
        if n == 0 {
            return Self { doms };
        }
        let entry = func.entry();
        doms[entry.0] = BitSet::with_capacity(n);
        doms[entry.0].insert(entry.0);

        let mut changed = true;
        while changed {
            changed = false;
            for block in func.block_ids() {
                if block == entry {
                    continue;
                }
                let preds = func.predecessors(block);
                if preds.is_empty() {
                    continue;
                }
                let mut new_set = BitSet::full(n);
                for &pred in preds {
                    new_set.intersect_with(&doms[pred.0]);
                }
                new_set.insert(block.0);
                if new_set != doms[block.0] {
                    doms[block.0] = new_set;
                    changed = true;
                }
            }
        }
        Self { doms }
    }

    /// Does block `a` dominate block `b`? Reflexive: every block dominates
    /// itself.
    #[inline]
    pub fn dominates_blocks(&self, a: BlockId, b: BlockId) -> bool {
        self.doms[b.0].contains(a.0)
    }

    /// Does instruction `a` strictly dominate instruction `b`?
    ///
    /// Within one block this is program order; across blocks it is block
    /// dominance. An instruction never dominates itself here, and removed
    /// instructions dominate nothing.
    pub fn dominates_inst(&self, func: &Function, a: InstId, b: InstId) -> bool {
        if a == b {
            return false;
        }
        let block_a = func.inst(a).block;
        let block_b = func.inst(b).block;
        if block_a == block_b {
            match (func.position_in_block(a), func.position_in_block(b)) {
                (Some(pos_a), Some(pos_b)) => pos_a < pos_b,
                _ => false,
            }
        } else {
            self.dominates_blocks(block_a, block_b)
        }
    }

    /// Is `value` available at instruction `user`? Constants and parameters
    /// are available everywhere; instruction results must dominate the user.
    pub fn value_dominates(&self, func: &Function, value: Value, user: InstId) -> bool {
        match value.defining_inst() {
            None => true,
            Some(def) => self.dominates_inst(func, def, user),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::FunctionBuilder;
    use crate::ir::types::{CmpOp, Opcode};

    /// entry -> (then | else) -> merge
    fn diamond() -> Function {
        let mut b = FunctionBuilder::new("diamond", 2);
        let entry = b.block("entry");
        let then_bb = b.block("then");
        let else_bb = b.block("else");
        let merge = b.block("merge");

        b.switch_to(entry);
        let c = b.cmp(CmpOp::Lt, Value::Param(0), Value::Param(1)).unwrap();
        b.cond_br(c, then_bb, else_bb).unwrap();
        b.switch_to(then_bb);
        b.br(merge).unwrap();
        b.switch_to(else_bb);
        b.br(merge).unwrap();
        b.switch_to(merge);
        b.ret(None).unwrap();
        b.finish().unwrap()
    }

    #[test]
    fn test_diamond_block_dominance() {
        let f = diamond();
        let dom = DomTree::compute(&f);
        let (entry, then_bb, else_bb, merge) = (BlockId(0), BlockId(1), BlockId(2), BlockId(3));
        assert!(dom.dominates_blocks(entry, merge));
        assert!(dom.dominates_blocks(entry, then_bb));
        assert!(!dom.dominates_blocks(then_bb, merge));
        assert!(!dom.dominates_blocks(else_bb, merge));
        assert!(dom.dominates_blocks(merge, merge));
        assert!(!dom.dominates_blocks(merge, entry));
    }

    #[test]
    fn test_loop_header_dominates_body() {
        // entry -> header; header -> body | exit; body -> header
        let mut b = FunctionBuilder::new("loop", 1);
        let entry = b.block("entry");
        let header = b.block("header");
        let body = b.block("body");
        let exit = b.block("exit");

        b.switch_to(entry);
        b.br(header).unwrap();
        b.switch_to(header);
        let phi = b
            .phi(vec![(entry, Value::Const(0)), (body, Value::Const(1))])
            .unwrap();
        let c = b.cmp(CmpOp::Lt, phi, Value::Param(0)).unwrap();
        b.cond_br(c, body, exit).unwrap();
        b.switch_to(body);
        b.br(header).unwrap();
        b.switch_to(exit);
        b.ret(None).unwrap();
        let f = b.finish().unwrap();

        let dom = DomTree::compute(&f);
        assert!(dom.dominates_blocks(header, body));
        assert!(dom.dominates_blocks(header, exit));
        assert!(!dom.dominates_blocks(body, header));
        assert!(!dom.dominates_blocks(body, exit));
    }

    #[test]
    fn test_instruction_dominance_same_block() {
        let mut b = FunctionBuilder::new("order", 2);
        b.block("entry");
        let x = b.binary(Opcode::Add, Value::Param(0), Value::Param(1)).unwrap();
        let y = b.binary(Opcode::Mul, x, Value::Param(0)).unwrap();
        b.ret(Some(y)).unwrap();
        let f = b.finish().unwrap();
        let dom = DomTree::compute(&f);

        let (x_id, y_id) = match (x, y) {
            (Value::Inst(a), Value::Inst(b)) => (a, b),
            _ => unreachable!(),
        };
        assert!(dom.dominates_inst(&f, x_id, y_id));
        assert!(!dom.dominates_inst(&f, y_id, x_id));
        assert!(!dom.dominates_inst(&f, x_id, x_id));
        assert!(dom.value_dominates(&f, Value::Const(7), x_id));
        assert!(dom.value_dominates(&f, Value::Param(1), x_id));
    }

    #[test]
    fn test_instruction_dominance_across_branch() {
        let f = diamond();
        let dom = DomTree::compute(&f);
        let cond = f.block(BlockId(0)).insts[0];
        let then_term = f.block(BlockId(1)).insts[0];
        let else_term = f.block(BlockId(2)).insts[0];
        assert!(dom.dominates_inst(&f, cond, then_term));
        assert!(dom.dominates_inst(&f, cond, else_term));
        assert!(!dom.dominates_inst(&f, then_term, else_term));
    }
}
