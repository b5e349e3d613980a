//! Anticipated Expressions analysis (very busy expressions).
//!
//! An expression is anticipated at a point if every path leaving that point
//! computes it before any operand is defined. Anticipation is what makes an
//! insertion safe: evaluating an anticipated expression early never executes
//! work the original program would have skipped.
//!
//! # Data Flow Equations (Backward Analysis with Intersection)
//!
//! - GEN[B]  = expressions computed in B with no operand defined above the
//!   computation (upward-exposed computations)
//! - KILL[B] = expressions with an operand defined in B
//! - OUT[B]  = INTERSECTION(IN[S]) for all successors S
//! - IN[B]   = (OUT[B] - KILL[B]) UNION GEN[B]
//!
//! Exit boundary is EMPTY, interior states start at ALL.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::dataflow::bitset::BitSet;
use crate::dataflow::domain::ExprDomain;
use crate::dataflow::engine::{Dataflow, Direction, InitValue};
use crate::dataflow::AnalysisResult;
use crate::ir::{BlockId, Function, Value};

/// GEN/KILL for anticipation: a tail-to-head scan per block, so a
/// computation's GEN bit is retracted when the scan later reaches an
/// instruction above it that defines one of its operands.
fn gen_kill_sets(
    func: &Function,
    domain: &ExprDomain,
) -> (FxHashMap<BlockId, BitSet>, FxHashMap<BlockId, BitSet>) {
    let n = domain.len();
    let mut gen_map = FxHashMap::default();
    let mut kill_map = FxHashMap::default();
    for block_id in func.block_ids() {
        let mut gen = BitSet::with_capacity(n);
        let mut kill = BitSet::with_capacity(n);
        for &inst_id in func.block(block_id).insts.iter().rev() {
            let kind = &func.inst(inst_id).kind;
            if kind.defines_trackable_value() {
                let defined = Value::Inst(inst_id);
                for (idx, expr) in domain.iter() {
                    if expr.uses(defined) {
                        kill.insert(idx.0);
                        // Killed here means the operand does not exist yet
                        // at block entry, so the computation below is not
                        // upward-exposed.
                        gen.remove(idx.0);
                    }
                }
            }
            if let Some(idx) = domain.expr_of_inst(inst_id) {
                if !kill.contains(idx.0) {
                    gen.insert(idx.0);
                }
            }
        }
        gen_map.insert(block_id, gen);
        kill_map.insert(block_id, kill);
    }
    (gen_map, kill_map)
}

/// Run Anticipated Expressions over `func`.
pub fn compute_anticipated(func: &Function) -> AnalysisResult {
    let domain = ExprDomain::build(func);
    let (gen, kill) = gen_kill_sets(func, &domain);
    debug!(
        function = %func.name,
        expressions = domain.len(),
        "computing anticipated expressions"
    );

    let mut df = Dataflow::new(Direction::Backward, InitValue::Empty, InitValue::All);
    df.run(
        func,
        domain.len(),
        InitValue::All,
        |acc, other| acc.intersect_with(other),
        |block, output| {
            let mut input = output.clone();
            if let Some(k) = kill.get(&block) {
                input.difference_with(k);
            }
            if let Some(g) = gen.get(&block) {
                input.union_with(g);
            }
            input
        },
    );

    let iterations = df.iterations();
    AnalysisResult::new(domain, gen, kill, df.into_states(), iterations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataflow::test_utils::{create_conditional_cfg, create_rotated_loop_cfg};
    use crate::ir::{CmpOp, FunctionBuilder, Opcode, Value};

    #[test]
    fn test_expression_computed_on_all_paths_is_anticipated() {
        // entry branches; both arms compute a + b.
        let mut b = FunctionBuilder::new("both_arms", 2);
        let entry = b.block("entry");
        let then_bb = b.block("then");
        let else_bb = b.block("else");
        let merge = b.block("merge");

        b.switch_to(entry);
        let c = b.cmp(CmpOp::Lt, Value::Param(0), Value::Param(1)).unwrap();
        b.cond_br(c, then_bb, else_bb).unwrap();
        b.switch_to(then_bb);
        let t1 = b.binary(Opcode::Add, Value::Param(0), Value::Param(1)).unwrap();
        b.store(0, t1).unwrap();
        b.br(merge).unwrap();
        b.switch_to(else_bb);
        let t2 = b.binary(Opcode::Add, Value::Param(0), Value::Param(1)).unwrap();
        b.store(1, t2).unwrap();
        b.br(merge).unwrap();
        b.switch_to(merge);
        b.ret(None).unwrap();
        let f = b.finish().unwrap();

        let result = compute_anticipated(&f);
        assert!(result.in_of(entry).contains(0));
        assert!(result.out_of(entry).contains(0));
        assert!(result.in_of(then_bb).contains(0));
        // Past the computations nothing is anticipated.
        assert!(result.in_of(merge).is_empty());
    }

    #[test]
    fn test_one_armed_computation_is_not_anticipated_at_branch() {
        let (f, [entry, then_bb, else_bb, _merge]) = create_conditional_cfg();
        let result = compute_anticipated(&f);
        // a-b (index 1) only exists on the then arm, a*b (index 2) only on
        // the else arm; the intersection at the branch drops both.
        assert!(result.in_of(then_bb).contains(1));
        assert!(result.in_of(else_bb).contains(2));
        assert!(!result.out_of(entry).contains(1));
        assert!(!result.out_of(entry).contains(2));
        // a+b is computed in entry itself, so it is anticipated at entry.
        assert!(result.in_of(entry).contains(0));
    }

    #[test]
    fn test_loop_invariant_is_anticipated_at_preheader() {
        let (f, [entry, body, _exit]) = create_rotated_loop_cfg();
        let result = compute_anticipated(&f);
        // a+b (index 0) is computed at the top of the body on every
        // iteration, so it is anticipated before the loop is entered.
        assert!(result.in_of(body).contains(0));
        assert!(result.in_of(entry).contains(0));
        // y + t consumes t, which is defined above it in the body, so it is
        // not upward-exposed.
        assert!(!result.gen_of(body).contains(1));
        assert!(result.kill_of(body).contains(1));
    }

    #[test]
    fn test_gen_suppression_by_operand_definition() {
        // t = a + b; u = t * a  -- t * a is computed in the block but its
        // operand is defined above it, so the block does not anticipate it.
        let mut b = FunctionBuilder::new("suppressed", 2);
        b.block("entry");
        let t = b.binary(Opcode::Add, Value::Param(0), Value::Param(1)).unwrap();
        let u = b.binary(Opcode::Mul, t, Value::Param(0)).unwrap();
        b.ret(Some(u)).unwrap();
        let f = b.finish().unwrap();

        let result = compute_anticipated(&f);
        let entry = f.entry();
        assert!(result.gen_of(entry).contains(0));
        assert!(!result.gen_of(entry).contains(1));
        assert!(result.in_of(entry).contains(0));
        assert!(!result.in_of(entry).contains(1));
    }
}
