//! Available Expressions analysis.
//!
//! An expression is available at a point if it has been computed on every
//! path from entry to that point and no operand was defined after the last
//! computation.
//!
//! # Data Flow Equations (Forward Analysis with Intersection)
//!
//! - GEN[B]  = expressions computed in B and not killed afterwards in B
//! - KILL[B] = expressions with an operand defined in B
//! - IN[B]   = INTERSECTION(OUT[P]) for all predecessors P
//! - OUT[B]  = (IN[B] - KILL[B]) UNION GEN[B]
//!
//! Entry boundary is EMPTY (nothing is available before the function runs);
//! all other states start at ALL so the intersection meet converges from
//! the optimistic side.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::dataflow::bitset::BitSet;
use crate::dataflow::domain::ExprDomain;
use crate::dataflow::engine::{Dataflow, Direction, InitValue};
use crate::dataflow::AnalysisResult;
use crate::ir::{BlockId, Function, Value};

/// GEN/KILL for availability: a forward scan per block.
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
        for &inst_id in &func.block(block_id).insts {
            let kind = &func.inst(inst_id).kind;
            // A definition kills every expression that consumes its value.
            if kind.defines_trackable_value() {
                let defined = Value::Inst(inst_id);
                for (idx, expr) in domain.iter() {
                    if expr.uses(defined) {
                        kill.insert(idx.0);
                        gen.remove(idx.0);
                    }
                }
            }
            if let Some(idx) = domain.expr_of_inst(inst_id) {
                // Computing an expression makes it available from here on;
                // it cannot be killed by the same instruction.
                gen.insert(idx.0);
                kill.remove(idx.0);
            }
        }
        gen_map.insert(block_id, gen);
        kill_map.insert(block_id, kill);
    }
    (gen_map, kill_map)
}

/// Run Available Expressions over `func`.
pub fn compute_available(func: &Function) -> AnalysisResult {
    let domain = ExprDomain::build(func);
    let (gen, kill) = gen_kill_sets(func, &domain);
    debug!(
        function = %func.name,
        expressions = domain.len(),
        "computing available expressions"
    );

    let mut df = Dataflow::new(Direction::Forward, InitValue::Empty, InitValue::All);
    df.run(
        func,
        domain.len(),
        InitValue::All,
        |acc, other| acc.intersect_with(other),
        |block, input| {
            let mut out = input.clone();
            if let Some(k) = kill.get(&block) {
                out.difference_with(k);
            }
            if let Some(g) = gen.get(&block) {
                out.union_with(g);
            }
            out
        },
    );

    let iterations = df.iterations();
    AnalysisResult::new(domain, gen, kill, df.into_states(), iterations)
}
