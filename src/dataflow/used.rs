//! Used Expressions analysis.
//!
//! An expression is "used" at a point if some path from that point contains
//! an instruction consuming the expression's value before the expression is
//! recomputed. Code motion needs this to tell placements that still have a
//! consumer downstream from placements whose value would go nowhere.
//!
//! # Data Flow Equations (Backward Analysis with Union)
//!
//! - GEN[B]  = expressions whose value is consumed in B above any
//!   recomputation of the expression
//! - KILL[B] = expressions recomputed in B
//! - OUT[B]  = UNION(IN[S]) for all successors S
//! - IN[B]   = (OUT[B] - KILL[B]) UNION GEN[B]
//!
//! Exit boundary and interior states are both EMPTY; a may-analysis grows
//! from the bottom.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::dataflow::bitset::BitSet;
use crate::dataflow::domain::ExprDomain;
use crate::dataflow::engine::{Dataflow, Direction, InitValue};
use crate::dataflow::AnalysisResult;
use crate::ir::{BlockId, Function};

/// GEN/KILL for uses: a tail-to-head scan. A use only generates if the
/// expression is not recomputed between the use and the block head, which
/// the scan order gives us for free.
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
            if let Some(idx) = domain.expr_of_inst(inst_id) {
                kill.insert(idx.0);
                gen.remove(idx.0);
            }
            // Any operand consuming the result of an expression-computing
            // instruction marks the expression as used, phis included.
            for operand in kind.operands() {
                if let Some(def) = operand.defining_inst() {
                    if let Some(idx) = domain.expr_of_inst(def) {
                        if !kill.contains(idx.0) {
                            gen.insert(idx.0);
                        }
                    }
                }
            }
        }
        gen_map.insert(block_id, gen);
        kill_map.insert(block_id, kill);
    }
    (gen_map, kill_map)
}

/// Run Used Expressions over `func`.
pub fn compute_used(func: &Function) -> AnalysisResult {
    let domain = ExprDomain::build(func);
    let (gen, kill) = gen_kill_sets(func, &domain);
    debug!(
        function = %func.name,
        expressions = domain.len(),
        "computing used expressions"
    );

    let mut df = Dataflow::new(Direction::Backward, InitValue::Empty, InitValue::Empty);
    df.run(
        func,
        domain.len(),
        InitValue::Empty,
        |acc, other| acc.union_with(other),
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
