//! Postponable Expressions analysis.
//!
//! An expression is postponable at a point if its evaluation can be delayed
//! past that point without crossing a use. The kill sets are not a property
//! of this analysis alone: an expression stops being postponable exactly
//! where the Used analysis says a consumer becomes reachable, so KILL[B] is
//! taken from `USED_IN[B]` of a prerequisite [`compute_used`] result and
//! injected through the transfer function.
//!
//! # Data Flow Equations (Backward Analysis with Union)
//!
//! - GEN[B]  = expressions computed anywhere in B
//! - KILL[B] = USED_IN[B]
//! - OUT[B]  = UNION(IN[S]) for all successors S
//! - IN[B]   = (OUT[B] - KILL[B]) UNION GEN[B]
//!
//! Exit boundary and interior states are both EMPTY.
//!
//! [`compute_used`]: crate::dataflow::used::compute_used

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::dataflow::bitset::BitSet;
use crate::dataflow::domain::ExprDomain;
use crate::dataflow::engine::{Dataflow, Direction, InitValue};
use crate::dataflow::AnalysisResult;
use crate::ir::{BlockId, Function};

/// GEN for postponement: every expression the block computes, regardless of
/// position or operand definitions.
fn gen_sets(func: &Function, domain: &ExprDomain) -> FxHashMap<BlockId, BitSet> {
    let n = domain.len();
    let mut gen_map = FxHashMap::default();
    for block_id in func.block_ids() {
        let mut gen = BitSet::with_capacity(n);
        for &inst_id in &func.block(block_id).insts {
            if let Some(idx) = domain.expr_of_inst(inst_id) {
                gen.insert(idx.0);
            }
        }
        gen_map.insert(block_id, gen);
    }
    gen_map
}

/// Run Postponable Expressions over `func`, consuming a prior Used result.
pub fn compute_postponable(func: &Function, used: &AnalysisResult) -> AnalysisResult {
    let domain = ExprDomain::build(func);
    let gen = gen_sets(func, &domain);
    debug!(
        function = %func.name,
        expressions = domain.len(),
        "computing postponable expressions"
    );

    // The kill map mirrors what the transfer actually applies, so the
    // reported result stays self-describing.
    let mut kill = FxHashMap::default();
    for block_id in func.block_ids() {
        kill.insert(block_id, used.in_of(block_id).clone());
    }

    let mut df = Dataflow::new(Direction::Backward, InitValue::Empty, InitValue::Empty);
    df.run(
        func,
        domain.len(),
        InitValue::Empty,
        |acc, other| acc.union_with(other),
        |block, output| {
            let mut input = output.clone();
            input.difference_with(used.in_of(block));
            if let Some(g) = gen.get(&block) {
                input.union_with(g);
            }
            input
        },
    );

    let iterations = df.iterations();
    AnalysisResult::new(domain, gen, kill, df.into_states(), iterations)
}
