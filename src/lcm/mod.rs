//! Lazy code motion: partial redundancy elimination driven by the
//! availability, anticipation, and use analyses.
//!
//! # Placement equations
//!
//! - EARLIEST[B]  = ANTIC_IN[B] ∩ (¬AVAIL_IN[B] ∪ USED_IN[B])
//! - LATEST_IN[B] = (EARLIEST[B] ∪ USED_IN[B]) ∩ ⋂ LATEST_IN[P] over preds P
//!   (entry meets ALL; solved iteratively from ALL, capped at
//!   `2 * blocks + 10` sweeps)
//! - INSERT[B]    = LATEST_IN[B] ∩ (EARLIEST[B] ∪ ∃P ∈ preds: e ∉ LATEST_IN[P])
//!   (the entry block treats the predecessor clause as ALL)
//!
//! # Phases
//!
//! 1. Derive EARLIEST, LATEST_IN, and INSERT from the analysis results.
//! 2. Report critical edges: an expression anticipated but not available at
//!    a multi-predecessor block, reached from a multi-successor predecessor,
//!    cannot be placed optimally without edge splitting. Detection only; the
//!    CFG is never restructured.
//! 3. Place temporaries. Each selected (block, expression) pair first looks
//!    for an existing computation exposed at the block head and adopts it;
//!    otherwise a fresh instruction goes in before the first non-phi, and
//!    only if both operands dominate that point. Adoption is what makes the
//!    pass idempotent: a temporary hoisted by a previous run satisfies the
//!    selection next time without growing the block.
//! 4. Map every pre-existing computation to its highest dominating
//!    temporary, rewrite operands through the chain-resolved map, and delete
//!    replaced computations that end up unused.
//!
//! Anticipation gates every insertion, so the pass never executes an
//! expression on a path that did not already compute it.

mod rewrite;

use rustc_hash::FxHashMap;
use serde_json::json;
use tracing::{debug, warn};

use crate::dataflow::{
    compute_anticipated, compute_available, compute_used, AnalysisResult, BitSet, ExprDomain,
    ExprId,
};
use crate::error::Result;
use crate::ir::{BlockId, DomTree, Function, InstId, InstKind, Value};

// =============================================================================
// Configuration and result types
// =============================================================================

/// Which derived set drives temporary placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertMode {
    /// Place at EARLIEST: as high as safety allows. Longer live ranges,
    /// simpler placement.
    Earliest,
    /// Place at INSERT (derived from LATEST_IN): as low as profitability
    /// allows. The default.
    #[default]
    Latest,
}

/// Tunables for one run of the pass.
#[derive(Debug, Clone)]
pub struct LcmConfig {
    /// Placement strategy.
    pub mode: InsertMode,
    /// Budget for the operand rewrite loop.
    pub max_rewrite_passes: usize,
}

impl Default for LcmConfig {
    fn default() -> Self {
        Self {
            mode: InsertMode::Latest,
            max_rewrite_passes: 10,
        }
    }
}

/// A CFG edge that blocks optimal placement of one expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CriticalEdge {
    /// Source block (multiple successors).
    pub pred: BlockId,
    /// Destination block (multiple predecessors).
    pub block: BlockId,
    /// The expression that wanted a placement on this edge.
    pub expr: ExprId,
}

/// Outcome of one run of lazy code motion.
#[derive(Debug)]
pub struct LcmResult {
    /// True when the function was modified in any way.
    pub changed: bool,
    /// Fresh temporaries inserted.
    pub inserted: usize,
    /// Existing computations adopted as temporaries instead of inserting.
    pub reused: usize,
    /// Original computations assigned a replacement temporary.
    pub replaced: usize,
    /// Operand slots rewritten.
    pub rewrites: usize,
    /// Replaced originals deleted as dead.
    pub deleted: usize,
    /// False when the LATEST_IN solve hit its iteration cap.
    pub latest_converged: bool,
    /// False when operand rewriting hit its pass budget.
    pub rewrite_converged: bool,
    /// Edges where optimal placement was blocked.
    pub critical_edges: Vec<CriticalEdge>,
    /// EARLIEST[B] per block.
    pub earliest: FxHashMap<BlockId, BitSet>,
    /// LATEST_IN[B] per block.
    pub latest_in: FxHashMap<BlockId, BitSet>,
    /// INSERT[B] per block.
    pub insert: FxHashMap<BlockId, BitSet>,
}

impl LcmResult {
    fn unchanged() -> Self {
        Self {
            changed: false,
            inserted: 0,
            reused: 0,
            replaced: 0,
            rewrites: 0,
            deleted: 0,
            latest_converged: true,
            rewrite_converged: true,
            critical_edges: Vec::new(),
            earliest: FxHashMap::default(),
            latest_in: FxHashMap::default(),
            insert: FxHashMap::default(),
        }
    }

    /// JSON rendering for machine consumption.
    pub fn to_json(&self, func: &Function) -> serde_json::Value {
        let set_to_json = |sets: &FxHashMap<BlockId, BitSet>| -> Vec<serde_json::Value> {
            func.block_ids()
                .map(|b| {
                    let indices: Vec<usize> =
                        sets.get(&b).map(|s| s.iter().collect()).unwrap_or_default();
                    json!({ "block": b.0, "label": func.block(b).label, "exprs": indices })
                })
                .collect()
        };
        json!({
            "function": func.name,
            "changed": self.changed,
            "inserted": self.inserted,
            "reused": self.reused,
            "replaced": self.replaced,
            "rewrites": self.rewrites,
            "deleted": self.deleted,
            "latest_converged": self.latest_converged,
            "rewrite_converged": self.rewrite_converged,
            "critical_edges": self.critical_edges.iter().map(|e| json!({
                "pred": e.pred.0,
                "block": e.block.0,
                "expr": e.expr.0,
            })).collect::<Vec<_>>(),
            "earliest": set_to_json(&self.earliest),
            "latest_in": set_to_json(&self.latest_in),
            "insert": set_to_json(&self.insert),
        })
    }

    /// One-line human-readable summary.
    pub fn to_text(&self) -> String {
        format!(
            "lcm: inserted {} (reused {}), replaced {}, rewrote {} operands, deleted {}, {} critical edge(s){}",
            self.inserted,
            self.reused,
            self.replaced,
            self.rewrites,
            self.deleted,
            self.critical_edges.len(),
            if self.latest_converged && self.rewrite_converged {
                ""
            } else {
                " [did not converge]"
            }
        )
    }
}

// =============================================================================
// The pass
// =============================================================================

/// Run lazy code motion over `func`.
///
/// `avail`, `antic`, and `used` must have been computed over the current
/// state of `func`, and `dom` likewise. The dominator tree is consulted,
/// never patched; when the result reports `changed`, the caller must treat
/// every prior analysis as invalidated.
pub fn run_lcm(
    func: &mut Function,
    avail: &AnalysisResult,
    antic: &AnalysisResult,
    used: &AnalysisResult,
    dom: &DomTree,
    config: &LcmConfig,
) -> LcmResult {
    let domain = &avail.domain;
    let n = domain.len();
    if n == 0 {
        debug!(function = %func.name, "no binary expressions, nothing to move");
        return LcmResult::unchanged();
    }
    debug_assert_eq!(antic.domain.len(), n);
    debug_assert_eq!(used.domain.len(), n);

    // Snapshot the pre-existing computations before anything is placed;
    // temporaries must never land in their own replacement map.
    let originals: Vec<InstId> = func
        .block_ids()
        .flat_map(|b| func.block(b).insts.clone())
        .filter(|&id| domain.expr_of_inst(id).is_some())
        .collect();

    let earliest = compute_earliest(func, avail, antic, used);
    let (latest_in, latest_converged) = compute_latest_in(func, &earliest, used, n);
    let insert = compute_insert(func, &earliest, &latest_in, n);
    let critical_edges = find_critical_edges(func, avail, antic, domain);

    let mut result = LcmResult {
        latest_converged,
        critical_edges,
        ..LcmResult::unchanged()
    };

    // Phase: placement.
    let placement_sets = match config.mode {
        InsertMode::Earliest => &earliest,
        InsertMode::Latest => &insert,
    };
    let mut temps: Vec<(ExprId, InstId)> = Vec::new();
    let blocks: Vec<BlockId> = func.block_ids().collect();
    for &block in &blocks {
        let Some(selected) = placement_sets.get(&block) else {
            continue;
        };
        for idx in selected.clone().iter() {
            let expr_id = ExprId(idx);
            let expr = domain.expr(expr_id);

            // Adopt an existing computation exposed at the block head.
            let mut adopted = None;
            for &inst_id in &func.block(block).insts {
                if domain.expr_of_inst(inst_id) == Some(expr_id) {
                    adopted = Some(inst_id);
                    break;
                }
                let kind = &func.inst(inst_id).kind;
                if kind.defines_trackable_value() && expr.uses(Value::Inst(inst_id)) {
                    break;
                }
            }
            if let Some(inst_id) = adopted {
                debug!(block = ?block, inst = ?inst_id, expr = %expr, "adopting existing computation");
                temps.push((expr_id, inst_id));
                result.reused += 1;
                continue;
            }

            let position = func.first_non_phi_position(block);
            let Some(&anchor) = func.block(block).insts.get(position) else {
                continue;
            };
            if !dom.value_dominates(func, expr.lhs, anchor)
                || !dom.value_dominates(func, expr.rhs, anchor)
            {
                debug!(
                    block = ?block,
                    expr = %expr,
                    "skipping insertion, operand does not dominate the placement point"
                );
                continue;
            }
            let temp = func.insert_inst_at(
                block,
                position,
                InstKind::Binary {
                    op: expr.op,
                    lhs: expr.lhs,
                    rhs: expr.rhs,
                },
            );
            debug!(block = ?block, temp = ?temp, expr = %expr, "inserted temporary");
            temps.push((expr_id, temp));
            result.inserted += 1;
            result.changed = true;
        }
    }

    // Phase: build the replacement map, preferring the highest dominating
    // temporary so chains collapse toward the hoisted computation.
    let mut replacements: FxHashMap<InstId, Value> = FxHashMap::default();
    for &orig in &originals {
        let Some(idx) = domain.expr_of_inst(orig) else {
            continue;
        };
        let mut best: Option<InstId> = None;
        for &(expr_id, temp) in &temps {
            if expr_id != idx || temp == orig {
                continue;
            }
            if !dom.dominates_inst(func, temp, orig) {
                continue;
            }
            best = match best {
                None => Some(temp),
                Some(current) => {
                    let temp_block = func.inst(temp).block;
                    let current_block = func.inst(current).block;
                    if dom.dominates_blocks(temp_block, current_block) {
                        Some(temp)
                    } else {
                        Some(current)
                    }
                }
            };
        }
        if let Some(best) = best {
            replacements.insert(orig, Value::Inst(best));
        }
    }
    result.replaced = replacements.len();

    // Phase: rewrite uses and sweep the dead originals.
    let outcome = rewrite::apply_replacements(func, dom, &replacements, config.max_rewrite_passes);
    result.rewrites = outcome.rewrites;
    result.rewrite_converged = outcome.converged;
    if outcome.rewrites > 0 {
        result.changed = true;
    }
    result.deleted = rewrite::delete_dead_originals(func, &replacements);
    if result.deleted > 0 {
        result.changed = true;
    }

    result.earliest = earliest;
    result.latest_in = latest_in;
    result.insert = insert;
    debug!(function = %func.name, "{}", result.to_text());
    result
}

/// Convenience driver: validate, run the three prerequisite analyses and
/// the dominator computation, then apply the pass.
pub fn optimize(func: &mut Function, config: &LcmConfig) -> Result<LcmResult> {
    func.validate()?;
    let avail = compute_available(func);
    let antic = compute_anticipated(func);
    let used = compute_used(func);
    let dom = DomTree::compute(func);
    Ok(run_lcm(func, &avail, &antic, &used, &dom, config))
}

// =============================================================================
// Set derivations
// =============================================================================

fn compute_earliest(
    func: &Function,
    avail: &AnalysisResult,
    antic: &AnalysisResult,
    used: &AnalysisResult,
) -> FxHashMap<BlockId, BitSet> {
    let mut earliest = FxHashMap::default();
    for block in func.block_ids() {
        let mut e = avail.in_of(block).clone();
        e.flip();
        e.union_with(used.in_of(block));
        e.intersect_with(antic.in_of(block));
        earliest.insert(block, e);
    }
    earliest
}

fn compute_latest_in(
    func: &Function,
    earliest: &FxHashMap<BlockId, BitSet>,
    used: &AnalysisResult,
    n: usize,
) -> (FxHashMap<BlockId, BitSet>, bool) {
    let mut latest_in: FxHashMap<BlockId, BitSet> =
        func.block_ids().map(|b| (b, BitSet::full(n))).collect();
    let cap = 2 * func.num_blocks() + 10;
    let mut sweeps = 0;
    loop {
        sweeps += 1;
        let mut changed = false;
        for block in func.block_ids() {
            let mut meet = BitSet::full(n);
            for &pred in func.predecessors(block) {
                meet.intersect_with(&latest_in[&pred]);
            }
            let mut new_latest = earliest[&block].clone();
            new_latest.union_with(used.in_of(block));
            new_latest.intersect_with(&meet);
            if new_latest != latest_in[&block] {
                latest_in.insert(block, new_latest);
                changed = true;
            }
        }
        if !changed {
            return (latest_in, true);
        }
        if sweeps >= cap {
            warn!(sweeps, "LATEST_IN solve hit its iteration cap");
            return (latest_in, false);
        }
    }
}

fn compute_insert(
    func: &Function,
    earliest: &FxHashMap<BlockId, BitSet>,
    latest_in: &FxHashMap<BlockId, BitSet>,
    n: usize,
) -> FxHashMap<BlockId, BitSet> {
    let mut insert = FxHashMap::default();
    for block in func.block_ids() {
        let preds = func.predecessors(block);
        let mut pred_lacks = BitSet::with_capacity(n);
        if preds.is_empty() {
            pred_lacks.fill();
        } else {
            for &pred in preds {
                let mut not_latest = latest_in[&pred].clone();
                not_latest.flip();
                pred_lacks.union_with(&not_latest);
            }
        }
        let mut ins = earliest[&block].clone();
        ins.union_with(&pred_lacks);
        ins.intersect_with(&latest_in[&block]);
        insert.insert(block, ins);
    }
    insert
}

fn find_critical_edges(
    func: &Function,
    avail: &AnalysisResult,
    antic: &AnalysisResult,
    domain: &ExprDomain,
) -> Vec<CriticalEdge> {
    let mut edges = Vec::new();
    for block in func.block_ids() {
        let preds = func.predecessors(block);
        if preds.len() < 2 {
            continue;
        }
        for (idx, expr) in domain.iter() {
            if !antic.in_of(block).contains(idx.0) || avail.in_of(block).contains(idx.0) {
                continue;
            }
            for &pred in preds {
                if func.successors(pred).len() >= 2 {
                    warn!(
                        pred = ?pred,
                        block = ?block,
                        expr = %expr,
                        "critical edge blocks optimal placement"
                    );
                    edges.push(CriticalEdge {
                        pred,
                        block,
                        expr: idx,
                    });
                }
            }
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataflow::test_utils::{create_conditional_cfg, create_rotated_loop_cfg};
    use crate::ir::{FunctionBuilder, Opcode};

    fn count_computations(func: &Function, op: Opcode, lhs: Value, rhs: Value) -> usize {
        func.block_ids()
            .flat_map(|b| func.block(b).insts.clone())
            .filter(|&id| {
                matches!(
                    func.inst(id).kind,
                    InstKind::Binary { op: o, lhs: l, rhs: r } if o == op && l == lhs && r == rhs
                )
            })
            .count()
    }

    #[test]
    fn test_full_redundancy_collapses_to_one_computation() {
        let (mut f, [entry, _, _, merge]) = create_conditional_cfg();
        assert_eq!(
            count_computations(&f, Opcode::Add, Value::Param(0), Value::Param(1)),
            2
        );
        let result = optimize(&mut f, &LcmConfig::default()).unwrap();
        assert!(result.changed);
        assert_eq!(result.deleted, 1);
        assert_eq!(
            count_computations(&f, Opcode::Add, Value::Param(0), Value::Param(1)),
            1
        );
        // The surviving computation is the one in the entry block.
        let survivor = func_add_inst(&f).unwrap();
        assert_eq!(f.inst(survivor).block, entry);
        // The merge no longer computes it.
        assert!(f
            .block(merge)
            .insts
            .iter()
            .all(|&id| { f.inst(id).kind != make_add() }));
        f.validate().unwrap();
    }

    fn make_add() -> InstKind {
        InstKind::Binary {
            op: Opcode::Add,
            lhs: Value::Param(0),
            rhs: Value::Param(1),
        }
    }

    fn func_add_inst(f: &Function) -> Option<InstId> {
        f.block_ids()
            .flat_map(|b| f.block(b).insts.clone())
            .find(|&id| f.inst(id).kind == make_add())
    }

    #[test]
    fn test_loop_invariant_hoisted_to_preheader() {
        let (mut f, [entry, body, _exit]) = create_rotated_loop_cfg();
        let result = optimize(&mut f, &LcmConfig::default()).unwrap();
        assert!(result.changed);
        assert_eq!(result.inserted, 1);
        assert_eq!(
            count_computations(&f, Opcode::Add, Value::Param(0), Value::Param(1)),
            1
        );
        let survivor = func_add_inst(&f).unwrap();
        assert_eq!(f.inst(survivor).block, entry);
        assert_ne!(f.inst(survivor).block, body);
        f.validate().unwrap();
    }

    #[test]
    fn test_empty_domain_is_a_noop() {
        let mut b = FunctionBuilder::new("no_exprs", 1);
        b.block("entry");
        let c = b.copy(Value::Param(0)).unwrap();
        b.ret(Some(c)).unwrap();
        let mut f = b.finish().unwrap();
        let result = optimize(&mut f, &LcmConfig::default()).unwrap();
        assert!(!result.changed);
        assert!(result.latest_converged);
        assert!(result.earliest.is_empty());
    }

    #[test]
    fn test_placement_sets_honor_safety() {
        let (f, _) = create_conditional_cfg();
        let avail = compute_available(&f);
        let antic = compute_anticipated(&f);
        let used = compute_used(&f);
        let dom = DomTree::compute(&f);
        let mut f = f;
        let result = run_lcm(&mut f, &avail, &antic, &used, &dom, &LcmConfig::default());

        for block in f.block_ids() {
            // EARLIEST is gated by anticipation, and INSERT never exceeds
            // LATEST_IN, so insertions stay on paths that already computed
            // the expression.
            assert!(result.earliest[&block].is_subset_of(antic.in_of(block)));
            assert!(result.insert[&block].is_subset_of(&result.latest_in[&block]));
        }
    }

    #[test]
    fn test_earliest_mode_also_collapses_redundancy() {
        let (mut f, _) = create_conditional_cfg();
        let config = LcmConfig {
            mode: InsertMode::Earliest,
            ..LcmConfig::default()
        };
        let result = optimize(&mut f, &config).unwrap();
        assert!(result.changed);
        assert_eq!(
            count_computations(&f, Opcode::Add, Value::Param(0), Value::Param(1)),
            1
        );
        f.validate().unwrap();
    }
}
