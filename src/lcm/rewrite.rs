//! Operand rewriting and dead-code cleanup after temporaries are placed.
//!
//! Replacements form a map from an original instruction to the value that
//! supersedes it. Because replaced instructions can themselves appear as
//! replacement targets, lookups chase chains to a fixed point, and the whole
//! rewrite runs in passes until no operand changes (bounded, since a
//! malformed map could otherwise ping-pong).

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::ir::{DomTree, Function, InstId, InstKind, Value};

/// Outcome of the bounded rewrite loop.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RewriteOutcome {
    /// Total operand updates applied across all passes.
    pub rewrites: usize,
    /// Number of passes taken.
    pub passes: usize,
    /// False when the pass budget ran out while changes were still landing.
    pub converged: bool,
}

/// Chase a replacement chain to its final value.
///
/// A cycle hands the original value back unchanged; rewriting an operand to
/// itself is a no-op, so this neutralizes the bad map entry instead of
/// looping.
pub(crate) fn resolve_replacement(
    start: InstId,
    replacements: &FxHashMap<InstId, Value>,
) -> Value {
    let mut current = Value::Inst(start);
    // A chain can visit each map entry at most once; anything longer cycles.
    for _ in 0..=replacements.len() {
        let Some(&next) = current.defining_inst().and_then(|i| replacements.get(&i)) else {
            return current;
        };
        if next == Value::Inst(start) {
            warn!(?start, "replacement cycle detected, keeping original value");
            return Value::Inst(start);
        }
        current = next;
    }
    current
}

/// Rewrite one operand slot if its final replacement is legal at `user`.
fn try_rewrite(
    func: &Function,
    dom: &DomTree,
    replacements: &FxHashMap<InstId, Value>,
    value: &mut Value,
    user: InstId,
) -> bool {
    let Some(def) = value.defining_inst() else {
        return false;
    };
    if !replacements.contains_key(&def) {
        return false;
    }
    let resolved = resolve_replacement(def, replacements);
    if resolved != *value && dom.value_dominates(func, resolved, user) {
        *value = resolved;
        true
    } else {
        false
    }
}

/// Run rewrite passes over the whole function until convergence or the
/// pass budget is exhausted.
///
/// Phi operands are special: the value flows in along an edge, so legality
/// is checked against the incoming predecessor's terminator rather than
/// against the phi itself.
pub(crate) fn apply_replacements(
    func: &mut Function,
    dom: &DomTree,
    replacements: &FxHashMap<InstId, Value>,
    max_passes: usize,
) -> RewriteOutcome {
    let mut outcome = RewriteOutcome {
        rewrites: 0,
        passes: 0,
        converged: false,
    };
    if replacements.is_empty() {
        outcome.converged = true;
        return outcome;
    }

    while outcome.passes < max_passes {
        outcome.passes += 1;
        let mut changed_this_pass = false;

        let inst_ids: Vec<InstId> = func
            .block_ids()
            .flat_map(|b| func.block(b).insts.clone())
            .collect();
        for inst_id in inst_ids {
            let mut kind = func.inst(inst_id).kind.clone();
            let mut touched = 0usize;
            match &mut kind {
                InstKind::Binary { lhs, rhs, .. } | InstKind::Cmp { lhs, rhs, .. } => {
                    touched += try_rewrite(func, dom, replacements, lhs, inst_id) as usize;
                    touched += try_rewrite(func, dom, replacements, rhs, inst_id) as usize;
                }
                InstKind::Copy { src } => {
                    touched += try_rewrite(func, dom, replacements, src, inst_id) as usize;
                }
                InstKind::Store { value, .. } => {
                    touched += try_rewrite(func, dom, replacements, value, inst_id) as usize;
                }
                InstKind::CondBr { cond, .. } => {
                    touched += try_rewrite(func, dom, replacements, cond, inst_id) as usize;
                }
                InstKind::Ret { value: Some(v) } => {
                    touched += try_rewrite(func, dom, replacements, v, inst_id) as usize;
                }
                InstKind::Phi { incoming } => {
                    for (pred, value) in incoming.iter_mut() {
                        let Some(edge_point) = func.terminator(*pred) else {
                            continue;
                        };
                        touched +=
                            try_rewrite(func, dom, replacements, value, edge_point) as usize;
                    }
                }
                InstKind::Br { .. } | InstKind::Ret { value: None } | InstKind::Removed => {}
            }
            if touched > 0 {
                func.inst_mut(inst_id).kind = kind;
                outcome.rewrites += touched;
                changed_this_pass = true;
            }
        }

        if !changed_this_pass {
            outcome.converged = true;
            break;
        }
    }
    if !outcome.converged {
        warn!(
            passes = outcome.passes,
            "operand rewriting hit its pass budget before converging"
        );
    }
    outcome
}

/// Delete replaced originals that ended up with no remaining uses.
///
/// Deleting one can strand another (a dead add whose operand was itself a
/// replaced add), so the sweep repeats until it stops making progress.
pub(crate) fn delete_dead_originals(
    func: &mut Function,
    replacements: &FxHashMap<InstId, Value>,
) -> usize {
    let mut candidates: Vec<InstId> = replacements.keys().copied().collect();
    candidates.sort();

    let mut deleted = 0;
    loop {
        let mut use_counts: FxHashMap<InstId, usize> = FxHashMap::default();
        for block in func.block_ids() {
            for &inst_id in &func.block(block).insts {
                for operand in func.inst(inst_id).kind.operands() {
                    if let Some(def) = operand.defining_inst() {
                        *use_counts.entry(def).or_insert(0) += 1;
                    }
                }
            }
        }

        let mut progress = false;
        for &orig in &candidates {
            if matches!(func.inst(orig).kind, InstKind::Removed) {
                continue;
            }
            if use_counts.get(&orig).copied().unwrap_or(0) == 0 {
                func.remove_inst(orig);
                deleted += 1;
                progress = true;
            }
        }
        if !progress {
            break;
        }
    }
    deleted
}
