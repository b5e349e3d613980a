//! Generic worklist fixed-point solver.
//!
//! One engine runs all four analyses. A client picks a direction, a boundary
//! value for the graph edge of the CFG (entry for forward, exits for
//! backward), an initial value for every other point, a meet operator with
//! its identity, and a per-block transfer function. The engine then iterates
//! to a fixed point with a FIFO worklist and a pending set to avoid
//! duplicate queue entries.
//!
//! Facts are [`BitSet`]s over a caller-defined domain. Transfer functions
//! are closures, so a client can capture other analysis results (the
//! postponable analysis injects its kill sets that way).

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::dataflow::bitset::BitSet;
use crate::ir::{BlockId, Function};

/// Direction of propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Facts flow from predecessors to successors; transfer maps IN to OUT.
    Forward,
    /// Facts flow from successors to predecessors; transfer maps OUT to IN.
    Backward,
}

/// Constant lattice values used for boundary and initial states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitValue {
    /// The empty set.
    Empty,
    /// The full universe.
    All,
}

impl InitValue {
    fn make(self, capacity: usize) -> BitSet {
        match self {
            InitValue::Empty => BitSet::with_capacity(capacity),
            InitValue::All => BitSet::full(capacity),
        }
    }
}

/// Per-block dataflow state. `input` is IN[B] and `output` is OUT[B]
/// regardless of direction.
#[derive(Debug, Clone)]
pub struct BlockState {
    pub input: BitSet,
    pub output: BitSet,
}

/// Worklist dataflow solver over one function.
#[derive(Debug)]
pub struct Dataflow {
    direction: Direction,
    boundary: InitValue,
    initial: InitValue,
    states: FxHashMap<BlockId, BlockState>,
    iterations: usize,
}

impl Dataflow {
    /// Create a solver; `run` does the actual work.
    pub fn new(direction: Direction, boundary: InitValue, initial: InitValue) -> Self {
        Self {
            direction,
            boundary,
            initial,
            states: FxHashMap::default(),
            iterations: 0,
        }
    }

    /// Solve to a fixed point.
    ///
    /// `meet` folds a neighbor's fact into the accumulator; `meet_identity`
    /// seeds the fold (full set for intersection, empty set for union).
    /// `transfer` maps a block's incoming fact to its outgoing fact, where
    /// "incoming" is IN for forward and OUT for backward analyses.
    ///
    /// A zero-sized domain is a successful no-op: every block gets empty
    /// IN/OUT sets and no iteration happens.
    pub fn run<M, T>(
        &mut self,
        func: &Function,
        domain_size: usize,
        meet_identity: InitValue,
        meet: M,
        mut transfer: T,
    ) where
        M: Fn(&mut BitSet, &BitSet),
        T: FnMut(BlockId, &BitSet) -> BitSet,
    {
        self.states.clear();
        self.iterations = 0;

        for block in func.block_ids() {
            self.states.insert(
                block,
                BlockState {
                    input: self.initial.make(domain_size),
                    output: self.initial.make(domain_size),
                },
            );
        }
        if domain_size == 0 {
            debug!("dataflow domain is empty, nothing to solve");
            return;
        }

        // Pin the boundary: entry IN for forward, every exit OUT for backward.
        match self.direction {
            Direction::Forward => {
                if let Some(state) = self.states.get_mut(&func.entry()) {
                    state.input = self.boundary.make(domain_size);
                }
            }
            Direction::Backward => {
                for block in func.block_ids() {
                    if func.is_exit(block) {
                        if let Some(state) = self.states.get_mut(&block) {
                            state.output = self.boundary.make(domain_size);
                        }
                    }
                }
            }
        }

        let mut worklist: VecDeque<BlockId> = match self.direction {
            Direction::Forward => func.block_ids().collect(),
            Direction::Backward => func.block_ids().rev().collect(),
        };
        let mut pending: FxHashSet<BlockId> = worklist.iter().copied().collect();

        while let Some(block) = worklist.pop_front() {
            pending.remove(&block);
            self.iterations += 1;

            match self.direction {
                Direction::Forward => {
                    let preds = func.predecessors(block);
                    let input = if preds.is_empty() {
                        self.states[&block].input.clone()
                    } else {
                        let mut acc = meet_identity.make(domain_size);
                        for pred in preds {
                            meet(&mut acc, &self.states[pred].output);
                        }
                        acc
                    };
                    let output = transfer(block, &input);
                    let changed = output != self.states[&block].output;
                    if let Some(state) = self.states.get_mut(&block) {
                        state.input = input;
                        state.output = output;
                    }
                    if changed {
                        for &succ in func.successors(block) {
                            if pending.insert(succ) {
                                worklist.push_back(succ);
                            }
                        }
                    }
                }
                Direction::Backward => {
                    let succs = func.successors(block);
                    let output = if succs.is_empty() {
                        self.states[&block].output.clone()
                    } else {
                        let mut acc = meet_identity.make(domain_size);
                        for succ in succs {
                            meet(&mut acc, &self.states[succ].input);
                        }
                        acc
                    };
                    let input = transfer(block, &output);
                    let changed = input != self.states[&block].input;
                    if let Some(state) = self.states.get_mut(&block) {
                        state.input = input;
                        state.output = output;
                    }
                    if changed {
                        for &pred in func.predecessors(block) {
                            if pending.insert(pred) {
                                worklist.push_back(pred);
                            }
                        }
                    }
                }
            }
        }
        debug!(
            direction = ?self.direction,
            iterations = self.iterations,
            "dataflow converged"
        );
    }

    /// State of one block, if the solver has run over it.
    pub fn state(&self, block: BlockId) -> Option<&BlockState> {
        self.states.get(&block)
    }

    /// Number of block visits the solve took.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Consume the solver and take the per-block states.
    pub fn into_states(self) -> FxHashMap<BlockId, BlockState> {
        self.states
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, Opcode, Value};

    /// entry -> mid -> tail, one bit that "mid" generates.
    fn straight_line() -> Function {
        let mut b = FunctionBuilder::new("straight", 0);
        let entry = b.block("entry");
        let mid = b.block("mid");
        let tail = b.block("tail");
        b.switch_to(entry);
        b.br(mid).unwrap();
        b.switch_to(mid);
        b.binary(Opcode::Add, Value::Const(1), Value::Const(2)).unwrap();
        b.br(tail).unwrap();
        b.switch_to(tail);
        b.ret(None).unwrap();
        b.finish().unwrap()
    }

    #[test]
    fn test_forward_propagation_with_gen() {
        let f = straight_line();
        let mid = crate::ir::BlockId(1);
        let mut df = Dataflow::new(Direction::Forward, InitValue::Empty, InitValue::Empty);
        df.run(
            &f,
            1,
            InitValue::All,
            |acc, other| acc.intersect_with(other),
            |block, input| {
                let mut out = input.clone();
                if block == mid {
                    out.insert(0);
                }
                out
            },
        );
        assert!(!df.state(crate::ir::BlockId(0)).unwrap().output.contains(0));
        assert!(df.state(mid).unwrap().output.contains(0));
        assert!(df.state(crate::ir::BlockId(2)).unwrap().input.contains(0));
    }

    #[test]
    fn test_backward_boundary_pins_exit() {
        let f = straight_line();
        let mut df = Dataflow::new(Direction::Backward, InitValue::Empty, InitValue::All);
        df.run(
            &f,
            1,
            InitValue::All,
            |acc, other| acc.intersect_with(other),
            |_, output| output.clone(),
        );
        // Identity transfer drains the optimistic ALL through the empty exit.
        for block in f.block_ids() {
            assert!(df.state(block).unwrap().input.is_empty());
        }
    }

    #[test]
    fn test_zero_domain_is_noop() {
        let f = straight_line();
        let mut df = Dataflow::new(Direction::Forward, InitValue::Empty, InitValue::All);
        df.run(
            &f,
            0,
            InitValue::All,
            |acc, other| acc.intersect_with(other),
            |_, input| input.clone(),
        );
        assert_eq!(df.iterations(), 0);
        for block in f.block_ids() {
            let state = df.state(block).unwrap();
            assert!(state.input.is_empty());
            assert!(state.output.is_empty());
        }
    }

    #[test]
    fn test_loop_reaches_fixed_point() {
        // entry -> head; head -> head | exit.
        let mut b = FunctionBuilder::new("looped", 1);
        let entry = b.block("entry");
        let head = b.block("head");
        let exit = b.block("exit");
        b.switch_to(entry);
        b.br(head).unwrap();
        b.switch_to(head);
        let c = b
            .cmp(crate::ir::CmpOp::Lt, Value::Const(0), Value::Param(0))
            .unwrap();
        b.cond_br(c, head, exit).unwrap();
        b.switch_to(exit);
        b.ret(None).unwrap();
        let f = b.finish().unwrap();

        let mut df = Dataflow::new(Direction::Forward, InitValue::Empty, InitValue::All);
        df.run(
            &f,
            2,
            InitValue::All,
            |acc, other| acc.intersect_with(other),
            |block, input| {
                let mut out = input.clone();
                if block == head {
                    out.insert(1);
                }
                out
            },
        );
        // Entry boundary is empty, so bit 0 (generated nowhere) must not
        // survive the loop meet even though states start optimistic.
        assert!(!df.state(head).unwrap().input.contains(0));
        assert!(df.state(exit).unwrap().input.contains(1));
        assert!(df.iterations() >= f.num_blocks());
    }
}
