//! Expression domain construction.
//!
//! All four analyses and the motion pass share one universe of expressions:
//! every distinct pure binary expression computed anywhere in the function,
//! numbered densely in first-occurrence order so block facts can be bit sets.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::ir::{Function, InstId, InstKind, Opcode, Value};

/// Dense index of an expression within a function's domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExprId(pub usize);

/// A pure binary expression, identified by operator and operand values.
///
/// Equality is structural and operand-order-sensitive: `a + b` and `b + a`
/// are distinct expressions even for commutative operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Expression {
    pub op: Opcode,
    pub lhs: Value,
    pub rhs: Value,
}

impl Expression {
    /// True if `value` is one of the expression's operands.
    #[inline]
    pub fn uses(&self, value: Value) -> bool {
        self.lhs == value || self.rhs == value
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op, self.rhs)
    }
}

/// The numbered expression universe of one function.
#[derive(Debug, Clone, Default)]
pub struct ExprDomain {
    exprs: Vec<Expression>,
    index: FxHashMap<Expression, ExprId>,
    /// Every binary instruction mapped to the expression it computes.
    inst_to_expr: FxHashMap<InstId, ExprId>,
}

impl ExprDomain {
    /// Scan `func` and number every distinct binary expression in
    /// first-occurrence order (blocks in creation order, instructions in
    /// block order), so numbering is deterministic.
    pub fn build(func: &Function) -> Self {
        let mut domain = ExprDomain::default();
        for block_id in func.block_ids() {
            for &inst_id in &func.block(block_id).insts {
                if let InstKind::Binary { op, lhs, rhs } = func.inst(inst_id).kind {
                    let expr = Expression { op, lhs, rhs };
                    let next = ExprId(domain.exprs.len());
                    let id = *domain.index.entry(expr).or_insert_with(|| {
                        domain.exprs.push(expr);
                        next
                    });
                    domain.inst_to_expr.insert(inst_id, id);
                }
            }
        }
        domain
    }

    /// Number of distinct expressions.
    #[inline]
    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    /// True when the function computes no binary expressions at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    /// Look up the index of an expression.
    #[inline]
    pub fn index_of(&self, expr: &Expression) -> Option<ExprId> {
        self.index.get(expr).copied()
    }

    /// The expression at a given index.
    #[inline]
    pub fn expr(&self, id: ExprId) -> Expression {
        self.exprs[id.0]
    }

    /// The expression computed by a binary instruction, if any.
    #[inline]
    pub fn expr_of_inst(&self, inst: InstId) -> Option<ExprId> {
        self.inst_to_expr.get(&inst).copied()
    }

    /// Iterate over `(id, expression)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (ExprId, Expression)> + '_ {
        self.exprs
            .iter()
            .enumerate()
            .map(|(i, e)| (ExprId(i), *e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FunctionBuilder;

    #[test]
    fn test_dedupes_repeated_expressions() {
        let mut b = FunctionBuilder::new("dup", 2);
        b.block("entry");
        let x = b.binary(Opcode::Add, Value::Param(0), Value::Param(1)).unwrap();
        let y = b.binary(Opcode::Add, Value::Param(0), Value::Param(1)).unwrap();
        b.store(0, x).unwrap();
        b.ret(Some(y)).unwrap();
        let f = b.finish().unwrap();

        let domain = ExprDomain::build(&f);
        assert_eq!(domain.len(), 1);
        let (x_id, y_id) = (x.defining_inst().unwrap(), y.defining_inst().unwrap());
        assert_eq!(domain.expr_of_inst(x_id), Some(ExprId(0)));
        assert_eq!(domain.expr_of_inst(y_id), Some(ExprId(0)));
    }

    #[test]
    fn test_operand_order_is_significant() {
        let mut b = FunctionBuilder::new("order", 2);
        b.block("entry");
        b.binary(Opcode::Add, Value::Param(0), Value::Param(1)).unwrap();
        b.binary(Opcode::Add, Value::Param(1), Value::Param(0)).unwrap();
        b.ret(None).unwrap();
        let f = b.finish().unwrap();

        let domain = ExprDomain::build(&f);
        assert_eq!(domain.len(), 2);
    }

    #[test]
    fn test_non_binary_instructions_are_not_in_domain() {
        let mut b = FunctionBuilder::new("mixed", 2);
        b.block("entry");
        let c = b
            .cmp(crate::ir::CmpOp::Lt, Value::Param(0), Value::Param(1))
            .unwrap();
        let copied = b.copy(Value::Param(0)).unwrap();
        b.store(0, c).unwrap();
        b.ret(Some(copied)).unwrap();
        let f = b.finish().unwrap();

        let domain = ExprDomain::build(&f);
        assert!(domain.is_empty());
        assert_eq!(domain.expr_of_inst(c.defining_inst().unwrap()), None);
    }

    #[test]
    fn test_numbering_follows_first_occurrence() {
        let mut b = FunctionBuilder::new("numbered", 3);
        b.block("entry");
        b.binary(Opcode::Mul, Value::Param(1), Value::Param(2)).unwrap();
        b.binary(Opcode::Add, Value::Param(0), Value::Param(1)).unwrap();
        b.ret(None).unwrap();
        let f = b.finish().unwrap();

        let domain = ExprDomain::build(&f);
        assert_eq!(domain.expr(ExprId(0)).op, Opcode::Mul);
        assert_eq!(domain.expr(ExprId(1)).op, Opcode::Add);
        assert_eq!(
            domain.index_of(&Expression {
                op: Opcode::Add,
                lhs: Value::Param(0),
                rhs: Value::Param(1),
            }),
            Some(ExprId(1))
        );
    }
}
