//! Textual rendering of functions, blocks, and instructions.
//!
//! The output is for diagnostics and test assertions, not a parseable
//! serialization; `serde` handles that.

use std::fmt::Write as _;

use crate::ir::types::{Function, Inst, InstId, InstKind, Value};

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Const(c) => write!(f, "{}", c),
            Value::Param(i) => write!(f, "%p{}", i),
            Value::Inst(id) => write!(f, "%{}", id.0),
        }
    }
}

/// Render one instruction in "result = op operands" form.
pub fn inst_to_text(func: &Function, id: InstId) -> String {
    let inst: &Inst = func.inst(id);
    match &inst.kind {
        InstKind::Binary { op, lhs, rhs } => format!("%{} = {} {} {}", id.0, lhs, op, rhs),
        InstKind::Cmp { op, lhs, rhs } => format!("%{} = cmp {} {} {}", id.0, lhs, op, rhs),
        InstKind::Copy { src } => format!("%{} = copy {}", id.0, src),
        InstKind::Phi { incoming } => {
            let mut s = format!("%{} = phi", id.0);
            for (i, (block, value)) in incoming.iter().enumerate() {
                let sep = if i == 0 { " " } else { ", " };
                let _ = write!(s, "{}[{}: {}]", sep, func.block(*block).label, value);
            }
            s
        }
        InstKind::Store { slot, value } => format!("store @{} <- {}", slot, value),
        InstKind::Br { dest } => format!("br {}", func.block(*dest).label),
        InstKind::CondBr {
            cond,
            then_dest,
            else_dest,
        } => format!(
            "br {} ? {} : {}",
            cond,
            func.block(*then_dest).label,
            func.block(*else_dest).label
        ),
        InstKind::Ret { value: Some(v) } => format!("ret {}", v),
        InstKind::Ret { value: None } => "ret".to_string(),
        InstKind::Removed => format!("%{} = <removed>", id.0),
    }
}

impl std::fmt::Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "fn {}({} params) {{", self.name, self.num_params)?;
        for block_id in self.block_ids() {
            let block = self.block(block_id);
            writeln!(f, "{}:", block.label)?;
            for &inst_id in &block.insts {
                writeln!(f, "  {}", inst_to_text(self, inst_id))?;
            }
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::FunctionBuilder;
    use crate::ir::types::Opcode;

    #[test]
    fn test_renders_binary_and_ret() {
        let mut b = FunctionBuilder::new("tiny", 2);
        b.block("entry");
        let sum = b.binary(Opcode::Add, Value::Param(0), Value::Param(1)).unwrap();
        b.ret(Some(sum)).unwrap();
        let f = b.finish().unwrap();

        let text = f.to_string();
        assert!(text.contains("fn tiny(2 params)"));
        assert!(text.contains("%0 = %p0 + %p1"));
        assert!(text.contains("ret %0"));
    }

    #[test]
    fn test_renders_phi_with_block_labels() {
        let mut b = FunctionBuilder::new("phi", 0);
        let a = b.block("a");
        let c = b.block("c");
        b.switch_to(a);
        b.br(c).unwrap();
        b.switch_to(c);
        b.phi(vec![(a, Value::Const(3))]).unwrap();
        b.ret(None).unwrap();
        let f = b.finish().unwrap();

        let text = f.to_string();
        assert!(text.contains("phi [a: 3]"));
    }
}
