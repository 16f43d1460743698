//! Block-oriented interchange form.
//!
//! Flattens a [`Lift`] into plain serializable data: basic blocks indexed
//! by position, instructions indexed within their block, and phi slots
//! with one operand per incoming edge. References to phi slots are
//! encoded as negative indices (`~i` for phi `i`), so every `consumes`
//! entry is a single integer.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::ir::{AbstractValue, ConstValue, ScratchKey, ValueId};
use crate::lift::Lift;

/// Index of a block in [`BasicBlockProgram::basic_blocks`].
pub type BlockIndex = usize;

/// Index of an instruction within one block, or `!i` for the block's
/// `i`-th phi.
pub type InsnIndex = i64;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BasicBlockProgram {
    pub entrypoint: BlockIndex,
    pub basic_blocks: Vec<BasicBlock>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BasicBlock {
    pub incoming_edges: Vec<BlockIndex>,
    pub outgoing_edges: Vec<BlockIndex>,
    /// `phis[i][j]` is the operand of the `i`-th phi when control arrives
    /// from `incoming_edges[j]`, as an instruction index in that
    /// predecessor block.
    pub phis: Vec<Vec<InsnIndex>>,
    pub instructions: Vec<Instruction>,
    /// `switch`, `exit`, or a synthetic `jmp` when the block simply flows
    /// into its single successor.
    pub terminal: Instruction,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Instruction {
    pub op: String,
    pub args: Vec<Value>,
    pub consumes: Vec<InsnIndex>,
}

/// Operation-specific immediate arguments.
fn instruction_args(value: &AbstractValue) -> Vec<Value> {
    match value {
        AbstractValue::Const { ty, value } => {
            let literal = match value {
                ConstValue::Uint(n) => json!(n),
                ConstValue::Sym(s) | ConstValue::Bytes(s) => json!(s),
            };
            vec![json!(ty.to_string()), literal]
        }
        AbstractValue::Cast { ty, .. } => vec![json!(ty.to_string())],
        AbstractValue::Hash { algo, .. } => vec![json!(algo.name())],
        AbstractValue::SubstringImm { start, end, .. } => vec![json!(start), json!(end)],
        AbstractValue::ExtConst { ty, name, .. } => {
            vec![json!(ty.to_string()), json!(name)]
        }
        AbstractValue::GlobalLoad { .. } => vec![json!("global")],
        AbstractValue::LocalLoad { .. } => vec![json!("local")],
        AbstractValue::ScratchLoad { key, .. } => match key {
            ScratchKey::Static(slot) => vec![json!("scratch"), json!(slot)],
            ScratchKey::Dynamic(_) => vec![json!("scratch")],
        },
        AbstractValue::SequencePoint { label, .. } => vec![json!(label)],
        AbstractValue::Exit { kind, .. } => vec![json!(kind)],
        AbstractValue::Call { proc, .. } => vec![json!(proc)],
        AbstractValue::CallResult { index, .. } => vec![json!(index)],
        AbstractValue::Arg { index } => vec![json!(index)],
        _ => vec![],
    }
}

/// Flatten a finished lift into the interchange form.
pub fn encode(lift: &Lift) -> BasicBlockProgram {
    let block_index: HashMap<_, _> = lift
        .regions
        .iter()
        .enumerate()
        .map(|(idx, (region_id, _))| (region_id, idx))
        .collect();

    // Per-block instruction numbering. Phis count downward (-1, -2, ...),
    // instructions upward; control nodes get no number.
    let mut local_index: HashMap<ValueId, InsnIndex> = HashMap::new();
    for (_, info) in lift.regions.iter() {
        let mut next = 0;
        let mut next_phi = -1;
        for id in &info.values {
            let value = lift.values.get(*id);
            if matches!(value, AbstractValue::Phi { .. }) {
                local_index.insert(*id, next_phi);
                next_phi -= 1;
            } else if value.is_control() {
                continue;
            } else {
                local_index.insert(*id, next);
                next += 1;
            }
        }
    }

    // Every data operand must be indexed; a miss means the engine leaked
    // a control node or a foreign value into an operand list.
    let indexed = |name: &str, id: ValueId| -> InsnIndex {
        match local_index.get(&id) {
            Some(idx) => *idx,
            None => panic!("internal error: operand `{name}` ({id}) has no instruction index"),
        }
    };
    let consumes_of = |value: &AbstractValue| -> Vec<InsnIndex> {
        value
            .operands()
            .iter()
            .map(|(name, id)| indexed(name, *id))
            .collect()
    };

    let mut blocks: Vec<BasicBlock> = lift
        .regions
        .iter()
        .map(|(_, info)| {
            let mut instructions = Vec::new();
            let mut terminal = None;
            for id in &info.values {
                let value = lift.values.get(*id);
                if value.is_terminal() {
                    terminal = Some(Instruction {
                        op: value.op_name().to_string(),
                        args: instruction_args(value),
                        consumes: consumes_of(value),
                    });
                } else if !value.is_control() {
                    instructions.push(Instruction {
                        op: value.op_name().to_string(),
                        args: instruction_args(value),
                        consumes: consumes_of(value),
                    });
                }
            }
            BasicBlock {
                incoming_edges: Vec::new(),
                outgoing_edges: info
                    .successors
                    .iter()
                    .map(|succ| block_index[succ])
                    .collect(),
                phis: Vec::new(),
                instructions,
                terminal: terminal.unwrap_or(Instruction {
                    op: "jmp".to_string(),
                    args: vec![],
                    consumes: vec![],
                }),
            }
        })
        .collect();

    // Incoming edges, in the same region-traversal order the engine used
    // to wire phi operands; `phis[i][j]` aligns with `incoming_edges[j]`.
    for (source, (_, info)) in lift.regions.iter().enumerate() {
        for succ in &info.successors {
            blocks[block_index[succ]].incoming_edges.push(source);
        }
    }

    for (idx, (region_id, info)) in lift.regions.iter().enumerate() {
        let mut phis = Vec::with_capacity(info.phis.len());
        for phi in &info.phis {
            let operands = match lift.values.get(*phi) {
                AbstractValue::Phi { operands, .. } => operands,
                _ => continue,
            };
            let row = operands
                .iter()
                .map(|(_, value)| indexed("phi operand", *value))
                .collect();
            phis.push(row);
        }
        debug_assert_eq!(block_index[&region_id], idx);
        blocks[idx].phis = phis;
    }

    BasicBlockProgram {
        entrypoint: 0,
        basic_blocks: blocks,
    }
}
