//! Human-readable renderings of the interchange form.
//!
//! The text format names every value `%block_idx` (phis as
//! `%block_phi_i`), lists phi operands as `on_pred=%pred_idx`, and ends
//! each block with its terminal followed by `#dest` edges.

use std::fmt::Write;

use serde_json::Value;

use crate::export::{BasicBlock, BasicBlockProgram, BlockIndex, InsnIndex};

fn format_ref(block: BlockIndex, index: InsnIndex) -> String {
    if index < 0 {
        format!("%{block}_phi_{}", !index)
    } else {
        format!("%{block}_{index}")
    }
}

/// Immediate arguments print bare: strings without quotes, numbers as-is.
fn format_arg(arg: &Value) -> String {
    match arg {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn format_block(out: &mut String, program: &BasicBlockProgram, idx: BlockIndex) {
    let block: &BasicBlock = &program.basic_blocks[idx];
    let _ = writeln!(out, "#{idx}:");

    for (phi_idx, operands) in block.phis.iter().enumerate() {
        let _ = write!(out, "  {} = phi", format_ref(idx, !(phi_idx as InsnIndex)));
        for (edge, operand) in block.incoming_edges.iter().zip(operands) {
            let _ = write!(out, " on_{edge}={}", format_ref(*edge, *operand));
        }
        let _ = writeln!(out);
    }

    let mut insn_idx: InsnIndex = 0;
    for insn in &block.instructions {
        // Effect markers produce no value, so they carry no assignment.
        if insn.op == "sequence_point" {
            let _ = write!(out, "  sequence_point");
        } else {
            let _ = write!(out, "  {} = {}", format_ref(idx, insn_idx), insn.op);
            insn_idx += 1;
        }
        for arg in &insn.args {
            let _ = write!(out, " {}", format_arg(arg));
        }
        for consumed in &insn.consumes {
            let _ = write!(out, " {}", format_ref(idx, *consumed));
        }
        let _ = writeln!(out);
    }

    let _ = write!(out, "  {}", block.terminal.op);
    for arg in &block.terminal.args {
        let _ = write!(out, " {}", format_arg(arg));
    }
    for consumed in &block.terminal.consumes {
        let _ = write!(out, " {}", format_ref(idx, *consumed));
    }
    for destination in &block.outgoing_edges {
        let _ = write!(out, " #{destination}");
    }
    let _ = writeln!(out);
}

/// Render the whole program as text.
pub fn format_program(program: &BasicBlockProgram) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "entrypoint #{}", program.entrypoint);
    for idx in 0..program.basic_blocks.len() {
        format_block(&mut out, program, idx);
    }
    out
}

/// Render the control-flow graph in Graphviz dot syntax, one box per
/// block with its listing as the label.
pub fn format_dot(program: &BasicBlockProgram) -> String {
    let mut out = String::new();
    out.push_str("digraph program {\n");
    out.push_str("  rankdir=TB;\n");
    out.push_str("  node [shape=box, fontname=\"monospace\"];\n");

    for idx in 0..program.basic_blocks.len() {
        let mut listing = String::new();
        format_block(&mut listing, program, idx);
        let label: String = listing
            .lines()
            .map(|line| format!("{}\\l", line.replace('\\', "\\\\").replace('"', "\\\"")))
            .collect();
        let _ = writeln!(out, "  bb{idx} [label=\"{label}\"];");
    }
    for (idx, block) in program.basic_blocks.iter().enumerate() {
        for destination in &block.outgoing_edges {
            let _ = writeln!(out, "  bb{idx} -> bb{destination};");
        }
    }
    out.push_str("}\n");
    out
}
