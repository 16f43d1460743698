//! Line-oriented assembly parser.
//!
//! Produces the ordered instruction list the engine walks, plus the
//! label table. Instruction identity is position in the list; labels
//! attach to the operation line that follows them.

use std::collections::HashMap;

use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::ir::InsnId;
use crate::span::Span;

/// One operation line, with any labels that preceded it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedInstruction {
    pub operation: String,
    pub args: Vec<String>,
    pub labels: Vec<String>,
    /// 1-based source line.
    pub line: u32,
    pub span: Span,
}

/// Ordered instruction sequence; index is the instruction's identity.
#[derive(Debug)]
pub struct Program {
    pub filename: String,
    instructions: Vec<ParsedInstruction>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn insn(&self, id: InsnId) -> &ParsedInstruction {
        &self.instructions[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (InsnId, &ParsedInstruction)> {
        self.instructions
            .iter()
            .enumerate()
            .map(|(i, insn)| (InsnId(i), insn))
    }

    /// `file:line` of an instruction, used for diagnostics and for naming
    /// label-less regions.
    pub fn location(&self, id: InsnId) -> String {
        format!("{}:{}", self.filename, self.insn(id).line)
    }
}

/// Label name → first instruction carrying it.
pub type LabelMap = HashMap<String, InsnId>;

/// Mnemonics that end the instruction stream on their own.
fn is_exit_operation(operation: &str) -> bool {
    matches!(operation, "return" | "err" | "retsub")
}

/// Parse assembly text into a [`Program`].
///
/// Strips `//` comments and `#pragma` lines, binds label definitions to
/// the following operation, and appends an implicit `return` when the
/// source does not already end with an exit instruction so that every
/// program has a defined exit.
pub fn parse(file_id: u16, filename: &str, contents: &str) -> Result<Program, Diagnostic> {
    let mut instructions = Vec::new();
    let mut pending_labels: Vec<String> = Vec::new();
    let mut pending_span = Span::dummy();

    let mut offset = 0u32;
    for (line_idx, raw) in contents.lines().enumerate() {
        let line_start = offset;
        offset += raw.len() as u32 + 1;
        let linenum = line_idx as u32 + 1;

        let code = match raw.find("//") {
            Some(pos) => &raw[..pos],
            None => raw,
        };
        let code = code.trim();
        if code.is_empty() || code.starts_with("#pragma") {
            continue;
        }

        let indent = raw.len() - raw.trim_start().len();
        let span = Span::new(
            file_id,
            line_start + indent as u32,
            line_start + indent as u32 + code.len() as u32,
        );

        let mut tokens = code.split_whitespace();
        let head = match tokens.next() {
            Some(head) => head,
            None => continue,
        };

        if let Some(name) = head.strip_suffix(':') {
            pending_labels.push(name.to_string());
            pending_span = span;
            continue;
        }

        instructions.push(ParsedInstruction {
            operation: head.to_string(),
            args: tokens.map(str::to_string).collect(),
            labels: std::mem::take(&mut pending_labels),
            line: linenum,
            span,
        });
    }

    let ends_with_exit = instructions
        .last()
        .is_some_and(|insn| is_exit_operation(&insn.operation));
    if !ends_with_exit {
        // Implicit terminal: trailing labels bind to it.
        instructions.push(ParsedInstruction {
            operation: "return".to_string(),
            args: Vec::new(),
            labels: std::mem::take(&mut pending_labels),
            line: contents.lines().count() as u32 + 1,
            span: Span::new(file_id, offset, offset),
        });
    }

    if !pending_labels.is_empty() {
        return Err(Diagnostic::error(
            format!(
                "no operation found for label `{}`",
                pending_labels.join("`, `")
            ),
            pending_span,
        )
        .with_help("labels must be followed by an instruction".to_string()));
    }

    Ok(Program {
        filename: filename.to_string(),
        instructions,
    })
}

/// Walk the program and record the first instruction for each label name.
/// Redefinitions warn and keep the earlier binding.
pub fn gather_labels(program: &Program, diags: &mut Diagnostics) -> LabelMap {
    let mut labels = LabelMap::new();
    for (id, insn) in program.iter() {
        for label in &insn.labels {
            if let Some(previous) = labels.get(label) {
                diags.warn(
                    Diagnostic::warning(format!("label `{label}` redefined"), insn.span)
                        .with_note(format!(
                            "previous definition at {}",
                            program.location(*previous)
                        ))
                        .with_note("the earlier definition is kept".to_string()),
                );
                continue;
            }
            labels.insert(label.clone(), id);
        }
    }
    labels
}
