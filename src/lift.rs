//! The abstract execution engine.
//!
//! Worklist-driven symbolic execution of the parsed program: discovers
//! regions from predecessor counts, seeds phi slots at merge points,
//! infers procedure arity through memoized recursive analysis, then runs
//! the two patch passes (merge-height invariant check, phi wiring).
//!
//! Everything here is deterministic: the worklist is LIFO, the arena and
//! region map iterate in insertion order, and no state outlives one call
//! to [`lift`].

use std::collections::HashMap;

use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::ir::{
    AbstractValue, Deps, InsnId, RegionId, RegionInfo, RegionMap, ValueArena, ValueId,
};
use crate::isa::{ExecContext, Jump, NextStep, Opcode, Target};
use crate::parser::{LabelMap, Program};
use crate::span::Span;

// ─── Public surface ───────────────────────────────────────────────

/// Engine configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct LiftOptions {
    /// Collapse `bnz`/`bz` with a compile-time constant condition into a
    /// plain jump instead of emitting a `switch`. Off by default: folding
    /// changes the region shape of the program.
    pub fold_constant_branches: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionStatus {
    InProgress,
    Done,
}

/// Inferred procedure signature, keyed by entry instruction.
#[derive(Clone, Copy, Debug)]
pub struct FunctionInfo {
    pub status: FunctionStatus,
    /// How deep the procedure reaches into its caller's stack.
    pub pops: usize,
    /// How many values every normal return leaves behind.
    pub pushes: usize,
}

/// The finished lift: the value arena, the region map, and any non-fatal
/// diagnostics produced along the way. Read-only once returned.
#[derive(Debug)]
pub struct Lift {
    pub values: ValueArena,
    pub regions: RegionMap,
    pub warnings: Vec<Diagnostic>,
}

/// Lift a parsed program into SSA form.
///
/// Fatal conditions abort the whole analysis; the returned error vector
/// holds the warnings collected so far with the fatal diagnostics at the
/// end.
pub fn lift(
    program: &Program,
    labels: &LabelMap,
    options: LiftOptions,
) -> Result<Lift, Vec<Diagnostic>> {
    let mut lifter = Lifter::new(program, labels, options);

    if let Err(fatal) = lifter.compute_predecessors() {
        return Err(lifter.into_failure(vec![fatal]));
    }
    if let Err(fatal) = lifter.run_from(InsnId(0), false) {
        return Err(lifter.into_failure(vec![fatal]));
    }

    let violations = lifter.check_merge_heights();
    if !violations.is_empty() {
        return Err(lifter.into_failure(violations));
    }

    if let Err(fatal) = lifter.wire_phis() {
        return Err(lifter.into_failure(vec![fatal]));
    }

    Ok(Lift {
        values: lifter.values,
        regions: lifter.regions,
        warnings: lifter.diags.into_warnings(),
    })
}

// ─── Engine state ─────────────────────────────────────────────────

struct ExitPoint {
    exit: ValueId,
    popped_arguments: usize,
    pushed_values: usize,
}

struct PendingRegion {
    from_value: Option<ValueId>,
    target: InsnId,
    stack_height: usize,
    popped_arguments: usize,
}

struct Lifter<'a> {
    program: &'a Program,
    labels: &'a LabelMap,
    options: LiftOptions,
    values: ValueArena,
    regions: RegionMap,
    /// Region header values, for patching incoming edges on re-arrival.
    region_headers: HashMap<RegionId, ValueId>,
    functions: HashMap<InsnId, FunctionInfo>,
    predecessors: Vec<Vec<InsnId>>,
    diags: Diagnostics,
}

impl<'a> Lifter<'a> {
    fn new(program: &'a Program, labels: &'a LabelMap, options: LiftOptions) -> Self {
        Self {
            program,
            labels,
            options,
            values: ValueArena::new(),
            regions: RegionMap::new(),
            region_headers: HashMap::new(),
            functions: HashMap::new(),
            predecessors: vec![Vec::new(); program.len()],
            diags: Diagnostics::new(),
        }
    }

    fn into_failure(self, fatal: Vec<Diagnostic>) -> Vec<Diagnostic> {
        let mut all = self.diags.into_warnings();
        all.extend(fatal);
        all
    }

    fn span_of(&self, id: InsnId) -> Span {
        self.program.insn(id).span
    }

    /// Resolve a static target relative to `at`. Checks program bounds.
    fn resolve_target(&self, target: Target<'_>, at: InsnId) -> Result<InsnId, Diagnostic> {
        let resolved = match target {
            Target::Fallthrough => InsnId(at.0 + 1),
            Target::Label(name) => *self.labels.get(name).ok_or_else(|| {
                Diagnostic::error(
                    format!("destination for label `{name}` not found"),
                    self.span_of(at),
                )
            })?,
        };
        if resolved.0 >= self.program.len() {
            return Err(Diagnostic::error(
                "program control fell out of bounds".to_string(),
                self.span_of(at),
            ));
        }
        Ok(resolved)
    }

    /// Static successors of one instruction. Unknown mnemonics warn once
    /// per mnemonic and default to fall-through; this pass only needs a
    /// conservative edge set.
    fn static_successors(&mut self, at: InsnId) -> Result<Vec<InsnId>, Diagnostic> {
        let insn = self.program.insn(at);
        let targets = match Opcode::parse(&insn.operation) {
            Some(opcode) => opcode.successors(&insn.args, insn.span)?,
            None => {
                let operation = insn.operation.clone();
                let span = insn.span;
                self.diags.warn_once(
                    &operation,
                    Diagnostic::warning(
                        format!("unknown opcode `{operation}`: assuming fall-through"),
                        span,
                    )
                    .with_note(
                        "no successor table is registered for this mnemonic".to_string(),
                    ),
                );
                vec![Target::Fallthrough]
            }
        };
        let mut successors = Vec::with_capacity(targets.len());
        for target in targets {
            // The final instruction's fall-through points past the end;
            // it is unreachable (the stream always ends with an exit) and
            // is dropped rather than reported.
            if target == Target::Fallthrough && at.0 + 1 >= self.program.len() {
                continue;
            }
            successors.push(self.resolve_target(target, at)?);
        }
        Ok(successors)
    }

    /// Build the global predecessor count before any abstract execution.
    fn compute_predecessors(&mut self) -> Result<(), Diagnostic> {
        for idx in 0..self.program.len() {
            let at = InsnId(idx);
            for successor in self.static_successors(at)? {
                self.predecessors[successor.0].push(at);
            }
        }
        Ok(())
    }

    fn predecessor_count(&self, at: InsnId) -> usize {
        self.predecessors[at.0].len()
    }

    /// Analyze the flow graph reachable from `start`. Each procedure is
    /// analyzed at most once; a re-entrant arrival means recursion, which
    /// is unsupported by construction.
    fn run_from(&mut self, start: InsnId, is_procedure: bool) -> Result<FunctionInfo, Diagnostic> {
        if let Some(info) = self.functions.get(&start) {
            if info.status == FunctionStatus::Done {
                return Ok(*info);
            }
            return Err(Diagnostic::error(
                format!(
                    "recursive call into `{}`: recursive procedures are not supported",
                    self.procedure_name(start)
                ),
                self.span_of(start),
            ));
        }
        self.functions.insert(
            start,
            FunctionInfo {
                status: FunctionStatus::InProgress,
                pops: 0,
                pushes: 0,
            },
        );

        let mut exit_points: Vec<ExitPoint> = Vec::new();
        let mut worklist = vec![PendingRegion {
            from_value: None,
            target: start,
            stack_height: 0,
            popped_arguments: 0,
        }];

        while let Some(pending) = worklist.pop() {
            let region_id = pending.target;

            // A second arrival (loop back-edge or merge) only records the
            // incoming edge; each region executes at most once.
            if let Some(&header) = self.region_headers.get(&region_id) {
                if let Some(from) = pending.from_value {
                    self.add_incoming(header, from)?;
                }
                continue;
            }

            let first = self.program.insn(region_id);
            let name = first
                .labels
                .first()
                .cloned()
                .unwrap_or_else(|| self.program.location(region_id));

            let header = self.values.alloc(AbstractValue::Region {
                name: name.clone(),
                incoming: pending.from_value.into_iter().collect(),
            });
            self.region_headers.insert(region_id, header);
            // Claim the region's position now: a `callsub` below would
            // otherwise list the callee's regions before this one, and the
            // entry region must stay block 0.
            self.regions.reserve(region_id);

            let mut ctx = RegionExec {
                lifter: self,
                at: region_id,
                is_procedure,
                stack: Vec::new(),
                region_values: vec![header],
                last_seq: header,
                popped_arguments: pending.popped_arguments,
                args_synthesized: 0,
            };

            for _ in 0..pending.stack_height {
                ctx.push(AbstractValue::Phi {
                    region: header,
                    operands: Vec::new(),
                });
            }
            let phis = ctx.stack.clone();

            let mut successors: Vec<RegionId> = Vec::new();
            loop {
                let insn = ctx.lifter.program.insn(ctx.at);
                let opcode = Opcode::parse(&insn.operation).ok_or_else(|| {
                    Diagnostic::error(
                        format!("unknown operation `{}`", insn.operation),
                        insn.span,
                    )
                    .with_help(
                        "abstract execution has no default semantics to fall back on"
                            .to_string(),
                    )
                })?;
                let args = insn.args.clone();
                match opcode.exec(&mut ctx, &args)? {
                    NextStep::Jump(jump) => {
                        if ctx.lifter.predecessor_count(jump.target) > 1 {
                            worklist.push(PendingRegion {
                                from_value: Some(ctx.last_seq),
                                target: jump.target,
                                stack_height: ctx.stack.len(),
                                popped_arguments: ctx.popped_arguments,
                            });
                            successors.push(jump.target);
                            break;
                        }
                        // Straight-line extension: same region continues.
                        ctx.at = jump.target;
                    }
                    NextStep::Switch {
                        condition,
                        alternatives,
                    } => {
                        let control = ctx.last_seq;
                        let switch = ctx.add_value(AbstractValue::Switch { condition, control });
                        ctx.last_seq = switch;
                        for Jump { case, target } in alternatives {
                            // A branch whose label is its own fall-through
                            // yields two alternatives with one target;
                            // parallel edges collapse into a single edge.
                            if successors.contains(&target) {
                                continue;
                            }
                            let projection = ctx.add_value(AbstractValue::On {
                                case,
                                control: switch,
                            });
                            worklist.push(PendingRegion {
                                from_value: Some(projection),
                                target,
                                stack_height: ctx.stack.len(),
                                popped_arguments: ctx.popped_arguments,
                            });
                            successors.push(target);
                        }
                        break;
                    }
                    NextStep::Exit { kind, consumes } => {
                        let control = ctx.last_seq;
                        let exit = ctx.add_value(AbstractValue::Exit {
                            kind,
                            consumes,
                            control,
                        });
                        ctx.last_seq = exit;
                        exit_points.push(ExitPoint {
                            exit,
                            popped_arguments: ctx.popped_arguments,
                            pushed_values: ctx.stack.len(),
                        });
                        break;
                    }
                }
            }

            let RegionExec {
                stack,
                region_values,
                args_synthesized,
                ..
            } = ctx;
            self.regions.insert(
                region_id,
                RegionInfo {
                    name,
                    header,
                    pops: args_synthesized,
                    pushes: stack,
                    phis,
                    values: region_values,
                    successors,
                },
            );
        }

        self.finish_function(start, is_procedure, &exit_points)
    }

    /// Compute a procedure's signature from its exit points and mark the
    /// memo entry done.
    fn finish_function(
        &mut self,
        start: InsnId,
        is_procedure: bool,
        exit_points: &[ExitPoint],
    ) -> Result<FunctionInfo, Diagnostic> {
        let name = self.procedure_name(start);
        let mut info = FunctionInfo {
            status: FunctionStatus::Done,
            pops: exit_points
                .iter()
                .map(|e| e.popped_arguments)
                .max()
                .unwrap_or(0),
            pushes: 0,
        };

        let returns: Vec<&ExitPoint> = exit_points
            .iter()
            .filter(|e| {
                matches!(
                    self.values.get(e.exit),
                    AbstractValue::Exit { kind, .. } if kind == "retsub"
                )
            })
            .collect();

        if let Some(first) = returns.first() {
            if returns.iter().any(|e| e.pushed_values != first.pushed_values) {
                let mut diag = Diagnostic::error(
                    format!("procedure `{name}` does not always return the same number of values"),
                    self.span_of(start),
                );
                for ret in &returns {
                    diag = diag.with_note(format!(
                        "one return site leaves {} value(s)",
                        ret.pushed_values
                    ));
                }
                return Err(diag);
            }
            info.pushes = first.pushed_values;
        } else if is_procedure {
            self.diags.warn(Diagnostic::warning(
                format!("no return points found for procedure `{name}`"),
                self.span_of(start),
            ));
        }

        self.functions.insert(start, info);
        Ok(info)
    }

    fn procedure_name(&self, start: InsnId) -> String {
        self.program
            .insn(start)
            .labels
            .first()
            .cloned()
            .unwrap_or_else(|| format!("procedure at {}", self.program.location(start)))
    }

    fn add_incoming(&mut self, header: ValueId, from: ValueId) -> Result<(), Diagnostic> {
        match self.values.get_mut(header) {
            AbstractValue::Region { incoming, .. } => {
                if !incoming.contains(&from) {
                    incoming.push(from);
                }
                Ok(())
            }
            _ => Err(Diagnostic::ice(
                "region header is not a region value".to_string(),
                Span::dummy(),
            )),
        }
    }

    // ── Patch passes ──

    /// Global invariant: every region with more than one predecessor must
    /// be reached with one single stack height. Runs before phi wiring so
    /// violations surface as this diagnostic, not as a wiring failure.
    fn check_merge_heights(&self) -> Vec<Diagnostic> {
        let mut region_predecessors: HashMap<RegionId, Vec<RegionId>> = HashMap::new();
        for (region_id, info) in self.regions.iter() {
            for successor in &info.successors {
                region_predecessors
                    .entry(*successor)
                    .or_default()
                    .push(region_id);
            }
        }

        let mut violations = Vec::new();
        for (region_id, info) in self.regions.iter() {
            let Some(preds) = region_predecessors.get(&region_id) else {
                continue;
            };
            let heights: Vec<usize> = preds
                .iter()
                .filter_map(|p| self.regions.get(*p))
                .map(|p| p.pushes.len())
                .collect();
            if heights.windows(2).all(|w| w[0] == w[1]) {
                continue;
            }
            let mut diag = Diagnostic::error(
                format!(
                    "region `{}` can be reached with multiple different stack heights",
                    info.name
                ),
                self.span_of(region_id),
            );
            for (pred, height) in preds.iter().zip(&heights) {
                if let Some(pred_info) = self.regions.get(*pred) {
                    diag = diag.with_note(format!(
                        "from region `{}` the stack has height {height}",
                        pred_info.name
                    ));
                }
            }
            violations.push(diag);
        }
        violations
    }

    /// Fill each phi's per-predecessor operand from the tail of the
    /// predecessor's exit stack. Mismatches here are engine bugs: the
    /// merge-height invariant was already checked.
    fn wire_phis(&mut self) -> Result<(), Diagnostic> {
        let mut patches: Vec<(ValueId, RegionId, ValueId)> = Vec::new();
        for (region_id, info) in self.regions.iter() {
            for successor in &info.successors {
                let succ = self.regions.get(*successor).ok_or_else(|| {
                    Diagnostic::ice(
                        format!("successor region {successor} was never built"),
                        self.span_of(region_id),
                    )
                })?;
                if succ.phis.is_empty() {
                    continue;
                }
                if info.pushes.len() < succ.phis.len() {
                    return Err(Diagnostic::ice(
                        format!(
                            "not enough values on the symbolic stack of `{}` to fill the \
                             {} phi slot(s) of `{}`",
                            info.name,
                            succ.phis.len(),
                            succ.name
                        ),
                        self.span_of(region_id),
                    ));
                }
                let tail = &info.pushes[info.pushes.len() - succ.phis.len()..];
                for (phi, value) in succ.phis.iter().zip(tail) {
                    patches.push((*phi, region_id, *value));
                }
            }
        }

        for (phi, from_region, value) in patches {
            match self.values.get_mut(phi) {
                AbstractValue::Phi { operands, .. } => {
                    match operands.iter_mut().find(|(region, _)| *region == from_region) {
                        Some(slot) => slot.1 = value,
                        None => operands.push((from_region, value)),
                    }
                }
                _ => {
                    return Err(Diagnostic::ice(
                        "value on a phi list is not a phi".to_string(),
                        Span::dummy(),
                    ))
                }
            }
        }
        Ok(())
    }
}

// ─── Per-region execution context ─────────────────────────────────

/// Symbolic machine state while linearly executing one region.
struct RegionExec<'l, 'a> {
    lifter: &'l mut Lifter<'a>,
    /// Instruction being executed.
    at: InsnId,
    is_procedure: bool,
    stack: Vec<ValueId>,
    region_values: Vec<ValueId>,
    last_seq: ValueId,
    popped_arguments: usize,
    args_synthesized: usize,
}

impl ExecContext for RegionExec<'_, '_> {
    fn push(&mut self, value: AbstractValue) -> ValueId {
        let id = self.add_value(value);
        self.stack.push(id);
        id
    }

    fn push_handle(&mut self, id: ValueId) {
        self.stack.push(id);
    }

    fn pop(&mut self) -> Result<ValueId, Diagnostic> {
        if let Some(id) = self.stack.pop() {
            return Ok(id);
        }
        if self.is_procedure {
            // Reach one level deeper into the caller's arguments.
            let index = self.popped_arguments;
            self.popped_arguments += 1;
            self.args_synthesized += 1;
            return Ok(self.add_value(AbstractValue::Arg { index }));
        }
        Err(Diagnostic::error(
            "stack underflow outside any procedure".to_string(),
            self.span(),
        )
        .with_note("there is no caller to supply an implicit argument".to_string()))
    }

    fn add_value(&mut self, value: AbstractValue) -> ValueId {
        let id = self.lifter.values.alloc(value);
        self.region_values.push(id);
        id
    }

    fn sequence_point(&mut self, label: &str, consumes: Deps) -> ValueId {
        let control = self.last_seq;
        self.last_seq = self.add_value(AbstractValue::SequencePoint {
            label: label.to_string(),
            consumes,
            control,
        });
        self.last_seq
    }

    fn resolve(&self, target: Target<'_>, case: &str) -> Result<Jump, Diagnostic> {
        let target = self.lifter.resolve_target(target, self.at)?;
        Ok(Jump {
            case: case.to_string(),
            target,
        })
    }

    fn call_to(&mut self, proc_label: &str) -> Result<(), Diagnostic> {
        let target = self
            .lifter
            .resolve_target(Target::Label(proc_label), self.at)?;
        let signature = self.lifter.run_from(target, true)?;

        let mut args = Deps::new();
        for i in 0..signature.pops {
            let value = self.pop()?;
            args.push((format!("Arg({i})"), value));
        }
        let control = self.last_seq;
        let call = self.add_value(AbstractValue::Call {
            proc: proc_label.to_string(),
            args,
            control,
        });
        self.last_seq = call;
        for index in 0..signature.pushes {
            self.push(AbstractValue::CallResult { call, index });
        }
        Ok(())
    }

    fn stack_snapshot(&self) -> Deps {
        self.stack
            .iter()
            .rev()
            .enumerate()
            .map(|(i, id)| (i.to_string(), *id))
            .collect()
    }

    fn last_sequence_point(&self) -> ValueId {
        self.last_seq
    }

    fn value(&self, id: ValueId) -> &AbstractValue {
        self.lifter.values.get(id)
    }

    fn span(&self) -> Span {
        self.lifter.span_of(self.at)
    }

    fn fold_constant_branches(&self) -> bool {
        self.lifter.options.fold_constant_branches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, ConstValue};
    use crate::parser::{gather_labels, parse};

    fn lift_text(source: &str) -> Result<Lift, Vec<Diagnostic>> {
        lift_text_with(source, LiftOptions::default())
    }

    fn lift_text_with(source: &str, options: LiftOptions) -> Result<Lift, Vec<Diagnostic>> {
        let program = parse(0, "test.teal", source).expect("parse failed");
        let mut diags = Diagnostics::new();
        let labels = gather_labels(&program, &mut diags);
        lift(&program, &labels, options)
    }

    fn region_at<'l>(lift: &'l Lift, idx: usize) -> &'l RegionInfo {
        lift.regions.iter().nth(idx).map(|(_, info)| info).unwrap()
    }

    #[test]
    fn test_straight_line_single_region() {
        let lift = lift_text("int 1\nint 2\n+\nreturn\n").unwrap();
        assert_eq!(lift.regions.len(), 1);
        let entry = region_at(&lift, 0);
        assert!(entry.successors.is_empty());
        assert!(entry.phis.is_empty());
        assert!(entry.pushes.is_empty());

        let mut consts = 0;
        let mut adds = 0;
        let mut exit_consumes = None;
        for id in &entry.values {
            match lift.values.get(*id) {
                AbstractValue::Const { .. } => consts += 1,
                AbstractValue::Bin { op: BinOp::Add, .. } => adds += 1,
                AbstractValue::Exit { kind, consumes, .. } => {
                    assert_eq!(kind, "return");
                    exit_consumes = Some(consumes.clone());
                }
                _ => {}
            }
        }
        assert_eq!(consts, 2);
        assert_eq!(adds, 1);
        // The terminal consumes the add result.
        let consumes = exit_consumes.expect("no exit node");
        assert_eq!(consumes.len(), 1);
        assert!(matches!(
            lift.values.get(consumes[0].1),
            AbstractValue::Bin { op: BinOp::Add, .. }
        ));
    }

    const BRANCH_MERGE: &str = "int 1\nbnz L\nint 2\nb END\nL:\nint 3\nEND:\nreturn\n";

    #[test]
    fn test_branch_and_merge_produces_phi() {
        let lift = lift_text(BRANCH_MERGE).unwrap();
        assert_eq!(lift.regions.len(), 4);

        // Entry terminates in a switch on the constant.
        let entry = region_at(&lift, 0);
        assert_eq!(entry.successors.len(), 2);
        let terminal = entry
            .values
            .iter()
            .find(|id| lift.values.get(**id).is_terminal())
            .expect("entry has no terminal");
        assert!(matches!(
            lift.values.get(*terminal),
            AbstractValue::Switch { .. }
        ));

        // The merge region has exactly one phi with one operand per arm.
        let merge = lift
            .regions
            .iter()
            .map(|(_, info)| info)
            .find(|info| info.name == "END")
            .expect("merge region missing");
        assert_eq!(merge.phis.len(), 1);
        match lift.values.get(merge.phis[0]) {
            AbstractValue::Phi { operands, .. } => {
                assert_eq!(operands.len(), 2);
                for (_, value) in operands {
                    assert!(matches!(
                        lift.values.get(*value),
                        AbstractValue::Const { .. }
                    ));
                }
            }
            other => panic!("expected phi, got {other:?}"),
        }
    }

    #[test]
    fn test_merge_completeness() {
        // Every phi has one operand per incoming edge of its region.
        let lift = lift_text(BRANCH_MERGE).unwrap();
        for (_, info) in lift.regions.iter() {
            let incoming = match lift.values.get(info.header) {
                AbstractValue::Region { incoming, .. } => incoming.len(),
                other => panic!("expected region header, got {other:?}"),
            };
            for phi in &info.phis {
                match lift.values.get(*phi) {
                    AbstractValue::Phi { operands, .. } => assert_eq!(operands.len(), incoming),
                    other => panic!("expected phi, got {other:?}"),
                }
            }
        }
    }

    #[test]
    fn test_loop_terminates_and_records_back_edge() {
        let lift = lift_text("int 0\nLOOP:\nint 1\n+\ndup\nbnz LOOP\nreturn\n").unwrap();
        let entry = region_at(&lift, 0);
        // The loop head is a separate region with itself among its
        // predecessors' successors.
        let loop_region = lift
            .regions
            .iter()
            .find(|(_, info)| info.name == "LOOP")
            .map(|(id, info)| (id, info))
            .expect("loop region missing");
        assert!(entry.successors.contains(&loop_region.0));
        assert!(loop_region.1.successors.contains(&loop_region.0));
        assert_eq!(loop_region.1.phis.len(), 1);
    }

    #[test]
    fn test_procedure_signature_inferred_and_memoized() {
        let source = "int 1\nint 2\ncallsub add2\nint 3\nint 4\ncallsub add2\n+\nreturn\n\
                      add2:\n+\nretsub\n";
        let lift = lift_text(source).unwrap();
        // The procedure body was analyzed once: exactly one region named
        // `add2` exists even though it is called from two sites.
        let proc_regions: Vec<_> = lift
            .regions
            .iter()
            .filter(|(_, info)| info.name == "add2")
            .collect();
        assert_eq!(proc_regions.len(), 1);
        // It synthesized two implicit arguments.
        assert_eq!(proc_regions[0].1.pops, 2);

        // Both call sites popped two arguments and pushed one result.
        let mut calls = 0;
        for (_, value) in lift.values.iter() {
            if let AbstractValue::Call { proc, args, .. } = value {
                assert_eq!(proc, "add2");
                assert_eq!(args.len(), 2);
                calls += 1;
            }
        }
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_recursive_procedure_is_fatal() {
        let source = "callsub loopy\nreturn\nloopy:\nint 1\npop\ncallsub loopy\nretsub\n";
        let errs = lift_text(source).unwrap_err();
        assert!(errs
            .iter()
            .any(|d| d.message.contains("recursive")), "got {errs:?}");
    }

    #[test]
    fn test_inconsistent_return_arity_is_fatal() {
        let source = "int 1\ncallsub proc\nreturn\n\
                      proc:\nbnz TWO\nint 1\nretsub\nTWO:\nint 1\nint 2\nretsub\n";
        let errs = lift_text(source).unwrap_err();
        assert!(
            errs.iter()
                .any(|d| d.message.contains("does not always return")),
            "got {errs:?}"
        );
    }

    #[test]
    fn test_merge_height_mismatch_is_fatal() {
        // One arm pushes two values, the other one; both jump to END.
        let source = "int 1\nbnz L\nint 2\nint 3\nb END\nL:\nint 4\nEND:\nreturn\n";
        let errs = lift_text(source).unwrap_err();
        assert!(
            errs.iter()
                .any(|d| d.message.contains("multiple different stack heights")),
            "got {errs:?}"
        );
        // The diagnostic enumerates every predecessor.
        let diag = errs
            .iter()
            .find(|d| d.message.contains("multiple different stack heights"))
            .unwrap();
        assert_eq!(diag.notes.len(), 2);
    }

    #[test]
    fn test_stack_underflow_at_top_level_is_fatal() {
        let errs = lift_text("pop\nreturn\n").unwrap_err();
        assert!(errs.iter().any(|d| d.message.contains("underflow")));
    }

    #[test]
    fn test_unknown_opcode_fatal_in_exec_but_warn_in_successors() {
        let errs = lift_text("frobnicate\nreturn\n").unwrap_err();
        // The predecessor pass warned once, then execution failed.
        assert!(errs
            .iter()
            .any(|d| d.message.contains("unknown opcode `frobnicate`")));
        assert!(errs
            .iter()
            .any(|d| d.message.contains("unknown operation `frobnicate`")));
    }

    #[test]
    fn test_unreachable_unknown_opcode_only_warns() {
        // The unknown opcode sits after an unconditional exit: the
        // successor pass sees it, abstract execution never does.
        let lift = lift_text("int 1\nreturn\nfrobnicate\nreturn\n").unwrap();
        assert_eq!(lift.warnings.len(), 1);
        assert!(lift.warnings[0].message.contains("frobnicate"));
    }

    #[test]
    fn test_undefined_label_is_fatal() {
        let errs = lift_text("b nowhere\nreturn\n").unwrap_err();
        assert!(errs
            .iter()
            .any(|d| d.message.contains("destination for label `nowhere` not found")));
    }

    #[test]
    fn test_constant_branch_folding_removes_switch() {
        let folded = lift_text_with(
            BRANCH_MERGE,
            LiftOptions {
                fold_constant_branches: true,
            },
        )
        .unwrap();
        // `int 1; bnz L` always jumps: no switch node anywhere.
        assert!(!folded
            .values
            .iter()
            .any(|(_, v)| matches!(v, AbstractValue::Switch { .. })));
        // The dead `int 2` arm was never executed.
        assert!(!folded.values.iter().any(|(_, v)| matches!(
            v,
            AbstractValue::Const {
                value: ConstValue::Uint(2),
                ..
            }
        )));
    }

    #[test]
    fn test_determinism() {
        let source = "int 5\nstore 0\nload 0\nbnz L\nint 2\nb END\nL:\nint 3\nEND:\nreturn\n";
        let a = lift_text(source).unwrap();
        let b = lift_text(source).unwrap();
        assert_eq!(a.values.len(), b.values.len());
        let ids_a: Vec<_> = a.values.iter().map(|(id, _)| id).collect();
        let ids_b: Vec<_> = b.values.iter().map(|(id, _)| id).collect();
        assert_eq!(ids_a, ids_b);
        for (id, value) in a.values.iter() {
            assert_eq!(value, b.values.get(id));
        }
        let order_a: Vec<_> = a.regions.iter().map(|(id, _)| id).collect();
        let order_b: Vec<_> = b.regions.iter().map(|(id, _)| id).collect();
        assert_eq!(order_a, order_b);
    }

    #[test]
    fn test_effect_chain_orders_stores() {
        let source = "int 1\nstore 0\nint 2\nstore 1\nload 0\nreturn\n";
        let lift = lift_text(source).unwrap();
        // store 1 chains to store 0; the load chains to store 1.
        let mut chain = Vec::new();
        for (id, value) in lift.values.iter() {
            match value {
                AbstractValue::SequencePoint { .. } | AbstractValue::ScratchLoad { .. } => {
                    chain.push((id, value.control().unwrap()))
                }
                _ => {}
            }
        }
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[1].1, chain[0].0);
        assert_eq!(chain[2].1, chain[1].0);
    }

    #[test]
    fn test_region_pops_counts_synthesized_args() {
        let source = "int 1\nint 2\ncallsub sub\nreturn\nsub:\n+\nretsub\n";
        let lift = lift_text(source).unwrap();
        let proc = lift
            .regions
            .iter()
            .find(|(_, info)| info.name == "sub")
            .map(|(_, info)| info)
            .unwrap();
        assert_eq!(proc.pops, 2);
        let entry = region_at(&lift, 0);
        assert_eq!(entry.pops, 0);
    }

    #[test]
    fn test_entry_region_is_first_with_call_in_entry() {
        // The callee is analyzed while the entry region is still being
        // built; the entry must nevertheless head the region order.
        let lift = lift_text("callsub seven\nreturn\nseven:\nint 7\nretsub\n").unwrap();
        let order: Vec<RegionId> = lift.regions.iter().map(|(id, _)| id).collect();
        assert_eq!(order[0], InsnId(0));
        let entry = region_at(&lift, 0);
        assert_eq!(entry.pops, 0);
        assert!(entry
            .values
            .iter()
            .any(|id| matches!(lift.values.get(*id), AbstractValue::Call { .. })));
    }

    #[test]
    fn test_branch_onto_own_fall_through_collapses_edges() {
        // `bnz L` where L is the next instruction: both alternatives share
        // one target, so the merge sees a single incoming edge.
        let lift = lift_text("int 5\nint 1\nbnz L\nL:\nreturn\n").unwrap();
        let merge = lift
            .regions
            .iter()
            .find(|(_, info)| info.name == "L")
            .map(|(_, info)| info)
            .expect("merge region missing");
        let incoming = match lift.values.get(merge.header) {
            AbstractValue::Region { incoming, .. } => incoming.len(),
            other => panic!("expected region header, got {other:?}"),
        };
        assert_eq!(incoming, 1);
        assert_eq!(merge.phis.len(), 1);
        match lift.values.get(merge.phis[0]) {
            AbstractValue::Phi { operands, .. } => assert_eq!(operands.len(), 1),
            other => panic!("expected phi, got {other:?}"),
        }
    }

    #[test]
    fn test_procedure_without_retsub_warns() {
        let source = "callsub dead\nint 1\nreturn\ndead:\nerr\n";
        let lift = lift_text(source).unwrap();
        assert!(lift
            .warnings
            .iter()
            .any(|d| d.message.contains("no return points")));
    }

    #[test]
    fn test_values_preserve_creation_order_per_region() {
        let lift = lift_text("int 1\nint 2\n+\nreturn\n").unwrap();
        let entry = region_at(&lift, 0);
        let positions: Vec<usize> = entry
            .values
            .iter()
            .map(|id| {
                lift.values
                    .iter()
                    .position(|(other, _)| other == *id)
                    .unwrap()
            })
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
    }
}
