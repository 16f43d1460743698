//! Opcode semantics table.
//!
//! Each mnemonic maps to a pair of pure descriptors: `successors` (static
//! successor targets, used once up front to count predecessors) and `exec`
//! (the symbolic effect against an [`ExecContext`]). The table is a closed
//! enum so the dispatch is exhaustiveness-checked.

pub mod fields;

use crate::diagnostic::Diagnostic;
use crate::ir::{
    AbstractValue, BinOp, ConstValue, Deps, HashAlgo, InsnId, ScratchKey, Type, ValueId,
};
use crate::span::Span;

// ─── Control transfer descriptions ────────────────────────────────

/// A static successor: the distinguished fall-through sentinel or a label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target<'a> {
    Fallthrough,
    Label(&'a str),
}

/// A resolved control edge, tagged with a case name for `on` projections.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Jump {
    pub case: String,
    pub target: InsnId,
}

/// The result of symbolically executing one instruction.
#[derive(Clone, Debug)]
pub enum NextStep {
    Jump(Jump),
    Exit { kind: String, consumes: Deps },
    Switch {
        condition: ValueId,
        alternatives: Vec<Jump>,
    },
}

// ─── Execution context ────────────────────────────────────────────

/// What an opcode may do to the abstract machine. Implemented by the
/// engine's per-region executor; tests substitute their own.
pub trait ExecContext {
    /// Create a value and push its handle on the symbolic stack.
    fn push(&mut self, value: AbstractValue) -> ValueId;
    /// Push an existing handle (stack permutations create no new value).
    fn push_handle(&mut self, id: ValueId);
    /// Pop the symbolic stack. Inside a procedure an empty stack
    /// synthesizes an `Arg` placeholder; at top level it is fatal.
    fn pop(&mut self) -> Result<ValueId, Diagnostic>;
    /// Create a value without touching the stack.
    fn add_value(&mut self, value: AbstractValue) -> ValueId;
    /// Register an effect on the control chain.
    fn sequence_point(&mut self, label: &str, consumes: Deps) -> ValueId;
    /// Resolve a target to an instruction index.
    fn resolve(&self, target: Target<'_>, case: &str) -> Result<Jump, Diagnostic>;
    /// Analyze (memoized) and invoke a procedure.
    fn call_to(&mut self, proc_label: &str) -> Result<(), Diagnostic>;
    /// The whole symbolic stack as named dependencies, top of stack first,
    /// without popping. Only `retsub` uses this.
    fn stack_snapshot(&self) -> Deps;
    fn last_sequence_point(&self) -> ValueId;
    fn value(&self, id: ValueId) -> &AbstractValue;
    /// Span of the instruction being executed, for diagnostics.
    fn span(&self) -> Span;
    /// Whether constant-condition branches collapse to plain jumps.
    fn fold_constant_branches(&self) -> bool {
        false
    }
}

// ─── The table ────────────────────────────────────────────────────

/// Every supported mnemonic, grouped by shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    /// All two-operand data ops, with the operand family the mnemonic is
    /// declared for (`+` vs `b+`).
    Binary(BinOp, Type),
    AddWide,
    MulWide,
    Not,
    Btoi,
    Itob,
    Hash(HashAlgo),
    Int,
    Bytes,
    Addr,
    Len,
    SubstringImm,
    Substring3,
    SetByte,
    Branch,
    BranchNonZero,
    BranchZero,
    Dup,
    Dup2,
    Swap,
    Dig,
    Cover,
    Uncover,
    Pop,
    Log,
    Assert,
    Err,
    Return,
    Global,
    Txn,
    Gtxn,
    Txna,
    Gtxna,
    Txnas,
    Block,
    AssetHoldingGet,
    AppGlobalGet,
    AppLocalGet,
    AppGlobalPut,
    AppLocalPut,
    AppGlobalDel,
    AppLocalDel,
    AppGlobalGetEx,
    AppLocalGetEx,
    Load,
    Store,
    Loads,
    Stores,
    CallSub,
    RetSub,
}

impl Opcode {
    pub fn parse(mnemonic: &str) -> Option<Opcode> {
        use BinOp::*;
        use Type::*;
        Some(match mnemonic {
            "==" => Opcode::Binary(Eq, Any),
            "!=" => Opcode::Binary(Ne, Any),
            "&&" => Opcode::Binary(And, Uint64),
            "||" => Opcode::Binary(Or, Uint64),
            "+" => Opcode::Binary(Add, Uint64),
            "-" => Opcode::Binary(Sub, Uint64),
            "*" => Opcode::Binary(Mul, Uint64),
            "/" => Opcode::Binary(Div, Uint64),
            "%" => Opcode::Binary(Mod, Uint64),
            "&" => Opcode::Binary(BitAnd, Uint64),
            "|" => Opcode::Binary(BitOr, Uint64),
            "^" => Opcode::Binary(BitXor, Uint64),
            "shl" => Opcode::Binary(Shl, Uint64),
            "shr" => Opcode::Binary(Shr, Uint64),
            "<" => Opcode::Binary(Lt, Uint64),
            ">" => Opcode::Binary(Gt, Uint64),
            "<=" => Opcode::Binary(Le, Uint64),
            ">=" => Opcode::Binary(Ge, Uint64),
            "b+" => Opcode::Binary(Add, Bytes),
            "b-" => Opcode::Binary(Sub, Bytes),
            "b*" => Opcode::Binary(Mul, Bytes),
            "b&" => Opcode::Binary(BitAnd, Bytes),
            "b|" => Opcode::Binary(BitOr, Bytes),
            "b^" => Opcode::Binary(BitXor, Bytes),
            "b<" => Opcode::Binary(Lt, Bytes),
            "b>" => Opcode::Binary(Gt, Bytes),
            "b<=" => Opcode::Binary(Le, Bytes),
            "b>=" => Opcode::Binary(Ge, Bytes),
            "concat" => Opcode::Binary(Concat, Any),
            "getbyte" => Opcode::Binary(GetByte, Any),
            "addw" => Opcode::AddWide,
            "mulw" => Opcode::MulWide,
            "!" => Opcode::Not,
            "btoi" => Opcode::Btoi,
            "itob" => Opcode::Itob,
            "sha256" => Opcode::Hash(HashAlgo::Sha256),
            "keccak256" => Opcode::Hash(HashAlgo::Keccak256),
            "sha512_256" => Opcode::Hash(HashAlgo::Sha512_256),
            "int" | "pushint" => Opcode::Int,
            "byte" | "pushbytes" => Opcode::Bytes,
            "addr" => Opcode::Addr,
            "len" => Opcode::Len,
            "substring" => Opcode::SubstringImm,
            "substring3" => Opcode::Substring3,
            "setbyte" => Opcode::SetByte,
            "b" => Opcode::Branch,
            "bnz" => Opcode::BranchNonZero,
            "bz" => Opcode::BranchZero,
            "dup" => Opcode::Dup,
            "dup2" => Opcode::Dup2,
            "swap" => Opcode::Swap,
            "dig" => Opcode::Dig,
            "cover" => Opcode::Cover,
            "uncover" => Opcode::Uncover,
            "pop" => Opcode::Pop,
            "log" => Opcode::Log,
            "assert" => Opcode::Assert,
            "err" => Opcode::Err,
            "return" => Opcode::Return,
            "global" => Opcode::Global,
            "txn" => Opcode::Txn,
            "gtxn" => Opcode::Gtxn,
            "txna" => Opcode::Txna,
            "gtxna" => Opcode::Gtxna,
            "txnas" => Opcode::Txnas,
            "block" => Opcode::Block,
            "asset_holding_get" => Opcode::AssetHoldingGet,
            "app_global_get" => Opcode::AppGlobalGet,
            "app_local_get" => Opcode::AppLocalGet,
            "app_global_put" => Opcode::AppGlobalPut,
            "app_local_put" => Opcode::AppLocalPut,
            "app_global_del" => Opcode::AppGlobalDel,
            "app_local_del" => Opcode::AppLocalDel,
            "app_global_get_ex" => Opcode::AppGlobalGetEx,
            "app_local_get_ex" => Opcode::AppLocalGetEx,
            "load" => Opcode::Load,
            "store" => Opcode::Store,
            "loads" => Opcode::Loads,
            "stores" => Opcode::Stores,
            "callsub" => Opcode::CallSub,
            "retsub" => Opcode::RetSub,
            _ => return None,
        })
    }

    /// Static successor targets, computed from the arguments alone.
    pub fn successors<'a>(
        &self,
        args: &'a [String],
        span: Span,
    ) -> Result<Vec<Target<'a>>, Diagnostic> {
        Ok(match self {
            Opcode::Branch => vec![Target::Label(arg(args, 0, "b", "a label", span)?)],
            Opcode::BranchNonZero => vec![
                Target::Label(arg(args, 0, "bnz", "a label", span)?),
                Target::Fallthrough,
            ],
            Opcode::BranchZero => vec![
                Target::Label(arg(args, 0, "bz", "a label", span)?),
                Target::Fallthrough,
            ],
            Opcode::Err | Opcode::Return | Opcode::RetSub => vec![],
            _ => vec![Target::Fallthrough],
        })
    }

    /// Symbolically execute one instruction.
    pub fn exec(
        &self,
        ctx: &mut dyn ExecContext,
        args: &[String],
    ) -> Result<NextStep, Diagnostic> {
        let span = ctx.span();
        match self {
            Opcode::Binary(op, variant) => {
                let rhs = ctx.pop()?;
                let lhs = ctx.pop()?;
                ctx.push(AbstractValue::Bin {
                    op: *op,
                    variant: *variant,
                    lhs,
                    rhs,
                });
                fallthrough(ctx)
            }
            Opcode::AddWide | Opcode::MulWide => {
                let rhs = ctx.pop()?;
                let lhs = ctx.pop()?;
                let (high, low) = if matches!(self, Opcode::AddWide) {
                    (BinOp::AddHigh, BinOp::AddLow)
                } else {
                    (BinOp::MulHigh, BinOp::MulLow)
                };
                ctx.push(AbstractValue::Bin {
                    op: high,
                    variant: Type::Uint64,
                    lhs,
                    rhs,
                });
                ctx.push(AbstractValue::Bin {
                    op: low,
                    variant: Type::Uint64,
                    lhs,
                    rhs,
                });
                fallthrough(ctx)
            }
            Opcode::Not => {
                let value = ctx.pop()?;
                ctx.push(AbstractValue::Not { value });
                fallthrough(ctx)
            }
            Opcode::Btoi => {
                let value = ctx.pop()?;
                ctx.push(AbstractValue::Cast {
                    ty: Type::Uint64,
                    value,
                });
                fallthrough(ctx)
            }
            Opcode::Itob => {
                let value = ctx.pop()?;
                ctx.push(AbstractValue::Cast {
                    ty: Type::Bytes,
                    value,
                });
                fallthrough(ctx)
            }
            Opcode::Hash(algo) => {
                let value = ctx.pop()?;
                ctx.push(AbstractValue::Hash { algo: *algo, value });
                fallthrough(ctx)
            }
            Opcode::Int => {
                let raw = arg(args, 0, "int", "a value", span)?;
                let value = match raw.parse::<u64>() {
                    Ok(n) => ConstValue::Uint(n),
                    Err(_) => ConstValue::Sym(raw.to_string()),
                };
                ctx.push(AbstractValue::Const {
                    ty: Type::Uint64,
                    value,
                });
                fallthrough(ctx)
            }
            Opcode::Bytes => {
                let raw = args.join(" ").replace('"', "\\\"");
                ctx.push(AbstractValue::Const {
                    ty: Type::Bytes,
                    value: ConstValue::Bytes(raw),
                });
                fallthrough(ctx)
            }
            Opcode::Addr => {
                let raw = arg(args, 0, "addr", "an address", span)?;
                ctx.push(AbstractValue::Const {
                    ty: Type::Bytes,
                    value: ConstValue::Bytes(raw.to_string()),
                });
                fallthrough(ctx)
            }
            Opcode::Len => {
                let value = ctx.pop()?;
                ctx.push(AbstractValue::Len { value });
                fallthrough(ctx)
            }
            Opcode::SubstringImm => {
                let start = uint_arg(args, 0, "substring", "a start offset", span)?;
                let end = uint_arg(args, 1, "substring", "an end offset", span)?;
                let value = ctx.pop()?;
                ctx.push(AbstractValue::SubstringImm { value, start, end });
                fallthrough(ctx)
            }
            Opcode::Substring3 => {
                let end = ctx.pop()?;
                let start = ctx.pop()?;
                let value = ctx.pop()?;
                ctx.push(AbstractValue::Substring { value, start, end });
                fallthrough(ctx)
            }
            Opcode::SetByte => {
                let value = ctx.pop()?;
                let index = ctx.pop()?;
                let bytes = ctx.pop()?;
                ctx.push(AbstractValue::SetByte {
                    bytes,
                    index,
                    value,
                });
                fallthrough(ctx)
            }
            Opcode::Branch => {
                let label = arg(args, 0, "b", "a label", span)?;
                ctx.resolve(Target::Label(label), "jump").map(NextStep::Jump)
            }
            Opcode::BranchNonZero | Opcode::BranchZero => {
                let mnemonic = match self {
                    Opcode::BranchNonZero => "bnz",
                    _ => "bz",
                };
                let label = arg(args, 0, mnemonic, "a label", span)?;
                let condition = ctx.pop()?;
                if ctx.fold_constant_branches() {
                    if let AbstractValue::Const {
                        value: ConstValue::Uint(n),
                        ..
                    } = ctx.value(condition)
                    {
                        let taken = match self {
                            Opcode::BranchNonZero => *n != 0,
                            _ => *n == 0,
                        };
                        let target = if taken {
                            Target::Label(label)
                        } else {
                            Target::Fallthrough
                        };
                        return ctx.resolve(target, "jump").map(NextStep::Jump);
                    }
                }
                let alternatives = if matches!(self, Opcode::BranchNonZero) {
                    vec![
                        ctx.resolve(Target::Fallthrough, "zero")?,
                        ctx.resolve(Target::Label(label), "non-zero")?,
                    ]
                } else {
                    vec![
                        ctx.resolve(Target::Fallthrough, "non-zero")?,
                        ctx.resolve(Target::Label(label), "zero")?,
                    ]
                };
                Ok(NextStep::Switch {
                    condition,
                    alternatives,
                })
            }
            Opcode::Dup => {
                let value = ctx.pop()?;
                ctx.push_handle(value);
                ctx.push_handle(value);
                fallthrough(ctx)
            }
            Opcode::Dup2 => {
                let b = ctx.pop()?;
                let a = ctx.pop()?;
                for id in [a, b, a, b] {
                    ctx.push_handle(id);
                }
                fallthrough(ctx)
            }
            Opcode::Swap => {
                let a = ctx.pop()?;
                let b = ctx.pop()?;
                ctx.push_handle(a);
                ctx.push_handle(b);
                fallthrough(ctx)
            }
            Opcode::Dig => {
                let depth = uint_arg(args, 0, "dig", "a depth", span)? as usize;
                // buf[0] is the old top.
                let mut buf = Vec::with_capacity(depth + 1);
                for _ in 0..=depth {
                    buf.push(ctx.pop()?);
                }
                for id in buf.iter().rev() {
                    ctx.push_handle(*id);
                }
                ctx.push_handle(buf[depth]);
                fallthrough(ctx)
            }
            Opcode::Cover => {
                let depth = uint_arg(args, 0, "cover", "a depth", span)? as usize;
                let top = ctx.pop()?;
                let mut buf = Vec::with_capacity(depth);
                for _ in 0..depth {
                    buf.push(ctx.pop()?);
                }
                ctx.push_handle(top);
                for id in buf.iter().rev() {
                    ctx.push_handle(*id);
                }
                fallthrough(ctx)
            }
            Opcode::Uncover => {
                let depth = uint_arg(args, 0, "uncover", "a depth", span)? as usize;
                let mut buf = Vec::with_capacity(depth + 1);
                for _ in 0..=depth {
                    buf.push(ctx.pop()?);
                }
                for id in buf[..depth].iter().rev() {
                    ctx.push_handle(*id);
                }
                ctx.push_handle(buf[depth]);
                fallthrough(ctx)
            }
            Opcode::Pop => {
                ctx.pop()?;
                fallthrough(ctx)
            }
            Opcode::Log => {
                let value = ctx.pop()?;
                ctx.sequence_point("log", vec![("value".to_string(), value)]);
                fallthrough(ctx)
            }
            Opcode::Assert => {
                let value = ctx.pop()?;
                ctx.sequence_point("assert", vec![("value".to_string(), value)]);
                fallthrough(ctx)
            }
            Opcode::Err => Ok(NextStep::Exit {
                kind: "err".to_string(),
                consumes: vec![],
            }),
            Opcode::Return => {
                let value = ctx.pop()?;
                Ok(NextStep::Exit {
                    kind: "return".to_string(),
                    consumes: vec![("value".to_string(), value)],
                })
            }
            Opcode::Global => {
                let name = arg(args, 0, "global", "a field name", span)?;
                let ty = fields::global_field_type(name).unwrap_or(Type::Any);
                ctx.push(AbstractValue::ExtConst {
                    ty,
                    name: format!("global.{name}"),
                    args: vec![],
                });
                fallthrough(ctx)
            }
            Opcode::Txn => {
                let field = arg(args, 0, "txn", "a field name", span)?;
                let ty = fields::txn_field_type(field).unwrap_or(Type::Any);
                ctx.push(AbstractValue::ExtConst {
                    ty,
                    name: format!("txn.{field}"),
                    args: vec![],
                });
                fallthrough(ctx)
            }
            Opcode::Gtxn => {
                let txn = arg(args, 0, "gtxn", "a group index", span)?;
                let field = arg(args, 1, "gtxn", "a field name", span)?;
                let ty = fields::txn_field_type(field).unwrap_or(Type::Any);
                ctx.push(AbstractValue::ExtConst {
                    ty,
                    name: format!("gtxn[{txn}].{field}"),
                    args: vec![],
                });
                fallthrough(ctx)
            }
            Opcode::Txna => {
                let field = arg(args, 0, "txna", "a field name", span)?;
                let idx = arg(args, 1, "txna", "an index", span)?;
                let ty = fields::txna_field_type(field).unwrap_or(Type::Any);
                ctx.push(AbstractValue::ExtConst {
                    ty,
                    name: format!("txn.{field}[{idx}]"),
                    args: vec![],
                });
                fallthrough(ctx)
            }
            Opcode::Gtxna => {
                let txn = arg(args, 0, "gtxna", "a group index", span)?;
                let field = arg(args, 1, "gtxna", "a field name", span)?;
                let idx = arg(args, 2, "gtxna", "an index", span)?;
                let ty = fields::txna_field_type(field).unwrap_or(Type::Any);
                ctx.push(AbstractValue::ExtConst {
                    ty,
                    name: format!("gtxn[{txn}].{field}[{idx}]"),
                    args: vec![],
                });
                fallthrough(ctx)
            }
            Opcode::Txnas => {
                let field = arg(args, 0, "txnas", "a field name", span)?;
                let index = ctx.pop()?;
                let ty = fields::txna_field_type(field).unwrap_or(Type::Any);
                ctx.push(AbstractValue::ExtConst {
                    ty,
                    name: format!("txn.{field}[?]"),
                    args: vec![("index".to_string(), index)],
                });
                fallthrough(ctx)
            }
            Opcode::Block => {
                let field = arg(args, 0, "block", "a field name", span)?;
                let round = ctx.pop()?;
                let ty = fields::block_field_type(field).unwrap_or(Type::Any);
                ctx.push(AbstractValue::ExtConst {
                    ty,
                    name: format!("block.{field}"),
                    args: vec![("round".to_string(), round)],
                });
                fallthrough(ctx)
            }
            Opcode::AssetHoldingGet => {
                let field = arg(args, 0, "asset_holding_get", "a field name", span)?;
                let asset = ctx.pop()?;
                let account = ctx.pop()?;
                let ty = fields::asset_holding_field_type(field).unwrap_or(Type::Any);
                ctx.push(AbstractValue::ExtConst {
                    ty,
                    name: format!("Asset.{field}"),
                    args: vec![
                        ("account".to_string(), account),
                        ("asset".to_string(), asset),
                    ],
                });
                ctx.push(AbstractValue::OptedIn { account, asset });
                fallthrough(ctx)
            }
            Opcode::AppGlobalGet => {
                let key = ctx.pop()?;
                let control = ctx.last_sequence_point();
                ctx.push(AbstractValue::GlobalLoad {
                    key,
                    app: None,
                    control,
                });
                fallthrough(ctx)
            }
            Opcode::AppLocalGet => {
                let key = ctx.pop()?;
                let account = ctx.pop()?;
                let control = ctx.last_sequence_point();
                ctx.push(AbstractValue::LocalLoad {
                    key,
                    account,
                    app: None,
                    control,
                });
                fallthrough(ctx)
            }
            Opcode::AppGlobalGetEx => {
                let key = ctx.pop()?;
                let app = ctx.pop()?;
                let control = ctx.last_sequence_point();
                let value = ctx.push(AbstractValue::GlobalLoad {
                    key,
                    app: Some(app),
                    control,
                });
                ctx.push(AbstractValue::Exists {
                    args: vec![("value".to_string(), value)],
                });
                fallthrough(ctx)
            }
            Opcode::AppLocalGetEx => {
                let key = ctx.pop()?;
                let app = ctx.pop()?;
                let account = ctx.pop()?;
                let control = ctx.last_sequence_point();
                let value = ctx.push(AbstractValue::LocalLoad {
                    key,
                    account,
                    app: Some(app),
                    control,
                });
                ctx.push(AbstractValue::Exists {
                    args: vec![("value".to_string(), value)],
                });
                fallthrough(ctx)
            }
            Opcode::AppGlobalPut => {
                let value = ctx.pop()?;
                let key = ctx.pop()?;
                ctx.sequence_point(
                    "Store Global",
                    vec![("key".to_string(), key), ("value".to_string(), value)],
                );
                fallthrough(ctx)
            }
            Opcode::AppLocalPut => {
                let value = ctx.pop()?;
                let key = ctx.pop()?;
                let account = ctx.pop()?;
                ctx.sequence_point(
                    "Store Local",
                    vec![
                        ("account".to_string(), account),
                        ("key".to_string(), key),
                        ("value".to_string(), value),
                    ],
                );
                fallthrough(ctx)
            }
            Opcode::AppGlobalDel => {
                let key = ctx.pop()?;
                ctx.sequence_point("Delete Global", vec![("key".to_string(), key)]);
                fallthrough(ctx)
            }
            Opcode::AppLocalDel => {
                let key = ctx.pop()?;
                let account = ctx.pop()?;
                ctx.sequence_point(
                    "Delete Local",
                    vec![("account".to_string(), account), ("key".to_string(), key)],
                );
                fallthrough(ctx)
            }
            Opcode::Load => {
                let key = arg(args, 0, "load", "a slot", span)?;
                let control = ctx.last_sequence_point();
                ctx.push(AbstractValue::ScratchLoad {
                    key: ScratchKey::Static(key.to_string()),
                    control,
                });
                fallthrough(ctx)
            }
            Opcode::Store => {
                let key = arg(args, 0, "store", "a slot", span)?;
                let value = ctx.pop()?;
                ctx.sequence_point(
                    &format!("Store Scratch({key})"),
                    vec![("value".to_string(), value)],
                );
                fallthrough(ctx)
            }
            Opcode::Loads => {
                let key = ctx.pop()?;
                let control = ctx.last_sequence_point();
                ctx.push(AbstractValue::ScratchLoad {
                    key: ScratchKey::Dynamic(key),
                    control,
                });
                fallthrough(ctx)
            }
            Opcode::Stores => {
                let value = ctx.pop()?;
                let key = ctx.pop()?;
                ctx.sequence_point(
                    "Store Scratch",
                    vec![("key".to_string(), key), ("value".to_string(), value)],
                );
                fallthrough(ctx)
            }
            Opcode::CallSub => {
                let label = arg(args, 0, "callsub", "a label", span)?;
                ctx.call_to(label)?;
                fallthrough(ctx)
            }
            Opcode::RetSub => Ok(NextStep::Exit {
                kind: "retsub".to_string(),
                consumes: ctx.stack_snapshot(),
            }),
        }
    }
}

fn fallthrough(ctx: &dyn ExecContext) -> Result<NextStep, Diagnostic> {
    ctx.resolve(Target::Fallthrough, "").map(NextStep::Jump)
}

fn arg<'a>(
    args: &'a [String],
    idx: usize,
    mnemonic: &str,
    what: &str,
    span: Span,
) -> Result<&'a str, Diagnostic> {
    args.get(idx).map(String::as_str).ok_or_else(|| {
        Diagnostic::error(
            format!("`{mnemonic}` expects {what} as argument {}", idx + 1),
            span,
        )
    })
}

fn uint_arg(
    args: &[String],
    idx: usize,
    mnemonic: &str,
    what: &str,
    span: Span,
) -> Result<u64, Diagnostic> {
    let raw = arg(args, idx, mnemonic, what, span)?;
    raw.parse::<u64>().map_err(|_| {
        Diagnostic::error(
            format!("`{mnemonic}` expects {what}, found `{raw}`"),
            span,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ValueArena;

    /// Minimal context over a bare arena and stack; labels resolve through
    /// a fixed table, calls are rejected.
    struct TestCtx {
        arena: ValueArena,
        stack: Vec<ValueId>,
        last_seq: ValueId,
        at: usize,
        labels: Vec<(&'static str, usize)>,
        fold: bool,
    }

    impl TestCtx {
        fn new() -> Self {
            let mut arena = ValueArena::new();
            let region = arena.alloc(AbstractValue::Region {
                name: "entry".to_string(),
                incoming: vec![],
            });
            Self {
                arena,
                stack: vec![],
                last_seq: region,
                at: 0,
                labels: vec![("dest", 7)],
                fold: false,
            }
        }
    }

    impl ExecContext for TestCtx {
        fn push(&mut self, value: AbstractValue) -> ValueId {
            let id = self.arena.alloc(value);
            self.stack.push(id);
            id
        }

        fn push_handle(&mut self, id: ValueId) {
            self.stack.push(id);
        }

        fn pop(&mut self) -> Result<ValueId, Diagnostic> {
            self.stack.pop().ok_or_else(|| {
                Diagnostic::error("stack underflow".to_string(), Span::dummy())
            })
        }

        fn add_value(&mut self, value: AbstractValue) -> ValueId {
            self.arena.alloc(value)
        }

        fn sequence_point(&mut self, label: &str, consumes: Deps) -> ValueId {
            let control = self.last_seq;
            self.last_seq = self.arena.alloc(AbstractValue::SequencePoint {
                label: label.to_string(),
                consumes,
                control,
            });
            self.last_seq
        }

        fn resolve(&self, target: Target<'_>, case: &str) -> Result<Jump, Diagnostic> {
            let target = match target {
                Target::Fallthrough => InsnId(self.at + 1),
                Target::Label(name) => {
                    let slot = self
                        .labels
                        .iter()
                        .find(|(label, _)| *label == name)
                        .ok_or_else(|| {
                            Diagnostic::error(
                                format!("destination for label `{name}` not found"),
                                Span::dummy(),
                            )
                        })?;
                    InsnId(slot.1)
                }
            };
            Ok(Jump {
                case: case.to_string(),
                target,
            })
        }

        fn call_to(&mut self, proc_label: &str) -> Result<(), Diagnostic> {
            Err(Diagnostic::error(
                format!("unexpected call to `{proc_label}`"),
                Span::dummy(),
            ))
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
            self.arena.get(id)
        }

        fn span(&self) -> Span {
            Span::dummy()
        }

        fn fold_constant_branches(&self) -> bool {
            self.fold
        }
    }

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_successors_shapes() {
        let span = Span::dummy();
        let b = Opcode::parse("b").unwrap();
        assert_eq!(
            b.successors(&strings(&["dest"]), span).unwrap(),
            vec![Target::Label("dest")]
        );
        let bnz = Opcode::parse("bnz").unwrap();
        assert_eq!(
            bnz.successors(&strings(&["dest"]), span).unwrap(),
            vec![Target::Label("dest"), Target::Fallthrough]
        );
        let ret = Opcode::parse("return").unwrap();
        assert!(ret.successors(&[], span).unwrap().is_empty());
        let add = Opcode::parse("+").unwrap();
        assert_eq!(add.successors(&[], span).unwrap(), vec![Target::Fallthrough]);
    }

    #[test]
    fn test_branch_without_label_is_fatal() {
        let err = Opcode::parse("b")
            .unwrap()
            .successors(&[], Span::dummy())
            .unwrap_err();
        assert!(err.message.contains("expects a label"));
    }

    #[test]
    fn test_branch_errors_name_their_own_mnemonic() {
        let mut ctx = TestCtx::new();
        let err = Opcode::parse("bz").unwrap().exec(&mut ctx, &[]).unwrap_err();
        assert!(err.message.contains("`bz` expects a label"), "got {err:?}");
        let err = Opcode::parse("bnz").unwrap().exec(&mut ctx, &[]).unwrap_err();
        assert!(err.message.contains("`bnz` expects a label"), "got {err:?}");
    }

    #[test]
    fn test_binop_pops_two_pushes_one() {
        let mut ctx = TestCtx::new();
        Opcode::parse("int")
            .unwrap()
            .exec(&mut ctx, &strings(&["1"]))
            .unwrap();
        Opcode::parse("int")
            .unwrap()
            .exec(&mut ctx, &strings(&["2"]))
            .unwrap();
        let step = Opcode::parse("+").unwrap().exec(&mut ctx, &[]).unwrap();
        assert!(matches!(step, NextStep::Jump(_)));
        assert_eq!(ctx.stack.len(), 1);
        match ctx.value(ctx.stack[0]) {
            AbstractValue::Bin { op, .. } => assert_eq!(*op, BinOp::Add),
            other => panic!("expected add, got {other:?}"),
        }
    }

    #[test]
    fn test_dig_duplicates_at_depth() {
        let mut ctx = TestCtx::new();
        let ids: Vec<ValueId> = (0..3)
            .map(|i| {
                ctx.push(AbstractValue::Const {
                    ty: Type::Uint64,
                    value: ConstValue::Uint(i),
                })
            })
            .collect();
        Opcode::parse("dig")
            .unwrap()
            .exec(&mut ctx, &strings(&["2"]))
            .unwrap();
        assert_eq!(ctx.stack, vec![ids[0], ids[1], ids[2], ids[0]]);
    }

    #[test]
    fn test_cover_buries_top() {
        let mut ctx = TestCtx::new();
        let ids: Vec<ValueId> = (0..3)
            .map(|i| {
                ctx.push(AbstractValue::Const {
                    ty: Type::Uint64,
                    value: ConstValue::Uint(i),
                })
            })
            .collect();
        Opcode::parse("cover")
            .unwrap()
            .exec(&mut ctx, &strings(&["2"]))
            .unwrap();
        assert_eq!(ctx.stack, vec![ids[2], ids[0], ids[1]]);
    }

    #[test]
    fn test_uncover_surfaces_depth() {
        let mut ctx = TestCtx::new();
        let ids: Vec<ValueId> = (0..3)
            .map(|i| {
                ctx.push(AbstractValue::Const {
                    ty: Type::Uint64,
                    value: ConstValue::Uint(i),
                })
            })
            .collect();
        Opcode::parse("uncover")
            .unwrap()
            .exec(&mut ctx, &strings(&["2"]))
            .unwrap();
        assert_eq!(ctx.stack, vec![ids[1], ids[2], ids[0]]);
    }

    #[test]
    fn test_bnz_emits_switch_with_both_edges() {
        let mut ctx = TestCtx::new();
        ctx.push(AbstractValue::Const {
            ty: Type::Uint64,
            value: ConstValue::Uint(1),
        });
        let step = Opcode::parse("bnz")
            .unwrap()
            .exec(&mut ctx, &strings(&["dest"]))
            .unwrap();
        match step {
            NextStep::Switch { alternatives, .. } => {
                assert_eq!(alternatives[0].case, "zero");
                assert_eq!(alternatives[0].target, InsnId(1));
                assert_eq!(alternatives[1].case, "non-zero");
                assert_eq!(alternatives[1].target, InsnId(7));
            }
            other => panic!("expected switch, got {other:?}"),
        }
    }

    #[test]
    fn test_constant_branch_folds_to_jump_when_enabled() {
        let mut ctx = TestCtx::new();
        ctx.fold = true;
        ctx.push(AbstractValue::Const {
            ty: Type::Uint64,
            value: ConstValue::Uint(1),
        });
        let step = Opcode::parse("bnz")
            .unwrap()
            .exec(&mut ctx, &strings(&["dest"]))
            .unwrap();
        match step {
            NextStep::Jump(jump) => assert_eq!(jump.target, InsnId(7)),
            other => panic!("expected jump, got {other:?}"),
        }
        // Constant zero falls through instead.
        ctx.push(AbstractValue::Const {
            ty: Type::Uint64,
            value: ConstValue::Uint(0),
        });
        let step = Opcode::parse("bnz")
            .unwrap()
            .exec(&mut ctx, &strings(&["dest"]))
            .unwrap();
        match step {
            NextStep::Jump(jump) => assert_eq!(jump.target, InsnId(1)),
            other => panic!("expected jump, got {other:?}"),
        }
    }

    #[test]
    fn test_retsub_snapshots_without_popping() {
        let mut ctx = TestCtx::new();
        let a = ctx.push(AbstractValue::Arg { index: 0 });
        let b = ctx.push(AbstractValue::Arg { index: 1 });
        let step = Opcode::parse("retsub").unwrap().exec(&mut ctx, &[]).unwrap();
        match step {
            NextStep::Exit { kind, consumes } => {
                assert_eq!(kind, "retsub");
                // Top of stack first.
                assert_eq!(consumes, vec![("0".to_string(), b), ("1".to_string(), a)]);
            }
            other => panic!("expected exit, got {other:?}"),
        }
        assert_eq!(ctx.stack.len(), 2);
    }

    #[test]
    fn test_store_registers_sequence_point() {
        let mut ctx = TestCtx::new();
        ctx.push(AbstractValue::Const {
            ty: Type::Uint64,
            value: ConstValue::Uint(9),
        });
        let before = ctx.last_sequence_point();
        Opcode::parse("store")
            .unwrap()
            .exec(&mut ctx, &strings(&["3"]))
            .unwrap();
        let after = ctx.last_sequence_point();
        assert_ne!(before, after);
        match ctx.value(after) {
            AbstractValue::SequencePoint { label, control, .. } => {
                assert_eq!(label, "Store Scratch(3)");
                assert_eq!(*control, before);
            }
            other => panic!("expected sequence point, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_mnemonic_is_unparsed() {
        assert!(Opcode::parse("frobnicate").is_none());
    }
}
