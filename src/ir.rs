//! The lifted IR: an arena of abstract values plus a map of regions.
//!
//! These two structures are the only artifacts the engine exposes.
//! Both iterate in insertion order; every consumer (printers, the
//! interchange encoder, tests) relies on that for determinism.
//!
//! Values are created append-only. The only mutation allowed after
//! creation is the engine's patch phase: filling a `Phi`'s per-predecessor
//! operands and a `Region`'s incoming-edge set. The mutating entry points
//! are `pub(crate)`, so a finished `Lift` is read-only outside the crate.

use std::collections::HashMap;
use std::fmt;

// ─── Identifiers ──────────────────────────────────────────────────

/// Index of an instruction in the parsed program. Regions are keyed by
/// the instruction at which they begin, so this doubles as the region key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InsnId(pub usize);

/// A region is identified by its starting instruction.
pub type RegionId = InsnId;

impl fmt::Display for InsnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Opaque handle into the value arena. Allocation order makes these
/// globally unique; they are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

// ─── Value payloads ───────────────────────────────────────────────

/// Stack value types tracked by the lifter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Type {
    Uint64,
    Bytes,
    Any,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Uint64 => write!(f, "uint64"),
            Type::Bytes => write!(f, "[]byte"),
            Type::Any => write!(f, "any"),
        }
    }
}

/// A constant operand. Integer immediates that are not numeric literals
/// (named constants like `NoOp`) are kept symbolic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConstValue {
    Uint(u64),
    Sym(String),
    Bytes(String),
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Uint(v) => write!(f, "{v}"),
            ConstValue::Sym(s) => write!(f, "{s}"),
            ConstValue::Bytes(s) => write!(f, "{s}"),
        }
    }
}

/// Binary data operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Concat,
    GetByte,
    AddHigh,
    AddLow,
    MulHigh,
    MulLow,
}

impl BinOp {
    pub fn name(self) -> &'static str {
        match self {
            BinOp::Eq => "eq",
            BinOp::Ne => "ne",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Mod => "mod",
            BinOp::BitAnd => "bitand",
            BinOp::BitOr => "bitor",
            BinOp::BitXor => "bitxor",
            BinOp::Shl => "shl",
            BinOp::Shr => "shr",
            BinOp::Lt => "lt",
            BinOp::Gt => "gt",
            BinOp::Le => "le",
            BinOp::Ge => "ge",
            BinOp::Concat => "concat",
            BinOp::GetByte => "getbyte",
            BinOp::AddHigh => "add_high",
            BinOp::AddLow => "add_low",
            BinOp::MulHigh => "mul_high",
            BinOp::MulLow => "mul_low",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlgo {
    Sha256,
    Keccak256,
    Sha512_256,
}

impl HashAlgo {
    pub fn name(self) -> &'static str {
        match self {
            HashAlgo::Sha256 => "sha256",
            HashAlgo::Keccak256 => "keccak256",
            HashAlgo::Sha512_256 => "sha512_256",
        }
    }
}

/// Scratch-space addressing: a static slot from the instruction stream or
/// a dynamically computed one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScratchKey {
    Static(String),
    Dynamic(ValueId),
}

/// Named data dependencies, in declaration order. The order is part of
/// the interchange contract: operand lists are emitted in this order.
pub type Deps = Vec<(String, ValueId)>;

// ─── Abstract values ──────────────────────────────────────────────

/// One node of the lifted program. Closed set: the engine and every
/// consumer match exhaustively over these.
#[derive(Clone, Debug, PartialEq)]
pub enum AbstractValue {
    /// Literal constant (`int`, `byte`, `addr`, ...).
    Const { ty: Type, value: ConstValue },
    /// Binary data operator. `variant` records the operand family the
    /// mnemonic was declared for (`+` vs `b+`).
    Bin {
        op: BinOp,
        variant: Type,
        lhs: ValueId,
        rhs: ValueId,
    },
    /// Logical negation.
    Not { value: ValueId },
    /// `btoi` / `itob`.
    Cast { ty: Type, value: ValueId },
    Hash { algo: HashAlgo, value: ValueId },
    Len { value: ValueId },
    SetByte {
        bytes: ValueId,
        index: ValueId,
        value: ValueId,
    },
    /// `substring` with immediate bounds.
    SubstringImm {
        value: ValueId,
        start: u64,
        end: u64,
    },
    /// `substring3` with dynamic bounds.
    Substring {
        value: ValueId,
        start: ValueId,
        end: ValueId,
    },
    /// Read of an external constant (transaction / global / asset / block
    /// field). `args` holds dynamic index operands when the read is
    /// indexed from the stack; empty otherwise.
    ExtConst {
        ty: Type,
        name: String,
        args: Deps,
    },
    /// Second push of `asset_holding_get`: whether the account holds the
    /// asset at all.
    OptedIn { account: ValueId, asset: ValueId },
    /// Presence flag pushed by the `*_get_ex` reads.
    Exists { args: Deps },
    /// Application global-state read. `app` is present only for the
    /// external-app form (`app_global_get_ex`).
    GlobalLoad {
        key: ValueId,
        app: Option<ValueId>,
        control: ValueId,
    },
    /// Application local-state read. `app` as above.
    LocalLoad {
        key: ValueId,
        account: ValueId,
        app: Option<ValueId>,
        control: ValueId,
    },
    ScratchLoad { key: ScratchKey, control: ValueId },
    /// Effectful operation with no result: stores, deletes, `log`,
    /// `assert`. Links into the effect chain via `control`.
    SequencePoint {
        label: String,
        consumes: Deps,
        control: ValueId,
    },
    /// Block header. `incoming` is patched as edges are discovered.
    Region { name: String, incoming: Vec<ValueId> },
    /// Merge value: one operand per predecessor region, patched in the
    /// wiring pass.
    Phi {
        region: ValueId,
        operands: Vec<(RegionId, ValueId)>,
    },
    /// Conditional terminator (branch on zero / non-zero).
    Switch { condition: ValueId, control: ValueId },
    /// Labeled projection out of a `Switch`.
    On { case: String, control: ValueId },
    /// Procedure or program termination.
    Exit {
        kind: String,
        consumes: Deps,
        control: ValueId,
    },
    /// Procedure invocation.
    Call {
        proc: String,
        args: Deps,
        control: ValueId,
    },
    /// The `index`-th result of a `Call`.
    CallResult { call: ValueId, index: usize },
    /// Implicit procedure parameter, synthesized when the symbolic stack
    /// bottoms out inside a procedure body.
    Arg { index: usize },
}

impl AbstractValue {
    pub fn op_name(&self) -> &'static str {
        match self {
            AbstractValue::Const { .. } => "const",
            AbstractValue::Bin { op, .. } => op.name(),
            AbstractValue::Not { .. } => "not",
            AbstractValue::Cast { .. } => "cast",
            AbstractValue::Hash { .. } => "hash",
            AbstractValue::Len { .. } => "len",
            AbstractValue::SetByte { .. } => "setbyte",
            AbstractValue::SubstringImm { .. } => "substring",
            AbstractValue::Substring { .. } => "substring3",
            AbstractValue::ExtConst { .. } => "ext_const",
            AbstractValue::OptedIn { .. } => "opted_in",
            AbstractValue::Exists { .. } => "exists",
            AbstractValue::GlobalLoad { .. } => "global_load",
            AbstractValue::LocalLoad { .. } => "local_load",
            AbstractValue::ScratchLoad { .. } => "scratch_load",
            AbstractValue::SequencePoint { .. } => "sequence_point",
            AbstractValue::Region { .. } => "region",
            AbstractValue::Phi { .. } => "phi",
            AbstractValue::Switch { .. } => "switch",
            AbstractValue::On { .. } => "on",
            AbstractValue::Exit { .. } => "exit",
            AbstractValue::Call { .. } => "call",
            AbstractValue::CallResult { .. } => "call-result",
            AbstractValue::Arg { .. } => "arg",
        }
    }

    /// Named data operands, in emission order. Control links are not data
    /// dependencies and are excluded; see [`AbstractValue::control`].
    pub fn operands(&self) -> Deps {
        fn deps(pairs: &[(&str, ValueId)]) -> Deps {
            pairs
                .iter()
                .map(|(name, id)| (name.to_string(), *id))
                .collect()
        }
        match self {
            AbstractValue::Const { .. }
            | AbstractValue::Region { .. }
            | AbstractValue::On { .. }
            | AbstractValue::Arg { .. }
            | AbstractValue::Phi { .. } => Vec::new(),
            AbstractValue::Bin { lhs, rhs, .. } => deps(&[("rhs", *rhs), ("lhs", *lhs)]),
            AbstractValue::Not { value }
            | AbstractValue::Cast { value, .. }
            | AbstractValue::Hash { value, .. }
            | AbstractValue::Len { value }
            | AbstractValue::SubstringImm { value, .. } => deps(&[("value", *value)]),
            AbstractValue::SetByte {
                bytes,
                index,
                value,
            } => deps(&[("bytes", *bytes), ("index", *index), ("value", *value)]),
            AbstractValue::Substring { value, start, end } => {
                deps(&[("value", *value), ("start", *start), ("end", *end)])
            }
            AbstractValue::ExtConst { args, .. } | AbstractValue::Exists { args } => args.clone(),
            AbstractValue::OptedIn { account, asset } => {
                deps(&[("account", *account), ("asset", *asset)])
            }
            AbstractValue::GlobalLoad { key, app, .. } => {
                let mut out = deps(&[("key", *key)]);
                if let Some(app) = app {
                    out.push(("app".to_string(), *app));
                }
                out
            }
            AbstractValue::LocalLoad {
                key, account, app, ..
            } => {
                let mut out = deps(&[("key", *key), ("account", *account)]);
                if let Some(app) = app {
                    out.push(("app".to_string(), *app));
                }
                out
            }
            AbstractValue::ScratchLoad { key, .. } => match key {
                ScratchKey::Static(_) => Vec::new(),
                ScratchKey::Dynamic(id) => deps(&[("key", *id)]),
            },
            AbstractValue::SequencePoint { consumes, .. }
            | AbstractValue::Exit { consumes, .. } => consumes.clone(),
            AbstractValue::Switch { condition, .. } => deps(&[("condition", *condition)]),
            AbstractValue::Call { args, .. } => args.clone(),
            AbstractValue::CallResult { call, .. } => deps(&[("call", *call)]),
        }
    }

    /// The preceding node on the effect chain, if this node is ordered.
    pub fn control(&self) -> Option<ValueId> {
        match self {
            AbstractValue::GlobalLoad { control, .. }
            | AbstractValue::LocalLoad { control, .. }
            | AbstractValue::ScratchLoad { control, .. }
            | AbstractValue::SequencePoint { control, .. }
            | AbstractValue::Switch { control, .. }
            | AbstractValue::On { control, .. }
            | AbstractValue::Exit { control, .. }
            | AbstractValue::Call { control, .. } => Some(*control),
            AbstractValue::Phi { region, .. } => Some(*region),
            _ => None,
        }
    }

    /// Control-flow nodes never appear in a block's instruction listing.
    /// Phis are listed separately; everything else (sequence points and
    /// calls included) is an instruction.
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            AbstractValue::Region { .. }
                | AbstractValue::Phi { .. }
                | AbstractValue::Switch { .. }
                | AbstractValue::On { .. }
                | AbstractValue::Exit { .. }
        )
    }

    /// Terminators: the single control-ending node of a region.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AbstractValue::Switch { .. } | AbstractValue::Exit { .. }
        )
    }
}

// ─── Arena ────────────────────────────────────────────────────────

/// Single owner of every abstract value. Append-only; iteration follows
/// allocation order.
#[derive(Debug, Default)]
pub struct ValueArena {
    values: Vec<AbstractValue>,
}

impl ValueArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, value: AbstractValue) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(value);
        id
    }

    pub fn get(&self, id: ValueId) -> &AbstractValue {
        &self.values[id.index()]
    }

    /// Patch-phase access. Only the engine's wiring passes use this; the
    /// arena is logically frozen once lifting returns.
    pub(crate) fn get_mut(&mut self, id: ValueId) -> &mut AbstractValue {
        &mut self.values[id.index()]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ValueId, &AbstractValue)> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (ValueId(i as u32), v))
    }
}

// ─── Regions ──────────────────────────────────────────────────────

/// Everything known about one region (basic block).
#[derive(Clone, Debug)]
pub struct RegionInfo {
    /// Display name: the region's first label, or `file:line`.
    pub name: String,
    /// The `Region` header value.
    pub header: ValueId,
    /// `Arg` placeholders synthesized while this region executed.
    /// Non-zero only where the symbolic stack bottomed out, normally the
    /// procedure entry region.
    pub pops: usize,
    /// Symbolic stack at region exit, bottom to top.
    pub pushes: Vec<ValueId>,
    /// Phi slots seeded at region entry, in stack order.
    pub phis: Vec<ValueId>,
    /// All values created while executing this region, in creation order.
    pub values: Vec<ValueId>,
    /// Control successors of the terminating instruction.
    pub successors: Vec<RegionId>,
}

/// Regions keyed by their starting instruction, iterated in discovery
/// order.
#[derive(Debug, Default)]
pub struct RegionMap {
    order: Vec<RegionId>,
    infos: HashMap<RegionId, RegionInfo>,
}

impl RegionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a slot in iteration order before the region's info exists.
    /// The engine reserves at discovery, so a procedure analyzed while its
    /// caller's region is still executing lists after the caller.
    pub(crate) fn reserve(&mut self, id: RegionId) {
        debug_assert!(!self.order.contains(&id), "region {id} reserved twice");
        self.order.push(id);
    }

    pub(crate) fn insert(&mut self, id: RegionId, info: RegionInfo) {
        debug_assert!(!self.infos.contains_key(&id), "region {id} built twice");
        if !self.order.contains(&id) {
            self.order.push(id);
        }
        self.infos.insert(id, info);
    }

    pub fn get(&self, id: RegionId) -> Option<&RegionInfo> {
        self.infos.get(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegionId, &RegionInfo)> {
        self.order.iter().map(move |id| (*id, &self.infos[id]))
    }
}
