//! IR Types
//!
//! The typed form of a Jac program. Every language construct is one enum
//! variant so the interpreter dispatches with a `match` instead of by rule
//! name. Expressions keep the bytecode the compiler attached to their syntax
//! node, if any.

use serde::{Deserialize, Serialize};

use jac_foundation::{
    ArchKind, BinaryOp, CmpOp, IncOp, JacType, LogicalOp, SourceLoc, UnaryOp, Value,
};

// ============================================================================
// Declarations
// ============================================================================

/// A lowered compilation unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub decls: Vec<Decl>,
}

impl Program {
    pub fn architypes(&self) -> impl Iterator<Item = &ArchDef> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Architype(arch) => Some(arch),
            _ => None,
        })
    }

    pub fn globals(&self) -> impl Iterator<Item = &GlobalVar> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Global(global) => Some(global),
            _ => None,
        })
    }

    pub fn tests(&self) -> impl Iterator<Item = &TestCase> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Test(test) => Some(test),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Global(GlobalVar),
    Architype(ArchDef),
    Test(TestCase),
}

/// `global NAME = expr;`
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVar {
    pub name: String,
    pub value: Expr,
    pub loc: SourceLoc,
}

/// A `node`, `edge`, `graph` or `walker` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchDef {
    pub kind: ArchKind,
    pub name: String,
    /// Direct super architypes, in declaration order.
    pub supers: Vec<String>,
    pub body: ArchBody,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchBody {
    pub has: Vec<HasVar>,
    pub abilities: Vec<AbilityDef>,
    /// Walker body in source order. Empty for other kinds.
    pub walker: Vec<WalkerItem>,
    pub graph: Option<GraphBlock>,
}

impl ArchBody {
    pub fn private_vars(&self) -> impl Iterator<Item = &str> {
        self.has.iter().filter(|h| h.private).map(|h| h.name.as_str())
    }

    /// The anchor variable, if one is declared.
    pub fn anchor(&self) -> Option<&str> {
        self.has.iter().find(|h| h.anchor).map(|h| h.name.as_str())
    }
}

/// One `has` variable.
#[derive(Debug, Clone, PartialEq)]
pub struct HasVar {
    pub name: String,
    pub private: bool,
    pub anchor: bool,
    pub default: Option<Expr>,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbilityEvent {
    Entry,
    Exit,
    Activity,
}

/// A `can` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct AbilityDef {
    pub name: String,
    pub event: AbilityEvent,
    /// Walkers allowed to trigger this ability. Empty admits all.
    pub access_list: Vec<String>,
    pub body: AbilityBody,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AbilityBody {
    /// `can name { ... }`
    Code(Block),
    /// `can module.action::args::> target`
    Action {
        action: String,
        preset: Option<Preset>,
    },
}

/// Arguments bound at compile time to an action ability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preset {
    pub args: Vec<Expr>,
    pub kwargs: Vec<(String, Expr)>,
    /// Where the action result is written.
    pub output: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WalkerItem {
    /// `with entry { ... }`, first step only.
    Entry(Block),
    /// `with exit { ... }`, once the queue drains.
    Exit(Block),
    /// `with activity { ... }`, every step.
    Activity(Block),
    Stmt(Stmt),
}

/// Body of a `graph` architype.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphBlock {
    /// Local holding the root node once the spawn block has run.
    pub anchor: String,
    pub abilities: Vec<AbilityDef>,
    pub spawn: Block,
    pub loc: SourceLoc,
}

/// A `test "title" with ... by ...` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub title: String,
    pub graph: TestGraph,
    pub walker: TestWalker,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TestGraph {
    Ref(String),
    Inline(GraphBlock),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TestWalker {
    /// `walker::name(ctx) { asserts }`
    Ref {
        name: String,
        ctx: Vec<(String, Expr)>,
        asserts: Option<Block>,
    },
    /// `walker { ... }`, compiled as an anonymous walker.
    Inline(ArchBody),
}

// ============================================================================
// Statements
// ============================================================================

pub type Block = Vec<Stmt>;

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Block(Block),
    /// Runs `body` when the current node is an instance of any of `archs`.
    NodeContext { archs: Vec<String>, body: Block },
    Expr(Expr),
    If {
        cond: Expr,
        then: Block,
        elifs: Vec<(Expr, Block)>,
        otherwise: Option<Block>,
    },
    Try {
        body: Block,
        /// Name bound to the error dict in the else block.
        binding: Option<String>,
        otherwise: Option<Block>,
    },
    /// `for init to cond by step { ... }`
    ForTo {
        init: Expr,
        cond: Expr,
        step: Expr,
        body: Block,
    },
    ForIn {
        var: String,
        iter: Expr,
        body: Block,
    },
    ForKeyValue {
        key: String,
        value: String,
        iter: Expr,
        body: Block,
    },
    While {
        cond: Expr,
        body: Block,
    },
    Ctrl(CtrlKind),
    Assert(Expr),
    Destroy(Expr),
    Report(Expr),
    ReportField {
        field: ReportField,
        value: Expr,
    },
    Take {
        style: TakeStyle,
        target: Expr,
        otherwise: Option<Block>,
    },
    Ignore(Expr),
    /// `disengage;` or `disengage report x;`
    Disengage(Option<Box<Stmt>>),
    /// `yield;` or `yield <action>;`
    Yield(Option<Box<Stmt>>),
}

impl StmtKind {
    /// Grammar rule the statement was lowered from, for error messages.
    pub fn rule(&self) -> &'static str {
        match self {
            StmtKind::Block(_) => "code_block",
            StmtKind::NodeContext { .. } => "node_ctx_block",
            StmtKind::Expr(_) => "expression",
            StmtKind::If { .. } => "if_stmt",
            StmtKind::Try { .. } => "try_stmt",
            StmtKind::ForTo { .. } | StmtKind::ForIn { .. } | StmtKind::ForKeyValue { .. } => {
                "for_stmt"
            }
            StmtKind::While { .. } => "while_stmt",
            StmtKind::Ctrl(_) => "ctrl_stmt",
            StmtKind::Assert(_) => "assert_stmt",
            StmtKind::Destroy(_) => "destroy_action",
            StmtKind::Report(_) | StmtKind::ReportField { .. } => "report_action",
            StmtKind::Take { .. } => "take_action",
            StmtKind::Ignore(_) => "ignore_action",
            StmtKind::Disengage(_) => "disengage_action",
            StmtKind::Yield(_) => "yield_action",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlKind {
    Break,
    Continue,
    /// Stop processing the current node.
    Skip,
}

/// Targets of `report:<field> = expr;`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportField {
    Status,
    Custom,
    File,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TakeStyle {
    /// Append to the back of the queue.
    #[default]
    Bfs,
    /// Push to the front of the queue.
    Dfs,
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub loc: SourceLoc,
    /// Code compiled for the syntax node this expression came from.
    pub bytecode: Option<Vec<u8>>,
}

impl Expr {
    pub fn new(kind: ExprKind, loc: SourceLoc) -> Self {
        Self {
            kind,
            loc,
            bytecode: None,
        }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::new(ExprKind::Literal(value.into()), SourceLoc::default())
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self::new(ExprKind::Name(name.into()), SourceLoc::default())
    }

    /// The variable name if this is a bare name.
    pub fn as_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Name(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Value),
    Type(JacType),
    Name(String),
    Global(GlobalRef),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Compare {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// `lhs ++> rhs`, evaluates to `lhs`.
    Connect {
        lhs: Box<Expr>,
        op: ConnectOp,
        rhs: Box<Expr>,
    },
    /// `lhs !--> rhs`, evaluates to `lhs`.
    Disconnect {
        lhs: Box<Expr>,
        edge: RefStep,
        rhs: Box<Expr>,
    },
    /// Chain of edge and node steps starting at `here`.
    EdgeRef(Vec<RefStep>),
    Field {
        base: Box<Expr>,
        name: String,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        base: Box<Expr>,
        start: Box<Expr>,
        end: Box<Expr>,
    },
    /// `callee(args)`: action calls such as `std.log(x)`.
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    /// `target::name` or `::name`. A missing target means the current scope owner.
    AbilityCall {
        target: Option<Box<Expr>>,
        arch: Option<String>,
        name: String,
        ctx: Vec<(String, Expr)>,
    },
    Builtin {
        base: Box<Expr>,
        op: Builtin,
    },
    Spawn(Box<SpawnExpr>),
    /// `&x`: the element reference of `x`.
    Ref(Box<Expr>),
    /// `*x`: the element named by a reference string.
    Deref(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `=`
    Assign,
    /// `:=`, copies context fields.
    Copy,
    /// `+=`, `-=`, `*=`, `/=`
    Inc(IncOp),
}

/// `global.context`, `global.info` or `global.NAME`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalRef {
    Context,
    Info,
    Details,
    Var(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
    Any,
}

/// A connect operator with an optional typed edge.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOp {
    pub direction: Direction,
    pub edge: Option<String>,
    pub ctx: Vec<(String, Expr)>,
}

/// `field <op> value` inside a filter context.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: CmpOp,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefStep {
    /// `-->`, `<--`, `<-->` or their typed forms.
    Edge {
        direction: Direction,
        arch: Option<String>,
        filters: Vec<Filter>,
    },
    /// `node::name(filters)`, narrowing the nodes reached so far.
    Node {
        arch: Option<String>,
        filters: Vec<Filter>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodFamily {
    Dict,
    List,
    Str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Builtin {
    Context,
    Info,
    Details,
    Keys,
    Length,
    /// `.int`, `.str`, `.edge`, `.node`, ...
    Cast(JacType),
    /// `.{a, b}` keeps only the listed keys.
    Pluck(Vec<String>),
    /// `.list::append(x)`. `args` is `None` without parentheses.
    Method {
        family: MethodFamily,
        name: String,
        args: Option<Vec<Expr>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpawnExpr {
    /// `spawn here ++> node::name(ctx)`
    Node {
        from: Option<(Expr, ConnectOp)>,
        arch: String,
        ctx: Vec<(String, Expr)>,
    },
    /// `spawn here walker::name(ctx)`
    Walker {
        location: Expr,
        name: String,
        ctx: Vec<(String, Expr)>,
    },
    /// `spawn here ++> graph::name`
    Graph {
        from: Option<(Expr, ConnectOp)>,
        name: String,
    },
}
