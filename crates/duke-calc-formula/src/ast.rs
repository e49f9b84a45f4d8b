//! Formula Abstract Syntax Tree types

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use duke_calc_core::{CellError, CellRange, SharedString, SheetId, UnitId};

/// Byte range in the formula source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an AST node
///
/// Memo tables key on this, so two parses of the same text never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

/// One AST node
///
/// Equality compares span and structure, not the id.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub span: Span,
    pub kind: NodeKind,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.span == other.span && self.kind == other.kind
    }
}

/// Formula expression kinds
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    // === Literals ===
    Literal(Literal),

    // === References ===
    /// Cell or range; `None` ids bind to the current unit/sheet at evaluation
    Reference {
        unit_id: Option<UnitId>,
        sheet_id: Option<SheetId>,
        range: CellRange,
    },
    /// Defined name
    Name(String),

    // === Operators ===
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Node>,
    },
    BinaryOp {
        op: BinaryOperator,
        left: Box<Node>,
        right: Box<Node>,
    },

    // === Function call ===
    FunctionCall {
        /// Uppercase
        name: String,
        args: Vec<Node>,
    },

    // === Array ===
    ArrayLiteral(Vec<Vec<Node>>),

    /// `(A1, B2:C3)`
    Union(Vec<Node>),

    /// Omitted function argument
    Missing,

    /// Input that could not be parsed
    Invalid { error: CellError, message: String },
}

/// Literal constant
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(SharedString),
    Boolean(bool),
    Error(CellError),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    // Text
    Concat,

    // Reference
    Range,
    Intersect,
}

impl BinaryOperator {
    /// Binding strength; higher binds tighter
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOperator::Intersect => 1,
            BinaryOperator::Range => 2,
            BinaryOperator::Equal
            | BinaryOperator::NotEqual
            | BinaryOperator::LessThan
            | BinaryOperator::LessEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterEqual => 3,
            BinaryOperator::Concat => 4,
            BinaryOperator::Add | BinaryOperator::Subtract => 5,
            BinaryOperator::Multiply | BinaryOperator::Divide => 6,
            BinaryOperator::Power => 8,
        }
    }

    pub fn is_comparison(&self) -> bool {
        self.precedence() == 3
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Power => "^",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "<>",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::Concat => "&",
            BinaryOperator::Range => ":",
            BinaryOperator::Intersect => " ",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Negate,
    Percent,
}

/// Precedence of prefix negation
pub const NEGATE_PRECEDENCE: u8 = 7;
/// Precedence of postfix percent
pub const PERCENT_PRECEDENCE: u8 = 9;

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self {
            id: NodeId::next(),
            span,
            kind,
        }
    }

    pub fn invalid<S: Into<String>>(error: CellError, message: S, span: Span) -> Self {
        Self::new(
            NodeKind::Invalid {
                error,
                message: message.into(),
            },
            span,
        )
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self.kind, NodeKind::Invalid { .. })
    }

    /// Direct children in source order
    pub fn children(&self) -> Vec<&Node> {
        match &self.kind {
            NodeKind::UnaryOp { operand, .. } => vec![operand],
            NodeKind::BinaryOp { left, right, .. } => vec![left, right],
            NodeKind::FunctionCall { args, .. } => args.iter().collect(),
            NodeKind::ArrayLiteral(rows) => rows.iter().flatten().collect(),
            NodeKind::Union(items) => items.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Pre-order traversal
    pub fn walk<'a, F: FnMut(&'a Node)>(&'a self, f: &mut F) {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            f(node);
            stack.extend(node.children().into_iter().rev());
        }
    }

    /// Levels in the tree; a leaf is 1
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(node.children().into_iter().map(|child| (child, depth + 1)));
        }
        deepest
    }

    /// First invalid node, in source order
    pub fn first_invalid(&self) -> Option<&Node> {
        let mut found = None;
        self.walk(&mut |n| {
            if found.is_none() && n.is_invalid() {
                found = Some(n);
            }
        });
        found
    }

    /// Uppercase names of every function called
    pub fn function_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.walk(&mut |n| {
            if let NodeKind::FunctionCall { name, .. } = &n.kind {
                names.push(name.as_str());
            }
        });
        names
    }
}

impl fmt::Display for Node {
    /// Canonical formula text (without the leading `=`)
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Literal(Literal::Number(n)) => write!(f, "{}", n),
            NodeKind::Literal(Literal::Text(s)) => {
                write!(f, "\"{}\"", s.as_str().replace('"', "\"\""))
            }
            NodeKind::Literal(Literal::Boolean(b)) => {
                f.write_str(if *b { "TRUE" } else { "FALSE" })
            }
            NodeKind::Literal(Literal::Error(e)) => f.write_str(e.as_str()),
            NodeKind::Reference {
                unit_id,
                sheet_id,
                range,
            } => {
                if let Some(unit) = unit_id {
                    write!(f, "[{}]", unit)?;
                }
                if let Some(sheet) = sheet_id {
                    write!(f, "{}!", sheet)?;
                }
                write!(f, "{}", range)
            }
            NodeKind::Name(name) => f.write_str(name),
            NodeKind::UnaryOp {
                op: UnaryOperator::Negate,
                operand,
            } => write!(f, "-{}", operand),
            NodeKind::UnaryOp {
                op: UnaryOperator::Percent,
                operand,
            } => write!(f, "{}%", operand),
            NodeKind::BinaryOp { op, left, right } => {
                write!(f, "({}{}{})", left, op.symbol(), right)
            }
            NodeKind::FunctionCall { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            NodeKind::ArrayLiteral(rows) => {
                f.write_str("{")?;
                for (r, row) in rows.iter().enumerate() {
                    if r > 0 {
                        f.write_str(";")?;
                    }
                    for (c, item) in row.iter().enumerate() {
                        if c > 0 {
                            f.write_str(",")?;
                        }
                        write!(f, "{}", item)?;
                    }
                }
                f.write_str("}")
            }
            NodeKind::Union(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(")")
            }
            NodeKind::Missing => Ok(()),
            NodeKind::Invalid { error, .. } => f.write_str(error.as_str()),
        }
    }
}
