//! Formula parser
//!
//! Precedence climbing over the [`LexTree`]. Operators, loosest first:
//!
//! | level | operators |
//! |---|---|
//! | 1 | intersection (space) |
//! | 2 | range `:` |
//! | 3 | `= <> < <= > >=` |
//! | 4 | `&` |
//! | 5 | `+ -` |
//! | 6 | `* /` |
//! | 7 | prefix `-` |
//! | 8 | `^` |
//! | 9 | postfix `%` |
//!
//! Union is written as `,` inside plain parentheses. All binary operators are
//! left-associative. Bad input never aborts: it becomes an
//! [`NodeKind::Invalid`] node that evaluates to an error.

use std::cell::Cell;

use duke_calc_core::{CellError, UnitId};

use crate::ast::{
    BinaryOperator, Literal, Node, NodeKind, Span, UnaryOperator, NEGATE_PRECEDENCE,
    PERCENT_PRECEDENCE,
};
use crate::lexer::{Group, GroupKind, LexNode, LexTree, Lexer, Operator, ReferenceToken, TokenKind};
use crate::reference::{parse_area, NoResolver, ReferenceResolver};

/// Parse a formula string into an AST
///
/// Sheet-qualified references need a resolver; use [`Parser`] for those.
///
/// # Example
/// ```rust
/// use duke_calc_formula::ast::NodeKind;
/// use duke_calc_formula::parse_formula;
///
/// let ast = parse_formula("=1+2");
/// assert!(matches!(ast.kind, NodeKind::BinaryOp { .. }));
///
/// let ast = parse_formula("=SUM(A1:A10)");
/// assert!(matches!(ast.kind, NodeKind::FunctionCall { .. }));
///
/// let ast = parse_formula("=1+");
/// assert!(ast.is_invalid());
/// ```
pub fn parse_formula(formula: &str) -> Node {
    Parser::new(&NoResolver).parse_text(formula)
}

/// Nested sub-expressions the parser descends into before giving up
pub const MAX_NESTING: usize = 128;

/// Deepest tree the interpreter is handed; long operator chains count too
pub const MAX_TREE_DEPTH: usize = 1024;

/// Formula parser bound to a name resolver
pub struct Parser<'r> {
    resolver: &'r dyn ReferenceResolver,
    unit_id: Option<UnitId>,
    lexer: Lexer,
    depth: Cell<usize>,
}

struct Cursor<'t> {
    nodes: &'t [LexNode],
    pos: usize,
    /// Where "end of input" sits, for error spans
    end: Span,
}

impl<'t> Cursor<'t> {
    fn new(nodes: &'t [LexNode], end: Span) -> Self {
        Self { nodes, pos: 0, end }
    }

    fn peek(&self) -> Option<&'t LexNode> {
        self.nodes.get(self.pos)
    }

    fn next(&mut self) -> Option<&'t LexNode> {
        let node = self.nodes.get(self.pos);
        if node.is_some() {
            self.pos += 1;
        }
        node
    }

    fn peek_operator(&self) -> Option<(Operator, Span)> {
        match self.peek() {
            Some(LexNode::Token(t)) => match t.kind {
                TokenKind::Operator(op) => Some((op, t.span)),
                _ => None,
            },
            _ => None,
        }
    }
}

impl<'r> Parser<'r> {
    pub fn new(resolver: &'r dyn ReferenceResolver) -> Self {
        Self {
            resolver,
            unit_id: None,
            lexer: Lexer::default(),
            depth: Cell::new(0),
        }
    }

    /// Unit that unqualified sheet names (`Sheet2!A1`) belong to
    pub fn with_unit<U: Into<UnitId>>(mut self, unit_id: U) -> Self {
        self.unit_id = Some(unit_id.into());
        self
    }

    /// Lexer used by [`Parser::parse_text`]
    pub fn with_lexer(mut self, lexer: Lexer) -> Self {
        self.lexer = lexer;
        self
    }

    /// Lex and parse formula text
    pub fn parse_text(&self, text: &str) -> Node {
        self.parse(&self.lexer.tokenize(text))
    }

    /// Build the AST for a lexed formula
    pub fn parse(&self, tree: &LexTree) -> Node {
        let whole = match (tree.nodes.first(), tree.nodes.last()) {
            (Some(first), Some(last)) => first.span().to(last.span()),
            _ => Span::default(),
        };
        self.depth.set(0);
        let root = self.parse_sequence(&tree.nodes, whole);
        if root.depth() > MAX_TREE_DEPTH {
            return Node::invalid(CellError::Calc, "formula nested too deeply", whole);
        }

        // A syntax error anywhere makes the whole formula an error. Unknown
        // sheets stay local so that IFERROR and friends can see them.
        let hoisted = match root.first_invalid() {
            Some(Node {
                kind: NodeKind::Invalid { error, message },
                ..
            }) if *error != CellError::Ref => Some((*error, message.clone())),
            _ => None,
        };
        match hoisted {
            Some((error, message)) => Node::invalid(error, message, whole),
            None => root,
        }
    }

    fn parse_sequence(&self, nodes: &[LexNode], span: Span) -> Node {
        let end = Span::new(span.end, span.end);
        let mut cursor = Cursor::new(nodes, end);
        let node = self.parse_expr(&mut cursor, 0);
        match cursor.peek() {
            None => node,
            Some(extra) => Node::invalid(CellError::Calc, "unexpected token", extra.span()),
        }
    }

    fn parse_expr(&self, cursor: &mut Cursor<'_>, min_prec: u8) -> Node {
        let depth = self.depth.get();
        if depth >= MAX_NESTING {
            let span = cursor.peek().map_or(cursor.end, LexNode::span);
            cursor.pos = cursor.nodes.len();
            return Node::invalid(CellError::Calc, "formula nested too deeply", span);
        }
        self.depth.set(depth + 1);
        let node = self.parse_climb(cursor, min_prec);
        self.depth.set(depth);
        node
    }

    fn parse_climb(&self, cursor: &mut Cursor<'_>, min_prec: u8) -> Node {
        let mut lhs = self.parse_prefix(cursor);

        while let Some((op, op_span)) = cursor.peek_operator() {
            if op == Operator::Percent {
                if PERCENT_PRECEDENCE < min_prec {
                    break;
                }
                cursor.next();
                let span = lhs.span.to(op_span);
                lhs = Node::new(
                    NodeKind::UnaryOp {
                        op: UnaryOperator::Percent,
                        operand: Box::new(lhs),
                    },
                    span,
                );
                continue;
            }

            let bin = match binary_operator(op) {
                Some(bin) => bin,
                None => break,
            };
            let prec = bin.precedence();
            if prec < min_prec {
                break;
            }
            cursor.next();

            // Left-associative: the right side only takes tighter operators
            let rhs = self.parse_expr(cursor, prec + 1);
            let span = lhs.span.to(rhs.span);
            lhs = Node::new(
                NodeKind::BinaryOp {
                    op: bin,
                    left: Box::new(lhs),
                    right: Box::new(rhs),
                },
                span,
            );
        }

        lhs
    }

    fn parse_prefix(&self, cursor: &mut Cursor<'_>) -> Node {
        let node = match cursor.next() {
            Some(node) => node,
            None => return Node::invalid(CellError::Calc, "missing operand", cursor.end),
        };

        let token = match node {
            LexNode::Token(t) => t,
            LexNode::Group(g) => return self.parse_group(g),
            LexNode::Malformed(m) => return Node::invalid(CellError::Calc, m.reason.clone(), m.span),
        };
        let span = token.span;

        match &token.kind {
            TokenKind::Operator(Operator::Minus) => {
                let operand = self.parse_expr(cursor, NEGATE_PRECEDENCE);
                let span = span.to(operand.span);
                Node::new(
                    NodeKind::UnaryOp {
                        op: UnaryOperator::Negate,
                        operand: Box::new(operand),
                    },
                    span,
                )
            }
            // Unary plus changes nothing
            TokenKind::Operator(Operator::Plus) => self.parse_expr(cursor, NEGATE_PRECEDENCE),
            TokenKind::Number(n) => Node::new(NodeKind::Literal(Literal::Number(*n)), span),
            TokenKind::Text(s) => Node::new(NodeKind::Literal(Literal::Text(s.as_str().into())), span),
            TokenKind::Boolean(b) => Node::new(NodeKind::Literal(Literal::Boolean(*b)), span),
            TokenKind::Error(e) => Node::new(NodeKind::Literal(Literal::Error(*e)), span),
            TokenKind::Reference(r) => self.reference(r, span),
            TokenKind::Name(name) => Node::new(NodeKind::Name(name.clone()), span),
            TokenKind::Function(name) => match cursor.peek() {
                Some(LexNode::Group(g)) if g.kind == GroupKind::Paren => {
                    cursor.next();
                    self.function_call(name, g, span)
                }
                _ => Node::invalid(CellError::Calc, format!("expected '(' after {}", name), span),
            },
            TokenKind::Operator(_)
            | TokenKind::ArgumentSeparator
            | TokenKind::ArrayColumnSeparator
            | TokenKind::ArrayRowSeparator => Node::invalid(CellError::Calc, "unexpected token", span),
        }
    }

    fn parse_group(&self, group: &Group) -> Node {
        if !group.closed {
            return Node::invalid(CellError::Calc, "unclosed bracket", group.span);
        }

        match group.kind {
            GroupKind::Paren => {
                let segments = split(&group.children, group.span, |k| matches!(k, TokenKind::ArgumentSeparator));
                if segments.len() == 1 {
                    let (nodes, span) = segments[0];
                    if nodes.is_empty() {
                        return Node::invalid(CellError::Calc, "empty parentheses", group.span);
                    }
                    return self.parse_sequence(nodes, span);
                }

                let items = segments
                    .into_iter()
                    .map(|(nodes, span)| {
                        if nodes.is_empty() {
                            Node::invalid(CellError::Calc, "empty union item", span)
                        } else {
                            self.parse_sequence(nodes, span)
                        }
                    })
                    .collect();
                Node::new(NodeKind::Union(items), group.span)
            }
            GroupKind::Brace => self.array_literal(group),
            GroupKind::Bracket => {
                Node::invalid(CellError::Name, "structured references are not supported", group.span)
            }
        }
    }

    fn function_call(&self, name: &str, group: &Group, name_span: Span) -> Node {
        let span = name_span.to(group.span);
        if !group.closed {
            return Node::invalid(CellError::Calc, format!("unclosed argument list for {}", name), span);
        }

        let args = if group.children.is_empty() {
            Vec::new()
        } else {
            split(&group.children, group.span, |k| matches!(k, TokenKind::ArgumentSeparator))
                .into_iter()
                .map(|(nodes, seg_span)| {
                    if nodes.is_empty() {
                        Node::new(NodeKind::Missing, seg_span)
                    } else {
                        self.parse_sequence(nodes, seg_span)
                    }
                })
                .collect()
        };

        Node::new(
            NodeKind::FunctionCall {
                name: name.to_uppercase(),
                args,
            },
            span,
        )
    }

    fn array_literal(&self, group: &Group) -> Node {
        let mut rows = Vec::new();
        for (row_nodes, row_span) in split(&group.children, group.span, |k| {
            matches!(k, TokenKind::ArrayRowSeparator)
        }) {
            let mut row = Vec::new();
            for (nodes, span) in split(row_nodes, row_span, |k| matches!(k, TokenKind::ArrayColumnSeparator)) {
                if nodes.is_empty() {
                    return Node::invalid(CellError::Calc, "empty array element", span);
                }
                row.push(self.parse_sequence(nodes, span));
            }
            rows.push(row);
        }

        let width = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != width) {
            return Node::invalid(CellError::Calc, "array rows differ in length", group.span);
        }
        Node::new(NodeKind::ArrayLiteral(rows), group.span)
    }

    fn reference(&self, token: &ReferenceToken, span: Span) -> Node {
        let range = match parse_area(&token.area) {
            Some(range) => range,
            None => return Node::invalid(CellError::Ref, format!("invalid reference {}", token.area), span),
        };

        let sheet_name = match &token.sheet {
            None => {
                return Node::new(
                    NodeKind::Reference {
                        unit_id: None,
                        sheet_id: None,
                        range,
                    },
                    span,
                )
            }
            Some(sheet) => sheet,
        };

        let unit_id = match &token.workbook {
            Some(book) => self.resolver.unit_id(book),
            None => self.unit_id.clone(),
        };
        let unit_id = match unit_id {
            Some(id) => id,
            None => {
                return Node::invalid(
                    CellError::Ref,
                    format!("unknown workbook {}", token.workbook.as_deref().unwrap_or("")),
                    span,
                )
            }
        };

        match self.resolver.sheet_id(&unit_id, sheet_name) {
            Some(sheet_id) => Node::new(
                NodeKind::Reference {
                    unit_id: Some(unit_id),
                    sheet_id: Some(sheet_id),
                    range,
                },
                span,
            ),
            None => Node::invalid(CellError::Ref, format!("unknown sheet '{}'", sheet_name), span),
        }
    }
}

fn binary_operator(op: Operator) -> Option<BinaryOperator> {
    Some(match op {
        Operator::Plus => BinaryOperator::Add,
        Operator::Minus => BinaryOperator::Subtract,
        Operator::Multiply => BinaryOperator::Multiply,
        Operator::Divide => BinaryOperator::Divide,
        Operator::Power => BinaryOperator::Power,
        Operator::Concat => BinaryOperator::Concat,
        Operator::Equal => BinaryOperator::Equal,
        Operator::NotEqual => BinaryOperator::NotEqual,
        Operator::Less => BinaryOperator::LessThan,
        Operator::LessEqual => BinaryOperator::LessEqual,
        Operator::Greater => BinaryOperator::GreaterThan,
        Operator::GreaterEqual => BinaryOperator::GreaterEqual,
        Operator::Colon => BinaryOperator::Range,
        Operator::Intersect => BinaryOperator::Intersect,
        Operator::Percent => return None,
    })
}

/// Split sibling nodes at separator tokens, keeping an approximate span per piece
fn split<F>(nodes: &[LexNode], outer: Span, is_separator: F) -> Vec<(&[LexNode], Span)>
where
    F: Fn(&TokenKind) -> bool,
{
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut piece_start = outer.start + 1;

    for (i, node) in nodes.iter().enumerate() {
        if let LexNode::Token(t) = node {
            if is_separator(&t.kind) {
                pieces.push((&nodes[start..i], Span::new(piece_start, t.span.start)));
                start = i + 1;
                piece_start = t.span.end;
            }
        }
    }
    pieces.push((&nodes[start..], Span::new(piece_start, outer.end.saturating_sub(1).max(piece_start))));
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use duke_calc_core::{CellRange, UnitSheetNameMap};
    use pretty_assertions::assert_eq;

    /// Render the tree shape, ignoring spans
    fn shape(formula: &str) -> String {
        parse_formula(formula).to_string()
    }

    fn error_of(node: &Node) -> Option<CellError> {
        match &node.kind {
            NodeKind::Invalid { error, .. } => Some(*error),
            _ => None,
        }
    }

    #[test]
    fn test_parse_simple() {
        assert_eq!(shape("=42"), "42");
        assert_eq!(shape("=\"a\"\"b\""), "\"a\"\"b\"");
        assert_eq!(shape("=TRUE"), "TRUE");
        assert_eq!(shape("=#REF!"), "#REF!");
    }

    #[test]
    fn test_parse_precedence() {
        assert_eq!(shape("=1+2*3"), "(1+(2*3))");
        assert_eq!(shape("=(1+2)*3"), "((1+2)*3)");
        assert_eq!(shape("=1-2-3"), "((1-2)-3)");
        assert_eq!(shape("=2^3^2"), "((2^3)^2)");
        assert_eq!(shape("=-2^2"), "-(2^2)");
        assert_eq!(shape("=2*-3"), "(2*-3)");
        assert_eq!(shape("=50%^2"), "(50%^2)");
        assert_eq!(shape("=1&2=\"12\""), "((1&2)=\"12\")");
        assert_eq!(shape("=1+2&3"), "((1+2)&3)");
        assert_eq!(shape("=+5"), "5");
    }

    #[test]
    fn test_parse_references() {
        let node = parse_formula("=$A$1:B2");
        match node.kind {
            NodeKind::Reference {
                unit_id: None,
                sheet_id: None,
                range,
            } => assert_eq!(range, CellRange::parse("$A$1:B2").unwrap()),
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(shape("=A1:B2 B1:C3"), "(A1:B2 B1:C3)");
        assert_eq!(shape("=A1:INDEX(B1:B3,2)"), "(A1:INDEX(B1:B3,2))");
    }

    #[test]
    fn test_parse_qualified_references() {
        let mut names = UnitSheetNameMap::new();
        names.insert("u1", "Data Sheet", "s2");
        names.insert("u2", "Sheet1", "t1");
        names.insert_unit_name("Other.xlsx", "u2");
        let parser = Parser::new(&names).with_unit("u1");

        let node = parser.parse_text("='data sheet'!B3");
        assert!(matches!(
            node.kind,
            NodeKind::Reference { unit_id: Some(ref u), sheet_id: Some(ref s), .. } if u == "u1" && s == "s2"
        ));

        let node = parser.parse_text("=[Other.xlsx]Sheet1!A1");
        assert!(matches!(
            node.kind,
            NodeKind::Reference { unit_id: Some(ref u), sheet_id: Some(ref s), .. } if u == "u2" && s == "t1"
        ));

        // Unknown sheets are #REF! but do not poison the rest of the formula
        let node = parser.parse_text("=IFERROR(Missing!A1,0)");
        match &node.kind {
            NodeKind::FunctionCall { args, .. } => assert_eq!(error_of(&args[0]), Some(CellError::Ref)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_function_args() {
        assert_eq!(shape("=sum(1,A1:B2,MAX(3,4))"), "SUM(1,A1:B2,MAX(3,4))");
        assert_eq!(shape("=ROWS()"), "ROWS()");

        let node = parse_formula("=IF(A1,,2)");
        match &node.kind {
            NodeKind::FunctionCall { name, args } => {
                assert_eq!(name, "IF");
                assert_eq!(args.len(), 3);
                assert_eq!(args[1].kind, NodeKind::Missing);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_array_and_union() {
        assert_eq!(shape("={1,2;3,4}"), "{1,2;3,4}");
        assert_eq!(shape("=SUM((A1,B2:C3))"), "SUM((A1,B2:C3))");
        assert_eq!(error_of(&parse_formula("={1,2;3}")), Some(CellError::Calc));
    }

    #[test]
    fn test_malformed_input_becomes_error_node() {
        for bad in ["=", "=1+", "=(1+2", "=1+2)", "=SUM(1,2", "=\"abc", "=1 \"x\"", "1+1", "=1+*2"] {
            let node = parse_formula(bad);
            assert_eq!(error_of(&node), Some(CellError::Calc), "{}", bad);
        }
        assert_eq!(error_of(&parse_formula("=[Col]+1")), Some(CellError::Name));
    }

    #[test]
    fn test_deep_nesting_is_calc() {
        // Small stack, as on a worker thread
        let handle = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(|| {
                let nested = |n: usize| format!("={}1{}", "(".repeat(n), ")".repeat(n));
                assert_eq!(parse_formula(&nested(40)).kind, NodeKind::Literal(Literal::Number(1.0)));
                assert_eq!(error_of(&parse_formula(&nested(5000))), Some(CellError::Calc));
                assert_eq!(error_of(&parse_formula(&format!("={}1", "-".repeat(5000)))), Some(CellError::Calc));
                assert_eq!(
                    error_of(&parse_formula(&format!("=SUM({}1{})", "ABS(".repeat(3000), ")".repeat(3000)))),
                    Some(CellError::Calc)
                );
            })
            .unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_long_operator_chain() {
        let chain = |n: usize| format!("=1{}", "+1".repeat(n));
        assert!(!parse_formula(&chain(500)).is_invalid());
        assert_eq!(parse_formula(&chain(500)).depth(), 501);
        assert_eq!(error_of(&parse_formula(&chain(MAX_TREE_DEPTH + 10))), Some(CellError::Calc));
    }

    #[test]
    fn test_node_ids_are_unique() {
        let a = parse_formula("=1+2");
        let b = parse_formula("=1+2");
        assert_eq!(a, b);
        assert_ne!(a.id, b.id);

        let mut ids = Vec::new();
        a.walk(&mut |n| ids.push(n.id));
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }
}
