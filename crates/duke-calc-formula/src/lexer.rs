//! Formula lexer
//!
//! Turns formula text into a [`LexTree`]: tokens nested by bracket groups.
//! Bad input never aborts; unterminated strings, stray characters and stray
//! closers become [`Malformed`] nodes, and groups left open at the end of the
//! input are kept with `closed: false`.

use duke_calc_core::CellError;
use lazy_regex::regex;

use crate::ast::Span;
use crate::reference::parse_area;

/// Open brackets kept as groups; deeper openers become malformed nodes
pub const MAX_GROUP_DEPTH: usize = 512;

/// Locale-dependent separators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexerOptions {
    pub argument_separator: char,
    pub decimal_separator: char,
    pub array_column_separator: char,
    pub array_row_separator: char,
}

impl Default for LexerOptions {
    fn default() -> Self {
        Self {
            argument_separator: ',',
            decimal_separator: '.',
            array_column_separator: ',',
            array_row_separator: ';',
        }
    }
}

impl LexerOptions {
    /// Locales that use `,` as the decimal separator (`=SUM(1,5;2)`)
    pub fn semicolon() -> Self {
        Self {
            argument_separator: ';',
            decimal_separator: ',',
            array_column_separator: '\\',
            array_row_separator: ';',
        }
    }
}

/// Operator tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Plus,
    Minus,
    Multiply,
    Divide,
    Power,
    Percent,
    Concat,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    /// `:` between two operands that did not lex as one reference
    Colon,
    /// Significant whitespace between two operands
    Intersect,
}

/// A cell/range reference as written
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceToken {
    /// `[Book]` qualifier
    pub workbook: Option<String>,
    /// Sheet qualifier, unquoted and with `''` unescaped
    pub sheet: Option<String>,
    /// `A1`, `$A$1:B2`, `A:C` or `1:3`
    pub area: String,
    /// Where `area` sits in the source
    pub area_span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(CellError),
    Operator(Operator),
    /// Function name (uppercase); the argument group follows
    Function(String),
    Reference(ReferenceToken),
    /// Defined name
    Name(String),
    ArgumentSeparator,
    ArrayColumnSeparator,
    ArrayRowSeparator,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    /// `( )`
    Paren,
    /// `{ }` array constant
    Brace,
    /// `[ ]` structured reference
    Bracket,
}

impl GroupKind {
    fn closer(&self) -> char {
        match self {
            GroupKind::Paren => ')',
            GroupKind::Brace => '}',
            GroupKind::Bracket => ']',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub kind: GroupKind,
    pub children: Vec<LexNode>,
    /// Opening bracket through closing bracket (or end of input)
    pub span: Span,
    pub closed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Malformed {
    pub reason: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LexNode {
    Token(Token),
    Group(Group),
    Malformed(Malformed),
}

impl LexNode {
    pub fn span(&self) -> Span {
        match self {
            LexNode::Token(t) => t.span,
            LexNode::Group(g) => g.span,
            LexNode::Malformed(m) => m.span,
        }
    }
}

/// Output of [`Lexer::tokenize`]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LexTree {
    pub nodes: Vec<LexNode>,
}

impl LexTree {
    /// Every token, flattened in source order
    pub fn tokens(&self) -> Vec<&Token> {
        fn collect<'a>(nodes: &'a [LexNode], out: &mut Vec<&'a Token>) {
            for node in nodes {
                match node {
                    LexNode::Token(t) => out.push(t),
                    LexNode::Group(g) => collect(&g.children, out),
                    LexNode::Malformed(_) => {}
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.nodes, &mut out);
        out
    }

    /// No malformed nodes and every group closed
    pub fn is_well_formed(&self) -> bool {
        fn check(nodes: &[LexNode]) -> bool {
            nodes.iter().all(|node| match node {
                LexNode::Token(_) => true,
                LexNode::Group(g) => g.closed && check(&g.children),
                LexNode::Malformed(_) => false,
            })
        }
        check(&self.nodes)
    }
}

/// Formula lexer
#[derive(Debug, Clone, Default)]
pub struct Lexer {
    options: LexerOptions,
}

struct Frame {
    kind: Option<GroupKind>,
    start: usize,
    children: Vec<LexNode>,
}

struct State<'a> {
    src: &'a str,
    pos: usize,
    stack: Vec<Frame>,
    /// Last emitted node can end an operand (so whitespace may intersect)
    after_operand: bool,
}

impl<'a> State<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn push(&mut self, node: LexNode) {
        self.after_operand = match &node {
            LexNode::Token(t) => matches!(
                t.kind,
                TokenKind::Number(_)
                    | TokenKind::Text(_)
                    | TokenKind::Boolean(_)
                    | TokenKind::Error(_)
                    | TokenKind::Reference(_)
                    | TokenKind::Name(_)
                    | TokenKind::Operator(Operator::Percent)
            ),
            LexNode::Group(g) => g.closed,
            LexNode::Malformed(_) => false,
        };
        if let Some(frame) = self.stack.last_mut() {
            frame.children.push(node);
        }
    }

    fn token(&mut self, kind: TokenKind, start: usize) {
        let span = Span::new(start, self.pos);
        self.push(LexNode::Token(Token { kind, span }));
    }

    fn malformed<S: Into<String>>(&mut self, reason: S, start: usize) {
        let span = Span::new(start, self.pos);
        self.push(LexNode::Malformed(Malformed {
            reason: reason.into(),
            span,
        }));
    }

    fn in_brace(&self) -> bool {
        matches!(self.stack.last(), Some(Frame { kind: Some(GroupKind::Brace), .. }))
    }
}

impl Lexer {
    pub fn new(options: LexerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &LexerOptions {
        &self.options
    }

    /// Tokenize a formula (`=...`)
    pub fn tokenize(&self, text: &str) -> LexTree {
        let mut state = State {
            src: text,
            pos: 0,
            stack: vec![Frame {
                kind: None,
                start: 0,
                children: Vec::new(),
            }],
            after_operand: false,
        };

        let leading = text.len() - text.trim_start().len();
        state.pos = leading;
        if state.peek() == Some('=') {
            state.pos += 1;
        } else {
            state.malformed("formula must start with '='", leading);
        }

        while let Some(c) = state.peek() {
            self.next_node(&mut state, c);
        }

        // Close whatever is still open
        while state.stack.len() > 1 {
            if let Some(frame) = state.stack.pop() {
                let group = Group {
                    kind: frame.kind.unwrap_or(GroupKind::Paren),
                    children: frame.children,
                    span: Span::new(frame.start, state.pos),
                    closed: false,
                };
                state.push(LexNode::Group(group));
            }
        }

        LexTree {
            nodes: state.stack.pop().map(|f| f.children).unwrap_or_default(),
        }
    }

    fn next_node(&self, state: &mut State<'_>, c: char) {
        let start = state.pos;
        let opts = &self.options;

        if c.is_whitespace() {
            self.whitespace(state);
            return;
        }

        // Separators depend on the enclosing group
        if state.in_brace() {
            if c == opts.array_column_separator {
                state.pos += c.len_utf8();
                state.token(TokenKind::ArrayColumnSeparator, start);
                return;
            }
            if c == opts.array_row_separator {
                state.pos += c.len_utf8();
                state.token(TokenKind::ArrayRowSeparator, start);
                return;
            }
        }
        if c == opts.argument_separator {
            state.pos += c.len_utf8();
            state.token(TokenKind::ArgumentSeparator, start);
            return;
        }

        match c {
            '"' => self.text(state),
            '#' => self.error_literal(state),
            '(' | '{' | '[' if state.stack.len() > MAX_GROUP_DEPTH => {
                state.pos += 1;
                state.malformed("brackets nested too deeply", start);
            }
            '(' | '{' => {
                state.pos += 1;
                let kind = if c == '(' { GroupKind::Paren } else { GroupKind::Brace };
                state.stack.push(Frame {
                    kind: Some(kind),
                    start,
                    children: Vec::new(),
                });
                state.after_operand = false;
            }
            '[' => {
                if !self.reference(state) {
                    state.pos += 1;
                    state.stack.push(Frame {
                        kind: Some(GroupKind::Bracket),
                        start,
                        children: Vec::new(),
                    });
                    state.after_operand = false;
                }
            }
            ')' | '}' | ']' => self.close(state, c),
            '\'' => {
                if !self.reference(state) {
                    state.pos = state.src.len();
                    state.malformed("unterminated or unqualified sheet name", start);
                }
            }
            '$' => {
                if !self.reference(state) {
                    state.pos += 1;
                    state.malformed("unexpected '$'", start);
                }
            }
            _ if c.is_ascii_digit() => {
                if !self.reference(state) {
                    self.number(state);
                }
            }
            _ if c == opts.decimal_separator
                && state.peek_nth(1).map_or(false, |n| n.is_ascii_digit()) =>
            {
                self.number(state)
            }
            _ if c.is_alphabetic() || c == '_' || c == '\\' => self.identifier(state),
            _ => self.operator(state, c),
        }
    }

    fn whitespace(&self, state: &mut State<'_>) {
        let start = state.pos;
        while state.peek().map_or(false, char::is_whitespace) {
            state.pos += state.peek().map_or(1, char::len_utf8);
        }

        // `A1:B2 B1:C3` - whitespace between two operands is the intersection operator
        let next_starts_operand = state.peek().map_or(false, |c| {
            c.is_alphanumeric() || matches!(c, '$' | '\'' | '(' | '_' | '[')
        });
        if state.after_operand && next_starts_operand {
            state.token(TokenKind::Operator(Operator::Intersect), start);
        }
    }

    fn close(&self, state: &mut State<'_>, c: char) {
        let start = state.pos;
        state.pos += 1;
        let matches_top = state
            .stack
            .last()
            .and_then(|f| f.kind)
            .map_or(false, |k| k.closer() == c);

        if !matches_top {
            state.malformed(format!("unmatched '{}'", c), start);
            return;
        }

        if let Some(frame) = state.stack.pop() {
            let group = Group {
                kind: frame.kind.unwrap_or(GroupKind::Paren),
                children: frame.children,
                span: Span::new(frame.start, state.pos),
                closed: true,
            };
            state.push(LexNode::Group(group));
        }
    }

    fn text(&self, state: &mut State<'_>) {
        let start = state.pos;
        state.pos += 1;
        let mut value = String::new();

        loop {
            match state.peek() {
                None => {
                    state.malformed("unterminated string", start);
                    return;
                }
                Some('"') => {
                    state.pos += 1;
                    if state.peek() == Some('"') {
                        value.push('"');
                        state.pos += 1;
                    } else {
                        break;
                    }
                }
                Some(ch) => {
                    value.push(ch);
                    state.pos += ch.len_utf8();
                }
            }
        }

        state.token(TokenKind::Text(value), start);
    }

    fn error_literal(&self, state: &mut State<'_>) {
        let start = state.pos;
        let rest = state.rest();
        let found = CellError::ALL.into_iter().find(|e| {
            let text = e.as_str();
            rest.get(..text.len())
                .map_or(false, |head| head.eq_ignore_ascii_case(text))
        });

        match found {
            Some(e) => {
                state.pos += e.as_str().len();
                state.token(TokenKind::Error(e), start);
            }
            None => {
                state.pos += 1;
                while state
                    .peek()
                    .map_or(false, |c| c.is_alphanumeric() || matches!(c, '/' | '!' | '?' | '_'))
                {
                    state.pos += state.peek().map_or(1, char::len_utf8);
                }
                state.malformed("unknown error literal", start);
            }
        }
    }

    fn number(&self, state: &mut State<'_>) {
        let start = state.pos;
        let dec = self.options.decimal_separator;
        let mut text = String::new();

        let digits = |state: &mut State<'_>, text: &mut String| {
            while let Some(c) = state.peek().filter(char::is_ascii_digit) {
                text.push(c);
                state.pos += 1;
            }
        };

        digits(state, &mut text);
        if state.peek() == Some(dec) && state.peek_nth(1).map_or(false, |c| c.is_ascii_digit()) {
            text.push('.');
            state.pos += dec.len_utf8();
            digits(state, &mut text);
        } else if state.peek() == Some(dec) && dec == '.' {
            // "1." is a valid number
            state.pos += 1;
        }

        // Exponent only when digits follow
        if matches!(state.peek(), Some('e' | 'E')) {
            let sign = state.peek_nth(1);
            let (skip, has_digits) = match sign {
                Some('+' | '-') => (2, state.peek_nth(2).map_or(false, |c| c.is_ascii_digit())),
                Some(c) => (1, c.is_ascii_digit()),
                None => (1, false),
            };
            if has_digits {
                text.push('e');
                if skip == 2 {
                    text.push(sign.unwrap_or('+'));
                }
                state.pos += skip;
                digits(state, &mut text);
            }
        }

        match text.parse::<f64>() {
            Ok(n) if n.is_finite() => state.token(TokenKind::Number(n), start),
            _ => state.malformed("invalid number", start),
        }
    }

    /// Try to lex a (possibly qualified) reference at the current position
    fn reference(&self, state: &mut State<'_>) -> bool {
        let rest = state.rest();
        let re = regex!(
            r#"^(?:\[(?P<book>[^\]]+)\])?(?:(?P<sheet>'(?:[^']|'')+'|[A-Za-z_\\][\w.]*)!)?(?P<area>\$?[A-Za-z]{1,3}\$?[0-9]+(?::\$?[A-Za-z]{1,3}\$?[0-9]+)?|\$?[A-Za-z]{1,3}:\$?[A-Za-z]{1,3}|\$?[0-9]+:\$?[0-9]+)"#
        );

        let caps = match re.captures(rest) {
            Some(caps) => caps,
            None => return false,
        };
        let (whole, area) = match (caps.get(0), caps.name("area")) {
            (Some(w), Some(a)) => (w, a),
            _ => return false,
        };

        // A1 must not run into an identifier (A1B, LOG10(, Sheet1!A1.x)
        let boundary_ok = rest[whole.end()..]
            .chars()
            .next()
            .map_or(true, |c| !(c.is_alphanumeric() || matches!(c, '_' | '.' | '(' | '!' | '$')));
        if !boundary_ok || parse_area(area.as_str()).is_none() {
            return false;
        }

        let mut workbook = caps.name("book").map(|m| m.as_str().to_string());
        let mut sheet = caps.name("sheet").map(|m| {
            let s = m.as_str();
            match s.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
                Some(quoted) => quoted.replace("''", "'"),
                None => s.to_string(),
            }
        });

        // '[Book]Sheet 1'!A1 carries the workbook inside the quotes
        if workbook.is_none() {
            if let Some(s) = sheet.as_deref() {
                if let Some((book, name)) = s.strip_prefix('[').and_then(|s| s.split_once(']')) {
                    workbook = Some(book.to_string());
                    sheet = Some(name.to_string());
                }
            }
        }
        if workbook.is_some() && sheet.is_none() {
            return false;
        }

        let start = state.pos;
        let area_span = Span::new(start + area.start(), start + area.end());
        state.pos += whole.end();
        state.token(
            TokenKind::Reference(ReferenceToken {
                workbook,
                sheet,
                area: area.as_str().to_string(),
                area_span,
            }),
            start,
        );
        true
    }

    fn identifier(&self, state: &mut State<'_>) {
        let src = state.src;
        let start = state.pos;
        let len: usize = src[start..]
            .chars()
            .take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '\\'))
            .map(char::len_utf8)
            .sum();
        let name = &src[start..start + len];
        let followed_by_paren = src[start + len..].starts_with('(');

        if followed_by_paren {
            state.pos += len;
            state.token(TokenKind::Function(name.to_uppercase()), start);
            return;
        }

        if self.reference(state) {
            return;
        }

        state.pos += len;
        if name.eq_ignore_ascii_case("TRUE") {
            state.token(TokenKind::Boolean(true), start);
        } else if name.eq_ignore_ascii_case("FALSE") {
            state.token(TokenKind::Boolean(false), start);
        } else {
            state.token(TokenKind::Name(name.to_string()), start);
        }
    }

    fn operator(&self, state: &mut State<'_>, c: char) {
        let start = state.pos;
        let two = state.rest().get(..2);
        let (op, len) = match (c, two) {
            (_, Some("<>")) => (Some(Operator::NotEqual), 2),
            (_, Some("<=")) => (Some(Operator::LessEqual), 2),
            (_, Some(">=")) => (Some(Operator::GreaterEqual), 2),
            ('+', _) => (Some(Operator::Plus), 1),
            ('-', _) => (Some(Operator::Minus), 1),
            ('*', _) => (Some(Operator::Multiply), 1),
            ('/', _) => (Some(Operator::Divide), 1),
            ('^', _) => (Some(Operator::Power), 1),
            ('%', _) => (Some(Operator::Percent), 1),
            ('&', _) => (Some(Operator::Concat), 1),
            ('=', _) => (Some(Operator::Equal), 1),
            ('<', _) => (Some(Operator::Less), 1),
            ('>', _) => (Some(Operator::Greater), 1),
            (':', _) => (Some(Operator::Colon), 1),
            _ => (None, c.len_utf8()),
        };

        state.pos += len;
        match op {
            Some(op) => state.token(TokenKind::Operator(op), start),
            None => state.malformed(format!("unexpected character '{}'", c), start),
        }
    }
}

/// Tokenize with the default options
pub fn tokenize(text: &str) -> LexTree {
    Lexer::default().tokenize(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text).tokens().into_iter().map(|t| t.kind.clone()).collect()
    }

    fn reference(sheet: Option<&str>, area: &str) -> ReferenceToken {
        ReferenceToken {
            workbook: None,
            sheet: sheet.map(str::to_string),
            area: area.to_string(),
            area_span: Span::default(),
        }
    }

    fn refs(text: &str) -> Vec<ReferenceToken> {
        tokenize(text)
            .tokens()
            .into_iter()
            .filter_map(|t| match &t.kind {
                TokenKind::Reference(r) => Some(ReferenceToken {
                    area_span: Span::default(),
                    ..r.clone()
                }),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("=42"), vec![TokenKind::Number(42.0)]);
        assert_eq!(kinds("=1.5E+3"), vec![TokenKind::Number(1500.0)]);
        assert_eq!(kinds("=2e-2"), vec![TokenKind::Number(0.02)]);
        assert_eq!(kinds("=.5"), vec![TokenKind::Number(0.5)]);
        assert_eq!(
            kinds("=50%"),
            vec![TokenKind::Number(50.0), TokenKind::Operator(Operator::Percent)]
        );
    }

    #[test]
    fn test_text_escapes() {
        assert_eq!(kinds(r#"="say ""hi""""#), vec![TokenKind::Text("say \"hi\"".into())]);
        assert_eq!(kinds(r#"="""#), vec![TokenKind::Text(String::new())]);
    }

    #[test]
    fn test_unterminated_string_is_malformed() {
        let tree = tokenize("=\"abc");
        assert!(!tree.is_well_formed());
        match &tree.nodes[0] {
            LexNode::Malformed(m) => {
                assert_eq!(m.reason, "unterminated string");
                assert_eq!(m.span, Span::new(1, 5));
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_literals_and_errors() {
        assert_eq!(
            kinds("=TRUE&false&#N/A&#div/0!"),
            vec![
                TokenKind::Boolean(true),
                TokenKind::Operator(Operator::Concat),
                TokenKind::Boolean(false),
                TokenKind::Operator(Operator::Concat),
                TokenKind::Error(CellError::Na),
                TokenKind::Operator(Operator::Concat),
                TokenKind::Error(CellError::Div0),
            ]
        );
    }

    #[test]
    fn test_references() {
        assert_eq!(refs("=A1+$B$2"), vec![reference(None, "A1"), reference(None, "$B$2")]);
        assert_eq!(refs("=SUM(C2:F3)"), vec![reference(None, "C2:F3")]);
        assert_eq!(refs("=A:C"), vec![reference(None, "A:C")]);
        assert_eq!(refs("=SUM(1:3)"), vec![reference(None, "1:3")]);
        assert_eq!(refs("=Sheet2!B7"), vec![reference(Some("Sheet2"), "B7")]);
        assert_eq!(refs("='My ''Q1'' Data'!A1:B2"), vec![reference(Some("My 'Q1' Data"), "A1:B2")]);
    }

    #[test]
    fn test_workbook_qualifier() {
        let expected = ReferenceToken {
            workbook: Some("Book2.xlsx".into()),
            sheet: Some("Sheet 1".into()),
            area: "A1".into(),
            area_span: Span::default(),
        };
        assert_eq!(refs("=[Book2.xlsx]'Sheet 1'!A1"), vec![expected.clone()]);
        assert_eq!(refs("='[Book2.xlsx]Sheet 1'!A1"), vec![expected]);
    }

    #[test]
    fn test_area_span() {
        let tree = tokenize("=1+'My Sheet'!$C$3");
        let tokens = tree.tokens();
        match &tokens[2].kind {
            TokenKind::Reference(r) => {
                assert_eq!(r.area_span, Span::new(14, 18));
                assert_eq!(tokens[2].span, Span::new(3, 18));
            }
            other => panic!("unexpected token {:?}", other),
        }
    }

    #[test]
    fn test_functions_and_names() {
        let tree = tokenize("=log10(Rate)");
        assert_eq!(tree.nodes.len(), 2);
        assert_eq!(
            kinds("=log10(Rate)"),
            vec![TokenKind::Function("LOG10".into()), TokenKind::Name("Rate".into())]
        );
        assert_eq!(kinds("=ERROR.TYPE(1)")[0], TokenKind::Function("ERROR.TYPE".into()));
        // Valid column letters plus digits is a cell
        assert_eq!(refs("=TAX2023"), vec![reference(None, "TAX2023")]);
        // Past XFD it is a name
        assert_eq!(kinds("=ZZZ1"), vec![TokenKind::Name("ZZZ1".into())]);
    }

    #[test]
    fn test_groups() {
        let tree = tokenize("=SUM((1,2),{1,2;3,4})");
        match &tree.nodes[1] {
            LexNode::Group(g) => {
                assert_eq!(g.kind, GroupKind::Paren);
                assert!(g.closed);
                assert_eq!(g.children.len(), 3);
                match &g.children[2] {
                    LexNode::Group(inner) => {
                        assert_eq!(inner.kind, GroupKind::Brace);
                        let seps: Vec<_> = inner
                            .children
                            .iter()
                            .filter_map(|n| match n {
                                LexNode::Token(t) if !matches!(t.kind, TokenKind::Number(_)) => Some(t.kind.clone()),
                                _ => None,
                            })
                            .collect();
                        assert_eq!(
                            seps,
                            vec![
                                TokenKind::ArrayColumnSeparator,
                                TokenKind::ArrayRowSeparator,
                                TokenKind::ArrayColumnSeparator
                            ]
                        );
                    }
                    other => panic!("unexpected node {:?}", other),
                }
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_unclosed_and_stray_brackets() {
        let tree = tokenize("=(1+2");
        match &tree.nodes[0] {
            LexNode::Group(g) => assert!(!g.closed),
            other => panic!("unexpected node {:?}", other),
        }

        let tree = tokenize("=1+2)");
        assert!(matches!(tree.nodes.last(), Some(LexNode::Malformed(_))));
        assert!(!tree.is_well_formed());

        let tree = tokenize("=Table1[Col]");
        assert!(tree
            .nodes
            .iter()
            .any(|n| matches!(n, LexNode::Group(Group { kind: GroupKind::Bracket, .. }))));
    }

    #[test]
    fn test_group_depth_is_capped() {
        let n = MAX_GROUP_DEPTH + 100;
        let tree = tokenize(&format!("={}1{}", "(".repeat(n), ")".repeat(n)));
        assert!(!tree.is_well_formed());

        let mut depth = 0;
        let mut nodes = &tree.nodes;
        while let Some(LexNode::Group(g)) = nodes.iter().find(|n| matches!(n, LexNode::Group(_))) {
            depth += 1;
            nodes = &g.children;
        }
        assert_eq!(depth, MAX_GROUP_DEPTH);
    }

    #[test]
    fn test_intersection_whitespace() {
        assert_eq!(
            kinds("=A1:B2 B1:C3"),
            vec![
                TokenKind::Reference(ReferenceToken {
                    area_span: Span::new(1, 6),
                    ..reference(None, "A1:B2")
                }),
                TokenKind::Operator(Operator::Intersect),
                TokenKind::Reference(ReferenceToken {
                    area_span: Span::new(7, 12),
                    ..reference(None, "B1:C3")
                }),
            ]
        );
        // Whitespace around operators is insignificant
        assert_eq!(kinds("= 1 + 2 ").len(), 3);
        assert_eq!(kinds("=SUM( A1 , B1 )").len(), 4);
    }

    #[test]
    fn test_semicolon_locale() {
        let lexer = Lexer::new(LexerOptions::semicolon());
        let tree = lexer.tokenize("=SUM(1,5;{1\\2;3\\4})");
        let kinds: Vec<_> = tree.tokens().into_iter().map(|t| t.kind.clone()).collect();
        assert_eq!(kinds[1], TokenKind::Number(1.5));
        assert_eq!(kinds[2], TokenKind::ArgumentSeparator);
        assert_eq!(kinds[4], TokenKind::ArrayColumnSeparator);
        assert_eq!(kinds[6], TokenKind::ArrayRowSeparator);
    }

    #[test]
    fn test_missing_equals_is_malformed() {
        let tree = tokenize("1+1");
        assert!(matches!(tree.nodes[0], LexNode::Malformed(_)));
    }
}
