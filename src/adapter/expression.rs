//! Property expressions for configuration-driven parsing
//!
//! A synchronous XPath 1.0 subset evaluated against one element:
//!
//! - location paths: `/`, `//`, `.`, `..`, `@attr`, `*`, `text()`,
//!   `node()`, names and the `child`, `descendant`, `descendant-or-self`,
//!   `parent`, `ancestor`, `ancestor-or-self`, `self` and `attribute` axes
//! - predicates: positional (`[2]`) and boolean (`[@aria-label='x']`)
//! - operators: `|`, `=`, `!=`, `<`, `<=`, `>`, `>=`, `and`, `or`, unary `-`
//! - functions: `string`, `concat`, `substring-before`, `substring-after`,
//!   `substring`, `normalize-space`, `contains`, `starts-with`,
//!   `string-length`, `count`, `not`, `true`, `false`, `boolean`,
//!   `number`, `position`, `last`
//!
//! Expressions are parsed once; arity and unknown functions are rejected at
//! parse time.

use crate::dom::{Child, Document, ElementId};
use crate::tree::PropertyValue;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { message: String, offset: usize },

    #[error("unknown function {0}()")]
    UnknownFunction(String),

    #[error("{name}() expects {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: String,
        found: usize,
    },

    #[error("type error: {0}")]
    Type(String),
}

/// A parsed property expression.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    ast: Expr,
}

impl Expression {
    pub fn parse(input: &str) -> Result<Self, ExprError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: input.len(),
        };
        let ast = parser.expr()?;
        if let Some((token, offset)) = parser.tokens.get(parser.pos) {
            return Err(ExprError::Syntax {
                message: format!("unexpected {:?}", token),
                offset: *offset,
            });
        }
        Ok(Self {
            source: input.to_string(),
            ast,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Evaluate with `element` as the context node.
    ///
    /// Node-sets yield the string value of their first node, or null when
    /// empty.
    pub fn evaluate(&self, doc: &Document, element: ElementId) -> Result<PropertyValue, ExprError> {
        let eval = Evaluator { doc };
        let focus = Focus {
            node: NodeRef::Element(element),
            position: 1,
            size: 1,
        };
        Ok(match eval.eval(&self.ast, focus)? {
            Value::Nodes(nodes) => match nodes.first() {
                Some(node) => PropertyValue::String(eval.node_string(*node)),
                None => PropertyValue::Null,
            },
            Value::String(s) => PropertyValue::String(s),
            Value::Number(n) => PropertyValue::Number(n),
            Value::Bool(b) => PropertyValue::Bool(b),
        })
    }
}

impl std::str::FromStr for Expression {
    type Err = ExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Syntax
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    Dot,
    DotDot,
    At,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Pipe,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Minus,
    Star,
    ColonColon,
    Literal(String),
    Number(f64),
    Name(String),
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, ExprError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let peek = |i: usize| chars.get(i).map(|(_, c)| *c);

    while let Some(&(offset, c)) = chars.get(i) {
        let (token, width) = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '/' if peek(i + 1) == Some('/') => (Token::DoubleSlash, 2),
            '/' => (Token::Slash, 1),
            '.' if peek(i + 1) == Some('.') => (Token::DotDot, 2),
            '.' if !peek(i + 1).is_some_and(|c| c.is_ascii_digit()) => (Token::Dot, 1),
            '@' => (Token::At, 1),
            '[' => (Token::LBracket, 1),
            ']' => (Token::RBracket, 1),
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            ',' => (Token::Comma, 1),
            '|' => (Token::Pipe, 1),
            '=' => (Token::Eq, 1),
            '!' if peek(i + 1) == Some('=') => (Token::NotEq, 2),
            '<' if peek(i + 1) == Some('=') => (Token::Le, 2),
            '<' => (Token::Lt, 1),
            '>' if peek(i + 1) == Some('=') => (Token::Ge, 2),
            '>' => (Token::Gt, 1),
            '-' => (Token::Minus, 1),
            '*' => (Token::Star, 1),
            ':' if peek(i + 1) == Some(':') => (Token::ColonColon, 2),
            quote @ ('"' | '\'') => {
                let mut end = i + 1;
                while peek(end).is_some_and(|c| c != quote) {
                    end += 1;
                }
                if peek(end).is_none() {
                    return Err(ExprError::Syntax {
                        message: "unterminated string literal".to_string(),
                        offset,
                    });
                }
                let text: String = chars[i + 1..end].iter().map(|(_, c)| *c).collect();
                (Token::Literal(text), end + 1 - i)
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut end = i;
                while peek(end).is_some_and(|c| c.is_ascii_digit() || c == '.') {
                    end += 1;
                }
                let text: String = chars[i..end].iter().map(|(_, c)| *c).collect();
                let value = text.parse::<f64>().map_err(|_| ExprError::Syntax {
                    message: format!("malformed number '{}'", text),
                    offset,
                })?;
                (Token::Number(value), end - i)
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = i;
                while peek(end).is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.')) {
                    end += 1;
                }
                let text: String = chars[i..end].iter().map(|(_, c)| *c).collect();
                (Token::Name(text), end - i)
            }
            other => {
                return Err(ExprError::Syntax {
                    message: format!("unexpected character '{}'", other),
                    offset,
                })
            }
        };
        tokens.push((token, offset));
        i += width;
    }
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    SelfAxis,
    Attribute,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Self::Child,
            "descendant" => Self::Descendant,
            "descendant-or-self" => Self::DescendantOrSelf,
            "parent" => Self::Parent,
            "ancestor" => Self::Ancestor,
            "ancestor-or-self" => Self::AncestorOrSelf,
            "self" => Self::SelfAxis,
            "attribute" => Self::Attribute,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    Name(String),
    Any,
    Text,
    Node,
}

#[derive(Debug, Clone)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Expr>,
}

impl Step {
    fn new(axis: Axis, test: NodeTest) -> Self {
        Self {
            axis,
            test,
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
enum PathStart {
    Root,
    Context,
    Expr(Box<Expr>),
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(String),
    Number(f64),
    Function(String, Vec<Expr>),
    Path(PathStart, Vec<Step>),
    Filter(Box<Expr>, Vec<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
}

/// Accepted argument counts per function: (min, max)
fn arity(name: &str) -> Option<(usize, Option<usize>)> {
    Some(match name {
        "string" | "normalize-space" | "string-length" | "number" => (0, Some(1)),
        "concat" => (2, None),
        "substring-before" | "substring-after" | "contains" | "starts-with" => (2, Some(2)),
        "substring" => (2, Some(3)),
        "count" | "not" | "boolean" => (1, Some(1)),
        "true" | "false" | "position" | "last" => (0, Some(0)),
        _ => return None,
    })
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, o)| *o).unwrap_or(self.end)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Name(n)) if n == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), ExprError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}", token)))
        }
    }

    fn error(&self, message: String) -> ExprError {
        let message = match self.peek() {
            Some(found) => format!("{}, found {:?}", message, found),
            None => format!("{}, found end of input", message),
        };
        ExprError::Syntax {
            message,
            offset: self.offset(),
        }
    }

    fn expr(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            left = Expr::Or(Box::new(left), Box::new(self.and_expr()?));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.equality()?;
        while self.eat_keyword("and") {
            left = Expr::And(Box::new(left), Box::new(self.equality()?));
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CompareOp::Eq,
                Some(Token::NotEq) => CompareOp::NotEq,
                _ => return Ok(left),
            };
            self.pos += 1;
            left = Expr::Compare(op, Box::new(left), Box::new(self.relational()?));
        }
    }

    fn relational(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => CompareOp::Lt,
                Some(Token::Le) => CompareOp::Le,
                Some(Token::Gt) => CompareOp::Gt,
                Some(Token::Ge) => CompareOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            left = Expr::Compare(op, Box::new(left), Box::new(self.unary()?));
        }
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Negate(Box::new(self.unary()?)));
        }
        let mut left = self.path()?;
        while self.eat(&Token::Pipe) {
            left = Expr::Union(Box::new(left), Box::new(self.path()?));
        }
        Ok(left)
    }

    fn path(&mut self) -> Result<Expr, ExprError> {
        match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                let mut steps = Vec::new();
                if self.starts_step() {
                    self.relative(&mut steps)?;
                }
                Ok(Expr::Path(PathStart::Root, steps))
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                let mut steps = vec![Step::new(Axis::DescendantOrSelf, NodeTest::Node)];
                self.relative(&mut steps)?;
                Ok(Expr::Path(PathStart::Root, steps))
            }
            _ if self.starts_primary() => {
                let primary = self.primary()?;
                let predicates = self.predicates()?;
                let filtered = if predicates.is_empty() {
                    primary
                } else {
                    Expr::Filter(Box::new(primary), predicates)
                };
                let mut steps = Vec::new();
                if self.eat(&Token::Slash) {
                    self.relative(&mut steps)?;
                } else if self.eat(&Token::DoubleSlash) {
                    steps.push(Step::new(Axis::DescendantOrSelf, NodeTest::Node));
                    self.relative(&mut steps)?;
                } else {
                    return Ok(filtered);
                }
                Ok(Expr::Path(PathStart::Expr(Box::new(filtered)), steps))
            }
            _ => {
                let mut steps = Vec::new();
                self.relative(&mut steps)?;
                Ok(Expr::Path(PathStart::Context, steps))
            }
        }
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Name(_) | Token::Star | Token::Dot | Token::DotDot | Token::At)
        )
    }

    fn starts_primary(&self) -> bool {
        match self.peek() {
            Some(Token::Literal(_) | Token::Number(_) | Token::LParen) => true,
            Some(Token::Name(name)) => {
                self.peek_at(1) == Some(&Token::LParen) && name != "text" && name != "node"
            }
            _ => false,
        }
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let offset = self.offset();
        match self.peek().cloned() {
            Some(Token::Literal(s)) => {
                self.pos += 1;
                Ok(Expr::Literal(s))
            }
            Some(Token::Number(n)) => {
                self.pos += 1;
                Ok(Expr::Number(n))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Name(name)) => {
                self.pos += 2;
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.expr()?);
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        self.expect(Token::RParen)?;
                        break;
                    }
                }
                let (min, max) = arity(&name).ok_or_else(|| ExprError::UnknownFunction(name.clone()))?;
                if args.len() < min || max.is_some_and(|max| args.len() > max) {
                    let expected = match max {
                        Some(max) if max == min => min.to_string(),
                        Some(max) => format!("{}..{}", min, max),
                        None => format!("at least {}", min),
                    };
                    return Err(ExprError::Arity {
                        name,
                        expected,
                        found: args.len(),
                    });
                }
                Ok(Expr::Function(name, args))
            }
            _ => Err(ExprError::Syntax {
                message: "expected an expression".to_string(),
                offset,
            }),
        }
    }

    fn relative(&mut self, steps: &mut Vec<Step>) -> Result<(), ExprError> {
        loop {
            steps.push(self.step()?);
            if self.eat(&Token::Slash) {
                continue;
            }
            if self.eat(&Token::DoubleSlash) {
                steps.push(Step::new(Axis::DescendantOrSelf, NodeTest::Node));
                continue;
            }
            return Ok(());
        }
    }

    fn step(&mut self) -> Result<Step, ExprError> {
        if self.eat(&Token::Dot) {
            return Ok(Step::new(Axis::SelfAxis, NodeTest::Node));
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step::new(Axis::Parent, NodeTest::Node));
        }

        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if let (Some(Token::Name(name)), Some(Token::ColonColon)) = (self.peek(), self.peek_at(1)) {
            let axis = Axis::from_name(name)
                .ok_or_else(|| self.error(format!("unsupported axis '{}'", name)))?;
            self.pos += 2;
            axis
        } else {
            Axis::Child
        };

        let test = match self.peek().cloned() {
            Some(Token::Star) => {
                self.pos += 1;
                NodeTest::Any
            }
            Some(Token::Name(name)) if self.peek_at(1) == Some(&Token::LParen) => {
                let test = match name.as_str() {
                    "text" => NodeTest::Text,
                    "node" => NodeTest::Node,
                    _ => return Err(self.error(format!("unexpected function '{}' in path", name))),
                };
                self.pos += 2;
                self.expect(Token::RParen)?;
                test
            }
            Some(Token::Name(name)) => {
                self.pos += 1;
                NodeTest::Name(name.to_ascii_lowercase())
            }
            _ => return Err(self.error("expected a node test".to_string())),
        };

        let mut step = Step::new(axis, test);
        step.predicates = self.predicates()?;
        Ok(step)
    }

    fn predicates(&mut self) -> Result<Vec<Expr>, ExprError> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.expr()?);
            self.expect(Token::RBracket)?;
        }
        Ok(predicates)
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// A node in the XPath data model. Attributes and text nodes are addressed
/// by their index on the owning element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NodeRef {
    Document,
    Element(ElementId),
    Attribute(ElementId, usize),
    Text(ElementId, usize),
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Nodes(Vec<NodeRef>),
    String(String),
    Number(f64),
    Bool(bool),
}

#[derive(Debug, Clone, Copy)]
struct Focus {
    node: NodeRef,
    position: usize,
    size: usize,
}

struct Evaluator<'a> {
    doc: &'a Document,
}

impl<'a> Evaluator<'a> {
    fn eval(&self, expr: &Expr, focus: Focus) -> Result<Value, ExprError> {
        match expr {
            Expr::Literal(s) => Ok(Value::String(s.clone())),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Function(name, args) => self.call(name, args, focus),
            Expr::Path(start, steps) => {
                let mut nodes = match start {
                    PathStart::Root => vec![NodeRef::Document],
                    PathStart::Context => vec![focus.node],
                    PathStart::Expr(inner) => self.node_set(inner, focus)?,
                };
                for step in steps {
                    nodes = self.apply_step(step, &nodes)?;
                }
                Ok(Value::Nodes(nodes))
            }
            Expr::Filter(inner, predicates) => {
                let mut nodes = self.node_set(inner, focus)?;
                for predicate in predicates {
                    nodes = self.filter(predicate, nodes)?;
                }
                Ok(Value::Nodes(nodes))
            }
            Expr::Union(left, right) => {
                let mut nodes = self.node_set(left, focus)?;
                nodes.extend(self.node_set(right, focus)?);
                Ok(Value::Nodes(self.document_order(nodes)))
            }
            Expr::Or(left, right) => Ok(Value::Bool(
                self.truthy(&self.eval(left, focus)?) || self.truthy(&self.eval(right, focus)?),
            )),
            Expr::And(left, right) => Ok(Value::Bool(
                self.truthy(&self.eval(left, focus)?) && self.truthy(&self.eval(right, focus)?),
            )),
            Expr::Compare(op, left, right) => {
                let left = self.eval(left, focus)?;
                let right = self.eval(right, focus)?;
                Ok(Value::Bool(self.compare(*op, &left, &right)))
            }
            Expr::Negate(inner) => Ok(Value::Number(-self.number(&self.eval(inner, focus)?))),
        }
    }

    fn node_set(&self, expr: &Expr, focus: Focus) -> Result<Vec<NodeRef>, ExprError> {
        match self.eval(expr, focus)? {
            Value::Nodes(nodes) => Ok(nodes),
            other => Err(ExprError::Type(format!("expected a node-set, got {:?}", other))),
        }
    }

    fn apply_step(&self, step: &Step, nodes: &[NodeRef]) -> Result<Vec<NodeRef>, ExprError> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for node in nodes {
            let mut candidates: Vec<NodeRef> = self
                .axis(step.axis, *node)
                .into_iter()
                .filter(|n| self.test(step.axis, &step.test, *n))
                .collect();
            for predicate in &step.predicates {
                candidates = self.filter(predicate, candidates)?;
            }
            out.extend(candidates.into_iter().filter(|n| seen.insert(*n)));
        }
        Ok(self.document_order(out))
    }

    fn filter(&self, predicate: &Expr, nodes: Vec<NodeRef>) -> Result<Vec<NodeRef>, ExprError> {
        let size = nodes.len();
        let mut kept = Vec::new();
        for (index, node) in nodes.into_iter().enumerate() {
            let focus = Focus {
                node,
                position: index + 1,
                size,
            };
            let keep = match self.eval(predicate, focus)? {
                Value::Number(n) => n == (index + 1) as f64,
                other => self.truthy(&other),
            };
            if keep {
                kept.push(node);
            }
        }
        Ok(kept)
    }

    /// Nodes along `axis`; reverse axes are listed nearest first.
    fn axis(&self, axis: Axis, node: NodeRef) -> Vec<NodeRef> {
        match axis {
            Axis::Child => self.children(node),
            Axis::Descendant => {
                let mut out = Vec::new();
                self.collect_descendants(node, &mut out);
                out
            }
            Axis::DescendantOrSelf => {
                let mut out = vec![node];
                self.collect_descendants(node, &mut out);
                out
            }
            Axis::Parent => self.parent(node).into_iter().collect(),
            Axis::Ancestor => std::iter::successors(self.parent(node), |n| self.parent(*n)).collect(),
            Axis::AncestorOrSelf => std::iter::successors(Some(node), |n| self.parent(*n)).collect(),
            Axis::SelfAxis => vec![node],
            Axis::Attribute => match node {
                NodeRef::Element(id) => self
                    .doc
                    .get(id)
                    .map(|e| (0..e.attributes().count()).map(|i| NodeRef::Attribute(id, i)).collect())
                    .unwrap_or_default(),
                _ => Vec::new(),
            },
        }
    }

    fn children(&self, node: NodeRef) -> Vec<NodeRef> {
        match node {
            NodeRef::Document => vec![NodeRef::Element(self.doc.root())],
            NodeRef::Element(id) => self
                .doc
                .get(id)
                .map(|e| {
                    e.children()
                        .iter()
                        .enumerate()
                        .map(|(i, child)| match child {
                            Child::Element(child_id) => NodeRef::Element(*child_id),
                            Child::Text(_) => NodeRef::Text(id, i),
                        })
                        .collect()
                })
                .unwrap_or_default(),
            NodeRef::Attribute(..) | NodeRef::Text(..) => Vec::new(),
        }
    }

    fn collect_descendants(&self, node: NodeRef, out: &mut Vec<NodeRef>) {
        for child in self.children(node) {
            out.push(child);
            self.collect_descendants(child, out);
        }
    }

    fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        match node {
            NodeRef::Document => None,
            NodeRef::Element(id) if id == self.doc.root() => Some(NodeRef::Document),
            NodeRef::Element(id) => self.doc.parent(id).map(NodeRef::Element),
            NodeRef::Attribute(id, _) | NodeRef::Text(id, _) => Some(NodeRef::Element(id)),
        }
    }

    fn test(&self, axis: Axis, test: &NodeTest, node: NodeRef) -> bool {
        match (test, node) {
            (NodeTest::Node, _) => true,
            (NodeTest::Text, NodeRef::Text(..)) => true,
            (NodeTest::Text, _) => false,
            (NodeTest::Any, NodeRef::Attribute(..)) => axis == Axis::Attribute,
            (NodeTest::Any, NodeRef::Element(_)) => axis != Axis::Attribute,
            (NodeTest::Any, _) => false,
            (NodeTest::Name(name), NodeRef::Attribute(id, index)) => {
                axis == Axis::Attribute && self.attribute(id, index).is_some_and(|(n, _)| n == name.as_str())
            }
            (NodeTest::Name(name), NodeRef::Element(id)) => {
                axis != Axis::Attribute && self.doc.tag(id) == Some(name.as_str())
            }
            (NodeTest::Name(_), _) => false,
        }
    }

    fn attribute(&self, id: ElementId, index: usize) -> Option<(&'a str, &'a str)> {
        self.doc.get(id)?.attributes().nth(index)
    }

    /// Sort key placing nodes in document order: attributes before
    /// children, children in slot order.
    fn order_key(&self, node: NodeRef) -> Vec<usize> {
        let (element, tail) = match node {
            NodeRef::Document => return Vec::new(),
            NodeRef::Element(id) => (id, Vec::new()),
            NodeRef::Attribute(id, i) => (id, vec![1, i]),
            NodeRef::Text(id, i) => (id, vec![2, i]),
        };
        let mut key = Vec::new();
        let mut current = element;
        while let Some(parent) = self.doc.parent(current) {
            let slot = self
                .doc
                .get(parent)
                .and_then(|p| p.children().iter().position(|c| *c == Child::Element(current)))
                .unwrap_or(0);
            key.push(slot);
            key.push(2);
            current = parent;
        }
        key.push(0);
        key.reverse();
        key.extend(tail);
        key
    }

    fn document_order(&self, nodes: Vec<NodeRef>) -> Vec<NodeRef> {
        let mut seen = HashSet::new();
        let mut keyed: Vec<(Vec<usize>, NodeRef)> = nodes
            .into_iter()
            .filter(|n| seen.insert(*n))
            .map(|n| (self.order_key(n), n))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        keyed.into_iter().map(|(_, n)| n).collect()
    }

    fn node_string(&self, node: NodeRef) -> String {
        match node {
            NodeRef::Document => self.doc.text_content(self.doc.root()),
            NodeRef::Element(id) => self.doc.text_content(id),
            NodeRef::Attribute(id, index) => self
                .attribute(id, index)
                .map(|(_, v)| v.to_string())
                .unwrap_or_default(),
            NodeRef::Text(id, index) => match self.doc.get(id).and_then(|e| e.children().get(index)) {
                Some(Child::Text(text)) => text.clone(),
                _ => String::new(),
            },
        }
    }

    fn string(&self, value: &Value) -> String {
        match value {
            Value::Nodes(nodes) => nodes.first().map(|n| self.node_string(*n)).unwrap_or_default(),
            Value::String(s) => s.clone(),
            Value::Number(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
        }
    }

    fn number(&self, value: &Value) -> f64 {
        match value {
            Value::Number(n) => *n,
            Value::Bool(b) => f64::from(u8::from(*b)),
            other => parse_number(&self.string(other)),
        }
    }

    fn truthy(&self, value: &Value) -> bool {
        match value {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
        }
    }

    fn compare(&self, op: CompareOp, left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Nodes(l), Value::Nodes(r)) => l.iter().any(|a| {
                let a = self.node_string(*a);
                r.iter().any(|b| compare_strings(op, &a, &self.node_string(*b)))
            }),
            (Value::Nodes(nodes), Value::Bool(b)) => compare_bools(op, !nodes.is_empty(), *b),
            (Value::Bool(b), Value::Nodes(nodes)) => compare_bools(op, *b, !nodes.is_empty()),
            (Value::Nodes(nodes), other) => nodes.iter().any(|n| {
                let text = Value::String(self.node_string(*n));
                self.compare(op, &text, other)
            }),
            (other, Value::Nodes(nodes)) => nodes.iter().any(|n| {
                let text = Value::String(self.node_string(*n));
                self.compare(op, other, &text)
            }),
            _ if matches!(op, CompareOp::Eq | CompareOp::NotEq) => {
                if matches!(left, Value::Bool(_)) || matches!(right, Value::Bool(_)) {
                    compare_bools(op, self.truthy(left), self.truthy(right))
                } else if matches!(left, Value::Number(_)) || matches!(right, Value::Number(_)) {
                    compare_numbers(op, self.number(left), self.number(right))
                } else {
                    compare_strings(op, &self.string(left), &self.string(right))
                }
            }
            _ => compare_numbers(op, self.number(left), self.number(right)),
        }
    }

    fn call(&self, name: &str, args: &[Expr], focus: Focus) -> Result<Value, ExprError> {
        let string_arg = |i: usize| -> Result<String, ExprError> {
            match args.get(i) {
                Some(arg) => Ok(self.string(&self.eval(arg, focus)?)),
                None => Ok(self.node_string(focus.node)),
            }
        };

        Ok(match name {
            "string" => Value::String(string_arg(0)?),
            "concat" => {
                let mut out = String::new();
                for i in 0..args.len() {
                    out.push_str(&string_arg(i)?);
                }
                Value::String(out)
            }
            "substring-before" => {
                let (s, pat) = (string_arg(0)?, string_arg(1)?);
                Value::String(s.find(&pat).map(|i| s[..i].to_string()).unwrap_or_default())
            }
            "substring-after" => {
                let (s, pat) = (string_arg(0)?, string_arg(1)?);
                Value::String(
                    s.find(&pat)
                        .map(|i| s[i + pat.len()..].to_string())
                        .unwrap_or_default(),
                )
            }
            "substring" => {
                let s = string_arg(0)?;
                let start = self.number(&self.eval(&args[1], focus)?).round();
                let len = match args.get(2) {
                    Some(arg) => self.number(&self.eval(arg, focus)?).round(),
                    None => f64::INFINITY,
                };
                Value::String(
                    s.chars()
                        .enumerate()
                        .filter(|(i, _)| {
                            let pos = (*i + 1) as f64;
                            pos >= start && pos < start + len
                        })
                        .map(|(_, c)| c)
                        .collect(),
                )
            }
            "normalize-space" => {
                Value::String(string_arg(0)?.split_whitespace().collect::<Vec<_>>().join(" "))
            }
            "contains" => Value::Bool(string_arg(0)?.contains(&string_arg(1)?)),
            "starts-with" => Value::Bool(string_arg(0)?.starts_with(&string_arg(1)?)),
            "string-length" => Value::Number(string_arg(0)?.chars().count() as f64),
            "count" => Value::Number(self.node_set(&args[0], focus)?.len() as f64),
            "not" => Value::Bool(!self.truthy(&self.eval(&args[0], focus)?)),
            "boolean" => Value::Bool(self.truthy(&self.eval(&args[0], focus)?)),
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "number" => match args.first() {
                Some(arg) => Value::Number(self.number(&self.eval(arg, focus)?)),
                None => Value::Number(parse_number(&self.node_string(focus.node))),
            },
            "position" => Value::Number(focus.position as f64),
            "last" => Value::Number(focus.size as f64),
            other => return Err(ExprError::UnknownFunction(other.to_string())),
        })
    }
}

fn parse_number(s: &str) -> f64 {
    s.trim().parse().unwrap_or(f64::NAN)
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let sign = if n > 0.0 { "" } else { "-" };
        format!("{}Infinity", sign)
    } else if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn compare_bools(op: CompareOp, a: bool, b: bool) -> bool {
    match op {
        CompareOp::Eq => a == b,
        CompareOp::NotEq => a != b,
        _ => compare_numbers(op, f64::from(u8::from(a)), f64::from(u8::from(b))),
    }
}

fn compare_numbers(op: CompareOp, a: f64, b: f64) -> bool {
    match op {
        CompareOp::Eq => a == b,
        CompareOp::NotEq => a != b,
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
    }
}

fn compare_strings(op: CompareOp, a: &str, b: &str) -> bool {
    match op {
        CompareOp::Eq => a == b,
        CompareOp::NotEq => a != b,
        _ => compare_numbers(op, parse_number(a), parse_number(b)),
    }
}
