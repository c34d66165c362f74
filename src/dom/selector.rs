//! CSS-like selectors
//!
//! Supports type and universal selectors, `#id`, `.class`, attribute
//! selectors (`[a]`, `=`, `~=`, `^=`, `$=`, `*=`, `|=`), the
//! `:first-child`, `:last-child`, `:nth-child(n)` and `:not(..)`
//! pseudo-classes, descendant and child combinators and selector lists.
//! Matching follows `querySelectorAll`: only candidates inside the scope
//! are returned, but combinators may climb above it.

use super::document::{Document, ElementId};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,

    #[error("unexpected '{found}' at offset {offset} in selector")]
    Unexpected { found: char, offset: usize },

    #[error("unexpected end of selector")]
    UnexpectedEnd,

    #[error("unsupported selector feature: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    Includes,
    Prefix,
    Suffix,
    Substring,
    DashMatch,
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Id(String),
    Class(String),
    Attr {
        name: String,
        op: AttrOp,
        value: String,
    },
    FirstChild,
    LastChild,
    NthChild(usize),
    Not(Box<Compound>),
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Compound {
    tag: Option<String>,
    conditions: Vec<Condition>,
}

/// Compounds joined by combinators; `combinators[i]` sits between
/// `compounds[i]` and `compounds[i + 1]`.
#[derive(Debug, Clone, PartialEq)]
struct Complex {
    compounds: Vec<Compound>,
    combinators: Vec<Combinator>,
}

/// A parsed selector list.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    source: String,
    alternatives: Vec<Complex>,
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let mut parser = Parser::new(input);
        let alternatives = parser.selector_list()?;
        Ok(Self {
            source: input.trim().to_string(),
            alternatives,
        })
    }

    /// The selector text as written
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, doc: &Document, element: ElementId) -> bool {
        self.alternatives
            .iter()
            .any(|complex| matches_complex(doc, element, complex, complex.compounds.len() - 1))
    }

    /// Matching descendants of `scope` (excluding `scope`) in document order.
    pub fn query_all(&self, doc: &Document, scope: ElementId) -> Vec<ElementId> {
        doc.descendants(scope)
            .into_iter()
            .filter(|id| self.matches(doc, *id))
            .collect()
    }

    pub fn query_first(&self, doc: &Document, scope: ElementId) -> Option<ElementId> {
        doc.descendants(scope)
            .into_iter()
            .find(|id| self.matches(doc, *id))
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

fn matches_complex(doc: &Document, element: ElementId, complex: &Complex, index: usize) -> bool {
    if !matches_compound(doc, element, &complex.compounds[index]) {
        return false;
    }
    if index == 0 {
        return true;
    }
    match complex.combinators[index - 1] {
        Combinator::Child => doc
            .parent(element)
            .is_some_and(|parent| matches_complex(doc, parent, complex, index - 1)),
        Combinator::Descendant => doc
            .ancestors(element)
            .any(|ancestor| matches_complex(doc, ancestor, complex, index - 1)),
    }
}

fn matches_compound(doc: &Document, element: ElementId, compound: &Compound) -> bool {
    let Some(el) = doc.get(element) else {
        return false;
    };
    if let Some(tag) = &compound.tag {
        if el.tag() != tag {
            return false;
        }
    }
    compound.conditions.iter().all(|condition| match condition {
        Condition::Id(id) => el.attribute("id") == Some(id.as_str()),
        Condition::Class(class) => el
            .attribute("class")
            .is_some_and(|c| c.split_whitespace().any(|part| part == class)),
        Condition::Attr { name, op, value } => match el.attribute(name) {
            None => false,
            Some(actual) => match op {
                AttrOp::Exists => true,
                AttrOp::Equals => actual == value,
                AttrOp::Includes => actual.split_whitespace().any(|part| part == value),
                AttrOp::Prefix => !value.is_empty() && actual.starts_with(value.as_str()),
                AttrOp::Suffix => !value.is_empty() && actual.ends_with(value.as_str()),
                AttrOp::Substring => !value.is_empty() && actual.contains(value.as_str()),
                AttrOp::DashMatch => {
                    actual == value || actual.starts_with(&format!("{}-", value))
                }
            },
        },
        Condition::FirstChild => doc.element_index(element) == Some(0),
        Condition::LastChild => doc
            .parent(element)
            .is_some_and(|parent| doc.element_children(parent).last() == Some(&element)),
        Condition::NthChild(n) => doc.element_index(element).map(|i| i + 1) == Some(*n),
        Condition::Not(inner) => !matches_compound(doc, element, inner),
    })
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn unexpected(&self) -> SelectorError {
        match self.peek() {
            Some(found) => SelectorError::Unexpected {
                found,
                offset: self.pos,
            },
            None => SelectorError::UnexpectedEnd,
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), SelectorError> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn selector_list(&mut self) -> Result<Vec<Complex>, SelectorError> {
        self.skip_whitespace();
        if self.peek().is_none() {
            return Err(SelectorError::Empty);
        }
        let mut list = vec![self.complex()?];
        while self.peek() == Some(',') {
            self.pos += 1;
            self.skip_whitespace();
            list.push(self.complex()?);
        }
        if self.peek().is_some() {
            return Err(self.unexpected());
        }
        Ok(list)
    }

    fn complex(&mut self) -> Result<Complex, SelectorError> {
        let mut compounds = vec![self.compound()?];
        let mut combinators = Vec::new();
        loop {
            let had_space = self.skip_whitespace();
            let combinator = match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    Combinator::Child
                }
                Some(c @ ('+' | '~')) => {
                    return Err(SelectorError::Unsupported(format!("'{}' combinator", c)))
                }
                Some(_) if had_space => Combinator::Descendant,
                Some(_) => return Err(self.unexpected()),
            };
            combinators.push(combinator);
            compounds.push(self.compound()?);
        }
        Ok(Complex {
            compounds,
            combinators,
        })
    }

    fn compound(&mut self) -> Result<Compound, SelectorError> {
        let mut compound = Compound::default();
        let mut universal = false;
        match self.peek() {
            Some('*') => {
                self.pos += 1;
                universal = true;
            }
            Some(c) if is_ident_char(c) => {
                compound.tag = Some(self.ident()?.to_ascii_lowercase());
            }
            _ => {}
        }
        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.conditions.push(Condition::Id(self.ident()?));
                }
                Some('.') => {
                    self.pos += 1;
                    compound.conditions.push(Condition::Class(self.ident()?));
                }
                Some('[') => {
                    self.pos += 1;
                    compound.conditions.push(self.attribute()?);
                }
                Some(':') => {
                    self.pos += 1;
                    compound.conditions.push(self.pseudo()?);
                }
                _ => break,
            }
        }
        if !universal && compound.tag.is_none() && compound.conditions.is_empty() {
            return Err(self.unexpected());
        }
        Ok(compound)
    }

    fn ident(&mut self) -> Result<String, SelectorError> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.unexpected());
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn attribute(&mut self) -> Result<Condition, SelectorError> {
        self.skip_whitespace();
        let name = self.ident()?;
        self.skip_whitespace();
        let op = match self.bump() {
            Some(']') => {
                return Ok(Condition::Attr {
                    name,
                    op: AttrOp::Exists,
                    value: String::new(),
                })
            }
            Some('=') => AttrOp::Equals,
            Some(c @ ('~' | '^' | '$' | '*' | '|')) => {
                self.expect('=')?;
                match c {
                    '~' => AttrOp::Includes,
                    '^' => AttrOp::Prefix,
                    '$' => AttrOp::Suffix,
                    '*' => AttrOp::Substring,
                    _ => AttrOp::DashMatch,
                }
            }
            Some(found) => {
                return Err(SelectorError::Unexpected {
                    found,
                    offset: self.pos - 1,
                })
            }
            None => return Err(SelectorError::UnexpectedEnd),
        };
        self.skip_whitespace();
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != quote) {
                    self.pos += 1;
                }
                let value: String = self.chars[start..self.pos].iter().collect();
                self.expect(quote)?;
                value
            }
            _ => {
                let start = self.pos;
                while self.peek().is_some_and(|c| c != ']' && !c.is_whitespace()) {
                    self.pos += 1;
                }
                self.chars[start..self.pos].iter().collect()
            }
        };
        self.skip_whitespace();
        self.expect(']')?;
        Ok(Condition::Attr { name, op, value })
    }

    fn pseudo(&mut self) -> Result<Condition, SelectorError> {
        let name = self.ident()?.to_ascii_lowercase();
        match name.as_str() {
            "first-child" => Ok(Condition::FirstChild),
            "last-child" => Ok(Condition::LastChild),
            "nth-child" => {
                self.expect('(')?;
                self.skip_whitespace();
                let start = self.pos;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
                let digits: String = self.chars[start..self.pos].iter().collect();
                let n = digits
                    .parse::<usize>()
                    .map_err(|_| SelectorError::Unsupported("nth-child formula".to_string()))?;
                self.skip_whitespace();
                self.expect(')')?;
                Ok(Condition::NthChild(n))
            }
            "not" => {
                self.expect('(')?;
                self.skip_whitespace();
                let inner = self.compound()?;
                self.skip_whitespace();
                self.expect(')')?;
                Ok(Condition::Not(Box::new(inner)))
            }
            other => Err(SelectorError::Unsupported(format!(":{}", other))),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    /// body > div.feed[data-component="Feed"] > (div.post, div.post.ad, p)
    fn feed() -> (Document, ElementId, Vec<ElementId>) {
        let mut doc = Document::new();
        let body = doc.create_element("body");
        doc.append_child(doc.root(), body).unwrap();
        let feed = doc.create_element("div");
        doc.set_attribute(feed, "class", "feed").unwrap();
        doc.set_attribute(feed, "data-component", "Feed").unwrap();
        doc.append_child(body, feed).unwrap();

        let mut items = Vec::new();
        for (tag, class) in [("div", "post"), ("div", "post ad"), ("p", "note")] {
            let item = doc.create_element(tag);
            doc.set_attribute(item, "class", class).unwrap();
            doc.append_child(feed, item).unwrap();
            items.push(item);
        }
        (doc, body, items)
    }

    #[test]
    fn class_and_child_combinator() {
        let (doc, body, items) = feed();
        let sel = Selector::parse(r#"[data-component="Feed"] > .post"#).unwrap();
        assert_eq!(sel.query_all(&doc, body), vec![items[0], items[1]]);
    }

    #[test]
    fn compound_classes_and_not() {
        let (doc, body, items) = feed();
        let sel = Selector::parse("div.post:not(.ad)").unwrap();
        assert_eq!(sel.query_all(&doc, body), vec![items[0]]);
    }

    #[test]
    fn structural_pseudo_classes() {
        let (doc, body, items) = feed();
        let last = Selector::parse(".feed > *:last-child").unwrap();
        assert_eq!(last.query_first(&doc, body), Some(items[2]));
        let second = Selector::parse("div:nth-child(2)").unwrap();
        assert_eq!(second.query_all(&doc, body), vec![items[1]]);
    }

    #[test]
    fn unquoted_attribute_values_and_lists() {
        let (doc, body, items) = feed();
        let sel = Selector::parse("p[class=note], div[class~=ad]").unwrap();
        assert_eq!(sel.query_all(&doc, body), vec![items[1], items[2]]);
    }

    #[test]
    fn descendant_combinator_may_climb_above_scope() {
        let (doc, _, items) = feed();
        let sel = Selector::parse("body .post").unwrap();
        assert_eq!(sel.query_all(&doc, items[0]), Vec::<ElementId>::new());
        assert!(sel.matches(&doc, items[0]));
    }

    #[test]
    fn malformed_selectors_are_rejected() {
        assert_eq!(Selector::parse("  "), Err(SelectorError::Empty));
        assert!(matches!(
            Selector::parse("div >"),
            Err(SelectorError::UnexpectedEnd)
        ));
        assert!(matches!(
            Selector::parse("a + b"),
            Err(SelectorError::Unsupported(_))
        ));
        assert!(Selector::parse("div[").is_err());
    }
}
