//! The JSONPath subset understood by merge instructions.
//!
//! ```text
//! $                     the document root
//! .name  ['name']       object property
//! [n]                   array element, negative n counts from the end
//! [start:end:step]      array slice, every part optional
//! [*]  .*               every child
//! ..name  ..*           recursive descent
//! [?(@.a.b == 'x')]     filter children by a comparison or `@.a` existence,
//!                       combined with && and ||
//! ```
//!
//! Selection returns [`Location`]s rather than references so the caller can
//! mutate the document afterwards.

use crate::error::{Error, Result};
use serde_json::Value;
use std::cmp::Ordering;

/// One step from a container to a child.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Step {
    Key(String),
    Index(usize),
}

/// Position of a node inside a document, as steps from the root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Location {
    steps: Vec<Step>,
}

impl Location {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn child(&self, step: Step) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        Self { steps }
    }

    /// Splits into the parent location and the last step. `None` for the root.
    pub fn split_last(&self) -> Option<(Location, &Step)> {
        let (last, parent) = self.steps.split_last()?;
        Some((
            Location {
                steps: parent.to_vec(),
            },
            last,
        ))
    }

    pub fn get<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.steps.iter().try_fold(root, |node, step| match step {
            Step::Key(key) => node.as_object()?.get(key),
            Step::Index(index) => node.as_array()?.get(*index),
        })
    }

    pub fn get_mut<'a>(&self, root: &'a mut Value) -> Option<&'a mut Value> {
        self.steps.iter().try_fold(root, |node, step| match step {
            Step::Key(key) => node.as_object_mut()?.get_mut(key),
            Step::Index(index) => node.as_array_mut()?.get_mut(*index),
        })
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "$")?;
        for step in &self.steps {
            match step {
                Step::Key(key) => write!(f, "['{key}']")?,
                Step::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Name(String),
    Wildcard,
    Index(i64),
    Slice {
        start: Option<i64>,
        end: Option<i64>,
        step: i64,
    },
    Filter(FilterExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Child(Selector),
    Descendant(Selector),
}

/// Disjunction of conjunctions: `a && b || c` is `[[a, b], [c]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpr {
    any: Vec<Vec<Condition>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Property names below `@`.
    path: Vec<String>,
    comparison: Option<(CompareOp, Value)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A parsed path expression.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPath {
    source: String,
    segments: Vec<Segment>,
}

impl JsonPath {
    pub fn parse(source: &str) -> Result<Self> {
        let segments = Parser::new(source).parse()?;
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Every node the path selects, in document order.
    pub fn select(&self, root: &Value) -> Vec<Location> {
        select_segments(root, &self.segments, vec![Location::root()])
    }
}

impl std::fmt::Display for JsonPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

/// Applies `segments` starting from `current`.
pub(crate) fn select_segments(root: &Value, segments: &[Segment], current: Vec<Location>) -> Vec<Location> {
    segments.iter().fold(current, |current, segment| {
        let mut next = Vec::new();
        for location in &current {
            let Some(node) = location.get(root) else {
                continue;
            };
            match segment {
                Segment::Child(selector) => select_children(node, location, selector, &mut next),
                Segment::Descendant(selector) => {
                    let mut descendants = Vec::new();
                    collect_descendants(node, location, &mut descendants);
                    for (parent, parent_location) in std::iter::once((node, location.clone())).chain(
                        descendants
                            .iter()
                            .filter_map(|l| l.get(root).map(|n| (n, l.clone()))),
                    ) {
                        select_children(parent, &parent_location, selector, &mut next);
                    }
                }
            }
        }
        next
    })
}

fn children(node: &Value, location: &Location) -> Vec<Location> {
    match node {
        Value::Object(map) => map.keys().map(|k| location.child(Step::Key(k.clone()))).collect(),
        Value::Array(items) => (0..items.len()).map(|i| location.child(Step::Index(i))).collect(),
        _ => Vec::new(),
    }
}

fn collect_descendants(node: &Value, location: &Location, out: &mut Vec<Location>) {
    let child_locations = children(node, location);
    for child_location in child_locations {
        out.push(child_location.clone());
        if let Some(child) = child_location.steps.last().and_then(|step| match (node, step) {
            (Value::Object(map), Step::Key(key)) => map.get(key),
            (Value::Array(items), Step::Index(i)) => items.get(*i),
            _ => None,
        }) {
            if child.is_object() || child.is_array() {
                collect_descendants(child, &child_location, out);
            }
        }
    }
}

fn select_children(node: &Value, location: &Location, selector: &Selector, out: &mut Vec<Location>) {
    match selector {
        Selector::Name(name) => {
            if let Some(map) = node.as_object() {
                if map.contains_key(name) {
                    out.push(location.child(Step::Key(name.clone())));
                }
            }
        }
        Selector::Wildcard => out.extend(children(node, location)),
        Selector::Index(index) => {
            if let Some(items) = node.as_array() {
                if let Some(i) = resolve_index(*index, items.len()) {
                    out.push(location.child(Step::Index(i)));
                }
            }
        }
        Selector::Slice { start, end, step } => {
            if let Some(items) = node.as_array() {
                for i in slice_indices(items.len(), *start, *end, *step) {
                    out.push(location.child(Step::Index(i)));
                }
            }
        }
        Selector::Filter(filter) => {
            for child_location in children(node, location) {
                let matched = child_location
                    .steps
                    .last()
                    .and_then(|step| match (node, step) {
                        (Value::Object(map), Step::Key(key)) => map.get(key),
                        (Value::Array(items), Step::Index(i)) => items.get(*i),
                        _ => None,
                    })
                    .is_some_and(|child| filter.matches(child));
                if matched {
                    out.push(child_location);
                }
            }
        }
    }
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let resolved = if index < 0 { len + index } else { index };
    (0..len).contains(&resolved).then_some(resolved as usize)
}

/// Python-style slice indices.
fn slice_indices(len: usize, start: Option<i64>, end: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let clamp = |value: i64, low: i64, high: i64| value.clamp(low, high);
    let normalize = |value: i64| if value < 0 { value + len } else { value };

    let mut indices = Vec::new();
    if step > 0 {
        let start = start.map_or(0, |s| clamp(normalize(s), 0, len));
        let end = end.map_or(len, |e| clamp(normalize(e), 0, len));
        let mut i = start;
        while i < end {
            indices.push(i as usize);
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    } else {
        let start = start.map_or(len - 1, |s| clamp(normalize(s), -1, len - 1));
        let end = end.map_or(-1, |e| clamp(normalize(e), -1, len - 1));
        let mut i = start;
        while i > end {
            indices.push(i as usize);
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    }
    indices
}

impl FilterExpr {
    pub fn matches(&self, candidate: &Value) -> bool {
        self.any
            .iter()
            .any(|all| all.iter().all(|condition| condition.matches(candidate)))
    }
}

impl Condition {
    fn matches(&self, candidate: &Value) -> bool {
        let value = self
            .path
            .iter()
            .try_fold(candidate, |node, name| node.as_object()?.get(name));
        let Some(value) = value else {
            return false;
        };
        match &self.comparison {
            None => true,
            Some((op, literal)) => compare(value, *op, literal),
        }
    }
}

fn compare(value: &Value, op: CompareOp, literal: &Value) -> bool {
    let ordering = match (value, literal) {
        (Value::Number(a), Value::Number(b)) => a.as_f64().zip(b.as_f64()).and_then(|(a, b)| a.partial_cmp(&b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    };
    match op {
        CompareOp::Eq => ordering == Some(Ordering::Equal),
        CompareOp::Ne => ordering != Some(Ordering::Equal),
        CompareOp::Lt => ordering == Some(Ordering::Less),
        CompareOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => ordering == Some(Ordering::Greater),
        CompareOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::InvalidPath {
            path: self.source.to_string(),
            message: format!("{} at position {}", message.into(), self.pos),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{expected}'")))
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn parse(mut self) -> Result<Vec<Segment>> {
        let mut segments = Vec::new();
        self.skip_whitespace();
        if !self.eat('$') && self.peek().is_some_and(is_name_char) {
            // A bare leading name is the same as `$.name`.
            segments.push(Segment::Child(Selector::Name(self.name()?)));
        }

        while let Some(c) = self.peek() {
            match c {
                '.' if self.peek_at(1) == Some('.') => {
                    self.pos += 2;
                    let selector = match self.peek() {
                        Some('[') => self.bracket()?,
                        _ => self.dot_selector()?,
                    };
                    segments.push(Segment::Descendant(selector));
                }
                '.' => {
                    self.pos += 1;
                    segments.push(Segment::Child(self.dot_selector()?));
                }
                '[' => segments.push(Segment::Child(self.bracket()?)),
                c if c.is_whitespace() => self.skip_whitespace(),
                _ => return Err(self.error(format!("unexpected '{c}'"))),
            }
        }
        Ok(segments)
    }

    fn dot_selector(&mut self) -> Result<Selector> {
        if self.eat('*') {
            return Ok(Selector::Wildcard);
        }
        Ok(Selector::Name(self.name()?))
    }

    fn name(&mut self) -> Result<String> {
        let start = self.pos;
        while self.peek().is_some_and(is_name_char) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected a property name"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn bracket(&mut self) -> Result<Selector> {
        self.expect('[')?;
        self.skip_whitespace();
        let selector = match self.peek() {
            Some('\'') | Some('"') => Selector::Name(self.quoted()?),
            Some('*') => {
                self.pos += 1;
                Selector::Wildcard
            }
            Some('?') => {
                self.pos += 1;
                self.skip_whitespace();
                self.expect('(')?;
                let filter = self.filter()?;
                self.skip_whitespace();
                self.expect(')')?;
                Selector::Filter(filter)
            }
            _ => self.index_or_slice()?,
        };
        self.skip_whitespace();
        self.expect(']')?;
        Ok(selector)
    }

    fn quoted(&mut self) -> Result<String> {
        let quote = self.peek().ok_or_else(|| self.error("expected a quote"))?;
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some('\\') => {
                    self.pos += 1;
                    let escaped = self.peek().ok_or_else(|| self.error("unterminated escape"))?;
                    out.push(escaped);
                    self.pos += 1;
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn integer(&mut self) -> Result<Option<i64>> {
        self.skip_whitespace();
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        self.skip_whitespace();
        if text.is_empty() {
            return Ok(None);
        }
        text.parse::<i64>()
            .map(Some)
            .map_err(|_| self.error(format!("invalid integer '{text}'")))
    }

    fn index_or_slice(&mut self) -> Result<Selector> {
        let first = self.integer()?;
        if !self.eat(':') {
            return first
                .map(Selector::Index)
                .ok_or_else(|| self.error("expected an index, slice, name or filter"));
        }
        let end = self.integer()?;
        let step = if self.eat(':') { self.integer()? } else { None };
        let step = step.unwrap_or(1);
        if step == 0 {
            return Err(self.error("slice step cannot be zero"));
        }
        Ok(Selector::Slice {
            start: first,
            end,
            step,
        })
    }

    fn filter(&mut self) -> Result<FilterExpr> {
        let mut any = vec![vec![self.condition()?]];
        loop {
            self.skip_whitespace();
            if self.peek() == Some('&') && self.peek_at(1) == Some('&') {
                self.pos += 2;
                let condition = self.condition()?;
                if let Some(all) = any.last_mut() {
                    all.push(condition);
                }
            } else if self.peek() == Some('|') && self.peek_at(1) == Some('|') {
                self.pos += 2;
                any.push(vec![self.condition()?]);
            } else {
                return Ok(FilterExpr { any });
            }
        }
    }

    fn condition(&mut self) -> Result<Condition> {
        self.skip_whitespace();
        self.expect('@')?;
        let mut path = Vec::new();
        loop {
            if self.eat('.') {
                path.push(self.name()?);
            } else if self.peek() == Some('[') && matches!(self.peek_at(1), Some('\'') | Some('"')) {
                self.pos += 1;
                path.push(self.quoted()?);
                self.expect(']')?;
            } else {
                break;
            }
        }

        self.skip_whitespace();
        let op = match (self.peek(), self.peek_at(1)) {
            (Some('='), Some('=')) => Some((CompareOp::Eq, 2)),
            (Some('!'), Some('=')) => Some((CompareOp::Ne, 2)),
            (Some('<'), Some('=')) => Some((CompareOp::Le, 2)),
            (Some('>'), Some('=')) => Some((CompareOp::Ge, 2)),
            (Some('<'), _) => Some((CompareOp::Lt, 1)),
            (Some('>'), _) => Some((CompareOp::Gt, 1)),
            _ => None,
        };
        let Some((op, width)) = op else {
            return Ok(Condition {
                path,
                comparison: None,
            });
        };
        self.pos += width;
        self.skip_whitespace();
        let literal = self.literal()?;
        Ok(Condition {
            path,
            comparison: Some((op, literal)),
        })
    }

    fn literal(&mut self) -> Result<Value> {
        if matches!(self.peek(), Some('\'') | Some('"')) {
            return Ok(Value::String(self.quoted()?));
        }
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.'))
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        match text.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "null" => Ok(Value::Null),
            _ => serde_json::from_str::<serde_json::Number>(&text)
                .map(Value::Number)
                .map_err(|_| self.error(format!("invalid literal '{text}'"))),
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn select_values(doc: &Value, path: &str) -> Vec<Value> {
        JsonPath::parse(path)
            .unwrap()
            .select(doc)
            .iter()
            .map(|location| location.get(doc).unwrap().clone())
            .collect()
    }

    fn mech() -> Value {
        json!({
            "Description": {"Id": "mech_def_1", "Cost": 100},
            "inventory": [
                {"ComponentDefID": "Weapon_AC20", "MountedLocation": "RightTorso", "Tons": 14},
                {"ComponentDefID": "Weapon_Laser", "MountedLocation": "LeftArm", "Tons": 1},
                {"ComponentDefID": "Gear_Heatsink", "MountedLocation": "LeftArm", "Tons": 1}
            ]
        })
    }

    #[test]
    fn test_root_selects_document() {
        let doc = mech();
        let path = JsonPath::parse("$").unwrap();
        assert_eq!(path.select(&doc), vec![Location::root()]);
    }

    #[test]
    fn test_dot_and_bracket_names() {
        let doc = mech();
        assert_eq!(select_values(&doc, "$.Description.Cost"), vec![json!(100)]);
        assert_eq!(select_values(&doc, "$['Description']['Id']"), vec![json!("mech_def_1")]);
        assert_eq!(select_values(&doc, "Description.Id"), vec![json!("mech_def_1")]);
        assert!(select_values(&doc, "$.Missing").is_empty());
    }

    #[test]
    fn test_indices_and_negative_indices() {
        let doc = mech();
        assert_eq!(select_values(&doc, "$.inventory[0].Tons"), vec![json!(14)]);
        assert_eq!(
            select_values(&doc, "$.inventory[-1].ComponentDefID"),
            vec![json!("Gear_Heatsink")]
        );
        assert!(select_values(&doc, "$.inventory[3]").is_empty());
    }

    #[test]
    fn test_slices() {
        let doc = json!({"a": [0, 1, 2, 3, 4]});
        assert_eq!(select_values(&doc, "$.a[-1:]"), vec![json!(4)]);
        assert_eq!(select_values(&doc, "$.a[-2:-1:]"), vec![json!(3)]);
        assert_eq!(select_values(&doc, "$.a[1:3]"), vec![json!(1), json!(2)]);
        assert_eq!(select_values(&doc, "$.a[::2]"), vec![json!(0), json!(2), json!(4)]);
        assert_eq!(select_values(&doc, "$.a[::-2]"), vec![json!(4), json!(2), json!(0)]);
        assert!(JsonPath::parse("$.a[::0]").is_err());
    }

    #[test]
    fn test_slices_with_extreme_steps() {
        let doc = json!({"a": [0, 1, 2]});
        assert_eq!(select_values(&doc, "$.a[1::9223372036854775807]"), vec![json!(1)]);
        assert_eq!(
            select_values(&doc, "$.a[::-9223372036854775808]"),
            vec![json!(2)]
        );
        assert_eq!(
            select_values(&doc, "$.a[-9223372036854775808:9223372036854775807]"),
            vec![json!(0), json!(1), json!(2)]
        );
        assert_eq!(slice_indices(3, Some(2), None, i64::MAX), vec![2]);
        assert_eq!(slice_indices(3, None, None, i64::MIN), vec![2]);
    }

    #[test]
    fn test_wildcards() {
        let doc = json!({"a": {"x": 1, "y": 2}, "b": [3, 4]});
        assert_eq!(select_values(&doc, "$.a.*"), vec![json!(1), json!(2)]);
        assert_eq!(select_values(&doc, "$.b[*]"), vec![json!(3), json!(4)]);
    }

    #[test]
    fn test_recursive_descent() {
        let doc = json!({"Id": 1, "a": {"Id": 2, "b": [{"Id": 3}]}});
        assert_eq!(select_values(&doc, "$..Id"), vec![json!(1), json!(2), json!(3)]);
        assert_eq!(select_values(&doc, "$.a..Id"), vec![json!(2), json!(3)]);
        assert_eq!(JsonPath::parse("$..*").unwrap().select(&doc).len(), 6);
    }

    #[test]
    fn test_filters() {
        let doc = mech();
        assert_eq!(
            select_values(&doc, "$.inventory[?(@.ComponentDefID == 'Weapon_Laser')].Tons"),
            vec![json!(1)]
        );
        assert_eq!(
            select_values(&doc, "$.inventory[?(@.Tons > 1)].ComponentDefID"),
            vec![json!("Weapon_AC20")]
        );
        assert_eq!(
            select_values(
                &doc,
                "$.inventory[?(@.MountedLocation == \"LeftArm\" && @.Tons <= 1)].ComponentDefID"
            ),
            vec![json!("Weapon_Laser"), json!("Gear_Heatsink")]
        );
        assert_eq!(
            select_values(
                &doc,
                "$.inventory[?(@.Tons == 14 || @.ComponentDefID == 'Gear_Heatsink')].Tons"
            )
            .len(),
            2
        );
        assert_eq!(select_values(&doc, "$.inventory[?(@.Tons)]").len(), 3);
        assert!(select_values(&doc, "$.inventory[?(@.Missing != 1)]").is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(JsonPath::parse("$.").is_err());
        assert!(JsonPath::parse("$[").is_err());
        assert!(JsonPath::parse("$['open").is_err());
        assert!(JsonPath::parse("$[?(@.a == )]").is_err());
        assert!(JsonPath::parse("$#").is_err());
    }

    #[test]
    fn test_location_display() {
        let location = Location::root()
            .child(Step::Key("inventory".to_string()))
            .child(Step::Index(2));
        assert_eq!(location.to_string(), "$['inventory'][2]");
    }
}
