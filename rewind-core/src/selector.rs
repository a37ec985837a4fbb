//! Compound CSS selector matching and short structural selectors.
//!
//! Supported syntax (comma-separated groups, no combinators):
//!   input                 - tag
//!   #card-number          - id
//!   .secret               - class
//!   [data-private]        - attribute present
//!   [name=cvc]            - attribute equals
//!   [name*=card]          - attribute contains
//!   [name^=cc] [name$=no] - attribute prefix / suffix
//!   input.secret[type=text], textarea - compound groups

use crate::dom::{Document, NodeKey};
use crate::error::RewindError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub groups: Vec<Compound>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Compound {
    pub tag: Option<String>,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Id(String),
    Class(String),
    Attr { name: String, op: AttrOp, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    Exists,
    Equals,
    Contains,
    Prefix,
    Suffix,
}

fn invalid(selector: &str, reason: &str) -> RewindError {
    RewindError::Selector {
        selector: selector.to_string(),
        reason: reason.to_string(),
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

impl Selector {
    pub fn parse(s: &str) -> Result<Self, RewindError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(invalid(s, "empty selector"));
        }
        let groups = s
            .split(',')
            .map(|g| Compound::parse(g.trim()).map_err(|reason| invalid(s, &reason)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { groups })
    }

    pub fn matches(&self, doc: &Document, node: NodeKey) -> bool {
        doc.is_element(node) && self.groups.iter().any(|g| g.matches(doc, node))
    }
}

impl Compound {
    fn parse(s: &str) -> Result<Self, String> {
        if s.is_empty() {
            return Err("empty group".to_string());
        }
        let chars: Vec<char> = s.chars().collect();
        let mut i = 0;
        let mut out = Compound::default();

        let read_ident = |i: &mut usize| -> String {
            let start = *i;
            while *i < chars.len() && is_ident_char(chars[*i]) {
                *i += 1;
            }
            chars[start..*i].iter().collect()
        };

        if chars[0] == '*' {
            i = 1;
        } else if is_ident_char(chars[0]) {
            out.tag = Some(read_ident(&mut i).to_ascii_lowercase());
        }

        while i < chars.len() {
            match chars[i] {
                '#' => {
                    i += 1;
                    let id = read_ident(&mut i);
                    if id.is_empty() {
                        return Err("expected id after '#'".to_string());
                    }
                    out.conditions.push(Condition::Id(id));
                }
                '.' => {
                    i += 1;
                    let class = read_ident(&mut i);
                    if class.is_empty() {
                        return Err("expected class after '.'".to_string());
                    }
                    out.conditions.push(Condition::Class(class));
                }
                '[' => {
                    let close = chars[i..]
                        .iter()
                        .position(|&c| c == ']')
                        .ok_or_else(|| "unterminated '['".to_string())?;
                    let body: String = chars[i + 1..i + close].iter().collect();
                    out.conditions.push(parse_attr(&body)?);
                    i += close + 1;
                }
                c if c.is_whitespace() || c == '>' || c == '+' || c == '~' => {
                    return Err("combinators are not supported".to_string());
                }
                c => return Err(format!("unexpected character '{}'", c)),
            }
        }
        Ok(out)
    }

    fn matches(&self, doc: &Document, node: NodeKey) -> bool {
        if let Some(tag) = &self.tag {
            if doc.tag(node) != Some(tag.as_str()) {
                return false;
            }
        }
        self.conditions.iter().all(|c| c.matches(doc, node))
    }
}

fn parse_attr(body: &str) -> Result<Condition, String> {
    let body = body.trim();
    let ops = [
        ("*=", AttrOp::Contains),
        ("^=", AttrOp::Prefix),
        ("$=", AttrOp::Suffix),
        ("=", AttrOp::Equals),
    ];
    for (token, op) in ops {
        if let Some((name, value)) = body.split_once(token) {
            let name = name.trim();
            if name.is_empty() {
                return Err("attribute name missing".to_string());
            }
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            return Ok(Condition::Attr {
                name: name.to_ascii_lowercase(),
                op,
                value: value.to_string(),
            });
        }
    }
    if body.is_empty() || !body.chars().all(is_ident_char) {
        return Err(format!("bad attribute '{}'", body));
    }
    Ok(Condition::Attr {
        name: body.to_ascii_lowercase(),
        op: AttrOp::Exists,
        value: String::new(),
    })
}

impl Condition {
    fn matches(&self, doc: &Document, node: NodeKey) -> bool {
        match self {
            Condition::Id(id) => doc.attribute(node, "id") == Some(id.as_str()),
            Condition::Class(class) => doc
                .attribute(node, "class")
                .map(|c| c.split_whitespace().any(|x| x == class))
                .unwrap_or(false),
            Condition::Attr { name, op, value } => match (doc.attribute(node, name), op) {
                (None, _) => false,
                (Some(_), AttrOp::Exists) => true,
                (Some(v), AttrOp::Equals) => v == value,
                (Some(v), AttrOp::Contains) => v.contains(value.as_str()),
                (Some(v), AttrOp::Prefix) => v.starts_with(value.as_str()),
                (Some(v), AttrOp::Suffix) => v.ends_with(value.as_str()),
            },
        }
    }
}

/// Short display selector for an element, e.g. `#nav > ul.menu > li:nth-child(2)`.
///
/// Stops at the first ancestor with an id and keeps at most four steps. Only
/// used for labels; replay never resolves nodes through it.
pub fn describe(doc: &Document, node: NodeKey) -> String {
    if !doc.is_element(node) {
        return String::new();
    }
    if let Some(id) = doc.attribute(node, "id").filter(|id| !id.is_empty()) {
        return format!("#{}", id);
    }

    let mut parts: Vec<String> = Vec::new();
    let mut cur = Some(node);
    while let Some(el) = cur.filter(|&k| doc.is_element(k)) {
        if let Some(id) = doc.attribute(el, "id").filter(|id| !id.is_empty()) {
            parts.push(format!("#{}", id));
            break;
        }
        let mut step = doc.tag(el).unwrap_or_default().to_string();
        if let Some(class) = doc.attribute(el, "class") {
            let classes: Vec<&str> = class.split_whitespace().take(2).collect();
            if !classes.is_empty() {
                step.push('.');
                step.push_str(&classes.join("."));
            }
        }
        let parent = doc.parent(el);
        if let Some(p) = parent {
            let siblings: Vec<NodeKey> = doc
                .children(p)
                .iter()
                .copied()
                .filter(|&c| doc.is_element(c))
                .collect();
            if siblings.len() > 1 {
                let idx = siblings.iter().position(|&c| c == el).map(|i| i + 1).unwrap_or(0);
                step.push_str(&format!(":nth-child({})", idx));
            }
        }
        parts.push(step);
        cur = parent;
        if parts.len() >= 4 {
            break;
        }
    }
    parts.reverse();
    parts.join(" > ")
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let groups: Vec<String> = self.groups.iter().map(|g| g.to_string()).collect();
        write!(f, "{}", groups.join(", "))
    }
}

impl std::fmt::Display for Compound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(tag) = &self.tag {
            write!(f, "{}", tag)?;
        }
        for c in &self.conditions {
            match c {
                Condition::Id(id) => write!(f, "#{}", id)?,
                Condition::Class(class) => write!(f, ".{}", class)?,
                Condition::Attr { name, op, value } => {
                    let op = match op {
                        AttrOp::Exists => {
                            write!(f, "[{}]", name)?;
                            continue;
                        }
                        AttrOp::Equals => "=",
                        AttrOp::Contains => "*=",
                        AttrOp::Prefix => "^=",
                        AttrOp::Suffix => "$=",
                    };
                    write!(f, "[{}{}\"{}\"]", name, op, value)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form_doc() -> (Document, NodeKey, NodeKey, NodeKey) {
        let mut doc = Document::new();
        let body = doc.create_element("body");
        doc.append_child(doc.root(), body).unwrap();
        let form = doc.create_element("form");
        doc.set_attribute(form, "class", "checkout wide extra").unwrap();
        doc.append_child(body, form).unwrap();
        let label = doc.create_element("label");
        let input = doc.create_element("input");
        doc.set_attribute(input, "name", "cc-number").unwrap();
        doc.set_attribute(input, "class", "secret").unwrap();
        doc.append_child(form, label).unwrap();
        doc.append_child(form, input).unwrap();
        (doc, body, form, input)
    }

    #[test]
    fn parse_compound_and_groups() {
        let s = Selector::parse("input.secret[name^=cc], textarea").unwrap();
        assert_eq!(s.groups.len(), 2);
        assert_eq!(s.groups[0].tag.as_deref(), Some("input"));
        assert_eq!(s.groups[0].conditions.len(), 2);
    }

    #[test]
    fn parse_rejects_combinators() {
        assert!(Selector::parse("form input").is_err());
        assert!(Selector::parse("").is_err());
        assert!(Selector::parse("[name=x").is_err());
    }

    #[test]
    fn matches_attribute_operators() {
        let (doc, _, form, input) = form_doc();
        assert!(Selector::parse("[name*=number]").unwrap().matches(&doc, input));
        assert!(Selector::parse("[name$='number']").unwrap().matches(&doc, input));
        assert!(Selector::parse(".secret").unwrap().matches(&doc, input));
        assert!(!Selector::parse(".secret").unwrap().matches(&doc, form));
        assert!(Selector::parse("form.checkout").unwrap().matches(&doc, form));
    }

    #[test]
    fn describe_builds_short_path() {
        let (mut doc, _, form, input) = form_doc();
        assert_eq!(
            describe(&doc, input),
            "body > form.checkout.wide > input.secret:nth-child(2)"
        );
        doc.set_attribute(form, "id", "pay").unwrap();
        assert_eq!(describe(&doc, input), "#pay > input.secret:nth-child(2)");
        doc.set_attribute(input, "id", "cc").unwrap();
        assert_eq!(describe(&doc, input), "#cc");
    }

    #[test]
    fn display_round_trips_through_parse() {
        let s = Selector::parse("input#a.b[data-x][name=\"y\"]").unwrap();
        let again = Selector::parse(&s.to_string()).unwrap();
        assert_eq!(s, again);
    }
}
