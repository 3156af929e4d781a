//! Navigable tree decoded from XML response bodies.

use std::fmt;

use indexmap::IndexMap;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

/// An element of a decoded XML document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Node {
    /// Element name.
    pub name: String,
    /// Concatenated text content, if any.
    pub text: Option<String>,
    /// Attributes in document order.
    pub attributes: IndexMap<String, String>,
    /// Child elements in document order.
    pub children: Vec<Node>,
}

/// Result of looking up children by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// Exactly one child matched.
    One(&'a Node),
    /// Several children share the name.
    Many(Vec<&'a Node>),
}

impl<'a> Lookup<'a> {
    /// The single node, or the first of several.
    pub fn first(&self) -> &'a Node {
        match self {
            Lookup::One(node) => node,
            Lookup::Many(nodes) => nodes[0],
        }
    }

    /// All matched nodes.
    pub fn nodes(&self) -> Vec<&'a Node> {
        match self {
            Lookup::One(node) => vec![*node],
            Lookup::Many(nodes) => nodes.clone(),
        }
    }

    /// Text of the first matched node.
    pub fn text(&self) -> Option<&'a str> {
        self.first().text.as_deref()
    }

    fn from_nodes(mut nodes: Vec<&'a Node>) -> Option<Self> {
        match nodes.len() {
            0 => None,
            1 => nodes.pop().map(Lookup::One),
            _ => Some(Lookup::Many(nodes)),
        }
    }
}

impl Node {
    /// Create an empty element.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse a document, returning its root element.
    ///
    /// Returns `None` for empty input, input without a root element, or
    /// malformed markup.
    pub fn parse(xml: &str) -> Option<Node> {
        let mut reader = Reader::from_str(xml.trim());
        reader.trim_text(true);

        let mut stack: Vec<Node> = Vec::new();
        let mut root = None;

        loop {
            match reader.read_event().ok()? {
                Event::Start(start) => stack.push(element(&start)?),
                Event::Empty(start) => {
                    let node = element(&start)?;
                    attach(&mut stack, &mut root, node)?;
                }
                Event::End(_) => {
                    let node = stack.pop()?;
                    attach(&mut stack, &mut root, node)?;
                }
                Event::Text(text) => {
                    let text = text.unescape().ok()?;
                    push_text(stack.last_mut(), &text);
                }
                Event::CData(data) => {
                    let text = String::from_utf8(data.into_inner().into_owned()).ok()?;
                    push_text(stack.last_mut(), &text);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if stack.is_empty() {
            root
        } else {
            None
        }
    }

    /// Text content, or `""` when the element has none.
    pub fn value(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }

    /// Look up direct children by name.
    pub fn get(&self, key: &str) -> Option<Lookup<'_>> {
        Lookup::from_nodes(self.children.iter().filter(|c| c.name == key).collect())
    }

    /// First direct child with the given name.
    pub fn child(&self, key: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == key)
    }

    /// Look up several names at once.
    pub fn slice<S: AsRef<str>>(&self, keys: &[S]) -> Vec<Option<Lookup<'_>>> {
        keys.iter().map(|k| self.get(k.as_ref())).collect()
    }

    /// Collect child texts by name.
    ///
    /// With `keys`, only those names are considered; otherwise every direct
    /// child. Children without text are skipped unless `include_empty`.
    pub fn values<S: AsRef<str>>(
        &self,
        keys: Option<&[S]>,
        include_empty: bool,
    ) -> IndexMap<String, String> {
        let mut out = IndexMap::new();
        match keys {
            Some(keys) => {
                for key in keys {
                    let key = key.as_ref();
                    if let Some(found) = self.get(key) {
                        match found.text() {
                            Some(text) => {
                                out.insert(key.to_string(), text.to_string());
                            }
                            None if include_empty => {
                                out.insert(key.to_string(), String::new());
                            }
                            None => {}
                        }
                    }
                }
            }
            None => {
                for child in &self.children {
                    if child.text.is_some() || include_empty {
                        out.insert(child.name.clone(), child.value().to_string());
                    }
                }
            }
        }
        out
    }

    /// Walk down several levels of names.
    pub fn dig<S: AsRef<str>>(&self, path: &[S]) -> Option<Lookup<'_>> {
        let mut parents: Vec<&Node> = vec![self];
        for key in path {
            let key = key.as_ref();
            parents = parents
                .into_iter()
                .flat_map(|p| p.children.iter().filter(move |c| c.name == key))
                .collect();
            if parents.is_empty() {
                return None;
            }
        }
        Lookup::from_nodes(parents)
    }

    /// First matching element, searching direct children then descendants.
    pub fn first(&self, key: &str) -> Option<&Node> {
        self.child(key)
            .or_else(|| self.children.iter().find_map(|c| c.first(key)))
    }

    /// Every matching element: direct children first, then descendants.
    pub fn all(&self, key: &str) -> Vec<&Node> {
        let mut found: Vec<&Node> = self.children.iter().filter(|c| c.name == key).collect();
        for child in &self.children {
            found.extend(child.all(key));
        }
        found
    }

    /// Convert to a mapping keyed by the root element name.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(self.name.clone(), self.content_value());
        Value::Object(map)
    }

    /// Content of this element as a JSON value.
    ///
    /// Plain leaves become their text (or null). Elements with attributes or
    /// children become objects: attributes under `@name`, text under
    /// `#text`, and children grouped by name with repeated names as arrays.
    pub fn content_value(&self) -> Value {
        if self.attributes.is_empty() && self.children.is_empty() {
            return self.text.clone().map_or(Value::Null, Value::String);
        }

        let mut map = Map::new();
        for (name, value) in &self.attributes {
            map.insert(format!("@{}", name), Value::String(value.clone()));
        }
        if let Some(text) = &self.text {
            map.insert("#text".to_string(), Value::String(text.clone()));
        }

        let mut groups: IndexMap<&str, Vec<Value>> = IndexMap::new();
        for child in &self.children {
            groups.entry(child.name.as_str()).or_default().push(child.content_value());
        }
        for (name, mut values) in groups {
            let value = if values.len() == 1 {
                values.remove(0)
            } else {
                Value::Array(values)
            };
            map.insert(name.to_string(), value);
        }

        Value::Object(map)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

fn element(start: &BytesStart<'_>) -> Option<Node> {
    let name = String::from_utf8(start.name().as_ref().to_vec()).ok()?;
    let mut node = Node::new(name);
    for attr in start.attributes() {
        let attr = attr.ok()?;
        let key = String::from_utf8(attr.key.as_ref().to_vec()).ok()?;
        let value = attr.unescape_value().ok()?.into_owned();
        node.attributes.insert(key, value);
    }
    Some(node)
}

fn attach(stack: &mut [Node], root: &mut Option<Node>, node: Node) -> Option<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        // a second top-level element is malformed
        None if root.is_some() => return None,
        None => *root = Some(node),
    }
    Some(())
}

fn push_text(node: Option<&mut Node>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(node) = node {
        match &mut node.text {
            Some(existing) => existing.push_str(text),
            None => node.text = Some(text.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DOC: &str = "<xml><foo>123</foo><bar><test>456</test></bar></xml>";

    const NESTED: &str = r#"
        <xml>
          <foo attr="bar">test</foo>
          <nested>
            <item>
              <title attr="downcased">foobar</title>
            </item>
          </nested>
        </xml>
    "#;

    #[test]
    fn test_parse_simple_document() {
        let root = Node::parse(DOC).unwrap();
        assert_eq!(root.name, "xml");
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.child("foo").unwrap().value(), "123");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Node::parse("").is_none());
        assert!(Node::parse("abcdef").is_none());
        assert!(Node::parse("<xml><foo>123</xml>").is_none());
        assert!(Node::parse("<xml><foo>").is_none());
        assert!(Node::parse("<a/><b/>").is_none());
    }

    #[test]
    fn test_dig() {
        let root = Node::parse(DOC).unwrap();
        let found = root.dig(&["bar", "test"]).unwrap();
        assert!(matches!(found, Lookup::One(_)));
        assert_eq!(found.first().to_string(), "456");

        assert!(root.dig(&["xxx", "test"]).is_none());
        assert!(root.dig(&["xxx", "test", "111"]).is_none());
    }

    #[test]
    fn test_nested_lookup_and_attributes() {
        let root = Node::parse(NESTED).unwrap();
        let title = root
            .child("nested")
            .and_then(|n| n.child("item"))
            .and_then(|n| n.child("title"))
            .unwrap();
        assert_eq!(title.value(), "foobar");
        assert_eq!(title.attributes.get("attr").map(String::as_str), Some("downcased"));
        assert_eq!(root.child("foo").unwrap().attributes["attr"], "bar");
    }

    #[test]
    fn test_get_single_many_and_absent() {
        let root = Node::parse("<list><item>1</item><item>2</item><other/></list>").unwrap();
        match root.get("item") {
            Some(Lookup::Many(items)) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[1].value(), "2");
            }
            other => panic!("expected many, got {:?}", other),
        }
        assert!(matches!(root.get("other"), Some(Lookup::One(_))));
        assert!(root.get("missing").is_none());
    }

    #[test]
    fn test_first_and_all_search_descendants() {
        let root = Node::parse(
            "<r><a><t>1</t></a><t>2</t><b><c><t>3</t></c></b></r>",
        )
        .unwrap();
        assert_eq!(root.first("t").unwrap().value(), "2");
        assert_eq!(root.first("c").unwrap().name, "c");
        assert!(root.first("zzz").is_none());

        let all: Vec<&str> = root.all("t").iter().map(|n| n.value()).collect();
        assert_eq!(all, vec!["2", "1", "3"]);
    }

    #[test]
    fn test_slice_and_values() {
        let root = Node::parse("<u><name>ann</name><email/><age>30</age></u>").unwrap();

        let sliced = root.slice(&["name", "missing"]);
        assert_eq!(sliced[0].as_ref().and_then(|l| l.text()), Some("ann"));
        assert!(sliced[1].is_none());

        let values = root.values::<&str>(None, false);
        assert_eq!(values.len(), 2);
        assert_eq!(values["age"], "30");

        let with_empty = root.values(Some(&["name", "email"][..]), true);
        assert_eq!(with_empty["email"], "");
        assert_eq!(with_empty["name"], "ann");
    }

    #[test]
    fn test_lookup_does_not_mutate() {
        let root = Node::parse(NESTED).unwrap();
        let before = root.clone();
        let _ = root.get("nested");
        let _ = root.dig(&["nested", "item"]);
        let _ = root.all("title");
        assert_eq!(root, before);
    }

    #[test]
    fn test_to_value_groups_siblings() {
        let root = Node::parse(
            r#"<feed version="2"><title>News</title><entry id="1">a</entry>
               <entry id="2">b</entry><empty/></feed>"#,
        )
        .unwrap();
        assert_eq!(
            root.to_value(),
            json!({
                "feed": {
                    "@version": "2",
                    "title": "News",
                    "entry": [
                        {"@id": "1", "#text": "a"},
                        {"@id": "2", "#text": "b"}
                    ],
                    "empty": null
                }
            })
        );
    }

    #[test]
    fn test_entities_and_cdata() {
        let root = Node::parse("<r><a>fish &amp; chips</a><b><![CDATA[<raw>]]></b></r>").unwrap();
        assert_eq!(root.child("a").unwrap().value(), "fish & chips");
        assert_eq!(root.child("b").unwrap().value(), "<raw>");
    }
}
