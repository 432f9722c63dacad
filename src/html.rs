//! A small, forgiving HTML tree.
//!
//! Post-processing needs to find and rewrite elements (`<a href>`, `<img>`)
//! without disturbing anything else, so the tree keeps text, attribute values
//! and everything it does not model (comments, doctype, entity references)
//! as the raw source text and writes it back verbatim.
//!
//! Parsing is done with `quick-xml` in lenient mode (no well-formedness
//! checks) plus the HTML rules XML lacks:
//!
//! - void elements (`<img>`, `<br>`, `<meta>` …) never take children,
//!   whether or not they are written self-closing;
//! - `<script>` and `<style>` bodies are raw text, never markup;
//! - an end tag closes every element opened after its match, and an end tag
//!   with no open match is ignored;
//! - attributes may be unquoted or valueless;
//! - a bare `&`, or a `<` that opens no tag, is plain text and comes back
//!   escaped.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HtmlError {
    #[error("HTML parse error at byte {position}: {message}")]
    Parse { position: u64, message: String },
    #[error("HTML serialize error: {0}")]
    Serialize(String),
}

/// Elements that never have children or an end tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose body is raw text.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

pub fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    /// Text exactly as it appeared in the source (entities still escaped).
    Text(String),
    /// Comments, doctype and other markup kept verbatim.
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    /// Lower-cased tag name.
    pub name: String,
    /// Attributes in source order. Values are stored escaped.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    /// Builder form of [`set_attr`](Self::set_attr).
    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.attrs.iter().position(|(k, _)| k.eq_ignore_ascii_case(key))
    }

    /// Unescaped attribute value.
    pub fn attr(&self, key: &str) -> Option<String> {
        let raw = &self.attrs[self.position(key)?].1;
        Some(
            unescape(raw)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| raw.clone()),
        )
    }

    pub fn has_attr(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Set (or replace) an attribute from an unescaped value.
    pub fn set_attr(&mut self, key: &str, value: &str) {
        let escaped = escape(value).into_owned();
        match self.position(key) {
            Some(i) => self.attrs[i].1 = escaped,
            None => self.attrs.push((key.to_string(), escaped)),
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_ascii_whitespace().any(|c| c == class))
    }

    /// Concatenated text of all descendants (raw, entities not decoded).
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attrs {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&value.replace('"', "&quot;"));
            out.push('"');
        }
        out.push('>');
        if is_void(&self.name) {
            return;
        }
        write_nodes(&self.children, out);
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => collect_text(&e.children, out),
            Node::Raw(_) => {}
        }
    }
}

fn write_nodes(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Element(e) => e.write_html(out),
            Node::Text(t) | Node::Raw(t) => out.push_str(t),
        }
    }
}

/// A parsed HTML document or fragment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub children: Vec<Node>,
}

impl Document {
    pub fn parse(html: &str) -> Result<Self, HtmlError> {
        let (markup, raw_bodies) = split_raw_text(html);
        let markup = escape_stray_text(&markup);
        let mut raw_bodies = raw_bodies.into_iter();
        let mut reader = Reader::from_reader(markup.as_bytes());
        reader.config_mut().trim_text(false);
        reader.config_mut().enable_all_checks(false);

        let mut root: Vec<Node> = Vec::new();
        let mut open: Vec<Element> = Vec::new();

        loop {
            let event = reader.read_event().map_err(|e| HtmlError::Parse {
                position: reader.error_position() as u64,
                message: e.to_string(),
            })?;
            match event {
                Event::Start(start) => {
                    let mut element = element_from(&start);
                    if is_void(&element.name) {
                        attach(&mut open, &mut root, Node::Element(element));
                        continue;
                    }
                    if RAW_TEXT_ELEMENTS.contains(&element.name.as_str())
                        && let Some(body) = raw_bodies.next()
                        && !body.is_empty()
                    {
                        element.children.push(Node::Text(body));
                    }
                    open.push(element);
                }
                Event::Empty(start) => {
                    attach(&mut open, &mut root, Node::Element(element_from(&start)));
                }
                Event::End(end) => {
                    let name = String::from_utf8_lossy(end.name().as_ref()).to_ascii_lowercase();
                    if let Some(pos) = open.iter().rposition(|e| e.name == name) {
                        while open.len() > pos {
                            if let Some(closed) = open.pop() {
                                attach(&mut open, &mut root, Node::Element(closed));
                            }
                        }
                    }
                }
                Event::Text(text) => {
                    attach(
                        &mut open,
                        &mut root,
                        Node::Text(String::from_utf8_lossy(&text).into_owned()),
                    );
                }
                Event::Eof => break,
                other => {
                    let raw = capture(other)?;
                    attach(&mut open, &mut root, Node::Raw(raw));
                }
            }
        }

        while let Some(unclosed) = open.pop() {
            attach(&mut open, &mut root, Node::Element(unclosed));
        }
        Ok(Self { children: root })
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        write_nodes(&self.children, &mut out);
        out
    }

    /// Visit every element, parents before children.
    pub fn for_each_element_mut(&mut self, f: &mut dyn FnMut(&mut Element)) {
        visit_mut(&mut self.children, f);
    }

    /// All elements named `name`, in document order.
    pub fn find_all(&self, name: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        find_in(&self.children, name, &mut found);
        found
    }

    /// Replace elements named `name` with whatever `f` returns for them.
    ///
    /// Elements inside any of `skip_within` are not visited. Returns the
    /// number of replacements.
    pub fn replace_elements(
        &mut self,
        name: &str,
        skip_within: &[&str],
        f: &mut dyn FnMut(&Element) -> Option<Element>,
    ) -> usize {
        replace_in(&mut self.children, name, skip_within, f)
    }
}

/// Lift `<script>`/`<style>` bodies out of the markup so the XML reader
/// never sees them. Returns the markup with empty bodies and the bodies in
/// document order.
fn split_raw_text(html: &str) -> (String, Vec<String>) {
    // ASCII lowering keeps byte offsets identical
    let lower = html.to_ascii_lowercase();
    let mut markup = String::with_capacity(html.len());
    let mut bodies = Vec::new();
    let mut pos = 0;

    while let Some((tag_start, name)) = next_raw_text_open(&lower, pos) {
        let Some(tag_end) = lower[tag_start..].find('>').map(|i| tag_start + i) else {
            break;
        };
        markup.push_str(&html[pos..=tag_end]);
        pos = tag_end + 1;
        if lower[..tag_end].ends_with('/') {
            continue;
        }
        let close = lower[pos..]
            .find(&format!("</{name}"))
            .map(|i| pos + i)
            .unwrap_or(html.len());
        bodies.push(html[pos..close].to_string());
        pos = close;
    }
    markup.push_str(&html[pos..]);
    (markup, bodies)
}

/// Escape text characters HTML tolerates but the XML reader rejects: a `&`
/// that does not start a complete reference, and a `<` that cannot open a
/// tag. Tags, comments and well-formed references pass through untouched.
fn escape_stray_text(markup: &str) -> String {
    let bytes = markup.as_bytes();
    let mut out = String::with_capacity(markup.len());
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'<' => match bytes.get(i + 1) {
                Some(b'!') if markup[i..].starts_with("<!--") => {
                    i = markup[i + 4..].find("-->").map_or(bytes.len(), |end| i + 4 + end + 3);
                }
                Some(b) if b.is_ascii_alphabetic() || *b == b'/' => {
                    i = tag_end(bytes, i + 1);
                }
                Some(b'!' | b'?') => {
                    i = markup[i..].find('>').map_or(bytes.len(), |end| i + end + 1);
                }
                _ => {
                    out.push_str(&markup[copied..i]);
                    out.push_str("&lt;");
                    i += 1;
                    copied = i;
                }
            },
            b'&' => {
                if reference_len(&bytes[i + 1..]).is_none() {
                    out.push_str(&markup[copied..i]);
                    out.push_str("&amp;");
                    copied = i + 1;
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    out.push_str(&markup[copied..]);
    out
}

/// Index just past the `>` closing the tag whose name starts at `from`,
/// skipping quoted attribute values.
fn tag_end(bytes: &[u8], from: usize) -> usize {
    let mut quote = None;
    for (offset, &b) in bytes[from..].iter().enumerate() {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(b),
            (None, b'>') => return from + offset + 1,
            (None, _) => {}
        }
    }
    bytes.len()
}

/// Length of a complete `name;`, `#123;` or `#x1F;` reference body.
fn reference_len(rest: &[u8]) -> Option<usize> {
    let (start, valid): (usize, fn(&u8) -> bool) = match rest {
        [b'#', b'x' | b'X', ..] => (2, u8::is_ascii_hexdigit),
        [b'#', ..] => (1, u8::is_ascii_digit),
        [first, ..] if first.is_ascii_alphabetic() => (0, u8::is_ascii_alphanumeric),
        _ => return None,
    };
    let body = rest[start..].iter().take_while(|&b| valid(b)).count();
    match rest.get(start + body) {
        Some(b';') if body > 0 => Some(start + body + 1),
        _ => None,
    }
}

/// Earliest opening `<script` / `<style` tag at or after `from`.
fn next_raw_text_open(lower: &str, from: usize) -> Option<(usize, &'static str)> {
    RAW_TEXT_ELEMENTS
        .iter()
        .filter_map(|name| {
            let pattern = format!("<{name}");
            let mut search = from;
            while let Some(i) = lower[search..].find(&pattern) {
                let at = search + i;
                let next = lower.as_bytes().get(at + pattern.len()).copied();
                if next.is_some_and(|b| b == b'>' || b == b'/' || b.is_ascii_whitespace()) {
                    return Some((at, *name));
                }
                search = at + pattern.len();
            }
            None
        })
        .min_by_key(|(at, _)| *at)
}

fn element_from(start: &BytesStart<'_>) -> Element {
    let name = String::from_utf8_lossy(start.name().as_ref()).to_ascii_lowercase();
    let attrs = start
        .html_attributes()
        .flatten()
        .map(|attr| {
            (
                String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                String::from_utf8_lossy(&attr.value).into_owned(),
            )
        })
        .collect();
    Element {
        name,
        attrs,
        children: Vec::new(),
    }
}

fn attach(open: &mut [Element], root: &mut Vec<Node>, node: Node) {
    match open.last_mut() {
        Some(parent) => parent.children.push(node),
        None => root.push(node),
    }
}

/// Serialize a single event we keep verbatim.
fn capture(event: Event<'_>) -> Result<String, HtmlError> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(event)
        .map_err(|e| HtmlError::Serialize(e.to_string()))?;
    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

fn visit_mut(nodes: &mut [Node], f: &mut dyn FnMut(&mut Element)) {
    for node in nodes {
        if let Node::Element(element) = node {
            f(element);
            visit_mut(&mut element.children, f);
        }
    }
}

fn find_in<'a>(nodes: &'a [Node], name: &str, found: &mut Vec<&'a Element>) {
    for node in nodes {
        if let Node::Element(element) = node {
            if element.name == name {
                found.push(element);
            }
            find_in(&element.children, name, found);
        }
    }
}

fn replace_in(
    nodes: &mut [Node],
    name: &str,
    skip_within: &[&str],
    f: &mut dyn FnMut(&Element) -> Option<Element>,
) -> usize {
    let mut replaced = 0;
    for node in nodes.iter_mut() {
        let replacement = match node {
            Node::Element(element) if element.name == name => f(element),
            _ => None,
        };
        if let Some(new_element) = replacement {
            *node = Node::Element(new_element);
            replaced += 1;
            continue;
        }
        if let Node::Element(element) = node
            && !skip_within.contains(&element.name.as_str())
        {
            replaced += replace_in(&mut element.children, name, skip_within, f);
        }
    }
    replaced
}
