//! RSS / Atom document parsing into the canonical [`Entry`] shape.
//!
//! Parsing is total: malformed XML stops the reader early and whatever was
//! read so far is used, and missing fields degrade to empty strings (or
//! `"Untitled"` for entry titles). Nothing here performs I/O.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Title given to entries whose source has none.
pub const UNTITLED: &str = "Untitled";

/// Nesting depth beyond which elements are ignored.
const MAX_DEPTH: usize = 256;

/// One syndicated item as parsed from a feed document.
///
/// Empty string is the absence sentinel for every field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub title: String,
    pub link: String,
    /// Source date string, verbatim.
    pub published: String,
    /// Raw, possibly HTML-bearing body.
    pub content: String,
    pub author: String,
}

/// A parsed feed document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    /// Feed-level title; empty when the document declares none.
    pub title: String,
    pub items: Vec<Entry>,
}

/// Parses an RSS or Atom document.
///
/// A `feed` element anywhere in the document selects the Atom branch;
/// everything else is treated as RSS (`channel`/`item`).
pub fn parse_feed(raw: &str) -> ParsedFeed {
    let root = build_tree(raw);

    match root.find(&|n: &Node| n.local_name() == "feed") {
        Some(feed) => parse_atom(feed),
        None => parse_rss(&root),
    }
}

fn parse_atom(feed: &Node) -> ParsedFeed {
    let mut items = Vec::new();
    feed.collect(&|n: &Node| n.local_name() == "entry", &mut items);

    ParsedFeed {
        title: feed.child_local("title").map(Node::text).unwrap_or_default(),
        items: items.into_iter().map(atom_entry).collect(),
    }
}

fn atom_entry(entry: &Node) -> Entry {
    let links: Vec<&Node> = entry.children_local("link").collect();
    let link = links
        .iter()
        // A link without rel is an alternate link
        .find(|l| matches!(l.attr("rel"), None | Some("alternate")))
        .or_else(|| links.first())
        .map(|l| match l.attr("href") {
            Some(href) => href.trim().to_string(),
            None => l.text(),
        })
        .unwrap_or_default();

    Entry {
        title: title_or_untitled(entry.child_local("title")),
        link,
        published: first_text(&[entry.child_local("published"), entry.child_local("updated")]),
        content: first_text(&[entry.child_local("content"), entry.child_local("summary")]),
        author: entry
            .child_local("author")
            .and_then(|a| a.child_local("name"))
            .map(Node::text)
            .unwrap_or_default(),
    }
}

fn parse_rss(root: &Node) -> ParsedFeed {
    let channel = root.find(&|n: &Node| n.name == "channel");
    let mut items = Vec::new();
    root.collect(&|n: &Node| n.name == "item", &mut items);

    ParsedFeed {
        title: channel
            .and_then(|c| c.child("title"))
            .map(Node::text)
            .unwrap_or_default(),
        items: items.into_iter().map(rss_item).collect(),
    }
}

fn rss_item(item: &Node) -> Entry {
    Entry {
        title: title_or_untitled(item.child("title")),
        link: item.child("link").map(Node::text).unwrap_or_default(),
        published: first_text(&[item.child("pubDate"), item.child("dc:date")]),
        content: first_text(&[item.child("content:encoded"), item.child("description")]),
        author: first_text(&[item.child("dc:creator"), item.child("author")]),
    }
}

fn title_or_untitled(node: Option<&Node>) -> String {
    match node.map(Node::text) {
        Some(title) if !title.is_empty() => title,
        _ => UNTITLED.to_string(),
    }
}

/// Text of the first present, non-empty candidate.
fn first_text(candidates: &[Option<&Node>]) -> String {
    candidates
        .iter()
        .flatten()
        .map(|n| n.text())
        .find(|t| !t.is_empty())
        .unwrap_or_default()
}

// ============================================================================
// Minimal element tree
// ============================================================================

#[derive(Debug, Default)]
struct Node {
    /// Qualified name as written, e.g. `dc:creator`.
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Child>,
}

#[derive(Debug)]
enum Child {
    Element(Node),
    Text(String),
}

impl Node {
    fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn elements(&self) -> impl Iterator<Item = &Node> {
        self.children.iter().filter_map(|c| match c {
            Child::Element(n) => Some(n),
            Child::Text(_) => None,
        })
    }

    fn child(&self, name: &str) -> Option<&Node> {
        self.elements().find(|n| n.name == name)
    }

    fn child_local(&self, name: &'static str) -> Option<&Node> {
        self.children_local(name).next()
    }

    fn children_local(&self, name: &'static str) -> impl Iterator<Item = &Node> {
        self.elements().filter(move |n| n.local_name() == name)
    }

    /// Depth-first search over this node and its descendants.
    fn find(&self, pred: &dyn Fn(&Node) -> bool) -> Option<&Node> {
        if pred(self) {
            return Some(self);
        }
        self.elements().find_map(|n| n.find(pred))
    }

    /// Collects matching descendants in document order, not descending into matches.
    fn collect<'a>(&'a self, pred: &dyn Fn(&Node) -> bool, out: &mut Vec<&'a Node>) {
        for n in self.elements() {
            if pred(n) {
                out.push(n);
            } else {
                n.collect(pred, out);
            }
        }
    }

    /// Concatenated descendant text, trimmed.
    fn text(&self) -> String {
        let mut buf = String::new();
        self.push_text(&mut buf);
        buf.trim().to_string()
    }

    fn push_text(&self, buf: &mut String) {
        for child in &self.children {
            match child {
                Child::Text(t) => buf.push_str(t),
                Child::Element(n) => n.push_text(buf),
            }
        }
    }
}

/// Builds an element tree from `raw`, keeping everything read before the
/// first hard XML error.
///
/// quick-xml (0.37) never expands `<!ENTITY>` declarations, so DOCTYPE-based
/// entity tricks cannot reach outside the document.
fn build_tree(raw: &str) -> Node {
    let mut reader = Reader::from_str(raw);
    reader.config_mut().check_end_names = false;

    let mut stack: Vec<Node> = vec![Node::default()];
    // Depth of ignored elements below MAX_DEPTH.
    let mut skipped: usize = 0;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if skipped > 0 || stack.len() > MAX_DEPTH {
                    skipped += 1;
                    continue;
                }
                stack.push(element(&e, &reader));
            }
            Ok(Event::Empty(e)) => {
                if skipped > 0 || stack.len() > MAX_DEPTH {
                    continue;
                }
                let node = element(&e, &reader);
                attach(&mut stack, Child::Element(node));
            }
            Ok(Event::End(_)) => {
                if skipped > 0 {
                    skipped -= 1;
                    continue;
                }
                // A stray close tag at top level has nothing to pop.
                if stack.len() > 1 {
                    if let Some(node) = stack.pop() {
                        attach(&mut stack, Child::Element(node));
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if skipped > 0 {
                    continue;
                }
                let text = match e.unescape() {
                    Ok(t) => t.into_owned(),
                    // Undeclared entities such as &nbsp; in HTML payloads.
                    Err(_) => String::from_utf8_lossy(&e).into_owned(),
                };
                attach(&mut stack, Child::Text(text));
            }
            Ok(Event::CData(e)) => {
                if skipped > 0 {
                    continue;
                }
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                attach(&mut stack, Child::Text(text));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!(
                    position = reader.buffer_position(),
                    error = %e,
                    "Malformed feed XML, keeping partial document"
                );
                break;
            }
            _ => {}
        }
    }

    // Close anything left open by a truncated document.
    while stack.len() > 1 {
        if let Some(node) = stack.pop() {
            attach(&mut stack, Child::Element(node));
        }
    }
    stack.pop().unwrap_or_default()
}

fn element(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Node {
    let decoder = reader.decoder();
    let attrs = e
        .attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = match attr.decode_and_unescape_value(decoder) {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            (key, value)
        })
        .collect();

    Node {
        name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
        attrs,
        children: Vec::new(),
    }
}

fn attach(stack: &mut [Node], child: Child) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(child);
    }
}
