//! Minimal element tree built from `quick-xml` events.
//!
//! Only what post documents and blob listings need is kept: element names
//! (namespace prefixes dropped), attributes, child elements and the element's
//! own text. Comments, processing instructions and text outside the root are
//! ignored.

use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};

use super::DocumentError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    /// Parse `text` and return its root element.
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        let mut reader = Reader::from_str(text);
        let mut open: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => open.push(Element::open(&start)?),
                Event::Empty(start) => {
                    let element = Element::open(&start)?;
                    close(&mut open, &mut root, element);
                }
                Event::End(_) => {
                    if let Some(element) = open.pop() {
                        close(&mut open, &mut root, element);
                    }
                }
                Event::Text(text) => {
                    if let Some(current) = open.last_mut() {
                        current.text.push_str(&text.unescape()?);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = open.last_mut() {
                        current.text.push_str(std::str::from_utf8(&data)?);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(unclosed) = open.pop() {
            return Err(DocumentError::Unclosed {
                element: unclosed.name,
            });
        }

        root.ok_or(DocumentError::MissingRoot)
    }

    fn open(start: &BytesStart<'_>) -> Result<Self, DocumentError> {
        let name = std::str::from_utf8(start.local_name().as_ref())?.to_string();
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(quick_xml::Error::from)?;
            let key = std::str::from_utf8(attribute.key.local_name().as_ref())?.to_string();
            let value = attribute.unescape_value()?.into_owned();
            attributes.push((key, value));
        }

        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
            text: String::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The element's own text content, unescaped and untrimmed.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First direct child with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Direct children with the given name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |child| child.name == name)
    }
}

fn close(open: &mut [Element], root: &mut Option<Element>, element: Element) {
    match open.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_attributes_and_text() {
        let root = Element::parse(
            r#"<?xml version="1.0"?>
<post>
  <title>Fish &amp; Chips</title>
  <comments>
    <comment id="c1" isAdmin="true"><author>ann</author></comment>
    <comment id="c2" />
  </comments>
</post>"#,
        )
        .expect("parse");

        assert_eq!(root.name(), "post");
        assert_eq!(root.child("title").map(Element::text), Some("Fish & Chips"));

        let comments: Vec<_> = root
            .child("comments")
            .expect("comments")
            .children_named("comment")
            .collect();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].attribute("id"), Some("c1"));
        assert_eq!(comments[0].attribute("isAdmin"), Some("true"));
        assert_eq!(comments[0].child("author").map(Element::text), Some("ann"));
        assert_eq!(comments[1].attribute("isAdmin"), None);
    }

    #[test]
    fn keeps_cdata_and_surrounding_whitespace() {
        let root = Element::parse("<post><content>  <![CDATA[<p>hi</p>]]>\n</content></post>")
            .expect("parse");
        assert_eq!(
            root.child("content").map(Element::text),
            Some("  <p>hi</p>\n")
        );
    }

    #[test]
    fn drops_namespace_prefixes() {
        let root = Element::parse(r#"<b:post xmlns:b="urn:blog"><b:title>x</b:title></b:post>"#)
            .expect("parse");
        assert_eq!(root.name(), "post");
        assert!(root.child("title").is_some());
    }

    #[test]
    fn empty_input_has_no_root() {
        let error = Element::parse("   ").expect_err("no root");
        assert!(matches!(error, DocumentError::MissingRoot));
    }

    #[test]
    fn mismatched_end_tag_is_malformed() {
        let error = Element::parse("<post><title>x</slug></post>").expect_err("malformed");
        assert!(matches!(error, DocumentError::Malformed(_)));
    }
}
