//! XML document codec for posts.
//!
//! Each post is stored as one UTF-8 XML document:
//!
//! ```xml
//! <post>
//!   <title>…</title>
//!   <slug>…</slug>
//!   <author>…</author>
//!   <pubDate>2020-01-01 09:30:00</pubDate>
//!   <lastModified>2020-01-02 10:00:00</lastModified>
//!   <content>…</content>
//!   <ispublished>true</ispublished>
//!   <categories><category>…</category></categories>
//!   <comments>
//!     <comment id="…" isAdmin="false">
//!       <author/><email/><website/><ip/><userAgent/><date/><content/>
//!     </comment>
//!   </comments>
//! </post>
//! ```
//!
//! Reads are lenient towards documents written by older versions: missing
//! `lastModified`, `ispublished`, `categories` and `comments` are defaulted.
//! Timestamps carry no zone designator and are UTC.

pub mod tree;

use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};
use thiserror::Error;
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, UtcOffset,
    format_description::{BorrowedFormatItem, well_known::Rfc3339},
    macros::format_description,
};

use crate::domain::posts::{COMMENT_DATE_SENTINEL, Comment, Post, now_to_the_second};

use tree::Element;

/// File extension (without the dot) carried by every stored document.
pub const DOCUMENT_EXTENSION: &str = "xml";

/// Replacement for newlines in comment bodies read from storage.
pub const LINE_BREAK_MARKUP: &str = "<br />";

const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

const LENIENT_TIMESTAMP_FORMATS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!(
        "[year]-[month padding:none]-[day padding:none] [hour padding:none]:[minute padding:none]:[second padding:none][optional [.[subsecond]]]"
    ),
    format_description!(
        "[year]-[month padding:none]-[day padding:none]T[hour padding:none]:[minute padding:none]:[second padding:none][optional [.[subsecond]]]"
    ),
];

const DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month padding:none]-[day padding:none]");

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("malformed xml: {0}")]
    Malformed(#[from] quick_xml::Error),
    #[error("document is not valid utf-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("document has no root element")]
    MissingRoot,
    #[error("element `{element}` is never closed")]
    Unclosed { element: String },
    #[error("field `{field}` holds an unreadable timestamp `{value}`")]
    InvalidTimestamp { field: &'static str, value: String },
    #[error("field `{field}` holds an unreadable flag `{value}`")]
    InvalidFlag { field: &'static str, value: String },
    #[error("failed to format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
    #[error("failed to write document: {0}")]
    Write(#[from] std::io::Error),
}

/// Serialize `post`, stamping its `last_modified` with the current time.
pub fn encode(post: &mut Post) -> Result<String, DocumentError> {
    post.last_modified = now_to_the_second();

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), Some("yes"))))?;
    writer.write_event(Event::Start(BytesStart::new("post")))?;

    write_text_element(&mut writer, "title", &post.title)?;
    write_text_element(&mut writer, "slug", &post.slug)?;
    write_text_element(&mut writer, "author", &post.author)?;
    write_text_element(&mut writer, "pubDate", &format_timestamp(post.pub_date)?)?;
    write_text_element(
        &mut writer,
        "lastModified",
        &format_timestamp(post.last_modified)?,
    )?;
    write_text_element(&mut writer, "content", &post.content)?;
    write_text_element(&mut writer, "ispublished", format_flag(post.is_published))?;

    if post.categories.is_empty() {
        writer.write_event(Event::Empty(BytesStart::new("categories")))?;
    } else {
        writer.write_event(Event::Start(BytesStart::new("categories")))?;
        for category in &post.categories {
            write_text_element(&mut writer, "category", category)?;
        }
        writer.write_event(Event::End(BytesEnd::new("categories")))?;
    }

    if post.comments.is_empty() {
        writer.write_event(Event::Empty(BytesStart::new("comments")))?;
    } else {
        writer.write_event(Event::Start(BytesStart::new("comments")))?;
        for comment in &post.comments {
            write_comment(&mut writer, comment)?;
        }
        writer.write_event(Event::End(BytesEnd::new("comments")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("post")))?;

    let bytes = writer.into_inner();
    Ok(String::from_utf8(bytes).map_err(|err| err.utf8_error())?)
}

/// Deserialize a post document.
///
/// The post identifier always comes from `fallback_id` (a storage key or
/// object path); a trailing `.xml` and any leading path are stripped.
pub fn decode(text: &str, fallback_id: &str) -> Result<Post, DocumentError> {
    let root = Element::parse(text)?;

    let pub_date_text = read_value(&root, "pubDate");
    let pub_date =
        parse_timestamp(pub_date_text).ok_or_else(|| DocumentError::InvalidTimestamp {
            field: "pubDate",
            value: pub_date_text.to_string(),
        })?;

    let last_modified = match root.child("lastModified") {
        Some(element) => {
            parse_timestamp(element.text()).ok_or_else(|| DocumentError::InvalidTimestamp {
                field: "lastModified",
                value: element.text().to_string(),
            })?
        }
        None => OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()),
    };

    let is_published = match root.child("ispublished") {
        Some(element) => parse_flag("ispublished", element.text())?,
        None => true,
    };

    let categories = root
        .child("categories")
        .map(|categories| {
            categories
                .children_named("category")
                .map(|category| category.text().to_string())
                .collect()
        })
        .unwrap_or_default();

    let comments = match root.child("comments") {
        Some(comments) => comments
            .children_named("comment")
            .map(decode_comment)
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(Post {
        id: document_id(fallback_id).to_string(),
        title: read_value(&root, "title").to_string(),
        author: read_value(&root, "author").to_string(),
        slug: read_value(&root, "slug").to_lowercase(),
        content: read_value(&root, "content").to_string(),
        pub_date,
        last_modified,
        is_published,
        categories,
        comments,
    })
}

/// Name of the stored document for a key, e.g. `p1` → `p1.xml`.
pub fn document_name(key: &str) -> String {
    format!("{key}.{DOCUMENT_EXTENSION}")
}

/// Key for a stored document name, or `None` when the name is not a document.
pub fn document_key(name: &str) -> Option<&str> {
    name.strip_suffix(DOCUMENT_EXTENSION)
        .and_then(|stem| stem.strip_suffix('.'))
        .filter(|stem| !stem.is_empty())
}

fn document_id(fallback_id: &str) -> &str {
    let name = fallback_id.rsplit(['/', '\\']).next().unwrap_or(fallback_id);
    document_key(name).unwrap_or(name)
}

fn decode_comment(node: &Element) -> Result<Comment, DocumentError> {
    let is_admin = match node.attribute("isAdmin") {
        Some(value) => parse_flag("comment.isAdmin", value)?,
        None => false,
    };

    let pub_date = node
        .child("date")
        .and_then(|date| parse_timestamp(date.text()))
        .unwrap_or(COMMENT_DATE_SENTINEL);

    Ok(Comment {
        id: node.attribute("id").unwrap_or_default().to_string(),
        author: read_value(node, "author").to_string(),
        email: read_value(node, "email").to_string(),
        website: read_value(node, "website").to_string(),
        ip: read_value(node, "ip").to_string(),
        user_agent: read_value(node, "userAgent").to_string(),
        content: read_value(node, "content").replace('\n', LINE_BREAK_MARKUP),
        is_admin,
        pub_date,
    })
}

fn write_comment(writer: &mut Writer<Vec<u8>>, comment: &Comment) -> Result<(), DocumentError> {
    let mut start = BytesStart::new("comment");
    start.push_attribute(("id", comment.id.as_str()));
    start.push_attribute(("isAdmin", format_flag(comment.is_admin)));
    writer.write_event(Event::Start(start))?;

    write_text_element(writer, "author", &comment.author)?;
    write_text_element(writer, "email", &comment.email)?;
    write_text_element(writer, "website", &comment.website)?;
    write_text_element(writer, "ip", &comment.ip)?;
    write_text_element(writer, "userAgent", &comment.user_agent)?;
    write_text_element(writer, "date", &format_timestamp(comment.pub_date)?)?;
    write_text_element(writer, "content", &comment.content)?;

    writer.write_event(Event::End(BytesEnd::new("comment")))?;
    Ok(())
}

fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &str,
) -> Result<(), DocumentError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn read_value<'a>(element: &'a Element, name: &str) -> &'a str {
    element.child(name).map(Element::text).unwrap_or_default()
}

fn format_timestamp(value: OffsetDateTime) -> Result<String, DocumentError> {
    Ok(value.to_offset(UtcOffset::UTC).format(TIMESTAMP_FORMAT)?)
}

fn format_flag(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(timestamp) = OffsetDateTime::parse(value, &Rfc3339) {
        return Some(timestamp.to_offset(UtcOffset::UTC));
    }

    LENIENT_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| PrimitiveDateTime::parse(value, format).ok())
        .map(PrimitiveDateTime::assume_utc)
        .or_else(|| {
            Date::parse(value, DATE_FORMAT)
                .ok()
                .map(|date| date.midnight().assume_utc())
        })
}

fn parse_flag(field: &'static str, value: &str) -> Result<bool, DocumentError> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(DocumentError::InvalidFlag {
            field,
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn sample_post() -> Post {
        Post {
            id: "hello-world".to_string(),
            title: "Hello <World> & friends".to_string(),
            author: "ada".to_string(),
            slug: "hello-world".to_string(),
            content: "<p>First paragraph</p>\n<p>Second</p>".to_string(),
            pub_date: datetime!(2020-03-04 05:06:07 UTC),
            last_modified: datetime!(2020-03-04 05:06:07 UTC),
            is_published: false,
            categories: vec!["rust".to_string(), "storage".to_string()],
            comments: vec![
                Comment {
                    id: "c1".to_string(),
                    author: "bob".to_string(),
                    email: "bob@example.com".to_string(),
                    website: "https://bob.example.com".to_string(),
                    ip: "10.0.0.1".to_string(),
                    user_agent: "curl/8".to_string(),
                    content: "nice post".to_string(),
                    is_admin: false,
                    pub_date: datetime!(2020-03-05 08:09:10 UTC),
                },
                Comment {
                    id: "c2".to_string(),
                    author: "ada".to_string(),
                    email: String::new(),
                    website: String::new(),
                    ip: String::new(),
                    user_agent: String::new(),
                    content: "thanks\nbob".to_string(),
                    is_admin: true,
                    pub_date: datetime!(2020-03-06 00:00:00 UTC),
                },
            ],
        }
    }

    #[test]
    fn round_trip_preserves_fields_except_comment_newlines() {
        let mut post = sample_post();
        let text = encode(&mut post).expect("encode");
        let decoded = decode(&text, "hello-world").expect("decode");

        assert_eq!(decoded.id, post.id);
        assert_eq!(decoded.title, post.title);
        assert_eq!(decoded.author, post.author);
        assert_eq!(decoded.slug, post.slug);
        assert_eq!(decoded.content, post.content);
        assert_eq!(decoded.pub_date, post.pub_date);
        assert_eq!(decoded.last_modified, post.last_modified);
        assert_eq!(decoded.is_published, post.is_published);
        assert_eq!(decoded.categories, post.categories);
        assert_eq!(decoded.comments[0], post.comments[0]);

        let second = &decoded.comments[1];
        assert_eq!(second.content, "thanks<br />bob");
        assert!(second.is_admin);
        assert_eq!(second.pub_date, post.comments[1].pub_date);
    }

    #[test]
    fn encode_stamps_last_modified() {
        let mut post = sample_post();
        let before = OffsetDateTime::now_utc() - time::Duration::seconds(1);
        encode(&mut post).expect("encode");
        assert!(post.last_modified >= before);
        assert_eq!(post.last_modified.nanosecond(), 0);
    }

    #[test]
    fn encode_emits_fields_in_fixed_order() {
        let mut post = sample_post();
        let text = encode(&mut post).expect("encode");

        let positions: Vec<usize> = [
            "<title>",
            "<slug>",
            "<author>",
            "<pubDate>",
            "<lastModified>",
            "<content>",
            "<ispublished>",
            "<categories>",
            "<comments>",
        ]
        .iter()
        .map(|tag| text.find(tag).unwrap_or_else(|| panic!("missing {tag}")))
        .collect();

        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(text.contains("<pubDate>2020-03-04 05:06:07</pubDate>"));
        assert!(text.contains("<ispublished>false</ispublished>"));
        assert!(text.contains(r#"<comment id="c2" isAdmin="true">"#));
        assert!(text.contains("Hello &lt;World&gt; &amp; friends"));
    }

    #[test]
    fn legacy_document_gets_defaults() {
        let legacy = "<post>\
            <title>Old</title>\
            <slug>Old-Post</slug>\
            <author>ada</author>\
            <pubDate>2012-11-10 09:08:07</pubDate>\
            <content>text</content>\
            </post>";
        let post = decode(legacy, "old").expect("decode");

        assert!(post.is_published);
        assert!(post.categories.is_empty());
        assert!(post.comments.is_empty());
        assert_eq!(post.slug, "old-post");
        assert_eq!(post.pub_date, datetime!(2012-11-10 09:08:07 UTC));
    }

    #[test]
    fn missing_text_fields_read_as_empty() {
        let post = decode("<post><pubDate>2012-11-10</pubDate></post>", "bare").expect("decode");
        assert_eq!(post.title, "");
        assert_eq!(post.author, "");
        assert_eq!(post.content, "");
        assert_eq!(post.slug, "");
        assert_eq!(post.pub_date, datetime!(2012-11-10 00:00:00 UTC));
    }

    #[test]
    fn identifier_comes_from_fallback_not_content() {
        let text = "<post><id>ignored</id><pubDate>2020-01-01 00:00:00</pubDate></post>";
        assert_eq!(decode(text, "p1").expect("decode").id, "p1");
        assert_eq!(decode(text, "p1.xml").expect("decode").id, "p1");
        assert_eq!(decode(text, "/posts/p1.xml").expect("decode").id, "p1");
        assert_eq!(decode(text, "v1.2").expect("decode").id, "v1.2");
    }

    #[test]
    fn unparsable_pub_date_fails_the_document() {
        let error = decode("<post><pubDate>yesterday</pubDate></post>", "bad").expect_err("fails");
        assert!(matches!(
            error,
            DocumentError::InvalidTimestamp {
                field: "pubDate",
                ..
            }
        ));

        let error = decode("<post><title>x</title></post>", "bad").expect_err("fails");
        assert!(matches!(error, DocumentError::InvalidTimestamp { .. }));
    }

    #[test]
    fn comment_defaults_apply() {
        let text = "<post>\
            <pubDate>2020-01-01 00:00:00</pubDate>\
            <comments>\
              <comment><author>x</author></comment>\
              <comment id=\"c2\"><date>not a date</date></comment>\
              <comment id=\"c3\" isAdmin=\"True\"><date>2021-2-3 4:5:06</date></comment>\
            </comments>\
            </post>";
        let post = decode(text, "p").expect("decode");

        assert_eq!(post.comments.len(), 3);
        assert_eq!(post.comments[0].id, "");
        assert!(!post.comments[0].is_admin);
        assert_eq!(post.comments[0].pub_date, COMMENT_DATE_SENTINEL);
        assert_eq!(post.comments[1].pub_date, COMMENT_DATE_SENTINEL);
        assert!(post.comments[2].is_admin);
        assert_eq!(post.comments[2].pub_date, datetime!(2021-02-03 04:05:06 UTC));
    }

    #[test]
    fn invalid_flags_fail_the_document() {
        let text = "<post><pubDate>2020-01-01 00:00:00</pubDate><ispublished>maybe</ispublished></post>";
        let error = decode(text, "p").expect_err("fails");
        assert!(matches!(
            error,
            DocumentError::InvalidFlag {
                field: "ispublished",
                ..
            }
        ));
    }

    #[test]
    fn accepts_rfc3339_and_t_separated_timestamps() {
        let text = "<post>\
            <pubDate>2020-01-01T10:00:00+02:00</pubDate>\
            <lastModified>2020-01-02T03:04:05.250</lastModified>\
            </post>";
        let post = decode(text, "p").expect("decode");
        assert_eq!(post.pub_date, datetime!(2020-01-01 08:00:00 UTC));
        assert_eq!(post.last_modified, datetime!(2020-01-02 03:04:05.250 UTC));
    }

    #[test]
    fn document_key_requires_extension() {
        assert_eq!(document_key("p1.xml"), Some("p1"));
        assert_eq!(document_key("p1.xml.bak"), None);
        assert_eq!(document_key("notes.txt"), None);
        assert_eq!(document_key(".xml"), None);
        assert_eq!(document_key("pxml"), None);
        assert_eq!(document_name("p1"), "p1.xml");
    }
}
