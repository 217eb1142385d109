//! Feed document parsing into the pipeline's own entry model.

use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, MediaObject};
use feed_rs::parser;
use tracing::warn;

use crate::errors::ParseError;
use crate::models::feed::PartialFeed;
use crate::models::feed_entry::CATEGORY_DELIMITER;

/// Maximum snippet length in characters.
pub const MAX_SNIPPET_LENGTH: usize = 500;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub copyright: Option<String>,
    pub entries: Vec<ParsedEntry>,
}

impl ParsedFeed {
    /// Non-empty feed metadata as a changeset.
    pub fn metadata(&self) -> PartialFeed {
        let keep = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());
        PartialFeed {
            name: keep(&self.title),
            description: keep(&self.description),
            link: keep(&self.link),
            language: keep(&self.language),
            copyright: keep(&self.copyright),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedEntry {
    pub guid: String,
    pub title: String,
    pub link: Option<String>,
    pub author: Option<String>,
    pub content: Option<String>,
    pub snippet: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub categories: Vec<String>,
    pub media: Vec<ParsedMedia>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedMedia {
    pub href: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub credit: Option<String>,
    /// "image", "video", "audio"... taken from the MIME top-level type
    pub medium: Option<String>,
    pub height: Option<i32>,
    pub width: Option<i32>,
}

/// Parse an RSS, Atom or JSON Feed document from its raw bytes.
pub fn parse_feed(body: impl AsRef<[u8]>) -> Result<ParsedFeed, ParseError> {
    // No synthetic ids: an entry without an id falls back to its link below.
    let feed = parser::Builder::new()
        .id_generator(|_, _, _| String::new())
        .build()
        .parse(body.as_ref())?;

    let entries = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let parsed = parse_entry(entry);
            if parsed.is_none() {
                warn!("Dropping feed entry without guid or link");
            }
            parsed
        })
        .collect();

    Ok(ParsedFeed {
        title: feed.title.map(|t| t.content.trim().to_string()),
        link: feed.links.first().map(|l| l.href.clone()),
        description: feed.description.map(|d| strip_html(&d.content)),
        language: feed.language,
        copyright: feed.rights.map(|r| r.content),
        entries,
    })
}

fn parse_entry(entry: Entry) -> Option<ParsedEntry> {
    let link = entry.links.first().map(|l| l.href.clone());
    let guid = Some(entry.id.trim().to_string())
        .filter(|id| !id.is_empty())
        .or_else(|| link.clone())?;

    let summary = entry.summary.map(|s| s.content);
    let body = entry.content.and_then(|c| c.body);
    let snippet = summary
        .as_deref()
        .or(body.as_deref())
        .map(|s| truncate(&strip_html(s), MAX_SNIPPET_LENGTH))
        .filter(|s| !s.is_empty());
    let content = body.or(summary);

    let title = entry
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| snippet.clone())
        .unwrap_or_else(|| "Untitled".to_string());

    let categories = filter_categories(entry.categories.into_iter().map(|c| c.term));
    let media = entry.media.iter().flat_map(parse_media).collect();

    Some(ParsedEntry {
        guid,
        title,
        link,
        author: entry.authors.first().map(|a| a.name.clone()),
        content,
        snippet,
        published: entry.published.or(entry.updated),
        categories,
        media,
    })
}

/// Trim category terms, dropping empty ones and ones containing the storage delimiter.
pub fn filter_categories<I, S>(terms: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    terms
        .into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty() && !t.contains(CATEGORY_DELIMITER))
        .collect()
}

fn parse_media(object: &MediaObject) -> Vec<ParsedMedia> {
    let title = object.title.as_ref().map(|t| t.content.clone());
    let description = object.description.as_ref().map(|d| d.content.clone());
    let credit = object.credits.first().map(|c| c.entity.clone());

    let media: Vec<ParsedMedia> = object
        .content
        .iter()
        .filter_map(|content| {
            let href = content.url.as_ref()?.to_string();
            Some(ParsedMedia {
                href,
                title: title.clone(),
                description: description.clone(),
                credit: credit.clone(),
                medium: content
                    .content_type
                    .as_ref()
                    .map(|mime| mime.type_().as_str().to_string()),
                height: content.height.and_then(dimension),
                width: content.width.and_then(dimension),
            })
        })
        .collect();

    if !media.is_empty() {
        return media;
    }

    object
        .thumbnails
        .first()
        .filter(|thumb| !thumb.image.uri.is_empty())
        .map(|thumb| ParsedMedia {
            href: thumb.image.uri.clone(),
            title,
            description,
            credit,
            medium: Some("image".to_string()),
            height: thumb.image.height.and_then(dimension),
            width: thumb.image.width.and_then(dimension),
        })
        .into_iter()
        .collect()
}

fn dimension(value: u32) -> Option<i32> {
    i32::try_from(value).ok()
}

/// Strip tags, decode entities and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }

    let decoded = html_escape::decode_html_entities(&text);
    decoded.split_whitespace().collect::<Vec<&str>>().join(" ")
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>Example Feed</title>
    <link>https://example.com/</link>
    <description>An &lt;b&gt;example&lt;/b&gt; feed</description>
    <language>en-us</language>
    <copyright>Copyright 2024 Example</copyright>
    <item>
      <guid>item-1</guid>
      <title>First post</title>
      <link>https://example.com/1</link>
      <author>alice@example.com (Alice)</author>
      <description>&lt;p&gt;Hello &amp;amp; welcome&lt;/p&gt;</description>
      <pubDate>Tue, 05 Mar 2024 07:08:09 GMT</pubDate>
      <category>Tech</category>
      <category>A|B</category>
      <category></category>
      <category> News </category>
      <media:content url="https://example.com/1.jpg" type="image/jpeg" width="640" height="480"/>
    </item>
    <item>
      <title>No guid</title>
      <link>https://example.com/2</link>
    </item>
    <item>
      <title>Neither guid nor link</title>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_feed_metadata() {
        let feed = parse_feed(RSS).unwrap();
        assert_eq!(feed.title.as_deref(), Some("Example Feed"));
        assert_eq!(feed.link.as_deref(), Some("https://example.com/"));
        assert_eq!(feed.description.as_deref(), Some("An example feed"));
        assert_eq!(feed.language.as_deref(), Some("en-us"));
        assert_eq!(feed.copyright.as_deref(), Some("Copyright 2024 Example"));

        let meta = feed.metadata();
        assert_eq!(meta.name.as_deref(), Some("Example Feed"));
    }

    #[test]
    fn test_parse_entry_fields() {
        let feed = parse_feed(RSS).unwrap();
        let entry = &feed.entries[0];
        assert_eq!(entry.guid, "item-1");
        assert_eq!(entry.title, "First post");
        assert_eq!(entry.link.as_deref(), Some("https://example.com/1"));
        assert_eq!(entry.snippet.as_deref(), Some("Hello & welcome"));
        assert_eq!(
            entry.published.map(|p| p.timestamp()),
            Some(1_709_622_489)
        );
        assert_eq!(entry.categories, vec!["Tech", "News"]);
    }

    #[test]
    fn test_guid_falls_back_to_link() {
        let feed = parse_feed(RSS).unwrap();
        assert_eq!(feed.entries.len(), 2);
        assert_eq!(feed.entries[1].guid, "https://example.com/2");
    }

    #[test]
    fn test_media_dimensions() {
        let feed = parse_feed(RSS).unwrap();
        let media = &feed.entries[0].media;
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].href, "https://example.com/1.jpg");
        assert_eq!(media[0].medium.as_deref(), Some("image"));
        assert_eq!(media[0].width, Some(640));
        assert_eq!(media[0].height, Some(480));
    }

    #[test]
    fn test_parse_atom() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Example</title>
  <id>urn:uuid:60a76c80-d399-11d9-b93C-0003939e0af6</id>
  <updated>2024-03-05T07:08:09Z</updated>
  <entry>
    <title>Atom entry</title>
    <id>urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a</id>
    <link href="https://example.com/atom/1"/>
    <updated>2024-03-05T07:08:09Z</updated>
    <content type="html">&lt;p&gt;Body text&lt;/p&gt;</content>
  </entry>
</feed>"#;
        let feed = parse_feed(atom).unwrap();
        assert_eq!(feed.entries.len(), 1);
        let entry = &feed.entries[0];
        assert_eq!(entry.guid, "urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a");
        assert_eq!(entry.snippet.as_deref(), Some("Body text"));
        assert!(entry.content.as_deref().unwrap_or_default().contains("Body text"));
        assert_eq!(entry.published.map(|p| p.timestamp()), Some(1_709_622_489));
    }

    #[test]
    fn test_encoding_from_xml_prolog() {
        let mut body = br#"<?xml version="1.0" encoding="ISO-8859-1"?>
<rss version="2.0"><channel><title>Caf"#
            .to_vec();
        body.push(0xE9);
        body.extend_from_slice(
            br#"</title><link>https://example.com/</link><description>x</description>
<item><guid>latin-1</guid><title>Cr"#,
        );
        body.push(0xE8);
        body.extend_from_slice(b"me</title></item></channel></rss>");

        let feed = parse_feed(&body).unwrap();
        assert_eq!(feed.title.as_deref(), Some("Café"));
        assert_eq!(feed.entries[0].title, "Crème");
    }

    #[test]
    fn test_malformed_body() {
        assert!(parse_feed("this is not a feed").is_err());
    }

    #[test]
    fn test_filter_categories() {
        let filtered = filter_categories(["Tech", "A|B", "", " News "]);
        assert_eq!(filtered, vec!["Tech".to_string(), "News".to_string()]);
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(
            strip_html("<p>One&nbsp;<b>two</b></p>\n\n<p>three &lt;4&gt;</p>"),
            "One two three <4>"
        );
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        let text = "é".repeat(600);
        assert_eq!(truncate(&text, MAX_SNIPPET_LENGTH).chars().count(), 500);
        assert_eq!(truncate("short", MAX_SNIPPET_LENGTH), "short");
    }
}
