//! Merged change-log document: writing and reading it back.
//!
//! Layout (tag names are part of the published format):
//!
//! ```text
//! <multi-scm-log>
//! <sub-log scm="KEY">
//! <![CDATA[ESCAPED CHILD TEXT]]>
//! </sub-log>
//! </multi-scm-log>
//! ```
//!
//! Child text is untrusted, so it is fully XML-escaped before being wrapped
//! in CDATA. An escaped payload can never contain `]]>`.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::source::ChildKey;

pub const ROOT_TAG: &str = "multi-scm-log";
pub const SECTION_TAG: &str = "sub-log";
pub const KEY_ATTRIBUTE: &str = "scm";

const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";

/// Escape every markup-significant character.
pub fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Reverse [`escape_xml`]. Numeric character references are decoded too;
/// unknown entities are kept verbatim.
pub fn unescape_xml(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut rest = escaped;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').and_then(|semi| {
            let entity = &rest[1..semi];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => decode_numeric(entity),
            };
            c.map(|c| (c, semi + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_numeric(entity: &str) -> Option<char> {
    let digits = entity.strip_prefix('#')?;
    let code = match digits.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse().ok()?,
    };
    char::from_u32(code)
}

pub fn open_root() -> String {
    format!("<{ROOT_TAG}>\n")
}

pub fn close_root() -> String {
    format!("</{ROOT_TAG}>\n")
}

/// One child's section, escaped and tagged with its key.
pub fn render_section(key: &ChildKey, raw: &str) -> String {
    format!(
        "<{SECTION_TAG} {KEY_ATTRIBUTE}=\"{}\">\n{CDATA_OPEN}{}{CDATA_CLOSE}\n</{SECTION_TAG}>\n",
        escape_xml(key.as_str()),
        escape_xml(raw),
    )
}

/// Render a complete document in one go.
pub fn render_document<'a>(sections: impl IntoIterator<Item = (&'a ChildKey, &'a str)>) -> String {
    let mut doc = open_root();
    for (key, raw) in sections {
        doc.push_str(&render_section(key, raw));
    }
    doc.push_str(&close_root());
    doc
}

/// Streaming writer for the merged document.
///
/// The opening root tag is written on [`ChangelogWriter::start`], before any
/// child runs.
pub struct ChangelogWriter<W> {
    out: W,
    sections: usize,
}

impl<W: AsyncWrite + Unpin> ChangelogWriter<W> {
    pub async fn start(mut out: W) -> std::io::Result<Self> {
        out.write_all(open_root().as_bytes()).await?;
        Ok(Self { out, sections: 0 })
    }

    pub async fn write_section(&mut self, key: &ChildKey, raw: &str) -> std::io::Result<()> {
        self.out
            .write_all(render_section(key, raw).as_bytes())
            .await?;
        self.sections += 1;
        Ok(())
    }

    pub fn sections_written(&self) -> usize {
        self.sections
    }

    /// Close the root element and flush.
    pub async fn finish(mut self) -> std::io::Result<W> {
        self.out.write_all(close_root().as_bytes()).await?;
        self.out.flush().await?;
        Ok(self.out)
    }

    /// Flush what was written so far without closing the root element.
    pub async fn abandon(mut self) -> std::io::Result<W> {
        self.out.flush().await?;
        Ok(self.out)
    }
}

/// A child's change-log as read back from a merged document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogSection {
    pub key: ChildKey,
    pub text: String,
}

/// Result of reading a merged document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedChangelog {
    pub sections: Vec<ChangelogSection>,
    /// `false` when the closing root tag is missing, e.g. after a checkout
    /// failed part-way through.
    pub complete: bool,
}

impl ParsedChangelog {
    pub fn keys(&self) -> Vec<&ChildKey> {
        self.sections.iter().map(|s| &s.key).collect()
    }

    pub fn section(&self, key: &ChildKey) -> Option<&ChangelogSection> {
        self.sections.iter().find(|s| &s.key == key)
    }
}

/// Read a merged document back into its sections.
///
/// Truncated documents yield every complete section they hold.
pub fn parse(document: &str) -> ParsedChangelog {
    let section_open = format!("<{SECTION_TAG} {KEY_ATTRIBUTE}=\"");
    let section_close = format!("</{SECTION_TAG}>");
    let mut parsed = ParsedChangelog {
        sections: Vec::new(),
        complete: document.contains(&format!("</{ROOT_TAG}>")),
    };

    let mut rest = document;
    while let Some(start) = rest.find(&section_open) {
        rest = &rest[start + section_open.len()..];
        let Some((section, consumed)) = parse_section(rest, &section_close) else {
            warn!(event = "changelog.truncated_section", "dropping incomplete change-log section");
            break;
        };
        parsed.sections.push(section);
        rest = &rest[consumed..];
    }
    parsed
}

/// Parse from just after `scm="` to the end of the section's closing tag.
fn parse_section(rest: &str, section_close: &str) -> Option<(ChangelogSection, usize)> {
    let key_end = rest.find("\">")?;
    let key = unescape_xml(&rest[..key_end]);
    let body_start = key_end + 2;
    let body = &rest[body_start..];
    let close = body.find(section_close)?;
    let inner = &body[..close];

    let text = match (inner.find(CDATA_OPEN), inner.rfind(CDATA_CLOSE)) {
        (Some(open), Some(end)) if end >= open + CDATA_OPEN.len() => {
            unescape_xml(&inner[open + CDATA_OPEN.len()..end])
        }
        _ => unescape_xml(inner.trim()),
    };

    Some((
        ChangelogSection {
            key: ChildKey::new(key),
            text,
        },
        body_start + close + section_close.len(),
    ))
}
