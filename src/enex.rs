// ABOUTME: Converts checkpointed entries into a single ENEX (Evernote export) document
// ABOUTME: Swaps <img> tags for hash-addressed en-media markers and inlines the bytes

use crate::{storage::write_atomic, util::parse_timestamp, Entry, Result};
use base64::prelude::*;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use regex::{NoExpand, Regex};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const APPLICATION: &str = "Penzu Export";

/// An embedded binary attached to a note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Base64 payload
    pub data: String,
    pub mime: String,
    pub filename: String,
    /// Hex MD5 of the raw bytes
    pub hash: String,
}

pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "image/jpeg",
    }
}

/// `YYYYMMDDTHHmmssZ`
pub fn format_enex_date(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\n', "<br/>")
}

fn cdata(s: &str) -> String {
    format!("<![CDATA[{}]]>", s.replace("]]>", "]]]]><![CDATA[>"))
}

pub struct Transcoder {
    export_dir: PathBuf,
}

impl Transcoder {
    /// `export_dir` is the directory image paths in the checkpoint are relative to.
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        Transcoder {
            export_dir: export_dir.into(),
        }
    }

    /// Note body with images swapped for en-media markers, plus the resources.
    pub fn rewrite_content(&self, entry: &Entry) -> (String, Vec<Resource>) {
        let mut content = if !entry.richtext_body.is_empty() {
            entry.richtext_body.clone()
        } else if !entry.plaintext.is_empty() {
            escape_html(&entry.plaintext)
        } else {
            escape_html(&entry.content)
        };
        let mut resources = Vec::new();

        for image in &entry.images {
            let path = self.export_dir.join(&image.path);
            if !path.exists() {
                debug!(path = %path.display(), "image file missing, leaving markup");
                continue;
            }
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Could not embed image {}: {}", image.filename, e);
                    continue;
                }
            };

            let hash = hex::encode(Md5::digest(&bytes));
            let ext = Path::new(&image.filename)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default();
            let mime = mime_for_extension(ext);

            let pattern = format!(r#"(?i)<img[^>]*src="{}"[^>]*>"#, regex::escape(&image.url));
            match Regex::new(&pattern) {
                Ok(re) => {
                    let marker = format!(r#"<en-media type="{}" hash="{}"/>"#, mime, hash);
                    content = re.replace_all(&content, NoExpand(&marker)).into_owned();
                }
                Err(e) => warn!("Could not match image {}: {}", image.url, e),
            }

            // Hash is the resource identity; one copy per note
            if resources.iter().any(|r: &Resource| r.hash == hash) {
                continue;
            }
            resources.push(Resource {
                data: BASE64_STANDARD.encode(&bytes),
                mime: mime.to_string(),
                filename: image.filename.clone(),
                hash,
            });
        }

        (content, resources)
    }

    fn render_note(&self, entry: &Entry) -> String {
        let (content, resources) = self.rewrite_content(entry);
        let note_content = cdata(&format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <!DOCTYPE en-note SYSTEM \"http://xml.evernote.com/pub/enml2.dtd\">\n\
             <en-note>{}</en-note>",
            content
        ));

        let created = entry.created_at.as_deref().and_then(parse_timestamp);
        let updated = entry
            .updated_at
            .as_deref()
            .and_then(parse_timestamp)
            .or(created);
        if created.is_none() {
            warn!(entry_id = %entry.id, "entry has no usable creation date");
        }

        let mut note = format!(
            "\n  <note>\n    <title>{}</title>\n    <content>{}</content>",
            escape_xml(&entry.title),
            note_content
        );
        if let Some(created) = created {
            note.push_str(&format!("\n    <created>{}</created>", format_enex_date(&created)));
        }
        if let Some(updated) = updated {
            note.push_str(&format!("\n    <updated>{}</updated>", format_enex_date(&updated)));
        }
        note.push_str(&format!(
            "\n    <note-attributes>\n      <author>{}</author>\n    </note-attributes>",
            APPLICATION
        ));

        for resource in &resources {
            note.push_str(&format!(
                "\n    <resource>\
                 \n      <data encoding=\"base64\">{}</data>\
                 \n      <mime>{}</mime>\
                 \n      <resource-attributes>\
                 \n        <file-name>{}</file-name>\
                 \n      </resource-attributes>\
                 \n    </resource>",
                resource.data,
                resource.mime,
                escape_xml(&resource.filename)
            ));
        }

        note.push_str("\n  </note>\n");
        note
    }

    /// Whole ENEX document, notes in input order.
    pub fn render(&self, entries: &[Entry], export_date: &DateTime<Utc>) -> String {
        let mut doc = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <!DOCTYPE en-export SYSTEM \"http://xml.evernote.com/pub/evernote-export3.dtd\">\n\
             <en-export export-date=\"{}\" application=\"{}\" version=\"1.0\">\n",
            format_enex_date(export_date),
            APPLICATION
        );
        for entry in entries {
            doc.push_str(&self.render_note(entry));
        }
        doc.push_str("</en-export>\n");
        doc
    }

    pub fn write(&self, path: &Path, entries: &[Entry], export_date: &DateTime<Utc>) -> Result<()> {
        write_atomic(path, self.render(entries, export_date).as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for_extension("png"), "image/png");
        assert_eq!(mime_for_extension("JPG"), "image/jpeg");
        assert_eq!(mime_for_extension("jpeg"), "image/jpeg");
        assert_eq!(mime_for_extension("svg"), "image/svg+xml");
        assert_eq!(mime_for_extension("webp"), "image/webp");
        assert_eq!(mime_for_extension("heic"), "image/jpeg");
        assert_eq!(mime_for_extension(""), "image/jpeg");
    }

    #[test]
    fn test_format_enex_date() {
        let dt: DateTime<Utc> = "2024-03-01T08:05:09.250Z".parse().unwrap();
        assert_eq!(format_enex_date(&dt), "20240301T080509Z");
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(
            escape_xml(r#"Tom & "Jerry" <'cat'>"#),
            "Tom &amp; &quot;Jerry&quot; &lt;&apos;cat&apos;&gt;"
        );
    }

    #[test]
    fn test_escape_html_newlines() {
        assert_eq!(escape_html("a < b\nc & d"), "a &lt; b<br/>c &amp; d");
    }

    #[test]
    fn test_cdata_splits_terminator() {
        assert_eq!(cdata("x]]>y"), "<![CDATA[x]]]]><![CDATA[>y]]>");
    }
}
