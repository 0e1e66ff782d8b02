// ABOUTME: Walks the journal backwards entry by entry and persists everything
// ABOUTME: Downloads embedded images, writes text files and periodic checkpoints

use crate::{
    api::{sleep_ms, PenzuClient},
    storage::{entry_text_filename, render_entry_text, save_checkpoint, write_atomic, Paths},
    Entry, EntryPage, Error, ImageRef, Result,
};
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{info, warn};

fn img_src_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"(?i)<img[^>]+src="([^"]+)""#).expect("static pattern"))
}

/// Distinct `src` URLs of `<img>` tags, in order of first appearance.
pub fn extract_image_urls(html: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for caps in img_src_pattern().captures_iter(html) {
        let url = &caps[1];
        if !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }
    urls
}

/// Last path segment with any query string removed.
pub fn image_basename(url: &str) -> &str {
    let without_query = url.split('?').next().unwrap_or(url);
    match without_query.rsplit('/').next() {
        Some(name) if !name.is_empty() => name,
        _ => "image",
    }
}

/// Lazy, finite walk from an entry to the oldest one. Each step follows
/// only the most recent predecessor. Stops after the first error.
pub struct EntryWalker<'a> {
    client: &'a PenzuClient,
    journal_id: String,
    next_id: Option<String>,
}

impl<'a> EntryWalker<'a> {
    pub fn new(client: &'a PenzuClient, journal_id: impl Into<String>, start: impl Into<String>) -> Self {
        EntryWalker {
            client,
            journal_id: journal_id.into(),
            next_id: Some(start.into()),
        }
    }
}

impl Iterator for EntryWalker<'_> {
    type Item = Result<EntryPage>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry_id = self.next_id.take()?;
        match self.client.fetch_entry(&self.journal_id, &entry_id) {
            Ok(page) => {
                self.next_id = page.predecessor();
                Some(Ok(page))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

pub struct ExportSummary {
    pub entries: Vec<Entry>,
    /// Entry counts at which the checkpoint file was (re)written
    pub checkpoints: Vec<usize>,
}

pub struct Exporter<'a> {
    client: &'a PenzuClient,
    paths: &'a Paths,
}

impl<'a> Exporter<'a> {
    pub fn new(client: &'a PenzuClient, paths: &'a Paths) -> Self {
        Exporter { client, paths }
    }

    /// Entry open in the browser, else the journal's most recent entry.
    pub fn resolve_start(&self) -> Result<String> {
        let session = self.client.session();
        if let Some(id) = &session.entry_id {
            return Ok(id.clone());
        }

        info!("Fetching journal info to get latest entry...");
        match self.client.latest_entry_id(&session.journal_id)? {
            Some(id) => {
                info!(entry_id = %id, "Found latest entry");
                Ok(id)
            }
            None => Err(Error::Session(
                "Could not find latest entry ID. Open a journal entry in your browser.".into(),
            )),
        }
    }

    pub fn walk(&self, start: &str) -> EntryWalker<'a> {
        EntryWalker::new(self.client, &self.client.session().journal_id, start)
    }

    pub fn run(&self) -> Result<ExportSummary> {
        self.paths.ensure_dirs()?;
        let start = self.resolve_start()?;
        let checkpoint_every = self.client.config().checkpoint_every;

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner} {pos} entries {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        let mut entries: Vec<Entry> = Vec::new();
        let mut checkpoints = Vec::new();

        for page in self.walk(&start) {
            let page = page?;
            let sequence = entries.len() + 1;
            info!("[{}] Fetched entry {}", sequence, page.entry.id);

            let mut entry = Entry::from(&page.entry);
            entry.images = self.capture_images(sequence, &entry.id, &entry.richtext_body);

            let filename = entry_text_filename(sequence, &entry);
            write_atomic(
                &self.paths.export_dir.join(&filename),
                render_entry_text(&entry).as_bytes(),
            )?;
            info!("    Saved: {}", filename);

            pb.set_message(entry.title.clone());
            entries.push(entry);

            if checkpoint_every > 0 && sequence % checkpoint_every == 0 {
                save_checkpoint(&self.paths.checkpoint_path, &entries)?;
                checkpoints.push(sequence);
                info!("    Backup saved ({} entries)", sequence);
            }

            pb.inc(1);
            self.client.pace();
        }

        save_checkpoint(&self.paths.checkpoint_path, &entries)?;
        checkpoints.push(entries.len());
        pb.finish_with_message(format!("exported {} entries", entries.len()));
        info!(
            "Exported {} entries to {}",
            entries.len(),
            self.paths.checkpoint_path.display()
        );

        Ok(ExportSummary {
            entries,
            checkpoints,
        })
    }

    /// Download every image in `html`. Failures are logged and skipped.
    fn capture_images(&self, sequence: usize, entry_id: &str, html: &str) -> Vec<ImageRef> {
        let mut images = Vec::new();

        for (i, url) in extract_image_urls(html).into_iter().enumerate() {
            if i > 0 {
                sleep_ms(self.client.config().image_delay_ms);
            }

            let filename = format!("{:04}_{}_{}", sequence, entry_id, image_basename(&url));
            let saved = self.client.download(&url).and_then(|bytes| {
                write_atomic(&self.paths.images_dir.join(&filename), &bytes)
            });

            match saved {
                Ok(()) => {
                    info!("    Downloaded image: {}", filename);
                    images.push(ImageRef {
                        url,
                        path: format!("images/{}", filename),
                        filename,
                    });
                }
                Err(e) => warn!("    Failed to download image ({}): {}", e, url),
            }
        }

        images
    }
}
