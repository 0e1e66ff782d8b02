// ABOUTME: Output layout and atomic writes for checkpoints and entry files
// ABOUTME: Handles paths, permissions, checkpoint JSON, and per-entry text

use crate::{util::sanitize_title, Entry, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct Paths {
    pub export_dir: PathBuf,
    pub images_dir: PathBuf,
    pub checkpoint_path: PathBuf,
    pub enex_path: PathBuf,
}

impl Paths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let export_dir = root.join("exported-entries");

        Paths {
            images_dir: export_dir.join("images"),
            checkpoint_path: root.join("penzu-entries.json"),
            enex_path: root.join("penzu-entries.enex"),
            export_dir,
        }
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in &[&self.export_dir, &self.images_dir] {
            fs::create_dir_all(dir)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = fs::Permissions::from_mode(0o700);
                fs::set_permissions(dir, perms)?;
            }
        }
        Ok(())
    }
}

/// Write via a temp file in the target's directory, then rename over the target.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    use rand::Rng;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let random: u32 = rand::thread_rng().gen();
    let tmp_path = parent.join(format!(".{:x}.part", random));

    fs::write(&tmp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(&tmp_path, perms)?;
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Overwrite the checkpoint with the full entry list.
pub fn save_checkpoint(path: &Path, entries: &[Entry]) -> Result<()> {
    let json = serde_json::to_string_pretty(entries)?;
    write_atomic(path, json.as_bytes())?;
    debug!(path = %path.display(), entries = entries.len(), "checkpoint written");
    Ok(())
}

pub fn load_checkpoint(path: &Path) -> Result<Vec<Entry>> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// `<seq:04>_<YYYY-MM-DD>_<title>.txt`
pub fn entry_text_filename(sequence: usize, entry: &Entry) -> String {
    let date = entry
        .created_at
        .as_deref()
        .and_then(|c| c.get(..10))
        .unwrap_or("unknown");
    format!("{:04}_{}_{}.txt", sequence, date, sanitize_title(&entry.title))
}

pub fn render_entry_text(entry: &Entry) -> String {
    let mut text = format!(
        "Title: {}\nDate: {}\n",
        entry.title,
        entry.created_at.as_deref().unwrap_or("unknown")
    );

    if !entry.images.is_empty() {
        text.push_str("\nImages:\n");
        for image in &entry.images {
            text.push_str(&format!("  - {}\n", image.path));
        }
    }

    text.push('\n');
    text.push_str(&entry.content);
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_layout() {
        let temp = TempDir::new().unwrap();
        let paths = Paths::new(temp.path());
        assert_eq!(paths.export_dir, temp.path().join("exported-entries"));
        assert_eq!(
            paths.images_dir,
            temp.path().join("exported-entries").join("images")
        );
        assert_eq!(paths.checkpoint_path, temp.path().join("penzu-entries.json"));
        assert_eq!(paths.enex_path, temp.path().join("penzu-entries.enex"));
    }

    #[test]
    fn test_ensure_dirs_creates_structure() {
        let temp = TempDir::new().unwrap();
        let paths = Paths::new(temp.path());
        paths.ensure_dirs().unwrap();

        assert!(paths.export_dir.exists());
        assert!(paths.images_dir.exists());
    }

    #[test]
    #[cfg(unix)]
    fn test_ensure_dirs_sets_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let paths = Paths::new(temp.path());
        paths.ensure_dirs().unwrap();

        let perms = fs::metadata(&paths.images_dir).unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o700);
    }
}
