//! Reading script and navigation
//!
//! A script is a UTF-8 text file with one prompt per line:
//!
//! ```text
//! # id    prompt             [pronunciation]
//! A01     こんにちは
//! A02,    さようなら,         ありがとう
//! ```
//!
//! Fields are separated by any run of spaces, tabs or commas. Blank lines
//! and lines starting with `#` are skipped. The id names the recording file
//! (`A01` → `A01.wav`), so it may not contain `/`, `\` or `..`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, StudioError};

/// Label and content of the script loaded when no file is given.
pub const DEFAULT_SCRIPT_LABEL: &str = "A";
pub const DEFAULT_SCRIPT: &str = "A01 あらゆる現実をすべて自分の方へねじ曲げたのだ。";

const COMMENT_MARKER: char = '#';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptEntry {
    /// 1-based position in the file, counting only entries.
    pub sequence: usize,
    pub id: String,
    pub prompt: String,
    pub pronunciation: Option<String>,
}

impl ScriptEntry {
    /// Name of the recording for this entry.
    pub fn file_name(&self) -> String {
        format!("{}.wav", self.id)
    }
}

fn is_separator(c: char) -> bool {
    c == ',' || c.is_whitespace()
}

/// An id becomes a file name inside the recording directory, so it must not
/// name anything outside it.
fn is_valid_id(id: &str) -> bool {
    !id.contains(['/', '\\']) && !id.contains("..")
}

/// Parse script text. `source` only names the script in errors.
pub fn parse_script(source: &Path, text: &str) -> Result<Vec<ScriptEntry>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut entries = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(COMMENT_MARKER) {
            continue;
        }

        let mut fields = line.split(is_separator).filter(|f| !f.is_empty());
        let (Some(id), Some(prompt)) = (fields.next(), fields.next()) else {
            return Err(StudioError::MalformedScriptRow {
                line: idx + 1,
                content: line.to_string(),
            });
        };
        if !is_valid_id(id) {
            return Err(StudioError::MalformedScriptRow {
                line: idx + 1,
                content: line.to_string(),
            });
        }
        let pronunciation = fields.next().map(str::to_string);
        if fields.next().is_some() {
            log::debug!("{:?} line {}: extra fields ignored", source, idx + 1);
        }

        entries.push(ScriptEntry {
            sequence: entries.len() + 1,
            id: id.to_string(),
            prompt: prompt.to_string(),
            pronunciation,
        });
    }

    if entries.is_empty() {
        return Err(StudioError::EmptyScript(source.to_path_buf()));
    }
    Ok(entries)
}

/// Cursor over the loaded script.
#[derive(Debug, Default)]
pub struct ScriptNavigator {
    entries: Vec<ScriptEntry>,
    /// 1-based; 0 only while nothing is loaded.
    current: usize,
    label: String,
    source: Option<PathBuf>,
}

impl ScriptNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Navigator holding the built-in one-line script.
    pub fn with_default() -> Result<Self> {
        let mut nav = Self::new();
        nav.load_default()?;
        Ok(nav)
    }

    /// Load a script file. On error the previously loaded script stays as is.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StudioError::FileNotFound(path.to_path_buf()),
            _ => StudioError::fs(path, e),
        })?;
        let entries = parse_script(path, &text)?;

        log::info!("Loaded script {:?}: {} entries", path, entries.len());
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.replace(entries, label, Some(path.to_path_buf()));
        Ok(())
    }

    pub fn load_default(&mut self) -> Result<()> {
        let entries = parse_script(Path::new(DEFAULT_SCRIPT_LABEL), DEFAULT_SCRIPT)?;
        self.replace(entries, DEFAULT_SCRIPT_LABEL.into(), None);
        Ok(())
    }

    fn replace(&mut self, entries: Vec<ScriptEntry>, label: String, source: Option<PathBuf>) {
        self.entries = entries;
        self.current = 1;
        self.label = label;
        self.source = source;
    }

    pub fn current(&self) -> Option<&ScriptEntry> {
        self.current
            .checked_sub(1)
            .and_then(|idx| self.entries.get(idx))
    }

    /// Move forward one entry. No-op at the last entry; returns whether the
    /// index moved.
    pub fn next(&mut self) -> bool {
        if self.has_next() {
            self.current += 1;
            true
        } else {
            false
        }
    }

    /// Move back one entry. No-op at the first entry.
    pub fn prev(&mut self) -> bool {
        if self.has_prev() {
            self.current -= 1;
            true
        } else {
            false
        }
    }

    pub fn has_prev(&self) -> bool {
        self.current > 1
    }

    pub fn has_next(&self) -> bool {
        self.current < self.entries.len()
    }

    /// `(current_index, count)`, e.g. for a "2 / 10" label.
    pub fn position(&self) -> (usize, usize) {
        (self.current, self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn entries(&self) -> &[ScriptEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_script(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_parse_fields_and_separators() {
        let text = "# corpus\n\nA01 こんにちは\nA02,\tさようなら , ありがとう\n";
        let entries = parse_script(Path::new("s.txt"), text).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0],
            ScriptEntry {
                sequence: 1,
                id: "A01".into(),
                prompt: "こんにちは".into(),
                pronunciation: None,
            }
        );
        assert_eq!(entries[1].sequence, 2);
        assert_eq!(entries[1].prompt, "さようなら");
        assert_eq!(entries[1].pronunciation.as_deref(), Some("ありがとう"));
        assert_eq!(entries[1].file_name(), "A02.wav");
    }

    #[test]
    fn test_parse_strips_bom_and_crlf() {
        let entries = parse_script(Path::new("s.txt"), "\u{feff}B01 one\r\nB02 two\r\n").unwrap();
        assert_eq!(entries[0].id, "B01");
        assert_eq!(entries[1].prompt, "two");
    }

    #[test]
    fn test_parse_rejects_short_row() {
        let err = parse_script(Path::new("s.txt"), "A01 ok\n# note\nA03\n").unwrap_err();
        match err {
            StudioError::MalformedScriptRow { line, content } => {
                assert_eq!(line, 3);
                assert_eq!(content, "A03");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_only_comments_is_empty() {
        let err = parse_script(Path::new("empty.txt"), "# a\n\n   \n#b\n").unwrap_err();
        assert!(matches!(err, StudioError::EmptyScript(p) if p == Path::new("empty.txt")));
    }

    #[test]
    fn test_navigation_clamps_at_both_ends() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(
            dir.path(),
            "script.txt",
            "A01 こんにちは\nA02 さようなら ありがとう\n",
        );
        let mut nav = ScriptNavigator::new();
        nav.load(&path).unwrap();

        assert_eq!(nav.position(), (1, 2));
        assert!(!nav.has_prev());
        assert!(nav.has_next());
        assert!(!nav.prev());
        assert_eq!(nav.position(), (1, 2));

        assert!(nav.next());
        let entry = nav.current().unwrap();
        assert_eq!(entry.id, "A02");
        assert_eq!(entry.pronunciation.as_deref(), Some("ありがとう"));
        assert!(nav.has_prev());
        assert!(!nav.has_next());

        assert!(!nav.next());
        assert_eq!(nav.position(), (2, 2));
        assert_eq!(nav.label(), "script.txt");
    }

    #[test]
    fn test_reload_resets_index() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_script(dir.path(), "a.txt", "A01 x\nA02 y\nA03 z\n");
        let second = write_script(dir.path(), "b.txt", "B01 p\nB02 q\n");

        let mut nav = ScriptNavigator::new();
        nav.load(&first).unwrap();
        nav.next();
        nav.next();
        assert_eq!(nav.position(), (3, 3));

        nav.load(&second).unwrap();
        assert_eq!(nav.position(), (1, 2));
        assert_eq!(nav.current().unwrap().id, "B01");
        assert_eq!(nav.source(), Some(second.as_path()));
    }

    #[test]
    fn test_failed_load_keeps_previous_script() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_script(dir.path(), "good.txt", "A01 x\nA02 y\n");
        let empty = write_script(dir.path(), "empty.txt", "# nothing\n");
        let bad = write_script(dir.path(), "bad.txt", "A01\n");

        let mut nav = ScriptNavigator::new();
        nav.load(&good).unwrap();
        nav.next();

        assert!(matches!(nav.load(&empty), Err(StudioError::EmptyScript(_))));
        assert!(matches!(
            nav.load(&bad),
            Err(StudioError::MalformedScriptRow { .. })
        ));
        assert!(matches!(
            nav.load(&dir.path().join("missing.txt")),
            Err(StudioError::FileNotFound(_))
        ));

        assert_eq!(nav.position(), (2, 2));
        assert_eq!(nav.current().unwrap().id, "A02");
        assert_eq!(nav.label(), "good.txt");
    }

    #[test]
    fn test_default_script() {
        let nav = ScriptNavigator::with_default().unwrap();
        assert_eq!(nav.label(), DEFAULT_SCRIPT_LABEL);
        assert_eq!(nav.position(), (1, 1));
        assert!(!nav.has_next());
        assert!(!nav.has_prev());
        assert!(nav.source().is_none());

        let entry = nav.current().unwrap();
        assert_eq!(entry.file_name(), "A01.wav");
        assert_eq!(entry.prompt, "あらゆる現実をすべて自分の方へねじ曲げたのだ。");
    }

    #[test]
    fn test_load_default_replaces_loaded_script() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "s.txt", "B01 x\nB02 y\n");
        let mut nav = ScriptNavigator::new();
        nav.load(&path).unwrap();
        nav.next();

        nav.load_default().unwrap();
        assert_eq!(nav.position(), (1, 1));
        assert_eq!(nav.label(), DEFAULT_SCRIPT_LABEL);
    }

    #[test]
    fn test_parse_rejects_ids_outside_recording_dir() {
        for (text, bad_line) in [
            ("A01 ok\n../x escape\n", 2),
            ("sub/A01 nested\n", 1),
            ("A01 ok\nA02 ok\nC:\\A03 drive\n", 3),
            ("..\tparent\n", 1),
        ] {
            match parse_script(Path::new("s.txt"), text) {
                Err(StudioError::MalformedScriptRow { line, .. }) => {
                    assert_eq!(line, bad_line, "script {:?}", text)
                }
                other => panic!("expected MalformedScriptRow for {:?}, got {:?}", text, other),
            }
        }

        // Dots inside an id are fine.
        let entries = parse_script(Path::new("s.txt"), "A.01 dotted\n").unwrap();
        assert_eq!(entries[0].file_name(), "A.01.wav");
    }

    #[test]
    fn test_empty_navigator() {
        let mut nav = ScriptNavigator::new();
        assert!(nav.current().is_none());
        assert!(!nav.next());
        assert!(!nav.prev());
        assert_eq!(nav.position(), (0, 0));
    }
}
