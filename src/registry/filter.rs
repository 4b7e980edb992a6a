use std::path::Path;

/// Extensions picked up by directory discovery when none are configured
pub const DEFAULT_EXTENSIONS: &[&str] = &["log", "txt"];

/// Decides which files inside a watched directory get a session.
///
/// Matching is by extension, case-insensitive. An empty list accepts every
/// file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFilter {
    extensions: Vec<String>,
}

impl FileFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self { extensions }
    }

    /// Accept every file
    pub fn any() -> Self {
        Self {
            extensions: Vec::new(),
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            })
            .unwrap_or(false)
    }
}

impl Default for FileFilter {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS)
    }
}
