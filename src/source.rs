use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{ExtractError, ExtractResult};

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Plain text of a document, one entry per page (0-based).
pub trait PageTextSource: Sync {
    fn page_count(&self) -> usize;
    fn page_text(&self, index: usize) -> ExtractResult<String>;
}

impl<S: AsRef<str> + Sync> PageTextSource for [S] {
    fn page_count(&self) -> usize {
        self.len()
    }

    fn page_text(&self, index: usize) -> ExtractResult<String> {
        self.get(index)
            .map(|s| s.as_ref().to_string())
            .ok_or_else(|| ExtractError::PageUnavailable {
                index,
                reason: format!("only {} pages loaded", self.len()),
            })
    }
}

impl<S: AsRef<str> + Sync> PageTextSource for Vec<S> {
    fn page_count(&self) -> usize {
        self.as_slice().page_count()
    }

    fn page_text(&self, index: usize) -> ExtractResult<String> {
        self.as_slice().page_text(index)
    }
}

/// A directory of OCR output, one `.txt` file per page.
///
/// Pages are ordered by the numeric groups in their file names, so
/// `page-2.txt` sorts before `page-10.txt`.
#[derive(Debug, Clone)]
pub struct TextDir {
    files: Vec<PathBuf>,
}

impl TextDir {
    pub fn open(dir: &Path) -> ExtractResult<Self> {
        let entries = fs::read_dir(dir).map_err(|source| ExtractError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| ExtractError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?
                .path();
            let is_txt = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
            if path.is_file() && is_txt {
                files.push(path);
            }
        }

        files.sort_by_cached_key(|p| {
            let name = p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            (numeric_key(&name), name)
        });
        debug!(dir = %dir.display(), pages = files.len(), "page directory opened");
        Ok(TextDir { files })
    }

    pub fn path_of(&self, index: usize) -> Option<&Path> {
        self.files.get(index).map(PathBuf::as_path)
    }
}

impl PageTextSource for TextDir {
    fn page_count(&self) -> usize {
        self.files.len()
    }

    fn page_text(&self, index: usize) -> ExtractResult<String> {
        let path = self
            .files
            .get(index)
            .ok_or_else(|| ExtractError::PageUnavailable {
                index,
                reason: format!("directory holds {} pages", self.files.len()),
            })?;
        fs::read_to_string(path).map_err(|source| ExtractError::Io {
            path: path.clone(),
            source,
        })
    }
}

fn numeric_key(name: &str) -> Vec<u64> {
    DIGITS_RE
        .find_iter(name)
        .filter_map(|m| m.as_str().parse::<u64>().ok())
        .collect()
}
