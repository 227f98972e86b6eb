use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, ExtractResult};
use crate::parser::outline::OutlineNode;

pub fn read_json<T: DeserializeOwned>(path: &Path) -> ExtractResult<T> {
    let raw = fs::read_to_string(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ExtractError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Pretty-printed, creating parent directories as needed.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> ExtractResult<()> {
    let io_err = |source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let body = serde_json::to_string_pretty(value).map_err(|source| ExtractError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, body).map_err(io_err)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OutlineFile {
    Forest(Vec<OutlineNode>),
    Root(OutlineNode),
}

/// Load a bookmark outline. Accepts a list of roots or a single root object.
pub fn read_outline(path: &Path) -> ExtractResult<Vec<OutlineNode>> {
    let forest = match read_json::<OutlineFile>(path)? {
        OutlineFile::Forest(nodes) => nodes,
        OutlineFile::Root(node) => vec![node],
    };
    if forest.is_empty() {
        return Err(ExtractError::InvalidOutline(format!(
            "{} has no bookmarks",
            path.display()
        )));
    }
    Ok(forest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outline_as_list_or_single_root() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("list.json");
        let single = dir.path().join("single.json");
        fs::write(&list, r#"[{"title":"Physics","page":1,"children":[{"title":"Male","page":1}]}]"#).unwrap();
        fs::write(&single, r#"{"title":"Physics","page":1,"children":[{"title":"Male","page":1}]}"#).unwrap();

        let a = read_outline(&list).unwrap();
        let b = read_outline(&single).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].children[0].title, "Male");
        assert_eq!(a[0].children[0].children.len(), 0);
    }

    #[test]
    fn empty_outline_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outline.json");
        fs::write(&path, "[]").unwrap();
        assert!(matches!(read_outline(&path), Err(ExtractError::InvalidOutline(_))));
    }

    #[test]
    fn malformed_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{ not json").unwrap();
        assert!(matches!(read_outline(&bad), Err(ExtractError::Json { .. })));
        assert!(matches!(
            read_outline(&dir.path().join("absent.json")),
            Err(ExtractError::Io { .. })
        ));
    }

    #[test]
    fn write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/nested/rows.json");
        write_json(&path, &vec![1, 2, 3]).unwrap();
        let back: Vec<u32> = read_json(&path).unwrap();
        assert_eq!(back, [1, 2, 3]);
    }
}
