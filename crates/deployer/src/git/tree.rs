use anyhow::{Result, anyhow};
use gix::{
    bstr::BString,
    objs::{Tree, tree},
};
use std::fs;
use std::path::Path;

/// Build the git tree of `dir`, writing blobs and sub-trees to `repo`.
///
/// Empty directories are left out, as git cannot record them.
pub fn build_tree(repo: &gix::Repository, dir: &Path) -> Result<Tree> {
    let mut entries = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let filename: BString = entry
            .file_name()
            .into_string()
            .map_err(|name| anyhow!("Invalid UTF-8 in file name {:?}", name))?
            .into();

        if path.is_dir() {
            let sub_tree = build_tree(repo, &path)?;
            if sub_tree.entries.is_empty() {
                continue;
            }
            let oid = repo.write_object(&sub_tree)?.detach();
            entries.push(tree::Entry {
                mode: tree::EntryKind::Tree.into(),
                oid,
                filename,
            });
        } else if path.is_file() {
            let oid = repo.write_blob(fs::read(&path)?)?.detach();
            entries.push(tree::Entry {
                mode: tree::EntryKind::Blob.into(),
                oid,
                filename,
            });
        }
    }

    sort_entries(&mut entries);
    Ok(Tree { entries })
}

/// Git orders entries by name, comparing directories as if they ended in `/`.
fn sort_entries(entries: &mut [tree::Entry]) {
    let tree_mode: tree::EntryMode = tree::EntryKind::Tree.into();
    entries.sort_by_cached_key(|e| {
        let mut key = e.filename.to_vec();
        if e.mode == tree_mode {
            key.push(b'/');
        }
        key
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use gix::objs::tree::EntryKind;
    use tempfile::TempDir;

    fn entry(kind: EntryKind, name: &str) -> tree::Entry {
        tree::Entry {
            mode: kind.into(),
            oid: gix::ObjectId::null(gix::hash::Kind::Sha1),
            filename: name.into(),
        }
    }

    #[test]
    fn test_directories_sort_with_trailing_slash() {
        let mut entries = vec![
            entry(EntryKind::Tree, "css"),
            entry(EntryKind::Blob, "css.html"),
            entry(EntryKind::Blob, "css-old"),
        ];
        sort_entries(&mut entries);

        let names: Vec<String> = entries.iter().map(|e| e.filename.to_string()).collect();
        assert_eq!(names, ["css-old", "css.html", "css"]);
    }

    #[test]
    fn test_build_tree_skips_empty_dirs() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("repo")).unwrap();
        let repo = gix::init(tmp.path().join("repo")).unwrap();
        let build = tmp.path().join("www");
        fs::create_dir_all(build.join("css")).unwrap();
        fs::create_dir_all(build.join("empty/nested")).unwrap();
        fs::write(build.join("index.html"), "<h1>hi</h1>").unwrap();
        fs::write(build.join("css/main.css"), "a{}").unwrap();

        let tree = build_tree(&repo, &build).unwrap();

        let names: Vec<String> = tree.entries.iter().map(|e| e.filename.to_string()).collect();
        assert_eq!(names, ["css", "index.html"]);
        assert_eq!(tree.entries[0].mode, EntryKind::Tree.into());

        let again = build_tree(&repo, &build).unwrap();
        assert_eq!(again, tree);
    }
}
