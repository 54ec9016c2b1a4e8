//! Tree-wide rename tests against real directory layouts.

use region_patcher::rename::{rename_tree, RenameMap};
use std::fs;
use tempfile::TempDir;

fn tree_with(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, content) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
    dir
}

fn tailwind_map() -> RenameMap {
    RenameMap::new([
        ("bg-primary".to_string(), "bg-blue-600".to_string()),
        ("text-muted".to_string(), "text-gray-500".to_string()),
    ])
    .unwrap()
}

#[test]
fn renames_across_the_tree() {
    let dir = tree_with(&[
        (
            "src/App.tsx",
            "<div className=\"bg-primary text-muted\">hi</div>",
        ),
        ("src/components/Card.tsx", "<span className=\"bg-primary\" />"),
        ("src/unrelated.tsx", "<p>nothing to do</p>"),
    ]);

    let report = rename_tree(dir.path(), "tsx", &tailwind_map(), false).unwrap();

    assert_eq!(report.files_scanned, 3);
    assert_eq!(report.files_modified(), 2);
    assert_eq!(report.total_replacements(), 3);

    let app = fs::read_to_string(dir.path().join("src/App.tsx")).unwrap();
    assert_eq!(app, "<div className=\"bg-blue-600 text-gray-500\">hi</div>");
    let card = fs::read_to_string(dir.path().join("src/components/Card.tsx")).unwrap();
    assert_eq!(card, "<span className=\"bg-blue-600\" />");
}

#[test]
fn dry_run_reports_counts_without_writing() {
    let dir = tree_with(&[("src/App.tsx", "bg-primary bg-primary")]);

    let report = rename_tree(dir.path(), "tsx", &tailwind_map(), true).unwrap();

    assert_eq!(report.files_modified(), 1);
    assert_eq!(report.total_replacements(), 2);
    assert_eq!(
        fs::read_to_string(dir.path().join("src/App.tsx")).unwrap(),
        "bg-primary bg-primary"
    );
}

#[test]
fn skips_dependency_and_output_directories() {
    let dir = tree_with(&[
        ("src/App.tsx", "bg-primary"),
        ("node_modules/lib/index.tsx", "bg-primary"),
        ("dist/App.tsx", "bg-primary"),
        (".next/cache/page.tsx", "bg-primary"),
    ]);

    let report = rename_tree(dir.path(), "tsx", &tailwind_map(), false).unwrap();

    assert_eq!(report.files_scanned, 1);
    assert_eq!(
        fs::read_to_string(dir.path().join("node_modules/lib/index.tsx")).unwrap(),
        "bg-primary"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("dist/App.tsx")).unwrap(),
        "bg-primary"
    );
}

#[test]
fn plain_tokens_match_whole_words_only() {
    let map = RenameMap::new([("Card".to_string(), "Panel".to_string())]).unwrap();
    let dir = tree_with(&[("src/App.tsx", "<Card /> <CardHeader /> <Card>")]);

    let report = rename_tree(dir.path(), "tsx", &map, false).unwrap();

    assert_eq!(report.total_replacements(), 2);
    assert_eq!(
        fs::read_to_string(dir.path().join("src/App.tsx")).unwrap(),
        "<Panel /> <CardHeader /> <Panel>"
    );
}

#[test]
fn bracketed_tokens_match_literally() {
    let map = RenameMap::new([(
        "w-[120px]".to_string(),
        "w-[8rem]".to_string(),
    )])
    .unwrap();
    let dir = tree_with(&[("src/App.tsx", "class=\"w-[120px] h-4\"")]);

    let report = rename_tree(dir.path(), "tsx", &map, false).unwrap();

    assert_eq!(report.total_replacements(), 1);
    assert_eq!(
        fs::read_to_string(dir.path().join("src/App.tsx")).unwrap(),
        "class=\"w-[8rem] h-4\""
    );
}

#[test]
fn replacement_text_is_taken_verbatim() {
    // Dollar signs in the new token must not be treated as capture groups
    let map = RenameMap::new([("price".to_string(), "$cost".to_string())]).unwrap();
    let dir = tree_with(&[("src/App.tsx", "let price = 1;")]);

    rename_tree(dir.path(), "tsx", &map, false).unwrap();

    assert_eq!(
        fs::read_to_string(dir.path().join("src/App.tsx")).unwrap(),
        "let $cost = 1;"
    );
}

#[test]
fn loads_map_from_json_file() {
    let dir = tree_with(&[("src/App.tsx", "old-token here")]);
    let map_path = dir.path().join("rename.json");
    fs::write(&map_path, r#"{"old-token": "new-token"}"#).unwrap();

    let map = RenameMap::from_json_file(&map_path).unwrap();
    let report = rename_tree(dir.path(), "tsx", &map, false).unwrap();

    assert_eq!(report.total_replacements(), 1);
    assert_eq!(
        fs::read_to_string(dir.path().join("src/App.tsx")).unwrap(),
        "new-token here"
    );
}
