use autocredit::discovery::discover;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn sample_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    write(
        root,
        "app/main.py",
        "import os\nimport requests\nfrom numpy.linalg import norm\nfrom app.helpers import tidy\nimport helpers\n",
    );
    write(root, "app/__init__.py", "");
    write(root, "app/helpers.py", "from collections import OrderedDict\nimport yaml\n");
    write(
        root,
        "requirements.txt",
        "requests==2.31\ngit+https://github.com/psf/black.git@main#egg=black\n",
    );
    write(root, "setup.cfg", "[metadata]\nurl = https://github.com/example/project\n");
    write(root, "README.md", "See https://github.com/ignored/markdown for details.\n");
    write(root, ".venv/lib/site.py", "import django\n# https://github.com/django/django\n");
    write(root, "node_modules/pkg/index.py", "import leftpad\n");

    dir
}

#[test]
fn test_discover_skips_standard_library_and_local_modules() {
    let project = sample_project();
    let found = discover(project.path(), true).unwrap();

    let packages: Vec<&str> = found.packages.iter().map(String::as_str).collect();
    assert_eq!(packages, vec!["numpy", "requests", "yaml"]);

    let repositories: Vec<&str> = found.repositories.iter().map(String::as_str).collect();
    assert_eq!(repositories, vec!["example/project", "psf/black"]);
}

#[test]
fn test_discover_keeps_standard_library_when_asked() {
    let project = sample_project();
    let found = discover(project.path(), false).unwrap();

    assert!(found.packages.contains("os"));
    assert!(found.packages.contains("collections"));
    assert!(!found.packages.contains("app"));
    assert!(!found.packages.contains("helpers"));
}

#[test]
fn test_hidden_and_vendored_directories_are_ignored() {
    let project = sample_project();
    let found = discover(project.path(), false).unwrap();

    assert!(!found.packages.contains("django"));
    assert!(!found.packages.contains("leftpad"));
    assert!(!found.repositories.contains("django/django"));
}

#[test]
fn test_empty_tree() {
    let dir = TempDir::new().unwrap();
    let found = discover(dir.path(), true).unwrap();
    assert!(found.packages.is_empty());
    assert!(found.repositories.is_empty());
}

#[test]
fn test_missing_root_is_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(discover(&dir.path().join("does-not-exist"), true).is_err());
}
