use crate::error::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*import\s+(.+)$").expect("import pattern is valid")
});

static FROM_IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*from\s+([\w.]+)\s+import\b").expect("from-import pattern is valid")
});

static GITHUB_REPO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"github\.com[/:]([A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)/([A-Za-z0-9_.-]+)")
        .expect("repository pattern is valid")
});

const SKIPPED_DIRS: &[&str] = &["node_modules", "__pycache__", "venv", "env", "site-packages", "build", "dist"];

const REPOSITORY_FILE_EXTENSIONS: &[&str] = &["py", "txt", "toml", "cfg"];

/// Top-level modules shipped with CPython, byte-sorted for `binary_search`
const STANDARD_LIBRARY: &[&str] = &[
    "__future__", "_thread", "abc", "aifc", "antigravity", "argparse", "array", "ast", "asynchat",
    "asyncio", "asyncore", "atexit", "audioop", "base64", "bdb", "binascii", "bisect", "builtins",
    "bz2", "cProfile", "calendar", "cgi", "cgitb", "chunk", "cmath", "cmd", "code", "codecs",
    "codeop", "collections", "colorsys", "compileall", "concurrent", "configparser", "contextlib",
    "contextvars", "copy", "copyreg", "crypt", "csv", "ctypes", "curses", "dataclasses", "datetime",
    "dbm", "decimal", "difflib", "dis", "distutils", "doctest", "email", "encodings", "ensurepip",
    "enum", "errno", "faulthandler", "fcntl", "filecmp", "fileinput", "fnmatch", "fractions",
    "ftplib", "functools", "gc", "genericpath", "getopt", "getpass", "gettext", "glob", "graphlib",
    "grp", "gzip", "hashlib", "heapq", "hmac", "html", "http", "idlelib", "imaplib", "imghdr",
    "imp", "importlib", "inspect", "io", "ipaddress", "itertools", "json", "keyword", "lib2to3",
    "linecache", "locale", "logging", "lzma", "mailbox", "mailcap", "marshal", "math", "mimetypes",
    "mmap", "modulefinder", "msilib", "msvcrt", "multiprocessing", "netrc", "nis", "nntplib", "nt",
    "ntpath", "nturl2path", "numbers", "opcode", "operator", "optparse", "os", "ossaudiodev",
    "pathlib", "pdb", "pickle", "pickletools", "pipes", "pkgutil", "platform", "plistlib", "poplib",
    "posix", "posixpath", "pprint", "profile", "pstats", "pty", "pwd", "py_compile", "pyclbr",
    "pydoc", "pydoc_data", "pyexpat", "queue", "quopri", "random", "re", "readline", "reprlib",
    "resource", "rlcompleter", "runpy", "sched", "secrets", "select", "selectors", "shelve",
    "shlex", "shutil", "signal", "site", "smtpd", "smtplib", "sndhdr", "socket", "socketserver",
    "spwd", "sqlite3", "sre_compile", "sre_constants", "sre_parse", "ssl", "stat", "statistics",
    "string", "stringprep", "struct", "subprocess", "sunau", "symtable", "sys", "sysconfig",
    "syslog", "tabnanny", "tarfile", "telnetlib", "tempfile", "termios", "textwrap", "this",
    "threading", "time", "timeit", "tkinter", "token", "tokenize", "tomllib", "trace", "traceback",
    "tracemalloc", "tty", "turtle", "turtledemo", "types", "typing", "unicodedata", "unittest",
    "urllib", "uu", "uuid", "venv", "warnings", "wave", "weakref", "webbrowser", "winreg",
    "winsound", "wsgiref", "xdrlib", "xml", "xmlrpc", "zipapp", "zipfile", "zipimport", "zlib",
    "zoneinfo",
];

/// Identifiers found in a source tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredDependencies {
    /// `owner/name` repositories
    pub repositories: BTreeSet<String>,
    /// Top-level package names
    pub packages: BTreeSet<String>,
}

/// Whether `module` ships with the Python standard library
pub fn is_standard_library(module: &str) -> bool {
    STANDARD_LIBRARY.binary_search(&module).is_ok()
}

/// Top-level module names imported by a Python source
///
/// Relative imports are skipped.
pub fn extract_imports(source: &str) -> Vec<String> {
    let mut modules = Vec::new();
    for line in source.lines() {
        let line = line.split('#').next().unwrap_or_default();
        if let Some(caps) = FROM_IMPORT_RE.captures(line) {
            if let Some(top) = top_level(&caps[1]) {
                modules.push(top);
            }
        } else if let Some(caps) = IMPORT_RE.captures(line) {
            modules.extend(caps[1].split(',').filter_map(|item| {
                let name = item.split_whitespace().next()?;
                top_level(name)
            }));
        }
    }
    modules
}

fn top_level(dotted: &str) -> Option<String> {
    if dotted.starts_with('.') {
        return None;
    }
    let top = dotted.split('.').next()?.trim();
    let valid = !top.is_empty()
        && top.chars().all(|c| c.is_alphanumeric() || c == '_')
        && !top.starts_with(|c: char| c.is_ascii_digit());
    valid.then(|| top.to_string())
}

/// `owner/name` pairs referenced as `github.com/owner/name`
pub fn extract_repositories(source: &str) -> Vec<String> {
    GITHUB_REPO_RE
        .captures_iter(source)
        .filter_map(|caps| {
            let owner = &caps[1];
            let name = caps[2].trim_end_matches(".git").trim_end_matches('.');
            (!name.is_empty()).then(|| format!("{}/{}", owner, name))
        })
        .collect()
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())
}

/// Walks `root` and collects repository and package identifiers
///
/// First-party modules (Python files and packages inside `root`) are never
/// reported as packages.
pub fn discover(root: &Path, skip_standard_library: bool) -> Result<DiscoveredDependencies> {
    let mut found = DiscoveredDependencies::default();
    let mut local_modules = BTreeSet::new();

    for entry in WalkDir::new(root).into_iter().filter_entry(|e| !is_skipped_dir(e)) {
        let entry = entry?;
        let path = entry.path();

        if entry.file_type().is_dir() {
            if path.join("__init__.py").is_file() {
                if let Some(name) = path.file_name() {
                    local_modules.insert(name.to_string_lossy().into_owned());
                }
            }
            continue;
        }

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        if !REPOSITORY_FILE_EXTENSIONS.contains(&extension) {
            continue;
        }

        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping unreadable file");
                continue;
            }
        };

        found.repositories.extend(extract_repositories(&source));
        if extension == "py" {
            if let Some(stem) = path.file_stem() {
                local_modules.insert(stem.to_string_lossy().into_owned());
            }
            found.packages.extend(extract_imports(&source));
        }
    }

    found.packages.retain(|name| {
        !local_modules.contains(name) && !(skip_standard_library && is_standard_library(name))
    });
    debug!(
        repositories = found.repositories.len(),
        packages = found.packages.len(),
        "discovery finished"
    );
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_standard_library_list_is_sorted() {
        let mut sorted = STANDARD_LIBRARY.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STANDARD_LIBRARY);
        assert!(is_standard_library("os"));
        assert!(!is_standard_library("requests"));
        assert!(!is_standard_library("numpy"));
    }

    #[test]
    fn test_less_common_standard_library_modules() {
        for module in [
            "atexit", "secrets", "zoneinfo", "pdb", "smtplib", "optparse", "webbrowser", "doctest",
            "cProfile", "shelve", "sched", "mmap", "pwd", "fileinput", "graphlib",
        ] {
            assert!(is_standard_library(module), "{module} should be standard library");
        }
        let imports = extract_imports("import atexit\nimport secrets\nfrom zoneinfo import ZoneInfo\nimport yaml\n");
        let third_party: Vec<_> = imports.into_iter().filter(|m| !is_standard_library(m)).collect();
        assert_eq!(third_party, vec!["yaml"]);
    }

    #[test]
    fn test_extract_imports() {
        let source = "\
import os, sys
import numpy as np
from requests.adapters import HTTPAdapter
from . import sibling
from .pkg import thing
    import yaml  # indented
# import commented
x = 'import nothing'
";
        assert_eq!(
            extract_imports(source),
            vec!["os", "sys", "numpy", "requests", "yaml"]
        );
    }

    #[test]
    fn test_extract_repositories() {
        let source = "\
git+https://github.com/psf/requests.git@main
see https://github.com/pallets/flask.
git@github.com:org-name/my_repo.git
";
        assert_eq!(
            extract_repositories(source),
            vec!["psf/requests", "pallets/flask", "org-name/my_repo"]
        );
    }
}
