// src/metadata.rs

//! Package metadata and classification rules
//!
//! [`EggMetadata`] is parsed from the bundle's file name plus descriptor
//! members under `EGG-INFO/`. It supplies the classification predicates
//! consumed by the placement classifier, the executable predicate, and
//! the auxiliary lists: executables to link, extra library-search
//! directories, and entry-point scripts grouped by kind.

use crate::bundle::Bundle;
use crate::error::{Error, Result};
use crate::path::FilePath;
use crate::platform::Platform;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::warn;

static ENTRY_POINT_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[([^\]]*)\]$").unwrap());

static ENTRY_POINT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+)\s*=\s*([\w.]+)(?::([\w.]+))?(?:\s+\[[^\]]*\])?$").unwrap()
});

/// Entry-point script kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    Console,
    Gui,
}

impl ScriptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Console => "console_scripts",
            Self::Gui => "gui_scripts",
        }
    }
}

/// One declared entry point: `name = module:attr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub name: String,
    pub module: String,
    pub attr: Option<String>,
}

/// Metadata for a self-contained egg bundle.
///
/// The descriptor directory lives inside the bundle as `EGG-INFO/`;
/// identity comes from the bundle file name, e.g. `dummy-1.0.1-1.egg`.
#[derive(Debug, Clone)]
pub struct EggMetadata {
    /// Original bundle file name, e.g. `dummy-1.0.1-1.egg`.
    pub filename: String,
    /// File name without extension, e.g. `dummy-1.0.1-1`.
    pub egg_name: String,
    pub name: String,
    pub version: String,
    pub build: Option<String>,
    /// Canonical (lowercased) name: the manifest storage key.
    pub cname: String,
}

impl EggMetadata {
    /// Parse identity from a bundle file name.
    pub fn from_filename(filename: &str) -> Result<Self> {
        if filename.is_empty() {
            return Err(Error::Format("empty bundle file name".to_string()));
        }
        let egg_name = filename
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(filename)
            .to_string();

        let (name, rest) = match egg_name.split_once('-') {
            Some((name, rest)) => (name.to_string(), rest),
            None => (egg_name.clone(), ""),
        };
        let (version, build) = match rest.split_once('-') {
            Some((version, build)) => (version.to_string(), Some(build.to_string())),
            None => (rest.to_string(), None),
        };

        let cname = name.to_lowercase();
        Ok(Self {
            filename: filename.to_string(),
            egg_name,
            name,
            version,
            build,
            cname,
        })
    }

    // classification rules, evaluated by the placement classifier in
    // priority order: pkg_info, prefix, script, metadata

    /// The special `EGG-INFO/PKG-INFO` member.
    pub fn is_pkg_info(&self, path: &FilePath, _platform: &dyn Platform) -> Option<FilePath> {
        if path.segments() == ["EGG-INFO", "PKG-INFO"] {
            return FilePath::new([format!("{}.egg-info", self.egg_name)]).ok();
        }
        None
    }

    /// Members placed relative to the prefix root.
    pub fn is_prefix(&self, path: &FilePath, platform: &dyn Platform) -> Option<FilePath> {
        if path.starts_with(&["EGG-INFO", "prefix"]) {
            return path.strip_prefix(&["EGG-INFO", "prefix"]);
        }
        if !platform.is_windows() && path.starts_with(&["EGG-INFO", "usr"]) {
            return path.strip_prefix(&["EGG-INFO", "usr"]);
        }
        None
    }

    /// Executable scripts shipped verbatim in the bundle.
    pub fn is_script(&self, path: &FilePath, _platform: &dyn Platform) -> Option<FilePath> {
        path.strip_prefix(&["EGG-INFO", "scripts"])
    }

    /// General metadata members.
    pub fn is_metadata(&self, path: &FilePath, _platform: &dyn Platform) -> Option<FilePath> {
        path.strip_prefix(&["EGG-INFO"])
    }

    /// Should the file at this bundle location get the executable bit?
    ///
    /// True for `EGG-INFO/usr/bin` and `EGG-INFO/scripts` subtrees,
    /// shared-library extensions, and `EGG-INFO/usr/lib/**/lib*.so`.
    pub fn is_executable(&self, path: &FilePath) -> bool {
        if path.starts_with(&["EGG-INFO", "usr", "bin"])
            || path.starts_with(&["EGG-INFO", "scripts"])
        {
            return true;
        }
        let last = path.last();
        if last.ends_with(".dylib") || last.ends_with(".pyd") || last.ends_with(".so") {
            return true;
        }
        path.starts_with(&["EGG-INFO", "usr", "lib"])
            && last.starts_with("lib")
            && last.ends_with(".so")
    }

    /// Declared (source, link-name) pairs from
    /// `EGG-INFO/inst/files_to_install.txt`. Malformed lines are logged
    /// and skipped.
    pub fn executables(&self, bundle: &dyn Bundle) -> Result<Vec<(FilePath, String)>> {
        let path = FilePath::parse("EGG-INFO/inst/files_to_install.txt")?;
        if !bundle.contains(&path) {
            return Ok(Vec::new());
        }

        let data = bundle.get_bytes(&path)?;
        let text = String::from_utf8_lossy(&data);
        let mut pairs = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next(), fields.next()) {
                (Some(source), Some(target), None) => match FilePath::parse(source) {
                    Ok(source) => pairs.push((source, target.to_string())),
                    Err(_) => warn!("Skipping link declaration with bad path: {}", line),
                },
                _ => warn!("Skipping malformed link declaration: {}", line),
            }
        }
        Ok(pairs)
    }

    /// Library-search directories whose contents need patching, from
    /// `EGG-INFO/inst/targets.dat` plus the implicit `lib`.
    pub fn library_dirs(&self, bundle: &dyn Bundle) -> Result<Vec<String>> {
        let mut dirs = Vec::new();
        let path = FilePath::parse("EGG-INFO/inst/targets.dat")?;
        if bundle.contains(&path) {
            let data = bundle.get_bytes(&path)?;
            for line in String::from_utf8_lossy(&data).lines() {
                let line = line.trim();
                if !line.is_empty() {
                    dirs.push(line.to_string());
                }
            }
        }
        dirs.push("lib".to_string());
        Ok(dirs)
    }

    /// Console and gui entry points from `EGG-INFO/entry_points.txt`.
    ///
    /// Malformed lines are logged and skipped; other sections are
    /// ignored.
    pub fn scripts(&self, bundle: &dyn Bundle) -> Result<Vec<(ScriptKind, EntryPoint)>> {
        let path = FilePath::parse("EGG-INFO/entry_points.txt")?;
        if !bundle.contains(&path) {
            return Ok(Vec::new());
        }

        let data = bundle.get_bytes(&path)?;
        let text = String::from_utf8_lossy(&data);

        let mut scripts = Vec::new();
        let mut kind: Option<ScriptKind> = None;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(caps) = ENTRY_POINT_SECTION.captures(line) {
                kind = match &caps[1] {
                    "console_scripts" => Some(ScriptKind::Console),
                    "gui_scripts" => Some(ScriptKind::Gui),
                    _ => None,
                };
                continue;
            }
            let Some(kind) = kind else { continue };
            match ENTRY_POINT_LINE.captures(line) {
                Some(caps) => scripts.push((
                    kind,
                    EntryPoint {
                        name: caps[1].to_string(),
                        module: caps[2].to_string(),
                        attr: caps.get(3).map(|m| m.as_str().to_string()),
                    },
                )),
                None => warn!("Skipping malformed entry point: {}", line),
            }
        }
        Ok(scripts)
    }

    /// Descriptive metadata merged from `EGG-INFO/spec/depend` and
    /// `EGG-INFO/info.json`. Read by tooling, never by uninstall.
    pub fn info(&self, bundle: &dyn Bundle) -> Result<Map<String, Value>> {
        let mut info = Map::new();
        info.insert("key".to_string(), Value::String(self.filename.clone()));

        let depend = FilePath::parse("EGG-INFO/spec/depend")?;
        if bundle.contains(&depend) {
            let data = bundle.get_bytes(&depend)?;
            for (key, value) in parse_depend(&String::from_utf8_lossy(&data)) {
                info.insert(key, value);
            }
        }

        let info_json = FilePath::parse("EGG-INFO/info.json")?;
        if bundle.contains(&info_json) {
            let data = bundle.get_bytes(&info_json)?;
            if let Value::Object(map) = serde_json::from_slice(&data)? {
                info.extend(map);
            }
        }

        // transport-level field, meaningless once installed
        info.remove("available");
        Ok(info)
    }
}

/// Parse the assignment-per-line `spec/depend` grammar: quoted strings,
/// integers, `None`, and (possibly multi-line) lists of quoted strings.
fn parse_depend(text: &str) -> Vec<(String, Value)> {
    const KEYS: [&str; 8] = [
        "name", "version", "build", "arch", "platform", "osdist", "python", "packages",
    ];

    let mut fields = Vec::new();
    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if !KEYS.contains(&key) {
            continue;
        }

        let mut value = value.trim().to_string();
        // multi-line list: accumulate until the closing bracket
        while value.starts_with('[') && !value.ends_with(']') {
            match lines.next() {
                Some(next) => {
                    value.push(' ');
                    value.push_str(next.trim());
                }
                None => break,
            }
        }

        fields.push((key.to_string(), parse_depend_value(&value)));
    }
    fields
}

fn parse_depend_value(value: &str) -> Value {
    if value == "None" {
        return Value::Null;
    }
    if let Some(s) = unquote(value) {
        return Value::String(s.to_string());
    }
    if let Ok(n) = value.parse::<i64>() {
        return Value::Number(n.into());
    }
    if value.starts_with('[') && value.ends_with(']') {
        let items = value[1..value.len() - 1]
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .filter_map(|item| unquote(item).map(|s| Value::String(s.to_string())))
            .collect();
        return Value::Array(items);
    }
    Value::String(value.to_string())
}

fn unquote(value: &str) -> Option<&str> {
    let stripped = value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')));
    stripped
}
