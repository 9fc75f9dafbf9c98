//! Dependency manifest detection and parsing.
//!
//! Each supported format is one [`ManifestFormat`] variant with its own parse
//! strategy; all strategies return the same [`ParsedManifest`] shape. Exactly
//! one manifest is authoritative per directory: the first present in
//! [`ManifestFormat::PRECEDENCE`]. Lower-precedence manifests are read only so
//! their content can contribute to the source fingerprint.
//!
//! Parsing is best effort at the entry level. A malformed entry becomes a
//! problem string and the remaining entries are still extracted. A document
//! that fails to parse as a whole falls back to a line scanner. Manifest
//! content is treated as untrusted text and never evaluated.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{dedup_dependencies, Dependency};

/// Files above this size are truncated at read time.
pub const MAX_MANIFEST_BYTES: u64 = 1024 * 1024;

/// Supported manifest formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    /// `requirements.txt`: pinned, lock-style.
    Requirements,
    /// `pyproject.toml`: PEP 621 or Poetry.
    Pyproject,
    /// `environment.yml`: conda.
    CondaEnvironment,
    /// `Cargo.toml`.
    Cargo,
    /// `package.json`.
    PackageJson,
}

impl ManifestFormat {
    /// Highest precedence first.
    pub const PRECEDENCE: [ManifestFormat; 5] = [
        ManifestFormat::Requirements,
        ManifestFormat::Pyproject,
        ManifestFormat::CondaEnvironment,
        ManifestFormat::Cargo,
        ManifestFormat::PackageJson,
    ];

    pub fn file_names(&self) -> &'static [&'static str] {
        match self {
            ManifestFormat::Requirements => &["requirements.txt"],
            ManifestFormat::Pyproject => &["pyproject.toml"],
            ManifestFormat::CondaEnvironment => &["environment.yml", "environment.yaml"],
            ManifestFormat::Cargo => &["Cargo.toml"],
            ManifestFormat::PackageJson => &["package.json"],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ManifestFormat::Requirements => "requirements",
            ManifestFormat::Pyproject => "pyproject",
            ManifestFormat::CondaEnvironment => "conda",
            ManifestFormat::Cargo => "cargo",
            ManifestFormat::PackageJson => "npm",
        }
    }

    /// Parse manifest text. Pure: no I/O.
    pub fn parse(&self, content: &str) -> ParsedManifest {
        let mut parsed = match self {
            ManifestFormat::Requirements => parse_requirements(content),
            ManifestFormat::Pyproject => parse_pyproject(content),
            ManifestFormat::CondaEnvironment => parse_conda_environment(content),
            ManifestFormat::Cargo => parse_cargo_toml(content),
            ManifestFormat::PackageJson => parse_package_json(content),
        };
        parsed.dependencies = dedup_dependencies(std::mem::take(&mut parsed.dependencies));
        parsed
    }
}

/// Normalized output of one parse strategy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedManifest {
    pub dependencies: Vec<Dependency>,
    /// One entry per malformed dependency or document-level failure.
    pub problems: Vec<String>,
}

impl ParsedManifest {
    fn push_spec(&mut self, spec: &str, parse: fn(&str) -> Result<Option<Dependency>, String>) {
        match parse(spec) {
            Ok(Some(dep)) => self.dependencies.push(dep),
            Ok(None) => {}
            Err(problem) => self.problems.push(problem),
        }
    }
}

/// A manifest file read into memory.
#[derive(Debug, Clone)]
pub struct ManifestFile {
    pub format: ManifestFormat,
    pub path: PathBuf,
    pub content: String,
    /// Set when the file exceeded [`MAX_MANIFEST_BYTES`] or was unreadable.
    pub read_problem: Option<String>,
}

/// Result of parsing the authoritative manifest of a directory.
#[derive(Debug, Clone, PartialEq)]
pub enum ManifestOutcome {
    /// No supported manifest is present. Informational, not a failure.
    NoManifestFound,
    Parsed {
        format: ManifestFormat,
        path: PathBuf,
        dependencies: Vec<Dependency>,
    },
    /// Some entries (or the whole document) were malformed.
    /// `partial` holds everything that could still be extracted.
    ParseError {
        format: ManifestFormat,
        path: PathBuf,
        partial: Vec<Dependency>,
        problems: Vec<String>,
    },
}

impl ManifestOutcome {
    pub fn dependencies(&self) -> &[Dependency] {
        match self {
            ManifestOutcome::NoManifestFound => &[],
            ManifestOutcome::Parsed { dependencies, .. } => dependencies,
            ManifestOutcome::ParseError { partial, .. } => partial,
        }
    }

    /// Deterministic, human-readable note for the record, if the outcome
    /// degrades it.
    pub fn note(&self) -> Option<String> {
        match self {
            ManifestOutcome::NoManifestFound => Some("no dependency manifest found".to_string()),
            ManifestOutcome::Parsed { .. } => None,
            ManifestOutcome::ParseError {
                path, problems, ..
            } => {
                let file = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                Some(format!(
                    "{}: {} malformed entr{} skipped",
                    file,
                    problems.len(),
                    if problems.len() == 1 { "y" } else { "ies" }
                ))
            }
        }
    }
}

/// Read every present manifest in precedence order.
pub fn read_manifests(dir: &Path) -> Vec<ManifestFile> {
    let mut files = Vec::new();
    for format in ManifestFormat::PRECEDENCE {
        for name in format.file_names() {
            let path = dir.join(name);
            if path.is_file() {
                let (content, read_problem) = read_capped(&path);
                files.push(ManifestFile {
                    format,
                    path,
                    content,
                    read_problem,
                });
                break;
            }
        }
    }
    files
}

pub(crate) fn read_capped(path: &Path) -> (String, Option<String>) {
    let mut buf = Vec::new();
    let read = std::fs::File::open(path)
        .and_then(|f| f.take(MAX_MANIFEST_BYTES + 1).read_to_end(&mut buf));
    match read {
        Ok(_) if buf.len() as u64 > MAX_MANIFEST_BYTES => {
            buf.truncate(MAX_MANIFEST_BYTES as usize);
            (
                String::from_utf8_lossy(&buf).into_owned(),
                Some(format!("truncated at {} bytes", MAX_MANIFEST_BYTES)),
            )
        }
        Ok(_) => (String::from_utf8_lossy(&buf).into_owned(), None),
        Err(e) => (String::new(), Some(format!("unreadable: {}", e))),
    }
}

/// Parse the authoritative (first) manifest from an already-read set.
pub fn parse_manifests(files: &[ManifestFile]) -> ManifestOutcome {
    let Some(file) = files.first() else {
        return ManifestOutcome::NoManifestFound;
    };
    let mut parsed = file.format.parse(&file.content);
    if let Some(problem) = &file.read_problem {
        parsed.problems.insert(0, problem.clone());
    }
    if parsed.problems.is_empty() {
        ManifestOutcome::Parsed {
            format: file.format,
            path: file.path.clone(),
            dependencies: parsed.dependencies,
        }
    } else {
        tracing::warn!(
            path = %file.path.display(),
            problems = parsed.problems.len(),
            "manifest parsed with problems"
        );
        ManifestOutcome::ParseError {
            format: file.format,
            path: file.path.clone(),
            partial: parsed.dependencies,
            problems: parsed.problems,
        }
    }
}

/// Detect and parse the authoritative manifest of `dir`.
pub fn parse_dir(dir: &Path) -> ManifestOutcome {
    parse_manifests(&read_manifests(dir))
}

// ── PEP 508 / requirements.txt ─────────────────────────────────────────

static PEP508: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]*)\s*(\[[^\]]*\])?\s*(.*)$").expect("valid regex")
});

/// Parse one PEP 508 requirement string, markers and extras stripped.
fn parse_pep508(spec: &str) -> Result<Option<Dependency>, String> {
    // Markers after `;`, per-requirement pip options after ` --`.
    let spec = spec.split(';').next().unwrap_or("");
    let spec = spec.split(" --").next().unwrap_or("").trim();
    if spec.is_empty() {
        return Ok(None);
    }
    let caps = PEP508
        .captures(spec)
        .ok_or_else(|| format!("invalid requirement: {}", spec))?;
    let name = &caps[1];
    let rest = caps.get(3).map(|m| m.as_str().trim()).unwrap_or("");
    if name.eq_ignore_ascii_case("python") {
        return Ok(None);
    }
    // Direct references (`name @ url`) carry no version constraint.
    if rest.starts_with('@') {
        return Ok(Some(Dependency::new(name, "")));
    }
    let version = rest.trim_start_matches('(').trim_end_matches(')').trim();
    if !version.is_empty() && !version.starts_with(['=', '<', '>', '!', '~']) {
        return Err(format!("invalid requirement: {}", spec));
    }
    Ok(Some(Dependency::new(name, &version.replace(' ', ""))))
}

fn parse_requirements(content: &str) -> ParsedManifest {
    let mut parsed = ParsedManifest::default();
    for raw in content.lines() {
        let line = strip_inline_comment(raw).trim().trim_end_matches('\\').trim();
        if line.is_empty() || line.starts_with('-') || line.contains("://") {
            continue;
        }
        parsed.push_spec(line, parse_pep508);
    }
    parsed
}

fn strip_inline_comment(line: &str) -> &str {
    if line.trim_start().starts_with('#') {
        return "";
    }
    match line.find(" #").or_else(|| line.find("\t#")) {
        Some(idx) => &line[..idx],
        None => line,
    }
}

// ── pyproject.toml ─────────────────────────────────────────────────────

fn parse_pyproject(content: &str) -> ParsedManifest {
    let value: toml::Value = match toml::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            let mut parsed = scan_quoted_array(content, "dependencies", parse_pep508);
            parsed.problems.insert(0, format!("invalid TOML: {}", first_line(&e.to_string())));
            return parsed;
        }
    };

    let mut parsed = ParsedManifest::default();

    if let Some(deps) = value
        .get("project")
        .and_then(|p| p.get("dependencies"))
        .and_then(|d| d.as_array())
    {
        for entry in deps {
            match entry.as_str() {
                Some(spec) => parsed.push_spec(spec, parse_pep508),
                None => parsed
                    .problems
                    .push(format!("non-string dependency entry: {}", entry)),
            }
        }
    }

    if let Some(deps) = value
        .get("tool")
        .and_then(|t| t.get("poetry"))
        .and_then(|p| p.get("dependencies"))
        .and_then(|d| d.as_table())
    {
        for (name, spec) in deps {
            if name.eq_ignore_ascii_case("python") {
                continue;
            }
            match toml_version(spec) {
                Some(version) => {
                    let version = if version == "*" { "" } else { version };
                    parsed.dependencies.push(Dependency::new(name, version));
                }
                None => parsed
                    .problems
                    .push(format!("unsupported dependency value for {}", name)),
            }
        }
    }

    parsed
}

/// Version from a `"1.0"` string or `{ version = "1.0", ... }` table.
fn toml_version(value: &toml::Value) -> Option<&str> {
    match value {
        toml::Value::String(s) => Some(s.as_str()),
        toml::Value::Table(t) => Some(t.get("version").and_then(|v| v.as_str()).unwrap_or("")),
        _ => None,
    }
}

// ── environment.yml ────────────────────────────────────────────────────

fn parse_conda_spec(spec: &str) -> Result<Option<Dependency>, String> {
    let spec = spec.trim();
    let spec = spec.rsplit("::").next().unwrap_or(spec);
    let idx = spec
        .find(|c: char| matches!(c, '=' | '<' | '>' | '!' | ' '))
        .unwrap_or(spec.len());
    let (name, version) = spec.split_at(idx);
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(format!("invalid conda spec: {}", spec));
    }
    if name.eq_ignore_ascii_case("python") || name.eq_ignore_ascii_case("pip") {
        return Ok(None);
    }
    Ok(Some(Dependency::new(name, &version.replace(' ', ""))))
}

fn parse_conda_environment(content: &str) -> ParsedManifest {
    let value: serde_yaml::Value = match serde_yaml::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            let mut parsed = scan_dash_list(content);
            parsed.problems.insert(0, format!("invalid YAML: {}", first_line(&e.to_string())));
            return parsed;
        }
    };

    let mut parsed = ParsedManifest::default();
    let Some(entries) = value.get("dependencies").and_then(|d| d.as_sequence()) else {
        return parsed;
    };
    for entry in entries {
        match entry {
            serde_yaml::Value::String(spec) => parsed.push_spec(spec, parse_conda_spec),
            serde_yaml::Value::Mapping(map) => match map.get("pip").and_then(|p| p.as_sequence()) {
                Some(pip) => {
                    for item in pip {
                        match item.as_str() {
                            Some(spec) => parsed.push_spec(spec, parse_pep508),
                            None => parsed.problems.push("non-string pip entry".to_string()),
                        }
                    }
                }
                None => parsed
                    .problems
                    .push("unsupported mapping in dependencies".to_string()),
            },
            other => parsed
                .problems
                .push(format!("unsupported dependency entry: {:?}", other)),
        }
    }
    parsed
}

// ── Cargo.toml ─────────────────────────────────────────────────────────

fn parse_cargo_toml(content: &str) -> ParsedManifest {
    let value: toml::Value = match toml::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            let mut parsed = scan_toml_tables(content);
            parsed.problems.insert(0, format!("invalid TOML: {}", first_line(&e.to_string())));
            return parsed;
        }
    };

    let mut parsed = ParsedManifest::default();
    let workspace_deps = value.get("workspace").and_then(|w| w.get("dependencies"));
    let sections = ["dependencies", "dev-dependencies", "build-dependencies"]
        .iter()
        .filter_map(|key| value.get(*key))
        .chain(workspace_deps);

    for section in sections {
        let Some(table) = section.as_table() else {
            parsed.problems.push("dependency section is not a table".to_string());
            continue;
        };
        for (name, spec) in table {
            match toml_version(spec) {
                Some(version) => parsed.dependencies.push(Dependency::new(name, version)),
                None => parsed
                    .problems
                    .push(format!("unsupported dependency value for {}", name)),
            }
        }
    }
    parsed
}

// ── package.json ───────────────────────────────────────────────────────

const NPM_SECTIONS: [&str; 3] = ["dependencies", "devDependencies", "peerDependencies"];

fn parse_package_json(content: &str) -> ParsedManifest {
    let value: serde_json::Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            let mut parsed = scan_json_objects(content);
            parsed.problems.insert(0, format!("invalid JSON: {}", e));
            return parsed;
        }
    };

    let mut parsed = ParsedManifest::default();
    for key in NPM_SECTIONS {
        let Some(section) = value.get(key) else {
            continue;
        };
        let Some(obj) = section.as_object() else {
            parsed.problems.push(format!("{} is not an object", key));
            continue;
        };
        for (name, version) in obj {
            match version.as_str() {
                Some(v) => parsed.dependencies.push(Dependency::new(name, v)),
                None => parsed
                    .problems
                    .push(format!("non-string version for {}", name)),
            }
        }
    }
    parsed
}

// ── Line-level fallbacks for documents that fail to parse ──────────────

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["']([^"']+)["']"#).expect("valid regex"));
static DASH_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*-\s*([^\s#:]+)\s*(#.*)?$").expect("valid regex"));
static TOML_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*([A-Za-z0-9_.-]+)\s*=\s*(?:"([^"]*)"|\{.*?version\s*=\s*"([^"]*)")"#)
        .expect("valid regex")
});
static JSON_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)"\s*:\s*"([^"]*)""#).expect("valid regex"));

/// Quoted entries of a `key = [ ... ]` array, one or more per line.
fn scan_quoted_array(
    content: &str,
    key: &str,
    parse: fn(&str) -> Result<Option<Dependency>, String>,
) -> ParsedManifest {
    let mut parsed = ParsedManifest::default();
    let mut inside = false;
    for line in content.lines() {
        let trimmed = line.trim();
        if !inside {
            let Some(rest) = trimmed.strip_prefix(key) else {
                continue;
            };
            let Some(rest) = rest.trim_start().strip_prefix('=') else {
                continue;
            };
            if !rest.trim_start().starts_with('[') {
                continue;
            }
            inside = true;
        }
        for caps in QUOTED.captures_iter(trimmed) {
            parsed.push_spec(&caps[1], parse);
        }
        if trimmed.ends_with(']') {
            inside = false;
        }
    }
    parsed
}

fn scan_dash_list(content: &str) -> ParsedManifest {
    let mut parsed = ParsedManifest::default();
    let mut inside = false;
    for line in content.lines() {
        if line.trim_start().starts_with("dependencies:") {
            inside = true;
            continue;
        }
        if !inside {
            continue;
        }
        let top_level = !line.starts_with(char::is_whitespace) && !line.starts_with('-');
        if top_level && !line.trim().is_empty() {
            inside = false;
            continue;
        }
        if let Some(caps) = DASH_ITEM.captures(line) {
            parsed.push_spec(&caps[1], parse_conda_spec);
        }
    }
    parsed
}

fn scan_toml_tables(content: &str) -> ParsedManifest {
    let mut parsed = ParsedManifest::default();
    let mut inside = false;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            inside = trimmed.trim_matches(|c| c == '[' || c == ']').ends_with("dependencies");
            continue;
        }
        if !inside {
            continue;
        }
        if let Some(caps) = TOML_KEY.captures(trimmed) {
            let version = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or("");
            parsed.dependencies.push(Dependency::new(&caps[1], version));
        }
    }
    parsed
}

fn scan_json_objects(content: &str) -> ParsedManifest {
    let mut parsed = ParsedManifest::default();
    let mut inside = false;
    for line in content.lines() {
        let trimmed = line.trim();
        if NPM_SECTIONS
            .iter()
            .any(|s| trimmed.starts_with(&format!("\"{}\"", s)))
        {
            inside = true;
            continue;
        }
        if !inside {
            continue;
        }
        if trimmed.starts_with('}') {
            inside = false;
            continue;
        }
        if let Some(caps) = JSON_PAIR.captures(trimmed) {
            parsed.dependencies.push(Dependency::new(&caps[1], &caps[2]));
        }
    }
    parsed
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or(s)
}
