#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

pub const MANIFEST_NAME: &str = "veld.toml";

#[derive(Debug, Error, Diagnostic)]
#[error("manifest error: {message}")]
#[diagnostic(code(veld::manifest))]
pub struct ManifestError {
    pub message: String,
}

/// `[analysis]`; every key is optional and CLI flags win over it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AnalysisSettings {
    #[serde(default)]
    pub parallel: Option<bool>,
    #[serde(default)]
    pub jobs: Option<usize>,
    #[serde(default)]
    pub max_diagnostics: Option<usize>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedManifest {
    pub manifest_path: Option<PathBuf>,
    pub project_root: PathBuf,
    pub name: Option<String>,
    pub analysis: AnalysisSettings,
}

impl ResolvedManifest {
    pub fn empty(project_root: PathBuf) -> Self {
        Self {
            project_root,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    project: Option<Project>,

    #[serde(default)]
    analysis: AnalysisSettings,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct Project {
    #[serde(default)]
    name: Option<String>,
}

/// Nearest `veld.toml` at or above `start`.
pub fn find_manifest(start: &Path) -> Option<PathBuf> {
    let mut cur = if start.is_file() {
        start.parent()?.to_path_buf()
    } else {
        start.to_path_buf()
    };

    loop {
        let candidate = cur.join(MANIFEST_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        match cur.parent() {
            Some(p) => cur = p.to_path_buf(),
            None => return None,
        }
    }
}

pub fn load_resolved_manifest(start: &Path) -> Result<ResolvedManifest, ManifestError> {
    let project_root = if start.is_file() {
        start
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf()
    } else {
        start.to_path_buf()
    };

    let Some(manifest_path) = find_manifest(&project_root) else {
        return Ok(ResolvedManifest::empty(project_root));
    };

    let raw = fs::read_to_string(&manifest_path).map_err(|e| ManifestError {
        message: format!("failed to read {}: {e}", manifest_path.display()),
    })?;
    let mut resolved = parse_manifest(&raw).map_err(|e| ManifestError {
        message: format!("{}: {}", manifest_path.display(), e.message),
    })?;

    resolved.project_root = manifest_path
        .parent()
        .ok_or_else(|| ManifestError {
            message: "manifest has no parent directory".to_string(),
        })?
        .to_path_buf();
    resolved.manifest_path = Some(manifest_path);
    Ok(resolved)
}

/// Parses manifest text; paths are filled in by the caller.
pub fn parse_manifest(raw: &str) -> Result<ResolvedManifest, ManifestError> {
    let parsed: Manifest = toml::from_str(raw).map_err(|e| ManifestError {
        message: format!("failed to parse: {e}"),
    })?;
    if parsed.analysis.jobs == Some(0) {
        return Err(ManifestError {
            message: "`analysis.jobs` must be at least 1".to_string(),
        });
    }
    Ok(ResolvedManifest {
        manifest_path: None,
        project_root: PathBuf::new(),
        name: parsed.project.and_then(|p| p.name),
        analysis: parsed.analysis,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_project_and_analysis_tables() {
        let m = parse_manifest(
            r#"
[project]
name = "demo"

[analysis]
parallel = false
jobs = 4
max-diagnostics = 20
"#,
        )
        .expect("valid manifest");
        assert_eq!(m.name.as_deref(), Some("demo"));
        assert_eq!(
            m.analysis,
            AnalysisSettings {
                parallel: Some(false),
                jobs: Some(4),
                max_diagnostics: Some(20),
            }
        );
    }

    #[test]
    fn empty_manifest_uses_defaults() {
        let m = parse_manifest("").expect("valid manifest");
        assert_eq!(m.name, None);
        assert_eq!(m.analysis, AnalysisSettings::default());
    }

    #[test]
    fn unknown_analysis_key_is_rejected() {
        let err = parse_manifest("[analysis]\nthreads = 2\n").expect_err("unknown key");
        assert!(err.message.contains("threads"), "unexpected error: {}", err.message);
    }

    #[test]
    fn zero_jobs_is_rejected() {
        let err = parse_manifest("[analysis]\njobs = 0\n").expect_err("zero jobs");
        assert!(err.message.contains("jobs"), "unexpected error: {}", err.message);
    }

    #[test]
    fn manifest_is_discovered_upward() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join(MANIFEST_NAME),
            "[project]\nname = \"outer\"\n",
        )
        .expect("write manifest");
        let nested = dir.path().join("src").join("deep");
        fs::create_dir_all(&nested).expect("mkdir");
        let input = nested.join("main.json");
        fs::write(&input, "{}").expect("write input");

        let m = load_resolved_manifest(&input).expect("manifest loads");
        assert_eq!(m.name.as_deref(), Some("outer"));
        assert_eq!(m.manifest_path, Some(dir.path().join(MANIFEST_NAME)));
        assert_eq!(m.project_root, dir.path().to_path_buf());
    }

    #[test]
    fn missing_manifest_is_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let m = load_resolved_manifest(dir.path()).expect("no manifest is fine");
        // A manifest may still exist above the temp dir; only check the root
        // when none was found.
        if m.manifest_path.is_none() {
            assert_eq!(m.project_root, dir.path().to_path_buf());
        }
    }
}
