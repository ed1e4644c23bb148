//! Project Introspector (spec §4.D): scores candidate project kinds from
//! markers gathered by the source parsers, infers capabilities from Python
//! imports, and digests its own inputs so the Regeneration Engine can tell
//! whether a previous plan is still valid. Grounded on the teacher's
//! `ProjectStateReport`/`canonical_state` idiom (`px-domain/src/project/state.rs`)
//! — a pure decision function plus a report struct — generalized from
//! lock/env consistency to project-kind scoring.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

use crate::capability::Authority;
use crate::import_table::union_capabilities;

/// Candidate project kinds, declared in priority order: when two kinds
/// score equally the earlier one in this list wins (spec §4.D: "ties
/// resolved by a declared priority").
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProjectKind {
    DjangoApp,
    FlaskApp,
    FastApiApp,
    PythonLibrary,
    PythonScript,
    Unknown,
}

impl ProjectKind {
    /// Declaration order doubles as tie-break priority.
    const PRIORITY: &'static [ProjectKind] = &[
        ProjectKind::DjangoApp,
        ProjectKind::FlaskApp,
        ProjectKind::FastApiApp,
        ProjectKind::PythonLibrary,
        ProjectKind::PythonScript,
        ProjectKind::Unknown,
    ];

    #[must_use]
    pub fn priority_rank(self) -> usize {
        Self::PRIORITY.iter().position(|k| *k == self).unwrap_or(usize::MAX)
    }
}

/// One marker observed in the project tree, weighted by how strongly it
/// implies a kind. Markers are summed per kind; the highest score wins.
#[derive(Clone, Copy, Debug)]
struct Marker {
    kind: ProjectKind,
    weight: u32,
}

/// Raw facts the introspector scores from — already-parsed, already-scanned
/// data, never raw file contents. Building this is the Project Scanner's
/// job (walking the tree through the source parsers in `parsers/`); scoring
/// it is this module's job.
#[derive(Clone, Debug, Default)]
pub struct ScanFacts {
    pub imported_modules: Vec<String>,
    pub pyproject_dependencies: Vec<String>,
    pub requirements_specs: Vec<String>,
    pub entrypoint_filenames: Vec<String>,
    pub build_backend: Option<String>,
    pub declared_capabilities: Vec<String>,
    pub declared_interpreter_constraint: Option<String>,
}

/// Output of the Project Introspector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectProfile {
    pub kind: String,
    pub required_capability_ids: Vec<String>,
    pub inferred_dev_tools: Vec<String>,
    pub declared_interpreter_constraint: Option<String>,
    /// Digest over every input this profile was computed from, so the
    /// Regeneration Engine can tell a rerun's inputs have not changed
    /// (feeds `Task`/`Checkpoint` invalidation, spec §4.I).
    pub input_digest: String,
}

#[must_use]
fn markers_for(facts: &ScanFacts) -> Vec<Marker> {
    let mut markers = Vec::new();
    let has_import = |name: &str| facts.imported_modules.iter().any(|m| m.eq_ignore_ascii_case(name));
    let has_dependency = |name: &str| {
        facts
            .pyproject_dependencies
            .iter()
            .chain(facts.requirements_specs.iter())
            .any(|spec| spec.to_ascii_lowercase().starts_with(&name.to_ascii_lowercase()))
    };
    let has_entrypoint = |name: &str| facts.entrypoint_filenames.iter().any(|f| f == name);

    if has_import("django") || has_dependency("django") {
        markers.push(Marker { kind: ProjectKind::DjangoApp, weight: 3 });
    }
    if has_entrypoint("manage.py") {
        markers.push(Marker { kind: ProjectKind::DjangoApp, weight: 2 });
    }
    if has_import("flask") || has_dependency("flask") {
        markers.push(Marker { kind: ProjectKind::FlaskApp, weight: 3 });
    }
    if has_entrypoint("wsgi.py") {
        markers.push(Marker { kind: ProjectKind::FlaskApp, weight: 1 });
    }
    if has_import("fastapi") || has_dependency("fastapi") {
        markers.push(Marker { kind: ProjectKind::FastApiApp, weight: 3 });
    }
    if has_entrypoint("asgi.py") {
        markers.push(Marker { kind: ProjectKind::FastApiApp, weight: 1 });
    }
    if matches!(facts.build_backend.as_deref(), Some(backend) if backend.contains("setuptools") || backend.contains("hatchling") || backend.contains("poetry") || backend.contains("flit"))
    {
        markers.push(Marker { kind: ProjectKind::PythonLibrary, weight: 2 });
    }
    if has_entrypoint("__main__.py") {
        markers.push(Marker { kind: ProjectKind::PythonScript, weight: 1 });
    }
    if markers.is_empty() {
        markers.push(Marker { kind: ProjectKind::Unknown, weight: 0 });
    }
    markers
}

fn kind_label(kind: ProjectKind) -> &'static str {
    match kind {
        ProjectKind::DjangoApp => "django-app",
        ProjectKind::FlaskApp => "flask-app",
        ProjectKind::FastApiApp => "fastapi-app",
        ProjectKind::PythonLibrary => "python-library",
        ProjectKind::PythonScript => "python-script",
        ProjectKind::Unknown => "unknown",
    }
}

/// Highest-scoring kind from accumulated marker weights, ties broken by
/// [`ProjectKind::priority_rank`] (spec §4.D).
#[must_use]
fn score_kind(facts: &ScanFacts) -> ProjectKind {
    let mut scores: std::collections::BTreeMap<ProjectKind, u32> = std::collections::BTreeMap::new();
    for marker in markers_for(facts) {
        *scores.entry(marker.kind).or_insert(0) += marker.weight;
    }
    scores
        .into_iter()
        .max_by(|(kind_a, score_a), (kind_b, score_b)| {
            score_a
                .cmp(score_b)
                .then_with(|| kind_b.priority_rank().cmp(&kind_a.priority_rank()))
        })
        .map_or(ProjectKind::Unknown, |(kind, _)| kind)
}

/// Dev tools to infer from observable project conventions: a `tool.black`/
/// `tool.ruff`/`tool.mypy` table in `pyproject.toml` implies that tool
/// belongs in the dev-tool set even if it is not a runtime dependency.
/// Kept intentionally small here; the full table lives alongside the
/// parsers that read `pyproject.toml`'s `[tool.*]` namespace.
#[must_use]
fn infer_dev_tools(facts: &ScanFacts) -> Vec<String> {
    let mut tools = BTreeSet::new();
    for dep in facts.pyproject_dependencies.iter().chain(facts.requirements_specs.iter()) {
        let lower = dep.to_ascii_lowercase();
        for tool in ["black", "ruff", "mypy", "pytest", "pre-commit", "isort"] {
            if lower.starts_with(tool) {
                tools.insert(tool.to_string());
            }
        }
    }
    tools.into_iter().collect()
}

/// Runs the Project Introspector over already-scanned facts, producing a
/// `ProjectProfile`. Capabilities inferable from dependencies/imports are
/// unioned with declared manifest capabilities but — per spec §4.D — never
/// written back to the manifest; this function is read-only.
#[must_use]
pub fn build_profile(facts: &ScanFacts) -> ProjectProfile {
    let kind = score_kind(facts);

    let imported: Vec<&str> = facts.imported_modules.iter().map(String::as_str).collect();
    let capabilities = union_capabilities(imported, &facts.declared_capabilities);
    let mut required_capability_ids: Vec<String> = capabilities
        .iter()
        .map(|(id, _authority): &(String, Authority)| id.clone())
        .collect();
    required_capability_ids.sort();
    required_capability_ids.dedup();

    let inferred_dev_tools = infer_dev_tools(facts);

    let input_digest = compute_input_digest(facts);

    ProjectProfile {
        kind: kind_label(kind).to_string(),
        required_capability_ids,
        inferred_dev_tools,
        declared_interpreter_constraint: facts.declared_interpreter_constraint.clone(),
        input_digest,
    }
}

fn compute_input_digest(facts: &ScanFacts) -> String {
    let mut hasher = Sha256::new();

    let mut imports = facts.imported_modules.clone();
    imports.sort();
    imports.dedup();
    for m in &imports {
        hasher.update(b"import:");
        hasher.update(m.as_bytes());
        hasher.update(b"\n");
    }

    for dep in &facts.pyproject_dependencies {
        hasher.update(b"pydep:");
        hasher.update(dep.as_bytes());
        hasher.update(b"\n");
    }
    for spec in &facts.requirements_specs {
        hasher.update(b"reqspec:");
        hasher.update(spec.as_bytes());
        hasher.update(b"\n");
    }

    let mut entrypoints = facts.entrypoint_filenames.clone();
    entrypoints.sort();
    for e in &entrypoints {
        hasher.update(b"entry:");
        hasher.update(e.as_bytes());
        hasher.update(b"\n");
    }

    if let Some(backend) = &facts.build_backend {
        hasher.update(b"backend:");
        hasher.update(backend.as_bytes());
        hasher.update(b"\n");
    }

    let mut declared = facts.declared_capabilities.clone();
    declared.sort();
    for cap in &declared {
        hasher.update(b"declcap:");
        hasher.update(cap.as_bytes());
        hasher.update(b"\n");
    }

    if let Some(constraint) = &facts.declared_interpreter_constraint {
        hasher.update(b"interp:");
        hasher.update(constraint.as_bytes());
    }

    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn django_marker_wins_over_library_marker() {
        let facts = ScanFacts {
            imported_modules: vec!["django".to_string()],
            build_backend: Some("setuptools.build_meta".to_string()),
            entrypoint_filenames: vec!["manage.py".to_string()],
            ..ScanFacts::default()
        };
        let profile = build_profile(&facts);
        assert_eq!(profile.kind, "django-app");
    }

    #[test]
    fn empty_facts_yield_unknown() {
        let profile = build_profile(&ScanFacts::default());
        assert_eq!(profile.kind, "unknown");
    }

    #[test]
    fn capability_inference_is_not_written_back_and_unions_with_declared() {
        let facts = ScanFacts {
            imported_modules: vec!["psycopg2".to_string()],
            declared_capabilities: vec!["gpu_cuda".to_string()],
            ..ScanFacts::default()
        };
        let profile = build_profile(&facts);
        assert_eq!(
            profile.required_capability_ids,
            vec!["gpu_cuda".to_string(), "postgresql_client".to_string()]
        );
    }

    #[test]
    fn input_digest_is_stable_and_order_independent_on_unordered_fields() {
        let mut a = ScanFacts::default();
        a.imported_modules = vec!["os".to_string(), "sys".to_string()];
        let mut b = a.clone();
        b.imported_modules.reverse();
        assert_eq!(compute_input_digest(&a), compute_input_digest(&b));
    }

    #[test]
    fn input_digest_changes_with_dependency_order_for_ordered_sections() {
        let mut a = ScanFacts::default();
        a.pyproject_dependencies = vec!["requests".to_string(), "flask".to_string()];
        let mut b = a.clone();
        b.pyproject_dependencies.reverse();
        assert_ne!(compute_input_digest(&a), compute_input_digest(&b));
    }

    #[test]
    fn infers_dev_tools_from_dependency_specs() {
        let facts = ScanFacts {
            requirements_specs: vec!["pytest==7.4".to_string(), "ruff>=0.5".to_string()],
            ..ScanFacts::default()
        };
        let profile = build_profile(&facts);
        assert_eq!(
            profile.inferred_dev_tools,
            vec!["pytest".to_string(), "ruff".to_string()]
        );
    }
}
