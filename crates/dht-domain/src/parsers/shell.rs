use std::path::Path;

use super::{normalize_source, ParseError};

/// Shell scripts are tokenized, never executed: the Project Introspector
/// only needs to know what a setup/activation script *would* touch (spec
/// §4.C) — sourced files (hook detection), exported variables (feeds the
/// activation-script contract in §6), declared functions, and the first
/// token of each simple command (used to spot an invoked package manager
/// or dev tool that the manifest did not declare).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShellScriptRecord {
    /// Targets of `source`/`.`, in file order.
    pub sourced_files: Vec<String>,
    /// Declared function names, sorted (unordered set).
    pub function_names: Vec<String>,
    /// Names exported via `export NAME=...` or `export NAME`, sorted.
    pub exported_vars: Vec<String>,
    /// First word of each simple command line, sorted + deduped.
    pub invoked_commands: Vec<String>,
}

/// # Errors
///
/// This tokenizer never fails; [`ParseError`] is kept for signature parity
/// with the other format parsers.
pub fn parse_shell_script(_path: &Path, contents: &str) -> Result<ShellScriptRecord, ParseError> {
    let contents = normalize_source(contents);
    let mut sourced_files = Vec::new();
    let mut function_names = std::collections::BTreeSet::new();
    let mut exported_vars = std::collections::BTreeSet::new();
    let mut invoked_commands = std::collections::BTreeSet::new();

    for raw_line in contents.lines() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("source ").or_else(|| line.strip_prefix(". ")) {
            let target = rest.split_whitespace().next().unwrap_or("").trim_matches(['"', '\'']);
            if !target.is_empty() {
                sourced_files.push(target.to_string());
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("export ") {
            for decl in split_top_level_words(rest) {
                let name = decl.split('=').next().unwrap_or("").trim();
                if is_identifier(name) {
                    exported_vars.insert(name.to_string());
                }
            }
            continue;
        }

        if let Some(name) = function_declaration(line) {
            function_names.insert(name);
            continue;
        }

        if let Some(first) = line.split_whitespace().next() {
            if is_identifier_like_command(first) {
                invoked_commands.insert(first.to_string());
            }
        }
    }

    Ok(ShellScriptRecord {
        sourced_files,
        function_names: function_names.into_iter().collect(),
        exported_vars: exported_vars.into_iter().collect(),
        invoked_commands: invoked_commands.into_iter().collect(),
    })
}

fn strip_comment(line: &str) -> &str {
    let mut in_single = false;
    let mut in_double = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '#' if !in_single && !in_double => return &line[..idx],
            _ => {}
        }
    }
    line
}

fn split_top_level_words(rest: &str) -> Vec<&str> {
    rest.split_whitespace().collect()
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

fn is_identifier_like_command(word: &str) -> bool {
    !word.is_empty()
        && !word.starts_with(['$', '(', ')', '{', '}', '<', '>', '|', '&', ';'])
        && word.chars().all(|c| {
            c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')
        })
}

/// Matches `name() { ... }` and `function name { ... }` forms.
fn function_declaration(line: &str) -> Option<String> {
    if let Some(rest) = line.strip_prefix("function ") {
        let name = rest
            .split(|c: char| c.is_whitespace() || c == '(' || c == '{')
            .next()?;
        if is_identifier(name) {
            return Some(name.to_string());
        }
    }
    if let Some(idx) = line.find("()") {
        let name = line[..idx].trim();
        if is_identifier(name) {
            return Some(name.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_sourced_files_and_exports() {
        let text = "#!/bin/sh\nsource .env\nexport FOO=bar BAZ\n. ./lib/common.sh\n";
        let record = parse_shell_script(Path::new("activate.sh"), text).unwrap();
        assert_eq!(record.sourced_files, vec![".env".to_string(), "./lib/common.sh".to_string()]);
        assert_eq!(record.exported_vars, vec!["BAZ".to_string(), "FOO".to_string()]);
    }

    #[test]
    fn finds_function_declarations_both_forms() {
        let text = "function setup_env {\n  echo hi\n}\nteardown() {\n  echo bye\n}\n";
        let record = parse_shell_script(Path::new("hooks.sh"), text).unwrap();
        assert_eq!(
            record.function_names,
            vec!["setup_env".to_string(), "teardown".to_string()]
        );
    }

    #[test]
    fn collects_invoked_command_first_words() {
        let text = "pre-commit install\nnpm ci\npre-commit run --all-files\n";
        let record = parse_shell_script(Path::new("hooks.sh"), text).unwrap();
        assert_eq!(
            record.invoked_commands,
            vec!["npm".to_string(), "pre-commit".to_string()]
        );
    }

    #[test]
    fn comments_do_not_produce_commands() {
        let text = "# npm run build\necho done\n";
        let record = parse_shell_script(Path::new("hooks.sh"), text).unwrap();
        assert_eq!(record.invoked_commands, vec!["echo".to_string()]);
    }
}
