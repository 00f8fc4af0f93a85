//! Bundler configuration (rollup.config.mjs) reading
//!
//! Module bundler configs call a shared helper with an object literal of
//! named targets:
//!
//! ```js
//! export default rollupProject({
//!   main: { name: 'LichessAnalyse', input: 'src/main.ts', output: 'analysisBoard' },
//!   study: { input: '../study/src/main.ts', output: 'study' },
//! });
//! ```
//!
//! Only target names, inputs and outputs are extracted. Everything nested
//! deeper (plugin lists, callbacks) is skipped without being interpreted.

use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::config::defaults;
use crate::core::manifest::module_name;
use crate::error::ManifestError;

/// One named bundler target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleTarget {
    /// Module whose config declares the target
    pub owner: String,
    /// Target key in the config object
    pub key: String,
    /// Output bundle name
    pub output_id: String,
    /// Input paths, relative to the owner's directory
    pub inputs: Vec<PathBuf>,
}

/// Reads bundler targets from module directories
pub trait BundleConfigReader: Send + Sync {
    /// Read all targets declared in `dir` (empty when there is no config)
    fn read(&self, dir: &Path) -> Result<Vec<BundleTarget>, ManifestError>;
}

/// [`BundleConfigReader`] for `rollup.config.mjs`
#[derive(Debug, Default, Clone, Copy)]
pub struct RollupConfigReader;

fn project_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)rollupProject\(\s*\{").expect("valid regex"))
}

fn target_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(\w+|'[^']*'|"[^"]*")\s*:\s*\{"#).expect("valid regex")
    })
}

fn field_re(field: &str) -> Regex {
    Regex::new(&format!(r"\b{field}\s*:\s*")).expect("valid regex")
}

fn quoted_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"'([^']*)'|"([^"]*)"|`([^`]*)`"#).expect("valid regex"))
}

impl RollupConfigReader {
    /// Parse config text belonging to module `owner`
    pub fn parse(owner: &str, path: &Path, content: &str) -> Result<Vec<BundleTarget>, ManifestError> {
        let Some(call) = project_call_re().find(content) else {
            tracing::debug!("No rollupProject call in {}", path.display());
            return Ok(Vec::new());
        };

        let open = call.end() - 1;
        let Some(close) = closing_bracket(&content[open + 1..]) else {
            return Err(ManifestError::Parse {
                path: path.to_path_buf(),
                error: "unbalanced braces in rollupProject call".to_string(),
            });
        };
        let body = &content[open + 1..open + 1 + close];
        let flat_body = flatten_nested(body);

        let mut targets = Vec::new();
        for caps in target_key_re().captures_iter(&flat_body) {
            let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let key = key.as_str().trim_matches(|c| c == '\'' || c == '"').to_string();
            let inner_start = whole.end();
            let Some(inner_len) = flat_body[inner_start..].find('}') else {
                continue;
            };
            let inner = &body[inner_start..inner_start + inner_len];
            targets.push(parse_target(owner, &key, path, inner)?);
        }

        Ok(targets)
    }
}

fn parse_target(
    owner: &str,
    key: &str,
    path: &Path,
    inner: &str,
) -> Result<BundleTarget, ManifestError> {
    let flat = flatten_nested(inner);

    let output_id = field_value(inner, &flat, "output")
        .and_then(|values| values.into_iter().next())
        .ok_or_else(|| ManifestError::MissingField {
            path: path.to_path_buf(),
            target: key.to_string(),
            field: "output".to_string(),
        })?;

    let inputs = field_value(inner, &flat, "input")
        .unwrap_or_default()
        .into_iter()
        .map(PathBuf::from)
        .collect();

    Ok(BundleTarget {
        owner: owner.to_string(),
        key: key.to_string(),
        output_id,
        inputs,
    })
}

/// Quoted string(s) assigned to `field` at the top level of `original`
fn field_value(original: &str, flat: &str, field: &str) -> Option<Vec<String>> {
    let found = field_re(field).find(flat)?;
    let rest = &original[found.end()..];

    let value = if rest.starts_with('[') {
        let end = rest.find(']')?;
        &rest[1..end]
    } else {
        let end = rest.find([',', '\n', '}']).unwrap_or(rest.len());
        &rest[..end]
    };

    let values: Vec<String> = quoted_re()
        .captures_iter(value)
        .filter_map(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())
        })
        .collect();

    (!values.is_empty()).then_some(values)
}

/// Offset of the bracket closing the group `text` starts inside of
fn closing_bracket(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '{' | '[' | '(' => depth += 1,
            '}' | ']' | ')' => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            _ => {}
        }
    }

    None
}

/// Blank out everything nested inside brackets, keeping byte offsets
///
/// The bracket characters that open and close a top-level group are kept so
/// callers can still find group boundaries. Quoted text at the top level is
/// kept verbatim.
fn flatten_nested(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in text.chars() {
        let keep = match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                depth == 0
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    depth == 0
                }
                '{' | '[' | '(' => {
                    depth += 1;
                    depth == 1
                }
                '}' | ']' | ')' => {
                    let keep = depth <= 1;
                    depth = depth.saturating_sub(1);
                    keep
                }
                _ => depth == 0,
            },
        };

        if keep {
            out.push(c);
        } else {
            out.extend(std::iter::repeat(' ').take(c.len_utf8()));
        }
    }

    out
}

impl BundleConfigReader for RollupConfigReader {
    fn read(&self, dir: &Path) -> Result<Vec<BundleTarget>, ManifestError> {
        let path = dir.join(defaults::BUNDLE_CONFIG_FILE);
        if !path.is_file() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path).map_err(|e| ManifestError::Read {
            path: path.clone(),
            error: e.to_string(),
        })?;

        Self::parse(&module_name(dir), &path, &content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANALYSE_CONFIG: &str = r"
import { rollupProject } from '@build/rollupProject';
import copy from 'rollup-plugin-copy';

export default rollupProject({
  main: {
    name: 'LichessAnalyse',
    input: 'src/main.ts',
    output: 'analysisBoard',
    plugins: [
      copy({ targets: [{ src: 'x', dest: 'y', output: 'nope' }] }),
    ],
  },
  study: {
    input: ['../study/src/main.ts', 'src/study.ts'],
    output: 'study',
  },
});
";

    fn parse(content: &str) -> Result<Vec<BundleTarget>, ManifestError> {
        RollupConfigReader::parse("analyse", Path::new("analyse/rollup.config.mjs"), content)
    }

    #[test]
    fn test_parses_targets_in_order() {
        let targets = parse(ANALYSE_CONFIG).unwrap();

        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].key, "main");
        assert_eq!(targets[0].output_id, "analysisBoard");
        assert_eq!(targets[0].inputs, vec![PathBuf::from("src/main.ts")]);
        assert_eq!(targets[1].key, "study");
        assert_eq!(
            targets[1].inputs,
            vec![PathBuf::from("../study/src/main.ts"), PathBuf::from("src/study.ts")]
        );
        assert!(targets.iter().all(|t| t.owner == "analyse"));
    }

    #[test]
    fn test_nested_plugin_keys_are_ignored() {
        let targets = parse(ANALYSE_CONFIG).unwrap();
        assert!(targets.iter().all(|t| t.output_id != "nope"));
    }

    #[test]
    fn test_config_without_project_call_has_no_targets() {
        assert!(parse("export default { input: 'a.ts' };").unwrap().is_empty());
    }

    #[test]
    fn test_target_without_output_is_an_error() {
        let err = parse("rollupProject({ main: { input: 'src/main.ts' } });").unwrap_err();
        assert!(matches!(err, ManifestError::MissingField { ref field, .. } if field == "output"));
    }

    #[test]
    fn test_unbalanced_call_is_an_error() {
        assert!(parse("rollupProject({ main: { input: 'a' ").is_err());
    }

    #[test]
    fn test_flatten_keeps_offsets() {
        let text = "a: { b: 'é' }, c";
        let flat = flatten_nested(text);
        assert_eq!(flat.len(), text.len());
        assert!(flat.starts_with("a: {"));
        assert!(flat.ends_with("}, c"));
    }
}
