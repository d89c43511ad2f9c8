//! Manifest model and parser.
//!
//! Manifests are the line-oriented dependency files served by the proxy
//! (`/@v/<version>.mod`): a `module` line, an optional language-version
//! line, and `require`/`exclude`/`replace` directives in single-line or
//! block form. The parser is lenient about directives it does not know
//! (they are skipped) but strict about the arity of the ones it extracts.

use thiserror::Error;

use crate::corpus::{DependencyEdge, ModuleCoordinate, ReplaceDirective};

/// Parsed manifest contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    /// Declared module path, when present.
    pub module_path: Option<String>,
    /// Declared language version, when present.
    pub language_version: Option<String>,
    /// Requirement edges.
    pub requires: Vec<DependencyEdge>,
    /// Excluded coordinates.
    pub excludes: Vec<ModuleCoordinate>,
    /// Replace directives.
    pub replaces: Vec<ReplaceDirective>,
}

/// Errors raised while parsing a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// A directive line did not have the expected shape.
    #[error("malformed {directive} directive on line {line}: {text:?}")]
    Malformed {
        /// Directive being parsed.
        directive: &'static str,
        /// 1-based line number.
        line: usize,
        /// The offending line, comment stripped.
        text: String,
    },

    /// The input ended inside an open directive block.
    #[error("unclosed {directive} block")]
    UnclosedBlock {
        /// Directive whose block was never closed.
        directive: &'static str,
    },
}

/// Directive blocks that can span multiple lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Require,
    Exclude,
    Replace,
    Retract,
}

impl Block {
    fn name(self) -> &'static str {
        match self {
            Self::Require => "require",
            Self::Exclude => "exclude",
            Self::Replace => "replace",
            Self::Retract => "retract",
        }
    }
}

/// Parses manifest text into a [`Manifest`].
///
/// # Errors
///
/// Returns [`ManifestError`] when a known directive is malformed or a
/// block is left unclosed. Unknown directives are skipped.
pub fn parse_manifest(input: &str) -> Result<Manifest, ManifestError> {
    let mut manifest = Manifest::default();
    let mut block: Option<Block> = None;

    for (idx, raw_line) in input.lines().enumerate() {
        let line_no = idx + 1;
        let (line, comment) = split_comment(raw_line);
        let tokens = tokenize(line);
        if tokens.is_empty() {
            continue;
        }

        if let Some(open) = block {
            if tokens[0] == ")" {
                block = None;
                continue;
            }
            parse_block_item(&mut manifest, open, &tokens, comment, line_no, line)?;
            continue;
        }

        match tokens[0].as_str() {
            "module" if tokens.len() == 2 => {
                manifest.module_path = Some(tokens[1].clone());
            }
            "go" if tokens.len() == 2 => {
                manifest.language_version = Some(tokens[1].clone());
            }
            "require" | "exclude" | "replace" | "retract" => {
                let directive = match tokens[0].as_str() {
                    "require" => Block::Require,
                    "exclude" => Block::Exclude,
                    "replace" => Block::Replace,
                    _ => Block::Retract,
                };
                if tokens.len() == 2 && tokens[1] == "(" {
                    block = Some(directive);
                } else {
                    parse_block_item(
                        &mut manifest,
                        directive,
                        &tokens[1..],
                        comment,
                        line_no,
                        line,
                    )?;
                }
            }
            // toolchain, tool, godebug, and anything newer: skipped.
            _ => {}
        }
    }

    if let Some(open) = block {
        return Err(ManifestError::UnclosedBlock {
            directive: open.name(),
        });
    }

    Ok(manifest)
}

/// Parses one item belonging to `directive` (inline or inside a block).
fn parse_block_item(
    manifest: &mut Manifest,
    directive: Block,
    tokens: &[String],
    comment: Option<&str>,
    line_no: usize,
    line: &str,
) -> Result<(), ManifestError> {
    let malformed = || ManifestError::Malformed {
        directive: directive.name(),
        line: line_no,
        text: line.trim().to_string(),
    };

    match directive {
        Block::Require => {
            let [module, version] = tokens else {
                return Err(malformed());
            };
            let indirect = comment.is_some_and(|c| c.trim() == "indirect");
            manifest.requires.push(DependencyEdge {
                module: module.clone(),
                version: version.clone(),
                indirect,
            });
        }
        Block::Exclude => {
            let [module, version] = tokens else {
                return Err(malformed());
            };
            manifest
                .excludes
                .push(ModuleCoordinate::new(module.clone(), version.clone()));
        }
        Block::Replace => {
            let arrow = tokens
                .iter()
                .position(|t| t == "=>")
                .ok_or_else(malformed)?;
            let old = coordinate_from(&tokens[..arrow]).ok_or_else(malformed)?;
            let new = coordinate_from(&tokens[arrow + 1..]).ok_or_else(malformed)?;
            manifest.replaces.push(ReplaceDirective { old, new });
        }
        Block::Retract => {
            // Retractions carry no metadata we keep.
        }
    }
    Ok(())
}

/// Builds a coordinate from one (path only) or two (path, version) tokens.
fn coordinate_from(tokens: &[String]) -> Option<ModuleCoordinate> {
    match tokens {
        [module] => Some(ModuleCoordinate::new(module.clone(), "")),
        [module, version] => Some(ModuleCoordinate::new(module.clone(), version.clone())),
        _ => None,
    }
}

/// Splits a line at the first `//` outside a quoted string.
///
/// Returns the code part and the comment text (without the `//`).
fn split_comment(line: &str) -> (&str, Option<&str>) {
    let bytes = line.as_bytes();
    let mut in_quotes = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => in_quotes = !in_quotes,
            b'/' if !in_quotes && i + 1 < bytes.len() && bytes[i + 1] == b'/' => {
                return (&line[..i], Some(&line[i + 2..]));
            }
            _ => {}
        }
        i += 1;
    }
    (line, None)
}

/// Splits a line into whitespace-separated tokens, unquoting `"…"` tokens.
fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace()
        .map(|tok| {
            tok.strip_prefix('"')
                .and_then(|t| t.strip_suffix('"'))
                .unwrap_or(tok)
                .to_string()
        })
        .collect()
}
