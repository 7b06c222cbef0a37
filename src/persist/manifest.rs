//! The manifest: a line-oriented index of a state directory.
//!
//! ```text
//! # itemgraph dump 2026-10-16T09:12:44Z
//! MODULE first
//! DATA main
//! DATA notes
//! TOPDICT 42
//! ```
//!
//! Blank lines and lines starting with `#` are comments, leading whitespace
//! is allowed, and unknown directives are skipped with a warning.

use std::fmt::Write as _;
use std::path::Path;

use chrono::{SecondsFormat, Utc};

use crate::model::ItemId;
use crate::{Error, Result};

pub const MODULE_DIRECTIVE: &str = "MODULE";
pub const DATA_DIRECTIVE: &str = "DATA";
pub const TOPDICT_DIRECTIVE: &str = "TOPDICT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Module(String),
    Data(String),
    TopDict(ItemId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub directives: Vec<Directive>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse manifest text; `path` is only used in error messages.
    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let format_error = |line: u32, message: String| Error::Format {
            path: path.to_path_buf(),
            line,
            message,
        };

        let mut directives = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let lineno = index + 1;
            let line = raw.trim_start();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
            let arg = rest.trim();
            let directive = match word {
                MODULE_DIRECTIVE => Directive::Module(arg.to_owned()),
                DATA_DIRECTIVE => Directive::Data(arg.to_owned()),
                TOPDICT_DIRECTIVE => {
                    let id = arg.parse::<u64>().ok().filter(|&id| id > 0).ok_or_else(|| {
                        format_error(
                            line!(),
                            format!("manifest line {lineno}: bad TOPDICT id {arg:?}"),
                        )
                    })?;
                    Directive::TopDict(ItemId(id))
                }
                _ => {
                    tracing::warn!(path = %path.display(), line = lineno, directive = word, "skipping unknown manifest directive");
                    continue;
                }
            };
            tracing::debug!(line = lineno, ?directive, "manifest directive");
            directives.push(directive);
        }
        Ok(Self { directives })
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.directives.iter().filter_map(|d| match d {
            Directive::Module(m) => Some(m.as_str()),
            _ => None,
        })
    }

    pub fn data(&self) -> impl Iterator<Item = &str> {
        self.directives.iter().filter_map(|d| match d {
            Directive::Data(s) => Some(s.as_str()),
            _ => None,
        })
    }

    /// The last `TOPDICT` wins.
    pub fn top(&self) -> Option<ItemId> {
        self.directives.iter().rev().find_map(|d| match d {
            Directive::TopDict(id) => Some(*id),
            _ => None,
        })
    }

    /// Manifest text, headed by a generator comment with the current UTC time.
    pub fn render(&self) -> String {
        let mut out = format!(
            "# {} dump {}\n",
            env!("CARGO_PKG_NAME"),
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        for directive in &self.directives {
            // Writing into a String cannot fail.
            let _ = match directive {
                Directive::Module(m) => writeln!(out, "{MODULE_DIRECTIVE} {m}"),
                Directive::Data(s) => writeln!(out, "{DATA_DIRECTIVE} {s}"),
                Directive::TopDict(id) => writeln!(out, "{TOPDICT_DIRECTIVE} {id}"),
            };
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Manifest> {
        Manifest::parse(Path::new("MANIFEST"), text)
    }

    #[test]
    fn test_parse_directives() {
        let m = parse("MODULE first\n  DATA s\nTOPDICT 42\n").unwrap();
        assert_eq!(
            m.directives,
            vec![
                Directive::Module("first".into()),
                Directive::Data("s".into()),
                Directive::TopDict(ItemId(42)),
            ]
        );
        assert_eq!(m.modules().collect::<Vec<_>>(), vec!["first"]);
        assert_eq!(m.data().collect::<Vec<_>>(), vec!["s"]);
        assert_eq!(m.top(), Some(ItemId(42)));
    }

    #[test]
    fn test_comments_blank_and_unknown_lines_skipped() {
        let m = parse("# header\n\n   \n  # indented comment\nFROB x\nmodule lower\nDATA s\n").unwrap();
        assert_eq!(m.directives, vec![Directive::Data("s".into())]);
    }

    #[test]
    fn test_bad_topdict() {
        for text in ["TOPDICT\n", "TOPDICT abc\n", "TOPDICT 0\n", "TOPDICT -3\n"] {
            let err = parse(text).unwrap_err();
            assert!(matches!(err, Error::Format { .. }), "{text:?}: {err}");
        }
    }

    #[test]
    fn test_render_then_parse() {
        let mut m = Manifest::new();
        m.directives.push(Directive::Module("first".into()));
        m.directives.push(Directive::Data("a".into()));
        m.directives.push(Directive::TopDict(ItemId(7)));
        let text = m.render();
        assert!(text.starts_with("# itemgraph dump "));
        assert_eq!(parse(&text).unwrap(), m);
    }
}
