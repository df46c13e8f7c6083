//! Line-oriented reStructuredText scanner for image references.
//!
//! Only the parts of reStructuredText that can carry an image URI are
//! recognized:
//!
//! ```rst
//! .. image:: /_static/cat.png
//!    :width: 200px
//!
//! .. figure:: _static/diagram.png
//!
//!    Caption text.
//!
//! .. |logo| image:: /_static/logo.png
//! ```
//!
//! Directive markers are matched at any indentation, so images nested inside
//! admonitions or list items are found. A URI may continue on the following
//! indented lines; the pieces are joined without whitespace, which is how
//! docutils treats a wrapped URI argument.
//!
//! Indented bodies that docutils would not parse as markup are skipped:
//! literal blocks introduced by a paragraph ending in `::`, the bodies of
//! code directives (`code-block`, `code`, `sourcecode`, `literalinclude`,
//! `highlight`, `parsed-literal`), and comments. That keeps tutorials that
//! *show* an image directive inside a code sample from being rewritten.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("line {line}: {directive} directive has no image URI")]
    MissingUri { line: usize, directive: String },
}

/// Which construct an image reference came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Image,
    Figure,
    Substitution,
}

/// An image URI found in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// The URI exactly as written (continuation lines joined).
    pub uri: String,
    /// 1-based line of the directive marker.
    pub line: usize,
    pub kind: ImageKind,
}

const LITERAL_DIRECTIVES: &[&str] = &[
    "code-block",
    "code",
    "sourcecode",
    "literalinclude",
    "highlight",
    "parsed-literal",
];

/// An explicit markup line (`.. something`), split into its parts.
enum Markup<'a> {
    /// `.. name:: argument`
    Directive { name: &'a str, argument: &'a str },
    /// `.. |sub| name:: argument`
    Substitution { name: &'a str, argument: &'a str },
    /// Anything else after `.. `: comments, targets, footnotes.
    Other { comment: bool },
}

fn indent_of(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ' || *c == '\t').count()
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Parse `name:: argument` into its parts.
fn split_directive(rest: &str) -> Option<(&str, &str)> {
    let pos = rest.find("::")?;
    let name = rest[..pos].trim();
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | ':' | '.' | '+'))
    {
        return None;
    }
    Some((name, rest[pos + 2..].trim()))
}

fn classify_markup(trimmed: &str) -> Option<Markup<'_>> {
    let rest = trimmed.strip_prefix("..")?;
    if !(rest.is_empty() || rest.starts_with(' ')) {
        return None;
    }
    let rest = rest.trim_start();

    if let Some(after_bar) = rest.strip_prefix('|')
        && let Some(end) = after_bar.find('|')
    {
        let after_sub = after_bar[end + 1..].trim_start();
        if let Some((name, argument)) = split_directive(after_sub) {
            return Some(Markup::Substitution { name, argument });
        }
        return Some(Markup::Other { comment: false });
    }

    if let Some((name, argument)) = split_directive(rest) {
        return Some(Markup::Directive { name, argument });
    }

    // `.. _target:`, `.. [1]` and `.. [#]` are not comments; everything else is.
    let comment = !(rest.starts_with('_') || rest.starts_with('['));
    Some(Markup::Other { comment })
}

/// Collect the URI argument of an image directive starting at `lines[idx]`.
///
/// Continuation lines are the indented, non-option lines directly after the
/// marker, up to the first blank line.
fn collect_uri(lines: &[&str], idx: usize, marker_indent: usize, first: &str) -> String {
    let mut uri = first.to_string();
    for line in &lines[idx + 1..] {
        if is_blank(line) || indent_of(line) <= marker_indent {
            break;
        }
        let piece = line.trim();
        if piece.starts_with(':') {
            break;
        }
        uri.push_str(piece);
    }
    uri
}

/// Scan reStructuredText source and return every image reference in
/// document order. Duplicates are kept.
pub fn parse_images(source: &str) -> Result<Vec<ImageRef>, ParseError> {
    let lines: Vec<&str> = source.lines().collect();
    let mut images = Vec::new();
    // While set, lines indented deeper than this belong to a skipped body.
    let mut skip_deeper_than: Option<usize> = None;

    for (idx, line) in lines.iter().enumerate() {
        if is_blank(line) {
            continue;
        }
        let indent = indent_of(line);

        if let Some(limit) = skip_deeper_than {
            if indent > limit {
                continue;
            }
            skip_deeper_than = None;
        }

        let trimmed = line.trim();
        match classify_markup(trimmed) {
            Some(Markup::Directive { name, argument }) => {
                let kind = match name {
                    "image" => Some(ImageKind::Image),
                    "figure" => Some(ImageKind::Figure),
                    _ => None,
                };
                if let Some(kind) = kind {
                    let uri = collect_uri(&lines, idx, indent, argument);
                    if uri.is_empty() {
                        return Err(ParseError::MissingUri {
                            line: idx + 1,
                            directive: name.to_string(),
                        });
                    }
                    images.push(ImageRef {
                        uri,
                        line: idx + 1,
                        kind,
                    });
                } else if LITERAL_DIRECTIVES.contains(&name) {
                    skip_deeper_than = Some(indent);
                }
            }
            Some(Markup::Substitution { name, argument }) => {
                if name == "image" {
                    let uri = collect_uri(&lines, idx, indent, argument);
                    if uri.is_empty() {
                        return Err(ParseError::MissingUri {
                            line: idx + 1,
                            directive: "substitution image".to_string(),
                        });
                    }
                    images.push(ImageRef {
                        uri,
                        line: idx + 1,
                        kind: ImageKind::Substitution,
                    });
                }
            }
            Some(Markup::Other { comment }) => {
                if comment {
                    skip_deeper_than = Some(indent);
                }
            }
            None => {
                // A paragraph line ending in `::` introduces a literal block.
                if trimmed.ends_with("::") {
                    skip_deeper_than = Some(indent);
                }
            }
        }
    }

    Ok(images)
}

/// Convenience: only the URIs, in document order.
pub fn image_uris(source: &str) -> Result<Vec<String>, ParseError> {
    Ok(parse_images(source)?.into_iter().map(|r| r.uri).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_image_and_figure() {
        let src = "\
Title
=====

.. image:: /_static/cat.png
   :width: 200px

.. figure:: _static/dog.png

   A dog.
";
        let refs = parse_images(src).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].uri, "/_static/cat.png");
        assert_eq!(refs[0].line, 4);
        assert_eq!(refs[0].kind, ImageKind::Image);
        assert_eq!(refs[1].uri, "_static/dog.png");
        assert_eq!(refs[1].kind, ImageKind::Figure);
    }

    #[test]
    fn keeps_duplicates_in_order() {
        let src = ".. image:: a.png\n\n.. image:: b.png\n\n.. image:: a.png\n";
        assert_eq!(image_uris(src).unwrap(), vec!["a.png", "b.png", "a.png"]);
    }

    #[test]
    fn finds_substitution_images() {
        let src = "Logo |logo| here.\n\n.. |logo| image:: /_static/logo.png\n";
        let refs = parse_images(src).unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].uri, "/_static/logo.png");
        assert_eq!(refs[0].kind, ImageKind::Substitution);
    }

    #[test]
    fn substitution_of_other_directive_ignored() {
        let src = ".. |today| date:: %Y\n";
        assert!(parse_images(src).unwrap().is_empty());
    }

    #[test]
    fn finds_nested_images() {
        let src = "\
.. note::

   See below.

   .. image:: /_static/nested.png
";
        assert_eq!(image_uris(src).unwrap(), vec!["/_static/nested.png"]);
    }

    #[test]
    fn joins_wrapped_uri() {
        let src = ".. image:: /_static/very/long/\n   path/cat.png\n   :alt: cat\n";
        assert_eq!(image_uris(src).unwrap(), vec!["/_static/very/long/path/cat.png"]);
    }

    #[test]
    fn uri_on_next_line() {
        let src = ".. image::\n   /_static/cat.png\n";
        assert_eq!(image_uris(src).unwrap(), vec!["/_static/cat.png"]);
    }

    #[test]
    fn missing_uri_is_error() {
        let src = "Intro\n\n.. image::\n   :width: 10px\n";
        assert_eq!(
            parse_images(src),
            Err(ParseError::MissingUri {
                line: 3,
                directive: "image".to_string()
            })
        );
    }

    #[test]
    fn skips_code_block_bodies() {
        let src = "\
Example:

.. code-block:: rst

   .. image:: /_static/example.png

.. image:: /_static/real.png
";
        assert_eq!(image_uris(src).unwrap(), vec!["/_static/real.png"]);
    }

    #[test]
    fn skips_literal_blocks() {
        let src = "\
Write this::

    .. image:: /_static/example.png

Then:

.. image:: /_static/real.png
";
        assert_eq!(image_uris(src).unwrap(), vec!["/_static/real.png"]);
    }

    #[test]
    fn skips_comments() {
        let src = "\
..
   .. image:: /_static/commented.png

.. this is a comment
   .. image:: /_static/also-commented.png

.. image:: /_static/real.png
";
        assert_eq!(image_uris(src).unwrap(), vec!["/_static/real.png"]);
    }

    #[test]
    fn targets_are_not_comments() {
        let src = "\
.. _anchor:

.. image:: /_static/after-target.png
";
        assert_eq!(image_uris(src).unwrap(), vec!["/_static/after-target.png"]);
    }

    #[test]
    fn other_directives_do_not_skip_bodies() {
        let src = "\
.. toctree::
   :maxdepth: 2

   intro

.. image:: /_static/x.png
";
        assert_eq!(image_uris(src).unwrap(), vec!["/_static/x.png"]);
    }

    #[test]
    fn empty_source_has_no_images() {
        assert!(parse_images("").unwrap().is_empty());
    }

    #[test]
    fn chinese_file_names() {
        let src = ".. image:: /_static/图片/示例.png\n";
        assert_eq!(image_uris(src).unwrap(), vec!["/_static/图片/示例.png"]);
    }
}
