//! SVG post-processing.
//!
//! `PlantUML` returns a standalone SVG document. Before embedding it in a
//! page this module:
//! - removes `<!-- ... -->` comments (`PlantUML` puts the diagram source there)
//! - drops everything outside the `<svg>` element (XML declaration, doctype)
//! - sets `preserveAspectRatio` and a background `style` on the `<svg>` element
//!   so the diagram scales and follows the page theme

use std::string::FromUtf8Error;
use std::sync::LazyLock;

use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use regex::Regex;

use crate::consts::{BACKGROUND_STYLE, PRESERVE_ASPECT_RATIO};

static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

/// Error post-processing an SVG response.
#[derive(Debug, thiserror::Error)]
pub enum SvgError {
    #[error("no <svg> element found")]
    MissingRoot,
    #[error("<svg> element is not closed")]
    Unclosed,
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("XML attribute error: {0}")]
    Attr(#[from] AttrError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid UTF-8 in SVG: {0}")]
    Utf8(#[from] FromUtf8Error),
}

/// Remove HTML/XML comments.
#[must_use]
pub fn strip_comments(content: &str) -> String {
    COMMENT_RE.replace_all(content, "").into_owned()
}

/// Post-process a raw SVG response into embeddable markup.
///
/// # Errors
///
/// Returns [`SvgError`] if the content is not well-formed XML or contains no
/// `<svg>` element.
pub fn stylize(content: &str) -> Result<String, SvgError> {
    let cleaned = strip_comments(content);
    let mut reader = Reader::from_str(&cleaned);
    let mut writer = Writer::new(Vec::with_capacity(cleaned.len()));

    // Depth inside the <svg> element; 0 until it is found
    let mut depth = 0usize;

    loop {
        let event = reader.read_event()?;
        if depth == 0 {
            match event {
                Event::Start(start) if is_svg(&start) => {
                    writer.write_event(Event::Start(restyle(&start)?))?;
                    depth = 1;
                }
                Event::Empty(start) if is_svg(&start) => {
                    writer.write_event(Event::Empty(restyle(&start)?))?;
                    break;
                }
                Event::Eof => return Err(SvgError::MissingRoot),
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            Event::Eof => return Err(SvgError::Unclosed),
            _ => {}
        }
        writer.write_event(event)?;
        if depth == 0 {
            break;
        }
    }

    Ok(String::from_utf8(writer.into_inner())?)
}

fn is_svg(start: &BytesStart<'_>) -> bool {
    start.local_name().as_ref() == b"svg"
}

/// Copy `start` with the presentation attributes replaced or appended.
fn restyle(start: &BytesStart<'_>) -> Result<BytesStart<'static>, SvgError> {
    let mut styled = start.clone().into_owned();
    styled.clear_attributes();

    let mut has_aspect_ratio = false;
    let mut has_style = false;
    for attr in start.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"preserveAspectRatio" => {
                styled.push_attribute(("preserveAspectRatio", PRESERVE_ASPECT_RATIO));
                has_aspect_ratio = true;
            }
            b"style" => {
                styled.push_attribute(("style", BACKGROUND_STYLE));
                has_style = true;
            }
            _ => styled.push_attribute(attr),
        }
    }

    if !has_aspect_ratio {
        styled.push_attribute(("preserveAspectRatio", PRESERVE_ASPECT_RATIO));
    }
    if !has_style {
        styled.push_attribute(("style", BACKGROUND_STYLE));
    }

    Ok(styled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PLANTUML_SVG: &str = r##"<?xml version="1.0" encoding="us-ascii" standalone="no"?><svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" contentStyleType="text/css" height="121px" preserveAspectRatio="none" style="width:114px;height:121px;background:#FFFFFF;" version="1.1" viewBox="0 0 114 121" width="114px" zoomAndPan="magnify"><defs/><g><!--MD5=[3f2b1c]
@startuml
Bob -> Alice : hello
@enduml
--><line style="stroke:#181818;stroke-width:0.5;" x1="27" x2="27" y1="36.2969" y2="85.4297"/><text fill="#000000" font-size="14" x="5" y="32.9951">Bob &amp; co</text></g></svg>"##;

    #[test]
    fn test_strip_comments() {
        assert_eq!(
            strip_comments("<g><!-- one --><a/><!--\nmulti\nline\n--></g>"),
            "<g><a/></g>"
        );
    }

    #[test]
    fn test_stylize_plantuml_output() {
        let result = stylize(PLANTUML_SVG).unwrap();

        assert!(result.starts_with("<svg "), "{result}");
        assert!(result.ends_with("</svg>"));
        assert!(!result.contains("<?xml"));
        assert!(!result.contains("<!--"));
        assert!(!result.contains("@startuml"));
        assert!(result.contains(r#"preserveAspectRatio="xMidYMid meet""#));
        assert!(result.contains(r#"style="background: var(--md-default-bg-color)""#));
        assert!(!result.contains("preserveAspectRatio=\"none\""));
        assert!(result.contains(r#"viewBox="0 0 114 121""#));
        assert!(result.contains("Bob &amp; co"));
    }

    #[test]
    fn test_stylize_keeps_attribute_order() {
        let result =
            stylize(r#"<svg width="10" style="color:red" height="20"><g/></svg>"#).unwrap();
        assert_eq!(
            result,
            r#"<svg width="10" style="background: var(--md-default-bg-color)" height="20" preserveAspectRatio="xMidYMid meet"><g/></svg>"#
        );
    }

    #[test]
    fn test_stylize_empty_svg() {
        let result = stylize("<svg/>").unwrap();
        assert_eq!(
            result,
            r#"<svg preserveAspectRatio="xMidYMid meet" style="background: var(--md-default-bg-color)"/>"#
        );
    }

    #[test]
    fn test_stylize_nested_svg_element() {
        let result = stylize("<html><body><svg><svg/></svg><p>after</p></body></html>").unwrap();
        assert!(result.starts_with("<svg preserveAspectRatio"));
        assert!(result.ends_with("<svg/></svg>"));
        assert!(!result.contains("after"));
    }

    #[test]
    fn test_stylize_missing_svg() {
        let err = stylize("<html><body>Bad Request</body></html>").unwrap_err();
        assert!(matches!(err, SvgError::MissingRoot));
    }

    #[test]
    fn test_stylize_plain_text() {
        let err = stylize("not xml at all").unwrap_err();
        assert!(matches!(err, SvgError::MissingRoot));
    }

    #[test]
    fn test_stylize_unclosed_svg() {
        assert!(stylize("<svg><g></g>").is_err());
    }
}
