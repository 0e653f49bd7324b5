use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;

use crate::error::{IndexError, Result};

pub mod table;

/// Line that opens and closes a frontmatter block
pub const DELIMITER: &str = "---";

/// Untyped frontmatter: YAML keys mapped to JSON-compatible values
pub type Metadata = serde_json::Map<String, Value>;

const SUMMARY_MAX_CHARS: usize = 200;

/// A markdown document split into typed frontmatter and body text
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFile<T> {
    pub metadata: T,
    pub body: String,
    /// Identifier derived from the file path, empty when parsed from a bare string
    pub id: String,
}

impl<T> ParsedFile<T> {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

enum Split<'a> {
    Absent,
    Unclosed,
    Block { yaml: &'a str, body: &'a str },
}

fn trim_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

fn split_frontmatter(content: &str) -> Split<'_> {
    let mut lines = content.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return Split::Absent;
    };
    if trim_line_ending(first) != DELIMITER {
        return Split::Absent;
    }

    let yaml_start = first.len();
    let mut offset = yaml_start;
    for line in lines {
        let line_start = offset;
        offset += line.len();
        if trim_line_ending(line) == DELIMITER {
            return Split::Block {
                yaml: &content[yaml_start..line_start],
                body: &content[offset..],
            };
        }
    }
    Split::Unclosed
}

fn parse_with_path<T>(content: &str, path: Option<&Path>) -> Result<ParsedFile<T>>
where
    T: DeserializeOwned + Default,
{
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    match split_frontmatter(content) {
        Split::Absent => Ok(ParsedFile {
            metadata: T::default(),
            body: content.to_string(),
            id: String::new(),
        }),
        Split::Unclosed => Err(IndexError::MalformedFrontmatter {
            path: path.map(Path::to_path_buf),
        }),
        Split::Block { yaml, body } => {
            let metadata = if yaml.trim().is_empty() {
                T::default()
            } else {
                serde_yaml::from_str(yaml).map_err(|source| IndexError::YamlParse {
                    path: path.map(Path::to_path_buf),
                    source,
                })?
            };
            Ok(ParsedFile {
                metadata,
                body: body.to_string(),
                id: String::new(),
            })
        }
    }
}

/// Parse a markdown document held in memory.
///
/// A document that does not start with a `---` line has no frontmatter: the
/// metadata is `T::default()` and the body is the whole input.
pub fn parse_markdown_string<T>(content: &str) -> Result<ParsedFile<T>>
where
    T: DeserializeOwned + Default,
{
    parse_with_path(content, None)
}

/// Read and parse a markdown file, deriving its id from the path
pub fn parse_markdown_file<T>(file_path: impl AsRef<Path>) -> Result<ParsedFile<T>>
where
    T: DeserializeOwned + Default,
{
    let file_path = file_path.as_ref();
    let content = std::fs::read_to_string(file_path).map_err(|source| IndexError::Io {
        path: file_path.to_path_buf(),
        source,
    })?;
    let parsed = parse_with_path(&content, Some(file_path))?;
    Ok(parsed.with_id(extract_id_from_path(file_path)))
}

/// Base name of the file without its extension. Never reads the file.
pub fn extract_id_from_path(file_path: impl AsRef<Path>) -> String {
    file_path
        .as_ref()
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Render a scalar metadata value as plain text
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Normalize an optional scalar-or-list metadata value into a list of strings.
///
/// Absent and null become empty, a scalar becomes a single element and a
/// list is stringified element by element in order. Null list items are dropped.
pub fn ensure_array(value: Option<&Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(value_to_string)
            .collect(),
        Some(scalar) => vec![value_to_string(scalar)],
    }
}

/// Plain text of the first paragraph of a markdown body, capped in length
pub fn summarize_body(body: &str) -> Option<String> {
    let mut summary = String::new();
    let mut in_paragraph = false;

    for event in Parser::new(body) {
        match event {
            Event::Start(Tag::Paragraph) => in_paragraph = true,
            Event::End(TagEnd::Paragraph) => {
                if !summary.trim().is_empty() {
                    break;
                }
                in_paragraph = false;
            }
            Event::Text(text) | Event::Code(text) if in_paragraph => summary.push_str(&text),
            Event::SoftBreak | Event::HardBreak if in_paragraph => summary.push(' '),
            _ => {}
        }
    }

    let summary = summary.trim();
    if summary.is_empty() {
        return None;
    }

    if summary.chars().count() > SUMMARY_MAX_CHARS {
        let truncated: String = summary.chars().take(SUMMARY_MAX_CHARS - 3).collect();
        Some(format!("{}...", truncated.trim_end()))
    } else {
        Some(summary.to_string())
    }
}
