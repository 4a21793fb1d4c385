//! Parsing and traversal of dotted catalog paths such as `app.config.objects`
//! or `scenario.steps[2].name`.

use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};
use crate::variant::{Dictionary, Variant};

/// Single step of a [`CatalogPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Dictionary key.
    Key(String),
    /// Sequence index.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => formatter.write_str(key),
            Self::Index(index) => write!(formatter, "[{index}]"),
        }
    }
}

/// Parsed catalog path. The empty path addresses the catalog root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPath {
    text: String,
    segments: Vec<PathSegment>,
}

impl CatalogPath {
    /// Parses `text`, failing with `InvalidArgument` on malformed input.
    pub fn parse(text: &str) -> Result<Self> {
        text.parse()
    }

    /// Returns true when the path addresses the root dictionary.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Parsed segments in traversal order.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Path text as supplied by the caller.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Finds the value at this path below `root`.
    ///
    /// Returns `Ok(None)` when some segment does not exist and an
    /// `InvalidArgument` error when a segment cannot apply to the value it
    /// meets.
    pub(crate) fn find<'a>(&self, root: &'a Dictionary) -> Result<Option<&'a Variant>> {
        let Some((first, rest)) = self.segments.split_first() else {
            return Err(CoreError::invalid_usage("the root path has no single value"));
        };
        let mut current = step_dictionary(root, first)?;
        for segment in rest {
            match current {
                Some(node) => current = step(node, segment)?,
                None => return Ok(None),
            }
        }
        Ok(current)
    }

    /// Stores `value` at this path, creating missing dictionaries on the way.
    pub(crate) fn assign(&self, root: &mut Dictionary, value: Variant) -> Result<()> {
        assign_in_dictionary(root, &self.segments, value)
    }

    /// Removes the value at this path, returning it when present.
    pub(crate) fn remove(&self, root: &mut Dictionary) -> Result<Option<Variant>> {
        remove_from_dictionary(root, &self.segments)
    }
}

impl fmt::Display for CatalogPath {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.text)
    }
}

impl FromStr for CatalogPath {
    type Err = CoreError;

    fn from_str(text: &str) -> Result<Self> {
        let malformed = || CoreError::invalid_argument(format!("invalid catalog path <{text}>"));
        let mut segments = Vec::new();
        if text.is_empty() {
            return Ok(Self {
                text: String::new(),
                segments,
            });
        }

        let mut chars = text.chars().peekable();
        loop {
            let mut key = String::new();
            while let Some(&next) = chars.peek() {
                if matches!(next, '.' | '[' | ']') {
                    break;
                }
                key.push(next);
                chars.next();
            }
            if !key.is_empty() {
                segments.push(PathSegment::Key(key));
            } else if !(segments.is_empty() && chars.peek() == Some(&'[')) {
                return Err(malformed());
            }

            while chars.peek() == Some(&'[') {
                chars.next();
                let mut digits = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(digit) if digit.is_ascii_digit() => digits.push(digit),
                        _ => return Err(malformed()),
                    }
                }
                let index = digits.parse::<usize>().map_err(|_| malformed())?;
                segments.push(PathSegment::Index(index));
            }

            match chars.next() {
                None => break,
                Some('.') => {}
                Some(_) => return Err(malformed()),
            }
        }

        Ok(Self {
            text: text.to_owned(),
            segments,
        })
    }
}

/// A segment that cannot address anything inside the value it meets makes
/// the whole path invalid, like a missing key does.
fn mismatched_segment(segment: &PathSegment, type_name: &str) -> CoreError {
    CoreError::invalid_argument(format!(
        "path segment <{segment}> cannot be applied to a {type_name} value"
    ))
}

fn step_dictionary<'a>(dict: &'a Dictionary, segment: &PathSegment) -> Result<Option<&'a Variant>> {
    match segment {
        PathSegment::Key(key) => Ok(dict.get(key)),
        PathSegment::Index(_) => Err(mismatched_segment(segment, "dictionary")),
    }
}

fn step<'a>(node: &'a Variant, segment: &PathSegment) -> Result<Option<&'a Variant>> {
    match (node, segment) {
        (Variant::Null, _) => Ok(None),
        (Variant::Dictionary(dict), _) => step_dictionary(dict, segment),
        (Variant::Sequence(items), PathSegment::Index(index)) => Ok(items.get(*index)),
        (other, _) => Err(mismatched_segment(segment, other.type_name())),
    }
}

fn assign_in_dictionary(dict: &mut Dictionary, segments: &[PathSegment], value: Variant) -> Result<()> {
    let Some((first, rest)) = segments.split_first() else {
        return Err(CoreError::invalid_usage("cannot assign to an empty path"));
    };
    match first {
        PathSegment::Index(_) => Err(mismatched_segment(first, "dictionary")),
        PathSegment::Key(key) if rest.is_empty() => {
            dict.insert(key.clone(), value);
            Ok(())
        }
        PathSegment::Key(key) => {
            let child = dict.entry(key.clone()).or_default();
            assign_in_node(child, rest, value)
        }
    }
}

fn assign_in_node(node: &mut Variant, segments: &[PathSegment], value: Variant) -> Result<()> {
    let Some((first, rest)) = segments.split_first() else {
        *node = value;
        return Ok(());
    };
    if node.is_null() && matches!(first, PathSegment::Key(_)) {
        *node = Variant::Dictionary(Dictionary::new());
    }
    match (node, first) {
        (Variant::Dictionary(dict), _) => assign_in_dictionary(dict, segments, value),
        (Variant::Sequence(items), PathSegment::Index(index)) => {
            let index = *index;
            let len = items.len();
            if rest.is_empty() && index == len {
                items.push(value);
                return Ok(());
            }
            let slot = items.get_mut(index).ok_or_else(|| {
                CoreError::out_of_range(format!(
                    "index [{index}] is beyond a sequence of {len} items"
                ))
            })?;
            assign_in_node(slot, rest, value)
        }
        (other, _) => Err(mismatched_segment(first, other.type_name())),
    }
}

fn remove_from_dictionary(dict: &mut Dictionary, segments: &[PathSegment]) -> Result<Option<Variant>> {
    let Some((first, rest)) = segments.split_first() else {
        return Ok(None);
    };
    match first {
        PathSegment::Index(_) => Err(mismatched_segment(first, "dictionary")),
        PathSegment::Key(key) if rest.is_empty() => Ok(dict.remove(key)),
        PathSegment::Key(key) => match dict.get_mut(key) {
            Some(child) => remove_from_node(child, rest),
            None => Ok(None),
        },
    }
}

fn remove_from_node(node: &mut Variant, segments: &[PathSegment]) -> Result<Option<Variant>> {
    let Some((first, rest)) = segments.split_first() else {
        return Ok(None);
    };
    match (node, first) {
        (Variant::Null, _) => Ok(None),
        (Variant::Dictionary(dict), _) => remove_from_dictionary(dict, segments),
        (Variant::Sequence(items), PathSegment::Index(index)) => {
            let index = *index;
            if rest.is_empty() {
                return Ok((index < items.len()).then(|| items.remove(index)));
            }
            match items.get_mut(index) {
                Some(child) => remove_from_node(child, rest),
                None => Ok(None),
            }
        }
        (other, _) => Err(mismatched_segment(first, other.type_name())),
    }
}
