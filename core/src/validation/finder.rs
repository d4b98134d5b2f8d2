//! # Operation Finder
//!
//! Matches a request method and path against the path templates of a
//! specification.
//!
//! Matching is exact per segment. A segment is a literal, a single
//! `{placeholder}`, or a mix of both (`{name}.{ext}`) compiled to an
//! anchored regex. Templates are tried from the most specific one: at each
//! position left to right a literal beats a mixed segment, which beats a
//! bare placeholder.

use crate::error::{AppError, AppResult};
use crate::oas::models::{OperationSpec, Specification};
use crate::validation::errors::{ErrorKind, Location, ValidationError};
use indexmap::IndexMap;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Param(String),
    Mixed { pattern: Regex, names: Vec<String> },
}

impl Segment {
    fn rank(&self) -> u8 {
        match self {
            Segment::Literal(_) => 0,
            Segment::Mixed { .. } => 1,
            Segment::Param(_) => 2,
        }
    }
}

/// A compiled path template such as `/pets/{id}`.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    template: String,
    segments: Vec<Segment>,
}

fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

impl PathTemplate {
    /// Compiles `template`; placeholder names must be unique.
    pub fn parse(template: &str) -> AppResult<Self> {
        let placeholder = Regex::new(r"\{([^}/]+)\}")?;
        let mut seen = HashSet::new();
        let mut segments = Vec::new();

        for raw in split_path(template) {
            let names: Vec<String> = placeholder
                .captures_iter(raw)
                .map(|cap| cap[1].to_string())
                .collect();
            for name in &names {
                if !seen.insert(name.clone()) {
                    return Err(AppError::General(format!(
                        "Path template '{}' contains duplicate path parameter '{}'",
                        template, name
                    )));
                }
            }

            let segment = match names.as_slice() {
                [] => Segment::Literal(raw.to_string()),
                [name] if raw == format!("{{{}}}", name) => Segment::Param(name.clone()),
                _ => {
                    let mut pattern = String::from("^");
                    let mut last = 0;
                    for m in placeholder.find_iter(raw) {
                        pattern.push_str(&regex::escape(&raw[last..m.start()]));
                        pattern.push_str("(.+?)");
                        last = m.end();
                    }
                    pattern.push_str(&regex::escape(&raw[last..]));
                    pattern.push('$');
                    Segment::Mixed {
                        pattern: Regex::new(&pattern)?,
                        names,
                    }
                }
            };
            segments.push(segment);
        }

        Ok(Self {
            template: template.to_string(),
            segments,
        })
    }

    /// The template text.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Captures raw (still percent-encoded) placeholder values when `path`
    /// matches.
    pub fn matches(&self, path: &str) -> Option<IndexMap<String, String>> {
        let parts = split_path(path);
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut captures = IndexMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) => {
                    if literal != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    if part.is_empty() {
                        return None;
                    }
                    captures.insert(name.clone(), part.to_string());
                }
                Segment::Mixed { pattern, names } => {
                    let caps = pattern.captures(part)?;
                    for (index, name) in names.iter().enumerate() {
                        captures.insert(name.clone(), caps.get(index + 1)?.as_str().to_string());
                    }
                }
            }
        }
        Some(captures)
    }

    fn specificity_cmp(&self, other: &Self) -> Ordering {
        let left = self.segments.iter().map(Segment::rank);
        let right = other.segments.iter().map(Segment::rank);
        left.cmp(right)
    }
}

/// A matched operation with its raw path captures.
#[derive(Debug, Clone)]
pub struct OperationMatch<'a> {
    /// The operation.
    pub operation: &'a OperationSpec,
    /// Placeholder name to raw captured text.
    pub path_params: IndexMap<String, String>,
}

/// Finds operations of a shared specification.
#[derive(Debug, Clone)]
pub struct OperationFinder {
    spec: Arc<Specification>,
    /// Templates in match order with the indices of their operations.
    routes: Vec<(PathTemplate, Vec<usize>)>,
}

impl OperationFinder {
    /// Compiles every path template of `spec`.
    pub fn new(spec: Arc<Specification>) -> AppResult<Self> {
        let mut routes: Vec<(PathTemplate, Vec<usize>)> = Vec::new();
        for (index, operation) in spec.operations.iter().enumerate() {
            match routes
                .iter_mut()
                .find(|(template, _)| template.as_str() == operation.path_template)
            {
                Some((_, indices)) => indices.push(index),
                None => routes.push((PathTemplate::parse(&operation.path_template)?, vec![index])),
            }
        }
        routes.sort_by(|(a, _), (b, _)| a.specificity_cmp(b));
        Ok(Self { spec, routes })
    }

    /// The specification operations are found in.
    pub fn specification(&self) -> &Arc<Specification> {
        &self.spec
    }

    /// Finds the operation for `method` and `path`.
    ///
    /// Fails with `PathNotFound` when no template matches and with
    /// `OperationNotAllowed` when templates match but none declares the
    /// method.
    pub fn find(&self, method: &str, path: &str) -> Result<OperationMatch<'_>, ValidationError> {
        let method = method.to_ascii_uppercase();
        let mut path_matched = false;

        for candidate in self.candidate_paths(path) {
            for (template, indices) in &self.routes {
                let Some(path_params) = template.matches(candidate) else {
                    continue;
                };
                path_matched = true;
                let found = indices
                    .iter()
                    .map(|i| &self.spec.operations[*i])
                    .find(|op| op.method == method);
                if let Some(operation) = found {
                    return Ok(OperationMatch {
                        operation,
                        path_params,
                    });
                }
            }
        }

        let (kind, message) = if path_matched {
            (
                ErrorKind::OperationNotAllowed,
                format!("operation {} is not declared for path '{}'", method, path),
            )
        } else {
            (ErrorKind::PathNotFound, format!("path '{}' not found", path))
        };
        Err(ValidationError::new(kind, message).at(Location::Operation))
    }

    /// `path` with each matching server base path stripped, longest base
    /// first, then `path` itself.
    fn candidate_paths<'p>(&self, path: &'p str) -> Vec<&'p str> {
        let mut bases: Vec<&str> = self
            .spec
            .base_paths
            .iter()
            .map(|b| b.trim_matches('/'))
            .filter(|b| !b.is_empty())
            .collect();
        bases.sort_by_key(|b| std::cmp::Reverse(b.len()));

        let mut candidates: Vec<&'p str> = bases
            .into_iter()
            .filter_map(|base| {
                let rest = path.strip_prefix('/')?.strip_prefix(base)?;
                (rest.is_empty() || rest.starts_with('/')).then_some(rest)
            })
            .collect();
        candidates.push(path);
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn operation(method: &str, template: &str) -> OperationSpec {
        OperationSpec {
            method: method.to_string(),
            path_template: template.to_string(),
            operation_id: None,
            parameters: Vec::new(),
            request_body: None,
            responses: IndexMap::new(),
            security: Vec::new(),
        }
    }

    fn finder(ops: &[(&str, &str)], base_paths: &[&str]) -> OperationFinder {
        let spec = Specification {
            operations: ops.iter().map(|(m, t)| operation(m, t)).collect(),
            base_paths: base_paths.iter().map(|s| s.to_string()).collect(),
            ..Specification::default()
        };
        OperationFinder::new(Arc::new(spec)).unwrap()
    }

    #[test]
    fn test_placeholder_capture() {
        let finder = finder(&[("GET", "/pets/{id}")], &[]);
        let found = finder.find("get", "/pets/a%20b").unwrap();
        assert_eq!(found.operation.path_template, "/pets/{id}");
        assert_eq!(found.path_params.get("id").map(String::as_str), Some("a%20b"));
    }

    #[test]
    fn test_not_found_vs_not_allowed() {
        let finder = finder(&[("GET", "/pets/{id}")], &[]);
        let err = finder.find("POST", "/pets/1").unwrap_err();
        assert_eq!(err.kind, ErrorKind::OperationNotAllowed);
        let err = finder.find("GET", "/other/1").unwrap_err();
        assert_eq!(err.kind, ErrorKind::PathNotFound);
        let err = finder.find("GET", "/pets/1/extra").unwrap_err();
        assert_eq!(err.kind, ErrorKind::PathNotFound);
    }

    #[test]
    fn test_literal_segments_win() {
        let finder = finder(
            &[("GET", "/pets/{id}"), ("GET", "/pets/mine"), ("GET", "/{kind}/mine")],
            &[],
        );
        let found = finder.find("GET", "/pets/mine").unwrap();
        assert_eq!(found.operation.path_template, "/pets/mine");
        let found = finder.find("GET", "/pets/7").unwrap();
        assert_eq!(found.operation.path_template, "/pets/{id}");
        let found = finder.find("GET", "/cats/mine").unwrap();
        assert_eq!(found.operation.path_template, "/{kind}/mine");
    }

    #[test]
    fn test_mixed_segment() {
        let finder = finder(&[("GET", "/files/{name}.{ext}")], &[]);
        let found = finder.find("GET", "/files/report.final.pdf").unwrap();
        assert_eq!(found.path_params.get("name").map(String::as_str), Some("report"));
        assert_eq!(found.path_params.get("ext").map(String::as_str), Some("final.pdf"));
    }

    #[test]
    fn test_base_path_stripped() {
        let finder = finder(&[("GET", "/pets")], &["/api/v1"]);
        assert!(finder.find("GET", "/api/v1/pets").is_ok());
        assert!(finder.find("GET", "/pets").is_ok());
        assert!(finder.find("GET", "/api/v1x/pets").is_err());
    }

    #[test]
    fn test_duplicate_placeholder_rejected() {
        assert!(PathTemplate::parse("/a/{id}/b/{id}").is_err());
    }
}
