//! Dot/bracket field paths into a record.
//!
//! A path is a sequence of dot-separated keys, each optionally followed by
//! one or more bracketed array indices: `sections[2].content`,
//! `grid[0][1]`, `meta.author`. Resolution never creates structure; any
//! missing key or out-of-range index fails softly with
//! [`PathError::NotFound`].

use serde_json::Value;
use std::fmt;

use crate::error::PathError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => f.write_str(k),
            Segment::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// A parsed field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<Segment>,
}

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }

        let mut segments = Vec::new();
        for part in trimmed.split('.') {
            let (key, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };
            if key.is_empty() && (rest.is_empty() || !segments.is_empty()) {
                return Err(PathError::InvalidSegment(part.to_string()));
            }
            if !key.is_empty() {
                segments.push(Segment::Key(key.to_string()));
            }
            while !rest.is_empty() {
                let close = rest
                    .find(']')
                    .ok_or_else(|| PathError::InvalidSegment(part.to_string()))?;
                if !rest.starts_with('[') {
                    return Err(PathError::InvalidSegment(part.to_string()));
                }
                let index: usize = rest[1..close]
                    .trim()
                    .parse()
                    .map_err(|_| PathError::InvalidSegment(part.to_string()))?;
                segments.push(Segment::Index(index));
                rest = &rest[close + 1..];
            }
        }

        Ok(Self {
            raw: trimmed.to_string(),
            segments,
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn not_found(&self, segment: &Segment) -> PathError {
        PathError::NotFound {
            path: self.raw.clone(),
            segment: segment.to_string(),
        }
    }

    pub fn resolve<'a>(&self, root: &'a Value) -> Result<&'a Value, PathError> {
        let mut current = root;
        for segment in &self.segments {
            let next = match segment {
                Segment::Key(k) => current.as_object().and_then(|o| o.get(k)),
                Segment::Index(i) => current.as_array().and_then(|a| a.get(*i)),
            };
            current = next.ok_or_else(|| self.not_found(segment))?;
        }
        Ok(current)
    }

    pub fn resolve_mut<'a>(&self, root: &'a mut Value) -> Result<&'a mut Value, PathError> {
        let mut current = root;
        for segment in &self.segments {
            let next = match segment {
                Segment::Key(k) => current.as_object_mut().and_then(|o| o.get_mut(k)),
                Segment::Index(i) => current.as_array_mut().and_then(|a| a.get_mut(*i)),
            };
            current = match next {
                Some(v) => v,
                None => return Err(self.not_found(segment)),
            };
        }
        Ok(current)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_segments() {
        let p = FieldPath::parse("sections[2].content").unwrap();
        assert_eq!(
            p.segments(),
            &[
                Segment::Key("sections".to_string()),
                Segment::Index(2),
                Segment::Key("content".to_string())
            ]
        );

        let p = FieldPath::parse("grid[0][1]").unwrap();
        assert_eq!(p.segments().len(), 3);
    }

    #[test]
    fn test_parse_rejects_bad_paths() {
        assert_eq!(FieldPath::parse("  "), Err(PathError::Empty));
        assert!(FieldPath::parse("a..b").is_err());
        assert!(FieldPath::parse("a[x]").is_err());
        assert!(FieldPath::parse("a[1").is_err());
        assert!(FieldPath::parse("a[1]b").is_err());
    }

    #[test]
    fn test_resolve_nested() {
        let record = json!({
            "sections": [
                {"content": "zero"},
                {"content": "one"},
                {"content": "two", "meta": {"date": "2024-01-01T00:00:00+00:00"}}
            ]
        });
        let p = FieldPath::parse("sections[2].content").unwrap();
        assert_eq!(p.resolve(&record).unwrap(), &json!("two"));

        let p = FieldPath::parse("sections[2].meta.date").unwrap();
        assert_eq!(
            p.resolve(&record).unwrap(),
            &json!("2024-01-01T00:00:00+00:00")
        );
    }

    #[test]
    fn test_resolve_fails_softly() {
        let record = json!({"sections": [{"content": "only"}]});

        let err = FieldPath::parse("sections[5].content")
            .unwrap()
            .resolve(&record)
            .unwrap_err();
        assert_eq!(
            err,
            PathError::NotFound {
                path: "sections[5].content".to_string(),
                segment: "[5]".to_string()
            }
        );

        assert!(FieldPath::parse("missing.content")
            .unwrap()
            .resolve(&record)
            .is_err());
        assert!(FieldPath::parse("sections.content")
            .unwrap()
            .resolve(&record)
            .is_err());
    }

    #[test]
    fn test_resolve_mut_overwrites() {
        let mut record = json!({"sections": [{"date": "old"}]});
        let p = FieldPath::parse("sections[0].date").unwrap();
        *p.resolve_mut(&mut record).unwrap() = json!("new");
        assert_eq!(record, json!({"sections": [{"date": "new"}]}));
    }
}
