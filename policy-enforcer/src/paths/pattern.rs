//! Path pattern matching.
//!
//! Patterns are matched segment by segment: `*` matches exactly one segment,
//! a trailing `/*` matches one or more segments and `{name}` matches one
//! segment of an instance path such as `/orders/{id}`.

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchKind {
    Exact,
    Template,
    Wildcard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternMatch {
    pub kind: MatchKind,
    pub literal_segments: usize,
}

impl PatternMatch {
    /// Order matches from most to least specific.
    pub fn specificity(&self, other: &PatternMatch) -> Ordering {
        self.kind
            .cmp(&other.kind)
            .then_with(|| other.literal_segments.cmp(&self.literal_segments))
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

fn is_template(segment: &str) -> bool {
    segment.len() > 2 && segment.starts_with('{') && segment.ends_with('}')
}

pub fn match_pattern(pattern: &str, path: &str) -> Option<PatternMatch> {
    let expected = segments(pattern);
    let actual = segments(path);

    let mut wildcard = false;
    let mut template = false;
    let mut literal_segments = 0;

    for (index, segment) in expected.iter().enumerate() {
        if *segment == "*" && index == expected.len() - 1 {
            return (actual.len() > index).then_some(PatternMatch {
                kind: MatchKind::Wildcard,
                literal_segments,
            });
        }

        let candidate = actual.get(index)?;
        if *segment == "*" {
            wildcard = true;
        } else if is_template(segment) {
            template = true;
        } else if segment == candidate {
            literal_segments += 1;
        } else {
            return None;
        }
    }

    if expected.len() != actual.len() {
        return None;
    }

    let kind = if wildcard {
        MatchKind::Wildcard
    } else if template {
        MatchKind::Template
    } else {
        MatchKind::Exact
    };
    Some(PatternMatch {
        kind,
        literal_segments,
    })
}
