//! Diagnostic path tracking.
//!
//! The compile context carries a [`PathTracker`] that follows compilation
//! down and up the schema tree, so every error can point at the exact
//! location being compiled. Two segment shapes exist:
//!
//! - plain node segments, rendered `name` or `module:name` when compilation
//!   crossed a module boundary;
//! - compound tag segments, established as `{keyword}` and rewritten to
//!   `{keyword='name'}` once the concrete name is known. Removing a
//!   compound segment takes two [`pop`](PathTracker::pop) calls, mirroring
//!   its two-call construction.
//!
//! Rendering is bounded: when the joined path would exceed the configured
//! maximum, the *oldest* segments are dropped whole and the front is marked
//! with `...`. Already-pushed segments are never corrupted mid-segment.

use std::fmt;

/// Default maximum rendered path length.
pub const MAX_PATH_LEN: usize = 4078;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Node {
        module: Option<String>,
        name: String,
    },
    Tag {
        keyword: String,
    },
    TagValue {
        keyword: String,
        value: String,
    },
}

impl Segment {
    fn rendered_len(&self) -> usize {
        match self {
            Segment::Node { module, name } => {
                name.len() + module.as_ref().map_or(0, |m| m.len() + 1)
            }
            Segment::Tag { keyword } => keyword.len() + 2,
            Segment::TagValue { keyword, value } => keyword.len() + value.len() + 5,
        }
    }

    fn render_into(&self, out: &mut String) {
        match self {
            Segment::Node { module, name } => {
                if let Some(module) = module {
                    out.push_str(module);
                    out.push(':');
                }
                out.push_str(name);
            }
            Segment::Tag { keyword } => {
                out.push('{');
                out.push_str(keyword);
                out.push('}');
            }
            Segment::TagValue { keyword, value } => {
                out.push('{');
                out.push_str(keyword);
                out.push_str("='");
                out.push_str(value);
                out.push_str("'}");
            }
        }
    }
}

/// Tracks the schema location compilation is currently at.
#[derive(Debug, Clone)]
pub struct PathTracker {
    segments: Vec<Segment>,
    max_len: usize,
}

impl Default for PathTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PathTracker {
    /// Create a tracker with the default maximum rendered length.
    pub fn new() -> Self {
        Self::with_max_len(MAX_PATH_LEN)
    }

    /// Create a tracker with a custom maximum rendered length.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            segments: Vec::new(),
            max_len,
        }
    }

    /// Append a node segment.
    ///
    /// `module` carries the definition module when compilation crossed a
    /// module boundary; the rendered segment is then prefixed `module:`.
    pub fn push(&mut self, module: Option<String>, name: impl Into<String>) {
        self.segments.push(Segment::Node {
            module,
            name: name.into(),
        });
    }

    /// Append a `{keyword}` placeholder segment.
    pub fn push_tag(&mut self, keyword: impl Into<String>) {
        self.segments.push(Segment::Tag {
            keyword: keyword.into(),
        });
    }

    /// Rewrite the most recent `{keyword}` placeholder to `{keyword='value'}`.
    ///
    /// Must follow a matching [`push_tag`](Self::push_tag); the compound
    /// segment then needs two [`pop`](Self::pop) calls to remove.
    pub fn push_tag_value(&mut self, value: impl Into<String>) {
        match self.segments.pop() {
            Some(Segment::Tag { keyword }) => self.segments.push(Segment::TagValue {
                keyword,
                value: value.into(),
            }),
            Some(other) => {
                debug_assert!(false, "push_tag_value without a preceding push_tag");
                self.segments.push(other);
            }
            None => debug_assert!(false, "push_tag_value on an empty path"),
        }
    }

    /// Remove the most recent segment.
    ///
    /// A `{keyword='value'}` compound first reverts to `{keyword}`; the
    /// second call removes it.
    pub fn pop(&mut self) {
        if let Some(Segment::TagValue { keyword, .. }) = self.segments.pop() {
            self.segments.push(Segment::Tag { keyword });
        }
    }

    /// Number of segments currently tracked.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Render the path from the root.
    ///
    /// Oldest segments are dropped whole when the rendering would exceed
    /// the maximum length; a dropped prefix is marked `/...`.
    pub fn render(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }

        // Walk newest to oldest, keeping as many whole segments as fit.
        let marker_len = 4; // "/..."
        let mut budget = self.max_len;
        let mut first_kept = self.segments.len();
        for (i, segment) in self.segments.iter().enumerate().rev() {
            let needed = segment.rendered_len() + 1; // leading '/'
            let reserve = if i > 0 { marker_len } else { 0 };
            if needed + reserve > budget {
                break;
            }
            budget -= needed;
            first_kept = i;
        }

        let mut out = String::new();
        if first_kept > 0 {
            out.push_str("/...");
        }
        for segment in &self.segments[first_kept..] {
            out.push('/');
            segment.render_into(&mut out);
        }
        out
    }
}

impl fmt::Display for PathTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
