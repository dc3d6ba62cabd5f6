//! Addresses into the submitted document.
//!
//! Every patch pointer and every violation field path is built here, so the
//! template prefix and the `~0`/`~1` escaping of pointer tokens are applied
//! in one place.

use std::fmt;

use jsonptr::{PointerBuf, Token};

use crate::resource::{ContainerGroup, TemplatePath};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Object field, rendered `.name`
    Field(String),
    /// Map key such as a label, rendered `[key]`
    Key(String),
    /// Array element, rendered `[i]`
    Index(usize),
    /// JSON Patch end-of-array marker `-`
    Append,
}

/// A location in the submitted document
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Address {
    segments: Vec<Segment>,
}

impl Address {
    /// The document root
    pub fn root() -> Self {
        Self::default()
    }

    /// Pod (template) metadata for `origin`
    pub fn metadata(origin: TemplatePath) -> Self {
        Self::template(origin).field("metadata")
    }

    /// Pod (template) spec for `origin`
    pub fn pod_spec(origin: TemplatePath) -> Self {
        Self::template(origin).field("spec")
    }

    /// Container `index` of `group` under `origin`
    pub fn container(origin: TemplatePath, group: ContainerGroup, index: usize) -> Self {
        Self::pod_spec(origin).field(group.field()).index(index)
    }

    fn template(origin: TemplatePath) -> Self {
        origin
            .prefix()
            .iter()
            .fold(Self::root(), |addr, name| addr.field(name))
    }

    pub fn field(&self, name: &str) -> Self {
        self.with(Segment::Field(name.to_string()))
    }

    /// Map key; may contain `/` and `~`
    pub fn key(&self, key: &str) -> Self {
        self.with(Segment::Key(key.to_string()))
    }

    pub fn index(&self, index: usize) -> Self {
        self.with(Segment::Index(index))
    }

    /// Position after the last element of an array (patch pointers only)
    pub fn append(&self) -> Self {
        self.with(Segment::Append)
    }

    fn with(&self, segment: Segment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    /// JSON pointer for patch operations
    pub fn pointer(&self) -> PointerBuf {
        PointerBuf::from_tokens(self.segments.iter().map(|segment| match segment {
            Segment::Field(name) | Segment::Key(name) => Token::new(name.clone()),
            Segment::Index(i) => Token::new(i.to_string()),
            Segment::Append => Token::new("-"),
        }))
    }

    /// Kubernetes field path, e.g. `spec.template.spec.containers[0].image`
    pub fn field_path(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Field(name) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(name);
                }
                Segment::Key(key) => {
                    out.push('[');
                    out.push_str(key);
                    out.push(']');
                }
                Segment::Index(i) => {
                    out.push_str(&format!("[{i}]"));
                }
                Segment::Append => out.push_str("[-]"),
            }
        }
        out
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.field_path())
    }
}
