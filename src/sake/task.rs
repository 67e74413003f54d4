use crate::interlude::*;

use std::cmp::Ordering;
use std::fmt::Write;

use crate::utils::{is_ident, single_quote};

/// A single task declaration as read from a definition file.
///
/// The name is the identity: equality and ordering only look at it.
/// The body is opaque source text, kept verbatim for the execution
/// engine and for rendering.
#[derive(Clone, Serialize, educe::Educe)]
#[educe(Debug)]
pub struct Task {
    name: String,
    comment: Option<String>,
    parameters: Vec<String>,
    dependencies: Vec<String>,
    #[educe(Debug(ignore))]
    #[serde(skip)]
    body: String,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        parameters: Vec<String>,
        dependencies: Vec<String>,
        comment: Option<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            comment,
            parameters,
            dependencies,
            body: body.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tasks without a comment are hidden from default listings.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn is_hidden(&self) -> bool {
        self.comment.is_none()
    }

    /// Turn ourselves back into definition file text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(comment) = &self.comment {
            let _ = writeln!(out, "desc {}", single_quote(comment));
        }
        let _ = write!(out, "task {}", single_quote(&self.name));

        if !self.parameters.is_empty() {
            for param in &self.parameters {
                let _ = write!(out, ", {}", render_symbol(param));
            }
        }

        if !self.dependencies.is_empty() {
            let deps = self
                .dependencies
                .iter()
                .map(|dep| single_quote(dep))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = write!(out, ", :needs => [ {deps} ]");
        }

        if self.parameters.is_empty() {
            out.push_str(" do\n");
        } else {
            out.push_str(" do |t, args|\n");
        }

        if !self.body.is_empty() {
            out.push_str(&self.body);
            out.push('\n');
        }

        out.push_str("end\n");
        out
    }
}

fn render_symbol(raw: &str) -> String {
    if is_ident(raw) {
        format!(":{raw}")
    } else {
        format!(":{}", single_quote(raw))
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Task {}

impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Task {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.name.fmt(f)
    }
}

impl AsRef<str> for Task {
    fn as_ref(&self) -> &str {
        &self.name
    }
}
