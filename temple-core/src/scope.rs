//! Variable scope for a render pass.

use std::borrow::Cow;

use indexmap::IndexMap;

use crate::ast::Path;
use crate::value::Value;

type Frame<'c> = IndexMap<String, Cow<'c, Value>>;

/// Binding frames over a read-only root context.
///
/// Lookup searches frames innermost first and falls back to the root
/// context's top-level keys. A binding borrows from the context when it
/// can (loop items drawn from context data) and owns computed values.
#[derive(Debug)]
pub struct Scope<'c> {
    root: &'c Value,
    frames: Vec<Frame<'c>>,
}

impl<'c> Scope<'c> {
    pub fn new(root: &'c Value) -> Self {
        Self {
            root,
            frames: Vec::new(),
        }
    }

    pub fn root(&self) -> &'c Value {
        self.root
    }

    /// Number of frames currently pushed.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Frame::new());
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    /// Bind `name` in the innermost frame, replacing any earlier binding
    /// there. Without a frame the binding is dropped.
    pub fn bind(&mut self, name: &str, value: Cow<'c, Value>) {
        match self.frames.last_mut() {
            Some(frame) => match frame.get_mut(name) {
                Some(slot) => *slot = value,
                None => {
                    frame.insert(name.to_string(), value);
                }
            },
            None => tracing::trace!(name, "bind outside of any frame ignored"),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name))
            .map(|value| &**value)
            .or_else(|| self.root.get(name))
    }

    /// Resolve `path` to a value borrowed for the whole render, without
    /// going through the frames' own storage. `None` when the path misses or
    /// passes through an owned binding.
    pub fn resolve_borrowed(&self, path: &Path) -> Option<&'c Value> {
        let head = path.head();
        let mut current = match self.frames.iter().rev().find_map(|frame| frame.get(head)) {
            Some(Cow::Borrowed(value)) => *value,
            Some(Cow::Owned(_)) => return None,
            None => self.root.get(head)?,
        };
        for segment in &path.segments[1..] {
            current = segment.step(current)?;
        }
        Some(current)
    }
}
