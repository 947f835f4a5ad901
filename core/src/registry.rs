//! Source & breakpoint registry
//!
//! Holds the current source text and the set of breakpoint lines. Line
//! numbers are 1-based and shift as the text is edited, so the breakpoint
//! set is reconciled against the line count whenever the text changes and
//! before it is read for display.

use std::collections::BTreeSet;

use crate::error::Line;

/* ===================== Source Document ===================== */

/// The program text being debugged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceDocument {
    text: String,
}

impl SourceDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of lines, counting an empty document as one empty line
    pub fn line_count(&self) -> Line {
        self.text.split('\n').count() as Line
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Text of a 1-based line, without the trailing newline
    pub fn line(&self, line: Line) -> Option<&str> {
        let idx = (line as usize).checked_sub(1)?;
        self.text.split('\n').nth(idx)
    }
}

/* ===================== Breakpoint Set ===================== */

/// Unique breakpoint lines, always iterated in ascending order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakpointSet {
    lines: BTreeSet<Line>,
}

impl BreakpointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip membership of `line`. Returns true when the line is now a breakpoint.
    pub fn toggle(&mut self, line: Line) -> bool {
        if self.lines.remove(&line) {
            false
        } else {
            self.lines.insert(line);
            true
        }
    }

    /// Drop every breakpoint outside `[1, line_count]`
    pub fn reconcile(&mut self, line_count: Line) {
        self.lines.retain(|&line| line >= 1 && line <= line_count);
    }

    pub fn contains(&self, line: Line) -> bool {
        self.lines.contains(&line)
    }

    pub fn sorted(&self) -> Vec<Line> {
        self.lines.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Short listing such as `L5, L9`, or `None` when empty
    pub fn summary(&self) -> String {
        if self.lines.is_empty() {
            return "None".to_string();
        }
        self.lines
            .iter()
            .map(|line| format!("L{}", line))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromIterator<Line> for BreakpointSet {
    fn from_iter<I: IntoIterator<Item = Line>>(iter: I) -> Self {
        Self {
            lines: iter.into_iter().collect(),
        }
    }
}

/* ===================== Registry ===================== */

/// Source text plus the breakpoints set against it
#[derive(Debug, Clone, Default)]
pub struct Registry {
    document: SourceDocument,
    breakpoints: BreakpointSet,
}

impl Registry {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            document: SourceDocument::new(source),
            breakpoints: BreakpointSet::new(),
        }
    }

    pub fn document(&self) -> &SourceDocument {
        &self.document
    }

    pub fn source(&self) -> &str {
        self.document.text()
    }

    /// Replace the source text and prune breakpoints that fell off the end
    pub fn replace_source(&mut self, text: impl Into<String>) {
        self.document = SourceDocument::new(text);
        self.reconcile();
    }

    /// Accepts any line; range is only enforced on the next reconcile
    pub fn toggle_breakpoint(&mut self, line: Line) -> bool {
        self.breakpoints.toggle(line)
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    pub fn reconcile(&mut self) {
        self.breakpoints.reconcile(self.document.line_count());
    }

    pub fn is_breakpoint(&self, line: Line) -> bool {
        self.breakpoints.contains(line)
    }

    pub fn breakpoints(&self) -> &BreakpointSet {
        &self.breakpoints
    }

    /// Reconciled, ascending breakpoint lines for display
    pub fn sorted_breakpoints(&mut self) -> Vec<Line> {
        self.reconcile();
        self.breakpoints.sorted()
    }
}
