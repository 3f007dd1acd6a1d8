//! Error type for definition parsing.

use thiserror::Error;

use crate::span::Span;

/// A definition does not have the shape `SHOW CREATE TABLE` produces.
#[derive(Debug, Clone, Error)]
#[error("{message} at bytes {}..{}", .span.start, .span.end)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
    /// What the operator can check.
    pub hint: Option<String>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Render the error against the definition it came from, pointing at
    /// the offending text on its line.
    pub fn render(&self, source: &str) -> String {
        let at = self.span.locate(source);
        let mut out = format!("{} (line {}, column {})\n", self.message, at.line, at.column);

        if let Some(text) = source.lines().nth(at.line - 1) {
            let gutter = at.line.to_string();
            let pad = " ".repeat(gutter.len());
            let width = self
                .span
                .slice(source)
                .lines()
                .next()
                .map_or(1, |first| first.chars().count().max(1));
            out.push_str(&format!("{} | {}\n", gutter, text));
            out.push_str(&format!(
                "{} | {}{}\n",
                pad,
                " ".repeat(at.column - 1),
                "^".repeat(width)
            ));
        }
        if let Some(hint) = &self.hint {
            out.push_str(&format!("hint: {}\n", hint));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_points_at_the_span() {
        let source = "CREATE TABLE `t` (\n  `id` int\n) ROW_FORMAT=DYNAMIC";
        let err = ParseError::new("table options carry no ENGINE clause", Span::new(32, 50))
            .with_hint("pass the output of SHOW CREATE TABLE unchanged");

        assert_eq!(
            err.render(source),
            "table options carry no ENGINE clause (line 3, column 3)\n\
             3 | ) ROW_FORMAT=DYNAMIC\n\
             \x20 |   ^^^^^^^^^^^^^^^^^^\n\
             hint: pass the output of SHOW CREATE TABLE unchanged\n"
        );
    }

    #[test]
    fn test_render_at_end_of_input() {
        let source = "CREATE TABLE `t`";
        let err = ParseError::new("expected '('", Span::new(16, 16));
        assert_eq!(
            err.render(source),
            "expected '(' (line 1, column 17)\n1 | CREATE TABLE `t`\n  |                 ^\n"
        );
    }

    #[test]
    fn test_display_includes_position() {
        let err = ParseError::new("expected '('", Span::new(4, 5));
        assert_eq!(err.to_string(), "expected '(' at bytes 4..5");
    }
}
