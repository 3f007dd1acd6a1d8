//! Anchored name patterns for selecting databases.
//!
//! A pattern matches a whole name. `*` (or its regex spelling `.*`) stands
//! for any sequence of characters; leading `^` and trailing `$` are accepted
//! and ignored since every pattern is anchored anyway.

/// A compiled name pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    /// Literal pieces between wildcards.
    pieces: Vec<String>,
    leading_wildcard: bool,
    trailing_wildcard: bool,
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let mut body = source.as_str();
        body = body.strip_prefix('^').unwrap_or(body);
        body = body.strip_suffix('$').unwrap_or(body);

        let normalized = body.replace(".*", "*");
        let leading_wildcard = normalized.starts_with('*');
        let trailing_wildcard = normalized.ends_with('*');
        let pieces = normalized
            .split('*')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            source,
            pieces,
            leading_wildcard,
            trailing_wildcard,
        }
    }

    /// The pattern as configured.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the whole of `name` matches.
    pub fn matches(&self, name: &str) -> bool {
        let has_wildcard = self.leading_wildcard || self.trailing_wildcard || self.pieces.len() > 1;
        if !has_wildcard {
            return self.pieces.first().map_or(name.is_empty(), |p| p == name);
        }

        let mut rest = name;
        let mut pieces = self.pieces.iter().peekable();

        if !self.leading_wildcard {
            match pieces.next() {
                Some(first) => match rest.strip_prefix(first.as_str()) {
                    Some(after) => rest = after,
                    None => return false,
                },
                None => return true,
            }
        }

        while let Some(piece) = pieces.next() {
            let is_last = pieces.peek().is_none();
            if is_last && !self.trailing_wildcard {
                return rest.ends_with(piece.as_str());
            }
            match rest.find(piece.as_str()) {
                Some(at) => rest = &rest[at + piece.len()..],
                None => return false,
            }
        }

        self.trailing_wildcard || rest.is_empty()
    }
}

/// Include and exclude patterns for database names.
///
/// An include pattern takes precedence: when one is set, the exclude list
/// is ignored entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameFilter {
    include: Option<Pattern>,
    exclude: Vec<Pattern>,
}

impl NameFilter {
    pub fn new<I, S>(exclude: I, include: Option<impl Into<String>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: include.map(Pattern::new),
            exclude: exclude.into_iter().map(Pattern::new).collect(),
        }
    }

    /// Whether `name` is selected.
    pub fn selects(&self, name: &str) -> bool {
        match &self.include {
            Some(include) => include.matches(name),
            None => !self.exclude.iter().any(|p| p.matches(name)),
        }
    }

    /// Keep the selected names, preserving order.
    pub fn apply(&self, names: Vec<String>) -> Vec<String> {
        names.into_iter().filter(|n| self.selects(n)).collect()
    }

    pub fn include(&self) -> Option<&Pattern> {
        self.include.as_ref()
    }

    pub fn exclude(&self) -> &[Pattern] {
        &self.exclude
    }
}
