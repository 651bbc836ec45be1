use std::collections::HashMap;

/// Read position into each hint list, keyed by context.
#[derive(Debug, Default)]
pub struct HintCursor {
    positions: HashMap<String, usize>,
}

impl HintCursor {
    /// Next unread hint for `context`, advancing the cursor. `None` once exhausted.
    pub fn next<'a>(&mut self, context: &str, hints: &'a [String]) -> Option<&'a str> {
        let position = self.positions.entry(context.to_string()).or_insert(0);
        let hint = hints.get(*position)?;
        *position += 1;
        Some(hint.as_str())
    }

    pub fn position(&self, context: &str) -> usize {
        self.positions.get(context).copied().unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }
}
