//! Tag-colour registry: draws without replacement from a fixed palette,
//! falling back to one colour once exhausted. Lives as an owned service
//! rather than module-level mutable state so each daemon instance gets
//! its own draw order.

use std::collections::HashMap;
use std::sync::Mutex;

const FALLBACK: &str = "#268072";

const PALETTE: [&str; 34] = [
    "#1abc9c", "#2ecc71", "#3498db", "#9b59b6", "#34495e", "#16a085", "#27ae60", "#2980b9",
    "#8e44ad", "#2c3e50", "#f1c40f", "#e67e22", "#e74c3c", "#ecf0f1", "#95a5a6", "#f39c12",
    "#d35400", "#c0392b", "#bdc3c7", "#7f8c8d", "#ff6b6b", "#feca57", "#48dbfb", "#1dd1a1",
    "#5f27cd", "#00d2d3", "#ff9ff3", "#54a0ff", "#c8d6e5", "#576574", "#10ac84", "#ee5253",
    "#0abde3", "#222f3e",
];

pub struct TagColours {
    inner: Mutex<Inner>,
}

struct Inner {
    assigned: HashMap<String, String>,
    remaining: Vec<&'static str>,
}

impl Default for TagColours {
    fn default() -> Self {
        Self::new()
    }
}

impl TagColours {
    pub fn new() -> Self {
        TagColours {
            inner: Mutex::new(Inner {
                assigned: HashMap::new(),
                remaining: PALETTE.to_vec(),
            }),
        }
    }

    /// Returns the colour for `tag`, assigning one on first sight.
    pub fn colour_for(&self, tag: &str) -> String {
        let mut inner = self.inner.lock().expect("tag colour registry poisoned");
        if let Some(c) = inner.assigned.get(tag) {
            return c.clone();
        }
        let colour = if inner.remaining.is_empty() {
            FALLBACK.to_string()
        } else {
            let idx = inner.assigned.len() % inner.remaining.len().max(1);
            inner.remaining.remove(idx).to_string()
        };
        inner.assigned.insert(tag.to_string(), colour.clone());
        colour
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_for_same_tag() {
        let colours = TagColours::new();
        let a = colours.colour_for("prod");
        let b = colours.colour_for("prod");
        assert_eq!(a, b);
    }

    #[test]
    fn falls_back_once_palette_exhausted() {
        let colours = TagColours::new();
        for i in 0..PALETTE.len() {
            colours.colour_for(&format!("tag{i}"));
        }
        assert_eq!(colours.colour_for("overflow"), FALLBACK);
        assert_eq!(colours.colour_for("overflow-2"), FALLBACK);
    }
}
