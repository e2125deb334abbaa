use std::time::{Duration, Instant};

/// Work budget for one scheduling quantum. Deadline budgets are what a frame
/// loop hands in; item budgets give tests an exact, clock-free suspension
/// point.
#[derive(Debug, Copy, Clone)]
pub enum Budget {
    Unlimited,
    Deadline(Instant),
    Items(usize),
}

impl Budget {
    pub fn time_slice(duration: Duration) -> Budget {
        Budget::Deadline(Instant::now() + duration)
    }

    /// Items only count against item budgets; deadlines re-read the clock in
    /// `exhausted` instead.
    pub fn consume(&mut self, items: usize) {
        if let Budget::Items(remaining) = self {
            *remaining = remaining.saturating_sub(items);
        }
    }

    pub fn exhausted(&self) -> bool {
        match self {
            Budget::Unlimited => false,
            Budget::Deadline(deadline) => Instant::now() >= *deadline,
            Budget::Items(remaining) => *remaining == 0,
        }
    }
}

/// Splits a comma-separated tag string, dropping padding and empties, so
/// "a, b,,c" comes out as three tags.
pub fn split_tag_list(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .map(|tag| tag.to_string())
        .collect()
}
