//! Shrinking date-prefix window used by both matching passes.
//!
//! Instants are compared on a prefix of their ISO rendering
//! (`2021-03-04T12:34`). The widest-precision comparison uses 16 characters
//! (minute resolution); each retry drops one character until the hour floor
//! of 13 characters. Price is never relaxed, only the date.

use crate::domain::{iso_millis, ExternalActivity, SecondaryActivity};
use chrono::{DateTime, Utc};

/// Prefix length at minute resolution.
pub const MINUTE_PREFIX: usize = 16;
/// Prefix length at hour resolution; the window never grows past this.
pub const HOUR_PREFIX: usize = 13;

/// Anything that can be placed on the matching timeline.
pub trait WindowCandidate {
    fn window_instant(&self) -> DateTime<Utc>;
}

impl WindowCandidate for ExternalActivity {
    fn window_instant(&self) -> DateTime<Utc> {
        self.match_instant()
    }
}

impl WindowCandidate for SecondaryActivity {
    fn window_instant(&self) -> DateTime<Utc> {
        self.block_timestamp
    }
}

fn prefix(ts: &DateTime<Utc>, level: usize) -> String {
    let iso = iso_millis(ts);
    iso.chars().take(level).collect()
}

/// Candidates whose instant agrees with `target` on the first `level` ISO characters.
///
/// Order of `candidates` is preserved.
pub fn matches_at<'a, C: WindowCandidate>(
    candidates: &[&'a C],
    target: &DateTime<Utc>,
    level: usize,
) -> Vec<&'a C> {
    let wanted = prefix(target, level);
    candidates
        .iter()
        .copied()
        .filter(|c| prefix(&c.window_instant(), level) == wanted)
        .collect()
}

/// Result of a shrinking-window search.
#[derive(Debug)]
pub struct WindowMatch<'a, C> {
    pub matches: Vec<&'a C>,
    /// Prefix length the matches were found at, or the floor if none were.
    pub level: usize,
}

impl<'a, C> WindowMatch<'a, C> {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn is_ambiguous(&self) -> bool {
        self.matches.len() > 1
    }

    pub fn first(&self) -> Option<&'a C> {
        self.matches.first().copied()
    }
}

/// Try minute resolution first and widen one character at a time down to
/// the hour floor, stopping at the first non-empty level.
pub fn shrinking_match<'a, C: WindowCandidate>(
    candidates: &[&'a C],
    target: &DateTime<Utc>,
) -> WindowMatch<'a, C> {
    for level in (HOUR_PREFIX..=MINUTE_PREFIX).rev() {
        let matches = matches_at(candidates, target, level);
        if !matches.is_empty() {
            return WindowMatch { matches, level };
        }
    }
    WindowMatch {
        matches: Vec::new(),
        level: HOUR_PREFIX,
    }
}
