//! Line-oriented unified diff for dry runs

use std::fmt::{self, Display, Formatter};

/// Context lines kept around each change
pub const DEFAULT_CONTEXT: usize = 3;

/// Text shown when two renderings are identical
pub const NO_CHANGES: &str = "> no changes";

/// One rendered diff line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffLine {
    /// `---`, `+++` or `@@` header
    Header(String),
    /// Unchanged line
    Context(String),
    /// Line only in the old text
    Removed(String),
    /// Line only in the new text
    Added(String),
}

impl Display for DiffLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header(text) => f.write_str(text),
            Self::Context(text) => write!(f, " {text}"),
            Self::Removed(text) => write!(f, "-{text}"),
            Self::Added(text) => write!(f, "+{text}"),
        }
    }
}

/// Unified diff between two texts
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LineDiff {
    lines: Vec<DiffLine>,
}

impl LineDiff {
    /// Diff `before` against `after` with `context` lines around changes
    #[must_use]
    pub fn compute(before: &str, after: &str, context: usize) -> Self {
        let old: Vec<&str> = before.lines().collect();
        let new: Vec<&str> = after.lines().collect();
        let ops = edit_script(&old, &new);

        let changes: Vec<usize> = ops
            .iter()
            .enumerate()
            .filter(|(_, op)| !matches!(op, Op::Equal(..)))
            .map(|(k, _)| k)
            .collect();
        let Some((&first, rest)) = changes.split_first() else {
            return Self::default();
        };

        let mut ranges = Vec::new();
        let mut start = first.saturating_sub(context);
        let mut end = (first + context + 1).min(ops.len());
        for &k in rest {
            if k.saturating_sub(context) <= end {
                end = (k + context + 1).min(ops.len());
            } else {
                ranges.push((start, end));
                start = k.saturating_sub(context);
                end = (k + context + 1).min(ops.len());
            }
        }
        ranges.push((start, end));

        let mut lines = vec![
            DiffLine::Header("--- before".to_string()),
            DiffLine::Header("+++ after".to_string()),
        ];
        for (start, end) in ranges {
            let origin = ops[..start].iter().fold((0, 0), |(a, b), op| match op {
                Op::Equal(..) => (a + 1, b + 1),
                Op::Delete(_) => (a + 1, b),
                Op::Insert(_) => (a, b + 1),
            });
            lines.extend(hunk(&ops[start..end], origin, &old, &new));
        }
        Self { lines }
    }

    /// Check for identical inputs
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Rendered lines
    #[must_use]
    pub fn lines(&self) -> &[DiffLine] {
        &self.lines
    }
}

impl Display for LineDiff {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.lines.is_empty() {
            return writeln!(f, "{NO_CHANGES}");
        }
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal(usize, usize),
    Delete(usize),
    Insert(usize),
}

/// Minimal edit script; common prefix and suffix are matched directly and
/// the rest is split recursively (Hirschberg), so memory stays linear
fn edit_script(old: &[&str], new: &[&str]) -> Vec<Op> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let (n, m) = (old.len(), new.len());

    let mut ops = Vec::with_capacity(n + m);
    ops.extend((0..prefix).map(|k| Op::Equal(k, k)));
    align(old, new, (prefix, n - suffix), (prefix, m - suffix), &mut ops);
    ops.extend((0..suffix).map(|k| Op::Equal(n - suffix + k, m - suffix + k)));
    ops
}

/// Append the script turning `old[o.0..o.1]` into `new[w.0..w.1]`
fn align(
    old: &[&str],
    new: &[&str],
    o: (usize, usize),
    w: (usize, usize),
    ops: &mut Vec<Op>,
) {
    let (a, b) = (&old[o.0..o.1], &new[w.0..w.1]);
    if a.is_empty() {
        ops.extend((w.0..w.1).map(Op::Insert));
        return;
    }
    if b.is_empty() {
        ops.extend((o.0..o.1).map(Op::Delete));
        return;
    }
    if a.len() == 1 {
        match b.iter().position(|line| *line == a[0]) {
            Some(j) => {
                ops.extend((w.0..w.0 + j).map(Op::Insert));
                ops.push(Op::Equal(o.0, w.0 + j));
                ops.extend((w.0 + j + 1..w.1).map(Op::Insert));
            }
            None => {
                ops.push(Op::Delete(o.0));
                ops.extend((w.0..w.1).map(Op::Insert));
            }
        }
        return;
    }

    let mid = a.len() / 2;
    let forward = lcs_lengths(&a[..mid], b, false);
    let backward = lcs_lengths(&a[mid..], b, true);
    let mut split = 0;
    let mut best = 0;
    for k in 0..=b.len() {
        let total = forward[k] + backward[b.len() - k];
        if total > best {
            best = total;
            split = k;
        }
    }

    align(old, new, (o.0, o.0 + mid), (w.0, w.0 + split), ops);
    align(old, new, (o.0 + mid, o.1), (w.0 + split, w.1), ops);
}

/// Last row of the LCS table: entry `k` is the LCS length of `a` and the
/// first `k` lines of `b`; with `reversed` both inputs are read back to front
fn lcs_lengths(a: &[&str], b: &[&str], reversed: bool) -> Vec<usize> {
    let at = |lines: &[&str], k: usize| if reversed { lines.len() - 1 - k } else { k };
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for i in 0..a.len() {
        let x = a[at(a, i)];
        for j in 0..b.len() {
            cur[j + 1] = if x == b[at(b, j)] {
                prev[j] + 1
            } else {
                cur[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev
}

/// Render one hunk; `origin` is the (old, new) line count before it
fn hunk(ops: &[Op], origin: (usize, usize), old: &[&str], new: &[&str]) -> Vec<DiffLine> {
    let old_count = ops.iter().filter(|op| !matches!(op, Op::Insert(_))).count();
    let new_count = ops.iter().filter(|op| !matches!(op, Op::Delete(_))).count();

    // An empty side points at the line before the hunk
    let old_pos = if old_count > 0 { origin.0 + 1 } else { origin.0 };
    let new_pos = if new_count > 0 { origin.1 + 1 } else { origin.1 };

    let mut lines = vec![DiffLine::Header(format!(
        "@@ -{old_pos},{old_count} +{new_pos},{new_count} @@"
    ))];
    lines.extend(ops.iter().map(|op| match *op {
        Op::Equal(i, _) => DiffLine::Context(old[i].to_string()),
        Op::Delete(i) => DiffLine::Removed(old[i].to_string()),
        Op::Insert(j) => DiffLine::Added(new[j].to_string()),
    }));
    lines
}
