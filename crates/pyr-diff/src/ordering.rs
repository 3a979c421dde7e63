//! Hierarchical ordering of diffs by unit path.

use std::cmp::Ordering;

use crate::comparison::Diff;

/// Anything that carries a dotted hierarchical path (`"1.20.300"`).
pub trait PathOrdered {
    fn sort_path(&self) -> Option<&str>;
}

impl PathOrdered for Diff {
    fn sort_path(&self) -> Option<&str> {
        self.path()
    }
}

impl<T: PathOrdered + ?Sized> PathOrdered for &T {
    fn sort_path(&self) -> Option<&str> {
        (**self).sort_path()
    }
}

fn compare_segment(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// Depth-first order: segments compare numerically when both are numbers,
/// a path sorts right before its descendants, and missing paths sort last.
///
/// Siblings are therefore in numeric order (`"1.9"` before `"1.10"`), not in
/// plain text order.
pub fn compare_paths(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let mut left = a.split('.');
            let mut right = b.split('.');
            loop {
                match (left.next(), right.next()) {
                    (None, None) => return Ordering::Equal,
                    (None, Some(_)) => return Ordering::Less,
                    (Some(_), None) => return Ordering::Greater,
                    (Some(x), Some(y)) => match compare_segment(x, y) {
                        Ordering::Equal => continue,
                        other => return other,
                    },
                }
            }
        }
    }
}

/// Stable sort by path. Parents always come before their children.
pub fn sort_by_path<T: PathOrdered>(items: &mut [T]) {
    items.sort_by(|a, b| compare_paths(a.sort_path(), b.sort_path()));
}
