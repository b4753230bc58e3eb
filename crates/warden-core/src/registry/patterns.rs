//! File pattern overlap.
//!
//! Two patterns conflict when they are equal or either contains the other
//! as a substring. Deliberately coarse: `src/` conflicts with `src/lib.rs`
//! but so does `lib` with `src/lib.rs`.

use itertools::{iproduct, Itertools};

use super::types::{Conflict, WorkStream};

pub fn patterns_conflict(a: &str, b: &str) -> bool {
    a == b || a.contains(b) || b.contains(a)
}

/// First pattern of `existing` that `candidate` conflicts with.
pub fn first_overlap<'a, I>(candidate: &str, existing: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a String>,
{
    existing
        .into_iter()
        .map(String::as_str)
        .find(|pattern| patterns_conflict(candidate, pattern))
}

/// Every conflicting pattern pair across distinct streams.
pub fn find_conflicts<'a, I>(streams: I) -> Vec<Conflict>
where
    I: IntoIterator<Item = &'a WorkStream>,
{
    let streams: Vec<&WorkStream> = streams.into_iter().collect();
    streams
        .into_iter()
        .tuple_combinations()
        .flat_map(|(first, second)| {
            iproduct!(&first.file_patterns, &second.file_patterns)
                .filter(|(a, b)| patterns_conflict(a, b))
                .map(|(a, b)| Conflict {
                    first_stream: first.name.clone(),
                    first_pattern: a.clone(),
                    second_stream: second.name.clone(),
                    second_pattern: b.clone(),
                })
                .collect::<Vec<_>>()
        })
        .collect()
}
