use std::iter::Peekable;

use super::lines::is_heading;

/// Lazily groups lines into per-course chunks.
///
/// A heading line opens a group; everything up to the next heading belongs to
/// it. Lines before the first heading are front-matter and are dropped.
pub struct RecordGroups<I: Iterator> {
    lines: Peekable<I>,
}

pub fn group_records<I>(lines: I) -> RecordGroups<I::IntoIter>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    RecordGroups {
        lines: lines.into_iter().peekable(),
    }
}

impl<I> Iterator for RecordGroups<I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = loop {
            let line = self.lines.next()?;
            if is_heading(line.as_ref()) {
                break line;
            }
        };

        let mut group = vec![first];
        while let Some(line) = self.lines.next_if(|l| !is_heading(l.as_ref())) {
            group.push(line);
        }
        Some(group)
    }
}
