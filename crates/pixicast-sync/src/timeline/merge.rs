//! Pure merge / sort / grouping over program lists.

use std::collections::HashSet;

use chrono::TimeZone;
use pixicast_proto::protocol::Program;
use serde::Serialize;

/// Group key for programs that carry neither a start nor a publish time.
pub const UNKNOWN_DATE_KEY: &str = "unknown";

/// Programs sharing one local calendar date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateGroup {
    /// `YYYY-MM-DD` in the grouping time zone, or [`UNKNOWN_DATE_KEY`].
    pub date_key: String,
    pub programs: Vec<Program>,
}

/// Combine already-held programs with a newly fetched batch.
///
/// Duplicate ids resolve to the most recently fetched record. The whole
/// result is re-sorted, since a page is not guaranteed to sit strictly
/// after what is already held.
pub fn merge_programs(existing: Vec<Program>, incoming: Vec<Program>) -> Vec<Program> {
    let mut seen = HashSet::with_capacity(existing.len() + incoming.len());
    let mut fresh = Vec::with_capacity(incoming.len());
    for program in incoming.into_iter().rev() {
        if seen.insert(program.id.clone()) {
            fresh.push(program);
        }
    }
    fresh.reverse();

    let mut merged: Vec<Program> = existing
        .into_iter()
        .filter(|p| seen.insert(p.id.clone()))
        .collect();
    merged.extend(fresh);
    sort_descending(&mut merged);
    merged
}

/// Stable sort, newest effective time first; timeless programs last.
pub fn sort_descending(programs: &mut [Program]) {
    programs.sort_by(|a, b| b.effective_time().cmp(&a.effective_time()));
}

/// Group a descending-sorted list by local calendar date, keeping order.
pub fn group_by_date<Tz: TimeZone>(programs: &[Program], tz: &Tz) -> Vec<DateGroup> {
    let mut groups: Vec<DateGroup> = Vec::new();
    for program in programs {
        let key = date_key(program, tz);
        match groups.last_mut() {
            Some(group) if group.date_key == key => group.programs.push(program.clone()),
            _ => groups.push(DateGroup {
                date_key: key,
                programs: vec![program.clone()],
            }),
        }
    }
    groups
}

pub fn date_key<Tz: TimeZone>(program: &Program, tz: &Tz) -> String {
    match program.effective_time() {
        Some(t) => t.with_timezone(tz).date_naive().format("%Y-%m-%d").to_string(),
        None => UNKNOWN_DATE_KEY.to_string(),
    }
}
