//! Merges slots that share a clock band into display rows.

use chrono::{NaiveTime, Weekday};
use serde::Serialize;
use tracing::debug;

use crate::calendar::day_number;
use crate::model::Scheduled;

/// Members sharing one `(start_time, end_time)` band, in sorted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayGroup<T> {
    start_time: NaiveTime,
    end_time: NaiveTime,
    anchor_day: Weekday,
    anchor_week: u32,
    members: Vec<T>,
}

impl<T: Scheduled> DisplayGroup<T> {
    fn open(first: T) -> Self {
        Self {
            start_time: first.start_time(),
            end_time: first.end_time(),
            anchor_day: first.day_of_week(),
            anchor_week: first.rotation_week(),
            members: vec![first],
        }
    }

    fn can_join(&self, item: &T) -> bool {
        item.band() == (self.start_time, self.end_time)
    }

    pub fn members(&self) -> &[T] {
        &self.members
    }

    pub fn into_members(self) -> Vec<T> {
        self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Distinct member weekdays, first appearance first.
    pub fn days(&self) -> Vec<Weekday> {
        let mut days: Vec<Weekday> = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let day = member.day_of_week();
            if !days.contains(&day) {
                days.push(day);
            }
        }
        days
    }

    /// "09:00-10:00"
    pub fn band_label(&self) -> String {
        format!(
            "{}-{}",
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M")
        )
    }
}

impl<T: Scheduled> Scheduled for DisplayGroup<T> {
    fn start_time(&self) -> NaiveTime {
        self.start_time
    }

    fn end_time(&self) -> NaiveTime {
        self.end_time
    }

    fn day_of_week(&self) -> Weekday {
        self.anchor_day
    }

    fn rotation_week(&self) -> u32 {
        self.anchor_week
    }
}

/// Ordering used before merging. The tie-break order is part of the output
/// contract: start, end, weekday number, rotation week.
pub fn sort_key<T: Scheduled>(item: &T) -> (NaiveTime, NaiveTime, u32, u32) {
    (
        item.start_time(),
        item.end_time(),
        day_number(item.day_of_week()),
        item.rotation_week(),
    )
}

/// Sorts `items` and merges contiguous runs with an identical band.
///
/// Single pass after the sort: once a group is closed nothing is added to it
/// again.
pub fn group<T: Scheduled>(mut items: Vec<T>) -> Vec<DisplayGroup<T>> {
    let input = items.len();
    items.sort_by_key(sort_key);

    let mut groups: Vec<DisplayGroup<T>> = Vec::new();
    let mut current: Option<DisplayGroup<T>> = None;

    for item in items {
        if let Some(open) = current.as_mut()
            && open.can_join(&item)
        {
            open.members.push(item);
            continue;
        }

        if let Some(closed) = current.replace(DisplayGroup::open(item)) {
            groups.push(closed);
        }
    }
    groups.extend(current);

    debug!(input, groups = groups.len(), "grouped slots by band");
    groups
}
