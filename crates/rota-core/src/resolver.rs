//! Turns stored recurring slots into concrete, date-stamped occurrences.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::Serialize;
use tracing::{debug, trace};

use crate::calendar::{self, DEFAULT_WEEK_START};
use crate::model::{Class, Scheduled, Slot, Timetable};

/// A slot pinned to the calendar date it falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedOccurrence<'a> {
    pub class: &'a Class,
    pub slot: &'a Slot,
    pub date: NaiveDate,
}

impl ResolvedOccurrence<'_> {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.slot.start_time())
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.date.and_time(self.slot.end_time())
    }
}

impl Scheduled for ResolvedOccurrence<'_> {
    fn start_time(&self) -> NaiveTime {
        self.slot.start_time()
    }

    fn end_time(&self) -> NaiveTime {
        self.slot.end_time()
    }

    fn day_of_week(&self) -> Weekday {
        self.slot.day_of_week()
    }

    fn rotation_week(&self) -> u32 {
        self.slot.rotation_week()
    }
}

/// One row of a multi-day plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedDay<'a> {
    pub date: NaiveDate,
    pub day_of_week: Weekday,
    pub rotation_week: u32,
    pub occurrences: Vec<ResolvedOccurrence<'a>>,
}

/// Resolves rotation weeks and active slots for calendar dates.
///
/// Holds only the first weekday of the week, so it is `Copy` and can be shared
/// freely between threads. It never reads the clock; "today" is always an
/// argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolver {
    week_start: Weekday,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(DEFAULT_WEEK_START)
    }
}

impl Resolver {
    pub fn new(week_start: Weekday) -> Self {
        Self { week_start }
    }

    pub fn week_start(&self) -> Weekday {
        self.week_start
    }

    /// Rotation week (1-based) active on `today`. Dates before the timetable
    /// start extrapolate the cycle backwards.
    pub fn current_rotation_week(&self, timetable: &Timetable, today: NaiveDate) -> u32 {
        if timetable.is_fixed() {
            return 1;
        }

        let length = i64::from(timetable.rotation_length());
        let elapsed = calendar::weeks_between(timetable.start_date(), today, self.week_start);
        let week = ((elapsed % length) + length) % length + 1;
        week as u32
    }

    /// Label such as "Week 2", or `None` for fixed scheduling.
    pub fn rotation_label(&self, timetable: &Timetable, date: NaiveDate) -> Option<String> {
        if timetable.is_fixed() {
            return None;
        }
        Some(format!("Week {}", self.current_rotation_week(timetable, date)))
    }

    /// Slots of `timetable`'s classes that apply on `date`. Classes from other
    /// timetables are ignored. The order follows `classes` and each class's
    /// slot list; callers that need a time order sort or group downstream.
    pub fn slots_active_on<'a>(
        &self,
        classes: &'a [Class],
        timetable: &Timetable,
        date: NaiveDate,
    ) -> Vec<ResolvedOccurrence<'a>> {
        if !timetable.contains(date) {
            trace!(%date, timetable = %timetable.id(), "date outside timetable window");
            return vec![];
        }

        let rotation_week = self.current_rotation_week(timetable, date);
        let day_of_week = date.weekday();

        let occurrences: Vec<ResolvedOccurrence<'a>> = classes
            .iter()
            .filter(|class| class.timetable_id() == timetable.id() && class.is_active_on(date))
            .flat_map(|class| {
                class
                    .slots()
                    .iter()
                    .filter(move |slot| {
                        slot.day_of_week() == day_of_week && slot.rotation_week() == rotation_week
                    })
                    .map(move |slot| ResolvedOccurrence { class, slot, date })
            })
            .collect();

        trace!(
            %date,
            rotation_week,
            count = occurrences.len(),
            "resolved active slots"
        );
        occurrences
    }

    /// `days_count` consecutive days starting `offset` days before `anchor`.
    /// The plan is empty when the first day is not a representable date, and
    /// stops early at the last representable one.
    #[tracing::instrument(skip(self, classes, timetable), fields(timetable = %timetable.id()))]
    pub fn week_plan<'a>(
        &self,
        classes: &'a [Class],
        timetable: &Timetable,
        anchor: NaiveDate,
        offset: i64,
        days_count: u32,
    ) -> Vec<PlannedDay<'a>> {
        let Some(first) = offset
            .checked_neg()
            .and_then(|back| calendar::shift_days(anchor, back))
        else {
            debug!(%anchor, offset, "plan starts outside the calendar");
            return vec![];
        };

        let plan: Vec<PlannedDay<'a>> = days_from(first)
            .take(days_count as usize)
            .map(|date| PlannedDay {
                date,
                day_of_week: date.weekday(),
                rotation_week: self.current_rotation_week(timetable, date),
                occurrences: self.slots_active_on(classes, timetable, date),
            })
            .collect();

        debug!(
            first = %first,
            days = plan.len(),
            occurrences = plan.iter().map(|day| day.occurrences.len()).sum::<usize>(),
            "built week plan"
        );
        plan
    }

    /// All occurrences in `[from, to]`, ordered by date and then clock time.
    /// The range is clipped to the timetable window first.
    pub fn occurrences_between<'a>(
        &self,
        classes: &'a [Class],
        timetable: &Timetable,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<ResolvedOccurrence<'a>> {
        let from = from.max(timetable.start_date());
        let to = to.min(timetable.end_date());

        days_from(from)
            .take_while(|date| *date <= to)
            .flat_map(|date| {
                let mut day = self.slots_active_on(classes, timetable, date);
                day.sort_by_key(|occ| occ.band());
                day
            })
            .collect()
    }

    /// First occurrence starting strictly after `now`, looking at most
    /// `horizon_days` days ahead and never past the timetable's last day.
    pub fn next_occurrence<'a>(
        &self,
        classes: &'a [Class],
        timetable: &Timetable,
        now: NaiveDateTime,
        horizon_days: u32,
    ) -> Option<ResolvedOccurrence<'a>> {
        let today = now.date();
        let last = calendar::shift_days(today, i64::from(horizon_days))
            .unwrap_or(NaiveDate::MAX)
            .min(timetable.end_date());

        days_from(today.max(timetable.start_date()))
            .take_while(|date| *date <= last)
            .find_map(|date| {
                let mut day = self.slots_active_on(classes, timetable, date);
                day.sort_by_key(|occ| occ.band());
                day.into_iter().find(|occ| occ.starts_at() > now)
            })
    }
}

/// Consecutive dates from `first`, ending at `NaiveDate::MAX`.
fn days_from(first: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    std::iter::successors(Some(first), |date| date.succ_opt())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, NaiveTime, Weekday};
    use proptest::prelude::*;
    use uuid::Uuid;

    use super::Resolver;
    use crate::model::{Class, Timetable};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
    }

    fn timetable(rotation_length: u32) -> Timetable {
        // 2021-09-06 is a Monday
        Timetable::new("2021/22", ymd(2021, 9, 6), ymd(2022, 7, 15), rotation_length)
            .expect("valid timetable")
    }

    #[test]
    fn two_week_rotation_alternates() {
        let resolver = Resolver::default();
        let tt = timetable(2);
        assert_eq!(resolver.current_rotation_week(&tt, ymd(2021, 9, 6)), 1);
        assert_eq!(resolver.current_rotation_week(&tt, ymd(2021, 9, 12)), 1);
        assert_eq!(resolver.current_rotation_week(&tt, ymd(2021, 9, 13)), 2);
        assert_eq!(resolver.current_rotation_week(&tt, ymd(2021, 9, 20)), 1);
    }

    #[test]
    fn dates_before_start_extrapolate_backwards() {
        let resolver = Resolver::default();
        let tt = timetable(3);
        assert_eq!(resolver.current_rotation_week(&tt, ymd(2021, 9, 5)), 3);
        assert_eq!(resolver.current_rotation_week(&tt, ymd(2021, 8, 29)), 2);
        assert_eq!(resolver.current_rotation_week(&tt, ymd(2021, 8, 22)), 1);
    }

    #[test]
    fn mid_week_start_counts_from_its_week() {
        let resolver = Resolver::default();
        // Thursday start: the following Monday already opens week 2
        let tt = Timetable::new("late start", ymd(2021, 9, 9), ymd(2022, 7, 15), 2)
            .expect("valid timetable");
        assert_eq!(resolver.current_rotation_week(&tt, ymd(2021, 9, 9)), 1);
        assert_eq!(resolver.current_rotation_week(&tt, ymd(2021, 9, 13)), 2);
    }

    #[test]
    fn sunday_week_start_shifts_boundaries() {
        let resolver = Resolver::new(Weekday::Sun);
        let tt = timetable(2);
        // with Sunday weeks, 2021-09-12 (Sunday) opens the next week
        assert_eq!(resolver.current_rotation_week(&tt, ymd(2021, 9, 11)), 1);
        assert_eq!(resolver.current_rotation_week(&tt, ymd(2021, 9, 12)), 2);
    }

    #[test]
    fn rotation_label_is_hidden_for_fixed_schedules() {
        let resolver = Resolver::default();
        assert_eq!(resolver.rotation_label(&timetable(1), ymd(2021, 9, 13)), None);
        assert_eq!(
            resolver.rotation_label(&timetable(2), ymd(2021, 9, 13)),
            Some("Week 2".to_string())
        );
    }

    #[test]
    fn slots_follow_day_week_and_class_window() {
        let resolver = Resolver::default();
        let tt = timetable(2);

        let mut maths = Class::new(tt.id(), "Maths");
        maths.add_slot(Weekday::Mon, 1, hm(9, 0), hm(10, 0)).expect("slot");
        maths.add_slot(Weekday::Mon, 2, hm(11, 0), hm(12, 0)).expect("slot");

        let mut art = Class::new(tt.id(), "Art")
            .with_validity(Some(ymd(2021, 9, 20)), None)
            .expect("window");
        art.add_slot(Weekday::Mon, 1, hm(13, 0), hm(14, 0)).expect("slot");

        let mut other = Class::new(Uuid::new_v4(), "Elsewhere");
        other.add_slot(Weekday::Mon, 1, hm(9, 0), hm(10, 0)).expect("slot");

        let classes = vec![maths, art, other];

        let week_one = resolver.slots_active_on(&classes, &tt, ymd(2021, 9, 6));
        assert_eq!(week_one.len(), 1);
        assert_eq!(week_one[0].class.subject(), "Maths");
        assert_eq!(week_one[0].slot.start_time(), hm(9, 0));

        let week_two = resolver.slots_active_on(&classes, &tt, ymd(2021, 9, 13));
        assert_eq!(week_two.len(), 1);
        assert_eq!(week_two[0].slot.start_time(), hm(11, 0));

        let art_started = resolver.slots_active_on(&classes, &tt, ymd(2021, 9, 20));
        let subjects: Vec<&str> = art_started.iter().map(|occ| occ.class.subject()).collect();
        assert_eq!(subjects, vec!["Maths", "Art"]);

        assert!(resolver.slots_active_on(&classes, &tt, ymd(2021, 9, 7)).is_empty());
    }

    #[test]
    fn nothing_resolves_outside_timetable_window() {
        let resolver = Resolver::default();
        let tt = timetable(1);
        let mut class = Class::new(tt.id(), "Maths");
        class.add_slot(Weekday::Fri, 1, hm(9, 0), hm(10, 0)).expect("slot");
        let classes = vec![class];

        assert!(resolver.slots_active_on(&classes, &tt, ymd(2021, 9, 3)).is_empty());
        assert!(resolver.slots_active_on(&classes, &tt, ymd(2022, 7, 22)).is_empty());
        assert_eq!(resolver.slots_active_on(&classes, &tt, ymd(2021, 9, 10)).len(), 1);
    }

    #[test]
    fn orphaned_week_three_slot_never_resolves() {
        let resolver = Resolver::default();
        for length in 1..=2 {
            let tt = timetable(length);
            let mut class = Class::new(tt.id(), "Chemistry");
            class.add_slot(Weekday::Tue, 3, hm(9, 0), hm(10, 0)).expect("slot");
            let classes = vec![class];
            let hits = resolver.occurrences_between(&classes, &tt, tt.start_date(), tt.end_date());
            assert!(hits.is_empty(), "rotation length {length} resolved an orphan");
        }
    }

    #[test]
    fn week_plan_centres_on_anchor() {
        let resolver = Resolver::default();
        let tt = timetable(2);
        let mut class = Class::new(tt.id(), "Maths");
        class.add_slot(Weekday::Wed, 2, hm(9, 0), hm(10, 0)).expect("slot");
        let classes = vec![class];

        let plan = resolver.week_plan(&classes, &tt, ymd(2021, 9, 15), 3, 7);
        assert_eq!(plan.len(), 7);
        assert_eq!(plan[0].date, ymd(2021, 9, 12));
        assert_eq!(plan[0].rotation_week, 1);
        assert_eq!(plan[1].rotation_week, 2);
        assert_eq!(plan[3].day_of_week, Weekday::Wed);
        assert_eq!(plan[3].occurrences.len(), 1);
        let total: usize = plan.iter().map(|day| day.occurrences.len()).sum();
        assert_eq!(total, 1);

        let again = resolver.week_plan(&classes, &tt, ymd(2021, 9, 15), 3, 7);
        assert_eq!(plan, again);
    }

    #[test]
    fn next_occurrence_skips_started_slots() {
        let resolver = Resolver::default();
        let tt = timetable(1);
        let mut class = Class::new(tt.id(), "Maths");
        class.add_slot(Weekday::Mon, 1, hm(9, 0), hm(10, 0)).expect("slot");
        class.add_slot(Weekday::Mon, 1, hm(14, 0), hm(15, 0)).expect("slot");
        let classes = vec![class];

        let now = ymd(2021, 9, 6).and_time(hm(9, 30));
        let next = resolver
            .next_occurrence(&classes, &tt, now, 7)
            .expect("afternoon slot");
        assert_eq!(next.starts_at(), ymd(2021, 9, 6).and_time(hm(14, 0)));
        assert_eq!(next.ends_at(), ymd(2021, 9, 6).and_time(hm(15, 0)));

        let evening = ymd(2021, 9, 6).and_time(hm(18, 0));
        let next = resolver
            .next_occurrence(&classes, &tt, evening, 7)
            .expect("next monday");
        assert_eq!(next.date, ymd(2021, 9, 13));

        assert!(resolver.next_occurrence(&classes, &tt, evening, 5).is_none());
    }

    fn daily_class(tt: &Timetable) -> Class {
        let mut class = Class::new(tt.id(), "Registration");
        for n in 1..=7 {
            let day = crate::calendar::weekday_from_number(n).expect("valid weekday number");
            class.add_slot(day, 1, hm(8, 30), hm(8, 45)).expect("slot");
        }
        class
    }

    #[test]
    fn unreachable_plan_offsets_yield_empty_plans() {
        let resolver = Resolver::default();
        let tt = timetable(2);
        let classes = vec![daily_class(&tt)];
        let anchor = ymd(2021, 9, 15);

        assert!(resolver.week_plan(&classes, &tt, anchor, 200_000_000, 7).is_empty());
        assert!(resolver.week_plan(&classes, &tt, anchor, -200_000_000, 7).is_empty());
        assert!(resolver.week_plan(&classes, &tt, anchor, i64::MAX, 7).is_empty());
        assert!(resolver.week_plan(&classes, &tt, anchor, i64::MIN, 7).is_empty());
    }

    #[test]
    fn plan_stops_at_last_calendar_day() {
        let resolver = Resolver::default();
        let tt = timetable(1);
        let plan = resolver.week_plan(&[], &tt, NaiveDate::MAX, 2, 7);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[2].date, NaiveDate::MAX);
    }

    #[test]
    fn huge_horizon_is_bounded_by_timetable_end() {
        let resolver = Resolver::default();
        let tt = timetable(1);
        let classes = vec![daily_class(&tt)];

        let now = ymd(2021, 9, 6).and_time(hm(12, 0));
        let next = resolver
            .next_occurrence(&classes, &tt, now, u32::MAX)
            .expect("tomorrow morning");
        assert_eq!(next.date, ymd(2021, 9, 7));

        let after_term = ymd(2022, 7, 15).and_time(hm(12, 0));
        assert!(resolver.next_occurrence(&classes, &tt, after_term, u32::MAX).is_none());
    }

    #[test]
    fn timetable_ending_on_last_calendar_day_resolves() {
        let resolver = Resolver::default();
        let start = NaiveDate::MAX - Duration::days(20);
        let tt = Timetable::new("far future", start, NaiveDate::MAX, 1).expect("valid timetable");
        let classes = vec![daily_class(&tt)];

        let last = resolver.occurrences_between(&classes, &tt, NaiveDate::MAX, NaiveDate::MAX);
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].date, NaiveDate::MAX);

        let week = resolver.occurrences_between(
            &classes,
            &tt,
            NaiveDate::MAX - Duration::days(6),
            NaiveDate::MAX,
        );
        assert_eq!(week.len(), 7);

        let now = (NaiveDate::MAX - Duration::days(1)).and_time(hm(12, 0));
        let next = resolver
            .next_occurrence(&classes, &tt, now, u32::MAX)
            .expect("last day");
        assert_eq!(next.date, NaiveDate::MAX);
    }

    proptest! {
        #[test]
        fn prop_fixed_schedule_is_always_week_one(offset in -20_000i64..20_000) {
            let tt = timetable(1);
            let date = tt.start_date() + Duration::days(offset);
            prop_assert_eq!(Resolver::default().current_rotation_week(&tt, date), 1);
        }

        #[test]
        fn prop_start_date_is_week_one(length in 1u32..12, offset in -3000i64..3000) {
            let start = ymd(2021, 9, 6) + Duration::days(offset);
            let tt = Timetable::new("any", start, start + Duration::days(400), length)
                .expect("valid timetable");
            prop_assert_eq!(Resolver::default().current_rotation_week(&tt, start), 1);
        }

        #[test]
        fn prop_rotation_is_periodic(length in 1u32..12, offset in -3000i64..3000) {
            let resolver = Resolver::default();
            let tt = timetable(length);
            let date = tt.start_date() + Duration::days(offset);
            let later = date + Duration::days(7 * i64::from(length));
            let week = resolver.current_rotation_week(&tt, date);
            prop_assert!(week >= 1 && week <= length);
            prop_assert_eq!(week, resolver.current_rotation_week(&tt, later));
        }

        #[test]
        fn prop_outside_window_is_empty(offset in 1i64..3000) {
            let resolver = Resolver::default();
            let tt = timetable(2);
            let mut class = Class::new(tt.id(), "Maths");
            for day in [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri, Weekday::Sat, Weekday::Sun] {
                for week in 1..=2 {
                    class.add_slot(day, week, hm(9, 0), hm(10, 0)).expect("slot");
                }
            }
            let classes = vec![class];
            let before = tt.start_date() - Duration::days(offset);
            let after = tt.end_date() + Duration::days(offset);
            prop_assert!(resolver.slots_active_on(&classes, &tt, before).is_empty());
            prop_assert!(resolver.slots_active_on(&classes, &tt, after).is_empty());
        }
    }
}
