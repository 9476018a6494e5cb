//! Editing side of the planner: owns timetables and classes and keeps stored
//! slots consistent when timetables change.
//!
//! The resolver never repairs data. Cascades (deleting a timetable, shrinking
//! its rotation) happen here, at the point of the edit.

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ValidationError, ValidationResult};
use crate::model::{Class, Slot, Timetable};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Planner {
    #[serde(default)]
    timetables: Vec<Timetable>,

    #[serde(default)]
    classes: Vec<Class>,
}

impl Planner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks every record, e.g. after loading a snapshot from disk.
    ///
    /// Slots left in weeks beyond their timetable's rotation are reported but
    /// tolerated: the resolver never matches them.
    pub fn validate(&self) -> ValidationResult<()> {
        for timetable in &self.timetables {
            timetable.validate()?;
        }
        for class in &self.classes {
            class.validate()?;
            if self.timetable(class.timetable_id()).is_none() {
                return Err(ValidationError::UnknownTimetable(class.timetable_id()));
            }
        }

        let orphans = self.orphaned_slots();
        if !orphans.is_empty() {
            warn!(
                count = orphans.len(),
                "slots beyond their rotation length will never be scheduled"
            );
        }
        Ok(())
    }

    pub fn timetables(&self) -> &[Timetable] {
        &self.timetables
    }

    /// Every class across all timetables. The resolver filters by timetable.
    pub fn classes(&self) -> &[Class] {
        &self.classes
    }

    pub fn timetable(&self, id: Uuid) -> Option<&Timetable> {
        self.timetables.iter().find(|t| t.id() == id)
    }

    /// Looks a timetable up by id or by case-insensitive name.
    pub fn find_timetable(&self, key: &str) -> Option<&Timetable> {
        if let Ok(id) = key.parse::<Uuid>() {
            return self.timetable(id);
        }
        self.timetables
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(key.trim()))
    }

    pub fn class(&self, id: Uuid) -> Option<&Class> {
        self.classes.iter().find(|c| c.id() == id)
    }

    pub fn classes_of(&self, timetable_id: Uuid) -> impl Iterator<Item = &Class> {
        self.classes
            .iter()
            .filter(move |c| c.timetable_id() == timetable_id)
    }

    /// Slots whose `rotation_week` exceeds their timetable's rotation length.
    pub fn orphaned_slots(&self) -> Vec<&Slot> {
        self.classes
            .iter()
            .filter_map(|class| {
                self.timetable(class.timetable_id())
                    .map(|t| (class, t.rotation_length()))
            })
            .flat_map(|(class, length)| {
                class
                    .slots()
                    .iter()
                    .filter(move |slot| slot.rotation_week() > length)
            })
            .collect()
    }

    #[tracing::instrument(skip(self, timetable), fields(id = %timetable.id(), name = %timetable.name()))]
    pub fn add_timetable(&mut self, timetable: Timetable) -> ValidationResult<Uuid> {
        timetable.validate()?;
        let id = timetable.id();
        self.timetables.push(timetable);
        info!("added timetable");
        Ok(id)
    }

    #[tracing::instrument(skip(self, class), fields(id = %class.id(), subject = %class.subject()))]
    pub fn add_class(&mut self, class: Class) -> ValidationResult<Uuid> {
        let timetable = self
            .timetable(class.timetable_id())
            .ok_or(ValidationError::UnknownTimetable(class.timetable_id()))?;
        class.validate()?;
        for slot in class.slots() {
            slot.validate_for(timetable)?;
        }

        let id = class.id();
        self.classes.push(class);
        info!("added class");
        Ok(id)
    }

    #[tracing::instrument(skip(self))]
    pub fn add_slot(
        &mut self,
        class_id: Uuid,
        day_of_week: Weekday,
        rotation_week: u32,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> ValidationResult<Uuid> {
        let class_idx = self
            .classes
            .iter()
            .position(|c| c.id() == class_id)
            .ok_or(ValidationError::UnknownClass(class_id))?;
        let timetable_id = self.classes[class_idx].timetable_id();
        let rotation_length = self
            .timetable(timetable_id)
            .ok_or(ValidationError::UnknownTimetable(timetable_id))?
            .rotation_length();
        if rotation_week > rotation_length {
            return Err(ValidationError::RotationWeek {
                week: rotation_week,
                rotation_length,
            });
        }

        let slot_id = self.classes[class_idx]
            .add_slot(day_of_week, rotation_week, start_time, end_time)?
            .id();
        debug!(slot = %slot_id, "added slot");
        Ok(slot_id)
    }

    /// Slots are immutable; editing one means removing it and adding the
    /// replacement.
    #[tracing::instrument(skip(self))]
    pub fn remove_slot(&mut self, slot_id: Uuid) -> Option<Slot> {
        let removed = self
            .classes
            .iter_mut()
            .find_map(|class| class.remove_slot(slot_id));
        if removed.is_some() {
            debug!("removed slot");
        }
        removed
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_class(&mut self, class_id: Uuid) -> ValidationResult<Class> {
        let idx = self
            .classes
            .iter()
            .position(|c| c.id() == class_id)
            .ok_or(ValidationError::UnknownClass(class_id))?;
        let class = self.classes.remove(idx);
        info!(slots = class.slots().len(), "deleted class");
        Ok(class)
    }

    /// Deletes a timetable together with its classes and their slots.
    /// Returns the number of classes removed.
    #[tracing::instrument(skip(self))]
    pub fn delete_timetable(&mut self, timetable_id: Uuid) -> ValidationResult<usize> {
        let idx = self
            .timetables
            .iter()
            .position(|t| t.id() == timetable_id)
            .ok_or(ValidationError::UnknownTimetable(timetable_id))?;
        self.timetables.remove(idx);

        let before = self.classes.len();
        self.classes.retain(|c| c.timetable_id() != timetable_id);
        let removed = before - self.classes.len();
        info!(classes = removed, "deleted timetable");
        Ok(removed)
    }

    /// Changes the rotation length. Shrinking it deletes every slot placed in
    /// a week that no longer exists. Returns the number of slots removed.
    #[tracing::instrument(skip(self))]
    pub fn set_rotation_length(
        &mut self,
        timetable_id: Uuid,
        rotation_length: u32,
    ) -> ValidationResult<usize> {
        let timetable = self
            .timetables
            .iter_mut()
            .find(|t| t.id() == timetable_id)
            .ok_or(ValidationError::UnknownTimetable(timetable_id))?;
        let previous = timetable.rotation_length();
        timetable.set_rotation_length(rotation_length)?;

        let mut removed = 0;
        if rotation_length < previous {
            for class in self
                .classes
                .iter_mut()
                .filter(|c| c.timetable_id() == timetable_id)
            {
                removed += class.drop_slots_beyond(rotation_length);
            }
        }

        info!(
            previous,
            rotation_length,
            removed_slots = removed,
            "changed rotation length"
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, Weekday};
    use uuid::Uuid;

    use super::Planner;
    use crate::error::ValidationError;
    use crate::model::{Class, Timetable};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
    }

    fn planner_with_rotation(length: u32) -> (Planner, Uuid, Uuid) {
        let mut planner = Planner::new();
        let tt = Timetable::new("Year 11", ymd(2021, 9, 6), ymd(2022, 7, 15), length)
            .expect("valid timetable");
        let tt_id = planner.add_timetable(tt).expect("add timetable");
        let class_id = planner
            .add_class(Class::new(tt_id, "Biology"))
            .expect("add class");
        (planner, tt_id, class_id)
    }

    #[test]
    fn add_slot_checks_rotation_bounds() {
        let (mut planner, tt_id, class_id) = planner_with_rotation(2);
        planner
            .add_slot(class_id, Weekday::Mon, 2, hm(9, 0), hm(10, 0))
            .expect("week two exists");

        let err = planner
            .add_slot(class_id, Weekday::Mon, 3, hm(9, 0), hm(10, 0))
            .expect_err("week three does not");
        assert_eq!(
            err,
            ValidationError::RotationWeek {
                week: 3,
                rotation_length: 2
            }
        );

        let err = planner
            .add_slot(Uuid::new_v4(), Weekday::Mon, 1, hm(9, 0), hm(10, 0))
            .expect_err("unknown class");
        assert_eq!(err.field(), "class_id");
        assert_eq!(planner.classes_of(tt_id).count(), 1);
    }

    #[test]
    fn add_class_requires_known_timetable() {
        let mut planner = Planner::new();
        let ghost = Uuid::new_v4();
        let err = planner
            .add_class(Class::new(ghost, "Drama"))
            .expect_err("no such timetable");
        assert_eq!(err, ValidationError::UnknownTimetable(ghost));
    }

    #[test]
    fn shrinking_rotation_cascades_to_slots() {
        let (mut planner, tt_id, class_id) = planner_with_rotation(3);
        for week in 1..=3 {
            planner
                .add_slot(class_id, Weekday::Tue, week, hm(9, 0), hm(10, 0))
                .expect("slot");
        }

        let removed = planner.set_rotation_length(tt_id, 2).expect("shrink");
        assert_eq!(removed, 1);
        let weeks: Vec<u32> = planner
            .class(class_id)
            .expect("class survives")
            .slots()
            .iter()
            .map(|s| s.rotation_week())
            .collect();
        assert_eq!(weeks, vec![1, 2]);

        let removed = planner.set_rotation_length(tt_id, 4).expect("grow");
        assert_eq!(removed, 0);
        assert!(planner.orphaned_slots().is_empty());

        let err = planner
            .set_rotation_length(tt_id, 0)
            .expect_err("zero rotation");
        assert_eq!(err.field(), "rotation_length");
    }

    #[test]
    fn deleting_timetable_drops_its_classes() {
        let (mut planner, tt_id, _) = planner_with_rotation(1);
        let other = Timetable::new("Clubs", ymd(2021, 9, 6), ymd(2022, 7, 15), 1)
            .expect("valid timetable");
        let other_id = planner.add_timetable(other).expect("add");
        planner
            .add_class(Class::new(other_id, "Chess"))
            .expect("add class");

        assert_eq!(planner.delete_timetable(tt_id).expect("delete"), 1);
        assert_eq!(planner.timetables().len(), 1);
        assert_eq!(planner.classes().len(), 1);
        assert_eq!(planner.classes()[0].subject(), "Chess");
    }

    #[test]
    fn deleting_class_takes_its_slots_only() {
        let (mut planner, tt_id, class_id) = planner_with_rotation(1);
        planner
            .add_slot(class_id, Weekday::Mon, 1, hm(9, 0), hm(10, 0))
            .expect("slot");
        let keep = planner
            .add_class(Class::new(tt_id, "History"))
            .expect("add class");
        let kept_slot = planner
            .add_slot(keep, Weekday::Mon, 1, hm(9, 0), hm(10, 0))
            .expect("slot");

        let removed = planner.delete_class(class_id).expect("delete");
        assert_eq!(removed.subject(), "Biology");
        assert_eq!(removed.slots().len(), 1);

        assert!(planner.class(class_id).is_none());
        assert_eq!(planner.classes().len(), 1);
        let history = planner.class(keep).expect("other class survives");
        assert_eq!(history.slots().len(), 1);
        assert_eq!(history.slots()[0].id(), kept_slot);

        let err = planner.delete_class(class_id).expect_err("already gone");
        assert_eq!(err, ValidationError::UnknownClass(class_id));
    }

    #[test]
    fn validate_rejects_slot_filed_under_wrong_class() {
        let (mut planner, _, class_id) = planner_with_rotation(1);
        planner
            .add_slot(class_id, Weekday::Mon, 1, hm(9, 0), hm(10, 0))
            .expect("slot");
        planner.validate().expect("consistent planner");

        let snapshot = toml::to_string(&planner).expect("serialize");
        let stranger = Uuid::new_v4();
        let tampered = snapshot.replacen(
            &format!("class_id = \"{class_id}\""),
            &format!("class_id = \"{stranger}\""),
            1,
        );
        assert_ne!(snapshot, tampered);

        let loaded: Planner = toml::from_str(&tampered).expect("parse");
        let err = loaded.validate().expect_err("slot owner mismatch");
        assert_eq!(err.field(), "class_id");
        assert!(matches!(err, ValidationError::SlotOwner { class_id: owner, .. } if owner == class_id));
    }

    #[test]
    fn remove_slot_finds_it_in_any_class() {
        let (mut planner, _, class_id) = planner_with_rotation(1);
        let slot_id = planner
            .add_slot(class_id, Weekday::Fri, 1, hm(12, 0), hm(13, 0))
            .expect("slot");
        let removed = planner.remove_slot(slot_id).expect("slot exists");
        assert_eq!(removed.id(), slot_id);
        assert!(planner.remove_slot(slot_id).is_none());
    }

    #[test]
    fn find_timetable_by_name_or_id() {
        let (planner, tt_id, _) = planner_with_rotation(1);
        assert_eq!(planner.find_timetable("year 11").map(|t| t.id()), Some(tt_id));
        assert_eq!(
            planner.find_timetable(&tt_id.to_string()).map(|t| t.id()),
            Some(tt_id)
        );
        assert!(planner.find_timetable("Year 12").is_none());
    }
}
