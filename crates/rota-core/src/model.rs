use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::{self, weekday_from_number};
use crate::error::{ValidationError, ValidationResult};

/// Anything that sits on a weekly grid: a stored slot, a resolved occurrence,
/// or an already merged display group.
pub trait Scheduled {
    fn start_time(&self) -> NaiveTime;
    fn end_time(&self) -> NaiveTime;
    fn day_of_week(&self) -> Weekday;
    fn rotation_week(&self) -> u32;

    fn band(&self) -> (NaiveTime, NaiveTime) {
        (self.start_time(), self.end_time())
    }
}

impl<T: Scheduled + ?Sized> Scheduled for &T {
    fn start_time(&self) -> NaiveTime {
        (**self).start_time()
    }

    fn end_time(&self) -> NaiveTime {
        (**self).end_time()
    }

    fn day_of_week(&self) -> Weekday {
        (**self).day_of_week()
    }

    fn rotation_week(&self) -> u32 {
        (**self).rotation_week()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timetable {
    id: Uuid,
    name: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    rotation_length: u32,
}

impl Timetable {
    pub fn new(
        name: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        rotation_length: u32,
    ) -> ValidationResult<Self> {
        let timetable = Self {
            id: Uuid::new_v4(),
            name: name.into(),
            start_date,
            end_date,
            rotation_length,
        };
        timetable.validate()?;
        Ok(timetable)
    }

    /// Re-checks the invariants, for records that bypassed [`Timetable::new`]
    /// such as deserialized snapshots.
    pub fn validate(&self) -> ValidationResult<()> {
        if self.start_date > self.end_date {
            return Err(ValidationError::DateRange {
                field: "start_date",
                start: self.start_date,
                end: self.end_date,
            });
        }
        if self.rotation_length < 1 {
            return Err(ValidationError::RotationLength(self.rotation_length));
        }
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn rotation_length(&self) -> u32 {
        self.rotation_length
    }

    /// Fixed scheduling: every week looks the same and no week label is shown.
    pub fn is_fixed(&self) -> bool {
        self.rotation_length == 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        calendar::is_within(date, Some(self.start_date), Some(self.end_date))
    }

    pub(crate) fn set_rotation_length(&mut self, rotation_length: u32) -> ValidationResult<()> {
        if rotation_length < 1 {
            return Err(ValidationError::RotationLength(rotation_length));
        }
        self.rotation_length = rotation_length;
        Ok(())
    }
}

/// A subject taught inside one timetable, owning its recurring slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    id: Uuid,
    timetable_id: Uuid,
    subject: String,

    #[serde(default)]
    room: Option<String>,

    #[serde(default)]
    teacher: Option<String>,

    #[serde(default)]
    valid_from: Option<NaiveDate>,

    #[serde(default)]
    valid_until: Option<NaiveDate>,

    #[serde(default)]
    slots: Vec<Slot>,
}

impl Class {
    pub fn new(timetable_id: Uuid, subject: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timetable_id,
            subject: subject.into(),
            room: None,
            teacher: None,
            valid_from: None,
            valid_until: None,
            slots: vec![],
        }
    }

    /// Narrows the class to `[valid_from, valid_until]`. `None` on either
    /// side means the class follows the timetable on that side.
    pub fn with_validity(
        mut self,
        valid_from: Option<NaiveDate>,
        valid_until: Option<NaiveDate>,
    ) -> ValidationResult<Self> {
        self.valid_from = valid_from;
        self.valid_until = valid_until;
        self.validate()?;
        Ok(self)
    }

    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    pub fn with_teacher(mut self, teacher: impl Into<String>) -> Self {
        self.teacher = Some(teacher.into());
        self
    }

    pub fn validate(&self) -> ValidationResult<()> {
        if let (Some(start), Some(end)) = (self.valid_from, self.valid_until)
            && start > end
        {
            return Err(ValidationError::DateRange {
                field: "valid_from",
                start,
                end,
            });
        }
        for slot in &self.slots {
            if slot.class_id != self.id {
                return Err(ValidationError::SlotOwner {
                    slot: slot.id,
                    class_id: self.id,
                    found: slot.class_id,
                });
            }
            slot.validate()?;
        }
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn timetable_id(&self) -> Uuid {
        self.timetable_id
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    pub fn teacher(&self) -> Option<&str> {
        self.teacher.as_deref()
    }

    pub fn valid_from(&self) -> Option<NaiveDate> {
        self.valid_from
    }

    pub fn valid_until(&self) -> Option<NaiveDate> {
        self.valid_until
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        calendar::is_within(date, self.valid_from, self.valid_until)
    }

    /// Adds a slot owned by this class. The upper bound of `rotation_week`
    /// depends on the timetable and is checked by the planner.
    pub fn add_slot(
        &mut self,
        day_of_week: Weekday,
        rotation_week: u32,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> ValidationResult<&Slot> {
        let slot = Slot::new(self.id, day_of_week, rotation_week, start_time, end_time)?;
        self.slots.push(slot);
        Ok(&self.slots[self.slots.len() - 1])
    }

    pub(crate) fn remove_slot(&mut self, slot_id: Uuid) -> Option<Slot> {
        let idx = self.slots.iter().position(|slot| slot.id == slot_id)?;
        Some(self.slots.remove(idx))
    }

    /// Drops slots placed in weeks beyond `rotation_length`, returning how
    /// many were removed.
    pub(crate) fn drop_slots_beyond(&mut self, rotation_length: u32) -> usize {
        let before = self.slots.len();
        self.slots.retain(|slot| slot.rotation_week <= rotation_length);
        before - self.slots.len()
    }
}

/// One recurring weekly time rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    id: Uuid,
    class_id: Uuid,
    day_of_week: Weekday,
    rotation_week: u32,
    start_time: NaiveTime,
    end_time: NaiveTime,
}

impl Slot {
    pub fn new(
        class_id: Uuid,
        day_of_week: Weekday,
        rotation_week: u32,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> ValidationResult<Self> {
        let slot = Self {
            id: Uuid::new_v4(),
            class_id,
            day_of_week,
            rotation_week,
            start_time,
            end_time,
        };
        slot.validate()?;
        Ok(slot)
    }

    /// Same as [`Slot::new`] but with the weekday given as 1 (Monday) to 7.
    pub fn with_day_number(
        class_id: Uuid,
        day_number: u32,
        rotation_week: u32,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> ValidationResult<Self> {
        let day = weekday_from_number(day_number).ok_or(ValidationError::DayOfWeek(day_number))?;
        Self::new(class_id, day, rotation_week, start_time, end_time)
    }

    pub fn validate(&self) -> ValidationResult<()> {
        if self.start_time >= self.end_time {
            return Err(ValidationError::TimeRange {
                start: self.start_time,
                end: self.end_time,
            });
        }
        if self.rotation_week < 1 {
            return Err(ValidationError::RotationWeek {
                week: self.rotation_week,
                rotation_length: 1,
            });
        }
        Ok(())
    }

    /// Checks the week against the timetable the slot is stored under.
    pub fn validate_for(&self, timetable: &Timetable) -> ValidationResult<()> {
        self.validate()?;
        if self.rotation_week > timetable.rotation_length() {
            return Err(ValidationError::RotationWeek {
                week: self.rotation_week,
                rotation_length: timetable.rotation_length(),
            });
        }
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn class_id(&self) -> Uuid {
        self.class_id
    }

    pub fn day_of_week(&self) -> Weekday {
        self.day_of_week
    }

    pub fn rotation_week(&self) -> u32 {
        self.rotation_week
    }

    pub fn start_time(&self) -> NaiveTime {
        self.start_time
    }

    pub fn end_time(&self) -> NaiveTime {
        self.end_time
    }
}

impl Scheduled for Slot {
    fn start_time(&self) -> NaiveTime {
        self.start_time
    }

    fn end_time(&self) -> NaiveTime {
        self.end_time
    }

    fn day_of_week(&self) -> Weekday {
        self.day_of_week
    }

    fn rotation_week(&self) -> u32 {
        self.rotation_week
    }
}
