//! Validation errors raised when schedule records are constructed or edited.

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;
use uuid::Uuid;

/// Rejection of a malformed Timetable, Class or Slot.
///
/// The resolver and grouper never produce these: they assume every record
/// already passed through a constructor or the [`crate::editor::Planner`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("start_time {start} must be before end_time {end}")]
    TimeRange { start: NaiveTime, end: NaiveTime },

    #[error("{field}: start {start} is after end {end}")]
    DateRange {
        field: &'static str,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("rotation_length must be at least 1, got {0}")]
    RotationLength(u32),

    #[error("rotation_week {week} is outside 1..={rotation_length}")]
    RotationWeek { week: u32, rotation_length: u32 },

    #[error("day_of_week must be within 1..=7, got {0}")]
    DayOfWeek(u32),

    #[error("timetable not found: {0}")]
    UnknownTimetable(Uuid),

    #[error("class not found: {0}")]
    UnknownClass(Uuid),

    #[error("slot {slot} is stored under class {class_id} but names {found}")]
    SlotOwner { slot: Uuid, class_id: Uuid, found: Uuid },
}

impl ValidationError {
    /// Name of the record field the error refers to.
    pub fn field(&self) -> &'static str {
        match self {
            Self::TimeRange { .. } => "start_time",
            Self::DateRange { field, .. } => field,
            Self::RotationLength(_) => "rotation_length",
            Self::RotationWeek { .. } => "rotation_week",
            Self::DayOfWeek(_) => "day_of_week",
            Self::UnknownTimetable(_) => "timetable_id",
            Self::UnknownClass(_) | Self::SlotOwner { .. } => "class_id",
        }
    }
}

pub type ValidationResult<T> = Result<T, ValidationError>;
