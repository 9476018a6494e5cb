use std::io::{self, Write};

use anyhow::{Context, anyhow};
use chrono::{NaiveDate, NaiveDateTime, Weekday};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::calendar;
use crate::cli::Command;
use crate::config::{Config, DEFAULT_PLAN_DAYS};
use crate::datastore::DataStore;
use crate::datetime::{parse_clock_time, parse_date_expr, parse_weekday_name};
use crate::editor::Planner;
use crate::grouper::group;
use crate::model::{Class, Slot, Timetable};
use crate::render::Renderer;
use crate::resolver::Resolver;

/// Everything a command needs besides its own arguments.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub today: NaiveDate,
    pub now: NaiveDateTime,
    pub week_start: Weekday,
    pub timetable: Option<String>,
    pub json: bool,
}

#[instrument(skip(store, cfg, renderer, ctx))]
pub fn dispatch(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    ctx: &RunContext,
    command: Command,
) -> anyhow::Result<()> {
    let mut planner = store.load()?;
    let resolver = Resolver::new(ctx.week_start);

    debug!(
        ?command,
        timetables = planner.timetables().len(),
        "dispatching command"
    );

    match command {
        Command::Week { date } => {
            let timetable = select_timetable(&planner, cfg, ctx)?;
            let date = resolve_date(date.as_deref(), ctx.today)?;
            let week = resolver.current_rotation_week(timetable, date);
            if ctx.json {
                return print_json(&json!({
                    "timetable": timetable.id(),
                    "date": date,
                    "rotation_week": week,
                    "rotation_length": timetable.rotation_length(),
                    "label": resolver.rotation_label(timetable, date),
                }));
            }
            renderer.print_rotation_week(timetable, date, resolver.rotation_label(timetable, date))
        }
        Command::Day { date } => {
            let timetable = select_timetable(&planner, cfg, ctx)?;
            let date = resolve_date(date.as_deref(), ctx.today)?;
            let occurrences = resolver.slots_active_on(planner.classes(), timetable, date);
            let groups = group(occurrences);
            if ctx.json {
                return print_json(&groups);
            }
            renderer.print_day(&groups)
        }
        Command::Plan { date, days, offset } => {
            let timetable = select_timetable(&planner, cfg, ctx)?;
            let anchor = resolve_date(date.as_deref(), ctx.today)?;
            let days = match days {
                Some(days) => days,
                None => cfg.get_u32("plan.days")?.unwrap_or(DEFAULT_PLAN_DAYS),
            };
            let offset = match offset {
                Some(offset) => offset,
                None => cfg.get_i64("plan.offset")?.unwrap_or(0),
            };
            plan_start(anchor, offset)?;
            let plan = resolver.week_plan(planner.classes(), timetable, anchor, offset, days);
            if ctx.json {
                return print_json(&plan);
            }
            renderer.print_plan(&plan, timetable.is_fixed())
        }
        Command::Groups { week } => {
            let timetable = select_timetable(&planner, cfg, ctx)?;
            let slots: Vec<&Slot> = planner
                .classes_of(timetable.id())
                .flat_map(|class| class.slots())
                .filter(|slot| week.is_none_or(|w| slot.rotation_week() == w))
                .collect();
            let groups = group(slots);
            if ctx.json {
                return print_json(&groups);
            }
            renderer.print_groups(&groups, &planner, timetable.is_fixed())
        }
        Command::Next { horizon } => {
            let timetable = select_timetable(&planner, cfg, ctx)?;
            let next = resolver.next_occurrence(planner.classes(), timetable, ctx.now, horizon);
            if ctx.json {
                return print_json(&next);
            }
            renderer.print_next(next.as_ref())
        }
        Command::AddTimetable {
            name,
            start,
            end,
            rotation,
        } => {
            let start = resolve_date(Some(&start), ctx.today)?;
            let end = resolve_date(Some(&end), ctx.today)?;
            let timetable = Timetable::new(name, start, end, rotation)?;
            let id = planner.add_timetable(timetable)?;
            store.save(&planner)?;
            renderer.print_message(&format!("created timetable {id}"))
        }
        Command::AddClass {
            subject,
            room,
            teacher,
            from,
            until,
        } => {
            let timetable_id = select_timetable(&planner, cfg, ctx)?.id();
            let from = from
                .as_deref()
                .map(|raw| resolve_date(Some(raw), ctx.today))
                .transpose()?;
            let until = until
                .as_deref()
                .map(|raw| resolve_date(Some(raw), ctx.today))
                .transpose()?;

            let mut class = Class::new(timetable_id, subject).with_validity(from, until)?;
            if let Some(room) = room {
                class = class.with_room(room);
            }
            if let Some(teacher) = teacher {
                class = class.with_teacher(teacher);
            }
            let id = planner.add_class(class)?;
            store.save(&planner)?;
            renderer.print_message(&format!("created class {id}"))
        }
        Command::AddSlot {
            class,
            day,
            start,
            end,
            week,
        } => {
            let timetable_id = select_timetable(&planner, cfg, ctx)?.id();
            let class_id = find_class(&planner, timetable_id, &class)?;
            let day = parse_weekday_name(&day).ok_or_else(|| anyhow!("invalid weekday: {day}"))?;
            let start_time =
                parse_clock_time(&start).ok_or_else(|| anyhow!("invalid start time: {start}"))?;
            let end_time =
                parse_clock_time(&end).ok_or_else(|| anyhow!("invalid end time: {end}"))?;

            let id = planner.add_slot(class_id, day, week, start_time, end_time)?;
            store.save(&planner)?;
            renderer.print_message(&format!("created slot {id}"))
        }
        Command::SetRotation { length } => {
            let timetable_id = select_timetable(&planner, cfg, ctx)?.id();
            let removed = planner.set_rotation_length(timetable_id, length)?;
            store.save(&planner)?;
            info!(removed, "rotation length updated");
            renderer.print_message(&format!(
                "rotation length set to {length}; removed {removed} slot(s)"
            ))
        }
        Command::DeleteClass { class } => {
            let timetable_id = select_timetable(&planner, cfg, ctx)?.id();
            let class_id = find_class(&planner, timetable_id, &class)?;
            let removed = planner.delete_class(class_id)?;
            store.save(&planner)?;
            renderer.print_message(&format!(
                "deleted class {} and {} slot(s)",
                removed.subject(),
                removed.slots().len()
            ))
        }
        Command::DeleteTimetable => {
            let timetable_id = select_timetable(&planner, cfg, ctx)?.id();
            let removed = planner.delete_timetable(timetable_id)?;
            store.save(&planner)?;
            renderer.print_message(&format!(
                "deleted timetable {timetable_id} and {removed} class(es)"
            ))
        }
    }
}

/// First day of a plan, rejecting offsets that leave the calendar.
fn plan_start(anchor: NaiveDate, offset: i64) -> anyhow::Result<NaiveDate> {
    offset
        .checked_neg()
        .and_then(|back| calendar::shift_days(anchor, back))
        .ok_or_else(|| anyhow!("plan offset {offset} moves outside the calendar"))
}

fn resolve_date(raw: Option<&str>, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    match raw {
        Some(raw) => parse_date_expr(raw, today),
        None => Ok(today),
    }
}

/// Picks the timetable named on the command line, then `default.timetable`,
/// then the only timetable if there is exactly one.
fn select_timetable<'a>(
    planner: &'a Planner,
    cfg: &Config,
    ctx: &RunContext,
) -> anyhow::Result<&'a Timetable> {
    let key = ctx
        .timetable
        .clone()
        .or_else(|| cfg.get("default.timetable"));

    if let Some(key) = key {
        return planner
            .find_timetable(&key)
            .ok_or_else(|| anyhow!("no timetable named {key}"));
    }

    match planner.timetables() {
        [] => Err(anyhow!("no timetables yet; create one with add-timetable")),
        [only] => Ok(only),
        many => {
            let names = many
                .iter()
                .map(|t| t.name())
                .collect::<Vec<_>>()
                .join(", ");
            Err(anyhow!("several timetables exist ({names}); pick one with --timetable"))
        }
    }
}

fn find_class(planner: &Planner, timetable_id: uuid::Uuid, key: &str) -> anyhow::Result<uuid::Uuid> {
    if let Ok(id) = key.parse::<uuid::Uuid>() {
        return planner
            .class(id)
            .map(|c| c.id())
            .ok_or_else(|| anyhow!("class not found: {id}"));
    }
    planner
        .classes_of(timetable_id)
        .find(|c| c.subject().eq_ignore_ascii_case(key.trim()))
        .map(|c| c.id())
        .ok_or_else(|| anyhow!("no class named {key}"))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value).context("failed to encode JSON")?;
    writeln!(out)?;
    Ok(())
}
