/*
 * Copyright (c) 2025 Clément GRENNERAT
 *
 * This program is free software: you can redistribute it and/or modify it under the terms of the
 * GNU General Public License as published by the Free Software Foundation, version 3.
 * This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
 * even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
 * See the GNU General Public License for more details.
 * You should have received a copy of the GNU General Public License along with this program.
 * If not, see https://www.gnu.org/licenses/.
 *
 */

use crate::interval::RidSet;
use crate::model::job::{Job, PlaceholderType};
use crate::scheduler::slot::Slot;
use prettytable::{format, row, Table};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

/// The resource calendar of one scheduling round.
///
/// Slots live in an arena keyed by sid and chain into a doubly linked list
/// ordered by time. The chain always tiles `[begin, end]`: no gap, no
/// overlap, every instant belongs to exactly one slot. Marking a job forces
/// slot boundaries at its window edges, so a slot never partially overlaps
/// anything that was placed.
pub struct SlotSet {
    arena: HashMap<i32, Slot>,
    first_sid: i32,
    last_sid: i32,
    next_sid: i32,
    begin: i64,
    end: i64,
}

impl SlotSet {
    /// Calendar with a single slot offering `itvs` over the whole horizon.
    pub fn new(itvs: RidSet, begin: i64, end: i64) -> SlotSet {
        SlotSet {
            arena: HashMap::from([(1, Slot::new(1, begin, end, itvs))]),
            first_sid: 1,
            last_sid: 1,
            next_sid: 2,
            begin,
            end,
        }
    }

    pub fn begin(&self) -> i64 {
        self.begin
    }
    pub fn end(&self) -> i64 {
        self.end
    }
    pub fn slot_count(&self) -> usize {
        self.arena.len()
    }
    pub fn first_sid(&self) -> i32 {
        self.first_sid
    }
    pub fn last_sid(&self) -> i32 {
        self.last_sid
    }
    pub fn slot(&self, sid: i32) -> Option<&Slot> {
        self.arena.get(&sid)
    }
    pub fn slot_mut(&mut self, sid: i32) -> Option<&mut Slot> {
        self.arena.get_mut(&sid)
    }

    /// Walks the chain in time order.
    pub fn slots(&self) -> SlotWalk {
        SlotWalk {
            arena: &self.arena,
            cursor: Some(self.first_sid),
        }
    }

    /// Sid of the slot whose span contains `time`. The walk starts at `from`
    /// when given, which must not be past `time` in the chain.
    pub fn sid_at(&self, time: i64, from: Option<i32>) -> Option<i32> {
        let mut cursor = from.or(Some(self.first_sid));
        while let Some(sid) = cursor {
            let slot = self.arena.get(&sid)?;
            if time < slot.begin {
                return None;
            }
            if time <= slot.end {
                return Some(sid);
            }
            cursor = slot.next;
        }
        None
    }

    /// Slot whose span contains `time`.
    pub fn slot_at(&self, time: i64) -> Option<&Slot> {
        self.sid_at(time, None).and_then(|sid| self.arena.get(&sid))
    }

    /// Sids of the first and last slots overlapping `[begin, end]`. Bounds
    /// sticking out of the calendar are clamped to its edges; a window lying
    /// entirely off the calendar has no encompassing slots.
    pub fn encompassing(&self, begin: i64, end: i64, from: Option<i32>) -> Option<(i32, i32)> {
        let first = if begin < self.begin {
            Some(self.first_sid)
        } else {
            self.sid_at(begin, from)
        }?;
        let last = if end > self.end { Some(self.last_sid) } else { self.sid_at(end, Some(first)) }?;
        Some((first, last))
    }

    /// Cuts the slot `sid` right before `time`: the slot keeps
    /// `[begin, time - 1]`, a fresh slot takes `[time, end]` with the same
    /// free set and grants. Returns the sid of the fresh right-hand slot.
    fn carve(&mut self, sid: i32, time: i64) -> i32 {
        let right_sid = self.next_sid;
        self.next_sid += 1;

        let slot = self.arena.get_mut(&sid).expect("carve: unknown sid");
        assert!(
            time > slot.begin && time <= slot.end,
            "carve: cut point {} outside of ({}, {}]",
            time,
            slot.begin,
            slot.end
        );
        let mut right = slot.clone_into(right_sid, time, slot.end);
        right.prev = Some(sid);
        right.next = slot.next;
        slot.end = time - 1;
        slot.next = Some(right_sid);

        match right.next {
            Some(after_sid) => {
                if let Some(after) = self.arena.get_mut(&after_sid) {
                    after.prev = Some(right_sid);
                }
            }
            None => self.last_sid = right_sid,
        }
        self.arena.insert(right_sid, right);
        right_sid
    }

    /// Forces a slot boundary right before `time` and returns the sid of the
    /// slot now beginning at `time`. None when `time` is off the calendar.
    pub fn split_at(&mut self, time: i64) -> Option<i32> {
        let sid = self.sid_at(time, None)?;
        if self.arena.get(&sid)?.begin == time {
            Some(sid)
        } else {
            Some(self.carve(sid, time))
        }
    }

    /// Makes `[begin, end]` an exact union of whole slots and returns the
    /// first and last sid of that tiling. Bounds are clamped like
    /// [`Self::encompassing`]; None when the window misses the calendar.
    fn split_for_window(&mut self, begin: i64, end: i64, from: Option<i32>) -> Option<(i32, i32)> {
        let (head, tail) = self.encompassing(begin, end, from)?;
        let mut first = head;
        let mut last = tail;
        if self.arena[&first].begin < begin {
            // The head slot keeps the part before the window, the window side
            // of the cut becomes the new first slot.
            first = self.carve(first, begin);
            if last == head {
                last = first;
            }
        }
        if self.arena[&last].end > end {
            self.carve(last, end + 1);
        }
        Some((first, last))
    }

    /// Removes `itvs` from every slot covering `[begin, end]`, cutting the
    /// edges as needed. Used for resource availability windows.
    pub fn occupy_window(&mut self, begin: i64, end: i64, itvs: &RidSet) {
        self.update_window(begin, end, itvs, true);
    }
    /// Adds `itvs` to every slot covering `[begin, end]`, cutting the edges
    /// as needed. Used to feed derived container calendars.
    pub fn offer_window(&mut self, begin: i64, end: i64, itvs: &RidSet) {
        self.update_window(begin, end, itvs, false);
    }
    fn update_window(&mut self, begin: i64, end: i64, itvs: &RidSet, occupy: bool) {
        let Some((first, last)) = self.split_for_window(begin, end, None) else {
            return;
        };
        let mut cursor = Some(first);
        while let Some(sid) = cursor {
            let slot = self.arena.get_mut(&sid).expect("update_window: broken chain");
            if occupy {
                slot.occupy(itvs);
            } else {
                slot.release(itvs);
            }
            cursor = if sid == last { None } else { slot.next };
        }
    }

    /// Marks a job's assignment on the calendar: its resources leave the free
    /// set of every slot of its window (or come back when `occupy` is false),
    /// and timesharing or placeholder jobs record the matching grant so the
    /// jobs they designate keep seeing those resources.
    fn mark_job(&mut self, job: &Job, occupy: bool, from: Option<i32>) -> Option<(i32, i32)> {
        let assignment = job.assignment.as_ref().expect("mark_job: job has no assignment");
        let (first, last) = self.split_for_window(assignment.begin, assignment.end, from)?;
        let itvs = &assignment.resources;

        let mut cursor = Some(first);
        while let Some(sid) = cursor {
            let slot = self.arena.get_mut(&sid).expect("mark_job: broken chain");
            if occupy {
                slot.occupy(itvs);
            } else {
                slot.release(itvs);
            }
            if let Some(ts) = &job.time_sharing {
                let (user, name) = ts.sharing_key(job);
                slot.shared.grant_time_sharing(user, name, itvs);
            }
            match &job.placeholder {
                PlaceholderType::Placeholder(name) => slot.shared.grant_placeholder(name, itvs),
                PlaceholderType::Allow(name) if occupy => slot.shared.consume_placeholder(name, itvs),
                _ => {}
            }
            cursor = if sid == last { None } else { slot.next };
        }
        Some((first, last))
    }

    /// Places a scheduled job: its resources become busy over its window.
    /// Returns the window's (first, last) sids, or None when the assignment
    /// does not touch the calendar.
    pub fn place_job(&mut self, job: &Job, from: Option<i32>) -> Option<(i32, i32)> {
        self.mark_job(job, true, from)
    }

    /// Reverse of [`Self::place_job`]: the job's resources are offered again.
    pub fn add_job_resources(&mut self, job: &Job) -> Option<(i32, i32)> {
        self.mark_job(job, false, None)
    }

    /// Places a batch of jobs. They must be sorted by start time: each
    /// placement resumes the chain walk where the previous one began.
    pub fn place_jobs(&mut self, jobs: &[&Job]) {
        let mut from = None;
        for job in jobs {
            if let Some((first, _last)) = self.place_job(job, from) {
                from = Some(first);
            }
        }
    }

    /// Resources free in every slot from `first` to `last` (inclusive).
    pub fn free_itvs_in(&self, first: i32, last: i32) -> RidSet {
        let mut free = RidSet::from_iter([u32::MIN..=u32::MAX]);
        let mut cursor = Some(first);
        while let Some(sid) = cursor {
            let Some(slot) = self.arena.get(&sid) else {
                break;
            };
            free = free & &slot.itvs;
            cursor = if sid == last { None } else { slot.next };
        }
        free
    }

    /// Resources the given job can use over the whole `[begin, end]` window:
    /// the free sets, plus the timesharing grants covering the job's user and
    /// name, plus the capacity of the placeholder it is allowed on.
    pub fn free_itvs_for_job(&self, job: &Job, begin: i64, end: i64) -> RidSet {
        let Some((first, last)) = self.encompassing(begin, end, None) else {
            return RidSet::new();
        };
        let mut free = RidSet::from_iter([u32::MIN..=u32::MAX]);
        let mut cursor = Some(first);
        while let Some(sid) = cursor {
            let Some(slot) = self.arena.get(&sid) else {
                break;
            };
            let mut usable = slot.itvs.clone();
            if job.time_sharing.is_some() {
                usable |= slot
                    .shared
                    .time_sharing_for(job.user.as_deref().unwrap_or(""), job.name.as_deref().unwrap_or(""));
            }
            if let PlaceholderType::Allow(name) = &job.placeholder {
                usable |= slot.shared.placeholder_for(name);
            }
            free = free & usable;
            cursor = if sid == last { None } else { slot.next };
        }
        free
    }

    /// Debug dump of the chain, one row per slot.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_CLEAN);
        table.add_row(row![buFc->"Sid", buFc->"Begin", buFc->"End", buFc->"Hours", buFc->"Free rids", buFc->"Links"]);
        for slot in self.slots() {
            table.add_row(row![
                slot.sid,
                slot.begin,
                slot.end,
                format!("{:.1}", slot.width() as f32 / 3600.0),
                slot.itvs,
                format!("{:?} <-> {:?}", slot.prev, slot.next)
            ]);
        }
        table
    }
}

impl Debug for SlotSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SlotSet [{}, {}] ({} slots, head {}, tail {})",
            self.begin,
            self.end,
            self.arena.len(),
            self.first_sid,
            self.last_sid
        )
    }
}

/// Forward iterator over the slots of a chain.
pub struct SlotWalk<'a> {
    arena: &'a HashMap<i32, Slot>,
    cursor: Option<i32>,
}

impl<'a> Iterator for SlotWalk<'a> {
    type Item = &'a Slot;
    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.arena.get(&self.cursor?)?;
        self.cursor = slot.next;
        Some(slot)
    }
}

/// Derived calendars for container jobs.
///
/// A scheduled container donates its assigned window, with the security tail
/// removed, to the slot set named by its `container` tag; inner jobs then
/// resolve that calendar through [`Job::slot_set_name`]. Several containers
/// may feed the same name. Nothing happens for a container that is not
/// scheduled yet.
pub fn feed_container_slot_set(slot_sets: &mut HashMap<Box<str>, SlotSet>, job: &Job, security_time: i64) {
    let Some(assignment) = &job.assignment else {
        return;
    };
    let name = job.container_slot_set_name();
    let (begin, end) = {
        let default = slot_sets.get("default").expect("feed_container_slot_set: no default slot set");
        (default.begin(), default.end())
    };
    let derived = slot_sets.entry(name).or_insert_with(|| SlotSet::new(RidSet::new(), begin, end));
    derived.offer_window(assignment.begin, assignment.end - security_time, &assignment.resources);
}
