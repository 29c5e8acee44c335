use crate::interval::RidSet;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

/// One link of the calendar chain: a time span `[begin, end]` (inclusive
/// epoch seconds) over which the set of free resources does not change.
/// `prev` and `next` are sids into the owning arena, `None` at the chain ends.
#[derive(Clone)]
pub struct Slot {
    pub sid: i32,
    pub prev: Option<i32>,
    pub next: Option<i32>,
    pub begin: i64,
    pub end: i64,
    /// Resources free over the whole span.
    pub itvs: RidSet,
    /// Occupied resources granted back to selected jobs.
    pub shared: SharedItvs,
}

impl Slot {
    pub fn new(sid: i32, begin: i64, end: i64, itvs: RidSet) -> Slot {
        Slot {
            sid,
            prev: None,
            next: None,
            begin,
            end,
            itvs,
            shared: SharedItvs::default(),
        }
    }

    /// Span length in seconds.
    pub fn width(&self) -> i64 {
        self.end - self.begin + 1
    }

    /// Takes resources out of the free set.
    pub fn occupy(&mut self, itvs: &RidSet) {
        self.itvs = &self.itvs - itvs;
    }
    /// Puts resources back into the free set.
    pub fn release(&mut self, itvs: &RidSet) {
        self.itvs = &self.itvs | itvs;
    }

    /// Copy of this slot over another span, same free set and grants.
    /// The chain links are left for the caller to fix.
    pub(crate) fn clone_into(&self, sid: i32, begin: i64, end: i64) -> Slot {
        Slot {
            sid,
            prev: self.prev,
            next: self.next,
            begin,
            end,
            itvs: self.itvs.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl Debug for Slot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Slot#{} [{}, {}] free={} ({:?}<->{:?})", self.sid, self.begin, self.end, self.itvs, self.prev, self.next)
    }
}

/// Grants attached to a slot: resources that are occupied but still usable by
/// the jobs a grant designates. Timesharing grants carry a `(user, name)`
/// pattern where either part may be `*`; placeholder grants carry the
/// placeholder name and shrink as allow jobs consume them.
#[derive(Clone, Default)]
pub struct SharedItvs {
    time_sharing: HashMap<(Box<str>, Box<str>), RidSet>,
    placeholders: HashMap<Box<str>, RidSet>,
}

impl SharedItvs {
    pub fn grant_time_sharing(&mut self, user: Box<str>, name: Box<str>, itvs: &RidSet) {
        self.time_sharing
            .entry((user, name))
            .and_modify(|granted| *granted |= itvs)
            .or_insert_with(|| itvs.clone());
    }

    /// Everything granted to a job of the given user and name: the union of
    /// the grants whose pattern covers them.
    pub fn time_sharing_for(&self, user: &str, name: &str) -> RidSet {
        self.time_sharing
            .iter()
            .filter(|((grant_user, grant_name), _)| {
                (grant_user.as_ref() == "*" || grant_user.as_ref() == user)
                    && (grant_name.as_ref() == "*" || grant_name.as_ref() == name)
            })
            .fold(RidSet::new(), |acc, (_, itvs)| acc | itvs)
    }

    pub fn grant_placeholder(&mut self, name: &Box<str>, itvs: &RidSet) {
        self.placeholders
            .entry(name.clone())
            .and_modify(|granted| *granted |= itvs)
            .or_insert_with(|| itvs.clone());
    }

    /// An allow job took part of the placeholder capacity.
    pub fn consume_placeholder(&mut self, name: &Box<str>, itvs: &RidSet) {
        if let Some(granted) = self.placeholders.get_mut(name) {
            *granted = &*granted - itvs;
        }
    }

    /// Remaining capacity of the named placeholder.
    pub fn placeholder_for(&self, name: &str) -> RidSet {
        self.placeholders.get(name).cloned().unwrap_or_default()
    }
}
