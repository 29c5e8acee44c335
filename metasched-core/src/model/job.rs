use crate::interval::RidSet;
use crate::scheduler::hierarchy::HierarchyRequests;
use log::warn;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub name: Option<Box<str>>,
    pub user: Option<Box<str>>,
    pub project: Option<Box<str>>,
    pub queue: Box<str>,
    pub kind: JobKind,
    pub state: Box<str>,
    pub reservation: ReservationState,
    pub types: HashMap<Box<str>, Option<Box<str>>>,
    pub moldables: Vec<Moldable>,
    /// The time interval and resources assigned to the job.
    /// `None` until the job is scheduled or launched.
    pub assignment: Option<JobAssignment>,
    pub time_sharing: Option<TimeSharingType>,
    pub placeholder: PlaceholderType,
    /// Requested start time, only meaningful for advance reservations (0 otherwise).
    pub start_time: i64,
    pub submission_time: i64,
    /// Checkpoint grace in seconds, 0 disables checkpointing.
    pub checkpoint: i64,
    /// `host:port` of the interactive client to notify, if any.
    pub info_type: Option<Box<str>>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct JobAssignment {
    pub begin: i64,
    pub end: i64,
    pub resources: RidSet,
    /// Index of the moldable used for this assignment in the job's moldables vector.
    pub moldable_index: usize,
}

#[derive(Debug, Clone)]
pub struct Moldable {
    pub id: i64,
    pub walltime: i64,
    pub requests: HierarchyRequests,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Interactive,
    Passive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationState {
    None,
    ToSchedule,
    Scheduled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimeSharingType {
    /// timesharing=\*,\*
    AllAll,
    /// timesharing=user,* or timesharing=*,user
    UserAll,
    /// timesharing=*,name or timesharing=name,*
    AllName,
    /// timesharing=user,name
    UserName,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaceholderType {
    /// Mark the job as a placeholder and name it by the parameter,
    /// reserving future capacity that `Allow` jobs may consume.
    Placeholder(Box<str>),
    /// Allow the job to use the resources of the named placeholder.
    Allow(Box<str>),
    None,
}

impl JobKind {
    pub fn from_db(value: &str) -> Self {
        match value {
            "INTERACTIVE" => JobKind::Interactive,
            "PASSIVE" => JobKind::Passive,
            other => {
                warn!("Unknown job type {}, assuming PASSIVE", other);
                JobKind::Passive
            }
        }
    }
    pub fn as_db(&self) -> &'static str {
        match self {
            JobKind::Interactive => "INTERACTIVE",
            JobKind::Passive => "PASSIVE",
        }
    }
}

impl ReservationState {
    pub fn from_db(value: &str) -> Self {
        match value {
            "toSchedule" => ReservationState::ToSchedule,
            "Scheduled" => ReservationState::Scheduled,
            _ => ReservationState::None,
        }
    }
    pub fn as_db(&self) -> &'static str {
        match self {
            ReservationState::None => "None",
            ReservationState::ToSchedule => "toSchedule",
            ReservationState::Scheduled => "Scheduled",
        }
    }
}

impl TimeSharingType {
    pub fn from_str(user: &str, job: &str) -> Self {
        match (user, job) {
            ("*", "*") => TimeSharingType::AllAll,
            ("*", "name") => TimeSharingType::AllName,
            ("name", "*") => TimeSharingType::AllName,
            ("user", "*") => TimeSharingType::UserAll,
            ("*", "user") => TimeSharingType::UserAll,
            ("user", "name") => TimeSharingType::UserName,
            _ => {
                warn!("Invalid time sharing type: user={}, job={}", user, job);
                TimeSharingType::AllAll // Default to AllAll if invalid
            }
        }
    }
    pub fn from_types(types: &HashMap<Box<str>, Option<Box<str>>>) -> Option<Self> {
        match types.get("timesharing") {
            Some(Some(value)) => match value.split_once(',') {
                Some((user, name)) => Some(TimeSharingType::from_str(user.trim(), name.trim())),
                None => {
                    warn!("Invalid time sharing type: {}", value);
                    None
                }
            },
            Some(None) => {
                warn!("Invalid time sharing type: missing value");
                None
            }
            None => None,
        }
    }
    /// The `(user, name)` sharing key of a job: each part is the literal value
    /// or `*` when the job shares with everyone on that axis.
    pub fn sharing_key(&self, job: &Job) -> (Box<str>, Box<str>) {
        let user = || job.user.clone().unwrap_or_else(|| "".into());
        let name = || job.name.clone().unwrap_or_else(|| "".into());
        match self {
            TimeSharingType::AllAll => ("*".into(), "*".into()),
            TimeSharingType::UserAll => (user(), "*".into()),
            TimeSharingType::AllName => ("*".into(), name()),
            TimeSharingType::UserName => (user(), name()),
        }
    }
}

impl PlaceholderType {
    pub fn from_types(types: &HashMap<Box<str>, Option<Box<str>>>) -> Self {
        match (types.get("placeholder"), types.get("allow")) {
            (Some(Some(name)), _) => PlaceholderType::Placeholder(name.clone()),
            (_, Some(Some(name))) => PlaceholderType::Allow(name.clone()),
            (Some(None), _) => {
                warn!("Invalid placeholder type: missing name");
                PlaceholderType::None
            }
            (_, Some(None)) => {
                warn!("Invalid allow type: missing name");
                PlaceholderType::None
            }
            _ => PlaceholderType::None,
        }
    }
    pub fn is_placeholder(&self) -> bool {
        matches!(self, PlaceholderType::Placeholder(_))
    }
    pub fn is_allow(&self) -> bool {
        matches!(self, PlaceholderType::Allow(_))
    }
    pub fn is_none(&self) -> bool {
        matches!(self, PlaceholderType::None)
    }
}

/// Two jobs may share resources iff both carry a timesharing tag and each
/// part of their sharing keys matches literally or is `*`.
pub fn timesharing_compatible(a: &Job, b: &Job) -> bool {
    let (Some(ts_a), Some(ts_b)) = (&a.time_sharing, &b.time_sharing) else {
        return false;
    };
    let (user_a, name_a) = ts_a.sharing_key(a);
    let (user_b, name_b) = ts_b.sharing_key(b);
    let user_ok = user_a.as_ref() == "*" || user_b.as_ref() == "*" || user_a == user_b;
    let name_ok = name_a.as_ref() == "*" || name_b.as_ref() == "*" || name_a == name_b;
    user_ok && name_ok
}

impl Job {
    pub fn is_scheduled(&self) -> bool {
        self.assignment.is_some()
    }
    pub fn begin(&self) -> Option<i64> {
        self.assignment.as_ref().map(|a| a.begin)
    }
    pub fn end(&self) -> Option<i64> {
        self.assignment.as_ref().map(|a| a.end)
    }
    pub fn is_besteffort(&self) -> bool {
        self.queue.as_ref() == "besteffort" || self.types.contains_key("besteffort")
    }
    pub fn is_container(&self) -> bool {
        self.types.contains_key("container")
    }
    /// Name of the slot set the job must be placed in: inner jobs consult
    /// the slot set derived from their container, every other job the default one.
    pub fn slot_set_name(&self) -> Box<str> {
        match self.types.get("inner") {
            Some(Some(name)) => name.clone(),
            _ => "default".into(),
        }
    }
    /// Name of the derived slot set a container job feeds: the value of its
    /// `container` tag, or the job id when the tag is bare.
    pub fn container_slot_set_name(&self) -> Box<str> {
        match self.types.get("container") {
            Some(Some(name)) => name.clone(),
            _ => self.id.to_string().into_boxed_str(),
        }
    }
}

pub struct JobBuilder {
    id: i64,
    name: Option<Box<str>>,
    user: Option<Box<str>>,
    project: Option<Box<str>>,
    queue: Option<Box<str>>,
    kind: JobKind,
    state: Box<str>,
    reservation: ReservationState,
    types: HashMap<Box<str>, Option<Box<str>>>,
    moldables: Vec<Moldable>,
    assignment: Option<JobAssignment>,
    time_sharing: Option<TimeSharingType>,
    placeholder: Option<PlaceholderType>,
    start_time: i64,
    submission_time: i64,
    checkpoint: i64,
    info_type: Option<Box<str>>,
    message: String,
}

impl JobBuilder {
    pub fn new(id: i64) -> Self {
        JobBuilder {
            id,
            name: None,
            user: None,
            project: None,
            queue: None,
            kind: JobKind::Passive,
            state: "Waiting".into(),
            reservation: ReservationState::None,
            types: HashMap::new(),
            moldables: vec![],
            assignment: None,
            time_sharing: None,
            placeholder: None,
            start_time: 0,
            submission_time: 0,
            checkpoint: 0,
            info_type: None,
            message: String::new(),
        }
    }
    pub fn name(mut self, name: Box<str>) -> Self {
        self.name = Some(name);
        self
    }
    pub fn name_opt(mut self, name: Option<Box<str>>) -> Self {
        self.name = name;
        self
    }
    pub fn user(mut self, user: Box<str>) -> Self {
        self.user = Some(user);
        self
    }
    pub fn user_opt(mut self, user: Option<Box<str>>) -> Self {
        self.user = user;
        self
    }
    pub fn project(mut self, project: Box<str>) -> Self {
        self.project = Some(project);
        self
    }
    pub fn project_opt(mut self, project: Option<Box<str>>) -> Self {
        self.project = project;
        self
    }
    pub fn queue(mut self, queue: Box<str>) -> Self {
        self.queue = Some(queue);
        self
    }
    pub fn kind(mut self, kind: JobKind) -> Self {
        self.kind = kind;
        self
    }
    pub fn state(mut self, state: Box<str>) -> Self {
        self.state = state;
        self
    }
    pub fn reservation(mut self, reservation: ReservationState) -> Self {
        self.reservation = reservation;
        self
    }
    pub fn types(mut self, types: HashMap<Box<str>, Option<Box<str>>>) -> Self {
        self.types = types;
        self
    }
    pub fn add_type(mut self, key: Box<str>, value: Box<str>) -> Self {
        self.types.insert(key, Some(value));
        self
    }
    pub fn add_type_key(mut self, key: Box<str>) -> Self {
        self.types.insert(key, None);
        self
    }
    pub fn moldable(mut self, moldable: Moldable) -> Self {
        self.moldables.push(moldable);
        self
    }
    pub fn moldable_auto(mut self, id: i64, walltime: i64, requests: HierarchyRequests) -> Self {
        self.moldables.push(Moldable::new(id, walltime, requests));
        self
    }
    pub fn moldables(mut self, moldables: Vec<Moldable>) -> Self {
        self.moldables = moldables;
        self
    }
    pub fn assign(mut self, assignment: JobAssignment) -> Self {
        self.assignment = Some(assignment);
        self
    }
    pub fn assign_opt(mut self, assignment: Option<JobAssignment>) -> Self {
        self.assignment = assignment;
        self
    }
    pub fn time_sharing(mut self, ts_type: TimeSharingType) -> Self {
        self.time_sharing = Some(ts_type);
        self
    }
    pub fn placeholder(mut self, placeholder: PlaceholderType) -> Self {
        self.placeholder = Some(placeholder);
        self
    }
    pub fn start_time(mut self, start_time: i64) -> Self {
        self.start_time = start_time;
        self
    }
    pub fn submission_time(mut self, submission_time: i64) -> Self {
        self.submission_time = submission_time;
        self
    }
    pub fn checkpoint(mut self, checkpoint: i64) -> Self {
        self.checkpoint = checkpoint;
        self
    }
    pub fn info_type(mut self, info_type: Box<str>) -> Self {
        self.info_type = Some(info_type);
        self
    }
    pub fn info_type_opt(mut self, info_type: Option<Box<str>>) -> Self {
        self.info_type = info_type;
        self
    }
    pub fn message(mut self, message: String) -> Self {
        self.message = message;
        self
    }
    // Computes the TimeSharing and Placeholder from the types if not set explicitly.
    pub fn build(self) -> Job {
        Job {
            id: self.id,
            name: self.name,
            user: self.user,
            project: self.project,
            queue: self.queue.unwrap_or_else(|| Box::from("default")),
            kind: self.kind,
            state: self.state,
            reservation: self.reservation,
            time_sharing: self.time_sharing.or(TimeSharingType::from_types(&self.types)),
            placeholder: self.placeholder.unwrap_or(PlaceholderType::from_types(&self.types)),
            types: self.types,
            moldables: self.moldables,
            assignment: self.assignment,
            start_time: self.start_time,
            submission_time: self.submission_time,
            checkpoint: self.checkpoint,
            info_type: self.info_type,
            message: self.message,
        }
    }
}

impl JobAssignment {
    pub fn new(begin: i64, end: i64, resources: RidSet, moldable_index: usize) -> JobAssignment {
        JobAssignment {
            begin,
            end,
            resources,
            moldable_index,
        }
    }
}

impl Moldable {
    pub fn new(id: i64, walltime: i64, requests: HierarchyRequests) -> Moldable {
        Moldable { id, walltime, requests }
    }
}
