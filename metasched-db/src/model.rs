pub mod events;
pub mod gantt;
pub mod job_types;
pub mod jobs;
pub mod moldable;
pub mod queues;
pub mod resources;
