pub mod backup;
pub mod core;
pub mod session;
pub mod setup;
pub mod teachers;
pub mod timetable;
