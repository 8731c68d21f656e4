// src/timetable/mod.rs
pub mod controller;
pub mod grid;
pub mod slots;

pub use controller::{
    AutoScheduleSummary, ConflictItem, ConflictReport, GenerateReport, LoadOutcome,
    OptimizeResult, ScheduleFilters, SyncSummary, TimetableController,
};
pub use grid::{DragPayload, Lookups, ScheduleBlock, Timetable, ViewMode, Viewer, MAX_WEEK};
pub use slots::{weekday_name, Completeness, SlotIndex, SlotKey};
