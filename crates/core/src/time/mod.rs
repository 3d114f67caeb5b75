pub mod schedule;

pub use schedule::{DailySchedule, DailyTime};
