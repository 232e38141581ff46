//! Domain types for poolcast

pub mod ids;
pub mod method;
pub mod record;

pub use ids::{Bucket, ForecasterId, QuestionId};
pub use method::{Method, MethodValues};
pub use record::{
    AggregateRow, DayScore, ForecasterDayRecord, ForecasterDayScore, ForecasterRanking,
    ForecasterSummary, RecordError, Snapshot,
};
