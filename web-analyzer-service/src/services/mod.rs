pub mod event_stream;
pub mod submission;
pub mod worker;

pub use event_stream::EventStreamService;
pub use submission::SubmissionService;
pub use worker::AnalysisWorker;
