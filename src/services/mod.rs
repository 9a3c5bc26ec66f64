pub mod poll_service;

pub use poll_service::{PollService, PollStats, PublishSummary};
