pub mod event_repository;
pub mod log_repository;
pub mod stats_repository;

pub use event_repository::EventRepository;
pub use log_repository::LogRepository;
pub use stats_repository::StatsRepository;
