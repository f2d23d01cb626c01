pub mod coalescer;
pub mod dispatcher;
pub mod normalizer;
pub mod reaper;
pub mod stats;

pub use coalescer::Coalescer;
pub use dispatcher::Dispatcher;
pub use normalizer::Normalizer;
pub use reaper::Reaper;
