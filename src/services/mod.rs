pub mod sink;

pub use sink::{DeliverySink, HttpSink, SinkRegistry};
