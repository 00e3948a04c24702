//! Input parsing and buffered point I/O

pub mod las;
pub mod pts;
pub mod raw;
pub mod sink;
pub mod source;
pub mod stream;

pub use sink::PointSink;
pub use source::{measure_inputs, open_source, PointSource, SourceLayout};
pub use stream::PointStream;
