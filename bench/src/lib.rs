pub mod fanout;
pub mod registry;
pub mod workdir;

pub use fanout::{BenchmarkFanout, CheckReport, MemberTiming, ReadReport, WriteReport};
pub use registry::{FleetRegistry, Member, Node};
pub use workdir::{file_content, WorkDir};
