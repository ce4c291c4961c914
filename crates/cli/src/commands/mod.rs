pub mod pipeline;
pub mod serve;
pub mod watch;
