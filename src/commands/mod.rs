pub mod serve;
pub mod sweep;
