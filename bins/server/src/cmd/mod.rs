pub mod classify;
pub mod serve;
