pub mod deploy;
pub mod discover;
pub mod envs;
pub mod recover;
pub mod remove;
pub mod status;
