pub mod submissions;
pub mod visits;
