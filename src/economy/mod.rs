pub mod cups;
pub mod gems;
pub mod matcher;
