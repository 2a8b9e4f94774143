pub mod check;
pub mod entries;
pub mod map;
