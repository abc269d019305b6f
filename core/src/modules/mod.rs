pub mod analyst;
pub mod runner;
pub mod sqlmap;
