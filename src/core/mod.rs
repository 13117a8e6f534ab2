pub mod filename;
pub mod grouping;
pub mod history;
pub mod removal;
pub mod resize;
pub mod resolver;
pub mod runner;
pub mod scoring;
