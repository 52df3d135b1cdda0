pub mod pipeline;
pub mod report;
pub mod setup;
pub mod ui;
