pub mod attempts;
pub mod catalog;
pub mod plan;
pub mod plan_id;
pub mod plan_store;
pub mod planner;
pub mod progress;
