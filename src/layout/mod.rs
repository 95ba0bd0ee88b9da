//! Binary layout of the shared region: constants, wire structures and the
//! planner that turns a finished catalog into exact byte geometry

pub mod constants;
pub mod headers;
pub mod planner;

pub use planner::{plan, RegionLayout, SectionPlan};
