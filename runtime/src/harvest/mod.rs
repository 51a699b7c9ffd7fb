//! The harvest pipeline: record projection, the unlock protocol, and the
//! pagination controller that ties them together.

pub mod controller;
pub mod project;
pub mod unlock;
