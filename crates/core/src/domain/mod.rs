pub mod actor;
pub mod decision;
pub mod entity;
pub mod history;
