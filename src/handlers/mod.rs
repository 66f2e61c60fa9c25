pub mod admin;
pub mod exam;
pub mod integrity;
pub mod submission;
