// src/models/mod.rs

pub mod exam;
pub mod integrity;
pub mod question;
pub mod submission;
pub mod user;
