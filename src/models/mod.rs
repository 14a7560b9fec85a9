// src/models/mod.rs

pub mod assessment;
pub mod attempt;
pub mod category;
pub mod points;
pub mod question;
pub mod user;
