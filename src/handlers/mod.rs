// src/handlers/mod.rs

pub mod admin;
pub mod assessment;
pub mod attempt;
pub mod auth;
pub mod leaderboard;
pub mod profile;
pub mod question;
pub mod rating;
