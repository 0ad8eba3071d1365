// src/handlers/mod.rs

pub mod admin;
pub mod auth;
pub mod categories;
pub mod jokers;
pub mod questions;
pub mod quiz;
pub mod schools;
pub mod users;
