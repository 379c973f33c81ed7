//! # Web API Request Handlers

pub mod database;
