//! Study Material Generation Pipeline
//!
//! This library provides the core functionality for studygen, which turns a
//! topic or an uploaded document into a package of derived study artifacts
//! (summary, flashcards, quiz) by orchestrating Cloudflare Workers AI calls,
//! defensively parsing the model's structured output, and persisting both
//! the artifacts and a pollable job-status record.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
