pub mod api;
pub mod breaker;
pub mod config;
pub mod db;
pub mod engine;
pub mod generation;
pub mod jobs;
pub mod ledger;
pub mod models;
pub mod personas;
