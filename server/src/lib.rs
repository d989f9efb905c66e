pub mod auth;
pub mod config;
pub mod engine;
pub mod slack;
pub mod web;

mod integration_tests;
