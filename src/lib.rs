pub mod action;
pub mod cli;
pub mod config;
pub mod flock;
pub mod git;
pub mod model;
pub mod push;
pub mod server;
pub mod webhook;
