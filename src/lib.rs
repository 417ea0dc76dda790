pub mod autosave;
pub mod config;
pub mod db;
pub mod web;
