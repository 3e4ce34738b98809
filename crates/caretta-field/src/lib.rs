pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod forms;
pub mod logging;
pub mod mappers;
pub mod models;
pub mod text;
pub mod ui;
pub mod views;

pub use error::{Error, Result};
