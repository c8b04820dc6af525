pub mod auth;
pub mod beep;
pub mod client;
pub mod config;
pub mod functions;
pub mod http;
pub mod logo;
pub mod realtime;
pub mod stop_flag;
pub mod utils;

pub use client::{SupabaseClient, DEFAULT_URL};
