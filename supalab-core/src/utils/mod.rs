pub mod args;
pub mod format;
pub mod sensitive_data;
