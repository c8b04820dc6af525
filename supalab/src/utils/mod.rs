pub mod tracing_layer;
pub mod ui;
