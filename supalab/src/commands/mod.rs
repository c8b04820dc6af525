pub mod channels;
pub mod debug;
pub mod dev;
pub mod edge;
pub mod session;
