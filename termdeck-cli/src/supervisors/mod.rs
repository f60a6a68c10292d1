mod demo;
mod local;

pub use demo::{DEMO_CONFIG, DemoSupervisor};
pub use local::LocalSupervisor;
