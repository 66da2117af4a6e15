pub mod descriptors;
pub mod executor;
pub mod params;
pub mod registry;

pub use executor::execute;
pub use params::Limits;
pub use registry::ToolRegistry;
