pub mod feedback;
pub mod models;

pub use feedback::*;
pub use models::*;
