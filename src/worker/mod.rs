pub mod controller;
pub mod progress;

pub use controller::Controller;
pub use progress::{ProgressReporter, ProgressUpdate};
