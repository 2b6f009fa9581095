mod input;
mod session;
mod state;
mod timer;

pub use input::{CaptureInput, ImageFile, ImageSource};
pub use session::CaptureSession;
pub use state::{CaptureState, FailureReason};
pub use timer::format_elapsed;
