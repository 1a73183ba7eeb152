// Domain-layer modules and shared errors/models
pub mod estimator {
    pub use crate::estimator::*;
}

pub mod lead_capture {
    pub use crate::lead_capture::*;
}

pub mod reveal {
    pub use crate::reveal::*;
}

pub mod session {
    pub use crate::session::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
