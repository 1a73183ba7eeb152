//! External service integrations.

pub mod gemini_client {
    pub use crate::gemini_client::*;
}

pub mod cep_client {
    pub use crate::cep_client::*;
}

pub mod webhook_client {
    pub use crate::webhook_client::*;
}

pub mod webhook_models {
    pub use crate::webhook_models::*;
}
