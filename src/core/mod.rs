// Domain-layer modules and shared errors/models
pub mod repository {
    pub use crate::repository::*;
}

pub mod bulk_import {
    pub use crate::bulk_import::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
