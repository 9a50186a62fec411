pub use nexo_core::{ParticipantId, RoomId};

pub mod model {
    pub use nexo_core::model::*;
}

pub mod utils {
    pub use nexo_core::utils::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use nexo_client::*;
}
