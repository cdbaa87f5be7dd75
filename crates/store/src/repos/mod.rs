//! Repository traits for session store operations.
//!
//! Every method takes the session name first; it is the tenancy boundary and
//! no method reads or writes rows outside of it.

pub mod entities;
pub mod sent_files;
pub mod sessions;
pub mod update_state;

pub use entities::EntityRepo;
pub use sent_files::SentFileRepo;
pub use sessions::SessionRepo;
pub use update_state::UpdateStateRepo;
