pub mod api_router;
pub mod config;
pub mod directory;
pub mod itsm;
pub mod shared;
pub mod sla;
