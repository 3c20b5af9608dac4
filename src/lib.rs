pub mod api_router;
pub mod core;
pub mod portal;
pub mod security;
