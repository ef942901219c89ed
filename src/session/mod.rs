pub mod store;
pub mod seed;

pub use store::{InMemorySessionStore, SessionStore};
pub use seed::load_seed_file;
