pub use super::session::Entity as Session;
