pub mod prelude;

pub mod session;
