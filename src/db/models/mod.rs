mod cat;
mod user;

pub use cat::*;
pub use user::*;
