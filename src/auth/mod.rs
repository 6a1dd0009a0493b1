mod emails;
mod middlewares;
mod routes;
mod services;

pub use middlewares::{
    admin_required_middleware, login_required_middleware, sessions_middleware, CurrentUser,
};
pub use routes::routes;
pub use services::{hash_password, verify_password};
